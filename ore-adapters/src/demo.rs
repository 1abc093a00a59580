//! Demo adapter that simulates a race for testing
//!
//! Six cars lap a circuit with straights, braking zones and corners on a
//! fixed 60Hz simulation clock. Frames are built in the producer's raw
//! layout (sentinels included) and converted with [`Frame::from_raw`], so the
//! whole pipeline is exercised without an actual game. The simulation is
//! deterministic: the same number of `read_frame` calls always yields the
//! same frames.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use ore_core::raw::{RawDriver, RawFrame, RawPushToPass, SENTINEL_F32};
use ore_core::{adapter::FrameAdapter, model::Frame};
use tracing::debug;

/// Simulated seconds per frame
pub const TICK: f32 = 1.0 / 60.0;

pub const TRACK_ID: i32 = 1692;
pub const LAYOUT_ID: i32 = 1693;
pub const VEHICLE_ID: i32 = 5383;
pub const CLASS_ID: i32 = 1703;

/// Time-based race length
pub const RACE_SECONDS: f32 = 1200.0;

/// Grid countdown before the green flag
const COUNTDOWN_SECONDS: f32 = 3.0;

const FUEL_CAPACITY: f32 = 60.0;
const FUEL_PER_LAP: f32 = 2.4;
const TIRE_WEAR_PER_LAP: [f32; 4] = [0.006, 0.0065, 0.0045, 0.005];

/// One in this many frames drops a few fields to sentinels
const DROPOUT_INTERVAL: u64 = 600;

const P2P_ACTIVATIONS: i32 = 10;
const P2P_DURATION: f32 = 8.0;
const P2P_COOLDOWN: f32 = 20.0;

// =============================================================================
// Track definition: a sequence of segments that form a lap
// =============================================================================

#[derive(Clone, Copy)]
struct TrackSegment {
    duration: f32,     // seconds to traverse at reference pace
    target_speed: f32, // m/s at end of segment
}

/// A simple circuit: ~85s lap, mix of corners and straights
fn demo_track() -> Vec<TrackSegment> {
    [
        (8.0, 75.0),  // start/finish straight
        (3.0, 28.0),  // T1 braking
        (4.0, 25.0),  // T1
        (3.5, 55.0),
        (4.0, 62.0),
        (2.0, 45.0),  // T2 braking
        (3.5, 42.0),  // T2
        (3.0, 58.0),
        (10.0, 80.0), // back straight
        (2.5, 35.0),  // chicane
        (2.0, 32.0),
        (2.0, 30.0),
        (3.0, 50.0),
        (6.0, 68.0),
        (1.5, 52.0),  // T4 sweeper
        (5.0, 50.0),
        (3.0, 60.0),
        (3.5, 22.0),  // hairpin braking
        (4.5, 20.0),  // hairpin
        (4.0, 55.0),
        (6.0, 72.0),  // run to the line
    ]
    .into_iter()
    .map(|(duration, target_speed)| TrackSegment {
        duration,
        target_speed,
    })
    .collect()
}

/// Distance covered `t` seconds into a reference lap, with speed ramping
/// linearly between segment targets
fn distance_at(track: &[TrackSegment], t: f32) -> f32 {
    let mut elapsed = 0.0_f32;
    let mut distance = 0.0_f32;
    let mut prev_speed = track.last().map_or(0.0, |s| s.target_speed);

    for seg in track {
        if t < elapsed + seg.duration {
            let seg_t = ((t - elapsed) / seg.duration).clamp(0.0, 1.0);
            let speed_gain = (seg.target_speed - prev_speed) * seg_t / 2.0;
            return distance + seg_t * seg.duration * (prev_speed + speed_gain);
        }
        distance += seg.duration * (prev_speed + seg.target_speed) / 2.0;
        elapsed += seg.duration;
        prev_speed = seg.target_speed;
    }
    distance
}

/// Simple deterministic noise from a seed
fn noise(seed: f32) -> f32 {
    let x = (seed * 12.9898 + 78.233).sin() * 43_758.547;
    x - x.floor()
}

/// Small jitter centered around 0
fn jitter(seed: f32, amplitude: f32) -> f32 {
    (noise(seed) - 0.5) * 2.0 * amplitude
}

// =============================================================================
// Cars
// =============================================================================

struct DemoCar {
    name: &'static str,
    user_id: i32,
    slot_id: i32,
    livery_id: i32,
    is_player: bool,
    /// Lap-time multiplier against the reference lap
    pace: f32,
    /// Lap on which this car visits the pits
    pit_lap: u32,

    completed_laps: u32,
    /// Real seconds into the lap in progress
    lap_elapsed: f32,
    /// Pace for the lap in progress, including lap-to-lap variation
    lap_factor: f32,
    /// Elapsed time at the end of sectors 1 and 2 on the lap in progress
    sector_marks: [Option<f32>; 2],
    previous_sectors: Option<[f32; 3]>,
    previous_lap: Option<f32>,
    best_lap: Option<f32>,
    lap_valid: bool,
    previous_valid: Option<bool>,
    finished: bool,
}

impl DemoCar {
    fn new(index: usize, name: &'static str, pace: f32, is_player: bool) -> Self {
        let slot = index as i32;
        Self {
            name,
            user_id: 4000 + slot * 17,
            slot_id: slot,
            livery_id: 9000 + slot,
            is_player,
            pace,
            pit_lap: 5 + index as u32 * 2,
            completed_laps: 0,
            lap_elapsed: 0.0,
            lap_factor: pace,
            sector_marks: [None, None],
            previous_sectors: None,
            previous_lap: None,
            best_lap: None,
            lap_valid: true,
            previous_valid: None,
            finished: false,
        }
    }

    /// Seconds into the reference lap this car has reached
    fn track_time(&self) -> f32 {
        self.lap_elapsed / self.lap_factor
    }

    fn in_pitlane(&self, fraction: f32) -> bool {
        (self.completed_laps == self.pit_lap && fraction < 0.06)
            || (self.completed_laps + 1 == self.pit_lap && fraction > 0.97)
    }

    /// Player laps that get cut every now and then
    fn lap_is_cut(&self) -> bool {
        self.is_player && self.completed_laps % 7 == 4
    }
}

pub struct DemoAdapter {
    active: bool,
    started_at: Option<DateTime<Utc>>,
    frame_count: u64,
    sim_time: f32,
    track: Vec<TrackSegment>,
    lap_duration: f32,
    track_length: f32,
    cars: Vec<DemoCar>,
    player: usize,
    fuel_left: f32,
    tire_wear: [f32; 4],
    p2p_left: i32,
    p2p_engaged_left: f32,
    p2p_wait_left: f32,
}

impl DemoAdapter {
    pub fn new() -> Self {
        let track = demo_track();
        let lap_duration: f32 = track.iter().map(|s| s.duration).sum();
        let track_length = distance_at(&track, lap_duration);
        let mut adapter = Self {
            active: false,
            started_at: None,
            frame_count: 0,
            sim_time: 0.0,
            track,
            lap_duration,
            track_length,
            cars: Vec::new(),
            player: 3,
            fuel_left: FUEL_CAPACITY,
            tire_wear: [1.0; 4],
            p2p_left: P2P_ACTIVATIONS,
            p2p_engaged_left: 0.0,
            p2p_wait_left: 0.0,
        };
        adapter.reset();
        adapter
    }

    fn reset(&mut self) {
        let grid = [
            ("Alex Rivera", 0.985),
            ("Sam Chen", 0.99),
            ("Jordan Blake", 0.995),
            ("Demo Player", 1.0),
            ("Casey Morgan", 1.004),
            ("Riley Novak", 1.012),
        ];
        self.cars = grid
            .iter()
            .enumerate()
            .map(|(i, (name, pace))| DemoCar::new(i, *name, *pace, i == self.player))
            .collect();
        self.frame_count = 0;
        self.sim_time = 0.0;
        self.fuel_left = FUEL_CAPACITY;
        self.tire_wear = [1.0; 4];
        self.p2p_left = P2P_ACTIVATIONS;
        self.p2p_engaged_left = 0.0;
        self.p2p_wait_left = 0.0;
    }

    pub fn track_length(&self) -> f32 {
        self.track_length
    }

    fn fraction_of(&self, car: &DemoCar) -> f32 {
        if car.finished {
            return 0.0;
        }
        (distance_at(&self.track, car.track_time()) / self.track_length).clamp(0.0, 1.0)
    }

    fn time_remaining(&self) -> f32 {
        (RACE_SECONDS - (self.sim_time - COUNTDOWN_SECONDS).max(0.0)).max(0.0)
    }

    fn phase(&self) -> i32 {
        if self.sim_time < COUNTDOWN_SECONDS {
            4
        } else if self.time_remaining() > 0.0 {
            5
        } else {
            6
        }
    }

    /// Advance every car by one tick
    fn step(&mut self) {
        self.frame_count += 1;
        self.sim_time += TICK;
        let phase = self.phase();
        if phase < 5 {
            return;
        }
        let checkered = phase == 6;

        for index in 0..self.cars.len() {
            if self.cars[index].finished {
                continue;
            }
            let lap_duration = self.lap_duration;
            let is_player = index == self.player;

            // Consumption scales with lap progress
            let progress = TICK / (lap_duration * self.cars[index].lap_factor);
            if is_player {
                self.fuel_left = (self.fuel_left - FUEL_PER_LAP * progress).max(0.0);
                for (corner, rate) in self.tire_wear.iter_mut().zip(TIRE_WEAR_PER_LAP) {
                    *corner = (*corner - rate * progress).max(0.0);
                }
            }

            let car = &mut self.cars[index];
            car.lap_elapsed += TICK;
            let track_time = car.track_time();
            for (sector, mark) in car.sector_marks.iter_mut().enumerate() {
                let boundary = lap_duration * (sector as f32 + 1.0) / 3.0;
                if mark.is_none() && track_time >= boundary {
                    *mark = Some(car.lap_elapsed);
                }
            }
            if car.lap_is_cut() && track_time > lap_duration * 0.4 {
                car.lap_valid = false;
            }

            if track_time >= lap_duration {
                let lap_time = lap_duration * car.lap_factor;
                let s1 = car.sector_marks[0].unwrap_or(lap_time / 3.0);
                let s2 = car.sector_marks[1].unwrap_or(lap_time * 2.0 / 3.0);
                car.previous_sectors = Some([s1, s2 - s1, lap_time - s2]);
                car.previous_lap = Some(lap_time);
                car.previous_valid = Some(car.lap_valid);
                if car.lap_valid && car.best_lap.map_or(true, |best| lap_time < best) {
                    car.best_lap = Some(lap_time);
                }

                car.completed_laps += 1;
                car.lap_elapsed -= lap_time;
                car.lap_factor = car.pace * (1.0 + jitter(car.completed_laps as f32 * 7.3 + index as f32, 0.006));
                car.sector_marks = [None, None];
                car.lap_valid = true;
                car.finished = checkered;
                if car.finished {
                    debug!(driver = car.name, laps = car.completed_laps, "demo car took the flag");
                }
            }
        }

        let player = &self.cars[self.player];
        if player.in_pitlane(self.fraction_of(player)) {
            self.fuel_left = FUEL_CAPACITY;
            self.tire_wear = [1.0; 4];
        }
        self.step_push_to_pass();
    }

    fn step_push_to_pass(&mut self) {
        if self.p2p_engaged_left > 0.0 {
            self.p2p_engaged_left -= TICK;
            if self.p2p_engaged_left <= 0.0 {
                self.p2p_engaged_left = 0.0;
                self.p2p_wait_left = P2P_COOLDOWN;
            }
        } else if self.p2p_wait_left > 0.0 {
            self.p2p_wait_left = (self.p2p_wait_left - TICK).max(0.0);
        } else {
            let player = &self.cars[self.player];
            let fraction = self.fraction_of(player);
            let wants_boost = player.completed_laps % 3 == 2 && (0.2..0.25).contains(&fraction);
            if wants_boost && self.p2p_left > 0 {
                self.p2p_left -= 1;
                self.p2p_engaged_left = P2P_DURATION;
            }
        }
    }

    /// Running order, leader first
    fn standings(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.cars.len()).collect();
        let progress = |i: usize| self.cars[i].completed_laps as f32 + self.fraction_of(&self.cars[i]);
        order.sort_by(|&a, &b| progress(b).total_cmp(&progress(a)).then(a.cmp(&b)));
        order
    }

    /// Advance the simulation one tick and build the producer-side frame
    pub fn next_raw(&mut self) -> RawFrame {
        self.step();

        let standings = self.standings();
        let place_of = |index: usize| standings.iter().position(|&i| i == index).map_or(-1, |p| p as i32 + 1);
        let dropout = self.frame_count % DROPOUT_INTERVAL == 0;

        let drivers: Vec<RawDriver> = self
            .cars
            .iter()
            .enumerate()
            .map(|(index, car)| {
                let fraction = self.fraction_of(car);
                let lap_distance = if dropout && index == 4 {
                    SENTINEL_F32
                } else {
                    fraction * self.track_length
                };
                RawDriver {
                    place: place_of(index),
                    name: RawDriver::encode_name(car.name),
                    user_id: car.user_id,
                    slot_id: car.slot_id,
                    livery_id: car.livery_id,
                    class_id: CLASS_ID,
                    class_performance_index: 0,
                    completed_laps: car.completed_laps as i32,
                    current_lap_valid: car.lap_valid as i32,
                    lap_time_current_self: car.lap_elapsed,
                    lap_time_previous_self: car.previous_lap.unwrap_or(SENTINEL_F32),
                    lap_time_best_self: car.best_lap.unwrap_or(SENTINEL_F32),
                    sector_times_previous_self: car.previous_sectors.unwrap_or([SENTINEL_F32; 3]),
                    lap_distance,
                    in_pitlane: car.in_pitlane(fraction) as i32,
                    finish_status: car.finished as i32,
                    control_type: if car.is_player { 0 } else { 1 },
                }
            })
            .collect();

        let player = &self.cars[self.player];
        let player_fraction = self.fraction_of(player);

        RawFrame {
            session_type: 2,
            session_iteration: 1,
            session_phase: self.phase(),
            session_length_format: 0,
            session_time_remaining: self.time_remaining(),
            number_of_laps: -1,
            track_id: TRACK_ID,
            layout_id: LAYOUT_ID,
            layout_length: self.track_length,
            vehicle_model_id: VEHICLE_ID,
            vehicle_class_id: CLASS_ID,
            game_paused: 0,
            game_in_replay: 0,
            position: place_of(self.player),
            lap_distance_fraction: if dropout { SENTINEL_F32 } else { player_fraction },
            completed_laps: player.completed_laps as i32,
            current_lap_valid: player.lap_valid as i32,
            lap_time_current_self: player.lap_elapsed,
            lap_time_previous_self: player.previous_lap.unwrap_or(SENTINEL_F32),
            previous_lap_valid: player.previous_valid.map_or(-1, i32::from),
            lap_time_best_self: player.best_lap.unwrap_or(SENTINEL_F32),
            tire_wear: self.tire_wear,
            fuel_left: self.fuel_left,
            fuel_capacity: FUEL_CAPACITY,
            push_to_pass: RawPushToPass {
                available: 1,
                engaged: (self.p2p_engaged_left > 0.0) as i32,
                amount_left: self.p2p_left,
                engaged_time_left: self.p2p_engaged_left,
                wait_time_left: self.p2p_wait_left,
            },
            drivers,
        }
    }

    fn timestamp(&self) -> DateTime<Utc> {
        let start = self.started_at.unwrap_or_default();
        start + Duration::milliseconds((self.sim_time as f64 * 1000.0) as i64)
    }
}

impl Default for DemoAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAdapter for DemoAdapter {
    fn key(&self) -> &str {
        "demo"
    }

    fn name(&self) -> &str {
        "Demo"
    }

    fn detect(&self) -> bool {
        true
    }

    fn start(&mut self) -> Result<()> {
        self.reset();
        self.active = true;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.active = false;
        self.started_at = None;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if !self.active {
            return Ok(None);
        }

        let raw = self.next_raw();
        Ok(Some(Frame::from_raw(&raw, self.timestamp())))
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_profile_is_monotonic() {
        let track = demo_track();
        let lap: f32 = track.iter().map(|s| s.duration).sum();
        let mut last = 0.0;
        for i in 1..=850 {
            let d = distance_at(&track, lap * i as f32 / 850.0);
            assert!(d >= last, "distance went backwards at step {i}");
            last = d;
        }
        assert!((last - distance_at(&track, lap)).abs() < 1e-3);
    }

    #[test]
    fn test_noise_is_deterministic() {
        assert_eq!(noise(3.5), noise(3.5));
        assert!((0.0..1.0).contains(&noise(17.0)));
        assert!(jitter(2.0, 0.1).abs() <= 0.1);
    }
}
