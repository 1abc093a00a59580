//! Frame-diffing event engine
//!
//! [`EventEngine::cycle`] compares the previous frame (if any) with the
//! current one and returns the events in a fixed rule order:
//!
//! 1. session change
//! 2. session-phase change
//! 3. car change, then track change
//! 4. main-driver change
//! 5. pause / resume
//! 6. replay enter / exit
//! 7. push-to-pass activated / deactivated / ready
//! 8. per driver, in frame order: pit lane, position jump, new lap
//!
//! The engine owns the driver registry, rolling statistics and lap sampler
//! and updates them as a side effect of the events it detects. It performs
//! no I/O and holds no wall-clock state.

use crate::config::EngineConfig;
use crate::event::{DriverRef, Event, EventLog, LapSummary};
use crate::model::*;
use crate::projection::{self, RaceLength};
use crate::registry::{DriverRegistry, LapSample};
use crate::sampler::LapPositionSampler;
use crate::stats::RollingStats;
use crate::units::{Liters, Seconds};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Fuel and tire state when the main driver's current lap began
#[derive(Debug, Clone, Copy)]
struct LapStart {
    fuel: Option<Liters>,
    tire_wear: Option<TireWear>,
    /// False if the lap was picked up mid-way or interrupted by a pit
    /// visit or position jump
    clean: bool,
}

impl LapStart {
    fn from_frame(frame: &Frame, clean: bool) -> Self {
        Self {
            fuel: frame.fuel_left,
            tire_wear: frame.tire_wear,
            clean,
        }
    }
}

pub struct EventEngine {
    config: EngineConfig,
    registry: DriverRegistry,
    stats: RollingStats,
    sampler: LapPositionSampler,
    main_driver: Option<DriverKey>,
    lap_start: Option<LapStart>,
}

impl EventEngine {
    pub fn new(config: EngineConfig) -> Self {
        let stats = RollingStats::new(config.sample_capacity);
        let sampler = LapPositionSampler::new(config.profile_resolution);
        Self::with_stores(config, stats, sampler)
    }

    /// Build an engine around statistics loaded at startup
    pub fn with_stores(config: EngineConfig, stats: RollingStats, sampler: LapPositionSampler) -> Self {
        Self {
            config,
            registry: DriverRegistry::new(),
            stats,
            sampler,
            main_driver: None,
            lap_start: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &RollingStats {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut RollingStats {
        &mut self.stats
    }

    pub fn sampler(&self) -> &LapPositionSampler {
        &self.sampler
    }

    pub fn sampler_mut(&mut self) -> &mut LapPositionSampler {
        &mut self.sampler
    }

    pub fn main_driver(&self) -> Option<&DriverKey> {
        self.main_driver.as_ref()
    }

    /// Race-length projection for `frame` using this engine's history
    pub fn estimate_laps(&self, frame: &Frame) -> Option<RaceLength> {
        let combination = frame
            .combination_key()
            .and_then(|key| self.stats.combination(&key));
        projection::estimate_laps(frame, combination)
    }

    /// Diff `previous` against `current` and return the resulting events
    pub fn cycle(&mut self, previous: Option<&Arc<Frame>>, current: &Arc<Frame>) -> Vec<EventLog> {
        let prev = previous.map(Arc::as_ref);
        let cur = current.as_ref();
        let mut events = Vec::new();

        // 1. Session
        let prev_session_key = prev.map(Frame::session_key).unwrap_or((None, None));
        let session_changed = prev_session_key != cur.session_key();
        if session_changed {
            events.push(Event::SessionChanged {
                old: prev_session_key.0,
                new: cur.session,
            });
        }

        // 2. Session phase
        let prev_phase = prev.and_then(|p| p.session_phase);
        let phase_changed = prev_phase != cur.session_phase;
        if phase_changed {
            events.push(Event::SessionPhaseChanged {
                old: prev_phase,
                new: cur.session_phase,
            });
        }

        if session_changed || (phase_changed && is_session_restart(prev_phase, cur.session_phase)) {
            self.reset_session();
        }

        // 3. Car / track, only within one session
        if let Some(p) = prev.filter(|_| !session_changed) {
            if let (Some(old), Some(new)) = (p.vehicle_id, cur.vehicle_id) {
                if old != new {
                    events.push(Event::CarChanged { old, new });
                    self.lap_start = None;
                }
            }
            if let (Some(old), Some(new)) = (p.layout_id, cur.layout_id) {
                if old != new {
                    events.push(Event::TrackChanged { old, new });
                    self.lap_start = None;
                }
            }
        }

        // 4. Main driver. An unavailable position keeps the last known one.
        let main_key = match cur.main_driver() {
            Some(record) => Some(DriverKey::from_record(record)),
            None => self.main_driver.clone(),
        };
        if main_key != self.main_driver {
            events.push(Event::MainDriverChanged {
                old: self.main_driver.clone(),
                new: main_key.clone(),
            });
            if let Some(old) = self.main_driver.take() {
                if let Some(driver) = self.registry.get_mut(&old) {
                    driver.set_main(false);
                    driver.clear_samples();
                }
            }
            self.main_driver = main_key.clone();
            self.lap_start = None;
        }

        if let Some(p) = prev {
            // 5. Pause
            match (p.game_paused, cur.game_paused) {
                (false, true) => events.push(Event::GamePaused),
                (true, false) => events.push(Event::GameResumed),
                _ => {}
            }

            // 6. Replay
            match (p.game_in_replay, cur.game_in_replay) {
                (false, true) => events.push(Event::EnteredReplay),
                (true, false) => events.push(Event::ExitedReplay),
                _ => {}
            }

            // 7. Push to pass
            push_to_pass_events(p, cur, &mut events);
        }

        // 8. Per driver
        self.diff_drivers(prev.is_some(), cur, main_key.as_ref(), &mut events);

        events
            .into_iter()
            .map(|event| EventLog::new(event, previous, current))
            .collect()
    }

    fn reset_session(&mut self) {
        debug!(
            "session restarted, dropping {} driver identities",
            self.registry.len()
        );
        self.registry.reset();
        self.lap_start = None;
    }

    fn diff_drivers(
        &mut self,
        diffing: bool,
        cur: &Frame,
        main_key: Option<&DriverKey>,
        events: &mut Vec<Event>,
    ) {
        let tolerance = self.config.position_jump_tolerance;
        let window = self.config.line_crossing_window;

        let mut seen = HashSet::with_capacity(cur.drivers.len());
        for record in &cur.drivers {
            let key = DriverKey::from_record(record);
            if !seen.insert(key.clone()) {
                // Only the first record of a colliding identity drives its state
                debug!(name = %key.name, "duplicate driver identity in frame");
                continue;
            }
            let is_main = main_key == Some(&key);
            let known = self.registry.contains(&key);
            let fraction = if is_main {
                cur.lap_distance_fraction.or(record.lap_fraction)
            } else {
                record.lap_fraction
            };

            let driver = self.registry.resolve(record);
            driver.set_main(is_main);

            if known && diffing {
                let driver_ref = DriverRef {
                    key: key.clone(),
                    place: record.place,
                    is_main,
                };

                // Pit lane
                if let (Some(was), Some(now)) = (driver.in_pitlane, record.in_pitlane) {
                    if !was && now {
                        events.push(Event::EnteredPitlane {
                            driver: driver_ref.clone(),
                        });
                        driver.clear_samples();
                        if is_main {
                            interrupt(&mut self.lap_start);
                        }
                    } else if was && !now {
                        events.push(Event::ExitedPitlane {
                            driver: driver_ref.clone(),
                        });
                    }
                }

                // Lap counter and position continuity
                let old_laps = driver.completed_laps;
                let new_laps = record.completed_laps;
                let mut new_lap = None;
                let jumped = match (old_laps, new_laps) {
                    (Some(old), Some(new)) if new == old + 1 => {
                        new_lap = Some(new);
                        false
                    }
                    (Some(old), Some(new)) if new != old => true,
                    _ => match (driver.lap_fraction, fraction) {
                        (Some(old_f), Some(new_f)) => {
                            let crossed_line = old_f > 1.0 - window && new_f < window;
                            old_f - new_f > tolerance && !crossed_line
                        }
                        _ => false,
                    },
                };

                if jumped {
                    driver.clear_samples();
                    if is_main {
                        events.push(Event::PositionJump {
                            driver: driver_ref.clone(),
                            old_fraction: driver.lap_fraction,
                            new_fraction: fraction,
                            old_laps,
                            new_laps,
                        });
                        interrupt(&mut self.lap_start);
                    }
                }

                if let Some(completed_laps) = new_lap {
                    let (valid, lap_time) = if is_main {
                        (
                            cur.previous_lap_valid.or(driver.last_valid()),
                            cur.lap_time_previous_self,
                        )
                    } else {
                        (driver.last_valid(), record.sector_lap_time())
                    };

                    events.push(Event::NewLap {
                        driver: driver_ref,
                        lap: LapSummary {
                            completed_laps,
                            valid,
                            lap_time,
                        },
                    });

                    let samples = driver.take_samples();
                    if is_main {
                        let class_id = cur.vehicle_class_id.or(record.class_id);
                        let lap_start = self.lap_start.take();
                        record_main_lap(
                            &mut self.stats,
                            &mut self.sampler,
                            lap_start,
                            cur,
                            class_id,
                            &samples,
                            valid,
                            lap_time,
                        );
                        self.lap_start = Some(LapStart::from_frame(cur, true));
                    }
                }
            }

            // Carry this frame's state forward
            if record.completed_laps.is_some() {
                driver.completed_laps = record.completed_laps;
            }
            if record.in_pitlane.is_some() {
                driver.in_pitlane = record.in_pitlane;
            }
            if fraction.is_some() {
                driver.lap_fraction = fraction;
            }
            if is_main {
                driver.set_last_valid(cur.current_lap_valid.or(record.current_lap_valid));
                if record.in_pitlane != Some(true) {
                    if let (Some(f), Some(elapsed)) = (fraction, cur.lap_time_current_self) {
                        driver.record_sample(f, elapsed.0);
                    }
                }
                if self.lap_start.is_none() {
                    // Joined mid-lap: fuel used on this lap is not a full-lap sample
                    self.lap_start = Some(LapStart::from_frame(cur, false));
                }
            } else {
                driver.set_last_valid(record.current_lap_valid);
            }
        }
    }

}

impl Default for EventEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

fn interrupt(lap_start: &mut Option<LapStart>) {
    if let Some(start) = lap_start.as_mut() {
        start.clean = false;
    }
}

/// A phase change that means the session was restarted or unloaded
fn is_session_restart(old: Option<SessionPhase>, new: Option<SessionPhase>) -> bool {
    match new {
        None => old.is_some(),
        Some(SessionPhase::Garage) => true,
        Some(phase) => old.is_some_and(|o| o >= SessionPhase::Green) && phase < SessionPhase::Green,
    }
}

fn push_to_pass_events(prev: &Frame, cur: &Frame, events: &mut Vec<Event>) {
    let state_of = |frame: &Frame| {
        frame
            .push_to_pass
            .map_or(PushToPassState::Unavailable, |p| p.state())
    };
    let old = state_of(prev);
    let new = state_of(cur);
    if old == new {
        return;
    }

    if new == PushToPassState::Engaged {
        events.push(Event::PushToPassActivated { old, new });
        return;
    }
    if old == PushToPassState::Engaged {
        events.push(Event::PushToPassDeactivated { old, new });
    }
    if new == PushToPassState::Ready {
        events.push(Event::PushToPassReady { old, new });
    }
}

/// Feed a completed main-driver lap into the statistics and the sampler
#[allow(clippy::too_many_arguments)]
fn record_main_lap(
    stats: &mut RollingStats,
    sampler: &mut LapPositionSampler,
    lap_start: Option<LapStart>,
    frame: &Frame,
    class_id: Option<i32>,
    samples: &[LapSample],
    valid: Option<bool>,
    lap_time: Option<Seconds>,
) {
    let counted = valid == Some(true);

    if let Some(key) = frame.combination_key() {
        if let Some(start) = lap_start {
            let usable = start.clean && valid != Some(false);
            if let (Some(before), Some(after)) = (start.fuel, frame.fuel_left) {
                stats.add_fuel_sample(key, before - after, usable);
            }
            if let (Some(before), Some(after)) = (start.tire_wear, frame.tire_wear) {
                stats.add_tire_wear_sample(key, before.worn_since(&after), usable);
            }
        }
        if let (true, Some(t)) = (counted, lap_time) {
            stats.add_lap_time(key, t);
        }
    }

    if let (true, Some(t), Some(layout_id), Some(class_id)) = (counted, lap_time, frame.layout_id, class_id) {
        sampler.complete_lap(ClassCombinationKey { layout_id, class_id }, samples, t);
    }
}
