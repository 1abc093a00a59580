//! Frame data model
//!
//! Defines the [`Frame`] snapshot that every adapter produces and the engine
//! diffs. Fields the producer could not fill in this frame are `None`; the
//! sentinel-to-`None` conversion happens once, in [`crate::raw`].

use crate::units::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One immutable telemetry snapshot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Timestamp when this frame was captured
    pub timestamp: DateTime<Utc>,

    // === Session ===
    /// Session type (practice, qualifying, race, warmup)
    pub session: Option<SessionType>,

    /// Iteration of the session type (practice 1, practice 2, ...)
    pub session_iteration: Option<i32>,

    /// Session phase (garage through checkered)
    pub session_phase: Option<SessionPhase>,

    /// How the session length is bounded
    pub session_length_format: Option<SessionLengthFormat>,

    /// Session time remaining
    pub session_time_remaining: Option<Seconds>,

    /// Lap budget for lap-based sessions
    pub number_of_laps: Option<u32>,

    // === Track / Vehicle ===
    pub track_id: Option<i32>,
    pub layout_id: Option<i32>,
    pub track_length: Option<Meters>,
    pub vehicle_id: Option<i32>,
    pub vehicle_class_id: Option<i32>,

    // === Game state ===
    pub game_paused: bool,
    pub game_in_replay: bool,

    // === Local player ===
    /// Place of the local player (1 = leader)
    pub position: Option<u32>,

    /// Fraction of the current lap completed (0.0 to 1.0)
    pub lap_distance_fraction: Option<f32>,

    pub completed_laps: Option<u32>,

    pub current_lap_valid: Option<bool>,

    /// Elapsed time on the current lap
    pub lap_time_current_self: Option<Seconds>,

    /// Time of the lap just completed
    pub lap_time_previous_self: Option<Seconds>,

    /// Whether the lap just completed counted
    pub previous_lap_valid: Option<bool>,

    pub lap_time_best_self: Option<Seconds>,

    /// Remaining tread per corner (1.0 = new)
    pub tire_wear: Option<TireWear>,

    pub fuel_left: Option<Liters>,
    pub fuel_capacity: Option<Liters>,

    pub push_to_pass: Option<PushToPass>,

    // === Field ===
    /// Every car in the session, in the producer's order
    pub drivers: Vec<DriverRecord>,
}

impl Frame {
    /// The record whose place equals the local player's position
    pub fn main_driver(&self) -> Option<&DriverRecord> {
        let position = self.position?;
        self.drivers.iter().find(|d| d.place == Some(position))
    }

    /// The record in first place
    pub fn leader(&self) -> Option<&DriverRecord> {
        self.drivers.iter().find(|d| d.place == Some(1))
    }

    /// Key used to decide whether two frames belong to the same session
    pub fn session_key(&self) -> (Option<SessionType>, Option<i32>) {
        (self.session, self.session_iteration)
    }

    /// Fuel / lap-time statistics key for the local player's car
    pub fn combination_key(&self) -> Option<CombinationKey> {
        Some(CombinationKey {
            layout_id: self.layout_id?,
            vehicle_id: self.vehicle_id?,
        })
    }

    /// Best-lap profile key for the local player's class
    pub fn class_combination_key(&self) -> Option<ClassCombinationKey> {
        Some(ClassCombinationKey {
            layout_id: self.layout_id?,
            class_id: self.vehicle_class_id?,
        })
    }
}

/// Per-car record inside a frame
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriverRecord {
    /// Running order (1 = leader)
    pub place: Option<u32>,

    /// Name decoded from the producer's fixed-size buffer
    pub name: String,

    pub user_id: Option<i32>,
    pub slot_id: Option<i32>,
    pub livery_id: Option<i32>,
    pub class_id: Option<i32>,
    pub class_performance_index: Option<i32>,

    pub completed_laps: Option<u32>,
    pub current_lap_valid: Option<bool>,

    pub lap_time_current: Option<Seconds>,
    pub lap_time_previous: Option<Seconds>,
    pub lap_time_best: Option<Seconds>,

    /// Sector times of the previous lap; `None` for a sector that was not valid
    pub sector_times_previous: [Option<Seconds>; 3],

    /// Distance into the current lap
    pub lap_distance: Option<Meters>,

    /// `lap_distance / track_length`
    pub lap_fraction: Option<f32>,

    pub in_pitlane: Option<bool>,
    pub finish_status: Option<FinishStatus>,

    /// Only reliably reported for the local player's car
    pub control_type: Option<ControlType>,
}

impl DriverRecord {
    /// Previous lap time rebuilt from its sectors; `None` unless all three
    /// sectors are valid
    pub fn sector_lap_time(&self) -> Option<Seconds> {
        let [s1, s2, s3] = self.sector_times_previous;
        let total = s1? + s2? + s3?;
        total.is_positive().then_some(total)
    }

    pub fn has_finished(&self) -> bool {
        self.finish_status == Some(FinishStatus::Finished)
    }
}

/// Remaining tread per corner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TireWear {
    pub front_left: Percentage,
    pub front_right: Percentage,
    pub rear_left: Percentage,
    pub rear_right: Percentage,
}

impl TireWear {
    pub fn corners(&self) -> [f32; 4] {
        [
            self.front_left.0,
            self.front_right.0,
            self.rear_left.0,
            self.rear_right.0,
        ]
    }

    pub fn from_corners(corners: [f32; 4]) -> Self {
        let [fl, fr, rl, rr] = corners;
        Self {
            front_left: Percentage::new(fl),
            front_right: Percentage::new(fr),
            rear_left: Percentage::new(rl),
            rear_right: Percentage::new(rr),
        }
    }

    /// Tread lost going from `self` to `later`, per corner
    pub fn worn_since(&self, later: &TireWear) -> [f32; 4] {
        let before = self.corners();
        let after = later.corners();
        std::array::from_fn(|i| before[i] - after[i])
    }
}

/// Push-to-pass status for the local player's car
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PushToPass {
    pub available: bool,
    pub engaged: bool,
    pub amount_left: Option<u32>,
    pub engaged_time_left: Option<Seconds>,
    pub wait_time_left: Option<Seconds>,
}

impl PushToPass {
    pub fn state(&self) -> PushToPassState {
        if !self.available {
            PushToPassState::Unavailable
        } else if self.engaged {
            PushToPassState::Engaged
        } else if self.wait_time_left.is_some_and(|t| t.is_positive()) {
            PushToPassState::Cooldown
        } else {
            PushToPassState::Ready
        }
    }
}

/// Derived push-to-pass state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushToPassState {
    Unavailable,
    Ready,
    Engaged,
    Cooldown,
}

/// Session type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionType {
    Practice,
    Qualify,
    Race,
    Warmup,
}

impl SessionType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Practice),
            1 => Some(Self::Qualify),
            2 => Some(Self::Race),
            3 => Some(Self::Warmup),
            _ => None,
        }
    }
}

/// Session phase, ordered from garage to checkered flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    Garage = 1,
    Gridwalk = 2,
    Formation = 3,
    Countdown = 4,
    Green = 5,
    Checkered = 6,
}

impl SessionPhase {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Garage),
            2 => Some(Self::Gridwalk),
            3 => Some(Self::Formation),
            4 => Some(Self::Countdown),
            5 => Some(Self::Green),
            6 => Some(Self::Checkered),
            _ => None,
        }
    }
}

/// How a session's length is bounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionLengthFormat {
    TimeBased,
    LapBased,
    /// Time based, plus one extra lap once the clock runs out
    TimeAndLapBased,
}

impl SessionLengthFormat {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::TimeBased),
            1 => Some(Self::LapBased),
            2 => Some(Self::TimeAndLapBased),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishStatus {
    None,
    Finished,
    Dnf,
    Dnq,
    Dns,
    Dq,
}

impl FinishStatus {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::None),
            1 => Some(Self::Finished),
            2 => Some(Self::Dnf),
            3 => Some(Self::Dnq),
            4 => Some(Self::Dns),
            5 => Some(Self::Dq),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlType {
    Player,
    Ai,
    Remote,
    Replay,
}

impl ControlType {
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Player),
            1 => Some(Self::Ai),
            2 => Some(Self::Remote),
            3 => Some(Self::Replay),
            _ => None,
        }
    }
}

// === Keys ===

/// Stable identity of a car across frames.
///
/// Place is deliberately not part of the key: it changes lap to lap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DriverKey {
    pub name: String,
    pub user_id: Option<i32>,
    pub slot_id: Option<i32>,
    pub livery_id: Option<i32>,
}

impl DriverKey {
    pub fn from_record(record: &DriverRecord) -> Self {
        Self {
            name: record.name.clone(),
            user_id: record.user_id,
            slot_id: record.slot_id,
            livery_id: record.livery_id,
        }
    }
}

impl fmt::Display for DriverKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = |v: Option<i32>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
        write!(
            f,
            "{}#{}#{}#{}",
            self.name,
            id(self.user_id),
            id(self.slot_id),
            id(self.livery_id)
        )
    }
}

/// (track layout, vehicle) key for fuel and lap-time statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CombinationKey {
    pub layout_id: i32,
    pub vehicle_id: i32,
}

/// (track layout, vehicle class) key for best-lap delta profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClassCombinationKey {
    pub layout_id: i32,
    pub class_id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(place: u32, name: &str) -> DriverRecord {
        DriverRecord {
            place: Some(place),
            name: name.to_string(),
            user_id: Some(100),
            slot_id: Some(3),
            livery_id: Some(7),
            ..Default::default()
        }
    }

    #[test]
    fn test_main_driver_matches_position() {
        let frame = Frame {
            position: Some(2),
            drivers: vec![record(1, "Alex"), record(2, "Sam")],
            ..Default::default()
        };
        assert_eq!(frame.main_driver().unwrap().name, "Sam");
        assert_eq!(frame.leader().unwrap().name, "Alex");
    }

    #[test]
    fn test_main_driver_none_without_position() {
        let frame = Frame {
            drivers: vec![record(1, "Alex")],
            ..Default::default()
        };
        assert!(frame.main_driver().is_none());
    }

    #[test]
    fn test_driver_key_ignores_place() {
        let a = DriverKey::from_record(&record(1, "Alex"));
        let b = DriverKey::from_record(&record(9, "Alex"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_driver_key_distinguishes_id_triples() {
        let mut left = record(1, "Alex1");
        left.user_id = Some(23);
        let mut right = record(1, "Alex");
        right.user_id = Some(123);
        assert_ne!(DriverKey::from_record(&left), DriverKey::from_record(&right));
    }

    #[test]
    fn test_driver_key_display() {
        let key = DriverKey::from_record(&record(1, "Alex"));
        assert_eq!(key.to_string(), "Alex#100#3#7");
    }

    #[test]
    fn test_sector_lap_time_requires_all_sectors() {
        let mut r = record(1, "Alex");
        r.sector_times_previous = [Some(Seconds(30.0)), Some(Seconds(31.0)), None];
        assert!(r.sector_lap_time().is_none());

        r.sector_times_previous[2] = Some(Seconds(29.5));
        assert_eq!(r.sector_lap_time(), Some(Seconds(90.5)));
    }

    #[test]
    fn test_session_phase_ordering() {
        assert!(SessionPhase::Countdown < SessionPhase::Green);
        assert!(SessionPhase::Checkered > SessionPhase::Green);
        assert_eq!(SessionPhase::from_code(5), Some(SessionPhase::Green));
        assert_eq!(SessionPhase::from_code(-1), None);
    }

    #[test]
    fn test_push_to_pass_state() {
        let mut p2p = PushToPass {
            available: true,
            ..Default::default()
        };
        assert_eq!(p2p.state(), PushToPassState::Ready);

        p2p.engaged = true;
        assert_eq!(p2p.state(), PushToPassState::Engaged);

        p2p.engaged = false;
        p2p.wait_time_left = Some(Seconds(12.0));
        assert_eq!(p2p.state(), PushToPassState::Cooldown);

        p2p.available = false;
        assert_eq!(p2p.state(), PushToPassState::Unavailable);
    }

    #[test]
    fn test_tire_wear_worn_since() {
        let start = TireWear::from_corners([1.0, 1.0, 0.9, 0.9]);
        let end = TireWear::from_corners([0.98, 0.97, 0.89, 0.88]);
        let worn = start.worn_since(&end);
        assert!((worn[0] - 0.02).abs() < 1e-6);
        assert!((worn[3] - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_frame_serialization_roundtrip() {
        let frame = Frame {
            session: Some(SessionType::Race),
            session_phase: Some(SessionPhase::Green),
            position: Some(1),
            drivers: vec![record(1, "Alex")],
            ..Default::default()
        };
        let json = serde_json::to_string(&frame).unwrap();
        let parsed: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.session, Some(SessionType::Race));
        assert_eq!(parsed.drivers[0].name, "Alex");
    }
}
