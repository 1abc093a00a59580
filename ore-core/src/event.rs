//! Events produced by the diff engine
//!
//! Each cycle returns an ordered `Vec<EventLog>`. Callers match on
//! [`Event`]; the payload alone answers "what changed".

use crate::model::*;
use crate::units::Seconds;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// The car an event is about
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriverRef {
    pub key: DriverKey,
    pub place: Option<u32>,
    pub is_main: bool,
}

/// Outcome of a completed lap
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapSummary {
    /// Laps completed including this one
    pub completed_laps: u32,
    pub valid: Option<bool>,
    /// `None` when the lap time could not be established
    pub lap_time: Option<Seconds>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    SessionChanged {
        old: Option<SessionType>,
        new: Option<SessionType>,
    },
    SessionPhaseChanged {
        old: Option<SessionPhase>,
        new: Option<SessionPhase>,
    },
    CarChanged {
        old: i32,
        new: i32,
    },
    TrackChanged {
        old: i32,
        new: i32,
    },
    MainDriverChanged {
        old: Option<DriverKey>,
        new: Option<DriverKey>,
    },
    GamePaused,
    GameResumed,
    EnteredReplay,
    ExitedReplay,
    PushToPassActivated {
        old: PushToPassState,
        new: PushToPassState,
    },
    PushToPassDeactivated {
        old: PushToPassState,
        new: PushToPassState,
    },
    PushToPassReady {
        old: PushToPassState,
        new: PushToPassState,
    },
    EnteredPitlane {
        driver: DriverRef,
    },
    ExitedPitlane {
        driver: DriverRef,
    },
    PositionJump {
        driver: DriverRef,
        old_fraction: Option<f32>,
        new_fraction: Option<f32>,
        old_laps: Option<u32>,
        new_laps: Option<u32>,
    },
    NewLap {
        driver: DriverRef,
        lap: LapSummary,
    },
}

impl Event {
    /// Stable tag, identical to the serialized `event` field
    pub fn name(&self) -> &'static str {
        match self {
            Event::SessionChanged { .. } => "session_changed",
            Event::SessionPhaseChanged { .. } => "session_phase_changed",
            Event::CarChanged { .. } => "car_changed",
            Event::TrackChanged { .. } => "track_changed",
            Event::MainDriverChanged { .. } => "main_driver_changed",
            Event::GamePaused => "game_paused",
            Event::GameResumed => "game_resumed",
            Event::EnteredReplay => "entered_replay",
            Event::ExitedReplay => "exited_replay",
            Event::PushToPassActivated { .. } => "push_to_pass_activated",
            Event::PushToPassDeactivated { .. } => "push_to_pass_deactivated",
            Event::PushToPassReady { .. } => "push_to_pass_ready",
            Event::EnteredPitlane { .. } => "entered_pitlane",
            Event::ExitedPitlane { .. } => "exited_pitlane",
            Event::PositionJump { .. } => "position_jump",
            Event::NewLap { .. } => "new_lap",
        }
    }

    /// The car this event concerns, for per-driver events
    pub fn driver(&self) -> Option<&DriverRef> {
        match self {
            Event::EnteredPitlane { driver }
            | Event::ExitedPitlane { driver }
            | Event::PositionJump { driver, .. }
            | Event::NewLap { driver, .. } => Some(driver),
            _ => None,
        }
    }
}

/// One emitted event with the frames it was derived from
#[derive(Debug, Clone, Serialize)]
pub struct EventLog {
    #[serde(flatten)]
    pub event: Event,

    /// Timestamp of the frame that produced the event
    pub timestamp: DateTime<Utc>,

    #[serde(skip)]
    pub previous: Option<Arc<Frame>>,

    #[serde(skip)]
    pub current: Arc<Frame>,
}

impl EventLog {
    pub fn new(event: Event, previous: Option<&Arc<Frame>>, current: &Arc<Frame>) -> Self {
        Self {
            event,
            timestamp: current.timestamp,
            previous: previous.cloned(),
            current: Arc::clone(current),
        }
    }

    pub fn name(&self) -> &'static str {
        self.event.name()
    }
}
