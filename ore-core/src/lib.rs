//! OpenRaceEvents Core Library
//!
//! This crate turns a stream of telemetry frames into discrete race events
//! and keeps the per-combination statistics derived from them: fuel use,
//! lap times, tire wear and best-lap delta profiles.
//!
//! Everything here is synchronous and free of I/O. Hosts feed frames to
//! [`EventEngine::cycle`] from a single consumer and persist the tables
//! through the [`persist::CombinationStore`] seam.

pub mod adapter;
pub mod config;
pub mod engine;
pub mod event;
pub mod model;
pub mod persist;
pub mod projection;
pub mod ranked;
pub mod raw;
pub mod registry;
pub mod sampler;
pub mod stats;
pub mod units;

pub use adapter::FrameAdapter;
pub use config::EngineConfig;
pub use engine::EventEngine;
pub use event::{DriverRef, Event, EventLog, LapSummary};
pub use model::{ClassCombinationKey, CombinationKey, DriverKey, DriverRecord, Frame};
pub use projection::{estimate_laps, fuel_to_finish, RaceLength};
pub use raw::RawFrame;
