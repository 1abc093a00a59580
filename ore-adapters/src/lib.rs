//! Frame sources for OpenRaceEvents

pub mod demo;
pub mod recording;

pub use demo::DemoAdapter;
pub use recording::{Recording, RecordingAdapter, RecordingWriter};
