//! Engine tuning knobs

use serde::{Deserialize, Serialize};

/// Number of samples each rolling buffer keeps
pub const DEFAULT_SAMPLE_CAPACITY: usize = 20;

/// Points per lap in a stored best-lap profile
pub const DEFAULT_PROFILE_RESOLUTION: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the fuel, lap-time and tire-wear FIFOs
    pub sample_capacity: usize,

    /// Backwards movement (in lap fractions) tolerated between two frames
    /// before the main driver is considered teleported
    pub position_jump_tolerance: f32,

    /// A fraction drop from above `1 - window` to below `window` is a line
    /// crossing whose lap count has not caught up yet, not a jump
    pub line_crossing_window: f32,

    /// Points per lap in stored best-lap profiles
    pub profile_resolution: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_capacity: DEFAULT_SAMPLE_CAPACITY,
            position_jump_tolerance: 0.02,
            line_crossing_window: 0.1,
            profile_resolution: DEFAULT_PROFILE_RESOLUTION,
        }
    }
}
