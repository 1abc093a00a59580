//! Frame source trait definition

use crate::model::Frame;
use anyhow::Result;

/// A source of telemetry frames
///
/// Each adapter is responsible for:
/// - Detecting whether its source is available
/// - Reading raw producer data
/// - Converting it to [`Frame`] (normally through [`Frame::from_raw`])
pub trait FrameAdapter: Send + Sync {
    /// Stable identifier used in URLs and logs (e.g., "demo")
    fn key(&self) -> &str;

    /// Display name (e.g., "Demo", "Recording")
    fn name(&self) -> &str;

    /// Lightweight availability check
    fn detect(&self) -> bool;

    /// Open the source. Called once after a successful `detect`.
    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Read the next frame
    ///
    /// Returns:
    /// - `Ok(Some(frame))` if a new frame is available
    /// - `Ok(None)` if no new data (non-blocking)
    /// - `Err(_)` if an error occurred
    fn read_frame(&mut self) -> Result<Option<Frame>>;

    fn is_active(&self) -> bool;
}
