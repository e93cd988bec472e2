//! Frame sources.
//!
//! A source produces one `Frame` per monitoring cycle:
//! - `stub://` synthetic scenes (testing, development)
//! - local V4L2 devices (feature: capture-v4l2)
//!
//! Sources configure the device for a target resolution and frame rate at
//! open time, best-effort: a device that refuses the configuration still
//! opens, and the active format wins. Opening a missing device is fatal
//! (`SourceError::DeviceUnavailable`); a failed read is not - the monitor
//! logs it and runs the next cycle.

mod camera;

pub use camera::{CameraSource, SourceStats};

use thiserror::Error;

use crate::frame::Frame;

/// Frame acquisition errors.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The device could not be opened. Fatal at session start.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A single read attempt failed. Recoverable; the cycle is skipped.
    #[error("frame capture failed: {0}")]
    Capture(String),
}

/// Successive-frame acquisition from a capture device.
///
/// Opening happens in the concrete constructor (`CameraSource::open`);
/// release is deterministic via `Drop` on every exit path.
pub trait FrameSource {
    /// Capture the next frame.
    fn read_frame(&mut self) -> Result<Frame, SourceError>;

    /// Capture counters for health logging.
    fn stats(&self) -> SourceStats;
}
