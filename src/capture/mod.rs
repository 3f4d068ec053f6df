//! Frame capture layer: detection results and their sources.
//!
//! A [`FrameSource`] produces one [`DetectionResult`] per emission tick.
//! Two implementations exist: [`SimulatedFrameSource`] synthesizes data
//! deterministically, and (behind the `live-camera` feature)
//! [`live::LiveFrameSource`] runs cascade-classifier detection against a
//! real camera device. The detection algorithms themselves are delegated
//! to OpenCV; this layer only owns acquisition and the result shape.

pub mod simulated;

#[cfg(feature = "live-camera")]
pub mod live;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use simulated::SimulatedFrameSource;

/// One face/eye-detection outcome, simulated or real.
///
/// Immutable once produced; transient, one per emission tick.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    /// Whether at least one face was detected in the frame.
    pub face_detected: bool,
    /// Number of eyes detected within the face region.
    pub eye_count: u32,
    /// True when no face is visible or fewer than two eyes are found.
    pub looking_away: bool,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f64,
    /// When the result was produced.
    pub timestamp: DateTime<Utc>,
    /// Optional annotation, e.g. marking simulated data.
    pub note: Option<String>,
}

/// Errors produced by frame acquisition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// No camera device could be opened on any probed index.
    #[error("no camera available")]
    NoCameraAvailable,

    /// A single frame read failed; the caller should retry on the next
    /// tick rather than terminate tracking.
    #[error("transient frame read failure")]
    TransientReadFailure,

    /// A cascade classifier file is missing or failed to load.
    #[error("cascade classifier unavailable: {0}")]
    ClassifierUnavailable(String),
}

/// Source of detection results.
///
/// `capture` may suspend (live mode performs blocking device I/O off the
/// async executor), so the caller must never invoke it from the loop that
/// services inbound messages.
#[async_trait]
pub trait FrameSource: Send + Sync + fmt::Debug {
    /// Produces one detection result.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::TransientReadFailure`] for a failed single
    /// frame read; the emission activity retries on its next tick.
    async fn capture(&self) -> Result<DetectionResult, CaptureError>;

    /// Fixed emission cadence for this source variant.
    fn cadence(&self) -> Duration;

    /// Short human-readable mode label for logs and diagnostics.
    fn mode(&self) -> &'static str;
}

/// Process-level handle to the frame source.
///
/// Construction failure of the live source does not tear the process
/// down; it is recorded here and reported to any client that requests
/// `start_tracking`.
#[derive(Debug, Clone)]
pub enum FrameSupply {
    /// A working source, shared by all sessions.
    Ready(Arc<dyn FrameSource>),
    /// No source could be constructed; the string explains why.
    Unavailable(String),
}

impl FrameSupply {
    /// Wraps a working source.
    #[must_use]
    pub fn ready(source: Arc<dyn FrameSource>) -> Self {
        Self::Ready(source)
    }

    /// Records a construction failure.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable(reason.into())
    }
}
