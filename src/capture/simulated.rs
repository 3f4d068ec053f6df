//! Synthetic detection-state generator.
//!
//! Used whenever no camera pipeline is available (cloud deployments) or
//! when `TRACKING_MODE=simulated`. The sequence is driven by a shared
//! monotonically increasing counter: `looking_away` is true on roughly
//! 20% of ticks and `confidence` cycles through five values in
//! `[0.8, 0.96]`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{CaptureError, DetectionResult, FrameSource};

const SIMULATED_NOTE: &str = "Simulated data - camera not available";

/// Deterministic-ish frame source that never fails.
#[derive(Debug)]
pub struct SimulatedFrameSource {
    counter: AtomicU64,
    cadence: Duration,
}

impl SimulatedFrameSource {
    /// Creates a simulated source emitting at the given cadence.
    #[must_use]
    pub fn new(cadence: Duration) -> Self {
        Self {
            counter: AtomicU64::new(0),
            cadence,
        }
    }
}

#[async_trait]
impl FrameSource for SimulatedFrameSource {
    async fn capture(&self) -> Result<DetectionResult, CaptureError> {
        let tick = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(DetectionResult {
            face_detected: true,
            eye_count: 2,
            // Looking away ~20% of the time.
            looking_away: tick % 10 >= 8,
            confidence: 0.8 + (tick % 5) as f64 * 0.04,
            timestamp: Utc::now(),
            note: Some(SIMULATED_NOTE.to_owned()),
        })
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn mode(&self) -> &'static str {
        "simulated"
    }
}
