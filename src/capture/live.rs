//! Camera-backed frame source using OpenCV Haar cascades.
//!
//! Construction probes a small number of device indices and loads the
//! frontal-face and eye cascade classifiers; either failing is fatal for
//! this source. A failed single-frame read at runtime is transient and
//! surfaces as [`CaptureError::TransientReadFailure`].
//!
//! OpenCV calls block on device I/O, so every capture runs on the
//! blocking thread pool. The device handle is owned exclusively by this
//! source and all access is serialized through one mutex.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use opencv::core::{Rect, Size, Vector};
use opencv::objdetect::CascadeClassifier;
use opencv::prelude::*;
use opencv::videoio::{CAP_ANY, VideoCapture};
use opencv::{core, imgproc};

use super::{CaptureError, DetectionResult, FrameSource};

const FACE_CASCADE: &str = "haarcascade_frontalface_default.xml";
const EYE_CASCADE: &str = "haarcascade_eye.xml";

/// How many device indices to probe before giving up.
const CAMERA_PROBE_LIMIT: i32 = 3;

/// Live frame source: camera + face/eye cascade detection.
pub struct LiveFrameSource {
    inner: Arc<Mutex<Detector>>,
    cadence: Duration,
}

struct Detector {
    device: VideoCapture,
    face: CascadeClassifier,
    eyes: CascadeClassifier,
}

impl LiveFrameSource {
    /// Opens a camera device and loads both cascade classifiers.
    ///
    /// Device indices `0..3` are probed in order; the first that opens
    /// wins.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::ClassifierUnavailable`] if either cascade
    /// file is missing or loads empty, and
    /// [`CaptureError::NoCameraAvailable`] if no probed device opens.
    pub fn open(cadence: Duration) -> Result<Self, CaptureError> {
        let face = load_cascade(FACE_CASCADE)?;
        let eyes = load_cascade(EYE_CASCADE)?;

        let mut device = None;
        for index in 0..CAMERA_PROBE_LIMIT {
            match VideoCapture::new(index, CAP_ANY) {
                Ok(cap) if cap.is_opened().unwrap_or(false) => {
                    tracing::info!(index, "camera opened");
                    device = Some(cap);
                    break;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(index, error = %err, "failed to open camera");
                }
            }
        }
        let Some(device) = device else {
            return Err(CaptureError::NoCameraAvailable);
        };

        Ok(Self {
            inner: Arc::new(Mutex::new(Detector { device, face, eyes })),
            cadence,
        })
    }
}

#[async_trait]
impl FrameSource for LiveFrameSource {
    async fn capture(&self) -> Result<DetectionResult, CaptureError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let Ok(mut detector) = inner.lock() else {
                return Err(CaptureError::TransientReadFailure);
            };
            detector.detect_once()
        })
        .await
        .map_err(|_| CaptureError::TransientReadFailure)?
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn mode(&self) -> &'static str {
        "live"
    }
}

impl Detector {
    fn detect_once(&mut self) -> Result<DetectionResult, CaptureError> {
        let mut frame = Mat::default();
        let grabbed = self
            .device
            .read(&mut frame)
            .map_err(|_| CaptureError::TransientReadFailure)?;
        if !grabbed || frame.empty().unwrap_or(true) {
            return Err(CaptureError::TransientReadFailure);
        }

        let mut gray = Mat::default();
        imgproc::cvt_color(&frame, &mut gray, imgproc::COLOR_BGR2GRAY, 0)
            .map_err(|_| CaptureError::TransientReadFailure)?;

        let mut faces = Vector::<Rect>::new();
        self.face
            .detect_multi_scale(
                &gray,
                &mut faces,
                1.1,
                5,
                0,
                Size::new(30, 30),
                Size::new(0, 0),
            )
            .map_err(|_| CaptureError::TransientReadFailure)?;

        let mut eye_count: u32 = 0;
        for face in faces.iter() {
            let roi = Mat::roi(&gray, face).map_err(|_| CaptureError::TransientReadFailure)?;
            let mut eyes = Vector::<Rect>::new();
            self.eyes
                .detect_multi_scale(
                    &roi,
                    &mut eyes,
                    1.1,
                    5,
                    0,
                    Size::new(20, 20),
                    Size::new(0, 0),
                )
                .map_err(|_| CaptureError::TransientReadFailure)?;
            eye_count = eyes.len() as u32;
        }

        let face_detected = !faces.is_empty();
        let confidence = if face_detected && eye_count >= 2 {
            (f64::from(eye_count) / 2.0).min(1.0)
        } else if face_detected {
            0.5
        } else {
            0.0
        };

        Ok(DetectionResult {
            face_detected,
            eye_count,
            looking_away: !face_detected || eye_count < 2,
            confidence,
            timestamp: Utc::now(),
            note: None,
        })
    }
}

/// Resolves and loads one Haar cascade by file name.
///
/// `CASCADE_DIR` overrides the search location; otherwise OpenCV's own
/// data directory is searched.
fn load_cascade(name: &str) -> Result<CascadeClassifier, CaptureError> {
    let path = match std::env::var("CASCADE_DIR") {
        Ok(dir) => format!("{dir}/{name}"),
        Err(_) => core::find_file(&format!("haarcascades/{name}"), false, true)
            .map_err(|err| CaptureError::ClassifierUnavailable(err.to_string()))?,
    };
    if path.is_empty() {
        return Err(CaptureError::ClassifierUnavailable(format!(
            "{name} not found"
        )));
    }

    let classifier = CascadeClassifier::new(&path)
        .map_err(|err| CaptureError::ClassifierUnavailable(err.to_string()))?;
    if classifier.empty().unwrap_or(true) {
        return Err(CaptureError::ClassifierUnavailable(format!(
            "{name} loaded empty"
        )));
    }
    Ok(classifier)
}

impl fmt::Debug for LiveFrameSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveFrameSource")
            .field("cadence", &self.cadence)
            .finish_non_exhaustive()
    }
}
