//! Live camera predictor
//!
//! A capture thread publishes frames into a latest-wins mailbox; an axum app
//! streams them to a browser page and runs the classifier on demand. Both
//! sides stop on one shared [`CancellationToken`].
//!
//! ```text
//! camera thread ──publish──▶ mailbox ──watch──▶ GET /stream (SSE)
//!                                 └──latest──▶ POST /capture ─▶ capture.jpg
//!                                               POST /predict ◀─┘
//! ```

pub mod capture;
pub mod mailbox;
pub mod server;
pub mod source;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use capture::{spawn_capture, BoxedSource, CaptureHandle, CaptureReport, CaptureSettings};
pub use mailbox::{mailbox, Frame, FramePublisher, FrameSubscriber};
pub use server::{router, AppState, SharedState};
pub use source::{FrameSource, SourceKind, SyntheticSource};

use crate::inference::Predictor;
use crate::utils::{Result, WasteSortError};

/// Settings for the `camera` command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Trained classifier artifact
    pub model_path: PathBuf,
    pub source: SourceKind,
    pub camera_index: u32,
    /// Requested frame size; the device may pick the closest it supports
    pub width: u32,
    pub height: u32,
    /// Frame rate of the synthetic source
    pub synthetic_fps: u32,
    /// Where Capture writes and Predict reads
    pub capture_path: PathBuf,
    pub bind: SocketAddr,
    pub error_backoff_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(crate::DEFAULT_MODEL_PATH),
            source: SourceKind::Camera,
            camera_index: 0,
            width: crate::IMAGE_SIZE as u32,
            height: crate::IMAGE_SIZE as u32,
            synthetic_fps: 15,
            capture_path: PathBuf::from(crate::DEFAULT_CAPTURE_PATH),
            bind: SocketAddr::from(([127, 0, 0, 1], 8550)),
            error_backoff_ms: 30,
        }
    }
}

impl CameraConfig {
    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            error_backoff: Duration::from_millis(self.error_backoff_ms),
        }
    }

    /// Factory run on the capture thread to open the configured source
    pub fn source_factory(&self) -> impl FnOnce() -> Result<BoxedSource> + Send + 'static {
        let (kind, index, width, height, fps) = (
            self.source,
            self.camera_index,
            self.width,
            self.height,
            self.synthetic_fps,
        );
        move || open_source(kind, index, width, height, fps)
    }
}

fn open_source(kind: SourceKind, index: u32, width: u32, height: u32, fps: u32) -> Result<BoxedSource> {
    match kind {
        SourceKind::Synthetic => Ok(Box::new(SyntheticSource::new(width, height, fps))),
        SourceKind::Camera => open_camera(index, width, height),
    }
}

#[cfg(feature = "camera")]
fn open_camera(index: u32, width: u32, height: u32) -> Result<BoxedSource> {
    Ok(Box::new(source::NokhwaSource::open(index, width, height)?))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_index: u32, _width: u32, _height: u32) -> Result<BoxedSource> {
    Err(WasteSortError::Config(
        "this build has no camera support; rebuild with `--features camera` or use `--source synthetic`"
            .to_string(),
    ))
}

/// Run the camera predictor until the page closes or Ctrl-C
///
/// Fails before serving anything if the source cannot be opened.
pub async fn run<B: Backend>(config: &CameraConfig, predictor: Predictor<B>) -> Result<CaptureReport> {
    let token = CancellationToken::new();
    let (publisher, frames) = mailbox();

    let capture = spawn_capture(
        config.source_factory(),
        publisher,
        token.clone(),
        config.capture_settings(),
    )?;

    let state = Arc::new(AppState::new(
        frames,
        predictor,
        config.capture_path.clone(),
        token.clone(),
    ));
    let served = server::serve(state, config.bind).await;

    token.cancel();
    let report = tokio::task::spawn_blocking(move || capture.shutdown())
        .await
        .map_err(|e| WasteSortError::Camera(format!("Failed to join capture thread: {}", e)))??;
    info!(
        "Camera stopped: {} frames, {} read errors",
        report.frames, report.read_errors
    );

    served.map(|_| report)
}
