//! HTTP front end of the camera predictor
//!
//! Serves the page, an SSE stream of JPEG frames, and the capture/predict
//! buttons. Prediction runs on the blocking pool so the stream keeps moving.

use std::convert::Infallible;
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::{
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        Html,
    },
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use burn::tensor::backend::Backend;
use futures::{future, stream::Stream, StreamExt};
use image::{codecs::jpeg::JpegEncoder, RgbImage};
use serde::Serialize;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::mailbox::FrameSubscriber;
use crate::inference::{PredictionResult, Predictor};
use crate::utils::{Result, WasteSortError};

const INDEX_HTML: &str = include_str!("page.html");

/// JPEG quality of streamed frames
const STREAM_JPEG_QUALITY: u8 = 80;

/// Everything the handlers share
pub struct AppState<B: Backend> {
    pub frames: FrameSubscriber,
    pub predictor: Arc<Mutex<Predictor<B>>>,
    pub capture_path: PathBuf,
    pub token: CancellationToken,
    started_at: Instant,
}

pub type SharedState<B> = Arc<AppState<B>>;

impl<B: Backend> AppState<B> {
    pub fn new(
        frames: FrameSubscriber,
        predictor: Predictor<B>,
        capture_path: PathBuf,
        token: CancellationToken,
    ) -> Self {
        Self {
            frames,
            predictor: Arc::new(Mutex::new(predictor)),
            capture_path,
            token,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Build the router with all camera routes
pub fn router<B: Backend>(state: SharedState<B>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health::<B>))
        .route("/stream", get(stream::<B>))
        .route("/capture", post(capture::<B>))
        .route("/predict", post(predict::<B>))
        .route("/shutdown", post(shutdown::<B>))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `addr` and serve until the token is cancelled or Ctrl-C arrives
pub async fn serve<B: Backend>(state: SharedState<B>, addr: SocketAddr) -> Result<()> {
    let token = state.token.clone();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Camera UI on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(token))
        .await?;
    Ok(())
}

async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        _ = token.cancelled() => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Ctrl-C received");
            token.cancel();
        }
    }
}

/// Encode a frame as JPEG bytes
pub fn encode_jpeg(frame: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(frame)?;
    Ok(buffer.into_inner())
}

/// Write a frame to `path` as JPEG
pub fn save_frame(frame: &RgbImage, path: &Path) -> Result<()> {
    frame
        .save_with_format(path, image::ImageFormat::Jpeg)
        .map_err(|e| WasteSortError::image_at(path, e))
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub has_frame: bool,
    pub classes: Vec<String>,
    pub version: String,
}

/// GET /health
async fn health<B: Backend>(State(state): State<SharedState<B>>) -> Json<HealthResponse> {
    let classes = state
        .predictor
        .lock()
        .map(|p| p.class_names().to_vec())
        .unwrap_or_default();

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        has_frame: state.frames.latest().is_some(),
        classes,
        version: crate::VERSION.to_string(),
    })
}

/// GET /stream - SSE stream of base64 JPEG frames, newest first
async fn stream<B: Backend>(
    State(state): State<SharedState<B>>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let frames = WatchStream::new(state.frames.receiver())
        .filter_map(|frame| {
            let event = frame.and_then(|frame| match encode_jpeg(&frame, STREAM_JPEG_QUALITY) {
                Ok(bytes) => Some(Ok(Event::default().event("frame").data(STANDARD.encode(bytes)))),
                Err(e) => {
                    warn!("Failed to encode frame: {}", e);
                    None
                }
            });
            future::ready(event)
        })
        .take_until(state.token.clone().cancelled_owned());

    Sse::new(frames).keep_alive(KeepAlive::default())
}

/// POST /capture - save the current frame
async fn capture<B: Backend>(State(state): State<SharedState<B>>) -> String {
    let Some(frame) = state.frames.latest() else {
        return "No frame".to_string();
    };

    let path = state.capture_path.clone();
    let saved = tokio::task::spawn_blocking(move || save_frame(&frame, &path)).await;
    match saved {
        Ok(Ok(())) => {
            info!("Saved capture to {}", state.capture_path.display());
            "Saved".to_string()
        }
        Ok(Err(e)) => format!("Save failed: {}", e),
        Err(e) => format!("Save failed: {}", e),
    }
}

/// POST /predict - classify the last saved capture
async fn predict<B: Backend>(State(state): State<SharedState<B>>) -> String {
    let predictor = state.predictor.clone();
    let path = state.capture_path.clone();

    let outcome = tokio::task::spawn_blocking(move || -> Result<PredictionResult> {
        let predictor = predictor
            .lock()
            .map_err(|_| WasteSortError::Inference("Predictor lock poisoned".to_string()))?;
        predictor.predict_path(&path)
    })
    .await;

    match outcome {
        Ok(Ok(result)) => {
            info!("Prediction: {} ({:.3})", result.label, result.confidence);
            format!("Prediction: {}", result.label)
        }
        Ok(Err(e)) => format!("Prediction failed: {}", e),
        Err(e) => format!("Prediction failed: {}", e),
    }
}

/// POST /shutdown - sent by the page when its window closes
async fn shutdown<B: Backend>(State(state): State<SharedState<B>>) -> &'static str {
    info!("Shutdown requested by client");
    state.token.cancel();
    "Stopping"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;
    use crate::camera::mailbox::{mailbox, FramePublisher};
    use crate::inference::predictor::tests::{labels, test_predictor};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use image::Rgb;
    use std::time::Duration;
    use tower::ServiceExt;

    type TestBackend = DefaultBackend;

    fn test_state(capture_path: PathBuf) -> (SharedState<TestBackend>, FramePublisher) {
        let (publisher, frames) = mailbox();
        let state = AppState::new(frames, test_predictor(), capture_path, CancellationToken::new());
        (Arc::new(state), publisher)
    }

    async fn call(state: &SharedState<TestBackend>, method: &str, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn frame() -> RgbImage {
        RgbImage::from_fn(48, 40, |x, y| Rgb([x as u8 * 4, y as u8 * 5, 120]))
    }

    #[tokio::test]
    async fn test_index_serves_page() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _publisher) = test_state(dir.path().join("capture.jpg"));

        let (status, body) = call(&state, "GET", "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("/stream"));
        assert!(body.contains("Capture"));
        assert!(body.contains("<h1>Waste Classification</h1>"));
    }

    #[tokio::test]
    async fn test_capture_without_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.jpg");
        let (state, _publisher) = test_state(path.clone());

        let (status, body) = call(&state, "POST", "/capture").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "No frame");
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_predict_before_capture_fails_softly() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _publisher) = test_state(dir.path().join("capture.jpg"));

        let (status, body) = call(&state, "POST", "/predict").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("Prediction failed"), "{}", body);
    }

    #[tokio::test]
    async fn test_capture_then_predict() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.jpg");
        let (state, publisher) = test_state(path.clone());
        publisher.publish(frame());

        let (_, body) = call(&state, "POST", "/capture").await;
        assert_eq!(body, "Saved");
        let saved = image::open(&path).unwrap();
        assert_eq!((saved.width(), saved.height()), (48, 40));

        let (_, body) = call(&state, "POST", "/predict").await;
        let label = body.strip_prefix("Prediction: ").expect("prediction text");
        assert!(labels().iter().any(|l| l == label), "{}", body);
    }

    #[tokio::test]
    async fn test_health_reports_frame_and_classes() {
        let dir = tempfile::tempdir().unwrap();
        let (state, publisher) = test_state(dir.path().join("capture.jpg"));

        let (_, body) = call(&state, "GET", "/health").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["has_frame"], false);
        assert_eq!(json["classes"].as_array().unwrap().len(), 4);

        publisher.publish(frame());
        let (_, body) = call(&state, "GET", "/health").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["has_frame"], true);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_token() {
        let dir = tempfile::tempdir().unwrap();
        let (state, _publisher) = test_state(dir.path().join("capture.jpg"));

        let (_, body) = call(&state, "POST", "/shutdown").await;
        assert_eq!(body, "Stopping");
        assert!(state.token.is_cancelled());
    }

    #[tokio::test]
    async fn test_stream_ends_after_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let (state, publisher) = test_state(dir.path().join("capture.jpg"));
        publisher.publish(frame());
        state.token.cancel();

        let (status, body) = call(&state, "GET", "/stream").await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.contains("event: frame"));
    }

    #[tokio::test]
    async fn test_stream_sends_latest_frame() {
        let dir = tempfile::tempdir().unwrap();
        let (state, publisher) = test_state(dir.path().join("capture.jpg"));
        publisher.publish(frame());

        let request = Request::builder().uri("/stream").body(Body::empty()).unwrap();
        let response = router(state.clone()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut body = response.into_body().into_data_stream();
        let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
            .await
            .expect("no frame within timeout")
            .expect("stream ended")
            .unwrap();
        let text = String::from_utf8(chunk.to_vec()).unwrap();
        assert!(text.starts_with("event: frame"), "{}", text);
        assert!(text.contains("data: /9j/"), "{}", text);

        state.token.cancel();
    }

    #[test]
    fn test_encode_jpeg_roundtrips_dimensions() {
        let bytes = encode_jpeg(&frame(), 80).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (48, 40));
    }
}
