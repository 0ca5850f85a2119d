//! Capture thread
//!
//! Opens a [`FrameSource`] on a dedicated OS thread and keeps publishing its
//! frames into the mailbox until the cancellation token fires. The source is
//! dropped (and the device released) on that same thread before it exits.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::mailbox::FramePublisher;
use super::source::FrameSource;
use crate::utils::{Result, WasteSortError};

/// Boxed source, created on the capture thread
pub type BoxedSource = Box<dyn FrameSource>;

/// Tuning for the capture loop
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Pause after a failed read before trying again
    pub error_backoff: Duration,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            error_backoff: Duration::from_millis(30),
        }
    }
}

/// Counters returned when the capture thread exits
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureReport {
    pub frames: u64,
    pub read_errors: u64,
}

/// Running capture thread
pub struct CaptureHandle {
    token: CancellationToken,
    source_name: String,
    thread: Option<JoinHandle<CaptureReport>>,
}

impl CaptureHandle {
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Cancel the loop and wait for the thread to release the source
    pub fn shutdown(mut self) -> Result<CaptureReport> {
        self.token.cancel();
        self.join_inner()
    }

    fn join_inner(&mut self) -> Result<CaptureReport> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| WasteSortError::Camera("Capture thread panicked".to_string())),
            None => Ok(CaptureReport::default()),
        }
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.token.cancel();
            if let Err(e) = self.join_inner() {
                warn!("{}", e);
            }
        }
    }
}

/// Start the capture thread
///
/// `open` runs on the new thread. This call blocks until it has returned so
/// that a missing camera is reported to the caller instead of being logged
/// from the background.
pub fn spawn_capture<F>(
    open: F,
    publisher: FramePublisher,
    token: CancellationToken,
    settings: CaptureSettings,
) -> Result<CaptureHandle>
where
    F: FnOnce() -> Result<BoxedSource> + Send + 'static,
{
    let (ready_tx, ready_rx) = mpsc::channel::<Result<String>>();
    let loop_token = token.clone();

    let thread = thread::Builder::new()
        .name("camera-capture".to_string())
        .spawn(move || {
            let source = match open() {
                Ok(source) => {
                    let _ = ready_tx.send(Ok(source.name()));
                    source
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return CaptureReport::default();
                }
            };
            capture_loop(source, &publisher, &loop_token, &settings)
        })?;

    let source_name = match ready_rx.recv() {
        Ok(Ok(name)) => name,
        Ok(Err(e)) => {
            let _ = thread.join();
            return Err(e);
        }
        Err(_) => {
            let _ = thread.join();
            return Err(WasteSortError::Camera(
                "Capture thread exited before opening the source".to_string(),
            ));
        }
    };

    info!("Capturing from {}", source_name);
    Ok(CaptureHandle {
        token,
        source_name,
        thread: Some(thread),
    })
}

fn capture_loop(
    mut source: BoxedSource,
    publisher: &FramePublisher,
    token: &CancellationToken,
    settings: &CaptureSettings,
) -> CaptureReport {
    let mut report = CaptureReport::default();

    while !token.is_cancelled() {
        match source.next_frame() {
            Ok(frame) => {
                publisher.publish(frame);
                report.frames += 1;
            }
            Err(e) => {
                report.read_errors += 1;
                warn!("Frame read failed: {}", e);
                thread::sleep(settings.error_backoff);
            }
        }
    }

    let name = source.name();
    drop(source);
    info!("Released {}", name);
    debug!(
        "Capture stopped after {} frames ({} read errors)",
        report.frames, report.read_errors
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mailbox::mailbox;
    use image::{Rgb, RgbImage};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    /// Counts frames, fails every `fail_every`-th read and flags its release
    struct ScriptedSource {
        count: u8,
        fail_every: Option<u8>,
        released: Arc<AtomicBool>,
    }

    impl FrameSource for ScriptedSource {
        fn name(&self) -> String {
            "scripted".to_string()
        }

        fn next_frame(&mut self) -> Result<RgbImage> {
            self.count = self.count.wrapping_add(1);
            thread::sleep(Duration::from_millis(2));
            if let Some(n) = self.fail_every {
                if self.count % n == 0 {
                    return Err(WasteSortError::Camera("dropped frame".to_string()));
                }
            }
            Ok(RgbImage::from_pixel(4, 4, Rgb([self.count, 0, 0])))
        }
    }

    impl Drop for ScriptedSource {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn scripted(fail_every: Option<u8>) -> (impl FnOnce() -> Result<BoxedSource> + Send, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let open = move || -> Result<BoxedSource> {
            Ok(Box::new(ScriptedSource {
                count: 0,
                fail_every,
                released: flag,
            }))
        };
        (open, released)
    }

    fn wait_for_frame(subscriber: &crate::camera::FrameSubscriber) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while subscriber.latest().is_none() {
            assert!(Instant::now() < deadline, "no frame published");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_publishes_and_releases_on_cancel() {
        let (publisher, subscriber) = mailbox();
        let token = CancellationToken::new();
        let (open, released) = scripted(None);

        let handle = spawn_capture(open, publisher, token.clone(), CaptureSettings::default()).unwrap();
        assert_eq!(handle.source_name(), "scripted");
        wait_for_frame(&subscriber);
        assert!(!released.load(Ordering::SeqCst));

        let report = handle.shutdown().unwrap();
        assert!(token.is_cancelled());
        assert!(report.frames > 0);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_external_cancel_stops_loop() {
        let (publisher, subscriber) = mailbox();
        let token = CancellationToken::new();
        let (open, released) = scripted(None);

        let handle = spawn_capture(open, publisher, token.clone(), CaptureSettings::default()).unwrap();
        wait_for_frame(&subscriber);
        token.cancel();

        let deadline = Instant::now() + Duration::from_secs(5);
        while !handle.is_finished() {
            assert!(Instant::now() < deadline, "capture thread did not stop");
            thread::sleep(Duration::from_millis(5));
        }
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_read_errors_are_skipped() {
        let (publisher, subscriber) = mailbox();
        let token = CancellationToken::new();
        let (open, _released) = scripted(Some(2));
        let settings = CaptureSettings {
            error_backoff: Duration::from_millis(1),
        };

        let handle = spawn_capture(open, publisher, token, settings).unwrap();
        wait_for_frame(&subscriber);
        thread::sleep(Duration::from_millis(30));

        let report = handle.shutdown().unwrap();
        assert!(report.frames > 0);
        assert!(report.read_errors > 0);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let (publisher, _subscriber) = mailbox();
        let open = || -> Result<BoxedSource> { Err(WasteSortError::Camera("no device".to_string())) };

        let result = spawn_capture(open, publisher, CancellationToken::new(), CaptureSettings::default());
        assert!(matches!(result, Err(WasteSortError::Camera(_))));
    }
}
