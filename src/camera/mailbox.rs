//! Single-slot, latest-wins frame mailbox
//!
//! The capture thread overwrites the slot with every new frame and never
//! blocks; readers peek at the current frame or stream changes through
//! [`FrameSubscriber::receiver`]. A slow reader skips intermediate frames.

use std::sync::Arc;

use image::RgbImage;
use tokio::sync::watch;

/// Shared, immutable camera frame
pub type Frame = Arc<RgbImage>;

/// Create an empty mailbox
pub fn mailbox() -> (FramePublisher, FrameSubscriber) {
    let (tx, rx) = watch::channel(None);
    (FramePublisher { tx }, FrameSubscriber { rx })
}

/// Writing end, owned by the capture thread
#[derive(Debug)]
pub struct FramePublisher {
    tx: watch::Sender<Option<Frame>>,
}

impl FramePublisher {
    /// Replace the current frame; succeeds even with no readers
    pub fn publish(&self, frame: RgbImage) {
        self.tx.send_replace(Some(Arc::new(frame)));
    }
}

/// Reading end; cheap to clone
#[derive(Debug, Clone)]
pub struct FrameSubscriber {
    rx: watch::Receiver<Option<Frame>>,
}

impl FrameSubscriber {
    /// Most recent frame, if any has been captured yet
    pub fn latest(&self) -> Option<Frame> {
        self.rx.borrow().clone()
    }

    /// Underlying receiver, for stream adapters
    pub fn receiver(&self) -> watch::Receiver<Option<Frame>> {
        self.rx.clone()
    }
}
