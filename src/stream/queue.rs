//! Handoff buffer between the capture thread and the sender task.
//!
//! `UnboundedSender::send` is safe to call from a plain OS thread and wakes
//! the receiving task on its own runtime, so the capture thread never touches
//! the scheduler directly.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::encode::Frame;

/// Create a connected producer/consumer pair.
pub fn frame_queue() -> (FrameProducer, FrameQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (FrameProducer { tx }, FrameQueue { rx })
}

/// Producer half, owned by the capture thread. Not `Clone`: one producer.
pub struct FrameProducer {
    tx: mpsc::UnboundedSender<Frame>,
}

impl FrameProducer {
    /// Queue a frame. Returns `false` once the consumer is gone.
    pub fn push(&self, frame: Frame) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Consumer half, owned by the sender task.
pub struct FrameQueue {
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl FrameQueue {
    /// Wait up to `wait` for the next frame.
    ///
    /// `None` means nothing arrived in time. A finished producer looks the
    /// same as an idle one: the call still waits out the full window, so a
    /// caller looping on this never spins.
    pub async fn next_within(&mut self, wait: Duration) -> Option<Frame> {
        let next = async {
            match self.rx.recv().await {
                Some(frame) => frame,
                None => std::future::pending().await,
            }
        };
        tokio::time::timeout(wait, next).await.ok()
    }

    #[cfg(test)]
    pub fn try_next(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}
