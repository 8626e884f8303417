//! Capture → queue → sender pipeline for one connection.
//!
//! The capture loop runs on a dedicated OS thread and pushes encoded frames
//! into a [`FrameQueue`]; the sender loop drains the queue onto the socket
//! from a tokio task. [`Session`] owns both and tears them down.

pub mod capture_loop;
pub mod queue;
pub mod sender;
pub mod session;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use queue::{frame_queue, FrameProducer, FrameQueue};
pub use session::{DisconnectReason, Session};

/// Running flag owned by the session controller.
///
/// Single writer: only the holder of the `RunFlag` may start or stop the
/// pipeline. The loops get a read-only [`RunSignal`].
#[derive(Debug, Default)]
pub struct RunFlag(Arc<AtomicBool>);

impl RunFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn signal(&self) -> RunSignal {
        RunSignal(self.0.clone())
    }
}

/// Read-only view of a [`RunFlag`], handed to the capture and sender loops.
#[derive(Debug, Clone)]
pub struct RunSignal(Arc<AtomicBool>);

impl RunSignal {
    pub fn is_running(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
