//! Shared handle to a capture device with idempotent release.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{FrameSource, Grab, SourceFactory};
use crate::error::Result;

/// A handle-based capture device (e.g. a camera).
pub trait Device: Send {
    fn read_frame(&mut self) -> Result<Grab>;

    /// Give the device back to the OS. Called at most once per device.
    fn release(&mut self);
}

/// Cloneable handle shared by the capture thread (reads) and the session
/// controller (release only).
///
/// The device may be installed after the handle exists: the capture thread
/// opens it, while the controller may already be tearing down. Whichever
/// side finds the device in the slot first performs the release; every
/// other call is a no-op.
#[derive(Clone)]
pub struct DeviceHandle {
    slot: Arc<Slot>,
}

struct Slot {
    device: Mutex<Option<Box<dyn Device>>>,
    release_requested: AtomicBool,
    released: AtomicBool,
}

impl Slot {
    fn finish(&self, device: &mut Box<dyn Device>) {
        device.release();
        self.released.store(true, Ordering::SeqCst);
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if let Some(mut device) = self.device.get_mut().take() {
            device.release();
            *self.released.get_mut() = true;
        }
    }
}

impl DeviceHandle {
    /// A handle with no device yet.
    pub fn vacant() -> Self {
        Self {
            slot: Arc::new(Slot {
                device: Mutex::new(None),
                release_requested: AtomicBool::new(false),
                released: AtomicBool::new(false),
            }),
        }
    }

    #[cfg(test)]
    pub fn new(device: Box<dyn Device>) -> Self {
        let handle = Self::vacant();
        handle.install(device);
        handle
    }

    /// Put an opened device into the handle. If release was already
    /// requested, the device is released immediately and `false` is returned.
    pub fn install(&self, mut device: Box<dyn Device>) -> bool {
        let mut slot = self.slot.device.lock();
        if self.slot.release_requested.load(Ordering::SeqCst) || slot.is_some() {
            drop(slot);
            self.slot.finish(&mut device);
            return false;
        }
        *slot = Some(device);
        true
    }

    pub fn read_frame(&self) -> Result<Grab> {
        if self.slot.release_requested.load(Ordering::SeqCst) {
            return Ok(Grab::End);
        }
        let mut slot = self.slot.device.lock();
        match slot.as_mut() {
            Some(device) => device.read_frame(),
            None => Ok(Grab::End),
        }
    }

    /// Release the device. Safe to call any number of times from any thread.
    ///
    /// Returns `true` only for the call that actually released it. If the
    /// capture thread is mid-read, this only marks the release; the capture
    /// thread performs it once the read returns.
    pub fn release(&self) -> bool {
        self.slot.release_requested.store(true, Ordering::SeqCst);
        let Some(mut slot) = self.slot.device.try_lock() else {
            debug!("device busy, release deferred to capture thread");
            return false;
        };
        match slot.take() {
            Some(mut device) => {
                drop(slot);
                self.slot.finish(&mut device);
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        self.slot.released.load(Ordering::SeqCst)
    }
}

impl FrameSource for DeviceHandle {
    fn grab(&mut self) -> Result<Grab> {
        self.read_frame()
    }
}

/// Factory that opens a device on the capture thread and installs it into
/// `handle`. The capture loop then reads through the handle.
pub fn installing_factory<F>(handle: DeviceHandle, open: F) -> SourceFactory
where
    F: FnOnce() -> Result<Box<dyn Device>> + Send + 'static,
{
    Box::new(move || {
        let device = open()?;
        handle.install(device);
        Ok(Box::new(handle) as Box<dyn FrameSource>)
    })
}
