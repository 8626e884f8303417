//! Capture sources.
//!
//! A source hands out raw RGB frames one at a time. Camera sources sit behind
//! a shared [`DeviceHandle`] so the session can release the device from
//! outside the capture thread; screen grabbers are created on the capture
//! thread itself because the platform grabber is not `Send`.

pub mod camera;
pub mod device;
pub mod screen;

#[cfg(test)]
pub mod testing;

use std::fmt;

use image::RgbImage;

use crate::config::StreamConfig;
use crate::error::Result;

pub use device::{Device, DeviceHandle};

/// One raw, uncompressed frame.
pub type RawImage = RgbImage;

/// Outcome of a single acquisition attempt.
pub enum Grab {
    Frame(RawImage),
    /// Nothing new yet (the screen has not changed); poll again.
    NotReady,
    /// The source has no more frames.
    End,
}

pub trait FrameSource {
    /// Block until the next frame is available (or the source reports it is
    /// not ready / exhausted).
    fn grab(&mut self) -> Result<Grab>;
}

/// Opens a frame source. Called once, on the capture thread.
pub type SourceFactory = Box<dyn FnOnce() -> Result<Box<dyn FrameSource>> + Send>;

/// Which pipeline a connection asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum SourceKind {
    Camera,
    Screen,
}

impl SourceKind {
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::Camera => "camera",
            SourceKind::Screen => "screen",
        }
    }

    /// WebSocket endpoint serving this source.
    pub fn endpoint(&self) -> &'static str {
        match self {
            SourceKind::Camera => "/ws/camera/",
            SourceKind::Screen => "/ws/screen/",
        }
    }

    /// Resolve a request path; the trailing slash is optional.
    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.trim_end_matches('/');
        [SourceKind::Camera, SourceKind::Screen]
            .into_iter()
            .find(|kind| kind.endpoint().trim_end_matches('/') == trimmed)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the source for one session.
///
/// Nothing is opened here: the returned factory opens the device on the
/// capture thread. For the camera, the handle is returned as well so the
/// session can release it during teardown.
pub fn open_source(
    kind: SourceKind,
    config: &StreamConfig,
) -> (SourceFactory, Option<DeviceHandle>) {
    match kind {
        SourceKind::Camera => {
            let handle = DeviceHandle::vacant();
            let index = config.camera_index;
            let factory = device::installing_factory(handle.clone(), move || camera::open(index));
            (factory, Some(handle))
        }
        SourceKind::Screen => {
            let factory: SourceFactory = Box::new(screen::open_primary);
            (factory, None)
        }
    }
}
