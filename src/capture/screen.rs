//! Primary-display grabbing.
//!
//! scrap's `Capturer` is not `Send` on X11, so it is created by
//! [`open_primary`] on the capture thread and never leaves it.

use super::{FrameSource, RawImage};
use crate::error::{Result, StreamError};

#[cfg(feature = "screen")]
pub use grabber::ScreenSource;

#[cfg(feature = "screen")]
mod grabber {
    use scrap::{Capturer, Display};
    use std::io::ErrorKind;

    use super::bgra_to_rgb;
    use crate::capture::{FrameSource, Grab};
    use crate::error::{Result, StreamError};

    pub struct ScreenSource {
        capturer: Capturer,
        width: usize,
        height: usize,
    }

    impl ScreenSource {
        pub fn primary() -> Result<Self> {
            let display = Display::primary()
                .map_err(|e| StreamError::device(format!("No display found: {}", e)))?;
            let width = display.width();
            let height = display.height();
            let capturer = Capturer::new(display).map_err(|e| {
                StreamError::device(format!("Screen capture failed to start: {}", e))
            })?;
            Ok(Self {
                capturer,
                width,
                height,
            })
        }
    }

    impl FrameSource for ScreenSource {
        fn grab(&mut self) -> Result<Grab> {
            match self.capturer.frame() {
                Ok(frame) => {
                    // scrap gives us BGRA pixels (stride may include padding)
                    let stride = frame.len() / self.height.max(1);
                    bgra_to_rgb(&frame, self.width, self.height, stride).map(Grab::Frame)
                }
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => Ok(Grab::NotReady),
                Err(e) => Err(StreamError::device(format!("Screen grab failed: {}", e))),
            }
        }
    }
}

/// Open the primary display. Runs on the capture thread.
#[cfg(feature = "screen")]
pub fn open_primary() -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(ScreenSource::primary()?))
}

#[cfg(not(feature = "screen"))]
pub fn open_primary() -> Result<Box<dyn FrameSource>> {
    Err(StreamError::unsupported(
        "screen capture not compiled in (enable the `screen` feature)",
    ))
}

/// Convert a BGRA buffer (rows `stride` bytes apart) to an RGB image.
#[cfg_attr(not(feature = "screen"), allow(dead_code))]
pub fn bgra_to_rgb(bgra: &[u8], width: usize, height: usize, stride: usize) -> Result<RawImage> {
    if stride < width * 4 || bgra.len() < stride * height.saturating_sub(1) + width * 4 {
        return Err(StreamError::device(format!(
            "short BGRA buffer: {} bytes for {}x{} (stride {})",
            bgra.len(),
            width,
            height,
            stride
        )));
    }

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in bgra.chunks(stride).take(height) {
        for px in row[..width * 4].chunks_exact(4) {
            rgb.extend_from_slice(&[px[2], px[1], px[0]]);
        }
    }

    RawImage::from_raw(width as u32, height as u32, rgb)
        .ok_or_else(|| StreamError::device("Invalid image dimensions"))
}
