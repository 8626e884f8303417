//! Camera capture.
//!
//! - V4L2 devices (feature: camera, Linux only)
//!
//! Frames are requested as MJPG from the driver and decoded to RGB so the
//! pipeline can mirror them before re-encoding at the session's quality.

use super::Device;
use crate::error::Result;

#[cfg(all(feature = "camera", target_os = "linux"))]
pub use v4l2::V4l2Camera;

/// Open camera `/dev/video<index>`. Runs on the capture thread.
#[cfg(all(feature = "camera", target_os = "linux"))]
pub fn open(index: usize) -> Result<Box<dyn Device>> {
    Ok(Box::new(V4l2Camera::open(index)?))
}

#[cfg(not(all(feature = "camera", target_os = "linux")))]
pub fn open(index: usize) -> Result<Box<dyn Device>> {
    Err(crate::error::StreamError::unsupported(format!(
        "camera {} unavailable: build with the `camera` feature on Linux",
        index
    )))
}

#[cfg(all(feature = "camera", target_os = "linux"))]
mod v4l2 {
    use image::ImageFormat;
    use tracing::{debug, info};
    use v4l::buffer::Type;
    use v4l::io::mmap::Stream;
    use v4l::io::traits::CaptureStream;
    use v4l::video::Capture;
    use v4l::FourCC;

    use crate::capture::{Device, Grab};
    use crate::error::{Result, StreamError};

    const BUFFER_COUNT: u32 = 4;

    pub struct V4l2Camera {
        index: usize,
        stream: Option<Stream<'static>>,
        _device: v4l::Device,
    }

    impl V4l2Camera {
        pub fn open(index: usize) -> Result<Self> {
            let device = v4l::Device::new(index).map_err(|e| {
                StreamError::device(format!("cannot open /dev/video{}: {}", index, e))
            })?;

            let mut format = device.format()?;
            format.fourcc = FourCC::new(b"MJPG");
            let format = device.set_format(&format)?;
            if format.fourcc != FourCC::new(b"MJPG") {
                return Err(StreamError::unsupported(format!(
                    "/dev/video{} does not offer MJPG (got {})",
                    index, format.fourcc
                )));
            }

            let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)?;
            info!(
                "Camera /dev/video{} opened at {}x{}",
                index, format.width, format.height
            );

            Ok(Self {
                index,
                stream: Some(stream),
                _device: device,
            })
        }
    }

    impl Device for V4l2Camera {
        fn read_frame(&mut self) -> Result<Grab> {
            let Some(stream) = self.stream.as_mut() else {
                return Ok(Grab::End);
            };
            let (buf, meta) = stream.next()?;
            let used = (meta.bytesused as usize).min(buf.len());
            if used == 0 {
                debug!("camera returned an empty buffer");
                return Ok(Grab::End);
            }
            let image = image::load_from_memory_with_format(&buf[..used], ImageFormat::Jpeg)
                .map_err(|e| StreamError::device(format!("bad MJPG frame: {}", e)))?;
            Ok(Grab::Frame(image.to_rgb8()))
        }

        fn release(&mut self) {
            // Dropping the stream stops streaming and unmaps the buffers
            if self.stream.take().is_some() {
                info!("Camera /dev/video{} released", self.index);
            }
        }
    }
}
