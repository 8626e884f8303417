//! Frame transform and JPEG compression.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops;

use crate::capture::RawImage;
use crate::config::PipelineConfig;
use crate::error::{Result, StreamError};

/// One encoded JPEG image, sent to the client as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(Vec<u8>);

impl Frame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// JPEG encode an RGB image at `quality` (1-100).
pub fn encode_jpeg(image: &RawImage, quality: u8) -> Result<Frame> {
    if image.width() == 0 || image.height() == 0 {
        return Err(StreamError::encode("cannot encode an empty image"));
    }

    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|e| StreamError::encode(format!("JPEG encode failed: {}", e)))?;

    Ok(Frame(buf.into_inner()))
}

/// Apply the pipeline's transform, then encode at its quality.
pub fn prepare(mut image: RawImage, config: &PipelineConfig) -> Result<Frame> {
    if config.mirror {
        imageops::flip_horizontal_in_place(&mut image);
    }
    encode_jpeg(&image, config.quality)
}
