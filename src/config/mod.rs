use std::time::Duration;

use crate::capture::SourceKind;
use crate::error::{Result, StreamError};

/// JPEG quality for camera frames (1-100).
pub const CAMERA_JPEG_QUALITY: u8 = 80;
/// JPEG quality for screen frames. Screen payloads are larger, so this
/// trades some sharpness for throughput.
pub const SCREEN_JPEG_QUALITY: u8 = 70;
/// How long the sender waits on an empty queue before re-checking the running flag.
pub const QUEUE_WAIT: Duration = Duration::from_secs(1);
/// Minimum interval between throughput reports from the capture loop.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Server-wide settings, built from the command line.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub addr: String,
    pub camera_index: usize,
    pub camera_quality: u8,
    pub screen_quality: u8,
    pub mirror_camera: bool,
    pub queue_wait: Duration,
    pub report_interval: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8000".to_string(),
            camera_index: 0,
            camera_quality: CAMERA_JPEG_QUALITY,
            screen_quality: SCREEN_JPEG_QUALITY,
            mirror_camera: true,
            queue_wait: QUEUE_WAIT,
            report_interval: REPORT_INTERVAL,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, quality) in [
            ("camera", self.camera_quality),
            ("screen", self.screen_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(StreamError::config(format!(
                    "{} JPEG quality must be within 1-100, got {}",
                    name, quality
                )));
            }
        }
        if self.queue_wait.is_zero() {
            return Err(StreamError::config("queue wait must be non-zero"));
        }
        if self.report_interval.is_zero() {
            return Err(StreamError::config("report interval must be non-zero"));
        }
        Ok(())
    }

    /// Per-session settings for one capture source.
    pub fn pipeline(&self, kind: SourceKind) -> PipelineConfig {
        let (quality, mirror) = match kind {
            SourceKind::Camera => (self.camera_quality, self.mirror_camera),
            SourceKind::Screen => (self.screen_quality, false),
        };
        PipelineConfig {
            kind,
            quality,
            mirror,
            queue_wait: self.queue_wait,
            report_interval: self.report_interval,
        }
    }
}

/// Settings one session's capture and sender loops run with.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub kind: SourceKind,
    pub quality: u8,
    /// Flip frames horizontally before encoding (selfie view).
    pub mirror: bool,
    pub queue_wait: Duration,
    pub report_interval: Duration,
}

impl PipelineConfig {
    #[cfg(test)]
    pub fn for_kind(kind: SourceKind) -> Self {
        StreamConfig::default().pipeline(kind)
    }
}
