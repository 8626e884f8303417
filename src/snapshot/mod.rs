//! One-shot capture: grab a single frame through the same
//! capture → transform → encode path the stream uses and write it to disk.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::info;

use crate::capture::{self, DeviceHandle, Grab, SourceFactory, SourceKind};
use crate::config::{PipelineConfig, StreamConfig};
use crate::encode::{self, Frame};
use crate::error::StreamError;

/// Give up if a source keeps reporting "not ready" for this long.
const GRAB_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the source, take the first frame, release the device.
pub fn capture_single(
    factory: SourceFactory,
    device: Option<DeviceHandle>,
    config: &PipelineConfig,
) -> crate::error::Result<Frame> {
    let result = grab_first(factory, config, GRAB_TIMEOUT);
    if let Some(device) = device {
        device.release();
    }
    result
}

fn grab_first(
    factory: SourceFactory,
    config: &PipelineConfig,
    timeout: Duration,
) -> crate::error::Result<Frame> {
    let mut source = factory()?;
    let deadline = Instant::now() + timeout;
    loop {
        match source.grab()? {
            Grab::Frame(raw) => return encode::prepare(raw, config),
            Grab::NotReady if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(5))
            }
            Grab::NotReady => {
                return Err(StreamError::device(format!(
                    "{} produced no frame within {:?}",
                    config.kind, timeout
                )))
            }
            Grab::End => {
                return Err(StreamError::device(format!(
                    "{} ended before producing a frame",
                    config.kind
                )))
            }
        }
    }
}

fn save_frame(path: &Path, frame: &Frame) -> Result<()> {
    std::fs::write(path, frame.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub async fn take_snapshot(kind: SourceKind, config: StreamConfig, output: PathBuf) -> Result<()> {
    config.validate()?;
    let pipeline = config.pipeline(kind);
    let (factory, device) = capture::open_source(kind, &config);

    let frame = tokio::task::spawn_blocking(move || capture_single(factory, device, &pipeline))
        .await
        .context("Capture thread failed")?
        .with_context(|| format!("Failed to capture from {}", kind))?;

    save_frame(&output, &frame)?;
    info!("Saved {} bytes to {}", frame.len(), output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::device::installing_factory;
    use crate::capture::testing::{solid_frame, ScriptedDevice};
    use crate::capture::{Device, FrameSource};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_capture_single_releases_device() {
        let config = PipelineConfig::for_kind(SourceKind::Camera);
        let (device, releases) =
            ScriptedDevice::new(vec![solid_frame(8, 8, 10), solid_frame(8, 8, 20)]);
        let handle = DeviceHandle::vacant();
        let factory =
            installing_factory(handle.clone(), move || Ok(Box::new(device) as Box<dyn Device>));

        let frame = capture_single(factory, Some(handle), &config).unwrap();
        let expected = encode::prepare(solid_frame(8, 8, 10), &config).unwrap();
        assert_eq!(frame, expected);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_capture_single_empty_source() {
        let config = PipelineConfig::for_kind(SourceKind::Camera);
        let (device, releases) = ScriptedDevice::new(vec![]);
        let handle = DeviceHandle::vacant();
        let factory =
            installing_factory(handle.clone(), move || Ok(Box::new(device) as Box<dyn Device>));

        assert!(matches!(
            capture_single(factory, Some(handle), &config),
            Err(StreamError::Device(_))
        ));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_capture_single_waits_for_ready_frame() {
        let config = PipelineConfig::for_kind(SourceKind::Screen);
        let (device, releases) =
            ScriptedDevice::steps(vec![Grab::NotReady, Grab::Frame(solid_frame(8, 8, 40))]);
        let handle = DeviceHandle::vacant();
        let factory =
            installing_factory(handle.clone(), move || Ok(Box::new(device) as Box<dyn Device>));

        let frame = capture_single(factory, Some(handle), &config).unwrap();
        let expected = encode::prepare(solid_frame(8, 8, 40), &config).unwrap();
        assert_eq!(frame, expected);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stalled_source_times_out() {
        let config = PipelineConfig::for_kind(SourceKind::Screen);
        let (device, _) = ScriptedDevice::stalled();
        let factory: SourceFactory = Box::new(move || {
            Ok(Box::new(DeviceHandle::new(Box::new(device))) as Box<dyn FrameSource>)
        });

        let started = Instant::now();
        let result = grab_first(factory, &config, Duration::from_millis(50));
        assert!(matches!(result, Err(StreamError::Device(_))));
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < GRAB_TIMEOUT);
    }

    #[test]
    fn test_save_frame_writes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        let frame = encode::encode_jpeg(&solid_frame(4, 4, 3), 80).unwrap();

        save_frame(&path, &frame).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), frame.as_bytes());
    }

    #[test]
    fn test_save_frame_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("frame.jpg");
        let frame = Frame::from(vec![0xFF, 0xD8]);
        assert!(save_frame(&path, &frame).is_err());
    }
}
