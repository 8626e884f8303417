//! Capture loop: runs on a dedicated thread, grabs → transforms → encodes
//! frames and pushes them onto the frame queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::{FrameProducer, RunSignal};
use crate::capture::{DeviceHandle, FrameSource, Grab, SourceFactory};
use crate::config::PipelineConfig;
use crate::encode;
use crate::error::Result;

/// Pause before polling a source that reported "not ready".
const NOT_READY_BACKOFF: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureExit {
    /// Running flag was cleared.
    Stopped,
    /// The source ran dry or failed to produce a frame.
    EndOfStream,
    /// The sender side of the queue is gone.
    QueueClosed,
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureReport {
    pub frames: u64,
    pub exit: CaptureExit,
}

/// Frames-per-second over windows of at least `interval`.
pub struct ThroughputMeter {
    interval: Duration,
    window_start: Instant,
    count: u64,
}

impl ThroughputMeter {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            window_start: now,
            count: 0,
        }
    }

    /// Count one frame. Returns the rate once a full window has elapsed,
    /// then starts a new window.
    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        self.count += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return None;
        }
        let fps = self.count as f64 / elapsed.as_secs_f64();
        self.count = 0;
        self.window_start = now;
        Some(fps)
    }
}

/// Pull frames from `source` until the flag clears, the source ends, or
/// the queue closes.
///
/// Acquisition errors end the stream; encode errors are returned.
pub fn run_capture_loop(
    source: &mut dyn FrameSource,
    config: &PipelineConfig,
    running: &RunSignal,
    producer: &FrameProducer,
) -> Result<CaptureReport> {
    let mut meter = ThroughputMeter::new(config.report_interval, Instant::now());
    let mut frames = 0u64;
    let report = |frames: u64, exit: CaptureExit| -> Result<CaptureReport> {
        Ok(CaptureReport { frames, exit })
    };

    while running.is_running() {
        let raw = match source.grab() {
            Ok(Grab::Frame(raw)) => raw,
            Ok(Grab::NotReady) => {
                thread::sleep(NOT_READY_BACKOFF);
                continue;
            }
            Ok(Grab::End) => return report(frames, CaptureExit::EndOfStream),
            Err(e) => {
                warn!(source = %config.kind, "Capture read failed, ending stream: {}", e);
                return report(frames, CaptureExit::EndOfStream);
            }
        };

        if let Some(fps) = meter.tick(Instant::now()) {
            debug!(source = %config.kind, "FPS: {:.2}", fps);
        }

        let frame = encode::prepare(raw, config)?;
        if !producer.push(frame) {
            return report(frames, CaptureExit::QueueClosed);
        }
        frames += 1;
    }

    report(frames, CaptureExit::Stopped)
}

/// Releases the device and flags the exit when the capture thread unwinds,
/// whichever way it leaves.
struct WorkerCleanup {
    kind: &'static str,
    device: Option<DeviceHandle>,
    exited: Arc<AtomicBool>,
}

impl Drop for WorkerCleanup {
    fn drop(&mut self) {
        if let Some(device) = &self.device {
            if device.release() {
                info!(source = self.kind, "Device released by capture loop");
            }
        }
        self.exited.store(true, Ordering::SeqCst);
        debug!(source = self.kind, "Capture thread exited");
    }
}

/// The dedicated capture thread.
///
/// Teardown never joins it: [`CaptureWorker::detach`] drops the join
/// handle and the thread finishes its current iteration on its own.
pub struct CaptureWorker {
    thread: Option<thread::JoinHandle<()>>,
    exited: Arc<AtomicBool>,
}

impl CaptureWorker {
    pub fn spawn(
        factory: SourceFactory,
        device: Option<DeviceHandle>,
        config: PipelineConfig,
        running: RunSignal,
        producer: FrameProducer,
    ) -> Result<Self> {
        let exited = Arc::new(AtomicBool::new(false));
        let cleanup = WorkerCleanup {
            kind: config.kind.name(),
            device,
            exited: exited.clone(),
        };

        let thread = thread::Builder::new()
            .name(format!("{}-capture", config.kind))
            .spawn(move || {
                let _cleanup = cleanup;
                let mut source = match factory() {
                    Ok(source) => source,
                    Err(e) => {
                        warn!(source = %config.kind, "Failed to open capture source: {}", e);
                        return;
                    }
                };
                match run_capture_loop(source.as_mut(), &config, &running, &producer) {
                    Ok(report) => info!(
                        source = %config.kind,
                        frames = report.frames,
                        "Capture loop finished: {:?}",
                        report.exit
                    ),
                    Err(e) => warn!(source = %config.kind, "Capture loop aborted: {}", e),
                }
            })?;

        Ok(Self {
            thread: Some(thread),
            exited,
        })
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    /// Let the thread go without waiting for it.
    pub fn detach(&mut self) {
        self.thread.take();
    }
}
