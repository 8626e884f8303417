//! Session controller: one per accepted connection.
//!
//! ```text
//! Idle --start--> Connected --stop--> Disconnecting --> Terminated
//! ```

use std::fmt;

use futures_util::Sink;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::capture_loop::CaptureWorker;
use super::sender::{run_sender, SenderReport};
use super::{frame_queue, RunFlag};
use crate::capture::{DeviceHandle, SourceFactory};
use crate::config::PipelineConfig;
use crate::error::{Result, StreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    Disconnecting,
    Terminated,
}

/// Why a session is being torn down. Only logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    ClientClosed,
    Network(String),
    SendFailed(String),
    ServerShutdown,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ClientClosed => write!(f, "client closed"),
            DisconnectReason::Network(e) => write!(f, "network error: {}", e),
            DisconnectReason::SendFailed(e) => write!(f, "send failed: {}", e),
            DisconnectReason::ServerShutdown => write!(f, "server shutdown"),
        }
    }
}

pub struct Session {
    config: PipelineConfig,
    state: SessionState,
    running: RunFlag,
    device: Option<DeviceHandle>,
    worker: Option<CaptureWorker>,
    sender: Option<JoinHandle<Result<SenderReport>>>,
}

impl Session {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            state: SessionState::Idle,
            running: RunFlag::new(),
            device: None,
            worker: None,
            sender: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.running.is_running()
    }

    /// Start capturing into `sink`: spawns the capture thread and the
    /// sender task. Must be called from within a tokio runtime.
    pub fn start<S>(
        &mut self,
        factory: SourceFactory,
        device: Option<DeviceHandle>,
        sink: S,
    ) -> Result<()>
    where
        S: Sink<WsMessage> + Unpin + Send + 'static,
        StreamError: From<S::Error>,
    {
        if self.state != SessionState::Idle {
            return Err(StreamError::session(format!(
                "cannot start a session in state {:?}",
                self.state
            )));
        }

        let (producer, queue) = frame_queue();
        self.device = device.clone();
        self.running.start();

        let worker = CaptureWorker::spawn(
            factory,
            device,
            self.config.clone(),
            self.running.signal(),
            producer,
        );
        let worker = match worker {
            Ok(worker) => worker,
            Err(e) => {
                self.running.stop();
                self.shutdown();
                return Err(e);
            }
        };
        self.worker = Some(worker);

        self.sender = Some(tokio::spawn(run_sender(
            queue,
            sink,
            self.running.signal(),
            self.config.queue_wait,
        )));

        self.state = SessionState::Connected;
        info!(source = %self.config.kind, "Session started");
        Ok(())
    }

    /// Resolves when the sender task ends on its own, i.e. a write failed.
    /// Pending forever if there is no sender task.
    pub async fn sender_finished(&mut self) -> Result<SenderReport> {
        let Some(sender) = self.sender.as_mut() else {
            return std::future::pending().await;
        };
        let outcome = sender.await;
        self.sender = None;
        outcome.map_err(|e| StreamError::session(format!("sender task failed: {}", e)))?
    }

    /// Tear the session down. A no-op once terminated.
    pub async fn stop(&mut self, reason: DisconnectReason) {
        match self.state {
            SessionState::Connected => {}
            SessionState::Idle => {
                self.state = SessionState::Terminated;
                return;
            }
            SessionState::Disconnecting | SessionState::Terminated => return,
        }

        self.state = SessionState::Disconnecting;
        info!(source = %self.config.kind, "Disconnecting: {}", reason);
        self.running.stop();

        if let Some(sender) = self.sender.take() {
            sender.abort();
            match sender.await {
                Ok(Ok(report)) => debug!(
                    frames = report.frames_sent,
                    idle = report.idle_waits,
                    "Sender finished before cancellation"
                ),
                Ok(Err(e)) => warn!("Sender ended with error: {}", e),
                Err(e) if e.is_cancelled() => debug!("Sender cancelled"),
                Err(e) => warn!("Sender task failed: {}", e),
            }
        }

        self.shutdown();
    }

    /// Release the device if the capture loop hasn't, let the capture thread
    /// go without joining it, and mark the session terminated.
    fn shutdown(&mut self) {
        if let Some(device) = &self.device {
            if device.release() {
                info!(source = %self.config.kind, "Device released in shutdown");
            } else if !device.is_released() {
                debug!(source = %self.config.kind, "Device release left to the capture thread");
            }
        }
        if let Some(worker) = self.worker.as_mut() {
            worker.detach();
        }
        self.state = SessionState::Terminated;
        info!(source = %self.config.kind, "Stream disconnected");
    }

    pub fn worker_exited(&self) -> bool {
        self.worker.as_ref().map_or(true, CaptureWorker::has_exited)
    }

    #[cfg(test)]
    pub fn sender_active(&self) -> bool {
        self.sender.as_ref().is_some_and(|s| !s.is_finished())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if matches!(
            self.state,
            SessionState::Connected | SessionState::Disconnecting
        ) {
            self.running.stop();
            if let Some(sender) = self.sender.take() {
                sender.abort();
            }
            self.shutdown();
        }
    }
}
