use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, info, warn};

use crate::capture::{self, DeviceHandle, SourceFactory, SourceKind};
use crate::config::StreamConfig;
use crate::stream::{DisconnectReason, Session};

/// How long shutdown waits for live sessions to finish tearing down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Builds the capture source for a freshly routed connection.
pub type SourceOpener =
    dyn Fn(SourceKind, &StreamConfig) -> (SourceFactory, Option<DeviceHandle>) + Send + Sync;

/// WebSocket server: one capture session per connection.
/// - `/ws/camera/` streams the camera
/// - `/ws/screen/` streams the primary display
pub struct StreamServer {
    config: Arc<StreamConfig>,
    opener: Arc<SourceOpener>,
}

impl StreamServer {
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config: Arc::new(config),
            opener: Arc::new(capture::open_source),
        }
    }

    #[cfg(test)]
    pub fn with_opener(config: StreamConfig, opener: Arc<SourceOpener>) -> Self {
        Self {
            config: Arc::new(config),
            opener,
        }
    }

    /// Accept connections until `shutdown` resolves, then stop every live
    /// session.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.addr)
            .await
            .with_context(|| format!("Failed to bind {}", self.config.addr))?;
        info!("Listening on: {}", listener.local_addr()?);
        for kind in [SourceKind::Camera, SourceKind::Screen] {
            info!("{} stream at ws://{}{}", kind, self.config.addr, kind.endpoint());
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut sessions = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => accepted?,
                _ = &mut shutdown => break,
            };

            // Reap sessions that already ended
            while sessions.try_join_next().is_some() {}

            let config = self.config.clone();
            let opener = self.opener.clone();
            let stop_rx = stop_rx.clone();
            sessions.spawn(async move {
                if let Err(e) = handle_connection(stream, peer, config, opener, stop_rx).await {
                    log_connection_error(peer, &e);
                }
            });
        }

        info!("Shutting down, closing {} session(s)", sessions.len());
        let _ = stop_tx.send(true);
        let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!("Sessions still closing after {:?}, aborting them", SHUTDOWN_GRACE);
            sessions.shutdown().await;
        }
        Ok(())
    }
}

/// Handshakes refused because the path has no stream behind it.
fn is_unknown_route(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<WsError>(),
        Some(WsError::Http(response)) if response.status() == StatusCode::NOT_FOUND
    )
}

fn log_connection_error(peer: SocketAddr, err: &anyhow::Error) {
    if is_unknown_route(err) {
        debug!(%peer, "Rejected handshake for unknown path");
        return;
    }
    let err_str = err.to_string();
    // Silently ignore non-WebSocket connections (bots/scanners)
    if !err_str.contains("Connection: upgrade") && !err_str.contains("protocol error") {
        warn!(%peer, "Connection error: {:#}", err);
    }
}

fn not_found(path: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(format!("no stream at {}", path)));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<StreamConfig>,
    opener: Arc<SourceOpener>,
    mut stop_rx: watch::Receiver<bool>,
) -> Result<()> {
    let mut route = None;
    let ws_stream = accept_hdr_async(stream, |request: &Request, response: Response| {
        match SourceKind::from_path(request.uri().path()) {
            Some(kind) => {
                route = Some(kind);
                Ok(response)
            }
            None => Err(not_found(request.uri().path())),
        }
    })
    .await?;
    let kind = route.context("handshake accepted without a route")?;

    info!(%peer, "{} stream connected", kind);
    let (ws_sender, mut ws_receiver) = ws_stream.split();

    let (factory, device) = opener(kind, config.as_ref());
    let mut session = Session::new(config.pipeline(kind));
    session.start(factory, device, ws_sender)?;

    let reason = loop {
        tokio::select! {
            msg = ws_receiver.next() => match msg {
                Some(Ok(WsMessage::Close(_))) | None => break DisconnectReason::ClientClosed,
                Some(Err(e)) => break DisconnectReason::Network(e.to_string()),
                // Clients have nothing to say on this channel
                Some(Ok(_)) => debug!(%peer, "Ignoring client message"),
            },
            outcome = session.sender_finished() => match outcome {
                Err(e) => break DisconnectReason::SendFailed(e.to_string()),
                Ok(report) => {
                    debug!(%peer, frames = report.frames_sent, "Sender stopped");
                    break DisconnectReason::ClientClosed;
                }
            },
            _ = stop_rx.changed() => break DisconnectReason::ServerShutdown,
        }
    };

    session.stop(reason).await;
    info!(
        %peer,
        capture_exited = session.worker_exited(),
        state = ?session.state(),
        "{} stream disconnected",
        kind
    );
    Ok(())
}

pub async fn start_server(config: StreamConfig) -> Result<()> {
    let server = StreamServer::new(config);
    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
