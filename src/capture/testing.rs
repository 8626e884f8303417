//! Test doubles for capture sources and outbound connections.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::Sink;
use image::Rgb;
use parking_lot::Mutex;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};

use super::{Device, Grab, RawImage};
use crate::error::{Result, StreamError};

/// Solid-colour frame; `value` makes frames distinguishable.
pub fn solid_frame(width: u32, height: u32, value: u8) -> RawImage {
    RawImage::from_pixel(width, height, Rgb([value, value / 2, 255 - value]))
}

enum Script {
    Steps(VecDeque<Grab>),
    Stalled,
    Endless { frame: RawImage, delay: Duration },
    Failing,
    Panicking,
}

/// Device that plays back a script and counts how often it was released.
pub struct ScriptedDevice {
    script: Script,
    releases: Arc<AtomicUsize>,
}

impl ScriptedDevice {
    fn with_script(script: Script) -> (Self, Arc<AtomicUsize>) {
        let releases = Arc::new(AtomicUsize::new(0));
        (
            Self {
                script,
                releases: releases.clone(),
            },
            releases,
        )
    }

    /// Yields `frames` in order, then end-of-stream.
    pub fn new(frames: Vec<RawImage>) -> (Self, Arc<AtomicUsize>) {
        Self::steps(frames.into_iter().map(Grab::Frame).collect())
    }

    /// Plays back `steps` as given, then end-of-stream.
    pub fn steps(steps: Vec<Grab>) -> (Self, Arc<AtomicUsize>) {
        Self::with_script(Script::Steps(steps.into()))
    }

    /// Never has a frame ready.
    pub fn stalled() -> (Self, Arc<AtomicUsize>) {
        Self::with_script(Script::Stalled)
    }

    /// Yields the same frame forever, `delay` apart.
    pub fn endless(frame: RawImage, delay: Duration) -> (Self, Arc<AtomicUsize>) {
        Self::with_script(Script::Endless { frame, delay })
    }

    /// Every read fails.
    pub fn failing() -> (Self, Arc<AtomicUsize>) {
        Self::with_script(Script::Failing)
    }

    /// Every read panics.
    pub fn panicking() -> (Self, Arc<AtomicUsize>) {
        Self::with_script(Script::Panicking)
    }
}

impl Device for ScriptedDevice {
    fn read_frame(&mut self) -> Result<Grab> {
        match &mut self.script {
            Script::Steps(steps) => Ok(steps.pop_front().unwrap_or(Grab::End)),
            Script::Stalled => Ok(Grab::NotReady),
            Script::Endless { frame, delay } => {
                std::thread::sleep(*delay);
                Ok(Grab::Frame(frame.clone()))
            }
            Script::Failing => Err(StreamError::device("sensor unplugged")),
            Script::Panicking => panic!("driver crashed"),
        }
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

pub type TestSink = Pin<Box<dyn Sink<WsMessage, Error = StreamError> + Send>>;

/// Sink that records the payload of every binary message.
pub fn recording_sink() -> (TestSink, Arc<Mutex<Vec<Vec<u8>>>>) {
    let sent = Arc::new(Mutex::new(Vec::new()));
    let sink = futures_util::sink::unfold(sent.clone(), |sent, msg: WsMessage| async move {
        if let WsMessage::Binary(data) = msg {
            sent.lock().push(data);
        }
        Ok::<_, StreamError>(sent)
    });
    (Box::pin(sink), sent)
}

/// Sink whose every write fails as if the peer had gone away.
pub fn broken_sink() -> TestSink {
    let sink = futures_util::sink::unfold((), |_, _msg: WsMessage| async move {
        Err::<(), _>(StreamError::Send(WsError::ConnectionClosed))
    });
    Box::pin(sink)
}

/// Poll `cond` until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
