//! Sender loop: drains the frame queue onto the WebSocket.

use std::time::Duration;

use futures_util::{Sink, SinkExt};
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::{FrameQueue, RunSignal};
use crate::error::{Result, StreamError};

#[derive(Debug, Clone, Copy, Default)]
pub struct SenderReport {
    pub frames_sent: u64,
    /// Queue waits that timed out with nothing to send.
    pub idle_waits: u64,
}

/// Send queued frames as binary messages while `running` holds.
///
/// An empty queue is re-checked every `wait`; a write error is returned to
/// the caller. Aborting the task stops it at its next await.
pub async fn run_sender<S>(
    mut queue: FrameQueue,
    mut sink: S,
    running: RunSignal,
    wait: Duration,
) -> Result<SenderReport>
where
    S: Sink<WsMessage> + Unpin,
    StreamError: From<S::Error>,
{
    let mut report = SenderReport::default();

    while running.is_running() {
        match queue.next_within(wait).await {
            Some(frame) => {
                sink.send(WsMessage::Binary(frame.into_bytes())).await?;
                report.frames_sent += 1;
            }
            None => report.idle_waits += 1,
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::{broken_sink, recording_sink};
    use crate::encode::Frame;
    use crate::stream::{frame_queue, RunFlag};

    fn running() -> RunFlag {
        let flag = RunFlag::new();
        flag.start();
        flag
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_frames_in_order() {
        let (producer, queue) = frame_queue();
        let (sink, sent) = recording_sink();
        let flag = running();

        for i in 0..5u8 {
            producer.push(Frame::from(vec![i; 3]));
        }
        let task = tokio::spawn(run_sender(queue, sink, flag.signal(), Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_millis(10)).await;

        flag.stop();
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.frames_sent, 5);
        let expected: Vec<Vec<u8>> = (0..5u8).map(|i| vec![i; 3]).collect();
        assert_eq!(*sent.lock(), expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_sender_keeps_waiting() {
        let (producer, queue) = frame_queue();
        let (sink, sent) = recording_sink();
        let flag = running();

        let task = tokio::spawn(run_sender(queue, sink, flag.signal(), Duration::from_secs(1)));

        // More than five wait windows with nothing queued
        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert!(!task.is_finished());
        assert!(sent.lock().is_empty());

        producer.push(Frame::from(vec![42]));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sent.lock().len(), 1);

        flag.stop();
        let report = task.await.unwrap().unwrap();
        assert_eq!(report.frames_sent, 1);
        // One timeout per window, no busy looping
        assert!((5..=7).contains(&report.idle_waits), "{:?}", report);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_producer_is_idle_not_fatal() {
        let (producer, queue) = frame_queue();
        let (sink, sent) = recording_sink();
        let flag = running();

        producer.push(Frame::from(vec![1]));
        drop(producer);

        let task = tokio::spawn(run_sender(queue, sink, flag.signal(), Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert!(!task.is_finished());

        flag.stop();
        let report = task.await.unwrap().unwrap();
        assert_eq!(sent.lock().len(), 1);
        assert!(report.idle_waits <= 5, "{:?}", report);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exits_within_one_wait_after_stop() {
        let (_producer, queue) = frame_queue();
        let (sink, _sent) = recording_sink();
        let flag = running();

        let task = tokio::spawn(run_sender(queue, sink, flag.signal(), Duration::from_secs(1)));
        tokio::time::sleep(Duration::from_millis(100)).await;
        flag.stop();

        let result = tokio::time::timeout(Duration::from_secs(1), task).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_abort_cancels_immediately() {
        let (_producer, queue) = frame_queue();
        let (sink, sent) = recording_sink();
        let flag = running();

        let task = tokio::spawn(run_sender(queue, sink, flag.signal(), Duration::from_secs(1)));
        tokio::task::yield_now().await;
        task.abort();

        let err = tokio::time::timeout(Duration::from_millis(100), task)
            .await
            .expect("aborted task finishes promptly")
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(sent.lock().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let (producer, queue) = frame_queue();
        let flag = running();
        producer.push(Frame::from(vec![1, 2, 3]));

        let result = run_sender(queue, broken_sink(), flag.signal(), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(StreamError::Send(_))));
    }
}
