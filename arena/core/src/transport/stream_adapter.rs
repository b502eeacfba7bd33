//! Streaming Channel Adapter
//!
//! One socket per run: connect, send the configuration frame once, then turn
//! inbound frames into events until the job ends. The socket is closed exactly
//! once on every exit path and is never reopened.

use std::sync::Arc;
use std::time::Duration;

use super::frame::{decode_frame, ConfigFrame};
use super::lifecycle::{CancelSignal, EventSink};
use super::traits::{FrameStream, StreamConnector, TransportError};
use crate::events::EventKind;

/// Reason reported when the peer hangs up before the job ends
pub const PEER_CLOSED_REASON: &str = "connection closed before the evaluation finished";

/// Longest wait for a close handshake before the socket is abandoned
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Socket wrapper that closes at most once
struct ScopedConnection {
    stream: Box<dyn FrameStream>,
    close_timeout: Duration,
    closed: bool,
}

impl ScopedConnection {
    fn new(stream: Box<dyn FrameStream>, close_timeout: Duration) -> Self {
        Self {
            stream,
            close_timeout,
            closed: false,
        }
    }

    /// Close the socket, giving up after `close_timeout`
    ///
    /// A peer that stops reading can stall the close flush forever; the
    /// stream is dropped in that case.
    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match tokio::time::timeout(self.close_timeout, self.stream.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "Error while closing evaluation socket"),
            Err(_) => tracing::warn!(
                timeout_ms = u64::try_from(self.close_timeout.as_millis()).unwrap_or(u64::MAX),
                "Evaluation socket did not close in time, dropping it"
            ),
        }
    }
}

/// How a connected session ended
enum StreamExit {
    /// Cancelled from outside; nothing more to report
    Cancelled,
    /// Terminal event to post after the socket is closed
    Terminal(EventKind),
}

/// Run the streaming adapter to completion
///
/// Emits `TransportFailure` when the socket cannot be opened or breaks before
/// the job ends, so the controller can migrate to polling.
pub async fn run_stream(
    connector: Arc<dyn StreamConnector>,
    config: ConfigFrame,
    close_timeout: Duration,
    mut sink: EventSink,
) {
    let generation = sink.generation();
    let mut cancel = sink.cancel_signal();

    let connected = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::debug!(%generation, "Cancelled while connecting");
            return;
        }
        result = connector.connect() => result,
    };

    let stream = match connected {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(%generation, error = %e, "Could not open evaluation socket");
            sink.emit(EventKind::TransportFailure {
                reason: e.to_string(),
            })
            .await;
            return;
        }
    };

    let mut connection = ScopedConnection::new(stream, close_timeout);
    let exit = drive(&mut connection, &config, &mut sink, &mut cancel).await;
    connection.close().await;

    match exit {
        StreamExit::Cancelled => tracing::debug!(%generation, "Stream cancelled"),
        StreamExit::Terminal(kind) => {
            tracing::debug!(%generation, event = kind.name(), "Stream finished");
            sink.emit(kind).await;
        }
    }
}

async fn drive(
    connection: &mut ScopedConnection,
    config: &ConfigFrame,
    sink: &mut EventSink,
    cancel: &mut CancelSignal,
) -> StreamExit {
    let text = match config.encode() {
        Ok(text) => text,
        Err(e) => return transport_failure(&e),
    };

    let sent = tokio::select! {
        biased;
        () = cancel.cancelled() => return StreamExit::Cancelled,
        sent = connection.stream.send_text(text) => sent,
    };
    if let Err(e) = sent {
        return transport_failure(&e);
    }

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => return StreamExit::Cancelled,
            next = connection.stream.next_text() => next,
        };

        let text = match next {
            Some(Ok(text)) => text,
            Some(Err(e)) => return transport_failure(&e),
            None => {
                return StreamExit::Terminal(EventKind::TransportFailure {
                    reason: PEER_CLOSED_REASON.to_string(),
                })
            }
        };

        let Some(kind) = decode_frame(&text) else {
            continue;
        };
        if kind.ends_transport() {
            return StreamExit::Terminal(kind);
        }
        if !sink.emit(kind).await {
            return StreamExit::Cancelled;
        }
    }
}

fn transport_failure(error: &TransportError) -> StreamExit {
    tracing::warn!(error = %error, "Evaluation socket failed");
    StreamExit::Terminal(EventKind::TransportFailure {
        reason: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::{Dialect, EvalCategory, EvaluationRequest};
    use crate::events::{Generation, TransportEvent, TransportKind};
    use crate::transport::lifecycle::cancel_pair;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct Log {
        sent: Vec<String>,
        closes: u32,
    }

    struct FakeStream {
        frames: VecDeque<Result<String, TransportError>>,
        log: Arc<Mutex<Log>>,
        hang_when_empty: bool,
        stall_close: bool,
    }

    #[async_trait]
    impl FrameStream for FakeStream {
        async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
            self.log.lock().unwrap().sent.push(text);
            Ok(())
        }

        async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
            match self.frames.pop_front() {
                Some(frame) => Some(frame),
                None if self.hang_when_empty => std::future::pending().await,
                None => None,
            }
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.log.lock().unwrap().closes += 1;
            if self.stall_close {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    struct FakeConnector {
        frames: Mutex<Option<Vec<Result<String, TransportError>>>>,
        log: Arc<Mutex<Log>>,
        hang_when_empty: bool,
        stall_close: bool,
    }

    impl FakeConnector {
        fn new(frames: Vec<&str>) -> (Arc<Self>, Arc<Mutex<Log>>) {
            let log = Arc::new(Mutex::new(Log::default()));
            let connector = Arc::new(Self {
                frames: Mutex::new(Some(frames.into_iter().map(|f| Ok(f.to_string())).collect())),
                log: Arc::clone(&log),
                hang_when_empty: false,
                stall_close: false,
            });
            (connector, log)
        }

        fn refusing() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(None),
                log: Arc::new(Mutex::new(Log::default())),
                hang_when_empty: false,
                stall_close: false,
            })
        }
    }

    #[async_trait]
    impl StreamConnector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError> {
            let frames = self
                .frames
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| TransportError::ConnectionFailed("refused".into()))?;
            Ok(Box::new(FakeStream {
                frames: frames.into(),
                log: Arc::clone(&self.log),
                hang_when_empty: self.hang_when_empty,
                stall_close: self.stall_close,
            }))
        }
    }

    fn config() -> ConfigFrame {
        let request = EvaluationRequest::new(
            "prompt text here",
            Dialect::Msa,
            EvalCategory::Reasoning,
            ["a", "b"],
        )
        .with_max_tokens(512);
        ConfigFrame::from_request(&request, 1024)
    }

    async fn collect(mut rx: mpsc::Receiver<TransportEvent>) -> Vec<EventKind> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event.kind);
        }
        events
    }

    fn streaming_sink(tx: mpsc::Sender<TransportEvent>) -> (tokio::sync::watch::Sender<bool>, EventSink) {
        let (cancel, signal) = cancel_pair();
        (
            cancel,
            EventSink::new(Generation::INITIAL, TransportKind::Streaming, tx, signal),
        )
    }

    #[tokio::test]
    async fn test_happy_path_sends_config_once_and_closes_once() {
        let (connector, log) = FakeConnector::new(vec![
            r#"{"type":"evaluation_start","evaluation_id":"e1"}"#,
            r#"{"type":"token","model_id":"a","token":"he"}"#,
            "garbage",
            r#"{"type":"token","model_id":"a","token":"llo"}"#,
            r#"{"type":"evaluation_complete","evaluation_id":"e1"}"#,
            r#"{"type":"token","model_id":"a","token":"late"}"#,
        ]);
        let (tx, rx) = mpsc::channel(16);
        let (_cancel, sink) = streaming_sink(tx);

        run_stream(connector, config(), DEFAULT_CLOSE_TIMEOUT, sink).await;
        let events = collect(rx).await;

        let names: Vec<_> = events.iter().map(EventKind::name).collect();
        assert_eq!(names, vec!["started", "token", "token", "completed"]);

        let log = log.lock().unwrap();
        assert_eq!(log.sent.len(), 1);
        let sent: serde_json::Value = serde_json::from_str(&log.sent[0]).unwrap();
        assert_eq!(sent["max_tokens"], 512);
        assert_eq!(log.closes, 1);
    }

    #[tokio::test]
    async fn test_connect_failure_reports_transport_failure() {
        let (tx, rx) = mpsc::channel(4);
        let (_cancel, sink) = streaming_sink(tx);

        run_stream(FakeConnector::refusing(), config(), DEFAULT_CLOSE_TIMEOUT, sink).await;

        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![EventKind::TransportFailure {
                reason: "Connection failed: refused".into()
            }]
        );
    }

    #[tokio::test]
    async fn test_peer_close_is_transport_failure() {
        let (connector, log) =
            FakeConnector::new(vec![r#"{"type":"evaluation_start","evaluation_id":"e1"}"#]);
        let (tx, rx) = mpsc::channel(4);
        let (_cancel, sink) = streaming_sink(tx);

        run_stream(connector, config(), DEFAULT_CLOSE_TIMEOUT, sink).await;

        let events = collect(rx).await;
        assert_eq!(
            events.last(),
            Some(&EventKind::TransportFailure {
                reason: PEER_CLOSED_REASON.into()
            })
        );
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[tokio::test]
    async fn test_application_error_ends_stream() {
        let (connector, log) = FakeConnector::new(vec![
            r#"{"type":"error","message":"Prompt is required."}"#,
            r#"{"type":"token","model_id":"a","token":"x"}"#,
        ]);
        let (tx, rx) = mpsc::channel(4);
        let (_cancel, sink) = streaming_sink(tx);

        run_stream(connector, config(), DEFAULT_CLOSE_TIMEOUT, sink).await;

        assert_eq!(
            collect(rx).await,
            vec![EventKind::Failed {
                message: "Prompt is required.".into()
            }]
        );
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[tokio::test]
    async fn test_cancel_closes_without_terminal_event() {
        let log = Arc::new(Mutex::new(Log::default()));
        let connector = Arc::new(FakeConnector {
            frames: Mutex::new(Some(vec![Ok(
                r#"{"type":"evaluation_start","evaluation_id":"e1"}"#.to_string(),
            )])),
            log: Arc::clone(&log),
            hang_when_empty: true,
            stall_close: false,
        });
        let (tx, mut rx) = mpsc::channel(4);
        let (cancel, sink) = streaming_sink(tx);

        let task = tokio::spawn(run_stream(connector, config(), DEFAULT_CLOSE_TIMEOUT, sink));
        assert_eq!(rx.recv().await.unwrap().kind.name(), "started");

        cancel.send_replace(true);
        task.await.unwrap();

        assert!(rx.recv().await.is_none());
        assert_eq!(log.lock().unwrap().closes, 1);
    }

    #[tokio::test]
    async fn test_stalled_close_is_abandoned_after_timeout() {
        let log = Arc::new(Mutex::new(Log::default()));
        let connector = Arc::new(FakeConnector {
            frames: Mutex::new(Some(vec![
                Ok(r#"{"type":"evaluation_start","evaluation_id":"e1"}"#.to_string()),
                Ok(r#"{"type":"evaluation_complete","evaluation_id":"e1"}"#.to_string()),
            ])),
            log: Arc::clone(&log),
            hang_when_empty: false,
            stall_close: true,
        });
        let (tx, rx) = mpsc::channel(4);
        let (_cancel, sink) = streaming_sink(tx);

        let finished = tokio::time::timeout(
            Duration::from_secs(2),
            run_stream(connector, config(), Duration::from_millis(20), sink),
        )
        .await;

        assert!(finished.is_ok());
        let names: Vec<_> = collect(rx).await.iter().map(EventKind::name).collect();
        assert_eq!(names, vec!["started", "completed"]);
        assert_eq!(log.lock().unwrap().closes, 1);
    }
}
