//! Adapter Task Lifecycle
//!
//! Each transport adapter runs as its own task. The controller keeps a
//! [`TransportHandle`] for it; the task gets an [`EventSink`] that stamps
//! everything it emits with the generation it was started for.
//!
//! Cancellation is cooperative: the handle flips a `watch` flag, the adapter
//! observes it at every suspension point (connect, next frame, fetch, timer)
//! and returns, releasing its socket or timer on the way out. Dropping the
//! handle cancels as well, so no exit path of the controller leaks a task.

use std::future::Future;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::events::{EventKind, Generation, TransportEvent, TransportKind};

// ============================================================================
// Cancellation
// ============================================================================

/// Receiving side of an adapter's cancellation flag
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Whether cancellation was requested or the handle is gone
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once cancellation is requested or the handle is dropped
    pub async fn cancelled(&mut self) {
        // A closed channel means the owning handle is gone
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Build a connected cancel flag and signal
#[must_use]
pub fn cancel_pair() -> (watch::Sender<bool>, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (tx, CancelSignal { rx })
}

// ============================================================================
// Event sink
// ============================================================================

/// Where an adapter posts its events
pub struct EventSink {
    generation: Generation,
    source: TransportKind,
    tx: mpsc::Sender<TransportEvent>,
    cancel: CancelSignal,
}

impl EventSink {
    /// Create a sink for one adapter run
    #[must_use]
    pub fn new(
        generation: Generation,
        source: TransportKind,
        tx: mpsc::Sender<TransportEvent>,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            generation,
            source,
            tx,
            cancel,
        }
    }

    /// Generation stamped on every event
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// A copy of the adapter's cancellation signal
    #[must_use]
    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    /// Post an event to the controller
    ///
    /// Returns `false` when the adapter should stop: it was cancelled, or the
    /// controller is gone. Never blocks past a cancellation.
    pub async fn emit(&mut self, kind: EventKind) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let event = TransportEvent::new(self.generation, self.source, kind);
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            sent = self.tx.send(event) => sent.is_ok(),
        }
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Controller-side ownership of a running adapter task
pub struct TransportHandle {
    kind: TransportKind,
    generation: Generation,
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle {
    /// Spawn an adapter with a fresh sink for `generation`
    pub fn spawn<F, Fut>(
        kind: TransportKind,
        generation: Generation,
        events: mpsc::Sender<TransportEvent>,
        adapter: F,
    ) -> Self
    where
        F: FnOnce(EventSink) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel, signal) = cancel_pair();
        let sink = EventSink::new(generation, kind, events, signal);
        let task = tokio::spawn(adapter(sink));
        tracing::debug!(%generation, transport = %kind, "Transport started");
        Self {
            kind,
            generation,
            cancel,
            task: Some(task),
        }
    }

    /// Which adapter this handle owns
    #[must_use]
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Generation the adapter was started for
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Whether the adapter task has returned
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Request cancellation without waiting
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// Cancel and wait until the adapter has released its resources
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(generation = %self.generation, transport = %self.kind, "Transport task panicked");
                }
            }
        }
        tracing::debug!(generation = %self.generation, transport = %self.kind, "Transport stopped");
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}
