//! Session Controller
//!
//! The public face of the crate. A [`SessionController`] is a cheap handle to
//! an actor task that owns the [`SessionMachine`] and the one transport
//! adapter serving the current generation.
//!
//! # Architecture
//!
//! ```text
//!  caller                       actor task                      adapter task
//! ┌──────────────┐  Command   ┌──────────────────────┐  spawn  ┌──────────────┐
//! │ submit()     │ ─────────▶ │ SessionMachine       │ ──────▶ │ run_stream   │
//! │ reset()      │            │  begin / reset       │         │   or         │
//! │              │            │  apply(event)        │ ◀────── │ run_polling  │
//! │ session()    │ ◀───────── │ watch::Sender        │  Event  └──────────────┘
//! │ updates()    │  Session   └──────────────────────┘
//! └──────────────┘
//! ```
//!
//! The actor is the only writer of [`Session`]; observers get clones through a
//! `watch` channel. On a transport-level socket failure the actor shuts the
//! stream adapter down (awaiting its exit, so the socket is closed) before it
//! spawns the polling adapter for the new generation.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::WatchStream;

use crate::config::ArenaConfig;
use crate::evaluation::EvaluationRequest;
use crate::events::{Generation, TransportEvent, TransportKind};
use crate::session::{Effect, Session, SessionError, SessionMachine, SessionStatus};
use crate::transport::frame::ConfigFrame;
use crate::transport::lifecycle::TransportHandle;
use crate::transport::polling::run_polling;
use crate::transport::stream_adapter::run_stream;
use crate::transport::traits::ApiError;
use crate::transport::{create_transports, Transports};

const COMMAND_BUFFER: usize = 16;
const EVENT_BUFFER: usize = 256;

enum Command {
    Submit {
        request: EvaluationRequest,
        reply: oneshot::Sender<Result<Generation, SessionError>>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running session controller
///
/// Clones share the same session. The actor stops, cancelling any active
/// transport, once every handle is dropped.
#[derive(Clone)]
pub struct SessionController {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<Session>,
    streaming_available: bool,
}

impl SessionController {
    /// Start a controller on the current tokio runtime
    #[must_use]
    pub fn spawn(transports: Transports) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (snapshot_tx, snapshots) = watch::channel(Session::default());
        let streaming_available = transports.streaming_available();

        let actor = ControllerActor {
            machine: SessionMachine::new(),
            transports,
            active: None,
            events_tx,
            snapshots: snapshot_tx,
        };
        tokio::spawn(actor.run(command_rx, events_rx));

        Self {
            commands,
            snapshots,
            streaming_available,
        }
    }

    /// Start a controller with network transports built from `config`
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Network` if the HTTP client cannot be built.
    pub fn from_config(config: &ArenaConfig) -> Result<Self, ApiError> {
        Ok(Self::spawn(create_transports(config)?))
    }

    /// Whether new runs try the socket first
    #[must_use]
    pub fn streaming_available(&self) -> bool {
        self.streaming_available
    }

    /// Run an evaluation and wait for it to settle
    ///
    /// Resolves with the terminal snapshot, or with the `Idle` snapshot if the
    /// run was reset before it finished. Progress is visible through
    /// [`updates`](Self::updates) meanwhile.
    ///
    /// # Errors
    ///
    /// `SessionError::Busy` if a run is already pending or running;
    /// `SessionError::ControllerStopped` if the actor is gone.
    pub async fn submit(&self, request: EvaluationRequest) -> Result<Session, SessionError> {
        let mut updates = self.snapshots.clone();
        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Submit { request, reply })
            .await
            .map_err(|_| SessionError::ControllerStopped)?;
        let generation = reply_rx
            .await
            .map_err(|_| SessionError::ControllerStopped)??;

        let settled = updates
            .wait_for(|session| !belongs_to_run(session, generation) || session.status().is_terminal())
            .await
            .map_err(|_| SessionError::ControllerStopped)?;
        Ok(settled.clone())
    }

    /// Cancel any active transport and return to `Idle`
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// `SessionError::ControllerStopped` if the actor is gone.
    pub async fn reset(&self) -> Result<(), SessionError> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Reset { reply })
            .await
            .map_err(|_| SessionError::ControllerStopped)?;
        reply_rx.await.map_err(|_| SessionError::ControllerStopped)
    }

    /// Latest snapshot
    #[must_use]
    pub fn session(&self) -> Session {
        self.snapshots.borrow().clone()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.snapshots.borrow().status()
    }

    /// Stream of snapshots, starting with the current one
    #[must_use]
    pub fn updates(&self) -> WatchStream<Session> {
        WatchStream::new(self.snapshots.clone())
    }

    /// Raw watch receiver for callers that prefer `changed()`
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.snapshots.clone()
    }
}

/// A run keeps its generation, except for the single bump of a migration
fn belongs_to_run(session: &Session, generation: Generation) -> bool {
    session.generation() == generation
        || (session.migrated() && session.generation() == generation.next())
}

// ============================================================================
// Actor
// ============================================================================

struct ControllerActor {
    machine: SessionMachine,
    transports: Transports,
    active: Option<TransportHandle>,
    events_tx: mpsc::Sender<TransportEvent>,
    snapshots: watch::Sender<Session>,
}

impl ControllerActor {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut events: mpsc::Receiver<TransportEvent>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event).await,
            }
        }
        self.stop_transport().await;
        tracing::debug!("Session controller stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { request, reply } => {
                let transport = if self.transports.streaming_available() {
                    TransportKind::Streaming
                } else {
                    TransportKind::Polling
                };
                match self.machine.begin(request.clone(), transport) {
                    Ok(generation) => {
                        self.stop_transport().await;
                        self.start_transport(transport, generation, request);
                        self.publish();
                        let _ = reply.send(Ok(generation));
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "Submit rejected");
                        let _ = reply.send(Err(e));
                    }
                }
            }
            Command::Reset { reply } => {
                self.machine.reset();
                // Observers see Idle even while the adapter winds down
                self.publish();
                self.stop_transport().await;
                let _ = reply.send(());
            }
        }
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match self.machine.apply(event) {
            Effect::None => {}
            Effect::Finish => self.stop_transport().await,
            Effect::Migrate { generation } => {
                self.stop_transport().await;
                if let Some(request) = self.machine.request().cloned() {
                    self.start_transport(TransportKind::Polling, generation, request);
                }
            }
        }
        self.publish();
    }

    fn start_transport(
        &mut self,
        kind: TransportKind,
        generation: Generation,
        request: EvaluationRequest,
    ) {
        let events = self.events_tx.clone();
        let handle = match (kind, self.transports.streaming.as_ref()) {
            (TransportKind::Streaming, Some(connector)) => {
                let connector = Arc::clone(connector);
                let frame = ConfigFrame::from_request(&request, self.transports.default_max_tokens);
                let close_timeout = self.transports.close_timeout;
                TransportHandle::spawn(kind, generation, events, move |sink| {
                    run_stream(connector, frame, close_timeout, sink)
                })
            }
            _ => {
                let api = Arc::clone(&self.transports.polling);
                let settings = self.transports.poll_settings;
                TransportHandle::spawn(TransportKind::Polling, generation, events, move |sink| {
                    run_polling(api, request, settings, sink)
                })
            }
        };
        self.active = Some(handle);
    }

    async fn stop_transport(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.shutdown().await;
        }
    }

    fn publish(&self) {
        let current = self.machine.session();
        self.snapshots.send_if_modified(|published| {
            if published == current {
                false
            } else {
                *published = current.clone();
                true
            }
        });
    }
}
