//! Session State Machine
//!
//! [`Session`] is the canonical record of one evaluation run as seen by the
//! client. [`SessionMachine`] owns it and is the only thing that changes it:
//! every mutation is either a caller command (`begin`, `reset`) or a
//! transport event passed through [`SessionMachine::apply`].
//!
//! # Lifecycle
//!
//! ```text
//!            begin()                first event          terminal event
//!   Idle ───────────────▶ Pending ─────────────▶ Running ───────────────▶ Completed
//!    ▲                      │  ▲                    │                     Failed
//!    │                      │  └── migrate ◀────────┘ (socket broke)
//!    └──────── reset() ─────┴──────────── from any state ─────────────────────┘
//! ```
//!
//! Every `begin`, `reset` and migration moves to a new [`Generation`]. Events
//! stamped with an older generation are dropped, as is anything arriving
//! after a terminal status.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::evaluation::{EvalStatus, Evaluation, EvaluationRequest};
use crate::events::{EventKind, Generation, TransportEvent, TransportKind};
use crate::streaming::{ModelStreamState, TokenMultiplexer};

/// Error shown when the backend reports a job as failed without detail
pub const SERVER_FAILED_MESSAGE: &str = "The evaluation failed on the server.";

/// Error shown when the polling budget runs out
#[must_use]
pub fn poll_timeout_message(attempts: u32) -> String {
    format!("Polling timed out after {attempts} status checks. The evaluation may still finish; look it up by id later.")
}

// ============================================================================
// Session
// ============================================================================

/// Where a session is in its lifecycle
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Nothing submitted
    #[default]
    Idle,
    /// Submitted, no transport event yet
    Pending,
    /// Transport events are arriving
    Running,
    /// Finished with a result
    Completed,
    /// Finished with an error
    Failed,
}

impl SessionStatus {
    /// `Completed` or `Failed`
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// `Pending` or `Running`
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// Lowercase name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one evaluation run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Session {
    status: SessionStatus,
    evaluation: Option<Evaluation>,
    token_buffers: TokenMultiplexer,
    model_states: BTreeMap<String, ModelStreamState>,
    error: Option<String>,
    generation: Generation,
    transport: Option<TransportKind>,
    migrated: bool,
}

impl Session {
    fn idle(generation: Generation) -> Self {
        Self {
            generation,
            ..Self::default()
        }
    }

    /// Lifecycle status
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Job as last reported; `None` while idle or before the first report
    #[must_use]
    pub fn evaluation(&self) -> Option<&Evaluation> {
        self.evaluation.as_ref()
    }

    /// Partial text per model while streaming
    #[must_use]
    pub fn token_buffers(&self) -> &TokenMultiplexer {
        &self.token_buffers
    }

    /// Partial text for one model; empty if none arrived
    #[must_use]
    pub fn tokens_for(&self, model_id: &str) -> &str {
        self.token_buffers.get(model_id)
    }

    /// Per-model stream progress, ordered by model id
    #[must_use]
    pub fn model_states(&self) -> &BTreeMap<String, ModelStreamState> {
        &self.model_states
    }

    /// Failure description; only set when `Failed`
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Current generation
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Transport currently feeding this session
    #[must_use]
    pub fn transport(&self) -> Option<TransportKind> {
        self.transport
    }

    /// Whether this run moved from streaming to polling
    #[must_use]
    pub fn migrated(&self) -> bool {
        self.migrated
    }
}

/// Caller misuse, rejected before any transport is touched
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A session is already pending or running
    #[error("an evaluation is already {0}")]
    Busy(SessionStatus),
    /// The controller task is no longer running
    #[error("session controller has stopped")]
    ControllerStopped,
}

// ============================================================================
// Machine
// ============================================================================

/// What the controller must do after an event was applied
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Nothing beyond publishing the new snapshot
    None,
    /// The run is over; release the transport
    Finish,
    /// The socket failed; close it, then poll under `generation`
    Migrate {
        /// Generation the polling adapter must be started with
        generation: Generation,
    },
}

/// The only writer of [`Session`]
#[derive(Debug, Default)]
pub struct SessionMachine {
    session: Session,
    request: Option<EvaluationRequest>,
}

impl SessionMachine {
    /// A machine in `Idle`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Request of the current run, kept unmodified for migration
    #[must_use]
    pub fn request(&self) -> Option<&EvaluationRequest> {
        self.request.as_ref()
    }

    /// Start a new run on `transport`
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Busy` while another run is pending or running.
    pub fn begin(
        &mut self,
        request: EvaluationRequest,
        transport: TransportKind,
    ) -> Result<Generation, SessionError> {
        if self.session.status.is_active() {
            return Err(SessionError::Busy(self.session.status));
        }

        let generation = self.session.generation.next();
        let model_states = match transport {
            TransportKind::Streaming => request
                .models
                .iter()
                .map(|model| (model.clone(), ModelStreamState::Waiting))
                .collect(),
            TransportKind::Polling => BTreeMap::new(),
        };
        self.session = Session {
            status: SessionStatus::Pending,
            model_states,
            generation,
            transport: Some(transport),
            ..Session::default()
        };
        self.request = Some(request);
        tracing::info!(%generation, %transport, "Evaluation submitted");
        Ok(generation)
    }

    /// Return to `Idle` under a fresh generation
    pub fn reset(&mut self) -> Generation {
        let generation = self.session.generation.next();
        if self.session.status != SessionStatus::Idle {
            tracing::info!(%generation, from = %self.session.status, "Session reset");
        }
        self.session = Session::idle(generation);
        self.request = None;
        generation
    }

    /// Apply one transport event
    ///
    /// Events from another generation, and events arriving after a terminal
    /// status, leave the session untouched.
    pub fn apply(&mut self, event: TransportEvent) -> Effect {
        if event.generation != self.session.generation {
            tracing::trace!(
                event_generation = %event.generation,
                current = %self.session.generation,
                event = event.kind.name(),
                "Dropping stale event"
            );
            return Effect::None;
        }
        if !self.session.status.is_active() {
            tracing::trace!(status = %self.session.status, event = event.kind.name(), "Dropping event for settled session");
            return Effect::None;
        }
        let Some(request) = self.request.take() else {
            return Effect::None;
        };
        let effect = self.transition(&request, event.source, event.kind);
        self.request = Some(request);
        effect
    }

    fn transition(
        &mut self,
        request: &EvaluationRequest,
        source: TransportKind,
        kind: EventKind,
    ) -> Effect {
        match kind {
            EventKind::Started { evaluation_id, .. } => {
                self.mark_running();
                match self.session.evaluation.as_mut() {
                    Some(evaluation) => evaluation.id = evaluation_id,
                    None => {
                        tracing::info!(generation = %self.session.generation, %evaluation_id, "Evaluation started");
                        self.session.evaluation =
                            Some(Evaluation::skeleton(evaluation_id, request));
                    }
                }
                Effect::None
            }
            EventKind::ModelStreamStarted { model_id } => {
                self.mark_running();
                self.set_model_state(request, model_id, ModelStreamState::Streaming);
                Effect::None
            }
            EventKind::Token { model_id, fragment } => {
                self.mark_running();
                if !request.includes_model(&model_id) {
                    tracing::debug!(%model_id, "Dropping token for a model outside the request");
                    return Effect::None;
                }
                self.session.token_buffers.append(&model_id, &fragment);
                if let Some(state @ ModelStreamState::Waiting) =
                    self.session.model_states.get_mut(&model_id)
                {
                    *state = ModelStreamState::Streaming;
                }
                Effect::None
            }
            EventKind::ModelStreamFinished {
                model_id,
                latency_ms,
                token_count,
                arabic_metrics,
            } => {
                self.mark_running();
                let state = ModelStreamState::Finished {
                    latency_ms,
                    token_count,
                    arabic_metrics,
                };
                self.set_model_state(request, model_id, state);
                Effect::None
            }
            EventKind::ModelStreamFailed { model_id, error } => {
                self.mark_running();
                tracing::warn!(%model_id, %error, "Model stream failed");
                self.set_model_state(request, model_id, ModelStreamState::Failed { error });
                Effect::None
            }
            EventKind::Completed(payload) => {
                let mut evaluation = self.session.evaluation.take().unwrap_or_else(|| {
                    Evaluation::skeleton(payload.resolved_id().unwrap_or_default(), request)
                });
                payload.overlay_onto(&mut evaluation);
                self.complete(evaluation);
                Effect::Finish
            }
            EventKind::Failed { message } => {
                self.fail(message);
                Effect::Finish
            }
            EventKind::TransportFailure { reason } => {
                if source == TransportKind::Streaming && !self.session.migrated {
                    self.migrate(&reason)
                } else {
                    self.fail(format!("Connection to the evaluation service failed: {reason}"));
                    Effect::Finish
                }
            }
            EventKind::Created(evaluation) | EventKind::PollResult { evaluation, .. } => {
                self.install_snapshot(*evaluation)
            }
            EventKind::PollBudgetExhausted { attempts } => {
                self.fail(poll_timeout_message(attempts));
                Effect::Finish
            }
        }
    }

    fn mark_running(&mut self) {
        if self.session.status == SessionStatus::Pending {
            self.session.status = SessionStatus::Running;
        }
    }

    fn set_model_state(
        &mut self,
        request: &EvaluationRequest,
        model_id: String,
        state: ModelStreamState,
    ) {
        if request.includes_model(&model_id) {
            self.session.model_states.insert(model_id, state);
        } else {
            tracing::debug!(%model_id, "Ignoring stream state for a model outside the request");
        }
    }

    fn install_snapshot(&mut self, mut evaluation: Evaluation) -> Effect {
        match evaluation.status {
            EvalStatus::Completed => {
                self.complete(evaluation);
                Effect::Finish
            }
            EvalStatus::Failed => {
                self.session.evaluation = Some(evaluation);
                self.fail(SERVER_FAILED_MESSAGE.to_string());
                Effect::Finish
            }
            EvalStatus::Pending | EvalStatus::Running => {
                evaluation.status = EvalStatus::Running;
                self.session.status = SessionStatus::Running;
                self.session.evaluation = Some(evaluation);
                Effect::None
            }
        }
    }

    fn complete(&mut self, evaluation: Evaluation) {
        tracing::info!(
            generation = %self.session.generation,
            evaluation_id = %evaluation.id,
            winner = evaluation.winner_model_id.as_deref().unwrap_or("-"),
            "Evaluation completed"
        );
        self.session.status = SessionStatus::Completed;
        self.session.evaluation = Some(evaluation);
        self.settle();
    }

    fn fail(&mut self, message: String) {
        tracing::warn!(generation = %self.session.generation, error = %message, "Evaluation failed");
        self.session.status = SessionStatus::Failed;
        if let Some(evaluation) = self.session.evaluation.as_mut() {
            evaluation.status = EvalStatus::Failed;
        }
        self.session.error = Some(message);
        self.settle();
    }

    fn settle(&mut self) {
        self.session.token_buffers.clear();
        self.session.transport = None;
    }

    fn migrate(&mut self, reason: &str) -> Effect {
        let generation = self.session.generation.next();
        tracing::warn!(
            from = %self.session.generation,
            to = %generation,
            %reason,
            "Streaming failed, falling back to polling"
        );
        self.session = Session {
            status: SessionStatus::Pending,
            generation,
            transport: Some(TransportKind::Polling),
            migrated: true,
            ..Session::default()
        };
        Effect::Migrate { generation }
    }
}
