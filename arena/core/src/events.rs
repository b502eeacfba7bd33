//! Transport Events
//!
//! Everything a transport adapter can tell the session controller. Adapters
//! never touch the session; they stamp each event with the generation they
//! were started for and post it to the controller, which decides whether the
//! event still matters.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::evaluation::{
    ArabicMetrics, Dialect, EvalCategory, EvalStatus, Evaluation, ModelResponse,
};

// ============================================================================
// Generation
// ============================================================================

/// Identifies one run of a session
///
/// Advanced on every submit, reset and transport migration. Events stamped
/// with anything but the controller's current generation are discarded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// The generation before any submit
    pub const INITIAL: Self = Self(0);

    /// The generation that supersedes this one
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Raw counter value
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// Which channel produced an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Duplex socket with per-token frames
    Streaming,
    /// Create-then-fetch over REST
    Polling,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Streaming => f.write_str("streaming"),
            Self::Polling => f.write_str("polling"),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// An event posted by a transport adapter
#[derive(Clone, Debug, PartialEq)]
pub struct TransportEvent {
    /// Generation the adapter was started for
    pub generation: Generation,
    /// Adapter that produced the event
    pub source: TransportKind,
    /// What happened
    pub kind: EventKind,
}

impl TransportEvent {
    /// Stamp an event kind
    #[must_use]
    pub fn new(generation: Generation, source: TransportKind, kind: EventKind) -> Self {
        Self {
            generation,
            source,
            kind,
        }
    }
}

/// Decoded transport event
#[derive(Clone, Debug, PartialEq)]
pub enum EventKind {
    // ---- streaming ----
    /// The backend accepted the job and assigned an id
    Started {
        /// Backend-assigned id
        evaluation_id: String,
        /// Models the backend will run, if it said
        models: Vec<String>,
    },
    /// A model began producing tokens
    ModelStreamStarted {
        /// Model identifier
        model_id: String,
    },
    /// A text fragment for one model
    Token {
        /// Model identifier
        model_id: String,
        /// Fragment to append
        fragment: String,
    },
    /// A model finished its answer
    ModelStreamFinished {
        /// Model identifier
        model_id: String,
        /// Server-measured latency
        latency_ms: Option<i64>,
        /// Output tokens
        token_count: Option<u32>,
        /// Linguistic statistics
        arabic_metrics: Option<Box<ArabicMetrics>>,
    },
    /// A model's provider call failed
    ModelStreamFailed {
        /// Model identifier
        model_id: String,
        /// Provider error text
        error: String,
    },
    /// The job finished
    Completed(Box<CompletionPayload>),
    /// Application-level failure reported by the backend
    Failed {
        /// Human-readable message
        message: String,
    },
    /// The channel itself broke; the job may still be running
    TransportFailure {
        /// What went wrong
        reason: String,
    },

    // ---- polling ----
    /// The creation call returned the new job
    Created(Box<Evaluation>),
    /// A status fetch returned a snapshot
    PollResult {
        /// 1-based fetch attempt
        attempt: u32,
        /// Latest snapshot
        evaluation: Box<Evaluation>,
    },
    /// Every fetch attempt was used without reaching a terminal status
    PollBudgetExhausted {
        /// Attempts made
        attempts: u32,
    },
}

impl EventKind {
    /// Short name for logs
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::ModelStreamStarted { .. } => "model_stream_started",
            Self::Token { .. } => "token",
            Self::ModelStreamFinished { .. } => "model_stream_finished",
            Self::ModelStreamFailed { .. } => "model_stream_failed",
            Self::Completed(_) => "completed",
            Self::Failed { .. } => "failed",
            Self::TransportFailure { .. } => "transport_failure",
            Self::Created(_) => "created",
            Self::PollResult { .. } => "poll_result",
            Self::PollBudgetExhausted { .. } => "poll_budget_exhausted",
        }
    }

    /// Whether this event ends the adapter that produced it
    #[must_use]
    pub fn ends_transport(&self) -> bool {
        match self {
            Self::Completed(_)
            | Self::Failed { .. }
            | Self::TransportFailure { .. }
            | Self::PollBudgetExhausted { .. } => true,
            Self::Created(evaluation) | Self::PollResult { evaluation, .. } => {
                evaluation.status.is_terminal()
            }
            Self::Started { .. }
            | Self::ModelStreamStarted { .. }
            | Self::Token { .. }
            | Self::ModelStreamFinished { .. }
            | Self::ModelStreamFailed { .. } => false,
        }
    }
}

// ============================================================================
// Completion payload
// ============================================================================

/// Body of an `evaluation_complete` frame
///
/// The backend may send a bare `evaluation_id` or a full evaluation; every
/// field is optional and only present ones replace the session's skeleton.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CompletionPayload {
    /// Evaluation id (full payload form)
    pub id: Option<String>,
    /// Evaluation id (bare form)
    pub evaluation_id: Option<String>,
    /// Echoed prompt
    pub prompt: Option<String>,
    /// Echoed dialect
    pub dialect: Option<Dialect>,
    /// Echoed category
    pub category: Option<EvalCategory>,
    /// Reported status; the session forces `completed` regardless
    pub status: Option<EvalStatus>,
    /// Highest scoring model
    pub winner_model_id: Option<String>,
    /// Models ordered by score
    pub ranking: Option<Vec<String>>,
    /// Per-model results
    pub model_responses: Option<Vec<ModelResponse>>,
    /// Creation time
    pub created_at: Option<DateTime<Utc>>,
    /// Completion time
    pub completed_at: Option<DateTime<Utc>>,
}

impl CompletionPayload {
    /// Evaluation id in either form
    #[must_use]
    pub fn resolved_id(&self) -> Option<&str> {
        self.id.as_deref().or(self.evaluation_id.as_deref())
    }

    /// Write every present field onto `base` and mark it completed
    pub fn overlay_onto(self, base: &mut Evaluation) {
        if let Some(id) = self.id.or(self.evaluation_id) {
            base.id = id;
        }
        if let Some(prompt) = self.prompt {
            base.prompt = prompt;
        }
        if let Some(dialect) = self.dialect {
            base.dialect = dialect;
        }
        if let Some(category) = self.category {
            base.category = category;
        }
        if let Some(winner) = self.winner_model_id {
            base.winner_model_id = Some(winner);
        }
        if let Some(ranking) = self.ranking {
            base.ranking = ranking;
        }
        if let Some(responses) = self.model_responses {
            base.model_responses = responses;
        }
        if let Some(created_at) = self.created_at {
            base.created_at = created_at;
        }
        base.status = EvalStatus::Completed;
        base.completed_at = Some(self.completed_at.unwrap_or_else(Utc::now));
    }
}

impl From<Evaluation> for CompletionPayload {
    fn from(evaluation: Evaluation) -> Self {
        Self {
            id: Some(evaluation.id),
            evaluation_id: None,
            prompt: Some(evaluation.prompt),
            dialect: Some(evaluation.dialect),
            category: Some(evaluation.category),
            status: Some(evaluation.status),
            winner_model_id: evaluation.winner_model_id,
            ranking: Some(evaluation.ranking),
            model_responses: Some(evaluation.model_responses),
            created_at: Some(evaluation.created_at),
            completed_at: evaluation.completed_at,
        }
    }
}
