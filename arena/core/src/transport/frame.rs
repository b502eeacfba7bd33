//! Streaming Wire Format
//!
//! JSON text frames exchanged over the evaluation socket.
//!
//! # Frames
//!
//! ```text
//! client ──▶ server   { prompt, dialect, models, max_tokens }      (once)
//!
//! server ──▶ client   { "type": "evaluation_start", evaluation_id, models? }
//!                     { "type": "stream_start", model_id }
//!                     { "type": "token", model_id, token }           (many)
//!                     { "type": "stream_end", model_id, latency_ms, ... }
//!                     { "type": "stream_error", model_id, error }
//!                     { "type": "evaluation_complete", evaluation_id | full evaluation }
//!                     { "type": "error", message }
//! ```
//!
//! Frames that fail to parse, and frames with an unknown `type`, decode to
//! `None` and are ignored by the adapter.

use serde::{Deserialize, Serialize};

use super::TransportError;
use crate::evaluation::{ArabicMetrics, Dialect, EvaluationRequest};
use crate::events::{CompletionPayload, EventKind};

/// Message used when the backend sends an `error` frame without text
pub const UNKNOWN_STREAM_ERROR: &str = "Unknown WebSocket error";

/// First and only outbound frame on a session socket
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfigFrame {
    /// Prompt text
    pub prompt: String,
    /// Dialect tag
    pub dialect: Dialect,
    /// Models to run
    pub models: Vec<String>,
    /// Per-model token budget
    pub max_tokens: u32,
}

impl ConfigFrame {
    /// Build the frame for a request, filling a missing budget with `default_max_tokens`
    #[must_use]
    pub fn from_request(request: &EvaluationRequest, default_max_tokens: u32) -> Self {
        Self {
            prompt: request.prompt.clone(),
            dialect: request.dialect,
            models: request.models.clone(),
            max_tokens: request.max_tokens_or(default_max_tokens),
        }
    }

    /// Serialize to the text sent over the socket
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Encode` if serialization fails.
    pub fn encode(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Encode(e.to_string()))
    }
}

/// Inbound server frame, discriminated by `type`
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    /// Job accepted
    EvaluationStart {
        /// Backend-assigned id
        evaluation_id: String,
        /// Models the backend will run
        #[serde(default)]
        models: Vec<String>,
    },
    /// A model began streaming
    StreamStart {
        /// Model identifier
        model_id: String,
    },
    /// Text fragment
    Token {
        /// Model identifier
        model_id: String,
        /// Fragment
        token: String,
    },
    /// A model finished streaming
    StreamEnd {
        /// Model identifier
        model_id: String,
        /// Latency in milliseconds
        #[serde(default)]
        latency_ms: Option<i64>,
        /// Output tokens
        #[serde(default)]
        token_count: Option<u32>,
        /// Raw metrics object; kept loose so an unexpected shape does not
        /// discard the whole frame
        #[serde(default)]
        arabic_metrics: Option<serde_json::Value>,
    },
    /// A model's provider call failed
    StreamError {
        /// Model identifier
        model_id: String,
        /// Provider error
        #[serde(default)]
        error: Option<String>,
    },
    /// Job finished
    EvaluationComplete(CompletionPayload),
    /// Application-level failure
    Error {
        /// Server message
        #[serde(default)]
        message: Option<String>,
    },
    /// Any `type` this client does not know
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    /// Convert to the controller's event form; `None` for unknown frames
    #[must_use]
    pub fn into_event(self) -> Option<EventKind> {
        let kind = match self {
            Self::EvaluationStart {
                evaluation_id,
                models,
            } => EventKind::Started {
                evaluation_id,
                models,
            },
            Self::StreamStart { model_id } => EventKind::ModelStreamStarted { model_id },
            Self::Token { model_id, token } => EventKind::Token {
                model_id,
                fragment: token,
            },
            Self::StreamEnd {
                model_id,
                latency_ms,
                token_count,
                arabic_metrics,
            } => EventKind::ModelStreamFinished {
                model_id,
                latency_ms,
                token_count,
                arabic_metrics: arabic_metrics
                    .and_then(|v| serde_json::from_value::<ArabicMetrics>(v).ok())
                    .map(Box::new),
            },
            Self::StreamError { model_id, error } => EventKind::ModelStreamFailed {
                model_id,
                error: error.unwrap_or_default(),
            },
            Self::EvaluationComplete(payload) => EventKind::Completed(Box::new(payload)),
            Self::Error { message } => EventKind::Failed {
                message: message.unwrap_or_else(|| UNKNOWN_STREAM_ERROR.to_string()),
            },
            Self::Unknown => return None,
        };
        Some(kind)
    }
}

/// Decode one inbound text frame
///
/// Returns `None` for malformed JSON, missing fields and unknown types.
#[must_use]
pub fn decode_frame(text: &str) -> Option<EventKind> {
    match serde_json::from_str::<InboundFrame>(text) {
        Ok(frame) => frame.into_event(),
        Err(e) => {
            tracing::debug!(error = %e, "Dropping malformed frame");
            None
        }
    }
}
