//! Per-model stream progress

use crate::evaluation::ArabicMetrics;

/// Where one model is in its own token stream
///
/// Driven by the backend's `stream_start` / `stream_end` / `stream_error`
/// frames. A failed model does not fail the session.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ModelStreamState {
    /// No frame seen for this model yet
    #[default]
    Waiting,
    /// Tokens are arriving
    Streaming,
    /// The model finished its answer
    Finished {
        /// Server-measured latency
        latency_ms: Option<i64>,
        /// Output tokens
        token_count: Option<u32>,
        /// Linguistic statistics, when the server computed them
        arabic_metrics: Option<Box<ArabicMetrics>>,
    },
    /// The provider call failed
    Failed {
        /// Provider error text
        error: String,
    },
}

impl ModelStreamState {
    /// `Finished` or `Failed`
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Finished { .. } | Self::Failed { .. })
    }

    /// Short label for display
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Streaming => "streaming",
            Self::Finished { .. } => "done",
            Self::Failed { .. } => "failed",
        }
    }
}
