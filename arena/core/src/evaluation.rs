//! Evaluation Data Model
//!
//! Requests submitted by the caller and the evaluation snapshots reported back
//! by the backend. These types mirror the backend's JSON schema exactly so the
//! same structs serve the REST API, the streaming completion payload and the
//! session snapshot exposed to renderers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Token budget used when a request does not carry one
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Minimum number of models compared in one evaluation
pub const MIN_MODELS: usize = 2;
/// Maximum number of models compared in one evaluation
pub const MAX_MODELS: usize = 6;

const MIN_PROMPT_CHARS: usize = 10;
const MAX_PROMPT_CHARS: usize = 8000;
const MIN_MAX_TOKENS: u32 = 64;
const MAX_MAX_TOKENS: u32 = 4096;

// ============================================================================
// Tags
// ============================================================================

/// Target Arabic dialect of the prompt
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Modern Standard Arabic
    Msa,
    /// Gulf
    Gulf,
    /// Egyptian
    Egyptian,
    /// Levantine
    Levantine,
    /// Maghrebi
    Maghrebi,
    /// Iraqi
    Iraqi,
}

impl Dialect {
    /// Every dialect, in display order
    pub const ALL: [Self; 6] = [
        Self::Msa,
        Self::Gulf,
        Self::Egyptian,
        Self::Levantine,
        Self::Maghrebi,
        Self::Iraqi,
    ];

    /// Wire identifier
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Msa => "msa",
            Self::Gulf => "gulf",
            Self::Egyptian => "egyptian",
            Self::Levantine => "levantine",
            Self::Maghrebi => "maghrebi",
            Self::Iraqi => "iraqi",
        }
    }

    /// English display name
    #[must_use]
    pub fn english_name(&self) -> &'static str {
        match self {
            Self::Msa => "Modern Standard Arabic",
            Self::Gulf => "Gulf",
            Self::Egyptian => "Egyptian",
            Self::Levantine => "Levantine",
            Self::Maghrebi => "Maghrebi",
            Self::Iraqi => "Iraqi",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| UnknownTag::new("dialect", s))
    }
}

/// What kind of task the prompt exercises
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalCategory {
    /// Understanding of dialectal phrasing
    DialectUnderstanding,
    /// Correct use of technical vocabulary
    TechnicalTerminology,
    /// Logical reasoning
    Reasoning,
    /// Following explicit instructions
    InstructionFollowing,
    /// Translation to or from Arabic
    Translation,
    /// Creative writing
    CreativeWriting,
    /// Code generation
    CodeGeneration,
    /// Culture and heritage knowledge
    CultureHeritage,
}

impl EvalCategory {
    /// Every category, in display order
    pub const ALL: [Self; 8] = [
        Self::DialectUnderstanding,
        Self::TechnicalTerminology,
        Self::Reasoning,
        Self::InstructionFollowing,
        Self::Translation,
        Self::CreativeWriting,
        Self::CodeGeneration,
        Self::CultureHeritage,
    ];

    /// Wire identifier
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DialectUnderstanding => "dialect_understanding",
            Self::TechnicalTerminology => "technical_terminology",
            Self::Reasoning => "reasoning",
            Self::InstructionFollowing => "instruction_following",
            Self::Translation => "translation",
            Self::CreativeWriting => "creative_writing",
            Self::CodeGeneration => "code_generation",
            Self::CultureHeritage => "culture_heritage",
        }
    }
}

impl fmt::Display for EvalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvalCategory {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownTag::new("category", s))
    }
}

/// A tag string that matched no known dialect or category
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownTag {
    kind: &'static str,
    value: String,
}

impl UnknownTag {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Job status as reported by the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalStatus {
    /// Accepted, not started
    Pending,
    /// Model calls in flight
    Running,
    /// Finished with results
    Completed,
    /// Finished without results
    Failed,
}

impl EvalStatus {
    /// Every status, in lifecycle order
    pub const ALL: [Self; 4] = [Self::Pending, Self::Running, Self::Completed, Self::Failed];

    /// `Completed` or `Failed`
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Wire identifier
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EvalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EvalStatus {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownTag::new("status", s))
    }
}

// ============================================================================
// Request
// ============================================================================

/// An evaluation job as submitted by the caller
///
/// Immutable once handed to the session controller. Callers are expected to
/// run [`EvaluationRequest::validate`] before submitting; the controller does
/// not re-validate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRequest {
    /// Prompt text
    pub prompt: String,
    /// Target dialect
    pub dialect: Dialect,
    /// Task category
    pub category: EvalCategory,
    /// Model identifiers to compare
    pub models: Vec<String>,
    /// Optional gold answer used by the scorer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_answer: Option<String>,
    /// Per-model output token budget
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl EvaluationRequest {
    /// Create a request with no token budget or reference answer
    pub fn new<I, S>(
        prompt: impl Into<String>,
        dialect: Dialect,
        category: EvalCategory,
        models: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prompt: prompt.into(),
            dialect,
            category,
            models: models.into_iter().map(Into::into).collect(),
            reference_answer: None,
            max_tokens: None,
        }
    }

    /// Set the output token budget
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the reference answer
    #[must_use]
    pub fn with_reference_answer(mut self, answer: impl Into<String>) -> Self {
        self.reference_answer = Some(answer.into());
        self
    }

    /// Token budget, falling back to `default` when the request has none
    #[must_use]
    pub fn max_tokens_or(&self, default: u32) -> u32 {
        self.max_tokens.unwrap_or(default)
    }

    /// Whether `model_id` is one of the requested models
    #[must_use]
    pub fn includes_model(&self, model_id: &str) -> bool {
        self.models.iter().any(|m| m == model_id)
    }

    /// Check the request against the backend's acceptance rules
    ///
    /// # Errors
    ///
    /// Returns the first rule the request violates.
    pub fn validate(&self) -> Result<(), RequestValidationError> {
        let prompt_chars = self.prompt.trim().chars().count();
        if prompt_chars < MIN_PROMPT_CHARS {
            return Err(RequestValidationError::PromptTooShort {
                chars: prompt_chars,
                min: MIN_PROMPT_CHARS,
            });
        }
        if prompt_chars > MAX_PROMPT_CHARS {
            return Err(RequestValidationError::PromptTooLong {
                chars: prompt_chars,
                max: MAX_PROMPT_CHARS,
            });
        }

        if self.models.len() < MIN_MODELS || self.models.len() > MAX_MODELS {
            return Err(RequestValidationError::ModelCount {
                count: self.models.len(),
            });
        }
        for (idx, model) in self.models.iter().enumerate() {
            if model.trim().is_empty() {
                return Err(RequestValidationError::EmptyModelId);
            }
            if self.models[..idx].contains(model) {
                return Err(RequestValidationError::DuplicateModel(model.clone()));
            }
        }

        if let Some(max_tokens) = self.max_tokens {
            if !(MIN_MAX_TOKENS..=MAX_MAX_TOKENS).contains(&max_tokens) {
                return Err(RequestValidationError::MaxTokensOutOfRange(max_tokens));
            }
        }

        Ok(())
    }
}

/// Reasons a request would be rejected by the backend
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RequestValidationError {
    /// Prompt shorter than the minimum
    #[error("prompt has {chars} characters, at least {min} required")]
    PromptTooShort {
        /// Characters after trimming
        chars: usize,
        /// Required minimum
        min: usize,
    },

    /// Prompt longer than the maximum
    #[error("prompt has {chars} characters, at most {max} allowed")]
    PromptTooLong {
        /// Characters after trimming
        chars: usize,
        /// Allowed maximum
        max: usize,
    },

    /// Wrong number of models
    #[error("{count} models selected, between 2 and 6 required")]
    ModelCount {
        /// Models in the request
        count: usize,
    },

    /// A model identifier is blank
    #[error("model identifiers must not be empty")]
    EmptyModelId,

    /// The same model was listed twice
    #[error("model '{0}' is listed more than once")]
    DuplicateModel(String),

    /// Token budget outside 64..=4096
    #[error("max_tokens {0} is outside 64..=4096")]
    MaxTokensOutOfRange(u32),
}

// ============================================================================
// Snapshot
// ============================================================================

/// Judge scores for one model response; all optional until scoring finishes
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreBreakdown {
    /// Language quality
    pub arabic_quality: Option<f64>,
    /// Factual accuracy
    pub accuracy: Option<f64>,
    /// Adherence to the requested dialect
    pub dialect_adherence: Option<f64>,
    /// Technical precision
    pub technical_precision: Option<f64>,
    /// Completeness
    pub completeness: Option<f64>,
    /// Cultural sensitivity
    pub cultural_sensitivity: Option<f64>,
    /// Weighted overall score
    pub overall: Option<f64>,
    /// Judge rationale
    pub reasoning: Option<String>,
}

/// Linguistic statistics computed over one model's output
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArabicMetrics {
    /// Whitespace token count
    pub token_count: u32,
    /// Share of Arabic script characters
    pub arabic_char_ratio: f64,
    /// Dialect the analyzer detected
    pub detected_dialect: String,
    /// Whether the detected dialect matches the requested one
    pub dialect_match: bool,
    /// Sentence count
    pub sentence_count: u32,
    /// Mean sentence length in tokens
    pub avg_sentence_length_tokens: f64,
    /// Count of formal register markers
    pub formal_marker_count: u32,
    /// Count of technical terms
    pub technical_term_count: u32,
    /// Distinct words over total words
    pub unique_word_ratio: f64,
}

/// One model's answer inside an evaluation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    /// Model identifier
    pub model_id: String,
    /// Display name
    pub model_name: String,
    /// Provider name
    pub provider: String,
    /// Generated text
    #[serde(default)]
    pub response_text: Option<String>,
    /// Wall-clock latency
    #[serde(default)]
    pub latency_ms: Option<i64>,
    /// Output tokens
    #[serde(default)]
    pub token_count: Option<u32>,
    /// Call cost
    #[serde(default)]
    pub cost_usd: Option<f64>,
    /// Provider error, if the call failed
    #[serde(default)]
    pub error: Option<String>,
    /// Judge scores
    #[serde(default)]
    pub scores: ScoreBreakdown,
    /// Linguistic statistics
    #[serde(default)]
    pub arabic_metrics: Option<ArabicMetrics>,
}

/// The job as last reported by the backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Backend-assigned identifier
    pub id: String,
    /// Echoed prompt
    pub prompt: String,
    /// Echoed dialect
    pub dialect: Dialect,
    /// Echoed category
    pub category: EvalCategory,
    /// Job status
    pub status: EvalStatus,
    /// Highest scoring model
    #[serde(default)]
    pub winner_model_id: Option<String>,
    /// Model identifiers ordered by overall score
    #[serde(default)]
    pub ranking: Vec<String>,
    /// Per-model results
    #[serde(default)]
    pub model_responses: Vec<ModelResponse>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Completion time
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Evaluation {
    /// Placeholder installed when a stream announces a new job
    ///
    /// Echoes the request fields, has no responses yet and is `Running`.
    #[must_use]
    pub fn skeleton(id: impl Into<String>, request: &EvaluationRequest) -> Self {
        Self {
            id: id.into(),
            prompt: request.prompt.clone(),
            dialect: request.dialect,
            category: request.category,
            status: EvalStatus::Running,
            winner_model_id: None,
            ranking: Vec::new(),
            model_responses: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Response for a given model, if present
    #[must_use]
    pub fn response_for(&self, model_id: &str) -> Option<&ModelResponse> {
        self.model_responses.iter().find(|r| r.model_id == model_id)
    }
}

/// Row in the evaluation history listing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EvaluationListItem {
    /// Identifier
    pub id: String,
    /// Prompt, truncated by the backend
    pub prompt: String,
    /// Dialect
    pub dialect: Dialect,
    /// Category
    pub category: EvalCategory,
    /// Status
    pub status: EvalStatus,
    /// Winner, once completed
    #[serde(default)]
    pub winner_model_id: Option<String>,
    /// Number of stored model responses
    #[serde(default)]
    pub model_count: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// One page of the evaluation history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PaginatedEvaluations {
    /// Rows on this page
    pub items: Vec<EvaluationListItem>,
    /// Total rows across pages
    pub total: u64,
    /// 1-based page number
    pub page: u32,
    /// Rows per page
    pub page_size: u32,
    /// Page count
    pub pages: u32,
}

/// Static metadata for a model known to the backend
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Identifier used in requests
    pub id: String,
    /// Display name
    pub name: String,
    /// Provider
    pub provider: String,
    /// Tier label
    pub tier: String,
    /// Description
    pub description: String,
    /// Context window in tokens
    pub context_window: u32,
    /// Max output tokens
    pub max_output_tokens: u32,
    /// Input price per 1k tokens
    pub cost_per_1k_input_usd: f64,
    /// Output price per 1k tokens
    pub cost_per_1k_output_usd: f64,
    /// Handles Arabic at all
    pub supports_arabic: bool,
    /// Trained primarily on Arabic
    pub arabic_native: bool,
    /// Currently callable
    pub available: bool,
}

/// Backend health report
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Overall status
    pub status: String,
    /// Backend version
    pub version: String,
    /// Deployment environment
    #[serde(default)]
    pub environment: Option<String>,
    /// Database probe result
    #[serde(default)]
    pub database: Option<String>,
    /// Cache probe result
    #[serde(default)]
    pub redis: Option<String>,
}
