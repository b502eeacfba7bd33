//! REST Client
//!
//! reqwest-backed implementation of [`EvaluationApi`] plus the read-only
//! queries the backend offers (history, model registry, health).
//!
//! # Endpoints
//!
//! - `POST /api/v1/evaluations/run` - create a job (202, pending snapshot)
//! - `GET  /api/v1/evaluations/{id}` - latest snapshot
//! - `GET  /api/v1/evaluations?page&page_size&dialect&status` - history
//! - `GET  /api/v1/models` / `GET /api/v1/models/{id}` - registry
//! - `GET  /api/v1/health` - health probe
//!
//! Non-success responses carry `{"error": {"code", "message"}}`; anything
//! else falls back to `UNKNOWN_ERROR` / `HTTP <status>`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::traits::{ApiError, EvaluationApi};
use crate::config::ArenaConfig;
use crate::evaluation::{
    Dialect, EvalStatus, Evaluation, EvaluationRequest, HealthStatus, ModelInfo,
    PaginatedEvaluations,
};

/// Code used when an error body has no envelope
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";

/// Filters and paging for the evaluation history
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListQuery {
    /// 1-based page
    pub page: u32,
    /// Rows per page
    pub page_size: u32,
    /// Only this dialect
    pub dialect: Option<Dialect>,
    /// Only this status
    pub status: Option<EvalStatus>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            dialect: None,
            status: None,
        }
    }
}

impl ListQuery {
    fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("page", self.page.to_string()),
            ("page_size", self.page_size.to_string()),
        ];
        if let Some(dialect) = self.dialect {
            pairs.push(("dialect", dialect.to_string()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.to_string()));
        }
        pairs
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Build an [`ApiError`] from a non-success status and its body
#[must_use]
pub fn error_from_response(status: u16, body: &str) -> ApiError {
    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => (envelope.error.code, envelope.error.message),
        Err(_) => (None, None),
    };
    ApiError::Request {
        status,
        code: code.unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string()),
        message: message.unwrap_or_else(|| format!("HTTP {status}")),
    }
}

/// HTTP client for the evaluation backend
#[derive(Clone)]
pub struct HttpEvaluationApi {
    base_url: String,
    http_client: reqwest::Client,
}

impl HttpEvaluationApi {
    /// Create a client for `base_url` (scheme and host, no `/api/v1`)
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Network` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Create from the loaded configuration
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Network` if the HTTP client cannot be built.
    pub fn from_config(config: &ArenaConfig) -> Result<Self, ApiError> {
        Self::new(config.api_base_url.clone(), config.request_timeout())
    }

    /// Full URL for an API path such as `/evaluations/run`
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}{path}", self.base_url, crate::config::API_PREFIX)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status.as_u16(), &body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let response = self
            .http_client
            .get(self.endpoint(path))
            .query(query)
            .send()
            .await
            .map_err(network_error)?;
        Self::decode(response).await
    }

    /// One page of past evaluations
    ///
    /// # Errors
    ///
    /// Returns the request failure.
    pub async fn list_evaluations(
        &self,
        query: &ListQuery,
    ) -> Result<PaginatedEvaluations, ApiError> {
        self.get_json("/evaluations", &query.to_pairs()).await
    }

    /// Every model the backend knows
    ///
    /// # Errors
    ///
    /// Returns the request failure.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ApiError> {
        self.get_json("/models", &[]).await
    }

    /// One model's metadata
    ///
    /// # Errors
    ///
    /// Returns the request failure; unknown ids come back as a 404 `Request`.
    pub async fn get_model(&self, model_id: &str) -> Result<ModelInfo, ApiError> {
        self.get_json(&format!("/models/{model_id}"), &[]).await
    }

    /// Backend health probe
    ///
    /// # Errors
    ///
    /// Returns the request failure.
    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        self.get_json("/health", &[]).await
    }
}

fn network_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() {
        ApiError::Network(format!("request timed out: {e}"))
    } else {
        ApiError::Network(e.to_string())
    }
}

#[async_trait]
impl EvaluationApi for HttpEvaluationApi {
    async fn create_evaluation(
        &self,
        request: &EvaluationRequest,
    ) -> Result<Evaluation, ApiError> {
        let response = self
            .http_client
            .post(self.endpoint("/evaluations/run"))
            .json(request)
            .send()
            .await
            .map_err(network_error)?;
        Self::decode(response).await
    }

    async fn fetch_evaluation(&self, evaluation_id: &str) -> Result<Evaluation, ApiError> {
        self.get_json(&format!("/evaluations/{evaluation_id}"), &[])
            .await
    }
}
