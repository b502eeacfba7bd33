//! Transport Factory
//!
//! Builds the capabilities a [`SessionController`](crate::SessionController)
//! is injected with. Streaming is present only when the crate was built with
//! the `websocket` feature and the configuration enables it; otherwise every
//! session goes straight to polling.

use std::sync::Arc;
use std::time::Duration;

use super::http::HttpEvaluationApi;
use super::polling::PollSettings;
use super::stream_adapter::DEFAULT_CLOSE_TIMEOUT;
use super::traits::{ApiError, EvaluationApi, StreamConnector};
use crate::config::ArenaConfig;

/// The transports available to one controller
#[derive(Clone)]
pub struct Transports {
    /// Socket connector; `None` when streaming is unavailable
    pub streaming: Option<Arc<dyn StreamConnector>>,
    /// REST create/fetch pair
    pub polling: Arc<dyn EvaluationApi>,
    /// Cadence and budget of the polling loop
    pub poll_settings: PollSettings,
    /// Budget placed in the config frame when a request has none
    pub default_max_tokens: u32,
    /// Longest wait for a socket close handshake
    pub close_timeout: Duration,
}

impl Transports {
    /// Polling-only transports
    #[must_use]
    pub fn polling_only(api: Arc<dyn EvaluationApi>, poll_settings: PollSettings) -> Self {
        Self {
            streaming: None,
            polling: api,
            poll_settings,
            default_max_tokens: crate::evaluation::DEFAULT_MAX_TOKENS,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Add a streaming connector
    #[must_use]
    pub fn with_streaming(mut self, connector: Arc<dyn StreamConnector>) -> Self {
        self.streaming = Some(connector);
        self
    }

    /// Override the default token budget
    #[must_use]
    pub fn with_default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }

    /// Override how long a socket close may take
    #[must_use]
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Whether sessions will try the socket first
    #[must_use]
    pub fn streaming_available(&self) -> bool {
        self.streaming.is_some()
    }
}

/// Build the network transports described by `config`
///
/// # Errors
///
/// Returns `ApiError::Network` if the HTTP client cannot be built.
pub fn create_transports(config: &ArenaConfig) -> Result<Transports, ApiError> {
    let api = HttpEvaluationApi::from_config(config)?;
    let transports = Transports::polling_only(Arc::new(api), config.poll_settings())
        .with_default_max_tokens(config.default_max_tokens)
        .with_close_timeout(config.connect_timeout());

    match streaming_connector(config) {
        Some(connector) => Ok(transports.with_streaming(connector)),
        None => {
            tracing::info!("Streaming unavailable, sessions will poll");
            Ok(transports)
        }
    }
}

#[cfg(feature = "websocket")]
fn streaming_connector(config: &ArenaConfig) -> Option<Arc<dyn StreamConnector>> {
    config.streaming_enabled.then(|| {
        Arc::new(super::websocket::WsConnector::from_config(config)) as Arc<dyn StreamConnector>
    })
}

#[cfg(not(feature = "websocket"))]
fn streaming_connector(_config: &ArenaConfig) -> Option<Arc<dyn StreamConnector>> {
    None
}
