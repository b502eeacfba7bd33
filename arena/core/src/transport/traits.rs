//! Transport Traits
//!
//! The session controller never names a concrete network type. It talks to
//! two injected capabilities:
//! - `StreamConnector`: opens the duplex evaluation socket (`FrameStream`)
//! - `EvaluationApi`: the create/fetch pair used by the polling path
//!
//! Tests substitute scripted implementations of both.

use async_trait::async_trait;
use thiserror::Error;

use crate::evaluation::{Evaluation, EvaluationRequest};

/// Errors raised by the streaming socket
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening the connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    /// The peer closed the connection
    #[error("Connection closed")]
    ConnectionClosed,
    /// Writing a frame failed
    #[error("Send failed: {0}")]
    SendFailed(String),
    /// Reading a frame failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),
    /// An outbound frame could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),
    /// Opening the connection took longer than allowed
    #[error("Connection timed out after {0}ms")]
    Timeout(u64),
}

/// Errors raised by the REST API
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Non-success response; `code` and `message` come from the error envelope
    #[error("{message}")]
    Request {
        /// HTTP status
        status: u16,
        /// Machine-readable code
        code: String,
        /// Human-readable message
        message: String,
    },
    /// The request never produced a response
    #[error("Network error: {0}")]
    Network(String),
    /// A success response had an unexpected body
    #[error("Unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status, when a response was received
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            Self::Network(_) | Self::Decode(_) => None,
        }
    }
}

/// An open evaluation socket carrying JSON text frames
#[async_trait]
pub trait FrameStream: Send {
    /// Send one text frame
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound text frame; `None` once the peer has closed
    ///
    /// Control and binary frames are skipped by implementations.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens evaluation sockets
///
/// Its presence is the "streaming is available" capability: a controller
/// built without a connector always polls.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Open a new connection
    async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError>;
}

/// Job creation and status lookup
#[async_trait]
pub trait EvaluationApi: Send + Sync {
    /// Submit a job; the backend answers with a pending snapshot
    async fn create_evaluation(&self, request: &EvaluationRequest)
        -> Result<Evaluation, ApiError>;

    /// Latest snapshot of a job
    async fn fetch_evaluation(&self, evaluation_id: &str) -> Result<Evaluation, ApiError>;
}
