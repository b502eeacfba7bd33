//! WebSocket Evaluation Socket
//!
//! tokio-tungstenite implementation of [`StreamConnector`] for the backend's
//! `/ws/evaluate` endpoint. Only text frames carry protocol data; ping, pong
//! and binary frames are skipped, and a close frame ends the stream.
//!
//! Compiled only with the `websocket` feature. Without it the transport
//! factory reports streaming as unavailable and every session polls.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::traits::{FrameStream, StreamConnector, TransportError};
use crate::config::ArenaConfig;

/// Opens `/ws/evaluate` connections
#[derive(Clone, Debug)]
pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Connector for a full socket URL
    #[must_use]
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }

    /// Connector for the configured streaming endpoint
    #[must_use]
    pub fn from_config(config: &ArenaConfig) -> Self {
        Self::new(config.ws_evaluate_url(), config.connect_timeout())
    }

    /// URL this connector dials
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError> {
        tracing::debug!(url = %self.url, "Opening evaluation socket");
        let connecting = tokio_tungstenite::connect_async(self.url.as_str());
        let (inner, _response) = tokio::time::timeout(self.connect_timeout, connecting)
            .await
            .map_err(|_| {
                TransportError::Timeout(
                    u64::try_from(self.connect_timeout.as_millis()).unwrap_or(u64::MAX),
                )
            })?
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        Ok(Box::new(WsFrameStream { inner }))
    }
}

/// An open evaluation socket
pub struct WsFrameStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

fn is_closed(e: &WsError) -> bool {
    matches!(e, WsError::ConnectionClosed | WsError::AlreadyClosed)
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "Peer closed evaluation socket");
                    return None;
                }
                Ok(Message::Binary(_) | Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) if is_closed(&e) => return None,
                Err(e) => return Some(Err(TransportError::ReceiveFailed(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match SinkExt::close(&mut self.inner).await {
            Ok(()) => Ok(()),
            Err(e) if is_closed(&e) => Ok(()),
            Err(e) => Err(TransportError::SendFailed(e.to_string())),
        }
    }
}
