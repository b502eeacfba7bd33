//! Transport Layer
//!
//! Two ways to run an evaluation and watch it:
//! - Streaming: one WebSocket per run, per-token frames (`stream_adapter`)
//! - Polling: create over REST, then fetch status on a timer (`polling`)
//!
//! Both adapters run as spawned tasks and report through an
//! [`EventSink`]; neither touches session state.

pub mod factory;
pub mod frame;
pub mod http;
pub mod lifecycle;
pub mod polling;
pub mod stream_adapter;
pub mod traits;
#[cfg(feature = "websocket")]
pub mod websocket;

// Re-exports for convenience
pub use factory::{create_transports, Transports};
pub use frame::{decode_frame, ConfigFrame, InboundFrame};
pub use http::{HttpEvaluationApi, ListQuery};
pub use lifecycle::{CancelSignal, EventSink, TransportHandle};
pub use polling::{run_polling, PollSettings};
pub use stream_adapter::run_stream;
pub use traits::{ApiError, EvaluationApi, FrameStream, StreamConnector, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::WsConnector;
