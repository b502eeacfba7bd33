//! Arena Core - Evaluation Session Controller
//!
//! Client-side core for a multi-model Arabic LLM evaluation backend. A caller
//! submits one evaluation job; the backend runs every model concurrently and
//! scores them. This crate watches the job, surfaces each model's partial
//! output as it streams, and converges on one definitive result.
//!
//! It has no UI dependencies. Renderers (the `arena` CLI, or anything else)
//! observe [`Session`] snapshots and never mutate them.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Rendering layer                           │
//! │          session() / updates()            submit() / reset()     │
//! └──────────────────────────┬───────────────────────┬───────────────┘
//!                            │ Session snapshots     │ Commands
//! ┌──────────────────────────┴───────────────────────┴───────────────┐
//! │                      SessionController (actor)                   │
//! │  ┌───────────────────────────────────────────────────────────┐   │
//! │  │ SessionMachine: status, evaluation, TokenMultiplexer,     │   │
//! │  │ generation guard, one-shot streaming → polling migration  │   │
//! │  └───────────────────────────────────────────────────────────┘   │
//! └──────────────────────────┬───────────────────────────────────────┘
//!                            │ TransportEvent (stamped with Generation)
//!            ┌───────────────┴────────────────┐
//!   ┌────────┴─────────┐            ┌─────────┴─────────┐
//!   │ Streaming adapter│            │  Polling adapter  │
//!   │ WebSocket frames │            │ REST create/fetch │
//!   └──────────────────┘            └───────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`SessionController`]: submit, reset and observe one evaluation at a time
//! - [`Session`]: the canonical snapshot (status, evaluation, partial tokens)
//! - [`EvaluationRequest`] / [`Evaluation`]: what goes in, what comes back
//! - [`Transports`]: the injected streaming and polling capabilities
//! - [`ArenaConfig`]: backend URLs, polling cadence and budget
//!
//! # Quick Start
//!
//! ```ignore
//! use arena_core::{load_config, Dialect, EvalCategory, EvaluationRequest, SessionController};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = load_config().await?;
//!     let controller = SessionController::from_config(&config)?;
//!
//!     let request = EvaluationRequest::new(
//!         "اشرح مفهوم التعلم العميق",
//!         Dialect::Msa,
//!         EvalCategory::TechnicalTerminology,
//!         ["gpt-4o", "jais-30b-chat"],
//!     );
//!     request.validate()?;
//!
//!     let session = controller.submit(request).await?;
//!     println!("{}: {:?}", session.status(), session.evaluation());
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`config`]: TOML / environment / CLI configuration
//! - [`controller`]: the actor and its handle
//! - [`evaluation`]: request and result data model
//! - [`events`]: transport events and generations
//! - [`session`]: the session state machine
//! - [`streaming`]: per-model token buffers
//! - [`transport`]: WebSocket and REST adapters

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod controller;
pub mod evaluation;
pub mod events;
pub mod session;
pub mod streaming;
pub mod transport;

// Re-exports for convenience
pub use config::{
    default_config_path, load_config, load_config_from_path, load_unvalidated_config_from_path,
    ArenaConfig, ArenaToml, ConfigError, ConfigOverrides, ConfigSource,
};
pub use controller::SessionController;
pub use evaluation::{
    ArabicMetrics, Dialect, EvalCategory, EvalStatus, Evaluation, EvaluationListItem,
    EvaluationRequest, HealthStatus, ModelInfo, ModelResponse, PaginatedEvaluations,
    RequestValidationError, ScoreBreakdown,
};
pub use events::{CompletionPayload, EventKind, Generation, TransportEvent, TransportKind};
pub use session::{Effect, Session, SessionError, SessionMachine, SessionStatus};
pub use streaming::{ModelStreamState, TokenMultiplexer};
pub use transport::{
    create_transports, ApiError, EvaluationApi, FrameStream, HttpEvaluationApi, ListQuery,
    PollSettings, StreamConnector, TransportError, Transports,
};
