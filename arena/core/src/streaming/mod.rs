//! Partial Output While Streaming
//!
//! While an evaluation streams, every model produces text independently. The
//! [`TokenMultiplexer`] keeps one append-only buffer per model so fragments
//! from different models never interleave, and [`ModelStreamState`] tracks
//! where each model is in its own stream.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    TokenMultiplexer                      │
//! │  ┌────────────────┐  ┌────────────────┐                  │
//! │  │  ModelBuffer   │  │  ModelBuffer   │  ...             │
//! │  │  (model: a)    │  │  (model: b)    │                  │
//! │  │  "he" + "llo"  │  │  "مرحبا"        │                  │
//! │  └────────────────┘  └────────────────┘                  │
//! │          ▲                   ▲                           │
//! │          └──── append(model, fragment) ─────             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! # Guarantees
//!
//! - **No cross-contamination**: appending for one model never touches another
//! - **Arrival order**: fragments for the same model concatenate in the order
//!   they were appended
//! - **Pure data**: no I/O and no locking; the session controller is the only
//!   writer

mod model_state;
mod token_buffers;

pub use model_state::ModelStreamState;
pub use token_buffers::{BufferStats, ModelBuffer, TokenMultiplexer};
