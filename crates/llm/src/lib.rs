//! Token generation boundary.
//!
//! The model itself is an external collaborator. This crate defines the
//! trait the orchestrator consumes, a channel-backed streaming wrapper for
//! producers, and a development backend that needs no model weights.

pub mod backend;
pub mod streaming;

pub use backend::{EchoBackend, TokenSource};
pub use streaming::{GenerationEvent, GenerationSink, StreamingGenerator};

use thiserror::Error;

/// Token generation errors
#[derive(Debug, Error, Clone)]
pub enum LlmError {
    #[error("generation error: {0}")]
    Generation(String),

    #[error("channel closed")]
    ChannelClosed,
}
