//! Streaming orchestration core
//!
//! This crate turns an incremental token stream into ordered text and audio
//! protocol messages:
//! - Sentence-aware text segmentation without full-response lookahead
//! - An ordered, single-worker synthesis pipeline per run
//! - The run state machine coordinating both ends

pub mod orchestrator;
pub mod segmenter;
pub mod synthesis;
pub mod tts;

pub use orchestrator::{OrchestratorConfig, RunState, RunSummary, StreamOrchestrator};
pub use segmenter::{Segmenter, SegmenterConfig};
pub use synthesis::{SynthesisEvent, SynthesisPipeline, SynthesisQueue};
pub use tts::{SilenceSynthesizer, SpeechSynthesizer};

use thiserror::Error;

/// Pipeline errors
#[derive(Debug, Error, Clone)]
pub enum PipelineError {
    #[error("generation failed: {0}")]
    Generation(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("a response is already being generated")]
    Busy,

    #[error("run cancelled")]
    Cancelled,

    #[error("channel closed")]
    ChannelClosed,
}
