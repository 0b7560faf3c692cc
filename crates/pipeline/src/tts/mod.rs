//! Speech synthesis boundary.

mod stub;

pub use stub::SilenceSynthesizer;

use async_trait::async_trait;

use crate::PipelineError;

/// A text-to-speech engine.
///
/// Implementations must be safe to call from multiple concurrent runs; the
/// per-run synthesis worker never issues overlapping calls for one run, but
/// separate connections share the engine.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text` into an encoded (WAV) audio payload.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PipelineError>;

    /// Output sample rate in Hz.
    fn sample_rate(&self) -> u32;
}
