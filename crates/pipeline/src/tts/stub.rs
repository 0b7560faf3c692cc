//! Development synthesizer.

use async_trait::async_trait;

use speakstream_core::audio::pcm_to_wav;

use super::SpeechSynthesizer;
use crate::PipelineError;

/// Emits silence sized to the text, roughly 50 ms per character, as a WAV
/// payload. Stands in for a real engine during development and tests.
pub struct SilenceSynthesizer {
    sample_rate: u32,
}

impl SilenceSynthesizer {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }
}

#[async_trait]
impl SpeechSynthesizer for SilenceSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PipelineError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::Synthesis("empty text".to_string()));
        }

        let samples_per_char = self.sample_rate as usize / 20;
        let samples = vec![0.0f32; text.chars().count() * samples_per_char];

        pcm_to_wav(&samples, self.sample_rate).map_err(|e| PipelineError::Synthesis(e.to_string()))
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
