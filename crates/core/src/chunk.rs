//! Chunk types produced by the streaming core.

/// A finalized, speakable span of generated text.
///
/// Ids increase monotonically per run, starting at 0. Concatenating chunk
/// texts in id order reconstructs the generated text modulo the whitespace
/// dropped at chunk boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position in the run's chunk sequence
    pub id: u64,
    /// Trimmed chunk text, never empty
    pub text: String,
    /// Char offset of the first character in the run's accumulated text
    pub position: usize,
}

impl TextChunk {
    pub fn new(id: u64, text: impl Into<String>, position: usize) -> Self {
        Self {
            id,
            text: text.into(),
            position,
        }
    }
}

/// Synthesized audio for exactly one [`TextChunk`].
///
/// Never split or merged; the id always matches the source text chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Matches the source text chunk's id
    pub id: u64,
    /// Encoded audio (WAV container)
    pub payload: Vec<u8>,
}

impl AudioChunk {
    pub fn new(id: u64, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    /// Payload size in bytes
    pub fn byte_len(&self) -> usize {
        self.payload.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_chunk_new() {
        let chunk = TextChunk::new(3, "Hello there.", 42);
        assert_eq!(chunk.id, 3);
        assert_eq!(chunk.text, "Hello there.");
        assert_eq!(chunk.position, 42);
    }

    #[test]
    fn test_audio_chunk_byte_len() {
        let chunk = AudioChunk::new(0, vec![0u8; 128]);
        assert_eq!(chunk.byte_len(), 128);
    }
}
