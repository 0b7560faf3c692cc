//! Wire protocol exchanged with the browser client.
//!
//! Messages travel as JSON over WebSocket text frames. Audio payloads are
//! base64-encoded WAV so the client can hand them straight to
//! `decodeAudioData`.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

use crate::chunk::{AudioChunk, TextChunk};

/// Messages received from the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a generation run
    Chat { message: String },
    /// Liveness probe
    Ping,
}

/// Messages sent to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A run entered generation
    ResponseStart,
    /// One text/audio/error chunk of the active run
    Chunk { data: ChunkPayload },
    /// Run finished; carries the reassembled response text
    ResponseComplete { full_text: String },
    /// Fatal run error (the connection stays usable)
    Error { data: String },
    Pong,
}

/// Chunk payloads inside [`ServerMessage::Chunk`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChunkPayload {
    /// A finalized text span
    Text { data: String, chunk_id: u64 },
    /// Base64-encoded WAV for one text chunk
    Audio { data: String, chunk_id: u64 },
    /// Non-fatal synthesis failure for one chunk
    Error { data: String },
}

impl ChunkPayload {
    pub fn text(chunk: &TextChunk) -> Self {
        Self::Text {
            data: chunk.text.clone(),
            chunk_id: chunk.id,
        }
    }

    pub fn audio(chunk: &AudioChunk) -> Self {
        Self::Audio {
            data: BASE64.encode(&chunk.payload),
            chunk_id: chunk.id,
        }
    }
}
