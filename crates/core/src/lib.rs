//! Core types for SpeakStream
//!
//! This crate provides foundational types used across all other crates:
//! - Text and audio chunk types
//! - Wire protocol messages
//! - Audio encoding helpers
//! - Error types

pub mod audio;
pub mod chunk;
pub mod error;
pub mod protocol;

pub use chunk::{AudioChunk, TextChunk};
pub use error::{Error, Result};
pub use protocol::{ChunkPayload, ClientMessage, ServerMessage};
