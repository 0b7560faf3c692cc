//! Configuration for the SpeakStream server.
//!
//! Settings load from `config/default`, an optional environment-named file,
//! and `SPEAKSTREAM__`-prefixed environment variables.

mod settings;

pub use settings::{
    load_settings, ChunkingConfig, GenerationConfig, ObservabilityConfig, RateLimitConfig,
    ServerConfig, Settings, SynthesisConfig,
};

use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config load error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
