//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Text chunking thresholds
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Token generation configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Settings {
    /// Create default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunking.min_chunk_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunking.min_chunk_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.chunking.min_chunk_size >= self.chunking.max_chunk_size {
            return Err(ConfigError::InvalidValue {
                field: "chunking.max_chunk_size".to_string(),
                message: format!(
                    "must be greater than min_chunk_size ({})",
                    self.chunking.min_chunk_size
                ),
            });
        }

        if self.server.outbound_queue == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.outbound_queue".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.synthesis.sample_rate < 8000 {
            return Err(ConfigError::InvalidValue {
                field: "synthesis.sample_rate".to_string(),
                message: "sample rate too low (minimum 8000 Hz)".to_string(),
            });
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent WebSocket connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Outbound message queue capacity per connection.
    ///
    /// When the queue fills (a slow client), the pipeline blocks rather
    /// than dropping messages.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8000
}
fn default_max_connections() -> usize {
    256
}
fn default_outbound_queue() -> usize {
    64
}
fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            outbound_queue: default_outbound_queue(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Enable rate limiting
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum inbound messages per second per connection
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: u32,

    /// Burst allowance (multiple of the rate limit)
    #[serde(default = "default_burst_multiplier")]
    pub burst_multiplier: f32,
}

fn default_messages_per_second() -> u32 {
    20
}
fn default_burst_multiplier() -> f32 {
    2.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            messages_per_second: default_messages_per_second(),
            burst_multiplier: default_burst_multiplier(),
        }
    }
}

/// Text chunking thresholds, in characters.
///
/// The sentence-over-length tie-break is fixed; only the thresholds are
/// tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Never finalize a chunk below this many chars (except at end of run)
    #[serde(default = "default_min_chunk_size")]
    pub min_chunk_size: usize,

    /// Length cap applied when no sentence boundary appears
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
}

fn default_min_chunk_size() -> usize {
    10
}
fn default_max_chunk_size() -> usize {
    100
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_chunk_size: default_min_chunk_size(),
            max_chunk_size: default_max_chunk_size(),
        }
    }
}

/// Token generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Maximum tokens per response
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,

    /// Sampling temperature (forwarded to the model backend)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling threshold (forwarded to the model backend)
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Inter-token delay for the built-in echo backend, in milliseconds
    #[serde(default = "default_token_delay_ms")]
    pub token_delay_ms: u64,
}

fn default_max_new_tokens() -> usize {
    512
}
fn default_temperature() -> f32 {
    0.7
}
fn default_top_p() -> f32 {
    0.9
}
fn default_token_delay_ms() -> u64 {
    10
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: default_max_new_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            token_delay_ms: default_token_delay_ms(),
        }
    }
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Output sample rate in Hz
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Voice/speaker ID (forwarded to the synthesis backend)
    #[serde(default)]
    pub voice: Option<String>,
}

fn default_sample_rate() -> u32 {
    22050
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            voice: None,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (SPEAKSTREAM prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder = builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("SPEAKSTREAM")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
