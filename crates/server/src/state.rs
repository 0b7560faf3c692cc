//! Application State
//!
//! Shared state across all handlers. The generation and synthesis engines
//! are process-wide singletons shared by every connection's orchestrator.

use std::sync::Arc;

use speakstream_config::Settings;
use speakstream_llm::TokenSource;
use speakstream_pipeline::SpeechSynthesizer;

use crate::session::ConnectionRegistry;

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Configuration
    pub config: Arc<Settings>,
    /// Live connection registry
    pub connections: Arc<ConnectionRegistry>,
    /// Token generation engine
    pub token_source: Arc<dyn TokenSource>,
    /// Speech synthesis engine
    pub synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: Settings,
        token_source: Arc<dyn TokenSource>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        let max_connections = config.server.max_connections;
        Self {
            config: Arc::new(config),
            connections: Arc::new(ConnectionRegistry::new(max_connections)),
            token_source,
            synthesizer,
        }
    }
}
