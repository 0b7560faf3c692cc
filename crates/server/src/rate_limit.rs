//! Token bucket rate limiter for WebSocket connections
//!
//! Caps inbound message rate per connection so one chatty client cannot
//! monopolize the generation engines.

use std::time::Instant;

use thiserror::Error;

use speakstream_config::RateLimitConfig;

/// Rate limit errors
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("message rate exceeded")]
    MessageRateExceeded,
}

/// Token bucket rate limiter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Message tokens
    tokens: f32,
    /// Last refill time
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a new rate limiter with the given config
    pub fn new(config: RateLimitConfig) -> Self {
        let burst = config.messages_per_second as f32 * config.burst_multiplier;
        Self {
            config,
            tokens: burst,
            last_refill: Instant::now(),
        }
    }

    /// Refill tokens based on elapsed time
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed_secs = now.duration_since(self.last_refill).as_secs_f32();

        if elapsed_secs > 0.0 {
            let refill = elapsed_secs * self.config.messages_per_second as f32;
            let max = self.config.messages_per_second as f32 * self.config.burst_multiplier;
            self.tokens = (self.tokens + refill).min(max);
            self.last_refill = now;
        }
    }

    /// Check if a message may be handled (consuming a token if so)
    pub fn check_message(&mut self) -> Result<(), RateLimitError> {
        if !self.config.enabled {
            return Ok(());
        }

        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(RateLimitError::MessageRateExceeded)
        }
    }
}
