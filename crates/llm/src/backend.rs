//! Token source backends.

use std::time::Duration;

use async_trait::async_trait;

use crate::streaming::StreamingGenerator;
use crate::LlmError;

/// A cancellable producer of response tokens.
///
/// Implementations must be safe to invoke from multiple concurrent runs.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Start generating a response for `prompt`. The returned generator
    /// yields tokens until `Complete` or `Error`; cancelling it stops the
    /// producer.
    async fn start(&self, prompt: &str) -> Result<StreamingGenerator, LlmError>;
}

/// Development backend that streams a canned acknowledgement of the prompt,
/// one word at a time, with a configurable inter-token delay. Stands in for
/// a real model so the rest of the stack can run without weights.
pub struct EchoBackend {
    token_delay: Duration,
    max_tokens: usize,
}

impl EchoBackend {
    pub fn new(token_delay: Duration, max_tokens: usize) -> Self {
        Self {
            token_delay,
            max_tokens,
        }
    }

    fn compose_reply(prompt: &str) -> String {
        format!(
            "You said: \"{}\". This reply is streamed token by token from the \
             development backend. Each sentence is segmented as it arrives, \
             synthesized, and delivered to the client as its own chunk.",
            prompt.trim()
        )
    }
}

#[async_trait]
impl TokenSource for EchoBackend {
    async fn start(&self, prompt: &str) -> Result<StreamingGenerator, LlmError> {
        let (sink, generator) = StreamingGenerator::channel(32);
        let reply = Self::compose_reply(prompt);
        let delay = self.token_delay;
        let max_tokens = self.max_tokens;

        tokio::spawn(async move {
            for token in reply.split_inclusive(' ').take(max_tokens) {
                if !sink.token(token).await {
                    tracing::debug!("echo generation cancelled");
                    return;
                }
                tokio::time::sleep(delay).await;
            }
            sink.complete().await;
        });

        Ok(generator)
    }
}
