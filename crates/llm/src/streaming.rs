//! Streaming Token Generation
//!
//! Channel plumbing between a generation worker and its consumer. The
//! consumer half is cancellable; producers observe cancellation and stop
//! without being polled again.

use tokio::sync::{mpsc, watch};

/// Generation event
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    /// New token generated
    Token(String),
    /// Generation finished normally
    Complete,
    /// Generation aborted with an error
    Error(String),
}

/// Consumer half: a cancellable, finite stream of generation events.
pub struct StreamingGenerator {
    rx: mpsc::Receiver<GenerationEvent>,
    cancel_tx: watch::Sender<bool>,
    text: String,
    finished: bool,
}

impl StreamingGenerator {
    /// Create a connected sink/generator pair.
    pub fn channel(buffer: usize) -> (GenerationSink, StreamingGenerator) {
        let (tx, rx) = mpsc::channel(buffer);
        let (cancel_tx, cancel_rx) = watch::channel(false);

        (
            GenerationSink { tx, cancel_rx },
            StreamingGenerator {
                rx,
                cancel_tx,
                text: String::new(),
                finished: false,
            },
        )
    }

    /// Next event, or `None` once the stream has ended.
    ///
    /// A producer that goes away without sending `Complete` ends the stream
    /// the same way a `Complete` does.
    pub async fn next_event(&mut self) -> Option<GenerationEvent> {
        if self.finished {
            return None;
        }

        match self.rx.recv().await {
            Some(GenerationEvent::Token(token)) => {
                self.text.push_str(&token);
                Some(GenerationEvent::Token(token))
            }
            Some(event) => {
                self.finished = true;
                Some(event)
            }
            None => {
                self.finished = true;
                None
            }
        }
    }

    /// Ask the producer to stop. Tokens already queued are discarded.
    pub fn cancel(&mut self) {
        let _ = self.cancel_tx.send(true);
        self.rx.close();
        self.finished = true;
    }

    /// Full text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Has the stream ended (complete, error, or cancelled)?
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// Producer half handed to a [`TokenSource`](crate::TokenSource) worker.
#[derive(Clone)]
pub struct GenerationSink {
    tx: mpsc::Sender<GenerationEvent>,
    cancel_rx: watch::Receiver<bool>,
}

impl GenerationSink {
    /// Send one token. Returns `false` when the consumer cancelled or went
    /// away; producers must stop at that point.
    pub async fn token(&self, token: impl Into<String>) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.tx
            .send(GenerationEvent::Token(token.into()))
            .await
            .is_ok()
    }

    /// Signal normal end of generation.
    pub async fn complete(self) {
        let _ = self.tx.send(GenerationEvent::Complete).await;
    }

    /// Signal a fatal generation error.
    pub async fn error(self, message: impl Into<String>) {
        let _ = self.tx.send(GenerationEvent::Error(message.into())).await;
    }

    /// Has the consumer cancelled this run?
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }
}
