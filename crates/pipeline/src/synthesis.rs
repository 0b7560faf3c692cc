//! Ordered synthesis pipeline.
//!
//! One worker per run: submitted chunks synthesize strictly in submission
//! order, so a fast chunk can never overtake a slow predecessor. A failed
//! chunk yields a failure event and the worker moves on; cancellation takes
//! effect even while a synthesis call is in flight.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use speakstream_core::{AudioChunk, TextChunk};

use crate::tts::SpeechSynthesizer;

/// Result of synthesizing one submitted chunk.
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    /// Audio ready for a chunk
    Audio(AudioChunk),
    /// Synthesis failed for a chunk; successors are unaffected
    Failed { chunk_id: u64, reason: String },
}

/// Submission handle for one run's synthesis worker.
///
/// Dropping the handle closes the queue: the worker finishes what was
/// submitted, then exits and closes the event channel.
pub struct SynthesisQueue {
    tx: mpsc::Sender<TextChunk>,
}

impl SynthesisQueue {
    /// Enqueue a chunk. Returns `false` if the worker has already stopped.
    pub async fn submit(&self, chunk: TextChunk) -> bool {
        self.tx.send(chunk).await.is_ok()
    }
}

/// Spawns per-run synthesis workers.
pub struct SynthesisPipeline;

impl SynthesisPipeline {
    /// Start a worker for one run.
    ///
    /// Events arrive on the returned receiver in strictly increasing
    /// chunk-id order. Flipping `cancel` (or dropping its sender) stops the
    /// worker promptly, abandoning any in-flight synthesis call.
    pub fn spawn(
        engine: Arc<dyn SpeechSynthesizer>,
        mut cancel: watch::Receiver<bool>,
        queue_depth: usize,
    ) -> (SynthesisQueue, mpsc::Receiver<SynthesisEvent>) {
        let (chunk_tx, mut chunk_rx) = mpsc::channel::<TextChunk>(queue_depth);
        let (event_tx, event_rx) = mpsc::channel::<SynthesisEvent>(queue_depth);

        tokio::spawn(async move {
            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = cancelled(&mut cancel) => break,
                    chunk = chunk_rx.recv() => match chunk {
                        Some(chunk) => chunk,
                        None => break,
                    },
                };

                let result = tokio::select! {
                    biased;
                    _ = cancelled(&mut cancel) => break,
                    result = engine.synthesize(&chunk.text) => result,
                };

                let event = match result {
                    Ok(payload) => SynthesisEvent::Audio(AudioChunk::new(chunk.id, payload)),
                    Err(e) => {
                        tracing::warn!(chunk_id = chunk.id, error = %e, "synthesis failed");
                        SynthesisEvent::Failed {
                            chunk_id: chunk.id,
                            reason: e.to_string(),
                        }
                    }
                };

                if event_tx.send(event).await.is_err() {
                    break;
                }
            }
            tracing::debug!("synthesis worker stopped");
        });

        (SynthesisQueue { tx: chunk_tx }, event_rx)
    }
}

/// Resolves once the cancel flag flips, or the sender side goes away.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    while !*cancel.borrow() {
        if cancel.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::PipelineError;

    /// Engine whose latency and failures vary per call.
    struct VaryingEngine {
        latencies_ms: Vec<u64>,
        fail_calls: Vec<usize>,
        calls: AtomicUsize,
    }

    impl VaryingEngine {
        fn new(latencies_ms: Vec<u64>, fail_calls: Vec<usize>) -> Self {
            Self {
                latencies_ms,
                fail_calls,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for VaryingEngine {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let latency = self.latencies_ms.get(call).copied().unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(latency)).await;

            if self.fail_calls.contains(&call) {
                return Err(PipelineError::Synthesis("engine exploded".to_string()));
            }
            Ok(text.as_bytes().to_vec())
        }

        fn sample_rate(&self) -> u32 {
            22050
        }
    }

    fn chunk(id: u64, text: &str) -> TextChunk {
        TextChunk::new(id, text, 0)
    }

    #[tokio::test]
    async fn test_events_arrive_in_submission_order() {
        let engine = Arc::new(VaryingEngine::new(vec![40, 5, 25, 0, 15], vec![]));
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let (queue, mut events) = SynthesisPipeline::spawn(engine, cancel_rx, 8);

        for id in 0..5 {
            assert!(queue.submit(chunk(id, "some text here")).await);
        }
        drop(queue);

        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                SynthesisEvent::Audio(audio) => seen.push(audio.id),
                SynthesisEvent::Failed { chunk_id, .. } => seen.push(chunk_id),
            }
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_failure_does_not_block_successors() {
        let engine = Arc::new(VaryingEngine::new(vec![0, 0, 0], vec![1]));
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let (queue, mut events) = SynthesisPipeline::spawn(engine, cancel_rx, 8);

        for id in 0..3 {
            assert!(queue.submit(chunk(id, "text")).await);
        }
        drop(queue);

        let mut audio = Vec::new();
        let mut failed = Vec::new();
        while let Some(event) = events.recv().await {
            match event {
                SynthesisEvent::Audio(a) => audio.push(a.id),
                SynthesisEvent::Failed { chunk_id, .. } => failed.push(chunk_id),
            }
        }
        assert_eq!(audio, vec![0, 2]);
        assert_eq!(failed, vec![1]);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_stalled_synthesis() {
        // one call that would take far longer than the test allows
        let engine = Arc::new(VaryingEngine::new(vec![60_000], vec![]));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (queue, mut events) = SynthesisPipeline::spawn(engine, cancel_rx, 8);

        assert!(queue.submit(chunk(0, "stalls forever")).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel_tx.send(true).unwrap();

        let done = tokio::time::timeout(Duration::from_millis(200), events.recv()).await;
        assert!(done.expect("worker should stop quickly").is_none());
    }
}
