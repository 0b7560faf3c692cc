//! Run orchestration state machine.
//!
//! Drives one generation run end to end: tokens stream into the segmenter,
//! finalized chunks go to synthesis, and text/audio protocol messages flow
//! out in nondecreasing chunk-id order. Audio for chunk N always precedes
//! the text and audio of chunk N+1, because the client schedules each
//! chunk's playback relative to the previous chunk's end.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use speakstream_core::{ChunkPayload, ServerMessage, TextChunk};
use speakstream_llm::{GenerationEvent, TokenSource};

use crate::segmenter::{Segmenter, SegmenterConfig};
use crate::synthesis::{cancelled, SynthesisEvent, SynthesisPipeline, SynthesisQueue};
use crate::tts::SpeechSynthesizer;
use crate::PipelineError;

/// Run lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No active run
    Idle,
    /// Token source producing; chunks streaming out
    Generating,
    /// Tokens exhausted; waiting for synthesis to drain
    Draining,
    /// Run finished; completion message sent
    Done,
    /// Run aborted with a fatal error
    Failed,
}

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Segmentation thresholds
    pub segmenter: SegmenterConfig,
    /// Synthesis queue depth per run
    pub synthesis_queue: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            synthesis_queue: 32,
        }
    }
}

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    /// The reassembled response text
    pub full_text: String,
    /// Chunks submitted for synthesis
    pub chunks: usize,
    /// Chunks whose synthesis failed (text was still delivered)
    pub failed_chunks: usize,
}

/// Coordinates one connection's generation runs.
///
/// One instance per connection; a run claims the orchestrator for its whole
/// lifetime, so two chat messages can never interleave their output.
pub struct StreamOrchestrator {
    token_source: Arc<dyn TokenSource>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
    config: OrchestratorConfig,
    state: Mutex<RunState>,
}

impl StreamOrchestrator {
    pub fn new(
        token_source: Arc<dyn TokenSource>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            token_source,
            synthesizer,
            config,
            state: Mutex::new(RunState::Idle),
        }
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Is a run currently claiming this orchestrator?
    pub fn is_busy(&self) -> bool {
        matches!(self.state(), RunState::Generating | RunState::Draining)
    }

    /// Run one complete chat turn, emitting protocol messages on `outbound`.
    ///
    /// Returns [`PipelineError::Busy`] without emitting anything when a run
    /// is already active. Flipping `cancel` stops the run silently: no
    /// further messages are emitted and the generation worker is told to
    /// stop.
    pub async fn run_chat(
        &self,
        message: &str,
        outbound: mpsc::Sender<ServerMessage>,
        cancel: watch::Receiver<bool>,
    ) -> Result<RunSummary, PipelineError> {
        self.claim()?;
        let run_id = uuid::Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, "starting generation run");

        let result = self.drive(&run_id, message, &outbound, cancel).await;

        match &result {
            Ok(summary) => {
                tracing::info!(
                    run_id = %run_id,
                    chunks = summary.chunks,
                    failed = summary.failed_chunks,
                    "run complete"
                );
            }
            Err(PipelineError::Cancelled) => {
                tracing::debug!(run_id = %run_id, "run cancelled");
            }
            Err(PipelineError::ChannelClosed) => {
                tracing::debug!(run_id = %run_id, "transport closed mid-run");
            }
            Err(e) => {
                *self.state.lock() = RunState::Failed;
                tracing::error!(run_id = %run_id, error = %e, "run failed");
                let _ = outbound
                    .send(ServerMessage::Error {
                        data: e.to_string(),
                    })
                    .await;
            }
        }

        *self.state.lock() = RunState::Idle;
        result
    }

    /// Claim the orchestrator for a new run.
    fn claim(&self) -> Result<(), PipelineError> {
        let mut state = self.state.lock();
        match *state {
            RunState::Generating | RunState::Draining => Err(PipelineError::Busy),
            _ => {
                *state = RunState::Generating;
                Ok(())
            }
        }
    }

    async fn drive(
        &self,
        run_id: &str,
        message: &str,
        outbound: &mpsc::Sender<ServerMessage>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<RunSummary, PipelineError> {
        let mut generator = self
            .token_source
            .start(message)
            .await
            .map_err(|e| PipelineError::Generation(e.to_string()))?;

        let (queue, mut synth_events) = SynthesisPipeline::spawn(
            self.synthesizer.clone(),
            cancel.clone(),
            self.config.synthesis_queue,
        );

        let mut run = ActiveRun {
            outbound,
            queue: Some(queue),
            pending_texts: VecDeque::new(),
            next_audio_id: 0,
            submitted: 0,
            failed_chunks: 0,
        };

        run.send(ServerMessage::ResponseStart).await?;

        let mut segmenter = Segmenter::new(self.config.segmenter.clone());
        let mut generating = true;

        loop {
            tokio::select! {
                biased;

                _ = cancelled(&mut cancel) => {
                    generator.cancel();
                    return Err(PipelineError::Cancelled);
                }

                event = generator.next_event(), if generating => match event {
                    Some(GenerationEvent::Token(token)) => {
                        for chunk in segmenter.feed(&token) {
                            run.dispatch(chunk).await?;
                        }
                    }
                    Some(GenerationEvent::Error(reason)) => {
                        return Err(PipelineError::Generation(reason));
                    }
                    Some(GenerationEvent::Complete) | None => {
                        generating = false;
                        if let Some(chunk) = segmenter.flush() {
                            run.dispatch(chunk).await?;
                        }
                        // closing the queue lets the worker drain and exit
                        run.queue = None;
                        *self.state.lock() = RunState::Draining;
                    }
                },

                event = synth_events.recv() => match event {
                    Some(event) => run.on_synthesis_event(event).await?,
                    None => break, // worker exited: every submitted chunk resolved
                },
            }
        }

        *self.state.lock() = RunState::Done;

        let full_text = generator.text().trim().to_string();
        run.send(ServerMessage::ResponseComplete {
            full_text: full_text.clone(),
        })
        .await?;

        Ok(RunSummary {
            run_id: run_id.to_string(),
            full_text,
            chunks: run.submitted,
            failed_chunks: run.failed_chunks,
        })
    }
}

/// Mutable state of one in-flight run.
struct ActiveRun<'a> {
    outbound: &'a mpsc::Sender<ServerMessage>,
    queue: Option<SynthesisQueue>,
    /// Finalized chunks whose text message is gated on earlier audio
    pending_texts: VecDeque<TextChunk>,
    /// Chunk id whose audio (or failure) is expected next
    next_audio_id: u64,
    submitted: usize,
    failed_chunks: usize,
}

impl ActiveRun<'_> {
    async fn send(&self, message: ServerMessage) -> Result<(), PipelineError> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }

    /// Queue a finalized chunk: its text message goes out as soon as the
    /// ordering gate allows, the chunk itself goes to the synthesis worker.
    async fn dispatch(&mut self, chunk: TextChunk) -> Result<(), PipelineError> {
        self.pending_texts.push_back(chunk.clone());
        self.emit_ready_texts().await?;

        let submitted = match &self.queue {
            Some(queue) => queue.submit(chunk).await,
            None => false,
        };
        if !submitted {
            return Err(PipelineError::Cancelled);
        }
        self.submitted += 1;
        Ok(())
    }

    async fn on_synthesis_event(&mut self, event: SynthesisEvent) -> Result<(), PipelineError> {
        // the text for this id always precedes its audio
        self.emit_ready_texts().await?;

        match event {
            SynthesisEvent::Audio(chunk) => {
                self.send(ServerMessage::Chunk {
                    data: ChunkPayload::audio(&chunk),
                })
                .await?;
            }
            SynthesisEvent::Failed { chunk_id, reason } => {
                self.failed_chunks += 1;
                self.send(ServerMessage::Chunk {
                    data: ChunkPayload::Error {
                        data: format!("synthesis failed for chunk {chunk_id}: {reason}"),
                    },
                })
                .await?;
            }
        }

        self.next_audio_id += 1;
        self.emit_ready_texts().await
    }

    /// Emit queued text messages whose predecessors' audio has resolved.
    async fn emit_ready_texts(&mut self) -> Result<(), PipelineError> {
        while self
            .pending_texts
            .front()
            .is_some_and(|chunk| chunk.id <= self.next_audio_id)
        {
            if let Some(chunk) = self.pending_texts.pop_front() {
                self.send(ServerMessage::Chunk {
                    data: ChunkPayload::text(&chunk),
                })
                .await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use speakstream_llm::{LlmError, StreamingGenerator};

    use super::*;

    /// Scripted token source: emits fixed tokens with a delay, optionally
    /// erroring partway through, and counts what it actually produced.
    struct ScriptedSource {
        tokens: Vec<&'static str>,
        delay: Duration,
        fail_after: Option<usize>,
        produced: Arc<AtomicUsize>,
    }

    impl ScriptedSource {
        fn new(tokens: Vec<&'static str>, delay: Duration) -> Self {
            Self {
                tokens,
                delay,
                fail_after: None,
                produced: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing_after(mut self, count: usize) -> Self {
            self.fail_after = Some(count);
            self
        }
    }

    #[async_trait]
    impl TokenSource for ScriptedSource {
        async fn start(&self, _prompt: &str) -> Result<StreamingGenerator, LlmError> {
            let (sink, generator) = StreamingGenerator::channel(8);
            let tokens: Vec<String> = self.tokens.iter().map(|t| t.to_string()).collect();
            let delay = self.delay;
            let fail_after = self.fail_after;
            let produced = self.produced.clone();

            tokio::spawn(async move {
                for (i, token) in tokens.into_iter().enumerate() {
                    if fail_after == Some(i) {
                        sink.error("model exploded").await;
                        return;
                    }
                    if !sink.token(token).await {
                        return;
                    }
                    produced.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                }
                sink.complete().await;
            });

            Ok(generator)
        }
    }

    /// Synthesizer with per-call latency and scripted failures.
    struct TestSynth {
        latencies_ms: Vec<u64>,
        fail_calls: HashSet<usize>,
        calls: AtomicUsize,
    }

    impl TestSynth {
        fn instant() -> Self {
            Self::with_latencies(vec![])
        }

        fn with_latencies(latencies_ms: Vec<u64>) -> Self {
            Self {
                latencies_ms,
                fail_calls: HashSet::new(),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing_on(mut self, calls: impl IntoIterator<Item = usize>) -> Self {
            self.fail_calls = calls.into_iter().collect();
            self
        }
    }

    #[async_trait]
    impl SpeechSynthesizer for TestSynth {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let latency = self.latencies_ms.get(call).copied().unwrap_or(0);
            if latency > 0 {
                tokio::time::sleep(Duration::from_millis(latency)).await;
            }
            if self.fail_calls.contains(&call) {
                return Err(PipelineError::Synthesis("engine exploded".to_string()));
            }
            Ok(text.as_bytes().to_vec())
        }

        fn sample_rate(&self) -> u32 {
            22050
        }
    }

    /// Five short sentences, each its own chunk.
    fn five_sentence_tokens() -> Vec<&'static str> {
        vec![
            "One one one. ",
            "Two two two. ",
            "Three three three. ",
            "Four four four. ",
            "Five five five.",
        ]
    }

    fn orchestrator(
        source: ScriptedSource,
        synth: TestSynth,
    ) -> Arc<StreamOrchestrator> {
        Arc::new(StreamOrchestrator::new(
            Arc::new(source),
            Arc::new(synth),
            OrchestratorConfig::default(),
        ))
    }

    async fn collect_run(
        orchestrator: Arc<StreamOrchestrator>,
        message: &str,
    ) -> (Result<RunSummary, PipelineError>, Vec<ServerMessage>) {
        let (tx, mut rx) = mpsc::channel(64);
        let (_cancel_tx, cancel_rx) = watch::channel(false);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.run_chat(message, tx, cancel_rx),
        )
        .await
        .expect("run should finish");

        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        (result, messages)
    }

    /// (kind, chunk_id) per chunk message, in emission order.
    fn chunk_sequence(messages: &[ServerMessage]) -> Vec<(&'static str, Option<u64>)> {
        messages
            .iter()
            .filter_map(|msg| match msg {
                ServerMessage::Chunk { data } => Some(match data {
                    ChunkPayload::Text { chunk_id, .. } => ("text", Some(*chunk_id)),
                    ChunkPayload::Audio { chunk_id, .. } => ("audio", Some(*chunk_id)),
                    ChunkPayload::Error { .. } => ("error", None),
                }),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_full_run_emits_ordered_pairs() {
        let orchestrator = orchestrator(
            ScriptedSource::new(five_sentence_tokens(), Duration::ZERO),
            TestSynth::instant(),
        );

        let (result, messages) = collect_run(orchestrator, "hello").await;
        let summary = result.unwrap();
        assert_eq!(summary.chunks, 5);
        assert_eq!(summary.failed_chunks, 0);

        assert!(matches!(messages.first(), Some(ServerMessage::ResponseStart)));
        assert!(matches!(
            messages.last(),
            Some(ServerMessage::ResponseComplete { .. })
        ));

        // strict text/audio alternation per chunk id
        let expected: Vec<(&str, Option<u64>)> = (0..5)
            .flat_map(|id| [("text", Some(id)), ("audio", Some(id))])
            .collect();
        assert_eq!(chunk_sequence(&messages), expected);
    }

    #[tokio::test]
    async fn test_varied_latencies_keep_audio_ordered() {
        let orchestrator = orchestrator(
            ScriptedSource::new(five_sentence_tokens(), Duration::from_millis(1)),
            TestSynth::with_latencies(vec![40, 5, 25, 0, 15]),
        );

        let (result, messages) = collect_run(orchestrator, "hello").await;
        assert_eq!(result.unwrap().chunks, 5);

        let audio_ids: Vec<u64> = chunk_sequence(&messages)
            .into_iter()
            .filter(|(kind, _)| *kind == "audio")
            .filter_map(|(_, id)| id)
            .collect();
        assert_eq!(audio_ids, vec![0, 1, 2, 3, 4]);

        // audio for chunk N precedes any message about chunk N+1
        let mut next_allowed = 0u64;
        for (kind, id) in chunk_sequence(&messages) {
            if let Some(id) = id {
                assert!(id <= next_allowed, "{kind} {id} emitted too early");
                if kind == "audio" {
                    next_allowed = id + 1;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_isolated() {
        let orchestrator = orchestrator(
            ScriptedSource::new(five_sentence_tokens(), Duration::ZERO),
            TestSynth::instant().failing_on([2]),
        );

        let (result, messages) = collect_run(orchestrator, "hello").await;
        let summary = result.unwrap();
        assert_eq!(summary.chunks, 5);
        assert_eq!(summary.failed_chunks, 1);

        let sequence = chunk_sequence(&messages);
        let text_ids: Vec<u64> = sequence
            .iter()
            .filter(|(kind, _)| *kind == "text")
            .filter_map(|(_, id)| *id)
            .collect();
        let audio_ids: Vec<u64> = sequence
            .iter()
            .filter(|(kind, _)| *kind == "audio")
            .filter_map(|(_, id)| *id)
            .collect();

        // every text chunk still arrives, audio skips the failed one
        assert_eq!(text_ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(audio_ids, vec![0, 1, 3, 4]);
        assert_eq!(sequence.iter().filter(|(k, _)| *k == "error").count(), 1);
        assert!(matches!(
            messages.last(),
            Some(ServerMessage::ResponseComplete { .. })
        ));
    }

    #[tokio::test]
    async fn test_busy_while_generating() {
        let orchestrator = orchestrator(
            ScriptedSource::new(five_sentence_tokens(), Duration::from_millis(20)),
            TestSynth::instant(),
        );

        let (tx, mut rx) = mpsc::channel(64);
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        let first = tokio::spawn({
            let orchestrator = orchestrator.clone();
            let tx = tx.clone();
            let cancel_rx = cancel_rx.clone();
            async move { orchestrator.run_chat("first", tx, cancel_rx).await }
        });

        // wait until the first run has visibly started
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("response_start")
            .expect("channel open");
        assert!(orchestrator.is_busy());

        let (tx2, mut rx2) = mpsc::channel(64);
        let second = orchestrator.run_chat("second", tx2, cancel_rx).await;
        assert!(matches!(second, Err(PipelineError::Busy)));
        assert!(rx2.try_recv().is_err(), "busy run must emit nothing");

        let summary = tokio::time::timeout(Duration::from_secs(5), first)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(summary.chunks, 5);
        assert_eq!(orchestrator.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_generation_failure_is_fatal_but_recoverable() {
        let orchestrator = orchestrator(
            ScriptedSource::new(five_sentence_tokens(), Duration::ZERO).failing_after(2),
            TestSynth::instant(),
        );

        let (result, messages) = collect_run(orchestrator.clone(), "hello").await;
        assert!(matches!(result, Err(PipelineError::Generation(_))));

        assert!(matches!(messages.first(), Some(ServerMessage::ResponseStart)));
        assert!(matches!(messages.last(), Some(ServerMessage::Error { .. })));
        assert!(!messages
            .iter()
            .any(|m| matches!(m, ServerMessage::ResponseComplete { .. })));

        // the connection stays usable for a fresh run
        assert_eq!(orchestrator.state(), RunState::Idle);
        let (result, _) = collect_run(orchestrator, "again").await;
        assert!(result.is_err()); // same scripted failure, but the run starts
    }

    #[tokio::test]
    async fn test_cancellation_stops_everything() {
        let source = ScriptedSource::new(vec!["Tok tok tok. "; 50], Duration::from_millis(10));
        let produced = source.produced.clone();
        let orchestrator = orchestrator(source, TestSynth::instant());

        let (tx, mut rx) = mpsc::channel(64);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let run = tokio::spawn({
            let orchestrator = orchestrator.clone();
            async move { orchestrator.run_chat("hello", tx, cancel_rx).await }
        });

        // let a few tokens through, then pull the plug
        tokio::time::sleep(Duration::from_millis(35)).await;
        cancel_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), run)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(PipelineError::Cancelled)));

        // drain whatever was emitted before the cancel, then confirm silence
        while rx.try_recv().is_ok() {}
        let produced_at_cancel = produced.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err(), "no messages after cancellation");
        assert!(
            produced.load(Ordering::SeqCst) <= produced_at_cancel + 1,
            "token production should stop"
        );
        assert_eq!(orchestrator.state(), RunState::Idle);
    }
}
