//! WebSocket Handler
//!
//! One orchestrator per connection. Inbound chat messages start runs;
//! outbound messages flow through a bounded queue drained by a writer task,
//! so a slow client backpressures the pipeline instead of growing memory.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use speakstream_core::{ClientMessage, ServerMessage};
use speakstream_pipeline::{
    OrchestratorConfig, PipelineError, SegmenterConfig, StreamOrchestrator,
};

use crate::rate_limit::RateLimiter;
use crate::session::Connection;
use crate::state::AppState;

/// WebSocket handler
pub struct ChatHandler;

impl ChatHandler {
    /// Handle WebSocket upgrade
    pub async fn handle(
        ws: WebSocketUpgrade,
        State(state): State<AppState>,
    ) -> Result<Response, axum::http::StatusCode> {
        let connection = state
            .connections
            .register()
            .map_err(axum::http::StatusCode::from)?;

        let rate_limiter = RateLimiter::new(state.config.server.rate_limit.clone());

        Ok(ws.on_upgrade(move |socket| Self::handle_socket(socket, connection, state, rate_limiter)))
    }

    /// Handle one WebSocket connection
    async fn handle_socket(
        socket: WebSocket,
        connection: Arc<Connection>,
        state: AppState,
        mut rate_limiter: RateLimiter,
    ) {
        let (mut sink, mut stream) = socket.split();

        // bounded outbound queue; the pipeline blocks when it fills
        let (outbound_tx, mut outbound_rx) =
            mpsc::channel::<ServerMessage>(state.config.server.outbound_queue);

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode outbound message");
                        continue;
                    }
                };
                if sink.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        });

        // flips when the connection goes away; observed by the run and both
        // of its workers
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let orchestrator = Arc::new(StreamOrchestrator::new(
            state.token_source.clone(),
            state.synthesizer.clone(),
            OrchestratorConfig {
                segmenter: SegmenterConfig {
                    min_chunk_size: state.config.chunking.min_chunk_size,
                    max_chunk_size: state.config.chunking.max_chunk_size,
                },
                ..OrchestratorConfig::default()
            },
        ));

        let mut run_task: Option<tokio::task::JoinHandle<()>> = None;

        while let Some(message) = stream.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    if rate_limiter.check_message().is_err() {
                        tracing::warn!(connection_id = %connection.id, "rate limit exceeded");
                        let _ = outbound_tx
                            .send(ServerMessage::Error {
                                data: "rate limit exceeded".to_string(),
                            })
                            .await;
                        continue;
                    }

                    connection.record_message();

                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Chat { message }) => {
                            Self::handle_chat(
                                message,
                                &orchestrator,
                                &outbound_tx,
                                &cancel_rx,
                                &mut run_task,
                            )
                            .await;
                        }
                        Ok(ClientMessage::Ping) => {
                            let _ = outbound_tx.send(ServerMessage::Pong).await;
                        }
                        Err(_) => {
                            let _ = outbound_tx
                                .send(ServerMessage::Error {
                                    data: "invalid message format".to_string(),
                                })
                                .await;
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::debug!(connection_id = %connection.id, error = %e, "websocket error");
                    break;
                }
                _ => {}
            }
        }

        // connection gone: cancel the in-flight run, stop the writer, and
        // make sure nothing is emitted past this point
        let _ = cancel_tx.send(true);
        if let Some(task) = run_task {
            task.abort();
        }
        writer.abort();
        state.connections.remove(&connection.id);

        tracing::info!(connection_id = %connection.id, "websocket closed");
    }

    /// Start a run for an inbound chat message, or reject it.
    async fn handle_chat(
        message: String,
        orchestrator: &Arc<StreamOrchestrator>,
        outbound: &mpsc::Sender<ServerMessage>,
        cancel: &watch::Receiver<bool>,
        run_task: &mut Option<tokio::task::JoinHandle<()>>,
    ) {
        if message.trim().is_empty() {
            let _ = outbound
                .send(ServerMessage::Error {
                    data: "empty message".to_string(),
                })
                .await;
            return;
        }

        let running = run_task.as_ref().is_some_and(|task| !task.is_finished());
        if running || orchestrator.is_busy() {
            let _ = outbound
                .send(ServerMessage::Error {
                    data: "a response is already being generated".to_string(),
                })
                .await;
            return;
        }

        let orchestrator = orchestrator.clone();
        let outbound = outbound.clone();
        let cancel = cancel.clone();

        *run_task = Some(tokio::spawn(async move {
            match orchestrator.run_chat(&message, outbound.clone(), cancel).await {
                Ok(_) => {}
                Err(PipelineError::Busy) => {
                    let _ = outbound
                        .send(ServerMessage::Error {
                            data: "a response is already being generated".to_string(),
                        })
                        .await;
                }
                // failures and cancellation are logged and surfaced by the
                // orchestrator itself
                Err(_) => {}
            }
        }));
    }
}
