//! SpeakStream Server Entry Point

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use speakstream_config::{load_settings, Settings};
use speakstream_llm::EchoBackend;
use speakstream_pipeline::SilenceSynthesizer;
use speakstream_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration first (tracing init needs observability settings)
    let config = load_settings(std::env::var("SPEAKSTREAM_ENV").ok().as_deref())?;
    init_tracing(&config);

    tracing::info!("starting SpeakStream server v{}", env!("CARGO_PKG_VERSION"));

    // Development engines; real model backends plug in behind the same traits
    let token_source = Arc::new(EchoBackend::new(
        Duration::from_millis(config.generation.token_delay_ms),
        config.generation.max_new_tokens,
    ));
    let synthesizer = Arc::new(SilenceSynthesizer::new(config.synthesis.sample_rate));

    let host: std::net::IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::from((host, config.server.port));

    let state = AppState::new(config, token_source, synthesizer);
    let app = create_router(state);

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, initiating graceful shutdown");
        }
    }
}

/// Initialize tracing from observability settings.
fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("{},tower_http=info", config.observability.log_level).into()
    });

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
