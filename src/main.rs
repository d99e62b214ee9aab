//! `tokenrelay` server binary
//!
//! ```bash
//! GEMINI_API_KEY=... RELAY_LOG_LEVEL=debug cargo run
//! curl -N -X POST localhost:3000/api/generate -d '{"prompt":"Write a haiku"}'
//! ```

use std::sync::Arc;

use tokenrelay::config::RelayConfig;
use tokenrelay::error::RelayError;
use tokenrelay::provider::{GeminiClient, TokenSource};
use tokenrelay::server::{RelayState, serve};
use tokenrelay::telemetry;

#[tokio::main]
async fn main() -> Result<(), RelayError> {
    let _guard = telemetry::init_from_env()?;
    let config = RelayConfig::from_env()?;

    if !config.provider.has_api_key() {
        tracing::warn!("GEMINI_API_KEY is not set; every session will fail with a configuration error");
    }

    let source: Arc<dyn TokenSource> = Arc::new(GeminiClient::new(config.provider.clone())?);
    let state = RelayState::new(source, config.relay_options());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| {
            RelayError::configuration(format!("failed to bind {}: {e}", config.bind_addr))
        })?;
    tracing::info!(
        addr = %config.bind_addr,
        model = %config.provider.model,
        session_timeout_secs = config.session_timeout.map(|d| d.as_secs()),
        mask_errors = config.mask_errors,
        "relay listening"
    );

    serve(listener, state, shutdown_signal()).await?;
    tracing::info!("relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested; draining open sessions");
}
