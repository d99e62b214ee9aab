//! Axum router and handlers
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokenrelay::provider::ScriptedTokenSource;
//! use tokenrelay::server::{RelayOptions, RelayState, serve};
//!
//! let state = RelayState::new(
//!     Arc::new(ScriptedTokenSource::new(["Hello", ", ", "world!"])),
//!     RelayOptions::development(),
//! );
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
//! serve(listener, state, std::future::pending()).await?;
//! ```

use std::future::Future;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tracing::Instrument;

use super::RelayState;
use crate::error::RelayError;
use crate::streaming::{
    EncoderOptions, FrameByteStream, encode_fragment_stream, session_timeout_error,
};
use crate::types::{CompletionResponse, Prompt};

/// Build the relay router.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/api/generate", post(generate_stream))
        .route("/api/generate/complete", post(generate_complete))
        .with_state(state)
}

/// Serve the relay on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: RelayState, shutdown: F) -> Result<(), RelayError>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RelayError::InternalError(format!("server error: {e}")))
}

/// Wrap framed bytes into a `text/event-stream` response.
///
/// An `Err` item aborts the body, so clients observe a read failure rather
/// than a clean end-of-stream.
pub fn sse_response(frames: FrameByteStream) -> Response {
    let mut resp = Response::new(Body::from_stream(frames));
    let headers = resp.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    resp
}

fn error_response(state: &RelayState, err: &RelayError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(state.options().error_body(err))).into_response()
}

async fn generate_stream(State(state): State<RelayState>, body: Bytes) -> Response {
    let session_id = uuid::Uuid::new_v4().to_string();
    let prompt = match Prompt::from_json_body(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::debug!(session_id = %session_id, "rejected generate request: {e}");
            return error_response(&state, &e);
        }
    };

    let pipeline = state.pipeline();
    tracing::info!(
        session_id = %session_id,
        provider = pipeline.provider_id(),
        streaming = pipeline.supports_streaming(),
        prompt_chars = prompt.as_str().chars().count(),
        "starting stream session"
    );

    // One budget covers opening the upstream and streaming from it.
    let limit = state.options().session_timeout;
    let deadline = limit.map(|limit| tokio::time::Instant::now() + limit);

    let span = tracing::info_span!("relay_session", session_id = %session_id);
    let started = pipeline.stream(&prompt).instrument(span);
    let started = match deadline {
        Some(at) => match tokio::time::timeout_at(at, started).await {
            Ok(result) => result,
            Err(_) => Err(session_timeout_error(limit)),
        },
        None => started.await,
    };
    let handle = match started {
        Ok(h) => h,
        Err(e) => {
            tracing::warn!(session_id = %session_id, kind = %e.category(), error = %e, "stream session failed to start");
            return error_response(&state, &e);
        }
    };

    let mut opts = EncoderOptions::default().with_session_id(session_id);
    opts.session_timeout = limit;
    opts.deadline = deadline;
    sse_response(encode_fragment_stream(handle, opts))
}

async fn generate_complete(State(state): State<RelayState>, body: Bytes) -> Response {
    let prompt = match Prompt::from_json_body(&body) {
        Ok(p) => p,
        Err(e) => return error_response(&state, &e),
    };

    let pipeline = state.pipeline();
    let limit = state.options().session_timeout;
    let result = match limit {
        Some(budget) => match tokio::time::timeout(budget, pipeline.complete(&prompt)).await {
            Ok(result) => result,
            Err(_) => Err(session_timeout_error(limit)),
        },
        None => pipeline.complete(&prompt).await,
    };

    match result {
        Ok(text) => {
            tracing::info!(provider = pipeline.provider_id(), chars = text.chars().count(), "completion generated");
            Json(CompletionResponse { text }).into_response()
        }
        Err(e) => {
            tracing::warn!(kind = %e.category(), error = %e, "completion failed");
            error_response(&state, &e)
        }
    }
}
