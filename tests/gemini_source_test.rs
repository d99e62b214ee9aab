//! Gemini token source against a mock upstream

use std::sync::Arc;

use futures_util::StreamExt;
use tokenrelay::client::RelayClient;
use tokenrelay::error::RelayError;
use tokenrelay::provider::{GeminiClient, GeminiConfig, TokenSource};
use tokenrelay::server::RelayOptions;
use tokenrelay::streaming::MalformedPolicy;
use tokenrelay::types::Prompt;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "support/relay_fixture.rs"]
mod support;

const STREAM_PATH: &str = "/v1beta/models/gemini-1.5-flash:streamGenerateContent";
const GENERATE_PATH: &str = "/v1beta/models/gemini-1.5-flash:generateContent";

fn client_for(server: &MockServer) -> GeminiClient {
    let config = GeminiConfig::new("test-key").with_base_url(format!("{}/v1beta", server.uri()));
    GeminiClient::new(config).expect("client")
}

fn sse_fixture(name: &str) -> ResponseTemplate {
    let body = support::load_fixture_bytes(&format!("tests/fixtures/gemini/{name}.sse"))
        .expect("load fixture");
    ResponseTemplate::new(200).set_body_raw(body, "text/event-stream")
}

async fn collect(client: &GeminiClient, prompt: &str) -> Vec<Result<String, RelayError>> {
    let handle = client
        .start(&Prompt::new(prompt).unwrap())
        .await
        .expect("stream should open");
    handle.stream.collect().await
}

#[tokio::test]
async fn streams_text_parts_as_fragments() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .and(query_param("alt", "sse"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": "Say hello" }] }]
        })))
        .respond_with(sse_fixture("simple_text_then_finish"))
        .expect(1)
        .mount(&server)
        .await;

    let items = collect(&client_for(&server), "Say hello").await;
    let fragments: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(fragments, vec!["Hello", " world"]);
}

#[tokio::test]
async fn thought_parts_are_not_relayed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(sse_fixture("thought_then_text"))
        .mount(&server)
        .await;

    let items = collect(&client_for(&server), "hi").await;
    let fragments: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
    assert_eq!(fragments, vec!["Hi there"]);
}

#[tokio::test]
async fn error_payload_ends_stream_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(sse_fixture("error_mid_stream"))
        .mount(&server)
        .await;

    let items = collect(&client_for(&server), "hi").await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].as_ref().unwrap(), "Partial");
    match &items[1] {
        Err(RelayError::ApiError { code, message, .. }) => {
            assert_eq!(*code, 503);
            assert!(message.contains("overloaded"));
        }
        other => panic!("unexpected item: {other:?}"),
    }
}

#[tokio::test]
async fn forbidden_maps_to_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "error": { "code": 403, "message": "Permission denied", "status": "PERMISSION_DENIED" }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .start(&Prompt::new("hi").unwrap())
        .await
        .unwrap_err();
    match err {
        RelayError::AuthenticationError(msg) => assert_eq!(
            msg,
            "API key is invalid or doesn't have proper permissions. Please check your Gemini API key."
        ),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn invalid_key_message_maps_to_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": { "code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT" }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .start(&Prompt::new("hi").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::AuthenticationError(ref m) if m.contains("valid Gemini API key")));
}

#[tokio::test]
async fn server_error_maps_to_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "error": { "code": 500, "message": "Internal error encountered.", "status": "INTERNAL" }
        })))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .start(&Prompt::new("hi").unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::ApiError { code: 500, .. }), "got {err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn generate_returns_joined_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Hello" }, { "text": ", world!" }] },
                "finishReason": "STOP"
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = client_for(&server)
        .generate(&Prompt::new("hi").unwrap())
        .await
        .unwrap();
    assert_eq!(text, "Hello, world!");
}

#[tokio::test]
async fn missing_key_never_reaches_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = GeminiClient::new(
        GeminiConfig::default().with_base_url(format!("{}/v1beta", server.uri())),
    )
    .unwrap();
    let err = client.start(&Prompt::new("hi").unwrap()).await.unwrap_err();
    assert!(matches!(err, RelayError::ConfigurationError(ref m) if m.contains("GEMINI_API_KEY")));
}

#[tokio::test]
async fn relays_gemini_stream_end_to_end() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(STREAM_PATH))
        .respond_with(sse_fixture("simple_text_then_finish"))
        .mount(&server)
        .await;

    let relay = support::spawn_relay(Arc::new(client_for(&server)), RelayOptions::production()).await;
    let outcome = RelayClient::new(&relay.base_url)
        .stream("Say hello", MalformedPolicy::FailFast, |_| {})
        .await
        .unwrap();

    assert!(!outcome.is_incomplete());
    assert_eq!(outcome.text(), "Hello world");
    relay.stop().await;
}
