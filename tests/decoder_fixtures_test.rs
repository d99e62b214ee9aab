//! Decoder behaviour on recorded relay bodies delivered in arbitrary chunks

use futures_util::StreamExt;
use tokenrelay::error::RelayError;
use tokenrelay::streaming::{
    MalformedPolicy, StreamOutcome, Termination, consume_byte_stream, delta_stream,
};

#[path = "support/relay_fixture.rs"]
mod support;

#[tokio::test]
async fn hello_world_decodes_identically_for_every_chunk_size() {
    let bytes = support::load_fixture_bytes("tests/fixtures/relay/hello_world.sse").unwrap();
    for size in 1..=bytes.len() {
        let mut deltas = Vec::new();
        let outcome = consume_byte_stream(
            futures_util::stream::iter(support::chunked(&bytes, size)),
            MalformedPolicy::FailFast,
            |d| deltas.push(d.delta.to_string()),
        )
        .await;

        match outcome {
            StreamOutcome::Completed { text, termination } => {
                assert_eq!(text, "Hello, world!", "chunk size {size}");
                assert_eq!(termination, Termination::Sentinel);
            }
            other => panic!("chunk size {size}: {other:?}"),
        }
        assert_eq!(deltas, vec!["Hello", ", ", "world!"], "chunk size {size}");
    }
}

#[tokio::test]
async fn noisy_body_skips_comments_and_malformed_lines() {
    let bytes = support::load_fixture_bytes("tests/fixtures/relay/noisy_crlf.sse").unwrap();
    for size in [1, 3, 7, bytes.len()] {
        let outcome = consume_byte_stream(
            futures_util::stream::iter(support::chunked(&bytes, size)),
            MalformedPolicy::Drop,
            |_| {},
        )
        .await;
        assert!(!outcome.is_incomplete(), "chunk size {size}: {outcome:?}");
        assert_eq!(outcome.text(), "Hello");
    }
}

#[tokio::test]
async fn noisy_body_fails_fast_on_malformed_line() {
    let bytes = support::load_fixture_bytes("tests/fixtures/relay/noisy_crlf.sse").unwrap();
    let outcome = consume_byte_stream(
        futures_util::stream::iter(support::chunked(&bytes, 5)),
        MalformedPolicy::FailFast,
        |_| {},
    )
    .await;

    match outcome {
        StreamOutcome::Failed { partial_text, error } => {
            assert_eq!(partial_text, "Hel");
            assert!(matches!(error, RelayError::MalformedFrame { .. }));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn truncated_body_is_incomplete_not_failed() {
    let bytes = support::load_fixture_bytes("tests/fixtures/relay/hello_world.sse").unwrap();
    let cut = bytes.len() - "data: [DONE]\n\n".len();
    let outcome = consume_byte_stream(
        futures_util::stream::iter(support::chunked(&bytes[..cut], 4)),
        MalformedPolicy::Drop,
        |_| {},
    )
    .await;

    assert!(outcome.is_completed());
    assert!(outcome.is_incomplete());
    assert!(matches!(
        outcome,
        StreamOutcome::Completed { termination: Termination::EndOfData, .. }
    ));
}

#[tokio::test]
async fn delta_stream_yields_fragments_in_order() {
    let bytes = support::load_fixture_bytes("tests/fixtures/relay/hello_world.sse").unwrap();
    let deltas: Vec<String> = delta_stream(
        futures_util::stream::iter(support::chunked(&bytes, 2)),
        MalformedPolicy::Drop,
    )
    .map(|r| r.unwrap())
    .collect()
    .await;
    assert_eq!(deltas.concat(), "Hello, world!");
    assert_eq!(deltas.len(), 3);
}
