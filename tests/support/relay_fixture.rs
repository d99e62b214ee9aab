//! Test fixtures utilities: load SSE fixtures and run a relay on a real listener
#![allow(dead_code)]

use std::io;
use std::sync::Arc;

use tokenrelay::error::RelayError;
use tokenrelay::provider::TokenSource;
use tokenrelay::server::{RelayOptions, RelayState, serve};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Read a fixture file as raw bytes.
pub fn load_fixture_bytes(path: &str) -> io::Result<Vec<u8>> {
    std::fs::read(path)
}

/// Split `bytes` into chunks of `size` bytes, as a byte channel would deliver them.
pub fn chunked(bytes: &[u8], size: usize) -> Vec<Result<Vec<u8>, RelayError>> {
    bytes.chunks(size.max(1)).map(|c| Ok(c.to_vec())).collect()
}

/// A relay served on an ephemeral local port.
pub struct RunningRelay {
    pub base_url: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), RelayError>>,
}

impl RunningRelay {
    /// Stop accepting connections and wait for open sessions to drain.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.task
            .await
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

pub async fn spawn_relay(source: Arc<dyn TokenSource>, options: RelayOptions) -> RunningRelay {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel::<()>();
    let state = RelayState::new(source, options);
    let task = tokio::spawn(serve(listener, state, async move {
        let _ = rx.await;
    }));
    RunningRelay {
        base_url: format!("http://{addr}"),
        shutdown: Some(tx),
        task,
    }
}
