//! Common test utilities for `Holo` integration tests.
//!
//! This module provides shared functionality for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use holo_core::connection::{memory, Connection};
use holo_core::file::MemorySink;
use holo_core::room::RoomId;
use holo_core::session::RoomSession;
use holo_core::transfer::{Chunker, Transfer, TransferId, TransferState};

/// Create a temporary directory for test files.
///
/// The directory will be automatically cleaned up when the returned
/// `TempDir` is dropped.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &std::path::Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Two sessions in the same room over an in-memory relay.
///
/// Returns `(sender, receiver, receiver_sink)`.
pub async fn session_pair(chunk_size: usize) -> (RoomSession, RoomSession, MemorySink) {
    let room = RoomId::parse("itest1").expect("room id");
    let (a, b) = memory::pair();
    let sink = MemorySink::new();

    let sender = RoomSession::with_connection(
        room.clone(),
        Connection::from_transport(a),
        MemorySink::new(),
        Chunker::new(chunk_size),
    );
    let receiver = RoomSession::with_connection(
        room,
        Connection::from_transport(b),
        sink.clone(),
        Chunker::new(chunk_size),
    );

    sender.wait_until_connected().await.expect("sender connects");
    receiver.wait_until_connected().await.expect("receiver connects");

    (sender, receiver, sink)
}

/// Wait until a transfer reaches `state` on `session`.
///
/// Completed incoming transfers are only returned once their artifact has
/// been delivered.
pub async fn wait_for_state(session: &RoomSession, id: &TransferId, state: TransferState) -> Transfer {
    let reached = |t: &Transfer| {
        &t.id == id
            && t.state == state
            && !(state == TransferState::Complete
                && t.direction == holo_core::transfer::TransferDirection::Incoming
                && t.artifact.is_none())
    };

    let mut events = session.subscribe();
    if let Some(t) = session.transfer(id).await {
        if reached(&t) {
            return t;
        }
    }

    let wait = async {
        loop {
            match events.recv().await {
                Ok(t) if reached(&t) => return t,
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    if let Some(t) = session.transfer(id).await {
                        if reached(&t) {
                            return t;
                        }
                    }
                }
                Err(e) => panic!("transfer events ended: {e}"),
            }
        }
    };

    tokio::time::timeout(std::time::Duration::from_secs(10), wait)
        .await
        .expect("timed out waiting for transfer state")
}

type Peers = Arc<Mutex<HashMap<usize, mpsc::UnboundedSender<Message>>>>;

/// A minimal relay: every data frame from one client goes to all others.
pub struct TestRelay {
    addr: SocketAddr,
    peers: Peers,
}

impl TestRelay {
    /// Start a relay on a free local port.
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind relay");
        let addr = listener.local_addr().expect("relay address");
        let peers: Peers = Arc::default();

        let accept_peers = Arc::clone(&peers);
        tokio::spawn(async move {
            let mut next_id = 0usize;
            while let Ok((stream, _)) = listener.accept().await {
                let id = next_id;
                next_id += 1;
                tokio::spawn(serve_peer(stream, id, Arc::clone(&accept_peers)));
            }
        });

        Self { addr, peers }
    }

    /// Base URL clients should use.
    pub fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Wait until `n` clients are attached.
    pub async fn wait_for_peers(&self, n: usize) {
        let wait = async {
            while self.peers.lock().await.len() < n {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(5), wait)
            .await
            .expect("timed out waiting for relay peers");
    }

    /// Close every client connection with a reason.
    pub async fn close_all(&self, reason: &'static str) {
        for tx in self.peers.lock().await.values() {
            let _ = tx.send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: reason.into(),
            })));
        }
    }
}

async fn serve_peer(stream: tokio::net::TcpStream, id: usize, peers: Peers) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    peers.lock().await.insert(id, tx);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let closing = message.is_close();
            if sink.send(message).await.is_err() || closing {
                break;
            }
        }
    });

    while let Some(Ok(message)) = source.next().await {
        if message.is_close() {
            break;
        }
        if message.is_binary() || message.is_text() {
            for (peer, tx) in peers.lock().await.iter() {
                if *peer != id {
                    let _ = tx.send(message.clone());
                }
            }
        }
    }

    peers.lock().await.remove(&id);
    writer.abort();
}
