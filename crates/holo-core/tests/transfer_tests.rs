//! End-to-end transfer tests over an in-memory relay.

mod common;

use holo_core::file::{ArtifactHandle, DirectorySink, MemorySource};
use holo_core::protocol::{self, ChunkMessage, Message, MetaMessage, TransferId};
use holo_core::room::RoomId;
use holo_core::session::RoomSession;
use holo_core::transfer::{Chunker, TransferDirection, TransferState};
use holo_core::Error;

use common::{create_temp_dir, create_test_file, random_bytes, session_pair, wait_for_state};

#[tokio::test]
async fn test_round_trip_is_byte_identical() {
    let p = 1024;
    let (sender, receiver, sink) = session_pair(p).await;

    for size in [0, 1, p - 1, p, p + 1, 10 * p + 7] {
        let data = random_bytes(size);
        let id = sender
            .send_source(MemorySource::new(data.clone()), format!("file-{size}"), "application/octet-stream")
            .await
            .expect("send");

        wait_for_state(&receiver, &id, TransferState::Complete).await;
        let artifact = sink.take(&id).await.expect("artifact delivered");
        assert_eq!(artifact.bytes.len(), size);
        assert_eq!(artifact.bytes, data, "size {size}");
    }

    let sent = sender.transfers().await;
    assert_eq!(sent.len(), 6);
    assert!(sent
        .iter()
        .all(|t| t.state == TransferState::Complete && t.direction == TransferDirection::Outgoing));
}

#[tokio::test]
async fn test_scenario_140000_bytes() {
    let (sender, receiver, sink) = session_pair(65_536).await;
    let data = random_bytes(140_000);

    let id = sender
        .send_source(MemorySource::new(data.clone()), "a.txt", "text/plain")
        .await
        .expect("send");

    let received = wait_for_state(&receiver, &id, TransferState::Complete).await;
    assert_eq!(received.name, "a.txt");
    assert_eq!(received.size, 140_000);
    assert_eq!(received.mime_type, "text/plain");
    assert_eq!(received.transferred_bytes, 140_000);
    assert_eq!(received.progress_percent(), 100);

    let artifact = sink.get(&id).await.expect("artifact");
    assert_eq!(artifact.bytes.len(), 140_000);
    assert_eq!(artifact.bytes, data);
}

#[tokio::test]
async fn test_zero_byte_file() {
    let (sender, receiver, sink) = session_pair(65_536).await;

    let id = sender
        .send_source(MemorySource::default(), "empty.txt", "text/plain")
        .await
        .expect("send");

    let received = wait_for_state(&receiver, &id, TransferState::Complete).await;
    assert_eq!(received.size, 0);
    assert_eq!(received.progress_percent(), 100);
    assert!(sink.get(&id).await.expect("artifact").bytes.is_empty());
}

#[tokio::test]
async fn test_receiver_progress_never_decreases() {
    let (sender, receiver, _sink) = session_pair(1000).await;
    let mut events = receiver.subscribe();

    let id = sender
        .send_source(MemorySource::new(random_bytes(20_000)), "p.bin", "application/octet-stream")
        .await
        .expect("send");
    wait_for_state(&receiver, &id, TransferState::Complete).await;

    let mut last = 0;
    let mut saw_complete = false;
    while let Ok(t) = events.try_recv() {
        let percent = t.progress_percent();
        assert!(percent >= last, "{percent} < {last}");
        assert_eq!(percent == 100, t.state == TransferState::Complete);
        saw_complete |= t.state == TransferState::Complete;
        last = percent;
    }
    assert!(saw_complete);
}

#[tokio::test]
async fn test_chunk_before_meta_is_dropped() {
    let (sender, receiver, _sink) = session_pair(1024).await;

    let stray = protocol::encode(&Message::Chunk(ChunkMessage {
        transfer_id: TransferId::new("stray"),
        payload: b"lost".to_vec(),
        offset: 0,
        is_final: true,
    }))
    .expect("encode");
    sender.connection().send(stray).await.expect("send stray");

    let id = sender
        .send_source(MemorySource::new(b"real".to_vec()), "real.txt", "text/plain")
        .await
        .expect("send");
    wait_for_state(&receiver, &id, TransferState::Complete).await;

    let transfers = receiver.transfers().await;
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].id, id);
    assert!(receiver.transfer(&TransferId::new("stray")).await.is_none());
}

#[tokio::test]
async fn test_repeated_meta_creates_one_entry() {
    let (sender, receiver, sink) = session_pair(1024).await;
    let id = TransferId::new("dup");

    let meta = protocol::encode(&Message::Meta(MetaMessage {
        transfer_id: id.clone(),
        name: "dup.txt".into(),
        size: 3,
        mime_type: "text/plain".into(),
    }))
    .expect("encode");
    let chunk = protocol::encode(&Message::Chunk(ChunkMessage {
        transfer_id: id.clone(),
        payload: b"abc".to_vec(),
        offset: 0,
        is_final: true,
    }))
    .expect("encode");

    sender.connection().send(meta.clone()).await.expect("meta");
    sender.connection().send(meta).await.expect("meta again");
    sender.connection().send(chunk).await.expect("chunk");

    wait_for_state(&receiver, &id, TransferState::Complete).await;
    assert_eq!(receiver.transfers().await.len(), 1);
    assert_eq!(sink.get(&id).await.expect("artifact").bytes, b"abc");
}

#[tokio::test]
async fn test_closing_mid_transfer_abandons_and_stops() {
    let (sender, receiver, _sink) = session_pair(64).await;

    let connection = sender.connection().clone();
    let mut events = receiver.subscribe();
    let stopper = tokio::spawn(async move {
        // close once the first piece has reached the peer
        while let Ok(t) = events.recv().await {
            if t.state == TransferState::Transferring {
                connection.close();
                break;
            }
        }
    });

    let err = sender
        .send_source(MemorySource::new(random_bytes(64 * 1000)), "big.bin", "application/octet-stream")
        .await
        .expect_err("send must stop");
    stopper.await.expect("stopper");

    assert!(matches!(err, Error::TransportClosed(_)), "{err:?}");

    let sent = sender.transfers().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].state, TransferState::Abandoned);
    assert!(sent[0].transferred_bytes < 64 * 1000);

    let received = receiver.close().await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].state, TransferState::Abandoned);
}

#[tokio::test]
async fn test_send_before_connected_fails() {
    let (a, _b) = holo_core::connection::memory::pair();
    let connection = holo_core::connection::Connection::from_transport(a);
    connection.handle().close();

    let session = RoomSession::with_connection(
        RoomId::generate(),
        connection,
        holo_core::file::MemorySink::new(),
        Chunker::default(),
    );

    let err = session
        .send_source(MemorySource::new(b"x".to_vec()), "x", "text/plain")
        .await
        .expect_err("closed");
    assert!(matches!(err, Error::NotConnected));
    assert_eq!(err.user_message(), holo_core::error::NOT_CONNECTED_MESSAGE);
    assert!(session.transfers().await.is_empty());
}

#[tokio::test]
async fn test_local_file_saved_to_directory() {
    let src_dir = create_temp_dir();
    let out_dir = create_temp_dir();
    let content = random_bytes(70_000);
    let path = create_test_file(src_dir.path(), "photo.png", &content);

    let room = RoomId::generate();
    let (a, b) = holo_core::connection::memory::pair();
    let sender = RoomSession::with_connection(
        room.clone(),
        holo_core::connection::Connection::from_transport(a),
        holo_core::file::MemorySink::new(),
        Chunker::default(),
    );
    let receiver = RoomSession::with_connection(
        room,
        holo_core::connection::Connection::from_transport(b),
        DirectorySink::new(out_dir.path()),
        Chunker::default(),
    );
    sender.wait_until_connected().await.expect("connect");
    receiver.wait_until_connected().await.expect("connect");

    let id = sender.send_file(&path).await.expect("send file");
    let received = wait_for_state(&receiver, &id, TransferState::Complete).await;

    assert_eq!(received.name, "photo.png");
    assert_eq!(received.mime_type, "image/png");
    let saved = out_dir.path().join("photo.png");
    assert_eq!(received.artifact, Some(ArtifactHandle::Saved(saved.clone())));
    assert_eq!(std::fs::read(saved).expect("saved file"), content);
}
