//! Outgoing pipeline: turning a file into frames.

use super::{SharedRegistry, Transfer, TransferId};
use crate::connection::ConnectionHandle;
use crate::error::{Error, Result};
use crate::file::{FileSource, PiecePlan};
use crate::protocol::{self, ChunkMessage, Message, MetaMessage};

/// Splits outgoing files into pieces and sends them.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(crate::DEFAULT_CHUNK_SIZE)
    }
}

impl Chunker {
    /// Create a chunker with the given piece size.
    #[must_use]
    pub const fn new(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    /// Piece size in bytes.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Announce and send one file.
    ///
    /// Registers an outgoing transfer, sends its `meta` frame, then one
    /// `chunk` frame per piece. Only one piece is held in memory at a time,
    /// and the task yields between pieces so inbound frames keep flowing.
    /// The transfer is complete as soon as the final piece is handed to the
    /// connection; the peer does not acknowledge.
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] if the connection is not open; no transfer
    ///   is created.
    /// - [`Error::TransportClosed`] if the connection closes part way; the
    ///   transfer is left abandoned.
    /// - Any error from reading the source; the transfer is left abandoned.
    pub async fn send<S: FileSource>(
        &self,
        mut source: S,
        name: impl Into<String>,
        mime_type: impl Into<String>,
        connection: &ConnectionHandle,
        registry: &SharedRegistry,
    ) -> Result<TransferId> {
        if !connection.is_connected() {
            return Err(Error::NotConnected);
        }

        let id = TransferId::generate();
        let size = source.size();
        let transfer = Transfer::outgoing(id.clone(), name, size, mime_type);

        let meta = Message::Meta(MetaMessage {
            transfer_id: id.clone(),
            name: transfer.name.clone(),
            size,
            mime_type: transfer.mime_type.clone(),
        });

        tracing::info!(
            transfer_id = %id,
            name = %transfer.name,
            size,
            "Sending file"
        );

        registry.lock().await.upsert(transfer);

        let result = self.stream(&mut source, &id, meta, connection, registry).await;

        if let Err(e) = &result {
            tracing::warn!(transfer_id = %id, error = %e, "Send stopped");
            registry.lock().await.update(&id, Transfer::abandon);
        }

        result.map(|()| id)
    }

    async fn stream<S: FileSource>(
        &self,
        source: &mut S,
        id: &TransferId,
        meta: Message,
        connection: &ConnectionHandle,
        registry: &SharedRegistry,
    ) -> Result<()> {
        send_frame(connection, &meta).await?;

        for piece in PiecePlan::new(source.size(), self.chunk_size) {
            if !connection.is_connected() {
                return Err(connection.closed_error());
            }

            let payload = source.read_range(piece.offset, piece.len).await?;
            let chunk = Message::Chunk(ChunkMessage {
                transfer_id: id.clone(),
                payload,
                offset: piece.offset,
                is_final: piece.is_final,
            });
            send_frame(connection, &chunk).await?;

            {
                let mut registry = registry.lock().await;
                registry.update(id, |t| {
                    t.record_bytes(piece.len as u64);
                    if piece.is_final {
                        t.complete();
                    }
                });
            }

            tracing::debug!(
                transfer_id = %id,
                offset = piece.offset,
                len = piece.len,
                is_final = piece.is_final,
                "Chunk sent"
            );

            tokio::task::yield_now().await;
        }

        tracing::info!(transfer_id = %id, "File sent");
        Ok(())
    }
}

/// Encode and send one message, reporting a closed connection as such.
async fn send_frame(connection: &ConnectionHandle, message: &Message) -> Result<()> {
    let frame = protocol::encode(message)?;

    match connection.send(frame).await {
        Err(Error::NotConnected) => Err(connection.closed_error()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::connection::{Connection, Outbound, Transport, TransportEvent};
    use crate::file::MemorySource;
    use crate::transfer::{TransferRegistry, TransferState};

    async fn open_connection() -> (
        Connection,
        mpsc::Sender<TransportEvent>,
        mpsc::Receiver<Outbound>,
    ) {
        let (out_tx, out_rx) = mpsc::channel(1024);
        let (ev_tx, ev_rx) = mpsc::channel(8);
        let connection = Connection::from_transport(Transport::new(out_tx, ev_rx));
        ev_tx.send(TransportEvent::Open).await.unwrap();
        connection.handle().wait_until_connected().await.unwrap();
        (connection, ev_tx, out_rx)
    }

    fn sent_messages(out: &mut mpsc::Receiver<Outbound>) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(instruction) = out.try_recv() {
            if let Outbound::Data(frame) = instruction {
                messages.push(protocol::decode(&frame).unwrap());
            }
        }
        messages
    }

    #[tokio::test]
    async fn test_send_scenario_frames() {
        let (connection, _events, mut out) = open_connection().await;
        let registry = TransferRegistry::new().into_shared();
        let data: Vec<u8> = (0..140_000u32).map(|i| (i % 251) as u8).collect();

        let id = Chunker::new(65_536)
            .send(
                MemorySource::new(data.clone()),
                "a.txt",
                "text/plain",
                &connection.handle(),
                &registry,
            )
            .await
            .unwrap();

        let messages = sent_messages(&mut out);
        assert_eq!(messages.len(), 4);

        let Message::Meta(meta) = &messages[0] else {
            panic!("first frame must be meta");
        };
        assert_eq!(meta.transfer_id, id);
        assert_eq!(meta.size, 140_000);

        let chunks: Vec<&ChunkMessage> = messages[1..]
            .iter()
            .map(|m| match m {
                Message::Chunk(c) => c,
                Message::Meta(_) => panic!("unexpected meta"),
            })
            .collect();
        let offsets: Vec<u64> = chunks.iter().map(|c| c.offset).collect();
        assert_eq!(offsets, vec![0, 65_536, 131_072]);
        assert_eq!(chunks[2].payload.len(), 8_928);
        assert!(chunks[2].is_final);
        assert!(!chunks[0].is_final && !chunks[1].is_final);

        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.payload.clone()).collect();
        assert_eq!(joined, data);

        let registry = registry.lock().await;
        let transfer = registry.get(&id).unwrap();
        assert_eq!(transfer.state, TransferState::Complete);
        assert_eq!(transfer.transferred_bytes, 140_000);
        assert_eq!(transfer.progress_percent(), 100);
    }

    #[tokio::test]
    async fn test_send_zero_byte_file() {
        let (connection, _events, mut out) = open_connection().await;
        let registry = TransferRegistry::new().into_shared();

        let id = Chunker::default()
            .send(
                MemorySource::default(),
                "empty",
                crate::DEFAULT_MIME_TYPE,
                &connection.handle(),
                &registry,
            )
            .await
            .unwrap();

        let messages = sent_messages(&mut out);
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[1],
            Message::Chunk(ChunkMessage {
                transfer_id: id.clone(),
                payload: Vec::new(),
                offset: 0,
                is_final: true,
            })
        );
        assert_eq!(
            registry.lock().await.get(&id).unwrap().state,
            TransferState::Complete
        );
    }

    #[tokio::test]
    async fn test_send_while_connecting_fails_without_record() {
        let (out_tx, _out_rx) = mpsc::channel(8);
        let (_ev_tx, ev_rx) = mpsc::channel(8);
        let connection = Connection::from_transport(Transport::new(out_tx, ev_rx));
        let registry = TransferRegistry::new().into_shared();

        let err = Chunker::default()
            .send(
                MemorySource::new(b"abc".to_vec()),
                "a.txt",
                "text/plain",
                &connection.handle(),
                &registry,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotConnected));
        assert!(registry.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_close_mid_send_abandons() {
        let (out_tx, mut out_rx) = mpsc::channel(1);
        let (ev_tx, ev_rx) = mpsc::channel(8);
        let connection = Connection::from_transport(Transport::new(out_tx, ev_rx));
        ev_tx.send(TransportEvent::Open).await.unwrap();
        let handle = connection.handle();
        handle.wait_until_connected().await.unwrap();

        let registry = TransferRegistry::new().into_shared();
        let send = {
            let handle = handle.clone();
            let registry = registry.clone();
            tokio::spawn(async move {
                Chunker::new(10)
                    .send(
                        MemorySource::new(vec![7u8; 1_000]),
                        "big.bin",
                        crate::DEFAULT_MIME_TYPE,
                        &handle,
                        &registry,
                    )
                    .await
            })
        };

        // let the meta and a couple of chunks through, then drop the link
        for _ in 0..3 {
            out_rx.recv().await.unwrap();
        }
        ev_tx
            .send(TransportEvent::Close {
                code: 1001,
                reason: "relay shutting down".into(),
                was_clean: true,
            })
            .await
            .unwrap();
        handle.closed().await;
        while out_rx.try_recv().is_ok() {}

        let err = send.await.unwrap().unwrap_err();
        assert!(
            matches!(&err, Error::TransportClosed(reason) if reason == "relay shutting down"),
            "{err:?}"
        );

        let transfers = registry.lock().await.all();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].state, TransferState::Abandoned);
        assert!(transfers[0].transferred_bytes < 1_000);
    }
}
