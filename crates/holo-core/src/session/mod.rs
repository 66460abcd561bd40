//! A joined room.
//!
//! [`RoomSession`] wires the pieces together: it owns the connection,
//! runs the inbound task that decodes frames and feeds the reassembler,
//! sends files through the chunker, and hands finished files to an
//! [`ArtifactSink`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use holo_core::config::Config;
//! use holo_core::file::DirectorySink;
//! use holo_core::room::RoomId;
//! use holo_core::session::RoomSession;
//!
//! let config = Config::load()?;
//! let session = RoomSession::join(&config, RoomId::generate(), DirectorySink::new("."))?;
//! session.wait_until_connected().await?;
//! session.send_file("notes.txt").await?;
//! ```

use std::path::Path;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::connection::{build_room_url, Connection, ConnectionHandle, ConnectionStatus};
use crate::error::Result;
use crate::file::{ArtifactSink, FileSource, LocalFileSource};
use crate::protocol::{self, Message};
use crate::room::{ClientId, RoomId};
use crate::transfer::{
    Chunker, Reassembler, SharedRegistry, Transfer, TransferId, TransferRegistry, TransferUpdate,
};

/// Transfer snapshots buffered per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 1024;

/// A room this client has joined.
///
/// Dropping the session closes its connection.
#[derive(Debug)]
pub struct RoomSession {
    room: RoomId,
    client: ClientId,
    connection: ConnectionHandle,
    registry: SharedRegistry,
    events: broadcast::Sender<Transfer>,
    chunker: Chunker,
    inbound: Option<JoinHandle<()>>,
}

impl RoomSession {
    /// Join `room` on the configured relay.
    ///
    /// Returns while the connection is still being established; use
    /// [`wait_until_connected`](Self::wait_until_connected) before sending.
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConstructionFailure`](crate::Error::ConstructionFailure)
    /// if the relay URL is unusable.
    pub fn join<K: ArtifactSink>(config: &Config, room: RoomId, sink: K) -> Result<Self> {
        let client = ClientId::generate();
        let url = build_room_url(&config.relay_url(), &room, &client)?;
        let connection = Connection::connect(&url)?;

        tracing::info!(room = %room, client_id = %client, "Joining room");

        Ok(Self::start(
            room,
            client,
            connection,
            sink,
            Chunker::new(config.transfer.chunk_size),
        ))
    }

    /// Run a session over an existing connection.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn with_connection<K: ArtifactSink>(
        room: RoomId,
        connection: Connection,
        sink: K,
        chunker: Chunker,
    ) -> Self {
        Self::start(room, ClientId::generate(), connection, sink, chunker)
    }

    fn start<K: ArtifactSink>(
        room: RoomId,
        client: ClientId,
        connection: Connection,
        sink: K,
        chunker: Chunker,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let registry = TransferRegistry::with_events(events.clone()).into_shared();
        let (handle, frames) = connection.into_parts();

        let inbound = tokio::spawn(run_inbound(frames, registry.clone(), sink));

        Self {
            room,
            client,
            connection: handle,
            registry,
            events,
            chunker,
            inbound: Some(inbound),
        }
    }

    /// The room this session joined.
    #[must_use]
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// The id this client presented to the relay.
    #[must_use]
    pub fn client_id(&self) -> ClientId {
        self.client
    }

    /// The underlying connection.
    #[must_use]
    pub fn connection(&self) -> &ConnectionHandle {
        &self.connection
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Wait for the relay handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportClosed`](crate::Error::TransportClosed) if
    /// the connection closes instead.
    pub async fn wait_until_connected(&self) -> Result<()> {
        self.connection.wait_until_connected().await
    }

    /// Send a local file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the send fails.
    pub async fn send_file(&self, path: impl AsRef<Path>) -> Result<TransferId> {
        let source = LocalFileSource::open(path).await?;
        let name = source.name();
        let mime_type = source.mime_type();

        self.send_source(source, name, mime_type).await
    }

    /// Send from any file source.
    ///
    /// # Errors
    ///
    /// See [`Chunker::send`].
    pub async fn send_source<S: FileSource>(
        &self,
        source: S,
        name: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Result<TransferId> {
        self.chunker
            .send(source, name, mime_type, &self.connection, &self.registry)
            .await
    }

    /// Snapshot of every transfer, in presentation order.
    pub async fn transfers(&self) -> Vec<Transfer> {
        self.registry.lock().await.all()
    }

    /// Snapshot of one transfer.
    pub async fn transfer(&self, id: &TransferId) -> Option<Transfer> {
        self.registry.lock().await.get(id).cloned()
    }

    /// Receive a snapshot of each transfer whenever it changes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Transfer> {
        self.events.subscribe()
    }

    /// Wait until the connection closes and inbound processing has
    /// finished, then return the final transfers.
    pub async fn closed(&mut self) -> Vec<Transfer> {
        self.connection.closed().await;
        self.join_inbound().await;
        self.transfers().await
    }

    /// Close the connection and return the final transfers.
    ///
    /// Unfinished transfers end up abandoned.
    pub async fn close(mut self) -> Vec<Transfer> {
        self.connection.close();
        self.join_inbound().await;
        self.transfers().await
    }

    async fn join_inbound(&mut self) {
        if let Some(inbound) = self.inbound.take() {
            if let Err(e) = inbound.await {
                tracing::error!(error = %e, "Inbound task failed");
            }
        }
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.connection.close();
    }
}

/// Decode inbound frames until the connection closes.
async fn run_inbound<K: ArtifactSink>(
    mut frames: mpsc::Receiver<Vec<u8>>,
    registry: SharedRegistry,
    sink: K,
) {
    let mut reassembler = Reassembler::new();

    while let Some(frame) = frames.recv().await {
        let message = match protocol::decode(&frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, len = frame.len(), "Dropping undecodable frame");
                continue;
            }
        };

        let update = {
            let mut registry = registry.lock().await;
            match message {
                Message::Meta(meta) => {
                    reassembler.on_meta(&mut registry, meta);
                    continue;
                }
                Message::Chunk(chunk) => reassembler.on_chunk(&mut registry, chunk),
            }
        };

        if let TransferUpdate::Completed(artifact) = update {
            let id = artifact.transfer_id.clone();
            match sink.deliver(artifact).await {
                Ok(handle) => {
                    tracing::info!(transfer_id = %id, artifact = %handle, "Received file delivered");
                    registry
                        .lock()
                        .await
                        .update(&id, |t| t.artifact = Some(handle));
                }
                Err(e) => {
                    tracing::error!(transfer_id = %id, error = %e, "Could not deliver received file");
                }
            }
        }
    }

    reassembler.clear();
    let abandoned = registry.lock().await.abandon_unfinished();
    tracing::debug!(abandoned, "Inbound stream ended");
}
