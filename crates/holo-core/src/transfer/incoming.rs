//! Incoming pipeline: rebuilding files from chunk frames.

use std::collections::HashMap;

use super::{Transfer, TransferDirection, TransferId, TransferRegistry};
use crate::file::Artifact;
use crate::protocol::{ChunkMessage, MetaMessage};

/// Why a chunk was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No `meta` was seen for the id
    UnknownTransfer,
    /// The id names one of this client's own outgoing transfers
    NotIncoming,
    /// The transfer is already complete or abandoned
    Finished,
    /// The chunk would carry the transfer past its announced size
    Overflow,
}

/// Result of handling one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferUpdate {
    /// The chunk was dropped; the registry is unchanged
    Ignored(IgnoreReason),
    /// The chunk was appended
    Progress {
        /// Transfer that advanced
        transfer_id: TransferId,
        /// New progress percentage
        percent: u8,
    },
    /// The final chunk arrived and the file was materialized
    Completed(Artifact),
}

#[derive(Debug, Default)]
struct PartialFile {
    pieces: Vec<Vec<u8>>,
    received: u64,
}

/// Rebuilds incoming files.
///
/// Owns the received pieces of every incoming transfer until its final
/// chunk, then hands the joined bytes to the caller and forgets them.
/// Pieces are joined in arrival order; the relay keeps frames in order, so
/// an offset that does not match the bytes received so far is only logged.
#[derive(Debug, Default)]
pub struct Reassembler {
    buffers: HashMap<TransferId, PartialFile>,
}

impl Reassembler {
    /// Create a reassembler with no transfers in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a transfer announcement.
    ///
    /// A repeated announcement for a known id changes nothing.
    pub fn on_meta(&mut self, registry: &mut TransferRegistry, meta: MetaMessage) -> TransferId {
        let id = meta.transfer_id.clone();

        if registry.contains(&id) {
            tracing::debug!(transfer_id = %id, "Ignoring repeated announcement");
            return id;
        }

        tracing::info!(
            transfer_id = %id,
            name = %meta.name,
            size = meta.size,
            mime_type = %meta.mime_type,
            "Incoming transfer announced"
        );

        registry.insert_if_absent(Transfer::incoming(meta));
        self.buffers.insert(id.clone(), PartialFile::default());

        id
    }

    /// Handle one chunk.
    pub fn on_chunk(&mut self, registry: &mut TransferRegistry, chunk: ChunkMessage) -> TransferUpdate {
        let id = chunk.transfer_id;

        let Some(transfer) = registry.get(&id) else {
            tracing::debug!(transfer_id = %id, "Dropping chunk for unknown transfer");
            return TransferUpdate::Ignored(IgnoreReason::UnknownTransfer);
        };

        if transfer.direction != TransferDirection::Incoming {
            tracing::debug!(transfer_id = %id, "Dropping chunk for own outgoing transfer");
            return TransferUpdate::Ignored(IgnoreReason::NotIncoming);
        }

        if transfer.state.is_finished() {
            tracing::debug!(transfer_id = %id, state = ?transfer.state, "Dropping chunk for finished transfer");
            return TransferUpdate::Ignored(IgnoreReason::Finished);
        }

        let size = transfer.size;
        let name = transfer.name.clone();
        let mime_type = transfer.mime_type.clone();

        let buffer = self.buffers.entry(id.clone()).or_default();
        let len = chunk.payload.len() as u64;

        if buffer.received.saturating_add(len) > size {
            tracing::warn!(
                transfer_id = %id,
                offset = chunk.offset,
                len,
                size,
                "Dropping chunk past announced size"
            );
            return TransferUpdate::Ignored(IgnoreReason::Overflow);
        }

        if chunk.offset != buffer.received {
            tracing::warn!(
                transfer_id = %id,
                offset = chunk.offset,
                expected = buffer.received,
                "Chunk offset out of sequence, appending in arrival order"
            );
        }

        buffer.received += len;
        if !chunk.payload.is_empty() {
            buffer.pieces.push(chunk.payload);
        }

        if !chunk.is_final {
            let percent = registry
                .update(&id, |t| {
                    t.record_bytes(len);
                    t.progress_percent()
                })
                .unwrap_or_default();

            tracing::debug!(transfer_id = %id, offset = chunk.offset, percent, "Chunk received");

            return TransferUpdate::Progress {
                transfer_id: id,
                percent,
            };
        }

        let partial = self.buffers.remove(&id).unwrap_or_default();
        if partial.received != size {
            tracing::warn!(
                transfer_id = %id,
                received = partial.received,
                size,
                "Final chunk arrived before the announced size was reached"
            );
        }

        registry.update(&id, |t| {
            t.record_bytes(len);
            t.complete();
        });

        tracing::info!(transfer_id = %id, name = %name, bytes = partial.received, "Transfer complete");

        TransferUpdate::Completed(Artifact {
            transfer_id: id,
            name,
            mime_type,
            bytes: partial.pieces.concat(),
        })
    }

    /// Drop every partial file, releasing its memory.
    pub fn clear(&mut self) {
        self.buffers.clear();
    }

    /// Number of transfers with buffered pieces.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.buffers.len()
    }
}
