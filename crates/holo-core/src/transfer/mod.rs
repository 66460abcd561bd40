//! File transfer engine for Holo.
//!
//! This module tracks every file moving through a room:
//!
//! - [`Transfer`] records, one per file per direction
//! - The [`TransferRegistry`], the single source of truth for them
//! - The [`Chunker`], which turns a local file into `meta` + `chunk` frames
//! - The [`Reassembler`], which turns incoming frames back into a file
//!
//! ## Transfer Protocol
//!
//! - Default piece size: 64 KiB
//! - One `meta` frame, then one `chunk` frame per piece in offset order
//! - Exactly one chunk carries the final flag; a zero-byte file is a single
//!   empty final chunk
//! - No acknowledgments, no retries, no resume
//!
//! ## States
//!
//! ```text
//! announced ──▶ transferring ──▶ complete
//!     │               │
//!     └───────────────┴──▶ abandoned (connection closed first)
//! ```

mod incoming;
mod outgoing;
mod registry;

pub use incoming::{IgnoreReason, Reassembler, TransferUpdate};
pub use outgoing::Chunker;
pub use registry::{SharedRegistry, TransferRegistry};

pub use crate::protocol::TransferId;

use serde::Serialize;

use crate::file::ArtifactHandle;
use crate::protocol::MetaMessage;

/// Transfer direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    /// Announced by a peer, being received
    Incoming,
    /// Selected locally, being sent
    Outgoing,
}

impl TransferDirection {
    /// Short verb for display.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Incoming => "receiving",
            Self::Outgoing => "sending",
        }
    }
}

/// Transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Announced, no bytes moved yet
    Announced,
    /// Some bytes moved
    Transferring,
    /// All bytes moved
    Complete,
    /// The connection closed before completion
    Abandoned,
}

impl TransferState {
    /// Whether the transfer can no longer change.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Complete | Self::Abandoned)
    }
}

/// One file moving in one direction over one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transfer {
    /// Sender-chosen id
    pub id: TransferId,
    /// Display name, not sanitized
    pub name: String,
    /// Announced length in bytes
    pub size: u64,
    /// Advisory content type
    pub mime_type: String,
    /// Fixed at creation
    pub direction: TransferDirection,
    /// Bytes sent or received so far
    pub transferred_bytes: u64,
    /// Lifecycle state
    pub state: TransferState,
    /// Where the received file went, once delivered
    pub artifact: Option<ArtifactHandle>,
}

impl Transfer {
    /// A new outgoing transfer in the announced state.
    pub fn outgoing(
        id: TransferId,
        name: impl Into<String>,
        size: u64,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            size,
            mime_type: mime_type.into(),
            direction: TransferDirection::Outgoing,
            transferred_bytes: 0,
            state: TransferState::Announced,
            artifact: None,
        }
    }

    /// A new incoming transfer from a peer's announcement.
    #[must_use]
    pub fn incoming(meta: MetaMessage) -> Self {
        Self {
            id: meta.transfer_id,
            name: meta.name,
            size: meta.size,
            mime_type: meta.mime_type,
            direction: TransferDirection::Incoming,
            transferred_bytes: 0,
            state: TransferState::Announced,
            artifact: None,
        }
    }

    /// Progress as a whole percentage.
    #[must_use]
    pub fn progress_percent(&self) -> u8 {
        progress_percent(
            self.transferred_bytes,
            self.size,
            self.state == TransferState::Complete,
        )
    }

    /// Count `len` more bytes as moved.
    ///
    /// The counter never exceeds the announced size.
    pub fn record_bytes(&mut self, len: u64) {
        if self.state.is_finished() {
            return;
        }

        self.transferred_bytes = self.transferred_bytes.saturating_add(len).min(self.size);
        self.state = TransferState::Transferring;
    }

    /// Mark every byte as moved.
    pub fn complete(&mut self) {
        if self.state == TransferState::Abandoned {
            return;
        }

        self.transferred_bytes = self.size;
        self.state = TransferState::Complete;
    }

    /// Give up on an unfinished transfer. Finished transfers are left alone.
    pub fn abandon(&mut self) -> bool {
        if self.state.is_finished() {
            return false;
        }

        self.state = TransferState::Abandoned;
        true
    }
}

/// Whole-percent progress of `bytes` out of `size`.
///
/// Rounds down and stays below 100 until the transfer is complete, so 100
/// means done. A zero-byte transfer is 0 until complete.
#[must_use]
pub fn progress_percent(bytes: u64, size: u64, complete: bool) -> u8 {
    if complete {
        return 100;
    }
    if size == 0 {
        return 0;
    }

    let percent = u128::from(bytes.min(size)) * 100 / u128::from(size);
    percent.min(99) as u8
}
