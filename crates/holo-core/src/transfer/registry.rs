//! Transfer registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};

use super::{Transfer, TransferId, TransferState};

/// A registry shared between the send path and the inbound task.
///
/// Guards are never held across an `.await`.
pub type SharedRegistry = Arc<Mutex<TransferRegistry>>;

/// Every transfer seen on one connection, keyed by id.
///
/// Entries are never evicted; the registry is dropped with its session.
/// When built with [`TransferRegistry::with_events`], every change is
/// published as a snapshot of the changed transfer.
#[derive(Debug, Default)]
pub struct TransferRegistry {
    transfers: HashMap<TransferId, Transfer>,
    events: Option<broadcast::Sender<Transfer>>,
}

impl TransferRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry that publishes changes to `events`.
    #[must_use]
    pub fn with_events(events: broadcast::Sender<Transfer>) -> Self {
        Self {
            transfers: HashMap::new(),
            events: Some(events),
        }
    }

    /// Wrap the registry for sharing.
    #[must_use]
    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    /// Insert or replace a transfer, returning the previous entry.
    pub fn upsert(&mut self, transfer: Transfer) -> Option<Transfer> {
        self.publish(&transfer);
        self.transfers.insert(transfer.id.clone(), transfer)
    }

    /// Insert a transfer unless its id is already known.
    ///
    /// Returns whether it was inserted.
    pub fn insert_if_absent(&mut self, transfer: Transfer) -> bool {
        if self.transfers.contains_key(&transfer.id) {
            return false;
        }

        self.upsert(transfer);
        true
    }

    /// Look up a transfer.
    #[must_use]
    pub fn get(&self, id: &TransferId) -> Option<&Transfer> {
        self.transfers.get(id)
    }

    /// Whether a transfer with this id exists.
    #[must_use]
    pub fn contains(&self, id: &TransferId) -> bool {
        self.transfers.contains_key(id)
    }

    /// Change a transfer in place.
    ///
    /// Returns `None` if the id is unknown.
    pub fn update<R>(&mut self, id: &TransferId, f: impl FnOnce(&mut Transfer) -> R) -> Option<R> {
        let transfer = self.transfers.get_mut(id)?;
        let result = f(transfer);

        if let Some(events) = &self.events {
            let _ = events.send(transfer.clone());
        }

        Some(result)
    }

    /// All transfers in presentation order: by name, then by id.
    #[must_use]
    pub fn all(&self) -> Vec<Transfer> {
        let mut transfers: Vec<Transfer> = self.transfers.values().cloned().collect();
        transfers.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        transfers
    }

    /// Mark every unfinished transfer as abandoned.
    ///
    /// Returns how many changed.
    pub fn abandon_unfinished(&mut self) -> usize {
        let mut abandoned = 0;

        for transfer in self.transfers.values_mut() {
            if transfer.abandon() {
                tracing::info!(
                    transfer_id = %transfer.id,
                    name = %transfer.name,
                    "Transfer abandoned"
                );
                if let Some(events) = &self.events {
                    let _ = events.send(transfer.clone());
                }
                abandoned += 1;
            }
        }

        abandoned
    }

    /// Number of transfers in the given state.
    #[must_use]
    pub fn count_in_state(&self, state: TransferState) -> usize {
        self.transfers.values().filter(|t| t.state == state).count()
    }

    /// Number of transfers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.transfers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transfers.is_empty()
    }

    fn publish(&self, transfer: &Transfer) {
        if let Some(events) = &self.events {
            let _ = events.send(transfer.clone());
        }
    }
}
