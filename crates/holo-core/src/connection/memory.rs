//! In-memory transports.
//!
//! [`pair`] wires two transports to each other the way a relay wires two
//! members of one room: every frame one side sends arrives, in order, at
//! the other. Both sides open immediately.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::{Outbound, Transport, TransportEvent, INBOUND_CAPACITY, OUTBOUND_CAPACITY};

/// Create two connected in-memory transports.
///
/// Closing one side closes only that side; the other stays open, as it
/// would on a relay when a peer leaves the room.
///
/// Must be called inside a tokio runtime.
#[must_use]
pub fn pair() -> (Transport, Transport) {
    let (a_out_tx, a_out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let (b_out_tx, b_out_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let (a_events_tx, a_events_rx) = mpsc::channel(INBOUND_CAPACITY);
    let (b_events_tx, b_events_rx) = mpsc::channel(INBOUND_CAPACITY);

    let a = Transport::new(a_out_tx, a_events_rx);
    let b = Transport::new(b_out_tx, b_events_rx);

    tokio::spawn(forward(
        a_out_rx,
        a_events_tx.clone(),
        b_events_tx.clone(),
        a.closing(),
    ));
    tokio::spawn(forward(b_out_rx, b_events_tx, a_events_tx, b.closing()));

    (a, b)
}

/// Move one side's outbound frames to the other side's events.
async fn forward(
    mut outbound: mpsc::Receiver<Outbound>,
    own_events: mpsc::Sender<TransportEvent>,
    peer_events: mpsc::Sender<TransportEvent>,
    closing: Arc<AtomicBool>,
) {
    if own_events.send(TransportEvent::Open).await.is_err() {
        return;
    }

    while let Some(instruction) = outbound.recv().await {
        if closing.load(Ordering::Acquire) {
            break;
        }

        match instruction {
            Outbound::Data(frame) => {
                let _ = peer_events.send(TransportEvent::Message(frame)).await;
            }
            Outbound::Flush(done) => {
                let _ = done.send(());
            }
            Outbound::Close => break,
        }
    }

    let _ = own_events
        .send(TransportEvent::Close {
            code: 1000,
            reason: String::new(),
            was_clean: true,
        })
        .await;
}
