//! Connection lifecycle for a room.
//!
//! A [`Connection`] owns exactly one transport to the relay and is the only
//! thing allowed to move raw frames. Its status follows a small state
//! machine:
//!
//! ```text
//! connecting ──open──▶ connected
//!     │                    │
//!     └──close / error─────┴──▶ closed (terminal)
//! ```
//!
//! There is no automatic reconnect. Once closed, sends fail with
//! [`Error::NotConnected`] and the inbound frame stream ends.
//!
//! Transports are plain channel pairs ([`Transport`]), so the same
//! lifecycle runs over a real WebSocket ([`Connection::connect`]) or an
//! in-memory pair ([`memory::pair`]).

pub mod memory;
mod websocket;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use url::Url;

use crate::error::{Error, Result, CLOSED_FALLBACK_MESSAGE, TRANSPORT_ERROR_MESSAGE};
use crate::room::{ClientId, RoomId};

/// Query parameter carrying the room token.
pub const ROOM_QUERY_PARAM: &str = "roomId";

/// Query parameter carrying the client id.
pub const CLIENT_QUERY_PARAM: &str = "clientId";

/// Frames queued toward the transport before `send` waits.
pub(crate) const OUTBOUND_CAPACITY: usize = 32;

/// Inbound frames buffered before the transport is back-pressured.
pub(crate) const INBOUND_CAPACITY: usize = 256;

/// Status of a room connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Handshake in progress
    #[default]
    Connecting,
    /// Frames can be sent
    Connected,
    /// Connection ended; terminal
    Closed,
}

impl ConnectionStatus {
    /// Next status after a transport event.
    ///
    /// `Closed` absorbs every event.
    #[must_use]
    pub fn apply(self, event: &TransportEvent) -> Self {
        match (self, event) {
            (Self::Closed, _) | (_, TransportEvent::Close { .. } | TransportEvent::Error(_)) => {
                Self::Closed
            }
            (Self::Connecting, TransportEvent::Open) => Self::Connected,
            (status, _) => status,
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting…",
            Self::Connected => "Connected",
            Self::Closed => "Disconnected",
        }
    }

    /// Whether frames can be sent.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Something that happened on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake finished
    Open,
    /// A frame arrived
    Message(Vec<u8>),
    /// The transport closed
    Close {
        /// Close code
        code: u16,
        /// Reason given by the closing side, possibly empty
        reason: String,
        /// Whether the closing handshake completed
        was_clean: bool,
    },
    /// The transport failed
    Error(String),
}

/// Instruction for the transport.
#[derive(Debug)]
pub enum Outbound {
    /// Send one frame
    Data(Vec<u8>),
    /// Reply once every frame queued before this one has been written
    Flush(oneshot::Sender<()>),
    /// Close the transport
    Close,
}

/// A transport seen as a pair of channels.
///
/// A driver task on the other side of the channels turns [`Outbound`]
/// instructions into wire traffic and reports [`TransportEvent`]s back.
/// Dropping the event receiver tells the driver to shut down.
///
/// Once the closing flag is raised, a driver must discard any frame it has
/// not started writing yet.
#[derive(Debug)]
pub struct Transport {
    outbound: mpsc::Sender<Outbound>,
    events: mpsc::Receiver<TransportEvent>,
    closing: Arc<AtomicBool>,
}

impl Transport {
    /// Wrap the channel ends of a transport driver.
    #[must_use]
    pub fn new(outbound: mpsc::Sender<Outbound>, events: mpsc::Receiver<TransportEvent>) -> Self {
        Self {
            outbound,
            events,
            closing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The flag raised when the owning connection is closed locally.
    #[must_use]
    pub fn closing(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closing)
    }
}

/// Observable state of a connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkState {
    /// Current status
    pub status: ConnectionStatus,
    /// Why the connection closed, once it has
    pub close_reason: Option<String>,
}

/// Build the relay URL for a room.
///
/// Existing `roomId` and `clientId` parameters on the base URL are
/// replaced; other query parameters are kept.
///
/// # Errors
///
/// Returns [`Error::ConstructionFailure`] if the base URL does not parse or
/// is not a `ws://` URL.
pub fn build_room_url(base: &str, room: &RoomId, client: &ClientId) -> Result<Url> {
    let mut url =
        Url::parse(base.trim()).map_err(|e| Error::ConstructionFailure(format!("{base}: {e}")))?;

    match url.scheme() {
        "ws" => {}
        "wss" => {
            return Err(Error::ConstructionFailure(format!(
                "{base}: TLS relays (wss://) are not supported by this build"
            )))
        }
        other => {
            return Err(Error::ConstructionFailure(format!(
                "{base}: unsupported scheme '{other}', expected ws://"
            )))
        }
    }

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != ROOM_QUERY_PARAM && k != CLIENT_QUERY_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(ROOM_QUERY_PARAM, room.as_str())
        .append_pair(CLIENT_QUERY_PARAM, &client.to_string());

    Ok(url)
}

/// Cloneable handle for sending on, observing, and closing a connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    outbound: mpsc::Sender<Outbound>,
    state: Arc<watch::Sender<LinkState>>,
    closing: Arc<AtomicBool>,
}

impl ConnectionHandle {
    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    /// Whether frames can be sent right now.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Why the connection closed, if it has.
    #[must_use]
    pub fn close_reason(&self) -> Option<String> {
        self.state.borrow().close_reason.clone()
    }

    /// Watch status transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Send one frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] unless the connection is connected.
    /// Nothing is buffered for later.
    pub async fn send(&self, frame: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        if self.outbound.send(Outbound::Data(frame)).await.is_err() {
            // driver is gone; its final event is still on the way
            self.closed().await;
            return Err(Error::NotConnected);
        }

        Ok(())
    }

    /// Wait until every frame sent so far has been written to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportClosed`] if the connection closes first;
    /// frames still queued at that point are discarded.
    pub async fn flush(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(self.closed_error());
        }

        let (done_tx, done_rx) = oneshot::channel();
        if self.outbound.send(Outbound::Flush(done_tx)).await.is_err() {
            self.closed().await;
            return Err(self.closed_error());
        }

        tokio::select! {
            result = done_rx => match result {
                Ok(()) => Ok(()),
                Err(_) => {
                    self.closed().await;
                    Err(self.closed_error())
                }
            },
            () = self.closed() => Err(self.closed_error()),
        }
    }

    /// Close the connection.
    ///
    /// Takes effect immediately: the status becomes closed, later sends
    /// fail, and frames still queued for the transport are dropped. Use
    /// [`flush`](Self::flush) first to let them out. Closing twice is a
    /// no-op.
    pub fn close(&self) {
        let changed = self.state.send_if_modified(|link| {
            if link.status == ConnectionStatus::Closed {
                return false;
            }
            link.status = ConnectionStatus::Closed;
            link.close_reason = Some("Connection closed by this client.".to_string());
            true
        });

        if changed {
            tracing::info!("Closing room connection");
            self.closing.store(true, Ordering::Release);
            let _ = self.outbound.try_send(Outbound::Close);
        }
    }

    /// Wait for the handshake to finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportClosed`] with the close reason if the
    /// connection closes instead.
    pub async fn wait_until_connected(&self) -> Result<()> {
        let mut rx = self.subscribe();
        let status = rx
            .wait_for(|link| link.status != ConnectionStatus::Connecting)
            .await
            .map(|link| link.status)
            .map_err(|_| self.closed_error())?;

        if status.is_connected() {
            Ok(())
        } else {
            Err(self.closed_error())
        }
    }

    /// Wait until the connection is closed.
    pub async fn closed(&self) {
        let mut rx = self.subscribe();
        let _ = rx
            .wait_for(|link| link.status == ConnectionStatus::Closed)
            .await;
    }

    /// The error describing why the connection is gone.
    #[must_use]
    pub fn closed_error(&self) -> Error {
        Error::TransportClosed(self.close_reason().unwrap_or_default())
    }
}

/// A room connection: a handle plus the stream of inbound frames.
#[derive(Debug)]
pub struct Connection {
    handle: ConnectionHandle,
    frames: mpsc::Receiver<Vec<u8>>,
}

impl Connection {
    /// Open a WebSocket connection to `url`.
    ///
    /// Returns immediately in the connecting state; the handshake runs in
    /// the background. Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConstructionFailure`] if the URL is not a `ws://`
    /// URL.
    pub fn connect(url: &Url) -> Result<Self> {
        if url.scheme() != "ws" {
            return Err(Error::ConstructionFailure(format!(
                "unsupported relay URL scheme '{}'",
                url.scheme()
            )));
        }

        tracing::info!(url = %url, "Connecting to relay");
        Ok(Self::from_transport(websocket::spawn(url.clone())))
    }

    /// Run the connection lifecycle over an existing transport.
    ///
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn from_transport(transport: Transport) -> Self {
        let (state_tx, _) = watch::channel(LinkState::default());
        let state = Arc::new(state_tx);
        let (frames_tx, frames) = mpsc::channel(INBOUND_CAPACITY);
        let Transport {
            outbound,
            events,
            closing,
        } = transport;

        tokio::spawn(drive(events, Arc::clone(&state), frames_tx));

        Self {
            handle: ConnectionHandle {
                outbound,
                state,
                closing,
            },
            frames,
        }
    }

    /// A handle to this connection.
    #[must_use]
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Next inbound frame; `None` once the connection is closed.
    pub async fn next_frame(&mut self) -> Option<Vec<u8>> {
        self.frames.recv().await
    }

    /// Split into the handle and the inbound frame receiver.
    #[must_use]
    pub fn into_parts(self) -> (ConnectionHandle, mpsc::Receiver<Vec<u8>>) {
        (self.handle, self.frames)
    }
}

/// Consume transport events until the connection closes.
async fn drive(
    mut events: mpsc::Receiver<TransportEvent>,
    state: Arc<watch::Sender<LinkState>>,
    frames: mpsc::Sender<Vec<u8>>,
) {
    let mut watcher = state.subscribe();

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = watcher.wait_for(|link| link.status == ConnectionStatus::Closed) => break,
        };

        let event = event.unwrap_or_else(|| TransportEvent::Close {
            code: 1006,
            reason: String::new(),
            was_clean: false,
        });

        if let TransportEvent::Message(frame) = event {
            let connected = state.borrow().status.is_connected();
            if connected && frames.send(frame).await.is_err() {
                tracing::debug!("Inbound frame receiver dropped");
            }
            continue;
        }

        record(&state, &event);

        if state.borrow().status == ConnectionStatus::Closed {
            break;
        }
    }
}

/// Apply a lifecycle event to the shared state.
fn record(state: &watch::Sender<LinkState>, event: &TransportEvent) {
    state.send_if_modified(|link| {
        let previous = link.status;
        let next = previous.apply(event);
        if next == previous {
            return false;
        }

        link.status = next;

        match event {
            TransportEvent::Open => {
                tracing::info!("Connected to relay");
            }
            TransportEvent::Close {
                code,
                reason,
                was_clean,
            } => {
                tracing::info!(code, reason = %reason, was_clean, "Relay connection closed");
                link.close_reason = Some(if reason.trim().is_empty() {
                    CLOSED_FALLBACK_MESSAGE.to_string()
                } else {
                    reason.clone()
                });
            }
            TransportEvent::Error(detail) => {
                tracing::warn!(error = %detail, "Relay connection failed");
                link.close_reason = Some(TRANSPORT_ERROR_MESSAGE.to_string());
            }
            TransportEvent::Message(_) => {}
        }

        true
    });
}
