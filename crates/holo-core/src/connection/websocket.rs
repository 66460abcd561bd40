//! WebSocket transport driver.
//!
//! The socket is split in two: a writer task drains [`Outbound`]
//! instructions into the sink while the reader turns incoming messages into
//! [`TransportEvent`]s. A slow upload never stops the reader, so relay
//! closes, pings, and peer frames keep flowing during a large send.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use super::{Outbound, Transport, TransportEvent, INBOUND_CAPACITY, OUTBOUND_CAPACITY};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code for a connection that dropped without a close frame.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code for a close frame that carried no status.
const NO_STATUS: u16 = 1005;

/// How long a local close may take to reach the relay.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Start a driver task for a WebSocket connection to `url`.
pub(super) fn spawn(url: Url) -> Transport {
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
    let (events_tx, events_rx) = mpsc::channel(INBOUND_CAPACITY);

    let transport = Transport::new(outbound_tx, events_rx);
    tokio::spawn(run(url, outbound_rx, events_tx, transport.closing()));

    transport
}

async fn run(
    url: Url,
    outbound: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<TransportEvent>,
    closing: Arc<AtomicBool>,
) {
    let socket = match connect_async(url.as_str()).await {
        Ok((socket, _response)) => socket,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "WebSocket handshake failed");
            let _ = events.send(abnormal_close()).await;
            return;
        }
    };

    if events.send(TransportEvent::Open).await.is_err() {
        return;
    }

    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_frames(
        sink,
        outbound,
        events.clone(),
        Arc::clone(&closing),
    ));

    read_frames(stream, &events).await;

    if closing.load(Ordering::Acquire) {
        // let the writer send our close frame
        if tokio::time::timeout(CLOSE_TIMEOUT, &mut writer).await.is_err() {
            writer.abort();
        }
    } else {
        writer.abort();
    }

    tracing::debug!(url = %url, "WebSocket driver stopped");
}

/// Write queued frames until the connection is closed.
///
/// Frames still queued once the closing flag is up are dropped.
async fn write_frames(
    mut sink: SplitSink<Socket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<TransportEvent>,
    closing: Arc<AtomicBool>,
) {
    while let Some(instruction) = outbound.recv().await {
        if closing.load(Ordering::Acquire) {
            break;
        }

        match instruction {
            Outbound::Data(frame) => {
                if let Err(e) = sink.send(Message::binary(frame)).await {
                    let _ = events.send(TransportEvent::Error(e.to_string())).await;
                    return;
                }
            }
            Outbound::Flush(done) => {
                let _ = done.send(());
            }
            Outbound::Close => break,
        }
    }

    let _ = sink.close().await;
}

/// Report incoming messages until the connection ends or nobody listens.
async fn read_frames(mut stream: SplitStream<Socket>, events: &mpsc::Sender<TransportEvent>) {
    loop {
        let incoming = tokio::select! {
            incoming = stream.next() => incoming,
            () = events.closed() => return,
        };

        let event = match incoming {
            Some(Ok(Message::Binary(data))) => TransportEvent::Message(data),
            Some(Ok(Message::Text(text))) => TransportEvent::Message(text.into_bytes()),
            Some(Ok(Message::Close(frame))) => {
                let (code, reason) = frame.map_or((NO_STATUS, String::new()), |f| {
                    (u16::from(f.code), f.reason.to_string())
                });
                TransportEvent::Close {
                    code,
                    reason,
                    was_clean: true,
                }
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => TransportEvent::Error(e.to_string()),
            None => abnormal_close(),
        };

        let terminal = !matches!(event, TransportEvent::Message(_));
        if events.send(event).await.is_err() || terminal {
            return;
        }
    }
}

fn abnormal_close() -> TransportEvent {
    TransportEvent::Close {
        code: ABNORMAL_CLOSURE,
        reason: String::new(),
        was_clean: false,
    }
}
