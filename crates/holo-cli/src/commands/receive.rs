//! Receive command implementation.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use tokio::sync::broadcast::{self, error::RecvError};

use holo_core::file::{format_size, DirectorySink};
use holo_core::room::RoomId;
use holo_core::session::RoomSession;
use holo_core::transfer::{Transfer, TransferDirection, TransferState};

use super::ReceiveArgs;
use crate::ui;

/// Why the receive loop stopped.
#[derive(Debug)]
enum Stop {
    Count,
    Interrupted,
    Closed(String),
}

/// Run the receive command.
#[allow(clippy::too_many_lines)]
pub async fn run(args: ReceiveArgs) -> Result<()> {
    let config = super::load_config_with_relay(args.relay.as_deref());
    let room = RoomId::parse(&args.room)?;

    let output_dir = args
        .output
        .clone()
        .or_else(|| config.receive.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));
    let sink = DirectorySink::new(output_dir.clone())
        .with_overwrite(args.overwrite || config.receive.overwrite);

    let show = !args.quiet && !args.json;

    let session =
        RoomSession::join(&config, room, sink).map_err(|e| anyhow::anyhow!(e.user_message()))?;
    // before the handshake, so nothing that lands early is missed
    let mut events = session.subscribe();

    if show {
        ui::print_header();
        println!("  Room:    {}", session.room());
        println!("  Relay:   {}", config.relay_url());
        println!("  Saving:  {}", output_dir.display());
        if args.verbose {
            println!("  Client:  {}", session.client_id());
        }
        println!();
        println!("  Connecting...");
    }

    if args.json {
        let output = serde_json::json!({
            "status": "connecting",
            "room": session.room().as_str(),
            "client_id": session.client_id().to_string(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    }

    if let Err(e) = session.wait_until_connected().await {
        bail!(e.user_message());
    }

    if show {
        println!("  Waiting for files (Ctrl+C to stop)...");
        println!();
    }

    let (stop, saved) = wait_for_files(&session, &mut events, args.count, show).await;

    let room = session.room().clone();
    let transfers = session.close().await;
    let received: Vec<_> = transfers
        .into_iter()
        .filter(|t| t.direction == TransferDirection::Incoming)
        .collect();
    let total_bytes: u64 = received
        .iter()
        .filter(|t| t.artifact.is_some())
        .map(|t| t.size)
        .sum();

    if args.json {
        let output = serde_json::json!({
            "status": match &stop {
                Stop::Count => "done",
                Stop::Interrupted => "interrupted",
                Stop::Closed(_) => "closed",
            },
            "room": room.as_str(),
            "saved": saved,
            "transfers": received,
            "reason": match &stop {
                Stop::Closed(reason) => Some(reason.as_str()),
                Stop::Count | Stop::Interrupted => None,
            },
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !args.quiet {
        println!();
        if let Stop::Closed(reason) = &stop {
            println!("  {}", reason);
        }
        println!(
            "  Received {} file(s), {}.",
            saved,
            format_size(total_bytes)
        );
        println!();
    }

    match stop {
        Stop::Closed(reason) if args.count.is_some_and(|count| saved < count) => bail!(reason),
        _ => Ok(()),
    }
}

/// Follow incoming transfers until `count` files are saved, the room
/// closes, or the user interrupts.
///
/// Returns why it stopped and how many files were saved.
async fn wait_for_files(
    session: &RoomSession,
    events: &mut broadcast::Receiver<Transfer>,
    count: Option<usize>,
    show: bool,
) -> (Stop, usize) {
    let connection = session.connection();
    let mut saved = 0usize;

    let stop = loop {
        if count.is_some_and(|count| saved >= count) {
            break Stop::Count;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Stop::Interrupted,
            () = connection.closed() => {
                break Stop::Closed(connection.closed_error().user_message());
            }
            event = events.recv() => match event {
                Ok(transfer) if transfer.direction == TransferDirection::Incoming => {
                    if show {
                        print!("\r  {}", ui::transfer_line(&transfer));
                        let _ = io::stdout().flush();
                    }

                    match (&transfer.state, &transfer.artifact) {
                        (TransferState::Complete, Some(handle)) => {
                            saved += 1;
                            if show {
                                println!();
                                println!("  Saved {} -> {}", transfer.name, handle);
                            }
                        }
                        (TransferState::Abandoned, _) if show => println!(),
                        _ => {}
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Progress display fell behind");
                    saved = saved_so_far(session).await;
                }
                Err(RecvError::Closed) => {
                    break Stop::Closed(connection.closed_error().user_message());
                }
            },
        }
    };

    (stop, saved)
}

async fn saved_so_far(session: &RoomSession) -> usize {
    session
        .transfers()
        .await
        .iter()
        .filter(|t| t.direction == TransferDirection::Incoming && t.artifact.is_some())
        .count()
}
