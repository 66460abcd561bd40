//! Send command implementation.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Result};
use tokio::sync::broadcast;

use holo_core::file::{format_size, DirectorySink};
use holo_core::room::RoomId;
use holo_core::session::RoomSession;
use holo_core::transfer::{Transfer, TransferDirection, TransferState};

use super::SendArgs;
use crate::ui;

/// Run the send command.
pub async fn run(args: SendArgs) -> Result<()> {
    let config = super::load_config_with_relay(args.relay.as_deref());
    let room = RoomId::parse(&args.room)?;

    for path in &args.files {
        if !path.is_file() {
            bail!("Not a file: {}", path.display());
        }
    }

    let total_size: u64 = args
        .files
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .sum();

    if !args.quiet && !args.json {
        ui::print_header();
        println!("  Room:   {}", room);
        println!("  Relay:  {}", config.relay_url());
        println!(
            "  Files:  {} ({})",
            args.files.len(),
            format_size(total_size)
        );
        println!();
        println!("  Connecting...");
    }

    // Files the other side drops into the room while we send are kept too.
    let output_dir = config
        .receive
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let sink = DirectorySink::new(output_dir).with_overwrite(config.receive.overwrite);

    let session = RoomSession::join(&config, room.clone(), sink)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    if let Err(e) = session.wait_until_connected().await {
        bail!(e.user_message());
    }

    let client_id = session.client_id();

    if !args.quiet && !args.json {
        println!("  Connected to {}.", session.room());
        if args.verbose {
            println!("  Client: {}", client_id);
        }
        println!();
    }

    let progress = (!args.quiet && !args.json).then(|| {
        let events = session.subscribe();
        tokio::spawn(display_progress(events))
    });

    let mut failure = None;
    for path in &args.files {
        if let Err(e) = session.send_file(path).await {
            tracing::debug!(path = %path.display(), error = %e, "Send failed");
            failure = Some(format!("{}: {}", path.display(), e.user_message()));
            break;
        }
    }

    // close() drops whatever is still queued
    if failure.is_none() {
        if let Err(e) = session.connection().flush().await {
            failure = Some(e.user_message());
        }
    }

    let transfers = session.close().await;

    if let Some(progress) = progress {
        let _ = progress.await;
    }

    let sent: Vec<&Transfer> = transfers
        .iter()
        .filter(|t| t.direction == TransferDirection::Outgoing)
        .collect();
    let completed = sent
        .iter()
        .filter(|t| t.state == TransferState::Complete)
        .count();

    if args.json {
        let output = serde_json::json!({
            "status": if failure.is_none() { "sent" } else { "failed" },
            "room": room.as_str(),
            "client_id": client_id.to_string(),
            "transfers": transfers,
            "error": failure,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if !args.quiet {
        println!();
        println!("  Sent {} of {} file(s).", completed, args.files.len());
        for transfer in transfers
            .iter()
            .filter(|t| t.direction == TransferDirection::Incoming)
        {
            if let Some(handle) = &transfer.artifact {
                println!("  Received {} -> {}", transfer.name, handle);
            }
        }
        println!();
    }

    if let Some(message) = failure {
        bail!(message);
    }

    Ok(())
}

async fn display_progress(mut events: broadcast::Receiver<Transfer>) {
    loop {
        match events.recv().await {
            Ok(transfer) => {
                print!("\r  {}", ui::transfer_line(&transfer));
                if transfer.state.is_finished() {
                    println!();
                }
                let _ = io::stdout().flush();
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
