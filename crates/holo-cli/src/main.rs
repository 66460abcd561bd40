//! Holo CLI - Drop files to a peer through a room relay
//!
//! Both sides join the same room on a relay; whatever one side sends, the
//! other receives.
//!
//! ## Quick Start
//!
//! ```bash
//! # Pick a room
//! holo room
//!
//! # Wait for files (on one machine)
//! holo receive k3x9qa
//!
//! # Drop files into the room (on another)
//! holo send k3x9qa ./photo.png ./notes.txt
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose());

    match cli.command {
        Command::Room(args) => commands::room::run(args),
        Command::Send(args) => commands::send::run(args).await,
        Command::Receive(args) => commands::receive::run(args).await,
        Command::Config(args) => commands::config::run(args),
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default_filter = if verbose {
        "warn,holo=debug,holo_core=debug"
    } else {
        "warn,holo=info,holo_core=info"
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
