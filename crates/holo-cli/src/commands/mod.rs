//! CLI command definitions and handlers.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use holo_core::config::Config;

/// Load configuration with graceful fallback to defaults.
///
/// A file that cannot be read or parsed is reported once and then ignored,
/// so a broken config never blocks a transfer.
pub fn load_config() -> Config {
    match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring configuration file");
            Config::default()
        }
    }
}

/// Load configuration and apply a `--relay` override.
///
/// The flag wins over both `HOLO_RELAY_URL` and the config file.
pub fn load_config_with_relay(relay: Option<&str>) -> Config {
    let config = load_config();
    match relay {
        Some(url) => config.with_relay_override(url),
        None => config,
    }
}

pub mod config;
pub mod receive;
pub mod room;
pub mod send;

/// Holo - Drop files to a peer through a room relay
#[derive(Parser)]
#[command(name = "holo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Whether the chosen command asked for detailed logging.
    #[must_use]
    pub const fn verbose(&self) -> bool {
        match &self.command {
            Command::Send(args) => args.verbose,
            Command::Receive(args) => args.verbose,
            Command::Room(_) | Command::Config(_) => false,
        }
    }
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Generate a new room id
    Room(RoomArgs),

    /// Send files into a room
    Send(SendArgs),

    /// Receive files dropped into a room
    Receive(ReceiveArgs),

    /// Manage configuration
    Config(ConfigArgs),
}

/// Arguments for the room command
#[derive(Parser)]
pub struct RoomArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// Room to join
    pub room: String,

    /// Files to send
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Relay WebSocket URL (overrides config and HOLO_RELAY_URL)
    #[arg(long)]
    pub relay: Option<String>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Detailed logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the receive command
#[derive(Parser)]
pub struct ReceiveArgs {
    /// Room to join
    pub room: String,

    /// Output directory for received files
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Exit after this many files have been saved
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Replace existing files instead of picking a free name
    #[arg(long)]
    pub overwrite: bool,

    /// Relay WebSocket URL (overrides config and HOLO_RELAY_URL)
    #[arg(long)]
    pub relay: Option<String>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,

    /// Detailed logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the config command
#[derive(Parser)]
pub struct ConfigArgs {
    /// Config action
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config actions
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Configuration key (e.g. relay.url)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// New value
        value: String,
    },

    /// Show all configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Reset to defaults
    Reset,
}
