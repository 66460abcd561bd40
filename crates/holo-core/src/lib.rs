//! # Holo Core Library
//!
//! `holo-core` implements the chunked transfer protocol behind Holo: two
//! peers join the same room on a relay and drop files to each other without
//! the file ever touching storage on the way.
//!
//! ## Features
//!
//! - **Room-based**: peers find each other through a shared room token
//! - **Bounded memory**: outgoing files are read one piece at a time
//! - **Fire-and-forget**: no acknowledgments, the relay preserves ordering
//! - **Wire compatible**: JSON envelopes with base64 chunk payloads
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`connection`] - Connection lifecycle and transports
//! - [`mod@file`] - File sources, piece planning, and artifact sinks
//! - [`protocol`] - Message codec
//! - [`room`] - Room tokens and client identifiers
//! - [`session`] - A joined room with its transfers
//! - [`transfer`] - Transfer model, registry, chunker, and reassembler
//!
//! ## Example
//!
//! ```rust,ignore
//! use holo_core::config::Config;
//! use holo_core::room::RoomId;
//! use holo_core::session::RoomSession;
//!
//! let room = RoomId::parse("k3x9qa")?;
//! let mut session = RoomSession::join(&Config::load()?, room, sink)?;
//! session.wait_until_connected().await?;
//! let id = session.send_file("report.pdf").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod connection;
pub mod error;
pub mod file;
pub mod protocol;
pub mod room;
pub mod session;
pub mod transfer;

pub use error::{DecodeError, Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default piece size for outgoing transfers (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Largest piece size accepted from configuration (1 MiB).
///
/// Base64 inflates a piece by a third, so this keeps every encoded frame
/// under [`MAX_FRAME_SIZE`].
pub const MAX_CHUNK_SIZE: usize = 1024 * 1024;

/// Largest frame the relay forwards (2 MiB)
pub const MAX_FRAME_SIZE: usize = 2 * 1024 * 1024;

/// Default relay WebSocket endpoint
pub const DEFAULT_RELAY_URL: &str = "ws://localhost:8080/ws";

/// Environment variable overriding the configured relay URL
pub const RELAY_URL_ENV: &str = "HOLO_RELAY_URL";

/// Content type used when a file's type is unknown
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";
