//! Error types for Holo.
//!
//! This module provides a unified error type for all Holo operations,
//! with specific error variants for different failure modes.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for Holo operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fallback shown when the relay closes without giving a reason.
pub const CLOSED_FALLBACK_MESSAGE: &str =
    "Connection closed. The relay may be offline, unreachable, or refused the handshake.";

/// Fallback shown when the transport reports an error.
pub const TRANSPORT_ERROR_MESSAGE: &str =
    "A connection error occurred. Check that the relay is reachable.";

/// Shown when a send is attempted on a connection that is not open.
pub const NOT_CONNECTED_MESSAGE: &str =
    "Unable to send data because the room connection is not open.";

/// Shown when the transport cannot even be created.
pub const CONSTRUCTION_FAILURE_MESSAGE: &str =
    "Could not open a connection to the relay. Check that the relay server is running and the relay URL is correct.";

/// The main error type for Holo.
#[derive(Error, Debug)]
pub enum Error {
    /// Send attempted while the transport is not connected (E101)
    #[error("room connection is not open")]
    NotConnected,

    /// Inbound frame could not be decoded (E102)
    #[error("could not decode frame: {0}")]
    Decode(#[from] DecodeError),

    /// The connection ended (E103)
    #[error("connection closed: {0}")]
    TransportClosed(String),

    /// The transport could not be created (E104)
    #[error("could not create transport: {0}")]
    ConstructionFailure(String),

    /// Invalid room token
    #[error("invalid room id: {0}")]
    InvalidRoom(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// File not found
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Invalid path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Reasons an inbound frame is rejected by the codec.
///
/// None of these are fatal: the session logs the error and keeps reading.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The frame is not a JSON envelope
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// The envelope names a message type this client does not know
    #[error("unknown message type '{0}'")]
    UnknownType(String),

    /// The payload does not match the message type
    #[error("invalid {kind} payload: {reason}")]
    InvalidPayload {
        /// Message type being decoded
        kind: &'static str,
        /// What was wrong
        reason: String,
    },

    /// The chunk bytes are not valid base64
    #[error("chunk payload is not valid base64: {0}")]
    InvalidChunkEncoding(String),

    /// The frame exceeds the relay frame cap
    #[error("frame of {0} bytes exceeds the frame size limit")]
    FrameTooLarge(usize),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::NotConnected => Some("E101"),
            Self::Decode(_) => Some("E102"),
            Self::TransportClosed(_) => Some("E103"),
            Self::ConstructionFailure(_) => Some("E104"),
            _ => None,
        }
    }

    /// Returns whether the session survives this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotConnected | Self::Decode(_))
    }

    /// Short message suitable for showing to a person.
    ///
    /// Closure errors carry the relay's own reason when one was given.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotConnected => NOT_CONNECTED_MESSAGE.to_string(),
            Self::TransportClosed(reason) if !reason.trim().is_empty() => reason.clone(),
            Self::TransportClosed(_) => CLOSED_FALLBACK_MESSAGE.to_string(),
            Self::ConstructionFailure(_) => CONSTRUCTION_FAILURE_MESSAGE.to_string(),
            other => other.to_string(),
        }
    }
}
