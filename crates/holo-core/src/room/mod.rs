//! Room tokens and client identifiers.
//!
//! A room is a relay channel named by a short shared token. Anyone who knows
//! the token can join, so tokens are only as private as the people who share
//! them.
//!
//! ## Token Format
//!
//! Generated tokens are 6 characters drawn from `a-z0-9`, which gives
//! 36^6 (about 2.2 billion) tokens. Tokens typed by a person may be any
//! non-empty run of URL-safe characters (`A-Z`, `a-z`, `0-9`, `-`, `_`)
//! up to [`MAX_ROOM_LENGTH`] long, so rooms created by other clients can
//! still be joined.
//!
//! ## Example
//!
//! ```rust,ignore
//! use holo_core::room::RoomId;
//!
//! let room = RoomId::generate();
//! println!("Share this room: {room}");
//!
//! let room = RoomId::parse(" k3x9qa ")?;
//! ```

use crate::error::{Error, Result};

/// The character set used for generated room tokens.
pub const ROOM_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Length of a generated room token
pub const ROOM_LENGTH: usize = 6;

/// Longest room token accepted from user input
pub const MAX_ROOM_LENGTH: usize = 64;

/// A validated room token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId {
    id: String,
}

impl RoomId {
    /// Generate a new random room token.
    #[must_use]
    pub fn generate() -> Self {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let id: String = (0..ROOM_LENGTH)
            .map(|_| {
                let idx = rng.gen_range(0..ROOM_CHARSET.len());
                ROOM_CHARSET[idx] as char
            })
            .collect();

        Self { id }
    }

    /// Parse and validate a room token from a string.
    ///
    /// Surrounding whitespace is ignored. Case is preserved because the
    /// relay matches rooms exactly.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty, too long, or contains a
    /// character that is not URL-safe.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();

        if trimmed.is_empty() {
            return Err(Error::InvalidRoom("room id must not be empty".to_string()));
        }

        if trimmed.len() > MAX_ROOM_LENGTH {
            return Err(Error::InvalidRoom(format!(
                "room id must be at most {MAX_ROOM_LENGTH} characters, got {}",
                trimmed.len()
            )));
        }

        if let Some(c) = trimmed
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(Error::InvalidRoom(format!(
                "invalid character '{c}' in room id"
            )));
        }

        Ok(Self {
            id: trimmed.to_string(),
        })
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.id
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl std::str::FromStr for RoomId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Identifier this client presents to the relay.
///
/// A fresh one is generated per session; the relay uses it to avoid
/// echoing a client's own frames back to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(uuid::Uuid);

impl ClientId {
    /// Generate a new random client id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::generate()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
