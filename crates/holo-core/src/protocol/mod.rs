//! Holo wire protocol.
//!
//! Every relay frame carries exactly one self-describing message: a JSON
//! envelope with a type discriminator and a payload object. The relay never
//! inspects frames, so the envelope is all a receiver needs to dispatch.
//!
//! ## Frame Format
//!
//! ```text
//! {"type":"file-meta","payload":{"fileId":"…","name":"a.txt","size":140000,"mime":"text/plain"}}
//! {"type":"file-chunk","payload":{"fileId":"…","chunk":"<base64>","offset":0,"final":false}}
//! ```
//!
//! - Frames are UTF-8 JSON sent as binary WebSocket messages.
//! - Chunk bytes are base64 (standard alphabet, padded) because the
//!   envelope is text.
//! - Frames larger than [`MAX_FRAME_SIZE`](crate::MAX_FRAME_SIZE) are
//!   rejected before parsing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{DecodeError, Error, Result};

/// Envelope type of a transfer announcement.
pub const META_TYPE: &str = "file-meta";

/// Envelope type of a transfer piece.
pub const CHUNK_TYPE: &str = "file-chunk";

/// Opaque identifier of one transfer, chosen by the sender.
///
/// Fresh ids are random UUIDs. Uniqueness is probabilistic; a collision is
/// an accepted risk and is not detected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(String);

impl TransferId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Wrap an id received from a peer.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransferId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Announcement of a new transfer. Must precede every chunk of its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaMessage {
    /// Transfer being announced
    pub transfer_id: TransferId,
    /// Display name, not sanitized
    pub name: String,
    /// Total length in bytes
    pub size: u64,
    /// Advisory content type
    pub mime_type: String,
}

/// One piece of a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMessage {
    /// Transfer this piece belongs to
    pub transfer_id: TransferId,
    /// Raw piece bytes
    pub payload: Vec<u8>,
    /// Byte offset of `payload` within the file
    pub offset: u64,
    /// Set on the last piece only
    pub is_final: bool,
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `file-meta`
    Meta(MetaMessage),
    /// `file-chunk`
    Chunk(ChunkMessage),
}

impl Message {
    /// The transfer this message refers to.
    #[must_use]
    pub fn transfer_id(&self) -> &TransferId {
        match self {
            Self::Meta(meta) => &meta.transfer_id,
            Self::Chunk(chunk) => &chunk.transfer_id,
        }
    }

    /// The envelope type string.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Meta(_) => META_TYPE,
            Self::Chunk(_) => CHUNK_TYPE,
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a, P> {
    #[serde(rename = "type")]
    kind: &'a str,
    payload: P,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaWire {
    file_id: TransferId,
    name: String,
    size: u64,
    #[serde(default)]
    mime: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChunkWire {
    file_id: TransferId,
    chunk: String,
    offset: u64,
    #[serde(rename = "final", default)]
    is_final: bool,
}

/// Encode a message into one frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    let encoded = match message {
        Message::Meta(meta) => serde_json::to_vec(&Envelope {
            kind: META_TYPE,
            payload: MetaWire {
                file_id: meta.transfer_id.clone(),
                name: meta.name.clone(),
                size: meta.size,
                mime: Some(meta.mime_type.clone()),
            },
        }),
        Message::Chunk(chunk) => serde_json::to_vec(&Envelope {
            kind: CHUNK_TYPE,
            payload: ChunkWire {
                file_id: chunk.transfer_id.clone(),
                chunk: STANDARD.encode(&chunk.payload),
                offset: chunk.offset,
                is_final: chunk.is_final,
            },
        }),
    };

    encoded.map_err(|e| Error::Serialization(e.to_string()))
}

/// Decode one frame into a message.
///
/// # Errors
///
/// Returns a [`DecodeError`] for oversized frames, malformed envelopes,
/// unknown message types, payloads that do not fit their type, and chunk
/// bytes that are not valid base64.
pub fn decode(frame: &[u8]) -> std::result::Result<Message, DecodeError> {
    if frame.len() > crate::MAX_FRAME_SIZE {
        return Err(DecodeError::FrameTooLarge(frame.len()));
    }

    let envelope: RawEnvelope =
        serde_json::from_slice(frame).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    match envelope.kind.as_str() {
        META_TYPE => {
            let wire: MetaWire = serde_json::from_value(envelope.payload).map_err(|e| {
                DecodeError::InvalidPayload {
                    kind: META_TYPE,
                    reason: e.to_string(),
                }
            })?;

            let mime_type = wire
                .mime
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| crate::DEFAULT_MIME_TYPE.to_string());

            Ok(Message::Meta(MetaMessage {
                transfer_id: wire.file_id,
                name: wire.name,
                size: wire.size,
                mime_type,
            }))
        }
        CHUNK_TYPE => {
            let wire: ChunkWire = serde_json::from_value(envelope.payload).map_err(|e| {
                DecodeError::InvalidPayload {
                    kind: CHUNK_TYPE,
                    reason: e.to_string(),
                }
            })?;

            let payload = STANDARD
                .decode(wire.chunk.as_bytes())
                .map_err(|e| DecodeError::InvalidChunkEncoding(e.to_string()))?;

            Ok(Message::Chunk(ChunkMessage {
                transfer_id: wire.file_id,
                payload,
                offset: wire.offset,
                is_final: wire.is_final,
            }))
        }
        other => Err(DecodeError::UnknownType(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> MetaMessage {
        MetaMessage {
            transfer_id: TransferId::new("f-1"),
            name: "a.txt".to_string(),
            size: 140_000,
            mime_type: "text/plain".to_string(),
        }
    }

    #[test]
    fn test_meta_wire_shape() {
        let frame = encode(&Message::Meta(meta())).expect("encode");
        let value: serde_json::Value = serde_json::from_slice(&frame).expect("json");

        assert_eq!(
            value,
            serde_json::json!({
                "type": "file-meta",
                "payload": {
                    "fileId": "f-1",
                    "name": "a.txt",
                    "size": 140_000,
                    "mime": "text/plain",
                }
            })
        );
    }

    #[test]
    fn test_chunk_wire_shape() {
        let chunk = ChunkMessage {
            transfer_id: TransferId::new("f-1"),
            payload: b"hello".to_vec(),
            offset: 65_536,
            is_final: true,
        };
        let frame = encode(&Message::Chunk(chunk)).expect("encode");
        let value: serde_json::Value = serde_json::from_slice(&frame).expect("json");

        assert_eq!(value["type"], "file-chunk");
        assert_eq!(value["payload"]["chunk"], "aGVsbG8=");
        assert_eq!(value["payload"]["offset"], 65_536);
        assert_eq!(value["payload"]["final"], true);
    }

    #[test]
    fn test_decode_frame_from_web_client() {
        let frame = br#"{"type":"file-chunk","payload":{"fileId":"abc","chunk":"AAEC/w==","offset":0,"final":false}}"#;

        let message = decode(frame).expect("decode");
        let Message::Chunk(chunk) = message else {
            panic!("expected chunk, got {message:?}");
        };
        assert_eq!(chunk.transfer_id.as_str(), "abc");
        assert_eq!(chunk.payload, vec![0x00, 0x01, 0x02, 0xFF]);
        assert!(!chunk.is_final);
    }

    #[test]
    fn test_decode_empty_chunk_payload() {
        let frame = br#"{"type":"file-chunk","payload":{"fileId":"z","chunk":"","offset":0,"final":true}}"#;

        match decode(frame).expect("decode") {
            Message::Chunk(chunk) => {
                assert!(chunk.payload.is_empty());
                assert!(chunk.is_final);
            }
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_meta_without_mime_uses_default() {
        let frame = br#"{"type":"file-meta","payload":{"fileId":"x","name":"blob","size":3,"mime":""}}"#;

        match decode(frame).expect("decode") {
            Message::Meta(meta) => assert_eq!(meta.mime_type, crate::DEFAULT_MIME_TYPE),
            other => panic!("expected meta, got {other:?}"),
        }

        let frame = br#"{"type":"file-meta","payload":{"fileId":"x","name":"blob","size":3}}"#;
        match decode(frame).expect("decode") {
            Message::Meta(meta) => assert_eq!(meta.mime_type, crate::DEFAULT_MIME_TYPE),
            other => panic!("expected meta, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_type() {
        let frame = br#"{"type":"presence","payload":{}}"#;
        assert_eq!(
            decode(frame),
            Err(DecodeError::UnknownType("presence".to_string()))
        );
    }

    #[test]
    fn test_decode_malformed_json() {
        assert!(matches!(
            decode(b"not json at all"),
            Err(DecodeError::Malformed(_))
        ));
        assert!(matches!(decode(&[0xFF, 0xFE]), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_decode_bad_base64() {
        let frame = br#"{"type":"file-chunk","payload":{"fileId":"x","chunk":"@@not base64@@","offset":0,"final":true}}"#;
        assert!(matches!(
            decode(frame),
            Err(DecodeError::InvalidChunkEncoding(_))
        ));
    }

    #[test]
    fn test_decode_payload_missing_fields() {
        let frame = br#"{"type":"file-meta","payload":{"name":"a.txt"}}"#;
        assert!(matches!(
            decode(frame),
            Err(DecodeError::InvalidPayload { kind: META_TYPE, .. })
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let frame = vec![b' '; crate::MAX_FRAME_SIZE + 1];
        assert_eq!(
            decode(&frame),
            Err(DecodeError::FrameTooLarge(crate::MAX_FRAME_SIZE + 1))
        );
    }

    #[test]
    fn test_meta_survives_codec() {
        let original = Message::Meta(meta());
        let decoded = decode(&encode(&original).expect("encode")).expect("decode");
        assert_eq!(decoded, original);
        assert_eq!(decoded.kind(), META_TYPE);
        assert_eq!(decoded.transfer_id().as_str(), "f-1");
    }

    #[test]
    fn test_generated_ids_differ() {
        assert_ne!(TransferId::generate(), TransferId::generate());
    }
}
