//! The control message carried in object metadata.
//!
//! Data-transfer clients write a small JSON message into the metadata of a
//! "ping" object whenever a consumer retrieves a producer's output. Unknown
//! message kinds deserialize to a catch-all variant and are ignored by the
//! manager.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a control message announces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    /// A consumer has retrieved a producer's output.
    ReadAck,
    /// Any kind this version does not know about.
    #[serde(other)]
    Unknown,
}

/// A control message naming a (producer, consumer) edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    /// The message kind.
    pub kind: ControlKind,
    /// Producer step UUID.
    pub source: Uuid,
    /// Consumer step UUID.
    pub target: Uuid,
}

impl ControlMessage {
    /// Creates a consumer-read acknowledgement for the given edge.
    #[must_use]
    pub fn read_ack(source: Uuid, target: Uuid) -> Self {
        Self {
            kind: ControlKind::ReadAck,
            source,
            target,
        }
    }

    /// Serializes the message for embedding in object metadata.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses a message out of object metadata.
    ///
    /// # Errors
    ///
    /// Returns a deserialization error for payloads that are not control
    /// messages; callers treat that as "not for us" rather than fatal.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_ack_round_trip() {
        let source = Uuid::new_v4();
        let target = Uuid::new_v4();
        let message = ControlMessage::read_ack(source, target);

        let parsed = ControlMessage::from_bytes(&message.to_bytes().unwrap()).unwrap();

        assert_eq!(parsed.kind, ControlKind::ReadAck);
        assert_eq!(parsed.source, source);
        assert_eq!(parsed.target, target);
    }

    #[test]
    fn test_unknown_kind_is_tolerated() {
        let source = Uuid::new_v4();
        let target = Uuid::new_v4();
        let json = format!(r#"{{"kind":"lease_renewal","source":"{source}","target":"{target}"}}"#);

        let parsed = ControlMessage::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(parsed.kind, ControlKind::Unknown);
    }

    #[test]
    fn test_arbitrary_payload_is_an_error() {
        assert!(ControlMessage::from_bytes(b"not a message").is_err());
        assert!(ControlMessage::from_bytes(br#"{"rows": 42}"#).is_err());
    }
}
