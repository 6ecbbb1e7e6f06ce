//! Datagram wire format
//!
//! Every datagram starts with a single kind byte followed by a bincode body.
//! Bodies use bincode's fixed-width little-endian integers and raw `f32`
//! fields, so a message never depends on the sender's platform.

use bincode::{deserialize, serialize_into};
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::world::{SnapshotEntity, Vec2};

pub const PROTOCOL_VERSION: u32 = 1;

/// Largest payload a UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Handshake = 0x01,
    Command = 0x02,
    Ping = 0x03,
    Snapshot = 0x10,
    Disconnect = 0x11,
}

impl TryFrom<u8> for MessageKind {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(MessageKind::Handshake),
            0x02 => Ok(MessageKind::Command),
            0x03 => Ok(MessageKind::Ping),
            0x10 => Ok(MessageKind::Snapshot),
            0x11 => Ok(MessageKind::Disconnect),
            other => Err(ProtocolError::UnknownKind(other)),
        }
    }
}

/// Join request from a client (`player_id` 0) or the server's acknowledgement
/// carrying the assigned player id.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub protocol_version: u32,
    pub player_id: u32,
}

impl Handshake {
    pub fn request() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            player_id: 0,
        }
    }

    pub fn accepted(player_id: u32) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            player_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    Fire,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Intent {
    /// Held movement direction; stays in effect until the next move intent.
    Move { direction: Vec2 },
    /// One-shot action applied on the next tick.
    Action { action: ActionKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub sequence: u32,
    pub intent: Intent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub timestamp_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u32,
    pub entities: Vec<SnapshotEntity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectReason {
    TimedOut,
    ClientLeft,
    ServerFull,
    Rejected,
    ServerShutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disconnect {
    pub player_id: u32,
    pub reason: DisconnectReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Handshake(Handshake),
    Command(Command),
    Ping(Ping),
    Snapshot(Snapshot),
    Disconnect(Disconnect),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Handshake(_) => MessageKind::Handshake,
            Message::Command(_) => MessageKind::Command,
            Message::Ping(_) => MessageKind::Ping,
            Message::Snapshot(_) => MessageKind::Snapshot,
            Message::Disconnect(_) => MessageKind::Disconnect,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let kind = self.kind();
        let mut bytes = vec![kind as u8];
        let written = match self {
            Message::Handshake(body) => serialize_into(&mut bytes, body),
            Message::Command(body) => serialize_into(&mut bytes, body),
            Message::Ping(body) => serialize_into(&mut bytes, body),
            Message::Snapshot(body) => serialize_into(&mut bytes, body),
            Message::Disconnect(body) => serialize_into(&mut bytes, body),
        };
        written.map_err(|source| ProtocolError::Encode { kind, source })?;
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Message, ProtocolError> {
        let (&first, body) = bytes.split_first().ok_or(ProtocolError::Empty)?;
        let kind = MessageKind::try_from(first)?;
        let malformed = |source| ProtocolError::Malformed { kind, source };

        let message = match kind {
            MessageKind::Handshake => Message::Handshake(deserialize(body).map_err(malformed)?),
            MessageKind::Command => Message::Command(deserialize(body).map_err(malformed)?),
            MessageKind::Ping => Message::Ping(deserialize(body).map_err(malformed)?),
            MessageKind::Snapshot => Message::Snapshot(deserialize(body).map_err(malformed)?),
            MessageKind::Disconnect => Message::Disconnect(deserialize(body).map_err(malformed)?),
        };
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::EntityKind;

    #[test]
    fn test_kind_byte_leads_every_message() {
        let cases = vec![
            (Message::Handshake(Handshake::request()), 0x01),
            (
                Message::Command(Command {
                    sequence: 1,
                    intent: Intent::Action {
                        action: ActionKind::Fire,
                    },
                }),
                0x02,
            ),
            (Message::Ping(Ping { timestamp_ms: 5 }), 0x03),
            (
                Message::Snapshot(Snapshot {
                    tick: 1,
                    entities: vec![],
                }),
                0x10,
            ),
            (
                Message::Disconnect(Disconnect {
                    player_id: 1,
                    reason: DisconnectReason::TimedOut,
                }),
                0x11,
            ),
        ];

        for (message, byte) in cases {
            let bytes = message.encode().unwrap();
            assert_eq!(bytes[0], byte, "wrong kind byte for {:?}", message.kind());
            assert_eq!(Message::decode(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn test_handshake_body_is_fixed_width() {
        let bytes = Message::Handshake(Handshake::accepted(7)).encode().unwrap();
        assert_eq!(bytes.len(), 1 + 4 + 4);
        assert_eq!(&bytes[1..5], &PROTOCOL_VERSION.to_le_bytes());
        assert_eq!(&bytes[5..9], &7u32.to_le_bytes());
    }

    #[test]
    fn test_snapshot_carries_positions() {
        let message = Message::Snapshot(Snapshot {
            tick: 42,
            entities: vec![SnapshotEntity {
                kind: EntityKind::Enemy,
                id: 3,
                position: Vec2::new(10.5, -2.0),
                velocity: Vec2::new(-120.0, 0.0),
            }],
        });

        match Message::decode(&message.encode().unwrap()).unwrap() {
            Message::Snapshot(snapshot) => {
                assert_eq!(snapshot.tick, 42);
                assert_eq!(snapshot.entities[0].position, Vec2::new(10.5, -2.0));
                assert_eq!(snapshot.entities[0].kind, EntityKind::Enemy);
            }
            other => panic!("Wrong message after decode: {:?}", other),
        }
    }

    #[test]
    fn test_decode_empty_datagram() {
        assert!(matches!(Message::decode(&[]), Err(ProtocolError::Empty)));
    }

    #[test]
    fn test_decode_unknown_kind() {
        assert!(matches!(
            Message::decode(&[0x7f, 0, 0]),
            Err(ProtocolError::UnknownKind(0x7f))
        ));
    }

    #[test]
    fn test_decode_truncated_body() {
        let bytes = Message::Ping(Ping { timestamp_ms: 99 }).encode().unwrap();
        let result = Message::decode(&bytes[..4]);
        assert!(matches!(
            result,
            Err(ProtocolError::Malformed {
                kind: MessageKind::Ping,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_bad_enum_tag() {
        // Command with an intent tag past the last variant
        let mut bytes = vec![MessageKind::Command as u8];
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&9u32.to_le_bytes());
        assert!(Message::decode(&bytes).is_err());
    }
}
