use std::net::SocketAddr;
use thiserror::Error;

use crate::protocol::MessageKind;

/// Datagram send/receive faults. Logged and counted by the caller, never fatal.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind datagram socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to send datagram to {peer}: {source}")]
    Send {
        peer: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to receive datagram: {0}")]
    Receive(#[source] std::io::Error),
    #[error("peer {0} is unreachable")]
    Unreachable(SocketAddr),
    #[error("local address unavailable: {0}")]
    LocalAddr(#[source] std::io::Error),
}

/// Malformed or unexpected datagrams.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty datagram")]
    Empty,
    #[error("unknown message kind 0x{0:02x}")]
    UnknownKind(u8),
    #[error("malformed {kind:?} body: {source}")]
    Malformed {
        kind: MessageKind,
        #[source]
        source: bincode::Error,
    },
    #[error("failed to encode {kind:?} message: {source}")]
    Encode {
        kind: MessageKind,
        #[source]
        source: bincode::Error,
    },
}
