//! Error types of the server core
//!
//! Everything except [`ServerError`] is handled at the point where it occurs
//! and turned into a counter and a log line; none of them end a tick.

use shared::{EntityKey, TransportError};
use std::net::SocketAddr;
use thiserror::Error;

/// Reasons a join request is refused. No session exists afterwards.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid handshake from {peer}: {reason}")]
    InvalidHandshake { peer: SocketAddr, reason: String },
    #[error("server full ({max} sessions), rejecting {peer}")]
    ServerFull { peer: SocketAddr, max: usize },
}

/// Fault of a single entity update. The entity keeps its last good state.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum JobFault {
    #[error("{key} has non-finite state after update")]
    NonFinite { key: EntityKey },
    #[error("job for {key} panicked: {message}")]
    Panicked { key: EntityKey, message: String },
}

impl JobFault {
    pub fn key(&self) -> EntityKey {
        match self {
            JobFault::NonFinite { key } | JobFault::Panicked { key, .. } => *key,
        }
    }
}

/// Startup failures surfaced to the process owner.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid configuration: {0}")]
    Config(String),
}
