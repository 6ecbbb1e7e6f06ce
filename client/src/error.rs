use shared::{ProtocolError, TransportError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("not connected to the server")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
