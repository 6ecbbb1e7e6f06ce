//! Capability shared by the server and client network managers

use crate::protocol::DisconnectReason;

/// Events surfaced to presentation code once per frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkEvent {
    PlayerJoined {
        player_id: u32,
    },
    PlayerLeft {
        player_id: u32,
        reason: DisconnectReason,
    },
    SnapshotApplied {
        tick: u32,
    },
}

/// Protocol layer sitting on top of a [`Transport`](crate::transport::Transport).
///
/// The server variant advances one simulation tick per `update`; the client
/// variant drains the socket and applies whatever snapshots arrived. Scenes
/// only ever talk to either through `poll_events`.
pub trait NetworkManager {
    fn update(&mut self);

    /// Takes every event raised since the previous call.
    fn poll_events(&mut self) -> Vec<NetworkEvent>;

    /// Notifies peers that this side is going away.
    fn shutdown(&mut self);
}
