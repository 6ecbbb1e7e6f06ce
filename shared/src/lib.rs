//! Types shared by the server and its clients: the entity model, the datagram
//! wire format, the transport abstraction and the network manager capability.

pub mod clock;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod transport;
pub mod world;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ProtocolError, TransportError};
pub use manager::{NetworkEvent, NetworkManager};
pub use protocol::{
    ActionKind, Command, Disconnect, DisconnectReason, Handshake, Intent, Message, MessageKind,
    Ping, Snapshot, PROTOCOL_VERSION,
};
pub use transport::{MemoryNetwork, MemoryTransport, Transport, UdpTransport};
pub use world::{EntityKey, EntityKind, EntityState, SessionId, SnapshotEntity, TickSnapshot, Vec2};

pub const WORLD_WIDTH: f32 = 1280.0;
pub const WORLD_HEIGHT: f32 = 720.0;
pub const PLAYER_SPEED: f32 = 300.0;
pub const ENEMY_SPEED: f32 = 120.0;
pub const ENEMY_TRACKING_SPEED: f32 = 60.0;
pub const PROJECTILE_SPEED: f32 = 600.0;
/// Distance under which a projectile and an enemy collide.
pub const HIT_RADIUS: f32 = 24.0;
pub const PLAYER_SPAWN_X: f32 = 200.0;

/// Spawn point of a player: one column, four lanes 100 units apart.
pub fn player_spawn_position(player_id: u32) -> Vec2 {
    let lane = player_id.saturating_sub(1) % 4;
    Vec2::new(PLAYER_SPAWN_X, 200.0 + lane as f32 * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_player_spawn_lanes() {
        assert_eq!(player_spawn_position(1), Vec2::new(200.0, 200.0));
        assert_eq!(player_spawn_position(2), Vec2::new(200.0, 300.0));
        assert_eq!(player_spawn_position(4), Vec2::new(200.0, 500.0));
        assert_eq!(player_spawn_position(5), Vec2::new(200.0, 200.0));
    }

    #[test]
    fn test_spawn_inside_world() {
        for id in 1..=16 {
            assert!(player_spawn_position(id).in_world(0.0));
        }
    }
}
