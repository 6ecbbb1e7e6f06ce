//! Entity and snapshot types replicated between server and clients

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{WORLD_HEIGHT, WORLD_WIDTH};

/// Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Vec2 {
    /// Value along the x-axis. Positive direction is to the right.
    pub x: f32,
    /// Value along the y-axis. Positive direction is down.
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    /// Returns the normalized vector, or zero for a zero-length vector.
    pub fn normalize(&self) -> Vec2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec2::ZERO
        } else {
            Vec2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    /// Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    /// Returns the sum of two vectors.
    pub fn add(&self, other: &Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    pub fn distance(&self, other: &Vec2) -> f32 {
        Vec2::new(other.x - self.x, other.y - self.y).magnitude()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Clamps the vector into the playable world rectangle.
    pub fn clamp_to_world(&self) -> Vec2 {
        Vec2 {
            x: self.x.clamp(0.0, WORLD_WIDTH),
            y: self.y.clamp(0.0, WORLD_HEIGHT),
        }
    }

    pub fn in_world(&self, margin: f32) -> bool {
        self.x >= -margin
            && self.x <= WORLD_WIDTH + margin
            && self.y >= -margin
            && self.y <= WORLD_HEIGHT + margin
    }
}

/// Server-assigned identifier of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Player,
    Enemy,
    Projectile,
}

/// Entity ids are unique within a kind, so the pair is the world-wide key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub id: u32,
}

impl EntityKey {
    pub fn new(kind: EntityKind, id: u32) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.kind, self.id)
    }
}

/// Authoritative state of one entity at the end of a tick.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub kind: EntityKind,
    pub id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Owning session for players, firing session for projectiles.
    pub owner: Option<SessionId>,
    pub spawn_tick: u32,
    pub last_update_tick: u32,
}

impl EntityState {
    pub fn new(kind: EntityKind, id: u32, position: Vec2, velocity: Vec2, tick: u32) -> Self {
        Self {
            kind,
            id,
            position,
            velocity,
            owner: None,
            spawn_tick: tick,
            last_update_tick: tick,
        }
    }

    pub fn with_owner(mut self, owner: SessionId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id)
    }

    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.velocity.is_finite()
    }

    pub fn to_wire(&self) -> SnapshotEntity {
        SnapshotEntity {
            kind: self.kind,
            id: self.id,
            position: self.position,
            velocity: self.velocity,
        }
    }
}

/// Entity as carried inside a snapshot datagram.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SnapshotEntity {
    pub kind: EntityKind,
    pub id: u32,
    pub position: Vec2,
    pub velocity: Vec2,
}

impl SnapshotEntity {
    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.id)
    }
}

/// Immutable copy of the world published at the end of a tick.
///
/// Entities are kept sorted by [`EntityKey`], which makes the serialized
/// form independent of the order in which jobs finished.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TickSnapshot {
    tick: u32,
    entities: Vec<EntityState>,
}

impl TickSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(tick: u32, mut entities: Vec<EntityState>) -> Self {
        entities.sort_by_key(|e| e.key());
        entities.dedup_by_key(|e| e.key());
        Self { tick, entities }
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn entities(&self) -> &[EntityState] {
        &self.entities
    }

    pub fn get(&self, key: EntityKey) -> Option<&EntityState> {
        self.entities
            .binary_search_by_key(&key, |e| e.key())
            .ok()
            .map(|index| &self.entities[index])
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.get(key).is_some()
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &EntityState> {
        self.entities.iter().filter(move |e| e.kind == kind)
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.of_kind(kind).count()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn to_wire(&self) -> Vec<SnapshotEntity> {
        self.entities.iter().map(EntityState::to_wire).collect()
    }
}
