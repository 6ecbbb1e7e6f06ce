//! Per-entity simulation rules executed by the job scheduler
//!
//! A [`Job`] owns a copy of one entity's state from the previous snapshot
//! plus, for players, the intent recorded on their session. Running it reads
//! nothing but that copy and the previous snapshot, and produces a fresh
//! [`JobOutput`]; it never sees another job's output.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    ActionKind, EntityKey, EntityKind, EntityState, SessionId, TickSnapshot, Vec2, ENEMY_SPEED,
    ENEMY_TRACKING_SPEED, HIT_RADIUS, PLAYER_SPEED, PROJECTILE_SPEED, WORLD_HEIGHT, WORLD_WIDTH,
};

use crate::error::JobFault;

/// Request to create a non-player entity at the end of the tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub kind: EntityKind,
    pub position: Vec2,
    pub velocity: Vec2,
    pub owner: Option<SessionId>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerIntent {
    pub direction: Vec2,
    pub action: Option<ActionKind>,
}

/// One entity's update for one tick.
#[derive(Debug, Clone)]
pub struct Job {
    pub entity: EntityState,
    /// Present for player jobs only.
    pub intent: Option<PlayerIntent>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub entity: EntityState,
    pub spawn: Option<SpawnRequest>,
}

impl Job {
    pub fn player(entity: EntityState, intent: PlayerIntent) -> Self {
        Self {
            entity,
            intent: Some(intent),
        }
    }

    pub fn npc(entity: EntityState) -> Self {
        Self {
            entity,
            intent: None,
        }
    }

    pub fn key(&self) -> EntityKey {
        self.entity.key()
    }

    /// Advances the entity by `dt` seconds into `tick`.
    pub fn run(&self, previous: &TickSnapshot, tick: u32, dt: f32) -> Result<JobOutput, JobFault> {
        let mut entity = self.entity.clone();
        let mut spawn = None;

        match entity.kind {
            EntityKind::Player => {
                let intent = self.intent.unwrap_or(PlayerIntent {
                    direction: Vec2::ZERO,
                    action: None,
                });
                entity.velocity = intent.direction.normalize().scale(PLAYER_SPEED);
                entity.position = entity
                    .position
                    .add(&entity.velocity.scale(dt))
                    .clamp_to_world();

                if intent.action == Some(ActionKind::Fire) {
                    spawn = Some(SpawnRequest {
                        kind: EntityKind::Projectile,
                        position: entity.position,
                        velocity: Vec2::new(PROJECTILE_SPEED, 0.0),
                        owner: entity.owner,
                    });
                }
            }
            EntityKind::Enemy => {
                entity.velocity.y = tracking_velocity(&entity, previous);
                entity.position = entity.position.add(&entity.velocity.scale(dt));
            }
            EntityKind::Projectile => {
                entity.position = entity.position.add(&entity.velocity.scale(dt));
            }
        }

        if !entity.is_finite() {
            return Err(JobFault::NonFinite { key: entity.key() });
        }
        entity.last_update_tick = tick;

        Ok(JobOutput { entity, spawn })
    }
}

/// Vertical drift of an enemy toward the nearest player of the previous tick.
fn tracking_velocity(enemy: &EntityState, previous: &TickSnapshot) -> f32 {
    let mut nearest: Option<&EntityState> = None;
    for player in previous.of_kind(EntityKind::Player) {
        let closer = nearest.map_or(true, |best| {
            enemy.position.distance(&player.position) < enemy.position.distance(&best.position)
        });
        if closer {
            nearest = Some(player);
        }
    }

    match nearest {
        Some(player) if (player.position.y - enemy.position.y).abs() > 1.0 => {
            ENEMY_TRACKING_SPEED * (player.position.y - enemy.position.y).signum()
        }
        _ => 0.0,
    }
}

/// Spawn and despawn rules for enemies and projectiles
///
/// Supplied by the game-design layer. Both calls run on the tick thread
/// during publishing, after every job of the tick has finished.
pub trait EntitySpawnPolicy: Send {
    /// Entities to add to the snapshot being built for `tick`.
    fn spawns(&mut self, tick: u32, previous: &TickSnapshot) -> Vec<SpawnRequest>;

    /// Whether an updated non-player entity leaves the world at `tick`.
    fn should_despawn(&self, entity: &EntityState, tick: u32, previous: &TickSnapshot) -> bool;
}

/// Keeps whatever exists and never adds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSpawns;

impl EntitySpawnPolicy for NoSpawns {
    fn spawns(&mut self, _tick: u32, _previous: &TickSnapshot) -> Vec<SpawnRequest> {
        Vec::new()
    }

    fn should_despawn(&self, _entity: &EntityState, _tick: u32, _previous: &TickSnapshot) -> bool {
        false
    }
}

/// Margin past the world edge before an entity is considered gone.
const DESPAWN_MARGIN: f32 = 64.0;

/// Periodic enemy waves entering from the right edge
///
/// Removes entities that leave the world, projectiles past their lifetime,
/// and projectile/enemy pairs that overlapped in the previous snapshot.
#[derive(Debug)]
pub struct WaveSpawnPolicy {
    rng: StdRng,
    pub spawn_interval_ticks: u32,
    pub max_enemies: usize,
    pub projectile_lifetime_ticks: u32,
}

impl WaveSpawnPolicy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            spawn_interval_ticks: 120,
            max_enemies: 16,
            projectile_lifetime_ticks: 180,
        }
    }

    fn collides(entity: &EntityState, previous: &TickSnapshot) -> bool {
        let target = match entity.kind {
            EntityKind::Projectile => EntityKind::Enemy,
            EntityKind::Enemy => EntityKind::Projectile,
            EntityKind::Player => return false,
        };
        let Some(before) = previous.get(entity.key()) else {
            return false;
        };
        previous
            .of_kind(target)
            .any(|other| before.position.distance(&other.position) < HIT_RADIUS)
    }
}

impl EntitySpawnPolicy for WaveSpawnPolicy {
    fn spawns(&mut self, tick: u32, previous: &TickSnapshot) -> Vec<SpawnRequest> {
        if self.spawn_interval_ticks == 0 || tick % self.spawn_interval_ticks != 0 {
            return Vec::new();
        }
        if previous.count(EntityKind::Player) == 0
            || previous.count(EntityKind::Enemy) >= self.max_enemies
        {
            return Vec::new();
        }

        let y = self.rng.gen_range(HIT_RADIUS..WORLD_HEIGHT - HIT_RADIUS);
        vec![SpawnRequest {
            kind: EntityKind::Enemy,
            position: Vec2::new(WORLD_WIDTH, y),
            velocity: Vec2::new(-ENEMY_SPEED, 0.0),
            owner: None,
        }]
    }

    fn should_despawn(&self, entity: &EntityState, tick: u32, previous: &TickSnapshot) -> bool {
        if entity.kind == EntityKind::Player {
            return false;
        }
        if !entity.position.in_world(DESPAWN_MARGIN) {
            return true;
        }
        if entity.kind == EntityKind::Projectile
            && tick.saturating_sub(entity.spawn_tick) > self.projectile_lifetime_ticks
        {
            return true;
        }
        Self::collides(entity, previous)
    }
}
