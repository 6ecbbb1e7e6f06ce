//! Double-buffered world state
//!
//! The published snapshot is immutable and shared behind an `Arc`. Each tick
//! the job outputs are merged into a brand new snapshot, so the one clients
//! received for tick N never changes after the fact.

use log::{debug, warn};
use shared::{EntityKind, EntityState, SessionId, TickSnapshot};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::error::JobFault;
use crate::scheduler::JobResult;
use crate::simulation::{EntitySpawnPolicy, SpawnRequest};

/// Owner of the published snapshot and of the id counters for spawned entities.
pub struct ReplicationState {
    current: Arc<TickSnapshot>,
    next_ids: BTreeMap<EntityKind, u32>,
}

/// What a merge produced besides the snapshot itself.
#[derive(Debug, Default)]
pub struct MergeReport {
    pub faults: Vec<JobFault>,
    pub spawned: usize,
    pub despawned: usize,
}

impl ReplicationState {
    /// Starts from the empty snapshot of tick 0
    ///
    /// Spawned entity ids start at 1 for each kind and are never reused.
    pub fn new() -> Self {
        Self {
            current: Arc::new(TickSnapshot::empty()),
            next_ids: BTreeMap::new(),
        }
    }

    /// The last published snapshot.
    pub fn current(&self) -> &Arc<TickSnapshot> {
        &self.current
    }

    /// Tick number the next `merge` will publish.
    pub fn next_tick(&self) -> u32 {
        self.current.tick() + 1
    }

    fn allocate_id(&mut self, kind: EntityKind) -> u32 {
        let next = self.next_ids.entry(kind).or_insert(1);
        let id = *next;
        *next += 1;
        id
    }

    /// Builds and publishes the snapshot for the next tick
    ///
    /// A faulted job leaves its entity at the previous snapshot's state.
    /// Players owned by a session in `departed` are dropped even if their
    /// job finished. Non-player entities pass through the spawn policy's
    /// despawn rule, then the policy's spawns and the projectiles fired this
    /// tick are appended with freshly allocated ids.
    pub fn merge(
        &mut self,
        results: Vec<JobResult>,
        departed: &HashSet<SessionId>,
        policy: &mut dyn EntitySpawnPolicy,
    ) -> (Arc<TickSnapshot>, MergeReport) {
        let previous = Arc::clone(&self.current);
        let tick = previous.tick() + 1;
        let mut report = MergeReport::default();
        let mut entities = Vec::with_capacity(results.len());
        let mut requests: Vec<SpawnRequest> = Vec::new();

        for result in results {
            let entity = match result.outcome {
                Ok(output) => {
                    requests.extend(output.spawn);
                    output.entity
                }
                Err(fault) => {
                    warn!("{}; keeping last good state", fault);
                    report.faults.push(fault);
                    match previous.get(result.key) {
                        Some(last_good) => last_good.clone(),
                        // Never published, nothing to fall back to
                        None => continue,
                    }
                }
            };

            if entity.kind == EntityKind::Player {
                if entity.owner.map_or(false, |owner| departed.contains(&owner)) {
                    debug!("Dropping player {} of departed session", entity.id);
                    continue;
                }
            } else if policy.should_despawn(&entity, tick, &previous) {
                report.despawned += 1;
                continue;
            }
            entities.push(entity);
        }

        requests.extend(policy.spawns(tick, &previous));
        for request in requests {
            let id = self.allocate_id(request.kind);
            let mut entity = EntityState::new(request.kind, id, request.position, request.velocity, tick);
            entity.owner = request.owner;
            entities.push(entity);
            report.spawned += 1;
        }

        let snapshot = Arc::new(TickSnapshot::new(tick, entities));
        self.current = Arc::clone(&snapshot);
        (snapshot, report)
    }
}

impl Default for ReplicationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::{Job, NoSpawns, PlayerIntent, WaveSpawnPolicy};
    use shared::{EntityKey, Vec2};

    fn player(id: u32, x: f32) -> EntityState {
        EntityState::new(EntityKind::Player, id, Vec2::new(x, 100.0), Vec2::ZERO, 0)
            .with_owner(SessionId(id))
    }

    fn run(jobs: &[Job], previous: &TickSnapshot, tick: u32) -> Vec<JobResult> {
        jobs.iter()
            .map(|job| JobResult {
                key: job.key(),
                outcome: job.run(previous, tick, 1.0 / 60.0),
            })
            .collect()
    }

    fn still(entity: EntityState) -> Job {
        Job::player(
            entity,
            PlayerIntent {
                direction: Vec2::ZERO,
                action: None,
            },
        )
    }

    #[test]
    fn test_merge_advances_tick() {
        let mut state = ReplicationState::new();
        assert_eq!(state.current().tick(), 0);
        assert_eq!(state.next_tick(), 1);

        let results = run(&[still(player(1, 10.0))], &TickSnapshot::empty(), 1);
        let (snapshot, report) = state.merge(results, &HashSet::new(), &mut NoSpawns);

        assert_eq!(snapshot.tick(), 1);
        assert_eq!(snapshot.len(), 1);
        assert!(report.faults.is_empty());
        assert!(Arc::ptr_eq(&snapshot, state.current()));
    }

    #[test]
    fn test_published_snapshot_never_mutated() {
        let mut state = ReplicationState::new();
        let results = run(&[still(player(1, 10.0))], &TickSnapshot::empty(), 1);
        let (first, _) = state.merge(results, &HashSet::new(), &mut NoSpawns);
        let copy = (*first).clone();

        let moving = Job::player(
            first.entities()[0].clone(),
            PlayerIntent {
                direction: Vec2::new(1.0, 0.0),
                action: None,
            },
        );
        let results = run(&[moving], &first, 2);
        let (second, _) = state.merge(results, &HashSet::new(), &mut NoSpawns);

        assert_eq!(*first, copy);
        assert_ne!(first.entities()[0].position, second.entities()[0].position);
    }

    #[test]
    fn test_faulted_entity_frozen() {
        let mut state = ReplicationState::new();
        let results = run(&[still(player(1, 50.0))], &TickSnapshot::empty(), 1);
        let (first, _) = state.merge(results, &HashSet::new(), &mut NoSpawns);

        let broken = Job::player(
            first.entities()[0].clone(),
            PlayerIntent {
                direction: Vec2::new(f32::NAN, 0.0),
                action: None,
            },
        );
        let results = run(&[broken], &first, 2);
        let (second, report) = state.merge(results, &HashSet::new(), &mut NoSpawns);

        assert_eq!(report.faults.len(), 1);
        let key = EntityKey::new(EntityKind::Player, 1);
        assert_eq!(second.get(key), first.get(key));
        assert_eq!(second.tick(), 2);
    }

    #[test]
    fn test_departed_players_dropped() {
        let mut state = ReplicationState::new();
        let results = run(
            &[still(player(1, 10.0)), still(player(2, 20.0))],
            &TickSnapshot::empty(),
            1,
        );
        let departed: HashSet<SessionId> = [SessionId(1)].into_iter().collect();
        let (snapshot, _) = state.merge(results, &departed, &mut NoSpawns);

        assert!(!snapshot.contains(EntityKey::new(EntityKind::Player, 1)));
        assert!(snapshot.contains(EntityKey::new(EntityKind::Player, 2)));
    }

    #[test]
    fn test_fired_projectile_gets_id() {
        let mut state = ReplicationState::new();
        let gunner = Job::player(
            player(1, 10.0),
            PlayerIntent {
                direction: Vec2::ZERO,
                action: Some(shared::ActionKind::Fire),
            },
        );
        let results = run(&[gunner.clone(), gunner], &TickSnapshot::empty(), 1);
        let (snapshot, report) = state.merge(results, &HashSet::new(), &mut NoSpawns);

        assert_eq!(report.spawned, 2);
        let projectiles: Vec<&EntityState> = snapshot.of_kind(EntityKind::Projectile).collect();
        assert_eq!(projectiles.len(), 2);
        assert_eq!(projectiles[0].id, 1);
        assert_eq!(projectiles[1].id, 2);
        assert_eq!(projectiles[0].owner, Some(SessionId(1)));
        assert_eq!(projectiles[0].spawn_tick, 1);
    }

    #[test]
    fn test_policy_despawns_out_of_bounds() {
        let mut state = ReplicationState::new();
        let escaping = EntityState::new(
            EntityKind::Enemy,
            9,
            Vec2::new(-100.0, 100.0),
            Vec2::new(-120.0, 0.0),
            0,
        );
        let results = run(&[Job::npc(escaping)], &TickSnapshot::empty(), 1);
        let mut policy = WaveSpawnPolicy::new(3);
        let (snapshot, report) = state.merge(results, &HashSet::new(), &mut policy);

        assert_eq!(report.despawned, 1);
        assert!(snapshot.is_empty());
    }
}
