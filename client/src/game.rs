use log::debug;
use shared::{EntityKey, EntityKind, Snapshot, SnapshotEntity};
use std::collections::BTreeMap;

/// Client-side copy of the last applied server snapshot
///
/// The server is authoritative, so a snapshot replaces the whole view rather
/// than being merged into it. Datagrams can arrive late or twice; anything
/// not newer than the last applied tick is discarded, which makes the final
/// view independent of arrival order.
#[derive(Debug, Default)]
pub struct ClientWorldView {
    last_tick: Option<u32>,
    entities: BTreeMap<EntityKey, SnapshotEntity>,
    discarded: u64,
}

impl ClientWorldView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `snapshot` if it is newer than the current view.
    ///
    /// Returns false for stale or duplicate snapshots, leaving the view as is.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> bool {
        if let Some(last) = self.last_tick {
            if snapshot.tick <= last {
                debug!("Discarding snapshot {} (have {})", snapshot.tick, last);
                self.discarded += 1;
                return false;
            }
        }

        self.entities = snapshot
            .entities
            .into_iter()
            .map(|entity| (entity.key(), entity))
            .collect();
        self.last_tick = Some(snapshot.tick);
        true
    }

    /// Tick of the last applied snapshot, `None` before the first one.
    pub fn last_tick(&self) -> Option<u32> {
        self.last_tick
    }

    pub fn get(&self, key: EntityKey) -> Option<&SnapshotEntity> {
        self.entities.get(&key)
    }

    pub fn player(&self, player_id: u32) -> Option<&SnapshotEntity> {
        self.get(EntityKey::new(EntityKind::Player, player_id))
    }

    /// Entities in (kind, id) order.
    pub fn entities(&self) -> impl Iterator<Item = &SnapshotEntity> {
        self.entities.values()
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = &SnapshotEntity> {
        self.entities.values().filter(move |e| e.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Number of stale or duplicate snapshots dropped so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    pub fn clear(&mut self) {
        self.entities.clear();
        self.last_tick = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Vec2;

    fn entity(kind: EntityKind, id: u32, x: f32) -> SnapshotEntity {
        SnapshotEntity {
            kind,
            id,
            position: Vec2::new(x, 100.0),
            velocity: Vec2::ZERO,
        }
    }

    fn snapshot(tick: u32, x: f32) -> Snapshot {
        Snapshot {
            tick,
            entities: vec![
                entity(EntityKind::Player, 1, x),
                entity(EntityKind::Enemy, 1, 1000.0 - x),
            ],
        }
    }

    #[test]
    fn test_first_snapshot_applied() {
        let mut view = ClientWorldView::new();
        assert_eq!(view.last_tick(), None);

        assert!(view.apply_snapshot(snapshot(1, 10.0)));
        assert_eq!(view.last_tick(), Some(1));
        assert_eq!(view.len(), 2);
        assert_eq!(view.player(1).unwrap().position.x, 10.0);
    }

    #[test]
    fn test_stale_and_duplicate_discarded() {
        let mut view = ClientWorldView::new();
        view.apply_snapshot(snapshot(5, 50.0));

        assert!(!view.apply_snapshot(snapshot(5, 99.0)));
        assert!(!view.apply_snapshot(snapshot(3, 30.0)));

        assert_eq!(view.last_tick(), Some(5));
        assert_eq!(view.player(1).unwrap().position.x, 50.0);
        assert_eq!(view.discarded(), 2);
    }

    #[test]
    fn test_arrival_order_does_not_matter() {
        let in_order: Vec<Snapshot> = (1..=6).map(|t| snapshot(t, t as f32 * 10.0)).collect();
        let shuffled: Vec<Snapshot> = [3, 1, 6, 2, 5, 4]
            .iter()
            .map(|&t| snapshot(t, t as f32 * 10.0))
            .collect();

        let mut ordered_view = ClientWorldView::new();
        for s in in_order {
            ordered_view.apply_snapshot(s);
        }
        let mut shuffled_view = ClientWorldView::new();
        for s in shuffled {
            shuffled_view.apply_snapshot(s);
        }

        assert_eq!(ordered_view.last_tick(), shuffled_view.last_tick());
        let a: Vec<_> = ordered_view.entities().copied().collect();
        let b: Vec<_> = shuffled_view.entities().copied().collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_snapshot_replaces_view() {
        let mut view = ClientWorldView::new();
        view.apply_snapshot(snapshot(1, 10.0));
        view.apply_snapshot(Snapshot {
            tick: 2,
            entities: vec![entity(EntityKind::Projectile, 4, 300.0)],
        });

        assert_eq!(view.len(), 1);
        assert!(view.player(1).is_none());
        assert_eq!(view.of_kind(EntityKind::Projectile).count(), 1);
    }

    #[test]
    fn test_clear_accepts_any_tick_again() {
        let mut view = ClientWorldView::new();
        view.apply_snapshot(snapshot(9, 10.0));
        view.clear();

        assert!(view.is_empty());
        assert!(view.apply_snapshot(snapshot(1, 10.0)));
    }
}
