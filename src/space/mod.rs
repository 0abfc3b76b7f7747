//! Broadphase strategies.
//!
//! A space owns one [`BroadPhase`] index. The index stores each member's
//! last known AABB and reports the pairs of members whose boxes overlap. It
//! never looks at exact geometry; the [`World`](crate::World) filters the
//! reported pairs and hands them to the caller.

mod hash;
mod quadtree;
mod sap;
mod simple;

pub use hash::HashSpace;
pub use quadtree::QuadTreeSpace;
pub use sap::SapSpace;
pub use simple::SimpleSpace;

use std::fmt::Debug;

use slotmap::SecondaryMap;

use crate::config::SpaceKind;
use crate::geom::GeomId;
use crate::math::Aabb;

/// Spatial index over the members of one space.
pub trait BroadPhase: Debug + Send {
    fn name(&self) -> &'static str;

    /// Add a member. `id` must not already be present.
    fn insert(&mut self, id: GeomId, aabb: Aabb);

    /// Remove a member. Unknown ids are ignored.
    fn remove(&mut self, id: GeomId);

    /// Replace the stored bounds of a member after it moved.
    fn refile(&mut self, id: GeomId, aabb: Aabb);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Members and their stored bounds, in the strategy's iteration order.
    fn entries(&self) -> Vec<(GeomId, Aabb)>;

    /// Append every pair of members whose stored boxes overlap. Each pair is
    /// reported once, in a deterministic order for a given insertion history.
    fn collect_pairs(&mut self, out: &mut Vec<(GeomId, GeomId)>);

    /// Append every member whose stored box overlaps `aabb`.
    fn collect_overlaps(&self, aabb: &Aabb, out: &mut Vec<GeomId>) {
        out.extend(
            self.entries()
                .into_iter()
                .filter(|(_, b)| b.overlaps(aabb))
                .map(|(id, _)| id),
        );
    }
}

/// Build the index for a space of the given kind.
pub fn build(kind: SpaceKind) -> Box<dyn BroadPhase> {
    match kind {
        SpaceKind::Simple => Box::new(SimpleSpace::new()),
        SpaceKind::Hash(config) => Box::new(HashSpace::new(config)),
        SpaceKind::QuadTree(config) => Box::new(QuadTreeSpace::new(config)),
        SpaceKind::Sap(config) => Box::new(SapSpace::new(config)),
    }
}

/// Dense member list with O(1) lookup, shared by the flat strategies.
#[derive(Debug, Default)]
pub(crate) struct MemberList {
    pub entries: Vec<(GeomId, Aabb)>,
    slots: SecondaryMap<GeomId, usize>,
}

impl MemberList {
    pub fn insert(&mut self, id: GeomId, aabb: Aabb) {
        debug_assert!(!self.slots.contains_key(id), "geom is already a member");
        self.slots.insert(id, self.entries.len());
        self.entries.push((id, aabb));
    }

    pub fn remove(&mut self, id: GeomId) {
        let Some(slot) = self.slots.remove(id) else {
            return;
        };
        self.entries.swap_remove(slot);
        if let Some(&(moved, _)) = self.entries.get(slot) {
            self.slots[moved] = slot;
        }
    }

    pub fn refile(&mut self, id: GeomId, aabb: Aabb) {
        if let Some(&slot) = self.slots.get(id) {
            self.entries[slot].1 = aabb;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use glam::Vec3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use slotmap::SlotMap;

    use super::*;
    use crate::config::{AxisOrder, HashSpaceConfig, QuadTreeConfig, SapConfig};

    fn random_boxes(
        keys: &mut SlotMap<GeomId, ()>,
        seed: u64,
        count: usize,
    ) -> Vec<(GeomId, Aabb)> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let center = Vec3::new(
                    rng.gen_range(-20.0..20.0),
                    rng.gen_range(-20.0..20.0),
                    rng.gen_range(-20.0..20.0),
                );
                let half = Vec3::new(
                    rng.gen_range(0.05..3.0),
                    rng.gen_range(0.05..3.0),
                    rng.gen_range(0.05..3.0),
                );
                (keys.insert(()), Aabb::from_center_half_extents(center, half))
            })
            .collect()
    }

    fn pair_set(index: &mut dyn BroadPhase) -> BTreeSet<(GeomId, GeomId)> {
        let mut pairs = Vec::new();
        index.collect_pairs(&mut pairs);
        let count = pairs.len();
        let set: BTreeSet<_> = pairs
            .into_iter()
            .map(|(a, b)| if a < b { (a, b) } else { (b, a) })
            .collect();
        assert_eq!(set.len(), count, "{} reported a pair twice", index.name());
        set
    }

    fn brute_force(boxes: &[(GeomId, Aabb)]) -> BTreeSet<(GeomId, GeomId)> {
        let mut set = BTreeSet::new();
        for (i, (a, box_a)) in boxes.iter().enumerate() {
            for (b, box_b) in &boxes[i + 1..] {
                if box_a.overlaps(box_b) {
                    set.insert(if a < b { (*a, *b) } else { (*b, *a) });
                }
            }
        }
        set
    }

    fn all_kinds() -> Vec<SpaceKind> {
        vec![
            SpaceKind::Simple,
            SpaceKind::Hash(HashSpaceConfig::default()),
            SpaceKind::Hash(HashSpaceConfig {
                min_level: 0,
                max_level: 1,
            }),
            SpaceKind::QuadTree(QuadTreeConfig {
                extents: Vec3::splat(32.0),
                ..Default::default()
            }),
            SpaceKind::Sap(SapConfig::default()),
            SpaceKind::Sap(SapConfig {
                axis_order: AxisOrder::Zyx,
            }),
        ]
    }

    #[test]
    fn test_strategies_report_same_pairs() {
        let mut keys = SlotMap::with_key();
        let boxes = random_boxes(&mut keys, 7, 300);
        let expected = brute_force(&boxes);
        assert!(!expected.is_empty(), "random scene should have overlaps");

        for kind in all_kinds() {
            let mut index = build(kind);
            for (id, aabb) in &boxes {
                index.insert(*id, *aabb);
            }
            assert_eq!(index.len(), boxes.len());
            assert_eq!(pair_set(index.as_mut()), expected, "{kind:?}");
        }
    }

    #[test]
    fn test_strategies_track_moves_and_removals() {
        let mut keys = SlotMap::with_key();
        let boxes = random_boxes(&mut keys, 11, 120);
        let moved = random_boxes(&mut keys, 12, 120);

        for kind in all_kinds() {
            let mut index = build(kind);
            for (id, aabb) in &boxes {
                index.insert(*id, *aabb);
            }
            let mut current: Vec<(GeomId, Aabb)> = Vec::new();
            for (i, (id, _)) in boxes.iter().enumerate() {
                if i % 3 == 0 {
                    index.remove(*id);
                } else {
                    index.refile(*id, moved[i].1);
                    current.push((*id, moved[i].1));
                }
            }
            assert_eq!(index.len(), current.len(), "{kind:?}");
            assert_eq!(pair_set(index.as_mut()), brute_force(&current), "{kind:?}");
        }
    }

    #[test]
    fn test_strategies_handle_infinite_boxes() {
        let mut keys = SlotMap::with_key();
        let mut boxes = random_boxes(&mut keys, 3, 40);
        let ground = Aabb::new(
            Vec3::NEG_INFINITY,
            Vec3::new(f32::INFINITY, 0.0, f32::INFINITY),
        );
        boxes.push((keys.insert(()), ground));
        boxes.push((keys.insert(()), Aabb::infinite()));
        let expected = brute_force(&boxes);

        for kind in all_kinds() {
            let mut index = build(kind);
            for (id, aabb) in &boxes {
                index.insert(*id, *aabb);
            }
            assert_eq!(pair_set(index.as_mut()), expected, "{kind:?}");
        }
    }

    #[test]
    fn test_collect_overlaps_matches_scan() {
        let mut keys = SlotMap::with_key();
        let boxes = random_boxes(&mut keys, 5, 80);
        let probe = Aabb::from_center_half_extents(Vec3::new(1.0, -2.0, 3.0), Vec3::splat(6.0));
        let mut expected: Vec<GeomId> = boxes
            .iter()
            .filter(|(_, b)| b.overlaps(&probe))
            .map(|(id, _)| *id)
            .collect();
        expected.sort();

        for kind in all_kinds() {
            let mut index = build(kind);
            for (id, aabb) in &boxes {
                index.insert(*id, *aabb);
            }
            let mut found = Vec::new();
            index.collect_overlaps(&probe, &mut found);
            found.sort();
            assert_eq!(found, expected, "{kind:?}");
        }
    }
}
