use crate::geom::GeomId;
use crate::math::Aabb;

use super::{BroadPhase, MemberList};

/// Brute-force index: every member is tested against every other.
///
/// Quadratic, but exact and cheap to maintain. Good for a handful of
/// members and as the reference the other strategies are checked against.
#[derive(Debug, Default)]
pub struct SimpleSpace {
    members: MemberList,
}

impl SimpleSpace {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BroadPhase for SimpleSpace {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn insert(&mut self, id: GeomId, aabb: Aabb) {
        self.members.insert(id, aabb);
    }

    fn remove(&mut self, id: GeomId) {
        self.members.remove(id);
    }

    fn refile(&mut self, id: GeomId, aabb: Aabb) {
        self.members.refile(id, aabb);
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    fn entries(&self) -> Vec<(GeomId, Aabb)> {
        self.members.entries.clone()
    }

    fn collect_pairs(&mut self, out: &mut Vec<(GeomId, GeomId)>) {
        let entries = &self.members.entries;
        for (i, (a, box_a)) in entries.iter().enumerate() {
            for (b, box_b) in &entries[i + 1..] {
                if box_a.overlaps(box_b) {
                    out.push((*a, *b));
                }
            }
        }
    }

    fn collect_overlaps(&self, aabb: &Aabb, out: &mut Vec<GeomId>) {
        out.extend(
            self.members
                .entries
                .iter()
                .filter(|(_, b)| b.overlaps(aabb))
                .map(|(id, _)| *id),
        );
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use slotmap::SlotMap;

    use super::*;

    #[test]
    fn test_simple_pairs_follow_insertion_order() {
        let mut keys: SlotMap<GeomId, ()> = SlotMap::with_key();
        let a = keys.insert(());
        let b = keys.insert(());
        let c = keys.insert(());
        let mut space = SimpleSpace::new();
        space.insert(a, Aabb::from_center_half_extents(Vec3::ZERO, Vec3::ONE));
        space.insert(b, Aabb::from_center_half_extents(Vec3::X * 1.5, Vec3::ONE));
        space.insert(c, Aabb::from_center_half_extents(Vec3::X * 10.0, Vec3::ONE));

        let mut pairs = Vec::new();
        space.collect_pairs(&mut pairs);
        assert_eq!(pairs, vec![(a, b)]);

        space.refile(c, Aabb::from_center_half_extents(Vec3::X * 3.0, Vec3::ONE));
        pairs.clear();
        space.collect_pairs(&mut pairs);
        assert_eq!(pairs, vec![(a, b), (b, c)]);

        space.remove(a);
        assert_eq!(space.len(), 2);
        pairs.clear();
        space.collect_pairs(&mut pairs);
        assert_eq!(pairs.len(), 1, "only b/c should remain");
    }
}
