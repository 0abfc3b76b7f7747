use std::collections::HashMap;

use crate::config::HashSpaceConfig;
use crate::geom::GeomId;
use crate::math::Aabb;

use super::{BroadPhase, MemberList};

/// Multi-resolution spatial hash.
///
/// Each box is filed at the level whose cell size matches its largest
/// extent, in every cell of that level it covers. A box then only needs to
/// look at its own level and the coarser ones: boxes from finer levels find
/// it when they walk up. Boxes too large for `max_level`, or unbounded,
/// are tested against everything.
#[derive(Debug)]
pub struct HashSpace {
    config: HashSpaceConfig,
    members: MemberList,
}

/// Cell key: level, then integer cell coordinates at that level.
type CellKey = (i32, i32, i32, i32);

#[derive(Debug, Clone, Copy)]
struct Filed {
    level: i32,
    /// Inclusive cell ranges per axis at `level`.
    lo: [i32; 3],
    hi: [i32; 3],
}

impl HashSpace {
    pub fn new(config: HashSpaceConfig) -> Self {
        debug_assert!(
            config.min_level <= config.max_level,
            "hash space min_level above max_level"
        );
        Self {
            config,
            members: MemberList::default(),
        }
    }

    pub fn config(&self) -> HashSpaceConfig {
        self.config
    }

    /// Level and cell range of `aabb`, or `None` for the oversized list.
    fn file(&self, aabb: &Aabb) -> Option<Filed> {
        if !aabb.is_finite() {
            return None;
        }
        let level = find_level(aabb.size().max_element()).max(self.config.min_level);
        if level > self.config.max_level {
            return None;
        }
        let cell = 2f32.powi(level);
        let mut lo = [0; 3];
        let mut hi = [0; 3];
        for axis in 0..3 {
            lo[axis] = (aabb.min[axis] / cell).floor() as i32;
            hi[axis] = (aabb.max[axis] / cell).floor() as i32;
        }
        Some(Filed { level, lo, hi })
    }
}

/// Level `k` with `2^(k-1) <= size < 2^k`. Sizes of zero or below map to the
/// finest possible level.
fn find_level(size: f32) -> i32 {
    if size <= 0.0 {
        return i32::MIN;
    }
    let exponent = ((size.to_bits() >> 23) & 0xff) as i32;
    if exponent == 0 {
        // subnormal
        return i32::MIN;
    }
    exponent - 126
}

/// Upper-triangular bit matrix of already tested pairs.
struct TestedPairs {
    bits: Vec<u64>,
    n: usize,
}

impl TestedPairs {
    fn new(n: usize) -> Self {
        Self {
            bits: vec![0; (n * n).div_ceil(64)],
            n,
        }
    }

    /// Mark `(i, j)` as tested. Returns whether it was already marked.
    fn test_and_set(&mut self, i: usize, j: usize) -> bool {
        let (lo, hi) = if i <= j { (i, j) } else { (j, i) };
        let bit = lo * self.n + hi;
        let word = &mut self.bits[bit / 64];
        let mask = 1u64 << (bit % 64);
        let seen = *word & mask != 0;
        *word |= mask;
        seen
    }
}

impl BroadPhase for HashSpace {
    fn name(&self) -> &'static str {
        "hash"
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
        let mut normal: Vec<(usize, Filed)> = Vec::with_capacity(entries.len());
        let mut oversized: Vec<usize> = Vec::new();
        for (i, (_, aabb)) in entries.iter().enumerate() {
            match self.file(aabb) {
                Some(filed) => normal.push((i, filed)),
                None => oversized.push(i),
            }
        }

        let mut table: HashMap<CellKey, Vec<usize>> = HashMap::new();
        for &(i, filed) in &normal {
            for x in filed.lo[0]..=filed.hi[0] {
                for y in filed.lo[1]..=filed.hi[1] {
                    for z in filed.lo[2]..=filed.hi[2] {
                        table.entry((filed.level, x, y, z)).or_default().push(i);
                    }
                }
            }
        }

        let mut tested = TestedPairs::new(entries.len());
        let report = |i: usize, j: usize, out: &mut Vec<(GeomId, GeomId)>| {
            let (a, box_a) = entries[i];
            let (b, box_b) = entries[j];
            if box_a.overlaps(&box_b) {
                out.push((a, b));
            }
        };

        for &(i, filed) in &normal {
            let mut lo = filed.lo;
            let mut hi = filed.hi;
            for level in filed.level..=self.config.max_level {
                for x in lo[0]..=hi[0] {
                    for y in lo[1]..=hi[1] {
                        for z in lo[2]..=hi[2] {
                            let Some(bucket) = table.get(&(level, x, y, z)) else {
                                continue;
                            };
                            for &j in bucket {
                                if j != i && !tested.test_and_set(i, j) {
                                    report(i, j, out);
                                }
                            }
                        }
                    }
                }
                // next level up halves every cell coordinate
                for axis in 0..3 {
                    lo[axis] >>= 1;
                    hi[axis] >>= 1;
                }
            }
        }

        for &(i, _) in &normal {
            for &j in &oversized {
                report(i, j, out);
            }
        }
        for (k, &i) in oversized.iter().enumerate() {
            for &j in &oversized[k + 1..] {
                report(i, j, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use slotmap::SlotMap;

    use super::*;

    #[test]
    fn test_find_level_brackets_size() {
        assert_eq!(find_level(1.0), 1);
        assert_eq!(find_level(0.75), 0);
        assert_eq!(find_level(3.0), 2);
        assert_eq!(find_level(0.1), -3);
        assert_eq!(find_level(0.0), i32::MIN);
        for size in [0.01f32, 0.3, 1.7, 12.0, 900.0] {
            let level = find_level(size);
            assert!(
                2f32.powi(level - 1) <= size && size < 2f32.powi(level),
                "size {size} filed at level {level}"
            );
        }
    }

    #[test]
    fn test_tested_pairs_is_symmetric() {
        let mut tested = TestedPairs::new(70);
        assert!(!tested.test_and_set(3, 65));
        assert!(tested.test_and_set(65, 3));
        assert!(!tested.test_and_set(65, 66));
    }

    #[test]
    fn test_hash_finds_pairs_across_levels() {
        let mut keys: SlotMap<GeomId, ()> = SlotMap::with_key();
        let small = keys.insert(());
        let large = keys.insert(());
        let far = keys.insert(());
        let mut space = HashSpace::new(HashSpaceConfig::default());
        space.insert(
            small,
            Aabb::from_center_half_extents(Vec3::new(3.9, 0.0, 0.0), Vec3::splat(0.05)),
        );
        space.insert(
            large,
            Aabb::from_center_half_extents(Vec3::ZERO, Vec3::splat(4.0)),
        );
        space.insert(
            far,
            Aabb::from_center_half_extents(Vec3::splat(100.0), Vec3::splat(0.05)),
        );

        let mut pairs = Vec::new();
        space.collect_pairs(&mut pairs);
        assert_eq!(pairs, vec![(small, large)]);
    }

    #[test]
    fn test_hash_oversized_boxes_meet_everything() {
        let mut keys: SlotMap<GeomId, ()> = SlotMap::with_key();
        let ground = keys.insert(());
        let ball = keys.insert(());
        let mut space = HashSpace::new(HashSpaceConfig {
            min_level: -2,
            max_level: 2,
        });
        space.insert(
            ground,
            Aabb::new(Vec3::new(-50.0, -1.0, -50.0), Vec3::new(50.0, 0.0, 50.0)),
        );
        space.insert(
            ball,
            Aabb::from_center_half_extents(Vec3::new(20.0, 0.2, 0.0), Vec3::splat(0.5)),
        );
        let mut pairs = Vec::new();
        space.collect_pairs(&mut pairs);
        assert_eq!(pairs, vec![(ball, ground)]);
    }
}
