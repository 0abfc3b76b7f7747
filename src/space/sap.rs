use crate::config::SapConfig;
use crate::geom::GeomId;
use crate::math::Aabb;

use super::{BroadPhase, MemberList};

/// Sweep-and-prune over one sorted axis.
///
/// Every pass sorts the members by their minimum along the first axis of
/// the configured order and sweeps forward while intervals still overlap;
/// the other two axes are checked per candidate. Members whose maximum on
/// the sort axis is infinite are kept out of the sweep and tested against
/// everything.
#[derive(Debug)]
pub struct SapSpace {
    config: SapConfig,
    members: MemberList,
    keys: Vec<u32>,
    order: Vec<u32>,
    scratch: Vec<u32>,
}

impl SapSpace {
    pub fn new(config: SapConfig) -> Self {
        Self {
            config,
            members: MemberList::default(),
            keys: Vec::new(),
            order: Vec::new(),
            scratch: Vec::new(),
        }
    }

    pub fn config(&self) -> SapConfig {
        self.config
    }
}

/// Map a float to a `u32` that sorts the same way.
#[inline]
fn sortable_bits(value: f32) -> u32 {
    let bits = value.to_bits();
    if bits & 0x8000_0000 != 0 {
        !bits
    } else {
        bits | 0x8000_0000
    }
}

/// Stable LSB radix sort of `order` by `keys[order[i]]`, one byte per pass.
fn radix_sort(keys: &[u32], order: &mut Vec<u32>, scratch: &mut Vec<u32>) {
    scratch.clear();
    scratch.resize(order.len(), 0);
    for shift in [0u32, 8, 16, 24] {
        let mut counts = [0usize; 256];
        for &i in order.iter() {
            counts[((keys[i as usize] >> shift) & 0xff) as usize] += 1;
        }
        if counts.iter().any(|&c| c == order.len()) {
            // every key shares this byte
            continue;
        }
        let mut offsets = [0usize; 256];
        let mut total = 0;
        for (offset, count) in offsets.iter_mut().zip(counts) {
            *offset = total;
            total += count;
        }
        for &i in order.iter() {
            let byte = ((keys[i as usize] >> shift) & 0xff) as usize;
            scratch[offsets[byte]] = i;
            offsets[byte] += 1;
        }
        std::mem::swap(order, scratch);
    }
}

impl BroadPhase for SapSpace {
    fn name(&self) -> &'static str {
        "sap"
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
        let [axis, second, third] = self.config.axis_order.axes();
        let entries = &self.members.entries;

        let mut unbounded: Vec<usize> = Vec::new();
        self.order.clear();
        self.keys.clear();
        self.keys.resize(entries.len(), 0);
        for (i, (_, aabb)) in entries.iter().enumerate() {
            if aabb.max[axis] == f32::INFINITY {
                unbounded.push(i);
            } else {
                self.keys[i] = sortable_bits(aabb.min[axis]);
                self.order.push(i as u32);
            }
        }
        radix_sort(&self.keys, &mut self.order, &mut self.scratch);

        for (k, &i) in self.order.iter().enumerate() {
            let (a, box_a) = &entries[i as usize];
            for &j in &self.order[k + 1..] {
                let (b, box_b) = &entries[j as usize];
                if box_b.min[axis] > box_a.max[axis] {
                    break;
                }
                if box_a.min[second] <= box_b.max[second]
                    && box_a.max[second] >= box_b.min[second]
                    && box_a.min[third] <= box_b.max[third]
                    && box_a.max[third] >= box_b.min[third]
                {
                    out.push((*a, *b));
                }
            }
        }

        for (k, &i) in unbounded.iter().enumerate() {
            let (a, box_a) = &entries[i];
            let others = unbounded[k + 1..]
                .iter()
                .copied()
                .chain(self.order.iter().map(|&j| j as usize));
            for j in others {
                let (b, box_b) = &entries[j];
                if box_a.overlaps(box_b) {
                    out.push((*a, *b));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use slotmap::SlotMap;

    use super::*;
    use crate::config::AxisOrder;

    #[test]
    fn test_sortable_bits_preserve_order() {
        let values = [
            f32::NEG_INFINITY,
            -1e6,
            -2.5,
            -0.0,
            0.0,
            1e-9,
            3.0,
            1e6,
        ];
        for pair in values.windows(2) {
            assert!(
                sortable_bits(pair[0]) <= sortable_bits(pair[1]),
                "{} should sort before {}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_radix_sort_is_stable() {
        let keys: Vec<u32> = [5.0f32, -1.0, 5.0, 300.0, -1.0, 0.5]
            .iter()
            .map(|v| sortable_bits(*v))
            .collect();
        let mut order: Vec<u32> = (0..keys.len() as u32).collect();
        let mut scratch = Vec::new();
        radix_sort(&keys, &mut order, &mut scratch);
        assert_eq!(order, vec![1, 4, 5, 0, 2, 3]);
    }

    #[test]
    fn test_sap_equal_minimums() {
        let mut keys: SlotMap<GeomId, ()> = SlotMap::with_key();
        let ids: Vec<GeomId> = (0..3).map(|_| keys.insert(())).collect();
        let mut space = SapSpace::new(SapConfig {
            axis_order: AxisOrder::Xyz,
        });
        for (k, id) in ids.iter().enumerate() {
            let y = k as f32 * 0.5;
            space.insert(
                *id,
                Aabb::new(Vec3::new(1.0, y, 0.0), Vec3::new(2.0, y + 1.0, 1.0)),
            );
        }
        let mut pairs = Vec::new();
        space.collect_pairs(&mut pairs);
        assert_eq!(pairs, vec![(ids[0], ids[1]), (ids[0], ids[2]), (ids[1], ids[2])]);
    }
}
