use slotmap::SecondaryMap;

use crate::config::QuadTreeConfig;
use crate::geom::GeomId;
use crate::math::Aabb;

use super::BroadPhase;

const SPLITS: usize = 4;

/// One node of the tree: a rectangle in the split plane.
#[derive(Debug)]
struct Block {
    min: [f32; 2],
    max: [f32; 2],
    parent: Option<usize>,
    /// Index of the first of four contiguous children.
    children: Option<usize>,
    members: Vec<GeomId>,
    /// Members in this block and all blocks below it.
    count: usize,
}

impl Block {
    fn new(center: [f32; 2], extents: [f32; 2], parent: Option<usize>) -> Self {
        Self {
            min: [center[0] - extents[0], center[1] - extents[1]],
            max: [center[0] + extents[0], center[1] + extents[1]],
            parent,
            children: None,
            members: Vec::new(),
            count: 0,
        }
    }

    fn center(&self) -> [f32; 2] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
        ]
    }

    fn extents(&self) -> [f32; 2] {
        [
            (self.max[0] - self.min[0]) * 0.5,
            (self.max[1] - self.min[1]) * 0.5,
        ]
    }

    fn child_range(&self) -> impl DoubleEndedIterator<Item = usize> {
        self.children.into_iter().flat_map(|first| first..first + SPLITS)
    }
}

/// Fixed-depth quadtree over the two axes perpendicular to `up_axis`.
///
/// A member lives in the smallest block that strictly contains its AABB in
/// the split plane, or in the root when no block does. All blocks are
/// allocated up front.
#[derive(Debug)]
pub struct QuadTreeSpace {
    config: QuadTreeConfig,
    axes: (usize, usize),
    blocks: Vec<Block>,
    /// Block and stored bounds of each member.
    slots: SecondaryMap<GeomId, (usize, Aabb)>,
}

impl QuadTreeSpace {
    pub fn new(config: QuadTreeConfig) -> Self {
        let axes = config.plane_axes();
        let center = [config.center[axes.0], config.center[axes.1]];
        let extents = [config.extents[axes.0], config.extents[axes.1]];
        let block_count = (0..=config.depth).map(|level| SPLITS.pow(level)).sum();
        let mut blocks = Vec::with_capacity(block_count);
        blocks.push(Block::new(center, extents, None));
        split(&mut blocks, 0, config.depth);
        Self {
            config,
            axes,
            blocks,
            slots: SecondaryMap::new(),
        }
    }

    pub fn config(&self) -> QuadTreeConfig {
        self.config
    }

    /// Members in depth-first block order, root first.
    pub fn iter(&self) -> Members<'_> {
        Members {
            tree: self,
            stack: Vec::new(),
            current: Some((0, 0)),
        }
    }

    fn inside(&self, block: usize, aabb: &Aabb) -> bool {
        let b = &self.blocks[block];
        let (a0, a1) = self.axes;
        aabb.min[a0] > b.min[0]
            && aabb.max[a0] < b.max[0]
            && aabb.min[a1] > b.min[1]
            && aabb.max[a1] < b.max[1]
    }

    fn misses(&self, block: usize, aabb: &Aabb) -> bool {
        let b = &self.blocks[block];
        let (a0, a1) = self.axes;
        aabb.min[a0] > b.max[0]
            || aabb.max[a0] < b.min[0]
            || aabb.min[a1] > b.max[1]
            || aabb.max[a1] < b.min[1]
    }

    /// Best block for `aabb`, searching up from `from` and then down.
    fn find_block(&self, from: usize, aabb: &Aabb) -> usize {
        let mut block = from;
        while !self.inside(block, aabb) {
            match self.blocks[block].parent {
                Some(parent) => block = parent,
                None => return block,
            }
        }
        'descend: loop {
            for child in self.blocks[block].child_range() {
                if self.inside(child, aabb) {
                    block = child;
                    continue 'descend;
                }
            }
            return block;
        }
    }

    fn attach(&mut self, block: usize, id: GeomId) {
        self.blocks[block].members.push(id);
        let mut next = Some(block);
        while let Some(b) = next {
            self.blocks[b].count += 1;
            next = self.blocks[b].parent;
        }
    }

    fn detach(&mut self, block: usize, id: GeomId) {
        let members = &mut self.blocks[block].members;
        if let Some(pos) = members.iter().position(|m| *m == id) {
            members.remove(pos);
        }
        let mut next = Some(block);
        while let Some(b) = next {
            self.blocks[b].count -= 1;
            next = self.blocks[b].parent;
        }
    }

    fn stored(&self, id: GeomId) -> Aabb {
        self.slots.get(id).map_or(Aabb::ZERO, |(_, aabb)| *aabb)
    }

    /// Pairs between members of `block` and below it.
    fn collide_block(&self, block: usize, out: &mut Vec<(GeomId, GeomId)>) {
        let b = &self.blocks[block];
        for (k, &id) in b.members.iter().enumerate() {
            self.collide_member(id, &self.stored(id), block, k + 1, out);
        }
        for child in b.child_range() {
            if self.blocks[child].count > 1 {
                self.collide_block(child, out);
            }
        }
    }

    /// Pairs between `id` and members of `block` from `start` on, then every
    /// block below whose rectangle `aabb` touches.
    fn collide_member(
        &self,
        id: GeomId,
        aabb: &Aabb,
        block: usize,
        start: usize,
        out: &mut Vec<(GeomId, GeomId)>,
    ) {
        let b = &self.blocks[block];
        for &other in &b.members[start..] {
            if aabb.overlaps(&self.stored(other)) {
                out.push((id, other));
            }
        }
        for child in b.child_range() {
            if self.blocks[child].count == 0 || self.misses(child, aabb) {
                continue;
            }
            self.collide_member(id, aabb, child, 0, out);
        }
    }

    fn overlaps_below(&self, block: usize, aabb: &Aabb, out: &mut Vec<GeomId>) {
        let b = &self.blocks[block];
        out.extend(
            b.members
                .iter()
                .copied()
                .filter(|id| self.stored(*id).overlaps(aabb)),
        );
        for child in b.child_range() {
            if self.blocks[child].count > 0 && !self.misses(child, aabb) {
                self.overlaps_below(child, aabb, out);
            }
        }
    }
}

/// Allocate four children under `parent` until `depth` levels exist.
/// Siblings are contiguous; child `i * 2 + j` is the `i`-th along the first
/// axis and `j`-th along the second.
fn split(blocks: &mut Vec<Block>, parent: usize, depth: u32) {
    if depth == 0 {
        return;
    }
    let center = blocks[parent].center();
    let extents = blocks[parent].extents();
    let half = [extents[0] * 0.5, extents[1] * 0.5];
    let first = blocks.len();
    for i in 0..2 {
        for j in 0..2 {
            let c = [
                center[0] - extents[0] + half[0] + i as f32 * extents[0],
                center[1] - extents[1] + half[1] + j as f32 * extents[1],
            ];
            blocks.push(Block::new(c, half, Some(parent)));
        }
    }
    blocks[parent].children = Some(first);
    for child in first..first + SPLITS {
        split(blocks, child, depth - 1);
    }
}

/// Depth-first iterator over quadtree members.
pub struct Members<'a> {
    tree: &'a QuadTreeSpace,
    stack: Vec<usize>,
    current: Option<(usize, usize)>,
}

impl Iterator for Members<'_> {
    type Item = GeomId;

    fn next(&mut self) -> Option<GeomId> {
        loop {
            if let Some((block, pos)) = self.current {
                let b = &self.tree.blocks[block];
                if let Some(&id) = b.members.get(pos) {
                    self.current = Some((block, pos + 1));
                    return Some(id);
                }
                for child in b.child_range().rev() {
                    if self.tree.blocks[child].count > 0 {
                        self.stack.push(child);
                    }
                }
                self.current = None;
            }
            let block = self.stack.pop()?;
            self.current = Some((block, 0));
        }
    }
}

impl BroadPhase for QuadTreeSpace {
    fn name(&self) -> &'static str {
        "quadtree"
    }

    fn insert(&mut self, id: GeomId, aabb: Aabb) {
        debug_assert!(!self.slots.contains_key(id), "geom is already a member");
        let block = self.find_block(0, &aabb);
        self.attach(block, id);
        self.slots.insert(id, (block, aabb));
    }

    fn remove(&mut self, id: GeomId) {
        if let Some((block, _)) = self.slots.remove(id) {
            self.detach(block, id);
        }
    }

    fn refile(&mut self, id: GeomId, aabb: Aabb) {
        let Some(&(block, _)) = self.slots.get(id) else {
            return;
        };
        let target = self.find_block(block, &aabb);
        if target != block {
            self.detach(block, id);
            self.attach(target, id);
        }
        self.slots.insert(id, (target, aabb));
    }

    fn len(&self) -> usize {
        self.blocks[0].count
    }

    fn entries(&self) -> Vec<(GeomId, Aabb)> {
        self.iter().map(|id| (id, self.stored(id))).collect()
    }

    fn collect_pairs(&mut self, out: &mut Vec<(GeomId, GeomId)>) {
        self.collide_block(0, out);
    }

    fn collect_overlaps(&self, aabb: &Aabb, out: &mut Vec<GeomId>) {
        self.overlaps_below(0, aabb, out);
    }
}
