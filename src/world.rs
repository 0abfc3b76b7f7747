//! The collision world: owner of every geom, body and space.
//!
//! Handles are [`GeomId`] and [`BodyId`] slot map keys. Using a destroyed
//! handle is a programming error and panics. A space is a geom without a
//! shape; its members are indexed by the [`BroadPhase`] chosen at creation.
//!
//! Poses and AABBs are cached and refreshed lazily. Moving a geom marks it
//! and every enclosing space dirty; the next [`World::collide`] or
//! [`World::aabb`] call refiles whatever changed.

use glam::{Mat3, Vec3};
use slotmap::{SecondaryMap, SlotMap};
use tracing::{debug, trace};

use crate::config::SpaceKind;
use crate::contact::Contact;
use crate::dispatch::{Dispatcher, ShapeClass};
use crate::geom::{Body, BodyId, Geom, GeomFlags, GeomId};
use crate::math::{Aabb, Pose};
use crate::narrowphase::{ColliderFn, GeomRef};
use crate::shape::{ClassId, Shape, ShapeKind};
use crate::space::{self, BroadPhase};

/// Per-space state stored next to the space's geom record.
#[derive(Debug)]
struct SpaceData {
    index: Box<dyn BroadPhase>,
    /// Members moved since the last clean.
    dirty: Vec<GeomId>,
    /// Number of collide passes currently running over this space.
    lock_count: u32,
    /// Destroy members along with the space.
    cleanup: bool,
    sublevel: i32,
}

/// Broadphase callback: receives the world and a candidate pair.
pub type NearCallback<'a> = dyn FnMut(&mut World, GeomId, GeomId) + 'a;

/// Collision context. Independent worlds share nothing.
pub struct World {
    geoms: SlotMap<GeomId, Geom>,
    bodies: SlotMap<BodyId, Body>,
    spaces: SecondaryMap<GeomId, SpaceData>,
    dispatcher: Dispatcher,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self {
            geoms: SlotMap::with_key(),
            bodies: SlotMap::with_key(),
            spaces: SecondaryMap::new(),
            dispatcher: Dispatcher::new(),
        }
    }

    fn geom(&self, id: GeomId) -> &Geom {
        match self.geoms.get(id) {
            Some(geom) => geom,
            None => panic!("invalid geom handle {id:?}"),
        }
    }

    fn geom_mut(&mut self, id: GeomId) -> &mut Geom {
        match self.geoms.get_mut(id) {
            Some(geom) => geom,
            None => panic!("invalid geom handle {id:?}"),
        }
    }

    fn space(&self, id: GeomId) -> &SpaceData {
        match self.spaces.get(id) {
            Some(space) => space,
            None => panic!("geom {id:?} is not a space"),
        }
    }

    fn space_mut(&mut self, id: GeomId) -> &mut SpaceData {
        match self.spaces.get_mut(id) {
            Some(space) => space,
            None => panic!("geom {id:?} is not a space"),
        }
    }

    fn body(&self, id: BodyId) -> &Body {
        match self.bodies.get(id) {
            Some(body) => body,
            None => panic!("invalid body handle {id:?}"),
        }
    }

    fn body_mut(&mut self, id: BodyId) -> &mut Body {
        match self.bodies.get_mut(id) {
            Some(body) => body,
            None => panic!("invalid body handle {id:?}"),
        }
    }

    // ---- geoms ---------------------------------------------------------

    /// Create a detached geom at the origin.
    pub fn create_geom(&mut self, shape: Shape) -> GeomId {
        self.dispatcher.check_kind(shape.kind());
        self.geoms.insert(Geom::new(Some(shape)))
    }

    /// Create an empty space, optionally inside `parent`.
    pub fn create_space(&mut self, kind: SpaceKind, parent: Option<GeomId>) -> GeomId {
        let id = self.geoms.insert(Geom::new(None));
        let index = space::build(kind);
        debug!(space = ?id, strategy = index.name(), "created space");
        self.spaces.insert(
            id,
            SpaceData {
                index,
                dirty: Vec::new(),
                lock_count: 0,
                cleanup: true,
                sublevel: 0,
            },
        );
        if let Some(parent) = parent {
            self.add(parent, id);
        }
        id
    }

    /// Destroy a geom or space. The geom is removed from its space and body
    /// first. Members of a destroyed space are destroyed too when its
    /// cleanup flag is set, and detached otherwise.
    pub fn destroy_geom(&mut self, id: GeomId) {
        self.assert_destroyable(id);
        if let Some(parent) = self.geom(id).parent {
            self.remove(parent, id);
        }
        if let Some(body) = self.geom(id).body {
            if let Some(body) = self.bodies.get_mut(body) {
                body.geoms.retain(|g| *g != id);
            }
        }
        if let Some(data) = self.spaces.remove(id) {
            let members = data.index.entries();
            debug!(space = ?id, members = members.len(), cleanup = data.cleanup, "destroying space");
            for (member, _) in members {
                self.geom_mut(member).parent = None;
                if data.cleanup {
                    self.destroy_geom(member);
                }
            }
        }
        self.geoms.remove(id);
    }

    pub fn contains(&self, id: GeomId) -> bool {
        self.geoms.contains_key(id)
    }

    pub fn is_space(&self, id: GeomId) -> bool {
        self.geom(id).is_space()
    }

    /// Shape of a geom, `None` for spaces.
    pub fn shape(&self, id: GeomId) -> Option<&Shape> {
        self.geom(id).shape.as_ref()
    }

    pub fn kind(&self, id: GeomId) -> ShapeKind {
        self.geom(id).kind()
    }

    // ---- placement -----------------------------------------------------

    fn assert_placeable(&self, id: GeomId) {
        assert!(
            self.geom(id).shape.as_ref().is_some_and(Shape::is_placeable),
            "geom {id:?} is not placeable"
        );
    }

    /// Current world pose. Spaces and planes sit at the identity.
    pub fn pose(&self, id: GeomId) -> Pose {
        let geom = self.geom(id);
        match geom.body {
            Some(body) if geom.flags.contains(GeomFlags::POSE_BAD) => {
                self.body(body).pose.compose(&geom.offset)
            }
            _ => geom.pose,
        }
    }

    pub fn position(&self, id: GeomId) -> Vec3 {
        self.pose(id).position
    }

    pub fn rotation(&self, id: GeomId) -> Mat3 {
        self.pose(id).rotation
    }

    /// Place a geom. A geom attached to a body moves the body so that the
    /// geom ends up at `pose`.
    pub fn set_pose(&mut self, id: GeomId, pose: Pose) {
        self.assert_placeable(id);
        match self.geom(id).body {
            Some(body) => {
                let offset = self.geom(id).offset;
                let rotation = pose.rotation * offset.rotation.transpose();
                let position = pose.position - rotation * offset.position;
                self.set_body_pose(body, Pose::new(position, rotation));
            }
            None => {
                self.geom_mut(id).pose = pose;
                self.geom_moved(id);
            }
        }
    }

    pub fn set_position(&mut self, id: GeomId, position: Vec3) {
        let rotation = self.pose(id).rotation;
        self.set_pose(id, Pose::new(position, rotation));
    }

    pub fn set_rotation(&mut self, id: GeomId, rotation: Mat3) {
        let position = self.pose(id).position;
        self.set_pose(id, Pose::new(position, rotation));
    }

    fn refresh_pose(&mut self, id: GeomId) -> Pose {
        let pose = self.pose(id);
        let geom = self.geom_mut(id);
        geom.pose = pose;
        geom.flags.remove(GeomFlags::POSE_BAD);
        pose
    }

    /// Mark a geom moved: its AABB is stale and every enclosing space has to
    /// refile it.
    fn geom_moved(&mut self, id: GeomId) {
        let mut current = id;
        loop {
            let geom = self.geom_mut(current);
            let was_dirty = geom.flags.contains(GeomFlags::DIRTY);
            geom.flags |= GeomFlags::DIRTY | GeomFlags::AABB_BAD;
            let Some(parent) = geom.parent else {
                break;
            };
            if !was_dirty {
                self.space_mut(parent).dirty.push(current);
            }
            current = parent;
        }
    }

    // ---- bodies --------------------------------------------------------

    pub fn create_body(&mut self, pose: Pose) -> BodyId {
        self.bodies.insert(Body {
            pose,
            geoms: Vec::new(),
        })
    }

    /// Destroy a body. Its geoms stay where they are, detached.
    pub fn destroy_body(&mut self, body: BodyId) {
        let geoms = self.body(body).geoms.clone();
        for id in geoms {
            self.set_body(id, None);
        }
        self.bodies.remove(body);
    }

    pub fn body_pose(&self, body: BodyId) -> Pose {
        self.body(body).pose
    }

    /// Move a body and every geom attached to it.
    pub fn set_body_pose(&mut self, body: BodyId, pose: Pose) {
        self.body_mut(body).pose = pose;
        let geoms = self.body(body).geoms.clone();
        for id in geoms {
            self.geom_mut(id).flags |= GeomFlags::POSE_BAD;
            self.geom_moved(id);
        }
    }

    /// Attach a geom to a body with an identity offset, or detach it keeping
    /// its current world pose.
    pub fn set_body(&mut self, id: GeomId, body: Option<BodyId>) {
        self.assert_placeable(id);
        let pose = self.refresh_pose(id);
        if let Some(old) = self.geom(id).body {
            if let Some(old) = self.bodies.get_mut(old) {
                old.geoms.retain(|g| *g != id);
            }
        }
        if let Some(new) = body {
            self.body_mut(new).geoms.push(id);
        }
        let geom = self.geom_mut(id);
        geom.body = body;
        geom.offset = Pose::IDENTITY;
        geom.pose = pose;
        if body.is_some() {
            geom.flags |= GeomFlags::POSE_BAD;
        }
        self.geom_moved(id);
    }

    pub fn geom_body(&self, id: GeomId) -> Option<BodyId> {
        self.geom(id).body
    }

    /// Pose of a geom relative to its body.
    pub fn set_offset(&mut self, id: GeomId, offset: Pose) {
        assert!(
            self.geom(id).body.is_some(),
            "geom {id:?} has no body to be offset from"
        );
        let geom = self.geom_mut(id);
        geom.offset = offset;
        geom.flags |= GeomFlags::POSE_BAD;
        self.geom_moved(id);
    }

    pub fn offset(&self, id: GeomId) -> Pose {
        self.geom(id).offset
    }

    // ---- flags and masks -----------------------------------------------

    pub fn enable(&mut self, id: GeomId) {
        self.geom_mut(id).flags.insert(GeomFlags::ENABLED);
    }

    /// Disabled geoms stay in their space but are never reported.
    pub fn disable(&mut self, id: GeomId) {
        self.geom_mut(id).flags.remove(GeomFlags::ENABLED);
    }

    pub fn is_enabled(&self, id: GeomId) -> bool {
        self.geom(id).flags.contains(GeomFlags::ENABLED)
    }

    pub fn category_bits(&self, id: GeomId) -> u64 {
        self.geom(id).category
    }

    pub fn set_category_bits(&mut self, id: GeomId, bits: u64) {
        self.geom_mut(id).category = bits;
    }

    pub fn collide_bits(&self, id: GeomId) -> u64 {
        self.geom(id).collide
    }

    pub fn set_collide_bits(&mut self, id: GeomId, bits: u64) {
        self.geom_mut(id).collide = bits;
    }

    // ---- queries -------------------------------------------------------

    /// World AABB, recomputed if stale. A space returns the union of its
    /// members, or a zero box when empty.
    pub fn aabb(&mut self, id: GeomId) -> Aabb {
        self.refresh_aabb(id)
    }

    /// Signed depth of world point `p` in a geom. `None` for shapes without
    /// a volume and for spaces.
    pub fn point_depth(&self, id: GeomId, p: Vec3) -> Option<f32> {
        let pose = self.pose(id);
        self.geom(id).shape.as_ref()?.point_depth(&pose, p)
    }

    fn refresh_aabb(&mut self, id: GeomId) -> Aabb {
        if self.geom(id).is_space() {
            self.clean_space(id);
            if self.geoms[id].flags.contains(GeomFlags::AABB_BAD) {
                let aabb = self.spaces[id]
                    .index
                    .entries()
                    .iter()
                    .map(|(member, _)| self.geoms[*member].aabb)
                    .reduce(|a, b| a.union(&b))
                    .unwrap_or(Aabb::ZERO);
                let geom = &mut self.geoms[id];
                geom.aabb = aabb;
                geom.flags.remove(GeomFlags::AABB_BAD);
            }
            return self.geoms[id].aabb;
        }

        if !self.geom(id).flags.contains(GeomFlags::AABB_BAD) {
            return self.geoms[id].aabb;
        }
        let pose = self.refresh_pose(id);
        let aabb = match &self.geoms[id].shape {
            Some(Shape::Custom(custom)) => self
                .dispatcher
                .class(custom.class)
                .map_or(Aabb::INFINITE, |class| class.aabb(custom, &pose)),
            Some(shape) => shape.aabb(&pose),
            None => Aabb::ZERO,
        };
        let geom = &mut self.geoms[id];
        geom.aabb = aabb;
        geom.flags.remove(GeomFlags::AABB_BAD);
        aabb
    }

    // ---- space membership ----------------------------------------------

    /// Panic if `space` or any space above it is mid-collide.
    fn assert_unlocked(&self, space: GeomId) {
        let mut current = Some(space);
        while let Some(id) = current {
            assert!(
                self.space(id).lock_count == 0,
                "space {id:?} is locked by a collide pass"
            );
            current = self.geom(id).parent;
        }
    }

    /// A space and every space its cleanup would destroy must be unlocked.
    fn assert_destroyable(&self, id: GeomId) {
        let Some(data) = self.spaces.get(id) else {
            return;
        };
        self.assert_unlocked(id);
        if data.cleanup {
            for (member, _) in data.index.entries() {
                self.assert_destroyable(member);
            }
        }
    }

    /// Add a detached geom or space to `space`. A nested space's sublevel
    /// becomes one below its new parent.
    pub fn add(&mut self, space: GeomId, id: GeomId) {
        assert!(id != space, "a space cannot contain itself");
        assert!(
            self.geom(id).parent.is_none(),
            "geom {id:?} is already in a space"
        );
        self.assert_unlocked(space);
        let mut ancestor = Some(space);
        while let Some(a) = ancestor {
            assert!(a != id, "adding {id:?} to {space:?} would create a cycle");
            ancestor = self.geom(a).parent;
        }

        let sublevel = self.space(space).sublevel + 1;
        if let Some(child) = self.spaces.get_mut(id) {
            child.sublevel = sublevel;
        }
        let geom = self.geom_mut(id);
        geom.parent = Some(space);
        geom.flags |= GeomFlags::DIRTY | GeomFlags::AABB_BAD;
        let aabb = geom.aabb;
        let data = self.space_mut(space);
        data.index.insert(id, aabb);
        data.dirty.push(id);
        self.geom_moved(space);
    }

    pub fn remove(&mut self, space: GeomId, id: GeomId) {
        assert!(
            self.geom(id).parent == Some(space),
            "geom {id:?} is not in space {space:?}"
        );
        self.assert_unlocked(space);
        let data = self.space_mut(space);
        data.index.remove(id);
        data.dirty.retain(|g| *g != id);
        self.geom_mut(id).parent = None;
        self.geom_moved(space);
    }

    /// Space directly containing `id`.
    pub fn parent(&self, id: GeomId) -> Option<GeomId> {
        self.geom(id).parent
    }

    pub fn set_cleanup(&mut self, space: GeomId, cleanup: bool) {
        self.assert_unlocked(space);
        self.space_mut(space).cleanup = cleanup;
    }

    pub fn cleanup(&self, space: GeomId) -> bool {
        self.space(space).cleanup
    }

    pub fn sublevel(&self, space: GeomId) -> i32 {
        self.space(space).sublevel
    }

    pub fn set_sublevel(&mut self, space: GeomId, sublevel: i32) {
        self.space_mut(space).sublevel = sublevel;
    }

    /// Members of a space in the strategy's iteration order.
    pub fn space_geoms(&self, space: GeomId) -> Vec<GeomId> {
        self.space(space)
            .index
            .entries()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    pub fn space_len(&self, space: GeomId) -> usize {
        self.space(space).index.len()
    }

    /// Name of the broadphase strategy behind a space.
    pub fn space_strategy(&self, space: GeomId) -> &'static str {
        self.space(space).index.name()
    }

    /// Recompute every stale AABB below `space` and refile moved members.
    pub fn clean(&mut self, space: GeomId) {
        assert!(self.is_space(space), "geom {space:?} is not a space");
        self.refresh_aabb(space);
    }

    fn clean_space(&mut self, space: GeomId) {
        let dirty = std::mem::take(&mut self.space_mut(space).dirty);
        for id in dirty {
            if self.geoms.get(id).and_then(|g| g.parent) != Some(space) {
                continue;
            }
            let aabb = self.refresh_aabb(id);
            self.geoms[id].flags.remove(GeomFlags::DIRTY);
            self.space_mut(space).index.refile(id, aabb);
        }
    }

    fn lock(&mut self, space: GeomId) {
        self.space_mut(space).lock_count += 1;
    }

    fn unlock(&mut self, space: GeomId) {
        self.space_mut(space).lock_count -= 1;
    }

    // ---- collision -----------------------------------------------------

    /// Broadphase filter applied to every candidate pair.
    fn accepts(&self, a: GeomId, b: GeomId) -> bool {
        let (ga, gb) = (&self.geoms[a], &self.geoms[b]);
        let skip = GeomFlags::ZERO_SIZED;
        if !ga.flags.contains(GeomFlags::ENABLED)
            || !gb.flags.contains(GeomFlags::ENABLED)
            || ga.flags.intersects(skip)
            || gb.flags.intersects(skip)
        {
            return false;
        }
        if ga.body.is_some() && ga.body == gb.body {
            return false;
        }
        if ga.category & gb.collide == 0 && gb.category & ga.collide == 0 {
            return false;
        }
        ga.aabb.overlaps(&gb.aabb)
    }

    /// Report every potentially touching pair of members of `space`.
    ///
    /// The callback may run the narrowphase, descend into member spaces
    /// with [`World::collide2`] or move geoms. Adding to or removing from
    /// `space` or its ancestors inside the callback panics.
    pub fn collide<F>(&mut self, space: GeomId, mut callback: F)
    where
        F: FnMut(&mut World, GeomId, GeomId),
    {
        self.collide_dyn(space, &mut callback);
    }

    fn collide_dyn(&mut self, space: GeomId, callback: &mut NearCallback<'_>) {
        self.lock(space);
        self.clean_space(space);

        let mut candidates = Vec::new();
        self.space_mut(space).index.collect_pairs(&mut candidates);
        let total = candidates.len();
        candidates.retain(|&(a, b)| self.accepts(a, b));
        trace!(
            space = ?space,
            strategy = self.space(space).index.name(),
            candidates = total,
            reported = candidates.len(),
            "collide pass"
        );

        for (a, b) in candidates {
            callback(self, a, b);
        }
        self.unlock(space);
    }

    /// Report potentially touching pairs between two geoms or spaces.
    ///
    /// - Two geoms: the pair itself, when it passes the broadphase filter.
    /// - A space and a geom: every member of the space against the geom.
    /// - Two different spaces: every member of the smaller one against the
    ///   other. A space with a higher sublevel than the other treats the
    ///   other as a single geom.
    /// - The same space twice: same as [`World::collide`].
    ///
    /// The callback always receives the geom from the `g1` side first.
    pub fn collide2<F>(&mut self, g1: GeomId, g2: GeomId, mut callback: F)
    where
        F: FnMut(&mut World, GeomId, GeomId),
    {
        self.collide2_dyn(g1, g2, &mut callback);
    }

    fn collide2_dyn(&mut self, g1: GeomId, g2: GeomId, callback: &mut NearCallback<'_>) {
        let mut s1 = self.is_space(g1);
        let mut s2 = self.is_space(g2);
        if s1 && s2 {
            let (l1, l2) = (self.sublevel(g1), self.sublevel(g2));
            if l1 > l2 {
                s2 = false;
            } else if l2 > l1 {
                s1 = false;
            }
        }

        match (s1, s2) {
            (true, true) if g1 == g2 => self.collide_dyn(g1, callback),
            (true, true) => {
                if self.space_len(g1) < self.space_len(g2) {
                    for member in self.space_geoms(g1) {
                        self.collide_space_with(g2, member, callback, true);
                    }
                } else {
                    for member in self.space_geoms(g2) {
                        self.collide_space_with(g1, member, callback, false);
                    }
                }
            }
            (true, false) => self.collide_space_with(g1, g2, callback, false),
            (false, true) => self.collide_space_with(g2, g1, callback, true),
            (false, false) => {
                self.refresh_aabb(g1);
                self.refresh_aabb(g2);
                if g1 != g2 && self.accepts(g1, g2) {
                    callback(self, g1, g2);
                }
            }
        }
    }

    /// Members of `space` against `geom`. The member comes first unless
    /// `swapped`.
    fn collide_space_with(
        &mut self,
        space: GeomId,
        geom: GeomId,
        callback: &mut NearCallback<'_>,
        swapped: bool,
    ) {
        self.lock(space);
        self.clean_space(space);
        let probe = self.refresh_aabb(geom);

        let mut hits = Vec::new();
        self.space(space).index.collect_overlaps(&probe, &mut hits);
        hits.retain(|&member| member != geom && self.accepts(member, geom));
        for member in hits {
            if swapped {
                callback(self, geom, member);
            } else {
                callback(self, member, geom);
            }
        }
        self.unlock(space);
    }

    /// Run the narrowphase for one pair. Returns the number of contacts
    /// written to the front of `contacts`; the slice length caps it.
    ///
    /// A geom never collides with itself or with another geom on the same
    /// body, and zero-sized geoms never collide. Panics when given a space.
    pub fn collide_pair(&mut self, a: GeomId, b: GeomId, contacts: &mut [Contact]) -> usize {
        assert!(
            !self.is_space(a) && !self.is_space(b),
            "collide_pair takes plain geoms; use collide2 for spaces"
        );
        if a == b {
            return 0;
        }
        let (ga, gb) = (self.geom(a), self.geom(b));
        if ga.body.is_some() && ga.body == gb.body {
            return 0;
        }
        if ga.flags.contains(GeomFlags::ZERO_SIZED) || gb.flags.contains(GeomFlags::ZERO_SIZED) {
            return 0;
        }
        let pose_a = self.refresh_pose(a);
        let pose_b = self.refresh_pose(b);
        let (Some(shape_a), Some(shape_b)) = (&self.geoms[a].shape, &self.geoms[b].shape) else {
            return 0;
        };
        let o1 = GeomRef::new(a, shape_a, pose_a);
        let o2 = GeomRef::new(b, shape_b, pose_b);
        self.dispatcher.collide(&o1, &o2, contacts)
    }

    // ---- extension -----------------------------------------------------

    /// Register a custom shape class. Geoms of the class are created with
    /// [`Shape::Custom`].
    pub fn register_class(&mut self, class: Box<dyn ShapeClass>) -> ClassId {
        self.dispatcher.register_class(class)
    }

    /// Replace the collider for `(a, b)`; `(b, a)` gets the flipped version.
    pub fn override_collider(&mut self, a: ShapeKind, b: ShapeKind, func: ColliderFn) {
        self.dispatcher.override_collider(a, b, func);
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }
}
