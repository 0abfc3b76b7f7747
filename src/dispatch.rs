//! Collider dispatch.
//!
//! A square table indexed by [`ShapeKind::index`] maps each ordered pair of
//! kinds to a collider. Only one direction of most pairs has a routine; the
//! other direction calls it with the geoms swapped and flips the contacts.
//! Entries involving custom classes start unresolved and are looked up on
//! first use, then cached.

use tracing::debug;

use crate::contact::Contact;
use crate::math::{Aabb, Pose};
use crate::narrowphase::{
    boxes, capsule, convex, cylinder, gjk, heightfield, ray, sphere, ColliderFn, GeomRef,
};
use crate::shape::{ClassId, CustomShape, ShapeKind, BUILTIN_KIND_COUNT};

/// A user-defined shape class.
pub trait ShapeClass: Send + Sync {
    fn name(&self) -> &str;

    /// World bounds of `shape` placed at `pose`.
    fn aabb(&self, shape: &CustomShape, pose: &Pose) -> Aabb;

    /// Collider for `(self, other)`. The custom geom is passed first.
    fn collider(&self, other: ShapeKind) -> Option<ColliderFn>;
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Slot {
    /// Custom pair not looked up yet.
    Unresolved,
    /// No routine; the pair never produces contacts.
    Missing,
    /// At least one side is a space. Handled by the world, never collided directly.
    Space,
    Routine {
        func: ColliderFn,
        /// Call with the geoms swapped and flip the result.
        reverse: bool,
    },
}

/// Built-in routines, first kind is the collider's first geom.
const BUILTIN_ROUTINES: &[(ShapeKind, ShapeKind, ColliderFn)] = &[
    (ShapeKind::Sphere, ShapeKind::Sphere, sphere::collide_sphere_sphere),
    (ShapeKind::Sphere, ShapeKind::Box, sphere::collide_sphere_box),
    (ShapeKind::Sphere, ShapeKind::Plane, sphere::collide_sphere_plane),
    (ShapeKind::Box, ShapeKind::Box, boxes::collide_box_box),
    (ShapeKind::Box, ShapeKind::Plane, boxes::collide_box_plane),
    (ShapeKind::Capsule, ShapeKind::Sphere, capsule::collide_capsule_sphere),
    (ShapeKind::Capsule, ShapeKind::Box, capsule::collide_capsule_box),
    (ShapeKind::Capsule, ShapeKind::Capsule, capsule::collide_capsule_capsule),
    (ShapeKind::Capsule, ShapeKind::Plane, capsule::collide_capsule_plane),
    (ShapeKind::Cylinder, ShapeKind::Sphere, cylinder::collide_cylinder_sphere),
    (ShapeKind::Cylinder, ShapeKind::Box, cylinder::collide_cylinder_box),
    (ShapeKind::Cylinder, ShapeKind::Capsule, gjk::collide_gjk),
    (ShapeKind::Cylinder, ShapeKind::Cylinder, gjk::collide_gjk),
    (ShapeKind::Cylinder, ShapeKind::Plane, cylinder::collide_cylinder_plane),
    (ShapeKind::Cylinder, ShapeKind::Convex, gjk::collide_gjk),
    (ShapeKind::Ray, ShapeKind::Sphere, ray::collide_ray_sphere),
    (ShapeKind::Ray, ShapeKind::Box, ray::collide_ray_box),
    (ShapeKind::Ray, ShapeKind::Capsule, ray::collide_ray_capsule),
    (ShapeKind::Ray, ShapeKind::Cylinder, ray::collide_ray_cylinder),
    (ShapeKind::Ray, ShapeKind::Plane, ray::collide_ray_plane),
    (ShapeKind::Ray, ShapeKind::Convex, ray::collide_ray_convex),
    (ShapeKind::Convex, ShapeKind::Sphere, convex::collide_convex_sphere),
    (ShapeKind::Convex, ShapeKind::Box, gjk::collide_gjk),
    (ShapeKind::Convex, ShapeKind::Capsule, gjk::collide_gjk),
    (ShapeKind::Convex, ShapeKind::Plane, convex::collide_convex_plane),
    (ShapeKind::Convex, ShapeKind::Convex, convex::collide_convex_convex),
    (ShapeKind::Heightfield, ShapeKind::Sphere, heightfield::collide_heightfield),
    (ShapeKind::Heightfield, ShapeKind::Box, heightfield::collide_heightfield),
    (ShapeKind::Heightfield, ShapeKind::Capsule, heightfield::collide_heightfield),
    (ShapeKind::Heightfield, ShapeKind::Cylinder, heightfield::collide_heightfield),
    (ShapeKind::Heightfield, ShapeKind::Ray, heightfield::collide_heightfield),
    (ShapeKind::Heightfield, ShapeKind::Convex, heightfield::collide_heightfield),
];

/// Collider table plus the registered custom classes.
pub struct Dispatcher {
    classes: Vec<Box<dyn ShapeClass>>,
    table: Vec<Vec<Slot>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let mut table = vec![vec![Slot::Missing; BUILTIN_KIND_COUNT]; BUILTIN_KIND_COUNT];
        let space = ShapeKind::Space.index();
        for i in 0..BUILTIN_KIND_COUNT {
            table[space][i] = Slot::Space;
            table[i][space] = Slot::Space;
        }
        for &(a, b, func) in BUILTIN_ROUTINES {
            table[a.index()][b.index()] = Slot::Routine {
                func,
                reverse: false,
            };
        }
        for &(a, b, func) in BUILTIN_ROUTINES {
            let slot = &mut table[b.index()][a.index()];
            if matches!(slot, Slot::Missing) {
                *slot = Slot::Routine {
                    func,
                    reverse: true,
                };
            }
        }
        Self {
            classes: Vec::new(),
            table,
        }
    }

    fn kind_count(&self) -> usize {
        BUILTIN_KIND_COUNT + self.classes.len()
    }

    pub fn register_class(&mut self, class: Box<dyn ShapeClass>) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        debug!(class = class.name(), id = id.0, "registered shape class");
        self.classes.push(class);

        let count = self.kind_count();
        let space = ShapeKind::Space.index();
        for (i, row) in self.table.iter_mut().enumerate() {
            row.push(if i == space { Slot::Space } else { Slot::Unresolved });
        }
        let mut row = vec![Slot::Unresolved; count];
        row[space] = Slot::Space;
        self.table.push(row);
        id
    }

    pub fn class(&self, id: ClassId) -> Option<&dyn ShapeClass> {
        self.classes.get(id.0 as usize).map(|c| c.as_ref())
    }

    pub(crate) fn check_kind(&self, kind: ShapeKind) {
        assert!(
            kind.index() < self.kind_count(),
            "shape kind {kind:?} is not registered"
        );
    }

    /// Install `func` for `(a, b)` and, flipped, for `(b, a)`.
    pub fn override_collider(&mut self, a: ShapeKind, b: ShapeKind, func: ColliderFn) {
        self.check_kind(a);
        self.check_kind(b);
        assert!(
            a != ShapeKind::Space && b != ShapeKind::Space,
            "space pairs cannot take a collider"
        );
        self.table[a.index()][b.index()] = Slot::Routine {
            func,
            reverse: false,
        };
        if a != b {
            self.table[b.index()][a.index()] = Slot::Routine {
                func,
                reverse: true,
            };
        }
    }

    /// Table entry for `(a, b)`, resolving and caching custom pairs.
    pub(crate) fn resolve(&mut self, a: ShapeKind, b: ShapeKind) -> Slot {
        self.check_kind(a);
        self.check_kind(b);
        let (ia, ib) = (a.index(), b.index());
        if let Slot::Unresolved = self.table[ia][ib] {
            let found = self.lookup_custom(a, b);
            self.table[ia][ib] = found;
        }
        self.table[ia][ib]
    }

    fn lookup_custom(&self, a: ShapeKind, b: ShapeKind) -> Slot {
        if let ShapeKind::Custom(id) = a {
            if let Some(func) = self.class(id).and_then(|c| c.collider(b)) {
                return Slot::Routine {
                    func,
                    reverse: false,
                };
            }
        }
        if let ShapeKind::Custom(id) = b {
            if let Some(func) = self.class(id).and_then(|c| c.collider(a)) {
                return Slot::Routine {
                    func,
                    reverse: true,
                };
            }
        }
        Slot::Missing
    }

    /// Run the narrow phase for one pair. Returns the number of contacts
    /// written to the front of `contacts`, all with `g1 = o1`.
    pub fn collide(
        &mut self,
        o1: &GeomRef<'_>,
        o2: &GeomRef<'_>,
        contacts: &mut [Contact],
    ) -> usize {
        if contacts.is_empty() {
            return 0;
        }
        match self.resolve(o1.shape.kind(), o2.shape.kind()) {
            Slot::Routine {
                func,
                reverse: false,
            } => func(o1, o2, contacts),
            Slot::Routine {
                func,
                reverse: true,
            } => {
                let n = func(o2, o1, contacts);
                for c in &mut contacts[..n] {
                    c.flip();
                }
                n
            }
            Slot::Unresolved | Slot::Missing | Slot::Space => 0,
        }
    }
}
