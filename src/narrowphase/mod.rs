//! Narrowphase collision detection: closed-form pair tests, SAT, clipping,
//! and GJK/EPA for pairs without a dedicated routine.
//!
//! Every collider has the same signature ([`ColliderFn`]): two geoms with
//! up-to-date poses and an output slice whose length is the contact budget.
//! The return value is the number of contacts written to the front of the
//! slice. Colliders never fail; degenerate input yields zero contacts.

pub mod boxes;
pub mod capsule;
pub mod convex;
pub mod cylinder;
pub mod gjk;
pub mod heightfield;
pub mod ray;
pub mod sphere;
pub(crate) mod util;

use crate::contact::Contact;
use crate::geom::GeomId;
use crate::math::Pose;
use crate::shape::Shape;

/// Read-only view of a geom handed to colliders.
#[derive(Debug, Clone, Copy)]
pub struct GeomRef<'a> {
    pub id: GeomId,
    pub shape: &'a Shape,
    pub pose: Pose,
}

impl<'a> GeomRef<'a> {
    pub fn new(id: GeomId, shape: &'a Shape, pose: Pose) -> Self {
        Self { id, shape, pose }
    }
}

/// Pairwise collision routine.
pub type ColliderFn = fn(&GeomRef<'_>, &GeomRef<'_>, &mut [Contact]) -> usize;

/// Destructure a geom's shape or bail out with zero contacts when a collider
/// is handed the wrong kind.
macro_rules! shape_params {
    ($geom:expr, $pat:pat => $out:expr) => {
        match $geom.shape {
            $pat => $out,
            other => {
                debug_assert!(false, "collider received unexpected {:?}", other.kind());
                return 0;
            }
        }
    };
}
pub(crate) use shape_params;

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use slotmap::SlotMap;

    /// Two distinct geom ids for colliders under test.
    pub fn ids() -> (GeomId, GeomId) {
        let mut keys: SlotMap<GeomId, ()> = SlotMap::with_key();
        (keys.insert(()), keys.insert(()))
    }

    /// Run `collider` on `(s1, p1)` and `(s2, p2)` with room for `max` contacts.
    pub fn run(
        collider: ColliderFn,
        s1: &Shape,
        p1: Pose,
        s2: &Shape,
        p2: Pose,
        max: usize,
    ) -> Vec<Contact> {
        let (a, b) = ids();
        let g1 = GeomRef::new(a, s1, p1);
        let g2 = GeomRef::new(b, s2, p2);
        let mut buf = vec![Contact::default(); max];
        let n = collider(&g1, &g2, &mut buf);
        assert!(n <= max, "collider wrote {n} contacts into a buffer of {max}");
        buf.truncate(n);
        for c in &buf {
            assert_eq!((c.g1, c.g2), (a, b), "contact geoms not set");
        }
        buf
    }
}
