//! Convex polytope data: outward planes, vertices and face polygons.

use glam::Vec3;
use tracing::warn;

use crate::error::ShapeError;

/// Outward face plane `normal . p = d` in hull-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HullPlane {
    pub normal: Vec3,
    pub d: f32,
}

impl HullPlane {
    /// Signed distance of `p` above the plane. Positive means outside.
    #[inline]
    pub fn distance(&self, p: Vec3) -> f32 {
        self.normal.dot(p) - self.d
    }
}

/// Convex hull given as face planes, vertices and one polygon per plane.
///
/// Polygons list vertex indices in cyclic order around their face. The edge
/// list is derived and holds every undirected edge once; `vertex_edges[v]`
/// lists the edges touching vertex `v`.
#[derive(Debug, Clone)]
pub struct ConvexHull {
    pub planes: Vec<HullPlane>,
    pub points: Vec<Vec3>,
    pub polygons: Vec<Vec<u32>>,
    pub edges: Vec<(u32, u32)>,
    pub vertex_edges: Vec<Vec<u32>>,
}

impl ConvexHull {
    pub fn new(
        planes: Vec<HullPlane>,
        points: Vec<Vec3>,
        polygons: Vec<Vec<u32>>,
    ) -> Result<Self, ShapeError> {
        if planes.len() != polygons.len() {
            return Err(ShapeError::PolygonCountMismatch {
                planes: planes.len(),
                polygons: polygons.len(),
            });
        }
        for (polygon, indices) in polygons.iter().enumerate() {
            if indices.len() < 3 {
                return Err(ShapeError::PolygonTooSmall {
                    polygon,
                    len: indices.len(),
                });
            }
            if let Some(&index) = indices.iter().find(|&&i| i as usize >= points.len()) {
                return Err(ShapeError::PointIndexOutOfRange {
                    polygon,
                    index,
                    points: points.len(),
                });
            }
        }

        let planes = planes
            .into_iter()
            .enumerate()
            .map(|(i, plane)| {
                let len = plane.normal.length();
                if (len - 1.0).abs() > 1e-4 && len > 0.0 {
                    warn!(plane = i, length = len, "renormalizing convex plane normal");
                    HullPlane {
                        normal: plane.normal / len,
                        d: plane.d / len,
                    }
                } else {
                    plane
                }
            })
            .collect();

        let edges = derive_edges(&polygons);
        let vertex_edges = derive_vertex_edges(points.len(), &edges);
        Ok(Self {
            planes,
            points,
            polygons,
            edges,
            vertex_edges,
        })
    }

    /// Axis-aligned box hull with the given half extents.
    pub fn cuboid(half: Vec3) -> Self {
        let points = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 != 0 { half.x } else { -half.x },
                    if i & 2 != 0 { half.y } else { -half.y },
                    if i & 4 != 0 { half.z } else { -half.z },
                )
            })
            .collect();
        let face = |normal: Vec3, d: f32| HullPlane { normal, d };
        let planes = vec![
            face(Vec3::X, half.x),
            face(Vec3::NEG_X, half.x),
            face(Vec3::Y, half.y),
            face(Vec3::NEG_Y, half.y),
            face(Vec3::Z, half.z),
            face(Vec3::NEG_Z, half.z),
        ];
        let polygons = vec![
            vec![1, 3, 7, 5],
            vec![0, 4, 6, 2],
            vec![2, 6, 7, 3],
            vec![0, 1, 5, 4],
            vec![4, 5, 7, 6],
            vec![0, 2, 3, 1],
        ];
        let edges = derive_edges(&polygons);
        let vertex_edges = derive_vertex_edges(8, &edges);
        Self {
            planes,
            points,
            polygons,
            edges,
            vertex_edges,
        }
    }

    /// Vertex with the largest projection on `dir`.
    pub fn support_index(&self, dir: Vec3) -> usize {
        let mut best = 0;
        let mut best_dot = f32::NEG_INFINITY;
        for (i, p) in self.points.iter().enumerate() {
            let d = p.dot(dir);
            if d > best_dot {
                best_dot = d;
                best = i;
            }
        }
        best
    }

    /// Vertex at the other end of `edge` from `vertex`.
    #[inline]
    pub fn edge_neighbor(&self, edge: u32, vertex: usize) -> usize {
        let (a, b) = self.edges[edge as usize];
        if a as usize == vertex {
            b as usize
        } else {
            a as usize
        }
    }

    pub fn support(&self, dir: Vec3) -> Vec3 {
        self.points
            .get(self.support_index(dir))
            .copied()
            .unwrap_or(Vec3::ZERO)
    }

    /// Depth of local point `p`: smallest distance to a face when inside,
    /// minus the largest face violation when outside.
    pub fn point_depth(&self, p: Vec3) -> f32 {
        let mut max_distance = f32::NEG_INFINITY;
        for plane in &self.planes {
            max_distance = max_distance.max(plane.distance(p));
        }
        -max_distance
    }

    /// Local vertices of face `face`, in polygon order.
    pub fn face_points(&self, face: usize) -> impl Iterator<Item = Vec3> + '_ {
        self.polygons[face]
            .iter()
            .map(move |&i| self.points[i as usize])
    }

    pub fn face_centroid(&self, face: usize) -> Vec3 {
        let n = self.polygons[face].len().max(1) as f32;
        self.face_points(face).sum::<Vec3>() / n
    }
}

fn derive_edges(polygons: &[Vec<u32>]) -> Vec<(u32, u32)> {
    let mut edges: Vec<(u32, u32)> = Vec::new();
    for indices in polygons {
        for k in 0..indices.len() {
            let a = indices[k];
            let b = indices[(k + 1) % indices.len()];
            let edge = (a.min(b), a.max(b));
            if a != b && !edges.contains(&edge) {
                edges.push(edge);
            }
        }
    }
    edges
}

fn derive_vertex_edges(points: usize, edges: &[(u32, u32)]) -> Vec<Vec<u32>> {
    let mut incident = vec![Vec::new(); points];
    for (e, &(a, b)) in edges.iter().enumerate() {
        incident[a as usize].push(e as u32);
        incident[b as usize].push(e as u32);
    }
    incident
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cuboid_topology() {
        let hull = ConvexHull::cuboid(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(hull.points.len(), 8);
        assert_eq!(hull.planes.len(), 6);
        assert_eq!(hull.edges.len(), 12);
        for (v, incident) in hull.vertex_edges.iter().enumerate() {
            assert_eq!(incident.len(), 3, "vertex {v} degree");
            for &e in incident {
                let n = hull.edge_neighbor(e, v);
                assert_ne!(n, v);
                // Cuboid neighbours differ in a single coordinate sign.
                assert_eq!((n ^ v).count_ones(), 1, "edge {e} joins {v} and {n}");
            }
        }
        for (face, plane) in hull.planes.iter().enumerate() {
            for p in hull.face_points(face) {
                assert!(plane.distance(p).abs() < 1e-6, "face {face} vertex off plane");
            }
        }
    }

    #[test]
    fn test_polygon_winding_is_counter_clockwise() {
        let hull = ConvexHull::cuboid(Vec3::ONE);
        for (face, plane) in hull.planes.iter().enumerate() {
            let pts: Vec<Vec3> = hull.face_points(face).collect();
            let n = (pts[1] - pts[0]).cross(pts[2] - pts[1]);
            assert!(n.dot(plane.normal) > 0.0, "face {face} wound clockwise");
        }
    }

    #[test]
    fn test_point_depth() {
        let hull = ConvexHull::cuboid(Vec3::ONE);
        assert!((hull.point_depth(Vec3::new(0.5, 0.0, 0.0)) - 0.5).abs() < 1e-6);
        assert!((hull.point_depth(Vec3::new(3.0, 0.0, 0.0)) + 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_hulls() {
        let planes = vec![HullPlane {
            normal: Vec3::Y,
            d: 0.0,
        }];
        let points = vec![Vec3::ZERO, Vec3::X, Vec3::Z];
        assert!(matches!(
            ConvexHull::new(planes.clone(), points.clone(), vec![vec![0, 1]]),
            Err(ShapeError::PolygonTooSmall { .. })
        ));
        assert!(matches!(
            ConvexHull::new(planes.clone(), points.clone(), vec![vec![0, 1, 7]]),
            Err(ShapeError::PointIndexOutOfRange { index: 7, .. })
        ));
        assert!(matches!(
            ConvexHull::new(planes, points, vec![]),
            Err(ShapeError::PolygonCountMismatch { .. })
        ));
    }

    #[test]
    fn test_support() {
        let hull = ConvexHull::cuboid(Vec3::ONE);
        let p = hull.support(Vec3::new(1.0, -1.0, 1.0));
        assert_eq!(p, Vec3::new(1.0, -1.0, 1.0));
    }
}
