//! Bounding-volume hierarchy for mouse-ray picking.
//!
//! The tree is built over the fan-triangulated alive faces of a [`PolyMesh`]
//! and stamped with the mesh revision it saw. Casting a ray against a tree
//! whose revision no longer matches the mesh is a contract violation and
//! returns [`KnifeError::StaleBvh`] instead of silently reading dead indices.

use bevy::prelude::*;

use super::{FaceId, MeshVersion, PolyMesh};
use crate::error::KnifeError;

/// A ray/mesh intersection: the hit point in mesh-local space and the
/// polygon face it landed on.
#[derive(Debug, Clone, Copy)]
pub struct RayHit {
    pub point: Vec3,
    pub face: FaceId,
    pub distance: f32,
}

#[derive(Debug, Clone, Copy)]
struct Triangle {
    a: Vec3,
    b: Vec3,
    c: Vec3,
    face: FaceId,
}

#[derive(Debug, Clone, Copy)]
struct Aabb {
    min: Vec3,
    max: Vec3,
}

impl Aabb {
    fn empty() -> Self {
        Aabb {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// Padded so boundary-grazing rays are not rejected before the triangle
    /// test gets a say (a snap point re-projected through the camera lands
    /// within float error of the silhouette, not exactly on it).
    fn of_triangle(t: &Triangle) -> Self {
        Aabb {
            min: t.a.min(t.b).min(t.c) - Vec3::splat(BOUNDS_PAD),
            max: t.a.max(t.b).max(t.c) + Vec3::splat(BOUNDS_PAD),
        }
    }

    fn merge(&self, other: &Aabb) -> Self {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Slab test. `inv_dir` carries infinities for axis-parallel rays, which
    /// the min/max arithmetic handles.
    fn hit_by(&self, origin: Vec3, inv_dir: Vec3, max_t: f32) -> bool {
        let t0 = (self.min - origin) * inv_dir;
        let t1 = (self.max - origin) * inv_dir;
        let t_min = t0.min(t1).max_element().max(0.0);
        let t_max = t0.max(t1).min_element().min(max_t);
        t_min <= t_max
    }
}

#[derive(Debug)]
enum Node {
    Leaf {
        bounds: Aabb,
        start: usize,
        count: usize,
    },
    Branch {
        bounds: Aabb,
        left: usize,
        right: usize,
    },
}

/// AABB tree over a mesh snapshot, longest-axis median split.
#[derive(Debug)]
pub struct MeshBvh {
    nodes: Vec<Node>,
    triangles: Vec<Triangle>,
    version: MeshVersion,
}

const LEAF_SIZE: usize = 4;
/// Absolute padding on triangle bounds, in mesh-local units.
const BOUNDS_PAD: f32 = 1e-3;

impl MeshBvh {
    pub fn build(mesh: &PolyMesh) -> Self {
        let mut triangles = Vec::new();
        for f in mesh.face_ids() {
            let ring = mesh.face_verts(f);
            for i in 1..ring.len() - 1 {
                triangles.push(Triangle {
                    a: mesh.position(ring[0]),
                    b: mesh.position(ring[i]),
                    c: mesh.position(ring[i + 1]),
                    face: f,
                });
            }
        }

        let mut bvh = MeshBvh {
            nodes: Vec::new(),
            triangles,
            version: mesh.version(),
        };
        if !bvh.triangles.is_empty() {
            let count = bvh.triangles.len();
            bvh.split(0, count);
        }
        bvh
    }

    pub fn version(&self) -> MeshVersion {
        self.version
    }

    fn split(&mut self, start: usize, count: usize) -> usize {
        let mut bounds = Aabb::empty();
        for t in &self.triangles[start..start + count] {
            bounds = bounds.merge(&Aabb::of_triangle(t));
        }

        if count <= LEAF_SIZE {
            self.nodes.push(Node::Leaf {
                bounds,
                start,
                count,
            });
            return self.nodes.len() - 1;
        }

        let extent = bounds.max - bounds.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        self.triangles[start..start + count].sort_by(|a, b| {
            let ca = (a.a + a.b + a.c)[axis];
            let cb = (b.a + b.b + b.c)[axis];
            ca.total_cmp(&cb)
        });

        let half = count / 2;
        let index = self.nodes.len();
        // Placeholder; children are built depth-first and patched in.
        self.nodes.push(Node::Leaf {
            bounds,
            start,
            count: 0,
        });
        let left = self.split(start, half);
        let right = self.split(start + half, count - half);
        self.nodes[index] = Node::Branch {
            bounds,
            left,
            right,
        };
        index
    }

    /// Cast a ray through the mesh and return the nearest front hit.
    ///
    /// Errors if the tree was built from a different mesh revision.
    pub fn cast_ray(
        &self,
        mesh: &PolyMesh,
        origin: Vec3,
        dir: Vec3,
    ) -> Result<Option<RayHit>, KnifeError> {
        if mesh.version() != self.version {
            return Err(KnifeError::StaleBvh {
                mesh: mesh.version().0,
                tree: self.version.0,
            });
        }
        if self.nodes.is_empty() {
            return Ok(None);
        }

        let inv_dir = dir.recip();
        let mut best: Option<RayHit> = None;
        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let max_t = best.map_or(f32::INFINITY, |h| h.distance);
            match &self.nodes[index] {
                Node::Leaf {
                    bounds,
                    start,
                    count,
                } => {
                    if !bounds.hit_by(origin, inv_dir, max_t) {
                        continue;
                    }
                    for t in &self.triangles[*start..*start + *count] {
                        if let Some(distance) = ray_triangle(origin, dir, t.a, t.b, t.c) {
                            if distance < max_t && best.map_or(true, |h| distance < h.distance) {
                                best = Some(RayHit {
                                    point: origin + dir * distance,
                                    face: t.face,
                                    distance,
                                });
                            }
                        }
                    }
                }
                Node::Branch {
                    bounds,
                    left,
                    right,
                } => {
                    if bounds.hit_by(origin, inv_dir, max_t) {
                        stack.push(*left);
                        stack.push(*right);
                    }
                }
            }
        }
        Ok(best)
    }
}

/// Möller-Trumbore, double-sided. Returns the ray parameter for hits in
/// front of the origin.
fn ray_triangle(origin: Vec3, dir: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPS: f32 = 1e-7;
    let ab = b - a;
    let ac = c - a;
    let p = dir.cross(ac);
    let det = ab.dot(p);
    if det.abs() < EPS {
        return None;
    }
    // Inclusive bounds: rays grazing a shared edge or a silhouette boundary
    // must still register as hits. A screen -> ray round trip of a point
    // sitting exactly on an edge carries more error than raw float epsilon,
    // so the slack is generous.
    const SLACK: f32 = 1e-3;
    let inv_det = 1.0 / det;
    let s = origin - a;
    let u = s.dot(p) * inv_det;
    if !(-SLACK..=1.0 + SLACK).contains(&u) {
        return None;
    }
    let q = s.cross(ab);
    let v = dir.dot(q) * inv_det;
    if v < -SLACK || u + v > 1.0 + SLACK {
        return None;
    }
    let t = ac.dot(q) * inv_det;
    (t > EPS).then_some(t)
}
