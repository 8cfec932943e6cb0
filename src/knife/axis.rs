//! Angle-constraint axes.
//!
//! When the angle constraint is armed, the cut direction is locked to one of
//! a family of axes derived from the faces around the start vertex: per face,
//! the bisector of its two edges at the vertex plus the two half-bisectors
//! between the bisector and each edge. The cursor picks the nearest axis of
//! the face it last hovered, and the cut endpoint slides along that axis.

use bevy::prelude::*;

use crate::knife::geometry::ViewContext;
use crate::mesh::{FaceId, MeshEdge, PolyMesh, VertexId};

/// Length of the drawn axis guide, in mesh-local units, either side of the
/// start vertex.
const AXIS_DRAW_LENGTH: f32 = 20.0;

/// Below this, the two edge directions cancel out and the bisector is
/// replaced by the in-face perpendicular.
const BISECTOR_FALLBACK: f32 = 0.001;

/// One constraint axis rooted at the cut start vertex.
#[derive(Debug, Clone, Copy)]
pub struct AxisCandidate {
    /// Unit direction in mesh-local space.
    pub dir: Vec3,
    /// Face this axis was derived from; cursor hit-testing is scoped to the
    /// hovered face.
    pub face: FaceId,
    /// Axis endpoints flattened onto the view plane, for cursor hit-testing.
    pub hit_start: Vec3,
    pub hit_end: Vec3,
    /// Guide-line endpoints for drawing.
    pub draw_start: Vec3,
    pub draw_end: Vec3,
}

/// The face edges framing the active axis, for highlighting.
#[derive(Debug, Clone, Copy)]
pub struct AxisHighlight {
    pub face: FaceId,
    pub edges: [MeshEdge; 2],
    pub endpoints: [Vec3; 2],
}

/// The two ring neighbors of `vertex` inside `face`.
fn wing_vertices(mesh: &PolyMesh, vertex: VertexId, face: FaceId) -> Option<(VertexId, VertexId)> {
    let ring = mesh.face_verts(face);
    let n = ring.len();
    let i = ring.iter().position(|&v| v == vertex)?;
    Some((ring[(i + n - 1) % n], ring[(i + 1) % n]))
}

/// Rebuild the axis family for a start vertex sitting at `origin`.
///
/// Three candidates per adjacent face, so a regular grid interior vertex
/// yields twelve.
pub fn update_axes(
    mesh: &PolyMesh,
    view: &ViewContext,
    vertex: VertexId,
    origin: Vec3,
) -> Vec<AxisCandidate> {
    let mut out = Vec::new();
    for face in mesh.vertex_faces(vertex) {
        let Some((prev, next)) = wing_vertices(mesh, vertex, face) else {
            continue;
        };
        let Some(v1) = (mesh.position(prev) - origin).try_normalize() else {
            continue;
        };
        let Some(v2) = (mesh.position(next) - origin).try_normalize() else {
            continue;
        };

        let sum = v1 + v2;
        let bisector = if sum.length() < BISECTOR_FALLBACK {
            // Opposite edges cancel; fall back to the in-face perpendicular.
            mesh.face_normal(face).cross(v1)
        } else {
            sum
        };
        let Some(bisector) = bisector.try_normalize() else {
            continue;
        };

        for dir in [
            Some(bisector),
            (v1 + bisector).try_normalize(),
            (v2 + bisector).try_normalize(),
        ]
        .into_iter()
        .flatten()
        {
            out.push(AxisCandidate {
                dir,
                face,
                hit_start: view.flatten_to_view(origin),
                hit_end: view.flatten_to_view(origin + dir),
                draw_start: origin - dir * AXIS_DRAW_LENGTH,
                draw_end: origin + dir * AXIS_DRAW_LENGTH,
            });
        }
    }
    out
}

/// Distance from a point to the infinite line through `a`-`b`.
fn distance_to_line(point: Vec3, a: Vec3, b: Vec3) -> f32 {
    let d = b - a;
    let len_sq = d.length_squared();
    if len_sq <= f32::EPSILON {
        return point.distance(a);
    }
    let t = (point - a).dot(d) / len_sq;
    point.distance(a + d * t)
}

/// The candidate whose view-plane line runs closest to the cursor.
///
/// When `restrict_face` is set (the session's last hovered face), only that
/// face's axes compete.
pub fn nearest_axis<'a>(
    candidates: &'a [AxisCandidate],
    view: &ViewContext,
    cursor: Vec2,
    restrict_face: Option<FaceId>,
) -> Option<&'a AxisCandidate> {
    let probe = view.viewport_point(cursor);
    candidates
        .iter()
        .filter(|c| restrict_face.is_none_or(|f| c.face == f))
        .min_by(|a, b| {
            distance_to_line(probe, a.hit_start, a.hit_end)
                .total_cmp(&distance_to_line(probe, b.hit_start, b.hit_end))
        })
}

/// Slide the cut endpoint along the active axis: the point of the axis line
/// closest to the mouse ray.
pub fn axis_point(axis: &AxisCandidate, view: &ViewContext, cursor: Vec2, origin: Vec3) -> Vec3 {
    let (ray_origin, ray_dir) = view.screen_ray(cursor);
    // Closest point of line (origin, dir) to line (ray_origin, ray_dir).
    let d = axis.dir;
    let r = ray_dir;
    let w = origin - ray_origin;
    let a = d.dot(d);
    let b = d.dot(r);
    let c = r.dot(r);
    let denom = a * c - b * b;
    if denom.abs() <= f32::EPSILON {
        return origin;
    }
    let t = (b * w.dot(r) - c * w.dot(d)) / denom;
    origin + d * t
}

/// Highlight data for the face framing the active axis.
pub fn highlight_for(mesh: &PolyMesh, vertex: VertexId, face: FaceId) -> Option<AxisHighlight> {
    let (prev, next) = wing_vertices(mesh, vertex, face)?;
    Some(AxisHighlight {
        face,
        edges: [MeshEdge::new(vertex, prev), MeshEdge::new(vertex, next)],
        endpoints: [mesh.position(prev), mesh.position(next)],
    })
}
