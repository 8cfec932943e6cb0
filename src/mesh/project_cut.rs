//! Projection of a camera-space polyline onto the mesh surface.
//!
//! Each polyline segment, together with the camera, spans a knife plane.
//! Edges crossing the plane inside the segment's screen span get split;
//! faces that end up holding two non-adjacent on-path vertices get divided
//! along them. This is the geometric core of the cut commit.

use bevy::prelude::*;

use super::{MeshEdge, PolyMesh, VertexId};
use crate::knife::geometry::ViewContext;

/// A cut gesture as view-plane points in mesh-local space.
///
/// Vertices are the flattened images of the gesture's anchor points (real
/// mesh vertices, snap points, or void points one unit down the mouse ray),
/// so every anchor lies on the knife plane of its segments by construction.
#[derive(Debug, Clone, Default)]
pub struct CutPolyline {
    pub verts: Vec<Vec3>,
}

impl CutPolyline {
    pub fn new(verts: Vec<Vec3>) -> Self {
        CutPolyline { verts }
    }

    /// The segments as screen-space endpoint pairs, for walking with
    /// circle selection after the cut.
    pub fn screen_segments(&self, view: &ViewContext) -> Vec<(Vec2, Vec2)> {
        self.verts
            .windows(2)
            .filter_map(|w| {
                let a = view.project_to_screen(w[0])?;
                let b = view.project_to_screen(w[1])?;
                Some((a, b))
            })
            .collect()
    }
}

/// Screen-parameter slack at segment ends. Crossings marginally outside the
/// drawn span still belong to the cut.
const SPAN_SLACK: f32 = 0.01;

/// Cut the mesh along `polyline` as seen from `view`.
///
/// `cut_through = false` restricts splitting to camera-facing geometry;
/// `true` pierces backfaces as well. Returns the vertices lying on the cut
/// path, ordered along the gesture.
pub fn project_cut(
    mesh: &mut PolyMesh,
    view: &ViewContext,
    polyline: &CutPolyline,
    cut_through: bool,
) -> Vec<VertexId> {
    // Gesture-order parameter per path vertex: segment index + screen t.
    let mut path_t: std::collections::HashMap<VertexId, f32> = default();

    for (seg, w) in polyline.verts.windows(2).enumerate() {
        let (p0, p1) = (w[0], w[1]);
        let (Some(s0), Some(s1)) = (view.project_to_screen(p0), view.project_to_screen(p1))
        else {
            continue;
        };
        let span = s1 - s0;
        let span_len_sq = span.length_squared();
        if span_len_sq <= f32::EPSILON {
            continue;
        }

        let Some(plane) = knife_plane(view, p0, p1) else {
            continue;
        };

        let screen_t = |point: Vec3| -> Option<f32> {
            let px = view.project_to_screen(point)?;
            Some((px - s0).dot(span) / span_len_sq)
        };
        let in_span = |t: f32| (-SPAN_SLACK..=1.0 + SPAN_SLACK).contains(&t);

        // Existing vertices already sitting on the knife plane join the path.
        let vert_ids: Vec<VertexId> = mesh.vertex_ids().collect();
        for v in vert_ids {
            let p = mesh.position(v);
            if plane.signed(p).abs() > plane_tolerance(view, p) {
                continue;
            }
            if let Some(t) = screen_t(p) {
                if in_span(t) {
                    path_t.entry(v).or_insert(seg as f32 + t);
                }
            }
        }

        // Split every edge the plane crosses inside the segment span.
        for edge in mesh.edges() {
            if !cut_through && !edge_front_facing(mesh, view, edge) {
                continue;
            }
            let pa = mesh.position(edge.0);
            let pb = mesh.position(edge.1);
            let da = plane.signed(pa);
            let db = plane.signed(pb);
            let ta = plane_tolerance(view, pa);
            let tb = plane_tolerance(view, pb);
            if !((da > ta && db < -tb) || (da < -ta && db > tb)) {
                continue;
            }
            let ratio = da / (da - db);
            let crossing = pa.lerp(pb, ratio);
            let Some(t) = screen_t(crossing) else {
                continue;
            };
            if !in_span(t) {
                continue;
            }
            let (v, ..) = mesh.split_edge(edge, ratio);
            path_t.insert(v, seg as f32 + t);
        }
    }

    // Divide faces that now hold two non-adjacent path vertices.
    let mut work: Vec<_> = mesh.face_ids().collect();
    while let Some(f) = work.pop() {
        if !mesh.is_face_alive(f) {
            continue;
        }
        if !cut_through && !face_front_facing(mesh, view, f) {
            continue;
        }
        let ring = mesh.face_verts(f).to_vec();
        let n = ring.len();
        let mut on_path: Vec<(f32, usize)> = ring
            .iter()
            .enumerate()
            .filter_map(|(i, v)| path_t.get(v).map(|&t| (t, i)))
            .collect();
        if on_path.len() < 2 {
            continue;
        }
        on_path.sort_by(|a, b| a.0.total_cmp(&b.0));

        for pair in on_path.windows(2) {
            let (ia, ib) = (pair[0].1, pair[1].1);
            let adjacent = (ia + 1) % n == ib || (ib + 1) % n == ia;
            if adjacent {
                continue;
            }
            if let Some((f1, f2)) = mesh.split_face(f, ring[ia], ring[ib]) {
                work.push(f1);
                work.push(f2);
            }
            break;
        }
    }

    let mut path: Vec<(f32, VertexId)> = path_t.into_iter().map(|(v, t)| (t, v)).collect();
    path.sort_by(|a, b| a.0.total_cmp(&b.0));
    path.into_iter().map(|(_, v)| v).collect()
}

struct Plane {
    normal: Vec3,
    d: f32,
}

impl Plane {
    fn signed(&self, p: Vec3) -> f32 {
        self.normal.dot(p) + self.d
    }
}

/// The plane spanned by a polyline segment and the camera: through the eye
/// for perspective views, containing the view direction for orthographic
/// ones. Every point whose screen image falls on the segment's screen line
/// lies on this plane.
fn knife_plane(view: &ViewContext, p0: Vec3, p1: Vec3) -> Option<Plane> {
    let normal = if view.orthographic {
        (p1 - p0).cross(view.forward)
    } else {
        (p0 - view.eye).cross(p1 - view.eye)
    };
    let normal = normal.try_normalize()?;
    Some(Plane {
        normal,
        d: -normal.dot(p0),
    })
}

/// Plane-membership tolerance, scaled by distance from the camera so screen
/// precision stays roughly constant across depth.
fn plane_tolerance(view: &ViewContext, p: Vec3) -> f32 {
    if view.orthographic {
        1e-4
    } else {
        1e-4 * (p - view.eye).length().max(1.0)
    }
}

fn face_front_facing(mesh: &PolyMesh, view: &ViewContext, f: super::FaceId) -> bool {
    let to_eye = if view.orthographic {
        -view.forward
    } else {
        (view.eye - mesh.face_center(f)).normalize_or_zero()
    };
    mesh.face_normal(f).dot(to_eye) > 0.0
}

fn edge_front_facing(mesh: &PolyMesh, view: &ViewContext, edge: MeshEdge) -> bool {
    mesh.edge_faces(edge)
        .into_iter()
        .any(|f| face_front_facing(mesh, view, f))
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use super::*;

    fn head_on_view() -> ViewContext {
        ViewContext::new(
            Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0),
            Mat4::from_translation(Vec3::new(0.5, 0.5, 5.0)),
            Vec2::new(600.0, 600.0),
            Mat4::IDENTITY,
        )
    }

    #[test]
    fn horizontal_cut_splits_quad_in_two() {
        let mut m = quad();
        let view = head_on_view();
        let polyline = CutPolyline::new(vec![
            view.flatten_to_view(Vec3::new(0.0, 0.5, 0.0)),
            view.flatten_to_view(Vec3::new(1.0, 0.5, 0.0)),
        ]);
        let path = project_cut(&mut m, &view, &polyline, false);
        assert_eq!(path.len(), 2);
        assert_eq!(m.vertex_count(), 6);
        assert_eq!(m.face_count(), 2);
        for &v in &path {
            assert!((m.position(v).y - 0.5).abs() < 1e-3);
        }
        // Path vertices run in gesture order, left to right.
        assert!(m.position(path[0]).x < m.position(path[1]).x);
    }

    #[test]
    fn vertex_to_vertex_cut_adds_no_vertices() {
        let mut m = quad();
        let view = head_on_view();
        let polyline = CutPolyline::new(vec![
            view.flatten_to_view(m.position(0)),
            view.flatten_to_view(m.position(2)),
        ]);
        let path = project_cut(&mut m, &view, &polyline, false);
        assert_eq!(path, vec![0, 2]);
        assert_eq!(m.vertex_count(), 4);
        assert_eq!(m.face_count(), 2);
    }

    #[test]
    fn cut_spanning_two_faces() {
        let mut m = two_quads();
        let view = ViewContext::new(
            Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0),
            Mat4::from_translation(Vec3::new(1.0, 0.5, 6.0)),
            Vec2::new(600.0, 600.0),
            Mat4::IDENTITY,
        );
        let polyline = CutPolyline::new(vec![
            view.flatten_to_view(Vec3::new(0.0, 0.5, 0.0)),
            view.flatten_to_view(Vec3::new(2.0, 0.5, 0.0)),
        ]);
        let path = project_cut(&mut m, &view, &polyline, false);
        // Boundary, shared edge and far boundary all get split.
        assert_eq!(path.len(), 3);
        assert_eq!(m.face_count(), 4);
    }

    #[test]
    fn cut_through_pierces_backfaces() {
        // Front quad at z=1 facing the camera, back quad at z=0 facing away.
        let mut m = PolyMesh::new();
        for z in [1.0f32, 0.0] {
            let base = m.vertex_count() as u32;
            m.add_vertex(Vec3::new(0.0, 0.0, z));
            m.add_vertex(Vec3::new(1.0, 0.0, z));
            m.add_vertex(Vec3::new(1.0, 1.0, z));
            m.add_vertex(Vec3::new(0.0, 1.0, z));
            if z > 0.5 {
                m.add_face(vec![base, base + 1, base + 2, base + 3]);
            } else {
                m.add_face(vec![base + 3, base + 2, base + 1, base]);
            }
        }
        let view = head_on_view();
        let polyline = CutPolyline::new(vec![
            view.flatten_to_view(Vec3::new(0.0, 0.5, 1.0)),
            view.flatten_to_view(Vec3::new(1.0, 0.5, 1.0)),
        ]);

        let mut shallow = m.clone();
        project_cut(&mut shallow, &view, &polyline, false);
        assert_eq!(shallow.face_count(), 3);

        project_cut(&mut m, &view, &polyline, true);
        assert_eq!(m.face_count(), 4);
    }
}
