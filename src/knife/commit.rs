//! The cut committer: turn a resolved snap into actual mesh surgery.
//!
//! Commit order matters and is fixed: materialize the end anchor (edge split
//! or face insert), split edges broken by the anchors, project one polyline
//! per start anchor, weld, re-center, repair a lonely end vertex, restore
//! selection. Everything before the first mutation is validated so a
//! rejected cut leaves the mesh untouched.

use bevy::prelude::*;

use crate::error::KnifeError;
use crate::knife::geometry::{self, ViewContext};
use crate::knife::session::CutSession;
use crate::knife::snap::SnapMode;
use crate::mesh::{CutPolyline, MeshBvh, PolyMesh, VertexId};
use crate::mesh::project_cut::project_cut;
use crate::preferences::KnifePreferences;

/// Snap points closer than this (in pixels) to every start anchor make the
/// gesture a no-op.
const ZERO_LENGTH_PX: f32 = 1.0;
/// Sampling step for the post-cut selection walk.
const SELECT_STEP_PX: f32 = 4.0;
/// Circle-select radius for the selection walk.
const SELECT_RADIUS_PX: f32 = 2.0;

#[derive(Debug, Clone, PartialEq)]
pub enum CutOutcome {
    Committed { path_vertices: Vec<VertexId> },
    /// Start and end coincide on screen; nothing was mutated.
    ZeroLength,
}

/// Where the cut ends, after the end anchor has been materialized.
#[derive(Clone, Copy)]
enum EndAnchor {
    Vertex(VertexId),
    /// Altitude foot beyond the edge: the cut runs through the nearer edge
    /// endpoint and keeps going to the foot.
    Prolonged(VertexId, Vec3),
    /// Over empty space; no mesh vertex exists at the end.
    Point(Vec3),
}

/// Execute the cut described by `session` against `mesh`.
pub fn run_cut(
    mesh: &mut PolyMesh,
    view: &ViewContext,
    session: &CutSession,
    prefs: &KnifePreferences,
) -> Result<CutOutcome, KnifeError> {
    let Some(snap) = session.snap else {
        return Ok(CutOutcome::ZeroLength);
    };

    // Start anchors. A virtual start is already a real (floating) vertex.
    let mut starts: Vec<(VertexId, Vec3)> = session
        .start_verts
        .iter()
        .map(|&v| (v, mesh.position(v)))
        .collect();

    // Drop degenerate polylines before touching the mesh.
    starts.retain(|&(sv, sp)| {
        if let SnapMode::Vert { vertex } = snap.mode {
            if vertex == sv {
                return false;
            }
        }
        view.pixel_distance(sp, snap.point) > ZERO_LENGTH_PX
    });
    if starts.is_empty() {
        return Ok(CutOutcome::ZeroLength);
    }

    let first_new_vertex = mesh.verts.len() as VertexId;

    // Materialize the end anchor.
    let mut lonely_probe: Option<Vec3> = None;
    let end = match snap.mode {
        SnapMode::Vert { vertex } => EndAnchor::Vertex(vertex),
        SnapMode::Edge {
            edge,
            projected,
            split_ratio,
            prolong,
        } => {
            let (v, ..) = mesh.split_edge(edge, split_ratio);
            if prolong {
                EndAnchor::Prolonged(v, projected)
            } else {
                EndAnchor::Vertex(v)
            }
        }
        SnapMode::Face { face } => {
            lonely_probe = Some(mesh.face_normal(face));
            EndAnchor::Vertex(mesh.insert_vertex_on_face(face, snap.point, &[]))
        }
        SnapMode::Void => EndAnchor::Point(snap.point),
    };
    let end_vertex = match end {
        EndAnchor::Vertex(v) | EndAnchor::Prolonged(v, _) => Some(v),
        EndAnchor::Point(_) => None,
    };

    let mut path: Vec<VertexId> = Vec::new();

    // Anchors sitting exactly on a foreign edge split it now, so the
    // projection runs against attached topology; the split twins weld onto
    // the anchors afterwards.
    if prefs.use_edge_autofix {
        let mut anchors: Vec<VertexId> = starts.iter().map(|&(sv, _)| sv).collect();
        anchors.extend(end_vertex);
        path.extend(fix_broken_edges(mesh, &anchors, prefs.weld_distance));
    }

    // One polyline per start anchor, every vertex flattened onto the view
    // plane so the knife planes line up with what the user saw.
    let mut screen_walk: Vec<(Vec2, Vec2)> = Vec::new();
    for &(_, start_pos) in &starts {
        let mut pts = vec![view.flatten_to_view(start_pos)];
        match end {
            EndAnchor::Vertex(v) => pts.push(view.flatten_to_view(mesh.position(v))),
            EndAnchor::Prolonged(v, foot) => {
                pts.push(view.flatten_to_view(mesh.position(v)));
                pts.push(view.flatten_to_view(foot));
            }
            EndAnchor::Point(p) => pts.push(view.flatten_to_view(p)),
        }
        let polyline = CutPolyline::new(pts);
        screen_walk.extend(polyline.screen_segments(view));
        path.extend(project_cut(mesh, view, &polyline, session.toggles.cut_through));
    }

    let mut weld_set = path.clone();
    weld_set.sort_unstable();
    weld_set.dedup();
    mesh.weld_vertices(&weld_set, prefs.weld_distance);
    path.retain(|&v| mesh.is_vertex_alive(v));
    path.dedup();

    // The alternate center variant snaps the hover targets but leaves the
    // created cut vertices where the geometry put them.
    if session.toggles.snap_to_center && !session.toggles.alternate_center {
        recenter_new_vertices(mesh, &path, first_new_vertex);
    }

    // A face-mode end vertex that lost all its faces gets re-embedded.
    if let (Some(v), Some(normal)) = (end_vertex, lonely_probe) {
        if mesh.is_vertex_alive(v) && mesh.vertex_faces(v).is_empty() {
            let start_ids: Vec<VertexId> = starts.iter().map(|&(sv, _)| sv).collect();
            if let Some(repaired) = fix_lonely_vertex(mesh, v, normal, &start_ids)? {
                path.retain(|&p| p != v);
                path.push(repaired);
            }
        }
    }

    // Selection restore: the surviving path vertices plus a circle-select
    // walk along the drawn segments, which also picks up welded survivors.
    mesh.deselect_all();
    for &v in &path {
        mesh.set_selected(v, true);
    }
    for (a, b) in screen_walk {
        let steps = (a.distance(b) / SELECT_STEP_PX).ceil().max(1.0) as usize;
        for i in 0..=steps {
            let sample = a.lerp(b, i as f32 / steps as f32);
            mesh.select_near(view, sample, SELECT_RADIUS_PX, true);
        }
    }

    info!("knife: cut committed through {} path vertices", path.len());
    Ok(CutOutcome::Committed {
        path_vertices: path,
    })
}

/// Split every edge that passes through (but does not end at) an anchor
/// vertex. Returns the vertices the splits created; the caller welds them
/// onto the anchors they duplicate.
pub(crate) fn fix_broken_edges(
    mesh: &mut PolyMesh,
    anchors: &[VertexId],
    tolerance: f32,
) -> Vec<VertexId> {
    let mut created = Vec::new();
    for &pv in anchors {
        if !mesh.is_vertex_alive(pv) {
            continue;
        }
        let p = mesh.position(pv);
        for edge in mesh.edges() {
            if edge.contains(pv) {
                continue;
            }
            let a = mesh.position(edge.0);
            let b = mesh.position(edge.1);
            if !geometry::is_point_on_edge(p, a, b, tolerance) {
                continue;
            }
            let ratio = geometry::edge_split_ratio(a, b, p);
            let (v, ..) = mesh.split_edge(edge, ratio);
            if !edge.contains(v) {
                created.push(v);
            }
        }
    }
    created
}

/// Center-snap cuts park each created vertex midway between its two
/// neighbors that are not themselves on the cut path (the remains of the
/// edge it split).
fn recenter_new_vertices(mesh: &mut PolyMesh, path: &[VertexId], first_new_vertex: VertexId) {
    for &v in path {
        if v < first_new_vertex || !mesh.is_vertex_alive(v) {
            continue;
        }
        let off_path: Vec<VertexId> = mesh
            .vertex_edges(v)
            .iter()
            .map(|e| e.other(v))
            .filter(|n| !path.contains(n))
            .collect();
        if let [a, b] = off_path[..] {
            let mid = (mesh.position(a) + mesh.position(b)) * 0.5;
            mesh.set_position(v, mid);
        }
    }
}

/// Re-embed a face-mode end vertex that the cut left without any faces:
/// delete it, find the face under its position, and insert it again keeping
/// the edges toward the start vertices.
fn fix_lonely_vertex(
    mesh: &mut PolyMesh,
    lonely: VertexId,
    normal: Vec3,
    keep: &[VertexId],
) -> Result<Option<VertexId>, KnifeError> {
    let pos = mesh.position(lonely);
    mesh.delete_vertices(&[lonely]);

    let bvh = MeshBvh::build(mesh);
    let Some(hit) = bvh.cast_ray(mesh, pos + normal * 0.01, -normal)? else {
        warn!("knife: lonely end vertex had no face under it; dropping it");
        return Ok(None);
    };
    let v = mesh.insert_vertex_on_face(hit.face, pos, keep);
    mesh.set_selected(v, true);
    Ok(Some(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knife::session::StartKind;
    use crate::knife::snap::{self, SnapOptions, SnapResult};
    use crate::mesh::MeshEdge;
    use crate::mesh::fixtures::*;

    fn head_on_view() -> ViewContext {
        ViewContext::new(
            Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0),
            Mat4::from_translation(Vec3::new(0.5, 0.5, 5.0)),
            Vec2::new(600.0, 600.0),
            Mat4::IDENTITY,
        )
    }

    fn snap_at(mesh: &mut PolyMesh, view: &ViewContext, local: Vec3, opts: &SnapOptions) -> SnapResult {
        let bvh = MeshBvh::build(mesh);
        let cursor = view.project_to_screen(local).unwrap();
        snap::resolve(mesh, &bvh, view, cursor, opts).unwrap().0
    }

    #[test]
    fn vertex_to_edge_center_cut() {
        let mut m = quad();
        let view = head_on_view();
        let opts = SnapOptions {
            snap_to_center: true,
            ..Default::default()
        };
        let mut session = CutSession::new(vec![0], StartKind::Existing);
        session.toggles.snap_to_center = true;
        session.snap = Some(snap_at(&mut m, &view, Vec3::new(0.99, 0.4, 0.0), &opts));

        let outcome = run_cut(&mut m, &view, &session, &KnifePreferences::default()).unwrap();
        let CutOutcome::Committed { path_vertices } = outcome else {
            panic!("expected a committed cut");
        };
        assert_eq!(path_vertices.len(), 2);
        assert_eq!(m.face_count(), 2);
        assert_eq!(m.vertex_count(), 5);
        // The edge got split at its center and connected to the start.
        let new = *path_vertices.iter().find(|&&v| v != 0).unwrap();
        assert!(m.position(new).abs_diff_eq(Vec3::new(1.0, 0.5, 0.0), 1e-4));
        assert!(m.edges().contains(&MeshEdge::new(0, new)));
        assert!(m.is_selected(0) && m.is_selected(new));
    }

    #[test]
    fn snapping_the_start_vertex_is_zero_length() {
        let mut m = quad();
        let view = head_on_view();
        let mut session = CutSession::new(vec![0], StartKind::Existing);
        session.snap = Some(snap_at(&mut m, &view, Vec3::new(0.02, 0.02, 0.0), &SnapOptions::default()));

        let before = m.version();
        let outcome = run_cut(&mut m, &view, &session, &KnifePreferences::default()).unwrap();
        assert_eq!(outcome, CutOutcome::ZeroLength);
        assert_eq!(m.version(), before);
    }

    #[test]
    fn cut_ending_mid_face_embeds_a_vertex() {
        let mut m = quad();
        let view = head_on_view();
        let mut session = CutSession::new(vec![0], StartKind::Existing);
        session.snap = Some(snap_at(&mut m, &view, Vec3::new(0.6, 0.5, 0.0), &SnapOptions::default()));

        let CutOutcome::Committed { path_vertices } =
            run_cut(&mut m, &view, &session, &KnifePreferences::default()).unwrap()
        else {
            panic!("expected a committed cut");
        };
        let end = *path_vertices.iter().find(|&&v| v != 0).unwrap();
        assert!(m.position(end).abs_diff_eq(Vec3::new(0.6, 0.5, 0.0), 1e-4));
        assert!(m.edges().contains(&MeshEdge::new(0, end)));
        assert!(!m.vertex_faces(end).is_empty());
        assert!(m.is_selected(end));
    }

    #[test]
    fn void_cut_with_constraint_runs_along_the_axis() {
        let mut m = grid2x2();
        let view = ViewContext::new(
            Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0),
            Mat4::from_translation(Vec3::new(1.0, 1.0, 8.0)),
            Vec2::new(600.0, 600.0),
            Mat4::IDENTITY,
        );
        let mut session = CutSession::new(vec![4], StartKind::Existing);
        session.toggles.angle_constraint = true;
        // The resolver handed back the constrained axis point in void.
        session.snap = Some(SnapResult::void_at(Vec3::new(3.0, 3.0, 0.0)));

        let CutOutcome::Committed { path_vertices } =
            run_cut(&mut m, &view, &session, &KnifePreferences::default()).unwrap()
        else {
            panic!("expected a committed cut");
        };
        // The diagonal of the upper-right quad already has vertices at both
        // ends, so the cut only divides that face.
        assert_eq!(path_vertices, vec![4, 8]);
        assert_eq!(m.face_count(), 5);
        assert_eq!(m.vertex_count(), 9);
    }

    #[test]
    fn multi_start_cuts_fan_to_one_end() {
        let mut m = quad();
        let view = head_on_view();
        let opts = SnapOptions::default();
        let mut session = CutSession::new(vec![0, 1], StartKind::Existing);
        session.snap = Some(snap_at(&mut m, &view, Vec3::new(0.5, 0.99, 0.0), &opts));
        match session.snap.unwrap().mode {
            SnapMode::Edge { edge, .. } => assert_eq!(edge, MeshEdge::new(2, 3)),
            other => panic!("expected edge snap, got {other:?}"),
        }

        let CutOutcome::Committed { path_vertices } =
            run_cut(&mut m, &view, &session, &KnifePreferences::default()).unwrap()
        else {
            panic!("expected a committed cut");
        };
        assert_eq!(m.face_count(), 3);
        assert_eq!(m.vertex_count(), 5);
        let end = *path_vertices.iter().find(|&&v| v > 3).unwrap();
        assert!(m.edges().contains(&MeshEdge::new(0, end)));
        assert!(m.edges().contains(&MeshEdge::new(1, end)));
        for v in [0, 1, end] {
            assert!(m.is_selected(v));
        }
    }

    #[test]
    fn alternate_center_skips_the_recenter_pass() {
        let view = head_on_view();
        // End snap off-center on the right edge while center mode is on.
        let snap = SnapResult {
            mode: SnapMode::Edge {
                edge: MeshEdge::new(1, 2),
                projected: Vec3::new(1.0, 0.3, 0.0),
                split_ratio: 0.3,
                prolong: false,
            },
            point: Vec3::new(1.0, 0.3, 0.0),
            vertex_px: 50.0,
            edge_px: 5.0,
        };
        let end_position = |alternate: bool| {
            let mut m = quad();
            let mut session = CutSession::new(vec![0], StartKind::Existing);
            session.toggles.snap_to_center = true;
            session.toggles.alternate_center = alternate;
            session.snap = Some(snap);
            let CutOutcome::Committed { path_vertices } =
                run_cut(&mut m, &view, &session, &KnifePreferences::default()).unwrap()
            else {
                panic!("expected a committed cut");
            };
            let end = *path_vertices.iter().find(|&&v| v != 0).unwrap();
            m.position(end)
        };
        // Full center mode parks the split vertex midway along the old edge.
        assert!(end_position(false).abs_diff_eq(Vec3::new(1.0, 0.5, 0.0), 1e-4));
        // The alternate variant leaves it at the split ratio.
        assert!(end_position(true).abs_diff_eq(Vec3::new(1.0, 0.3, 0.0), 1e-4));
    }

    #[test]
    fn start_on_a_foreign_edge_is_attached_before_projecting() {
        let mut m = two_quads();
        let view = ViewContext::new(
            Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0),
            Mat4::from_translation(Vec3::new(1.0, 0.5, 6.0)),
            Vec2::new(600.0, 600.0),
            Mat4::IDENTITY,
        );
        // A floating start vertex sitting exactly on the shared edge.
        let stray = m.add_vertex(Vec3::new(1.0, 0.5, 0.0));
        let mut session = CutSession::new(vec![stray], StartKind::Existing);
        session.snap = Some(snap_at(&mut m, &view, Vec3::new(1.6, 0.5, 0.0), &SnapOptions::default()));

        let CutOutcome::Committed { path_vertices } =
            run_cut(&mut m, &view, &session, &KnifePreferences::default()).unwrap()
        else {
            panic!("expected a committed cut");
        };
        // The shared edge got split under the stray and welded onto it; the
        // survivor is attached to both quads.
        let survivor = *path_vertices
            .iter()
            .find(|&&v| m.position(v).abs_diff_eq(Vec3::new(1.0, 0.5, 0.0), 1e-4))
            .unwrap();
        assert!(m.vertex_faces(survivor).len() >= 2);
        assert!(m.is_selected(survivor));
        // The mid-face end vertex is embedded and selected too.
        let end = *path_vertices
            .iter()
            .find(|&&v| m.position(v).abs_diff_eq(Vec3::new(1.6, 0.5, 0.0), 1e-4))
            .unwrap();
        assert!(!m.vertex_faces(end).is_empty());
        assert!(m.is_selected(end));
    }

    #[test]
    fn broken_edges_get_split_and_welded() {
        let mut m = two_quads();
        // A stray vertex sitting exactly on the shared edge.
        let stray = m.add_vertex(Vec3::new(1.0, 0.5, 0.0));
        let created = fix_broken_edges(&mut m, &[stray], 1e-3);
        assert_eq!(created.len(), 1);
        m.weld_vertices(&[stray, created[0]], 1e-3);

        let survivor = if m.is_vertex_alive(stray) { stray } else { created[0] };
        // Both quads now carry the survivor in their rings.
        for f in m.face_ids() {
            assert!(m.face_verts(f).contains(&survivor));
        }
    }

    #[test]
    fn altitude_prolong_cuts_through_the_endpoint() {
        let mut m = quad();
        let view = head_on_view();
        // Altitude from a point past the right end of the bottom edge.
        let opts = SnapOptions {
            altitude_from: Some(Vec3::new(1.4, 0.9, 0.0)),
            ..Default::default()
        };
        // Start at the top-right corner region; build a real start first.
        let (start, ..) = m.split_edge(MeshEdge::new(2, 3), 0.6);
        m.set_position(start, Vec3::new(1.4, 0.9, 0.0));
        let snap = snap_at(&mut m, &view, Vec3::new(0.5, 0.01, 0.0), &opts);
        match snap.mode {
            SnapMode::Edge { prolong, split_ratio, .. } => {
                assert!(prolong);
                assert_eq!(split_ratio, 1.0);
            }
            other => panic!("expected prolonged edge snap, got {other:?}"),
        }

        let mut session = CutSession::new(vec![start], StartKind::Existing);
        session.snap = Some(snap);
        let CutOutcome::Committed { path_vertices } =
            run_cut(&mut m, &view, &session, &KnifePreferences::default()).unwrap()
        else {
            panic!("expected a committed cut");
        };
        // The clamped split reuses vertex 1; the cut runs start -> corner.
        assert!(path_vertices.contains(&1));
        assert!(path_vertices.contains(&start));
        assert!(m.edges().contains(&MeshEdge::new(1, start)));
    }
}
