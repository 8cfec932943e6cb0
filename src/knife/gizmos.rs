//! Preview drawing for the knife.
//!
//! The resolver side builds a [`PreviewBatch`] (a plain description of what
//! to show); the draw system replays it with `Gizmos` every frame. Faces are
//! drawn first, then lines, then points, so markers always read on top of
//! the geometry they annotate.

use bevy::prelude::*;

use crate::knife::axis::{AxisCandidate, AxisHighlight};
use crate::knife::session::CutSession;
use crate::knife::snap::SnapMode;
use crate::mesh::PolyMesh;
use crate::preferences::{KnifeColors, KnifePreferences};

/// Size of the hand-drawn vertex cross, in mesh-local units.
const POINT_CROSS_SIZE: f32 = 0.04;

/// One frame of knife preview, in mesh-local space.
#[derive(Debug, Clone, Default)]
pub struct PreviewBatch {
    /// Face outlines (closed rings).
    pub faces: Vec<(Vec<Vec3>, Color)>,
    pub lines: Vec<(Vec3, Vec3, Color)>,
    pub points: Vec<(Vec3, Color)>,
}

impl PreviewBatch {
    fn face_ring(&mut self, mesh: &PolyMesh, face: crate::mesh::FaceId, color: Color) {
        let ring: Vec<Vec3> = mesh
            .face_verts(face)
            .iter()
            .map(|&v| mesh.position(v))
            .collect();
        self.faces.push((ring, color));
    }
}

/// Describe the current session state as a draw batch.
pub fn build_preview(
    mesh: &PolyMesh,
    session: &CutSession,
    prefs: &KnifePreferences,
    active_axis: Option<&AxisCandidate>,
    highlight: Option<&AxisHighlight>,
) -> PreviewBatch {
    let colors = &prefs.colors;
    let mut batch = PreviewBatch::default();

    let start_points: Vec<Vec3> = session
        .start_verts
        .iter()
        .map(|&v| mesh.position(v))
        .collect();

    let Some(snap) = session.snap else {
        for &p in &start_points {
            batch.points.push((p, KnifeColors::color(colors.vertex)));
        }
        return batch;
    };

    // Hovered geometry, underneath everything else.
    match snap.mode {
        SnapMode::Face { face } => {
            batch.face_ring(mesh, face, KnifeColors::color(colors.face));
        }
        SnapMode::Edge { edge, .. } => {
            batch.lines.push((
                mesh.position(edge.0),
                mesh.position(edge.1),
                KnifeColors::color(colors.snapped_edge),
            ));
        }
        _ => {}
    }

    // Angle-constraint overlay.
    if session.toggles.angle_constraint {
        if let Some(h) = highlight {
            batch.face_ring(mesh, h.face, KnifeColors::color(colors.active_constraint_face));
        }
        for axis in &session.axes {
            let active = active_axis.is_some_and(|a| std::ptr::eq(a, axis));
            if session.last_hit_face.is_some() && Some(axis.face) != session.last_hit_face {
                continue;
            }
            let mut color = KnifeColors::color(colors.constraint_axis);
            if !active {
                color = color.with_alpha(0.25);
            }
            batch.lines.push((axis.draw_start, axis.draw_end, color));
        }
    }

    // The rubber band from every start anchor to the snap point.
    for &p in &start_points {
        batch
            .lines
            .push((p, snap.point, KnifeColors::color(colors.cutting_edge)));
        batch.points.push((p, KnifeColors::color(colors.vertex)));
    }

    let snap_color = match snap.mode {
        SnapMode::Vert { .. } => KnifeColors::color(colors.snapped_vertex),
        SnapMode::Edge { .. } => KnifeColors::color(colors.snapped_edge),
        _ => KnifeColors::color(colors.vertex),
    };
    batch.points.push((snap.point, snap_color));

    batch
}

/// Replay the current batch. Runs every frame while a session is live.
pub fn draw_preview(
    tool: Res<crate::knife::KnifeTool>,
    transforms: Query<&GlobalTransform>,
    mut gizmos: Gizmos,
) {
    let Some(batch) = &tool.preview else {
        return;
    };
    let world_from_local = tool
        .target
        .and_then(|e| transforms.get(e).ok())
        .map(|t| t.affine())
        .unwrap_or_default();
    let tp = |p: Vec3| world_from_local.transform_point3(p);

    for (ring, color) in &batch.faces {
        if ring.len() < 2 {
            continue;
        }
        let mut pts: Vec<Vec3> = ring.iter().map(|&p| tp(p)).collect();
        pts.push(pts[0]);
        gizmos.linestrip(pts, *color);
    }
    for (a, b, color) in &batch.lines {
        gizmos.line(tp(*a), tp(*b), *color);
    }
    for (p, color) in &batch.points {
        let p = tp(*p);
        let s = POINT_CROSS_SIZE;
        gizmos.line(p - Vec3::X * s, p + Vec3::X * s, *color);
        gizmos.line(p - Vec3::Y * s, p + Vec3::Y * s, *color);
        gizmos.line(p - Vec3::Z * s, p + Vec3::Z * s, *color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knife::session::StartKind;
    use crate::knife::snap::SnapResult;
    use crate::mesh::fixtures::*;

    #[test]
    fn face_snap_outlines_the_face() {
        let m = quad();
        let mut session = CutSession::new(vec![0], StartKind::Existing);
        session.snap = Some(SnapResult {
            mode: SnapMode::Face { face: 0 },
            point: Vec3::new(0.5, 0.5, 0.0),
            vertex_px: 100.0,
            edge_px: 100.0,
        });
        let batch = build_preview(&m, &session, &KnifePreferences::default(), None, None);
        assert_eq!(batch.faces.len(), 1);
        assert_eq!(batch.faces[0].0.len(), 4);
        // Rubber band plus the snap point marker and the start marker.
        assert_eq!(batch.lines.len(), 1);
        assert_eq!(batch.points.len(), 2);
    }

    #[test]
    fn void_snap_still_shows_the_rubber_band() {
        let m = quad();
        let mut session = CutSession::new(vec![0], StartKind::Existing);
        session.snap = Some(SnapResult::void_at(Vec3::new(3.0, 3.0, 0.0)));
        let batch = build_preview(&m, &session, &KnifePreferences::default(), None, None);
        assert!(batch.faces.is_empty());
        assert_eq!(batch.lines.len(), 1);
    }
}
