//! The half-knife tool: plugin, tool resource, and the session lifecycle.
//!
//! One gesture at a time: `begin` sets up a [`CutSession`] from the current
//! selection (or creates a start anchor under the cursor), `refresh` keeps
//! the snap and preview current, `commit`/`cancel` end it. The tool owns an
//! editing kernel copy of the target mesh and flushes it back to the Bevy
//! mesh asset after every committed mutation.

use bevy::prelude::*;

pub mod axis;
pub mod commit;
pub mod geometry;
pub mod gizmos;
pub mod input;
pub mod session;
pub mod snap;

use crate::error::KnifeError;
use crate::knife::commit::CutOutcome;
use crate::knife::geometry::ViewContext;
use crate::knife::gizmos::{PreviewBatch, build_preview};
use crate::knife::session::{CutSession, StartKind};
use crate::knife::snap::{SnapMode, SnapOptions};
use crate::mesh::{MeshBvh, PolyMesh};
use crate::preferences::KnifePreferences;

/// Upper bound on pre-selected start vertices for one gesture.
pub const MAX_START_VERTS: usize = 10;

/// Marks the mesh entity the knife may edit.
#[derive(Component)]
pub struct KnifeTarget;

/// The knife's state between and during gestures.
#[derive(Resource, Default)]
pub struct KnifeTool {
    pub target: Option<Entity>,
    /// Editing kernel copy of the target mesh. Owns vertex selection.
    pub mesh: Option<PolyMesh>,
    pub bvh: Option<MeshBvh>,
    pub session: Option<CutSession>,
    /// Snapshot taken at session start; cancel restores it.
    pristine: Option<PolyMesh>,
    pub preview: Option<PreviewBatch>,
}

pub struct KnifePlugin;

impl Plugin for KnifePlugin {
    fn build(&self, app: &mut App) {
        let prefs = KnifePreferences::load();
        app.insert_resource(prefs)
            .init_resource::<KnifeTool>()
            .add_systems(Update, (input::knife_input, gizmos::draw_preview).chain());
    }
}

impl KnifeTool {
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    fn snap_options(&self, prefs: &KnifePreferences) -> SnapOptions {
        SnapOptions {
            vertex_radius_px: prefs.snap_vertex_distance,
            edge_radius_px: prefs.snap_edge_distance,
            ..Default::default()
        }
    }

    /// Start a gesture. Uses the current vertex selection as start anchors;
    /// with nothing selected, creates one from whatever is under the cursor.
    ///
    /// Returns whether the kernel mesh changed (and needs a flush). With
    /// `auto_cut` enabled the gesture resolves and commits in one step
    /// without entering the interactive loop, virtual starts included.
    pub fn begin(
        &mut self,
        view: &ViewContext,
        cursor: Vec2,
        prefs: &KnifePreferences,
    ) -> Result<bool, KnifeError> {
        let opts = self.snap_options(prefs);
        let (Some(mesh), Some(bvh)) = (self.mesh.as_mut(), self.bvh.as_ref()) else {
            return Err(KnifeError::NoTarget);
        };

        let selected = mesh.selected_vertices();
        if selected.len() > MAX_START_VERTS {
            return Err(KnifeError::TooManySelected {
                count: selected.len(),
                max: MAX_START_VERTS,
            });
        }

        self.pristine = Some(mesh.clone());
        let mut changed = false;

        let session = if !selected.is_empty() {
            CutSession::new(selected, StartKind::Existing)
        } else {
            // Derive the start anchor from the snap under the cursor.
            let (start_snap, _) = snap::resolve(mesh, bvh, view, cursor, &opts)?;
            match start_snap.mode {
                SnapMode::Vert { vertex } => CutSession::new(vec![vertex], StartKind::Existing),
                SnapMode::Edge {
                    edge, split_ratio, ..
                } => {
                    let centered = mesh.edge_midpoint(edge);
                    let (v, ..) = mesh.split_edge(edge, split_ratio);
                    changed = true;
                    CutSession::new(
                        vec![v],
                        StartKind::Created {
                            initial: start_snap.point,
                            centered,
                        },
                    )
                }
                SnapMode::Face { face } => {
                    let centered = mesh.face_center(face);
                    let v = mesh.insert_vertex_on_face(face, start_snap.point, &[]);
                    changed = true;
                    CutSession::new(
                        vec![v],
                        StartKind::Created {
                            initial: start_snap.point,
                            centered,
                        },
                    )
                }
                SnapMode::Void => {
                    // A virtual start is real topology from the moment of
                    // creation: a free-floating vertex on the mouse ray.
                    let v = mesh.add_vertex(start_snap.point);
                    changed = true;
                    CutSession::virtual_from(v)
                }
            }
        };

        if changed {
            self.bvh = Some(MeshBvh::build(mesh));
        }
        self.session = Some(session);
        self.rebuild_axes(view);

        if prefs.auto_cut {
            self.refresh(view, cursor, prefs)?;
            let committed = self.commit(view, prefs)?;
            return Ok(changed || committed);
        }

        self.refresh(view, cursor, prefs)?;
        Ok(changed)
    }

    /// Re-resolve the snap under the cursor and rebuild the preview batch.
    pub fn refresh(
        &mut self,
        view: &ViewContext,
        cursor: Vec2,
        prefs: &KnifePreferences,
    ) -> Result<(), KnifeError> {
        let mut opts = self.snap_options(prefs);
        let (Some(mesh), Some(bvh), Some(session)) =
            (self.mesh.as_mut(), self.bvh.as_ref(), self.session.as_mut())
        else {
            return Ok(());
        };

        opts.snapping = session.toggles.snapping;
        opts.snap_to_center = session.toggles.snap_to_center;

        let single_start = session.start_verts.len() == 1;
        let start_pos = session.start_verts.first().map(|&v| mesh.position(v));
        if session.toggles.altitude && single_start {
            opts.altitude_from = start_pos;
        }

        let constrained = session.toggles.angle_constraint && single_start;
        let mut active_axis = None;
        if constrained {
            if let (Some(a), Some(origin)) = (
                axis::nearest_axis(&session.axes, view, cursor, session.last_hit_face),
                start_pos,
            ) {
                opts.axis_point = Some(axis::axis_point(a, view, cursor, origin));
                active_axis = session.axes.iter().position(|c| std::ptr::eq(c, a));
            }
        }

        let (resolved, hit_face) = snap::resolve(mesh, bvh, view, cursor, &opts)?;
        session.snap = Some(resolved);
        if let Some(f) = hit_face {
            // Under a constraint, only faces with axes can take over.
            if !constrained || session.axes.iter().any(|a| a.face == f) {
                session.last_hit_face = Some(f);
            }
        }

        let active = active_axis.map(|i| &session.axes[i]);
        let highlight = match (constrained, session.last_hit_face, session.start_verts.first()) {
            (true, Some(f), Some(&v)) => axis::highlight_for(mesh, v, f),
            _ => None,
        };
        self.preview = Some(build_preview(mesh, session, prefs, active, highlight.as_ref()));
        Ok(())
    }

    /// Rebuild the axis family around a single-vertex start.
    pub fn rebuild_axes(&mut self, view: &ViewContext) {
        let (Some(mesh), Some(session)) = (self.mesh.as_ref(), self.session.as_mut()) else {
            return;
        };
        if let [v] = session.start_verts[..] {
            session.axes = axis::update_axes(mesh, view, v, mesh.position(v));
        }
    }

    /// Slide a gesture-created start vertex to `to` (center snap toggle).
    pub fn reposition_start(&mut self, to: Vec3, view: &ViewContext) {
        let (Some(mesh), Some(session)) = (self.mesh.as_mut(), self.session.as_ref()) else {
            return;
        };
        if let [v] = session.start_verts[..] {
            mesh.set_position(v, to);
            self.bvh = Some(MeshBvh::build(mesh));
            self.rebuild_axes(view);
        }
    }

    /// Commit the live gesture. Returns whether the kernel mesh changed.
    pub fn commit(
        &mut self,
        view: &ViewContext,
        prefs: &KnifePreferences,
    ) -> Result<bool, KnifeError> {
        let Some(session) = self.session.take() else {
            return Ok(false);
        };
        self.preview = None;
        self.pristine = None;
        let Some(mesh) = self.mesh.as_mut() else {
            return Err(KnifeError::NoTarget);
        };

        let outcome = commit::run_cut(mesh, view, &session, prefs);
        self.bvh = self.mesh.as_ref().map(MeshBvh::build);
        match outcome? {
            CutOutcome::Committed { .. } => Ok(true),
            CutOutcome::ZeroLength => {
                info!("knife: zero-length cut skipped");
                Ok(false)
            }
        }
    }

    /// Abort the live gesture and restore the pre-gesture mesh.
    /// Returns whether the kernel mesh changed (it did if the gesture had
    /// created a start vertex).
    pub fn cancel(&mut self) -> bool {
        self.session = None;
        self.preview = None;
        if let Some(pristine) = self.pristine.take() {
            self.bvh = Some(MeshBvh::build(&pristine));
            self.mesh = Some(pristine);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::*;

    fn tool_with(mesh: PolyMesh) -> KnifeTool {
        let bvh = MeshBvh::build(&mesh);
        KnifeTool {
            target: None,
            mesh: Some(mesh),
            bvh: Some(bvh),
            session: None,
            pristine: None,
            preview: None,
        }
    }

    fn head_on_view() -> ViewContext {
        ViewContext::new(
            Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0),
            Mat4::from_translation(Vec3::new(0.5, 0.5, 5.0)),
            Vec2::new(600.0, 600.0),
            Mat4::IDENTITY,
        )
    }

    /// A 6x1 strip of quads: 14 vertices, plenty to over-select.
    fn strip() -> PolyMesh {
        let mut m = PolyMesh::new();
        for x in 0..7 {
            m.add_vertex(Vec3::new(x as f32, 0.0, 0.0));
            m.add_vertex(Vec3::new(x as f32, 1.0, 0.0));
        }
        for x in 0..6u32 {
            let b = x * 2;
            m.add_face(vec![b, b + 2, b + 3, b + 1]);
        }
        m
    }

    #[test]
    fn over_selection_is_rejected_before_any_mutation() {
        let mut m = strip();
        for v in 0..11 {
            m.set_selected(v, true);
        }
        let version = m.version();
        let mut tool = tool_with(m);
        let view = head_on_view();
        let err = tool
            .begin(&view, Vec2::new(300.0, 300.0), &KnifePreferences::default())
            .unwrap_err();
        assert!(matches!(
            err,
            KnifeError::TooManySelected { count: 11, max: 10 }
        ));
        assert_eq!(tool.mesh.as_ref().unwrap().version(), version);
        assert!(tool.session.is_none());
    }

    #[test]
    fn begin_over_an_edge_creates_a_start_vertex() {
        let mut tool = tool_with(quad());
        let view = head_on_view();
        let cursor = view
            .project_to_screen(Vec3::new(0.7, 0.01, 0.0))
            .unwrap();
        let changed = tool
            .begin(&view, cursor, &KnifePreferences::default())
            .unwrap();
        assert!(changed);
        let session = tool.session.as_ref().unwrap();
        assert_eq!(session.start_verts.len(), 1);
        assert!(matches!(session.start_kind, StartKind::Created { .. }));
        let mesh = tool.mesh.as_ref().unwrap();
        let v = session.start_verts[0];
        assert!(mesh.position(v).abs_diff_eq(Vec3::new(0.7, 0.0, 0.0), 1e-3));
        // Three axes from the single adjacent face region.
        assert!(!session.axes.is_empty());
    }

    #[test]
    fn begin_over_void_creates_a_floating_start_vertex() {
        let mut tool = tool_with(quad());
        let view = head_on_view();
        let cursor = Vec2::new(590.0, 10.0);
        let changed = tool
            .begin(&view, cursor, &KnifePreferences::default())
            .unwrap();
        assert!(changed);
        let session = tool.session.as_ref().unwrap();
        assert!(session.is_virtual());
        let [v] = session.start_verts[..] else {
            panic!("expected a single virtual start vertex");
        };
        let mesh = tool.mesh.as_ref().unwrap();
        assert_eq!(mesh.vertex_count(), 5);
        // Real topology from the moment of creation, but unattached.
        assert!(mesh.vertex_faces(v).is_empty());
        assert!(mesh.position(v).abs_diff_eq(view.viewport_point(cursor), 1e-5));
    }

    #[test]
    fn cancel_restores_the_pre_gesture_mesh() {
        let mut tool = tool_with(quad());
        let view = head_on_view();
        let cursor = view
            .project_to_screen(Vec3::new(0.7, 0.01, 0.0))
            .unwrap();
        tool.begin(&view, cursor, &KnifePreferences::default()).unwrap();
        assert_eq!(tool.mesh.as_ref().unwrap().vertex_count(), 5);

        assert!(tool.cancel());
        let mesh = tool.mesh.as_ref().unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 1);
        assert!(tool.session.is_none());
    }

    #[test]
    fn auto_cut_commits_even_into_void() {
        let mut m = quad();
        m.set_selected(0, true);
        let mut tool = tool_with(m);
        let view = head_on_view();
        let prefs = KnifePreferences {
            auto_cut: true,
            ..Default::default()
        };
        // Cursor past the far corner: a void snap on the quad's diagonal.
        let cursor = view.project_to_screen(Vec3::new(1.5, 1.5, 0.0)).unwrap();
        let changed = tool.begin(&view, cursor, &prefs).unwrap();
        assert!(changed);
        // Never entered the interactive loop, and the diagonal got cut.
        assert!(tool.session.is_none());
        let mesh = tool.mesh.as_ref().unwrap();
        assert_eq!(mesh.face_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn auto_cut_from_a_void_start_commits_immediately() {
        let mut tool = tool_with(quad());
        let view = head_on_view();
        let prefs = KnifePreferences {
            auto_cut: true,
            ..Default::default()
        };
        let changed = tool
            .begin(&view, Vec2::new(590.0, 10.0), &prefs)
            .unwrap();
        assert!(changed);
        // No interactive loop; the virtual start stayed behind as a real
        // floating vertex.
        assert!(tool.session.is_none());
        let mesh = tool.mesh.as_ref().unwrap();
        assert_eq!(mesh.vertex_count(), 5);
        assert_eq!(mesh.face_count(), 1);
    }

    #[test]
    fn interactive_void_to_face_cut() {
        let mut tool = tool_with(quad());
        let view = head_on_view();
        let prefs = KnifePreferences::default();
        // Begin over empty space to the right of the quad, on its midline.
        let start_cursor = view.project_to_screen(Vec3::new(1.5, 0.5, 0.0)).unwrap();
        tool.begin(&view, start_cursor, &prefs).unwrap();
        let start = tool.session.as_ref().unwrap().start_verts[0];

        // Cut to the middle of the face.
        let cursor = view.project_to_screen(Vec3::new(0.5, 0.5, 0.0)).unwrap();
        tool.refresh(&view, cursor, &prefs).unwrap();
        assert!(tool.commit(&view, &prefs).unwrap());

        let mesh = tool.mesh.as_ref().unwrap();
        // The embedded end vertex divides the quad in two, and the cut from
        // the boundary split carves one more face off.
        assert_eq!(mesh.face_count(), 3);
        assert_eq!(mesh.vertex_count(), 7);
        // The virtual start survives the commit as real, floating topology.
        assert!(mesh.is_vertex_alive(start));
        assert!(mesh.vertex_faces(start).is_empty());
        assert!(mesh.is_selected(start));
    }

    #[test]
    fn constraint_overrides_surface_snapping() {
        use crate::knife::session::{SessionAction, SessionEvent};

        let mut m = grid2x2();
        m.set_selected(4, true);
        let mut tool = tool_with(m);
        let view = ViewContext::new(
            Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0),
            Mat4::from_translation(Vec3::new(1.0, 1.0, 8.0)),
            Vec2::new(600.0, 600.0),
            Mat4::IDENTITY,
        );
        let prefs = KnifePreferences::default();
        let begin_cursor = view.project_to_screen(Vec3::new(1.2, 1.2, 0.0)).unwrap();
        tool.begin(&view, begin_cursor, &prefs).unwrap();

        let action = tool
            .session
            .as_mut()
            .unwrap()
            .handle_event(SessionEvent::ToggleAngleConstraint);
        assert_eq!(action, SessionAction::UpdateAxes);
        tool.rebuild_axes(&view);

        // Hover the face interior, off every axis.
        let cursor = view.project_to_screen(Vec3::new(1.6, 1.3, 0.0)).unwrap();
        tool.refresh(&view, cursor, &prefs).unwrap();
        let session = tool.session.as_ref().unwrap();
        let snap = session.snap.unwrap();
        // The snap ignores the surface hit and sits on an axis through the
        // start vertex; the hit still scopes the axis search.
        assert!(snap.is_void());
        let start = Vec3::new(1.0, 1.0, 0.0);
        let offset = snap.point - start;
        assert!(offset.length() > 0.1);
        assert!(
            session
                .axes
                .iter()
                .any(|a| offset.cross(a.dir).length() < 1e-3 * offset.length())
        );
        assert_eq!(session.last_hit_face, Some(3));
    }

    #[test]
    fn interactive_vertex_to_vertex_gesture() {
        let mut m = quad();
        m.set_selected(0, true);
        let mut tool = tool_with(m);
        let view = head_on_view();
        let prefs = KnifePreferences::default();
        let start_cursor = view.project_to_screen(Vec3::new(0.5, 0.5, 0.0)).unwrap();
        tool.begin(&view, start_cursor, &prefs).unwrap();

        // Hover the opposite corner, then confirm.
        let cursor = view.project_to_screen(Vec3::new(0.98, 0.98, 0.0)).unwrap();
        tool.refresh(&view, cursor, &prefs).unwrap();
        let snap = tool.session.as_ref().unwrap().snap.unwrap();
        assert_eq!(snap.mode, SnapMode::Vert { vertex: 2 });

        assert!(tool.commit(&view, &prefs).unwrap());
        let mesh = tool.mesh.as_ref().unwrap();
        assert_eq!(mesh.face_count(), 2);
        assert!(mesh.is_selected(0) && mesh.is_selected(2));
        assert!(tool.preview.is_none());
    }
}
