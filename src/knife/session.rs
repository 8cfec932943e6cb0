//! Interaction state for one knife gesture.
//!
//! A [`CutSession`] lives from invocation to commit or cancel. Input systems
//! translate raw events into [`SessionEvent`]s; `handle_event` is the pure
//! transition function and answers with the [`SessionAction`] the caller has
//! to perform. Keeping the transitions free of engine types makes the whole
//! modal protocol unit-testable.

use bevy::prelude::*;

use crate::knife::axis::AxisCandidate;
use crate::knife::snap::SnapResult;
use crate::mesh::{FaceId, VertexId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Previewing,
    Finished,
    Cancelled,
}

/// Live toggles of the gesture, mirrored into the snap options each frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct KnifeToggles {
    pub snap_to_center: bool,
    /// Alternate flavor of the center snap (edge midpoints only, not face
    /// centers).
    pub alternate_center: bool,
    pub altitude: bool,
    pub angle_constraint: bool,
    pub cut_through: bool,
    /// Cleared while snapping is suppressed (held modifier).
    pub snapping: bool,
}

/// How the gesture obtained its start point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartKind {
    /// Started from vertices that existed before the invocation.
    Existing,
    /// The invocation created the start vertex on a face or edge. Keeps both
    /// the raw hit and the centered hit so the center toggle can slide the
    /// vertex between them.
    Created { initial: Vec3, centered: Vec3 },
    /// Started over empty space: the invocation added a free-floating vertex
    /// on the mouse ray, unattached to any face.
    Virtual,
}

/// What the caller must do in response to an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionAction {
    Ignore,
    /// Let the host (camera navigation etc.) consume the event.
    PassThrough,
    Redraw,
    /// Re-resolve and rebuild the axis family around the start.
    UpdateAxes,
    /// Move the created start vertex to `to`, then rebuild axes.
    RepositionStart { to: Vec3 },
    Commit,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionEvent {
    MouseMoved,
    ToggleSnapCenter { alternate: bool },
    ToggleAltitude,
    ToggleAngleConstraint,
    ToggleCutThrough,
    SetSnapping(bool),
    Confirm,
    Cancel,
    Navigation,
}

/// One in-flight knife gesture.
#[derive(Debug, Clone)]
pub struct CutSession {
    /// Start vertices. A virtual start is the single free-floating vertex
    /// the invocation created over empty space.
    pub start_verts: Vec<VertexId>,
    pub start_kind: StartKind,
    pub toggles: KnifeToggles,
    /// Most recent snap under the cursor.
    pub snap: Option<SnapResult>,
    /// Face the cursor last hovered; scopes the axis search.
    pub last_hit_face: Option<FaceId>,
    pub axes: Vec<AxisCandidate>,
    pub phase: SessionPhase,
}

impl CutSession {
    pub fn new(start_verts: Vec<VertexId>, start_kind: StartKind) -> Self {
        CutSession {
            start_verts,
            start_kind,
            toggles: KnifeToggles {
                snapping: true,
                ..Default::default()
            },
            snap: None,
            last_hit_face: None,
            axes: Vec::new(),
            phase: SessionPhase::Previewing,
        }
    }

    pub fn virtual_from(vertex: VertexId) -> Self {
        Self::new(vec![vertex], StartKind::Virtual)
    }

    pub fn is_multi(&self) -> bool {
        self.start_verts.len() > 1
    }

    pub fn is_virtual(&self) -> bool {
        matches!(self.start_kind, StartKind::Virtual)
    }

    /// Single-vertex gestures only; multi and virtual starts have no
    /// meaningful axis family or altitude foot.
    fn single_real_start(&self) -> bool {
        self.start_verts.len() == 1 && !self.is_virtual()
    }

    pub fn handle_event(&mut self, event: SessionEvent) -> SessionAction {
        if self.phase != SessionPhase::Previewing {
            return SessionAction::Ignore;
        }

        match event {
            SessionEvent::MouseMoved => SessionAction::Redraw,

            SessionEvent::ToggleSnapCenter { alternate } => {
                if self.is_multi() {
                    return SessionAction::Ignore;
                }
                if alternate {
                    // The alternate variant implies center snapping.
                    self.toggles.alternate_center = !self.toggles.alternate_center;
                    self.toggles.snap_to_center = true;
                } else {
                    self.toggles.snap_to_center = !self.toggles.snap_to_center;
                }
                // A start vertex the gesture itself created slides between
                // the raw hit and the centered hit.
                if let StartKind::Created { initial, centered } = self.start_kind {
                    let to = if self.toggles.snap_to_center {
                        centered
                    } else {
                        initial
                    };
                    return SessionAction::RepositionStart { to };
                }
                SessionAction::Redraw
            }

            SessionEvent::ToggleAltitude => {
                if !self.single_real_start() {
                    return SessionAction::Ignore;
                }
                self.toggles.altitude = !self.toggles.altitude;
                if self.toggles.altitude {
                    self.toggles.angle_constraint = false;
                }
                SessionAction::Redraw
            }

            SessionEvent::ToggleAngleConstraint => {
                if !self.single_real_start() {
                    return SessionAction::Ignore;
                }
                self.toggles.angle_constraint = !self.toggles.angle_constraint;
                if self.toggles.angle_constraint {
                    self.toggles.altitude = false;
                    SessionAction::UpdateAxes
                } else {
                    SessionAction::Redraw
                }
            }

            SessionEvent::ToggleCutThrough => {
                self.toggles.cut_through = !self.toggles.cut_through;
                SessionAction::Redraw
            }

            SessionEvent::SetSnapping(on) => {
                if self.toggles.snapping == on {
                    return SessionAction::Ignore;
                }
                self.toggles.snapping = on;
                SessionAction::Redraw
            }

            SessionEvent::Confirm => {
                self.phase = SessionPhase::Finished;
                SessionAction::Commit
            }

            SessionEvent::Cancel => {
                self.phase = SessionPhase::Cancelled;
                SessionAction::Cancel
            }

            SessionEvent::Navigation => {
                // Orbiting mid-constraint (or with a floating virtual start
                // that only makes sense in this view) would invalidate the
                // view-plane data.
                if self.toggles.angle_constraint || self.is_virtual() {
                    SessionAction::Ignore
                } else {
                    SessionAction::PassThrough
                }
            }
        }
    }

    /// One-line status of the live toggles, for the status bar / log.
    pub fn helper_text(&self) -> String {
        let t = &self.toggles;
        let flag = |on: bool, name: &str| format!("[{}] {name}", if on { "x" } else { " " });
        format!(
            "{}  {}  {}  {}  {}",
            flag(t.snap_to_center, "center (Ctrl)"),
            flag(t.altitude, "altitude (H)"),
            flag(t.angle_constraint, "angle (C)"),
            flag(t.cut_through, "cut through (Z)"),
            flag(!t.snapping, "snap off (Shift)"),
        )
    }
}
