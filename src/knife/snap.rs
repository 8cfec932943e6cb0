//! Screen-space snapping: classify the cursor against the mesh as a vertex,
//! edge, face or void target.
//!
//! The resolver runs once per mouse move. It casts the mouse ray, finds the
//! closest feature of the hit face, and picks a mode by comparing pixel
//! distances against the configured snap radii (vertex wins over edge, edge
//! over face). Snapping never mutates the mesh; the committer does.

use bevy::prelude::*;

use crate::error::KnifeError;
use crate::knife::geometry::{self, ViewContext};
use crate::mesh::{FaceId, MeshBvh, MeshEdge, PolyMesh, VertexId};

/// What the cursor is snapped to, with everything the committer needs to
/// materialize the point later.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SnapMode {
    Vert {
        vertex: VertexId,
    },
    Edge {
        edge: MeshEdge,
        /// Unclamped projection onto the edge line (differs from the snap
        /// point only in altitude-prolong mode).
        projected: Vec3,
        /// Clamped split parameter, measured from the edge's lower-id end.
        split_ratio: f32,
        /// Set when an altitude foot fell outside the edge and the cut has
        /// to run through the nearer endpoint first.
        prolong: bool,
    },
    Face {
        face: FaceId,
    },
    Void,
}

/// One resolved snap: the mode, the snap point in mesh-local space, and the
/// pixel distances the mode decision was based on (+inf when a feature did
/// not project).
#[derive(Debug, Clone, Copy)]
pub struct SnapResult {
    pub mode: SnapMode,
    pub point: Vec3,
    pub vertex_px: f32,
    pub edge_px: f32,
}

impl SnapResult {
    pub fn void_at(point: Vec3) -> Self {
        SnapResult {
            mode: SnapMode::Void,
            point,
            vertex_px: f32::INFINITY,
            edge_px: f32::INFINITY,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self.mode, SnapMode::Void)
    }
}

/// Per-resolve inputs beyond the geometry itself.
#[derive(Debug, Clone, Copy)]
pub struct SnapOptions {
    /// Vertex snap radius in pixels.
    pub vertex_radius_px: f32,
    /// Edge snap radius in pixels.
    pub edge_radius_px: f32,
    /// When false (snapping suppressed), every surface hit is a face hit.
    pub snapping: bool,
    /// Snap edge hits to the edge midpoint, face hits to the face center.
    pub snap_to_center: bool,
    /// Altitude mode: drop a perpendicular from this point (the cut start)
    /// onto the hovered edge instead of following the cursor along it.
    pub altitude_from: Option<Vec3>,
    /// Active angle-constraint point. When set it owns the snap outright:
    /// surface hits only retarget the hovered face, never the snap point.
    pub axis_point: Option<Vec3>,
}

impl Default for SnapOptions {
    fn default() -> Self {
        SnapOptions {
            vertex_radius_px: 20.0,
            edge_radius_px: 15.0,
            snapping: true,
            snap_to_center: false,
            altitude_from: None,
            axis_point: None,
        }
    }
}

/// Closest edge feature of one face relative to a surface hit point.
#[derive(Debug, Clone, Copy)]
struct EdgeFeature {
    edge: MeshEdge,
    /// World distance from the hit to the edge: perpendicular height when
    /// the projection lands inside the edge, else the nearer endpoint
    /// distance (the concave-polygon guard).
    distance: f32,
    nearest_vertex: VertexId,
    vertex_px: f32,
    edge_px: f32,
    projected: Vec3,
    split_ratio: f32,
}

fn edge_feature(mesh: &PolyMesh, view: &ViewContext, point: Vec3, edge: MeshEdge) -> EdgeFeature {
    let a = mesh.position(edge.0);
    let b = mesh.position(edge.1);
    let (projected, _) = geometry::project_point_on_segment(point, a, b);
    let split_ratio = geometry::edge_split_ratio(a, b, point);
    let edge_point = a.lerp(b, split_ratio);

    let da = point.distance(a);
    let db = point.distance(b);
    let height = point.distance(projected);
    let distance = height.min(da).min(db);
    let nearest_vertex = if da <= db { edge.0 } else { edge.1 };

    EdgeFeature {
        edge,
        distance,
        nearest_vertex,
        vertex_px: view.pixel_distance(point, mesh.position(nearest_vertex)),
        edge_px: view.pixel_distance(point, edge_point),
        projected,
        split_ratio,
    }
}

/// Find the edge of `face` closest to `point`.
///
/// Edges whose split parameter collapses onto an endpoint are culled first
/// so a cursor hugging a corner prefers the edge it is actually along; if
/// every edge gets culled the search reruns without culling, so a candidate
/// always exists. Non-finite distance math marks the face selected and
/// surfaces [`KnifeError::DegenerateFace`].
fn find_closest(
    mesh: &mut PolyMesh,
    view: &ViewContext,
    face: FaceId,
    point: Vec3,
) -> Result<EdgeFeature, KnifeError> {
    let features: Vec<EdgeFeature> = mesh
        .face_edges(face)
        .into_iter()
        .map(|e| edge_feature(mesh, view, point, e))
        .collect();

    let pick = |culled: bool| -> Option<EdgeFeature> {
        features
            .iter()
            .filter(|f| !culled || (f.split_ratio > 0.0 && f.split_ratio < 1.0))
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
            .copied()
    };

    let best = pick(true).or_else(|| pick(false));
    match best {
        Some(f) if f.distance.is_finite() => Ok(f),
        _ => {
            mesh.select_face(face);
            Err(KnifeError::DegenerateFace { face })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModeKind {
    Vert,
    Edge,
    Face,
}

/// Pick a snap mode from pixel distances. Vertex beats edge beats face.
fn mode_by_distance(vertex_px: f32, edge_px: f32, options: &SnapOptions) -> ModeKind {
    if vertex_px < options.vertex_radius_px {
        ModeKind::Vert
    } else if edge_px < options.edge_radius_px {
        ModeKind::Edge
    } else {
        ModeKind::Face
    }
}

/// Resolve the cursor against the mesh.
///
/// Returns the snap plus the hit face (the caller records it as the session's
/// `last_hit_face`, which scopes axis-constraint searches).
pub fn resolve(
    mesh: &mut PolyMesh,
    bvh: &MeshBvh,
    view: &ViewContext,
    cursor: Vec2,
    options: &SnapOptions,
) -> Result<(SnapResult, Option<FaceId>), KnifeError> {
    let (origin, dir) = view.screen_ray(cursor);
    let hit = bvh.cast_ray(mesh, origin, dir)?;

    // An engaged angle constraint owns the snap point; whatever surface the
    // ray found only retargets the hovered face for the axis search.
    if let Some(point) = options.axis_point {
        return Ok((SnapResult::void_at(point), hit.map(|h| h.face)));
    }

    let Some(hit) = hit else {
        return Ok((SnapResult::void_at(view.viewport_point(cursor)), None));
    };

    if !options.snapping {
        let point = if options.snap_to_center {
            mesh.face_center(hit.face)
        } else {
            hit.point
        };
        let result = SnapResult {
            mode: SnapMode::Face { face: hit.face },
            point,
            vertex_px: f32::INFINITY,
            edge_px: f32::INFINITY,
        };
        return Ok((result, Some(hit.face)));
    }

    let feature = find_closest(mesh, view, hit.face, hit.point)?;

    if let Some(start) = options.altitude_from {
        let a = mesh.position(feature.edge.0);
        let b = mesh.position(feature.edge.1);
        let (foot, t) = geometry::project_point_on_segment(start, a, b);
        let prolong = !(0.0..=1.0).contains(&t);
        let split_ratio = geometry::edge_split_ratio(a, b, foot);
        let result = SnapResult {
            mode: SnapMode::Edge {
                edge: feature.edge,
                projected: foot,
                split_ratio,
                prolong,
            },
            point: foot,
            vertex_px: feature.vertex_px,
            edge_px: feature.edge_px,
        };
        return Ok((result, Some(hit.face)));
    }

    let result = match mode_by_distance(feature.vertex_px, feature.edge_px, options) {
        ModeKind::Vert => SnapResult {
            mode: SnapMode::Vert {
                vertex: feature.nearest_vertex,
            },
            point: mesh.position(feature.nearest_vertex),
            vertex_px: feature.vertex_px,
            edge_px: feature.edge_px,
        },
        ModeKind::Edge => {
            let a = mesh.position(feature.edge.0);
            let b = mesh.position(feature.edge.1);
            let split_ratio = if options.snap_to_center {
                0.5
            } else {
                feature.split_ratio
            };
            SnapResult {
                mode: SnapMode::Edge {
                    edge: feature.edge,
                    projected: feature.projected,
                    split_ratio,
                    prolong: false,
                },
                point: a.lerp(b, split_ratio),
                vertex_px: feature.vertex_px,
                edge_px: feature.edge_px,
            }
        }
        ModeKind::Face => SnapResult {
            mode: SnapMode::Face { face: hit.face },
            point: if options.snap_to_center {
                mesh.face_center(hit.face)
            } else {
                hit.point
            },
            vertex_px: feature.vertex_px,
            edge_px: feature.edge_px,
        },
    };
    Ok((result, Some(hit.face)))
}
