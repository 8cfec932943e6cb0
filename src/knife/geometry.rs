//! Screen/ray projection math for the knife.
//!
//! Everything operates in the target mesh's local space. [`ViewContext`] is
//! built once per frame from plain matrices so the whole snapping pipeline is
//! testable without spinning up a camera.

use bevy::prelude::*;

/// Snapshot of one camera view of one mesh, in mesh-local space.
#[derive(Debug, Clone, Copy)]
pub struct ViewContext {
    clip_from_local: Mat4,
    local_from_clip: Mat4,
    /// Logical viewport size in pixels.
    pub viewport: Vec2,
    /// Camera position in mesh-local space.
    pub eye: Vec3,
    /// Camera view direction in mesh-local space.
    pub forward: Vec3,
    pub orthographic: bool,
}

impl ViewContext {
    pub fn new(
        clip_from_view: Mat4,
        world_from_view: Mat4,
        viewport: Vec2,
        world_from_local: Mat4,
    ) -> Self {
        let local_from_world = world_from_local.inverse();
        let clip_from_local = clip_from_view * world_from_view.inverse() * world_from_local;
        let eye = local_from_world.transform_point3(world_from_view.transform_point3(Vec3::ZERO));
        let forward = local_from_world
            .transform_vector3(world_from_view.transform_vector3(Vec3::NEG_Z))
            .normalize();
        // An orthographic clip matrix leaves w untouched.
        let orthographic = clip_from_view.w_axis.w == 1.0;
        ViewContext {
            clip_from_local,
            local_from_clip: clip_from_local.inverse(),
            viewport,
            eye,
            forward,
            orthographic,
        }
    }

    /// Build from live camera components.
    ///
    /// Returns `None` when the camera has no laid-out viewport yet.
    pub fn from_camera(
        camera: &Camera,
        camera_transform: &GlobalTransform,
        target_transform: &GlobalTransform,
    ) -> Option<Self> {
        let viewport = camera.logical_viewport_size()?;
        Some(Self::new(
            camera.clip_from_view(),
            Mat4::from(camera_transform.affine()),
            viewport,
            Mat4::from(target_transform.affine()),
        ))
    }

    /// Project a local-space point to viewport pixels.
    ///
    /// `None` for points behind the camera or outside a representable clip
    /// position; callers treat that as "infinitely far" on screen.
    pub fn project_to_screen(&self, point: Vec3) -> Option<Vec2> {
        let clip = self.clip_from_local * point.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        if !ndc.is_finite() {
            return None;
        }
        Some(Vec2::new(
            (ndc.x + 1.0) * 0.5 * self.viewport.x,
            (1.0 - ndc.y) * 0.5 * self.viewport.y,
        ))
    }

    /// Mouse ray through a viewport pixel, as (origin, unit direction).
    pub fn screen_ray(&self, screen: Vec2) -> (Vec3, Vec3) {
        let ndc = Vec2::new(
            screen.x / self.viewport.x * 2.0 - 1.0,
            1.0 - screen.y / self.viewport.y * 2.0,
        );
        // A mid-frustum depth is valid for both depth conventions in use.
        let mid = self.local_from_clip.project_point3(ndc.extend(0.5));
        if self.orthographic {
            // Slide the mid point back onto the camera plane.
            let origin = mid - self.forward * (mid - self.eye).dot(self.forward);
            (origin, self.forward)
        } else {
            (self.eye, (mid - self.eye).normalize())
        }
    }

    /// Distance in pixels between the projections of two local-space points.
    /// +inf when either point does not project.
    pub fn pixel_distance(&self, a: Vec3, b: Vec3) -> f32 {
        match (self.project_to_screen(a), self.project_to_screen(b)) {
            (Some(pa), Some(pb)) => pa.distance(pb),
            _ => f32::INFINITY,
        }
    }

    /// Distance in pixels from a viewport point to a projected local point.
    pub fn pixel_distance_to(&self, screen: Vec2, point: Vec3) -> f32 {
        match self.project_to_screen(point) {
            Some(p) => p.distance(screen),
            None => f32::INFINITY,
        }
    }

    /// Local-space point one unit along the mouse ray. This is the depth
    /// policy for cuts ending over empty space: close to the camera, stable
    /// under both projection kinds.
    pub fn viewport_point(&self, screen: Vec2) -> Vec3 {
        let (origin, dir) = self.screen_ray(screen);
        origin + dir
    }

    /// Re-image a local point onto the near viewport plane: project to
    /// pixels, then take the viewport point of that pixel. Cut polylines and
    /// axis hit-tests live on this plane so depth never skews screen math.
    pub fn flatten_to_view(&self, point: Vec3) -> Vec3 {
        match self.project_to_screen(point) {
            Some(px) => self.viewport_point(px),
            None => point,
        }
    }
}

/// Project `point` onto the infinite line through `a`-`b`.
/// Returns the projected point and the unclamped parameter along the segment.
pub fn project_point_on_segment(point: Vec3, a: Vec3, b: Vec3) -> (Vec3, f32) {
    let d = b - a;
    let len_sq = d.length_squared();
    if len_sq <= f32::EPSILON {
        return (a, 0.0);
    }
    let t = (point - a).dot(d) / len_sq;
    (a + d * t, t)
}

/// Tolerance for treating a split parameter as sitting on an endpoint.
pub const SPLIT_RATIO_TOLERANCE: f32 = 0.001;

/// Where `point` splits the edge `a`-`b`, as a ratio in `[0, 1]`.
///
/// Never extrapolates: parameters outside the segment clamp to the nearer
/// endpoint, and parameters within [`SPLIT_RATIO_TOLERANCE`] of an endpoint
/// collapse onto it so downstream splits cannot create sliver edges.
pub fn edge_split_ratio(a: Vec3, b: Vec3, point: Vec3) -> f32 {
    let (_, t) = project_point_on_segment(point, a, b);
    if t <= SPLIT_RATIO_TOLERANCE {
        0.0
    } else if t >= 1.0 - SPLIT_RATIO_TOLERANCE {
        1.0
    } else {
        t
    }
}

/// Whether `point` lies strictly inside the edge `a`-`b`, within a
/// world-space tolerance. Points at (or within tolerance of) either endpoint
/// do not count: an edge incident to the probe vertex is never "broken by"
/// that vertex.
pub fn is_point_on_edge(point: Vec3, a: Vec3, b: Vec3, tolerance: f32) -> bool {
    if point.distance(a) <= tolerance || point.distance(b) <= tolerance {
        return false;
    }
    let (projected, t) = project_point_on_segment(point, a, b);
    if t <= 0.0 || t >= 1.0 {
        return false;
    }
    point.distance(projected) <= tolerance
}
