//! Shadow Utilities
//!
//! Pure math functions for cascaded shadow mapping, extracted from the
//! shadow pass for reuse and testability.
//!
//! # Provided Functions
//!
//! - Cascade split computation (Practical Split Scheme)
//! - Frustum corner extraction from the inverse view-projection
//! - Per-cascade light view/projection construction (bounding-sphere fit
//!   with radius snapping to suppress shimmer)

use glam::{Mat4, Vec3, Vec4, Vec4Swizzles};

use crate::scene::Camera;

/// Maximum cascade count.
pub const MAX_CASCADES: u32 = 4;

/// Radius quantization step for the cascade bounding sphere. Snapping the
/// radius up to the next 1/16 unit keeps the ortho extents stable while
/// the camera moves, which suppresses shadow shimmer from radius jitter.
const RADIUS_SNAP: f32 = 16.0;

/// Per-cascade light data uploaded to the shadow uniform buffer.
///
/// Recomputed every frame from the camera frustum and light direction;
/// never persisted across frames.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LightData {
    pub view: Mat4,
    pub projection: Mat4,
    /// View-space far range of this cascade, negative (right-handed view
    /// space looks down -Z). Shaders select the cascade by comparing the
    /// fragment's view-space depth against this.
    pub far_range: f32,
    pub _padding: [f32; 3],
}

// ============================================================================
// Cascade Split Computation
// ============================================================================

/// Computes normalized cascade split points in (0, 1] over the camera's
/// near/far range using the Practical Split Scheme.
///
/// `lambda` blends between uniform (`0.0`) and logarithmic (`1.0`)
/// distribution. Splits are strictly increasing and the last split is
/// exactly `1.0` (the far plane).
#[must_use]
pub fn compute_cascade_splits(cascade_count: u32, near: f32, far: f32, lambda: f32) -> Vec<f32> {
    let count = cascade_count.clamp(1, MAX_CASCADES);
    let clip_range = far - near;
    let ratio = far / near;

    (1..=count)
        .map(|i| {
            let p = i as f32 / count as f32;
            let log = near * ratio.powf(p);
            let uniform = near + clip_range * p;
            let d = lambda * log + (1.0 - lambda) * uniform;
            (d - near) / clip_range
        })
        .collect()
}

// ============================================================================
// Frustum Corners
// ============================================================================

/// The 8 world-space corners of the camera frustum, near face first,
/// obtained by unprojecting the NDC cube corners through the inverse
/// view-projection. NDC depth is [0, 1].
#[must_use]
pub fn frustum_corners_world(camera: &Camera) -> [Vec3; 8] {
    let ndc = [
        Vec3::new(-1.0, 1.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(1.0, -1.0, 0.0),
        Vec3::new(-1.0, -1.0, 0.0),
        Vec3::new(-1.0, 1.0, 1.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec3::new(1.0, -1.0, 1.0),
        Vec3::new(-1.0, -1.0, 1.0),
    ];

    let inverse_vp = camera.view_projection_matrix().inverse();
    let mut corners = [Vec3::ZERO; 8];
    for (corner, c) in corners.iter_mut().zip(&ndc) {
        let unprojected = inverse_vp * Vec4::new(c.x, c.y, c.z, 1.0);
        *corner = unprojected.xyz() / unprojected.w;
    }
    corners
}

/// Shrinks a copy of the full frustum to the slice between two normalized
/// split distances: the far face moves to `split`, the near face to
/// `last_split`.
#[must_use]
pub fn carve_cascade_slice(corners: &[Vec3; 8], last_split: f32, split: f32) -> [Vec3; 8] {
    let mut slice = *corners;
    for j in 0..4 {
        let dist = slice[j + 4] - slice[j];
        slice[j + 4] = slice[j] + dist * split;
        slice[j] += dist * last_split;
    }
    slice
}

/// Centroid and snapped bounding-sphere radius of a frustum slice.
///
/// The radius is rounded up to the nearest 1/16 unit.
#[must_use]
pub fn bounding_sphere(corners: &[Vec3; 8]) -> (Vec3, f32) {
    let centroid = corners.iter().copied().sum::<Vec3>() / 8.0;
    let mut radius = 0.0f32;
    for corner in corners {
        radius = radius.max(corner.distance(centroid));
    }
    let radius = (radius * RADIUS_SNAP).ceil() / RADIUS_SNAP;
    (centroid, radius)
}

/// Builds the light-space view and orthographic projection for one
/// cascade slice, sized to its bounding sphere.
#[must_use]
pub fn build_cascade_matrices(light_direction: Vec3, centroid: Vec3, radius: f32) -> (Mat4, Mat4) {
    let safe_dir = if light_direction.length_squared() > 1e-6 {
        light_direction.normalize()
    } else {
        -Vec3::Z
    };
    let up = if safe_dir.y.abs() > 0.99 { Vec3::X } else { Vec3::Y };

    let max_extents = Vec3::splat(radius);
    let min_extents = -max_extents;

    let eye = centroid - safe_dir * (-min_extents.z);
    let view = Mat4::look_at_rh(eye, centroid, up);
    let projection = Mat4::orthographic_rh(
        min_extents.x,
        max_extents.x,
        min_extents.y,
        max_extents.y,
        0.0,
        max_extents.z - min_extents.z,
    );

    (view, projection)
}

// ============================================================================
// High-level builder
// ============================================================================

/// Computes per-cascade [`LightData`] for a directional light.
///
/// One entry per cascade, far range packed as
/// `-(near + split * clip_range)`.
#[must_use]
pub fn compute_cascade_light_data(
    camera: &Camera,
    light_direction: Vec3,
    cascade_count: u32,
    lambda: f32,
) -> Vec<LightData> {
    let near = camera.near;
    let clip_range = camera.far - camera.near;
    let splits = compute_cascade_splits(cascade_count, camera.near, camera.far, lambda);
    let corners = frustum_corners_world(camera);

    let mut cascades = Vec::with_capacity(splits.len());
    let mut last_split = 0.0f32;
    for &split in &splits {
        let slice = carve_cascade_slice(&corners, last_split, split);
        let (centroid, radius) = bounding_sphere(&slice);
        let (view, projection) = build_cascade_matrices(light_direction, centroid, radius);

        cascades.push(LightData {
            view,
            projection,
            far_range: -(near + split * clip_range),
            _padding: [0.0; 3],
        });
        last_split = split;
    }
    cascades
}
