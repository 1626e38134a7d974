//! Shadow algorithm tests
//!
//! Tests for:
//! - Practical cascade split computation and its monotonicity
//! - Uniform / logarithmic bracketing of blended splits
//! - Frustum corner unprojection and cascade carving
//! - Bounding-sphere fit with radius snapping
//! - Per-cascade light data construction

use glam::{Mat4, Vec3, Vec4};
use ember::renderer::shadow_utils::*;
use ember::scene::Camera;

const EPSILON: f32 = 1e-4;

fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn test_camera(near: f32, far: f32) -> Camera {
    let mut camera = Camera::new_perspective(60.0, 1.0, near, far);
    camera.look_at(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
    camera
}

// ============================================================================
// compute_cascade_splits
// ============================================================================

#[test]
fn cascade_splits_are_strictly_increasing() {
    let splits = compute_cascade_splits(4, 1.0, 1000.0, 0.95);
    for i in 1..splits.len() {
        assert!(
            splits[i] > splits[i - 1],
            "splits[{}]={} <= splits[{}]={}",
            i,
            splits[i],
            i - 1,
            splits[i - 1]
        );
    }
}

#[test]
fn cascade_splits_last_reaches_far_plane() {
    let splits = compute_cascade_splits(4, 1.0, 1000.0, 0.95);
    assert!(
        approx(splits[3], 1.0),
        "last split should be 1.0, got {}",
        splits[3]
    );
}

#[test]
fn cascade_splits_lambda_zero_is_uniform() {
    // near=1, far=101 gives a clip range of 100, so uniform splits land on
    // exact quarters.
    let splits = compute_cascade_splits(4, 1.0, 101.0, 0.0);
    let expected = [0.25, 0.5, 0.75, 1.0];
    for (i, &e) in expected.iter().enumerate() {
        assert!(approx(splits[i], e), "splits[{i}]: expected {e}, got {}", splits[i]);
    }
}

#[test]
fn cascade_splits_lambda_one_is_logarithmic() {
    let near = 1.0;
    let far = 100.0;
    let splits = compute_cascade_splits(4, near, far, 1.0);
    for (i, &split) in splits.iter().enumerate() {
        let p = (i + 1) as f32 / 4.0;
        let expected = (near * (far / near).powf(p) - near) / (far - near);
        assert!(
            approx(split, expected),
            "splits[{i}]: expected {expected}, got {split}"
        );
    }
}

#[test]
fn blended_splits_fall_between_uniform_and_logarithmic() {
    // near=1, far=1000, lambda=0.95: every split except the last must sit
    // strictly between the pure-uniform and pure-logarithmic values.
    let near = 1.0;
    let far = 1000.0;
    let blended = compute_cascade_splits(4, near, far, 0.95);
    let uniform = compute_cascade_splits(4, near, far, 0.0);
    let logarithmic = compute_cascade_splits(4, near, far, 1.0);

    for i in 0..3 {
        let low = uniform[i].min(logarithmic[i]);
        let high = uniform[i].max(logarithmic[i]);
        assert!(
            blended[i] > low && blended[i] < high,
            "splits[{i}]={} not strictly inside ({low}, {high})",
            blended[i]
        );
    }
    assert!(approx(blended[3], 1.0));
}

#[test]
fn cascade_count_is_clamped() {
    let splits = compute_cascade_splits(10, 1.0, 100.0, 0.5);
    assert_eq!(splits.len(), MAX_CASCADES as usize);
}

// ============================================================================
// Frustum corners & carving
// ============================================================================

#[test]
fn frustum_corners_invert_the_projection() {
    let camera = test_camera(1.0, 100.0);
    let corners = frustum_corners_world(&camera);
    let vp = camera.view_projection_matrix();

    // Each corner must project back onto the NDC cube.
    for (i, corner) in corners.iter().enumerate() {
        let clip = vp * Vec4::new(corner.x, corner.y, corner.z, 1.0);
        let ndc = clip / clip.w;
        assert!(
            ndc.x.abs() <= 1.0 + 1e-3 && ndc.y.abs() <= 1.0 + 1e-3,
            "corner {i} reprojects outside NDC: {ndc:?}"
        );
        let expected_z = if i < 4 { 0.0 } else { 1.0 };
        assert!(
            (ndc.z - expected_z).abs() < 1e-3,
            "corner {i} depth: expected {expected_z}, got {}",
            ndc.z
        );
    }
}

#[test]
fn carve_cascade_slice_interpolates_along_frustum_edges() {
    let camera = test_camera(1.0, 100.0);
    let corners = frustum_corners_world(&camera);
    let slice = carve_cascade_slice(&corners, 0.25, 0.5);

    for j in 0..4 {
        let dist = corners[j + 4] - corners[j];
        let expected_near = corners[j] + dist * 0.25;
        let expected_far = corners[j] + dist * 0.5;
        assert!((slice[j] - expected_near).length() < EPSILON);
        assert!((slice[j + 4] - expected_far).length() < EPSILON);
    }
}

#[test]
fn consecutive_slices_share_a_face() {
    let camera = test_camera(1.0, 100.0);
    let corners = frustum_corners_world(&camera);
    let first = carve_cascade_slice(&corners, 0.0, 0.3);
    let second = carve_cascade_slice(&corners, 0.3, 0.7);

    for j in 0..4 {
        assert!(
            (first[j + 4] - second[j]).length() < EPSILON,
            "far face of slice 0 should equal near face of slice 1"
        );
    }
}

// ============================================================================
// Bounding sphere
// ============================================================================

#[test]
fn bounding_sphere_contains_all_corners() {
    let camera = test_camera(1.0, 100.0);
    let corners = frustum_corners_world(&camera);
    let (centroid, radius) = bounding_sphere(&corners);

    for corner in &corners {
        assert!(
            corner.distance(centroid) <= radius + EPSILON,
            "corner outside bounding sphere"
        );
    }
}

#[test]
fn bounding_sphere_radius_snaps_to_sixteenths() {
    let camera = test_camera(1.0, 100.0);
    let corners = frustum_corners_world(&camera);
    let (_, radius) = bounding_sphere(&corners);

    let scaled = radius * 16.0;
    assert!(
        (scaled - scaled.round()).abs() < 1e-3,
        "radius {radius} is not a multiple of 1/16"
    );
}

// ============================================================================
// Light matrices
// ============================================================================

#[test]
fn cascade_matrices_center_the_slice() {
    let centroid = Vec3::new(3.0, 1.0, -2.0);
    let radius = 8.0;
    let (view, projection) = build_cascade_matrices(Vec3::new(0.0, -1.0, 0.2), centroid, radius);

    // The centroid sits on the light view axis at distance radius.
    let in_light_space = view.transform_point3(centroid);
    assert!(in_light_space.x.abs() < EPSILON);
    assert!(in_light_space.y.abs() < EPSILON);
    assert!(approx(in_light_space.z, -radius));

    assert!(projection.determinant().abs() > 1e-10);
    for value in (projection * view).to_cols_array() {
        assert!(value.is_finite());
    }
}

#[test]
fn cascade_matrices_survive_degenerate_light_direction() {
    let (view, projection) = build_cascade_matrices(Vec3::ZERO, Vec3::ZERO, 4.0);
    for value in (projection * view).to_cols_array() {
        assert!(value.is_finite());
    }
}

#[test]
fn light_data_far_range_matches_split_depths() {
    let camera = test_camera(1.0, 1000.0);
    let lambda = 0.95;
    let cascades = compute_cascade_light_data(&camera, Vec3::new(-0.3, -1.0, -0.2), 4, lambda);
    let splits = compute_cascade_splits(4, camera.near, camera.far, lambda);

    assert_eq!(cascades.len(), 4);
    let clip_range = camera.far - camera.near;
    for (cascade, &split) in cascades.iter().zip(&splits) {
        let expected = -(camera.near + split * clip_range);
        assert!(
            approx(cascade.far_range, expected),
            "far_range: expected {expected}, got {}",
            cascade.far_range
        );
        assert!(cascade.far_range < 0.0);
    }

    // Ranges march away from the camera.
    for i in 1..cascades.len() {
        assert!(cascades[i].far_range < cascades[i - 1].far_range);
    }
}

#[test]
fn light_data_is_refreshed_not_accumulated() {
    let camera = test_camera(1.0, 500.0);
    let a = compute_cascade_light_data(&camera, Vec3::NEG_Y, 4, 0.95);
    let b = compute_cascade_light_data(&camera, Vec3::NEG_Y, 4, 0.95);
    assert_eq!(a, b);

    let mut moved = camera.clone();
    moved.look_at(Vec3::new(50.0, 2.0, 5.0), Vec3::new(50.0, 0.0, 0.0), Vec3::Y);
    let c = compute_cascade_light_data(&moved, Vec3::NEG_Y, 4, 0.95);
    assert_ne!(a[0].view, c[0].view);
}

// ============================================================================
// Matrix sanity
// ============================================================================

#[test]
fn cascade_view_projection_has_no_nans() {
    let camera = test_camera(0.1, 2000.0);
    for cascade in compute_cascade_light_data(&camera, Vec3::new(0.2, -0.9, 0.4), 4, 0.95) {
        let vp: Mat4 = cascade.projection * cascade.view;
        for value in vp.to_cols_array() {
            assert!(!value.is_nan());
            assert!(!value.is_infinite());
        }
    }
}
