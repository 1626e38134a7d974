//! Frame Context
//!
//! Per-frame state threaded explicitly through render calls. Nothing here
//! is a process-wide global, so tests can construct independent frame
//! contexts and replay exact sequences.

use glam::{Mat4, Vec3};
use rand::rngs::StdRng;
use rand::{RngExt, SeedableRng};

/// Explicit per-frame state.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub frame_index: u64,
    /// True on the very first rendered frame; consumers use it to skip
    /// temporal blending against non-existent history.
    pub first_frame: bool,
    pub delta_time: f32,
    /// Fresh random rotation for this frame's GI rays.
    pub random_rotation: Mat4,
}

impl FrameContext {
    /// Builds the context for frame `frame_index`.
    ///
    /// The ray rotation is seeded from the frame index, so a given frame
    /// number always traces the same ray set while consecutive frames stay
    /// decorrelated.
    #[must_use]
    pub fn new(frame_index: u64, delta_time: f32) -> Self {
        let mut rng = StdRng::seed_from_u64(frame_index.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        Self {
            frame_index,
            first_frame: frame_index == 0,
            delta_time,
            random_rotation: random_rotation(&mut rng),
        }
    }

    /// Variant with a caller-chosen rotation, for tests and replay.
    #[must_use]
    pub fn with_rotation(frame_index: u64, delta_time: f32, rotation: Mat4) -> Self {
        Self {
            frame_index,
            first_frame: frame_index == 0,
            delta_time,
            random_rotation: rotation,
        }
    }
}

/// Uniformly distributed random rotation about a random axis.
fn random_rotation(rng: &mut StdRng) -> Mat4 {
    let axis = loop {
        let candidate = Vec3::new(
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
            rng.random_range(-1.0..=1.0),
        );
        let length_squared = candidate.length_squared();
        if length_squared > 1e-4 && length_squared <= 1.0 {
            break candidate / length_squared.sqrt();
        }
    };
    let angle = rng.random_range(0.0..std::f32::consts::TAU);
    Mat4::from_axis_angle(axis, angle)
}
