//! Renderer Settings
//!
//! Configuration consumed once at renderer construction. Shadow and GI
//! parameters are immutable afterwards; resizing the probe grid goes
//! through [`DdgiSystem::rebuild`](crate::renderer::ddgi::DdgiSystem::rebuild)
//! rather than a settings mutation.

use glam::Vec3;

use crate::rhi::descriptors::Format;

// ---------------------------------------------------------------------------
// ShadowSettings
// ---------------------------------------------------------------------------

/// Cascaded shadow map configuration.
///
/// | Field            | Description                                | Default |
/// |------------------|--------------------------------------------|---------|
/// | `cascade_count`  | Number of shadow cascades                  | 4       |
/// | `min_resolution` | Lower bound on per-cascade map resolution  | 512     |
/// | `max_resolution` | Upper bound on per-cascade map resolution  | 2048    |
/// | `split_lambda`   | Log/uniform split blend (1 = logarithmic)  | 0.95    |
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowSettings {
    pub cascade_count: u32,
    pub min_resolution: u32,
    pub max_resolution: u32,
    /// Blend between uniform (`0.0`) and logarithmic (`1.0`) cascade
    /// splits. High values concentrate resolution near the camera.
    pub split_lambda: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            cascade_count: 4,
            min_resolution: 512,
            max_resolution: 2048,
            split_lambda: 0.95,
        }
    }
}

impl ShadowSettings {
    /// Effective per-cascade resolution: all cascades currently share the
    /// maximum, clamped into the configured range.
    #[must_use]
    pub fn resolution(&self) -> u32 {
        self.max_resolution.max(self.min_resolution)
    }
}

// ---------------------------------------------------------------------------
// GiSettings
// ---------------------------------------------------------------------------

/// Dynamic diffuse global illumination configuration.
///
/// | Field             | Description                                  | Default |
/// |-------------------|----------------------------------------------|---------|
/// | `probe_distance`  | Inter-probe spacing, world units             | 1.0     |
/// | `rays_per_probe`  | Rays traced per probe per frame              | 256     |
/// | `irradiance_tile` | Octahedral tile size, irradiance atlas       | 8       |
/// | `depth_tile`      | Octahedral tile size, depth atlas            | 16      |
/// | `hysteresis`      | Temporal blend toward history (0..1)         | 0.98    |
/// | `depth_sharpness` | Chebyshev visibility falloff exponent        | 50.0    |
/// | `normal_bias`     | Surface offset to avoid self-shadowing       | 0.25    |
#[derive(Debug, Clone, PartialEq)]
pub struct GiSettings {
    pub probe_distance: f32,
    pub rays_per_probe: u32,
    pub irradiance_tile: u32,
    pub depth_tile: u32,
    /// Fraction of the previous probe value kept each update. Higher is
    /// more stable but converges slower.
    pub hysteresis: f32,
    pub depth_sharpness: f32,
    pub normal_bias: f32,
}

impl Default for GiSettings {
    fn default() -> Self {
        Self {
            probe_distance: 1.0,
            rays_per_probe: 256,
            irradiance_tile: 8,
            depth_tile: 16,
            hysteresis: 0.98,
            depth_sharpness: 50.0,
            normal_bias: 0.25,
        }
    }
}

// ---------------------------------------------------------------------------
// RendererSettings
// ---------------------------------------------------------------------------

/// Global configuration for renderer initialization.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererSettings {
    /// Framebuffer clear color.
    pub clear_color: [f32; 4],
    /// Depth buffer format for the main pass.
    pub depth_format: Format,
    /// World-space direction the sun shines in (normalized on use).
    pub light_direction: Vec3,
    pub shadow: ShadowSettings,
    pub gi: GiSettings,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            depth_format: Format::Depth32Float,
            light_direction: Vec3::new(-0.4, -1.0, -0.3),
            shadow: ShadowSettings::default(),
            gi: GiSettings::default(),
        }
    }
}
