//! Probe Grid & Atlas Utilities
//!
//! Pure math for the irradiance probe grid and its octahedral atlases,
//! extracted from the GI passes for reuse and testability.
//!
//! # Atlas layout
//!
//! Each probe owns one square octahedral tile. Tiles are laid out in a 2D
//! grid of `counts.x * counts.y` columns by `counts.z` rows. Every tile
//! carries a 1-pixel border halo (so bilinear taps at a tile edge stay
//! inside that probe's data), and the atlas as a whole carries a 1-pixel
//! margin on each side. Atlas extents are therefore
//! `(tile + 2) * tiles_per_axis + 2` and must always be re-derived from
//! the probe counts, never cached independently of them.

use glam::{UVec2, UVec3, Vec3};

use crate::rhi::descriptors::Extent2d;
use crate::scene::BoundingBox;

/// An implicit 3D lattice of GI probes covering a scene's bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeGrid {
    /// Probes per axis, including one padding probe on each side.
    pub counts: UVec3,
    /// World position of probe (0, 0, 0).
    pub origin: Vec3,
    /// Inter-probe spacing, world units.
    pub spacing: f32,
}

impl ProbeGrid {
    /// Sizes a grid for `bounds`: `ceil(extent / spacing) + 2` probes per
    /// axis, the +2 being padding probes so trilinear interpolation stays
    /// inside the grid at the scene boundary. The origin sits one spacing
    /// outside the minimum corner.
    #[must_use]
    pub fn from_bounds(bounds: &BoundingBox, spacing: f32) -> Self {
        let extent = bounds.extent().max(Vec3::ZERO);
        let counts = UVec3::new(
            (extent.x / spacing).ceil() as u32 + 2,
            (extent.y / spacing).ceil() as u32 + 2,
            (extent.z / spacing).ceil() as u32 + 2,
        );
        Self {
            counts,
            origin: bounds.min - Vec3::splat(spacing),
            spacing,
        }
    }

    /// Total probe count.
    #[must_use]
    pub fn probe_count(&self) -> u32 {
        self.counts.x * self.counts.y * self.counts.z
    }

    /// Flat index of a grid coordinate (x fastest, then y, then z).
    #[must_use]
    pub fn probe_index(&self, coord: UVec3) -> u32 {
        coord.x + coord.y * self.counts.x + coord.z * self.counts.x * self.counts.y
    }

    /// Grid coordinate of a flat probe index.
    #[must_use]
    pub fn probe_coord(&self, index: u32) -> UVec3 {
        let slice = self.counts.x * self.counts.y;
        UVec3::new(
            index % self.counts.x,
            (index % slice) / self.counts.x,
            index / slice,
        )
    }

    /// World position of a probe.
    #[must_use]
    pub fn probe_position(&self, coord: UVec3) -> Vec3 {
        self.origin + coord.as_vec3() * self.spacing
    }
}

// ============================================================================
// Octahedral atlas
// ============================================================================

/// Atlas extent for a probe grid with square tiles of `tile_size` texels:
/// `(tile + 2) * (counts.x * counts.y) + 2` wide by
/// `(tile + 2) * counts.z + 2` tall.
#[must_use]
pub fn atlas_extent(counts: UVec3, tile_size: u32) -> Extent2d {
    Extent2d::new(
        (tile_size + 2) * (counts.x * counts.y) + 2,
        (tile_size + 2) * counts.z + 2,
    )
}

/// Top-left texel of a probe's tile interior (inside its halo).
///
/// Column is the probe's index within its XY slice, row is its Z layer.
#[must_use]
pub fn probe_tile_origin(counts: UVec3, probe_index: u32, tile_size: u32) -> UVec2 {
    let slice = counts.x * counts.y;
    let column = probe_index % slice;
    let row = probe_index / slice;
    UVec2::new(
        2 + column * (tile_size + 2),
        2 + row * (tile_size + 2),
    )
}
