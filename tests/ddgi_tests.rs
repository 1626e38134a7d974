//! DDGI probe grid and atlas tests
//!
//! Tests for:
//! - Probe count derivation from scene bounds
//! - Grid coverage of the bounds (padding probes included)
//! - Probe index / coordinate round-trips
//! - Octahedral atlas sizing and tile placement
//! - System construction and rebuild against the recording backend

use std::sync::Arc;

use glam::{UVec3, Vec3};
use ember::renderer::ddgi::DdgiSystem;
use ember::renderer::ddgi_utils::{atlas_extent, probe_tile_origin, ProbeGrid};
use ember::rhi::descriptors::{
    DescriptorBinding, DescriptorSetLayoutDesc, DescriptorType, ShaderModuleDesc, ShaderStage,
};
use ember::rhi::{GraphicsContext, RecordingContext};
use ember::scene::BoundingBox;
use ember::settings::GiSettings;
use ember::ShaderLibrary;

// ============================================================================
// Helpers
// ============================================================================

fn bounds(min: Vec3, max: Vec3) -> BoundingBox {
    BoundingBox::new(min, max)
}

fn test_shaders(ctx: &Arc<RecordingContext>) -> ShaderLibrary {
    let module = |stage: ShaderStage, label: &'static str| {
        ctx.create_shader_module(&ShaderModuleDesc {
            spirv: Vec::new(),
            entry_point: "main",
            stage,
            label,
        })
        .unwrap()
    };
    ShaderLibrary {
        forward_vertex: module(ShaderStage::Vertex, "forward.vert"),
        forward_fragment: module(ShaderStage::Fragment, "forward.frag"),
        shadow_vertex: module(ShaderStage::Vertex, "shadow.vert"),
        ddgi_ray_generation: module(ShaderStage::RayGeneration, "ddgi.rgen"),
        ddgi_miss: module(ShaderStage::Miss, "ddgi.rmiss"),
        ddgi_closest_hit: module(ShaderStage::ClosestHit, "ddgi.rchit"),
        probe_depth_update: module(ShaderStage::Compute, "probe_depth.comp"),
        probe_irradiance_update: module(ShaderStage::Compute, "probe_irradiance.comp"),
        probe_border_depth: module(ShaderStage::Compute, "border_depth.comp"),
        probe_border_irradiance: module(ShaderStage::Compute, "border_irradiance.comp"),
    }
}

fn scene_layout(ctx: &Arc<RecordingContext>) -> ember::Handle<ember::rhi::DescriptorSetLayout> {
    ctx.create_descriptor_set_layout(&DescriptorSetLayoutDesc {
        bindings: vec![DescriptorBinding {
            binding: 0,
            ty: DescriptorType::AccelerationStructure,
            count: 1,
        }],
        label: "TestSceneLayout",
    })
    .unwrap()
}

// ============================================================================
// Probe grid
// ============================================================================

#[test]
fn probe_counts_follow_ceil_plus_padding() {
    let grid = ProbeGrid::from_bounds(&bounds(Vec3::ZERO, Vec3::new(4.0, 2.0, 8.0)), 1.0);
    assert_eq!(grid.counts, UVec3::new(6, 4, 10));
}

#[test]
fn probe_counts_round_fractional_extents_up() {
    let grid = ProbeGrid::from_bounds(&bounds(Vec3::ZERO, Vec3::new(3.5, 0.1, 1.0)), 1.0);
    assert_eq!(grid.counts, UVec3::new(6, 3, 3));
}

#[test]
fn probe_grid_covers_the_bounds() {
    let b = bounds(Vec3::new(-3.0, 0.0, 2.0), Vec3::new(5.0, 4.5, 9.0));
    let grid = ProbeGrid::from_bounds(&b, 1.5);

    let first = grid.probe_position(UVec3::ZERO);
    let last = grid.probe_position(grid.counts - UVec3::ONE);
    assert!(first.cmple(b.min).all(), "grid starts inside bounds: {first:?}");
    assert!(last.cmpge(b.max).all(), "grid ends inside bounds: {last:?}");
}

#[test]
fn probe_index_round_trips() {
    let grid = ProbeGrid::from_bounds(&bounds(Vec3::ZERO, Vec3::new(4.0, 3.0, 2.0)), 1.0);
    for index in 0..grid.probe_count() {
        let coord = grid.probe_coord(index);
        assert_eq!(grid.probe_index(coord), index);
        assert!(coord.cmplt(grid.counts).all());
    }
}

#[test]
fn probe_positions_are_spaced_on_the_lattice() {
    let grid = ProbeGrid::from_bounds(&bounds(Vec3::ZERO, Vec3::splat(2.0)), 0.5);
    let a = grid.probe_position(UVec3::new(1, 0, 0));
    let b = grid.probe_position(UVec3::new(2, 0, 0));
    assert!((b - a - Vec3::new(0.5, 0.0, 0.0)).length() < 1e-6);
}

// ============================================================================
// Atlas layout
// ============================================================================

#[test]
fn atlas_extent_matches_tile_formula() {
    // Width: (tile + 2) * (counts.x * counts.y) + 2; height uses counts.z.
    let counts = UVec3::new(6, 4, 10);
    let extent = atlas_extent(counts, 8);
    assert_eq!(extent.width, (8 + 2) * 24 + 2);
    assert_eq!(extent.height, (8 + 2) * 10 + 2);

    let depth_extent = atlas_extent(counts, 16);
    assert_eq!(depth_extent.width, (16 + 2) * 24 + 2);
    assert_eq!(depth_extent.height, (16 + 2) * 10 + 2);
}

#[test]
fn tile_origin_accounts_for_margin_and_halo() {
    let counts = UVec3::new(2, 2, 3);
    let tile = 8;

    // First probe: 1-px atlas margin + 1-px tile halo.
    assert_eq!(probe_tile_origin(counts, 0, tile).to_array(), [2, 2]);
    // Next probe in the same XY slice advances one tile block.
    assert_eq!(probe_tile_origin(counts, 1, tile).to_array(), [2 + (tile + 2), 2]);
    // First probe of the next Z layer starts a new row.
    assert_eq!(probe_tile_origin(counts, 4, tile).to_array(), [2, 2 + (tile + 2)]);
}

#[test]
fn tiles_stay_inside_the_atlas() {
    let counts = UVec3::new(3, 2, 4);
    let tile = 8;
    let extent = atlas_extent(counts, tile);

    let probe_count = counts.x * counts.y * counts.z;
    for index in 0..probe_count {
        let origin = probe_tile_origin(counts, index, tile);
        assert!(origin.x + tile + 1 <= extent.width, "tile {index} overflows width");
        assert!(origin.y + tile + 1 <= extent.height, "tile {index} overflows height");
    }
}

// ============================================================================
// System construction
// ============================================================================

#[test]
fn ddgi_atlases_are_allocated_at_derived_extents() {
    let ctx = Arc::new(RecordingContext::new(256, 256));
    let shaders = test_shaders(&ctx);
    let layout = scene_layout(&ctx);
    let settings = GiSettings::default();
    let b = bounds(Vec3::ZERO, Vec3::new(6.0, 3.0, 6.0));

    let system = DdgiSystem::new(
        &(ctx.clone() as Arc<dyn GraphicsContext>),
        &b,
        &settings,
        &shaders,
        layout,
    )
    .unwrap();

    let expected_irradiance = atlas_extent(system.grid().counts, settings.irradiance_tile);
    let expected_depth = atlas_extent(system.grid().counts, settings.depth_tile);

    for parity in 0..2 {
        let irradiance = ctx.texture_desc(system.irradiance_atlas(parity)).unwrap();
        assert_eq!(irradiance.extent, expected_irradiance);
        let depth = ctx.texture_desc(system.depth_atlas(parity)).unwrap();
        assert_eq!(depth.extent, expected_depth);
    }
}

#[test]
fn ddgi_rebuild_resizes_the_grid() {
    let ctx = Arc::new(RecordingContext::new(256, 256));
    let shaders = test_shaders(&ctx);
    let layout = scene_layout(&ctx);
    let settings = GiSettings::default();

    let small = bounds(Vec3::ZERO, Vec3::splat(2.0));
    let large = bounds(Vec3::ZERO, Vec3::splat(10.0));

    let shared_ctx = ctx.clone() as Arc<dyn GraphicsContext>;
    let mut system = DdgiSystem::new(&shared_ctx, &small, &settings, &shaders, layout).unwrap();
    let old_counts = system.grid().counts;
    let old_atlas = system.irradiance_atlas(0);

    system.rebuild(&shared_ctx, &large).unwrap();
    assert_ne!(system.grid().counts, old_counts);
    assert_eq!(system.bounds(), large);
    assert_eq!(system.write_index(), 0);

    // The old atlas was destroyed with its grid.
    assert!(ctx.texture_desc(system.irradiance_atlas(0)).is_some());
    assert_ne!(system.irradiance_atlas(0), old_atlas);

    let expected = atlas_extent(system.grid().counts, settings.irradiance_tile);
    assert_eq!(ctx.texture_desc(system.irradiance_atlas(0)).unwrap().extent, expected);
}
