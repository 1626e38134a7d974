//! Dynamic Diffuse Global Illumination
//!
//! A grid of light probes covering the scene bounds, re-lit every frame by
//! ray tracing. Probe irradiance and mean depth live in double-buffered
//! octahedral atlases; each frame reads the previous atlases (multi-bounce
//! accumulation) while writing the current ones.
//!
//! # Per-frame sequence
//!
//! RayTrace → UpdateProbes(depth, irradiance) → UpdateBorder(depth,
//! irradiance), strictly in that order: the probe update reads the traced
//! rays, and the border stitch reads the probe update's writes. The whole
//! sequence is recorded by [`DdgiSystem::record`]; the phases are private,
//! so callers cannot reorder or skip one. Write-after-write hazards
//! between the probe and border phases are fenced with explicit image
//! barriers, not submission order.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::errors::Result;
use crate::renderer::ddgi_utils::{atlas_extent, ProbeGrid};
use crate::renderer::frame::FrameContext;
use crate::renderer::ShaderLibrary;
use crate::rhi::context::{CommandRecorder, GraphicsContext, SubmitInfo};
use crate::rhi::descriptors::{
    Buffer, BufferDesc, BufferUsage, ComputePipeline, ComputePipelineDesc, DescriptorBinding,
    DescriptorSet, DescriptorSetDesc, DescriptorSetLayout, DescriptorSetLayoutDesc,
    DescriptorType, DescriptorWrite, Format, ImageLayout, MemoryLocation, RayTracingPipeline,
    RayTracingPipelineDesc, Sampler, SamplerDesc, Texture, TextureDesc, TextureUsage,
};
use crate::rhi::handle::{Handle, Holder};
use crate::scene::BoundingBox;
use crate::settings::GiSettings;

// ============================================================================
// GPU data
// ============================================================================

/// Probe grid constants uploaded once per grid (re-uploaded on rebuild).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DdgiUniforms {
    pub grid_origin: [f32; 3],
    pub spacing: f32,
    pub counts: [u32; 3],
    pub rays_per_probe: u32,
    pub hysteresis: f32,
    pub depth_sharpness: f32,
    pub normal_bias: f32,
    pub irradiance_tile: u32,
    pub depth_tile: u32,
    pub _padding: [u32; 3],
}

/// Push constants for the ray generation shader.
///
/// The rotation decorrelates ray directions frame to frame; the first
/// frame flag disables temporal blending on the very first update (there
/// is no history to blend with).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct TracePushConstants {
    pub ray_rotation: Mat4,
    pub first_frame: u32,
    pub _padding: [u32; 3],
}

// ============================================================================
// Grid-sized resources
// ============================================================================

/// Everything whose size derives from the probe grid. Replaced wholesale
/// by [`DdgiSystem::rebuild`].
struct GridResources {
    grid: ProbeGrid,
    bounds: BoundingBox,

    /// Double-buffered octahedral atlases, indexed by write parity.
    irradiance: [Holder<Texture>; 2],
    depth: [Holder<Texture>; 2],

    ray_radiance: Holder<Texture>,
    ray_hit: Holder<Texture>,

    uniform_buffer: Holder<Buffer>,

    /// Per-parity descriptor sets: index w reads atlases `1 - w` and
    /// writes atlases `w`.
    trace_sets: [Holder<DescriptorSet>; 2],
    probe_sets: [Holder<DescriptorSet>; 2],
    border_sets: [Holder<DescriptorSet>; 2],
}

// ============================================================================
// System
// ============================================================================

/// Probe-based dynamic diffuse GI.
///
/// The grid is sized once from the scene bounds given at construction.
/// Geometry that later moves outside those bounds is not re-lit by the
/// probes; [`DdgiSystem::rebuild`] is the only way to resize the grid.
pub struct DdgiSystem {
    settings: GiSettings,

    sampler: Holder<Sampler>,
    trace_layout: Holder<DescriptorSetLayout>,
    probe_layout: Holder<DescriptorSetLayout>,
    border_layout: Holder<DescriptorSetLayout>,

    trace_pipeline: Holder<RayTracingPipeline>,
    probe_depth_pipeline: Holder<ComputePipeline>,
    probe_irradiance_pipeline: Holder<ComputePipeline>,
    border_depth_pipeline: Holder<ComputePipeline>,
    border_irradiance_pipeline: Holder<ComputePipeline>,

    resources: GridResources,

    write_index: usize,
    reset_accumulation: bool,
}

impl DdgiSystem {
    /// Builds the probe grid from `scene_bounds`, allocates the atlases
    /// and ray output images, and creates the trace/update/border
    /// pipelines. `scene_set_layout` is the renderer's geometry set
    /// (acceleration structure, geometry addresses, MVP, per-mesh data)
    /// bound at set 0 of the trace pipeline.
    pub fn new(
        ctx: &Arc<dyn GraphicsContext>,
        scene_bounds: &BoundingBox,
        settings: &GiSettings,
        shaders: &ShaderLibrary,
        scene_set_layout: Handle<DescriptorSetLayout>,
    ) -> Result<Self> {
        let sampler = Holder::new(
            ctx.clone(),
            ctx.create_sampler(&SamplerDesc {
                label: "ProbeSampler",
                ..Default::default()
            })?,
        );

        let trace_layout = Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set_layout(&DescriptorSetLayoutDesc {
                bindings: vec![
                    binding(0, DescriptorType::StorageTexture),
                    binding(1, DescriptorType::StorageTexture),
                    binding(2, DescriptorType::UniformBuffer),
                    binding(3, DescriptorType::SampledTexture),
                    binding(4, DescriptorType::SampledTexture),
                    binding(5, DescriptorType::Sampler),
                ],
                label: "DdgiTraceLayout",
            })?,
        );
        let probe_layout = Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set_layout(&DescriptorSetLayoutDesc {
                bindings: vec![
                    binding(0, DescriptorType::SampledTexture),
                    binding(1, DescriptorType::SampledTexture),
                    binding(2, DescriptorType::StorageTexture),
                    binding(3, DescriptorType::StorageTexture),
                    binding(4, DescriptorType::SampledTexture),
                    binding(5, DescriptorType::SampledTexture),
                    binding(6, DescriptorType::UniformBuffer),
                ],
                label: "DdgiProbeUpdateLayout",
            })?,
        );
        let border_layout = Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set_layout(&DescriptorSetLayoutDesc {
                bindings: vec![
                    binding(0, DescriptorType::StorageTexture),
                    binding(1, DescriptorType::StorageTexture),
                    binding(2, DescriptorType::UniformBuffer),
                ],
                label: "DdgiBorderLayout",
            })?,
        );

        let trace_pipeline = Holder::new(
            ctx.clone(),
            ctx.create_ray_tracing_pipeline(&RayTracingPipelineDesc {
                ray_generation_shader: shaders.ddgi_ray_generation,
                miss_shader: shaders.ddgi_miss,
                closest_hit_shader: shaders.ddgi_closest_hit,
                set_layouts: vec![scene_set_layout, trace_layout.handle()],
                max_recursion_depth: 1,
                push_constant_size: std::mem::size_of::<TracePushConstants>() as u32,
                label: "DdgiTracePipeline",
            })?,
        );
        let probe_depth_pipeline = Holder::new(
            ctx.clone(),
            ctx.create_compute_pipeline(&ComputePipelineDesc {
                shader: shaders.probe_depth_update,
                set_layouts: vec![probe_layout.handle()],
                push_constant_size: 0,
                label: "DdgiProbeDepthPipeline",
            })?,
        );
        let probe_irradiance_pipeline = Holder::new(
            ctx.clone(),
            ctx.create_compute_pipeline(&ComputePipelineDesc {
                shader: shaders.probe_irradiance_update,
                set_layouts: vec![probe_layout.handle()],
                push_constant_size: 0,
                label: "DdgiProbeIrradiancePipeline",
            })?,
        );
        let border_depth_pipeline = Holder::new(
            ctx.clone(),
            ctx.create_compute_pipeline(&ComputePipelineDesc {
                shader: shaders.probe_border_depth,
                set_layouts: vec![border_layout.handle()],
                push_constant_size: 0,
                label: "DdgiBorderDepthPipeline",
            })?,
        );
        let border_irradiance_pipeline = Holder::new(
            ctx.clone(),
            ctx.create_compute_pipeline(&ComputePipelineDesc {
                shader: shaders.probe_border_irradiance,
                set_layouts: vec![border_layout.handle()],
                push_constant_size: 0,
                label: "DdgiBorderIrradiancePipeline",
            })?,
        );

        let resources = Self::create_grid_resources(
            ctx,
            scene_bounds,
            settings,
            sampler.handle(),
            trace_layout.handle(),
            probe_layout.handle(),
            border_layout.handle(),
        )?;

        Ok(Self {
            settings: settings.clone(),
            sampler,
            trace_layout,
            probe_layout,
            border_layout,
            trace_pipeline,
            probe_depth_pipeline,
            probe_irradiance_pipeline,
            border_depth_pipeline,
            border_irradiance_pipeline,
            resources,
            write_index: 0,
            reset_accumulation: true,
        })
    }

    fn create_grid_resources(
        ctx: &Arc<dyn GraphicsContext>,
        bounds: &BoundingBox,
        settings: &GiSettings,
        sampler: Handle<Sampler>,
        trace_layout: Handle<DescriptorSetLayout>,
        probe_layout: Handle<DescriptorSetLayout>,
        border_layout: Handle<DescriptorSetLayout>,
    ) -> Result<GridResources> {
        let grid = ProbeGrid::from_bounds(bounds, settings.probe_distance);
        let probe_count = grid.probe_count();

        let irradiance_extent = atlas_extent(grid.counts, settings.irradiance_tile);
        let depth_extent = atlas_extent(grid.counts, settings.depth_tile);

        log::info!(
            "ddgi: {}x{}x{} probes ({probe_count}), irradiance atlas {}x{}, depth atlas {}x{}",
            grid.counts.x,
            grid.counts.y,
            grid.counts.z,
            irradiance_extent.width,
            irradiance_extent.height,
            depth_extent.width,
            depth_extent.height,
        );

        let atlas_usage = TextureUsage::STORAGE | TextureUsage::SAMPLED;
        let make_atlas = |extent: crate::rhi::descriptors::Extent2d,
                          format: Format,
                          label: &'static str|
         -> Result<Holder<Texture>> {
            Ok(Holder::new(
                ctx.clone(),
                ctx.create_texture(&TextureDesc {
                    extent,
                    format,
                    usage: atlas_usage,
                    mip_levels: 1,
                    layers: 1,
                    label,
                })?,
            ))
        };

        let irradiance = [
            make_atlas(irradiance_extent, Format::R11G11B10Float, "ProbeIrradiance0")?,
            make_atlas(irradiance_extent, Format::R11G11B10Float, "ProbeIrradiance1")?,
        ];
        let depth = [
            make_atlas(depth_extent, Format::Rg16Float, "ProbeDepth0")?,
            make_atlas(depth_extent, Format::Rg16Float, "ProbeDepth1")?,
        ];

        let ray_extent =
            crate::rhi::descriptors::Extent2d::new(settings.rays_per_probe, probe_count);
        let ray_radiance = make_atlas(ray_extent, Format::Rgba16Float, "ProbeRayRadiance")?;
        let ray_hit = make_atlas(ray_extent, Format::Rgba16Float, "ProbeRayHit")?;

        let uniforms = DdgiUniforms {
            grid_origin: grid.origin.to_array(),
            spacing: grid.spacing,
            counts: grid.counts.to_array(),
            rays_per_probe: settings.rays_per_probe,
            hysteresis: settings.hysteresis,
            depth_sharpness: settings.depth_sharpness,
            normal_bias: settings.normal_bias,
            irradiance_tile: settings.irradiance_tile,
            depth_tile: settings.depth_tile,
            _padding: [0; 3],
        };
        let uniform_buffer = Holder::new(
            ctx.clone(),
            ctx.create_buffer(&BufferDesc {
                size: std::mem::size_of::<DdgiUniforms>() as u64,
                usage: BufferUsage::UNIFORM,
                memory: MemoryLocation::HostVisible,
                label: "DdgiUniforms",
            })?,
        );
        ctx.update_buffer(uniform_buffer.handle(), 0, bytemuck::bytes_of(&uniforms))?;

        // Per-parity sets: parity w writes atlases [w] and reads [1 - w].
        let make_sets = |write: usize| -> Result<(Holder<DescriptorSet>, Holder<DescriptorSet>, Holder<DescriptorSet>)> {
            let read = 1 - write;
            let trace = Holder::new(
                ctx.clone(),
                ctx.create_descriptor_set(&DescriptorSetDesc {
                    layout: trace_layout,
                    writes: vec![
                        DescriptorWrite::StorageTexture(ray_radiance.handle()),
                        DescriptorWrite::StorageTexture(ray_hit.handle()),
                        DescriptorWrite::UniformBuffer(uniform_buffer.handle()),
                        DescriptorWrite::SampledTexture(irradiance[read].handle()),
                        DescriptorWrite::SampledTexture(depth[read].handle()),
                        DescriptorWrite::Sampler(sampler),
                    ],
                    label: "DdgiTraceSet",
                })?,
            );
            let probe = Holder::new(
                ctx.clone(),
                ctx.create_descriptor_set(&DescriptorSetDesc {
                    layout: probe_layout,
                    writes: vec![
                        DescriptorWrite::SampledTexture(ray_radiance.handle()),
                        DescriptorWrite::SampledTexture(ray_hit.handle()),
                        DescriptorWrite::StorageTexture(irradiance[write].handle()),
                        DescriptorWrite::StorageTexture(depth[write].handle()),
                        DescriptorWrite::SampledTexture(irradiance[read].handle()),
                        DescriptorWrite::SampledTexture(depth[read].handle()),
                        DescriptorWrite::UniformBuffer(uniform_buffer.handle()),
                    ],
                    label: "DdgiProbeUpdateSet",
                })?,
            );
            let border = Holder::new(
                ctx.clone(),
                ctx.create_descriptor_set(&DescriptorSetDesc {
                    layout: border_layout,
                    writes: vec![
                        DescriptorWrite::StorageTexture(irradiance[write].handle()),
                        DescriptorWrite::StorageTexture(depth[write].handle()),
                        DescriptorWrite::UniformBuffer(uniform_buffer.handle()),
                    ],
                    label: "DdgiBorderSet",
                })?,
            );
            Ok((trace, probe, border))
        };
        let (trace0, probe0, border0) = make_sets(0)?;
        let (trace1, probe1, border1) = make_sets(1)?;

        // All probe textures start sampleable; every phase transitions in
        // and back out.
        let mut init = ctx.acquire_recorder();
        for texture in [
            irradiance[0].handle(),
            irradiance[1].handle(),
            depth[0].handle(),
            depth[1].handle(),
            ray_radiance.handle(),
            ray_hit.handle(),
        ] {
            init.transition_image(texture, ImageLayout::Undefined, ImageLayout::ShaderReadOnly);
        }
        ctx.submit(init, &SubmitInfo::default())?;

        Ok(GridResources {
            grid,
            bounds: *bounds,
            irradiance,
            depth,
            ray_radiance,
            ray_hit,
            uniform_buffer,
            trace_sets: [trace0, trace1],
            probe_sets: [probe0, probe1],
            border_sets: [border0, border1],
        })
    }

    // ========================================================================
    // Per-frame recording
    // ========================================================================

    /// Records the full GI update for one frame.
    ///
    /// The three phases always run, in order, inside this one call; there
    /// is no public way to run them individually. `scene_set` is the
    /// renderer's geometry set for the trace pipeline.
    pub fn record(
        &mut self,
        frame: &FrameContext,
        recorder: &mut dyn CommandRecorder,
        scene_set: Handle<DescriptorSet>,
    ) {
        let write = self.write_index;

        self.ray_trace(frame, recorder, scene_set, write);
        self.update_probes(recorder, write);
        self.update_border(recorder, write);

        // Next frame reads what this frame wrote.
        self.write_index = 1 - write;
        self.reset_accumulation = false;
    }

    fn ray_trace(
        &self,
        frame: &FrameContext,
        recorder: &mut dyn CommandRecorder,
        scene_set: Handle<DescriptorSet>,
        write: usize,
    ) {
        let res = &self.resources;
        recorder.transition_image(
            res.ray_radiance.handle(),
            ImageLayout::ShaderReadOnly,
            ImageLayout::General,
        );
        recorder.transition_image(
            res.ray_hit.handle(),
            ImageLayout::ShaderReadOnly,
            ImageLayout::General,
        );

        recorder.bind_ray_tracing_pipeline(self.trace_pipeline.handle());
        recorder.bind_descriptor_set(0, scene_set);
        recorder.bind_descriptor_set(1, res.trace_sets[write].handle());

        let push = TracePushConstants {
            ray_rotation: frame.random_rotation,
            first_frame: u32::from(frame.first_frame || self.reset_accumulation),
            _padding: [0; 3],
        };
        recorder.push_constants(0, bytemuck::bytes_of(&push));
        recorder.trace_rays(self.settings.rays_per_probe, res.grid.probe_count(), 1);

        recorder.transition_image(
            res.ray_radiance.handle(),
            ImageLayout::General,
            ImageLayout::ShaderReadOnly,
        );
        recorder.transition_image(
            res.ray_hit.handle(),
            ImageLayout::General,
            ImageLayout::ShaderReadOnly,
        );
    }

    fn update_probes(&self, recorder: &mut dyn CommandRecorder, write: usize) {
        let res = &self.resources;
        let groups = self.probe_dispatch_size();

        recorder.transition_image(
            res.depth[write].handle(),
            ImageLayout::ShaderReadOnly,
            ImageLayout::General,
        );
        recorder.transition_image(
            res.irradiance[write].handle(),
            ImageLayout::ShaderReadOnly,
            ImageLayout::General,
        );

        recorder.bind_compute_pipeline(self.probe_depth_pipeline.handle());
        recorder.bind_descriptor_set(0, res.probe_sets[write].handle());
        recorder.dispatch(groups.0, groups.1, 1);

        recorder.bind_compute_pipeline(self.probe_irradiance_pipeline.handle());
        recorder.bind_descriptor_set(0, res.probe_sets[write].handle());
        recorder.dispatch(groups.0, groups.1, 1);
    }

    fn update_border(&self, recorder: &mut dyn CommandRecorder, write: usize) {
        let res = &self.resources;
        let groups = self.probe_dispatch_size();

        // Write-after-write barrier: the border stitch reads texels the
        // probe update just wrote to the same images.
        recorder.transition_image(
            res.depth[write].handle(),
            ImageLayout::General,
            ImageLayout::General,
        );
        recorder.transition_image(
            res.irradiance[write].handle(),
            ImageLayout::General,
            ImageLayout::General,
        );

        recorder.bind_compute_pipeline(self.border_depth_pipeline.handle());
        recorder.bind_descriptor_set(0, res.border_sets[write].handle());
        recorder.dispatch(groups.0, groups.1, 1);

        recorder.bind_compute_pipeline(self.border_irradiance_pipeline.handle());
        recorder.bind_descriptor_set(0, res.border_sets[write].handle());
        recorder.dispatch(groups.0, groups.1, 1);

        recorder.transition_image(
            res.depth[write].handle(),
            ImageLayout::General,
            ImageLayout::ShaderReadOnly,
        );
        recorder.transition_image(
            res.irradiance[write].handle(),
            ImageLayout::General,
            ImageLayout::ShaderReadOnly,
        );
    }

    /// One threadgroup per probe tile: an XY slice of probes per group
    /// row, one Z layer per group column.
    fn probe_dispatch_size(&self) -> (u32, u32) {
        let counts = self.resources.grid.counts;
        (counts.x * counts.y, counts.z)
    }

    // ========================================================================
    // Rebuild & accessors
    // ========================================================================

    /// Rebuilds the probe grid for new scene bounds.
    ///
    /// This is the only sanctioned way to resize the grid: atlases, ray
    /// output images, uniforms, and descriptor sets are reconstructed, and
    /// accumulation restarts from scratch on the next frame.
    pub fn rebuild(
        &mut self,
        ctx: &Arc<dyn GraphicsContext>,
        scene_bounds: &BoundingBox,
    ) -> Result<()> {
        self.resources = Self::create_grid_resources(
            ctx,
            scene_bounds,
            &self.settings,
            self.sampler.handle(),
            self.trace_layout.handle(),
            self.probe_layout.handle(),
            self.border_layout.handle(),
        )?;
        self.write_index = 0;
        self.reset_accumulation = true;
        Ok(())
    }

    /// The bounds the probe grid was built for.
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        self.resources.bounds
    }

    #[must_use]
    pub fn grid(&self) -> &ProbeGrid {
        &self.resources.grid
    }

    /// Parity the next [`DdgiSystem::record`] call will write.
    #[must_use]
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    /// The atlases the main pass should sample this frame: the most
    /// recently written pair.
    #[must_use]
    pub fn output_textures(&self) -> (Handle<Texture>, Handle<Texture>) {
        let last_written = 1 - self.write_index;
        (
            self.resources.irradiance[last_written].handle(),
            self.resources.depth[last_written].handle(),
        )
    }

    #[must_use]
    pub fn irradiance_atlas(&self, parity: usize) -> Handle<Texture> {
        self.resources.irradiance[parity].handle()
    }

    #[must_use]
    pub fn depth_atlas(&self, parity: usize) -> Handle<Texture> {
        self.resources.depth[parity].handle()
    }
}

fn binding(index: u32, ty: DescriptorType) -> DescriptorBinding {
    DescriptorBinding {
        binding: index,
        ty,
        count: 1,
    }
}
