//! Cascaded Shadow Maps
//!
//! One depth-only render target per cascade, a shared light-data uniform
//! buffer, and a dedicated depth-only pipeline. Cascade matrices are
//! recomputed from the camera and light direction every frame by
//! [`ShadowSystem::update`]; [`ShadowSystem::render`] records the cascade
//! passes, bracketing each depth target with the layout transitions the
//! main pass depends on.

use std::sync::Arc;

use glam::Vec3;

use crate::errors::Result;
use crate::renderer::DrawBatch;
use crate::renderer::shadow_utils::{compute_cascade_light_data, LightData};
use crate::rhi::context::{CommandRecorder, GraphicsContext, SubmitInfo};
use crate::rhi::descriptors::{
    Buffer, BufferDesc, BufferUsage, CullMode, DepthAttachment, DescriptorBinding, DescriptorSet,
    DescriptorSetDesc, DescriptorSetLayout, DescriptorSetLayoutDesc, DescriptorType,
    DescriptorWrite, Format, ImageLayout, IndexFormat, LoadOp, MemoryLocation, RenderPassDesc,
    RenderPipeline, RenderPipelineDesc, ShaderModule, Texture, TextureDesc, TextureUsage,
};
use crate::rhi::handle::{Handle, Holder};
use crate::scene::{Camera, Vertex};
use crate::settings::ShadowSettings;

const LIGHT_DATA_STRIDE: u64 = std::mem::size_of::<LightData>() as u64;

/// Cascaded shadow mapping state.
///
/// Configuration is immutable after construction; only the per-frame
/// [`LightData`] changes.
pub struct ShadowSystem {
    settings: ShadowSettings,
    resolution: u32,

    cascade_maps: Vec<Holder<Texture>>,
    light_buffer: Holder<Buffer>,
    staging_buffer: Holder<Buffer>,
    light_set_layout: Holder<DescriptorSetLayout>,
    light_set: Holder<DescriptorSet>,
    pipeline: Holder<RenderPipeline>,

    light_data: Vec<LightData>,
}

impl ShadowSystem {
    /// Creates cascade render targets, the light-data buffers, and the
    /// depth-only pipeline. The pipeline reuses the main vertex layout
    /// with a 3-set layout: global MVP, per-mesh transforms, light data.
    ///
    /// Any device failure is fatal and propagates; no partially
    /// constructed system is returned.
    pub fn new(
        ctx: &Arc<dyn GraphicsContext>,
        settings: &ShadowSettings,
        mvp_layout: Handle<DescriptorSetLayout>,
        mesh_layout: Handle<DescriptorSetLayout>,
        shadow_vertex: Handle<ShaderModule>,
    ) -> Result<Self> {
        let resolution = settings.resolution();
        let cascade_count = settings.cascade_count;

        let mut cascade_maps = Vec::with_capacity(cascade_count as usize);
        for _ in 0..cascade_count {
            let texture = ctx.create_texture(&TextureDesc {
                extent: crate::rhi::descriptors::Extent2d::new(resolution, resolution),
                format: Format::Depth32Float,
                usage: TextureUsage::DEPTH_ATTACHMENT | TextureUsage::SAMPLED,
                mip_levels: 1,
                layers: 1,
                label: "ShadowCascade",
            })?;
            cascade_maps.push(Holder::new(ctx.clone(), texture));
        }

        let buffer_size = LIGHT_DATA_STRIDE * u64::from(cascade_count);
        let light_buffer = Holder::new(
            ctx.clone(),
            ctx.create_buffer(&BufferDesc {
                size: buffer_size,
                usage: BufferUsage::UNIFORM | BufferUsage::TRANSFER_DST,
                memory: MemoryLocation::DeviceLocal,
                label: "ShadowLightData",
            })?,
        );
        let staging_buffer = Holder::new(
            ctx.clone(),
            ctx.create_buffer(&BufferDesc {
                size: buffer_size,
                usage: BufferUsage::TRANSFER_SRC,
                memory: MemoryLocation::HostVisible,
                label: "ShadowLightStaging",
            })?,
        );

        let light_set_layout = Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set_layout(&DescriptorSetLayoutDesc {
                bindings: vec![DescriptorBinding {
                    binding: 0,
                    ty: DescriptorType::UniformBuffer,
                    count: 1,
                }],
                label: "ShadowLightLayout",
            })?,
        );
        let light_set = Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set(&DescriptorSetDesc {
                layout: light_set_layout.handle(),
                writes: vec![DescriptorWrite::UniformBuffer(light_buffer.handle())],
                label: "ShadowLightSet",
            })?,
        );

        let pipeline = Holder::new(
            ctx.clone(),
            ctx.create_render_pipeline(&RenderPipelineDesc {
                vertex_shader: shadow_vertex,
                fragment_shader: Handle::EMPTY,
                vertex_layout: Vertex::layout(),
                set_layouts: vec![mvp_layout, mesh_layout, light_set_layout.handle()],
                color_formats: Vec::new(),
                depth_format: Some(Format::Depth32Float),
                depth_state: Default::default(),
                cull_mode: CullMode::Front,
                push_constant_size: std::mem::size_of::<u32>() as u32,
                label: "ShadowDepthPipeline",
            })?,
        );

        // Bring the cascade targets into the layout the main pass samples
        // them in; the per-cascade render brackets transition out and back.
        let mut init = ctx.acquire_recorder();
        for map in &cascade_maps {
            init.transition_image(
                map.handle(),
                ImageLayout::Undefined,
                ImageLayout::ShaderReadOnly,
            );
        }
        ctx.submit(init, &SubmitInfo::default())?;

        log::info!(
            "shadow system: {cascade_count} cascades at {resolution}x{resolution}"
        );

        Ok(Self {
            settings: settings.clone(),
            resolution,
            cascade_maps,
            light_buffer,
            staging_buffer,
            light_set_layout,
            light_set,
            pipeline,
            light_data: Vec::new(),
        })
    }

    /// Recomputes per-cascade light matrices from the camera frustum and
    /// light direction. Call once per frame before [`ShadowSystem::render`].
    pub fn update(&mut self, camera: &Camera, light_direction: Vec3) {
        self.light_data = compute_cascade_light_data(
            camera,
            light_direction,
            self.settings.cascade_count,
            self.settings.split_lambda,
        );
    }

    /// Records the cascade passes: per cascade, upload its light data via
    /// the staging buffer, transition the depth target writable, render
    /// the batched mesh depth-only, and transition back to sampleable.
    ///
    /// Cascades are independent and render in sequence; each one's final
    /// transition is what permits the main pass to sample it.
    pub fn render(
        &self,
        ctx: &dyn GraphicsContext,
        recorder: &mut dyn CommandRecorder,
        batch: &DrawBatch,
        mvp_set: Handle<DescriptorSet>,
        mesh_set: Handle<DescriptorSet>,
    ) -> Result<()> {
        for (cascade, map) in self.cascade_maps.iter().enumerate() {
            let offset = LIGHT_DATA_STRIDE * cascade as u64;
            ctx.update_buffer(
                self.staging_buffer.handle(),
                offset,
                bytemuck::bytes_of(&self.light_data[cascade]),
            )?;
            recorder.copy_buffer(
                self.staging_buffer.handle(),
                self.light_buffer.handle(),
                offset,
                offset,
                LIGHT_DATA_STRIDE,
            );

            recorder.transition_image(
                map.handle(),
                ImageLayout::ShaderReadOnly,
                ImageLayout::DepthAttachment,
            );
            recorder.begin_render_pass(&RenderPassDesc {
                color_attachments: Vec::new(),
                depth_attachment: Some(DepthAttachment {
                    texture: map.handle(),
                    load: LoadOp::Clear,
                    clear_depth: 1.0,
                }),
                label: "ShadowCascadePass",
            });

            recorder.set_viewport(0.0, 0.0, self.resolution as f32, self.resolution as f32);
            recorder.set_scissor(0, 0, self.resolution, self.resolution);
            recorder.bind_render_pipeline(self.pipeline.handle());
            recorder.bind_descriptor_set(0, mvp_set);
            recorder.bind_descriptor_set(1, mesh_set);
            recorder.bind_descriptor_set(2, self.light_set.handle());
            recorder.push_constants(0, bytemuck::bytes_of(&(cascade as u32)));
            recorder.bind_vertex_buffer(0, batch.vertex_buffer);
            recorder.bind_index_buffer(batch.index_buffer, IndexFormat::Uint32);
            recorder.draw_indexed(0..batch.index_count, 0, 0..1);

            recorder.end_render_pass();
            recorder.transition_image(
                map.handle(),
                ImageLayout::DepthAttachment,
                ImageLayout::ShaderReadOnly,
            );
        }
        Ok(())
    }

    #[must_use]
    pub fn cascade_count(&self) -> u32 {
        self.settings.cascade_count
    }

    #[must_use]
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    #[must_use]
    pub fn cascade_map(&self, cascade: usize) -> Handle<Texture> {
        self.cascade_maps[cascade].handle()
    }

    /// The light-data uniform buffer, bound by the main pass for cascade
    /// selection.
    #[must_use]
    pub fn light_buffer(&self) -> Handle<Buffer> {
        self.light_buffer.handle()
    }

    #[must_use]
    pub fn light_data(&self) -> &[LightData] {
        &self.light_data
    }

    #[must_use]
    pub fn light_set_layout(&self) -> Handle<DescriptorSetLayout> {
        self.light_set_layout.handle()
    }
}
