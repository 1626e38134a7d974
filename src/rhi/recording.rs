//! Recording Backend
//!
//! A headless [`GraphicsContext`] implementation that backs every resource
//! with a generational [`Pool`] of its descriptor and journals every
//! recorded command. No GPU is involved.
//!
//! It exists for two jobs:
//!
//! - integration tests: construct the full renderer without a device and
//!   assert on the exact command sequence a frame produces;
//! - offline validation: `submit` replays the journal against tracked
//!   image layouts and rejects passes that sample or attach an image in
//!   the wrong layout, which catches ordering mistakes long before a
//!   driver would.

use std::any::Any;
use std::collections::HashMap;
use std::ops::Range;

use parking_lot::Mutex;

use crate::errors::{EmberError, Result};
use crate::rhi::context::{CommandRecorder, DeviceAddress, GraphicsContext, SubmitInfo};
use crate::rhi::descriptors::{
    AccelerationStructure, AccelerationStructureDesc, Buffer, BufferDesc, ColorSpace,
    ComputePipeline, ComputePipelineDesc, DescriptorSet, DescriptorSetDesc, DescriptorSetLayout,
    DescriptorSetLayoutDesc, DescriptorWrite, Extent2d, Format, ImageLayout, IndexFormat,
    MemoryLocation, RayTracingPipeline, RayTracingPipelineDesc, RenderPassDesc, RenderPipeline,
    RenderPipelineDesc, Sampler, SamplerDesc, ShaderModule, ShaderModuleDesc, Texture,
    TextureDesc, TextureUsage, TextureView, TextureViewDesc,
};
use crate::rhi::handle::{Handle, Pool};

// ============================================================================
// Command journal
// ============================================================================

/// One journaled command, mirroring the [`CommandRecorder`] surface.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    TransitionImage {
        texture: Handle<Texture>,
        from: ImageLayout,
        to: ImageLayout,
    },
    BeginRenderPass(RenderPassDesc),
    EndRenderPass,
    BindRenderPipeline(Handle<RenderPipeline>),
    BindComputePipeline(Handle<ComputePipeline>),
    BindRayTracingPipeline(Handle<RayTracingPipeline>),
    BindDescriptorSet {
        set_index: u32,
        set: Handle<DescriptorSet>,
    },
    BindVertexBuffer {
        slot: u32,
        buffer: Handle<Buffer>,
    },
    BindIndexBuffer {
        buffer: Handle<Buffer>,
        format: IndexFormat,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
    Dispatch {
        groups: [u32; 3],
    },
    TraceRays {
        width: u32,
        height: u32,
        depth: u32,
    },
    CopyBuffer {
        src: Handle<Buffer>,
        dst: Handle<Buffer>,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        src: Handle<Buffer>,
        dst: Handle<Texture>,
    },
    CopyTexture {
        src: Handle<Texture>,
        dst: Handle<Texture>,
    },
    BlitTexture {
        src: Handle<Texture>,
        dst: Handle<Texture>,
    },
    PushConstants {
        offset: u32,
        data: Vec<u8>,
    },
    SetViewport {
        rect: [f32; 4],
    },
    SetScissor {
        rect: [u32; 4],
    },
}

/// One validated submission.
#[derive(Debug, Clone)]
pub struct Submission {
    pub commands: Vec<RecordedCommand>,
    pub present: bool,
}

// ============================================================================
// Recorder
// ============================================================================

#[derive(Default)]
struct RecordingRecorder {
    commands: Vec<RecordedCommand>,
}

impl CommandRecorder for RecordingRecorder {
    fn transition_image(&mut self, texture: Handle<Texture>, from: ImageLayout, to: ImageLayout) {
        self.commands
            .push(RecordedCommand::TransitionImage { texture, from, to });
    }

    fn begin_render_pass(&mut self, desc: &RenderPassDesc) {
        self.commands
            .push(RecordedCommand::BeginRenderPass(desc.clone()));
    }

    fn end_render_pass(&mut self) {
        self.commands.push(RecordedCommand::EndRenderPass);
    }

    fn bind_render_pipeline(&mut self, pipeline: Handle<RenderPipeline>) {
        self.commands
            .push(RecordedCommand::BindRenderPipeline(pipeline));
    }

    fn bind_compute_pipeline(&mut self, pipeline: Handle<ComputePipeline>) {
        self.commands
            .push(RecordedCommand::BindComputePipeline(pipeline));
    }

    fn bind_ray_tracing_pipeline(&mut self, pipeline: Handle<RayTracingPipeline>) {
        self.commands
            .push(RecordedCommand::BindRayTracingPipeline(pipeline));
    }

    fn bind_descriptor_set(&mut self, set_index: u32, set: Handle<DescriptorSet>) {
        self.commands
            .push(RecordedCommand::BindDescriptorSet { set_index, set });
    }

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: Handle<Buffer>) {
        self.commands
            .push(RecordedCommand::BindVertexBuffer { slot, buffer });
    }

    fn bind_index_buffer(&mut self, buffer: Handle<Buffer>, format: IndexFormat) {
        self.commands
            .push(RecordedCommand::BindIndexBuffer { buffer, format });
    }

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>) {
        self.commands.push(RecordedCommand::Draw {
            vertices,
            instances,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>) {
        self.commands.push(RecordedCommand::DrawIndexed {
            indices,
            base_vertex,
            instances,
        });
    }

    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32) {
        self.commands.push(RecordedCommand::Dispatch {
            groups: [groups_x, groups_y, groups_z],
        });
    }

    fn trace_rays(&mut self, width: u32, height: u32, depth: u32) {
        self.commands.push(RecordedCommand::TraceRays {
            width,
            height,
            depth,
        });
    }

    fn copy_buffer(
        &mut self,
        src: Handle<Buffer>,
        dst: Handle<Buffer>,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    ) {
        self.commands.push(RecordedCommand::CopyBuffer {
            src,
            dst,
            src_offset,
            dst_offset,
            size,
        });
    }

    fn copy_buffer_to_texture(&mut self, src: Handle<Buffer>, dst: Handle<Texture>) {
        self.commands
            .push(RecordedCommand::CopyBufferToTexture { src, dst });
    }

    fn copy_texture(&mut self, src: Handle<Texture>, dst: Handle<Texture>) {
        self.commands.push(RecordedCommand::CopyTexture { src, dst });
    }

    fn blit_texture(&mut self, src: Handle<Texture>, dst: Handle<Texture>) {
        self.commands.push(RecordedCommand::BlitTexture { src, dst });
    }

    fn push_constants(&mut self, offset: u32, data: &[u8]) {
        self.commands.push(RecordedCommand::PushConstants {
            offset,
            data: data.to_vec(),
        });
    }

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32) {
        self.commands.push(RecordedCommand::SetViewport {
            rect: [x, y, width, height],
        });
    }

    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.commands.push(RecordedCommand::SetScissor {
            rect: [x, y, width, height],
        });
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

// ============================================================================
// Context
// ============================================================================

#[derive(Default)]
struct BufferRecord {
    desc: BufferDesc,
    data: Vec<u8>,
}

struct DeviceState {
    buffers: Pool<BufferRecord, Buffer>,
    textures: Pool<TextureDesc, Texture>,
    texture_views: Pool<TextureViewDesc, TextureView>,
    samplers: Pool<SamplerDesc, Sampler>,
    shader_modules: Pool<ShaderModuleDesc, ShaderModule>,
    set_layouts: Pool<DescriptorSetLayoutDesc, DescriptorSetLayout>,
    descriptor_sets: Pool<DescriptorSetDesc, DescriptorSet>,
    render_pipelines: Pool<RenderPipelineDesc, RenderPipeline>,
    compute_pipelines: Pool<ComputePipelineDesc, ComputePipeline>,
    ray_tracing_pipelines: Pool<RayTracingPipelineDesc, RayTracingPipeline>,
    accel_structures: Pool<AccelerationStructureDesc, AccelerationStructure>,
    /// Tracked image layouts, persisted across submissions.
    layouts: HashMap<Handle<Texture>, ImageLayout>,
}

impl DeviceState {
    fn new() -> Self {
        Self {
            buffers: Pool::new(),
            textures: Pool::new(),
            texture_views: Pool::new(),
            samplers: Pool::new(),
            shader_modules: Pool::new(),
            set_layouts: Pool::new(),
            descriptor_sets: Pool::new(),
            render_pipelines: Pool::new(),
            compute_pipelines: Pool::new(),
            ray_tracing_pipelines: Pool::new(),
            accel_structures: Pool::new(),
            layouts: HashMap::new(),
        }
    }
}

/// Headless recording device. See the module docs.
pub struct RecordingContext {
    state: Mutex<DeviceState>,
    submissions: Mutex<Vec<Submission>>,
    swapchain_image: Handle<Texture>,
    swapchain_extent: Extent2d,
    swapchain_format: Format,
}

impl RecordingContext {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        let mut state = DeviceState::new();
        let swapchain_image = state.textures.create(TextureDesc::new_2d(
            width,
            height,
            Format::Bgra8Unorm,
            TextureUsage::COLOR_ATTACHMENT | TextureUsage::TRANSFER_DST,
        ));
        state
            .layouts
            .insert(swapchain_image, ImageLayout::Undefined);

        Self {
            state: Mutex::new(state),
            submissions: Mutex::new(Vec::new()),
            swapchain_image,
            swapchain_extent: Extent2d::new(width, height),
            swapchain_format: Format::Bgra8Unorm,
        }
    }

    // === Test/inspection accessors ===

    /// All validated submissions so far, oldest first.
    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().clone()
    }

    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }

    #[must_use]
    pub fn texture_desc(&self, handle: Handle<Texture>) -> Option<TextureDesc> {
        self.state.lock().textures.get(handle).cloned()
    }

    #[must_use]
    pub fn buffer_desc(&self, handle: Handle<Buffer>) -> Option<BufferDesc> {
        self.state.lock().buffers.get(handle).map(|b| b.desc.clone())
    }

    /// Current contents of a host-visible buffer.
    #[must_use]
    pub fn buffer_data(&self, handle: Handle<Buffer>) -> Option<Vec<u8>> {
        self.state.lock().buffers.get(handle).map(|b| b.data.clone())
    }

    #[must_use]
    pub fn descriptor_set_desc(&self, handle: Handle<DescriptorSet>) -> Option<DescriptorSetDesc> {
        self.state.lock().descriptor_sets.get(handle).cloned()
    }

    /// Tracked layout of an image, if the image is alive.
    #[must_use]
    pub fn current_layout(&self, handle: Handle<Texture>) -> Option<ImageLayout> {
        self.state.lock().layouts.get(&handle).copied()
    }

    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.state.lock().buffers.len()
    }

    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.state.lock().textures.len()
    }

    // === Validation ===

    fn validate(state: &mut DeviceState, commands: &[RecordedCommand]) -> Result<()> {
        let mut in_pass = false;
        // Bound sets survive until the next pipeline bind, as on a real
        // command buffer with differing pipeline layouts.
        let mut bound_sets: HashMap<u32, Handle<DescriptorSet>> = HashMap::new();
        for cmd in commands {
            match cmd {
                RecordedCommand::TransitionImage { texture, from, to } => {
                    if in_pass {
                        return Err(EmberError::CommandOrdering(
                            "image transition recorded inside a render pass".into(),
                        ));
                    }
                    let current = state.layouts.get_mut(texture).ok_or_else(|| {
                        EmberError::CommandOrdering(format!(
                            "transition references unknown image {texture:?}"
                        ))
                    })?;
                    if *current != *from {
                        return Err(EmberError::CommandOrdering(format!(
                            "image {texture:?} transitioned from {from:?} but is in {current:?}"
                        )));
                    }
                    *current = *to;
                }
                RecordedCommand::BeginRenderPass(desc) => {
                    if in_pass {
                        return Err(EmberError::CommandOrdering(
                            "nested render pass".into(),
                        ));
                    }
                    for attachment in &desc.color_attachments {
                        Self::expect_layout(
                            state,
                            attachment.texture,
                            ImageLayout::ColorAttachment,
                            "color attachment",
                        )?;
                    }
                    if let Some(depth) = &desc.depth_attachment {
                        Self::expect_layout(
                            state,
                            depth.texture,
                            ImageLayout::DepthAttachment,
                            "depth attachment",
                        )?;
                    }
                    in_pass = true;
                }
                RecordedCommand::EndRenderPass => {
                    if !in_pass {
                        return Err(EmberError::CommandOrdering(
                            "end_render_pass without begin".into(),
                        ));
                    }
                    in_pass = false;
                }
                RecordedCommand::BindRenderPipeline(_)
                | RecordedCommand::BindComputePipeline(_)
                | RecordedCommand::BindRayTracingPipeline(_) => {
                    bound_sets.clear();
                }
                RecordedCommand::BindDescriptorSet { set_index, set } => {
                    bound_sets.insert(*set_index, *set);
                }
                RecordedCommand::Draw { .. } | RecordedCommand::DrawIndexed { .. } => {
                    if !in_pass {
                        return Err(EmberError::CommandOrdering(
                            "draw recorded outside a render pass".into(),
                        ));
                    }
                    Self::check_bound_textures(state, &bound_sets)?;
                }
                RecordedCommand::Dispatch { .. } | RecordedCommand::TraceRays { .. } => {
                    if in_pass {
                        return Err(EmberError::CommandOrdering(
                            "dispatch/trace recorded inside a render pass".into(),
                        ));
                    }
                    Self::check_bound_textures(state, &bound_sets)?;
                }
                _ => {}
            }
        }
        if in_pass {
            return Err(EmberError::CommandOrdering(
                "submission ends inside a render pass".into(),
            ));
        }
        Ok(())
    }

    /// Every texture reachable through the bound sets must be in the
    /// layout its binding kind reads it in.
    fn check_bound_textures(
        state: &DeviceState,
        bound_sets: &HashMap<u32, Handle<DescriptorSet>>,
    ) -> Result<()> {
        for set in bound_sets.values() {
            let Some(desc) = state.descriptor_sets.get(*set) else {
                continue;
            };
            for write in &desc.writes {
                match write {
                    DescriptorWrite::SampledTexture(texture) => Self::expect_layout(
                        state,
                        *texture,
                        ImageLayout::ShaderReadOnly,
                        "sampled texture",
                    )?,
                    DescriptorWrite::StorageTexture(texture) => {
                        Self::expect_layout(state, *texture, ImageLayout::General, "storage image")?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn expect_layout(
        state: &DeviceState,
        texture: Handle<Texture>,
        expected: ImageLayout,
        role: &str,
    ) -> Result<()> {
        match state.layouts.get(&texture) {
            Some(layout) if *layout == expected => Ok(()),
            Some(layout) => Err(EmberError::CommandOrdering(format!(
                "{role} {texture:?} is in layout {layout:?}, expected {expected:?}"
            ))),
            None => Err(EmberError::CommandOrdering(format!(
                "{role} references unknown image {texture:?}"
            ))),
        }
    }
}

impl GraphicsContext for RecordingContext {
    fn create_buffer(&self, desc: &BufferDesc) -> Result<Handle<Buffer>> {
        if desc.size == 0 {
            return Err(EmberError::DeviceError("zero-sized buffer".into()));
        }
        let mut state = self.state.lock();
        let data = vec![0u8; desc.size as usize];
        Ok(state.buffers.create(BufferRecord {
            desc: desc.clone(),
            data,
        }))
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<Handle<Texture>> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(EmberError::DeviceError("zero-sized texture".into()));
        }
        let mut state = self.state.lock();
        let handle = state.textures.create(desc.clone());
        state.layouts.insert(handle, ImageLayout::Undefined);
        Ok(handle)
    }

    fn create_texture_view(&self, desc: &TextureViewDesc) -> Result<Handle<TextureView>> {
        Ok(self.state.lock().texture_views.create(desc.clone()))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Handle<Sampler>> {
        Ok(self.state.lock().samplers.create(desc.clone()))
    }

    fn create_shader_module(&self, desc: &ShaderModuleDesc) -> Result<Handle<ShaderModule>> {
        Ok(self.state.lock().shader_modules.create(desc.clone()))
    }

    fn create_descriptor_set_layout(
        &self,
        desc: &DescriptorSetLayoutDesc,
    ) -> Result<Handle<DescriptorSetLayout>> {
        Ok(self.state.lock().set_layouts.create(desc.clone()))
    }

    fn create_descriptor_set(&self, desc: &DescriptorSetDesc) -> Result<Handle<DescriptorSet>> {
        Ok(self.state.lock().descriptor_sets.create(desc.clone()))
    }

    fn create_render_pipeline(&self, desc: &RenderPipelineDesc) -> Result<Handle<RenderPipeline>> {
        Ok(self.state.lock().render_pipelines.create(desc.clone()))
    }

    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
    ) -> Result<Handle<ComputePipeline>> {
        Ok(self.state.lock().compute_pipelines.create(desc.clone()))
    }

    fn create_ray_tracing_pipeline(
        &self,
        desc: &RayTracingPipelineDesc,
    ) -> Result<Handle<RayTracingPipeline>> {
        Ok(self.state.lock().ray_tracing_pipelines.create(desc.clone()))
    }

    fn create_acceleration_structure(
        &self,
        desc: &AccelerationStructureDesc,
    ) -> Result<Handle<AccelerationStructure>> {
        Ok(self.state.lock().accel_structures.create(desc.clone()))
    }

    fn destroy_buffer(&self, handle: Handle<Buffer>) {
        self.state.lock().buffers.destroy(handle);
    }

    fn destroy_texture(&self, handle: Handle<Texture>) {
        let mut state = self.state.lock();
        state.textures.destroy(handle);
        state.layouts.remove(&handle);
    }

    fn destroy_texture_view(&self, handle: Handle<TextureView>) {
        self.state.lock().texture_views.destroy(handle);
    }

    fn destroy_sampler(&self, handle: Handle<Sampler>) {
        self.state.lock().samplers.destroy(handle);
    }

    fn destroy_shader_module(&self, handle: Handle<ShaderModule>) {
        self.state.lock().shader_modules.destroy(handle);
    }

    fn destroy_descriptor_set_layout(&self, handle: Handle<DescriptorSetLayout>) {
        self.state.lock().set_layouts.destroy(handle);
    }

    fn destroy_descriptor_set(&self, handle: Handle<DescriptorSet>) {
        self.state.lock().descriptor_sets.destroy(handle);
    }

    fn destroy_render_pipeline(&self, handle: Handle<RenderPipeline>) {
        self.state.lock().render_pipelines.destroy(handle);
    }

    fn destroy_compute_pipeline(&self, handle: Handle<ComputePipeline>) {
        self.state.lock().compute_pipelines.destroy(handle);
    }

    fn destroy_ray_tracing_pipeline(&self, handle: Handle<RayTracingPipeline>) {
        self.state.lock().ray_tracing_pipelines.destroy(handle);
    }

    fn destroy_acceleration_structure(&self, handle: Handle<AccelerationStructure>) {
        self.state.lock().accel_structures.destroy(handle);
    }

    fn update_buffer(&self, handle: Handle<Buffer>, offset: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let buffer = state
            .buffers
            .get_mut(handle)
            .ok_or_else(|| EmberError::DeviceError("update of empty buffer handle".into()))?;
        if buffer.desc.memory != MemoryLocation::HostVisible {
            return Err(EmberError::DeviceError(format!(
                "update_buffer on device-local buffer {handle:?}; use a staging copy"
            )));
        }
        let end = offset as usize + data.len();
        if end > buffer.data.len() {
            return Err(EmberError::DeviceError(format!(
                "update_buffer out of range: {end} > {}",
                buffer.data.len()
            )));
        }
        buffer.data[offset as usize..end].copy_from_slice(data);
        Ok(())
    }

    fn acquire_recorder(&self) -> Box<dyn CommandRecorder> {
        Box::new(RecordingRecorder::default())
    }

    fn submit(&self, recorder: Box<dyn CommandRecorder>, info: &SubmitInfo) -> Result<()> {
        let recorder = recorder
            .into_any()
            .downcast::<RecordingRecorder>()
            .map_err(|_| {
                EmberError::DeviceError("submit received a foreign command recorder".into())
            })?;

        let mut state = self.state.lock();
        Self::validate(&mut state, &recorder.commands)?;

        if info.present {
            Self::expect_layout(
                &state,
                self.swapchain_image,
                ImageLayout::Present,
                "presented swapchain image",
            )?;
        }

        self.submissions.lock().push(Submission {
            commands: recorder.commands,
            present: info.present,
        });
        Ok(())
    }

    fn swapchain_image(&self) -> Handle<Texture> {
        self.swapchain_image
    }

    fn swapchain_format(&self) -> Format {
        self.swapchain_format
    }

    fn swapchain_color_space(&self) -> ColorSpace {
        ColorSpace::SrgbNonLinear
    }

    fn swapchain_image_count(&self) -> u32 {
        3
    }

    fn swapchain_extent(&self) -> Extent2d {
        self.swapchain_extent
    }

    fn buffer_device_address(&self, handle: Handle<Buffer>) -> DeviceAddress {
        DeviceAddress(0x0001_0000_0000 + (u64::from(handle.index()) << 16))
    }

    fn acceleration_structure_address(
        &self,
        handle: Handle<AccelerationStructure>,
    ) -> DeviceAddress {
        DeviceAddress(0x4000_0000_0000 + (u64::from(handle.index()) << 16))
    }
}
