//! Graphics Device Abstraction
//!
//! The [`GraphicsContext`] and [`CommandRecorder`] traits are the contract
//! the rendering code programs against. Exactly one production backend
//! implements them; the engine core never touches a native API directly.
//!
//! # Command discipline
//!
//! Every `CommandRecorder` method only records; the GPU sees nothing until
//! [`GraphicsContext::submit`]. Submission may be tied to the presentable
//! surface via [`SubmitInfo::present`], and waits on the previous use of
//! the frame's resources with a bounded fence timeout — exceeding it is
//! the fatal [`EmberError::FenceTimeout`](crate::errors::EmberError), not
//! an indefinite host hang.

use std::any::Any;
use std::ops::Range;

use crate::errors::Result;
use crate::rhi::descriptors::{
    AccelerationStructure, AccelerationStructureDesc, Buffer, BufferDesc, ColorSpace,
    ComputePipeline, ComputePipelineDesc, DescriptorSet, DescriptorSetDesc, DescriptorSetLayout,
    DescriptorSetLayoutDesc, Extent2d, Format, ImageLayout, IndexFormat, RayTracingPipeline,
    RayTracingPipelineDesc, RenderPassDesc, RenderPipeline, RenderPipelineDesc, Sampler,
    SamplerDesc, ShaderModule, ShaderModuleDesc, Texture, TextureDesc, TextureView,
    TextureViewDesc,
};
use crate::rhi::handle::Handle;

/// Raw GPU virtual address of a buffer or acceleration structure.
///
/// Ray tracing shaders index geometry by address rather than by handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceAddress(pub u64);

/// Parameters for one queue submission.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmitInfo {
    /// Present the current swapchain image after this submission.
    pub present: bool,
    /// Host-side fence wait bound in milliseconds; `0` uses the backend
    /// default. A wait exceeding the bound is a GPU hang and fatal.
    pub fence_timeout_ms: u64,
}

/// Device-side capability set: resource creation/destruction, command
/// recorder acquisition, submission, swapchain and address queries.
///
/// Creation failures are fatal; callers propagate them and terminate the
/// frame rather than continuing with a null resource. Destruction of a
/// resource still referenced by in-flight GPU work is the backend's
/// responsibility to defer.
pub trait GraphicsContext: Send + Sync {
    // === Resource creation ===
    fn create_buffer(&self, desc: &BufferDesc) -> Result<Handle<Buffer>>;
    fn create_texture(&self, desc: &TextureDesc) -> Result<Handle<Texture>>;
    fn create_texture_view(&self, desc: &TextureViewDesc) -> Result<Handle<TextureView>>;
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Handle<Sampler>>;
    fn create_shader_module(&self, desc: &ShaderModuleDesc) -> Result<Handle<ShaderModule>>;
    fn create_descriptor_set_layout(
        &self,
        desc: &DescriptorSetLayoutDesc,
    ) -> Result<Handle<DescriptorSetLayout>>;
    fn create_descriptor_set(&self, desc: &DescriptorSetDesc) -> Result<Handle<DescriptorSet>>;
    fn create_render_pipeline(&self, desc: &RenderPipelineDesc) -> Result<Handle<RenderPipeline>>;
    fn create_compute_pipeline(
        &self,
        desc: &ComputePipelineDesc,
    ) -> Result<Handle<ComputePipeline>>;
    fn create_ray_tracing_pipeline(
        &self,
        desc: &RayTracingPipelineDesc,
    ) -> Result<Handle<RayTracingPipeline>>;
    fn create_acceleration_structure(
        &self,
        desc: &AccelerationStructureDesc,
    ) -> Result<Handle<AccelerationStructure>>;

    // === Resource destruction ===
    fn destroy_buffer(&self, handle: Handle<Buffer>);
    fn destroy_texture(&self, handle: Handle<Texture>);
    fn destroy_texture_view(&self, handle: Handle<TextureView>);
    fn destroy_sampler(&self, handle: Handle<Sampler>);
    fn destroy_shader_module(&self, handle: Handle<ShaderModule>);
    fn destroy_descriptor_set_layout(&self, handle: Handle<DescriptorSetLayout>);
    fn destroy_descriptor_set(&self, handle: Handle<DescriptorSet>);
    fn destroy_render_pipeline(&self, handle: Handle<RenderPipeline>);
    fn destroy_compute_pipeline(&self, handle: Handle<ComputePipeline>);
    fn destroy_ray_tracing_pipeline(&self, handle: Handle<RayTracingPipeline>);
    fn destroy_acceleration_structure(&self, handle: Handle<AccelerationStructure>);

    // === Host data upload ===
    /// Writes `data` into a [`MemoryLocation::HostVisible`] buffer at
    /// `offset`. Device-local buffers are filled through a staging copy
    /// recorded on a [`CommandRecorder`].
    ///
    /// [`MemoryLocation::HostVisible`]: crate::rhi::descriptors::MemoryLocation::HostVisible
    fn update_buffer(&self, handle: Handle<Buffer>, offset: u64, data: &[u8]) -> Result<()>;

    // === Command recording & submission ===
    fn acquire_recorder(&self) -> Box<dyn CommandRecorder>;
    fn submit(&self, recorder: Box<dyn CommandRecorder>, info: &SubmitInfo) -> Result<()>;

    // === Swapchain queries ===
    fn swapchain_image(&self) -> Handle<Texture>;
    fn swapchain_format(&self) -> Format;
    fn swapchain_color_space(&self) -> ColorSpace;
    fn swapchain_image_count(&self) -> u32;
    fn swapchain_extent(&self) -> Extent2d;

    // === Device address queries ===
    fn buffer_device_address(&self, handle: Handle<Buffer>) -> DeviceAddress;
    fn acceleration_structure_address(
        &self,
        handle: Handle<AccelerationStructure>,
    ) -> DeviceAddress;
}

/// Records commands for one submission.
///
/// All methods append to the recorder; nothing executes until the recorder
/// is handed back through [`GraphicsContext::submit`].
pub trait CommandRecorder {
    /// Transitions `texture` from `from` to `to`.
    ///
    /// A same-layout transition is permitted and acts as a write-to-write
    /// barrier on the image.
    fn transition_image(&mut self, texture: Handle<Texture>, from: ImageLayout, to: ImageLayout);

    fn begin_render_pass(&mut self, desc: &RenderPassDesc);
    fn end_render_pass(&mut self);

    fn bind_render_pipeline(&mut self, pipeline: Handle<RenderPipeline>);
    fn bind_compute_pipeline(&mut self, pipeline: Handle<ComputePipeline>);
    fn bind_ray_tracing_pipeline(&mut self, pipeline: Handle<RayTracingPipeline>);
    fn bind_descriptor_set(&mut self, set_index: u32, set: Handle<DescriptorSet>);

    fn bind_vertex_buffer(&mut self, slot: u32, buffer: Handle<Buffer>);
    fn bind_index_buffer(&mut self, buffer: Handle<Buffer>, format: IndexFormat);

    fn draw(&mut self, vertices: Range<u32>, instances: Range<u32>);
    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32, instances: Range<u32>);
    fn dispatch(&mut self, groups_x: u32, groups_y: u32, groups_z: u32);
    fn trace_rays(&mut self, width: u32, height: u32, depth: u32);

    fn copy_buffer(
        &mut self,
        src: Handle<Buffer>,
        dst: Handle<Buffer>,
        src_offset: u64,
        dst_offset: u64,
        size: u64,
    );
    fn copy_buffer_to_texture(&mut self, src: Handle<Buffer>, dst: Handle<Texture>);
    fn copy_texture(&mut self, src: Handle<Texture>, dst: Handle<Texture>);
    fn blit_texture(&mut self, src: Handle<Texture>, dst: Handle<Texture>);

    fn push_constants(&mut self, offset: u32, data: &[u8]);

    fn set_viewport(&mut self, x: f32, y: f32, width: f32, height: f32);
    fn set_scissor(&mut self, x: u32, y: u32, width: u32, height: u32);

    /// Downcast support for backends taking their recorder back at submit.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}
