//! Device Resource Descriptors
//!
//! Plain-old-data description structs consumed by the graphics backend when
//! creating GPU resources. The engine core fills these in; the backend is
//! free to translate them into whatever its native API expects.
//!
//! Descriptors are value types: `Clone + PartialEq + Debug`, with `Default`
//! where a neutral value exists. They never hold device state themselves.

use bitflags::bitflags;

use crate::rhi::context::GraphicsContext;
use crate::rhi::handle::{DeviceResource, Handle};

// ============================================================================
// Resource markers
// ============================================================================

/// Declares a zero-sized resource marker and routes its [`DeviceResource`]
/// destroy to the matching context method.
macro_rules! resource_marker {
    ($(#[$doc:meta])* $name:ident, $destroy:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl DeviceResource for $name {
            fn destroy(ctx: &dyn GraphicsContext, handle: Handle<Self>) {
                ctx.$destroy(handle);
            }
        }
    };
}

resource_marker!(
    /// GPU buffer resource kind.
    Buffer,
    destroy_buffer
);
resource_marker!(
    /// GPU texture resource kind.
    Texture,
    destroy_texture
);
resource_marker!(
    /// Texture view resource kind.
    TextureView,
    destroy_texture_view
);
resource_marker!(
    /// Sampler resource kind.
    Sampler,
    destroy_sampler
);
resource_marker!(
    /// Compiled shader module resource kind.
    ShaderModule,
    destroy_shader_module
);
resource_marker!(
    /// Descriptor set layout resource kind.
    DescriptorSetLayout,
    destroy_descriptor_set_layout
);
resource_marker!(
    /// Descriptor set resource kind.
    DescriptorSet,
    destroy_descriptor_set
);
resource_marker!(
    /// Graphics (raster) pipeline resource kind.
    RenderPipeline,
    destroy_render_pipeline
);
resource_marker!(
    /// Compute pipeline resource kind.
    ComputePipeline,
    destroy_compute_pipeline
);
resource_marker!(
    /// Ray tracing pipeline resource kind.
    RayTracingPipeline,
    destroy_ray_tracing_pipeline
);
resource_marker!(
    /// Acceleration structure resource kind.
    AccelerationStructure,
    destroy_acceleration_structure
);

// ============================================================================
// Common enums
// ============================================================================

/// Texel formats the engine allocates render targets and atlases in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Rgba8Unorm,
    Bgra8Unorm,
    Rgba16Float,
    Rg16Float,
    R11G11B10Float,
    R32Float,
    Depth32Float,
}

impl Format {
    /// Bytes per texel.
    #[must_use]
    pub fn texel_size(self) -> u32 {
        match self {
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::R11G11B10Float | Self::R32Float => 4,
            Self::Rg16Float | Self::Depth32Float => 4,
            Self::Rgba16Float => 8,
        }
    }

    #[must_use]
    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32Float)
    }
}

/// Swapchain color space as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorSpace {
    #[default]
    SrgbNonLinear,
    ExtendedSrgbLinear,
    Hdr10,
}

/// Image layouts a texture moves through between passes.
///
/// Transitions between layouts double as execution barriers: a pass may
/// only sample a texture after it has been transitioned to
/// [`ImageLayout::ShaderReadOnly`], and attachment writes require the
/// matching attachment layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageLayout {
    #[default]
    Undefined,
    General,
    ColorAttachment,
    DepthAttachment,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    Present,
}

/// Where a buffer allocation should live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryLocation {
    #[default]
    DeviceLocal,
    /// Host-writable memory, used for staging uploads.
    HostVisible,
}

bitflags! {
    /// Buffer usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BufferUsage: u32 {
        const UNIFORM               = 1 << 0;
        const STORAGE               = 1 << 1;
        const VERTEX                = 1 << 2;
        const INDEX                 = 1 << 3;
        const TRANSFER_SRC          = 1 << 4;
        const TRANSFER_DST          = 1 << 5;
        const SHADER_DEVICE_ADDRESS = 1 << 6;
        const ACCEL_STRUCT_INPUT    = 1 << 7;
    }
}

bitflags! {
    /// Texture usage flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TextureUsage: u32 {
        const SAMPLED          = 1 << 0;
        const STORAGE          = 1 << 1;
        const COLOR_ATTACHMENT = 1 << 2;
        const DEPTH_ATTACHMENT = 1 << 3;
        const TRANSFER_SRC     = 1 << 4;
        const TRANSFER_DST     = 1 << 5;
    }
}

/// 2D extent in texels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

// ============================================================================
// Buffers & textures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub memory: MemoryLocation,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextureDesc {
    pub extent: Extent2d,
    pub format: Format,
    pub usage: TextureUsage,
    pub mip_levels: u32,
    pub layers: u32,
    pub label: &'static str,
}

impl TextureDesc {
    /// A single-mip, single-layer 2D texture.
    #[must_use]
    pub fn new_2d(width: u32, height: u32, format: Format, usage: TextureUsage) -> Self {
        Self {
            extent: Extent2d::new(width, height),
            format,
            usage,
            mip_levels: 1,
            layers: 1,
            label: "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextureViewDesc {
    pub texture: Handle<Texture>,
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    #[default]
    ClampToEdge,
    Repeat,
    MirrorRepeat,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SamplerDesc {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub address_mode: AddressMode,
    pub label: &'static str,
}

// ============================================================================
// Shaders & descriptor sets
// ============================================================================

/// Pipeline stages a shader module or descriptor binding is visible to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderStage {
    #[default]
    Vertex,
    Fragment,
    Compute,
    RayGeneration,
    Miss,
    ClosestHit,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderModuleDesc {
    /// SPIR-V words, as produced by the offline shader build.
    pub spirv: Vec<u32>,
    pub entry_point: &'static str,
    pub stage: ShaderStage,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescriptorType {
    #[default]
    UniformBuffer,
    StorageBuffer,
    SampledTexture,
    StorageTexture,
    Sampler,
    AccelerationStructure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: DescriptorType,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescriptorSetLayoutDesc {
    pub bindings: Vec<DescriptorBinding>,
    pub label: &'static str,
}

/// One resource written into a descriptor set binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorWrite {
    UniformBuffer(Handle<Buffer>),
    StorageBuffer(Handle<Buffer>),
    SampledTexture(Handle<Texture>),
    StorageTexture(Handle<Texture>),
    Sampler(Handle<Sampler>),
    AccelerationStructure(Handle<AccelerationStructure>),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescriptorSetDesc {
    pub layout: Handle<DescriptorSetLayout>,
    /// Writes in binding order, one per layout binding.
    pub writes: Vec<DescriptorWrite>,
    pub label: &'static str,
}

// ============================================================================
// Vertex layout
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
}

impl VertexFormat {
    #[must_use]
    pub fn size(self) -> u32 {
        match self {
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
            Self::Uint32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub offset: u32,
    pub format: VertexFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

// ============================================================================
// Pipelines
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Equal,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    pub test_enable: bool,
    pub write_enable: bool,
    pub compare: CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enable: true,
            write_enable: true,
            compare: CompareOp::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RenderPipelineDesc {
    pub vertex_shader: Handle<ShaderModule>,
    /// Empty for depth-only pipelines.
    pub fragment_shader: Handle<ShaderModule>,
    pub vertex_layout: VertexLayout,
    pub set_layouts: Vec<Handle<DescriptorSetLayout>>,
    pub color_formats: Vec<Format>,
    pub depth_format: Option<Format>,
    pub depth_state: DepthState,
    pub cull_mode: CullMode,
    pub push_constant_size: u32,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ComputePipelineDesc {
    pub shader: Handle<ShaderModule>,
    pub set_layouts: Vec<Handle<DescriptorSetLayout>>,
    pub push_constant_size: u32,
    pub label: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RayTracingPipelineDesc {
    pub ray_generation_shader: Handle<ShaderModule>,
    pub miss_shader: Handle<ShaderModule>,
    pub closest_hit_shader: Handle<ShaderModule>,
    pub set_layouts: Vec<Handle<DescriptorSetLayout>>,
    pub max_recursion_depth: u32,
    pub push_constant_size: u32,
    pub label: &'static str,
}

// ============================================================================
// Acceleration structures
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccelerationStructureLevel {
    #[default]
    BottomLevel,
    TopLevel,
}

/// Triangle geometry feeding a bottom-level acceleration structure.
///
/// Ray tracing shaders address geometry through raw device addresses, so
/// the referenced buffers must be created with
/// [`BufferUsage::SHADER_DEVICE_ADDRESS`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccelerationGeometryDesc {
    pub vertex_buffer: Handle<Buffer>,
    pub vertex_count: u32,
    pub vertex_stride: u32,
    pub index_buffer: Handle<Buffer>,
    pub index_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccelerationStructureDesc {
    pub level: AccelerationStructureLevel,
    /// Triangle geometry; bottom-level only.
    pub geometry: Vec<AccelerationGeometryDesc>,
    /// Referenced bottom-level structures; top-level only.
    pub instances: Vec<Handle<AccelerationStructure>>,
    pub label: &'static str,
}

// ============================================================================
// Render pass attachments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadOp {
    #[default]
    Clear,
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    pub texture: Handle<Texture>,
    pub load: LoadOp,
    pub clear_color: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    pub texture: Handle<Texture>,
    pub load: LoadOp,
    pub clear_depth: f32,
}

/// Attachments for one render pass, supplied per `begin_render_pass` call.
/// There is no retained framebuffer object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderPassDesc {
    pub color_attachments: Vec<ColorAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexFormat {
    Uint16,
    #[default]
    Uint32,
}
