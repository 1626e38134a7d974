//! Renderer
//!
//! Ties the device, scene, shadow, and GI systems together into the fixed
//! per-frame command sequence:
//!
//! shadow cascades → DDGI (trace, probe update, border stitch) → forward
//! pass sampling the shadow and irradiance textures → present.
//!
//! The orchestration here is mechanical glue; the algorithmic weight lives
//! in [`shadow`], [`shadow_utils`], [`ddgi`], and [`ddgi_utils`].

pub mod ddgi;
pub mod ddgi_utils;
pub mod frame;
pub mod shadow;
pub mod shadow_utils;

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use crate::errors::{EmberError, Result};
use crate::rhi::context::{CommandRecorder, GraphicsContext, SubmitInfo};
use crate::rhi::descriptors::{
    AccelerationGeometryDesc, AccelerationStructure, AccelerationStructureDesc,
    AccelerationStructureLevel, Buffer, BufferDesc, BufferUsage, ColorAttachment, DepthAttachment,
    DescriptorBinding, DescriptorSet, DescriptorSetDesc, DescriptorSetLayout,
    DescriptorSetLayoutDesc, DescriptorType, DescriptorWrite, ImageLayout, IndexFormat, LoadOp,
    MemoryLocation, RenderPassDesc, RenderPipeline, RenderPipelineDesc, Sampler, SamplerDesc,
    ShaderModule, Texture, TextureDesc, TextureUsage,
};
use crate::rhi::handle::{Handle, Holder};
use crate::scene::{Scene, Vertex};
use crate::settings::RendererSettings;

use ddgi::DdgiSystem;
use frame::FrameContext;
use shadow::ShadowSystem;

/// Host-side fence bound for one frame's GPU work. Exceeding it is a GPU
/// hang and fatal.
const FRAME_FENCE_TIMEOUT_MS: u64 = 5000;

// ============================================================================
// Shader library
// ============================================================================

/// Shader modules the renderer's pipelines are built from.
///
/// SPIR-V is produced by the offline shader build and turned into modules
/// by the caller; the engine core never compiles shader source.
#[derive(Debug, Clone, Copy)]
pub struct ShaderLibrary {
    pub forward_vertex: Handle<ShaderModule>,
    pub forward_fragment: Handle<ShaderModule>,
    pub shadow_vertex: Handle<ShaderModule>,
    pub ddgi_ray_generation: Handle<ShaderModule>,
    pub ddgi_miss: Handle<ShaderModule>,
    pub ddgi_closest_hit: Handle<ShaderModule>,
    pub probe_depth_update: Handle<ShaderModule>,
    pub probe_irradiance_update: Handle<ShaderModule>,
    pub probe_border_depth: Handle<ShaderModule>,
    pub probe_border_irradiance: Handle<ShaderModule>,
}

// ============================================================================
// GPU scene data
// ============================================================================

/// The batched mesh a draw call consumes.
#[derive(Debug, Clone, Copy)]
pub struct DrawBatch {
    pub vertex_buffer: Handle<Buffer>,
    pub index_buffer: Handle<Buffer>,
    pub index_count: u32,
}

/// Global per-frame uniforms shared by every pipeline.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct GlobalUniforms {
    view: Mat4,
    projection: Mat4,
    camera_position: [f32; 4],
    light_direction: [f32; 4],
    cascade_count: u32,
    _padding: [u32; 3],
}

/// Device addresses ray tracing shaders use to fetch geometry.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct GeometryAddresses {
    vertex_address: u64,
    index_address: u64,
}

/// Device-resident scene geometry and its acceleration structures.
struct GpuScene {
    vertex_buffer: Holder<Buffer>,
    index_buffer: Holder<Buffer>,
    index_count: u32,
    /// Per-node global transforms, indexed by the vertex `node_index`.
    model_buffer: Holder<Buffer>,
    geometry_address_buffer: Holder<Buffer>,
    _blas: Holder<AccelerationStructure>,
    tlas: Holder<AccelerationStructure>,
}

// ============================================================================
// Renderer
// ============================================================================

/// Frame orchestration over a [`GraphicsContext`].
pub struct Renderer {
    ctx: Arc<dyn GraphicsContext>,
    settings: RendererSettings,

    _mvp_layout: Holder<DescriptorSetLayout>,
    _mesh_layout: Holder<DescriptorSetLayout>,
    _rt_scene_layout: Holder<DescriptorSetLayout>,
    forward_layout: Holder<DescriptorSetLayout>,

    global_uniform_buffer: Holder<Buffer>,
    sampler: Holder<Sampler>,

    gpu_scene: GpuScene,
    mvp_set: Holder<DescriptorSet>,
    mesh_set: Holder<DescriptorSet>,
    rt_scene_set: Holder<DescriptorSet>,
    /// One forward sampling set per GI atlas parity.
    forward_sets: [Holder<DescriptorSet>; 2],

    forward_pipeline: Holder<RenderPipeline>,
    depth_target: Holder<Texture>,

    shadow: ShadowSystem,
    ddgi: DdgiSystem,

    frame_index: u64,
}

impl Renderer {
    /// Builds the full frame pipeline for `scene`.
    ///
    /// The scene must have geometry and up-to-date bounds; the DDGI probe
    /// grid is sized from them once, here.
    pub fn new(
        ctx: Arc<dyn GraphicsContext>,
        scene: &Scene,
        shaders: &ShaderLibrary,
        settings: RendererSettings,
    ) -> Result<Self> {
        if !scene.bounds().is_valid() {
            return Err(EmberError::InvalidMesh(
                "scene bounds are empty; load geometry and call update_scene_bounds first".into(),
            ));
        }

        let mvp_layout = Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set_layout(&DescriptorSetLayoutDesc {
                bindings: vec![DescriptorBinding {
                    binding: 0,
                    ty: DescriptorType::UniformBuffer,
                    count: 1,
                }],
                label: "GlobalUniformLayout",
            })?,
        );
        let mesh_layout = Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set_layout(&DescriptorSetLayoutDesc {
                bindings: vec![DescriptorBinding {
                    binding: 0,
                    ty: DescriptorType::StorageBuffer,
                    count: 1,
                }],
                label: "MeshDataLayout",
            })?,
        );
        let rt_scene_layout = Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set_layout(&DescriptorSetLayoutDesc {
                bindings: vec![
                    DescriptorBinding {
                        binding: 0,
                        ty: DescriptorType::AccelerationStructure,
                        count: 1,
                    },
                    DescriptorBinding {
                        binding: 1,
                        ty: DescriptorType::StorageBuffer,
                        count: 1,
                    },
                    DescriptorBinding {
                        binding: 2,
                        ty: DescriptorType::UniformBuffer,
                        count: 1,
                    },
                    DescriptorBinding {
                        binding: 3,
                        ty: DescriptorType::StorageBuffer,
                        count: 1,
                    },
                ],
                label: "RayTraceSceneLayout",
            })?,
        );
        let forward_layout = Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set_layout(&DescriptorSetLayoutDesc {
                bindings: vec![
                    DescriptorBinding {
                        binding: 0,
                        ty: DescriptorType::SampledTexture,
                        count: settings.shadow.cascade_count,
                    },
                    DescriptorBinding {
                        binding: 1,
                        ty: DescriptorType::UniformBuffer,
                        count: 1,
                    },
                    DescriptorBinding {
                        binding: 2,
                        ty: DescriptorType::SampledTexture,
                        count: 1,
                    },
                    DescriptorBinding {
                        binding: 3,
                        ty: DescriptorType::SampledTexture,
                        count: 1,
                    },
                    DescriptorBinding {
                        binding: 4,
                        ty: DescriptorType::Sampler,
                        count: 1,
                    },
                ],
                label: "ForwardSamplingLayout",
            })?,
        );

        let global_uniform_buffer = Holder::new(
            ctx.clone(),
            ctx.create_buffer(&BufferDesc {
                size: std::mem::size_of::<GlobalUniforms>() as u64,
                usage: BufferUsage::UNIFORM,
                memory: MemoryLocation::HostVisible,
                label: "GlobalUniforms",
            })?,
        );
        let sampler = Holder::new(
            ctx.clone(),
            ctx.create_sampler(&SamplerDesc {
                label: "SceneSampler",
                ..Default::default()
            })?,
        );

        let gpu_scene = Self::upload_scene(&ctx, scene)?;

        let mvp_set = Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set(&DescriptorSetDesc {
                layout: mvp_layout.handle(),
                writes: vec![DescriptorWrite::UniformBuffer(global_uniform_buffer.handle())],
                label: "GlobalUniformSet",
            })?,
        );
        let mesh_set = Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set(&DescriptorSetDesc {
                layout: mesh_layout.handle(),
                writes: vec![DescriptorWrite::StorageBuffer(gpu_scene.model_buffer.handle())],
                label: "MeshDataSet",
            })?,
        );
        let rt_scene_set = Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set(&DescriptorSetDesc {
                layout: rt_scene_layout.handle(),
                writes: vec![
                    DescriptorWrite::AccelerationStructure(gpu_scene.tlas.handle()),
                    DescriptorWrite::StorageBuffer(gpu_scene.geometry_address_buffer.handle()),
                    DescriptorWrite::UniformBuffer(global_uniform_buffer.handle()),
                    DescriptorWrite::StorageBuffer(gpu_scene.model_buffer.handle()),
                ],
                label: "RayTraceSceneSet",
            })?,
        );

        let shadow = ShadowSystem::new(
            &ctx,
            &settings.shadow,
            mvp_layout.handle(),
            mesh_layout.handle(),
            shaders.shadow_vertex,
        )?;
        let ddgi = DdgiSystem::new(
            &ctx,
            &scene.bounds(),
            &settings.gi,
            shaders,
            rt_scene_layout.handle(),
        )?;

        let forward_sets = [
            Self::create_forward_set(&ctx, &forward_layout, &shadow, &ddgi, &sampler, 0)?,
            Self::create_forward_set(&ctx, &forward_layout, &shadow, &ddgi, &sampler, 1)?,
        ];

        let forward_pipeline = Holder::new(
            ctx.clone(),
            ctx.create_render_pipeline(&RenderPipelineDesc {
                vertex_shader: shaders.forward_vertex,
                fragment_shader: shaders.forward_fragment,
                vertex_layout: Vertex::layout(),
                set_layouts: vec![
                    mvp_layout.handle(),
                    mesh_layout.handle(),
                    forward_layout.handle(),
                ],
                color_formats: vec![ctx.swapchain_format()],
                depth_format: Some(settings.depth_format),
                depth_state: Default::default(),
                cull_mode: Default::default(),
                push_constant_size: 0,
                label: "ForwardPipeline",
            })?,
        );

        let extent = ctx.swapchain_extent();
        let depth_target = Holder::new(
            ctx.clone(),
            ctx.create_texture(&TextureDesc {
                extent,
                format: settings.depth_format,
                usage: TextureUsage::DEPTH_ATTACHMENT,
                mip_levels: 1,
                layers: 1,
                label: "MainDepth",
            })?,
        );
        let mut init = ctx.acquire_recorder();
        init.transition_image(
            depth_target.handle(),
            ImageLayout::Undefined,
            ImageLayout::DepthAttachment,
        );
        ctx.submit(init, &SubmitInfo::default())?;

        Ok(Self {
            ctx,
            settings,
            _mvp_layout: mvp_layout,
            _mesh_layout: mesh_layout,
            _rt_scene_layout: rt_scene_layout,
            forward_layout,
            global_uniform_buffer,
            sampler,
            gpu_scene,
            mvp_set,
            mesh_set,
            rt_scene_set,
            forward_sets,
            forward_pipeline,
            depth_target,
            shadow,
            ddgi,
            frame_index: 0,
        })
    }

    fn create_forward_set(
        ctx: &Arc<dyn GraphicsContext>,
        layout: &Holder<DescriptorSetLayout>,
        shadow: &ShadowSystem,
        ddgi: &DdgiSystem,
        sampler: &Holder<Sampler>,
        parity: usize,
    ) -> Result<Holder<DescriptorSet>> {
        let mut writes = Vec::new();
        for cascade in 0..shadow.cascade_count() as usize {
            writes.push(DescriptorWrite::SampledTexture(shadow.cascade_map(cascade)));
        }
        writes.push(DescriptorWrite::UniformBuffer(shadow.light_buffer()));
        writes.push(DescriptorWrite::SampledTexture(ddgi.irradiance_atlas(parity)));
        writes.push(DescriptorWrite::SampledTexture(ddgi.depth_atlas(parity)));
        writes.push(DescriptorWrite::Sampler(sampler.handle()));

        Ok(Holder::new(
            ctx.clone(),
            ctx.create_descriptor_set(&DescriptorSetDesc {
                layout: layout.handle(),
                writes,
                label: "ForwardSamplingSet",
            })?,
        ))
    }

    /// Interleaves and uploads the scene geometry, builds the model
    /// transform buffer, and the bottom/top-level acceleration structures.
    fn upload_scene(ctx: &Arc<dyn GraphicsContext>, scene: &Scene) -> Result<GpuScene> {
        let mut vertices: Vec<Vertex> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        for submesh in &scene.submeshes {
            submesh.validate()?;
            let base_vertex = vertices.len() as u32;
            vertices.extend(submesh.interleave());
            indices.extend(submesh.indices.iter().map(|&i| i + base_vertex));
        }
        if vertices.is_empty() || indices.is_empty() {
            return Err(EmberError::InvalidMesh(
                "scene has no geometry to upload".into(),
            ));
        }

        let vertex_bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let index_bytes: &[u8] = bytemuck::cast_slice(&indices);

        let vertex_buffer = Holder::new(
            ctx.clone(),
            ctx.create_buffer(&BufferDesc {
                size: vertex_bytes.len() as u64,
                usage: BufferUsage::VERTEX
                    | BufferUsage::TRANSFER_DST
                    | BufferUsage::SHADER_DEVICE_ADDRESS
                    | BufferUsage::ACCEL_STRUCT_INPUT,
                memory: MemoryLocation::DeviceLocal,
                label: "SceneVertices",
            })?,
        );
        let index_buffer = Holder::new(
            ctx.clone(),
            ctx.create_buffer(&BufferDesc {
                size: index_bytes.len() as u64,
                usage: BufferUsage::INDEX
                    | BufferUsage::TRANSFER_DST
                    | BufferUsage::SHADER_DEVICE_ADDRESS
                    | BufferUsage::ACCEL_STRUCT_INPUT,
                memory: MemoryLocation::DeviceLocal,
                label: "SceneIndices",
            })?,
        );

        let staging = Holder::new(
            ctx.clone(),
            ctx.create_buffer(&BufferDesc {
                size: (vertex_bytes.len() + index_bytes.len()) as u64,
                usage: BufferUsage::TRANSFER_SRC,
                memory: MemoryLocation::HostVisible,
                label: "SceneUploadStaging",
            })?,
        );
        ctx.update_buffer(staging.handle(), 0, vertex_bytes)?;
        ctx.update_buffer(staging.handle(), vertex_bytes.len() as u64, index_bytes)?;

        let mut upload = ctx.acquire_recorder();
        upload.copy_buffer(
            staging.handle(),
            vertex_buffer.handle(),
            0,
            0,
            vertex_bytes.len() as u64,
        );
        upload.copy_buffer(
            staging.handle(),
            index_buffer.handle(),
            vertex_bytes.len() as u64,
            0,
            index_bytes.len() as u64,
        );
        ctx.submit(upload, &SubmitInfo::default())?;

        let model_buffer = Holder::new(
            ctx.clone(),
            ctx.create_buffer(&BufferDesc {
                size: (scene.node_count().max(1) * std::mem::size_of::<Mat4>()) as u64,
                usage: BufferUsage::STORAGE,
                memory: MemoryLocation::HostVisible,
                label: "ModelTransforms",
            })?,
        );
        ctx.update_buffer(
            model_buffer.handle(),
            0,
            bytemuck::cast_slice(scene.global_transforms()),
        )?;

        let blas = Holder::new(
            ctx.clone(),
            ctx.create_acceleration_structure(&AccelerationStructureDesc {
                level: AccelerationStructureLevel::BottomLevel,
                geometry: vec![AccelerationGeometryDesc {
                    vertex_buffer: vertex_buffer.handle(),
                    vertex_count: vertices.len() as u32,
                    vertex_stride: std::mem::size_of::<Vertex>() as u32,
                    index_buffer: index_buffer.handle(),
                    index_count: indices.len() as u32,
                }],
                instances: Vec::new(),
                label: "SceneBlas",
            })?,
        );
        let tlas = Holder::new(
            ctx.clone(),
            ctx.create_acceleration_structure(&AccelerationStructureDesc {
                level: AccelerationStructureLevel::TopLevel,
                geometry: Vec::new(),
                instances: vec![blas.handle()],
                label: "SceneTlas",
            })?,
        );

        let addresses = GeometryAddresses {
            vertex_address: ctx.buffer_device_address(vertex_buffer.handle()).0,
            index_address: ctx.buffer_device_address(index_buffer.handle()).0,
        };
        let geometry_address_buffer = Holder::new(
            ctx.clone(),
            ctx.create_buffer(&BufferDesc {
                size: std::mem::size_of::<GeometryAddresses>() as u64,
                usage: BufferUsage::STORAGE,
                memory: MemoryLocation::HostVisible,
                label: "GeometryAddresses",
            })?,
        );
        ctx.update_buffer(
            geometry_address_buffer.handle(),
            0,
            bytemuck::bytes_of(&addresses),
        )?;

        log::info!(
            "uploaded scene: {} vertices, {} indices, {} nodes",
            vertices.len(),
            indices.len(),
            scene.node_count()
        );

        Ok(GpuScene {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
            model_buffer,
            geometry_address_buffer,
            _blas: blas,
            tlas,
        })
    }

    // ========================================================================
    // Per-frame
    // ========================================================================

    /// Renders one frame: scene update, shadow cascades, the GI sequence,
    /// the forward pass, then a presenting submit.
    pub fn render_frame(&mut self, scene: &mut Scene, dt: f32) -> Result<()> {
        let frame = FrameContext::new(self.frame_index, dt);

        scene.update(dt);
        if scene.take_transform_updated() || frame.first_frame {
            self.ctx.update_buffer(
                self.gpu_scene.model_buffer.handle(),
                0,
                bytemuck::cast_slice(scene.global_transforms()),
            )?;
        }

        let camera = scene.camera();
        let light_direction = self.settings.light_direction.normalize();
        let globals = GlobalUniforms {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(),
            camera_position: camera.position.extend(1.0).to_array(),
            light_direction: light_direction.extend(0.0).to_array(),
            cascade_count: self.shadow.cascade_count(),
            _padding: [0; 3],
        };
        self.ctx.update_buffer(
            self.global_uniform_buffer.handle(),
            0,
            bytemuck::bytes_of(&globals),
        )?;

        self.shadow.update(camera, light_direction);

        let batch = DrawBatch {
            vertex_buffer: self.gpu_scene.vertex_buffer.handle(),
            index_buffer: self.gpu_scene.index_buffer.handle(),
            index_count: self.gpu_scene.index_count,
        };

        let mut recorder = self.ctx.acquire_recorder();

        self.shadow.render(
            self.ctx.as_ref(),
            recorder.as_mut(),
            &batch,
            self.mvp_set.handle(),
            self.mesh_set.handle(),
        )?;

        let gi_parity = self.ddgi.write_index();
        self.ddgi
            .record(&frame, recorder.as_mut(), self.rt_scene_set.handle());

        self.forward_pass(&frame, recorder.as_mut(), &batch, gi_parity);

        self.ctx.submit(
            recorder,
            &SubmitInfo {
                present: true,
                fence_timeout_ms: FRAME_FENCE_TIMEOUT_MS,
            },
        )?;

        self.frame_index += 1;
        Ok(())
    }

    fn forward_pass(
        &self,
        frame: &FrameContext,
        recorder: &mut dyn CommandRecorder,
        batch: &DrawBatch,
        gi_parity: usize,
    ) {
        let swapchain = self.ctx.swapchain_image();
        let extent = self.ctx.swapchain_extent();

        let acquired_layout = if frame.first_frame {
            ImageLayout::Undefined
        } else {
            ImageLayout::Present
        };
        recorder.transition_image(swapchain, acquired_layout, ImageLayout::ColorAttachment);

        recorder.begin_render_pass(&RenderPassDesc {
            color_attachments: vec![ColorAttachment {
                texture: swapchain,
                load: LoadOp::Clear,
                clear_color: self.settings.clear_color,
            }],
            depth_attachment: Some(DepthAttachment {
                texture: self.depth_target.handle(),
                load: LoadOp::Clear,
                clear_depth: 1.0,
            }),
            label: "ForwardPass",
        });

        recorder.set_viewport(0.0, 0.0, extent.width as f32, extent.height as f32);
        recorder.set_scissor(0, 0, extent.width, extent.height);
        recorder.bind_render_pipeline(self.forward_pipeline.handle());
        recorder.bind_descriptor_set(0, self.mvp_set.handle());
        recorder.bind_descriptor_set(1, self.mesh_set.handle());
        recorder.bind_descriptor_set(2, self.forward_sets[gi_parity].handle());
        recorder.bind_vertex_buffer(0, batch.vertex_buffer);
        recorder.bind_index_buffer(batch.index_buffer, IndexFormat::Uint32);
        recorder.draw_indexed(0..batch.index_count, 0, 0..1);

        recorder.end_render_pass();
        recorder.transition_image(swapchain, ImageLayout::ColorAttachment, ImageLayout::Present);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn shadow(&self) -> &ShadowSystem {
        &self.shadow
    }

    #[must_use]
    pub fn ddgi(&self) -> &DdgiSystem {
        &self.ddgi
    }

    /// Rebuilds the GI probe grid for the scene's current bounds and
    /// re-wires the forward sampling sets to the new atlases.
    ///
    /// The caller refreshes the bounds first (`update_scene_bounds`);
    /// this is the editor-triggered path for geometry that outgrew the
    /// grid the renderer was built with.
    pub fn rebuild_gi(&mut self, scene: &Scene) -> Result<()> {
        self.ddgi.rebuild(&self.ctx, &scene.bounds())?;
        self.forward_sets = [
            Self::create_forward_set(
                &self.ctx,
                &self.forward_layout,
                &self.shadow,
                &self.ddgi,
                &self.sampler,
                0,
            )?,
            Self::create_forward_set(
                &self.ctx,
                &self.forward_layout,
                &self.shadow,
                &self.ddgi,
                &self.sampler,
                1,
            )?,
        ];
        Ok(())
    }

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[must_use]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}
