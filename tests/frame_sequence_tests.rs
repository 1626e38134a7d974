//! Frame sequencing tests
//!
//! Drives the full renderer against the recording backend and asserts on
//! the exact per-frame command sequence:
//! - shadow cascades render before the GI trace
//! - the GI phases run trace → probe update → border stitch
//! - the forward pass begins only after GI finishes
//! - every sampled texture ends the frame shader-readable
//! - the backend's layout validation rejects out-of-order recordings

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3, Vec4};
use ember::rhi::descriptors::{
    ComputePipelineDesc, DescriptorBinding, DescriptorSetDesc, DescriptorSetLayoutDesc,
    DescriptorType, DescriptorWrite, Format, ImageLayout, ShaderModuleDesc, ShaderStage,
    TextureDesc, TextureUsage,
};
use ember::rhi::{CommandRecorder, GraphicsContext, RecordedCommand, RecordingContext, SubmitInfo};
use ember::scene::hierarchy::NO_NODE;
use ember::scene::mesh::SubMesh;
use ember::scene::Scene;
use ember::{Renderer, RendererSettings, ShaderLibrary};

// ============================================================================
// Helpers
// ============================================================================

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

fn test_scene() -> Scene {
    let mut scene = Scene::new();
    let root = scene.add_node(NO_NODE, 0, "Root");
    let node = scene.add_node(root, 1, "Tri");
    scene.submeshes.push(SubMesh {
        material: -1,
        positions: vec![
            Vec3::new(-1.0, 0.0, -1.0),
            Vec3::new(1.0, 0.0, -1.0),
            Vec3::new(0.0, 2.0, 1.0),
        ],
        normals: vec![Vec3::Z; 3],
        tangents: vec![Vec4::new(1.0, 0.0, 0.0, 1.0); 3],
        uvs: vec![Vec2::ZERO; 3],
        indices: vec![0, 1, 2],
        mesh_indices: vec![node; 3],
    });
    scene.update(0.0);
    scene.update_scene_bounds();
    scene
}

fn build_renderer(ctx: &Arc<RecordingContext>) -> (Renderer, Scene) {
    let _ = env_logger::builder().is_test(true).try_init();
    let shaders = test_shaders(ctx);
    let scene = test_scene();
    let renderer = Renderer::new(
        ctx.clone() as Arc<dyn GraphicsContext>,
        &scene,
        &shaders,
        RendererSettings::default(),
    )
    .unwrap();
    (renderer, scene)
}

fn positions_of(commands: &[RecordedCommand], matcher: impl Fn(&RecordedCommand) -> bool) -> Vec<usize> {
    commands
        .iter()
        .enumerate()
        .filter_map(|(i, c)| matcher(c).then_some(i))
        .collect()
}

// ============================================================================
// Full-frame sequencing
// ============================================================================

#[test]
fn frame_records_shadow_then_gi_then_forward() {
    let ctx = Arc::new(RecordingContext::new(640, 480));
    let (mut renderer, mut scene) = build_renderer(&ctx);

    renderer.render_frame(&mut scene, 0.016).unwrap();

    let submissions = ctx.submissions();
    let frame = submissions.last().unwrap();
    assert!(frame.present, "frame submission must present");
    let commands = &frame.commands;

    let cascade_count = renderer.shadow().cascade_count() as usize;

    // One render pass per cascade plus the forward pass.
    let pass_begins = positions_of(commands, |c| matches!(c, RecordedCommand::BeginRenderPass(_)));
    assert_eq!(pass_begins.len(), cascade_count + 1);

    let pass_ends = positions_of(commands, |c| matches!(c, RecordedCommand::EndRenderPass));
    let last_shadow_end = pass_ends[cascade_count - 1];

    // The GI trace starts only after every cascade has finished.
    let traces = positions_of(commands, |c| matches!(c, RecordedCommand::TraceRays { .. }));
    assert_eq!(traces.len(), 1);
    assert!(
        traces[0] > last_shadow_end,
        "ray trace at {} before last shadow pass end at {last_shadow_end}",
        traces[0]
    );

    // Probe update (depth, irradiance) then border stitch (depth,
    // irradiance): four dispatches, each preceded by its pipeline bind,
    // all after the trace and before the forward pass.
    let dispatches = positions_of(commands, |c| matches!(c, RecordedCommand::Dispatch { .. }));
    assert_eq!(dispatches.len(), 4);
    for &dispatch in &dispatches {
        assert!(dispatch > traces[0]);
    }
    let compute_binds =
        positions_of(commands, |c| matches!(c, RecordedCommand::BindComputePipeline(_)));
    assert_eq!(compute_binds.len(), 4);
    for (bind, dispatch) in compute_binds.iter().zip(&dispatches) {
        assert!(bind < dispatch, "pipeline bound after its dispatch");
    }

    // The forward pass is the final render pass, after all GI work.
    let forward_begin = *pass_begins.last().unwrap();
    assert!(forward_begin > *dispatches.last().unwrap());
}

#[test]
fn sampled_textures_end_the_frame_shader_readable() {
    let ctx = Arc::new(RecordingContext::new(640, 480));
    let (mut renderer, mut scene) = build_renderer(&ctx);

    renderer.render_frame(&mut scene, 0.016).unwrap();

    for cascade in 0..renderer.shadow().cascade_count() as usize {
        assert_eq!(
            ctx.current_layout(renderer.shadow().cascade_map(cascade)),
            Some(ImageLayout::ShaderReadOnly),
            "cascade {cascade} not sampleable after the frame"
        );
    }
    for parity in 0..2 {
        assert_eq!(
            ctx.current_layout(renderer.ddgi().irradiance_atlas(parity)),
            Some(ImageLayout::ShaderReadOnly)
        );
        assert_eq!(
            ctx.current_layout(renderer.ddgi().depth_atlas(parity)),
            Some(ImageLayout::ShaderReadOnly)
        );
    }
    assert_eq!(
        ctx.current_layout(ctx.swapchain_image()),
        Some(ImageLayout::Present)
    );
}

#[test]
fn gi_double_buffer_alternates_across_frames() {
    let ctx = Arc::new(RecordingContext::new(640, 480));
    let (mut renderer, mut scene) = build_renderer(&ctx);

    assert_eq!(renderer.ddgi().write_index(), 0);
    renderer.render_frame(&mut scene, 0.016).unwrap();
    assert_eq!(renderer.ddgi().write_index(), 1);
    renderer.render_frame(&mut scene, 0.016).unwrap();
    assert_eq!(renderer.ddgi().write_index(), 0);
}

#[test]
fn first_frame_flag_is_set_exactly_once() {
    let ctx = Arc::new(RecordingContext::new(640, 480));
    let (mut renderer, mut scene) = build_renderer(&ctx);

    let trace_push_flag = |commands: &[RecordedCommand]| -> u32 {
        // The trace push constants are the only 80-byte push in a frame:
        // a 64-byte rotation matrix, the flag, and padding.
        let data = commands
            .iter()
            .find_map(|c| match c {
                RecordedCommand::PushConstants { data, .. } if data.len() == 80 => Some(data),
                _ => None,
            })
            .expect("trace push constants not recorded");
        u32::from_le_bytes(data[64..68].try_into().unwrap())
    };

    renderer.render_frame(&mut scene, 0.016).unwrap();
    let first = ctx.submissions().last().unwrap().commands.clone();
    assert_eq!(trace_push_flag(&first), 1);

    renderer.render_frame(&mut scene, 0.016).unwrap();
    let second = ctx.submissions().last().unwrap().commands.clone();
    assert_eq!(trace_push_flag(&second), 0);
}

#[test]
fn trace_covers_every_probe() {
    let ctx = Arc::new(RecordingContext::new(640, 480));
    let (mut renderer, mut scene) = build_renderer(&ctx);

    renderer.render_frame(&mut scene, 0.016).unwrap();

    let commands = ctx.submissions().last().unwrap().commands.clone();
    let (width, height) = commands
        .iter()
        .find_map(|c| match c {
            RecordedCommand::TraceRays { width, height, .. } => Some((*width, *height)),
            _ => None,
        })
        .unwrap();

    assert_eq!(width, renderer.settings().gi.rays_per_probe);
    assert_eq!(height, renderer.ddgi().grid().probe_count());
}

// ============================================================================
// Layout validation
// ============================================================================

#[test]
fn validation_rejects_mismatched_transition() {
    let ctx = RecordingContext::new(64, 64);
    let texture = ctx
        .create_texture(&TextureDesc::new_2d(
            16,
            16,
            Format::Rgba8Unorm,
            TextureUsage::SAMPLED | TextureUsage::STORAGE,
        ))
        .unwrap();

    let mut recorder = ctx.acquire_recorder();
    recorder.transition_image(texture, ImageLayout::Undefined, ImageLayout::General);
    ctx.submit(recorder, &SubmitInfo::default()).unwrap();

    // The image is now General; claiming it is still Undefined must fail.
    let mut recorder = ctx.acquire_recorder();
    recorder.transition_image(texture, ImageLayout::Undefined, ImageLayout::General);
    assert!(ctx.submit(recorder, &SubmitInfo::default()).is_err());
}

#[test]
fn validation_rejects_attachment_in_wrong_layout() {
    let ctx = RecordingContext::new(64, 64);
    let texture = ctx
        .create_texture(&TextureDesc::new_2d(
            16,
            16,
            Format::Rgba8Unorm,
            TextureUsage::COLOR_ATTACHMENT,
        ))
        .unwrap();

    // Never transitioned to ColorAttachment.
    let mut recorder = ctx.acquire_recorder();
    recorder.begin_render_pass(&ember::rhi::descriptors::RenderPassDesc {
        color_attachments: vec![ember::rhi::descriptors::ColorAttachment {
            texture,
            load: ember::rhi::descriptors::LoadOp::Clear,
            clear_color: [0.0; 4],
        }],
        depth_attachment: None,
        label: "BadPass",
    });
    recorder.end_render_pass();
    assert!(ctx.submit(recorder, &SubmitInfo::default()).is_err());
}

#[test]
fn validation_rejects_draw_outside_render_pass() {
    let ctx = RecordingContext::new(64, 64);
    let mut recorder = ctx.acquire_recorder();
    recorder.draw(0..3, 0..1);
    assert!(ctx.submit(recorder, &SubmitInfo::default()).is_err());
}

#[test]
fn validation_rejects_sampling_an_image_left_writable() {
    let ctx = RecordingContext::new(64, 64);
    let texture = ctx
        .create_texture(&TextureDesc::new_2d(
            16,
            16,
            Format::Rgba16Float,
            TextureUsage::SAMPLED | TextureUsage::STORAGE,
        ))
        .unwrap();
    let layout = ctx
        .create_descriptor_set_layout(&DescriptorSetLayoutDesc {
            bindings: vec![DescriptorBinding {
                binding: 0,
                ty: DescriptorType::SampledTexture,
                count: 1,
            }],
            label: "SampleLayout",
        })
        .unwrap();
    let set = ctx
        .create_descriptor_set(&DescriptorSetDesc {
            layout,
            writes: vec![DescriptorWrite::SampledTexture(texture)],
            label: "SampleSet",
        })
        .unwrap();
    let pipeline = ctx
        .create_compute_pipeline(&ComputePipelineDesc {
            set_layouts: vec![layout],
            label: "SamplePipeline",
            ..Default::default()
        })
        .unwrap();

    // The dispatch samples the texture while it is still General.
    let mut recorder = ctx.acquire_recorder();
    recorder.transition_image(texture, ImageLayout::Undefined, ImageLayout::General);
    recorder.bind_compute_pipeline(pipeline);
    recorder.bind_descriptor_set(0, set);
    recorder.dispatch(1, 1, 1);
    assert!(ctx.submit(recorder, &SubmitInfo::default()).is_err());
}

#[test]
fn same_layout_transition_is_a_valid_barrier() {
    let ctx = RecordingContext::new(64, 64);
    let texture = ctx
        .create_texture(&TextureDesc::new_2d(
            16,
            16,
            Format::Rgba16Float,
            TextureUsage::STORAGE,
        ))
        .unwrap();

    let mut recorder = ctx.acquire_recorder();
    recorder.transition_image(texture, ImageLayout::Undefined, ImageLayout::General);
    recorder.transition_image(texture, ImageLayout::General, ImageLayout::General);
    assert!(ctx.submit(recorder, &SubmitInfo::default()).is_ok());
}

#[test]
fn transform_edits_are_consumed_by_the_next_frame() {
    let ctx = Arc::new(RecordingContext::new(640, 480));
    let (mut renderer, mut scene) = build_renderer(&ctx);
    renderer.render_frame(&mut scene, 0.016).unwrap();

    let node = scene.find_node("Tri").unwrap();
    scene.set_transform(node, Mat4::from_translation(Vec3::new(0.0, 3.0, 0.0)));

    renderer.render_frame(&mut scene, 0.016).unwrap();
    // The renderer consumed the one-shot flag during the frame.
    assert!(!scene.take_transform_updated());
}
