//! Scene demo
//!
//! Builds a small scene (a grid of boxes, an orbiting lamp, a spinning group
//! and a camera) and renders a fixed number of frames through the headless
//! context, logging per-frame statistics.
//!
//! Usage: `scene_demo [config.toml|config.ron] [frames]`

use render_core::foundation::logging;
use render_core::prelude::*;
use render_core::render::{ClearPass, LightComponent, PassContext, PipelineState, RenderResult};
use render_core::spatial::BoundingBox;

const DEFAULT_CONFIG: &str = "scene_demo/demo.toml";
const DEFAULT_FRAMES: u32 = 240;
const FRAME_TIME: f32 = 1.0 / 60.0;

const VERTEX: &str = "#version 330 core
layout(location = 0) in vec3 a_position;
uniform mat4 u_model;
uniform mat4 u_view_projection;
#ifdef USE_SKINNING
uniform mat4 u_bones[64];
#endif
void main() { gl_Position = u_view_projection * u_model * vec4(a_position, 1.0); }
";

const FRAGMENT: &str = "#version 330 core
struct PointLight { vec4 position; vec4 color; };
uniform PointLight u_point_lights[${MAX_POINT_LIGHTS}];
uniform vec4 u_base_color;
out vec4 frag_color;
void main() { frag_color = u_base_color; }
";

/// Logs how many meshes each camera saw; runs after the geometry passes
struct VisibilityReport;

impl RenderPass for VisibilityReport {
    fn name(&self) -> &str {
        "visibility_report"
    }

    fn render(&mut self, pass: &mut PassContext<'_>) -> RenderResult<()> {
        let camera = pass.require_camera(self.name())?;
        log::trace!("Camera {:?} sees {} mesh(es)", camera.node, pass.visible_meshes.len());
        Ok(())
    }
}

fn build_scene(scene: &mut Scene) -> EngineResult<NodeId> {
    let cube = Geometry::cube(1.0)?;
    let cube_bounds = cube.local_bounds();
    let geometry = scene.pipeline_mut().add_geometry(cube);

    let root = scene.graph_mut().create_node("root", NodeKind::Group);

    for x in -4..=4 {
        for z in -4..=4 {
            let color = Vec4::new(0.3 + 0.07 * (x + 4) as f32, 0.5, 0.3 + 0.07 * (z + 4) as f32, 1.0);
            let mesh = MeshComponent::new(geometry, cube_bounds).with_material(Material::new("tile", color));
            let tile = scene.graph_mut().create_node(format!("tile_{x}_{z}"), NodeKind::Mesh(mesh));
            scene
                .graph_mut()
                .set_position(tile, Vec3::new(x as f32 * 3.0, -2.0, z as f32 * 3.0 - 20.0))?;
            scene.graph_mut().add_child(root, tile)?;
        }
    }

    let spinner = scene.graph_mut().create_node("spinner", NodeKind::Group);
    scene.graph_mut().set_position(spinner, Vec3::new(0.0, 1.0, -12.0))?;
    for (i, offset) in [-2.0_f32, 2.0].into_iter().enumerate() {
        let glass = Material::new("glass", Vec4::new(0.6, 0.8, 1.0, 0.4)).with_blend_mode(BlendMode::Translucent);
        let mesh = MeshComponent::new(geometry, cube_bounds).with_material(glass);
        let child = scene.graph_mut().create_node(format!("orbiter_{i}"), NodeKind::Mesh(mesh));
        scene.graph_mut().set_position(child, Vec3::new(offset, 0.0, 0.0))?;
        scene.graph_mut().add_child(spinner, child)?;
    }
    scene.graph_mut().add_child(root, spinner)?;

    let lamp = scene.graph_mut().create_node(
        "lamp",
        NodeKind::Light(LightComponent::point(Vec3::new(1.0, 0.9, 0.7), 3.0, 25.0)),
    );
    scene.graph_mut().add_child(root, lamp)?;

    let sun = scene.graph_mut().create_node(
        "sun",
        NodeKind::Light(LightComponent::directional(Vec3::repeat(1.0), 0.5)),
    );
    scene
        .graph_mut()
        .set_rotation_degrees(sun, Vec3::new(-45.0, 30.0, 0.0))?;
    scene.graph_mut().add_child(root, sun)?;

    let camera = scene.graph_mut().create_node(
        "main_camera",
        NodeKind::Camera(
            CameraComponent::perspective(Viewport::new(1280, 720), 60.0, 0.1, 40.0)
                .with_clear_color([0.05, 0.05, 0.08, 1.0]),
        ),
    );
    scene.graph_mut().set_position(camera, Vec3::new(0.0, 4.0, 6.0))?;
    scene.graph_mut().set_rotation_degrees(camera, Vec3::new(-15.0, 0.0, 0.0))?;
    scene.graph_mut().add_child(root, camera)?;

    scene.add_node(root)?;

    scene.set_behavior(
        spinner,
        Box::new(|node: NodeId, graph: &mut NodeGraph, dt: f32| {
            let spin = Quat::from_axis_angle(&Vec3::y_axis(), dt * 1.5);
            let rotation = graph.get(node)?.rotation();
            graph.set_rotation(node, spin * rotation)
        }),
    )?;

    let mut elapsed = 0.0_f32;
    scene.set_behavior(
        lamp,
        Box::new(move |node: NodeId, graph: &mut NodeGraph, dt: f32| {
            elapsed += dt;
            let position = Vec3::new(elapsed.cos() * 8.0, 3.0, elapsed.sin() * 8.0 - 12.0);
            graph.set_position(node, position)
        }),
    )?;

    Ok(camera)
}

fn register_passes(scene: &mut Scene) -> EngineResult<()> {
    let pipeline = scene.pipeline_mut();
    pipeline.add_frame_pass(Box::new(ClearPass::new(
        "shadow_map",
        RenderTargetLayout::depth_only(TextureFormat::Depth32F),
        1024,
        1024,
        [0.0; 4],
    )))?;
    pipeline.add_camera_pass(Box::new(
        GeometryPass::new("opaque", ShaderSource::new(VERTEX, FRAGMENT))
            .with_filter(MeshFilter::by_blend_mode(BlendMode::Opaque))
            .with_features(ShaderFeatures::SHADOWS),
    ))?;
    pipeline.add_camera_pass(Box::new(
        GeometryPass::new("translucent", ShaderSource::new(VERTEX, FRAGMENT))
            .with_filter(MeshFilter::by_blend_mode(BlendMode::Translucent))
            .with_state(PipelineState::translucent())
            .with_clear(false),
    ))?;
    pipeline.add_camera_pass(Box::new(VisibilityReport))?;
    Ok(())
}

fn main() -> Result<(), EngineError> {
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let frames = args
        .next()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(DEFAULT_FRAMES);

    let config = match EngineConfig::load_from_file(&config_path) {
        Ok(config) => config,
        Err(ConfigError::Io(err)) => {
            eprintln!("Could not read {config_path} ({err}); using defaults");
            EngineConfig::default()
        }
        Err(err) => return Err(err.into()),
    };
    logging::init(&config.log_level);
    log::info!("Starting scene demo with {config_path}");

    let mut engine = Engine::new(config)?;
    let camera = build_scene(engine.scene_mut())?;
    register_passes(engine.scene_mut())?;
    engine.initialize(Box::new(HeadlessContext::new()))?;

    let mut total_draws = 0;
    for frame in 0..frames {
        engine.update(FRAME_TIME)?;
        let stats = engine.render()?;
        total_draws += stats.draw_calls;
        if frame % 60 == 0 {
            log::info!(
                "Frame {}: {} visible, {} draw call(s), {} pass(es)",
                stats.frame,
                stats.visible_meshes,
                stats.draw_calls,
                stats.passes_run
            );
        }
    }

    let scene = engine.scene();
    let visible = scene.pipeline().visible_meshes(camera).len();
    let octree = scene.pipeline().octree();
    let world: BoundingBox = octree.bounds();
    log::info!(
        "Rendered {frames} frame(s), {total_draws} draw call(s); last frame saw {visible} of {} mesh(es)",
        scene.pipeline().mesh_count()
    );
    log::info!(
        "Octree: {} cell(s) covering {:?} to {:?}",
        octree.cell_count(),
        world.min(),
        world.max()
    );
    if let Some(context) = scene.pipeline().context::<HeadlessContext>() {
        log::info!("Headless context recorded {} command(s)", context.commands().len());
    }

    engine.destroy()?;
    Ok(())
}
