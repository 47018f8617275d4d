//! End-to-end frame tests driven through the headless context

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::error::EngineError;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::scene::{NodeId, NodeKind, Scene};
    use std::cell::Cell;
    use std::rc::Rc;

    const VERTEX: &str = "#version 330 core\nuniform vec4 u_point_lights[${MAX_POINT_LIGHTS}];\nvoid main() {}\n";
    const FRAGMENT: &str = "#version 330 core\nvoid main() {}\n";

    fn source() -> ShaderSource {
        ShaderSource::new(VERTEX, FRAGMENT)
    }

    /// Camera at the origin looking down -Z, 90 degree vertical FOV, far plane at 20
    fn camera_component() -> CameraComponent {
        CameraComponent::perspective(Viewport::new(256, 256), 90.0, 0.1, 20.0)
    }

    fn add_camera(scene: &mut Scene, camera: CameraComponent) -> NodeId {
        let node = scene.graph_mut().create_node("camera", NodeKind::Camera(camera));
        scene.add_node(node).unwrap();
        node
    }

    fn box_mesh(scene: &mut Scene) -> MeshComponent {
        let geometry = Geometry::cube(1.0).unwrap();
        let bounds = geometry.local_bounds();
        let id = scene.pipeline_mut().add_geometry(geometry);
        MeshComponent::new(id, bounds)
    }

    fn add_mesh(scene: &mut Scene, name: &str, mesh: MeshComponent, position: Vec3) -> NodeId {
        let node = scene.graph_mut().create_node(name, NodeKind::Mesh(mesh));
        scene.graph_mut().set_position(node, position).unwrap();
        scene.add_node(node).unwrap();
        node
    }

    fn add_box(scene: &mut Scene, name: &str, position: Vec3) -> NodeId {
        let mesh = box_mesh(scene);
        add_mesh(scene, name, mesh, position)
    }

    fn headless(scene: &Scene) -> &HeadlessContext {
        scene.pipeline().context::<HeadlessContext>().unwrap()
    }

    fn geometry_scene() -> Scene {
        crate::foundation::logging::init_for_tests();
        let mut scene = Scene::default();
        scene
            .pipeline_mut()
            .add_camera_pass(Box::new(GeometryPass::new("geometry", source())))
            .unwrap();
        scene
    }

    #[test]
    fn test_frustum_culls_box_beyond_far_plane() {
        let mut scene = geometry_scene();
        let camera = add_camera(&mut scene, camera_component());
        let near = add_box(&mut scene, "near", Vec3::new(0.0, 0.0, -5.0));
        let far = add_box(&mut scene, "far", Vec3::new(0.0, 0.0, 50.0));
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();

        let stats = scene.render().unwrap();

        let visible = scene.pipeline().visible_meshes(camera);
        assert!(visible.contains(&near));
        assert!(!visible.contains(&far));
        assert_eq!(stats.cameras_rendered, 1);
        assert_eq!(stats.visible_meshes, 1);
        assert_eq!(stats.uploads, 2);
        assert_eq!(stats.draw_calls, 1);
        assert_eq!(headless(&scene).draw_count(), 1);
    }

    #[test]
    fn test_box_inside_frustum_bound_but_outside_planes_is_culled() {
        let mut scene = geometry_scene();
        let camera = add_camera(&mut scene, camera_component());
        let ahead = add_box(&mut scene, "ahead", Vec3::new(0.0, 0.0, -5.0));
        let aside = add_box(&mut scene, "aside", Vec3::new(15.0, 0.0, -5.0));
        let behind = add_box(&mut scene, "behind", Vec3::new(0.0, 0.0, 5.0));
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();

        scene.render().unwrap();

        assert_eq!(scene.pipeline().visible_meshes(camera), &[ahead]);
        assert!(!scene.pipeline().visible_meshes(camera).contains(&aside));
        assert!(!scene.pipeline().visible_meshes(camera).contains(&behind));
    }

    #[test]
    fn test_disabled_culling_sees_every_enabled_mesh() {
        let mut scene = geometry_scene();
        let camera = add_camera(&mut scene, camera_component().with_frustum_culling(false));
        let near = add_box(&mut scene, "near", Vec3::new(0.0, 0.0, -5.0));
        let far = add_box(&mut scene, "far", Vec3::new(0.0, 0.0, 50.0));
        let hidden = add_box(&mut scene, "hidden", Vec3::new(0.0, 0.0, -6.0));
        scene.graph_mut().set_enabled(hidden, false).unwrap();
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();

        scene.render().unwrap();

        assert_eq!(scene.pipeline().visible_meshes(camera), &[near, far]);
    }

    #[test]
    fn test_moved_mesh_becomes_visible_next_frame() {
        let mut scene = geometry_scene();
        let camera = add_camera(&mut scene, camera_component());
        let mesh = add_box(&mut scene, "mover", Vec3::new(0.0, 0.0, 50.0));
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();

        scene.render().unwrap();
        assert!(scene.pipeline().visible_meshes(camera).is_empty());

        scene.graph_mut().set_position(mesh, Vec3::new(0.0, 0.0, -5.0)).unwrap();
        scene.render().unwrap();
        assert_eq!(scene.pipeline().visible_meshes(camera), &[mesh]);
    }

    #[test]
    fn test_two_targets_of_same_size_are_distinct() {
        let mut scene = Scene::default();
        add_camera(&mut scene, camera_component());
        add_box(&mut scene, "box", Vec3::new(0.0, 0.0, -5.0));
        scene
            .pipeline_mut()
            .add_camera_pass(Box::new(
                GeometryPass::new("albedo", source()).with_target(
                    "A",
                    RenderTargetLayout::color(TextureFormat::Rgba8).with_depth(TextureFormat::Depth24Stencil8),
                ),
            ))
            .unwrap();
        scene
            .pipeline_mut()
            .add_camera_pass(Box::new(
                GeometryPass::new("hdr", source()).with_target("B", RenderTargetLayout::color(TextureFormat::Rgba16F)),
            ))
            .unwrap();
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();

        scene.render().unwrap();

        let pipeline = scene.pipeline_mut();
        let a = pipeline.get_render_target("A", 256, 256).unwrap().handle().unwrap();
        let b = pipeline.get_render_target("B", 256, 256).unwrap().handle().unwrap();
        assert_ne!(a, b);

        let context = headless(&scene);
        assert_eq!(context.live_render_targets(), 2);
        assert_eq!(context.render_target_desc(a).unwrap().color_formats, vec![TextureFormat::Rgba8]);
        assert_eq!(
            context.render_target_desc(a).unwrap().depth_format,
            Some(TextureFormat::Depth24Stencil8)
        );
        assert_eq!(context.render_target_desc(b).unwrap().color_formats, vec![TextureFormat::Rgba16F]);
    }

    #[test]
    fn test_render_target_ttl() {
        let mut scene = Scene::default();
        scene
            .pipeline_mut()
            .register_render_target("X", RenderTargetLayout::color(TextureFormat::Rgba8))
            .unwrap();
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();

        let first = scene.pipeline_mut().get_render_target("X", 64, 64).unwrap().handle();
        scene.update(2.0).unwrap();
        let again = scene.pipeline_mut().get_render_target("X", 64, 64).unwrap().handle();
        assert_eq!(first, again);

        scene.update(6.0).unwrap();
        let recreated = scene.pipeline_mut().get_render_target("X", 64, 64).unwrap().handle();
        assert_ne!(first, recreated);
        assert_eq!(headless(&scene).live_render_targets(), 1);
    }

    #[test]
    fn test_stale_targets_are_evicted_at_frame_start() {
        let mut scene = Scene::default();
        scene
            .pipeline_mut()
            .register_render_target("X", RenderTargetLayout::color(TextureFormat::Rgba8))
            .unwrap();
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();
        scene.pipeline_mut().get_render_target("X", 64, 64).unwrap();

        scene.update(5.5).unwrap();
        let stats = scene.render().unwrap();

        assert_eq!(stats.evicted_targets, 1);
        assert_eq!(headless(&scene).live_render_targets(), 0);
    }

    #[test]
    fn test_unregistered_target_is_an_error() {
        let mut scene = Scene::default();
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();
        assert!(matches!(
            scene.pipeline_mut().get_render_target("missing", 8, 8),
            Err(RenderError::UnknownRenderTarget(_))
        ));
    }

    #[test]
    fn test_light_count_change_recompiles_variants() {
        let mut scene = geometry_scene();
        add_camera(&mut scene, camera_component());
        add_box(&mut scene, "box", Vec3::new(0.0, 0.0, -5.0));
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();

        scene.render().unwrap();
        assert_eq!(headless(&scene).compiled_labels(), vec!["geometry#00"]);

        let lamp = scene.graph_mut().create_node(
            "lamp",
            NodeKind::Light(LightComponent::point(Vec3::repeat(1.0), 2.0, 10.0)),
        );
        scene.add_node(lamp).unwrap();
        scene.render().unwrap();

        assert_eq!(
            scene.pipeline().light_counts(),
            Some(LightCounts {
                point: 1,
                spot: 0,
                directional: 0
            })
        );
        let context = headless(&scene);
        assert_eq!(context.compiled_labels().len(), 2);
        assert_eq!(context.live_programs(), 1);

        scene.render().unwrap();
        assert_eq!(headless(&scene).compiled_labels().len(), 2);

        scene.graph_mut().set_enabled(lamp, false).unwrap();
        scene.render().unwrap();
        assert_eq!(headless(&scene).compiled_labels().len(), 3);
    }

    #[test]
    fn test_light_counts_are_clamped_to_limits() {
        let mut scene = geometry_scene();
        for i in 0..3 {
            let sun = scene.graph_mut().create_node(
                format!("sun{i}"),
                NodeKind::Light(LightComponent::directional(Vec3::repeat(1.0), 1.0)),
            );
            scene.add_node(sun).unwrap();
        }
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();
        scene.render().unwrap();

        let counts = scene.pipeline().light_counts().unwrap();
        assert_eq!(counts.directional, LightLimits::default().max_directional);
    }

    #[test]
    fn test_shader_compile_failure_is_fatal() {
        let mut scene = Scene::default();
        add_camera(&mut scene, camera_component());
        add_box(&mut scene, "box", Vec3::new(0.0, 0.0, -5.0));
        scene
            .pipeline_mut()
            .add_camera_pass(Box::new(GeometryPass::new(
                "broken",
                ShaderSource::new(VERTEX, "#version 330 core\nBROKEN\n"),
            )))
            .unwrap();
        scene
            .initialize(Box::new(HeadlessContext::new().with_compile_failure("BROKEN")))
            .unwrap();

        let err = scene.render().unwrap_err();
        match err {
            EngineError::Render(RenderError::ShaderCompilation { program, log }) => {
                assert!(program.starts_with("broken"));
                assert!(log.contains("BROKEN"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_bones_only_uploaded_for_skinned_meshes() {
        let mut scene = geometry_scene();
        add_camera(&mut scene, camera_component());
        let skeleton = scene.graph_mut().create_node("root_bone", NodeKind::Bone);
        let skinned = box_mesh(&mut scene).with_skin(Skin {
            skeleton: Some(skeleton),
            bone_matrices: vec![Mat4::identity(); 3],
        });
        add_mesh(&mut scene, "skinned", skinned, Vec3::new(0.0, 0.0, -5.0));
        add_box(&mut scene, "static", Vec3::new(0.0, 0.0, -6.0));
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();

        let stats = scene.render().unwrap();

        let context = headless(&scene);
        let bone_uploads = context
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::SetUniform { name, .. } if name == "u_bones"))
            .count();
        assert_eq!(bone_uploads, 1);
        assert_eq!(stats.draw_calls, 2);
        assert!(context.compiled_labels().contains(&"geometry#01"));
        assert!(context.compiled_labels().contains(&"geometry#00"));
    }

    #[test]
    fn test_frame_pass_runs_without_camera() {
        let mut scene = Scene::default();
        scene
            .pipeline_mut()
            .add_frame_pass(Box::new(ClearPass::new(
                "shadow",
                RenderTargetLayout::depth_only(TextureFormat::Depth32F),
                512,
                512,
                [0.0; 4],
            )))
            .unwrap();
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();

        let stats = scene.render().unwrap();

        assert_eq!(stats.passes_run, 1);
        assert_eq!(stats.cameras_rendered, 0);
        let context = headless(&scene);
        assert_eq!(context.live_render_targets(), 1);
        assert!(context.commands().contains(&GpuCommand::Clear {
            color: None,
            depth: Some(1.0)
        }));
    }

    /// Frame pass recording how many meshes it was handed
    struct MeshCounter {
        seen: Rc<Cell<usize>>,
    }

    impl RenderPass for MeshCounter {
        fn name(&self) -> &str {
            "mesh_counter"
        }

        fn render(&mut self, pass: &mut PassContext<'_>) -> RenderResult<()> {
            self.seen.set(pass.meshes(&MeshFilter::all()).len());
            Ok(())
        }
    }

    #[test]
    fn test_frame_pass_skips_disabled_meshes() {
        let mut scene = Scene::default();
        let seen = Rc::new(Cell::new(usize::MAX));
        scene
            .pipeline_mut()
            .add_frame_pass(Box::new(MeshCounter { seen: Rc::clone(&seen) }))
            .unwrap();
        let mesh = add_box(&mut scene, "box", Vec3::new(0.0, 0.0, -5.0));
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();

        scene.render().unwrap();
        assert_eq!(seen.get(), 1);

        scene.graph_mut().set_enabled(mesh, false).unwrap();
        scene.render().unwrap();
        assert_eq!(seen.get(), 0);
    }

    #[test]
    fn test_skipped_camera_forgets_its_visible_list() {
        let mut scene = geometry_scene();
        let camera = add_camera(&mut scene, camera_component());
        let mesh = add_box(&mut scene, "box", Vec3::new(0.0, 0.0, -5.0));
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();

        scene.render().unwrap();
        assert_eq!(scene.pipeline().visible_meshes(camera), &[mesh]);

        scene.graph_mut().set_enabled(camera, false).unwrap();
        let stats = scene.render().unwrap();
        assert_eq!(stats.cameras_rendered, 0);
        assert!(scene.pipeline().visible_meshes(camera).is_empty());
    }

    #[test]
    fn test_context_stays_reachable_through_the_pipeline() {
        let mut scene = geometry_scene();
        add_camera(&mut scene, camera_component());
        add_box(&mut scene, "box", Vec3::new(0.0, 0.0, -5.0));
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();
        scene.render().unwrap();

        scene
            .pipeline_mut()
            .context_mut::<HeadlessContext>()
            .unwrap()
            .clear_commands();
        scene.render().unwrap();
        assert_eq!(headless(&scene).draw_count(), 1);

        scene.destroy().unwrap();
        let context = scene.pipeline_mut().take_context().unwrap();
        assert_eq!(context.name(), "headless");
        assert!(scene.pipeline().context::<HeadlessContext>().is_none());
    }

    #[test]
    fn test_pass_added_after_initialize_is_set_up() {
        let mut scene = Scene::default();
        add_camera(&mut scene, camera_component());
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();
        scene
            .pipeline_mut()
            .add_camera_pass(Box::new(
                GeometryPass::new("late", source()).with_target("late", RenderTargetLayout::color(TextureFormat::Rgba8)),
            ))
            .unwrap();

        assert!(scene.pipeline().render_targets().is_registered("late"));
        let stats = scene.render().unwrap();
        assert_eq!(stats.passes_run, 1);
    }

    #[test]
    fn test_render_before_initialize_fails() {
        let mut scene = geometry_scene();
        assert!(matches!(
            scene.render(),
            Err(EngineError::Render(RenderError::NotInitialized))
        ));
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut scene = geometry_scene();
        add_camera(&mut scene, camera_component());
        add_box(&mut scene, "box", Vec3::new(0.0, 0.0, -5.0));
        scene
            .pipeline_mut()
            .register_render_target("X", RenderTargetLayout::color(TextureFormat::Rgba8))
            .unwrap();
        scene.initialize(Box::new(HeadlessContext::new())).unwrap();
        scene.render().unwrap();
        scene.pipeline_mut().get_render_target("X", 32, 32).unwrap();

        scene.destroy().unwrap();

        let context = headless(&scene);
        assert_eq!(context.live_buffers(), 0);
        assert_eq!(context.live_programs(), 0);
        assert_eq!(context.live_render_targets(), 0);
        assert_eq!(scene.pipeline().mesh_count(), 0);
        assert_eq!(scene.pipeline().state(), PipelineLifecycle::Destroyed);
        assert!(matches!(scene.render(), Err(EngineError::Render(RenderError::Destroyed))));
    }
}
