//! Per-camera mesh drawing

use crate::render::{
    GraphicsContext, LightCounts, MeshFilter, PassContext, PassSetup, PipelineState, RenderPass, RenderResult,
    RenderTargetLayout, ShaderFeatures, ShaderProgramCache, ShaderSource, UniformValue,
};

/// Draws the camera's visible meshes that match a filter
///
/// Output goes to the pass's own named target when one is set, otherwise to
/// the camera's target, otherwise to the default framebuffer. Targets are
/// sized to the camera viewport. Draws are grouped by shader variant, keeping
/// visible-list order inside each group.
pub struct GeometryPass {
    name: String,
    target: Option<(String, RenderTargetLayout)>,
    filter: MeshFilter,
    state: PipelineState,
    features: ShaderFeatures,
    clear: bool,
    shaders: ShaderProgramCache,
}

impl GeometryPass {
    /// Opaque pass drawing every visible mesh with `source`
    pub fn new(name: impl Into<String>, source: ShaderSource) -> Self {
        let name = name.into();
        Self {
            shaders: ShaderProgramCache::new(name.clone(), source),
            name,
            target: None,
            filter: MeshFilter::all(),
            state: PipelineState::opaque(),
            features: ShaderFeatures::empty(),
            clear: true,
        }
    }

    /// Render into a named target registered with `layout` at setup
    #[must_use]
    pub fn with_target(mut self, name: impl Into<String>, layout: RenderTargetLayout) -> Self {
        self.target = Some((name.into(), layout));
        self
    }

    /// Restrict drawn meshes
    #[must_use]
    pub fn with_filter(mut self, filter: MeshFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Depth, blend and cull state
    #[must_use]
    pub fn with_state(mut self, state: PipelineState) -> Self {
        self.state = state;
        self
    }

    /// Features added to every mesh's own, e.g. [`ShaderFeatures::SHADOWS`]
    #[must_use]
    pub fn with_features(mut self, features: ShaderFeatures) -> Self {
        self.features = features;
        self
    }

    /// Whether to clear the output to the camera's clear color first
    #[must_use]
    pub fn with_clear(mut self, clear: bool) -> Self {
        self.clear = clear;
        self
    }

    /// Shader variants of this pass
    pub const fn shaders(&self) -> &ShaderProgramCache {
        &self.shaders
    }
}

impl RenderPass for GeometryPass {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self, setup: &mut PassSetup<'_>) -> RenderResult<()> {
        if let Some((target, layout)) = &self.target {
            setup.register_render_target(target, layout.clone())?;
        }
        log::debug!("Geometry pass '{}' set up", self.name);
        Ok(())
    }

    fn on_light_counts_changed(&mut self, counts: &LightCounts, context: &mut dyn GraphicsContext) {
        self.shaders.regenerate(counts, context);
    }

    fn before_render(&mut self, pass: &mut PassContext<'_>) -> RenderResult<()> {
        let camera = pass.require_camera(&self.name)?;
        let target = self
            .target
            .as_ref()
            .map(|(name, _)| name.as_str())
            .or(camera.target.as_deref());
        pass.bind_output(target, camera.viewport)?;
        if self.clear {
            pass.context.clear(Some(camera.clear_color), Some(1.0));
        }
        self.shaders.reset_binding();
        Ok(())
    }

    fn render(&mut self, pass: &mut PassContext<'_>) -> RenderResult<()> {
        let camera = pass.require_camera(&self.name)?;
        pass.context.set_pipeline_state(&self.state);

        let mut draws = pass.meshes(&self.filter);
        draws.sort_by_key(|(_, mesh)| (mesh.features() | self.features).bits());
        let lights = pass.lights.uniforms();

        for (node, mesh) in draws {
            let Some(geometry) = pass.resources.geometry(mesh.geometry) else {
                log::warn!("Mesh {node:?} references unknown geometry; skipped");
                continue;
            };
            let Some((vertices, indices)) = geometry.buffers() else {
                continue;
            };

            self.shaders
                .use_material_shader(mesh.features() | self.features, mesh.material.as_ref());
            self.shaders.set_uniform("u_view", UniformValue::Mat4(camera.view));
            self.shaders.set_uniform("u_projection", UniformValue::Mat4(camera.projection));
            self.shaders
                .set_uniform("u_view_projection", UniformValue::Mat4(camera.view_projection));
            self.shaders
                .set_uniform("u_camera_position", UniformValue::Vec3(camera.position));
            self.shaders
                .set_uniform("u_model", UniformValue::Mat4(pass.graph.world_matrix(node)?));
            for (name, value) in &lights {
                self.shaders.set_uniform(name, value.clone());
            }

            if let Some(material) = &mesh.material {
                self.shaders
                    .set_uniform("u_base_color", UniformValue::Vec4(material.base_color));
                self.shaders
                    .set_uniform("u_alpha_cutoff", UniformValue::Float(material.alpha_cutoff));
                let textures = [
                    ("u_base_color_texture", material.base_color_texture),
                    ("u_normal_texture", material.normal_texture),
                ];
                for (uniform, texture) in textures {
                    if let Some(handle) = texture.and_then(|id| pass.resources.texture(id)?.handle()) {
                        self.shaders.set_texture(uniform, handle);
                    }
                }
            }

            if mesh.is_skinned() {
                if let Some(skin) = &mesh.skin {
                    self.shaders
                        .set_uniform("u_bones", UniformValue::Mat4Array(skin.bone_matrices.clone()));
                }
            }

            self.shaders
                .draw(pass.context, vertices, indices, geometry.index_count())?;
            pass.stats.draw_calls += 1;
        }
        Ok(())
    }

    fn destroy(&mut self, context: &mut dyn GraphicsContext) {
        self.shaders.destroy(context);
    }
}
