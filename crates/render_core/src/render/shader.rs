//! Shader variants and per-pass program caching
//!
//! A pass owns one [`ShaderProgramCache`] built from a source template. The
//! template may reference the light-count constants `${MAX_POINT_LIGHTS}`,
//! `${MAX_SPOT_LIGHTS}` and `${MAX_DIRECTIONAL_LIGHTS}`, which are substituted
//! whenever the pipeline reports new light counts. Variants add one
//! `#define` per [`ShaderFeatures`] flag and are compiled lazily on the first
//! draw that needs them.
//!
//! Uniforms and texture bindings are accumulated per shader-use block and
//! sent to the context on draw. The texture unit counter restarts at every
//! [`ShaderProgramCache::use_shader`], so all textures of one draw must be
//! bound inside one block.

use crate::render::{
    BufferHandle, GraphicsContext, LightCounts, Material, ProgramHandle, RenderResult, TextureHandle, UniformValue,
};
use bitflags::bitflags;
use std::collections::HashMap;

bitflags! {
    /// Feature switches selecting a shader variant
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderFeatures: u32 {
        /// Vertex skinning with a bone palette
        const SKINNED = 1 << 0;
        /// Alpha-tested cutout
        const ALPHA_MASK = 1 << 1;
        /// Alpha blended output
        const TRANSLUCENT = 1 << 2;
        /// Tangent-space normal mapping
        const NORMAL_MAP = 1 << 3;
        /// Shadow map sampling
        const SHADOWS = 1 << 4;
    }
}

impl ShaderFeatures {
    /// Preprocessor define for each set flag
    pub fn defines(self) -> Vec<&'static str> {
        self.iter_names()
            .map(|(name, _)| match name {
                "SKINNED" => "USE_SKINNING",
                "ALPHA_MASK" => "USE_ALPHA_MASK",
                "TRANSLUCENT" => "USE_TRANSLUCENCY",
                "NORMAL_MAP" => "USE_NORMAL_MAP",
                _ => "USE_SHADOWS",
            })
            .collect()
    }
}

/// Vertex and fragment source pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderSource {
    /// Vertex stage source
    pub vertex: String,
    /// Fragment stage source
    pub fragment: String,
}

impl ShaderSource {
    /// Create a source pair
    pub fn new(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self {
            vertex: vertex.into(),
            fragment: fragment.into(),
        }
    }

    /// Substitute the light-count placeholders
    #[must_use]
    pub fn with_light_counts(&self, counts: &LightCounts) -> Self {
        let substitute = |source: &str| {
            source
                .replace("${MAX_POINT_LIGHTS}", &counts.point.to_string())
                .replace("${MAX_SPOT_LIGHTS}", &counts.spot.to_string())
                .replace("${MAX_DIRECTIONAL_LIGHTS}", &counts.directional.to_string())
        };
        Self {
            vertex: substitute(&self.vertex),
            fragment: substitute(&self.fragment),
        }
    }

    /// Source with one `#define` per feature, placed after any `#version` line
    #[must_use]
    pub fn variant(&self, features: ShaderFeatures) -> Self {
        let defines: String = features
            .defines()
            .into_iter()
            .map(|define| format!("#define {define}\n"))
            .collect();
        Self {
            vertex: insert_defines(&self.vertex, &defines),
            fragment: insert_defines(&self.fragment, &defines),
        }
    }
}

fn insert_defines(source: &str, defines: &str) -> String {
    if defines.is_empty() {
        return source.to_string();
    }
    if source.starts_with("#version") {
        if let Some(line_end) = source.find('\n') {
            let (version, body) = source.split_at(line_end + 1);
            return format!("{version}{defines}{body}");
        }
        return format!("{source}\n{defines}");
    }
    format!("{defines}{source}")
}

/// Which program the current block draws with
#[derive(Debug, Clone, PartialEq, Eq)]
enum ActiveProgram {
    Variant(ShaderFeatures),
    Override {
        label: String,
        features: ShaderFeatures,
        source: ShaderSource,
    },
}

/// Lazily compiled shader variants of one pass
#[derive(Debug)]
pub struct ShaderProgramCache {
    label: String,
    template: ShaderSource,
    source: ShaderSource,
    counts: LightCounts,
    programs: HashMap<ShaderFeatures, ProgramHandle>,
    overrides: HashMap<(ShaderSource, ShaderFeatures), ProgramHandle>,
    active: Option<ActiveProgram>,
    pending_uniforms: Vec<(String, UniformValue)>,
    pending_textures: Vec<(u32, TextureHandle)>,
    texture_unit: u32,
    bound: Option<ProgramHandle>,
}

impl ShaderProgramCache {
    /// Create a cache for a source template; nothing is compiled yet
    pub fn new(label: impl Into<String>, template: ShaderSource) -> Self {
        let counts = LightCounts::default();
        Self {
            label: label.into(),
            source: template.with_light_counts(&counts),
            template,
            counts,
            programs: HashMap::new(),
            overrides: HashMap::new(),
            active: None,
            pending_uniforms: Vec::new(),
            pending_textures: Vec::new(),
            texture_unit: 0,
            bound: None,
        }
    }

    /// Label used for compiled programs
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Source after light-count substitution
    pub const fn source(&self) -> &ShaderSource {
        &self.source
    }

    /// Number of compiled programs, overrides included
    pub fn compiled_count(&self) -> usize {
        self.programs.len() + self.overrides.len()
    }

    /// Compiled program of a variant, if any
    pub fn program(&self, features: ShaderFeatures) -> Option<ProgramHandle> {
        self.programs.get(&features).copied()
    }

    /// Rebuild the source for new light counts and drop every compiled program
    pub fn regenerate(&mut self, counts: &LightCounts, context: &mut dyn GraphicsContext) {
        self.counts = *counts;
        self.source = self.template.with_light_counts(counts);
        self.invalidate(context);
        log::debug!(
            "Shader '{}' regenerated for {} point, {} spot, {} directional lights",
            self.label,
            counts.point,
            counts.spot,
            counts.directional
        );
    }

    /// Start a block drawing with the variant for `features`
    ///
    /// Nothing is compiled until the first draw of the block.
    pub fn use_shader(&mut self, features: ShaderFeatures) {
        self.active = Some(ActiveProgram::Variant(features));
        self.pending_uniforms.clear();
        self.clear_texture_unit();
    }

    /// Start a block for a material, honouring its shader override
    ///
    /// Override programs are keyed by their source, so materials sharing a
    /// name but not a source compile separately.
    pub fn use_material_shader(&mut self, features: ShaderFeatures, material: Option<&Material>) {
        match material.and_then(|m| m.shader_override.as_ref().map(|o| (m.name.clone(), o))) {
            Some((label, (vertex, fragment))) => {
                self.active = Some(ActiveProgram::Override {
                    label,
                    features,
                    source: ShaderSource::new(vertex.clone(), fragment.clone()),
                });
                self.pending_uniforms.clear();
                self.clear_texture_unit();
            }
            None => self.use_shader(features),
        }
    }

    /// Forget which program the context has bound
    ///
    /// Call at the start of every pass invocation; other passes may have
    /// switched programs since this cache last drew.
    pub fn reset_binding(&mut self) {
        self.bound = None;
    }

    /// Restart texture unit numbering and drop pending texture bindings
    pub fn clear_texture_unit(&mut self) {
        self.texture_unit = 0;
        self.pending_textures.clear();
    }

    /// Queue a uniform for the next draw; later values replace earlier ones
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) {
        if let Some(slot) = self.pending_uniforms.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.pending_uniforms.push((name.to_string(), value));
        }
    }

    /// Bind a texture to the next free unit and point `name` at it
    pub fn set_texture(&mut self, name: &str, texture: TextureHandle) -> u32 {
        let unit = self.texture_unit;
        self.texture_unit += 1;
        self.pending_textures.push((unit, texture));
        self.set_uniform(name, UniformValue::Sampler(unit));
        unit
    }

    /// Resolve the active program, flush pending state and draw
    pub fn draw(
        &mut self,
        context: &mut dyn GraphicsContext,
        vertices: BufferHandle,
        indices: BufferHandle,
        index_count: u32,
    ) -> RenderResult<()> {
        let program = self.resolve(context)?;
        if self.bound != Some(program) {
            context.use_program(program)?;
            self.bound = Some(program);
        }
        for (name, value) in self.pending_uniforms.drain(..) {
            context.set_uniform(&name, &value)?;
        }
        for (unit, texture) in &self.pending_textures {
            context.bind_texture(*unit, *texture)?;
        }
        context.draw_indexed(vertices, indices, index_count)
    }

    /// Release every compiled program
    pub fn destroy(&mut self, context: &mut dyn GraphicsContext) {
        self.invalidate(context);
        self.active = None;
    }

    fn invalidate(&mut self, context: &mut dyn GraphicsContext) {
        for (_, program) in self.programs.drain().chain(self.overrides.drain().map(|((_, f), p)| (f, p))) {
            context.destroy_program(program);
        }
        self.bound = None;
    }

    fn resolve(&mut self, context: &mut dyn GraphicsContext) -> RenderResult<ProgramHandle> {
        let active = self
            .active
            .clone()
            .unwrap_or(ActiveProgram::Variant(ShaderFeatures::empty()));

        match active {
            ActiveProgram::Variant(features) => {
                if let Some(program) = self.programs.get(&features) {
                    return Ok(*program);
                }
                let source = self.source.variant(features);
                let label = format!("{}#{:02x}", self.label, features.bits());
                let program = context.compile_program(&label, &source.vertex, &source.fragment)?;
                log::debug!("Compiled shader variant {label}");
                self.programs.insert(features, program);
                Ok(program)
            }
            ActiveProgram::Override {
                label,
                features,
                source,
            } => {
                let key = (source, features);
                if let Some(program) = self.overrides.get(&key) {
                    return Ok(*program);
                }
                let compiled = key.0.with_light_counts(&self.counts).variant(features);
                let program_label = format!("{}/{}#{:02x}", self.label, label, features.bits());
                let program = context.compile_program(&program_label, &compiled.vertex, &compiled.fragment)?;
                log::debug!("Compiled material override {program_label}");
                self.overrides.insert(key, program);
                Ok(program)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use crate::render::{BufferKind, GpuCommand, HeadlessContext};

    const VERTEX: &str = "#version 330 core\nuniform mat4 u_bones[${MAX_POINT_LIGHTS}];\nvoid main() {}\n";
    const FRAGMENT: &str = "#version 330 core\nvoid main() {}\n";

    fn buffers(context: &mut HeadlessContext) -> (BufferHandle, BufferHandle) {
        (
            context.create_buffer(BufferKind::Vertex, &[0; 32]).unwrap(),
            context.create_buffer(BufferKind::Index, &[0; 12]).unwrap(),
        )
    }

    #[test]
    fn test_variant_defines_follow_version_line() {
        let source = ShaderSource::new(VERTEX, FRAGMENT).variant(ShaderFeatures::SKINNED | ShaderFeatures::NORMAL_MAP);
        assert!(source
            .vertex
            .starts_with("#version 330 core\n#define USE_SKINNING\n#define USE_NORMAL_MAP\n"));

        let bare = ShaderSource::new("void main() {}", "void main() {}").variant(ShaderFeatures::SHADOWS);
        assert!(bare.fragment.starts_with("#define USE_SHADOWS\n"));
    }

    #[test]
    fn test_light_counts_are_substituted() {
        let counts = LightCounts {
            point: 3,
            spot: 0,
            directional: 1,
        };
        let source = ShaderSource::new(VERTEX, FRAGMENT).with_light_counts(&counts);
        assert!(source.vertex.contains("u_bones[3]"));
    }

    #[test]
    fn test_compile_is_lazy_and_memoized() {
        let mut context = HeadlessContext::new();
        let (vertices, indices) = buffers(&mut context);
        let mut cache = ShaderProgramCache::new("geometry", ShaderSource::new(VERTEX, FRAGMENT));

        cache.use_shader(ShaderFeatures::empty());
        assert_eq!(cache.compiled_count(), 0);

        cache.draw(&mut context, vertices, indices, 3).unwrap();
        cache.use_shader(ShaderFeatures::empty());
        cache.draw(&mut context, vertices, indices, 3).unwrap();
        assert_eq!(cache.compiled_count(), 1);

        cache.use_shader(ShaderFeatures::SKINNED);
        cache.draw(&mut context, vertices, indices, 3).unwrap();
        assert_eq!(cache.compiled_count(), 2);
    }

    #[test]
    fn test_texture_units_restart_per_block() {
        let mut context = HeadlessContext::new();
        let (vertices, indices) = buffers(&mut context);
        let texture = context
            .create_texture(
                &crate::render::TextureDesc {
                    width: 1,
                    height: 1,
                    format: crate::render::TextureFormat::Rgba8,
                },
                None,
            )
            .unwrap();
        let mut cache = ShaderProgramCache::new("geometry", ShaderSource::new(VERTEX, FRAGMENT));

        cache.use_shader(ShaderFeatures::empty());
        assert_eq!(cache.set_texture("u_albedo", texture), 0);
        assert_eq!(cache.set_texture("u_normal", texture), 1);
        cache.draw(&mut context, vertices, indices, 3).unwrap();

        cache.use_shader(ShaderFeatures::empty());
        assert_eq!(cache.set_texture("u_albedo", texture), 0);

        let binds = context
            .commands()
            .iter()
            .filter(|c| matches!(c, GpuCommand::BindTexture { .. }))
            .count();
        assert_eq!(binds, 2);
    }

    #[test]
    fn test_regenerate_invalidates_programs() {
        let mut context = HeadlessContext::new();
        let (vertices, indices) = buffers(&mut context);
        let mut cache = ShaderProgramCache::new("geometry", ShaderSource::new(VERTEX, FRAGMENT));
        cache.use_shader(ShaderFeatures::empty());
        cache.draw(&mut context, vertices, indices, 3).unwrap();

        cache.regenerate(
            &LightCounts {
                point: 2,
                spot: 0,
                directional: 0,
            },
            &mut context,
        );
        assert_eq!(cache.compiled_count(), 0);
        assert_eq!(context.live_programs(), 0);
        assert!(cache.source().vertex.contains("u_bones[2]"));
    }

    #[test]
    fn test_material_override_is_cached_separately() {
        let mut context = HeadlessContext::new();
        let (vertices, indices) = buffers(&mut context);
        let mut cache = ShaderProgramCache::new("geometry", ShaderSource::new(VERTEX, FRAGMENT));
        let material = Material::new("toon", Vec4::new(1.0, 1.0, 1.0, 1.0))
            .with_shader_override("void main() {}", "void main() {}");

        for _ in 0..2 {
            cache.use_material_shader(ShaderFeatures::empty(), Some(&material));
            cache.draw(&mut context, vertices, indices, 3).unwrap();
        }
        cache.use_material_shader(ShaderFeatures::empty(), None);
        cache.draw(&mut context, vertices, indices, 3).unwrap();

        assert_eq!(cache.compiled_count(), 2);
        assert!(context.compiled_labels().iter().any(|label| label.contains("toon")));
    }

    #[test]
    fn test_same_named_materials_with_different_overrides_compile_separately() {
        let mut context = HeadlessContext::new();
        let (vertices, indices) = buffers(&mut context);
        let mut cache = ShaderProgramCache::new("geometry", ShaderSource::new(VERTEX, FRAGMENT));
        let white = Vec4::new(1.0, 1.0, 1.0, 1.0);
        let first = Material::new("mat", white).with_shader_override("// A", "void main() {}");
        let second = Material::new("mat", white).with_shader_override("// B", "void main() {}");

        cache.use_material_shader(ShaderFeatures::empty(), Some(&first));
        cache.draw(&mut context, vertices, indices, 3).unwrap();
        cache.use_material_shader(ShaderFeatures::empty(), Some(&second));
        cache.draw(&mut context, vertices, indices, 3).unwrap();
        cache.use_material_shader(ShaderFeatures::empty(), Some(&first));
        cache.draw(&mut context, vertices, indices, 3).unwrap();

        assert_eq!(cache.compiled_count(), 2);
        assert_eq!(context.live_programs(), 2);
    }
}
