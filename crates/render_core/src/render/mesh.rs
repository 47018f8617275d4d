//! Mesh and material payloads

use crate::foundation::math::{Mat4, Vec4};
use crate::render::{GeometryId, ShaderFeatures, TextureId};
use crate::scene::NodeId;
use crate::spatial::BoundingBox;

/// How a material's fragments combine with the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    /// Fully opaque
    #[default]
    Opaque,
    /// Alpha-tested cutout
    Masked,
    /// Alpha blended
    Translucent,
}

/// Surface description of a mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    /// Material name, used in logs and as the override cache label
    pub name: String,
    /// Blend mode
    pub blend_mode: BlendMode,
    /// Base color multiplier
    pub base_color: Vec4,
    /// Alpha threshold for [`BlendMode::Masked`]
    pub alpha_cutoff: f32,
    /// Optional base color texture
    pub base_color_texture: Option<TextureId>,
    /// Optional tangent-space normal map
    pub normal_texture: Option<TextureId>,
    /// Optional replacement vertex and fragment sources
    pub shader_override: Option<(String, String)>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            blend_mode: BlendMode::Opaque,
            base_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            alpha_cutoff: 0.5,
            base_color_texture: None,
            normal_texture: None,
            shader_override: None,
        }
    }
}

impl Material {
    /// Opaque material with a base color
    pub fn new(name: impl Into<String>, base_color: Vec4) -> Self {
        Self {
            name: name.into(),
            base_color,
            ..Default::default()
        }
    }

    /// Set the blend mode
    #[must_use]
    pub fn with_blend_mode(mut self, blend_mode: BlendMode) -> Self {
        self.blend_mode = blend_mode;
        self
    }

    /// Set the base color texture
    #[must_use]
    pub fn with_base_color_texture(mut self, texture: TextureId) -> Self {
        self.base_color_texture = Some(texture);
        self
    }

    /// Set the normal map
    #[must_use]
    pub fn with_normal_texture(mut self, texture: TextureId) -> Self {
        self.normal_texture = Some(texture);
        self
    }

    /// Replace the pass shader sources for meshes using this material
    #[must_use]
    pub fn with_shader_override(mut self, vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        self.shader_override = Some((vertex.into(), fragment.into()));
        self
    }
}

/// Skin binding of a mesh
///
/// `bone_matrices` is written by the animation collaborator; the pipeline
/// only uploads it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Skin {
    /// Root bone node of the skeleton
    pub skeleton: Option<NodeId>,
    /// Current per-bone skinning matrices
    pub bone_matrices: Vec<Mat4>,
}

/// Mesh payload of a scene node
#[derive(Debug, Clone, PartialEq)]
pub struct MeshComponent {
    /// Uploaded geometry
    pub geometry: GeometryId,
    /// Material; `None` draws as opaque with default parameters
    pub material: Option<Material>,
    /// Bounds of the geometry in the node's local space
    pub local_bounds: BoundingBox,
    /// Skin binding for animated meshes
    pub skin: Option<Skin>,
}

impl MeshComponent {
    /// Static mesh without a material
    pub const fn new(geometry: GeometryId, local_bounds: BoundingBox) -> Self {
        Self {
            geometry,
            material: None,
            local_bounds,
            skin: None,
        }
    }

    /// Set the material
    #[must_use]
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = Some(material);
        self
    }

    /// Bind a skin
    #[must_use]
    pub fn with_skin(mut self, skin: Skin) -> Self {
        self.skin = Some(skin);
        self
    }

    /// Blend mode, opaque when no material is set
    pub fn blend_mode(&self) -> BlendMode {
        self.material.as_ref().map_or(BlendMode::Opaque, |m| m.blend_mode)
    }

    /// True only with a skin bound to a skeleton
    pub fn is_skinned(&self) -> bool {
        self.skin.as_ref().is_some_and(|skin| skin.skeleton.is_some())
    }

    /// Shader features implied by this mesh
    pub fn features(&self) -> ShaderFeatures {
        let mut features = ShaderFeatures::empty();
        if self.is_skinned() {
            features |= ShaderFeatures::SKINNED;
        }
        match self.blend_mode() {
            BlendMode::Opaque => {}
            BlendMode::Masked => features |= ShaderFeatures::ALPHA_MASK,
            BlendMode::Translucent => features |= ShaderFeatures::TRANSLUCENT,
        }
        if self.material.as_ref().is_some_and(|m| m.normal_texture.is_some()) {
            features |= ShaderFeatures::NORMAL_MAP;
        }
        features
    }
}
