//! Render pipeline and GPU plumbing
//!
//! The [`RenderPipeline`] keeps per-category registries of attached nodes,
//! indexes mesh bounds in an octree, and runs registered [`RenderPass`]es once
//! per frame or once per camera. All GPU calls go through the
//! [`GraphicsContext`] trait supplied by the embedding layer.

pub mod camera;
pub mod context;
pub mod headless;
pub mod lighting;
pub mod mesh;
pub mod pass;
pub mod passes;
pub mod pipeline;
pub mod render_target;
pub mod resources;
pub mod shader;

#[cfg(test)]
mod pipeline_tests;

pub use camera::{CameraComponent, CameraView, Projection, Viewport};
pub use context::{
    BlendState, BufferHandle, BufferKind, CullMode, GraphicsContext, PipelineState, ProgramHandle,
    RenderTargetDesc, RenderTargetHandle, TextureDesc, TextureFormat, TextureHandle, UniformValue,
};
pub use headless::{GpuCommand, HeadlessContext};
pub use lighting::{FrameLight, LightComponent, LightCounts, LightKind, LightLimits, LightSet};
pub use mesh::{BlendMode, Material, MeshComponent, Skin};
pub use pass::{MeshFilter, PassContext, PassSetup, RenderPass};
pub use passes::{ClearPass, GeometryPass};
pub use pipeline::{FrameStats, PipelineConfig, PipelineLifecycle, RenderPipeline};
pub use render_target::{RenderTarget, RenderTargetCache, RenderTargetCacheConfig, RenderTargetLayout};
pub use resources::{Geometry, GeometryId, GpuResource, ResourceRegistry, SkinWeights, Texture, TextureId, Vertex};
pub use shader::{ShaderFeatures, ShaderProgramCache, ShaderSource};

use crate::scene::SceneError;
use crate::spatial::{BoundsError, OctreeError};
use thiserror::Error;

/// Rendering errors
///
/// Shader failures are fatal and carry the compiler or linker log; there is
/// no fallback program.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A frame was requested before a graphics context was bound
    #[error("render pipeline is not initialized")]
    NotInitialized,

    /// `initialize` was called twice
    #[error("render pipeline is already initialized")]
    AlreadyInitialized,

    /// The pipeline has been destroyed and cannot be reused
    #[error("render pipeline has been destroyed")]
    Destroyed,

    /// Shader compilation failed
    #[error("shader '{program}' failed to compile:\n{log}")]
    ShaderCompilation {
        /// Program label
        program: String,
        /// Compiler diagnostic text
        log: String,
    },

    /// Shader linking failed
    #[error("shader '{program}' failed to link:\n{log}")]
    ShaderLink {
        /// Program label
        program: String,
        /// Linker diagnostic text
        log: String,
    },

    /// A render target name was requested without being registered
    #[error("render target '{0}' is not registered")]
    UnknownRenderTarget(String),

    /// A render target name was registered twice with different layouts
    #[error("render target '{0}' is already registered with a different layout")]
    DuplicateRenderTarget(String),

    /// A resource handle does not refer to a live resource
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// A camera pass ran without a camera
    #[error("pass '{0}' requires a camera")]
    MissingCamera(String),

    /// The graphics context reported a failure
    #[error("backend error: {0}")]
    Backend(String),

    /// Scene graph lookup failed while rendering
    #[error(transparent)]
    Scene(#[from] SceneError),

    /// Spatial index rejected a mesh
    #[error(transparent)]
    Spatial(#[from] OctreeError),

    /// A mesh or camera produced invalid bounds
    #[error(transparent)]
    Bounds(#[from] BoundsError),
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;
