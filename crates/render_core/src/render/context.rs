//! Graphics context abstraction
//!
//! The embedding layer supplies an implementation of [`GraphicsContext`]
//! bound to its window or offscreen surface. The pipeline only ever talks to
//! the GPU through this trait, using opaque handles.

use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::render::{RenderResult, Viewport};

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

/// Handle to a GPU render target (framebuffer with attachments)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetHandle(pub u64);

/// Handle to a linked shader program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// Buffer usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Per-vertex attributes
    Vertex,
    /// 32-bit indices
    Index,
    /// Per-vertex skinning weights
    SkinWeights,
}

/// Pixel formats for textures and render target attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit normalized RGBA
    Rgba8,
    /// 16-bit float RGBA
    Rgba16F,
    /// 32-bit float RGBA
    Rgba32F,
    /// 32-bit float single channel
    R32F,
    /// Packed depth and stencil
    Depth24Stencil8,
    /// 32-bit float depth
    Depth32F,
}

impl TextureFormat {
    /// Whether this is a depth (or depth-stencil) format
    pub const fn is_depth(self) -> bool {
        matches!(self, Self::Depth24Stencil8 | Self::Depth32F)
    }

    /// Size of one texel in bytes
    pub const fn bytes_per_texel(self) -> u32 {
        match self {
            Self::Rgba8 | Self::R32F | Self::Depth24Stencil8 | Self::Depth32F => 4,
            Self::Rgba16F => 8,
            Self::Rgba32F => 16,
        }
    }
}

/// Texture creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
    /// Texel format
    pub format: TextureFormat,
}

/// Render target creation parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargetDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// One entry per color attachment
    pub color_formats: Vec<TextureFormat>,
    /// Optional depth attachment
    pub depth_format: Option<TextureFormat>,
}

/// Face culling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    /// No culling
    None,
    /// Cull front faces
    Front,
    /// Cull back faces
    #[default]
    Back,
}

/// Blend equation applied to color writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendState {
    /// Overwrite destination
    #[default]
    Replace,
    /// Standard source-alpha blending
    Alpha,
    /// Additive accumulation
    Additive,
}

/// Fixed-function state a pass sets before drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineState {
    /// Enable depth testing
    pub depth_test: bool,
    /// Enable depth writing
    pub depth_write: bool,
    /// Color blending
    pub blend: BlendState,
    /// Cull mode for backface culling
    pub cull: CullMode,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::opaque()
    }
}

impl PipelineState {
    /// Depth-tested, depth-writing, back-face culled, no blending
    pub const fn opaque() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            blend: BlendState::Replace,
            cull: CullMode::Back,
        }
    }

    /// Depth-tested without depth writes, alpha blended, double sided
    pub const fn translucent() -> Self {
        Self {
            depth_test: true,
            depth_write: false,
            blend: BlendState::Alpha,
            cull: CullMode::None,
        }
    }

    /// No depth, no culling; for fullscreen work
    pub const fn overlay() -> Self {
        Self {
            depth_test: false,
            depth_write: false,
            blend: BlendState::Alpha,
            cull: CullMode::None,
        }
    }
}

/// Value of a shader uniform
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    /// Scalar float
    Float(f32),
    /// Scalar integer
    Int(i32),
    /// 3-component vector
    Vec3(Vec3),
    /// 4-component vector
    Vec4(Vec4),
    /// 4x4 matrix
    Mat4(Mat4),
    /// Array of 4x4 matrices (bone palettes)
    Mat4Array(Vec<Mat4>),
    /// Texture unit index for a sampler
    Sampler(u32),
}

/// GPU access supplied by the embedding layer
///
/// Every call happens on the thread that owns the context.
pub trait GraphicsContext {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Downcast to the concrete context type
    fn as_any(&self) -> &dyn std::any::Any;

    /// Downcast to the mutable concrete context type
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;

    /// Create a buffer initialized with `data`
    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> RenderResult<BufferHandle>;

    /// Release a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Create a texture, optionally initialized with tightly packed texels
    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> RenderResult<TextureHandle>;

    /// Release a texture
    fn destroy_texture(&mut self, texture: TextureHandle);

    /// Create a render target with the given attachments
    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> RenderResult<RenderTargetHandle>;

    /// Release a render target and its attachments
    fn destroy_render_target(&mut self, target: RenderTargetHandle);

    /// Compile and link a program
    ///
    /// Failures return [`RenderError::ShaderCompilation`](crate::render::RenderError::ShaderCompilation)
    /// or [`RenderError::ShaderLink`](crate::render::RenderError::ShaderLink) carrying the
    /// driver log.
    fn compile_program(&mut self, label: &str, vertex: &str, fragment: &str) -> RenderResult<ProgramHandle>;

    /// Release a program
    fn destroy_program(&mut self, program: ProgramHandle);

    /// Direct output to a render target, or to the default framebuffer with `None`
    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>) -> RenderResult<()>;

    /// Set the output rectangle
    fn set_viewport(&mut self, viewport: Viewport);

    /// Clear the bound target
    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>);

    /// Apply fixed-function state
    fn set_pipeline_state(&mut self, state: &PipelineState);

    /// Make a program current
    fn use_program(&mut self, program: ProgramHandle) -> RenderResult<()>;

    /// Set a uniform on the current program
    fn set_uniform(&mut self, name: &str, value: &UniformValue) -> RenderResult<()>;

    /// Bind a texture to a texture unit
    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> RenderResult<()>;

    /// Draw indexed triangles
    fn draw_indexed(&mut self, vertices: BufferHandle, indices: BufferHandle, index_count: u32) -> RenderResult<()>;
}
