//! GPU-backed resources
//!
//! Geometry and textures are created on the CPU, flagged for upload, and
//! pushed to the graphics context by the pipeline once per frame. Every
//! resource is destroyed exactly once when the pipeline is torn down.

use crate::foundation::math::Vec3;
use crate::render::{BufferHandle, BufferKind, GraphicsContext, RenderResult, TextureDesc, TextureHandle};
use crate::spatial::{BoundingBox, BoundsError};
use bytemuck::{Pod, Zeroable};
use slotmap::SlotMap;

slotmap::new_key_type! {
    /// Handle to a [`Geometry`] in a [`ResourceRegistry`]
    pub struct GeometryId;

    /// Handle to a [`Texture`] in a [`ResourceRegistry`]
    pub struct TextureId;
}

/// Upload contract for anything the pipeline keeps on the GPU
pub trait GpuResource {
    /// True while CPU data has not reached the GPU
    fn needs_upload(&self) -> bool;

    /// Flag the resource for upload on the next frame
    fn mark_needs_upload(&mut self);

    /// Push CPU data to the GPU and clear the flag
    ///
    /// Does nothing when the flag is clear.
    fn upload(&mut self, context: &mut dyn GraphicsContext) -> RenderResult<()>;

    /// Release every GPU handle
    fn destroy(&mut self, context: &mut dyn GraphicsContext);
}

/// Vertex structure for 3D rendering
///
/// The `#[repr(C)]` layout is what the buffer upload relies on.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in 3D space
    pub position: [f32; 3],

    /// Normal vector
    pub normal: [f32; 3],

    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Create a new vertex
    pub const fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }
}

/// Four bone influences of one vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SkinWeights {
    /// Bone palette indices
    pub joints: [u32; 4],
    /// Matching weights, summing to one
    pub weights: [f32; 4],
}

/// Indexed triangle geometry
#[derive(Debug, Clone)]
pub struct Geometry {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    skin_weights: Option<Vec<SkinWeights>>,
    local_bounds: BoundingBox,
    vertex_buffer: Option<BufferHandle>,
    index_buffer: Option<BufferHandle>,
    weights_buffer: Option<BufferHandle>,
    needs_upload: bool,
}

impl Geometry {
    /// Create geometry; the bounds are computed from vertex positions
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Result<Self, BoundsError> {
        let positions: Vec<Vec3> = vertices.iter().map(|v| Vec3::from(v.position)).collect();
        let local_bounds = BoundingBox::from_points(&positions)?;
        Ok(Self {
            vertices,
            indices,
            skin_weights: None,
            local_bounds,
            vertex_buffer: None,
            index_buffer: None,
            weights_buffer: None,
            needs_upload: true,
        })
    }

    /// Attach per-vertex skin weights
    #[must_use]
    pub fn with_skin_weights(mut self, weights: Vec<SkinWeights>) -> Self {
        self.skin_weights = Some(weights);
        self.needs_upload = true;
        self
    }

    /// Axis-aligned cube centered at the origin with the given edge length
    pub fn cube(size: f32) -> Result<Self, BoundsError> {
        let h = size * 0.5;
        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for axis in 0..3 {
            for sign in [1.0_f32, -1.0] {
                let mut normal = [0.0; 3];
                normal[axis] = sign;
                let u = (axis + 1) % 3;
                let v = (axis + 2) % 3;

                let base = vertices.len() as u32;
                for (du, dv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                    let mut position = [0.0; 3];
                    position[axis] = sign * h;
                    position[u] = du * h;
                    position[v] = dv * h * sign;
                    vertices.push(Vertex::new(position, normal, [(du + 1.0) * 0.5, (dv + 1.0) * 0.5]));
                }
                indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
            }
        }

        Self::new(vertices, indices)
    }

    /// Vertex data
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Index data
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Number of indices
    pub fn index_count(&self) -> u32 {
        u32::try_from(self.indices.len()).unwrap_or(u32::MAX)
    }

    /// Bounds in model space
    pub const fn local_bounds(&self) -> BoundingBox {
        self.local_bounds
    }

    /// Vertex and index buffers, once uploaded
    pub const fn buffers(&self) -> Option<(BufferHandle, BufferHandle)> {
        match (self.vertex_buffer, self.index_buffer) {
            (Some(vertices), Some(indices)) => Some((vertices, indices)),
            _ => None,
        }
    }

    /// Skin weight buffer, once uploaded
    pub const fn weights_buffer(&self) -> Option<BufferHandle> {
        self.weights_buffer
    }

    fn release(&mut self, context: &mut dyn GraphicsContext) {
        for buffer in [
            self.vertex_buffer.take(),
            self.index_buffer.take(),
            self.weights_buffer.take(),
        ]
        .into_iter()
        .flatten()
        {
            context.destroy_buffer(buffer);
        }
    }
}

impl GpuResource for Geometry {
    fn needs_upload(&self) -> bool {
        self.needs_upload
    }

    fn mark_needs_upload(&mut self) {
        self.needs_upload = true;
    }

    fn upload(&mut self, context: &mut dyn GraphicsContext) -> RenderResult<()> {
        if !self.needs_upload {
            return Ok(());
        }
        self.release(context);

        self.vertex_buffer = Some(context.create_buffer(BufferKind::Vertex, bytemuck::cast_slice(&self.vertices))?);
        self.index_buffer = Some(context.create_buffer(BufferKind::Index, bytemuck::cast_slice(&self.indices))?);
        if let Some(weights) = &self.skin_weights {
            self.weights_buffer = Some(context.create_buffer(BufferKind::SkinWeights, bytemuck::cast_slice(weights))?);
        }

        self.needs_upload = false;
        Ok(())
    }

    fn destroy(&mut self, context: &mut dyn GraphicsContext) {
        self.release(context);
        self.needs_upload = true;
    }
}

/// Sampled image
#[derive(Debug, Clone)]
pub struct Texture {
    desc: TextureDesc,
    data: Option<Vec<u8>>,
    handle: Option<TextureHandle>,
    needs_upload: bool,
}

impl Texture {
    /// Create a texture from tightly packed texels, or uninitialized with `None`
    pub const fn new(desc: TextureDesc, data: Option<Vec<u8>>) -> Self {
        Self {
            desc,
            data,
            handle: None,
            needs_upload: true,
        }
    }

    /// Creation parameters
    pub const fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    /// GPU handle, once uploaded
    pub const fn handle(&self) -> Option<TextureHandle> {
        self.handle
    }
}

impl GpuResource for Texture {
    fn needs_upload(&self) -> bool {
        self.needs_upload
    }

    fn mark_needs_upload(&mut self) {
        self.needs_upload = true;
    }

    fn upload(&mut self, context: &mut dyn GraphicsContext) -> RenderResult<()> {
        if !self.needs_upload {
            return Ok(());
        }
        if let Some(old) = self.handle.take() {
            context.destroy_texture(old);
        }
        self.handle = Some(context.create_texture(&self.desc, self.data.as_deref())?);
        self.needs_upload = false;
        Ok(())
    }

    fn destroy(&mut self, context: &mut dyn GraphicsContext) {
        if let Some(handle) = self.handle.take() {
            context.destroy_texture(handle);
        }
        self.needs_upload = true;
    }
}

/// Owner of every geometry and texture used by the scene
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    geometries: SlotMap<GeometryId, Geometry>,
    textures: SlotMap<TextureId, Texture>,
}

impl ResourceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register geometry; it is uploaded on the next frame
    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        self.geometries.insert(geometry)
    }

    /// Look up geometry
    pub fn geometry(&self, id: GeometryId) -> Option<&Geometry> {
        self.geometries.get(id)
    }

    /// Register a texture; it is uploaded on the next frame
    pub fn add_texture(&mut self, texture: Texture) -> TextureId {
        self.textures.insert(texture)
    }

    /// Look up a texture
    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id)
    }

    /// Number of resources waiting for upload
    pub fn pending_uploads(&self) -> usize {
        self.geometries.values().filter(|g| g.needs_upload()).count()
            + self.textures.values().filter(|t| t.needs_upload()).count()
    }

    /// Upload every flagged resource; returns how many were uploaded
    pub fn upload_pending(&mut self, context: &mut dyn GraphicsContext) -> RenderResult<usize> {
        let mut uploaded = 0;
        for geometry in self.geometries.values_mut().filter(|g| g.needs_upload()) {
            geometry.upload(context)?;
            uploaded += 1;
        }
        for texture in self.textures.values_mut().filter(|t| t.needs_upload()) {
            texture.upload(context)?;
            uploaded += 1;
        }
        Ok(uploaded)
    }

    /// Release every GPU handle and forget all resources
    pub fn destroy_all(&mut self, context: &mut dyn GraphicsContext) {
        for geometry in self.geometries.values_mut() {
            geometry.destroy(context);
        }
        for texture in self.textures.values_mut() {
            texture.destroy(context);
        }
        self.geometries.clear();
        self.textures.clear();
    }
}
