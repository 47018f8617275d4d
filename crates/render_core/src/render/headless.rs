//! In-memory graphics context
//!
//! [`HeadlessContext`] performs no GPU work. It hands out monotonically
//! increasing handles, tracks which resources are alive, and records every
//! call as a [`GpuCommand`] so tests and tools can inspect what a frame did.

use crate::render::{
    BufferHandle, BufferKind, GraphicsContext, PipelineState, ProgramHandle, RenderError, RenderResult,
    RenderTargetDesc, RenderTargetHandle, TextureDesc, TextureHandle, UniformValue, Viewport,
};
use std::collections::HashMap;

/// One recorded graphics call
#[derive(Debug, Clone, PartialEq)]
pub enum GpuCommand {
    /// Buffer created
    CreateBuffer {
        /// New handle
        handle: BufferHandle,
        /// Buffer usage
        kind: BufferKind,
        /// Size in bytes
        size: usize,
    },
    /// Buffer released
    DestroyBuffer(BufferHandle),
    /// Texture created
    CreateTexture {
        /// New handle
        handle: TextureHandle,
        /// Creation parameters
        desc: TextureDesc,
    },
    /// Texture released
    DestroyTexture(TextureHandle),
    /// Render target created
    CreateRenderTarget {
        /// New handle
        handle: RenderTargetHandle,
        /// Creation parameters
        desc: RenderTargetDesc,
    },
    /// Render target released
    DestroyRenderTarget(RenderTargetHandle),
    /// Program compiled and linked
    CompileProgram {
        /// New handle
        handle: ProgramHandle,
        /// Program label
        label: String,
    },
    /// Program released
    DestroyProgram(ProgramHandle),
    /// Output redirected
    BindRenderTarget(Option<RenderTargetHandle>),
    /// Viewport changed
    SetViewport(Viewport),
    /// Bound target cleared
    Clear {
        /// Clear color, if color was cleared
        color: Option<[f32; 4]>,
        /// Clear depth, if depth was cleared
        depth: Option<f32>,
    },
    /// Fixed-function state applied
    SetPipelineState(PipelineState),
    /// Program made current
    UseProgram(ProgramHandle),
    /// Uniform set on the current program
    SetUniform {
        /// Uniform name
        name: String,
        /// Uniform value
        value: UniformValue,
    },
    /// Texture bound to a unit
    BindTexture {
        /// Texture unit
        unit: u32,
        /// Bound texture
        texture: TextureHandle,
    },
    /// Indexed draw issued
    DrawIndexed {
        /// Program current at draw time
        program: ProgramHandle,
        /// Vertex buffer
        vertices: BufferHandle,
        /// Index buffer
        indices: BufferHandle,
        /// Number of indices
        index_count: u32,
    },
}

/// Graphics context that records calls instead of executing them
#[derive(Debug, Default)]
pub struct HeadlessContext {
    next_handle: u64,
    commands: Vec<GpuCommand>,
    buffers: HashMap<u64, BufferKind>,
    textures: HashMap<u64, TextureDesc>,
    render_targets: HashMap<u64, RenderTargetDesc>,
    programs: HashMap<u64, String>,
    current_program: Option<ProgramHandle>,
    bound_target: Option<RenderTargetHandle>,
    fail_compile_marker: Option<String>,
}

impl HeadlessContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every compile whose source contains `marker`
    #[must_use]
    pub fn with_compile_failure(mut self, marker: impl Into<String>) -> Self {
        self.fail_compile_marker = Some(marker.into());
        self
    }

    /// Every recorded call, oldest first
    pub fn commands(&self) -> &[GpuCommand] {
        &self.commands
    }

    /// Forget recorded calls; live resources are unaffected
    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Number of live buffers
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Number of live textures
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Number of live render targets
    pub fn live_render_targets(&self) -> usize {
        self.render_targets.len()
    }

    /// Number of live programs
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Creation parameters of a live render target
    pub fn render_target_desc(&self, target: RenderTargetHandle) -> Option<&RenderTargetDesc> {
        self.render_targets.get(&target.0)
    }

    /// Labels of every program compiled so far, including destroyed ones
    pub fn compiled_labels(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                GpuCommand::CompileProgram { label, .. } => Some(label.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Number of draw calls recorded
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, GpuCommand::DrawIndexed { .. }))
            .count()
    }

    /// Currently bound render target
    pub const fn bound_target(&self) -> Option<RenderTargetHandle> {
        self.bound_target
    }

    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl GraphicsContext for HeadlessContext {
    fn name(&self) -> &str {
        "headless"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn create_buffer(&mut self, kind: BufferKind, data: &[u8]) -> RenderResult<BufferHandle> {
        let handle = BufferHandle(self.allocate());
        self.buffers.insert(handle.0, kind);
        self.commands.push(GpuCommand::CreateBuffer {
            handle,
            kind,
            size: data.len(),
        });
        Ok(handle)
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_some() {
            self.commands.push(GpuCommand::DestroyBuffer(buffer));
        }
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> RenderResult<TextureHandle> {
        if let Some(data) = data {
            let expected = (desc.width * desc.height * desc.format.bytes_per_texel()) as usize;
            if data.len() != expected {
                return Err(RenderError::Backend(format!(
                    "texture data is {} bytes, expected {expected}",
                    data.len()
                )));
            }
        }
        let handle = TextureHandle(self.allocate());
        self.textures.insert(handle.0, *desc);
        self.commands.push(GpuCommand::CreateTexture { handle, desc: *desc });
        Ok(handle)
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture.0).is_some() {
            self.commands.push(GpuCommand::DestroyTexture(texture));
        }
    }

    fn create_render_target(&mut self, desc: &RenderTargetDesc) -> RenderResult<RenderTargetHandle> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RenderError::Backend(format!(
                "render target size {}x{} is empty",
                desc.width, desc.height
            )));
        }
        let handle = RenderTargetHandle(self.allocate());
        self.render_targets.insert(handle.0, desc.clone());
        self.commands.push(GpuCommand::CreateRenderTarget {
            handle,
            desc: desc.clone(),
        });
        Ok(handle)
    }

    fn destroy_render_target(&mut self, target: RenderTargetHandle) {
        if self.render_targets.remove(&target.0).is_some() {
            if self.bound_target == Some(target) {
                self.bound_target = None;
            }
            self.commands.push(GpuCommand::DestroyRenderTarget(target));
        }
    }

    fn compile_program(&mut self, label: &str, vertex: &str, fragment: &str) -> RenderResult<ProgramHandle> {
        if let Some(marker) = &self.fail_compile_marker {
            if vertex.contains(marker.as_str()) || fragment.contains(marker.as_str()) {
                return Err(RenderError::ShaderCompilation {
                    program: label.to_string(),
                    log: format!("0:1(1): error: syntax error near '{marker}'"),
                });
            }
        }
        let handle = ProgramHandle(self.allocate());
        self.programs.insert(handle.0, label.to_string());
        self.commands.push(GpuCommand::CompileProgram {
            handle,
            label: label.to_string(),
        });
        Ok(handle)
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program.0).is_some() {
            if self.current_program == Some(program) {
                self.current_program = None;
            }
            self.commands.push(GpuCommand::DestroyProgram(program));
        }
    }

    fn bind_render_target(&mut self, target: Option<RenderTargetHandle>) -> RenderResult<()> {
        if let Some(handle) = target {
            if !self.render_targets.contains_key(&handle.0) {
                return Err(RenderError::UnknownResource(format!("{handle:?}")));
            }
        }
        self.bound_target = target;
        self.commands.push(GpuCommand::BindRenderTarget(target));
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.commands.push(GpuCommand::SetViewport(viewport));
    }

    fn clear(&mut self, color: Option<[f32; 4]>, depth: Option<f32>) {
        self.commands.push(GpuCommand::Clear { color, depth });
    }

    fn set_pipeline_state(&mut self, state: &PipelineState) {
        self.commands.push(GpuCommand::SetPipelineState(*state));
    }

    fn use_program(&mut self, program: ProgramHandle) -> RenderResult<()> {
        if !self.programs.contains_key(&program.0) {
            return Err(RenderError::UnknownResource(format!("{program:?}")));
        }
        self.current_program = Some(program);
        self.commands.push(GpuCommand::UseProgram(program));
        Ok(())
    }

    fn set_uniform(&mut self, name: &str, value: &UniformValue) -> RenderResult<()> {
        if self.current_program.is_none() {
            return Err(RenderError::Backend(format!("uniform '{name}' set with no program in use")));
        }
        self.commands.push(GpuCommand::SetUniform {
            name: name.to_string(),
            value: value.clone(),
        });
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> RenderResult<()> {
        if !self.textures.contains_key(&texture.0) {
            return Err(RenderError::UnknownResource(format!("{texture:?}")));
        }
        self.commands.push(GpuCommand::BindTexture { unit, texture });
        Ok(())
    }

    fn draw_indexed(&mut self, vertices: BufferHandle, indices: BufferHandle, index_count: u32) -> RenderResult<()> {
        let program = self
            .current_program
            .ok_or_else(|| RenderError::Backend("draw issued with no program in use".to_string()))?;
        for buffer in [vertices, indices] {
            if !self.buffers.contains_key(&buffer.0) {
                return Err(RenderError::UnknownResource(format!("{buffer:?}")));
            }
        }
        self.commands.push(GpuCommand::DrawIndexed {
            program,
            vertices,
            indices,
            index_count,
        });
        Ok(())
    }
}
