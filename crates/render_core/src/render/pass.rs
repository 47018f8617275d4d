//! Render pass contract
//!
//! A [`RenderPass`] is one unit of GPU work. The pipeline keeps two ordered
//! groups of passes: once-per-frame passes run with no camera, once-per-camera
//! passes run for every enabled camera with that camera's visible meshes.
//! Registration order within a group is the execution order.

use crate::render::{
    BlendMode, CameraView, FrameStats, GraphicsContext, LightCounts, LightSet, MeshComponent, RenderError,
    RenderResult, RenderTargetCache, RenderTargetHandle, RenderTargetLayout, ResourceRegistry, Viewport,
};
use crate::scene::{NodeGraph, NodeId};

/// Access handed to [`RenderPass::setup`]
pub struct PassSetup<'a> {
    /// Graphics context
    pub context: &'a mut dyn GraphicsContext,
    /// Render target registry
    pub render_targets: &'a mut RenderTargetCache,
}

impl PassSetup<'_> {
    /// Register a named render target the pass writes or reads
    pub fn register_render_target(&mut self, name: &str, layout: RenderTargetLayout) -> RenderResult<()> {
        self.render_targets.register(name, layout)
    }
}

/// Per-invocation state handed to a pass
pub struct PassContext<'a> {
    /// Graphics context
    pub context: &'a mut dyn GraphicsContext,
    /// Scene nodes
    pub graph: &'a NodeGraph,
    /// Geometry and textures
    pub resources: &'a ResourceRegistry,
    /// Pooled render targets
    pub render_targets: &'a mut RenderTargetCache,
    /// Enabled lights of this frame
    pub lights: &'a LightSet,
    /// Current camera, `None` for once-per-frame passes
    pub camera: Option<&'a CameraView>,
    /// Meshes to draw: the camera's visible set, or every enabled mesh
    /// for once-per-frame passes
    pub visible_meshes: &'a [NodeId],
    /// Frame clock time in seconds
    pub now: f64,
    /// Counters of the frame in progress
    pub stats: &'a mut FrameStats,
}

impl<'a> PassContext<'a> {
    /// Camera of a per-camera pass
    pub fn require_camera(&self, pass: &str) -> RenderResult<&'a CameraView> {
        self.camera.ok_or_else(|| RenderError::MissingCamera(pass.to_string()))
    }

    /// Fetch (allocating if needed) the named target at the given size
    pub fn render_target(&mut self, name: &str, width: u32, height: u32) -> RenderResult<RenderTargetHandle> {
        self.render_targets
            .get(name, width, height, self.now, self.context)?
            .handle()
            .ok_or_else(|| RenderError::UnknownRenderTarget(name.to_string()))
    }

    /// Bind `target` (or the default framebuffer) sized to `viewport`
    ///
    /// Off-screen targets get a viewport anchored at their origin.
    pub fn bind_output(&mut self, target: Option<&str>, viewport: Viewport) -> RenderResult<()> {
        match target {
            Some(name) => {
                let handle = self.render_target(name, viewport.width, viewport.height)?;
                self.context.bind_render_target(Some(handle))?;
                self.context.set_viewport(Viewport::new(viewport.width, viewport.height));
            }
            None => {
                self.context.bind_render_target(None)?;
                self.context.set_viewport(viewport);
            }
        }
        Ok(())
    }

    /// Visible meshes accepted by `filter`, in visible-list order
    pub fn meshes(&self, filter: &MeshFilter) -> Vec<(NodeId, &'a MeshComponent)> {
        let graph: &'a NodeGraph = self.graph;
        self.visible_meshes
            .iter()
            .filter_map(|id| {
                let mesh = graph.get(*id).ok()?.kind().as_mesh()?;
                filter.matches(mesh).then_some((*id, mesh))
            })
            .collect()
    }
}

/// One unit of pipeline work
///
/// Every hook except [`RenderPass::render`] defaults to doing nothing. Errors
/// propagate out of `render()` unchanged; the pipeline never skips a failing
/// pass.
pub trait RenderPass {
    /// Pass name for logs and errors
    fn name(&self) -> &str;

    /// Called once when the pipeline is initialized, or on registration if
    /// the pipeline is already initialized
    fn setup(&mut self, _setup: &mut PassSetup<'_>) -> RenderResult<()> {
        Ok(())
    }

    /// Called before a frame whose clamped light counts differ from the
    /// previous frame's
    fn on_light_counts_changed(&mut self, _counts: &LightCounts, _context: &mut dyn GraphicsContext) {}

    /// Called before [`RenderPass::render`]
    fn before_render(&mut self, _pass: &mut PassContext<'_>) -> RenderResult<()> {
        Ok(())
    }

    /// Issue the pass's GPU work
    fn render(&mut self, pass: &mut PassContext<'_>) -> RenderResult<()>;

    /// Called after [`RenderPass::render`]
    fn after_render(&mut self, _pass: &mut PassContext<'_>) -> RenderResult<()> {
        Ok(())
    }

    /// Release GPU objects owned by the pass
    fn destroy(&mut self, _context: &mut dyn GraphicsContext) {}
}

/// Meshes without a skeleton-bound skin
pub fn static_meshes(mesh: &MeshComponent) -> bool {
    !mesh.is_skinned()
}

/// Meshes with a skin bound to a skeleton
pub fn skinned_meshes(mesh: &MeshComponent) -> bool {
    mesh.is_skinned()
}

/// Meshes whose material uses `mode`; no material counts as opaque
pub fn by_blend_mode(mesh: &MeshComponent, mode: BlendMode) -> bool {
    mesh.blend_mode() == mode
}

/// Draw filter combining the canonical mesh predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeshFilter {
    /// `Some(true)` keeps skinned meshes only, `Some(false)` static only
    pub skinned: Option<bool>,
    /// Keep only this blend mode
    pub blend_mode: Option<BlendMode>,
}

impl MeshFilter {
    /// Accept every mesh
    pub const fn all() -> Self {
        Self {
            skinned: None,
            blend_mode: None,
        }
    }

    /// Static meshes only
    pub const fn static_meshes() -> Self {
        Self {
            skinned: Some(false),
            blend_mode: None,
        }
    }

    /// Skinned meshes only
    pub const fn skinned_meshes() -> Self {
        Self {
            skinned: Some(true),
            blend_mode: None,
        }
    }

    /// Meshes of one blend mode
    pub const fn by_blend_mode(mode: BlendMode) -> Self {
        Self {
            skinned: None,
            blend_mode: Some(mode),
        }
    }

    /// Narrow to one blend mode
    #[must_use]
    pub const fn with_blend_mode(mut self, mode: BlendMode) -> Self {
        self.blend_mode = Some(mode);
        self
    }

    /// Whether `mesh` passes every set criterion
    pub fn matches(&self, mesh: &MeshComponent) -> bool {
        let skin_ok = match self.skinned {
            Some(true) => skinned_meshes(mesh),
            Some(false) => static_meshes(mesh),
            None => true,
        };
        skin_ok && self.blend_mode.map_or(true, |mode| by_blend_mode(mesh, mode))
    }
}
