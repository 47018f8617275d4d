//! # Render Pipeline
//!
//! Orchestrates one frame of GPU work over the attached scene.
//!
//! ## Frame Order
//!
//! ```text
//! evict stale render targets
//!      ↓
//! light counts changed? → passes regenerate shader sources
//!      ↓
//! upload flagged geometry and textures
//!      ↓
//! once-per-frame passes (registration order)
//!      ↓
//! for each enabled camera:
//!     visible set = octree query ∩ frustum planes
//!     once-per-camera passes: before_render → render → after_render
//! ```
//!
//! The order is fixed. A pass error aborts the frame and propagates.

use crate::foundation::time::FrameClock;
use crate::render::{
    CameraView, FrameLight, Geometry, GeometryId, GraphicsContext, LightComponent, LightCounts, LightKind,
    LightLimits, LightSet, PassContext, PassSetup, RenderError, RenderPass, RenderResult, RenderTarget,
    RenderTargetCache, RenderTargetCacheConfig, RenderTargetLayout, ResourceRegistry, Texture, TextureId,
};
use crate::scene::{NodeGraph, NodeId, NodeKind};
use crate::spatial::{BoundingBox, Octree, OctreeConfig};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Pipeline lifetime
///
/// `Uninitialized → Initialized → Rendering → Destroyed`; there is no way
/// back from `Destroyed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineLifecycle {
    /// No graphics context bound yet
    Uninitialized,
    /// Context bound and passes set up
    Initialized,
    /// At least one frame rendered
    Rendering,
    /// All GPU resources released
    Destroyed,
}

/// Render pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Cull meshes against camera frustums; cameras may opt out individually
    pub frustum_culling: bool,
    /// Spatial index of mesh bounds
    pub octree: OctreeConfig,
    /// Render target pool
    pub render_targets: RenderTargetCacheConfig,
    /// Light counts baked into shaders
    pub lights: LightLimits,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frustum_culling: true,
            octree: OctreeConfig::default(),
            render_targets: RenderTargetCacheConfig::default(),
            lights: LightLimits::default(),
        }
    }
}

/// Counters of one rendered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    /// Frame number, starting at 1
    pub frame: u64,
    /// Pass invocations across both groups
    pub passes_run: usize,
    /// Cameras that produced output
    pub cameras_rendered: usize,
    /// Visible meshes summed over cameras
    pub visible_meshes: usize,
    /// Draw calls issued by passes
    pub draw_calls: usize,
    /// Resources uploaded this frame
    pub uploads: usize,
    /// Render targets evicted this frame
    pub evicted_targets: usize,
}

/// Multi-pass renderer over the attached scene
pub struct RenderPipeline {
    config: PipelineConfig,
    lifecycle: PipelineLifecycle,
    context: Option<Box<dyn GraphicsContext>>,
    frame_passes: Vec<Box<dyn RenderPass>>,
    camera_passes: Vec<Box<dyn RenderPass>>,
    meshes: Vec<NodeId>,
    cameras: Vec<NodeId>,
    point_lights: Vec<NodeId>,
    spot_lights: Vec<NodeId>,
    directional_lights: Vec<NodeId>,
    octree: Octree<NodeId>,
    visible: HashMap<NodeId, Vec<NodeId>>,
    resources: ResourceRegistry,
    render_targets: RenderTargetCache,
    light_counts: Option<LightCounts>,
    clock: FrameClock,
}

impl Default for RenderPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl RenderPipeline {
    /// Create an uninitialized pipeline
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            octree: Octree::new(config.octree.clone()),
            render_targets: RenderTargetCache::new(config.render_targets.clone()),
            config,
            lifecycle: PipelineLifecycle::Uninitialized,
            context: None,
            frame_passes: Vec::new(),
            camera_passes: Vec::new(),
            meshes: Vec::new(),
            cameras: Vec::new(),
            point_lights: Vec::new(),
            spot_lights: Vec::new(),
            directional_lights: Vec::new(),
            visible: HashMap::new(),
            resources: ResourceRegistry::new(),
            light_counts: None,
            clock: FrameClock::new(),
        }
    }

    /// Settings
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current lifecycle state
    pub const fn state(&self) -> PipelineLifecycle {
        self.lifecycle
    }

    /// Bind the graphics context and set up every registered pass
    pub fn initialize(&mut self, mut context: Box<dyn GraphicsContext>) -> RenderResult<()> {
        match self.lifecycle {
            PipelineLifecycle::Uninitialized => {}
            PipelineLifecycle::Destroyed => return Err(RenderError::Destroyed),
            _ => return Err(RenderError::AlreadyInitialized),
        }

        let mut setup = PassSetup {
            context: context.as_mut(),
            render_targets: &mut self.render_targets,
        };
        for pass in self.frame_passes.iter_mut().chain(self.camera_passes.iter_mut()) {
            pass.setup(&mut setup)?;
        }

        log::info!(
            "Render pipeline initialized on '{}' with {} frame and {} camera pass(es)",
            context.name(),
            self.frame_passes.len(),
            self.camera_passes.len()
        );
        self.context = Some(context);
        self.lifecycle = PipelineLifecycle::Initialized;
        Ok(())
    }

    /// Append a once-per-frame pass
    pub fn add_frame_pass(&mut self, pass: Box<dyn RenderPass>) -> RenderResult<()> {
        let pass = self.prepare_pass(pass)?;
        self.frame_passes.push(pass);
        Ok(())
    }

    /// Append a once-per-camera pass
    pub fn add_camera_pass(&mut self, pass: Box<dyn RenderPass>) -> RenderResult<()> {
        let pass = self.prepare_pass(pass)?;
        self.camera_passes.push(pass);
        Ok(())
    }

    /// Register a logical render target name
    pub fn register_render_target(&mut self, name: &str, layout: RenderTargetLayout) -> RenderResult<()> {
        self.ensure_alive()?;
        self.render_targets.register(name, layout)
    }

    /// Fetch the named target at a size, allocating it if needed
    pub fn get_render_target(&mut self, name: &str, width: u32, height: u32) -> RenderResult<&RenderTarget> {
        self.ensure_alive()?;
        let context = self.context.as_deref_mut().ok_or(RenderError::NotInitialized)?;
        self.render_targets.get(name, width, height, self.clock.now(), context)
    }

    /// Render target pool
    pub const fn render_targets(&self) -> &RenderTargetCache {
        &self.render_targets
    }

    /// Geometry and textures
    pub const fn resources(&self) -> &ResourceRegistry {
        &self.resources
    }

    /// Mutable geometry and textures
    pub fn resources_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.resources
    }

    /// Register geometry for upload on the next frame
    pub fn add_geometry(&mut self, geometry: Geometry) -> GeometryId {
        self.resources.add_geometry(geometry)
    }

    /// Register a texture for upload on the next frame
    pub fn add_texture(&mut self, texture: Texture) -> TextureId {
        self.resources.add_texture(texture)
    }

    /// Add a node to the registry matching its payload
    ///
    /// Meshes are also indexed by their world bounds. Groups and bones are
    /// ignored.
    pub fn register_node(&mut self, graph: &NodeGraph, id: NodeId) -> RenderResult<()> {
        self.ensure_alive()?;
        let node = graph.get(id)?;
        match node.kind() {
            NodeKind::Mesh(mesh) => {
                let bounds = mesh.local_bounds.transform(&graph.world_matrix(id)?)?;
                if self.octree.add(id, bounds)? {
                    self.meshes.push(id);
                }
            }
            NodeKind::Camera(_) => push_unique(&mut self.cameras, id),
            NodeKind::Light(light) => push_unique(self.light_list(light), id),
            NodeKind::Group | NodeKind::Bone => return Ok(()),
        }
        log::debug!("Registered {:?} node '{}'", node.kind().category(), node.name());
        Ok(())
    }

    /// Remove a node from every registry
    pub fn unregister_node(&mut self, id: NodeId) {
        self.octree.remove(&id);
        for list in [
            &mut self.meshes,
            &mut self.cameras,
            &mut self.point_lights,
            &mut self.spot_lights,
            &mut self.directional_lights,
        ] {
            list.retain(|n| *n != id);
        }
        self.visible.remove(&id);
        for visible in self.visible.values_mut() {
            visible.retain(|n| *n != id);
        }
    }

    /// Bring the registries up to date after a node's transform or payload changed
    ///
    /// A node whose payload now belongs to a different registry is
    /// unregistered and registered again; a mesh that stayed a mesh is
    /// re-indexed with its current world bounds.
    pub fn refresh_node(&mut self, graph: &NodeGraph, id: NodeId) -> RenderResult<()> {
        self.ensure_alive()?;
        let wanted = Registry::of(graph.get(id)?.kind());
        if self.registry_of(id) != wanted {
            self.unregister_node(id);
            return self.register_node(graph, id);
        }
        let Some(mesh) = graph.get(id)?.kind().as_mesh() else {
            return Ok(());
        };
        let bounds = mesh.local_bounds.transform(&graph.world_matrix(id)?)?;
        self.octree.update(id, bounds)?;
        Ok(())
    }

    /// Registry currently holding `id`
    fn registry_of(&self, id: NodeId) -> Option<Registry> {
        if self.octree.contains(&id) {
            Some(Registry::Mesh)
        } else if self.cameras.contains(&id) {
            Some(Registry::Camera)
        } else if self.point_lights.contains(&id) {
            Some(Registry::PointLight)
        } else if self.spot_lights.contains(&id) {
            Some(Registry::SpotLight)
        } else if self.directional_lights.contains(&id) {
            Some(Registry::DirectionalLight)
        } else {
            None
        }
    }

    /// Advance the clock used for render target expiry
    pub fn advance_clock(&mut self, delta_time: f32) {
        self.clock.advance(delta_time);
    }

    /// Frame clock time in seconds
    pub const fn now(&self) -> f64 {
        self.clock.now()
    }

    /// Number of registered meshes
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Registered cameras in registration order
    pub fn cameras(&self) -> &[NodeId] {
        &self.cameras
    }

    /// World bounds a mesh is indexed with
    pub fn mesh_bounds(&self, id: NodeId) -> Option<BoundingBox> {
        self.octree.member_bounds(&id)
    }

    /// Spatial index of mesh bounds
    pub const fn octree(&self) -> &Octree<NodeId> {
        &self.octree
    }

    /// Light counts of the last rendered frame
    pub const fn light_counts(&self) -> Option<LightCounts> {
        self.light_counts
    }

    /// Meshes visible to `camera` in the last frame
    pub fn visible_meshes(&self, camera: NodeId) -> &[NodeId] {
        self.visible.get(&camera).map_or(&[], Vec::as_slice)
    }

    /// Downcast the bound graphics context
    pub fn context<T: GraphicsContext + 'static>(&self) -> Option<&T> {
        self.context.as_deref()?.as_any().downcast_ref::<T>()
    }

    /// Mutably downcast the bound graphics context
    pub fn context_mut<T: GraphicsContext + 'static>(&mut self) -> Option<&mut T> {
        self.context.as_deref_mut()?.as_any_mut().downcast_mut::<T>()
    }

    /// Hand the graphics context back to the embedding layer
    pub fn take_context(&mut self) -> Option<Box<dyn GraphicsContext>> {
        self.context.take()
    }

    /// Render one frame
    pub fn render(&mut self, graph: &NodeGraph) -> RenderResult<FrameStats> {
        match self.lifecycle {
            PipelineLifecycle::Uninitialized => return Err(RenderError::NotInitialized),
            PipelineLifecycle::Destroyed => return Err(RenderError::Destroyed),
            PipelineLifecycle::Initialized | PipelineLifecycle::Rendering => {}
        }

        let Self {
            config,
            lifecycle,
            context,
            frame_passes,
            camera_passes,
            meshes,
            cameras,
            point_lights,
            spot_lights,
            directional_lights,
            octree,
            visible,
            resources,
            render_targets,
            light_counts,
            clock,
        } = self;
        let context = context.as_deref_mut().ok_or(RenderError::NotInitialized)?;

        clock.tick_frame();
        let now = clock.now();
        let mut stats = FrameStats {
            frame: clock.frame_count(),
            ..FrameStats::default()
        };

        stats.evicted_targets = render_targets.evict_stale(now, context);

        let mut lights = LightSet::default();
        for id in point_lights.iter().chain(spot_lights.iter()).chain(directional_lights.iter()) {
            let node = graph.get(*id)?;
            let Some(light) = node.kind().as_light() else {
                continue;
            };
            if !node.is_enabled() {
                continue;
            }
            let (position, direction) = LightComponent::world_pose(&graph.world_matrix(*id)?);
            lights.push(
                FrameLight {
                    node: *id,
                    light: *light,
                    position,
                    direction,
                },
                &config.lights,
            );
        }
        let counts = lights.counts();
        if *light_counts != Some(counts) {
            log::debug!(
                "Light counts changed to {} point, {} spot, {} directional",
                counts.point,
                counts.spot,
                counts.directional
            );
            for pass in frame_passes.iter_mut().chain(camera_passes.iter_mut()) {
                pass.on_light_counts_changed(&counts, context);
            }
            *light_counts = Some(counts);
        }

        stats.uploads = resources.upload_pending(context)?;

        let enabled_meshes: Vec<NodeId> = meshes.iter().copied().filter(|id| is_enabled(graph, id)).collect();
        for pass in frame_passes.iter_mut() {
            let mut pass_context = PassContext {
                context: &mut *context,
                graph,
                resources: &*resources,
                render_targets: &mut *render_targets,
                lights: &lights,
                camera: None,
                visible_meshes: enabled_meshes.as_slice(),
                now,
                stats: &mut stats,
            };
            run_pass(pass.as_mut(), &mut pass_context)?;
            stats.passes_run += 1;
        }

        for camera_id in cameras.iter() {
            let node = graph.get(*camera_id)?;
            let Some(camera) = node.kind().as_camera() else {
                continue;
            };
            if !node.is_enabled() {
                visible.remove(camera_id);
                continue;
            }
            if camera.viewport.is_empty() {
                log::warn!("Camera '{}' has an empty viewport; skipped", node.name());
                visible.remove(camera_id);
                continue;
            }

            let view = CameraView::new(*camera_id, camera, &graph.world_matrix(*camera_id)?)?;
            let culled = config.frustum_culling && camera.frustum_culling;
            let list = visible.entry(*camera_id).or_default();
            collect_visible(graph, octree, meshes, &view, culled, list);
            stats.visible_meshes += list.len();

            for pass in camera_passes.iter_mut() {
                let mut pass_context = PassContext {
                    context: &mut *context,
                    graph,
                    resources: &*resources,
                    render_targets: &mut *render_targets,
                    lights: &lights,
                    camera: Some(&view),
                    visible_meshes: list.as_slice(),
                    now,
                    stats: &mut stats,
                };
                run_pass(pass.as_mut(), &mut pass_context)?;
                stats.passes_run += 1;
            }
            stats.cameras_rendered += 1;
        }

        *lifecycle = PipelineLifecycle::Rendering;
        log::trace!("Frame stats: {stats:?}");
        Ok(stats)
    }

    /// Release every GPU resource and clear all registries
    ///
    /// The context stays bound so the embedding layer can reclaim it with
    /// [`RenderPipeline::take_context`].
    pub fn destroy(&mut self) -> RenderResult<()> {
        if self.lifecycle == PipelineLifecycle::Destroyed {
            return Err(RenderError::Destroyed);
        }

        if let Some(context) = self.context.as_deref_mut() {
            for pass in self.frame_passes.iter_mut().chain(self.camera_passes.iter_mut()) {
                pass.destroy(context);
            }
            self.resources.destroy_all(context);
            self.render_targets.destroy_all(context);
        }

        self.frame_passes.clear();
        self.camera_passes.clear();
        self.meshes.clear();
        self.cameras.clear();
        self.point_lights.clear();
        self.spot_lights.clear();
        self.directional_lights.clear();
        self.octree.clear();
        self.visible.clear();
        self.light_counts = None;
        self.lifecycle = PipelineLifecycle::Destroyed;
        log::info!("Render pipeline destroyed");
        Ok(())
    }

    fn ensure_alive(&self) -> RenderResult<()> {
        if self.lifecycle == PipelineLifecycle::Destroyed {
            Err(RenderError::Destroyed)
        } else {
            Ok(())
        }
    }

    fn prepare_pass(&mut self, mut pass: Box<dyn RenderPass>) -> RenderResult<Box<dyn RenderPass>> {
        self.ensure_alive()?;
        if let Some(context) = self.context.as_deref_mut() {
            let mut setup = PassSetup {
                context,
                render_targets: &mut self.render_targets,
            };
            pass.setup(&mut setup)?;
            if let Some(counts) = self.light_counts {
                pass.on_light_counts_changed(&counts, setup.context);
            }
        }
        log::debug!("Added render pass '{}'", pass.name());
        Ok(pass)
    }

    fn light_list(&mut self, light: &LightComponent) -> &mut Vec<NodeId> {
        match light.kind {
            LightKind::Directional => &mut self.directional_lights,
            LightKind::Point { .. } => &mut self.point_lights,
            LightKind::Spot { .. } => &mut self.spot_lights,
        }
    }
}

/// Registry a node payload is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registry {
    Mesh,
    Camera,
    PointLight,
    SpotLight,
    DirectionalLight,
}

impl Registry {
    const fn of(kind: &NodeKind) -> Option<Self> {
        match kind {
            NodeKind::Mesh(_) => Some(Self::Mesh),
            NodeKind::Camera(_) => Some(Self::Camera),
            NodeKind::Light(light) => Some(match light.kind {
                LightKind::Point { .. } => Self::PointLight,
                LightKind::Spot { .. } => Self::SpotLight,
                LightKind::Directional => Self::DirectionalLight,
            }),
            NodeKind::Group | NodeKind::Bone => None,
        }
    }
}

fn push_unique(list: &mut Vec<NodeId>, id: NodeId) {
    if !list.contains(&id) {
        list.push(id);
    }
}

fn is_enabled(graph: &NodeGraph, id: &NodeId) -> bool {
    graph.get(*id).is_ok_and(|node| node.is_enabled())
}

fn run_pass(pass: &mut dyn RenderPass, context: &mut PassContext<'_>) -> RenderResult<()> {
    pass.before_render(context)?;
    pass.render(context)?;
    pass.after_render(context)
}

/// Fill `out` with the enabled meshes `view` can see
///
/// Candidates come from an octree query against the frustum's world bound,
/// deduplicated in first-seen order, then tested against the six planes.
fn collect_visible(
    graph: &NodeGraph,
    octree: &Octree<NodeId>,
    meshes: &[NodeId],
    view: &CameraView,
    culled: bool,
    out: &mut Vec<NodeId>,
) {
    out.clear();
    let enabled = |id: &NodeId| is_enabled(graph, id);

    if !culled {
        out.extend(meshes.iter().copied().filter(enabled));
        return;
    }

    let mut candidates = Vec::new();
    octree.query(&view.frustum_bounds, &mut candidates);
    let mut seen = HashSet::with_capacity(candidates.len());
    out.extend(candidates.into_iter().filter(|id| {
        seen.insert(*id)
            && enabled(id)
            && octree
                .member_bounds(id)
                .is_some_and(|bounds| view.frustum.intersects_box(&bounds))
    }));
}
