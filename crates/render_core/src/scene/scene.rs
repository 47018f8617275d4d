//! Scene management
//!
//! The [`Scene`] is the single owner of the node graph and the render
//! pipeline. Attaching a node registers its whole subtree with the pipeline;
//! transform and payload changes on attached nodes are batched into a dirty
//! set and pushed to the pipeline once per tick.

use super::{NodeGraph, NodeId, SceneError, SceneResult};
use crate::error::EngineResult;
use crate::render::{FrameStats, GraphicsContext, PipelineConfig, RenderPipeline};
use std::collections::{HashMap, HashSet};

/// Per-node update hook, run once per [`Scene::update`]
///
/// Used by animation-driving nodes, for example to write bone matrices into
/// a skinned mesh. No ordering is guaranteed across nodes.
pub trait NodeBehavior {
    /// Advance the behavior attached to `node`
    fn update(&mut self, node: NodeId, graph: &mut NodeGraph, delta_time: f32) -> SceneResult<()>;
}

impl<F> NodeBehavior for F
where
    F: FnMut(NodeId, &mut NodeGraph, f32) -> SceneResult<()>,
{
    fn update(&mut self, node: NodeId, graph: &mut NodeGraph, delta_time: f32) -> SceneResult<()> {
        self(node, graph, delta_time)
    }
}

/// Owner of the node graph, the attached set and the render pipeline
pub struct Scene {
    graph: NodeGraph,
    attached: Vec<NodeId>,
    dirty: HashSet<NodeId>,
    behaviors: HashMap<NodeId, Box<dyn NodeBehavior>>,
    pipeline: RenderPipeline,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Scene {
    /// Create an empty scene
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            graph: NodeGraph::new(),
            attached: Vec::new(),
            dirty: HashSet::new(),
            behaviors: HashMap::new(),
            pipeline: RenderPipeline::new(config),
        }
    }

    /// Node graph
    pub const fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    /// Mutable node graph
    pub fn graph_mut(&mut self) -> &mut NodeGraph {
        &mut self.graph
    }

    /// Render pipeline
    pub const fn pipeline(&self) -> &RenderPipeline {
        &self.pipeline
    }

    /// Mutable render pipeline
    pub fn pipeline_mut(&mut self) -> &mut RenderPipeline {
        &mut self.pipeline
    }

    /// Attached nodes in attachment order
    pub fn attached_nodes(&self) -> &[NodeId] {
        &self.attached
    }

    /// Whether a node is attached to this scene
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.graph.get(id).is_ok_and(|node| node.is_attached())
    }

    /// Bind the graphics context and set up every pass
    pub fn initialize(&mut self, context: Box<dyn GraphicsContext>) -> EngineResult<()> {
        self.pipeline.initialize(context)?;
        Ok(())
    }

    /// Attach a node and its whole subtree
    ///
    /// Fails without side effects if any node of the subtree is already
    /// attached. A failed pipeline registration rolls the attachment back.
    pub fn add_node(&mut self, id: NodeId) -> EngineResult<()> {
        let subtree = self.graph.subtree(id)?;
        if let Some(attached) = subtree.iter().find(|n| self.is_attached(**n)) {
            return Err(SceneError::AlreadyAttached(*attached).into());
        }

        for (index, node) in subtree.iter().enumerate() {
            if let Err(err) = self.pipeline.register_node(&self.graph, *node) {
                for registered in &subtree[..index] {
                    self.detach(*registered);
                }
                return Err(err.into());
            }
            self.graph.node_mut(*node)?.attached = true;
            self.attached.push(*node);
        }

        log::debug!("Attached {} node(s) rooted at {id:?}", subtree.len());
        Ok(())
    }

    /// Detach a node and every attached descendant
    pub fn remove_node(&mut self, id: NodeId) -> EngineResult<()> {
        if !self.graph.get(id)?.is_attached() {
            return Err(SceneError::NotAttached(id).into());
        }

        let subtree = self.graph.subtree(id)?;
        for node in &subtree {
            if self.is_attached(*node) {
                self.detach(*node);
            }
        }

        log::debug!("Detached subtree rooted at {id:?}");
        Ok(())
    }

    /// Reparent `child` under `parent`, keeping its world pose
    ///
    /// A child moved under an attached parent is attached with its subtree.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> EngineResult<()> {
        self.graph.add_child(parent, child)?;
        if self.is_attached(parent) && !self.is_attached(child) {
            self.add_node(child)?;
        }
        Ok(())
    }

    /// Detach `child` from `parent`; attachment to the scene is unchanged
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> EngineResult<()> {
        self.graph.remove_child(parent, child)?;
        Ok(())
    }

    /// Install the update hook of a node, replacing any previous one
    pub fn set_behavior(&mut self, id: NodeId, behavior: Box<dyn NodeBehavior>) -> EngineResult<()> {
        self.graph.get(id)?;
        self.behaviors.insert(id, behavior);
        Ok(())
    }

    /// Remove the update hook of a node
    pub fn clear_behavior(&mut self, id: NodeId) -> Option<Box<dyn NodeBehavior>> {
        self.behaviors.remove(&id)
    }

    /// Advance one tick
    ///
    /// Flushes dirty transforms into the pipeline, runs every behavior of an
    /// enabled attached node once, then advances the pipeline clock.
    pub fn update(&mut self, delta_time: f32) -> EngineResult<()> {
        self.flush_transforms()?;

        let ticking: Vec<NodeId> = self
            .attached
            .iter()
            .copied()
            .filter(|id| self.behaviors.contains_key(id))
            .collect();
        for id in ticking {
            if !self.graph.get(id).is_ok_and(|node| node.is_enabled()) {
                continue;
            }
            if let Some(mut behavior) = self.behaviors.remove(&id) {
                let result = behavior.update(id, &mut self.graph, delta_time);
                self.behaviors.insert(id, behavior);
                result?;
            }
        }

        self.pipeline.advance_clock(delta_time);
        Ok(())
    }

    /// Render one frame; pending transform changes are flushed first
    pub fn render(&mut self) -> EngineResult<FrameStats> {
        self.flush_transforms()?;
        Ok(self.pipeline.render(&self.graph)?)
    }

    /// Release every GPU resource and detach all nodes
    ///
    /// The node graph itself is kept.
    pub fn destroy(&mut self) -> EngineResult<()> {
        self.pipeline.destroy()?;
        for id in std::mem::take(&mut self.attached) {
            if let Ok(node) = self.graph.node_mut(id) {
                node.attached = false;
            }
        }
        self.dirty.clear();
        self.behaviors.clear();
        Ok(())
    }

    /// Move change notifications of attached nodes into the pipeline
    fn flush_transforms(&mut self) -> EngineResult<()> {
        for id in self.graph.take_transform_changes() {
            if self.is_attached(id) {
                self.dirty.insert(id);
            }
        }

        for id in self.dirty.drain() {
            self.pipeline.refresh_node(&self.graph, id)?;
        }
        Ok(())
    }

    fn detach(&mut self, id: NodeId) {
        self.pipeline.unregister_node(id);
        if let Ok(node) = self.graph.node_mut(id) {
            node.attached = false;
        }
        self.attached.retain(|n| *n != id);
        self.dirty.remove(&id);
    }
}
