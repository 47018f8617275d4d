//! Node arena and hierarchical transforms
//!
//! [`NodeGraph`] owns every node. Setters keep each affected world matrix
//! consistent with its parent chain before returning, except inside an edit
//! scope opened with [`NodeGraph::begin_edit`], where recomputation is
//! deferred to the matching [`NodeGraph::end_edit`].
//!
//! World matrices are composed with column vectors: `world = parent * local`.

use super::node::{Node, NodeCategory, NodeId, NodeKind};
use super::{SceneError, SceneResult};
use crate::foundation::math::{utils, Mat4, Quat, Transform, Vec3};
use slotmap::SlotMap;

/// Arena of scene nodes
#[derive(Debug, Default)]
pub struct NodeGraph {
    nodes: SlotMap<NodeId, Node>,
    changes: Vec<NodeId>,
}

impl NodeGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root node with identity transform
    pub fn create_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let id = self.nodes.insert(Node::new(name.into(), kind));
        log::trace!("Created node {id:?}");
        id
    }

    /// Destroy a node and every node it owns
    ///
    /// Fails if any node in the subtree is still attached to a scene.
    pub fn destroy_node(&mut self, id: NodeId) -> SceneResult<()> {
        let subtree = self.subtree(id)?;
        if let Some(attached) = subtree.iter().find(|n| self.nodes[**n].attached) {
            return Err(SceneError::StillAttached(*attached));
        }

        if let Some(parent) = self.nodes[id].parent {
            if let Some(parent) = self.nodes.get_mut(parent) {
                parent.children.retain(|child| *child != id);
            }
        }
        for node in subtree {
            self.nodes.remove(node);
        }
        self.changes.retain(|changed| self.nodes.contains_key(*changed));
        Ok(())
    }

    /// Check whether a handle refers to a live node
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the graph holds no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrow a node
    pub fn get(&self, id: NodeId) -> SceneResult<&Node> {
        self.nodes.get(id).ok_or(SceneError::UnknownNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> SceneResult<&mut Node> {
        self.nodes.get_mut(id).ok_or(SceneError::UnknownNode(id))
    }

    /// Mutable access to a node's payload
    ///
    /// The node is queued as changed so dependent bounds are refreshed.
    pub fn kind_mut(&mut self, id: NodeId) -> SceneResult<&mut NodeKind> {
        let node = self.nodes.get_mut(id).ok_or(SceneError::UnknownNode(id))?;
        self.changes.push(id);
        Ok(&mut node.kind)
    }

    /// Parent handle
    pub fn parent(&self, id: NodeId) -> SceneResult<Option<NodeId>> {
        Ok(self.get(id)?.parent)
    }

    /// Child handles in insertion order
    pub fn children(&self, id: NodeId) -> SceneResult<&[NodeId]> {
        Ok(&self.get(id)?.children)
    }

    // --- Local transform setters ---

    /// Set position, rotation and scale at once
    pub fn set_local_components(&mut self, id: NodeId, position: Vec3, rotation: Quat, scale: Vec3) -> SceneResult<()> {
        Self::check_finite(&[position, scale])?;
        self.modify(id, |node| {
            node.position = position;
            node.set_rotation_quat(rotation);
            node.scale = scale;
        })
    }

    /// Set local position
    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> SceneResult<()> {
        Self::check_finite(&[position])?;
        self.modify(id, |node| node.position = position)
    }

    /// Set local rotation
    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) -> SceneResult<()> {
        self.modify(id, |node| node.set_rotation_quat(rotation))
    }

    /// Set local rotation from XYZ Euler angles in radians
    pub fn set_rotation_euler(&mut self, id: NodeId, euler: Vec3) -> SceneResult<()> {
        Self::check_finite(&[euler])?;
        self.modify(id, |node| node.set_rotation_radians(euler))
    }

    /// Set local rotation from XYZ Euler angles in degrees
    pub fn set_rotation_degrees(&mut self, id: NodeId, degrees: Vec3) -> SceneResult<()> {
        self.set_rotation_euler(id, utils::euler_to_radians(degrees))
    }

    /// Set local scale
    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> SceneResult<()> {
        Self::check_finite(&[scale])?;
        self.modify(id, |node| node.scale = scale)
    }

    /// Place a node at a world-space pose
    ///
    /// The matrix is decomposed into local components relative to the current
    /// parent inside one edit scope, so dependents are recomputed once.
    pub fn set_world_matrix(&mut self, id: NodeId, world: &Mat4) -> SceneResult<()> {
        let local = self.local_from_world(id, world)?;
        self.edit(id, |graph| {
            graph.set_position(id, local.position)?;
            graph.set_rotation(id, local.rotation)?;
            graph.set_scale(id, local.scale)
        })
    }

    // --- Edit scopes ---

    /// Open an edit scope; recomputation waits for the matching `end_edit`
    pub fn begin_edit(&mut self, id: NodeId) -> SceneResult<()> {
        self.node_mut(id)?.edit_depth += 1;
        Ok(())
    }

    /// Close an edit scope; the outermost close recomputes once
    pub fn end_edit(&mut self, id: NodeId) -> SceneResult<()> {
        let node = self.node_mut(id)?;
        if node.edit_depth == 0 {
            return Err(SceneError::NoEditScope(id));
        }
        node.edit_depth -= 1;
        if node.edit_depth == 0 && (node.local_dirty || node.world_dirty) {
            self.refresh(id);
        }
        Ok(())
    }

    /// Run `f` inside an edit scope that is closed even when `f` fails
    pub fn edit<R, F>(&mut self, id: NodeId, f: F) -> SceneResult<R>
    where
        F: FnOnce(&mut Self) -> SceneResult<R>,
    {
        self.begin_edit(id)?;
        let result = f(self);
        let closed = self.end_edit(id);
        let value = result?;
        closed?;
        Ok(value)
    }

    // --- Matrices ---

    /// Local matrix, composed on the fly while an edit is pending
    pub fn local_matrix(&self, id: NodeId) -> SceneResult<Mat4> {
        Ok(self.get(id)?.compose_local())
    }

    /// World matrix, composed on the fly while an edit is pending
    pub fn world_matrix(&self, id: NodeId) -> SceneResult<Mat4> {
        self.get(id)?;
        Ok(self.compute_world(id))
    }

    /// World-space position
    pub fn world_position(&self, id: NodeId) -> SceneResult<Vec3> {
        let world = self.world_matrix(id)?;
        Ok(Vec3::new(world.m14, world.m24, world.m34))
    }

    // --- Hierarchy ---

    /// Make `child` a child of `parent`, keeping its world pose
    ///
    /// The child is detached from any previous parent. Its enabled flag
    /// follows the new parent.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> SceneResult<()> {
        let parent_node = self.get(parent)?;
        let child_node = self.get(child)?;
        if parent == child {
            return Err(SceneError::SelfParent(child));
        }
        if child_node.parent == Some(parent) {
            return Err(SceneError::AlreadyChild { parent, child });
        }
        if self.ancestors(parent)?.contains(&child) {
            return Err(SceneError::Cycle { parent, child });
        }

        let enabled = parent_node.enabled;
        let world = self.compute_world(child);
        let parent_inverse = self
            .compute_world(parent)
            .try_inverse()
            .ok_or_else(|| SceneError::InvalidTransform(format!("parent {parent:?} world matrix is not invertible")))?;
        let local = Transform::from_matrix(&(parent_inverse * world));

        if let Some(old_parent) = self.nodes[child].parent {
            self.nodes[old_parent].children.retain(|c| *c != child);
        }
        self.nodes[parent].children.push(child);
        self.nodes[child].parent = Some(parent);
        self.apply_local(child, &local);
        self.set_enabled(child, enabled)?;

        log::trace!("Reparented {child:?} under {parent:?}");
        Ok(())
    }

    /// Detach `child` from `parent`; its world pose becomes its local pose
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> SceneResult<()> {
        self.get(parent)?;
        if self.get(child)?.parent != Some(parent) {
            return Err(SceneError::NotAChild { parent, child });
        }

        let world = Transform::from_matrix(&self.compute_world(child));
        self.nodes[parent].children.retain(|c| *c != child);
        self.nodes[child].parent = None;
        self.apply_local(child, &world);
        Ok(())
    }

    /// Ancestors from the direct parent up to the root
    pub fn ancestors(&self, id: NodeId) -> SceneResult<Vec<NodeId>> {
        let mut result = Vec::new();
        let mut current = self.get(id)?.parent;
        while let Some(node) = current {
            result.push(node);
            current = self.nodes.get(node).and_then(|n| n.parent);
        }
        Ok(result)
    }

    /// Depth-first descendants, excluding `id`
    pub fn descendants(&self, id: NodeId) -> SceneResult<Vec<NodeId>> {
        let mut subtree = self.subtree(id)?;
        subtree.remove(0);
        Ok(subtree)
    }

    /// Depth-first descendants of a given category
    pub fn descendants_of_kind(&self, id: NodeId, category: NodeCategory) -> SceneResult<Vec<NodeId>> {
        Ok(self
            .descendants(id)?
            .into_iter()
            .filter(|n| self.nodes[*n].kind.category() == category)
            .collect())
    }

    /// Enable or disable a node and all its descendants
    pub fn set_enabled(&mut self, id: NodeId, enabled: bool) -> SceneResult<()> {
        for node in self.subtree(id)? {
            self.nodes[node].enabled = enabled;
        }
        Ok(())
    }

    /// Nodes whose world matrix or payload changed since the last call
    pub fn take_transform_changes(&mut self) -> Vec<NodeId> {
        std::mem::take(&mut self.changes)
    }

    /// `id` followed by its descendants in depth-first order
    pub(crate) fn subtree(&self, id: NodeId) -> SceneResult<Vec<NodeId>> {
        self.get(id)?;
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            result.push(node);
            if let Some(n) = self.nodes.get(node) {
                stack.extend(n.children.iter().rev());
            }
        }
        Ok(result)
    }

    // --- Internals ---

    fn check_finite(values: &[Vec3]) -> SceneResult<()> {
        if values.iter().all(utils::is_finite_vec3) {
            Ok(())
        } else {
            Err(SceneError::InvalidTransform(format!("non-finite component in {values:?}")))
        }
    }

    fn local_from_world(&self, id: NodeId, world: &Mat4) -> SceneResult<Transform> {
        if !world.iter().all(|v| v.is_finite()) {
            return Err(SceneError::InvalidTransform("non-finite world matrix".to_string()));
        }
        let parent_world = match self.get(id)?.parent {
            Some(parent) => self.compute_world(parent),
            None => Mat4::identity(),
        };
        let inverse = parent_world
            .try_inverse()
            .ok_or_else(|| SceneError::InvalidTransform(format!("parent of {id:?} is not invertible")))?;
        Ok(Transform::from_matrix(&(inverse * world)))
    }

    fn apply_local(&mut self, id: NodeId, local: &Transform) {
        let node = &mut self.nodes[id];
        node.position = local.position;
        node.set_rotation_quat(local.rotation);
        node.scale = local.scale;
        node.local_dirty = true;
        if node.edit_depth == 0 {
            self.refresh(id);
        } else {
            self.mark_world_dirty(id);
        }
    }

    fn modify<F>(&mut self, id: NodeId, f: F) -> SceneResult<()>
    where
        F: FnOnce(&mut Node),
    {
        let node = self.node_mut(id)?;
        f(node);
        node.local_dirty = true;
        if node.edit_depth == 0 {
            self.refresh(id);
        } else {
            self.mark_world_dirty(id);
        }
        Ok(())
    }

    fn mark_world_dirty(&mut self, id: NodeId) {
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if let Some(n) = self.nodes.get_mut(node) {
                n.world_dirty = true;
                stack.extend(n.children.iter().copied());
            }
        }
    }

    fn compute_world(&self, id: NodeId) -> Mat4 {
        let Some(node) = self.nodes.get(id) else {
            return Mat4::identity();
        };
        if !node.world_dirty && !node.local_dirty {
            return node.world;
        }
        let parent = node.parent.map_or_else(Mat4::identity, |p| self.compute_world(p));
        parent * node.compose_local()
    }

    /// Recompute the local matrix of `id`, then push world matrices down the subtree
    fn refresh(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.local = node.local_transform().to_matrix();
            node.local_dirty = false;
        }

        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let parent_world = self.nodes[current]
                .parent
                .map_or_else(Mat4::identity, |p| self.compute_world(p));
            let node = &mut self.nodes[current];
            node.world = parent_world * node.compose_local();
            node.world_dirty = false;
            stack.extend(node.children.iter().copied());
            self.changes.push(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Unit;
    use approx::assert_relative_eq;

    fn group(graph: &mut NodeGraph, name: &str) -> NodeId {
        graph.create_node(name, NodeKind::Group)
    }

    #[test]
    fn test_world_follows_parent_chain() {
        let mut graph = NodeGraph::new();
        let root = group(&mut graph, "root");
        let child = group(&mut graph, "child");
        graph.add_child(root, child).unwrap();

        graph.set_position(root, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        graph.set_position(child, Vec3::new(0.0, 2.0, 0.0)).unwrap();

        assert_relative_eq!(graph.world_position(child).unwrap(), Vec3::new(1.0, 2.0, 0.0), epsilon = 1e-6);

        graph.set_scale(root, Vec3::repeat(2.0)).unwrap();
        assert_relative_eq!(graph.world_position(child).unwrap(), Vec3::new(1.0, 4.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_reparent_preserves_world_pose() {
        let mut graph = NodeGraph::new();
        let parent = group(&mut graph, "parent");
        let node = group(&mut graph, "node");

        graph
            .set_local_components(
                parent,
                Vec3::new(3.0, -1.0, 2.0),
                Quat::from_axis_angle(&Unit::new_normalize(Vec3::new(0.0, 1.0, 1.0)), 0.7),
                Vec3::new(2.0, 2.0, 2.0),
            )
            .unwrap();
        graph.set_position(node, Vec3::new(5.0, 6.0, 7.0)).unwrap();
        let before = graph.world_position(node).unwrap();

        graph.add_child(parent, node).unwrap();
        assert_relative_eq!(graph.world_position(node).unwrap(), before, epsilon = 1e-4);
        assert_eq!(graph.parent(node).unwrap(), Some(parent));

        graph.remove_child(parent, node).unwrap();
        assert_relative_eq!(graph.world_position(node).unwrap(), before, epsilon = 1e-4);
        assert_relative_eq!(graph.get(node).unwrap().position(), before, epsilon = 1e-4);
        assert_eq!(graph.parent(node).unwrap(), None);
    }

    #[test]
    fn test_hierarchy_errors() {
        let mut graph = NodeGraph::new();
        let a = group(&mut graph, "a");
        let b = group(&mut graph, "b");
        let c = group(&mut graph, "c");

        graph.add_child(a, b).unwrap();
        graph.add_child(b, c).unwrap();

        assert_eq!(graph.add_child(a, b), Err(SceneError::AlreadyChild { parent: a, child: b }));
        assert_eq!(graph.add_child(a, a), Err(SceneError::SelfParent(a)));
        assert_eq!(graph.add_child(b, a), Err(SceneError::Cycle { parent: b, child: a }));
        assert_eq!(graph.add_child(c, a), Err(SceneError::Cycle { parent: c, child: a }));
        assert_eq!(graph.remove_child(a, c), Err(SceneError::NotAChild { parent: a, child: c }));
    }

    #[test]
    fn test_reparent_moves_between_parents() {
        let mut graph = NodeGraph::new();
        let first = group(&mut graph, "first");
        let second = group(&mut graph, "second");
        let node = group(&mut graph, "node");

        graph.add_child(first, node).unwrap();
        graph.add_child(second, node).unwrap();

        assert!(graph.children(first).unwrap().is_empty());
        assert_eq!(graph.children(second).unwrap(), &[node]);
    }

    #[test]
    fn test_singular_parent_is_rejected_before_mutation() {
        let mut graph = NodeGraph::new();
        let flat = group(&mut graph, "flat");
        let node = group(&mut graph, "node");
        graph.set_scale(flat, Vec3::new(1.0, 0.0, 1.0)).unwrap();

        assert!(matches!(graph.add_child(flat, node), Err(SceneError::InvalidTransform(_))));
        assert_eq!(graph.parent(node).unwrap(), None);
        assert!(graph.children(flat).unwrap().is_empty());
    }

    #[test]
    fn test_edit_scope_defers_recompute() {
        let mut graph = NodeGraph::new();
        let node = group(&mut graph, "node");
        graph.take_transform_changes();

        graph.begin_edit(node).unwrap();
        graph.begin_edit(node).unwrap();
        graph.set_position(node, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        graph.set_scale(node, Vec3::repeat(3.0)).unwrap();
        graph.end_edit(node).unwrap();
        assert!(graph.take_transform_changes().is_empty());
        // Reads stay correct while deferred
        assert_relative_eq!(graph.world_position(node).unwrap(), Vec3::new(1.0, 0.0, 0.0));

        graph.end_edit(node).unwrap();
        assert_eq!(graph.take_transform_changes(), vec![node]);
        assert_eq!(graph.end_edit(node), Err(SceneError::NoEditScope(node)));
    }

    #[test]
    fn test_edit_closure_closes_on_error() {
        let mut graph = NodeGraph::new();
        let node = group(&mut graph, "node");

        let result = graph.edit(node, |g| g.set_position(node, Vec3::new(f32::NAN, 0.0, 0.0)));
        assert!(matches!(result, Err(SceneError::InvalidTransform(_))));
        assert!(!graph.get(node).unwrap().is_editing());
    }

    #[test]
    fn test_set_world_matrix_under_parent() {
        let mut graph = NodeGraph::new();
        let parent = group(&mut graph, "parent");
        let node = group(&mut graph, "node");
        graph.add_child(parent, node).unwrap();
        graph.set_position(parent, Vec3::new(10.0, 0.0, 0.0)).unwrap();

        let target = Transform::new(Vec3::new(1.0, 2.0, 3.0), Quat::identity(), Vec3::repeat(0.5)).to_matrix();
        graph.set_world_matrix(node, &target).unwrap();

        assert_relative_eq!(graph.world_matrix(node).unwrap(), target, epsilon = 1e-5);
        assert_relative_eq!(graph.get(node).unwrap().position(), Vec3::new(-9.0, 2.0, 3.0), epsilon = 1e-5);
    }

    #[test]
    fn test_euler_views_stay_in_sync() {
        let mut graph = NodeGraph::new();
        let node = group(&mut graph, "node");

        graph.set_rotation_degrees(node, Vec3::new(0.0, 90.0, 0.0)).unwrap();
        let stored = graph.get(node).unwrap();
        assert_relative_eq!(stored.rotation_degrees(), Vec3::new(0.0, 90.0, 0.0), epsilon = 1e-4);

        graph.set_rotation(node, Quat::from_euler_angles(0.3, 0.0, 0.0)).unwrap();
        assert_relative_eq!(graph.get(node).unwrap().rotation_euler(), Vec3::new(0.3, 0.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_enabled_follows_parent_and_propagates() {
        let mut graph = NodeGraph::new();
        let parent = group(&mut graph, "parent");
        let child = group(&mut graph, "child");
        let grandchild = group(&mut graph, "grandchild");
        graph.add_child(child, grandchild).unwrap();

        graph.set_enabled(parent, false).unwrap();
        graph.add_child(parent, child).unwrap();
        assert!(!graph.get(child).unwrap().is_enabled());
        assert!(!graph.get(grandchild).unwrap().is_enabled());

        graph.set_enabled(parent, true).unwrap();
        assert!(graph.get(grandchild).unwrap().is_enabled());
    }

    #[test]
    fn test_descendants_of_kind_is_depth_first() {
        let mut graph = NodeGraph::new();
        let root = group(&mut graph, "root");
        let bone_a = graph.create_node("a", NodeKind::Bone);
        let bone_b = graph.create_node("b", NodeKind::Bone);
        let mid = group(&mut graph, "mid");
        graph.add_child(root, mid).unwrap();
        graph.add_child(mid, bone_a).unwrap();
        graph.add_child(root, bone_b).unwrap();

        assert_eq!(graph.descendants(root).unwrap(), vec![mid, bone_a, bone_b]);
        assert_eq!(graph.descendants_of_kind(root, NodeCategory::Bone).unwrap(), vec![bone_a, bone_b]);
    }

    #[test]
    fn test_destroy_removes_subtree() {
        let mut graph = NodeGraph::new();
        let parent = group(&mut graph, "parent");
        let child = group(&mut graph, "child");
        let holder = group(&mut graph, "holder");
        graph.add_child(parent, child).unwrap();
        graph.add_child(holder, parent).unwrap();

        graph.destroy_node(parent).unwrap();
        assert!(!graph.contains(parent));
        assert!(!graph.contains(child));
        assert!(graph.children(holder).unwrap().is_empty());
        assert_eq!(graph.len(), 1);
    }
}
