//! Scene graph
//!
//! Nodes live in a [`NodeGraph`] arena and are referenced by [`NodeId`].
//! A [`Scene`] owns the graph, tracks which nodes are attached, and forwards
//! attachment and transform changes to the render pipeline.

mod graph;
mod node;
#[allow(clippy::module_inception)]
mod scene;

pub use graph::NodeGraph;
pub use node::{Node, NodeCategory, NodeId, NodeKind};
pub use scene::{NodeBehavior, Scene};

use thiserror::Error;

/// Scene graph errors
///
/// Every check runs before the graph is mutated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    /// Handle does not refer to a live node
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    /// The node is already a child of this parent
    #[error("{child:?} is already a child of {parent:?}")]
    AlreadyChild {
        /// Requested parent
        parent: NodeId,
        /// Requested child
        child: NodeId,
    },

    /// A node cannot be its own parent
    #[error("{0:?} cannot be its own parent")]
    SelfParent(NodeId),

    /// The child is an ancestor of the parent
    #[error("adding {child:?} under {parent:?} would create a cycle")]
    Cycle {
        /// Requested parent
        parent: NodeId,
        /// Requested child
        child: NodeId,
    },

    /// The node is not a child of this parent
    #[error("{child:?} is not a child of {parent:?}")]
    NotAChild {
        /// Parent the child was expected under
        parent: NodeId,
        /// Node that was expected to be a child
        child: NodeId,
    },

    /// The node is already attached to the scene
    #[error("node {0:?} is already attached")]
    AlreadyAttached(NodeId),

    /// The node is not attached to the scene
    #[error("node {0:?} is not attached")]
    NotAttached(NodeId),

    /// The node must be removed from the scene before it is destroyed
    #[error("node {0:?} is still attached to a scene")]
    StillAttached(NodeId),

    /// A transform could not be applied
    #[error("invalid transform: {0}")]
    InvalidTransform(String),

    /// `end_edit` without a matching `begin_edit`
    #[error("node {0:?} has no open edit scope")]
    NoEditScope(NodeId),
}

/// Result type for scene graph operations
pub type SceneResult<T> = Result<T, SceneError>;
