//! Scene node storage
//!
//! A [`Node`] owns its local position, rotation and scale together with the
//! cached local and world matrices derived from them. Nodes live in the
//! [`NodeGraph`](super::NodeGraph) arena and refer to each other by
//! [`NodeId`].

use crate::foundation::math::{utils, Mat4, Quat, Transform, Vec3};
use crate::render::{CameraComponent, LightComponent, MeshComponent};

slotmap::new_key_type! {
    /// Stable handle to a node in a [`NodeGraph`](super::NodeGraph)
    pub struct NodeId;
}

/// What a node contributes to rendering
///
/// Resolved once when the node is registered with the pipeline.
#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    /// Pure transform node
    #[default]
    Group,
    /// Drawable mesh
    Mesh(MeshComponent),
    /// View into the scene
    Camera(CameraComponent),
    /// Light source
    Light(LightComponent),
    /// Skeleton joint driven by an animation collaborator
    Bone,
}

/// Payload-free discriminant of [`NodeKind`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeCategory {
    /// [`NodeKind::Group`]
    Group,
    /// [`NodeKind::Mesh`]
    Mesh,
    /// [`NodeKind::Camera`]
    Camera,
    /// [`NodeKind::Light`]
    Light,
    /// [`NodeKind::Bone`]
    Bone,
}

impl NodeKind {
    /// Discriminant without the payload
    pub const fn category(&self) -> NodeCategory {
        match self {
            Self::Group => NodeCategory::Group,
            Self::Mesh(_) => NodeCategory::Mesh,
            Self::Camera(_) => NodeCategory::Camera,
            Self::Light(_) => NodeCategory::Light,
            Self::Bone => NodeCategory::Bone,
        }
    }

    /// Mesh payload, if any
    pub const fn as_mesh(&self) -> Option<&MeshComponent> {
        match self {
            Self::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    /// Camera payload, if any
    pub const fn as_camera(&self) -> Option<&CameraComponent> {
        match self {
            Self::Camera(camera) => Some(camera),
            _ => None,
        }
    }

    /// Light payload, if any
    pub const fn as_light(&self) -> Option<&LightComponent> {
        match self {
            Self::Light(light) => Some(light),
            _ => None,
        }
    }
}

/// A node in the scene hierarchy
#[derive(Debug, Clone)]
pub struct Node {
    name: String,

    // Local transform components
    pub(super) position: Vec3,
    pub(super) rotation: Quat,
    pub(super) euler: Vec3,
    pub(super) scale: Vec3,

    // Cached matrices
    pub(super) local: Mat4,
    pub(super) world: Mat4,
    pub(super) local_dirty: bool,
    pub(super) world_dirty: bool,
    pub(super) edit_depth: u32,

    // Hierarchy
    pub(super) parent: Option<NodeId>,
    pub(super) children: Vec<NodeId>,

    pub(super) enabled: bool,
    pub(crate) attached: bool,
    pub(super) kind: NodeKind,
}

impl Node {
    pub(super) fn new(name: String, kind: NodeKind) -> Self {
        Self {
            name,
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            euler: Vec3::zeros(),
            scale: Vec3::repeat(1.0),
            local: Mat4::identity(),
            world: Mat4::identity(),
            local_dirty: false,
            world_dirty: false,
            edit_depth: 0,
            parent: None,
            children: Vec::new(),
            enabled: true,
            attached: false,
            kind,
        }
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Local position
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Local rotation
    pub const fn rotation(&self) -> Quat {
        self.rotation
    }

    /// Local rotation as XYZ Euler angles in radians
    pub const fn rotation_euler(&self) -> Vec3 {
        self.euler
    }

    /// Local rotation as XYZ Euler angles in degrees
    pub fn rotation_degrees(&self) -> Vec3 {
        utils::euler_to_degrees(self.euler)
    }

    /// Local scale
    pub const fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Local components as a [`Transform`]
    pub const fn local_transform(&self) -> Transform {
        Transform::new(self.position, self.rotation, self.scale)
    }

    /// Parent handle, `None` for roots
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child handles in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Whether the node takes part in rendering and updates
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the node is attached to a scene
    pub const fn is_attached(&self) -> bool {
        self.attached
    }

    /// Rendering payload
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// True while an edit scope on this node is open
    pub const fn is_editing(&self) -> bool {
        self.edit_depth > 0
    }

    pub(super) fn compose_local(&self) -> Mat4 {
        if self.local_dirty {
            self.local_transform().to_matrix()
        } else {
            self.local
        }
    }

    pub(super) fn set_rotation_quat(&mut self, rotation: Quat) {
        let (roll, pitch, yaw) = rotation.euler_angles();
        self.rotation = rotation;
        self.euler = Vec3::new(roll, pitch, yaw);
    }

    pub(super) fn set_rotation_radians(&mut self, euler: Vec3) {
        self.rotation = Quat::from_euler_angles(euler.x, euler.y, euler.z);
        self.euler = euler;
    }
}
