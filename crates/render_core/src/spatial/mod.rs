//! Spatial partitioning and bounding volumes
//!
//! Axis-aligned bounds, camera frustums and the octree used for visibility
//! culling.

pub mod bounds;
pub mod frustum;
pub mod octree;

pub use bounds::{BoundingBox, BoundsError, BOUNDS_EPSILON};
pub use frustum::{Frustum, Plane};
pub use octree::{Octree, OctreeConfig, OctreeError};
