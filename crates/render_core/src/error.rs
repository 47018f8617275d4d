//! Engine-level error type

use crate::config::ConfigError;
use crate::render::RenderError;
use crate::scene::SceneError;
use crate::spatial::{BoundsError, OctreeError};
use thiserror::Error;

/// Any error surfaced by the engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Scene graph invariant violation
    #[error("scene error: {0}")]
    Scene(#[from] SceneError),

    /// Rendering or GPU failure
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Invalid bounding volume
    #[error("bounds error: {0}")]
    Bounds(#[from] BoundsError),

    /// Spatial index failure
    #[error("octree error: {0}")]
    Octree(#[from] OctreeError),

    /// Configuration could not be loaded or is out of range
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
