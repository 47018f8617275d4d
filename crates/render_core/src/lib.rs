//! # Render Core
//!
//! The core of a real-time 3D rendering engine: a mutable scene graph with
//! hierarchical transforms, an octree used for per-frame visibility culling,
//! and a multi-pass render pipeline that schedules GPU work against the
//! visible set.
//!
//! ## Architecture
//!
//! ```text
//! Scene (node arena, attached set, dirty transforms)
//!      ↓ add/remove/update
//! RenderPipeline (registries, octree, GPU resources, render targets)
//!      ↓ per frame, per camera
//! RenderPass (shader variants, draw filtering)
//!      ↓
//! GraphicsContext (supplied by the embedding layer)
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use render_core::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     let mut engine = Engine::new(EngineConfig::default())?;
//!     let scene = engine.scene_mut();
//!
//!     let camera = scene.graph_mut().create_node(
//!         "main_camera",
//!         NodeKind::Camera(CameraComponent::perspective(Viewport::new(640, 480), 60.0, 0.1, 100.0)),
//!     );
//!     scene.add_node(camera)?;
//!
//!     engine.initialize(Box::new(HeadlessContext::new()))?;
//!     engine.update(1.0 / 60.0)?;
//!     let stats = engine.render()?;
//!     assert_eq!(stats.cameras_rendered, 1);
//!     engine.destroy()?;
//!     Ok(())
//! }
//! ```
//!
//! All calls are expected on the thread that owns the graphics context.
//! Nothing in this crate locks, blocks or spawns.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;
pub mod spatial;

mod engine;
mod error;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, EngineConfig},
        foundation::math::{Mat4, Quat, Transform, Vec3, Vec4},
        render::{
            BlendMode, CameraComponent, FrameStats, Geometry, GeometryId, GeometryPass,
            GraphicsContext, HeadlessContext, LightComponent, Material, MeshComponent,
            MeshFilter, PipelineConfig, RenderError, RenderPass, RenderPipeline,
            RenderTargetLayout, ShaderFeatures, ShaderSource, TextureFormat, Vertex, Viewport,
        },
        scene::{NodeBehavior, NodeGraph, NodeId, NodeKind, Scene, SceneError},
        spatial::{BoundingBox, Frustum, Octree, OctreeConfig},
        Engine, EngineError, EngineResult,
    };
}
