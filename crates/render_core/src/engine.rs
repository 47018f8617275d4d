//! Engine facade
//!
//! [`Engine`] pairs a validated [`EngineConfig`] with the [`Scene`] and
//! exposes the four lifecycle entry points the embedding layer drives:
//! `initialize`, `update`, `render` and `destroy`.

use crate::config::{Config, EngineConfig};
use crate::error::EngineResult;
use crate::render::{FrameStats, GraphicsContext};
use crate::scene::Scene;
use std::path::Path;

/// Main engine struct
pub struct Engine {
    config: EngineConfig,
    scene: Scene,
}

impl Engine {
    /// Create an engine from a configuration; the config is validated first
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        log::info!("Initializing engine...");
        Ok(Self {
            scene: Scene::new(config.pipeline.clone()),
            config,
        })
    }

    /// Load a `.toml` or `.ron` configuration and create an engine from it
    pub fn from_config_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let config = EngineConfig::load_from_file(path)?;
        Self::new(config)
    }

    /// Bind the graphics context supplied by the embedding layer
    pub fn initialize(&mut self, context: Box<dyn GraphicsContext>) -> EngineResult<()> {
        self.scene.initialize(context)
    }

    /// Advance the scene by one tick
    pub fn update(&mut self, delta_time: f32) -> EngineResult<()> {
        self.scene.update(delta_time)
    }

    /// Render one frame
    pub fn render(&mut self) -> EngineResult<FrameStats> {
        self.scene.render()
    }

    /// Release every GPU resource
    pub fn destroy(&mut self) -> EngineResult<()> {
        self.scene.destroy()?;
        log::info!("Engine shutdown complete");
        Ok(())
    }

    /// Active configuration
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the scene
    pub const fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Get mutable access to the scene
    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;
    use crate::error::EngineError;
    use crate::render::HeadlessContext;

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.pipeline.octree.max_depth = 0;
        assert!(matches!(
            Engine::new(config),
            Err(EngineError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_lifecycle_round_trip() {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        engine.initialize(Box::new(HeadlessContext::new())).unwrap();
        engine.update(1.0 / 60.0).unwrap();
        assert_eq!(engine.render().unwrap().frame, 1);
        engine.destroy().unwrap();
        assert!(engine.render().is_err());
    }

    #[test]
    fn test_missing_config_file() {
        assert!(matches!(
            Engine::from_config_file("does/not/exist.toml"),
            Err(EngineError::Config(ConfigError::Io(_)))
        ));
    }
}
