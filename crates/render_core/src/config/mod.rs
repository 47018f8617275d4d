//! Configuration system
//!
//! Configuration structs are plain serde types. Any type implementing
//! [`Config`] can be loaded from or saved to `.toml` and `.ron` files.

use crate::render::PipelineConfig;
use std::path::Path;

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file, picking the format from the extension
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path)?;
        let contents = std::fs::read_to_string(path)?;

        match format {
            ConfigFormat::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            ConfigFormat::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Supported on-disk formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Ron,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A value is outside its allowed range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter when `RUST_LOG` is not set
    pub log_level: String,

    /// Render pipeline settings
    pub pipeline: PipelineConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        let octree = &self.pipeline.octree;
        if octree.max_depth == 0 {
            return Err(ConfigError::Invalid("octree.max_depth must be at least 1".to_string()));
        }
        if !octree.initial_size.iter().all(|s| s.is_finite() && *s > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "octree.initial_size must be positive, got {:?}",
                octree.initial_size
            )));
        }

        let ttl = self.pipeline.render_targets.ttl_seconds;
        if !(ttl.is_finite() && ttl > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "render_targets.ttl_seconds must be positive, got {ttl}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("render_core_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_toml_and_ron_roundtrip() {
        let mut config = EngineConfig::default();
        config.log_level = "debug".to_string();
        config.pipeline.frustum_culling = false;
        config.pipeline.lights.max_point = 3;

        for name in ["engine.toml", "engine.ron"] {
            let path = temp_path(name);
            config.save_to_file(&path).unwrap();
            let loaded = EngineConfig::load_from_file(&path).unwrap();
            std::fs::remove_file(&path).ok();
            assert_eq!(loaded, config);
        }
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let path = temp_path("partial.toml");
        std::fs::write(&path, "log_level = \"warn\"\n").unwrap();
        let loaded = EngineConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.log_level, "warn");
        assert_eq!(loaded.pipeline, PipelineConfig::default());
    }

    #[test]
    fn test_unsupported_format() {
        let err = EngineConfig::default().save_to_file(temp_path("engine.json")).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        assert!(EngineConfig::default().validate().is_ok());

        let mut config = EngineConfig::default();
        config.pipeline.octree.max_depth = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = EngineConfig::default();
        config.pipeline.render_targets.ttl_seconds = -1.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = EngineConfig::default();
        config.pipeline.octree.initial_size = [64.0, 0.0, 64.0];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
