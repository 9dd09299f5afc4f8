//! Pipeline configuration.
//!
//! Every field has a default, so a config file only needs to name what it
//! overrides:
//! ```yaml
//! window:
//!   width: 1024
//! scene:
//!   mvp_update: every_frame
//!   spin_degrees_per_frame: 0.5
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::SurfaceSize;

/// Errors from loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// When the model-view-projection uniform is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MvpUpdate {
    /// Written once on the first frame; the scene stays static.
    #[default]
    Once,
    /// Recomputed and written before every draw.
    EveryFrame,
}

/// What to do when the device cannot draw with 32-bit indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WideIndexPolicy {
    /// Upload 16-bit indices instead.
    #[default]
    Fallback,
    /// Abort pipeline construction.
    Require,
}

/// Names the core resolves against the linked shader program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderInterfaceNames {
    pub position: String,
    pub color: String,
    pub mvp: String,
}

impl Default for ShaderInterfaceNames {
    fn default() -> Self {
        Self {
            position: "vertex_position".into(),
            color: "vertex_color".into(),
            mvp: "mvp".into(),
        }
    }
}

/// Camera, placement and frame-loop settings for the cube scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Vertical field of view in degrees.
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    /// Offset applied to the identity model-view matrix.
    pub translation: [f32; 3],
    pub mvp_update: MvpUpdate,
    /// Rotation about +Y added per rendered frame. Only used with `EveryFrame`.
    pub spin_degrees_per_frame: f32,
    pub wide_indices: WideIndexPolicy,
    /// RGBA clear color.
    pub clear_color: [f64; 4],
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 45.0,
            near: 0.001,
            far: 1000.0,
            translation: [0.0, 0.0, -5.0],
            mvp_update: MvpUpdate::Once,
            spin_degrees_per_frame: 0.0,
            wide_indices: WideIndexPolicy::Fallback,
            clear_color: [0.0, 0.0, 0.0, 0.0],
        }
    }
}

impl SceneConfig {
    /// Checks the projection parameters describe a usable frustum.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) {
            return Err(ConfigError::Invalid {
                field: "scene.fov_degrees",
                reason: format!("{} is outside (0, 180)", self.fov_degrees),
            });
        }
        if !(self.near > 0.0) {
            return Err(ConfigError::Invalid {
                field: "scene.near",
                reason: format!("{} must be positive", self.near),
            });
        }
        if !(self.far > self.near) {
            return Err(ConfigError::Invalid {
                field: "scene.far",
                reason: format!("{} must exceed near plane {}", self.far, self.near),
            });
        }
        Ok(())
    }
}

/// Desktop window settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "cubeview".into(),
            width: 800,
            height: 600,
        }
    }
}

impl WindowConfig {
    pub fn surface_size(&self) -> SurfaceSize {
        SurfaceSize::new(self.width, self.height)
    }
}

/// Top-level configuration shared by both apps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub window: WindowConfig,
    pub scene: SceneConfig,
    pub interface: ShaderInterfaceNames,
}

impl AppConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(text)?;
        config.scene.validate()?;
        Ok(config)
    }

    /// Load from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml(&text)?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Load from `path` when given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}
