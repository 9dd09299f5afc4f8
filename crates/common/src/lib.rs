//! Shared value types and configuration.
//!
//! # Invariants
//! - A `SurfaceSize` handed to the pipeline is measured once and never changes.
//! - Configuration defaults reproduce the static cube scene exactly.

pub mod config;
pub mod types;

pub use config::{
    AppConfig, ConfigError, MvpUpdate, SceneConfig, ShaderInterfaceNames, WideIndexPolicy,
    WindowConfig,
};
pub use types::{SurfaceSize, Viewport};
