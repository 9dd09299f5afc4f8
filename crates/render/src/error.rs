use crate::device::{OptionalFeature, ShaderStage};

/// Fatal pipeline construction errors. Construction stops at the first one.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    #[error("surface {width}x{height} has no drawable area")]
    InvalidSurface { width: u32, height: u32 },
    #[error("failed to acquire GPU context: {reason}")]
    ContextAcquisition { reason: String },
    #[error("{stage} shader failed to compile:\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("shader program failed to link:\n{log}")]
    ShaderLink { log: String },
    #[error("linked program does not declare `{name}`")]
    ShaderInterface { name: String },
    #[error("required GPU feature unavailable: {feature}")]
    MissingFeature { feature: OptionalFeature },
}

impl PipelineError {
    /// Stable name of the error kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSurface { .. } => "InvalidSurface",
            Self::ContextAcquisition { .. } => "ContextAcquisitionError",
            Self::ShaderCompile { .. } => "ShaderCompileError",
            Self::ShaderLink { .. } => "ShaderLinkError",
            Self::ShaderInterface { .. } => "ShaderInterfaceError",
            Self::MissingFeature { .. } => "MissingFeature",
        }
    }
}
