use cubeview_common::ShaderInterfaceNames;

use crate::binder::{ProgramInterface, resolve_interface};
use crate::context::RenderingContext;
use crate::device::{AttributeLocation, GpuDevice, ShaderStage, UniformLocation};
use crate::error::PipelineError;
use crate::shaders;

/// Vertex and fragment source text handed to the compiler.
#[derive(Debug, Clone, Copy)]
pub struct ShaderSources<'a> {
    pub vertex: &'a str,
    pub fragment: &'a str,
}

impl ShaderSources<'static> {
    /// The WGSL stages shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            vertex: shaders::CUBE_VERTEX,
            fragment: shaders::CUBE_FRAGMENT,
        }
    }
}

/// A linked, active program and the locations the frame loop writes to.
pub struct ShaderProgram<D: GpuDevice> {
    vertex: D::Shader,
    fragment: D::Shader,
    handle: D::Program,
    interface: ProgramInterface,
}

impl<D: GpuDevice> ShaderProgram<D> {
    pub fn handle(&self) -> &D::Program {
        &self.handle
    }

    pub fn stage(&self, stage: ShaderStage) -> &D::Shader {
        match stage {
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Fragment => &self.fragment,
        }
    }

    pub fn position(&self) -> AttributeLocation {
        self.interface.position
    }

    pub fn color(&self) -> AttributeLocation {
        self.interface.color
    }

    pub fn mvp(&self) -> UniformLocation {
        self.interface.mvp
    }
}

/// Compiles both stages, links and activates the program, then resolves the
/// position, color and MVP locations.
///
/// Stops at the first failure; nothing after the failing step runs.
pub fn compile_and_link<D: GpuDevice>(
    context: &mut RenderingContext<D>,
    sources: &ShaderSources<'_>,
    names: &ShaderInterfaceNames,
) -> Result<ShaderProgram<D>, PipelineError> {
    let device = context.device_mut();

    let vertex = compile_stage(device, ShaderStage::Vertex, sources.vertex)?;
    let fragment = compile_stage(device, ShaderStage::Fragment, sources.fragment)?;

    let handle = device
        .link_program(&vertex, &fragment)
        .map_err(|e| PipelineError::ShaderLink {
            log: e.into_message(),
        })?;
    device.use_program(&handle);

    let interface = resolve_interface(device, &handle, names)?;
    tracing::info!(
        "shader program linked: position@{}, color@{}, mvp@{}:{}",
        interface.position.0,
        interface.color.0,
        interface.mvp.group,
        interface.mvp.binding
    );

    Ok(ShaderProgram {
        vertex,
        fragment,
        handle,
        interface,
    })
}

fn compile_stage<D: GpuDevice>(
    device: &mut D,
    stage: ShaderStage,
    source: &str,
) -> Result<D::Shader, PipelineError> {
    device.compile_shader(stage, source).map_err(|e| {
        let log = e.into_message();
        tracing::debug!("{stage} shader compilation failed: {log}");
        PipelineError::ShaderCompile { stage, log }
    })
}
