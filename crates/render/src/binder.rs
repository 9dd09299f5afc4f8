use cubeview_common::{ShaderInterfaceNames, WideIndexPolicy};
use cubeview_geometry::{
    COLOR_COMPONENTS, CUBE_COLORS, CUBE_POSITIONS, IndexData, POSITION_COMPONENTS, VERTEX_COUNT,
};

use crate::context::RenderingContext;
use crate::device::{AttributeLocation, BufferKind, GpuDevice, IndexFormat, UniformLocation};
use crate::error::PipelineError;

/// Locations resolved against a linked program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramInterface {
    pub position: AttributeLocation,
    pub color: AttributeLocation,
    pub mvp: UniformLocation,
}

/// Looks up the position and color attributes (enabling both) and the MVP
/// uniform. A name the program does not declare is fatal.
pub fn resolve_interface<D: GpuDevice>(
    device: &mut D,
    program: &D::Program,
    names: &ShaderInterfaceNames,
) -> Result<ProgramInterface, PipelineError> {
    let position = resolve_attribute(device, program, &names.position)?;
    let color = resolve_attribute(device, program, &names.color)?;
    let mvp = device
        .uniform_location(program, &names.mvp)
        .ok_or_else(|| PipelineError::ShaderInterface {
            name: names.mvp.clone(),
        })?;
    Ok(ProgramInterface {
        position,
        color,
        mvp,
    })
}

fn resolve_attribute<D: GpuDevice>(
    device: &mut D,
    program: &D::Program,
    name: &str,
) -> Result<AttributeLocation, PipelineError> {
    let location = device
        .attribute_location(program, name)
        .ok_or_else(|| PipelineError::ShaderInterface { name: name.into() })?;
    device.enable_attribute(location);
    Ok(location)
}

/// An immutable GPU-resident array.
pub struct GeometryBuffer<B> {
    buffer: B,
    kind: BufferKind,
    len: usize,
}

impl<B> GeometryBuffer<B> {
    pub fn buffer(&self) -> &B {
        &self.buffer
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    /// Number of elements: vertices for vertex buffers, indices for index buffers.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// The three cube buffers.
pub struct GeometryBuffers<D: GpuDevice> {
    pub positions: GeometryBuffer<D::Buffer>,
    pub colors: GeometryBuffer<D::Buffer>,
    pub indices: GeometryBuffer<D::Buffer>,
    pub index_format: IndexFormat,
}

impl<D: GpuDevice> GeometryBuffers<D> {
    pub fn index_count(&self) -> u32 {
        self.indices.len as u32
    }
}

/// Uploads the cube positions, colors and indices as static buffers.
///
/// The index width follows `policy` when the context lacks wide indices.
/// Allocation failure is reported like a failed context acquisition.
pub fn upload_geometry<D: GpuDevice>(
    context: &mut RenderingContext<D>,
    policy: WideIndexPolicy,
) -> Result<GeometryBuffers<D>, PipelineError> {
    let index_format = context.index_format(policy)?;
    let data = match index_format {
        IndexFormat::U32 => IndexData::wide(),
        IndexFormat::U16 => IndexData::narrow(),
    };

    let device = context.device_mut();
    let positions = upload(
        device,
        BufferKind::Vertex,
        bytemuck::cast_slice(&CUBE_POSITIONS),
        CUBE_POSITIONS.len() / POSITION_COMPONENTS as usize,
    )?;
    let colors = upload(
        device,
        BufferKind::Vertex,
        bytemuck::cast_slice(&CUBE_COLORS),
        CUBE_COLORS.len() / COLOR_COMPONENTS as usize,
    )?;
    let indices = upload(device, BufferKind::Index, data.as_bytes(), data.len())?;

    tracing::debug!(
        "uploaded cube geometry: {} vertices, {} {:?} indices",
        VERTEX_COUNT,
        indices.len(),
        index_format
    );

    Ok(GeometryBuffers {
        positions,
        colors,
        indices,
        index_format,
    })
}

fn upload<D: GpuDevice>(
    device: &mut D,
    kind: BufferKind,
    contents: &[u8],
    len: usize,
) -> Result<GeometryBuffer<D::Buffer>, PipelineError> {
    let buffer = device
        .create_static_buffer(kind, contents)
        .map_err(|e| PipelineError::ContextAcquisition {
            reason: format!("buffer allocation failed: {e}"),
        })?;
    Ok(GeometryBuffer { buffer, kind, len })
}
