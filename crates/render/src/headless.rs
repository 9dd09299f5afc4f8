//! Recording backend with no GPU behind it.
//!
//! Shaders go through the same naga reflection as the wgpu backend, so compile
//! and link errors are real. Draws are validated against the linked program
//! and every call is appended to a shared [`Journal`].

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use cubeview_common::{SurfaceSize, Viewport};

use crate::device::{
    AttributeLocation, BufferKind, Capability, ClearValues, DeviceError, DeviceResult,
    DeviceSource, GpuDevice, IndexFormat, IndexedDraw, OptionalFeature, ShaderStage,
    UniformLocation,
};
use crate::reflect::{LinkedInterface, StageReflection, link_stages, reflect_stage};

/// One recorded device call.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetViewport(Viewport),
    Enable(Capability),
    RequestFeature {
        feature: OptionalFeature,
        granted: bool,
    },
    CompileShader { stage: ShaderStage, ok: bool },
    LinkProgram { ok: bool },
    UseProgram(u32),
    EnableAttribute(AttributeLocation),
    CreateBuffer {
        id: u32,
        kind: BufferKind,
        bytes: usize,
    },
    WriteUniform {
        location: UniformLocation,
        columns: [f32; 16],
    },
    DrawIndexed {
        clear: ClearValues,
        /// `(location, buffer id, components)` per stream.
        streams: Vec<(AttributeLocation, u32, u32)>,
        indices: u32,
        format: IndexFormat,
        count: u32,
    },
}

/// Shared command log. Clones observe the same log.
#[derive(Debug, Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<Command>>>);

impl Journal {
    pub fn commands(&self) -> Vec<Command> {
        self.0.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn draw_count(&self) -> usize {
        self.0
            .borrow()
            .iter()
            .filter(|c| matches!(c, Command::DrawIndexed { .. }))
            .count()
    }

    fn push(&self, command: Command) {
        self.0.borrow_mut().push(command);
    }
}

/// Builds a [`HeadlessDevice`] with a chosen feature set and failure modes.
#[derive(Debug, Clone)]
pub struct HeadlessSource {
    supported: BTreeSet<OptionalFeature>,
    failure: Option<String>,
    buffer_limit: Option<usize>,
    journal: Journal,
}

impl Default for HeadlessSource {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessSource {
    /// A device supporting every optional feature.
    pub fn new() -> Self {
        Self {
            supported: OptionalFeature::ALL.into_iter().collect(),
            failure: None,
            buffer_limit: None,
            journal: Journal::default(),
        }
    }

    pub fn without_feature(mut self, feature: OptionalFeature) -> Self {
        self.supported.remove(&feature);
        self
    }

    /// Acquisition fails with `reason`.
    pub fn failing(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// Buffer creation fails once `limit` buffers exist.
    pub fn with_buffer_limit(mut self, limit: usize) -> Self {
        self.buffer_limit = Some(limit);
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }
}

impl DeviceSource for HeadlessSource {
    type Device = HeadlessDevice;

    fn acquire(self, size: SurfaceSize) -> DeviceResult<HeadlessDevice> {
        if let Some(reason) = self.failure {
            return Err(DeviceError::new(reason));
        }
        tracing::debug!(
            "headless device acquired for {}x{}",
            size.width,
            size.height
        );
        Ok(HeadlessDevice {
            size,
            journal: self.journal,
            supported: self.supported,
            granted: BTreeSet::new(),
            capabilities: BTreeSet::new(),
            viewport: None,
            buffer_limit: self.buffer_limit,
            buffers: 0,
            next_id: 0,
            active_program: None,
            enabled_attributes: BTreeSet::new(),
            uniforms: BTreeMap::new(),
            draws: 0,
        })
    }
}

#[derive(Debug, Clone)]
pub struct HeadlessShader {
    id: u32,
    reflection: StageReflection,
}

impl HeadlessShader {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn stage(&self) -> ShaderStage {
        self.reflection.stage
    }

    pub fn reflection(&self) -> &StageReflection {
        &self.reflection
    }
}

#[derive(Debug, Clone)]
pub struct HeadlessProgram {
    id: u32,
    interface: LinkedInterface,
}

impl HeadlessProgram {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn interface(&self) -> &LinkedInterface {
        &self.interface
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessBuffer {
    id: u32,
    kind: BufferKind,
    len: usize,
}

impl HeadlessBuffer {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn kind(&self) -> BufferKind {
        self.kind
    }

    pub fn byte_len(&self) -> usize {
        self.len
    }
}

pub struct HeadlessDevice {
    size: SurfaceSize,
    journal: Journal,
    supported: BTreeSet<OptionalFeature>,
    granted: BTreeSet<OptionalFeature>,
    capabilities: BTreeSet<Capability>,
    viewport: Option<Viewport>,
    buffer_limit: Option<usize>,
    buffers: usize,
    next_id: u32,
    active_program: Option<u32>,
    enabled_attributes: BTreeSet<AttributeLocation>,
    /// Last value written per (program, location).
    uniforms: BTreeMap<(u32, UniformLocation), [f32; 16]>,
    draws: u64,
}

impl HeadlessDevice {
    pub fn size(&self) -> SurfaceSize {
        self.size
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn is_enabled(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers
    }

    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    pub fn uniform(
        &self,
        program: &HeadlessProgram,
        location: UniformLocation,
    ) -> Option<[f32; 16]> {
        self.uniforms.get(&(program.id, location)).copied()
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn validate_draw(
        &self,
        program: &HeadlessProgram,
        draw: &IndexedDraw<'_, HeadlessBuffer>,
    ) -> DeviceResult<()> {
        if self.active_program != Some(program.id) {
            return Err(DeviceError::new(format!(
                "program {} is not the active program",
                program.id
            )));
        }

        let attributes = &program.interface.attributes;
        if draw.streams.len() != attributes.len() {
            return Err(DeviceError::new(format!(
                "program declares {} attribute(s) but the draw binds {} stream(s)",
                attributes.len(),
                draw.streams.len()
            )));
        }
        for stream in draw.streams {
            let location = stream.location;
            let Some(attribute) = program.interface.attribute_at(location.0) else {
                return Err(DeviceError::new(format!(
                    "no attribute at location {}",
                    location.0
                )));
            };
            if !self.enabled_attributes.contains(&location) {
                return Err(DeviceError::new(format!(
                    "attribute `{}` is not enabled",
                    attribute.name
                )));
            }
            if attribute.ty.components != stream.components {
                return Err(DeviceError::new(format!(
                    "attribute `{}` has {} component(s), stream supplies {}",
                    attribute.name, attribute.ty.components, stream.components
                )));
            }
            let stride = stream.components as usize * 4;
            if stream.buffer.kind != BufferKind::Vertex || stream.buffer.len % stride != 0 {
                return Err(DeviceError::new(format!(
                    "buffer {} cannot feed attribute `{}`",
                    stream.buffer.id, attribute.name
                )));
            }
        }

        if draw.indices.kind != BufferKind::Index {
            return Err(DeviceError::new(format!(
                "buffer {} is not an index buffer",
                draw.indices.id
            )));
        }
        let wide = OptionalFeature::WideIndices;
        if draw.index_format == IndexFormat::U32 && !self.granted.contains(&wide) {
            return Err(DeviceError::new(format!("{wide} not enabled")));
        }
        if draw.indices.len != draw.index_count as usize * draw.index_format.stride() {
            return Err(DeviceError::new(format!(
                "index buffer holds {} bytes, draw reads {} {:?} indices",
                draw.indices.len, draw.index_count, draw.index_format
            )));
        }

        for uniform in &program.interface.uniforms {
            let location = UniformLocation {
                group: uniform.group,
                binding: uniform.binding,
            };
            if !self.uniforms.contains_key(&(program.id, location)) {
                return Err(DeviceError::new(format!(
                    "uniform `{}` has never been written",
                    uniform.name
                )));
            }
        }
        Ok(())
    }
}

impl GpuDevice for HeadlessDevice {
    type Shader = HeadlessShader;
    type Program = HeadlessProgram;
    type Buffer = HeadlessBuffer;

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
        self.journal.push(Command::SetViewport(viewport));
    }

    fn enable(&mut self, capability: Capability) {
        self.capabilities.insert(capability);
        self.journal.push(Command::Enable(capability));
    }

    fn request_feature(&mut self, feature: OptionalFeature) -> bool {
        let granted = self.supported.contains(&feature);
        if granted {
            self.granted.insert(feature);
        }
        let command = Command::RequestFeature { feature, granted };
        self.journal.push(command);
        granted
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> DeviceResult<HeadlessShader> {
        let reflected = reflect_stage(stage, source);
        let ok = reflected.is_ok();
        self.journal.push(Command::CompileShader { stage, ok });
        let reflection = reflected.map_err(DeviceError::new)?;
        Ok(HeadlessShader {
            id: self.allocate_id(),
            reflection,
        })
    }

    fn link_program(
        &mut self,
        vertex: &HeadlessShader,
        fragment: &HeadlessShader,
    ) -> DeviceResult<HeadlessProgram> {
        let linked = link_stages(&vertex.reflection, &fragment.reflection);
        let ok = linked.is_ok();
        self.journal.push(Command::LinkProgram { ok });
        let interface = linked.map_err(DeviceError::new)?;
        Ok(HeadlessProgram {
            id: self.allocate_id(),
            interface,
        })
    }

    fn use_program(&mut self, program: &HeadlessProgram) {
        self.active_program = Some(program.id);
        self.journal.push(Command::UseProgram(program.id));
    }

    fn attribute_location(
        &self,
        program: &HeadlessProgram,
        name: &str,
    ) -> Option<AttributeLocation> {
        program
            .interface
            .attribute(name)
            .map(|a| AttributeLocation(a.location))
    }

    fn enable_attribute(&mut self, location: AttributeLocation) {
        self.enabled_attributes.insert(location);
        self.journal.push(Command::EnableAttribute(location));
    }

    fn uniform_location(&self, program: &HeadlessProgram, name: &str) -> Option<UniformLocation> {
        program.interface.uniform(name).map(|u| UniformLocation {
            group: u.group,
            binding: u.binding,
        })
    }

    fn create_static_buffer(
        &mut self,
        kind: BufferKind,
        contents: &[u8],
    ) -> DeviceResult<HeadlessBuffer> {
        if self.buffer_limit.is_some_and(|max| self.buffers >= max) {
            return Err(DeviceError::new(format!(
                "out of memory allocating {} bytes",
                contents.len()
            )));
        }
        let id = self.allocate_id();
        self.buffers += 1;
        self.journal.push(Command::CreateBuffer {
            id,
            kind,
            bytes: contents.len(),
        });
        Ok(HeadlessBuffer {
            id,
            kind,
            len: contents.len(),
        })
    }

    fn write_uniform_mat4(
        &mut self,
        program: &HeadlessProgram,
        location: UniformLocation,
        columns: &[f32; 16],
    ) -> DeviceResult<()> {
        let uniform = program
            .interface
            .uniform_at(location.group, location.binding)
            .ok_or_else(|| {
                DeviceError::new(format!(
                    "no uniform at group {} binding {}",
                    location.group, location.binding
                ))
            })?;
        if uniform.size != 64 {
            return Err(DeviceError::new(format!(
                "uniform `{}` is {} bytes, not a mat4x4<f32>",
                uniform.name, uniform.size
            )));
        }
        self.uniforms.insert((program.id, location), *columns);
        self.journal.push(Command::WriteUniform {
            location,
            columns: *columns,
        });
        Ok(())
    }

    fn draw_indexed(
        &mut self,
        program: &HeadlessProgram,
        draw: &IndexedDraw<'_, HeadlessBuffer>,
    ) -> DeviceResult<()> {
        self.validate_draw(program, draw)?;
        self.draws += 1;
        self.journal.push(Command::DrawIndexed {
            clear: draw.clear,
            streams: draw
                .streams
                .iter()
                .map(|s| (s.location, s.buffer.id, s.components))
                .collect(),
            indices: draw.indices.id,
            format: draw.index_format,
            count: draw.index_count,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::VertexStream;
    use crate::shaders::{CUBE_FRAGMENT, CUBE_VERTEX};

    struct Linked {
        device: HeadlessDevice,
        program: HeadlessProgram,
        positions: HeadlessBuffer,
        colors: HeadlessBuffer,
        indices: HeadlessBuffer,
    }

    fn linked(source: HeadlessSource) -> Linked {
        let mut device = source.acquire(SurfaceSize::new(64, 64)).unwrap();
        for feature in OptionalFeature::ALL {
            device.request_feature(feature);
        }
        let vs = device.compile_shader(ShaderStage::Vertex, CUBE_VERTEX);
        let fs = device.compile_shader(ShaderStage::Fragment, CUBE_FRAGMENT);
        let program = device.link_program(&vs.unwrap(), &fs.unwrap()).unwrap();
        device.use_program(&program);
        device.enable_attribute(AttributeLocation(0));
        device.enable_attribute(AttributeLocation(1));
        let positions = device
            .create_static_buffer(BufferKind::Vertex, &[0; 8 * 12])
            .unwrap();
        let colors = device
            .create_static_buffer(BufferKind::Vertex, &[0; 8 * 16])
            .unwrap();
        let indices = device
            .create_static_buffer(BufferKind::Index, &[0; 36 * 4])
            .unwrap();
        Linked {
            device,
            program,
            positions,
            colors,
            indices,
        }
    }

    fn draw(l: &mut Linked, format: IndexFormat) -> DeviceResult<()> {
        let streams = [
            VertexStream {
                location: AttributeLocation(0),
                buffer: &l.positions,
                components: 3,
            },
            VertexStream {
                location: AttributeLocation(1),
                buffer: &l.colors,
                components: 4,
            },
        ];
        let draw = IndexedDraw {
            clear: ClearValues {
                color: Some([0.0; 4]),
                depth: Some(1.0),
            },
            streams: &streams,
            indices: &l.indices,
            index_format: format,
            index_count: 36,
        };
        l.device.draw_indexed(&l.program, &draw)
    }

    const MVP: UniformLocation = UniformLocation {
        group: 0,
        binding: 0,
    };

    #[test]
    fn draw_requires_written_uniform() {
        let mut l = linked(HeadlessSource::new());
        let err = draw(&mut l, IndexFormat::U32).unwrap_err();
        assert!(err.message().contains("mvp"), "{err}");

        l.device
            .write_uniform_mat4(&l.program, MVP, &[0.0; 16])
            .unwrap();
        draw(&mut l, IndexFormat::U32).unwrap();
        assert_eq!(l.device.draw_count(), 1);
        assert_eq!(l.device.journal().draw_count(), 1);
    }

    #[test]
    fn wide_indices_need_the_feature() {
        let source = HeadlessSource::new().without_feature(OptionalFeature::WideIndices);
        let mut l = linked(source);
        l.device
            .write_uniform_mat4(&l.program, MVP, &[0.0; 16])
            .unwrap();
        assert!(draw(&mut l, IndexFormat::U32).is_err());
    }

    #[test]
    fn uniform_write_checks_binding() {
        let mut l = linked(HeadlessSource::new());
        let other = UniformLocation {
            group: 0,
            binding: 3,
        };
        let written = l.device.write_uniform_mat4(&l.program, other, &[0.0; 16]);
        assert!(written.is_err());
        l.device
            .write_uniform_mat4(&l.program, MVP, &[2.0; 16])
            .unwrap();
        assert_eq!(l.device.uniform(&l.program, MVP), Some([2.0; 16]));
    }

    #[test]
    fn compile_errors_are_journaled() {
        let source = HeadlessSource::new();
        let journal = source.journal();
        let mut device = source.acquire(SurfaceSize::new(1, 1)).unwrap();
        let compiled = device.compile_shader(ShaderStage::Vertex, "fn (");
        assert!(compiled.is_err());
        assert_eq!(
            journal.commands(),
            vec![Command::CompileShader {
                stage: ShaderStage::Vertex,
                ok: false
            }]
        );
    }

    #[test]
    fn buffer_limit_is_enforced() {
        let mut device = HeadlessSource::new()
            .with_buffer_limit(1)
            .acquire(SurfaceSize::new(1, 1))
            .unwrap();
        let first = device.create_static_buffer(BufferKind::Vertex, &[0; 4]);
        let second = device.create_static_buffer(BufferKind::Vertex, &[0; 4]);
        assert!(first.is_ok());
        assert!(second.is_err());
        assert_eq!(device.buffer_count(), 1);
    }
}
