//! The seam between the rendering core and a GPU API.

use cubeview_common::{SurfaceSize, Viewport};
use std::fmt;

/// Error reported by a backend operation. Carries the backend's diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct DeviceError {
    message: String,
}

impl DeviceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn into_message(self) -> String {
        self.message
    }
}

pub type DeviceResult<T> = Result<T, DeviceError>;

/// A programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn label(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fixed-function state toggled on the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    DepthTest,
    Blend,
}

/// Device features requested on a best-effort basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionalFeature {
    /// Indexed draws with 32-bit element indices.
    WideIndices,
    /// Screen-space derivative instructions in fragment shaders.
    ShaderDerivatives,
}

impl OptionalFeature {
    pub const ALL: [OptionalFeature; 2] = [
        OptionalFeature::WideIndices,
        OptionalFeature::ShaderDerivatives,
    ];
}

impl fmt::Display for OptionalFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptionalFeature::WideIndices => "32-bit element indices",
            OptionalFeature::ShaderDerivatives => "shader derivatives",
        })
    }
}

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
}

/// Width of the entries in an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexFormat {
    U16,
    U32,
}

impl IndexFormat {
    /// Bytes per index.
    pub fn stride(self) -> usize {
        match self {
            IndexFormat::U16 => 2,
            IndexFormat::U32 => 4,
        }
    }
}

/// Resolved vertex attribute slot (`@location(n)` in WGSL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeLocation(pub u32);

/// Resolved uniform binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformLocation {
    pub group: u32,
    pub binding: u32,
}

/// Which attachments a draw clears before rasterizing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearValues {
    pub color: Option<[f64; 4]>,
    pub depth: Option<f32>,
}

/// One vertex buffer feeding one attribute. Tightly packed 32-bit floats.
pub struct VertexStream<'a, B> {
    pub location: AttributeLocation,
    pub buffer: &'a B,
    /// Floats per vertex.
    pub components: u32,
}

/// Everything one indexed triangle-list draw needs, passed explicitly.
pub struct IndexedDraw<'a, B> {
    pub clear: ClearValues,
    pub streams: &'a [VertexStream<'a, B>],
    pub indices: &'a B,
    pub index_format: IndexFormat,
    pub index_count: u32,
}

/// GPU API used by the rendering core.
///
/// Handles are backend-owned values; the core never inspects them. Capabilities
/// are captured when a program links, so they must be enabled beforehand.
pub trait GpuDevice {
    type Shader;
    type Program;
    type Buffer;

    fn set_viewport(&mut self, viewport: Viewport);

    fn enable(&mut self, capability: Capability);

    /// Enables `feature` if the device supports it. Returns whether it is now enabled.
    fn request_feature(&mut self, feature: OptionalFeature) -> bool;

    /// Compiles one stage. The error carries the compiler log.
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> DeviceResult<Self::Shader>;

    /// Links a vertex and fragment stage. The error carries the linker log.
    fn link_program(
        &mut self,
        vertex: &Self::Shader,
        fragment: &Self::Shader,
    ) -> DeviceResult<Self::Program>;

    fn use_program(&mut self, program: &Self::Program);

    fn attribute_location(&self, program: &Self::Program, name: &str) -> Option<AttributeLocation>;

    fn enable_attribute(&mut self, location: AttributeLocation);

    fn uniform_location(&self, program: &Self::Program, name: &str) -> Option<UniformLocation>;

    /// Creates a buffer initialized with `contents` that is never written again.
    fn create_static_buffer(
        &mut self,
        kind: BufferKind,
        contents: &[u8],
    ) -> DeviceResult<Self::Buffer>;

    /// Writes a column-major 4×4 matrix into a uniform of `program`.
    fn write_uniform_mat4(
        &mut self,
        program: &Self::Program,
        location: UniformLocation,
        columns: &[f32; 16],
    ) -> DeviceResult<()>;

    /// Clears, binds the draw's streams and indices, draws and presents one frame.
    fn draw_indexed(
        &mut self,
        program: &Self::Program,
        draw: &IndexedDraw<'_, Self::Buffer>,
    ) -> DeviceResult<()>;
}

/// Something that can acquire a device bound to a surface of a given size.
pub trait DeviceSource {
    type Device: GpuDevice;

    fn acquire(self, size: SurfaceSize) -> DeviceResult<Self::Device>;
}
