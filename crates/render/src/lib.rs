//! Rendering core: context setup, shader compilation, geometry upload and the
//! frame loop that draws the cube.
//!
//! # Invariants
//! - Construction is all-or-nothing: any initialization error aborts the
//!   pipeline before a later stage runs.
//! - Every device operation goes through an explicit context borrow; there is
//!   no ambient "currently bound" buffer state.
//! - The frame loop is single-threaded. One scheduled callback per presented
//!   frame, fired in submission order.
//!
//! Backends implement [`GpuDevice`]. [`headless`] records commands for tests
//! and offscreen runs; `cubeview-render-wgpu` drives a real surface.

mod binder;
mod context;
mod device;
mod error;
pub mod headless;
mod pipeline;
pub mod reflect;
mod scheduler;
mod shader;
pub mod shaders;
mod transform;

pub use binder::{
    GeometryBuffer, GeometryBuffers, ProgramInterface, resolve_interface, upload_geometry,
};
pub use context::{Capabilities, RenderingContext};
pub use device::{
    AttributeLocation, BufferKind, Capability, ClearValues, DeviceError, DeviceResult,
    DeviceSource, GpuDevice, IndexFormat, IndexedDraw, OptionalFeature, ShaderStage,
    UniformLocation, VertexStream,
};
pub use error::PipelineError;
pub use pipeline::{CubePipeline, PipelineDescriptor};
pub use scheduler::{
    FrameHost, FrameOutcome, FrameResources, FrameScheduler, FrameState, FrameTicket, QueueHost,
    SchedulerError, StopHandle,
};
pub use shader::{ShaderProgram, ShaderSources, compile_and_link};
pub use transform::{GlamMath, MatrixMath, model_view, projection};

pub fn crate_info() -> &'static str {
    "cubeview-render v0.1.0"
}
