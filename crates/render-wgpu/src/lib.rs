//! wgpu backend for the cube renderer.
//!
//! Implements the `GpuDevice` seam over a wgpu device presenting to a winit
//! window. Shader modules are validated with naga before wgpu sees them, so
//! compile and link errors carry a readable log.
//!
//! # Invariants
//! - One surface, configured once at its initial size.
//! - Depth and blend state must be enabled before a program links.
//! - A lost or outdated surface skips the frame instead of failing it.

mod device;

pub use device::{WgpuBuffer, WgpuDevice, WgpuProgram, WgpuShader, WgpuSource};
