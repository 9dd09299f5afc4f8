//! Geometry Store: the fixed cube the pipeline draws.
//!
//! # Invariants
//! - Arrays are immutable; the GPU copies are uploaded once.
//! - Every index addresses one of the eight vertices.
//! - Every triangle winds counter-clockwise when seen from outside the cube.

mod cube;

pub use cube::{
    COLOR_COMPONENTS, CUBE_COLORS, CUBE_INDICES, CUBE_POSITIONS, Face, INDEX_COUNT,
    IndexData, POSITION_COMPONENTS, VERTEX_COUNT, face_triangles,
};

pub fn crate_info() -> &'static str {
    "cubeview-geometry v0.1.0"
}
