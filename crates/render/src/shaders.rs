//! Default WGSL stages for the cube.
//!
//! The vertex stage declares the three names the pipeline resolves by default:
//! `vertex_position`, `vertex_color` and the `mvp` uniform.

/// Transforms positions by the MVP uniform and forwards the vertex color.
pub const CUBE_VERTEX: &str = r#"
@group(0) @binding(0)
var<uniform> mvp: mat4x4<f32>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_main(
    @location(0) vertex_position: vec3<f32>,
    @location(1) vertex_color: vec4<f32>,
) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = mvp * vec4<f32>(vertex_position, 1.0);
    out.color = vertex_color;
    return out;
}
"#;

/// Writes the interpolated vertex color.
pub const CUBE_FRAGMENT: &str = r#"
@fragment
fn fs_main(@location(0) color: vec4<f32>) -> @location(0) vec4<f32> {
    return color;
}
"#;
