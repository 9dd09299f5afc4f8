use std::fmt::Debug;

use glam::{Mat4, Vec3};

use cubeview_common::{SceneConfig, SurfaceSize};

/// Matrix operations the frame loop needs. Matrices are 4×4, column-major.
pub trait MatrixMath {
    type Matrix: Copy + PartialEq + Debug;

    fn identity(&self) -> Self::Matrix;

    /// `m` followed by a translation by `offset` in `m`'s local frame.
    fn translate(&self, m: Self::Matrix, offset: [f32; 3]) -> Self::Matrix;

    /// `m` followed by a rotation of `radians` about the local +Y axis.
    fn rotate_y(&self, m: Self::Matrix, radians: f32) -> Self::Matrix;

    /// `a × b`.
    fn multiply(&self, a: Self::Matrix, b: Self::Matrix) -> Self::Matrix;

    /// Right-handed perspective projection with clip depth in [0, 1].
    fn perspective(&self, fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Self::Matrix;

    fn to_columns(&self, m: Self::Matrix) -> [f32; 16];
}

/// [`MatrixMath`] backed by glam.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlamMath;

impl MatrixMath for GlamMath {
    type Matrix = Mat4;

    fn identity(&self) -> Mat4 {
        Mat4::IDENTITY
    }

    fn translate(&self, m: Mat4, offset: [f32; 3]) -> Mat4 {
        m * Mat4::from_translation(Vec3::from(offset))
    }

    fn rotate_y(&self, m: Mat4, radians: f32) -> Mat4 {
        m * Mat4::from_rotation_y(radians)
    }

    fn multiply(&self, a: Mat4, b: Mat4) -> Mat4 {
        a * b
    }

    fn perspective(&self, fov_y_radians: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        Mat4::perspective_rh(fov_y_radians, aspect, near, far)
    }

    fn to_columns(&self, m: Mat4) -> [f32; 16] {
        m.to_cols_array()
    }
}

/// Projection for `scene` on a surface of `size`.
pub fn projection<M: MatrixMath>(math: &M, scene: &SceneConfig, size: SurfaceSize) -> M::Matrix {
    math.perspective(
        scene.fov_degrees.to_radians(),
        size.aspect(),
        scene.near,
        scene.far,
    )
}

/// Identity translated to `translation`, then turned `angle` radians about +Y.
pub fn model_view<M: MatrixMath>(math: &M, translation: [f32; 3], angle: f32) -> M::Matrix {
    let mv = math.translate(math.identity(), translation);
    if angle == 0.0 {
        mv
    } else {
        math.rotate_y(mv, angle)
    }
}
