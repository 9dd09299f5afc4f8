/// Floats per position entry (x, y, z).
pub const POSITION_COMPONENTS: u32 = 3;
/// Floats per color entry (r, g, b, a).
pub const COLOR_COMPONENTS: u32 = 4;
/// Number of cube corners.
pub const VERTEX_COUNT: usize = 8;
/// Number of indices: 6 faces × 2 triangles × 3 corners.
pub const INDEX_COUNT: usize = 36;

/// Corner positions: the front quad at z = +1, then the back quad at z = -1.
#[rustfmt::skip]
pub const CUBE_POSITIONS: [f32; VERTEX_COUNT * POSITION_COMPONENTS as usize] = [
    // front
    -1.0, -1.0,  1.0,
     1.0, -1.0,  1.0,
     1.0,  1.0,  1.0,
    -1.0,  1.0,  1.0,
    // back
    -1.0, -1.0, -1.0,
     1.0, -1.0, -1.0,
     1.0,  1.0, -1.0,
    -1.0,  1.0, -1.0,
];

/// Per-corner RGBA, matched to `CUBE_POSITIONS` by index.
#[rustfmt::skip]
pub const CUBE_COLORS: [f32; VERTEX_COUNT * COLOR_COMPONENTS as usize] = [
    // front
    1.0, 0.0, 0.0, 1.0,
    0.0, 1.0, 0.0, 1.0,
    0.0, 0.0, 1.0, 1.0,
    1.0, 1.0, 1.0, 1.0,
    // back
    1.0, 0.0, 0.0, 1.0,
    0.0, 1.0, 0.0, 1.0,
    0.0, 0.0, 1.0, 1.0,
    1.0, 1.0, 1.0, 1.0,
];

/// Triangle list, two triangles per face, in `Face::ALL` order.
#[rustfmt::skip]
pub const CUBE_INDICES: [u32; INDEX_COUNT] = [
    0, 1, 2,  2, 3, 0, // +Z
    1, 5, 6,  6, 2, 1, // +X
    7, 6, 5,  5, 4, 7, // -Z
    4, 0, 3,  3, 7, 4, // -X
    4, 5, 1,  1, 0, 4, // -Y
    3, 2, 6,  6, 7, 3, // +Y
];

/// One side of the cube, named by its outward axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Face {
    Front,
    Right,
    Back,
    Left,
    Bottom,
    Top,
}

impl Face {
    /// Faces in index-buffer order.
    pub const ALL: [Face; 6] = [
        Face::Front,
        Face::Right,
        Face::Back,
        Face::Left,
        Face::Bottom,
        Face::Top,
    ];

    /// Unit outward normal.
    pub fn normal(self) -> [f32; 3] {
        match self {
            Face::Front => [0.0, 0.0, 1.0],
            Face::Right => [1.0, 0.0, 0.0],
            Face::Back => [0.0, 0.0, -1.0],
            Face::Left => [-1.0, 0.0, 0.0],
            Face::Bottom => [0.0, -1.0, 0.0],
            Face::Top => [0.0, 1.0, 0.0],
        }
    }
}

/// The two triangles covering `face`.
pub fn face_triangles(face: Face) -> [[u32; 3]; 2] {
    let slot = Face::ALL.iter().position(|&f| f == face).unwrap_or(0);
    let i = &CUBE_INDICES[slot * 6..slot * 6 + 6];
    [[i[0], i[1], i[2]], [i[3], i[4], i[5]]]
}

/// Index list at the width the device can draw with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexData {
    U32(Vec<u32>),
    U16(Vec<u16>),
}

impl IndexData {
    /// 32-bit indices.
    pub fn wide() -> Self {
        Self::U32(CUBE_INDICES.to_vec())
    }

    /// 16-bit indices, for devices without full 32-bit index support.
    pub fn narrow() -> Self {
        // Every index is < VERTEX_COUNT, so the narrowing cannot truncate.
        Self::U16(CUBE_INDICES.iter().map(|&i| i as u16).collect())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::U32(v) => v.len(),
            Self::U16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per index.
    pub fn stride(&self) -> usize {
        match self {
            Self::U32(_) => 4,
            Self::U16(_) => 2,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::U32(v) => bytemuck::cast_slice(v),
            Self::U16(v) => bytemuck::cast_slice(v),
        }
    }

    /// Index values widened to u32, for inspection.
    pub fn to_u32(&self) -> Vec<u32> {
        match self {
            Self::U32(v) => v.clone(),
            Self::U16(v) => v.iter().map(|&i| u32::from(i)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corner(i: u32) -> [f32; 3] {
        let b = i as usize * 3;
        let p = &CUBE_POSITIONS[b..b + 3];
        [p[0], p[1], p[2]]
    }

    fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
        [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
    }

    fn cross(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
        [
            a[1] * b[2] - a[2] * b[1],
            a[2] * b[0] - a[0] * b[2],
            a[0] * b[1] - a[1] * b[0],
        ]
    }

    fn dot(a: [f32; 3], b: [f32; 3]) -> f32 {
        a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
    }

    #[test]
    fn thirty_six_indices_within_vertex_range() {
        assert_eq!(CUBE_INDICES.len(), 36);
        assert!(CUBE_INDICES.iter().all(|&i| (i as usize) < VERTEX_COUNT));
    }

    #[test]
    fn colors_match_positions() {
        assert_eq!(
            CUBE_POSITIONS.len() / POSITION_COMPONENTS as usize,
            CUBE_COLORS.len() / COLOR_COMPONENTS as usize
        );
    }

    #[test]
    fn quads_sit_on_front_and_back_planes() {
        for i in 0..4 {
            assert_eq!(corner(i)[2], 1.0);
            assert_eq!(corner(i + 4)[2], -1.0);
        }
    }

    #[test]
    fn every_triangle_winds_outward() {
        for face in Face::ALL {
            for [a, b, c] in face_triangles(face) {
                let (a, b, c) = (corner(a), corner(b), corner(c));
                let n = cross(sub(b, a), sub(c, a));
                assert!(
                    dot(n, face.normal()) > 0.0,
                    "{face:?} triangle winds inward"
                );
                // All three corners lie on the face plane.
                for p in [a, b, c] {
                    assert_eq!(dot(p, face.normal()), 1.0, "{face:?} corner off plane");
                }
            }
        }
    }

    #[test]
    fn each_face_covers_four_corners() {
        for face in Face::ALL {
            let mut corners: Vec<u32> = face_triangles(face).iter().flatten().copied().collect();
            corners.sort_unstable();
            corners.dedup();
            assert_eq!(corners.len(), 4, "{face:?}");
        }
    }

    #[test]
    fn narrow_indices_preserve_values() {
        let wide = IndexData::wide();
        let narrow = IndexData::narrow();
        assert_eq!(wide.to_u32(), narrow.to_u32());
        assert_eq!(wide.as_bytes().len(), 36 * 4);
        assert_eq!(narrow.as_bytes().len(), 36 * 2);
        assert_eq!(narrow.stride(), 2);
    }
}
