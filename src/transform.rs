use std::collections::HashMap;

use vek::{Mat4, Quaternion, Vec3};

use crate::spherical_harmonics::ShRotation;
use crate::splat_source::SplatSource;

/// Half turn about Z, undoing the orientation applied to scenes when they are loaded.
pub fn axis_correction() -> Mat4<f32> {
    Mat4::new(
        -1.0, 0.0, 0.0, 0.0, //
        0.0, -1.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0, 1.0,
    )
}

pub fn transform_point(matrix: &Mat4<f32>, p: Vec3<f32>) -> Vec3<f32> {
    let m = matrix.into_row_arrays();
    let row = |r: usize| m[r][0] * p.x + m[r][1] * p.y + m[r][2] * p.z + m[r][3];
    Vec3::new(row(0), row(1), row(2))
}

/// Entity transform composed with the splat's palette transform, before axis correction.
pub fn render_transform(source: &SplatSource, palette_index: u32) -> Mat4<f32> {
    match source
        .palette
        .as_ref()
        .and_then(|p| p.transforms.get(palette_index as usize))
    {
        Some(t) if palette_index > 0 => source.transform * *t,
        _ => source.transform,
    }
}

/// Shepperd's method on a row-major orthonormal 3x3 matrix.
pub fn quaternion_from_rotation(m: &[[f32; 3]; 3]) -> Quaternion<f32> {
    let trace = m[0][0] + m[1][1] + m[2][2];
    let q = if trace > 0.0 {
        let s = (trace + 1.0).sqrt() * 2.0;
        Quaternion::from_xyzw(
            (m[2][1] - m[1][2]) / s,
            (m[0][2] - m[2][0]) / s,
            (m[1][0] - m[0][1]) / s,
            0.25 * s,
        )
    } else if m[0][0] > m[1][1] && m[0][0] > m[2][2] {
        let s = (1.0 + m[0][0] - m[1][1] - m[2][2]).sqrt() * 2.0;
        Quaternion::from_xyzw(
            0.25 * s,
            (m[0][1] + m[1][0]) / s,
            (m[0][2] + m[2][0]) / s,
            (m[2][1] - m[1][2]) / s,
        )
    } else if m[1][1] > m[2][2] {
        let s = (1.0 + m[1][1] - m[0][0] - m[2][2]).sqrt() * 2.0;
        Quaternion::from_xyzw(
            (m[0][1] + m[1][0]) / s,
            0.25 * s,
            (m[1][2] + m[2][1]) / s,
            (m[0][2] - m[2][0]) / s,
        )
    } else {
        let s = (1.0 + m[2][2] - m[0][0] - m[1][1]).sqrt() * 2.0;
        Quaternion::from_xyzw(
            (m[0][2] + m[2][0]) / s,
            (m[1][2] + m[2][1]) / s,
            0.25 * s,
            (m[1][0] - m[0][1]) / s,
        )
    };
    q.normalized()
}

#[derive(Debug, Clone)]
pub struct TransformEntry {
    pub matrix: Mat4<f32>,
    pub rotation: Quaternion<f32>,
    pub scale: Vec3<f32>,
    pub sh_rotation: ShRotation,
}

impl TransformEntry {
    pub fn new(matrix: Mat4<f32>) -> Self {
        let m = matrix.into_row_arrays();
        let column = |c: usize| Vec3::new(m[0][c], m[1][c], m[2][c]);
        let mut scale = Vec3::new(
            column(0).magnitude(),
            column(1).magnitude(),
            column(2).magnitude(),
        );
        let det = column(0).cross(column(1)).dot(column(2));
        if det < 0.0 {
            scale.x = -scale.x;
        }

        let axis = |s: f32| if s == 0.0 { 0.0 } else { 1.0 / s };
        let inv = [axis(scale.x), axis(scale.y), axis(scale.z)];
        let basis: [[f32; 3]; 3] = std::array::from_fn(|r| std::array::from_fn(|c| m[r][c] * inv[c]));

        Self {
            matrix,
            rotation: quaternion_from_rotation(&basis),
            scale,
            sh_rotation: ShRotation::new(basis),
        }
    }

    pub fn transform_point(&self, p: Vec3<f32>) -> Vec3<f32> {
        transform_point(&self.matrix, p)
    }
}

/// Memoizes one [`TransformEntry`] per palette index of a source for the life of an export.
pub struct TransformResolver<'a> {
    source: &'a SplatSource,
    cache: HashMap<u32, TransformEntry>,
}

impl<'a> TransformResolver<'a> {
    pub fn new(source: &'a SplatSource) -> Self {
        Self {
            source,
            cache: HashMap::new(),
        }
    }

    pub fn entry(&mut self, index: usize) -> &TransformEntry {
        let source = self.source;
        let palette_index = source.palette_index(index);
        self.cache.entry(palette_index).or_insert_with(|| {
            TransformEntry::new(axis_correction() * render_transform(source, palette_index))
        })
    }

    pub fn matrix(&mut self, index: usize) -> Mat4<f32> {
        self.entry(index).matrix
    }

    pub fn rotation(&mut self, index: usize) -> Quaternion<f32> {
        self.entry(index).rotation
    }

    pub fn scale(&mut self, index: usize) -> Vec3<f32> {
        self.entry(index).scale
    }

    pub fn sh_rotation(&mut self, index: usize) -> &ShRotation {
        &self.entry(index).sh_rotation
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
