use bytemuck::{Pod, Zeroable};
use std::f32::consts::FRAC_1_SQRT_2;
use vek::{Quaternion, Vec3};

use crate::layout::SplatRecord;
use crate::support::{pack_unorm, sh0_to_linear, sigmoid};

pub const CHUNK_SIZE: usize = 256;

/// Ranges narrower than this quantize every value to 0.
const MIN_RANGE: f32 = 1e-5;

/// Dequantization ranges of one chunk, in the order they are written.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ChunkRanges {
    pub min_position: [f32; 3],
    pub max_position: [f32; 3],
    pub min_scale: [f32; 3],
    pub max_scale: [f32; 3],
    pub min_color: [f32; 3],
    pub max_color: [f32; 3],
}

pub const CHUNK_PROPERTIES: [&str; 18] = [
    "min_x",
    "min_y",
    "min_z",
    "max_x",
    "max_y",
    "max_z",
    "min_scale_x",
    "min_scale_y",
    "min_scale_z",
    "max_scale_x",
    "max_scale_y",
    "max_scale_z",
    "min_r",
    "min_g",
    "min_b",
    "max_r",
    "max_g",
    "max_b",
];

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct PackedSplat {
    pub position: u32,
    pub rotation: u32,
    pub scale: u32,
    pub color: u32,
}

pub const VERTEX_PROPERTIES: [&str; 4] = [
    "packed_position",
    "packed_rotation",
    "packed_scale",
    "packed_color",
];

#[derive(Debug, Clone, PartialEq)]
pub struct PackedChunk {
    pub ranges: ChunkRanges,
    pub splats: Vec<PackedSplat>,
}

fn bounds(values: &[Vec3<f32>]) -> (Vec3<f32>, Vec3<f32>) {
    let mut min = Vec3::broadcast(f32::INFINITY);
    let mut max = Vec3::broadcast(f32::NEG_INFINITY);
    for &v in values {
        min = Vec3::partial_min(min, v);
        max = Vec3::partial_max(max, v);
    }
    (min, max)
}

fn normalize(v: f32, min: f32, max: f32) -> f32 {
    let range = max - min;
    // Also catches NaN ranges.
    if !(range >= MIN_RANGE) {
        return 0.0;
    }
    (v - min) / range
}

fn normalize3(v: Vec3<f32>, min: Vec3<f32>, max: Vec3<f32>) -> Vec3<f32> {
    Vec3::new(
        normalize(v.x, min.x, max.x),
        normalize(v.y, min.y, max.y),
        normalize(v.z, min.z, max.z),
    )
}

/// 11/10/11 bits for x/y/z.
fn pack_111011(v: Vec3<f32>) -> u32 {
    (pack_unorm(v.x, 11) << 21) | (pack_unorm(v.y, 10) << 11) | pack_unorm(v.z, 11)
}

fn pack_8888(r: f32, g: f32, b: f32, a: f32) -> u32 {
    (pack_unorm(r, 8) << 24) | (pack_unorm(g, 8) << 16) | (pack_unorm(b, 8) << 8) | pack_unorm(a, 8)
}

/// Smallest-three quaternion encoding: 2 bits naming the largest of (w, x, y, z), then the
/// other three in that order, 10 bits each.
pub fn pack_rotation(q: Quaternion<f32>) -> u32 {
    let magnitude = q.magnitude();
    let q = if magnitude > 0.0 && magnitude.is_finite() {
        q.normalized()
    } else {
        Quaternion::identity()
    };
    let components = [q.w, q.x, q.y, q.z];

    let mut largest = 0;
    for i in 1..4 {
        if components[i].abs() > components[largest].abs() {
            largest = i;
        }
    }
    let sign = if components[largest] < 0.0 { -1.0 } else { 1.0 };

    let mut result = largest as u32;
    for (i, &c) in components.iter().enumerate() {
        if i != largest {
            result = (result << 10) | pack_unorm(c * sign * FRAC_1_SQRT_2 + 0.5, 10);
        }
    }
    result
}

#[derive(Debug, Clone, Default)]
pub struct Chunk {
    position: Vec<Vec3<f32>>,
    scale: Vec<Vec3<f32>>,
    color: Vec<Vec3<f32>>,
    opacity: Vec<f32>,
    rotation: Vec<Quaternion<f32>>,
}

impl Chunk {
    pub fn new() -> Self {
        Self {
            position: Vec::with_capacity(CHUNK_SIZE),
            scale: Vec::with_capacity(CHUNK_SIZE),
            color: Vec::with_capacity(CHUNK_SIZE),
            opacity: Vec::with_capacity(CHUNK_SIZE),
            rotation: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    pub fn clear(&mut self) {
        self.position.clear();
        self.scale.clear();
        self.color.clear();
        self.opacity.clear();
        self.rotation.clear();
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= CHUNK_SIZE
    }

    pub fn push(&mut self, record: &SplatRecord) {
        debug_assert!(!self.is_full());
        self.position.push(record.position);
        self.scale.push(record.log_scale);
        self.color.push(record.color.map(sh0_to_linear));
        self.opacity.push(sigmoid(record.opacity));
        self.rotation.push(record.rotation);
    }

    /// Quantize the buffered splats. Pure in the buffer contents.
    pub fn pack(&self) -> PackedChunk {
        let (min_position, max_position) = bounds(&self.position);
        let (min_scale, max_scale) = bounds(&self.scale);
        let (min_color, max_color) = bounds(&self.color);

        let splats = itertools::izip!(
            &self.position,
            &self.scale,
            &self.color,
            &self.opacity,
            &self.rotation
        )
        .map(|(&position, &scale, &color, &opacity, &rotation)| {
            let color = normalize3(color, min_color, max_color);
            PackedSplat {
                position: pack_111011(normalize3(position, min_position, max_position)),
                rotation: pack_rotation(rotation),
                scale: pack_111011(normalize3(scale, min_scale, max_scale)),
                color: pack_8888(color.x, color.y, color.z, opacity),
            }
        })
        .collect();

        PackedChunk {
            ranges: ChunkRanges {
                min_position: min_position.into_array(),
                max_position: max_position.into_array(),
                min_scale: min_scale.into_array(),
                max_scale: max_scale.into_array(),
                min_color: min_color.into_array(),
                max_color: max_color.into_array(),
            },
            splats,
        }
    }
}
