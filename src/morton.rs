use vek::Vec3;

use crate::splat_source::SplatSource;

/// One surviving splat: where it comes from and its position in pre-sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedIndex {
    pub source_index: usize,
    pub local_index: usize,
    /// Sequential index across all sources before sorting; keys per-splat scratch arrays.
    pub global_index: usize,
}

pub fn collect_surviving(sources: &[SplatSource]) -> Vec<CompressedIndex> {
    let mut indices = Vec::with_capacity(crate::splat_source::count_surviving(sources));
    for (source_index, source) in sources.iter().enumerate() {
        for local_index in source.surviving_indices() {
            indices.push(CompressedIndex {
                source_index,
                local_index,
                global_index: indices.len(),
            });
        }
    }
    indices
}

/// Spread the low 10 bits of `x` so there are two zero bits between each.
fn part1by2(x: u32) -> u32 {
    let mut x = x & 0x0000_03ff;
    x = (x ^ (x << 16)) & 0xff00_00ff;
    x = (x ^ (x << 8)) & 0x0300_f00f;
    x = (x ^ (x << 4)) & 0x030c_30c3;
    x = (x ^ (x << 2)) & 0x0924_9249;
    x
}

/// 30-bit Morton code of three 10-bit coordinates.
pub fn encode_morton3(x: u32, y: u32, z: u32) -> u32 {
    (part1by2(z) << 2) | (part1by2(y) << 1) | part1by2(x)
}

const GRID: f32 = 1024.0;

fn quantize_axis(v: f32, min: f32, extent: f32) -> u32 {
    if extent <= 0.0 || !extent.is_finite() {
        return 0;
    }
    ((GRID * (v - min) / extent).floor()).clamp(0.0, GRID - 1.0) as u32
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3<f32>,
    pub max: Vec3<f32>,
}

impl BoundingBox {
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3<f32>>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = *points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| {
            (Vec3::partial_min(min, *p), Vec3::partial_max(max, *p))
        });
        Some(Self { min, max })
    }

    pub fn extent(&self) -> Vec3<f32> {
        self.max - self.min
    }

    /// Morton code of `p` on a 1024^3 grid spanning the box. Flat axes map to 0.
    pub fn morton_code(&self, p: Vec3<f32>) -> u32 {
        let extent = self.extent();
        encode_morton3(
            quantize_axis(p.x, self.min.x, extent.x),
            quantize_axis(p.y, self.min.y, extent.y),
            quantize_axis(p.z, self.min.z, extent.z),
        )
    }
}

/// Reorder `indices` along a Z-order curve through `centers`, which is indexed by
/// [`CompressedIndex::global_index`]. Equal codes keep pre-sort order.
pub fn sort_by_morton(indices: &mut [CompressedIndex], centers: &[Vec3<f32>]) {
    let Some(bounds) = BoundingBox::from_points(indices.iter().map(|i| &centers[i.global_index])) else {
        return;
    };
    let codes: Vec<u32> = centers.iter().map(|&c| bounds.morton_code(c)).collect();
    indices.sort_unstable_by_key(|i| (codes[i.global_index], i.global_index));
}
