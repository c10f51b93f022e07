use vek::Vec3;

use crate::layout::{SourceLayout, SplatRecord, MAX_SH_REST};
use crate::morton::CompressedIndex;
use crate::spherical_harmonics::{ShBand, ShRotation};
use crate::splat_source::SplatSource;
use crate::support::to_u8;
use crate::transform::TransformResolver;

pub fn scene_sh_band(sources: &[SplatSource]) -> ShBand {
    sources
        .iter()
        .map(SplatSource::sh_band)
        .max()
        .unwrap_or_default()
}

/// Map a coefficient in roughly [-4, 4] to a byte.
pub fn quantize_sh_coeff(v: f32) -> u8 {
    to_u8(256.0 * (v / 8.0 + 0.5))
}

#[derive(Debug, Clone, Copy)]
pub struct ShQuantizer {
    band: ShBand,
}

impl ShQuantizer {
    pub fn new(band: ShBand) -> Self {
        Self { band }
    }

    pub fn band(&self) -> ShBand {
        self.band
    }

    pub fn bytes_per_splat(&self) -> usize {
        self.band.rest_count()
    }

    pub fn output_size(&self, num_splats: usize) -> usize {
        self.bytes_per_splat() * num_splats
    }

    /// Quantize one splat into `out`, red coefficients first, then green, then blue.
    /// Coefficients the record lacks are treated as zero.
    pub fn quantize_splat(
        &self,
        record: &SplatRecord,
        rotation: &ShRotation,
        tint: Vec3<f32>,
        out: &mut [u8],
    ) {
        let n = self.band.coeff_count();
        let mut coeffs = [0.0f32; MAX_SH_REST / 3];
        for channel in 0..3 {
            let coeffs = &mut coeffs[..n];
            record.sh_channel(channel, coeffs);
            for v in coeffs.iter_mut() {
                *v *= tint[channel];
            }
            rotation.apply(coeffs);
            for (dst, &v) in out[channel * n..(channel + 1) * n].iter_mut().zip(coeffs.iter()) {
                *dst = quantize_sh_coeff(v);
            }
        }
    }

    /// Quantize every splat of `indices`, in that order, into `out`, which must hold
    /// exactly [`Self::output_size`] bytes.
    pub fn quantize_scene(
        &self,
        sources: &[SplatSource],
        layouts: &[SourceLayout],
        resolvers: &mut [TransformResolver<'_>],
        indices: &[CompressedIndex],
        out: &mut [u8],
    ) {
        let stride = self.bytes_per_splat();
        debug_assert_eq!(out.len(), stride * indices.len());
        if stride == 0 {
            return;
        }
        for (index, dst) in indices.iter().zip(out.chunks_exact_mut(stride)) {
            let source = &sources[index.source_index];
            let record = layouts[index.source_index].read(source, index.local_index);
            let rotation = resolvers[index.source_index].sh_rotation(index.local_index);
            self.quantize_splat(&record, rotation, source.color_adjustment.sh_scale(), dst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color_adjust::ColorAdjustment;
    use crate::morton::collect_surviving;

    fn sh_source(num_splats: usize, rest: usize) -> SplatSource {
        let mut source = SplatSource::new(num_splats);
        for i in 0..rest {
            let values = (0..num_splats).map(|s| (s * 100 + i) as f32 * 0.01).collect();
            source = source.with_property(&format!("f_rest_{}", i), values).unwrap();
        }
        source
    }

    #[test]
    fn test_quantize_coeff() {
        assert_eq!(quantize_sh_coeff(0.0), 128);
        assert_eq!(quantize_sh_coeff(1.0), 160);
        assert_eq!(quantize_sh_coeff(-1.0), 96);
        assert_eq!(quantize_sh_coeff(4.0), 255);
        assert_eq!(quantize_sh_coeff(-4.0), 0);
        assert_eq!(quantize_sh_coeff(100.0), 255);
        assert_eq!(quantize_sh_coeff(-100.0), 0);
    }

    #[test]
    fn test_scene_band_is_maximum() {
        let sources = vec![sh_source(1, 9), sh_source(1, 45), sh_source(1, 0)];
        assert_eq!(scene_sh_band(&sources), ShBand::Band3);
        assert_eq!(scene_sh_band(&[]), ShBand::Band0);
    }

    #[test]
    fn test_channel_major_with_identity_rotation() {
        let source = sh_source(1, 9);
        let layout = SourceLayout::new(&source);
        let record = layout.read(&source, 0);
        let quantizer = ShQuantizer::new(ShBand::Band1);
        let mut out = [0u8; 9];
        quantizer.quantize_splat(&record, &ShRotation::identity(), Vec3::one(), &mut out);
        let expected: Vec<u8> = (0..9).map(|i| quantize_sh_coeff(i as f32 * 0.01)).collect();
        assert_eq!(out.to_vec(), expected);
    }

    #[test]
    fn test_lower_band_source_is_zero_padded() {
        let source = sh_source(1, 9);
        let layout = SourceLayout::new(&source);
        let record = layout.read(&source, 0);
        let quantizer = ShQuantizer::new(ShBand::Band2);
        let mut out = [0u8; 24];
        quantizer.quantize_splat(&record, &ShRotation::identity(), Vec3::one(), &mut out);
        // Green channel: three real coefficients then five zeros.
        assert_eq!(out[8..11], [3, 4, 5].map(|i| quantize_sh_coeff(i as f32 * 0.01)));
        assert_eq!(out[11..16], [128; 5]);
    }

    #[test]
    fn test_tint_applies_per_channel() {
        let mut source = SplatSource::new(1);
        for i in 0..9 {
            source = source.with_property(&format!("f_rest_{}", i), vec![1.0]).unwrap();
        }
        let layout = SourceLayout::new(&source);
        let record = layout.read(&source, 0);
        let quantizer = ShQuantizer::new(ShBand::Band1);
        let mut out = [0u8; 9];
        let tint = ColorAdjustment {
            tint: [0.0, 1.0, 2.0],
            ..Default::default()
        }
        .sh_scale();
        quantizer.quantize_splat(&record, &ShRotation::identity(), tint, &mut out);
        assert_eq!(out, [128, 128, 128, 160, 160, 160, 192, 192, 192]);
    }

    #[test]
    fn test_scene_applies_axis_correction() {
        let mut source = SplatSource::new(2);
        for i in 0..24 {
            source = source.with_property(&format!("f_rest_{}", i), vec![0.0, 0.0]).unwrap();
        }
        // Band 1 of the red channel for splat 1.
        source.properties[0].1[1] = 1.0;
        source.properties[1].1[1] = 1.0;
        source.properties[2].1[1] = 1.0;

        let sources = vec![source];
        let layouts: Vec<_> = sources.iter().map(SourceLayout::new).collect();
        let mut resolvers: Vec<_> = sources.iter().map(TransformResolver::new).collect();
        let indices = collect_surviving(&sources);
        let quantizer = ShQuantizer::new(scene_sh_band(&sources));
        assert_eq!(quantizer.bytes_per_splat(), 24);

        let mut out = vec![0u8; quantizer.output_size(indices.len())];
        quantizer.quantize_scene(&sources, &layouts, &mut resolvers, &indices, &mut out);
        assert!(out[..24].iter().all(|&b| b == 128));
        // Half turn about z flips the first and third band 1 terms.
        assert_eq!(out[24..27], [96, 160, 96]);
    }

    #[test]
    fn test_unrecognised_sh_count_quantizes_as_zero() {
        let mut banded = SplatSource::new(1);
        for i in 0..9 {
            banded = banded.with_property(&format!("f_rest_{}", i), vec![0.0]).unwrap();
        }
        let mut odd = SplatSource::new(1);
        for i in 0..12 {
            odd = odd.with_property(&format!("f_rest_{}", i), vec![2.0]).unwrap();
        }

        let sources = vec![banded, odd];
        let layouts: Vec<_> = sources.iter().map(SourceLayout::new).collect();
        let mut resolvers: Vec<_> = sources.iter().map(TransformResolver::new).collect();
        let indices = collect_surviving(&sources);
        let quantizer = ShQuantizer::new(scene_sh_band(&sources));
        assert_eq!(quantizer.band(), ShBand::Band1);

        let mut out = vec![0u8; quantizer.output_size(indices.len())];
        quantizer.quantize_scene(&sources, &layouts, &mut resolvers, &indices, &mut out);
        assert_eq!(out, vec![128u8; 18]);
    }
}
