use bytemuck::{Pod, Zeroable};
use log::{debug, info, warn};

use crate::error::{ExportSummary, Result};
use crate::export::validate_for_export;
use crate::layout::{ColorParts, SourceLayout, TransformParts};
use crate::sink::Sink;
use crate::splat_source::{count_surviving, SplatSource};
use crate::support::{sh0_to_linear, sigmoid, to_u8};
use crate::transform::TransformResolver;

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct CompactSplat {
    pub position: [f32; 3],
    /// Linear scale, not log.
    pub scale: [f32; 3],
    /// RGB from the DC term, then opacity.
    pub color: [u8; 4],
    /// w, x, y, z mapped from [-1, 1] to bytes.
    pub rotation: [u8; 4],
}

pub const COMPACT_SPLAT_SIZE: usize = std::mem::size_of::<CompactSplat>();

fn le(v: f32) -> f32 {
    f32::from_bits(v.to_bits().to_le())
}

impl CompactSplat {
    fn to_le(self) -> Self {
        Self {
            position: self.position.map(le),
            scale: self.scale.map(le),
            ..self
        }
    }
}

fn quaternion_byte(v: f32) -> u8 {
    to_u8(v * 128.0 + 128.0)
}

pub fn splat_output_size(sources: &[SplatSource]) -> usize {
    count_surviving(sources) * COMPACT_SPLAT_SIZE
}

/// Write every surviving splat as a 32-byte record in one final sink call.
pub fn write_splat<S: Sink + ?Sized>(sources: &[SplatSource], sink: &mut S) -> Result<ExportSummary> {
    validate_for_export(sources)?;

    let num_splats = count_surviving(sources);
    if num_splats == 0 {
        warn!("Nothing to export: every splat is deleted");
        return Ok(ExportSummary::NothingToExport);
    }
    debug!("splat export: {} splats", num_splats);

    let mut buffer = Vec::with_capacity(num_splats * COMPACT_SPLAT_SIZE);
    for (source_index, source) in sources.iter().enumerate() {
        if source.num_surviving() == 0 {
            warn!("Skipping source {}: every splat is deleted", source_index);
            continue;
        }
        let layout = SourceLayout::new(source);
        let mut resolver = TransformResolver::new(source);
        for index in source.surviving_indices() {
            let entry = resolver.entry(index);
            let mut record = layout.read(source, index);
            record.transform(
                entry,
                TransformParts {
                    scale: false,
                    ..TransformParts::GEOMETRY
                },
            );
            record.adjust_color(&source.color_adjustment, ColorParts::DC_AND_OPACITY);

            // Every axis takes the transform's x scale.
            let scale = record.log_scale.map(|s| s.exp() * entry.scale.x);
            let rotation = record.rotation.normalized();
            let splat = CompactSplat {
                position: record.position.into_array(),
                scale: scale.into_array(),
                color: [
                    to_u8(255.0 * sh0_to_linear(record.color.x)),
                    to_u8(255.0 * sh0_to_linear(record.color.y)),
                    to_u8(255.0 * sh0_to_linear(record.color.z)),
                    to_u8(255.0 * sigmoid(record.opacity)),
                ],
                rotation: [rotation.w, rotation.x, rotation.y, rotation.z].map(quaternion_byte),
            };
            buffer.extend_from_slice(bytemuck::bytes_of(&splat.to_le()));
        }
    }

    sink.write(&buffer, true)?;
    info!("Exported {} splats as splat ({} bytes)", num_splats, buffer.len());
    Ok(ExportSummary::Written {
        splats: num_splats,
        bytes: buffer.len(),
    })
}
