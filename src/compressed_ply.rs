use log::{debug, info, warn};
use ply_rs::ply::ScalarType;
use vek::Vec3;

use crate::chunk::{Chunk, ChunkRanges, PackedSplat, CHUNK_PROPERTIES, CHUNK_SIZE, VERTEX_PROPERTIES};
use crate::error::{ExportSummary, Result};
use crate::export::{validate_for_export, ExportOptions};
use crate::layout::{ColorParts, SourceLayout, TransformParts};
use crate::morton::{collect_surviving, sort_by_morton, CompressedIndex};
use crate::ply_format::{add_element, new_header, render_header};
use crate::sh_quantizer::{scene_sh_band, ShQuantizer};
use crate::sink::Sink;
use crate::spherical_harmonics::ShBand;
use crate::splat_source::SplatSource;
use crate::transform::{render_transform, transform_point, TransformResolver};

const CHUNK_BYTES: usize = std::mem::size_of::<ChunkRanges>();
const SPLAT_BYTES: usize = std::mem::size_of::<PackedSplat>();

/// SH band written for a scene, after applying the configured cap.
pub fn compressed_sh_band(sources: &[SplatSource], options: &ExportOptions) -> ShBand {
    let band = scene_sh_band(sources);
    match options.max_sh_band {
        Some(max) => band.min(ShBand::from_index(max.min(3)).unwrap_or_default()),
        None => band,
    }
}

pub fn compressed_header(num_splats: usize, band: ShBand, options: &ExportOptions) -> String {
    let mut header = new_header(options);
    add_element(
        &mut header,
        "chunk",
        num_splats.div_ceil(CHUNK_SIZE),
        CHUNK_PROPERTIES.iter().map(|&p| (p, ScalarType::Float)),
    );
    add_element(
        &mut header,
        "vertex",
        num_splats,
        VERTEX_PROPERTIES.iter().map(|&p| (p, ScalarType::UInt)),
    );
    if band != ShBand::Band0 {
        let names: Vec<String> = (0..band.rest_count()).map(|i| format!("f_rest_{}", i)).collect();
        add_element(
            &mut header,
            "sh",
            num_splats,
            names.iter().map(|p| (p.as_str(), ScalarType::UChar)),
        );
    }
    render_header(&header)
}

/// Exact size of the compressed output, 0 when every splat is deleted.
pub fn compressed_output_size(sources: &[SplatSource], options: &ExportOptions) -> usize {
    let num_splats = crate::splat_source::count_surviving(sources);
    if num_splats == 0 {
        return 0;
    }
    let band = compressed_sh_band(sources, options);
    compressed_header(num_splats, band, options).len()
        + num_splats.div_ceil(CHUNK_SIZE) * CHUNK_BYTES
        + num_splats * SPLAT_BYTES
        + ShQuantizer::new(band).output_size(num_splats)
}

/// World-space centers the scene is rendered with, indexed by global index.
fn render_centers(sources: &[SplatSource], indices: &[CompressedIndex]) -> Vec<Vec3<f32>> {
    let positions: Vec<Option<[&[f32]; 3]>> = sources
        .iter()
        .map(|s| Some([s.property("x")?, s.property("y")?, s.property("z")?]))
        .collect();

    indices
        .iter()
        .map(|index| {
            let source = &sources[index.source_index];
            let i = index.local_index;
            if let Some(centers) = &source.centers {
                return centers[i];
            }
            match positions[index.source_index] {
                Some([x, y, z]) => transform_point(
                    &render_transform(source, source.palette_index(i)),
                    Vec3::new(x[i], y[i], z[i]),
                ),
                None => Vec3::zero(),
            }
        })
        .collect()
}

fn write_le_words<T: bytemuck::Pod>(values: &[T], dst: &mut [u8]) {
    let words: &[u32] = bytemuck::cast_slice(values);
    for (out, word) in dst.chunks_exact_mut(4).zip(words) {
        out.copy_from_slice(&word.to_le_bytes());
    }
}

/// Sort, quantize and pack every surviving splat into one buffer and hand it to the sink in
/// a single final write.
pub fn write_compressed_ply<S: Sink + ?Sized>(
    sources: &[SplatSource],
    options: &ExportOptions,
    sink: &mut S,
) -> Result<ExportSummary> {
    validate_for_export(sources)?;

    let mut indices = collect_surviving(sources);
    if indices.is_empty() {
        warn!("Nothing to export: every splat is deleted");
        return Ok(ExportSummary::NothingToExport);
    }
    let num_splats = indices.len();
    let num_chunks = num_splats.div_ceil(CHUNK_SIZE);

    let centers = render_centers(sources, &indices);
    sort_by_morton(&mut indices, &centers);

    let layouts: Vec<SourceLayout> = sources.iter().map(SourceLayout::new).collect();
    let mut resolvers: Vec<TransformResolver> = sources.iter().map(TransformResolver::new).collect();

    let band = compressed_sh_band(sources, options);
    let quantizer = ShQuantizer::new(band);
    let header = compressed_header(num_splats, band, options);
    let total = header.len()
        + num_chunks * CHUNK_BYTES
        + num_splats * SPLAT_BYTES
        + quantizer.output_size(num_splats);
    debug!(
        "compressed export: {} splats, {} chunks, sh band {}, {} bytes",
        num_splats,
        num_chunks,
        band.index(),
        total
    );

    let mut buffer = vec![0u8; total];
    let (header_region, body) = buffer.split_at_mut(header.len());
    header_region.copy_from_slice(header.as_bytes());
    let (chunk_region, body) = body.split_at_mut(num_chunks * CHUNK_BYTES);
    let (vertex_region, sh_region) = body.split_at_mut(num_splats * SPLAT_BYTES);

    quantizer.quantize_scene(sources, &layouts, &mut resolvers, &indices, sh_region);

    let mut chunk = Chunk::new();
    for (block, ranges_dst, splats_dst) in itertools::izip!(
        indices.chunks(CHUNK_SIZE),
        chunk_region.chunks_exact_mut(CHUNK_BYTES),
        vertex_region.chunks_mut(CHUNK_SIZE * SPLAT_BYTES)
    ) {
        chunk.clear();
        for index in block {
            let source = &sources[index.source_index];
            let mut record = layouts[index.source_index].read(source, index.local_index);
            record.transform(
                resolvers[index.source_index].entry(index.local_index),
                TransformParts::GEOMETRY,
            );
            record.adjust_color(&source.color_adjustment, ColorParts::DC_AND_OPACITY);
            chunk.push(&record);
        }
        let packed = chunk.pack();
        write_le_words(std::slice::from_ref(&packed.ranges), ranges_dst);
        write_le_words(&packed.splats, splats_dst);
    }

    sink.write(&buffer, true)?;
    info!("Exported {} splats as compressed ply ({} bytes)", num_splats, total);
    Ok(ExportSummary::Written {
        splats: num_splats,
        bytes: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::tests::Lcg;
    use crate::sink::tests::RecordingSink;
    use crate::splat_source::STATE_DELETED;
    use approx::assert_relative_eq;
    use ply_rs::parser::Parser;
    use ply_rs::ply::{DefaultElement, Ply, Property, PropertyType};

    fn parse(bytes: &[u8]) -> Ply<DefaultElement> {
        let mut reader = std::io::BufReader::new(bytes);
        Parser::<DefaultElement>::new().read_ply(&mut reader).unwrap()
    }

    fn uint(element: &DefaultElement, name: &str) -> u32 {
        match element[name] {
            Property::UInt(v) => v,
            ref other => panic!("unexpected property {:?}", other),
        }
    }

    fn float(element: &DefaultElement, name: &str) -> f32 {
        match element[name] {
            Property::Float(v) => v,
            ref other => panic!("unexpected property {:?}", other),
        }
    }

    fn random_source(n: usize, sh_rest: usize, seed: u64) -> SplatSource {
        let mut rng = Lcg(seed);
        let mut source = SplatSource::new(n);
        let mut names: Vec<String> = [
            "x", "y", "z", "scale_0", "scale_1", "scale_2", "rot_0", "rot_1", "rot_2", "rot_3",
            "f_dc_0", "f_dc_1", "f_dc_2", "opacity",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        names.extend((0..sh_rest).map(|i| format!("f_rest_{}", i)));
        for name in &names {
            let values = (0..n).map(|_| rng.range(-2.0, 2.0)).collect();
            source = source.with_property(name, values).unwrap();
        }
        source
    }

    #[test]
    fn test_300_splats_make_two_chunks() {
        let sources = vec![random_source(300, 0, 7)];
        let mut output = Vec::new();
        let summary = write_compressed_ply(&sources, &ExportOptions::default(), &mut output).unwrap();
        assert_eq!(summary, ExportSummary::Written { splats: 300, bytes: output.len() });
        assert_eq!(output.len(), compressed_output_size(&sources, &ExportOptions::default()));

        let text = String::from_utf8_lossy(&output);
        assert!(text.contains("element chunk 2\n"));
        assert!(text.contains("element vertex 300\n"));
        assert!(!text.contains("element sh"));

        let ply = parse(&output);
        assert_eq!(ply.payload["chunk"].len(), 2);
        assert_eq!(ply.payload["vertex"].len(), 300);
        let chunk = &ply.header.elements["chunk"];
        let names: Vec<_> = chunk.properties.keys().cloned().collect();
        assert_eq!(names, CHUNK_PROPERTIES.map(String::from).to_vec());
    }

    #[test]
    fn test_sh_element_follows_scene_band() {
        let sources = vec![random_source(10, 24, 3), random_source(5, 9, 4)];
        let mut output = Vec::new();
        write_compressed_ply(&sources, &ExportOptions::default(), &mut output).unwrap();
        let ply = parse(&output);
        let sh = &ply.header.elements["sh"];
        assert_eq!(sh.count, 15);
        assert_eq!(sh.properties.len(), 24);
        assert!(sh
            .properties
            .values()
            .all(|p| p.data_type == PropertyType::Scalar(ScalarType::UChar)));
        assert_eq!(ply.payload["sh"].len(), 15);
        assert_eq!(output.len(), compressed_output_size(&sources, &ExportOptions::default()));
    }

    #[test]
    fn test_max_band_caps_sh() {
        let sources = vec![random_source(10, 45, 5)];
        let options = ExportOptions {
            max_sh_band: Some(1),
            ..Default::default()
        };
        let mut output = Vec::new();
        write_compressed_ply(&sources, &options, &mut output).unwrap();
        assert_eq!(parse(&output).header.elements["sh"].properties.len(), 9);

        let options = ExportOptions {
            max_sh_band: Some(0),
            ..Default::default()
        };
        let mut output = Vec::new();
        write_compressed_ply(&sources, &options, &mut output).unwrap();
        assert!(!parse(&output).header.elements.contains_key("sh"));
    }

    #[test]
    fn test_all_deleted_writes_nothing() {
        let source = random_source(4, 0, 1).with_state(vec![STATE_DELETED; 4]).unwrap();
        let mut sink = RecordingSink::default();
        let summary = write_compressed_ply(&[source], &ExportOptions::default(), &mut sink).unwrap();
        assert_eq!(summary, ExportSummary::NothingToExport);
        assert!(sink.calls.is_empty());
    }

    #[test]
    fn test_single_final_write() {
        let sources = vec![random_source(600, 9, 11)];
        let mut sink = RecordingSink::default();
        write_compressed_ply(&sources, &ExportOptions::default(), &mut sink).unwrap();
        assert_eq!(sink.calls.len(), 1);
        assert!(sink.calls[0].1);
    }

    #[test]
    fn test_packed_positions_and_ranges() {
        let mut source = SplatSource::new(2);
        for (name, values) in [("x", [1.0, 0.0]), ("y", [2.0, 0.0]), ("z", [3.0, 0.0])] {
            source = source.with_property(name, values.to_vec()).unwrap();
        }
        let mut output = Vec::new();
        write_compressed_ply(&[source], &ExportOptions::default(), &mut output).unwrap();
        let ply = parse(&output);

        let chunk = &ply.payload["chunk"][0];
        for (name, expected) in [
            ("min_x", -1.0),
            ("min_y", -2.0),
            ("min_z", 0.0),
            ("max_x", 0.0),
            ("max_y", 0.0),
            ("max_z", 3.0),
        ] {
            assert_relative_eq!(float(chunk, name), expected);
        }

        // The origin sorts first; after the half turn it sits at the x/y maxima.
        let vertices = &ply.payload["vertex"];
        assert_eq!(uint(&vertices[0], "packed_position"), (2047 << 21) | (1023 << 11));
        assert_eq!(uint(&vertices[1], "packed_position"), 2047);
    }

    #[test]
    fn test_sort_uses_render_centers() {
        let mut source = SplatSource::new(2);
        for name in ["x", "y", "z"] {
            source = source.with_property(name, vec![0.0, 1.0]).unwrap();
        }
        let source = source
            .with_centers(vec![Vec3::new(1.0, 1.0, 1.0), Vec3::zero()])
            .unwrap();
        let mut output = Vec::new();
        write_compressed_ply(&[source], &ExportOptions::default(), &mut output).unwrap();
        let ply = parse(&output);
        // Splat 1 renders at the origin so it is written first; it holds the chunk maximum z.
        let vertices = &ply.payload["vertex"];
        assert_eq!(uint(&vertices[0], "packed_position") & 0x7ff, 2047);
        assert_eq!(uint(&vertices[1], "packed_position") & 0x7ff, 0);
    }
}
