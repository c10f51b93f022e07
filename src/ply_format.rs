use log::{debug, info, warn};
use ply_rs::ply::{Addable, ElementDef, Encoding, Header, PropertyDef, PropertyType, ScalarType};

use crate::error::{ExportSummary, Result};
use crate::export::{validate_for_export, ExportOptions};
use crate::layout::{ColorParts, Slot, SourceLayout, TransformParts, MAX_SH_REST};
use crate::sink::{BufferedSink, Sink};
use crate::splat_source::{count_surviving, SplatSource};
use crate::transform::TransformResolver;

/// Bookkeeping properties that never leave the editor.
const INTERNAL_PROPERTIES: [&str; 2] = ["state", "transform"];

pub(crate) fn new_header(options: &ExportOptions) -> Header {
    let mut header = Header::new();
    header.encoding = Encoding::BinaryLittleEndian;
    header.comments = options.comments.clone();
    header
}

pub(crate) fn add_element<'a>(
    header: &mut Header,
    name: &str,
    count: usize,
    properties: impl IntoIterator<Item = (&'a str, ScalarType)>,
) {
    let mut element = ElementDef::new(name.to_string());
    element.count = count;
    for (property, scalar) in properties {
        element
            .properties
            .add(PropertyDef::new(property.to_string(), PropertyType::Scalar(scalar)));
    }
    header.elements.add(element);
}

fn scalar_name(scalar: &ScalarType) -> &'static str {
    match scalar {
        ScalarType::Char => "char",
        ScalarType::UChar => "uchar",
        ScalarType::Short => "short",
        ScalarType::UShort => "ushort",
        ScalarType::Int => "int",
        ScalarType::UInt => "uint",
        ScalarType::Float => "float",
        ScalarType::Double => "double",
    }
}

/// Render the ASCII header, `end_header` line included.
pub(crate) fn render_header(header: &Header) -> String {
    let mut text = String::from("ply\nformat binary_little_endian 1.0\n");
    for comment in &header.comments {
        text.push_str(&format!("comment {}\n", comment));
    }
    for (_, element) in &header.elements {
        text.push_str(&format!("element {} {}\n", element.name, element.count));
        for (_, property) in &element.properties {
            let line = match &property.data_type {
                PropertyType::Scalar(scalar) => {
                    format!("property {} {}\n", scalar_name(scalar), property.name)
                }
                PropertyType::List(index, scalar) => format!(
                    "property list {} {} {}\n",
                    scalar_name(index),
                    scalar_name(scalar),
                    property.name
                ),
            };
            text.push_str(&line);
        }
    }
    text.push_str("end_header\n");
    text
}

/// Property names every source carries, in the first source's order.
pub fn common_properties(sources: &[SplatSource]) -> Vec<String> {
    let Some((first, rest)) = sources.split_first() else {
        return Vec::new();
    };
    first
        .property_names()
        .filter(|name| !INTERNAL_PROPERTIES.contains(name))
        .filter(|name| rest.iter().all(|s| s.has_property(name)))
        .map(str::to_string)
        .collect()
}

pub fn ply_header(properties: &[String], num_splats: usize, options: &ExportOptions) -> String {
    let mut header = new_header(options);
    add_element(
        &mut header,
        "vertex",
        num_splats,
        properties.iter().map(|p| (p.as_str(), ScalarType::Float)),
    );
    render_header(&header)
}

/// Exact size of the plain output.
pub fn ply_output_size(sources: &[SplatSource], options: &ExportOptions) -> usize {
    let properties = common_properties(sources);
    let num_splats = count_surviving(sources);
    ply_header(&properties, num_splats, options).len() + num_splats * properties.len() * 4
}

/// Stream every surviving splat as little-endian float records of the common properties.
pub fn write_ply<S: Sink + ?Sized>(
    sources: &[SplatSource],
    options: &ExportOptions,
    sink: &mut S,
) -> Result<ExportSummary> {
    validate_for_export(sources)?;

    let properties = common_properties(sources);
    let num_splats = count_surviving(sources);
    let header = ply_header(&properties, num_splats, options);
    let total = header.len() + num_splats * properties.len() * 4;
    debug!(
        "ply export: {} splats, {} properties, {} bytes",
        num_splats,
        properties.len(),
        total
    );

    let mut stream = BufferedSink::new(sink, options.stream_buffer_size, total);
    stream.write(header.as_bytes())?;

    let mut record_bytes = Vec::with_capacity(properties.len() * 4);
    for (source_index, source) in sources.iter().enumerate() {
        if source.num_surviving() == 0 {
            warn!("Skipping source {}: every splat is deleted", source_index);
            continue;
        }
        let layout = SourceLayout::new(source);
        let slots: Vec<Slot> = properties
            .iter()
            .filter_map(|name| layout.slot(source, name))
            .collect();
        debug_assert_eq!(slots.len(), properties.len());

        let parts = TransformParts {
            position: layout.has_position(),
            rotation: layout.has_rotation(),
            scale: layout.has_scale(),
            sh: layout.sh_band().rest_count() == MAX_SH_REST,
        };
        let adjust = ColorParts {
            color: layout.has_color(),
            opacity: layout.has_opacity(),
            sh: true,
        };
        let mut resolver = TransformResolver::new(source);

        for index in source.surviving_indices() {
            let mut record = layout.read(source, index);
            record.transform(resolver.entry(index), parts);
            record.adjust_color(&source.color_adjustment, adjust);

            record_bytes.clear();
            for &slot in &slots {
                record_bytes.extend_from_slice(&record.value(slot, source, index).to_le_bytes());
            }
            stream.write(&record_bytes)?;
        }
    }

    let bytes = stream.finish()?;
    debug_assert_eq!(bytes, total);
    info!("Exported {} splats as ply ({} bytes)", num_splats, bytes);
    Ok(ExportSummary::Written {
        splats: num_splats,
        bytes,
    })
}
