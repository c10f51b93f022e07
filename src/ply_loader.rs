use anyhow::{anyhow, bail, Context, Result};
use ply_rs::parser;
use ply_rs::ply::{DefaultElement, Property};
use splat_export::SplatSource;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

fn scalar(property: &Property) -> Option<f32> {
    match *property {
        Property::Char(v) => Some(v as f32),
        Property::UChar(v) => Some(v as f32),
        Property::Short(v) => Some(v as f32),
        Property::UShort(v) => Some(v as f32),
        Property::Int(v) => Some(v as f32),
        Property::UInt(v) => Some(v as f32),
        Property::Float(v) => Some(v),
        Property::Double(v) => Some(v as f32),
        _ => None,
    }
}

/// Read the vertex element of a PLY stream into a source: scalar properties become f32
/// arrays, `state` becomes the state flags.
pub fn load_ply_stream<T: BufRead>(stream: &mut T) -> Result<SplatSource> {
    let vertex_parser = parser::Parser::<DefaultElement>::new();
    let header = vertex_parser.read_header(stream)?;

    let mut source = None;
    for (_ignore_key, element) in &header.elements {
        match element.name.as_ref() {
            "vertex" => {
                let vertices = vertex_parser.read_payload_for_element(stream, element, &header)?;
                let mut loaded = SplatSource::new(vertices.len());
                for (name, _) in &element.properties {
                    let column = vertices
                        .iter()
                        .map(|v| v.get(name).and_then(scalar))
                        .collect::<Option<Vec<f32>>>();
                    let Some(column) = column else {
                        log::warn!("Skipping non-scalar property `{}`", name);
                        continue;
                    };
                    loaded = if name == "state" {
                        loaded.with_state(column.iter().map(|&v| v as u8).collect())?
                    } else {
                        loaded.with_property(name, column)?
                    };
                }
                source = Some(loaded);
            }
            other => bail!("unsupported element `{}`", other),
        }
    }
    source.ok_or_else(|| anyhow!("no vertex element"))
}

pub fn load_ply(path: &Path) -> Result<SplatSource> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut reader = BufReader::new(file);
    load_ply_stream(&mut reader).with_context(|| format!("reading {}", path.display()))
}
