use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::compressed_ply::write_compressed_ply;
use crate::error::{ExportSummary, Result};
use crate::ply_format::write_ply;
use crate::sink::Sink;
use crate::splat_format::write_splat;
use crate::splat_source::{validate_sources, SplatSource};

pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// `comment` lines written into PLY headers.
    pub comments: Vec<String>,
    /// Bytes staged before each sink call when streaming the plain format.
    pub stream_buffer_size: usize,
    /// Highest SH band written by the compressed format; `Some(0)` drops SH entirely.
    pub max_sh_band: Option<usize>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            comments: vec!["Generated by splat-export".to_string()],
            stream_buffer_size: DEFAULT_STREAM_BUFFER_SIZE,
            max_sh_band: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    Ply,
    CompressedPly,
    /// Headerless 32-byte records.
    Splat,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".compressed.ply") {
            Some(ExportFormat::CompressedPly)
        } else if name.ends_with(".ply") {
            Some(ExportFormat::Ply)
        } else if name.ends_with(".splat") {
            Some(ExportFormat::Splat)
        } else {
            None
        }
    }
}

/// Shared preflight for every writer: fail fast on malformed sources.
pub(crate) fn validate_for_export(sources: &[SplatSource]) -> Result<()> {
    validate_sources(sources)?;
    for source in sources {
        source.color_adjustment.validate()?;
    }
    Ok(())
}

pub fn export<S: Sink + ?Sized>(
    sources: &[SplatSource],
    format: ExportFormat,
    options: &ExportOptions,
    sink: &mut S,
) -> Result<ExportSummary> {
    match format {
        ExportFormat::Ply => write_ply(sources, options, sink),
        ExportFormat::CompressedPly => write_compressed_ply(sources, options, sink),
        ExportFormat::Splat => write_splat(sources, sink),
    }
}
