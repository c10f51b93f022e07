use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("source {source_index}: `{property}` has {actual} entries, expected {expected}")]
    PropertyLength {
        source_index: usize,
        property: String,
        expected: usize,
        actual: usize,
    },

    #[error("source {source_index}: splat {splat} uses palette index {index} but the palette has {palette_len} entries")]
    PaletteIndex {
        source_index: usize,
        splat: usize,
        index: u32,
        palette_len: usize,
    },

    #[error("color adjustment has white point equal to black point ({0})")]
    InvalidColorAdjustment(f32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportSummary {
    Written { splats: usize, bytes: usize },
    /// Every splat was deleted; the sink was never called.
    NothingToExport,
}

impl ExportSummary {
    pub fn bytes(&self) -> usize {
        match self {
            ExportSummary::Written { bytes, .. } => *bytes,
            ExportSummary::NothingToExport => 0,
        }
    }
}
