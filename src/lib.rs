pub mod chunk;
pub mod color_adjust;
pub mod compressed_ply;
pub mod error;
pub mod export;
pub mod layout;
pub mod morton;
pub mod ply_format;
pub mod sh_quantizer;
pub mod sink;
pub mod spherical_harmonics;
pub mod splat_format;
pub mod splat_source;
mod support;
pub mod transform;
pub mod viewer;

pub use color_adjust::ColorAdjustment;
pub use error::{ExportError, ExportSummary, Result};
pub use export::{export, ExportFormat, ExportOptions};
pub use sink::{BufferedSink, GzSink, Sink, WriteSink};
pub use splat_source::{SplatSource, TransformPalette, STATE_DELETED};
pub use viewer::{export_viewer, ViewerSettings};
