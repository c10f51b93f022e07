use base64::Engine;
use log::info;
use serde::{Deserialize, Serialize};

use crate::compressed_ply::write_compressed_ply;
use crate::error::{ExportSummary, Result};
use crate::export::ExportOptions;
use crate::splat_source::SplatSource;

/// Template placeholder replaced by the base64 compressed scene.
pub const SPLAT_DATA_PLACEHOLDER: &str = "{{SPLAT_DATA}}";
pub const SETTINGS_PLACEHOLDER: &str = "{{SETTINGS}}";

/// Initial camera and background of the standalone viewer page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerSettings {
    pub camera_position: [f32; 3],
    pub camera_target: [f32; 3],
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub background_color: [f32; 3],
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            camera_position: [2.0, 2.0, -2.0],
            camera_target: [0.0, 0.0, 0.0],
            fov: 50.0,
            background_color: [0.4, 0.4, 0.4],
        }
    }
}

/// Embed the compressed scene and settings into `template`. `None` when every splat is
/// deleted.
pub fn export_viewer(
    sources: &[SplatSource],
    template: &str,
    settings: &ViewerSettings,
    options: &ExportOptions,
) -> Result<Option<String>> {
    let mut compressed = Vec::new();
    if write_compressed_ply(sources, options, &mut compressed)? == ExportSummary::NothingToExport {
        return Ok(None);
    }

    let data = base64::engine::general_purpose::STANDARD.encode(&compressed);
    let settings = serde_json::to_string(settings).map_err(std::io::Error::other)?;
    let page = template
        .replace(SETTINGS_PLACEHOLDER, &settings)
        .replace(SPLAT_DATA_PLACEHOLDER, &data);
    info!("Built viewer page ({} bytes of scene data)", compressed.len());
    Ok(Some(page))
}
