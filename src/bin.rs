mod ply_loader;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use ply_loader::load_ply;
use serde::Deserialize;
use splat_export::morton::BoundingBox;
use splat_export::spherical_harmonics::ShBand;
use splat_export::{
    export, export_viewer, ColorAdjustment, ExportFormat, ExportOptions, ExportSummary, GzSink,
    Sink, SplatSource, ViewerSettings, WriteSink,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use vek::{Mat4, Vec3};

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Ply,
    CompressedPly,
    Splat,
}

impl From<FormatArg> for ExportFormat {
    fn from(format: FormatArg) -> Self {
        match format {
            FormatArg::Ply => ExportFormat::Ply,
            FormatArg::CompressedPly => ExportFormat::CompressedPly,
            FormatArg::Splat => ExportFormat::Splat,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Merge one or more .ply scenes into a single export
    Convert {
        #[arg(value_name = "INPUT", required = true)]
        /// The input .ply files
        inputs: Vec<PathBuf>,

        #[arg(short, long, value_name = "OUTPUT")]
        /// The output file; the format follows the extension unless --format is given
        output: PathBuf,

        #[arg(short, long)]
        format: Option<FormatArg>,

        #[arg(short, long)]
        /// JSON scene description with per-input transforms and color adjustments
        scene: Option<PathBuf>,

        #[arg(short, long, default_value = "false")]
        /// Gzip the output stream.
        gzip: bool,
    },

    /// Build a standalone viewer page around the compressed scene
    Viewer {
        #[arg(value_name = "INPUT", required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        /// Page template containing {{SPLAT_DATA}} and {{SETTINGS}}
        template: PathBuf,

        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,

        #[arg(short, long)]
        scene: Option<PathBuf>,

        #[arg(long, value_delimiter = ',', num_args = 3)]
        camera_position: Option<Vec<f32>>,

        #[arg(long, value_delimiter = ',', num_args = 3)]
        camera_target: Option<Vec<f32>>,

        #[arg(long)]
        fov: Option<f32>,

        #[arg(long, value_delimiter = ',', num_args = 3)]
        background: Option<Vec<f32>>,
    },

    Info {
        #[arg(value_name = "INPUT", required = true)]
        /// The input .ply files
        inputs: Vec<PathBuf>,
    },
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Per-input settings; entries pair with inputs by position.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SceneEntry {
    /// Row-major 4x4 world transform.
    transform: Option<[f32; 16]>,
    color_adjustment: ColorAdjustment,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Scene {
    sources: Vec<SceneEntry>,
    options: ExportOptions,
}

fn main() -> Result<()> {
    better_panic::install();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Convert {
            inputs,
            output,
            format,
            scene,
            gzip,
        } => convert(&inputs, &output, format, scene.as_deref(), gzip),
        Commands::Viewer {
            inputs,
            template,
            output,
            scene,
            camera_position,
            camera_target,
            fov,
            background,
        } => {
            let mut settings = ViewerSettings::default();
            if let Some(p) = camera_position {
                settings.camera_position = triple(&p)?;
            }
            if let Some(t) = camera_target {
                settings.camera_target = triple(&t)?;
            }
            if let Some(fov) = fov {
                settings.fov = fov;
            }
            if let Some(b) = background {
                settings.background_color = triple(&b)?;
            }
            viewer(&inputs, &template, &output, scene.as_deref(), &settings)
        }
        Commands::Info { inputs } => info(&inputs),
    }
}

fn triple(values: &[f32]) -> Result<[f32; 3]> {
    values
        .try_into()
        .map_err(|_| anyhow!("expected three comma separated values"))
}

fn load_scene(path: Option<&Path>) -> Result<Scene> {
    let Some(path) = path else {
        return Ok(Scene::default());
    };
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("parsing {}", path.display()))
}

fn load_sources(inputs: &[PathBuf], scene: &Scene) -> Result<Vec<SplatSource>> {
    if scene.sources.len() > inputs.len() {
        log::warn!(
            "Scene describes {} sources but only {} inputs were given",
            scene.sources.len(),
            inputs.len()
        );
    }
    inputs
        .iter()
        .enumerate()
        .map(|(i, input)| {
            let mut source = load_ply(input)?;
            if let Some(entry) = scene.sources.get(i) {
                if let Some(m) = entry.transform {
                    source = source.with_transform(Mat4::from_row_arrays(std::array::from_fn(
                        |r| std::array::from_fn(|c| m[r * 4 + c]),
                    )));
                }
                source = source.with_color_adjustment(entry.color_adjustment);
            }
            log::info!(
                "Loaded {} ({} splats, {} deleted)",
                input.display(),
                source.num_splats,
                source.num_deleted()
            );
            Ok(source)
        })
        .collect()
}

fn convert(
    inputs: &[PathBuf],
    output: &Path,
    format: Option<FormatArg>,
    scene: Option<&Path>,
    gzip: bool,
) -> Result<()> {
    let format = match format {
        Some(format) => format.into(),
        None => ExportFormat::from_path(output)
            .ok_or_else(|| anyhow!("cannot infer the format of {}", output.display()))?,
    };
    let scene = load_scene(scene)?;
    let sources = load_sources(inputs, &scene)?;

    let file = File::create(output).with_context(|| format!("creating {}", output.display()))?;
    let writer = BufWriter::new(file);
    let mut sink: Box<dyn Sink> = if gzip {
        Box::new(GzSink::new(writer))
    } else {
        Box::new(WriteSink::new(writer))
    };
    let summary = export(&sources, format, &scene.options, sink.as_mut())?;
    drop(sink);
    if summary == ExportSummary::NothingToExport {
        std::fs::remove_file(output)?;
    }
    Ok(())
}

fn viewer(
    inputs: &[PathBuf],
    template: &Path,
    output: &Path,
    scene: Option<&Path>,
    settings: &ViewerSettings,
) -> Result<()> {
    let template = std::fs::read_to_string(template)
        .with_context(|| format!("reading {}", template.display()))?;
    let scene = load_scene(scene)?;
    let sources = load_sources(inputs, &scene)?;
    if let Some(page) = export_viewer(&sources, &template, settings, &scene.options)? {
        std::fs::write(output, page).with_context(|| format!("writing {}", output.display()))?;
    }
    Ok(())
}

fn info(inputs: &[PathBuf]) -> Result<()> {
    for input in inputs {
        let source = load_ply(input)?;
        println!("{}", input.display());
        println!("  splats: {} ({} deleted)", source.num_splats, source.num_deleted());
        println!("  properties: {}", source.property_names().collect::<Vec<_>>().join(" "));
        let band = source.sh_band();
        if band != ShBand::Band0 {
            println!("  sh band: {}", band.index());
        }

        if let (Some(x), Some(y), Some(z)) =
            (source.property("x"), source.property("y"), source.property("z"))
        {
            let points: Vec<Vec3<f32>> = source
                .surviving_indices()
                .map(|i| Vec3::new(x[i], y[i], z[i]))
                .collect();
            if let Some(bounds) = BoundingBox::from_points(&points) {
                println!("  bounding box: min: {}, max: {}", bounds.min, bounds.max);
                println!("  center: {}", (bounds.min + bounds.max) / 2.0);
            }
        }
    }
    Ok(())
}
