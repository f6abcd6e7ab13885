//! corroscan CLI: stitch thickness-scan sheets and report corrosion.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, warn};

use corroscan::core_modules::utils::heatmap_image;
use corroscan::{
    AssetType, ColorScheme, ConflictResolution, InspectionPipeline, MergeConfig, MergeDirection,
    MergeError, ProcessConfig, SessionError,
};

#[derive(Parser)]
#[command(name = "corroscan")]
#[command(about = "Merge ultrasonic thickness-scan sheets, compute condition statistics and locate corrosion")]
#[command(version)]
struct Cli {
    /// Scan sheets (xlsx, xls, ods or csv). The first one starts the grid.
    #[arg(required = true)]
    sheets: Vec<PathBuf>,

    /// JSON file with a process configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Nominal thickness in mm, overriding the config and sheet metadata.
    #[arg(long)]
    nominal: Option<f64>,

    /// Corrosion threshold in percent of nominal.
    #[arg(long)]
    threshold: Option<f64>,

    #[arg(long, value_enum)]
    asset_type: Option<AssetArg>,

    #[arg(long, value_enum)]
    scheme: Option<SchemeArg>,

    /// Placement of each additional sheet as `direction[:start]`, in order.
    /// Defaults to appending on the right edge.
    #[arg(long = "merge", value_parser = parse_merge)]
    merges: Vec<MergeArg>,

    /// How to settle nominal thickness conflicts: `existing`, `new`, or a value in mm.
    #[arg(long, value_parser = parse_resolution)]
    resolve: Option<ConflictResolution>,

    /// Output directory.
    #[arg(long, default_value = "corroscan_out")]
    out: PathBuf,

    /// Pixels per grid cell in written images.
    #[arg(long, default_value_t = 8)]
    scale: u32,

    /// Also write one heat map crop per corrosion patch.
    #[arg(long)]
    crops: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AssetArg {
    Plate,
    Tank,
    Pipe,
    Vessel,
    ShipHull,
    Other,
}

impl From<AssetArg> for AssetType {
    fn from(arg: AssetArg) -> Self {
        match arg {
            AssetArg::Plate => AssetType::Plate,
            AssetArg::Tank => AssetType::Tank,
            AssetArg::Pipe => AssetType::Pipe,
            AssetArg::Vessel => AssetType::Vessel,
            AssetArg::ShipHull => AssetType::ShipHull,
            AssetArg::Other => AssetType::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SchemeArg {
    Spectrum,
    Grayscale,
}

impl From<SchemeArg> for ColorScheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Spectrum => ColorScheme::Spectrum,
            SchemeArg::Grayscale => ColorScheme::Grayscale,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MergeArg {
    direction: MergeDirection,
    start: Option<usize>,
}

fn parse_merge(value: &str) -> Result<MergeArg, String> {
    let (direction, start) = match value.split_once(':') {
        Some((direction, start)) => {
            let start = start
                .parse::<usize>()
                .map_err(|err| format!("invalid start `{start}`: {err}"))?;
            (direction, Some(start))
        }
        None => (value, None),
    };
    Ok(MergeArg {
        direction: direction.parse()?,
        start,
    })
}

fn parse_resolution(value: &str) -> Result<ConflictResolution, String> {
    match value.to_ascii_lowercase().as_str() {
        "existing" => Ok(ConflictResolution::UseExisting),
        "new" => Ok(ConflictResolution::UseNew),
        other => other
            .parse::<f64>()
            .map(ConflictResolution::UseCustom)
            .map_err(|_| format!("expected `existing`, `new` or a thickness, got `{value}`")),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    run(&cli, config)
}

fn load_config(cli: &Cli) -> Result<ProcessConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            ProcessConfig::from_json(&text).with_context(|| format!("parsing config {}", path.display()))?
        }
        None => ProcessConfig::default(),
    };
    if let Some(nominal) = cli.nominal {
        config.nominal_thickness = Some(nominal);
    }
    if let Some(threshold) = cli.threshold {
        config.threshold_percent = threshold;
    }
    if let Some(asset_type) = cli.asset_type {
        config.asset_type = asset_type.into();
    }
    if let Some(scheme) = cli.scheme {
        config.color_scheme = scheme.into();
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli, config: ProcessConfig) -> Result<()> {
    let mut pipeline = InspectionPipeline::new(config);

    // --- 1. Ingest and stitch ---
    for (index, path) in cli.sheets.iter().enumerate() {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let sheet = corroscan::parse_sheet(&bytes, &file_name)
            .with_context(|| format!("parsing {}", path.display()))?;
        for warning in &sheet.warnings {
            warn!(file_name = %file_name, ?warning, "sheet warning");
        }

        if index == 0 {
            pipeline.init(&sheet)?;
            continue;
        }

        let master = pipeline.master().context("session lost its grid")?;
        let arg = cli.merges.get(index - 1).copied().unwrap_or(MergeArg {
            direction: MergeDirection::Right,
            start: None,
        });
        let start = arg.start.unwrap_or(match arg.direction {
            MergeDirection::Right => master.width,
            MergeDirection::Bottom => master.height,
            MergeDirection::Left => sheet.width(),
            MergeDirection::Top => sheet.height(),
        });
        let merge_config = MergeConfig {
            direction: arg.direction,
            start,
        };

        match pipeline.merge(&sheet, merge_config, cli.resolve) {
            Ok(_) => {}
            Err(SessionError::Merge(MergeError::ThicknessMismatch(conflict))) => bail!(
                "{} declares a nominal thickness of {} mm but the grid uses {} mm; rerun with --resolve existing|new|<mm>",
                conflict.file_name,
                conflict.conflicting_thickness,
                conflict.original_thickness
            ),
            Err(err) => return Err(err.into()),
        }
    }

    // --- 2. Finalize, segment, encode ---
    pipeline.finalize()?;
    let report = pipeline.report()?;
    let buffers = pipeline.encode(None)?;

    // --- 3. Outputs ---
    fs::create_dir_all(&cli.out).with_context(|| format!("creating {}", cli.out.display()))?;
    let summary_path = cli.out.join("summary.json");
    let summary = serde_json::to_string_pretty(&report)?;
    fs::write(&summary_path, summary).with_context(|| format!("writing {}", summary_path.display()))?;

    let heatmap = heatmap_image::to_rgba_image(&buffers).context("color buffer does not match grid size")?;
    write_image(&cli.out.join("heatmap.png"), &heatmap_image::upscale(&heatmap, cli.scale))?;

    if cli.crops {
        if let Some(finalized) = pipeline.finalized() {
            for segment in &report.corrosion_patches {
                let Some(crop) =
                    heatmap_image::segment_crop(&finalized.final_grid, segment, pipeline.config().color_scheme)
                else {
                    continue;
                };
                let path = cli.out.join(format!("patch_{:03}.png", segment.id));
                write_image(&path, &heatmap_image::upscale(&crop, cli.scale))?;
            }
        }
    }

    info!(out = %cli.out.display(), "outputs written");
    println!(
        "condition: {:?}  min: {:.2} mm  avg: {:.2} mm  corrosion patches: {}  ND patches: {}",
        report.condition,
        report.stats.min_thickness,
        report.stats.avg_thickness,
        report.corrosion_patches.len(),
        report.nd_patches.len()
    );
    Ok(())
}

fn write_image(path: &Path, image: &image::RgbaImage) -> Result<()> {
    heatmap_image::save_png(path, image).with_context(|| format!("writing {}", path.display()))
}
