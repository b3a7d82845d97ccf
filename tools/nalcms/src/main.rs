/// NALCMS → WRF land-use resampling tool.
///
/// Reads a NALCMS class-code GeoTIFF and a geogrid dataset (`geo_em.d<NN>.nc`
/// with the `netcdf` feature, or JSON), resamples the land cover onto the
/// target cells, and writes `geo_em.d<NN>.new.<ext>` in the input's format
/// next to the input (or into `--output-dir`).
///
/// With `--inspect-lat/--inspect-lon` only the cell nearest that location is
/// sampled and its class distribution printed; nothing is written.
mod geotiff;
mod projection;

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use nalcms_core::dataset::RUN_VARIABLES;
use nalcms_core::taxonomy::ClassTaxonomy;
use nalcms_core::{
    output_file_name, CellOutcome, DatasetFormat, GeoDataset, LatLon, ProcessingMode, ResampleConfig,
    Resampler, UrbanThresholds,
};

use geotiff::GeoTiffRaster;
use projection::{Proj4Projection, NALCMS_PROJ};

// ── CLI ──────────────────────────────────────────────────────────────────────

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModeArg {
    /// Recompute LANDUSEF, LU_INDEX and FRC_URB2D for every class
    All,
    /// Update only urban cells and FRC_URB2D
    Urban,
}

impl From<ModeArg> for ProcessingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::All => ProcessingMode::All,
            ModeArg::Urban => ProcessingMode::Urban,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "nalcms", about = "Resample NALCMS land cover onto WRF geogrid cells")]
struct Args {
    /// NALCMS land-cover GeoTIFF (u8 class codes)
    source: PathBuf,

    /// geo_em dataset (.nc or JSON) providing XLAT_M/XLONG_M/XLAT_V/XLONG_U
    geo_em: PathBuf,

    /// Processing mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Split urban-dominant cells into low / high density and commercial
    #[arg(long, overrides_with = "no_urban_multi")]
    urban_multi: bool,

    /// Keep a single urban category even if the config enables the split
    #[arg(long, overrides_with = "urban_multi")]
    no_urban_multi: bool,

    /// Urban fraction threshold for low-density residential
    #[arg(long)]
    urban_low: Option<f64>,

    /// Urban fraction threshold for high-density residential
    #[arg(long)]
    urban_high: Option<f64>,

    /// Urban fraction threshold for commercial / industrial
    #[arg(long)]
    urban_commercial: Option<f64>,

    /// Target cells spanned by one sampling footprint
    #[arg(long)]
    extent: Option<usize>,

    /// JSON run configuration; CLI flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// PROJ definition of the source raster CRS
    #[arg(long, default_value = NALCMS_PROJ)]
    proj: String,

    /// Output directory (defaults to the directory of GEO_EM)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Latitude of a location to inspect
    #[arg(long, requires = "inspect_lon")]
    inspect_lat: Option<f64>,

    /// Longitude of a location to inspect
    #[arg(long, requires = "inspect_lat")]
    inspect_lon: Option<f64>,
}

// ── Configuration ────────────────────────────────────────────────────────────

/// Config file (or defaults) with CLI overrides applied, validated.
fn resolve_config(args: &Args) -> Result<ResampleConfig> {
    let mut cfg = match &args.config {
        Some(path) => ResampleConfig::from_json_file(path)
            .with_context(|| format!("Cannot load config {}", path.display()))?,
        None => ResampleConfig::default(),
    };

    if let Some(mode) = args.mode {
        cfg.mode = mode.into();
    }
    if args.urban_multi {
        cfg.urban_multi = true;
    } else if args.no_urban_multi {
        cfg.urban_multi = false;
    }
    cfg.thresholds = UrbanThresholds {
        low: args.urban_low.unwrap_or(cfg.thresholds.low),
        high: args.urban_high.unwrap_or(cfg.thresholds.high),
        commercial: args.urban_commercial.unwrap_or(cfg.thresholds.commercial),
    };
    if let Some(extent) = args.extent {
        cfg.extent = extent;
    }

    cfg.validate().context("Invalid configuration")?;
    Ok(cfg)
}

// ── Inspection ───────────────────────────────────────────────────────────────

/// Per-class distribution of one cell as a text table.
fn distribution_table(outcome: &CellOutcome, taxonomy: &ClassTaxonomy) -> String {
    let mut s = String::new();
    let _ = writeln!(s, "{:>4}  {:<52} {:>8}  {:>6}", "code", "class", "fraction", "target");
    for (code, &f) in outcome.fractions.iter().enumerate() {
        if f == 0.0 {
            continue;
        }
        let code = code as u8;
        let target = taxonomy.target(code).map_or_else(|| "-".to_string(), |t| t.to_string());
        let _ = writeln!(
            s,
            "{:>4}  {:<52} {:>8.4}  {:>6}",
            code,
            taxonomy.name(code).unwrap_or("?"),
            f,
            target
        );
    }
    let _ = writeln!(
        s,
        "dominant: {} ({}), urban fraction: {:.4}",
        outcome.dominant,
        taxonomy.name(outcome.dominant).unwrap_or("?"),
        outcome.urban_fraction
    );
    s
}

// ── Main ──────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();
    let cfg = resolve_config(&args)?;

    let format = DatasetFormat::from_path(&args.geo_em);
    let mut dataset = GeoDataset::open(&args.geo_em, &RUN_VARIABLES)
        .with_context(|| format!("Cannot read dataset {}", args.geo_em.display()))?;
    let grid = dataset.target_grid().context("Dataset is missing target grid coordinates")?;

    let raster = GeoTiffRaster::open(&args.source)?.with_crs(args.proj.clone());
    let projection = Proj4Projection::new(&args.proj)?;
    let resampler = Resampler::new(&grid, &raster, &projection, &cfg)?;

    if let (Some(lat), Some(lon)) = (args.inspect_lat, args.inspect_lon) {
        let Some(cell) = grid.nearest_mass_point(LatLon::new(lat, lon)) else {
            bail!("Target grid has no finite mass points");
        };
        log::info!("Nearest mass point to ({lat}, {lon}) is (j={}, i={})", cell.j, cell.i);
        let sample = resampler.sample(cell)?;
        println!(
            "cell (j={}, i={}): {} x {} window, {} samples contained",
            cell.j,
            cell.i,
            sample.rows,
            sample.cols,
            sample.mask.iter().filter(|&&m| m).count()
        );
        match CellOutcome::from_sample(&sample) {
            Some(outcome) => print!("{}", distribution_table(&outcome, &cfg.taxonomy)),
            None => println!("cell is skipped (outside the raster, no data, or no contained samples)"),
        }
        return Ok(());
    }

    let mut out = dataset.output_fields(cfg.mode)?;
    let summary = resampler.run(&mut out)?;

    dataset.store_outputs(&out)?;

    let out_dir = match &args.output_dir {
        Some(dir) => dir.clone(),
        None => args.geo_em.parent().map(PathBuf::from).unwrap_or_default(),
    };
    std::fs::create_dir_all(&out_dir).with_context(|| format!("Cannot create {}", out_dir.display()))?;
    let out_path = out_dir.join(output_file_name(dataset.grid_id, format.extension()));
    dataset
        .save(&out_path)
        .with_context(|| format!("Cannot write {}", out_path.display()))?;

    log::info!(
        "Wrote {} ({} of {} cells updated, mode={})",
        out_path.display(),
        summary.written,
        summary.cells,
        cfg.mode
    );
    Ok(())
}
