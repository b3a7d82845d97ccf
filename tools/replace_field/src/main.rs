/// Replace one variable of a geogrid dataset with the same variable from
/// another dataset. The result is written to `<TARGET_FILE>_new`; the target
/// itself is left unchanged.
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use nalcms_core::{DatasetFormat, GeoDataset};

#[derive(Parser, Debug)]
#[command(name = "replace_field", about = "Replace one field in a target dataset given a source dataset")]
struct Args {
    /// Field to replace
    field: String,

    /// Dataset that provides the field
    source_file: PathBuf,

    /// Dataset in which to replace the field
    target_file: PathBuf,
}

/// `<target>_new`, keeping a `.nc` extension last so the format carries over.
fn new_path(target: &Path) -> PathBuf {
    if DatasetFormat::from_path(target) == DatasetFormat::NetCdf {
        if let Some(stem) = target.file_stem() {
            let mut s = OsString::from(stem);
            s.push("_new.nc");
            return target.with_file_name(s);
        }
    }
    let mut s = OsString::from(target.as_os_str());
    s.push("_new");
    PathBuf::from(s)
}

/// Copy `field` from `source` into `target`, which must already hold a
/// variable of that name and size.
fn replace_field(field: &str, source: &GeoDataset, target: &mut GeoDataset) -> Result<()> {
    target
        .variable(field)
        .with_context(|| format!("Target has no field {field}"))?;
    target
        .copy_variable_from(source, field)
        .with_context(|| format!("Cannot replace {field}"))?;
    Ok(())
}

fn main() -> Result<()> {
    pretty_env_logger::init();
    let args = Args::parse();

    let names = [args.field.as_str()];
    let source = GeoDataset::open(&args.source_file, &names)
        .with_context(|| format!("Cannot read {}", args.source_file.display()))?;
    let mut target = GeoDataset::open(&args.target_file, &names)
        .with_context(|| format!("Cannot read {}", args.target_file.display()))?;

    replace_field(&args.field, &source, &mut target)?;

    let out = new_path(&args.target_file);
    target
        .save(&out)
        .with_context(|| format!("Cannot write {}", out.display()))?;
    log::info!("Replaced {} from {} into {}", args.field, args.source_file.display(), out.display());
    Ok(())
}
