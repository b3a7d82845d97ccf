//! A geogrid-style target dataset: named n-dimensional variables plus the
//! grid id, persisted as JSON.
//!
//! Variables keep WRF's dimension order with an optional leading `Time`
//! dimension of length 1: 2-D fields are `[Time,] south_north, west_east`
//! and LANDUSEF is `[Time,] land_cat, south_north, west_east`.
//!
//! JSON is always available. NetCDF (`geo_em.d<NN>.nc`) needs the `netcdf`
//! feature.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ProcessingMode;
use crate::error::{Error, Result};
use crate::grid::{Field, LandUseFractions, OutputFields, TargetGrid};

pub const XLAT_M: &str = "XLAT_M";
pub const XLONG_M: &str = "XLONG_M";
/// Corner latitudes are taken from the v-staggered grid.
pub const XLAT_V: &str = "XLAT_V";
/// Corner longitudes are taken from the u-staggered grid.
pub const XLONG_U: &str = "XLONG_U";
pub const LANDUSEF: &str = "LANDUSEF";
pub const LU_INDEX: &str = "LU_INDEX";
pub const FRC_URB2D: &str = "FRC_URB2D";

/// Everything a resampling run reads or writes.
pub const RUN_VARIABLES: [&str; 7] = [XLAT_M, XLONG_M, XLAT_V, XLONG_U, LANDUSEF, LU_INDEX, FRC_URB2D];

/// Land-use categories assumed when the dataset carries no LANDUSEF.
pub const DEFAULT_NUM_LAND_CAT: usize = 21;

// ── Variables ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl Variable {
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::SizeMismatch {
                name: "variable".into(),
                expected: shape,
                actual: vec![data.len()],
            });
        }
        Ok(Self { shape, data })
    }

    /// Shape with leading length-1 dimensions removed, keeping at least `keep`.
    fn squeezed(&self, keep: usize) -> &[usize] {
        let mut s = self.shape.as_slice();
        while s.len() > keep && s[0] == 1 {
            s = &s[1..];
        }
        s
    }
}

// ── Format ────────────────────────────────────────────────────────────────────

/// On-disk container, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Json,
    NetCdf,
}

impl DatasetFormat {
    /// `.nc` is NetCDF; anything else is read as JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("nc") => Self::NetCdf,
            _ => Self::Json,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::NetCdf => "nc",
        }
    }
}

// ── Dataset ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoDataset {
    /// Nest id; `d01` is grid 1.
    pub grid_id: u8,
    pub variables: BTreeMap<String, Variable>,
    /// NetCDF file the variables were read from. Saving as NetCDF rewrites a
    /// copy of it, so variables that were never loaded are carried over.
    #[serde(skip)]
    pub template: Option<PathBuf>,
}

impl GeoDataset {
    pub fn new(grid_id: u8) -> Self {
        Self { grid_id, variables: BTreeMap::new(), template: None }
    }

    /// Read `path` in the format its extension names. JSON loads every
    /// variable; NetCDF loads the listed `names` that the file holds.
    pub fn open(path: &Path, names: &[&str]) -> Result<Self> {
        match DatasetFormat::from_path(path) {
            DatasetFormat::Json => Self::load_json(path),
            #[cfg(feature = "netcdf")]
            DatasetFormat::NetCdf => Self::load_netcdf(path, names),
            #[cfg(not(feature = "netcdf"))]
            DatasetFormat::NetCdf => {
                let _ = names;
                Err(netcdf_disabled(path))
            }
        }
    }

    /// Write to `path` in the format its extension names.
    pub fn save(&self, path: &Path) -> Result<()> {
        match DatasetFormat::from_path(path) {
            DatasetFormat::Json => self.save_json(path),
            #[cfg(feature = "netcdf")]
            DatasetFormat::NetCdf => self.save_netcdf(path),
            #[cfg(not(feature = "netcdf"))]
            DatasetFormat::NetCdf => Err(netcdf_disabled(path)),
        }
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let ds: Self = serde_json::from_reader(reader)?;
        for (name, var) in &ds.variables {
            if var.shape.iter().product::<usize>() != var.data.len() {
                return Err(Error::SizeMismatch {
                    name: name.clone(),
                    expected: var.shape.clone(),
                    actual: vec![var.data.len()],
                });
            }
        }
        Ok(ds)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn variable(&self, name: &str) -> Result<&Variable> {
        self.variables.get(name).ok_or_else(|| Error::MissingVariable(name.to_string()))
    }

    pub fn insert(&mut self, name: impl Into<String>, var: Variable) {
        self.variables.insert(name.into(), var);
    }

    /// Overwrite `name` with `var`. An existing variable must have the same
    /// number of elements; its shape (including any Time dimension) is kept.
    pub fn replace_variable(&mut self, name: &str, var: Variable) -> Result<()> {
        match self.variables.get_mut(name) {
            Some(existing) if existing.data.len() != var.data.len() => Err(Error::SizeMismatch {
                name: name.to_string(),
                expected: existing.shape.clone(),
                actual: var.shape,
            }),
            Some(existing) => {
                existing.data = var.data;
                Ok(())
            }
            None => {
                self.variables.insert(name.to_string(), var);
                Ok(())
            }
        }
    }

    /// Copy variable `name` from `source`, which must hold it.
    pub fn copy_variable_from(&mut self, source: &GeoDataset, name: &str) -> Result<()> {
        let var = source.variable(name)?.clone();
        self.replace_variable(name, var)
    }

    /// A 2-D variable as a field, dropping a leading Time dimension.
    pub fn field(&self, name: &str) -> Result<Field<f64>> {
        let var = self.variable(name)?;
        match *var.squeezed(2) {
            [height, width] => Field::from_vec(var.data.clone(), width, height),
            _ => Err(Error::SizeMismatch {
                name: name.to_string(),
                expected: vec![0, 0],
                actual: var.shape.clone(),
            }),
        }
    }

    /// Mass-point and corner coordinates of the target grid.
    pub fn target_grid(&self) -> Result<TargetGrid> {
        TargetGrid::new(
            self.field(XLAT_M)?,
            self.field(XLONG_M)?,
            self.field(XLAT_V)?,
            self.field(XLONG_U)?,
        )
    }

    /// Number of land-use categories, from the LANDUSEF category dimension.
    pub fn num_land_cat(&self) -> usize {
        match self.variables.get(LANDUSEF) {
            Some(var) => match *var.squeezed(3) {
                [ncat, _, _] => ncat,
                _ => DEFAULT_NUM_LAND_CAT,
            },
            None => {
                log::warn!("{} not present; assuming {} land-use categories", LANDUSEF, DEFAULT_NUM_LAND_CAT);
                DEFAULT_NUM_LAND_CAT
            }
        }
    }

    /// Initial output fields for a run in `mode`.
    ///
    /// All-classes runs start from zero. Urban-only runs start from the
    /// dataset's LANDUSEF and LU_INDEX with FRC_URB2D zeroed.
    pub fn output_fields(&self, mode: ProcessingMode) -> Result<OutputFields> {
        let (ny, nx) = self.field(XLAT_M)?.shape();
        let ncat = self.num_land_cat();
        let mut out = OutputFields::zeros(nx, ny, ncat);
        if mode == ProcessingMode::All {
            return Ok(out);
        }

        let lu = self.field(LU_INDEX)?;
        if lu.shape() != (ny, nx) {
            return Err(Error::SizeMismatch {
                name: LU_INDEX.into(),
                expected: vec![ny, nx],
                actual: vec![lu.height, lu.width],
            });
        }
        out.lu_index = Field::from_vec(lu.data.iter().map(|&v| v as f32).collect(), nx, ny)?;

        let landusef = self.variable(LANDUSEF)?;
        if landusef.data.len() != ncat * ny * nx {
            return Err(Error::SizeMismatch {
                name: LANDUSEF.into(),
                expected: vec![ncat, ny, nx],
                actual: landusef.shape.clone(),
            });
        }
        out.landusef = LandUseFractions {
            data: landusef.data.iter().map(|&v| v as f32).collect(),
            num_land_cat: ncat,
            width: nx,
            height: ny,
        };
        Ok(out)
    }

    /// Write the three output fields back, with a leading Time dimension
    /// when they are new to the dataset.
    pub fn store_outputs(&mut self, out: &OutputFields) -> Result<()> {
        let (ny, nx) = out.shape();
        let widen = |v: &[f32]| v.iter().map(|&x| f64::from(x)).collect::<Vec<f64>>();
        self.replace_variable(
            LANDUSEF,
            Variable::new(vec![1, out.num_land_cat(), ny, nx], widen(&out.landusef.data))?,
        )?;
        self.replace_variable(LU_INDEX, Variable::new(vec![1, ny, nx], widen(&out.lu_index.data))?)?;
        self.replace_variable(FRC_URB2D, Variable::new(vec![1, ny, nx], widen(&out.frc_urb2d.data))?)?;
        Ok(())
    }
}

#[cfg(not(feature = "netcdf"))]
fn netcdf_disabled(path: &Path) -> Error {
    Error::UnsupportedFormat(format!("{}: built without the `netcdf` feature", path.display()))
}

/// `geo_em.d<NN>.new.<ext>`.
pub fn output_file_name(grid_id: u8, ext: &str) -> String {
    format!("geo_em.d{grid_id:02}.new.{ext}")
}
