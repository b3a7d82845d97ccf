//! `geo_em.d<NN>.nc` read / write through the netCDF C library.
//!
//! Loading keeps only the variables the caller names. Saving copies the file
//! the dataset was loaded from and overwrites the held variables in place, so
//! every other variable and attribute of the geogrid file survives.

use std::path::Path;

use netcdf::AttributeValue;

use crate::dataset::{GeoDataset, Variable};
use crate::error::{Error, Result};

const GRID_ID_ATTR: &str = "GRID_ID";

fn grid_id(file: &netcdf::File) -> Option<u8> {
    let value = file.attribute(GRID_ID_ATTR)?.value().ok()?;
    let id = match value {
        AttributeValue::Int(v) => i64::from(v),
        AttributeValue::Ints(v) => i64::from(*v.first()?),
        AttributeValue::Short(v) => i64::from(v),
        AttributeValue::Shorts(v) => i64::from(*v.first()?),
        AttributeValue::Uchar(v) => i64::from(v),
        AttributeValue::Schar(v) => i64::from(v),
        _ => return None,
    };
    u8::try_from(id).ok()
}

/// Dimension names of the first variable in `file` whose lengths are `shape`.
fn dims_with_shape(file: &netcdf::FileMut, shape: &[usize]) -> Option<Vec<String>> {
    file.variables().find_map(|var| {
        let dims = var.dimensions();
        let lens: Vec<usize> = dims.iter().map(|d| d.len()).collect();
        (lens == shape).then(|| dims.iter().map(|d| d.name()).collect())
    })
}

impl GeoDataset {
    /// Read the named variables from a geogrid NetCDF file. Names the file
    /// does not hold are skipped; callers report them when they are needed.
    pub fn load_netcdf(path: &Path, names: &[&str]) -> Result<Self> {
        let file = netcdf::open(path)?;
        let id = grid_id(&file).unwrap_or_else(|| {
            log::warn!("{}: no usable {GRID_ID_ATTR} attribute, assuming grid 1", path.display());
            1
        });

        let mut ds = GeoDataset::new(id);
        for &name in names {
            let Some(var) = file.variable(name) else {
                log::debug!("{}: no variable {name}", path.display());
                continue;
            };
            let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
            let data = var.get_values::<f64, _>(..)?;
            ds.insert(name, Variable::new(shape, data)?);
        }
        ds.template = Some(path.to_path_buf());
        log::info!("Read {} variables from {}", ds.variables.len(), path.display());
        Ok(ds)
    }

    /// Write the held variables into a copy of the template file at `path`.
    /// A variable the template lacks is defined on the dimensions of one with
    /// the same shape; a variable it holds must have the same size.
    pub fn save_netcdf(&self, path: &Path) -> Result<()> {
        let Some(template) = &self.template else {
            return Err(Error::UnsupportedFormat(format!(
                "{}: NetCDF output needs a dataset loaded from NetCDF",
                path.display()
            )));
        };
        if template.as_path() != path {
            std::fs::copy(template, path)?;
        }

        let mut file = netcdf::append(path)?;
        for (name, v) in &self.variables {
            if file.variable(name).is_none() {
                let dims = dims_with_shape(&file, &v.shape).ok_or_else(|| Error::MissingVariable(name.clone()))?;
                let dims: Vec<&str> = dims.iter().map(String::as_str).collect();
                file.add_variable::<f32>(name, &dims)?;
                log::debug!("{}: defined {name} on {dims:?}", path.display());
            }
            let mut var = file
                .variable_mut(name)
                .ok_or_else(|| Error::MissingVariable(name.clone()))?;
            let shape: Vec<usize> = var.dimensions().iter().map(|d| d.len()).collect();
            if shape.iter().product::<usize>() != v.data.len() {
                return Err(Error::SizeMismatch { name: name.clone(), expected: shape, actual: v.shape.clone() });
            }
            var.put_values(&v.data, ..)?;
        }
        log::info!("Wrote {} variables to {}", self.variables.len(), path.display());
        Ok(())
    }
}
