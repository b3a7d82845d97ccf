//! NALCMS land-cover resampling onto WRF geogrid target cells.
//!
//! Each target cell is projected into the source raster's CRS, the source
//! samples whose pixel centres fall inside the cell (boundary inclusive) are
//! counted per class, and the resulting areal fractions populate LANDUSEF,
//! LU_INDEX and FRC_URB2D.

pub mod config;
pub mod coords;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod grid;
#[cfg(feature = "netcdf")]
mod netcdf_io;
pub mod raster;
pub mod resample;
pub mod taxonomy;
pub mod urban;

pub use config::{ProcessingMode, ResampleConfig};
pub use coords::{CellIndex, LatLon};
pub use dataset::{output_file_name, DatasetFormat, GeoDataset, Variable};
pub use error::{Error, Result};
pub use geometry::{CellGeometry, PlanarProjection, Projection};
pub use grid::{Field, LandUseFractions, OutputFields, TargetGrid};
pub use raster::{ClassRaster, ClassWindow, GeoTransform, SourceRaster};
pub use resample::{CellOutcome, CellSample, ClassHistogram, Resampler, RunSummary};
pub use taxonomy::{ClassEntry, ClassTaxonomy};
pub use urban::UrbanThresholds;
