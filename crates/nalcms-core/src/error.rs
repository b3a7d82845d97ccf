//! Error types for the resampler.

use thiserror::Error;

/// Errors surfaced by the resampler and its collaborators.
///
/// Per-cell skip conditions (window outside the source raster, all no-data)
/// are not errors; they are handled inside the resampler.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Projection failed for (lon={lon}, lat={lat}): {reason}")]
    Projection { lon: f64, lat: f64, reason: String },

    #[error("Index out of bounds: ({row}, {col}) in array of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Size mismatch for {name}: expected {expected:?}, got {actual:?}")]
    SizeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Variable not found in dataset: {0}")]
    MissingVariable(String),

    #[cfg(feature = "netcdf")]
    #[error("NetCDF error: {0}")]
    NetCdf(#[from] netcdf::Error),

    #[error("Raster read failed: {0}")]
    Raster(String),

    #[error("Unsupported dataset format: {0}")]
    UnsupportedFormat(String),

    #[error("Unknown processing mode '{0}' (expected 'all' or 'urban')")]
    UnknownMode(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },
}

impl Error {
    pub(crate) fn invalid(name: &'static str, value: impl ToString, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for resampler operations.
pub type Result<T> = std::result::Result<T, Error>;
