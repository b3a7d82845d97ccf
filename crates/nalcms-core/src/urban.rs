//! Urban sub-classification from the urban areal fraction.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// WRF low-intensity residential category.
pub const LOW_DENSITY_URBAN: u8 = 31;
/// WRF high-intensity residential category.
pub const HIGH_DENSITY_URBAN: u8 = 32;
/// WRF industrial / commercial category.
pub const COMMERCIAL_URBAN: u8 = 33;

/// Ascending urban-fraction cut-offs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UrbanThresholds {
    pub low: f64,
    pub high: f64,
    pub commercial: f64,
}

impl Default for UrbanThresholds {
    fn default() -> Self {
        Self { low: 0.60, high: 0.90, commercial: 0.95 }
    }
}

impl UrbanThresholds {
    pub fn new(low: f64, high: f64, commercial: f64) -> Result<Self> {
        let t = Self { low, high, commercial };
        t.validate()?;
        Ok(t)
    }

    /// Each threshold lies in [0, 1] and low ≤ high ≤ commercial.
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [("urban.low", self.low), ("urban.high", self.high), ("urban.commercial", self.commercial)] {
            if !(0.0..=1.0).contains(&v) {
                return Err(Error::invalid(name, v, "must be within [0, 1]"));
            }
        }
        if self.low > self.high || self.high > self.commercial {
            return Err(Error::invalid(
                "urban thresholds",
                format!("{}/{}/{}", self.low, self.high, self.commercial),
                "must be ascending (low <= high <= commercial)",
            ));
        }
        Ok(())
    }

    /// Category for a cell whose dominant class is urban. Falls back to
    /// `urban_target` below the low threshold.
    pub fn classify(&self, fraction: f64, urban_target: u8) -> u8 {
        if fraction >= self.commercial {
            COMMERCIAL_URBAN
        } else if fraction >= self.high {
            HIGH_DENSITY_URBAN
        } else if fraction >= self.low {
            LOW_DENSITY_URBAN
        } else {
            urban_target
        }
    }
}
