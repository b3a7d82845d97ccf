//! Geographic → raster CRS projection backed by proj4rs.

use anyhow::{anyhow, Result};
use nalcms_core::{Error, Projection};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

/// NALCMS is distributed in Lambert Azimuthal Equal Area on a sphere.
pub const NALCMS_PROJ: &str =
    "+proj=laea +lat_0=45 +lon_0=-100 +x_0=0 +y_0=0 +a=6370997 +b=6370997 +units=m +no_defs";

/// Geographic CRS of the WRF latitude / longitude arrays.
pub const WGS84_PROJ: &str = "+proj=longlat +datum=WGS84 +no_defs";

pub struct Proj4Projection {
    source: Proj,
    target: Proj,
    target_is_geographic: bool,
}

impl Proj4Projection {
    /// Project from WGS84 longitude / latitude into `target` (a PROJ string).
    pub fn new(target: &str) -> Result<Self> {
        let source = Proj::from_proj_string(WGS84_PROJ).map_err(|e| anyhow!("Invalid source projection: {e:?}"))?;
        let target_proj =
            Proj::from_proj_string(target).map_err(|e| anyhow!("Invalid target projection '{target}': {e:?}"))?;
        Ok(Self {
            source,
            target_is_geographic: target_proj.is_latlong(),
            target: target_proj,
        })
    }
}

impl Projection for Proj4Projection {
    fn project(&self, lon: f64, lat: f64) -> nalcms_core::Result<(f64, f64)> {
        // proj4rs works in radians for geographic coordinates
        let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
        transform(&self.source, &self.target, &mut point).map_err(|e| Error::Projection {
            lon,
            lat,
            reason: format!("{e:?}"),
        })?;
        if !point.0.is_finite() || !point.1.is_finite() {
            return Err(Error::Projection { lon, lat, reason: "non-finite result".into() });
        }
        Ok(if self.target_is_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        })
    }
}
