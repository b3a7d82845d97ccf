//! Target grid coordinates and the output fields written by the resampler.

use serde::{Deserialize, Serialize};

use crate::coords::{CellIndex, LatLon};
use crate::error::{Error, Result};

// ── 2-D field ─────────────────────────────────────────────────────────────────

/// A row-major 2-D array indexed by (j, i).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field<T> {
    pub data: Vec<T>,
    pub width: usize,
    pub height: usize,
}

impl<T: Copy> Field<T> {
    pub fn filled(width: usize, height: usize, fill: T) -> Self {
        Self { data: vec![fill; width * height], width, height }
    }

    pub fn from_vec(data: Vec<T>, width: usize, height: usize) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::SizeMismatch {
                name: "field".into(),
                expected: vec![height, width],
                actual: vec![data.len()],
            });
        }
        Ok(Self { data, width, height })
    }

    #[inline]
    pub fn get(&self, j: usize, i: usize) -> T {
        self.data[j * self.width + i]
    }

    #[inline]
    pub fn set(&mut self, j: usize, i: usize, val: T) {
        self.data[j * self.width + i] = val;
    }

    /// Bounds-checked read.
    pub fn try_get(&self, j: usize, i: usize) -> Result<T> {
        if j >= self.height || i >= self.width {
            return Err(Error::IndexOutOfBounds {
                row: j,
                col: i,
                rows: self.height,
                cols: self.width,
            });
        }
        Ok(self.get(j, i))
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }
}

// ── Target grid ───────────────────────────────────────────────────────────────

/// Geographic coordinates of the target model grid.
///
/// Mass points define the cell count; corner arrays are staggered by half a
/// cell and may be one larger than the mass grid along either axis.
#[derive(Debug, Clone)]
pub struct TargetGrid {
    pub mass_lat: Field<f64>,
    pub mass_lon: Field<f64>,
    pub corner_lat: Field<f64>,
    pub corner_lon: Field<f64>,
}

impl TargetGrid {
    pub fn new(
        mass_lat: Field<f64>,
        mass_lon: Field<f64>,
        corner_lat: Field<f64>,
        corner_lon: Field<f64>,
    ) -> Result<Self> {
        if mass_lat.shape() != mass_lon.shape() {
            return Err(Error::SizeMismatch {
                name: "mass_lon".into(),
                expected: vec![mass_lat.height, mass_lat.width],
                actual: vec![mass_lon.height, mass_lon.width],
            });
        }
        Ok(Self { mass_lat, mass_lon, corner_lat, corner_lon })
    }

    /// Mass-grid dimensions (ny, nx).
    pub fn shape(&self) -> (usize, usize) {
        self.mass_lat.shape()
    }

    /// Corner coordinate at staggered index (j, i).
    pub fn corner(&self, j: usize, i: usize) -> Result<LatLon> {
        Ok(LatLon::new(self.corner_lat.try_get(j, i)?, self.corner_lon.try_get(j, i)?))
    }

    /// Mass point whose coordinates are closest to `target`.
    pub fn nearest_mass_point(&self, target: LatLon) -> Option<CellIndex> {
        let (ny, nx) = self.shape();
        (0..ny)
            .flat_map(|j| (0..nx).map(move |i| CellIndex::new(j, i)))
            .map(|c| {
                let p = LatLon::new(self.mass_lat.get(c.j, c.i), self.mass_lon.get(c.j, c.i));
                (c, p.dist2(target))
            })
            .filter(|(_, d)| d.is_finite())
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(c, _)| c)
    }
}

// ── Outputs ───────────────────────────────────────────────────────────────────

/// Per-category land-use fractions, stored category-major
/// (`num_land_cat × height × width`). Categories are 1-based.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandUseFractions {
    pub data: Vec<f32>,
    pub num_land_cat: usize,
    pub width: usize,
    pub height: usize,
}

impl LandUseFractions {
    pub fn zeros(num_land_cat: usize, width: usize, height: usize) -> Self {
        Self { data: vec![0.0; num_land_cat * width * height], num_land_cat, width, height }
    }

    #[inline]
    fn offset(&self, category: u8, j: usize, i: usize) -> usize {
        debug_assert!(category >= 1 && usize::from(category) <= self.num_land_cat);
        ((usize::from(category) - 1) * self.height + j) * self.width + i
    }

    #[inline]
    pub fn get(&self, category: u8, j: usize, i: usize) -> f32 {
        self.data[self.offset(category, j, i)]
    }

    #[inline]
    pub fn set(&mut self, category: u8, j: usize, i: usize, val: f32) {
        let k = self.offset(category, j, i);
        self.data[k] = val;
    }

    /// Overwrite one category plane from a 2-D field of the same shape.
    pub fn set_plane(&mut self, category: u8, plane: &Field<f32>) {
        let n = self.width * self.height;
        let start = (usize::from(category) - 1) * n;
        self.data[start..start + n].copy_from_slice(&plane.data);
    }
}

/// The three fields the resampler populates.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFields {
    /// LANDUSEF
    pub landusef: LandUseFractions,
    /// LU_INDEX
    pub lu_index: Field<f32>,
    /// FRC_URB2D
    pub frc_urb2d: Field<f32>,
}

impl OutputFields {
    pub fn zeros(width: usize, height: usize, num_land_cat: usize) -> Self {
        Self {
            landusef: LandUseFractions::zeros(num_land_cat, width, height),
            lu_index: Field::filled(width, height, 0.0),
            frc_urb2d: Field::filled(width, height, 0.0),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.lu_index.shape()
    }

    pub fn num_land_cat(&self) -> usize {
        self.landusef.num_land_cat
    }
}
