//! Source raster access: affine georeferencing, windowed reads, and an
//! in-memory class-code raster.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ── Affine transform ──────────────────────────────────────────────────────────

/// Affine mapping between (row, col) pixel space and planar (x, y).
///
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `origin_*` is the outer corner of pixel (0, 0). North-up rasters have zero
/// rotation terms and a negative `pixel_height`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    pub pixel_width: f64,
    pub pixel_height: f64,
    pub row_rotation: f64,
    pub col_rotation: f64,
}

impl GeoTransform {
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// From a GDAL-ordered coefficient array
    /// `[origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]`.
    pub fn from_gdal(c: [f64; 6]) -> Self {
        Self {
            origin_x: c[0],
            pixel_width: c[1],
            row_rotation: c[2],
            origin_y: c[3],
            col_rotation: c[4],
            pixel_height: c[5],
        }
    }

    fn det(&self) -> f64 {
        self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation
    }

    pub fn is_invertible(&self) -> bool {
        let det = self.det();
        det.is_finite() && det.abs() > 1e-12
    }

    /// Planar coordinates of the centre of pixel (row, col). Indices may lie
    /// outside the raster.
    pub fn xy(&self, row: i64, col: i64) -> (f64, f64) {
        let r = row as f64 + 0.5;
        let c = col as f64 + 0.5;
        (
            self.origin_x + c * self.pixel_width + r * self.row_rotation,
            self.origin_y + c * self.col_rotation + r * self.pixel_height,
        )
    }

    /// (row, col) of the pixel containing planar (x, y), flooring fractional
    /// positions. Points left of or above the raster give negative indices.
    pub fn index(&self, x: f64, y: f64) -> (i64, i64) {
        let det = self.det();
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;
        (row.floor() as i64, col.floor() as i64)
    }
}

// ── Windows ───────────────────────────────────────────────────────────────────

/// A row-major block of class codes read from a source raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassWindow {
    pub data: Vec<u8>,
    pub rows: usize,
    pub cols: usize,
}

impl ClassWindow {
    pub fn empty() -> Self {
        Self { data: Vec::new(), rows: 0, cols: 0 }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.data[row * self.cols + col]
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

// ── Accessor trait ────────────────────────────────────────────────────────────

/// Read access to a georeferenced categorical raster.
pub trait SourceRaster: Sync {
    /// Pixel containing planar (x, y); may be out of range.
    fn index(&self, x: f64, y: f64) -> (i64, i64);

    /// Planar centre of pixel (row, col).
    fn xy(&self, row: i64, col: i64) -> (f64, f64);

    /// Read the half-open window `rows × cols`. The result is clipped to the
    /// raster extent, so a window reaching outside comes back smaller than
    /// requested.
    fn read_window(&self, rows: Range<i64>, cols: Range<i64>) -> Result<ClassWindow>;

    /// Coordinate reference system descriptor (PROJ string or WKT), if known.
    fn crs(&self) -> Option<&str>;
}

// ── In-memory raster ──────────────────────────────────────────────────────────

/// A class-code raster held in memory, row-major, row 0 at `origin_y`.
#[derive(Debug, Clone)]
pub struct ClassRaster {
    data: Vec<u8>,
    width: usize,
    height: usize,
    transform: GeoTransform,
    crs: Option<String>,
}

impl ClassRaster {
    pub fn new(data: Vec<u8>, width: usize, height: usize, transform: GeoTransform) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::SizeMismatch {
                name: "raster".into(),
                expected: vec![height, width],
                actual: vec![data.len()],
            });
        }
        if !transform.is_invertible() {
            return Err(Error::invalid("transform", format!("{transform:?}"), "not invertible"));
        }
        Ok(Self { data, width, height, transform, crs: None })
    }

    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = Some(crs.into());
        self
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.data[row * self.width + col]
    }
}

/// `range` clamped to `0..len`; empty when it lies wholly outside.
pub fn clip(range: Range<i64>, len: usize) -> Range<usize> {
    let len = len as i64;
    let start = range.start.clamp(0, len);
    let end = range.end.clamp(start, len);
    start as usize..end as usize
}

impl SourceRaster for ClassRaster {
    fn index(&self, x: f64, y: f64) -> (i64, i64) {
        self.transform.index(x, y)
    }

    fn xy(&self, row: i64, col: i64) -> (f64, f64) {
        self.transform.xy(row, col)
    }

    fn read_window(&self, rows: Range<i64>, cols: Range<i64>) -> Result<ClassWindow> {
        let rows = clip(rows, self.height);
        let cols = clip(cols, self.width);
        if rows.is_empty() || cols.is_empty() {
            return Ok(ClassWindow::empty());
        }
        let mut data = Vec::with_capacity(rows.len() * cols.len());
        for r in rows.clone() {
            let start = r * self.width;
            data.extend_from_slice(&self.data[start + cols.start..start + cols.end]);
        }
        Ok(ClassWindow { data, rows: rows.len(), cols: cols.len() })
    }

    fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }
}
