//! Cell geometry: target-cell corners in the source raster's planar CRS and
//! boundary-inclusive point-in-polygon tests against them.

use geo::{BoundingRect, Coord, Intersects, LineString, Polygon};

use crate::coords::{CellIndex, LatLon};
use crate::error::{Error, Result};
use crate::grid::TargetGrid;

// ── Projection service ────────────────────────────────────────────────────────

/// Maps geographic (lon, lat) onto the source raster's planar (x, y).
pub trait Projection: Sync {
    fn project(&self, lon: f64, lat: f64) -> Result<(f64, f64)>;
}

impl<F> Projection for F
where
    F: Fn(f64, f64) -> Result<(f64, f64)> + Sync,
{
    fn project(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        self(lon, lat)
    }
}

/// Passes coordinates through unchanged (x = lon, y = lat). For target grids
/// whose "geographic" arrays are already in the raster CRS.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlanarProjection;

impl Projection for PlanarProjection {
    fn project(&self, lon: f64, lat: f64) -> Result<(f64, f64)> {
        Ok((lon, lat))
    }
}

// ── Cell polygon ──────────────────────────────────────────────────────────────

/// Axis-aligned bounds in planar coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// A target cell projected into the raster CRS.
#[derive(Debug, Clone)]
pub struct CellGeometry {
    /// Corner eastings, bottom-left → bottom-right → top-right → top-left.
    pub xc: [f64; 4],
    /// Corner northings, same order as `xc`.
    pub yc: [f64; 4],
    polygon: Polygon<f64>,
}

impl CellGeometry {
    /// Build the polygon from four ordered corners. The ring is closed
    /// implicitly (last corner connects back to the first).
    pub fn from_corners(xc: [f64; 4], yc: [f64; 4]) -> Self {
        let ring: Vec<Coord<f64>> = xc.iter().zip(yc.iter()).map(|(&x, &y)| Coord { x, y }).collect();
        let polygon = Polygon::new(LineString::new(ring), Vec::new());
        Self { xc, yc, polygon }
    }

    /// True when (x, y) lies inside the cell or on its boundary.
    #[inline]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.polygon.intersects(&Coord { x, y })
    }

    pub fn bounds(&self) -> Bounds {
        match self.polygon.bounding_rect() {
            Some(r) => Bounds { min_x: r.min().x, min_y: r.min().y, max_x: r.max().x, max_y: r.max().y },
            None => Bounds { min_x: f64::NAN, min_y: f64::NAN, max_x: f64::NAN, max_y: f64::NAN },
        }
    }
}

// ── Resolver ──────────────────────────────────────────────────────────────────

/// Geographic corners of the quadrilateral spanning `extent` cells from `cell`.
///
/// Fails with `IndexOutOfBounds` when the cell sits within `extent` of the
/// corner arrays' outer edge.
pub fn corner_latlon(grid: &TargetGrid, cell: CellIndex, extent: usize) -> Result<[LatLon; 4]> {
    let idx = cell.corner_indices(extent);
    Ok([
        grid.corner(idx[0].0, idx[0].1)?,
        grid.corner(idx[1].0, idx[1].1)?,
        grid.corner(idx[2].0, idx[2].1)?,
        grid.corner(idx[3].0, idx[3].1)?,
    ])
}

/// Resolve a target cell into planar corners and its containment polygon.
pub fn resolve_cell<P: Projection + ?Sized>(
    grid: &TargetGrid,
    cell: CellIndex,
    extent: usize,
    projection: &P,
) -> Result<CellGeometry> {
    if extent == 0 {
        return Err(Error::invalid("extent", 0, "must be at least 1"));
    }
    let corners = corner_latlon(grid, cell, extent)?;
    let mut xc = [0.0; 4];
    let mut yc = [0.0; 4];
    for (k, c) in corners.iter().enumerate() {
        let (x, y) = projection.project(c.lon, c.lat)?;
        if !x.is_finite() || !y.is_finite() {
            return Err(Error::Projection { lon: c.lon, lat: c.lat, reason: "non-finite result".into() });
        }
        xc[k] = x;
        yc[k] = y;
    }
    Ok(CellGeometry::from_corners(xc, yc))
}
