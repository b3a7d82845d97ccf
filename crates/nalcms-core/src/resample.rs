//! Containment-based area-weighted resampling of class codes onto target cells.
//!
//! Per cell:
//!   corners → planar bbox → source index window → pixel-centre mesh →
//!   windowed read → containment mask → histogram → fractions / dominant class
//!   → output fields.
//!
//! Cells are independent; with the `threading` feature rows are evaluated in
//! parallel and written back afterwards in row-major order.

use std::collections::BTreeMap;

use crate::config::{ProcessingMode, ResampleConfig};
use crate::coords::CellIndex;
use crate::error::{Error, Result};
use crate::geometry::{resolve_cell, CellGeometry, Projection};
use crate::grid::{OutputFields, TargetGrid};
use crate::raster::{ClassWindow, SourceRaster};
use crate::taxonomy::{NO_DATA, NUM_SOURCE_CLASSES, URBAN_CODE};

/// Codes outside the taxonomy are read as no data.
#[inline]
fn is_no_data(code: u8) -> bool {
    code == NO_DATA || usize::from(code) >= NUM_SOURCE_CLASSES
}

// ── Per-cell sampling ─────────────────────────────────────────────────────────

/// Source samples around one target cell.
///
/// `data` is whatever the raster returned for the requested `rows × cols`
/// window, which is smaller when the window leaves the raster. `xx`, `yy`,
/// `mask` are row-major `rows × cols` aligned with the window, and empty when
/// the read came back short.
#[derive(Debug, Clone)]
pub struct CellSample {
    pub rows: usize,
    pub cols: usize,
    pub xx: Vec<f64>,
    pub yy: Vec<f64>,
    pub data: ClassWindow,
    pub mask: Vec<bool>,
    pub geometry: CellGeometry,
}

impl CellSample {
    /// The read window has the same shape as the mesh.
    pub fn is_complete(&self) -> bool {
        self.data.shape() == (self.rows, self.cols)
    }

    /// Codes of samples inside the cell polygon. Only meaningful when
    /// `is_complete()`.
    pub fn contained_codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.data.data.iter().zip(&self.mask).filter(|(_, &m)| m).map(|(&c, _)| c)
    }
}

/// Sample the source raster over the bounding window of target cell `cell`.
pub fn sample_cell<R, P>(
    grid: &TargetGrid,
    cell: CellIndex,
    extent: usize,
    projection: &P,
    raster: &R,
) -> Result<CellSample>
where
    R: SourceRaster + ?Sized,
    P: Projection + ?Sized,
{
    let geometry = resolve_cell(grid, cell, extent, projection)?;
    let b = geometry.bounds();

    // The bbox may be traversed in either index direction depending on the
    // sign of the pixel size, so order each range explicitly.
    let (ra, ca) = raster.index(b.min_x, b.min_y);
    let (rb, cb) = raster.index(b.max_x, b.max_y);
    let (r0, r1) = (ra.min(rb), ra.max(rb));
    let (c0, c1) = (ca.min(cb), ca.max(cb));
    let overflow = || {
        Error::invalid("cell window", format!("rows {r0}..={r1}, cols {c0}..={c1}"), "index range overflows")
    };
    let row_end = r1.checked_add(1).ok_or_else(overflow)?;
    let col_end = c1.checked_add(1).ok_or_else(overflow)?;
    let rows = row_end.checked_sub(r0).and_then(|n| usize::try_from(n).ok()).ok_or_else(overflow)?;
    let cols = col_end.checked_sub(c0).and_then(|n| usize::try_from(n).ok()).ok_or_else(overflow)?;
    rows.checked_mul(cols).ok_or_else(overflow)?;

    let data = raster.read_window(r0..row_end, c0..col_end)?;
    if data.shape() != (rows, cols) {
        return Ok(CellSample { rows, cols, xx: Vec::new(), yy: Vec::new(), data, mask: Vec::new(), geometry });
    }

    let xs: Vec<f64> = (c0..=c1).map(|c| raster.xy(r0, c).0).collect();
    let ys: Vec<f64> = (r0..=r1).map(|r| raster.xy(r, c0).1).collect();

    let mut xx = Vec::with_capacity(rows * cols);
    let mut yy = Vec::with_capacity(rows * cols);
    let mut mask = Vec::with_capacity(rows * cols);
    for &y in &ys {
        for &x in &xs {
            xx.push(x);
            yy.push(y);
            mask.push(geometry.contains(x, y));
        }
    }

    Ok(CellSample { rows, cols, xx, yy, data, mask, geometry })
}

// ── Histogram ─────────────────────────────────────────────────────────────────

/// Counts of contained samples per source code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassHistogram {
    pub counts: [u64; NUM_SOURCE_CLASSES],
    pub total: u64,
}

impl ClassHistogram {
    pub fn from_codes(codes: impl IntoIterator<Item = u8>) -> Self {
        let mut counts = [0u64; NUM_SOURCE_CLASSES];
        let mut total = 0u64;
        for code in codes {
            let bin = if is_no_data(code) { usize::from(NO_DATA) } else { usize::from(code) };
            counts[bin] += 1;
            total += 1;
        }
        Self { counts, total }
    }

    /// Per-code fraction of the contained samples; `None` when nothing is
    /// contained.
    pub fn fractions(&self) -> Option<[f64; NUM_SOURCE_CLASSES]> {
        if self.total == 0 {
            return None;
        }
        let n = self.total as f64;
        let mut f = [0.0; NUM_SOURCE_CLASSES];
        for (dst, &c) in f.iter_mut().zip(self.counts.iter()) {
            *dst = c as f64 / n;
        }
        Some(f)
    }
}

/// Code with the largest fraction; ties go to the lowest code.
pub fn dominant_code(fractions: &[f64; NUM_SOURCE_CLASSES]) -> u8 {
    let mut best = 0usize;
    for (code, &f) in fractions.iter().enumerate().skip(1) {
        if f > fractions[best] {
            best = code;
        }
    }
    best as u8
}

/// Result of resampling one target cell.
#[derive(Debug, Clone, PartialEq)]
pub struct CellOutcome {
    /// Indexed by source code, including code 0.
    pub fractions: [f64; NUM_SOURCE_CLASSES],
    pub dominant: u8,
    /// Fraction of "Urban and Built-up".
    pub urban_fraction: f64,
}

impl CellOutcome {
    /// Reduce a sample to fractions and a dominant class. `None` when the
    /// window left the raster, held only no-data, or contained no samples.
    pub fn from_sample(sample: &CellSample) -> Option<Self> {
        if !sample.is_complete() {
            return None;
        }
        if sample.data.data.iter().all(|&c| is_no_data(c)) {
            return None;
        }
        let fractions = ClassHistogram::from_codes(sample.contained_codes()).fractions()?;
        Some(Self {
            dominant: dominant_code(&fractions),
            urban_fraction: fractions[usize::from(URBAN_CODE)],
            fractions,
        })
    }
}

// ── Resampler ─────────────────────────────────────────────────────────────────

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Cells visited.
    pub cells: usize,
    /// Cells that wrote at least one output entry.
    pub written: usize,
}

/// Drives per-cell resampling over the target grid.
pub struct Resampler<'a, R: ?Sized, P: ?Sized> {
    grid: &'a TargetGrid,
    raster: &'a R,
    projection: &'a P,
    config: &'a ResampleConfig,
}

impl<'a, R, P> Resampler<'a, R, P>
where
    R: SourceRaster + ?Sized,
    P: Projection + ?Sized,
{
    pub fn new(
        grid: &'a TargetGrid,
        raster: &'a R,
        projection: &'a P,
        config: &'a ResampleConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self { grid, raster, projection, config })
    }

    /// Number of (rows, cols) of target cells visited. The last `extent`
    /// rows and columns are excluded so every corner lookup stays in range.
    pub fn cell_range(&self) -> (usize, usize) {
        let (ny, nx) = self.grid.shape();
        let e = self.config.extent;
        (ny.saturating_sub(e), nx.saturating_sub(e))
    }

    pub fn sample(&self, cell: CellIndex) -> Result<CellSample> {
        sample_cell(self.grid, cell, self.config.extent, self.projection, self.raster)
    }

    /// Pure per-cell evaluation.
    pub fn evaluate(&self, cell: CellIndex) -> Result<Option<CellOutcome>> {
        Ok(CellOutcome::from_sample(&self.sample(cell)?))
    }

    fn evaluate_row(&self, j: usize, rows: usize, cols: usize) -> Result<Vec<Option<CellOutcome>>> {
        log::debug!("row {}/{}", j + 1, rows);
        (0..cols).map(|i| self.evaluate(CellIndex::new(j, i))).collect()
    }

    /// Every output field must cover the target grid, with backing data of
    /// exactly that size.
    fn check_outputs(&self, out: &OutputFields) -> Result<()> {
        let (ny, nx) = self.grid.shape();
        let check = |name: &str, expected: Vec<usize>, actual: Vec<usize>, len: usize| {
            if expected != actual {
                return Err(Error::SizeMismatch { name: name.into(), expected, actual });
            }
            if len != expected.iter().product::<usize>() {
                return Err(Error::SizeMismatch { name: name.into(), expected, actual: vec![len] });
            }
            Ok(())
        };
        for (name, field) in [("LU_INDEX", &out.lu_index), ("FRC_URB2D", &out.frc_urb2d)] {
            check(name, vec![ny, nx], vec![field.height, field.width], field.data.len())?;
        }
        let lf = &out.landusef;
        check(
            "LANDUSEF",
            vec![lf.num_land_cat, ny, nx],
            vec![lf.num_land_cat, lf.height, lf.width],
            lf.data.len(),
        )?;
        let needed = usize::from(self.config.taxonomy.max_target());
        if out.num_land_cat() < needed {
            return Err(Error::invalid(
                "num_land_cat",
                out.num_land_cat(),
                format!("taxonomy maps onto category {needed}"),
            ));
        }
        Ok(())
    }

    /// Resample every visited cell into `out` using the configured mode.
    ///
    /// Fails before touching `out` on configuration or shape problems; an
    /// upstream failure (projection, raster read) aborts the run.
    pub fn run(&self, out: &mut OutputFields) -> Result<RunSummary> {
        self.check_outputs(out)?;
        let (rows, cols) = self.cell_range();
        let mut summary = RunSummary::default();
        log::info!(
            "Resampling {} x {} target cells (mode={}, urban_multi={})",
            rows,
            cols,
            self.config.mode,
            self.config.urban_multi
        );

        #[cfg(feature = "threading")]
        {
            use rayon::prelude::*;
            let evaluated: Vec<Vec<Option<CellOutcome>>> = (0..rows)
                .into_par_iter()
                .map(|j| self.evaluate_row(j, rows, cols))
                .collect::<Result<_>>()?;
            for (j, row) in evaluated.into_iter().enumerate() {
                for (i, outcome) in row.into_iter().enumerate() {
                    summary.cells += 1;
                    if let Some(o) = outcome {
                        summary.written += usize::from(self.apply(CellIndex::new(j, i), &o, out));
                    }
                }
            }
        }

        #[cfg(not(feature = "threading"))]
        for j in 0..rows {
            let row = self.evaluate_row(j, rows, cols)?;
            for (i, outcome) in row.into_iter().enumerate() {
                summary.cells += 1;
                if let Some(o) = outcome {
                    summary.written += usize::from(self.apply(CellIndex::new(j, i), &o, out));
                }
            }
        }

        if self.config.mode == ProcessingMode::Urban {
            let urban = self.config.taxonomy.urban_target();
            out.landusef.set_plane(urban, &out.frc_urb2d);
        }

        log::info!("Resampled {} cells, {} written", summary.cells, summary.written);
        Ok(summary)
    }

    /// Write one outcome. Returns whether anything was written.
    pub fn apply(&self, cell: CellIndex, o: &CellOutcome, out: &mut OutputFields) -> bool {
        match self.config.mode {
            ProcessingMode::All => self.apply_all(cell, o, out),
            ProcessingMode::Urban => self.apply_urban(cell, o, out),
        }
    }

    fn apply_all(&self, CellIndex { j, i }: CellIndex, o: &CellOutcome, out: &mut OutputFields) -> bool {
        if o.dominant == NO_DATA {
            return false;
        }
        let taxonomy = &self.config.taxonomy;

        // Several source codes may share a target category; their fractions add.
        let mut per_target: BTreeMap<u8, f64> = BTreeMap::new();
        for (code, &f) in o.fractions.iter().enumerate().skip(1) {
            if f > 0.0 {
                if let Some(t) = taxonomy.target(code as u8) {
                    *per_target.entry(t).or_insert(0.0) += f;
                }
            }
        }
        for (&t, &f) in &per_target {
            out.landusef.set(t, j, i, f as f32);
        }

        if o.urban_fraction > 0.0 {
            out.frc_urb2d.set(j, i, o.urban_fraction as f32);
        }

        let urban = taxonomy.urban_target();
        let lu = match taxonomy.target(o.dominant) {
            Some(_) if o.dominant == URBAN_CODE && self.config.urban_multi => {
                self.config.thresholds.classify(o.urban_fraction, urban)
            }
            Some(t) => t,
            None => return true,
        };
        out.lu_index.set(j, i, f32::from(lu));
        true
    }

    fn apply_urban(&self, CellIndex { j, i }: CellIndex, o: &CellOutcome, out: &mut OutputFields) -> bool {
        let mut wrote = false;
        if o.urban_fraction > 0.0 {
            out.frc_urb2d.set(j, i, o.urban_fraction as f32);
            wrote = true;
        }
        if o.dominant == URBAN_CODE {
            let urban = self.config.taxonomy.urban_target();
            let lu = if self.config.urban_multi {
                self.config.thresholds.classify(o.urban_fraction, urban)
            } else {
                urban
            };
            out.lu_index.set(j, i, f32::from(lu));
            wrote = true;
        }
        wrote
    }
}

// ── Unit tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PlanarProjection;
    use crate::grid::Field;
    use crate::raster::{ClassRaster, GeoTransform};
    use crate::urban::{COMMERCIAL_URBAN, HIGH_DENSITY_URBAN};
    use approx::assert_relative_eq;

    const NUM_LAND_CAT: usize = 21;

    /// 10×10 source raster with pixel centres at integer (x, y), x = col,
    /// y = 9 - row.
    fn raster_10(fill: impl Fn(usize, usize) -> u8) -> ClassRaster {
        let data = (0..10).flat_map(|r| (0..10).map(move |c| (r, c))).map(|(r, c)| fill(r, c)).collect();
        ClassRaster::new(data, 10, 10, GeoTransform::north_up(-0.5, 9.5, 1.0, -1.0)).unwrap()
    }

    /// A 2×2 mass grid whose single visited cell (0, 0) has planar corners
    /// (x0, y0) .. (x1, y1) under the planar projection.
    fn one_cell_grid(x0: f64, y0: f64, x1: f64, y1: f64) -> TargetGrid {
        let lat = Field::from_vec(vec![y0, y0, y1, y1], 2, 2).unwrap();
        let lon = Field::from_vec(vec![x0, x1, x0, x1], 2, 2).unwrap();
        TargetGrid::new(lat.clone(), lon.clone(), lat, lon).unwrap()
    }

    fn run(grid: &TargetGrid, raster: &ClassRaster, cfg: &ResampleConfig, out: &mut OutputFields) -> RunSummary {
        Resampler::new(grid, raster, &PlanarProjection, cfg).unwrap().run(out).unwrap()
    }

    fn zeros(grid: &TargetGrid) -> OutputFields {
        let (ny, nx) = grid.shape();
        OutputFields::zeros(nx, ny, NUM_LAND_CAT)
    }

    /// Rows 0..n_first (northern) hold `first`, the rest `second`.
    fn split(n_first: usize, first: u8, second: u8) -> ClassRaster {
        raster_10(move |r, _| if r < n_first { first } else { second })
    }

    #[test]
    fn uniform_cell_has_unit_fraction() {
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        let raster = raster_10(|_, _| 15);
        let cfg = ResampleConfig::default();
        let r = Resampler::new(&grid, &raster, &PlanarProjection, &cfg).unwrap();

        let o = r.evaluate(CellIndex::new(0, 0)).unwrap().unwrap();
        assert_eq!(o.fractions[15], 1.0);
        assert_eq!(o.dominant, 15);

        let mut out = zeros(&grid);
        r.run(&mut out).unwrap();
        assert_eq!(out.landusef.get(12, 0, 0), 1.0);
        assert_eq!(out.lu_index.get(0, 0), 12.0);
        assert_eq!(out.frc_urb2d.get(0, 0), 0.0);
    }

    #[test]
    fn boundary_samples_count_as_contained() {
        // 2×2 source pixels whose centres sit exactly on the target corners.
        let raster = ClassRaster::new(vec![6; 4], 2, 2, GeoTransform::north_up(-0.5, 1.5, 1.0, -1.0)).unwrap();
        let grid = one_cell_grid(0.0, 0.0, 1.0, 1.0);
        let s = sample_cell(&grid, CellIndex::new(0, 0), 1, &PlanarProjection, &raster).unwrap();
        assert_eq!((s.rows, s.cols), (2, 2));
        assert!(s.is_complete());
        assert_eq!(s.mask, vec![true; 4]);
    }

    #[test]
    fn mesh_follows_pixel_centres() {
        let grid = one_cell_grid(2.0, 3.0, 4.0, 5.0);
        let raster = raster_10(|_, _| 1);
        let s = sample_cell(&grid, CellIndex::new(0, 0), 1, &PlanarProjection, &raster).unwrap();
        assert_eq!((s.rows, s.cols), (3, 3));
        // First mesh row is the northernmost window row.
        assert_eq!(&s.xx[..3], &[2.0, 3.0, 4.0]);
        assert_eq!(&s.yy[..3], &[5.0, 5.0, 5.0]);
        assert_eq!(s.yy[8], 3.0);
    }

    #[test]
    fn mixed_forest_and_urban_scenario() {
        // 60 samples of code 1 (→ 18), 40 of code 17 (→ 13).
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        let raster = split(6, 1, URBAN_CODE);
        let cfg = ResampleConfig { urban_multi: true, ..ResampleConfig::default() };
        let mut out = zeros(&grid);
        let summary = run(&grid, &raster, &cfg, &mut out);

        assert_eq!(summary, RunSummary { cells: 1, written: 1 });
        assert_eq!(out.lu_index.get(0, 0), 18.0);
        assert_relative_eq!(out.frc_urb2d.get(0, 0), 0.4);
        assert_relative_eq!(out.landusef.get(18, 0, 0), 0.6);
        assert_relative_eq!(out.landusef.get(13, 0, 0), 0.4);
    }

    #[test]
    fn dense_urban_becomes_commercial() {
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        // 97 urban samples, 3 forest.
        let raster = raster_10(|r, c| if r == 9 && c < 3 { 1 } else { URBAN_CODE });
        let cfg = ResampleConfig { urban_multi: true, ..ResampleConfig::default() };
        let mut out = zeros(&grid);
        run(&grid, &raster, &cfg, &mut out);

        assert_eq!(out.lu_index.get(0, 0), f32::from(COMMERCIAL_URBAN));
        assert_relative_eq!(out.frc_urb2d.get(0, 0), 0.97);
    }

    #[test]
    fn urban_without_multi_keeps_plain_category() {
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        let raster = raster_10(|_, _| URBAN_CODE);
        let mut out = zeros(&grid);
        run(&grid, &raster, &ResampleConfig::default(), &mut out);
        assert_eq!(out.lu_index.get(0, 0), 13.0);
        assert_eq!(out.frc_urb2d.get(0, 0), 1.0);
    }

    #[test]
    fn aliased_codes_sum_into_one_slot() {
        // codes 4 and 5 both map to category 4.
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        let raster = raster_10(|r, _| match r {
            0..=2 => 4,
            3..=5 => 5,
            _ => 1,
        });
        let mut out = zeros(&grid);
        run(&grid, &raster, &ResampleConfig::default(), &mut out);
        assert_relative_eq!(out.landusef.get(4, 0, 0), 0.6, epsilon = 1e-6);
        assert_relative_eq!(out.landusef.get(18, 0, 0), 0.4, epsilon = 1e-6);
        // Dominance is decided per source code: code 1 (0.4) beats 4 and 5 (0.3 each).
        assert_eq!(out.lu_index.get(0, 0), 18.0);
    }

    #[test]
    fn no_data_window_is_left_untouched() {
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        let raster = raster_10(|_, _| NO_DATA);
        let mut out = zeros(&grid);
        let before = out.clone();
        let summary = run(&grid, &raster, &ResampleConfig::default(), &mut out);
        assert_eq!(summary.written, 0);
        assert_eq!(out, before);
    }

    #[test]
    fn non_zero_fractions_sum_to_at_most_one() {
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        let cfg = ResampleConfig::default();

        let with_gaps = raster_10(|r, c| if (r + c) % 4 == 0 { NO_DATA } else { (c % 19 + 1) as u8 });
        let r = Resampler::new(&grid, &with_gaps, &PlanarProjection, &cfg).unwrap();
        let o = r.evaluate(CellIndex::new(0, 0)).unwrap().unwrap();
        let land: f64 = o.fractions[1..].iter().sum();
        assert!(land < 1.0);
        assert_relative_eq!(land + o.fractions[0], 1.0, epsilon = 1e-12);

        let full = raster_10(|r, c| ((r * 10 + c) % 19 + 1) as u8);
        let r = Resampler::new(&grid, &full, &PlanarProjection, &cfg).unwrap();
        let o = r.evaluate(CellIndex::new(0, 0)).unwrap().unwrap();
        assert_relative_eq!(o.fractions[1..].iter().sum::<f64>(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn window_leaving_the_raster_skips_the_cell() {
        let grid = one_cell_grid(5.0, 5.0, 14.0, 14.0);
        let raster = raster_10(|_, _| 1);
        let cfg = ResampleConfig::default();
        let r = Resampler::new(&grid, &raster, &PlanarProjection, &cfg).unwrap();
        let s = r.sample(CellIndex::new(0, 0)).unwrap();
        assert!(!s.is_complete());
        assert!(r.evaluate(CellIndex::new(0, 0)).unwrap().is_none());

        let mut out = zeros(&grid);
        let before = out.clone();
        r.run(&mut out).unwrap();
        assert_eq!(out, before);
    }

    #[test]
    fn overflowing_cell_window_is_an_error() {
        let grid = one_cell_grid(-1e300, -1e300, 1e300, 1e300);
        let raster = raster_10(|_, _| 1);
        let cfg = ResampleConfig::default();
        let r = Resampler::new(&grid, &raster, &PlanarProjection, &cfg).unwrap();
        let err = r.evaluate(CellIndex::new(0, 0)).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "cell window", .. }));
    }

    #[test]
    fn huge_window_off_the_raster_builds_no_mesh() {
        let grid = one_cell_grid(-1e8, -1e8, 1e8, 1e8);
        let raster = raster_10(|_, _| 1);
        let cfg = ResampleConfig::default();
        let r = Resampler::new(&grid, &raster, &PlanarProjection, &cfg).unwrap();
        let s = r.sample(CellIndex::new(0, 0)).unwrap();
        assert!(!s.is_complete());
        assert!(s.xx.is_empty() && s.mask.is_empty());
        assert!(r.evaluate(CellIndex::new(0, 0)).unwrap().is_none());
    }

    #[test]
    fn cell_between_pixel_centres_contains_nothing() {
        let grid = one_cell_grid(3.2, 3.2, 3.4, 3.4);
        let raster = raster_10(|_, _| 1);
        let cfg = ResampleConfig::default();
        let r = Resampler::new(&grid, &raster, &PlanarProjection, &cfg).unwrap();
        let s = r.sample(CellIndex::new(0, 0)).unwrap();
        assert_eq!((s.rows, s.cols), (1, 1));
        assert!(s.mask.iter().all(|&m| !m));
        assert!(r.evaluate(CellIndex::new(0, 0)).unwrap().is_none());
    }

    #[test]
    fn ties_go_to_the_lowest_code() {
        let mut f = [0.0; NUM_SOURCE_CLASSES];
        f[3] = 0.5;
        f[8] = 0.5;
        assert_eq!(dominant_code(&f), 3);
        let f = [0.0; NUM_SOURCE_CLASSES];
        assert_eq!(dominant_code(&f), NO_DATA);
    }

    #[test]
    fn out_of_taxonomy_codes_count_as_no_data() {
        let h = ClassHistogram::from_codes([255, 0, 17, 17]);
        assert_eq!(h.counts[0], 2);
        assert_eq!(h.counts[17], 2);
        assert_eq!(h.total, 4);
        assert!(ClassHistogram::from_codes(Vec::new()).fractions().is_none());
    }

    #[test]
    fn mostly_no_data_cell_depends_on_mode() {
        // 60 % no data, 40 % urban: dominant is code 0.
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        let raster = split(6, NO_DATA, URBAN_CODE);

        let mut all = zeros(&grid);
        run(&grid, &raster, &ResampleConfig::default(), &mut all);
        assert_eq!(all, zeros(&grid));

        let cfg = ResampleConfig { mode: ProcessingMode::Urban, ..ResampleConfig::default() };
        let mut urban = zeros(&grid);
        run(&grid, &raster, &cfg, &mut urban);
        assert_relative_eq!(urban.frc_urb2d.get(0, 0), 0.4);
        assert_eq!(urban.lu_index.get(0, 0), 0.0);
    }

    #[test]
    fn urban_mode_touches_only_urban_outputs() {
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        // 92 % urban → high density.
        let raster = raster_10(|r, c| if r == 0 && c < 8 { 2 } else { URBAN_CODE });
        let cfg = ResampleConfig { mode: ProcessingMode::Urban, urban_multi: true, ..ResampleConfig::default() };

        let mut out = zeros(&grid);
        out.landusef.set(1, 0, 0, 0.7);
        out.landusef.set(13, 1, 1, 0.9);
        out.lu_index.set(1, 1, 5.0);
        run(&grid, &raster, &cfg, &mut out);

        assert_eq!(out.lu_index.get(0, 0), f32::from(HIGH_DENSITY_URBAN));
        assert_relative_eq!(out.frc_urb2d.get(0, 0), 0.92);
        // Urban plane is a bulk copy of FRC_URB2D, unvisited cells included.
        assert_relative_eq!(out.landusef.get(13, 0, 0), 0.92);
        assert_eq!(out.landusef.get(13, 1, 1), 0.0);
        // Everything else is left as it was.
        assert_eq!(out.landusef.get(1, 0, 0), 0.7);
        assert_eq!(out.lu_index.get(1, 1), 5.0);
    }

    #[test]
    fn urban_mode_ignores_non_urban_dominant_cells() {
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        let raster = split(6, 1, URBAN_CODE);
        let cfg = ResampleConfig { mode: ProcessingMode::Urban, urban_multi: true, ..ResampleConfig::default() };
        let mut out = zeros(&grid);
        out.lu_index.set(0, 0, 7.0);
        run(&grid, &raster, &cfg, &mut out);
        assert_eq!(out.lu_index.get(0, 0), 7.0);
        assert_relative_eq!(out.frc_urb2d.get(0, 0), 0.4);
    }

    #[test]
    fn all_mode_is_idempotent() {
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        let raster = raster_10(|r, c| ((r + 2 * c) % 20) as u8);
        let cfg = ResampleConfig { urban_multi: true, ..ResampleConfig::default() };

        let mut first = zeros(&grid);
        run(&grid, &raster, &cfg, &mut first);
        let mut second = zeros(&grid);
        run(&grid, &raster, &cfg, &mut second);
        assert_eq!(first, second);

        let mut again = first.clone();
        run(&grid, &raster, &cfg, &mut again);
        assert_eq!(again, first);
    }

    #[test]
    fn run_matches_cell_by_cell_evaluation() {
        // 4×5 mass grid over a 10×10 raster, 3×4 visited cells.
        let ny = 4;
        let nx = 5;
        let lat = Field::from_vec((0..ny).flat_map(|j| (0..nx).map(move |_| j as f64 * 3.0)).collect::<Vec<f64>>(), nx, ny).unwrap();
        let lon = Field::from_vec((0..ny).flat_map(|_| (0..nx).map(|i| i as f64 * 2.0)).collect::<Vec<f64>>(), nx, ny).unwrap();
        let grid = TargetGrid::new(lat.clone(), lon.clone(), lat, lon).unwrap();
        let raster = raster_10(|r, c| ((r * 3 + c) % 20) as u8);
        let cfg = ResampleConfig { urban_multi: true, ..ResampleConfig::default() };
        let r = Resampler::new(&grid, &raster, &PlanarProjection, &cfg).unwrap();
        assert_eq!(r.cell_range(), (3, 4));

        let mut bulk = zeros(&grid);
        let summary = r.run(&mut bulk).unwrap();
        assert_eq!(summary.cells, 12);

        let mut manual = zeros(&grid);
        for j in 0..3 {
            for i in 0..4 {
                let cell = CellIndex::new(j, i);
                if let Some(o) = r.evaluate(cell).unwrap() {
                    r.apply(cell, &o, &mut manual);
                }
            }
        }
        assert_eq!(bulk, manual);
        // Excluded last row / column are never written.
        for i in 0..nx {
            assert_eq!(bulk.lu_index.get(ny - 1, i), 0.0);
        }
    }

    #[test]
    fn mismatched_outputs_are_rejected_before_processing() {
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        let raster = raster_10(|_, _| 1);
        let cfg = ResampleConfig::default();
        let r = Resampler::new(&grid, &raster, &PlanarProjection, &cfg).unwrap();

        let mut wrong_shape = OutputFields::zeros(3, 2, NUM_LAND_CAT);
        assert!(matches!(r.run(&mut wrong_shape), Err(Error::SizeMismatch { .. })));

        let mut too_few = OutputFields::zeros(2, 2, 16);
        assert!(matches!(r.run(&mut too_few), Err(Error::InvalidParameter { .. })));
        assert_eq!(too_few, OutputFields::zeros(2, 2, 16));
    }

    #[test]
    fn every_output_field_must_cover_the_grid() {
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        let raster = raster_10(|_, _| 1);
        let cfg = ResampleConfig { mode: ProcessingMode::Urban, ..ResampleConfig::default() };
        let r = Resampler::new(&grid, &raster, &PlanarProjection, &cfg).unwrap();

        let mut short_frc = zeros(&grid);
        short_frc.frc_urb2d = Field::filled(1, 2, 0.0);
        match r.run(&mut short_frc) {
            Err(Error::SizeMismatch { name, expected, actual }) => {
                assert_eq!(name, "FRC_URB2D");
                assert_eq!((expected, actual), (vec![2, 2], vec![2, 1]));
            }
            other => panic!("unexpected: {other:?}"),
        }

        let mut short_landusef = zeros(&grid);
        short_landusef.landusef.data.truncate(4);
        let before = short_landusef.clone();
        match r.run(&mut short_landusef) {
            Err(Error::SizeMismatch { name, actual, .. }) => {
                assert_eq!(name, "LANDUSEF");
                assert_eq!(actual, vec![4]);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(short_landusef, before);

        let mut lu_data = zeros(&grid);
        lu_data.lu_index.data.push(0.0);
        assert!(matches!(r.run(&mut lu_data), Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn projection_failure_aborts_the_run() {
        let grid = one_cell_grid(0.0, 0.0, 9.0, 9.0);
        let raster = raster_10(|_, _| 1);
        let cfg = ResampleConfig::default();
        let failing = |lon: f64, lat: f64| -> Result<(f64, f64)> {
            Err(Error::Projection { lon, lat, reason: "no inverse".into() })
        };
        let r = Resampler::new(&grid, &raster, &failing, &cfg).unwrap();
        let mut out = zeros(&grid);
        assert!(matches!(r.run(&mut out), Err(Error::Projection { .. })));
    }
}
