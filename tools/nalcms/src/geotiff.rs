//! Single-band u8 GeoTIFF read window by window.
//!
//! A continental NALCMS mosaic is far larger than the decoder's default
//! buffer limits, so the image is never decoded whole. `GeoTiffRaster` keeps
//! the decoder open and decodes only the strips or tiles a window touches,
//! holding the most recent ones in a small cache.

use std::fs::File;
use std::io::BufReader;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use lru::LruCache;
use nalcms_core::raster::clip;
use nalcms_core::{ClassWindow, Error, GeoTransform, SourceRaster};
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tiff::ColorType;

/// Decoded chunks kept between window reads.
const CHUNK_CACHE_SIZE: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(n) => n,
    None => NonZeroUsize::MIN,
};

// ── Georeferencing ────────────────────────────────────────────────────────────

/// Affine transform from the GeoTIFF model tags.
///
/// `ModelTransformation` (a row-major 4×4 matrix) wins when present;
/// otherwise the first tiepoint `[I, J, K, X, Y, Z]` anchors raster (I, J)
/// at model (X, Y) and `ModelPixelScale` gives the pixel size, with rows
/// running south.
pub fn transform_from_tags(
    pixel_scale: Option<&[f64]>,
    tiepoint: Option<&[f64]>,
    matrix: Option<&[f64]>,
) -> Result<GeoTransform> {
    if let Some(m) = matrix {
        if m.len() < 8 {
            bail!("ModelTransformation has {} values, expected 16", m.len());
        }
        return Ok(GeoTransform {
            origin_x: m[3],
            origin_y: m[7],
            pixel_width: m[0],
            pixel_height: m[5],
            row_rotation: m[1],
            col_rotation: m[4],
        });
    }

    let (scale, tie) = match (pixel_scale, tiepoint) {
        (Some(s), Some(t)) if s.len() >= 2 && t.len() >= 6 => (s, t),
        _ => bail!("GeoTIFF lacks ModelPixelScale/ModelTiepoint and ModelTransformation tags"),
    };
    let (sx, sy) = (scale[0], scale[1]);
    Ok(GeoTransform::north_up(tie[3] - tie[0] * sx, tie[4] + tie[1] * sy, sx, -sy))
}

fn f64_tag<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>, tag: Tag) -> Result<Option<Vec<f64>>> {
    decoder
        .find_tag(tag)?
        .map(|v| v.into_f64_vec())
        .transpose()
        .with_context(|| format!("Reading GeoTIFF tag {tag:?}"))
}

// ── Chunks ────────────────────────────────────────────────────────────────────

/// First band of one decoded strip or tile.
struct Chunk {
    data: Vec<u8>,
    rows: usize,
    cols: usize,
}

struct ChunkReader {
    decoder: Decoder<BufReader<File>>,
    cache: LruCache<u32, Arc<Chunk>>,
}

impl ChunkReader {
    fn chunk(&mut self, index: u32) -> nalcms_core::Result<Arc<Chunk>> {
        if let Some(chunk) = self.cache.get(&index) {
            return Ok(Arc::clone(chunk));
        }

        let (cols, rows) = self.decoder.chunk_data_dimensions(index);
        let (cols, rows) = (cols as usize, rows as usize);
        let data = match self.decoder.read_chunk(index).map_err(|e| Error::Raster(e.to_string()))? {
            DecodingResult::U8(v) => v,
            _ => return Err(Error::Raster(format!("chunk {index}: unexpected pixel type (expected U8)"))),
        };
        if rows == 0 || cols == 0 || data.len() < rows * cols {
            return Err(Error::Raster(format!("chunk {index}: {} bytes for {rows} x {cols} px", data.len())));
        }
        // Interleaved samples; keep the first band.
        let samples = data.len() / (rows * cols);
        let data = if samples > 1 { data.into_iter().step_by(samples).collect() } else { data };

        let chunk = Arc::new(Chunk { data, rows, cols });
        self.cache.put(index, Arc::clone(&chunk));
        Ok(chunk)
    }
}

// ── Raster ────────────────────────────────────────────────────────────────────

pub struct GeoTiffRaster {
    reader: Mutex<ChunkReader>,
    width: usize,
    height: usize,
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
    transform: GeoTransform,
    crs: Option<String>,
}

impl GeoTiffRaster {
    /// Open the first image of a GeoTIFF of NALCMS class codes.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
        let mut decoder = Decoder::new(BufReader::new(file))
            .with_context(|| format!("{} is not a valid TIFF", path.display()))?
            .with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions()?;
        if width == 0 || height == 0 {
            bail!("{} has zero width or height", path.display());
        }
        match decoder.colortype()? {
            ColorType::Gray(8)
            | ColorType::GrayA(8)
            | ColorType::Palette(8)
            | ColorType::RGB(8)
            | ColorType::RGBA(8) => {}
            other => bail!("{}: unsupported pixel layout {other:?} (expected 8-bit codes)", path.display()),
        }

        let scale = f64_tag(&mut decoder, Tag::ModelPixelScaleTag)?;
        let tie = f64_tag(&mut decoder, Tag::ModelTiepointTag)?;
        let matrix = f64_tag(&mut decoder, Tag::ModelTransformationTag)?;
        let transform = transform_from_tags(scale.as_deref(), tie.as_deref(), matrix.as_deref())
            .with_context(|| format!("Georeferencing {}", path.display()))?;

        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let (chunk_width, chunk_height) = (chunk_width as usize, chunk_height as usize);
        if chunk_width == 0 || chunk_height == 0 {
            bail!("{} has an empty strip or tile size", path.display());
        }
        let (width, height) = (width as usize, height as usize);

        log::info!(
            "Opened {} ({} x {} px in {} x {} chunks, origin {:.1}, {:.1})",
            path.display(),
            width,
            height,
            chunk_width,
            chunk_height,
            transform.origin_x,
            transform.origin_y
        );
        Ok(Self {
            reader: Mutex::new(ChunkReader { decoder, cache: LruCache::new(CHUNK_CACHE_SIZE) }),
            width,
            height,
            chunk_width,
            chunk_height,
            chunks_across: width.div_ceil(chunk_width),
            transform,
            crs: None,
        })
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
}

impl SourceRaster for GeoTiffRaster {
    fn index(&self, x: f64, y: f64) -> (i64, i64) {
        self.transform.index(x, y)
    }

    fn xy(&self, row: i64, col: i64) -> (f64, f64) {
        self.transform.xy(row, col)
    }

    fn read_window(&self, rows: Range<i64>, cols: Range<i64>) -> nalcms_core::Result<ClassWindow> {
        let rows = clip(rows, self.height);
        let cols = clip(cols, self.width);
        if rows.is_empty() || cols.is_empty() {
            return Ok(ClassWindow::empty());
        }

        let (ch, cw) = (self.chunk_height, self.chunk_width);
        let mut data = vec![0u8; rows.len() * cols.len()];
        let mut reader = self.reader.lock().map_err(|_| Error::Raster("chunk reader lock poisoned".into()))?;
        for chunk_row in rows.start / ch..=(rows.end - 1) / ch {
            for chunk_col in cols.start / cw..=(cols.end - 1) / cw {
                let index = u32::try_from(chunk_row * self.chunks_across + chunk_col)
                    .map_err(|_| Error::Raster(format!("chunk ({chunk_row}, {chunk_col}) out of range")))?;
                let chunk = reader.chunk(index)?;

                let (r0, c0) = (chunk_row * ch, chunk_col * cw);
                let (r_lo, r_hi) = (rows.start.max(r0), rows.end.min(r0 + chunk.rows));
                let (c_lo, c_hi) = (cols.start.max(c0), cols.end.min(c0 + chunk.cols));
                if c_lo >= c_hi {
                    continue;
                }
                let n = c_hi - c_lo;
                for r in r_lo..r_hi {
                    let src = (r - r0) * chunk.cols + (c_lo - c0);
                    let dst = (r - rows.start) * cols.len() + (c_lo - cols.start);
                    data[dst..dst + n].copy_from_slice(&chunk.data[src..src + n]);
                }
            }
        }
        Ok(ClassWindow { data, rows: rows.len(), cols: cols.len() })
    }

    fn crs(&self) -> Option<&str> {
        self.crs.as_deref()
    }
}
