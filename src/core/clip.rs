use crate::crs::{CoordinateTransform, Crs};
use crate::types::{GeoBoundingBox, Raster, SarError, SarResult};

/// Half-open pixel window `[col_min, col_max) x [row_min, row_max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelWindow {
    pub col_min: usize,
    pub row_min: usize,
    pub col_max: usize,
    pub row_max: usize,
}

impl PixelWindow {
    pub fn width(&self) -> usize {
        self.col_max - self.col_min
    }

    pub fn height(&self) -> usize {
        self.row_max - self.row_min
    }
}

/// Extracts the sub-raster covering a WGS84 bounding box
pub struct GeoWindowClipper;

impl GeoWindowClipper {
    /// Pixel window of `bbox` on `raster`, clamped to the raster bounds.
    ///
    /// Fails when the window is empty or lies entirely off the raster.
    pub fn window(raster: &Raster, bbox: &GeoBoundingBox) -> SarResult<PixelWindow> {
        bbox.validate()?;

        let to_raster = CoordinateTransform::new(&Crs::Wgs84, raster.crs())?;
        let inverse = raster.transform().inverse()?;

        let mut cols = Vec::with_capacity(4);
        let mut rows = Vec::with_capacity(4);
        for (lon, lat) in bbox.corners() {
            let (x, y) = to_raster.transform(lon, lat);
            let (col, row) = inverse.apply(x, y);
            if !col.is_finite() || !row.is_finite() {
                return Err(SarError::Crs(format!(
                    "Corner ({}, {}) has no position in {}",
                    lon,
                    lat,
                    raster.crs()
                )));
            }
            cols.push(col.round() as i64);
            rows.push(row.round() as i64);
        }

        let col_min = cols.iter().copied().min().unwrap_or(0);
        let col_max = cols.iter().copied().max().unwrap_or(0);
        let row_min = rows.iter().copied().min().unwrap_or(0);
        let row_max = rows.iter().copied().max().unwrap_or(0);

        log::debug!(
            "Bounding box maps to cols {}..{}, rows {}..{}",
            col_min,
            col_max,
            row_min,
            row_max
        );

        // rounding saturates, so the span itself can overflow
        let spans = (col_max.checked_sub(col_min), row_max.checked_sub(row_min));
        let (span_cols, span_rows) = match spans {
            (Some(cols), Some(rows)) => (cols, rows),
            _ => {
                return Err(SarError::EmptyWindow(format!(
                    "window for {:?} overflows pixel indices (cols {}..{}, rows {}..{})",
                    bbox, col_min, col_max, row_min, row_max
                )))
            }
        };
        if span_cols <= 0 || span_rows <= 0 {
            return Err(SarError::EmptyWindow(format!(
                "window {}x{} pixels for {:?}",
                span_cols, span_rows, bbox
            )));
        }

        let (width, height) = (raster.width() as i64, raster.height() as i64);
        if col_max <= 0 || row_max <= 0 || col_min >= width || row_min >= height {
            return Err(SarError::EmptyWindow(format!(
                "cols {}..{}, rows {}..{} lie outside the {}x{} raster",
                col_min, col_max, row_min, row_max, width, height
            )));
        }

        let window = PixelWindow {
            col_min: col_min.max(0) as usize,
            row_min: row_min.max(0) as usize,
            col_max: col_max.min(width) as usize,
            row_max: row_max.min(height) as usize,
        };

        if col_min < 0 || row_min < 0 || col_max > width || row_max > height {
            log::warn!("Bounding box only partially overlaps raster, clamped to {:?}", window);
        }

        Ok(window)
    }

    /// Copy the pixels of `window`, re-anchoring the transform on its origin
    pub fn extract(raster: &Raster, window: &PixelWindow) -> SarResult<Raster> {
        raster.window(window.row_min, window.row_max, window.col_min, window.col_max)
    }

    /// Clip `raster` to `bbox`
    pub fn clip(raster: &Raster, bbox: &GeoBoundingBox) -> SarResult<Raster> {
        let window = Self::window(raster, bbox)?;
        log::info!(
            "Clipping {}x{} raster to {}x{} window at ({}, {})",
            raster.width(),
            raster.height(),
            window.width(),
            window.height(),
            window.col_min,
            window.row_min
        );
        Self::extract(raster, &window)
    }
}
