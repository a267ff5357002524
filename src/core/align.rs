use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use ndarray::{Array2, Zip};

use crate::crs::CoordinateTransform;
use crate::types::{GridKey, GridSpec, Raster, SarError, SarResult};

/// Sub-pixel distance below which a sample position snaps to the pixel center
const SNAP_TOLERANCE: f64 = 1e-9;

/// Resamples a raster onto a destination grid with bilinear interpolation.
///
/// Destination pixels whose center falls outside the source extent are NaN.
/// Invalid source samples are dropped from the interpolation and the
/// remaining weights renormalised.
pub struct GridAligner;

impl GridAligner {
    pub fn align(source: &Raster, grid: &GridSpec) -> SarResult<Raster> {
        if grid.width == 0 || grid.height == 0 {
            return Err(SarError::InvalidFormat(format!(
                "Destination grid has invalid dimensions: {}x{}",
                grid.width, grid.height
            )));
        }

        let to_source = CoordinateTransform::new(&grid.crs, source.crs())?;
        let source_inverse = source.transform().inverse()?;
        let samples = source.masked();

        log::info!(
            "Aligning {}x{} {} raster onto {}x{} {} grid",
            source.width(),
            source.height(),
            source.crs(),
            grid.width,
            grid.height,
            grid.crs
        );

        let mut out = Array2::<f64>::from_elem((grid.height, grid.width), f64::NAN);
        let resample = |(row, col): (usize, usize), value: &mut f64| {
            let (x, y) = grid.transform.apply(col as f64 + 0.5, row as f64 + 0.5);
            let (sx, sy) = to_source.transform(x, y);
            let (px, py) = source_inverse.apply(sx, sy);
            *value = bilinear(&samples, px, py);
        };

        #[cfg(feature = "parallel")]
        Zip::indexed(&mut out).par_for_each(resample);
        #[cfg(not(feature = "parallel"))]
        Zip::indexed(&mut out).for_each(resample);

        let valid = out.iter().filter(|v| !v.is_nan()).count();
        log::debug!("Alignment produced {} of {} valid pixels", valid, out.len());

        Raster::new(out, grid.transform, grid.crs.clone(), None)
    }
}

/// Bilinear sample at fractional pixel position `(px, py)`, where pixel
/// `(c, r)` covers `[c, c+1) x [r, r+1)` and its value sits at the center.
fn bilinear(samples: &Array2<f64>, px: f64, py: f64) -> f64 {
    let (height, width) = samples.dim();
    if !px.is_finite() || !py.is_finite() {
        return f64::NAN;
    }
    if px < 0.0 || py < 0.0 || px > width as f64 || py > height as f64 {
        return f64::NAN;
    }

    let x = snap((px - 0.5).clamp(0.0, (width - 1) as f64));
    let y = snap((py - 0.5).clamp(0.0, (height - 1) as f64));

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let taps = [
        (y0, x0, (1.0 - fx) * (1.0 - fy)),
        (y0, x1, fx * (1.0 - fy)),
        (y1, x0, (1.0 - fx) * fy),
        (y1, x1, fx * fy),
    ];

    let mut sum = 0.0;
    let mut weight = 0.0;
    for (r, c, w) in taps {
        let v = samples[[r, c]];
        if w > 0.0 && !v.is_nan() {
            sum += v * w;
            weight += w;
        }
    }

    if weight > 0.0 {
        sum / weight
    } else {
        f64::NAN
    }
}

fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_TOLERANCE {
        r
    } else {
        v
    }
}

type Slot = Arc<Mutex<Option<Arc<Raster>>>>;

/// Alignments of one source raster, computed at most once per destination grid.
///
/// Concurrent requests for the same grid wait on that grid's slot while the
/// first caller resamples; requests for other grids proceed independently.
/// A failed alignment is not cached.
pub struct AlignmentCache {
    source: Arc<Raster>,
    slots: Mutex<HashMap<GridKey, Slot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl AlignmentCache {
    pub fn new(source: Arc<Raster>) -> Self {
        Self {
            source,
            slots: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &Arc<Raster> {
        &self.source
    }

    /// Source raster aligned to `grid`, reusing an earlier result if present
    pub fn get_or_align(&self, grid: &GridSpec) -> SarResult<Arc<Raster>> {
        let key = grid.key();
        let slot = {
            let mut slots = self.lock_slots()?;
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let mut entry = slot
            .lock()
            .map_err(|_| SarError::Processing("Alignment slot lock poisoned".to_string()))?;

        if let Some(aligned) = entry.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            log::debug!("Alignment cache hit for {}x{} {} grid", grid.width, grid.height, grid.crs);
            return Ok(Arc::clone(aligned));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        match GridAligner::align(&self.source, grid) {
            Ok(aligned) => {
                let aligned = Arc::new(aligned);
                *entry = Some(Arc::clone(&aligned));
                Ok(aligned)
            }
            Err(e) => {
                // release the slot before taking the map lock
                drop(entry);
                self.discard_empty_slot(&key, &slot)?;
                Err(e)
            }
        }
    }

    fn lock_slots(&self) -> SarResult<MutexGuard<'_, HashMap<GridKey, Slot>>> {
        self.slots
            .lock()
            .map_err(|_| SarError::Processing("Alignment cache lock poisoned".to_string()))
    }

    /// Drop `slot` from the map unless another caller has since filled it or
    /// is still aligning into it.
    fn discard_empty_slot(&self, key: &GridKey, slot: &Slot) -> SarResult<()> {
        let mut slots = self.lock_slots()?;
        let unused = match slots.get(key) {
            Some(current) if Arc::ptr_eq(current, slot) => {
                current.try_lock().map_or(false, |s| s.is_none())
            }
            _ => false,
        };
        if unused {
            slots.remove(key);
        }
        Ok(())
    }

    /// Number of grids with a cached alignment
    pub fn len(&self) -> usize {
        self.slots.lock().map_or(0, |slots| {
            slots
                .values()
                .filter(|slot| slot.try_lock().map_or(false, |s| s.is_some()))
                .count()
        })
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
