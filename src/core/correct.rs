use crate::core::bands::{ElevationBand, ElevationBandTable};
use crate::core::zip_pixels;
use crate::types::{Raster, SarError, SarResult};

/// Band edges of the standard correction table (meters)
pub const CORRECTION_BOUNDARIES: [f64; 8] = [0.0, 200.0, 400.0, 600.0, 800.0, 1000.0, 1500.0, 2000.0];
/// Additive dB offset per band, lowest band first
pub const CORRECTION_OFFSETS_DB: [f64; 7] = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
/// Range every corrected value is clamped into
pub const CLAMP_MIN_DB: f64 = -20.0;
pub const CLAMP_MAX_DB: f64 = 0.0;

/// Standard elevation correction table: 7 bands from 0 to 2000 m
pub fn standard_correction_table() -> ElevationBandTable<f64> {
    let bands = CORRECTION_BOUNDARIES
        .windows(2)
        .zip(CORRECTION_OFFSETS_DB)
        .map(|(edge, offset)| ElevationBand::new(edge[0], edge[1], offset))
        .collect();
    ElevationBandTable::from_constants(bands)
}

/// Banded elevation correction of dB backscatter.
///
/// This is a coarse lookup table, not a radiometric terrain model: each
/// pixel gets the offset of its elevation band, then the result is clamped
/// to `[CLAMP_MIN_DB, CLAMP_MAX_DB]`.
#[derive(Debug, Clone)]
pub struct ElevationCorrector {
    table: ElevationBandTable<f64>,
}

impl Default for ElevationCorrector {
    fn default() -> Self {
        Self::new(standard_correction_table())
    }
}

impl ElevationCorrector {
    pub fn new(table: ElevationBandTable<f64>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ElevationBandTable<f64> {
        &self.table
    }

    /// Correct one sample. `elevation` is NaN when the DEM pixel is invalid.
    pub fn correct_value(&self, db: f64, elevation: f64) -> f64 {
        // NOTE: invalid or out-of-band elevations pass the dB value through
        // uncorrected, and the clamp below still applies to those values.
        let offset = self.table.value_at(elevation).copied().unwrap_or(0.0);
        (db + offset).clamp(CLAMP_MIN_DB, CLAMP_MAX_DB)
    }

    /// Correct a dB raster with an elevation raster on the same grid
    pub fn correct(&self, db: &Raster, elevation: &Raster) -> SarResult<Raster> {
        if db.dim() != elevation.dim() {
            return Err(SarError::ShapeMismatch {
                expected: db.dim(),
                actual: elevation.dim(),
            });
        }

        log::info!(
            "Applying banded elevation correction to {}x{} raster ({} bands)",
            db.width(),
            db.height(),
            self.table.len()
        );

        let elev = elevation.masked();
        let corrected = zip_pixels(&db.masked(), &elev, |v, e| self.correct_value(v, e));

        let uncorrected = elev.iter().filter(|e| self.table.lookup(**e).is_none()).count();
        log::debug!(
            "{} pixels had no elevation band and were passed through",
            uncorrected
        );

        db.derive(corrected, None)
    }
}
