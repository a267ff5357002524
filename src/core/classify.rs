use crate::core::bands::{ElevationBand, ElevationBandTable};
use crate::core::zip_pixels;
use crate::types::{Raster, SarError, SarResult};
use serde::{Deserialize, Serialize};

/// Band edges of the standard moisture table (meters)
pub const MOISTURE_BOUNDARIES: [f64; 5] = [0.0, 500.0, 1000.0, 1500.0, 2000.0];

/// dB thresholds for one elevation band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MoistureThresholds {
    /// Below this: high moisture
    pub low: f64,
    /// Below this (and not below `low`): medium moisture
    pub high: f64,
}

impl MoistureThresholds {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }
}

/// Standard thresholds, lowest band first
pub const MOISTURE_THRESHOLDS_DB: [MoistureThresholds; 4] = [
    MoistureThresholds::new(-15.0, -5.0),
    MoistureThresholds::new(-20.0, -10.0),
    MoistureThresholds::new(-25.0, -15.0),
    MoistureThresholds::new(-30.0, -20.0),
];

/// Standard moisture table: 4 bands from 0 to 2000 m
pub fn standard_moisture_table() -> ElevationBandTable<MoistureThresholds> {
    let bands = MOISTURE_BOUNDARIES
        .windows(2)
        .zip(MOISTURE_THRESHOLDS_DB)
        .map(|(edge, thresholds)| ElevationBand::new(edge[0], edge[1], thresholds))
        .collect();
    ElevationBandTable::from_constants(bands)
}

/// Discrete moisture level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoistureLevel {
    Low,
    Medium,
    High,
}

impl MoistureLevel {
    /// Value written to the class raster
    pub fn value(self) -> f64 {
        match self {
            MoistureLevel::Low => 0.0,
            MoistureLevel::Medium => 0.5,
            MoistureLevel::High => 1.0,
        }
    }

    pub fn from_value(value: f64) -> Option<MoistureLevel> {
        if value == 0.0 {
            Some(MoistureLevel::Low)
        } else if value == 0.5 {
            Some(MoistureLevel::Medium)
        } else if value == 1.0 {
            Some(MoistureLevel::High)
        } else {
            None
        }
    }
}

/// Three-level moisture classification of corrected dB backscatter
#[derive(Debug, Clone)]
pub struct MoistureClassifier {
    table: ElevationBandTable<MoistureThresholds>,
}

impl Default for MoistureClassifier {
    fn default() -> Self {
        Self::new(standard_moisture_table())
    }
}

impl MoistureClassifier {
    pub fn new(table: ElevationBandTable<MoistureThresholds>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ElevationBandTable<MoistureThresholds> {
        &self.table
    }

    /// Level for one sample; `None` when the dB value itself is invalid.
    /// Elevations outside every band (or invalid) classify as `Low`.
    pub fn classify_value(&self, db: f64, elevation: f64) -> Option<MoistureLevel> {
        if db.is_nan() {
            return None;
        }

        let level = match self.table.value_at(elevation) {
            Some(t) if db < t.low => MoistureLevel::High,
            Some(t) if db < t.high => MoistureLevel::Medium,
            _ => MoistureLevel::Low,
        };
        Some(level)
    }

    /// Class raster (0.0 / 0.5 / 1.0, NaN where dB is invalid)
    pub fn classify(&self, db: &Raster, elevation: &Raster) -> SarResult<Raster> {
        if db.dim() != elevation.dim() {
            return Err(SarError::ShapeMismatch {
                expected: db.dim(),
                actual: elevation.dim(),
            });
        }

        log::info!("Classifying {}x{} raster into moisture levels", db.width(), db.height());

        let classes = zip_pixels(&db.masked(), &elevation.masked(), |v, e| {
            self.classify_value(v, e).map_or(f64::NAN, MoistureLevel::value)
        });

        if log::log_enabled!(log::Level::Debug) {
            let high = classes.iter().filter(|v| **v == 1.0).count();
            let medium = classes.iter().filter(|v| **v == 0.5).count();
            let low = classes.iter().filter(|v| **v == 0.0).count();
            log::debug!("Moisture classes: high={}, medium={}, low={}", high, medium, low);
        }

        db.derive(classes, None)
    }
}
