use crate::core::bands::ElevationBandTable;
use crate::types::{Raster, SarError, SarResult};
use serde::{Deserialize, Serialize};

/// Summary of one elevation band, one row of the statistics table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandStatisticsRecord {
    pub elevation_range: String,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub count: usize,
}

/// Welford accumulator
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Accumulator {
    pub(crate) count: usize,
    pub(crate) mean: f64,
    m2: f64,
}

impl Accumulator {
    pub(crate) fn push(&mut self, v: f64) {
        self.count += 1;
        let delta = v - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (v - self.mean);
    }

    /// Population standard deviation
    pub(crate) fn std(&self) -> f64 {
        if self.count > 1 {
            (self.m2 / self.count as f64).sqrt()
        } else {
            0.0
        }
    }
}

pub struct BandStatistics;

impl BandStatistics {
    /// Per-band count, mean and population std of the valid `values`,
    /// grouped by `elevation`. Bands without a valid pixel are omitted;
    /// records follow band order.
    pub fn compute<T>(
        values: &Raster,
        elevation: &Raster,
        table: &ElevationBandTable<T>,
    ) -> SarResult<Vec<BandStatisticsRecord>> {
        if values.dim() != elevation.dim() {
            return Err(SarError::ShapeMismatch {
                expected: values.dim(),
                actual: elevation.dim(),
            });
        }

        let mut accumulators = vec![Accumulator::default(); table.len()];
        for (&v, &e) in values.data().iter().zip(elevation.data().iter()) {
            if !values.is_valid_value(v) || !elevation.is_valid_value(e) {
                continue;
            }
            if let Some(index) = table.index_of(e) {
                accumulators[index].push(v);
            }
        }

        let records: Vec<BandStatisticsRecord> = table
            .bands()
            .iter()
            .zip(accumulators)
            .filter(|(_, acc)| acc.count > 0)
            .map(|(band, acc)| BandStatisticsRecord {
                elevation_range: band.label(),
                mean: acc.mean,
                std: acc.std(),
                count: acc.count,
            })
            .collect();

        for record in &records {
            log::debug!(
                "Band {}: n={}, mean={:.2}, std={:.2}",
                record.elevation_range,
                record.count,
                record.mean,
                record.std
            );
        }

        Ok(records)
    }
}
