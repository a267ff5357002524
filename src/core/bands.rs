use crate::types::{SarError, SarResult};
use serde::{Deserialize, Deserializer, Serialize};

/// One half-open elevation interval `[low, high)` in meters with its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationBand<T> {
    pub low: f64,
    pub high: f64,
    pub value: T,
}

impl<T> ElevationBand<T> {
    pub fn new(low: f64, high: f64, value: T) -> Self {
        Self { low, high, value }
    }

    pub fn contains(&self, elevation: f64) -> bool {
        elevation >= self.low && elevation < self.high
    }

    /// Label such as `200-400m`
    pub fn label(&self) -> String {
        format!("{}-{}m", self.low, self.high)
    }
}

/// Ordered, contiguous, non-overlapping elevation bands.
///
/// Elevations outside every band (below the first `low`, at or above the
/// last `high`, or NaN) match nothing; callers decide the fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ElevationBandTable<T> {
    bands: Vec<ElevationBand<T>>,
}

impl<T> ElevationBandTable<T> {
    pub fn new(bands: Vec<ElevationBand<T>>) -> SarResult<Self> {
        if bands.is_empty() {
            return Err(SarError::Config("Elevation band table is empty".to_string()));
        }

        for (i, band) in bands.iter().enumerate() {
            if !band.low.is_finite() || !band.high.is_finite() || band.low >= band.high {
                return Err(SarError::Config(format!(
                    "Elevation band {} has invalid interval [{}, {})",
                    i, band.low, band.high
                )));
            }
        }

        for (i, pair) in bands.windows(2).enumerate() {
            if pair[0].high != pair[1].low {
                return Err(SarError::Config(format!(
                    "Elevation bands {} and {} are not contiguous: {} != {}",
                    i,
                    i + 1,
                    pair[0].high,
                    pair[1].low
                )));
            }
        }

        Ok(Self { bands })
    }

    /// Build from `n + 1` ascending boundaries and `n` payloads
    pub fn from_boundaries(boundaries: &[f64], values: Vec<T>) -> SarResult<Self> {
        if boundaries.len() != values.len() + 1 {
            return Err(SarError::Config(format!(
                "{} boundaries cannot delimit {} bands",
                boundaries.len(),
                values.len()
            )));
        }

        let bands = boundaries
            .windows(2)
            .zip(values)
            .map(|(edge, value)| ElevationBand::new(edge[0], edge[1], value))
            .collect();

        Self::new(bands)
    }

    /// Band containing `elevation`, if any
    pub fn lookup(&self, elevation: f64) -> Option<&ElevationBand<T>> {
        let idx = self.bands.partition_point(|band| band.high <= elevation);
        self.bands.get(idx).filter(|band| band.contains(elevation))
    }

    /// Index of the band containing `elevation`, if any
    pub fn index_of(&self, elevation: f64) -> Option<usize> {
        let idx = self.bands.partition_point(|band| band.high <= elevation);
        match self.bands.get(idx) {
            Some(band) if band.contains(elevation) => Some(idx),
            _ => None,
        }
    }

    pub fn value_at(&self, elevation: f64) -> Option<&T> {
        self.lookup(elevation).map(|band| &band.value)
    }

    pub fn bands(&self) -> &[ElevationBand<T>] {
        &self.bands
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Covered domain `[min, max)`
    pub fn domain(&self) -> (f64, f64) {
        // non-empty by construction
        (self.bands[0].low, self.bands[self.bands.len() - 1].high)
    }

    /// Same boundaries, payload dropped
    pub fn boundaries_only(&self) -> ElevationBandTable<()> {
        ElevationBandTable {
            bands: self
                .bands
                .iter()
                .map(|band| ElevationBand::new(band.low, band.high, ()))
                .collect(),
        }
    }

    /// Tables built from literal constants in this crate
    pub(crate) fn from_constants(bands: Vec<ElevationBand<T>>) -> Self {
        debug_assert!(!bands.is_empty());
        Self { bands }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for ElevationBandTable<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bands = Vec::<ElevationBand<T>>::deserialize(deserializer)?;
        Self::new(bands).map_err(serde::de::Error::custom)
    }
}
