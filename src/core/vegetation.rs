use crate::core::stats::Accumulator;
use crate::types::{Raster, SarError, SarResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse land cover of a backscatter scene
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VegetationClass {
    Forest,
    Grassland,
    Other,
}

impl fmt::Display for VegetationClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VegetationClass::Forest => "forest",
            VegetationClass::Grassland => "grassland",
            VegetationClass::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// dB limits of the scene-level vegetation rules
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VegetationThresholds {
    /// Forest needs a mean above this
    pub forest_mean_db: f64,
    /// Forest needs a spread above this, grassland one below it
    pub texture_std_db: f64,
    /// Grassland needs a mean above this
    pub grassland_mean_db: f64,
}

impl Default for VegetationThresholds {
    fn default() -> Self {
        Self {
            forest_mean_db: -10.0,
            texture_std_db: 5.0,
            grassland_mean_db: -15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VegetationSummary {
    pub class: VegetationClass,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    pub count: usize,
}

/// Classifies a whole dB scene from the mean and spread of its valid pixels.
///
/// Bright, textured scenes are forest; moderately bright, smooth scenes are
/// grassland; everything else is other. Both comparisons are strict, so a
/// spread of exactly the texture limit is neither forest nor grassland.
#[derive(Debug, Clone, Default)]
pub struct VegetationClassifier {
    thresholds: VegetationThresholds,
}

impl VegetationClassifier {
    pub fn new(thresholds: VegetationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &VegetationThresholds {
        &self.thresholds
    }

    pub fn class_for(&self, mean: f64, std: f64) -> VegetationClass {
        let t = &self.thresholds;
        if mean > t.forest_mean_db && std > t.texture_std_db {
            VegetationClass::Forest
        } else if mean > t.grassland_mean_db && std < t.texture_std_db {
            VegetationClass::Grassland
        } else {
            VegetationClass::Other
        }
    }

    pub fn classify(&self, db: &Raster) -> SarResult<VegetationSummary> {
        let mut acc = Accumulator::default();
        for &v in db.data().iter().filter(|v| db.is_valid_value(**v)) {
            acc.push(v);
        }

        if acc.count == 0 {
            return Err(SarError::Processing(
                "Cannot classify vegetation without valid pixels".to_string(),
            ));
        }

        let std = acc.std();
        let class = self.class_for(acc.mean, std);
        log::info!(
            "Scene classified as {} (mean {:.2} dB, std {:.2} dB over {} pixels)",
            class,
            acc.mean,
            std,
            acc.count
        );

        Ok(VegetationSummary {
            class,
            mean: acc.mean,
            std,
            count: acc.count,
        })
    }
}
