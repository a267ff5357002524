//! Core moisture processing modules

pub mod align;
pub mod bands;
pub mod change;
pub mod classify;
pub mod clip;
pub mod correct;
pub mod decode;
pub mod pipeline;
pub mod stats;
pub mod vegetation;

// Re-export main types
pub use align::{AlignmentCache, GridAligner};
pub use bands::{ElevationBand, ElevationBandTable};
pub use change::BackscatterChange;
pub use classify::{MoistureClassifier, MoistureLevel, MoistureThresholds};
pub use clip::{GeoWindowClipper, PixelWindow};
pub use correct::ElevationCorrector;
pub use decode::BackscatterDecoder;
pub use pipeline::{BatchFailure, BatchReport, MoisturePipeline, MoistureProduct, PipelineConfig, ProductMetadata};
pub use stats::{BandStatistics, BandStatisticsRecord};
pub use vegetation::{VegetationClass, VegetationClassifier, VegetationSummary, VegetationThresholds};

use ndarray::{Array2, Zip};

/// Per-pixel map, parallel when the `parallel` feature is on
pub(crate) fn map_pixels<F>(data: &Array2<f64>, f: F) -> Array2<f64>
where
    F: Fn(f64) -> f64 + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        Zip::from(data).par_map_collect(|&v| f(v))
    }
    #[cfg(not(feature = "parallel"))]
    {
        Zip::from(data).map_collect(|&v| f(v))
    }
}

/// Per-pixel map over two co-registered arrays of equal shape
pub(crate) fn zip_pixels<F>(a: &Array2<f64>, b: &Array2<f64>, f: F) -> Array2<f64>
where
    F: Fn(f64, f64) -> f64 + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        Zip::from(a).and(b).par_map_collect(|&x, &y| f(x, y))
    }
    #[cfg(not(feature = "parallel"))]
    {
        Zip::from(a).and(b).map_collect(|&x, &y| f(x, y))
    }
}
