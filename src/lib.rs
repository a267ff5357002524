//! sarmoist: terrain-corrected soil-moisture maps from SAR backscatter
//!
//! Linear backscatter scenes are converted to dB, combined with a DEM
//! resampled onto each scene's grid, clipped to a region of interest,
//! corrected by elevation band and classified into three moisture levels,
//! with per-band statistics alongside.

pub mod core;
pub mod crs;
pub mod io;
pub mod types;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use crate::core::{
    AlignmentCache, BackscatterChange, BackscatterDecoder, BandStatistics, BandStatisticsRecord,
    BatchFailure, BatchReport, ElevationBand, ElevationBandTable, ElevationCorrector,
    GeoWindowClipper, GridAligner, MoistureClassifier, MoistureLevel, MoisturePipeline,
    MoistureProduct, MoistureThresholds, PipelineConfig, PixelWindow, ProductMetadata,
    VegetationClass, VegetationClassifier, VegetationSummary, VegetationThresholds,
};
pub use crs::{CoordinateTransform, Crs};
pub use io::{MemoryRasterSink, MemoryRasterSource, RasterSink, RasterSource};
pub use types::{AffineTransform, GeoBoundingBox, GridSpec, Raster, SarError, SarResult};
