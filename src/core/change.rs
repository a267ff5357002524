use crate::core::zip_pixels;
use crate::types::{Raster, SarError, SarResult};

/// Backscatter change between two acquisitions on the same grid
pub struct BackscatterChange;

impl BackscatterChange {
    /// `later - earlier` per pixel, NaN where either input is invalid.
    ///
    /// Both rasters must share shape, transform and CRS.
    pub fn difference(earlier: &Raster, later: &Raster) -> SarResult<Raster> {
        if earlier.dim() != later.dim() {
            return Err(SarError::ShapeMismatch {
                expected: earlier.dim(),
                actual: later.dim(),
            });
        }
        if earlier.grid().key() != later.grid().key() {
            return Err(SarError::Processing(format!(
                "Acquisitions are on different grids ({} vs {})",
                earlier.crs(),
                later.crs()
            )));
        }

        log::info!(
            "Computing backscatter change over {}x{} pixels",
            earlier.width(),
            earlier.height()
        );

        let diff = zip_pixels(&earlier.masked(), &later.masked(), |a, b| b - a);
        earlier.derive(diff, None)
    }
}
