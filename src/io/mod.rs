//! Raster I/O: where scenes come from and where products go

#[cfg(feature = "gdal")]
pub mod geotiff;

#[cfg(feature = "gdal")]
pub use geotiff::{read_geotiff, write_geotiff, GeoTiffStore};

use crate::types::{Raster, SarError, SarResult};
use std::collections::HashMap;
use std::sync::Mutex;

/// Provides rasters by identifier (a file name, a product ID, ...)
pub trait RasterSource {
    /// Band 1 of the named raster
    fn read(&self, source_id: &str) -> SarResult<Raster>;
}

/// Receives named output rasters
pub trait RasterSink {
    fn write(&self, name: &str, raster: &Raster) -> SarResult<()>;
}

/// In-memory source, used for tests and for callers that already hold arrays
#[derive(Debug, Default, Clone)]
pub struct MemoryRasterSource {
    rasters: HashMap<String, Raster>,
}

impl MemoryRasterSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, source_id: impl Into<String>, raster: Raster) {
        self.rasters.insert(source_id.into(), raster);
    }

    pub fn with(mut self, source_id: impl Into<String>, raster: Raster) -> Self {
        self.insert(source_id, raster);
        self
    }

    /// Identifiers in sorted order
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rasters.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl RasterSource for MemoryRasterSource {
    fn read(&self, source_id: &str) -> SarResult<Raster> {
        self.rasters.get(source_id).cloned().ok_or_else(|| {
            SarError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("No raster named {}", source_id),
            ))
        })
    }
}

/// In-memory sink collecting every written raster
#[derive(Debug, Default)]
pub struct MemoryRasterSink {
    rasters: Mutex<HashMap<String, Raster>>,
}

impl MemoryRasterSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Raster> {
        self.rasters.lock().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .rasters
            .lock()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl RasterSink for MemoryRasterSink {
    fn write(&self, name: &str, raster: &Raster) -> SarResult<()> {
        self.rasters
            .lock()
            .map_err(|_| SarError::Processing("Memory sink lock poisoned".to_string()))?
            .insert(name.to_string(), raster.clone());
        Ok(())
    }
}
