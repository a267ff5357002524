//! Per-scene moisture pipeline and the batch runner built on it.
//!
//! A scene goes through decode, DEM alignment (cached per grid), clipping,
//! elevation correction, classification and band statistics. Errors raised
//! while processing a scene are tagged with its identifier and the stage
//! that failed; a batch run records them and moves on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::core::align::AlignmentCache;
use crate::core::bands::ElevationBandTable;
use crate::core::classify::{standard_moisture_table, MoistureClassifier, MoistureThresholds};
use crate::core::clip::GeoWindowClipper;
use crate::core::correct::{standard_correction_table, ElevationCorrector};
use crate::core::decode::BackscatterDecoder;
use crate::core::stats::{BandStatistics, BandStatisticsRecord};
use crate::io::{RasterSink, RasterSource};
use crate::types::{GeoBoundingBox, GridSpec, Raster, SarError, SarResult};

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Region of interest every product is clipped to
    pub region: GeoBoundingBox,
    pub correction_table: ElevationBandTable<f64>,
    pub moisture_table: ElevationBandTable<MoistureThresholds>,
    /// Bands the statistics are grouped by
    pub statistics_table: ElevationBandTable<()>,
    /// Worker threads for batch runs; `None` uses all available cores
    pub max_workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let moisture_table = standard_moisture_table();
        Self {
            region: GeoBoundingBox::reference_region(),
            correction_table: standard_correction_table(),
            statistics_table: moisture_table.boundaries_only(),
            moisture_table,
            max_workers: None,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> SarResult<()> {
        self.region.validate()?;

        let tables = [
            ("correction", self.correction_table.is_empty()),
            ("moisture", self.moisture_table.is_empty()),
            ("statistics", self.statistics_table.is_empty()),
        ];
        for (name, empty) in tables {
            if empty {
                return Err(SarError::Config(format!("The {} band table is empty", name)));
            }
        }

        if self.max_workers == Some(0) {
            return Err(SarError::Config("max_workers must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Worker count for batch runs
    pub fn workers(&self) -> usize {
        self.max_workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Provenance of a moisture product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductMetadata {
    pub source_id: String,
    pub processed_at: DateTime<Utc>,
    /// Grid of the clipped output rasters
    pub grid: GridSpec,
    pub region: GeoBoundingBox,
}

/// Everything produced for one scene, all rasters on the clipped grid
#[derive(Debug, Clone)]
pub struct MoistureProduct {
    pub metadata: ProductMetadata,
    pub raw_db: Raster,
    pub corrected_db: Raster,
    /// 0.0 / 0.5 / 1.0 moisture classes
    pub moisture: Raster,
    pub elevation: Raster,
    pub statistics: Vec<BandStatisticsRecord>,
}

impl MoistureProduct {
    /// Write the four output rasters as `<stem>_raw_db`, `<stem>_corrected_db`,
    /// `<stem>_moisture` and `<stem>_elevation`
    pub fn export(&self, sink: &dyn RasterSink) -> SarResult<()> {
        let stem = output_stem(&self.metadata.source_id);
        let outputs = [
            ("raw_db", &self.raw_db),
            ("corrected_db", &self.corrected_db),
            ("moisture", &self.moisture),
            ("elevation", &self.elevation),
        ];
        for (suffix, raster) in outputs {
            sink.write(&format!("{}_{}", stem, suffix), raster)?;
        }
        Ok(())
    }
}

fn output_stem(source_id: &str) -> &str {
    let name = source_id.rsplit(['/', '\\']).next().unwrap_or(source_id);
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}

/// A scene that could not be processed
#[derive(Debug)]
pub struct BatchFailure {
    pub source_id: String,
    pub error: SarError,
}

/// Outcome of a batch run, both lists in input order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub products: Vec<MoistureProduct>,
    pub failures: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn processed(&self) -> usize {
        self.products.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Moisture pipeline bound to one DEM
pub struct MoisturePipeline {
    config: PipelineConfig,
    cache: Arc<AlignmentCache>,
    corrector: ElevationCorrector,
    classifier: MoistureClassifier,
}

impl MoisturePipeline {
    pub fn new(config: PipelineConfig, dem: Arc<Raster>) -> SarResult<Self> {
        Self::with_cache(config, Arc::new(AlignmentCache::new(dem)))
    }

    /// Share an existing alignment cache, e.g. between pipelines with
    /// different tables over the same DEM
    pub fn with_cache(config: PipelineConfig, cache: Arc<AlignmentCache>) -> SarResult<Self> {
        config.validate()?;
        log::info!(
            "Moisture pipeline ready: {}x{} DEM in {}, region {:?}",
            cache.source().width(),
            cache.source().height(),
            cache.source().crs(),
            config.region
        );

        Ok(Self {
            corrector: ElevationCorrector::new(config.correction_table.clone()),
            classifier: MoistureClassifier::new(config.moisture_table.clone()),
            config,
            cache,
        })
    }

    /// Load the DEM through `source`; a DEM that cannot be read is a
    /// configuration error
    pub fn from_dem_source<S: RasterSource + ?Sized>(
        config: PipelineConfig,
        source: &S,
        dem_id: &str,
    ) -> SarResult<Self> {
        config.validate()?;
        let dem = source
            .read(dem_id)
            .map_err(|e| SarError::Config(format!("Cannot load DEM {}: {}", dem_id, e)))?;
        Self::new(config, Arc::new(dem))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<AlignmentCache> {
        &self.cache
    }

    /// Run every stage on one linear-intensity scene
    pub fn process(&self, source_id: &str, linear: &Raster) -> SarResult<MoistureProduct> {
        log::info!("Processing {}", source_id);

        let db = BackscatterDecoder::decode(linear).map_err(|e| e.at_stage(source_id, "decode"))?;

        let aligned = self
            .cache
            .get_or_align(&db.grid())
            .map_err(|e| e.at_stage(source_id, "align"))?;

        let window = GeoWindowClipper::window(&db, &self.config.region)
            .map_err(|e| e.at_stage(source_id, "clip"))?;
        let raw_db = GeoWindowClipper::extract(&db, &window).map_err(|e| e.at_stage(source_id, "clip"))?;
        let elevation =
            GeoWindowClipper::extract(&aligned, &window).map_err(|e| e.at_stage(source_id, "clip"))?;

        let corrected_db = self
            .corrector
            .correct(&raw_db, &elevation)
            .map_err(|e| e.at_stage(source_id, "correct"))?;

        let moisture = self
            .classifier
            .classify(&corrected_db, &elevation)
            .map_err(|e| e.at_stage(source_id, "classify"))?;

        let statistics = BandStatistics::compute(&corrected_db, &elevation, &self.config.statistics_table)
            .map_err(|e| e.at_stage(source_id, "statistics"))?;

        let metadata = ProductMetadata {
            source_id: source_id.to_string(),
            processed_at: Utc::now(),
            grid: raw_db.grid(),
            region: self.config.region,
        };

        log::info!(
            "Finished {}: {}x{} pixels, {} statistics bands",
            source_id,
            raw_db.width(),
            raw_db.height(),
            statistics.len()
        );

        Ok(MoistureProduct {
            metadata,
            raw_db,
            corrected_db,
            moisture,
            elevation,
            statistics,
        })
    }

    /// Read a scene from `source` and process it
    pub fn process_source<S: RasterSource + ?Sized>(
        &self,
        source: &S,
        source_id: &str,
    ) -> SarResult<MoistureProduct> {
        let linear = source.read(source_id).map_err(|e| e.at_stage(source_id, "read"))?;
        self.process(source_id, &linear)
    }

    /// Process many scenes on a pool of `max_workers` threads.
    ///
    /// Per-scene failures are collected in the report; only a
    /// configuration error aborts the run.
    pub fn process_batch<S: RasterSource + Sync + ?Sized>(
        &self,
        source: &S,
        source_ids: &[String],
    ) -> SarResult<BatchReport> {
        let workers = self.config.workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| SarError::Processing(format!("Failed to build worker pool: {}", e)))?;

        log::info!("Processing {} scenes with {} workers", source_ids.len(), workers);

        let results: Vec<SarResult<MoistureProduct>> = pool.install(|| {
            source_ids
                .par_iter()
                .map(|id| self.process_source(source, id))
                .collect()
        });

        let mut report = BatchReport::default();
        for (source_id, result) in source_ids.iter().zip(results) {
            match result {
                Ok(product) => report.products.push(product),
                Err(error) if error.is_config() => return Err(error),
                Err(error) => {
                    log::warn!("Skipping {}: {}", source_id, error);
                    report.failures.push(BatchFailure {
                        source_id: source_id.clone(),
                        error,
                    });
                }
            }
        }

        log::info!(
            "Batch finished: {} processed, {} failed (alignment cache: {} hits, {} misses)",
            report.processed(),
            report.failed(),
            self.cache.hits(),
            self.cache.misses()
        );
        Ok(report)
    }
}
