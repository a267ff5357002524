use std::sync::Arc;

use ndarray::Array2;
use sarmoist::{
    AffineTransform, Crs, MemoryRasterSource, MoisturePipeline, PipelineConfig, Raster, SarError,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn dem() -> Raster {
    let data = Array2::from_shape_fn((50, 40), |(r, _)| 100.0 + 20.0 * r as f64);
    Raster::new(data, AffineTransform::north_up(138.0, 38.6, 0.02, 0.02), Crs::Wgs84, None)
        .expect("valid DEM")
}

fn scene(linear: f64, origin: (f64, f64)) -> Raster {
    Raster::new(
        Array2::from_elem((100, 100), linear),
        AffineTransform::north_up(origin.0, origin.1, 0.01, 0.01),
        Crs::Wgs84,
        None,
    )
    .expect("valid scene")
}

fn source() -> MemoryRasterSource {
    MemoryRasterSource::new()
        .with("dem.tif", dem())
        .with("s1_a.tif", scene(0.02, (138.0, 38.5)))
        .with("s1_b.tif", scene(0.05, (138.0, 38.5)))
        .with("s1_c.tif", scene(0.10, (138.0, 38.5)))
        .with("s1_far.tif", scene(0.05, (10.0, 45.0)))
}

fn ids(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_batch_continues_past_failed_scenes() {
    init_logging();

    let config = PipelineConfig {
        max_workers: Some(2),
        ..Default::default()
    };
    let source = source();
    let pipeline = MoisturePipeline::from_dem_source(config, &source, "dem.tif").unwrap();

    let report = pipeline
        .process_batch(
            &source,
            &ids(&["s1_a.tif", "missing.tif", "s1_b.tif", "s1_far.tif", "s1_c.tif"]),
        )
        .unwrap();

    let processed: Vec<_> = report.products.iter().map(|p| p.metadata.source_id.as_str()).collect();
    assert_eq!(processed, vec!["s1_a.tif", "s1_b.tif", "s1_c.tif"]);
    assert!(!report.is_complete());

    let failed: Vec<_> = report
        .failures
        .iter()
        .map(|f| (f.source_id.as_str(), f.error.stage()))
        .collect();
    assert_eq!(failed, vec![("missing.tif", Some("read")), ("s1_far.tif", Some("clip"))]);

    match &report.failures[1].error {
        SarError::Stage { source, .. } => assert!(matches!(**source, SarError::EmptyWindow(_))),
        other => panic!("unexpected error {:?}", other),
    }

    // the three good scenes share one grid
    assert_eq!(pipeline.cache().misses(), 2);
    assert_eq!(pipeline.cache().hits(), 2);
}

#[test]
fn test_batch_products_are_independent() {
    init_logging();

    let source = source();
    let pipeline =
        MoisturePipeline::from_dem_source(PipelineConfig::default(), &source, "dem.tif").unwrap();
    let report = pipeline
        .process_batch(&source, &ids(&["s1_a.tif", "s1_c.tif"]))
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(report.processed(), 2);

    let a = &report.products[0];
    let c = &report.products[1];
    assert_eq!(a.corrected_db.grid(), c.corrected_db.grid());
    // 10 dB apart before the clamp; both stay inside [-20, 0]
    let diff = c.raw_db.data()[[0, 0]] - a.raw_db.data()[[0, 0]];
    assert!((diff - 10.0 * (0.10_f64 / 0.02).log10()).abs() < 1e-9);
    assert_eq!(a.statistics.len(), c.statistics.len());
}

#[test]
fn test_missing_dem_fails_before_processing() {
    init_logging();

    let source = source();
    let err = MoisturePipeline::from_dem_source(PipelineConfig::default(), &source, "no_dem.tif")
        .err()
        .expect("missing DEM must fail");
    assert!(err.is_config());
}

#[test]
fn test_invalid_config_fails_fast() {
    let config = PipelineConfig {
        max_workers: Some(0),
        ..Default::default()
    };
    let err = MoisturePipeline::new(config, Arc::new(dem())).err().unwrap();
    assert!(err.is_config());
}

#[test]
fn test_empty_batch() {
    let pipeline = MoisturePipeline::new(PipelineConfig::default(), Arc::new(dem())).unwrap();
    let report = pipeline.process_batch(&MemoryRasterSource::new(), &[]).unwrap();
    assert_eq!(report.processed(), 0);
    assert_eq!(report.failed(), 0);
}
