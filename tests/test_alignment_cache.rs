use std::sync::Arc;

use ndarray::Array2;
use rayon::prelude::*;
use sarmoist::{AffineTransform, AlignmentCache, Crs, GridAligner, GridSpec, Raster};

fn dem() -> Arc<Raster> {
    let data = Array2::from_shape_fn((80, 80), |(r, c)| (r * 10 + c) as f64);
    Arc::new(
        Raster::new(data, AffineTransform::north_up(138.0, 38.6, 0.01, 0.01), Crs::Wgs84, None)
            .expect("valid DEM"),
    )
}

fn grid(offset: usize) -> GridSpec {
    GridSpec {
        crs: Crs::Wgs84,
        transform: AffineTransform::north_up(138.1 + 0.003 * offset as f64, 38.5, 0.005, 0.005),
        width: 40,
        height: 40,
    }
}

#[test]
fn test_concurrent_requests_compute_each_grid_once() {
    let _ = env_logger::builder().is_test(true).try_init();

    let cache = AlignmentCache::new(dem());
    let requests: Vec<usize> = (0..32).map(|i| i % 4).collect();

    let results: Vec<Arc<Raster>> = requests
        .par_iter()
        .map(|&g| cache.get_or_align(&grid(g)).expect("alignment succeeds"))
        .collect();

    assert_eq!(cache.misses(), 4);
    assert_eq!(cache.hits(), 28);
    assert_eq!(cache.len(), 4);

    for (g, result) in requests.iter().zip(&results) {
        let first = results
            .iter()
            .zip(&requests)
            .find(|(_, other)| *other == g)
            .map(|(r, _)| r)
            .unwrap();
        assert!(Arc::ptr_eq(result, first));
    }
}

#[test]
fn test_cached_result_matches_direct_alignment() {
    let source = dem();
    let cache = AlignmentCache::new(Arc::clone(&source));

    let cached = cache.get_or_align(&grid(1)).unwrap();
    let direct = GridAligner::align(&source, &grid(1)).unwrap();

    assert_eq!(cached.dim(), (40, 40));
    assert_eq!(cached.transform(), direct.transform());
    for (a, b) in cached.data().iter().zip(direct.data().iter()) {
        assert!((a.is_nan() && b.is_nan()) || a == b);
    }
}

#[test]
fn test_grid_identity_includes_crs_and_size() {
    let cache = AlignmentCache::new(dem());
    let base = grid(0);

    let mut smaller = base.clone();
    smaller.width = 20;
    let mut utm = base.clone();
    utm.crs = Crs::Epsg(32654);
    utm.transform = AffineTransform::north_up(400_000.0, 4_260_000.0, 500.0, 500.0);

    cache.get_or_align(&base).unwrap();
    cache.get_or_align(&smaller).unwrap();
    cache.get_or_align(&utm).unwrap();
    cache.get_or_align(&base).unwrap();

    assert_eq!(cache.misses(), 3);
    assert_eq!(cache.hits(), 1);
}

#[test]
fn test_jgd2000_source_on_wgs84_grid() {
    let data = Array2::from_shape_fn((80, 80), |(r, c)| (r * 10 + c) as f64);
    let jgd = Raster::new(
        data,
        AffineTransform::north_up(138.0, 38.6, 0.01, 0.01),
        Crs::Epsg(4612),
        None,
    )
    .unwrap();
    let cache = AlignmentCache::new(Arc::new(jgd));

    let aligned = cache.get_or_align(&grid(0)).unwrap();
    let reference = GridAligner::align(&dem(), &grid(0)).unwrap();
    assert_eq!(aligned.crs(), &Crs::Wgs84);
    // JGD2000 and WGS84 agree to far below a pixel
    for (a, b) in aligned.data().iter().zip(reference.data().iter()) {
        assert!((a - b).abs() < 1e-3, "{} vs {}", a, b);
    }
}
