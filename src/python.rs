//! Python bindings (`sarmoist._core`)

use std::sync::Arc;

use numpy::{IntoPyArray, PyArray2, PyReadonlyArray2};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList};

use crate::core::{BackscatterDecoder, MoisturePipeline, MoistureProduct, PipelineConfig};
use crate::crs::Crs;
use crate::types::{AffineTransform, GeoBoundingBox, Raster, SarError};

fn to_py_err(e: SarError) -> PyErr {
    if e.is_config() {
        PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
    } else {
        PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e))
    }
}

fn raster_from_numpy(
    data: PyReadonlyArray2<f64>,
    geo_transform: [f64; 6],
    crs: &str,
    nodata: Option<f64>,
) -> PyResult<Raster> {
    let crs = Crs::parse(crs).map_err(to_py_err)?;
    Raster::new(
        data.as_array().to_owned(),
        AffineTransform::from_gdal(geo_transform),
        crs,
        nodata,
    )
    .map_err(to_py_err)
}

fn config_for(region: Option<(f64, f64, f64, f64)>) -> PyResult<PipelineConfig> {
    let mut config = PipelineConfig::default();
    if let Some((min_lon, min_lat, max_lon, max_lat)) = region {
        config.region = GeoBoundingBox::new(min_lon, min_lat, max_lon, max_lat).map_err(to_py_err)?;
    }
    Ok(config)
}

fn product_to_dict<'py>(py: Python<'py>, product: MoistureProduct) -> PyResult<&'py PyDict> {
    let dict = PyDict::new(py);
    dict.set_item("source_id", &product.metadata.source_id)?;
    dict.set_item("processed_at", product.metadata.processed_at.to_rfc3339())?;
    dict.set_item("geo_transform", product.corrected_db.transform().to_gdal().to_vec())?;
    dict.set_item("crs", product.corrected_db.crs().to_string())?;

    let statistics = PyList::empty(py);
    for record in &product.statistics {
        let row = PyDict::new(py);
        row.set_item("elevation_range", &record.elevation_range)?;
        row.set_item("mean", record.mean)?;
        row.set_item("std", record.std)?;
        row.set_item("count", record.count)?;
        statistics.append(row)?;
    }
    dict.set_item("statistics", statistics)?;

    dict.set_item("raw_db", product.raw_db.into_data().into_pyarray(py))?;
    dict.set_item("corrected_db", product.corrected_db.into_data().into_pyarray(py))?;
    dict.set_item("moisture", product.moisture.into_data().into_pyarray(py))?;
    dict.set_item("elevation", product.elevation.into_data().into_pyarray(py))?;
    Ok(dict)
}

/// Linear intensity to dB, NaN for non-positive samples
#[pyfunction]
fn to_db<'py>(py: Python<'py>, linear: PyReadonlyArray2<f64>) -> &'py PyArray2<f64> {
    linear
        .as_array()
        .mapv(BackscatterDecoder::linear_to_db)
        .into_pyarray(py)
}

/// One-shot run of the full pipeline on a scene and a DEM
#[pyfunction]
#[pyo3(signature = (sar, sar_transform, sar_crs, dem, dem_transform, dem_crs, region=None, sar_nodata=None, dem_nodata=None))]
#[allow(clippy::too_many_arguments)]
fn process_scene<'py>(
    py: Python<'py>,
    sar: PyReadonlyArray2<f64>,
    sar_transform: [f64; 6],
    sar_crs: &str,
    dem: PyReadonlyArray2<f64>,
    dem_transform: [f64; 6],
    dem_crs: &str,
    region: Option<(f64, f64, f64, f64)>,
    sar_nodata: Option<f64>,
    dem_nodata: Option<f64>,
) -> PyResult<&'py PyDict> {
    let scene = raster_from_numpy(sar, sar_transform, sar_crs, sar_nodata)?;
    let dem = raster_from_numpy(dem, dem_transform, dem_crs, dem_nodata)?;
    let pipeline = MoisturePipeline::new(config_for(region)?, Arc::new(dem)).map_err(to_py_err)?;

    let product = py
        .allow_threads(|| pipeline.process("scene", &scene))
        .map_err(to_py_err)?;
    product_to_dict(py, product)
}

/// Pipeline bound to one DEM; alignments are reused across scenes on the same grid
#[pyclass(name = "MoisturePipeline")]
struct PyMoisturePipeline {
    inner: MoisturePipeline,
}

#[pymethods]
impl PyMoisturePipeline {
    #[new]
    #[pyo3(signature = (dem, dem_transform, dem_crs, region=None, dem_nodata=None))]
    fn new(
        dem: PyReadonlyArray2<f64>,
        dem_transform: [f64; 6],
        dem_crs: &str,
        region: Option<(f64, f64, f64, f64)>,
        dem_nodata: Option<f64>,
    ) -> PyResult<Self> {
        let dem = raster_from_numpy(dem, dem_transform, dem_crs, dem_nodata)?;
        let inner = MoisturePipeline::new(config_for(region)?, Arc::new(dem)).map_err(to_py_err)?;
        Ok(PyMoisturePipeline { inner })
    }

    #[pyo3(signature = (source_id, sar, sar_transform, sar_crs, sar_nodata=None))]
    fn process<'py>(
        &self,
        py: Python<'py>,
        source_id: &str,
        sar: PyReadonlyArray2<f64>,
        sar_transform: [f64; 6],
        sar_crs: &str,
        sar_nodata: Option<f64>,
    ) -> PyResult<&'py PyDict> {
        let scene = raster_from_numpy(sar, sar_transform, sar_crs, sar_nodata)?;
        let product = py
            .allow_threads(|| self.inner.process(source_id, &scene))
            .map_err(to_py_err)?;
        product_to_dict(py, product)
    }

    /// (hits, misses) of the DEM alignment cache
    fn cache_stats(&self) -> (u64, u64) {
        (self.inner.cache().hits(), self.inner.cache().misses())
    }
}

/// Python module definition
#[pymodule]
fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(to_db, m)?)?;
    m.add_function(wrap_pyfunction!(process_scene, m)?)?;
    m.add_class::<PyMoisturePipeline>()?;
    Ok(())
}
