use crate::crs::Crs;
use crate::io::{RasterSink, RasterSource};
use crate::types::{AffineTransform, Raster, SarError, SarResult};
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Read band 1 of a GeoTIFF (or any GDAL raster) as f64
pub fn read_geotiff<P: AsRef<Path>>(path: P) -> SarResult<Raster> {
    log::info!("Reading raster: {}", path.as_ref().display());

    let dataset = Dataset::open(path.as_ref())?;
    let geo_transform = dataset.geo_transform()?;
    let (width, height) = dataset.raster_size();
    log::debug!("Raster size: {}x{}, geotransform: {:?}", width, height, geo_transform);

    let crs = read_crs(&dataset)?;

    let rasterband = dataset.rasterband(1)?;
    let nodata = rasterband.no_data_value();
    let band_data = rasterband.read_as::<f64>((0, 0), (width, height), (width, height), None)?;

    let data = Array2::from_shape_vec((height, width), band_data.data)?;
    Raster::new(data, AffineTransform::from_gdal(geo_transform), crs, nodata)
}

fn read_crs(dataset: &Dataset) -> SarResult<Crs> {
    let srs = dataset
        .spatial_ref()
        .map_err(|e| SarError::Crs(format!("Raster has no usable CRS: {}", e)))?;

    if let (Ok(name), Ok(code)) = (srs.auth_name(), srs.auth_code()) {
        if name.eq_ignore_ascii_case("EPSG") {
            let crs = Crs::parse(&format!("EPSG:{}", code))?;
            if crs.is_resolvable() {
                return Ok(crs);
            }
        }
    }

    if let Ok(proj4) = srs.to_proj4() {
        if !proj4.trim().is_empty() {
            log::debug!("CRS without a known EPSG code, using its PROJ.4 form");
            return Crs::parse(&proj4);
        }
    }

    let wkt = srs.to_wkt()?;
    log::debug!("CRS has no PROJ.4 form, keeping WKT");
    Ok(Crs::Other(wkt))
}

/// Write a raster as a single-band f64 GeoTIFF with NaN no-data
pub fn write_geotiff<P: AsRef<Path>>(raster: &Raster, path: P) -> SarResult<()> {
    log::info!("Saving raster as GeoTIFF: {}", path.as_ref().display());

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let (height, width) = raster.dim();

    let mut dataset =
        driver.create_with_band_type::<f64, _>(path.as_ref(), width as isize, height as isize, 1)?;
    dataset.set_geo_transform(&raster.transform().to_gdal())?;

    let srs = match raster.crs().epsg() {
        Some(code) => SpatialRef::from_epsg(code)?,
        None => SpatialRef::from_definition(&raster.crs().to_string())?,
    };
    dataset.set_spatial_ref(&srs)?;

    let mut rasterband = dataset.rasterband(1)?;
    let buffer = Buffer::new((width, height), raster.masked().iter().copied().collect());
    rasterband.write((0, 0), (width, height), &buffer)?;
    rasterband.set_no_data_value(Some(f64::NAN))?;

    Ok(())
}

/// Directory-backed raster store: scenes are read from `input_dir`,
/// outputs written as `<name>.tif` under `output_dir`
#[derive(Debug, Clone)]
pub struct GeoTiffStore {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl GeoTiffStore {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(input_dir: P, output_dir: Q) -> SarResult<Self> {
        let input_dir = input_dir.into();
        if !input_dir.is_dir() {
            return Err(SarError::Config(format!(
                "Input directory not found: {}",
                input_dir.display()
            )));
        }
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self { input_dir, output_dir })
    }

    /// File names of the `.tif`/`.tiff` scenes in the input directory, sorted
    pub fn list_sources(&self) -> SarResult<Vec<String>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.input_dir)? {
            let path = entry?.path();
            let is_tiff = path
                .extension()
                .and_then(|e| e.to_str())
                .map_or(false, |e| e.eq_ignore_ascii_case("tif") || e.eq_ignore_ascii_case("tiff"));
            if path.is_file() && is_tiff {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    ids.push(name.to_string());
                }
            }
        }
        ids.sort();
        log::info!("Found {} scenes in {}", ids.len(), self.input_dir.display());
        Ok(ids)
    }
}

impl RasterSource for GeoTiffStore {
    fn read(&self, source_id: &str) -> SarResult<Raster> {
        read_geotiff(self.input_dir.join(source_id))
    }
}

impl RasterSink for GeoTiffStore {
    fn write(&self, name: &str, raster: &Raster) -> SarResult<()> {
        write_geotiff(raster, self.output_dir.join(format!("{}.tif", name)))
    }
}
