use crate::crs::Crs;
use ndarray::{s, Array2};
use serde::{Deserialize, Serialize};

/// 2D real raster samples (row x column)
pub type RasterData = Array2<f64>;

/// Six-coefficient affine transform mapping pixel (col, row) to map (x, y):
/// `x = a*col + b*row + c`, `y = d*col + e*row + f`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineTransform {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// North-up transform with the top-left corner at `(origin_x, origin_y)`
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self::new(pixel_width, 0.0, origin_x, 0.0, -pixel_height.abs(), origin_y)
    }

    /// Build from a GDAL geotransform `[c, a, b, f, d, e]`
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self::new(gt[1], gt[2], gt[0], gt[4], gt[5], gt[3])
    }

    /// GDAL geotransform ordering `[c, a, b, f, d, e]`
    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    /// Map a (fractional) pixel position to map coordinates
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.a * col + self.b * row + self.c,
            self.d * col + self.e * row + self.f,
        )
    }

    /// Determinant of the 2x2 linear part
    pub fn determinant(&self) -> f64 {
        self.a * self.e - self.b * self.d
    }

    /// Inverse transform mapping map (x, y) back to pixel (col, row)
    pub fn inverse(&self) -> SarResult<AffineTransform> {
        let det = self.determinant();
        if det == 0.0 || !det.is_finite() {
            return Err(SarError::NonInvertibleTransform(det));
        }

        let a = self.e / det;
        let b = -self.b / det;
        let d = -self.d / det;
        let e = self.a / det;

        Ok(AffineTransform::new(
            a,
            b,
            -(a * self.c + b * self.f),
            d,
            e,
            -(d * self.c + e * self.f),
        ))
    }

    /// Transform whose origin sits on pixel `(col_offset, row_offset)` of this one
    pub fn shifted(&self, col_offset: usize, row_offset: usize) -> AffineTransform {
        let (c, f) = self.apply(col_offset as f64, row_offset as f64);
        AffineTransform { c, f, ..*self }
    }

    fn bit_pattern(&self) -> [u64; 6] {
        [
            self.a.to_bits(),
            self.b.to_bits(),
            self.c.to_bits(),
            self.d.to_bits(),
            self.e.to_bits(),
            self.f.to_bits(),
        ]
    }
}

/// Geographic bounding box in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl GeoBoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> SarResult<Self> {
        let bbox = Self { min_lon, min_lat, max_lon, max_lat };
        bbox.validate()?;
        Ok(bbox)
    }

    /// Region of interest used by the reference deployment
    pub fn reference_region() -> Self {
        Self {
            min_lon: 138.17,
            min_lat: 37.81,
            max_lon: 138.61,
            max_lat: 38.34,
        }
    }

    pub fn validate(&self) -> SarResult<()> {
        let finite = [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
            .iter()
            .all(|v| v.is_finite());

        if !finite || self.min_lon >= self.max_lon || self.min_lat >= self.max_lat {
            return Err(SarError::Config(format!(
                "Degenerate bounding box: lon [{}, {}], lat [{}, {}]",
                self.min_lon, self.max_lon, self.min_lat, self.max_lat
            )));
        }
        Ok(())
    }

    /// Corners as (lon, lat): top-left, top-right, bottom-left, bottom-right
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.min_lon, self.max_lat),
            (self.max_lon, self.max_lat),
            (self.min_lon, self.min_lat),
            (self.max_lon, self.min_lat),
        ]
    }
}

/// Destination grid descriptor: everything about a raster except its samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub crs: Crs,
    pub transform: AffineTransform,
    pub width: usize,
    pub height: usize,
}

impl GridSpec {
    /// Identity used to cache work done per grid
    pub fn key(&self) -> GridKey {
        GridKey {
            crs: self.crs.to_string(),
            transform: self.transform.bit_pattern(),
            width: self.width,
            height: self.height,
        }
    }
}

/// Hashable identity of a [`GridSpec`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GridKey {
    crs: String,
    transform: [u64; 6],
    width: usize,
    height: usize,
}

/// Immutable georeferenced single-band raster.
///
/// A sample is invalid when it is NaN or equal to `nodata`. Stages never
/// mutate a raster; each one returns a new raster.
#[derive(Debug, Clone)]
pub struct Raster {
    data: RasterData,
    transform: AffineTransform,
    crs: Crs,
    nodata: Option<f64>,
}

impl Raster {
    pub fn new(
        data: RasterData,
        transform: AffineTransform,
        crs: Crs,
        nodata: Option<f64>,
    ) -> SarResult<Self> {
        let (height, width) = data.dim();
        if width == 0 || height == 0 {
            return Err(SarError::InvalidFormat(format!(
                "Raster has invalid dimensions: {}x{}",
                width, height
            )));
        }

        Ok(Self { data, transform, crs, nodata })
    }

    /// New raster on the same grid as `self` with different samples
    pub fn derive(&self, data: RasterData, nodata: Option<f64>) -> SarResult<Raster> {
        if data.dim() != self.data.dim() {
            return Err(SarError::ShapeMismatch {
                expected: self.data.dim(),
                actual: data.dim(),
            });
        }
        Raster::new(data, self.transform, self.crs.clone(), nodata)
    }

    pub fn data(&self) -> &RasterData {
        &self.data
    }

    pub fn into_data(self) -> RasterData {
        self.data
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }

    /// (height, width), matching `Array2::dim`
    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn transform(&self) -> &AffineTransform {
        &self.transform
    }

    pub fn crs(&self) -> &Crs {
        &self.crs
    }

    pub fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    pub fn grid(&self) -> GridSpec {
        GridSpec {
            crs: self.crs.clone(),
            transform: self.transform,
            width: self.width(),
            height: self.height(),
        }
    }

    pub fn is_valid_value(&self, value: f64) -> bool {
        !value.is_nan() && self.nodata.map_or(true, |nd| value != nd)
    }

    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        self.data
            .get((row, col))
            .copied()
            .filter(|v| self.is_valid_value(*v))
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|v| self.is_valid_value(**v)).count()
    }

    /// Samples with every invalid value replaced by NaN
    pub fn masked(&self) -> RasterData {
        match self.nodata {
            Some(nd) if !nd.is_nan() => self.data.mapv(|v| if v == nd { f64::NAN } else { v }),
            _ => self.data.clone(),
        }
    }

    /// Copy of the half-open pixel window `[row0, row1) x [col0, col1)`
    pub fn window(&self, row0: usize, row1: usize, col0: usize, col1: usize) -> SarResult<Raster> {
        if row0 >= row1 || col0 >= col1 || row1 > self.height() || col1 > self.width() {
            return Err(SarError::EmptyWindow(format!(
                "rows {}..{}, cols {}..{} on a {}x{} raster",
                row0,
                row1,
                col0,
                col1,
                self.width(),
                self.height()
            )));
        }

        let data = self.data.slice(s![row0..row1, col0..col1]).to_owned();
        Raster::new(data, self.transform.shifted(col0, row0), self.crs.clone(), self.nodata)
    }

    /// Map-space extent `(min_x, min_y, max_x, max_y)` in the raster CRS
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (w, h) = (self.width() as f64, self.height() as f64);
        let corners = [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(w, 0.0),
            self.transform.apply(0.0, h),
            self.transform.apply(w, h),
        ];

        corners.iter().fold(
            (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        )
    }
}

/// Error types for SAR moisture processing
#[derive(Debug, thiserror::Error)]
pub enum SarError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("CRS error: {0}")]
    Crs(String),

    #[error("Affine transform is not invertible (determinant {0})")]
    NonInvertibleTransform(f64),

    #[error("Empty clip window: {0}")]
    EmptyWindow(String),

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{stage} failed for {source_id}: {source}")]
    Stage {
        source_id: String,
        stage: &'static str,
        source: Box<SarError>,
    },

    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl SarError {
    /// Attach the file identifier and pipeline stage to a per-file error
    pub fn at_stage(self, source_id: &str, stage: &'static str) -> SarError {
        match self {
            // configuration problems stay fatal for the whole run
            SarError::Config(_) | SarError::Stage { .. } => self,
            other => SarError::Stage {
                source_id: source_id.to_string(),
                stage,
                source: Box::new(other),
            },
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self, SarError::Config(_))
    }

    /// Pipeline stage a per-file error was raised in, if known
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            SarError::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// Result type for SAR operations
pub type SarResult<T> = Result<T, SarError>;

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn sample_raster() -> Raster {
        let data = array![[1.0, 2.0, 3.0], [4.0, -9999.0, 6.0]];
        Raster::new(
            data,
            AffineTransform::north_up(138.0, 38.5, 0.01, 0.01),
            Crs::Wgs84,
            Some(-9999.0),
        )
        .unwrap()
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = AffineTransform::new(0.5, 0.1, 100.0, -0.2, -0.5, 50.0);
        let inv = t.inverse().unwrap();
        let (x, y) = t.apply(12.25, 7.5);
        let (col, row) = inv.apply(x, y);
        assert_relative_eq!(col, 12.25, epsilon = 1e-9);
        assert_relative_eq!(row, 7.5, epsilon = 1e-9);
    }

    #[test]
    fn test_singular_transform_is_rejected() {
        let t = AffineTransform::new(1.0, 2.0, 0.0, 2.0, 4.0, 0.0);
        assert!(matches!(t.inverse(), Err(SarError::NonInvertibleTransform(_))));
    }

    #[test]
    fn test_gdal_ordering() {
        let gt = [138.0, 0.01, 0.0, 38.5, 0.0, -0.01];
        let t = AffineTransform::from_gdal(gt);
        assert_eq!(t.c, 138.0);
        assert_eq!(t.e, -0.01);
        assert_eq!(t.to_gdal(), gt);
    }

    #[test]
    fn test_nodata_is_invalid() {
        let raster = sample_raster();
        assert_eq!(raster.valid_count(), 5);
        assert_eq!(raster.value(1, 1), None);
        assert_eq!(raster.value(0, 2), Some(3.0));
        assert!(raster.masked()[[1, 1]].is_nan());
    }

    #[test]
    fn test_window_moves_origin() {
        let raster = sample_raster();
        let sub = raster.window(1, 2, 1, 3).unwrap();
        assert_eq!(sub.dim(), (1, 2));
        assert_relative_eq!(sub.transform().c, 138.01, epsilon = 1e-12);
        assert_relative_eq!(sub.transform().f, 38.49, epsilon = 1e-12);
        assert_eq!(sub.value(0, 1), Some(6.0));
    }

    #[test]
    fn test_derive_rejects_other_shape() {
        let raster = sample_raster();
        let err = raster.derive(Array2::zeros((3, 3)), None).unwrap_err();
        assert!(matches!(err, SarError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_degenerate_bbox_is_config_error() {
        let err = GeoBoundingBox::new(138.61, 37.81, 138.17, 38.34).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_stage_wrapping_keeps_config_errors() {
        let per_file = SarError::Crs("bad".into()).at_stage("scene_a", "align");
        assert_eq!(per_file.stage(), Some("align"));

        let config = SarError::Config("empty table".into()).at_stage("scene_a", "correct");
        assert!(config.is_config());
    }
}
