use crate::core::map_pixels;
use crate::types::{Raster, SarResult};

/// Linear backscatter intensity to decibels.
///
/// Zero and negative returns (radar shadow, resampling artifacts) have no
/// logarithm; they become NaN instead of aborting the scene.
pub struct BackscatterDecoder;

impl BackscatterDecoder {
    /// `10 * log10(v)` for positive `v`, NaN otherwise
    pub fn linear_to_db(value: f64) -> f64 {
        if value > 0.0 {
            10.0 * value.log10()
        } else {
            f64::NAN
        }
    }

    /// Decode band-1 linear intensity into a dB raster on the same grid
    pub fn decode(linear: &Raster) -> SarResult<Raster> {
        log::info!(
            "Converting {}x{} linear backscatter to dB",
            linear.width(),
            linear.height()
        );

        let db = map_pixels(&linear.masked(), Self::linear_to_db);

        let invalid = db.iter().filter(|v| v.is_nan()).count();
        log::debug!(
            "{} of {} pixels invalid after dB conversion",
            invalid,
            db.len()
        );

        linear.derive(db, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::Crs;
    use crate::types::AffineTransform;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn raster(data: ndarray::Array2<f64>, nodata: Option<f64>) -> Raster {
        Raster::new(data, AffineTransform::north_up(0.0, 0.0, 1.0, 1.0), Crs::Wgs84, nodata).unwrap()
    }

    #[test]
    fn test_db_conversion_scenario() {
        let linear = raster(
            array![[4.0, 0.0, -1.0], [100.0, 10000.0, 1.0], [0.01, 1.0, 10.0]],
            None,
        );
        let db = BackscatterDecoder::decode(&linear).unwrap();
        let d = db.data();

        let expected = [
            [Some(6.02), None, None],
            [Some(20.0), Some(40.0), Some(0.0)],
            [Some(-20.0), Some(0.0), Some(10.0)],
        ];
        for (row, values) in expected.iter().enumerate() {
            for (col, value) in values.iter().enumerate() {
                match value {
                    Some(v) => assert_abs_diff_eq!((d[[row, col]] * 100.0).round() / 100.0, *v),
                    None => assert!(d[[row, col]].is_nan()),
                }
            }
        }
        assert_eq!(db.valid_count(), 7);
    }

    #[test]
    fn test_monotonic() {
        let values = [1e-6, 0.003, 0.5, 1.0, 2.0, 77.0, 1e5];
        for pair in values.windows(2) {
            assert!(
                BackscatterDecoder::linear_to_db(pair[1]) > BackscatterDecoder::linear_to_db(pair[0])
            );
        }
        assert!(BackscatterDecoder::linear_to_db(0.0).is_nan());
        assert!(BackscatterDecoder::linear_to_db(-1.0).is_nan());
    }

    #[test]
    fn test_nodata_sentinel_stays_invalid() {
        // a positive sentinel must not be decoded as a real return
        let linear = raster(array![[65535.0, 10.0]], Some(65535.0));
        let db = BackscatterDecoder::decode(&linear).unwrap();
        assert!(db.data()[[0, 0]].is_nan());
        assert_abs_diff_eq!(db.data()[[0, 1]], 10.0, epsilon = 1e-12);
        assert_eq!(db.nodata(), None);
    }
}
