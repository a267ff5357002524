//! Coordinate reference systems and point transforms.
//!
//! EPSG codes are resolved to PROJ.4 definitions through `crs-definitions`
//! and transformed with `proj4rs`. Identifiers that resolve to no
//! definition are carried opaquely and can only be paired with themselves.

use crate::types::{SarError, SarResult};
use once_cell::sync::Lazy;
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static CRS84_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:urn:ogc:def:crs:)?(?:ogc:(?:1\.3:)?)?crs:?84$")
        .expect("CRS84 pattern is valid")
});

static EPSG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:urn:ogc:def:crs:)?epsg:{1,2}(?:[0-9.]+:)?(\d+)$")
        .expect("EPSG pattern is valid")
});

/// Coordinate reference system of a raster grid
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crs {
    /// WGS84 geographic, x = longitude, y = latitude (degrees)
    Wgs84,
    /// Any other EPSG code with a known PROJ.4 definition
    Epsg(u16),
    /// Inline PROJ.4 definition (`+proj=...`)
    Proj4(String),
    /// Identifier that resolves to no definition (unknown code, WKT, local CS)
    Other(String),
}

impl Crs {
    /// Parse an identifier such as `EPSG:4326`, `urn:ogc:def:crs:EPSG::32654`,
    /// `OGC:CRS84` or a `+proj=` string. Unresolvable identifiers become
    /// [`Crs::Other`].
    pub fn parse(identifier: &str) -> SarResult<Crs> {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return Err(SarError::Crs("Empty CRS identifier".to_string()));
        }

        if CRS84_PATTERN.is_match(trimmed) {
            return Ok(Crs::Wgs84);
        }

        if let Some(caps) = EPSG_PATTERN.captures(trimmed) {
            let code: u32 = caps[1]
                .parse()
                .map_err(|e| SarError::Crs(format!("Invalid EPSG code in '{}': {}", trimmed, e)))?;
            return Ok(Crs::from_epsg(code));
        }

        if trimmed.starts_with("+proj=") {
            return Ok(Crs::Proj4(trimmed.to_string()));
        }

        log::debug!("CRS '{}' has no known definition, keeping it opaque", trimmed);
        Ok(Crs::Other(trimmed.to_string()))
    }

    pub fn from_epsg(code: u32) -> Crs {
        match code {
            4326 => Crs::Wgs84,
            // legacy Google alias
            900913 => Crs::Epsg(3857),
            _ => match u16::try_from(code) {
                Ok(short) if crs_definitions::from_code(short).is_some() => Crs::Epsg(short),
                _ => {
                    log::debug!("EPSG:{} has no known definition", code);
                    Crs::Other(format!("EPSG:{}", code))
                }
            },
        }
    }

    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Wgs84 => Some(4326),
            Crs::Epsg(code) => Some(*code as u32),
            Crs::Proj4(_) | Crs::Other(_) => None,
        }
    }

    /// PROJ.4 definition, if this CRS can be resolved to one
    pub fn proj_definition(&self) -> Option<&str> {
        match self {
            Crs::Wgs84 => crs_definitions::from_code(4326).map(|def| def.proj4),
            Crs::Epsg(code) => crs_definitions::from_code(*code).map(|def| def.proj4),
            Crs::Proj4(definition) => Some(definition.as_str()),
            Crs::Other(_) => None,
        }
    }

    pub fn is_resolvable(&self) -> bool {
        self.proj_definition().is_some()
    }

    /// Whether coordinates are longitude/latitude degrees
    pub fn is_geographic(&self) -> bool {
        match self {
            Crs::Wgs84 => true,
            other => other.proj_definition().map_or(false, is_longlat),
        }
    }
}

fn is_longlat(definition: &str) -> bool {
    definition.split_whitespace().any(|token| {
        matches!(token, "+proj=longlat" | "+proj=latlong" | "+proj=lonlat" | "+proj=latlon")
    })
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Wgs84 => write!(f, "EPSG:4326"),
            Crs::Epsg(code) => write!(f, "EPSG:{}", code),
            Crs::Proj4(identifier) | Crs::Other(identifier) => write!(f, "{}", identifier),
        }
    }
}

struct Projection {
    source: Proj,
    target: Proj,
    source_geographic: bool,
    target_geographic: bool,
}

/// Point transform between two CRSs
pub struct CoordinateTransform {
    source: Crs,
    target: Crs,
    projection: Option<Projection>,
}

impl fmt::Debug for CoordinateTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoordinateTransform")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("identity", &self.is_identity())
            .finish()
    }
}

fn build_proj(crs: &Crs) -> SarResult<Proj> {
    let definition = crs
        .proj_definition()
        .ok_or_else(|| SarError::Crs(format!("No projection definition for {}", crs)))?;
    Proj::from_proj_string(definition)
        .map_err(|e| SarError::Crs(format!("Invalid projection for {}: {:?}", crs, e)))
}

impl CoordinateTransform {
    pub fn new(source: &Crs, target: &Crs) -> SarResult<Self> {
        if source == target {
            return Ok(Self {
                source: source.clone(),
                target: target.clone(),
                projection: None,
            });
        }

        let projection = Projection {
            source: build_proj(source)?,
            target: build_proj(target)?,
            source_geographic: source.is_geographic(),
            target_geographic: target.is_geographic(),
        };

        log::debug!("Coordinate transform {} -> {}", source, target);
        Ok(Self {
            source: source.clone(),
            target: target.clone(),
            projection: Some(projection),
        })
    }

    pub fn is_identity(&self) -> bool {
        self.projection.is_none()
    }

    pub fn source(&self) -> &Crs {
        &self.source
    }

    pub fn target(&self) -> &Crs {
        &self.target
    }

    /// Transform a single point; points the projection rejects come back
    /// as NaN.
    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        let projection = match &self.projection {
            Some(projection) => projection,
            None => return (x, y),
        };

        let mut point = if projection.source_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        if transform(&projection.source, &projection.target, &mut point).is_err() {
            return (f64::NAN, f64::NAN);
        }

        if projection.target_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_parse_identifiers() {
        assert_eq!(Crs::parse("EPSG:4326").unwrap(), Crs::Wgs84);
        assert_eq!(Crs::parse("epsg:3857").unwrap(), Crs::Epsg(3857));
        assert_eq!(Crs::parse("EPSG:900913").unwrap(), Crs::Epsg(3857));
        assert_eq!(Crs::parse("CRS:84").unwrap(), Crs::Wgs84);
        assert_eq!(Crs::parse("urn:ogc:def:crs:OGC:1.3:CRS84").unwrap(), Crs::Wgs84);
        assert_eq!(Crs::parse("urn:ogc:def:crs:EPSG::32654").unwrap(), Crs::Epsg(32654));
        assert_eq!(Crs::parse("EPSG:6668").unwrap(), Crs::Epsg(6668));
        assert_eq!(Crs::parse("EPSG:99999999").unwrap(), Crs::Other("EPSG:99999999".to_string()));
        assert_eq!(
            Crs::parse(" +proj=longlat +ellps=GRS80 +no_defs ").unwrap(),
            Crs::Proj4("+proj=longlat +ellps=GRS80 +no_defs".to_string())
        );
        assert!(Crs::parse("   ").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        for crs in [Crs::Wgs84, Crs::Epsg(3857), Crs::Epsg(32654), Crs::Epsg(6690)] {
            assert_eq!(Crs::parse(&crs.to_string()).unwrap(), crs);
        }
    }

    #[test]
    fn test_geographic_detection() {
        assert!(Crs::Wgs84.is_geographic());
        assert!(Crs::Epsg(4612).is_geographic());
        assert!(!Crs::Epsg(32654).is_geographic());
        assert!(!Crs::Epsg(6690).is_geographic());
        assert!(!Crs::Other("LOCAL_CS".to_string()).is_geographic());
    }

    #[test]
    fn test_utm_northing_at_45_degrees() {
        let to_utm = CoordinateTransform::new(&Crs::Wgs84, &Crs::Epsg(32631)).unwrap();
        let (x, y) = to_utm.transform(3.0, 0.0);
        assert_abs_diff_eq!(x, 500_000.0, epsilon = 1e-3);
        assert_abs_diff_eq!(y, 0.0, epsilon = 1e-3);

        // 0.9996 times the WGS84 meridian arc to 45 degrees
        let (_, y45) = to_utm.transform(3.0, 45.0);
        assert_abs_diff_eq!(y45, 4_982_950.4, epsilon = 1.0);
    }

    #[test]
    fn test_utm_round_trip() {
        let forward = CoordinateTransform::new(&Crs::Wgs84, &Crs::Epsg(32654)).unwrap();
        let back = CoordinateTransform::new(&Crs::Epsg(32654), &Crs::Wgs84).unwrap();

        for &(lon, lat) in &[(138.17, 37.81), (138.61, 38.34), (141.0, 35.0)] {
            let (x, y) = forward.transform(lon, lat);
            let (lon2, lat2) = back.transform(x, y);
            assert_abs_diff_eq!(lon2, lon, epsilon = 1e-7);
            assert_abs_diff_eq!(lat2, lat, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_southern_utm_round_trip() {
        let forward = CoordinateTransform::new(&Crs::Wgs84, &Crs::Epsg(32756)).unwrap();
        let back = CoordinateTransform::new(&Crs::Epsg(32756), &Crs::Wgs84).unwrap();
        let (x, y) = forward.transform(151.2, -33.9);
        assert!(y > 6_000_000.0 && y < 7_000_000.0);
        let (lon, lat) = back.transform(x, y);
        assert_abs_diff_eq!(lon, 151.2, epsilon = 1e-7);
        assert_abs_diff_eq!(lat, -33.9, epsilon = 1e-7);
    }

    #[test]
    fn test_jgd2000_is_close_to_wgs84() {
        let to_jgd = CoordinateTransform::new(&Crs::Wgs84, &Crs::Epsg(4612)).unwrap();
        assert!(!to_jgd.is_identity());
        let (lon, lat) = to_jgd.transform(138.4, 38.0);
        assert_abs_diff_eq!(lon, 138.4, epsilon = 1e-6);
        assert_abs_diff_eq!(lat, 38.0, epsilon = 1e-6);
    }

    #[test]
    fn test_jgd2011_utm_matches_wgs84_utm() {
        let jgd = CoordinateTransform::new(&Crs::Wgs84, &Crs::Epsg(6690)).unwrap();
        let wgs = CoordinateTransform::new(&Crs::Wgs84, &Crs::Epsg(32654)).unwrap();
        let (x1, y1) = jgd.transform(138.4, 38.0);
        let (x2, y2) = wgs.transform(138.4, 38.0);
        assert!(x1.is_finite() && y1.is_finite());
        assert_abs_diff_eq!(x1, x2, epsilon = 1.0);
        assert_abs_diff_eq!(y1, y2, epsilon = 1.0);
    }

    #[test]
    fn test_inline_proj4_definition() {
        let inline = Crs::parse("+proj=utm +zone=54 +datum=WGS84 +units=m +no_defs").unwrap();
        let a = CoordinateTransform::new(&Crs::Wgs84, &inline).unwrap();
        let b = CoordinateTransform::new(&Crs::Wgs84, &Crs::Epsg(32654)).unwrap();
        let (x1, y1) = a.transform(138.4, 38.0);
        let (x2, y2) = b.transform(138.4, 38.0);
        assert_abs_diff_eq!(x1, x2, epsilon = 1e-6);
        assert_abs_diff_eq!(y1, y2, epsilon = 1e-6);
    }

    #[test]
    fn test_opaque_crs_only_pairs_with_itself() {
        let local = Crs::Other("LOCAL_CS[\"site grid\"]".to_string());
        assert!(!local.is_resolvable());
        assert!(CoordinateTransform::new(&local, &local).unwrap().is_identity());
        assert!(matches!(
            CoordinateTransform::new(&local, &Crs::Wgs84),
            Err(SarError::Crs(_))
        ));
        assert!(CoordinateTransform::new(&Crs::Wgs84, &local).is_err());
    }
}
