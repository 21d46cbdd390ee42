//! # Coordinate Projection
//!
//! Maps WGS84 latitude/longitude onto a planar grid in metres so that
//! distances, buffers and areas can be computed with plain Euclidean geometry.
//!
//! Reference systems are identified by EPSG code. The built-in
//! [`CrsProjector`] supports:
//!
//! | Code | System |
//! |------|--------|
//! | `EPSG:4326` | WGS84 geodetic (source only) |
//! | `EPSG:326zz` / `EPSG:327zz` | UTM zone zz, northern/southern hemisphere |
//! | `EPSG:27700` | British National Grid (OSGB36) |
//! | `EPSG:3857` | Web Mercator (not area-preserving) |
//!
//! Anything else is rejected when the projector is built, before any data is
//! touched. The transformations themselves, including the WGS84 to OSGB36
//! datum shift, are done by `proj4rs`. Other projection backends can be
//! plugged in through [`Projector`].
//!
//! ## Example
//!
//! ```rust
//! use walk_disturbance::{CrsProjector, GeoPoint, Projector};
//!
//! let projector = CrsProjector::from_codes("EPSG:4326", "EPSG:32631").unwrap();
//! let planar = projector.project(&[GeoPoint::new(0.0, 3.0)]).unwrap();
//!
//! // Zone 31 central meridian on the equator
//! assert!((planar[0].x - 500_000.0).abs() < 1e-3);
//! assert!(planar[0].y.abs() < 1e-3);
//! ```

use std::fmt;
use std::str::FromStr;

use log::{debug, warn};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use serde::{Deserialize, Serialize};

use crate::{GeoPoint, PlanarPoint, ProjectedSample, Result, Sample, WalkError};

/// OSGB36 to WGS84 Helmert parameters (Ordnance Survey, ~5 m accuracy).
const OSGB36_TOWGS84: &str = "446.448,-125.157,542.06,0.15,0.247,0.842,-20.489";

/// Largest latitude Web Mercator can represent.
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// A coordinate reference system, identified by EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// WGS84 latitude/longitude (EPSG:4326)
    Wgs84,
    /// Universal Transverse Mercator on WGS84 (EPSG:326zz north, EPSG:327zz south)
    Utm { zone: u8, north: bool },
    /// Ordnance Survey National Grid (EPSG:27700)
    BritishNationalGrid,
    /// Spherical Web Mercator (EPSG:3857)
    WebMercator,
}

impl Crs {
    /// Look up a supported reference system by EPSG code.
    pub fn from_epsg(code: u32) -> Result<Self> {
        match code {
            4326 => Ok(Crs::Wgs84),
            27700 => Ok(Crs::BritishNationalGrid),
            3857 => Ok(Crs::WebMercator),
            32601..=32660 => Ok(Crs::Utm { zone: (code - 32600) as u8, north: true }),
            32701..=32760 => Ok(Crs::Utm { zone: (code - 32700) as u8, north: false }),
            _ => Err(WalkError::UnsupportedCrs(format!("EPSG:{code}"))),
        }
    }

    pub fn epsg(&self) -> u32 {
        match *self {
            Crs::Wgs84 => 4326,
            Crs::BritishNationalGrid => 27700,
            Crs::WebMercator => 3857,
            Crs::Utm { zone, north: true } => 32600 + zone as u32,
            Crs::Utm { zone, north: false } => 32700 + zone as u32,
        }
    }

    /// UTM zone containing a geodetic point (no Norway/Svalbard exceptions).
    pub fn utm_for(point: &GeoPoint) -> Self {
        let zone = (((point.longitude + 180.0) / 6.0).floor() as i32).clamp(0, 59) + 1;
        Crs::Utm { zone: zone as u8, north: point.latitude >= 0.0 }
    }

    pub fn is_geodetic(&self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    /// PROJ.4 definition of the system.
    fn proj_definition(&self) -> String {
        match *self {
            Crs::Wgs84 => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
            Crs::Utm { zone, north } => format!(
                "+proj=utm +zone={zone}{} +datum=WGS84 +units=m +no_defs",
                if north { "" } else { " +south" }
            ),
            Crs::BritishNationalGrid => format!(
                "+proj=tmerc +lat_0=49 +lon_0=-2 +k=0.9996012717 +x_0=400000 +y_0=-100000 \
                 +ellps=airy +towgs84={OSGB36_TOWGS84} +units=m +no_defs"
            ),
            Crs::WebMercator => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 \
                                 +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
                .to_string(),
        }
    }

    fn to_proj(self) -> Result<Proj> {
        Proj::from_proj_string(&self.proj_definition())
            .map_err(|e| WalkError::UnsupportedCrs(format!("{self}: {e}")))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = WalkError;

    /// Accepts `EPSG:27700`, `epsg:27700` or a bare `27700`.
    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let code = match trimmed.split_once(':') {
            Some((authority, code)) if authority.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return Err(WalkError::UnsupportedCrs(trimmed.to_string())),
            None => trimmed,
        };
        let code: u32 = code
            .trim()
            .parse()
            .map_err(|_| WalkError::UnsupportedCrs(trimmed.to_string()))?;
        Crs::from_epsg(code)
    }
}

impl TryFrom<String> for Crs {
    type Error = WalkError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}

/// Geodetic to planar transformation.
///
/// Implementations must return exactly one planar point per input point, in
/// input order.
pub trait Projector {
    fn project(&self, points: &[GeoPoint]) -> Result<Vec<PlanarPoint>>;
}

/// Built-in projector from WGS84 to one of the supported planar grids.
pub struct CrsProjector {
    source: Crs,
    target: Crs,
    from: Proj,
    to: Proj,
}

impl fmt::Debug for CrsProjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrsProjector")
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}

impl CrsProjector {
    /// Build a projector. Fails with [`WalkError::UnsupportedCrs`] unless the
    /// source is WGS84 and the target is a supported planar grid.
    pub fn new(source: Crs, target: Crs) -> Result<Self> {
        if source != Crs::Wgs84 {
            return Err(WalkError::UnsupportedCrs(format!("{source} as source")));
        }
        match target {
            Crs::Wgs84 => {
                return Err(WalkError::UnsupportedCrs(format!("{target} as planar target")));
            }
            Crs::Utm { zone, .. } if !(1..=60).contains(&zone) => {
                return Err(WalkError::UnsupportedCrs(target.to_string()));
            }
            Crs::WebMercator => {
                warn!("{target} does not preserve distances or areas; footprint areas will be inflated");
            }
            _ => {}
        }

        debug!("Projecting {source} -> {target}");
        Ok(Self {
            source,
            target,
            from: source.to_proj()?,
            to: target.to_proj()?,
        })
    }

    /// Build a projector from EPSG strings such as `"EPSG:4326"`.
    pub fn from_codes(source: &str, target: &str) -> Result<Self> {
        Self::new(source.parse()?, target.parse()?)
    }

    pub fn source(&self) -> Crs {
        self.source
    }

    pub fn target(&self) -> Crs {
        self.target
    }

    fn project_one(&self, point: &GeoPoint) -> Result<PlanarPoint> {
        let invalid = || WalkError::InvalidCoordinate {
            latitude: point.latitude,
            longitude: point.longitude,
        };
        if !point.is_valid() {
            return Err(invalid());
        }
        if self.target == Crs::WebMercator && point.latitude.abs() > WEB_MERCATOR_MAX_LAT {
            return Err(invalid());
        }

        // proj4rs takes geographic coordinates in radians, longitude first
        let mut xyz = (point.longitude.to_radians(), point.latitude.to_radians(), 0.0);
        transform(&self.from, &self.to, &mut xyz).map_err(|e| {
            debug!("Transform of ({}, {}) failed: {e}", point.latitude, point.longitude);
            invalid()
        })?;

        if !xyz.0.is_finite() || !xyz.1.is_finite() {
            return Err(invalid());
        }
        Ok(PlanarPoint::new(xyz.0, xyz.1))
    }
}

impl Projector for CrsProjector {
    fn project(&self, points: &[GeoPoint]) -> Result<Vec<PlanarPoint>> {
        points.iter().map(|p| self.project_one(p)).collect()
    }
}

/// Project raw samples onto the planar grid, combining date and time into a
/// single timestamp. Output is 1:1 with input, in input order.
pub fn project_samples(samples: &[Sample], projector: &dyn Projector) -> Result<Vec<ProjectedSample>> {
    let positions: Vec<GeoPoint> = samples.iter().map(|s| s.position).collect();
    let planar = projector.project(&positions)?;
    if planar.len() != samples.len() {
        return Err(WalkError::InvalidParameter {
            name: "projector",
            reason: format!("returned {} points for {} samples", planar.len(), samples.len()),
        });
    }

    Ok(samples
        .iter()
        .zip(planar)
        .map(|(s, point)| ProjectedSample::new(s.walk_id, s.species, s.timestamp(), point))
        .collect())
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::offset_point;
    use geo::{Distance, Haversine, Point};
    use proptest::prelude::*;

    fn dms(deg: f64, min: f64, sec: f64) -> f64 {
        deg + min / 60.0 + sec / 3600.0
    }

    #[test]
    fn test_parse_crs() {
        assert_eq!("EPSG:27700".parse::<Crs>().unwrap(), Crs::BritishNationalGrid);
        assert_eq!("epsg:4326".parse::<Crs>().unwrap(), Crs::Wgs84);
        assert_eq!("32630".parse::<Crs>().unwrap(), Crs::Utm { zone: 30, north: true });
        assert_eq!("EPSG:32755".parse::<Crs>().unwrap(), Crs::Utm { zone: 55, north: false });
        assert!(matches!("EPSG:2157".parse::<Crs>(), Err(WalkError::UnsupportedCrs(_))));
        assert!(matches!("ESRI:102748".parse::<Crs>(), Err(WalkError::UnsupportedCrs(_))));
        assert!(matches!("bogus".parse::<Crs>(), Err(WalkError::UnsupportedCrs(_))));
    }

    #[test]
    fn test_crs_display_round_trip() {
        for code in [4326, 27700, 3857, 32630, 32755] {
            let crs = Crs::from_epsg(code).unwrap();
            assert_eq!(crs.to_string().parse::<Crs>().unwrap(), crs);
        }
    }

    #[test]
    fn test_every_supported_crs_has_a_definition() {
        for code in [4326, 27700, 3857, 32601, 32630, 32660, 32701, 32756] {
            let crs = Crs::from_epsg(code).unwrap();
            assert!(crs.to_proj().is_ok(), "{crs}");
        }
    }

    #[test]
    fn test_projector_rejects_bad_pairs() {
        assert!(CrsProjector::new(Crs::Wgs84, Crs::Wgs84).is_err());
        assert!(CrsProjector::new(Crs::BritishNationalGrid, Crs::Wgs84).is_err());
        assert!(CrsProjector::from_codes("EPSG:4326", "EPSG:9999").is_err());
    }

    #[test]
    fn test_utm_for() {
        assert_eq!(Crs::utm_for(&GeoPoint::new(50.7, -1.9)), Crs::Utm { zone: 30, north: true });
        assert_eq!(Crs::utm_for(&GeoPoint::new(-33.9, 151.2)), Crs::Utm { zone: 56, north: false });
    }

    #[test]
    fn test_national_grid_os_worked_example() {
        // Ordnance Survey worked example, coordinates already on OSGB36
        let osgb36 = Proj::from_proj_string(&format!(
            "+proj=longlat +ellps=airy +towgs84={OSGB36_TOWGS84} +no_defs"
        ))
        .unwrap();
        let grid = Crs::BritishNationalGrid.to_proj().unwrap();

        let lat = dms(52.0, 39.0, 27.2531).to_radians();
        let lon = dms(1.0, 43.0, 4.5177).to_radians();
        let mut xyz = (lon, lat, 0.0);
        transform(&osgb36, &grid, &mut xyz).unwrap();
        assert!((xyz.0 - 651_409.903).abs() < 0.05, "easting {}", xyz.0);
        assert!((xyz.1 - 313_177.270).abs() < 0.05, "northing {}", xyz.1);
    }

    #[test]
    fn test_british_national_grid_near_true_origin() {
        // WGS84 and OSGB36 differ by ~100m, the grid origin is 49N 2W
        let projector = CrsProjector::new(Crs::Wgs84, Crs::BritishNationalGrid).unwrap();
        let p = projector.project(&[GeoPoint::new(49.0, -2.0)]).unwrap()[0];
        assert!((p.x - 400_000.0).abs() < 150.0, "easting {}", p.x);
        assert!((p.y + 100_000.0).abs() < 150.0, "northing {}", p.y);
    }

    #[test]
    fn test_projected_distance_matches_ground_distance() {
        let origin = GeoPoint::new(50.7, -1.9);
        let moved = offset_point(&origin, 250.0, 0.0);
        let projector = CrsProjector::from_codes("EPSG:4326", "EPSG:27700").unwrap();
        let planar = projector.project(&[origin, moved]).unwrap();
        let ground = Haversine::distance(
            Point::new(origin.longitude, origin.latitude),
            Point::new(moved.longitude, moved.latitude),
        );
        let grid = planar[0].distance_to(&planar[1]);
        assert!((ground - grid).abs() / ground < 0.005, "ground {ground} grid {grid}");
    }

    #[test]
    fn test_south_hemisphere_false_northing() {
        let projector = CrsProjector::from_codes("EPSG:4326", "EPSG:32756").unwrap();
        let p = projector.project(&[GeoPoint::new(-33.86, 153.0)]).unwrap()[0];
        assert!((p.x - 500_000.0).abs() < 1e-3);
        assert!(p.y > 6_000_000.0 && p.y < 10_000_000.0);
    }

    #[test]
    fn test_web_mercator() {
        let projector = CrsProjector::from_codes("EPSG:4326", "EPSG:3857").unwrap();
        let p = projector.project(&[GeoPoint::new(0.0, 180.0)]).unwrap()[0];
        assert!((p.x - 20_037_508.342_789_244).abs() < 1e-3);
        assert!(p.y.abs() < 1e-3);
        assert!(projector.project(&[GeoPoint::new(89.0, 0.0)]).is_err());
    }

    #[test]
    fn test_invalid_coordinate_is_error() {
        let projector = CrsProjector::from_codes("EPSG:4326", "EPSG:27700").unwrap();
        let result = projector.project(&[GeoPoint::new(50.0, -1.0), GeoPoint::new(f64::NAN, 0.0)]);
        assert!(matches!(result, Err(WalkError::InvalidCoordinate { .. })));
        let result = projector.project(&[GeoPoint::new(95.0, -1.9)]);
        assert!(matches!(result, Err(WalkError::InvalidCoordinate { .. })));
    }

    proptest! {
        #[test]
        fn test_projection_preserves_count_and_order(
            coords in prop::collection::vec((49.5f64..58.5, -6.0f64..1.5), 0..50)
        ) {
            let points: Vec<GeoPoint> = coords.iter().map(|&(lat, lon)| GeoPoint::new(lat, lon)).collect();
            let projector = CrsProjector::from_codes("EPSG:4326", "EPSG:27700").unwrap();
            let planar = projector.project(&points).unwrap();
            prop_assert_eq!(planar.len(), points.len());

            // Projecting each point alone gives the same answer at the same index
            for (point, projected) in points.iter().zip(&planar) {
                let single = projector.project(std::slice::from_ref(point)).unwrap();
                prop_assert_eq!(single[0], *projected);
            }
        }
    }
}
