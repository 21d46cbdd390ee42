//! # Geographic Utilities
//!
//! Small geometric helpers shared by the trajectory and footprint modules and
//! by the synthetic walks in tests and demos.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`polyline_length`] | Path length of a projected track in metres |
//! | [`meters_to_degrees`] | Convert metres to approximate degrees at a latitude |
//! | [`offset_point`] | Move a geodetic point by a planar offset in metres |
//!
//! ## Example
//!
//! ```rust
//! use walk_disturbance::{PlanarPoint, geo_utils};
//!
//! let track = vec![
//!     PlanarPoint::new(0.0, 0.0),
//!     PlanarPoint::new(30.0, 40.0),
//!     PlanarPoint::new(30.0, 100.0),
//! ];
//!
//! assert_eq!(geo_utils::polyline_length(&track), 110.0);
//! ```
//!
//! ## Coordinate System
//!
//! Planar functions expect projected coordinates in metres (see
//! [`crate::projection`]). Geodetic functions expect WGS84 degrees.

use crate::{GeoPoint, PlanarPoint};

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the path length of a projected track in metres.
///
/// Sums the distance between consecutive points. Empty or single-point
/// tracks return 0.0.
pub fn polyline_length(points: &[PlanarPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| w[0].distance_to(&w[1]))
        .sum()
}

/// Convert metres to approximate degrees of longitude at a given latitude.
///
/// - At the equator, 1 degree ≈ 111,320 metres
/// - This decreases with cos(latitude)
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let lat_rad = latitude.to_radians();
    let meters_per_degree = 111_320.0 * lat_rad.cos().max(0.1);
    meters / meters_per_degree
}

/// Move a geodetic point `dx` metres east and `dy` metres north.
///
/// Uses a local flat-earth approximation, good to well under a percent over
/// the few kilometres a walk covers.
pub fn offset_point(origin: &GeoPoint, dx: f64, dy: f64) -> GeoPoint {
    GeoPoint::new(
        origin.latitude + dy / 111_320.0,
        origin.longitude + meters_to_degrees(dx, origin.latitude),
    )
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Distance, Haversine, Point};

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_polyline_length_empty() {
        let empty: Vec<PlanarPoint> = vec![];
        assert_eq!(polyline_length(&empty), 0.0);
    }

    #[test]
    fn test_polyline_length_single_point() {
        let single = vec![PlanarPoint::new(5.0, 5.0)];
        assert_eq!(polyline_length(&single), 0.0);
    }

    #[test]
    fn test_polyline_length_out_and_back() {
        let track = vec![
            PlanarPoint::new(0.0, 0.0),
            PlanarPoint::new(100.0, 0.0),
            PlanarPoint::new(0.0, 0.0),
        ];
        assert_eq!(polyline_length(&track), 200.0);
    }

    #[test]
    fn test_offset_point_distance() {
        let origin = GeoPoint::new(50.7, -1.9);
        let moved = offset_point(&origin, 300.0, 400.0);
        let dist = Haversine::distance(
            Point::new(origin.longitude, origin.latitude),
            Point::new(moved.longitude, moved.latitude),
        );
        assert!(approx_eq(dist, 500.0, 5.0), "got {dist}");
    }

    #[test]
    fn test_meters_to_degrees() {
        let deg = meters_to_degrees(111_320.0, 0.0);
        assert!(approx_eq(deg, 1.0, 0.01));

        let deg_50 = meters_to_degrees(111_320.0, 50.0);
        assert!(deg_50 > 1.0);
    }
}
