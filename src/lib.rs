//! # Walk Disturbance
//!
//! Human and dog walk statistics and disturbance footprints from paired GPS tracks.
//!
//! This library provides:
//! - Reading raw GPS fixes for human–dog walking pairs from delimited tables
//! - Projection of geodetic fixes onto a planar metric grid
//! - Per-walk trajectory statistics and human–dog separation distances
//! - Buffered disturbance footprints (flight initiation distance) and their area
//! - Overlap rasters counting how many walks disturb each location
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel per-walk processing with rayon
//! - **`json`** - Read analysis configs from JSON
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{NaiveDate, NaiveTime};
//! use walk_disturbance::{run_analysis, AnalysisConfig, GeoPoint, Sample, Species};
//!
//! let date = NaiveDate::from_ymd_opt(2021, 4, 17).unwrap();
//! let mut samples = Vec::new();
//! for i in 0..10u32 {
//!     let time = NaiveTime::from_hms_opt(9, 0, i).unwrap();
//!     let lat = 50.70 + i as f64 * 0.0001;
//!     samples.push(Sample::new(1, Species::Human, date, time, GeoPoint::new(lat, -1.9000)));
//!     samples.push(Sample::new(1, Species::Dog, date, time, GeoPoint::new(lat, -1.8998)));
//! }
//!
//! let report = run_analysis(&samples, &AnalysisConfig::default()).unwrap();
//! assert_eq!(report.summaries.len(), 1);
//! println!("Disturbed area: {:.4} km²", report.disturbed_area_km2);
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use geo::{Coord, Distance, Euclidean, Point};
use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Result, WalkError};

pub mod geo_utils;

// Geodetic -> planar projection
pub mod projection;
pub use projection::{project_samples, Crs, CrsProjector, Projector};

// Input table reader and summary writer
pub mod input;
pub use input::{read_samples, read_samples_from_path, write_summaries, ColumnNames, ReaderConfig};

// Track builder and pair comparator
pub mod trajectory;
pub use trajectory::Trajectory;

pub mod compare;
pub use compare::{compare_trajectories, MatchPolicy, Separation};

// Walk aggregation
pub mod walks;
pub use walks::{
    group_by_walk, partition_walks, summarize_walk, summarize_walks, PairSummary, SkippedWalk,
    Walk, WalkReport, WalkSelection,
};
#[cfg(feature = "parallel")]
pub use walks::summarize_walks_parallel;

// Disturbance footprint and overlap raster
pub mod footprint;
pub use footprint::{
    area_km2, buffer_polyline, buffer_walks, build_footprint, dissolve, polylines_by_walk,
    Footprint, FootprintConfig, SubjectSelection, WalkBuffer, WalkPolylines,
};

pub mod raster;
pub use raster::{BufferIndex, OverlapRaster};

pub mod pipeline;
pub use pipeline::{run_analysis, AnalysisConfig, AnalysisReport};

// ============================================================================
// Core Types
// ============================================================================

/// The subject carrying a GPS tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Human,
    Dog,
}

impl Species {
    pub fn as_str(&self) -> &'static str {
        match self {
            Species::Human => "human",
            Species::Dog => "dog",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Species {
    type Err = WalkError;

    /// Case-insensitive, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "human" => Ok(Species::Human),
            "dog" => Ok(Species::Dog),
            _ => Err(WalkError::Parse {
                line: 0,
                field: "species",
                value: s.to_string(),
            }),
        }
    }
}

/// A geodetic coordinate (WGS84 latitude and longitude in degrees).
///
/// # Example
/// ```
/// use walk_disturbance::GeoPoint;
/// let point = GeoPoint::new(50.7151, -1.9872); // Poole Harbour
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new geodetic point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A point on a planar metric grid (easting `x`, northing `y`, in metres).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanarPoint {
    pub x: f64,
    pub y: f64,
}

impl PlanarPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in metres.
    #[inline]
    pub fn distance_to(&self, other: &PlanarPoint) -> f64 {
        Euclidean::distance(Point::from(*self), Point::from(*other))
    }
}

impl From<PlanarPoint> for Coord<f64> {
    fn from(p: PlanarPoint) -> Self {
        Coord { x: p.x, y: p.y }
    }
}

impl From<PlanarPoint> for Point<f64> {
    fn from(p: PlanarPoint) -> Self {
        Point::new(p.x, p.y)
    }
}

impl From<Coord<f64>> for PlanarPoint {
    fn from(c: Coord<f64>) -> Self {
        PlanarPoint::new(c.x, c.y)
    }
}

/// One GPS fix as read from the input table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub walk_id: u32,
    pub species: Species,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub position: GeoPoint,
}

impl Sample {
    pub fn new(
        walk_id: u32,
        species: Species,
        date: NaiveDate,
        time: NaiveTime,
        position: GeoPoint,
    ) -> Self {
        Self { walk_id, species, date, time, position }
    }

    /// Combined date and time of the fix.
    pub fn timestamp(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// A fix on the planar grid, with its combined timestamp.
///
/// Derived 1:1 from a [`Sample`] by [`project_samples`]; date and time are
/// recovered from `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectedSample {
    pub walk_id: u32,
    pub species: Species,
    pub timestamp: NaiveDateTime,
    pub point: PlanarPoint,
}

impl ProjectedSample {
    pub fn new(walk_id: u32, species: Species, timestamp: NaiveDateTime, point: PlanarPoint) -> Self {
        Self { walk_id, species, timestamp, point }
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    pub fn time(&self) -> NaiveTime {
        self.timestamp.time()
    }
}

/// Planar bounding box, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Smallest box holding both.
    pub fn union(&self, other: &Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Grow outward so every edge lies on a multiple of `step`.
    pub fn snapped(&self, step: f64) -> Bounds {
        Bounds {
            min_x: (self.min_x / step).floor() * step,
            max_x: (self.max_x / step).ceil() * step,
            min_y: (self.min_y / step).floor() * step,
            max_y: (self.max_y / step).ceil() * step,
        }
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }
}

impl From<geo::Rect<f64>> for Bounds {
    fn from(rect: geo::Rect<f64>) -> Self {
        Bounds {
            min_x: rect.min().x,
            max_x: rect.max().x,
            min_y: rect.min().y,
            max_y: rect.max().y,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
