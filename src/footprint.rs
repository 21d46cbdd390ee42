//! # Disturbance Footprints
//!
//! Every location within the flight initiation distance of a walk track is
//! considered disturbed. This module turns each walk into a buffered polygon
//! and, when asked, dissolves all walks into a single footprint whose area is
//! the total disturbed habitat.
//!
//! ## Algorithm
//! 1. Group projected fixes into chronological polylines per walk and subject
//! 2. Buffer each segment as a capsule (rectangle with round caps); a polyline
//!    buffer is the union of its capsules, a single fix buffers to a disc
//! 3. Union the subjects' buffers into one polygon per walk
//! 4. Optionally union all walks (overlap counted once) and measure the area
//!
//! Round caps are approximated by `arc_segments` straight segments per
//! quarter circle, so buffer areas are a fraction of a percent smaller than
//! the exact Minkowski sum.

use std::collections::BTreeMap;
use std::f64::consts::{FRAC_PI_2, PI};

use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::geo_utils::polyline_length;
use crate::{PlanarPoint, ProjectedSample, Result, Species, Trajectory, WalkError};

/// Which subjects' tracks make up a walk's footprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectSelection {
    /// Human and dog tracks, each buffered, unioned per walk
    #[default]
    Both,
    HumanOnly,
    DogOnly,
}

impl SubjectSelection {
    fn includes(&self, species: Species) -> bool {
        match self {
            SubjectSelection::Both => true,
            SubjectSelection::HumanOnly => species == Species::Human,
            SubjectSelection::DogOnly => species == Species::Dog,
        }
    }
}

/// Configuration for footprint construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FootprintConfig {
    /// Distance at which a ground-nesting bird takes flight (metres).
    /// Default: 8.5
    pub flight_initiation_distance: f64,

    /// Lead length added to the buffer radius when dogs are walked on leads
    /// (metres). Usually combined with `HumanOnly`. Default: None
    pub lead_length: Option<f64>,

    /// Tracks included in each walk's footprint. Default: Both
    pub subjects: SubjectSelection,

    /// Union all walks into a single footprint (true) or keep one polygon per
    /// walk (false). Default: true
    pub dissolve: bool,

    /// Straight segments per quarter circle of a buffer cap. Default: 8
    pub arc_segments: u32,
}

impl Default for FootprintConfig {
    fn default() -> Self {
        Self {
            flight_initiation_distance: 8.5,
            lead_length: None,
            subjects: SubjectSelection::Both,
            dissolve: true,
            arc_segments: 8,
        }
    }
}

impl FootprintConfig {
    /// Effective buffer radius: flight initiation distance plus any lead length.
    pub fn radius(&self) -> f64 {
        self.flight_initiation_distance + self.lead_length.unwrap_or(0.0)
    }

    fn validate(&self) -> Result<()> {
        let radius = self.radius();
        if !radius.is_finite() || radius <= 0.0 {
            return Err(WalkError::InvalidParameter {
                name: "buffer radius",
                reason: format!("must be a positive distance, got {radius}"),
            });
        }
        if self.lead_length.is_some_and(|l| l < 0.0) {
            return Err(WalkError::InvalidParameter {
                name: "lead_length",
                reason: "must not be negative".to_string(),
            });
        }
        if self.arc_segments == 0 {
            return Err(WalkError::InvalidParameter {
                name: "arc_segments",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// The buffered footprint of one walk.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkBuffer {
    pub walk_id: u32,
    pub polygon: MultiPolygon<f64>,
    /// At least one included track has zero length (a single fix, or fixes
    /// that never move); its buffer is a disc
    pub degenerate: bool,
}

impl WalkBuffer {
    /// Area in square metres.
    pub fn area(&self) -> f64 {
        self.polygon.unsigned_area()
    }
}

/// A disturbance footprint, dissolved or per walk.
#[derive(Debug, Clone, PartialEq)]
pub enum Footprint {
    /// Union of all walk buffers; overlapping area counted once
    Dissolved { polygon: MultiPolygon<f64>, area_m2: f64 },
    /// One buffer per walk, unreduced, for overlap counting
    PerWalk(Vec<WalkBuffer>),
}

impl Footprint {
    /// Disturbed area in square metres. Per-walk footprints sum their walks,
    /// counting overlap once per walk.
    pub fn area_m2(&self) -> f64 {
        match self {
            Footprint::Dissolved { area_m2, .. } => *area_m2,
            Footprint::PerWalk(buffers) => buffers.iter().map(WalkBuffer::area).sum(),
        }
    }

    pub fn area_km2(&self) -> f64 {
        area_km2(self.area_m2())
    }
}

/// Square metres to square kilometres.
#[inline]
pub fn area_km2(area_m2: f64) -> f64 {
    area_m2 / 1_000_000.0
}

// ============================================================================
// Polylines
// ============================================================================

/// Polylines of one walk: one `(subject, points)` pair per included subject.
pub type WalkPolylines = Vec<(Species, Vec<PlanarPoint>)>;

/// Chronological polylines per walk id and subject, restricted to `subjects`.
///
/// Walks are keyed in ascending id order; within a walk, human precedes dog.
/// A walk whose fixes for an included subject are not chronological maps to
/// [`WalkError::OutOfOrder`] instead of a polyline.
pub fn polylines_by_walk(
    samples: &[ProjectedSample],
    subjects: SubjectSelection,
) -> BTreeMap<u32, Result<WalkPolylines>> {
    let mut grouped: BTreeMap<(u32, Species), Vec<ProjectedSample>> = BTreeMap::new();
    for s in samples.iter().filter(|s| subjects.includes(s.species)) {
        grouped.entry((s.walk_id, s.species)).or_default().push(*s);
    }

    let mut walks: BTreeMap<u32, Result<WalkPolylines>> = BTreeMap::new();
    for ((walk_id, species), track) in grouped {
        let polyline = Trajectory::new(walk_id, species, track).map(|t| (species, t.points()));
        let slot = walks.entry(walk_id).or_insert_with(|| Ok(Vec::new()));
        match polyline {
            Ok(polyline) => {
                if let Ok(tracks) = slot {
                    tracks.push(polyline);
                }
            }
            Err(e) => {
                if slot.is_ok() {
                    *slot = Err(e);
                }
            }
        }
    }
    walks
}

// ============================================================================
// Buffering
// ============================================================================

fn push_arc(ring: &mut Vec<Coord<f64>>, center: PlanarPoint, radius: f64, start: f64, sweep: f64, steps: u32) {
    for i in 0..=steps {
        let angle = start + sweep * i as f64 / steps as f64;
        ring.push(Coord {
            x: center.x + radius * angle.cos(),
            y: center.y + radius * angle.sin(),
        });
    }
}

fn disc(center: PlanarPoint, radius: f64, arc_segments: u32) -> Polygon<f64> {
    let steps = arc_segments * 4;
    let mut ring = Vec::with_capacity(steps as usize + 1);
    // Last vertex of a full turn would repeat the first; Polygon::new closes the ring
    push_arc(&mut ring, center, radius, 0.0, 2.0 * PI * (steps - 1) as f64 / steps as f64, steps - 1);
    Polygon::new(LineString::new(ring), vec![])
}

/// Convex buffer of a single segment: half-disc caps joined by straight sides.
fn capsule(a: PlanarPoint, b: PlanarPoint, radius: f64, arc_segments: u32) -> Polygon<f64> {
    let heading = (b.y - a.y).atan2(b.x - a.x);
    let steps = arc_segments * 2;
    let mut ring = Vec::with_capacity(2 * (steps as usize + 1) + 1);
    // Counter-clockwise: cap around b, then cap around a
    push_arc(&mut ring, b, radius, heading - FRAC_PI_2, PI, steps);
    push_arc(&mut ring, a, radius, heading + FRAC_PI_2, PI, steps);
    Polygon::new(LineString::new(ring), vec![])
}

/// Union a set of multipolygons by pairwise reduction.
fn union_all(mut parts: Vec<MultiPolygon<f64>>) -> MultiPolygon<f64> {
    while parts.len() > 1 {
        let mut merged = Vec::with_capacity(parts.len() / 2 + 1);
        let mut iter = parts.into_iter();
        while let Some(first) = iter.next() {
            match iter.next() {
                Some(second) => merged.push(first.union(&second)),
                None => merged.push(first),
            }
        }
        parts = merged;
    }
    parts.pop().unwrap_or_else(|| MultiPolygon::new(vec![]))
}

/// Every point within `radius` of the polyline.
///
/// Zero-length segments are skipped; a polyline with no length (one point, or
/// all points equal) buffers to a disc around its first point. An empty
/// polyline gives an empty multipolygon.
///
/// # Example
/// ```
/// use geo::Area;
/// use walk_disturbance::{buffer_polyline, PlanarPoint};
///
/// let line = vec![PlanarPoint::new(0.0, 0.0), PlanarPoint::new(100.0, 0.0)];
/// let buffer = buffer_polyline(&line, 10.0, 8);
///
/// // 100m x 20m strip plus two half discs
/// let exact = 100.0 * 20.0 + std::f64::consts::PI * 100.0;
/// assert!((buffer.unsigned_area() - exact).abs() / exact < 0.01);
/// ```
pub fn buffer_polyline(points: &[PlanarPoint], radius: f64, arc_segments: u32) -> MultiPolygon<f64> {
    let Some(&first) = points.first() else {
        return MultiPolygon::new(vec![]);
    };
    let arc_segments = arc_segments.max(1);

    let capsules: Vec<MultiPolygon<f64>> = points
        .windows(2)
        .filter(|w| w[0] != w[1])
        .map(|w| MultiPolygon::new(vec![capsule(w[0], w[1], radius, arc_segments)]))
        .collect();

    if capsules.is_empty() {
        return MultiPolygon::new(vec![disc(first, radius, arc_segments)]);
    }
    union_all(capsules)
}

fn buffer_walk(walk_id: u32, tracks: &[(Species, Vec<PlanarPoint>)], config: &FootprintConfig) -> WalkBuffer {
    let radius = config.radius();
    let mut degenerate = false;
    let mut parts = Vec::with_capacity(tracks.len());

    for (species, points) in tracks {
        if polyline_length(points) == 0.0 {
            warn!("Walk {walk_id} ({species}) track has zero length; buffering as a disc");
            degenerate = true;
        }
        parts.push(buffer_polyline(points, radius, config.arc_segments));
    }

    let polygon = union_all(parts);
    debug!("Walk {walk_id}: buffer {:.0} m² at {radius} m", polygon.unsigned_area());
    WalkBuffer { walk_id, polygon, degenerate }
}

/// Buffer every walk separately, in ascending walk id order.
///
/// Walks with non-chronological fixes are left out with a warning.
pub fn buffer_walks(samples: &[ProjectedSample], config: &FootprintConfig) -> Result<Vec<WalkBuffer>> {
    config.validate()?;

    let mut walks: Vec<(u32, WalkPolylines)> = Vec::new();
    for (walk_id, tracks) in polylines_by_walk(samples, config.subjects) {
        match tracks {
            Ok(tracks) => walks.push((walk_id, tracks)),
            Err(e) => warn!("Leaving walk {walk_id} out of the footprint: {e}"),
        }
    }

    #[cfg(feature = "parallel")]
    let buffers: Vec<WalkBuffer> = {
        use rayon::prelude::*;
        walks
            .par_iter()
            .map(|(walk_id, tracks)| buffer_walk(*walk_id, tracks, config))
            .collect()
    };

    #[cfg(not(feature = "parallel"))]
    let buffers: Vec<WalkBuffer> = walks
        .iter()
        .map(|(walk_id, tracks)| buffer_walk(*walk_id, tracks, config))
        .collect();

    info!("Buffered {} walks at {} m", buffers.len(), config.radius());
    Ok(buffers)
}

/// Union of all walk buffers; overlapping area counted once.
pub fn dissolve(buffers: &[WalkBuffer]) -> MultiPolygon<f64> {
    union_all(buffers.iter().map(|b| b.polygon.clone()).collect())
}

/// Build the footprint described by `config`.
///
/// # Example
/// ```
/// use chrono::{Duration, NaiveDate};
/// use walk_disturbance::{build_footprint, Footprint, FootprintConfig, PlanarPoint, ProjectedSample, Species};
///
/// let t0 = NaiveDate::from_ymd_opt(2021, 4, 17).unwrap().and_hms_opt(9, 0, 0).unwrap();
/// let samples: Vec<ProjectedSample> = (0..=10)
///     .flat_map(|i| {
///         let t = t0 + Duration::seconds(i * 10);
///         [
///             ProjectedSample::new(1, Species::Human, t, PlanarPoint::new(i as f64 * 10.0, 0.0)),
///             ProjectedSample::new(1, Species::Dog, t, PlanarPoint::new(i as f64 * 10.0, 2.0)),
///         ]
///     })
///     .collect();
///
/// let footprint = build_footprint(&samples, &FootprintConfig::default()).unwrap();
/// assert!(matches!(footprint, Footprint::Dissolved { .. }));
/// assert!(footprint.area_km2() > 0.0020 && footprint.area_km2() < 0.0023);
/// ```
pub fn build_footprint(samples: &[ProjectedSample], config: &FootprintConfig) -> Result<Footprint> {
    let buffers = buffer_walks(samples, config)?;
    if !config.dissolve {
        return Ok(Footprint::PerWalk(buffers));
    }

    let polygon = dissolve(&buffers);
    let area_m2 = polygon.unsigned_area();
    info!(
        "Dissolved footprint of {} walks: {:.4} km²",
        buffers.len(),
        area_km2(area_m2)
    );
    Ok(Footprint::Dissolved { polygon, area_m2 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};
    use proptest::prelude::*;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 4, 17).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn line_samples(walk_id: u32, species: Species, from: (f64, f64), to: (f64, f64), fixes: i64) -> Vec<ProjectedSample> {
        (0..fixes)
            .map(|i| {
                let f = i as f64 / (fixes - 1).max(1) as f64;
                ProjectedSample::new(
                    walk_id,
                    species,
                    t0() + Duration::seconds(i),
                    PlanarPoint::new(from.0 + f * (to.0 - from.0), from.1 + f * (to.1 - from.1)),
                )
            })
            .collect()
    }

    fn relative_eq(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() <= tolerance * b.abs().max(1.0)
    }

    #[test]
    fn test_disc_area() {
        let buffer = buffer_polyline(&[PlanarPoint::new(5.0, 5.0)], 10.0, 8);
        assert!(relative_eq(buffer.unsigned_area(), PI * 100.0, 0.01));
    }

    #[test]
    fn test_empty_polyline() {
        assert!(buffer_polyline(&[], 10.0, 8).0.is_empty());
    }

    #[test]
    fn test_out_and_back_counts_once() {
        let out = vec![PlanarPoint::new(0.0, 0.0), PlanarPoint::new(100.0, 0.0)];
        let out_and_back = vec![
            PlanarPoint::new(0.0, 0.0),
            PlanarPoint::new(100.0, 0.0),
            PlanarPoint::new(0.0, 0.0),
        ];
        let a = buffer_polyline(&out, 8.5, 8).unsigned_area();
        let b = buffer_polyline(&out_and_back, 8.5, 8).unsigned_area();
        assert!(relative_eq(a, b, 1e-6), "{a} vs {b}");
    }

    #[test]
    fn test_right_angle_turn() {
        let line = vec![
            PlanarPoint::new(0.0, 0.0),
            PlanarPoint::new(100.0, 0.0),
            PlanarPoint::new(100.0, 100.0),
        ];
        let area = buffer_polyline(&line, 5.0, 16).unsigned_area();
        // 2rL + πr², plus the outer quarter disc, less the inner r x r square
        let exact = 2.0 * 100.0 * 10.0 + 1.25 * PI * 25.0 - 25.0;
        assert!(relative_eq(area, exact, 0.01), "{area} vs {exact}");
    }

    #[test]
    fn test_lead_length_extends_radius() {
        let config = FootprintConfig { lead_length: Some(2.0), ..FootprintConfig::default() };
        assert_eq!(config.radius(), 10.5);
    }

    #[test]
    fn test_invalid_radius() {
        let config = FootprintConfig { flight_initiation_distance: 0.0, ..FootprintConfig::default() };
        let err = buffer_walks(&[], &config).unwrap_err();
        assert!(matches!(err, WalkError::InvalidParameter { .. }));
    }

    #[test]
    fn test_subject_selection() {
        let mut samples = line_samples(1, Species::Human, (0.0, 0.0), (100.0, 0.0), 11);
        samples.extend(line_samples(1, Species::Dog, (0.0, 50.0), (100.0, 50.0), 11));

        let both = buffer_walks(&samples, &FootprintConfig::default()).unwrap();
        let human_only = buffer_walks(
            &samples,
            &FootprintConfig { subjects: SubjectSelection::HumanOnly, ..FootprintConfig::default() },
        )
        .unwrap();

        assert_eq!(both.len(), 1);
        assert!(relative_eq(both[0].area(), 2.0 * human_only[0].area(), 1e-6));
        assert_eq!(both[0].polygon.0.len(), 2);
    }

    #[test]
    fn test_single_fix_walk_is_flagged() {
        let mut samples = line_samples(1, Species::Human, (0.0, 0.0), (100.0, 0.0), 11);
        samples.extend(line_samples(1, Species::Dog, (0.0, 0.0), (0.0, 0.0), 1));
        samples.extend(line_samples(2, Species::Human, (0.0, 0.0), (100.0, 0.0), 11));

        let buffers = buffer_walks(&samples, &FootprintConfig::default()).unwrap();
        assert_eq!(buffers.len(), 2);
        assert!(buffers[0].degenerate);
        assert!(!buffers[1].degenerate);
    }

    #[test]
    fn test_polylines_keep_chronological_order() {
        let mut samples = line_samples(3, Species::Dog, (0.0, 0.0), (20.0, 0.0), 3);
        samples.extend(line_samples(3, Species::Human, (0.0, 5.0), (10.0, 5.0), 2));

        let walks = polylines_by_walk(&samples, SubjectSelection::Both);
        let tracks = walks[&3].as_ref().unwrap();
        assert_eq!(tracks[0].0, Species::Human);
        assert_eq!(tracks[1].1, vec![PlanarPoint::new(0.0, 0.0), PlanarPoint::new(10.0, 0.0), PlanarPoint::new(20.0, 0.0)]);
    }

    #[test]
    fn test_non_chronological_walk_is_left_out() {
        let mut samples = line_samples(1, Species::Human, (0.0, 0.0), (100.0, 0.0), 11);
        // Walk 2's fixes arrive shuffled in time
        let mut shuffled = line_samples(2, Species::Human, (0.0, 30.0), (100.0, 30.0), 11);
        shuffled.swap(2, 7);
        samples.extend(shuffled);

        let walks = polylines_by_walk(&samples, SubjectSelection::Both);
        assert!(matches!(walks[&2], Err(WalkError::OutOfOrder { walk_id: 2, .. })));

        let buffers = buffer_walks(&samples, &FootprintConfig::default()).unwrap();
        let ids: Vec<u32> = buffers.iter().map(|b| b.walk_id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn test_dissolve_counts_overlap_once() {
        let mut samples = line_samples(1, Species::Human, (0.0, 0.0), (100.0, 0.0), 11);
        samples.extend(line_samples(2, Species::Human, (0.0, 0.0), (100.0, 0.0), 21));
        let config = FootprintConfig { subjects: SubjectSelection::HumanOnly, ..FootprintConfig::default() };

        let per_walk = build_footprint(&samples, &FootprintConfig { dissolve: false, ..config.clone() }).unwrap();
        let dissolved = build_footprint(&samples, &config).unwrap();

        match &per_walk {
            Footprint::PerWalk(buffers) => assert_eq!(buffers.len(), 2),
            other => panic!("expected per-walk footprint, got {other:?}"),
        }
        assert!(relative_eq(per_walk.area_m2(), 2.0 * dissolved.area_m2(), 1e-6));
    }

    #[test]
    fn test_area_km2() {
        assert_eq!(area_km2(2_500_000.0), 2.5);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_union_area_is_subadditive(
            lines in prop::collection::vec(
                prop::collection::vec((0.0f64..300.0, 0.0f64..300.0), 1..6),
                1..5,
            ),
            radius in 1.0f64..20.0,
        ) {
            let buffers: Vec<WalkBuffer> = lines
                .iter()
                .enumerate()
                .map(|(i, coords)| {
                    let points: Vec<PlanarPoint> = coords.iter().map(|&(x, y)| PlanarPoint::new(x, y)).collect();
                    WalkBuffer { walk_id: i as u32, polygon: buffer_polyline(&points, radius, 8), degenerate: false }
                })
                .collect();

            let union_area = dissolve(&buffers).unsigned_area();
            let areas: Vec<f64> = buffers.iter().map(WalkBuffer::area).collect();
            let largest = areas.iter().copied().fold(0.0, f64::max);
            let sum: f64 = areas.iter().sum();

            prop_assert!(union_area >= largest * (1.0 - 1e-6));
            prop_assert!(union_area <= sum * (1.0 + 1e-6));
        }
    }
}
