//! Human–dog separation along a walk.
//!
//! Two trajectories recorded on the same walk are aligned by timestamp and
//! the planar distance between the subjects is taken at every aligned
//! timepoint. How timestamps are aligned is an explicit [`MatchPolicy`]; every
//! policy is deterministic. Within one trajectory, only the first fix at a
//! given timestamp takes part in alignment.

use chrono::NaiveDateTime;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::{PlanarPoint, Result, Trajectory, WalkError};

/// How timepoints of the second trajectory are matched to the first.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "policy")]
pub enum MatchPolicy {
    /// Only timestamps present in both trajectories. Unmatched timepoints are
    /// dropped. Symmetric in subject order.
    #[default]
    Exact,
    /// The closest fix in time, if within `tolerance_secs`; ties take the
    /// earlier fix.
    Nearest { tolerance_secs: f64 },
    /// Linear interpolation of the second subject's position, for timestamps
    /// inside its recorded span.
    Interpolate,
}

/// Distances between two subjects at their aligned timepoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Separation {
    pub walk_id: u32,
    pub timestamps: Vec<NaiveDateTime>,
    pub distances: Vec<f64>,
}

impl Separation {
    pub fn len(&self) -> usize {
        self.distances.len()
    }

    /// Always false for a separation returned by [`compare_trajectories`].
    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }

    pub fn median(&self) -> f64 {
        self.quantile(0.5)
    }

    pub fn mean(&self) -> f64 {
        if self.distances.is_empty() {
            return f64::NAN;
        }
        self.distances.iter().sum::<f64>() / self.distances.len() as f64
    }

    pub fn max(&self) -> f64 {
        self.distances.iter().copied().fold(f64::NAN, f64::max)
    }

    pub fn min(&self) -> f64 {
        self.distances.iter().copied().fold(f64::NAN, f64::min)
    }

    /// Sample quantile with linear interpolation between order statistics
    /// (`q` clamped to 0..=1).
    pub fn quantile(&self, q: f64) -> f64 {
        if self.distances.is_empty() {
            return f64::NAN;
        }
        let mut sorted = self.distances.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let h = (sorted.len() - 1) as f64 * q.clamp(0.0, 1.0);
        let lo = h.floor() as usize;
        let hi = h.ceil() as usize;
        sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
    }
}

/// First fix at each timestamp, in chronological order.
fn first_per_timestamp(track: &Trajectory) -> Vec<(NaiveDateTime, PlanarPoint)> {
    let mut out: Vec<(NaiveDateTime, PlanarPoint)> = Vec::with_capacity(track.len());
    for s in track.samples() {
        if out.last().map_or(true, |(t, _)| *t != s.timestamp) {
            out.push((s.timestamp, s.point));
        }
    }
    out
}

fn secs_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// Position of `track` to pair with time `t`, according to `policy`.
fn locate(track: &[(NaiveDateTime, PlanarPoint)], t: NaiveDateTime, policy: &MatchPolicy) -> Option<PlanarPoint> {
    // First fix at or after t
    let idx = track.partition_point(|(ts, _)| *ts < t);

    match *policy {
        MatchPolicy::Exact => track.get(idx).filter(|(ts, _)| *ts == t).map(|(_, p)| *p),
        MatchPolicy::Nearest { tolerance_secs } => {
            let before = idx.checked_sub(1).and_then(|i| track.get(i));
            let after = track.get(idx);
            let best = match (before, after) {
                (Some(b), Some(a)) => {
                    if secs_between(b.0, t) <= secs_between(t, a.0) {
                        b
                    } else {
                        a
                    }
                }
                (Some(b), None) => b,
                (None, Some(a)) => a,
                (None, None) => return None,
            };
            let gap = secs_between(best.0, t).abs();
            (gap <= tolerance_secs).then_some(best.1)
        }
        MatchPolicy::Interpolate => {
            let after = track.get(idx)?;
            if after.0 == t {
                return Some(after.1);
            }
            let before = track.get(idx.checked_sub(1)?)?;
            let span = secs_between(before.0, after.0);
            let ratio = secs_between(before.0, t) / span;
            Some(PlanarPoint::new(
                before.1.x + ratio * (after.1.x - before.1.x),
                before.1.y + ratio * (after.1.y - before.1.y),
            ))
        }
    }
}

/// Align two trajectories of the same walk and measure the distance between
/// the subjects at every aligned timepoint.
///
/// Timepoints are taken from `a`, in order. Fails with
/// [`WalkError::NoAlignedTimepoints`] when nothing aligns, rather than
/// returning an empty or NaN result.
///
/// # Example
/// ```
/// use chrono::{Duration, NaiveDate};
/// use walk_disturbance::{compare_trajectories, MatchPolicy, PlanarPoint, ProjectedSample, Species, Trajectory};
///
/// let t0 = NaiveDate::from_ymd_opt(2021, 4, 17).unwrap().and_hms_opt(9, 0, 0).unwrap();
/// let track = |species, dy: f64| {
///     let samples = (0..5)
///         .map(|i| ProjectedSample::new(1, species, t0 + Duration::seconds(i), PlanarPoint::new(i as f64, dy)))
///         .collect();
///     Trajectory::new(1, species, samples).unwrap()
/// };
///
/// let human = track(Species::Human, 0.0);
/// let dog = track(Species::Dog, 6.0);
///
/// let separation = compare_trajectories(&human, &dog, &MatchPolicy::Exact).unwrap();
/// assert_eq!(separation.len(), 5);
/// assert_eq!(separation.median(), 6.0);
/// ```
pub fn compare_trajectories(a: &Trajectory, b: &Trajectory, policy: &MatchPolicy) -> Result<Separation> {
    let walk_id = a.walk_id();
    let track_a = first_per_timestamp(a);
    let track_b = first_per_timestamp(b);

    let mut timestamps = Vec::new();
    let mut distances = Vec::new();
    for (t, pa) in &track_a {
        if let Some(pb) = locate(&track_b, *t, policy) {
            timestamps.push(*t);
            distances.push(pa.distance_to(&pb));
        }
    }

    debug!(
        "Walk {}: {} of {} timepoints aligned ({:?})",
        walk_id,
        distances.len(),
        track_a.len(),
        policy
    );

    if distances.is_empty() {
        return Err(WalkError::NoAlignedTimepoints { walk_id });
    }

    Ok(Separation { walk_id, timestamps, distances })
}
