//! Trajectory construction for a single subject on a single walk.
//!
//! A [`Trajectory`] keeps the chronological projected fixes of one (walk,
//! species) pair along with the per-step quantities derived from them:
//!
//! - distance from the first fix, for every fix (0 at index 0)
//! - duration of every step between consecutive fixes
//! - path length, the sum of step lengths
//!
//! Maximum distance from start (furthest excursion) and path length are
//! different quantities; a walk that goes out 200 m and comes back has a
//! maximum excursion of 200 m and a path length of 400 m.

use chrono::{Duration, NaiveDateTime};
use log::warn;

use crate::geo_utils::polyline_length;
use crate::{PlanarPoint, ProjectedSample, Result, Species, WalkError};

/// The chronological track of one subject on one walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    walk_id: u32,
    species: Species,
    samples: Vec<ProjectedSample>,
    distance_from_start: Vec<f64>,
    step_durations: Vec<Duration>,
    total_distance: f64,
}

impl Trajectory {
    /// Build a trajectory from chronological samples.
    ///
    /// Fails with [`WalkError::EmptyTrack`] for no samples and
    /// [`WalkError::OutOfOrder`] if a timestamp precedes its predecessor.
    /// A single sample is accepted but [`is_degenerate`](Self::is_degenerate).
    ///
    /// # Example
    /// ```
    /// use chrono::NaiveDate;
    /// use walk_disturbance::{PlanarPoint, ProjectedSample, Species, Trajectory};
    ///
    /// let t0 = NaiveDate::from_ymd_opt(2021, 4, 17).unwrap().and_hms_opt(9, 0, 0).unwrap();
    /// let fix = |secs: i64, x: f64| {
    ///     ProjectedSample::new(1, Species::Human, t0 + chrono::Duration::seconds(secs), PlanarPoint::new(x, 0.0))
    /// };
    ///
    /// let track = Trajectory::new(1, Species::Human, vec![fix(0, 0.0), fix(60, 200.0), fix(120, 0.0)]).unwrap();
    /// assert_eq!(track.max_distance_from_start(), 200.0);
    /// assert_eq!(track.total_distance(), 400.0);
    /// assert_eq!(track.duration_secs(), 120.0);
    /// ```
    pub fn new(walk_id: u32, species: Species, samples: Vec<ProjectedSample>) -> Result<Self> {
        let first = match samples.first() {
            Some(first) => first.point,
            None => return Err(WalkError::EmptyTrack { walk_id, species }),
        };

        let mut step_durations = Vec::with_capacity(samples.len().saturating_sub(1));
        for (i, w) in samples.windows(2).enumerate() {
            let step = w[1].timestamp - w[0].timestamp;
            if step < Duration::zero() {
                return Err(WalkError::OutOfOrder { walk_id, species, index: i + 1 });
            }
            step_durations.push(step);
        }

        let distance_from_start: Vec<f64> = samples
            .iter()
            .map(|s| s.point.distance_to(&first))
            .collect();

        let points: Vec<PlanarPoint> = samples.iter().map(|s| s.point).collect();
        let total_distance = polyline_length(&points);

        if samples.len() < 2 {
            warn!("Walk {walk_id} ({species}) has a single sample; its statistics are degenerate");
        } else if total_distance == 0.0 {
            warn!("Walk {walk_id} ({species}) never moves; its distance statistics are degenerate");
        }

        Ok(Self {
            walk_id,
            species,
            samples,
            distance_from_start,
            step_durations,
            total_distance,
        })
    }

    pub fn walk_id(&self) -> u32 {
        self.walk_id
    }

    pub fn species(&self) -> Species {
        self.species
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false: construction rejects empty input.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Zero path length (a single sample, or samples that never move):
    /// distance statistics carry no information.
    pub fn is_degenerate(&self) -> bool {
        self.total_distance == 0.0
    }

    /// Fewer than two samples: the duration carries no information either.
    pub fn is_single_fix(&self) -> bool {
        self.samples.len() < 2
    }

    pub fn samples(&self) -> &[ProjectedSample] {
        &self.samples
    }

    pub fn points(&self) -> Vec<PlanarPoint> {
        self.samples.iter().map(|s| s.point).collect()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = NaiveDateTime> + '_ {
        self.samples.iter().map(|s| s.timestamp)
    }

    pub fn start_time(&self) -> NaiveDateTime {
        self.samples[0].timestamp
    }

    pub fn end_time(&self) -> NaiveDateTime {
        self.samples[self.samples.len() - 1].timestamp
    }

    /// Distance of every fix from the first fix, in metres.
    pub fn distance_from_start(&self) -> &[f64] {
        &self.distance_from_start
    }

    /// Duration of each step; one shorter than the number of samples.
    pub fn step_durations(&self) -> &[Duration] {
        &self.step_durations
    }

    /// Path length in metres.
    pub fn total_distance(&self) -> f64 {
        self.total_distance
    }

    /// Furthest excursion from the first fix, in metres.
    pub fn max_distance_from_start(&self) -> f64 {
        self.distance_from_start.iter().copied().fold(0.0, f64::max)
    }

    pub fn duration(&self) -> Duration {
        self.step_durations.iter().fold(Duration::zero(), |acc, d| acc + *d)
    }

    pub fn duration_secs(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 4, 17).unwrap().and_hms_opt(9, 0, 0).unwrap()
    }

    fn fix(secs: i64, x: f64, y: f64) -> ProjectedSample {
        ProjectedSample::new(1, Species::Dog, t0() + Duration::seconds(secs), PlanarPoint::new(x, y))
    }

    #[test]
    fn test_empty_track_is_error() {
        let err = Trajectory::new(5, Species::Human, vec![]).unwrap_err();
        assert!(matches!(err, WalkError::EmptyTrack { walk_id: 5, species: Species::Human }));
    }

    #[test]
    fn test_single_sample_is_degenerate() {
        let track = Trajectory::new(1, Species::Dog, vec![fix(0, 10.0, 10.0)]).unwrap();
        assert!(track.is_degenerate());
        assert!(track.is_single_fix());
        assert_eq!(track.distance_from_start(), &[0.0]);
        assert_eq!(track.total_distance(), 0.0);
        assert_eq!(track.duration(), Duration::zero());
        assert!(track.step_durations().is_empty());
    }

    #[test]
    fn test_stationary_track_is_degenerate() {
        let samples = (0..5).map(|i| fix(i * 10, 0.0, 0.0)).collect();
        let track = Trajectory::new(1, Species::Human, samples).unwrap();
        assert!(track.is_degenerate());
        assert!(!track.is_single_fix());
        assert_eq!(track.duration_secs(), 40.0);
    }

    #[test]
    fn test_out_of_order_is_error() {
        let samples = vec![fix(0, 0.0, 0.0), fix(10, 1.0, 0.0), fix(5, 2.0, 0.0)];
        let err = Trajectory::new(1, Species::Dog, samples).unwrap_err();
        assert!(matches!(err, WalkError::OutOfOrder { index: 2, .. }));
    }

    #[test]
    fn test_equal_timestamps_are_accepted() {
        let samples = vec![fix(0, 0.0, 0.0), fix(0, 1.0, 0.0), fix(1, 2.0, 0.0)];
        let track = Trajectory::new(1, Species::Dog, samples).unwrap();
        assert_eq!(track.duration_secs(), 1.0);
    }

    #[test]
    fn test_step_quantities() {
        let samples = vec![fix(0, 0.0, 0.0), fix(5, 3.0, 4.0), fix(15, 3.0, 10.0)];
        let track = Trajectory::new(1, Species::Dog, samples).unwrap();
        assert_eq!(track.distance_from_start()[1], 5.0);
        assert!((track.distance_from_start()[2] - (9.0f64 + 100.0).sqrt()).abs() < 1e-12);
        assert_eq!(track.step_durations(), &[Duration::seconds(5), Duration::seconds(10)]);
        assert_eq!(track.total_distance(), 11.0);
        assert_eq!(track.duration_secs(), 15.0);
        assert_eq!(track.start_time(), t0());
        assert_eq!(track.end_time(), t0() + Duration::seconds(15));
    }

    proptest! {
        #[test]
        fn test_path_length_bounds_excursion(
            coords in prop::collection::vec((-1000.0f64..1000.0, -1000.0f64..1000.0), 1..60)
        ) {
            let samples: Vec<ProjectedSample> = coords
                .iter()
                .enumerate()
                .map(|(i, &(x, y))| fix(i as i64, x, y))
                .collect();
            let track = Trajectory::new(1, Species::Dog, samples).unwrap();

            prop_assert_eq!(track.distance_from_start()[0], 0.0);
            prop_assert!(track.total_distance() + 1e-9 >= track.max_distance_from_start());
            prop_assert_eq!(track.step_durations().len(), track.len() - 1);
        }
    }
}
