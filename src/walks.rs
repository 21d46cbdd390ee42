//! Per-walk statistics for human–dog pairs.
//!
//! [`summarize_walk`] handles one walk and is the entry point for inspecting
//! pairs one at a time. [`summarize_walks`] runs the same logic over many
//! walks, appending one [`PairSummary`] per walk in processing order and
//! recording any walk that had to be skipped.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    compare_trajectories, MatchPolicy, ProjectedSample, Result, Species, Trajectory, WalkError,
};

/// Which walks to process.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkSelection {
    /// Every walk id in the input, ascending.
    #[default]
    All,
    /// These walk ids, in this order.
    Ids(Vec<u32>),
}

impl WalkSelection {
    pub fn includes(&self, walk_id: u32) -> bool {
        match self {
            WalkSelection::All => true,
            WalkSelection::Ids(ids) => ids.contains(&walk_id),
        }
    }
}

/// The human and dog fixes of one walk.
#[derive(Debug, Clone, PartialEq)]
pub struct Walk {
    pub walk_id: u32,
    pub human: Vec<ProjectedSample>,
    pub dog: Vec<ProjectedSample>,
}

impl Walk {
    /// Split the samples of one walk by species, keeping their order.
    ///
    /// Samples with another walk id are ignored. Fails with
    /// [`WalkError::MissingSubject`] if either subject has no samples.
    pub fn from_samples<'a>(
        walk_id: u32,
        samples: impl IntoIterator<Item = &'a ProjectedSample>,
    ) -> Result<Self> {
        let (human, dog): (Vec<ProjectedSample>, Vec<ProjectedSample>) = samples
            .into_iter()
            .filter(|s| s.walk_id == walk_id)
            .partition(|s| s.species == Species::Human);

        if human.is_empty() {
            return Err(WalkError::MissingSubject { walk_id, species: Species::Human });
        }
        if dog.is_empty() {
            return Err(WalkError::MissingSubject { walk_id, species: Species::Dog });
        }

        Ok(Self { walk_id, human, dog })
    }

    /// Date and time of the walk's first human fix.
    pub fn start(&self) -> (NaiveDate, NaiveTime) {
        let first = &self.human[0];
        (first.date(), first.time())
    }
}

/// One row of the result table.
///
/// Distance statistics are `None` when the subject's track has zero length (a
/// single fix, or fixes that never move), and the duration is `None` for a
/// single fix, so a degenerate track is never mistaken for a real zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairSummary {
    pub walk_id: u32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// Furthest excursion from the start, metres
    pub human_max_distance: Option<f64>,
    pub dog_max_distance: Option<f64>,
    /// Path length, metres
    pub human_total_distance: Option<f64>,
    pub dog_total_distance: Option<f64>,
    pub human_duration_secs: Option<f64>,
    pub dog_duration_secs: Option<f64>,
    /// Median human–dog distance over aligned timepoints, metres
    pub median_separation: f64,
    pub aligned_points: usize,
}

/// A walk left out of the result table, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedWalk {
    pub walk_id: u32,
    pub reason: String,
}

/// Result table plus the walks that could not be summarised.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WalkReport {
    pub summaries: Vec<PairSummary>,
    pub skipped: Vec<SkippedWalk>,
}

/// Group projected samples by walk id, keeping sample order within each walk.
pub fn group_by_walk(samples: &[ProjectedSample]) -> BTreeMap<u32, Vec<ProjectedSample>> {
    let mut walks: BTreeMap<u32, Vec<ProjectedSample>> = BTreeMap::new();
    for s in samples {
        walks.entry(s.walk_id).or_default().push(*s);
    }
    walks
}

/// Partition projected samples into walks, ascending by walk id.
///
/// Fails on the first walk lacking a human or dog subsequence; use
/// [`summarize_walks`] to skip such walks instead.
pub fn partition_walks(samples: &[ProjectedSample]) -> Result<Vec<Walk>> {
    group_by_walk(samples)
        .iter()
        .map(|(walk_id, samples)| Walk::from_samples(*walk_id, samples))
        .collect()
}

fn distance_stat(track: &Trajectory, value: f64) -> Option<f64> {
    (!track.is_degenerate()).then_some(value)
}

fn duration_stat(track: &Trajectory) -> Option<f64> {
    (!track.is_single_fix()).then(|| track.duration_secs())
}

/// Build both trajectories of a walk, compare them and summarise.
///
/// # Example
/// ```
/// use chrono::{Duration, NaiveDate};
/// use walk_disturbance::{summarize_walk, MatchPolicy, PlanarPoint, ProjectedSample, Species, Walk};
///
/// let t0 = NaiveDate::from_ymd_opt(2021, 4, 17).unwrap().and_hms_opt(9, 0, 0).unwrap();
/// let mut samples = Vec::new();
/// for i in 0..=10 {
///     let t = t0 + Duration::seconds(i * 10);
///     samples.push(ProjectedSample::new(1, Species::Human, t, PlanarPoint::new(i as f64 * 25.0, 0.0)));
///     samples.push(ProjectedSample::new(1, Species::Dog, t, PlanarPoint::new(i as f64 * 40.0, 0.0)));
/// }
///
/// let walk = Walk::from_samples(1, &samples).unwrap();
/// let summary = summarize_walk(&walk, &MatchPolicy::Exact).unwrap();
/// assert_eq!(summary.human_max_distance, Some(250.0));
/// assert_eq!(summary.dog_max_distance, Some(400.0));
/// assert_eq!(summary.human_duration_secs, Some(100.0));
/// ```
pub fn summarize_walk(walk: &Walk, policy: &MatchPolicy) -> Result<PairSummary> {
    let human = Trajectory::new(walk.walk_id, Species::Human, walk.human.clone())?;
    let dog = Trajectory::new(walk.walk_id, Species::Dog, walk.dog.clone())?;
    let separation = compare_trajectories(&human, &dog, policy)?;
    let (date, time) = walk.start();

    let summary = PairSummary {
        walk_id: walk.walk_id,
        date,
        time,
        human_max_distance: distance_stat(&human, human.max_distance_from_start()),
        dog_max_distance: distance_stat(&dog, dog.max_distance_from_start()),
        human_total_distance: distance_stat(&human, human.total_distance()),
        dog_total_distance: distance_stat(&dog, dog.total_distance()),
        human_duration_secs: duration_stat(&human),
        dog_duration_secs: duration_stat(&dog),
        median_separation: separation.median(),
        aligned_points: separation.len(),
    };

    debug!(
        "Walk {}: human {:.0}m over {:.0}s, dog {:.0}m, median separation {:.1}m",
        walk.walk_id,
        human.total_distance(),
        human.duration_secs(),
        dog.total_distance(),
        summary.median_separation
    );

    Ok(summary)
}

/// Walk ids to process, in order.
fn selected_ids(walks: &BTreeMap<u32, Vec<ProjectedSample>>, selection: &WalkSelection) -> Vec<u32> {
    match selection {
        WalkSelection::All => walks.keys().copied().collect(),
        WalkSelection::Ids(ids) => ids.clone(),
    }
}

fn summarize_id(
    walks: &BTreeMap<u32, Vec<ProjectedSample>>,
    walk_id: u32,
    policy: &MatchPolicy,
) -> Result<PairSummary> {
    let samples = walks.get(&walk_id).ok_or(WalkError::UnknownWalk(walk_id))?;
    let walk = Walk::from_samples(walk_id, samples)?;
    summarize_walk(&walk, policy)
}

/// Fold per-walk outcomes into a report, in processing order.
///
/// Data errors skip the walk with a warning; any other error is a bug in the
/// caller's setup and is returned.
fn collect_report(outcomes: Vec<(u32, Result<PairSummary>)>) -> Result<WalkReport> {
    let mut report = WalkReport::default();
    for (walk_id, outcome) in outcomes {
        match outcome {
            Ok(summary) => report.summaries.push(summary),
            Err(e) if e.is_data_error() => {
                warn!("Skipping walk {walk_id}: {e}");
                report.skipped.push(SkippedWalk { walk_id, reason: e.to_string() });
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        "Summarised {} walks ({} skipped)",
        report.summaries.len(),
        report.skipped.len()
    );
    Ok(report)
}

/// Summarise every selected walk, in selection order.
///
/// A walk with a data problem (missing subject, out-of-order fixes, no aligned
/// timepoints, unknown id) is skipped with a warning and listed in
/// [`WalkReport::skipped`]; the rest of the batch carries on.
pub fn summarize_walks(
    samples: &[ProjectedSample],
    selection: &WalkSelection,
    policy: &MatchPolicy,
) -> Result<WalkReport> {
    let walks = group_by_walk(samples);
    let outcomes = selected_ids(&walks, selection)
        .into_iter()
        .map(|id| (id, summarize_id(&walks, id, policy)))
        .collect();
    collect_report(outcomes)
}

/// Parallel version of [`summarize_walks`]; output order is identical.
#[cfg(feature = "parallel")]
pub fn summarize_walks_parallel(
    samples: &[ProjectedSample],
    selection: &WalkSelection,
    policy: &MatchPolicy,
) -> Result<WalkReport> {
    use rayon::prelude::*;

    let walks = group_by_walk(samples);
    let outcomes = selected_ids(&walks, selection)
        .into_par_iter()
        .map(|id| (id, summarize_id(&walks, id, policy)))
        .collect();
    collect_report(outcomes)
}
