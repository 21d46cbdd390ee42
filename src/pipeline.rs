//! End-to-end analysis: raw fixes in, summary table and footprint out.
//!
//! [`run_analysis`] projects the samples, summarises every selected walk,
//! buffers the same walks, dissolves them for the total disturbed area and
//! rasterizes the per-walk buffers into overlap counts.

use std::collections::BTreeMap;

use geo::Area;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    area_km2, buffer_walks, dissolve, project_samples, Crs, CrsProjector, FootprintConfig,
    MatchPolicy, OverlapRaster, PairSummary, ProjectedSample, Projector, Result, Sample,
    SkippedWalk, WalkReport, WalkSelection,
};

/// Configuration for a full analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Reference system of the input fixes. Default: EPSG:4326
    pub source_crs: Crs,

    /// Planar grid all distances and areas are measured in.
    /// Default: EPSG:27700 (British National Grid)
    pub target_crs: Crs,

    /// How human and dog fixes are paired in time. Default: Exact
    pub match_policy: MatchPolicy,

    /// Walks to summarise and buffer. Default: All
    pub walks: WalkSelection,

    /// Buffer radius and subjects. The `dissolve` flag is not consulted here;
    /// the report always carries the dissolved area and the raster.
    pub footprint: FootprintConfig,

    /// Overlap raster cell size in metres. Default: 1.0
    pub cell_size: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            source_crs: Crs::Wgs84,
            target_crs: Crs::BritishNationalGrid,
            match_policy: MatchPolicy::Exact,
            walks: WalkSelection::All,
            footprint: FootprintConfig::default(),
            cell_size: 1.0,
        }
    }
}

impl AnalysisConfig {
    /// Read a config from JSON; missing fields take their defaults.
    ///
    /// ```
    /// use walk_disturbance::{AnalysisConfig, Crs};
    ///
    /// let config = AnalysisConfig::from_json(
    ///     r#"{ "target_crs": "EPSG:32630", "footprint": { "flight_initiation_distance": 20.0 } }"#,
    /// ).unwrap();
    /// assert_eq!(config.target_crs, Crs::Utm { zone: 30, north: true });
    /// assert_eq!(config.footprint.radius(), 20.0);
    /// assert_eq!(config.cell_size, 1.0);
    /// ```
    #[cfg(feature = "json")]
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Everything one analysis run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub summaries: Vec<PairSummary>,
    pub skipped: Vec<SkippedWalk>,
    /// Dissolved footprint area of the selected walks
    pub disturbed_area_m2: f64,
    pub disturbed_area_km2: f64,
    pub raster: OverlapRaster,
}

fn summarize(projected: &[ProjectedSample], config: &AnalysisConfig) -> Result<WalkReport> {
    #[cfg(feature = "parallel")]
    {
        crate::summarize_walks_parallel(projected, &config.walks, &config.match_policy)
    }

    #[cfg(not(feature = "parallel"))]
    {
        crate::summarize_walks(projected, &config.walks, &config.match_policy)
    }
}

/// Project the selected walks one at a time. A walk with a fix that cannot be
/// projected is skipped with a warning; the others carry on.
fn project_walks(
    samples: &[Sample],
    selection: &WalkSelection,
    projector: &dyn Projector,
) -> Result<(Vec<ProjectedSample>, Vec<SkippedWalk>)> {
    let mut walks: BTreeMap<u32, Vec<Sample>> = BTreeMap::new();
    for s in samples.iter().filter(|s| selection.includes(s.walk_id)) {
        walks.entry(s.walk_id).or_default().push(s.clone());
    }

    let mut projected = Vec::with_capacity(samples.len());
    let mut skipped = Vec::new();
    for (walk_id, walk) in walks {
        match project_samples(&walk, projector) {
            Ok(points) => projected.extend(points),
            Err(e) if e.is_data_error() => {
                warn!("Skipping walk {walk_id}: {e}");
                skipped.push(SkippedWalk { walk_id, reason: e.to_string() });
            }
            Err(e) => return Err(e),
        }
    }
    Ok((projected, skipped))
}

/// Run every stage on raw samples.
///
/// Walks skipped by the summary stage because a subject is missing still
/// contribute their tracks to the footprint. Walks with unprojectable or
/// non-chronological fixes are left out of both.
pub fn run_analysis(samples: &[Sample], config: &AnalysisConfig) -> Result<AnalysisReport> {
    info!("Analysing {} samples", samples.len());

    let projector = CrsProjector::new(config.source_crs, config.target_crs)?;
    let (projected, mut skipped) = project_walks(samples, &config.walks, &projector)?;

    let WalkReport { summaries, skipped: summary_skipped } = summarize(&projected, config)?;
    let unprojected: Vec<u32> = skipped.iter().map(|s| s.walk_id).collect();
    skipped.extend(
        summary_skipped
            .into_iter()
            .filter(|s| !unprojected.contains(&s.walk_id)),
    );

    let buffers = buffer_walks(&projected, &config.footprint)?;
    let disturbed_area_m2 = dissolve(&buffers).unsigned_area();
    let raster = OverlapRaster::from_buffers(&buffers, config.cell_size)?;

    info!(
        "{} walks summarised, {} buffered, disturbed area {:.4} km²",
        summaries.len(),
        buffers.len(),
        area_km2(disturbed_area_m2)
    );

    Ok(AnalysisReport {
        summaries,
        skipped,
        disturbed_area_m2,
        disturbed_area_km2: area_km2(disturbed_area_m2),
        raster,
    })
}
