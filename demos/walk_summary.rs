//! Summarise human–dog walks from a CSV of GPS fixes.
//!
//! Run with: cargo run --example walk_summary -- fixes.csv
//!
//! Without a path a few synthetic walks are generated. The summary table is
//! written to stdout as CSV; set RUST_LOG=debug for per-walk detail.

use std::error::Error;

use chrono::{Duration, NaiveDate, NaiveTime};
use walk_disturbance::geo_utils::offset_point;
use walk_disturbance::{
    read_samples_from_path, run_analysis, write_summaries, AnalysisConfig, GeoPoint, ReaderConfig,
    Sample, Species,
};

/// A dog ranging back and forth across its walker's path.
fn synthetic_walks() -> Vec<Sample> {
    let origin = GeoPoint::new(50.6950, -1.9870);
    let date = NaiveDate::from_ymd_opt(2021, 4, 17).unwrap();
    let mut samples = Vec::new();

    for walk_id in 1..=3u32 {
        let start = NaiveTime::from_hms_opt(8 + walk_id, 30, 0).unwrap();
        let heading = walk_id as f64 * 0.4;
        for i in 0..120 {
            let time = start + Duration::seconds(i * 5);
            let along = i as f64 * 6.0;
            let sway = 15.0 * (i as f64 / 4.0).sin();
            let (dx, dy) = (along * heading.cos(), along * heading.sin());
            samples.push(Sample::new(walk_id, Species::Human, date, time, offset_point(&origin, dx, dy)));
            samples.push(Sample::new(walk_id, Species::Dog, date, time, offset_point(&origin, dx - sway * heading.sin(), dy + sway * heading.cos())));
        }
    }
    samples
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let samples = match std::env::args().nth(1) {
        Some(path) => read_samples_from_path(path, &ReaderConfig::default())?,
        None => synthetic_walks(),
    };

    let report = run_analysis(&samples, &AnalysisConfig::default())?;
    write_summaries(std::io::stdout().lock(), &report.summaries)?;

    for skipped in &report.skipped {
        eprintln!("skipped walk {}: {}", skipped.walk_id, skipped.reason);
    }
    eprintln!("Disturbed area: {:.4} km²", report.disturbed_area_km2);
    Ok(())
}
