//! Disturbance footprint and overlap raster for a handful of walks.
//!
//! Run with: cargo run --example footprint

use chrono::{Duration, NaiveDate};
use walk_disturbance::{
    build_footprint, buffer_walks, BufferIndex, Footprint, FootprintConfig, OverlapRaster,
    PlanarPoint, ProjectedSample, Species, SubjectSelection,
};

/// Walks fanning out from a shared car park at (0, 0).
fn fan_of_walks() -> Vec<ProjectedSample> {
    let t0 = NaiveDate::from_ymd_opt(2021, 5, 2).unwrap().and_hms_opt(7, 0, 0).unwrap();
    let mut samples = Vec::new();

    for walk_id in 1..=4u32 {
        let angle = walk_id as f64 * 0.25;
        for i in 0..40 {
            let t = t0 + Duration::seconds(i * 10);
            let r = i as f64 * 5.0;
            let human = PlanarPoint::new(r * angle.cos(), r * angle.sin());
            let dog = PlanarPoint::new(human.x + 4.0 * (i as f64).sin(), human.y + 4.0 * (i as f64).cos());
            samples.push(ProjectedSample::new(walk_id, Species::Human, t, human));
            samples.push(ProjectedSample::new(walk_id, Species::Dog, t, dog));
        }
    }
    samples
}

fn main() -> Result<(), walk_disturbance::WalkError> {
    env_logger::init();
    let samples = fan_of_walks();

    println!("Disturbance footprints\n");
    for (label, config) in [
        ("Dogs off lead (8.5 m)", FootprintConfig::default()),
        (
            "Dogs on 2 m leads",
            FootprintConfig {
                lead_length: Some(2.0),
                subjects: SubjectSelection::HumanOnly,
                ..FootprintConfig::default()
            },
        ),
    ] {
        if let Footprint::Dissolved { area_m2, .. } = build_footprint(&samples, &config)? {
            println!("  {label}: {area_m2:.0} m² ({:.4} km²)", area_m2 / 1e6);
        }
    }

    let buffers = buffer_walks(&samples, &FootprintConfig::default())?;
    let raster = OverlapRaster::from_buffers(&buffers, 1.0)?;

    println!("\nOverlap raster: {} x {} cells", raster.rows, raster.cols);
    for (count, area) in raster.area_by_count() {
        println!("  disturbed by {count} walk(s): {area:.0} m²");
    }
    println!("  no data: {:.0} m²", raster.extent_area() - raster.covered_area());

    let index = BufferIndex::new(&buffers);
    let car_park = PlanarPoint::new(2.0, 1.0);
    println!("\nWalks disturbing the car park: {:?}", index.walks_at(car_park));
    Ok(())
}
