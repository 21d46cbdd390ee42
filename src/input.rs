//! Reading GPS fixes from delimited tables and writing the per-walk summary table.
//!
//! The input has one row per fix with a walk identifier, species, date, time,
//! latitude and longitude. Column names, delimiter and date/time formats are
//! configurable through [`ReaderConfig`]. Rows are taken in file order; they
//! must already be chronological within each (walk, species) group.

use std::fs::File;
use std::io;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};
use csv::StringRecord;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{GeoPoint, PairSummary, Result, Sample, Species, WalkError};

/// Header names of the required input columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnNames {
    pub walk: String,
    pub species: String,
    pub date: String,
    pub time: String,
    pub latitude: String,
    pub longitude: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            walk: "walk".to_string(),
            species: "species".to_string(),
            date: "date".to_string(),
            time: "time".to_string(),
            latitude: "lat".to_string(),
            longitude: "long".to_string(),
        }
    }
}

/// Configuration for reading the input table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Column header names (matched case-insensitively)
    pub columns: ColumnNames,
    /// Field delimiter. Default: b','
    pub delimiter: u8,
    /// chrono format of the date column. Default: "%d/%m/%Y"
    pub date_format: String,
    /// chrono format of the time column. Default: "%H:%M:%S"
    pub time_format: String,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            columns: ColumnNames::default(),
            delimiter: b',',
            date_format: "%d/%m/%Y".to_string(),
            time_format: "%H:%M:%S".to_string(),
        }
    }
}

/// Positions of the required columns in a header row.
struct ColumnIndex {
    walk: usize,
    species: usize,
    date: usize,
    time: usize,
    latitude: usize,
    longitude: usize,
}

impl ColumnIndex {
    fn locate(headers: &StringRecord, names: &ColumnNames) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| WalkError::MissingColumn(name.to_string()))
        };

        Ok(Self {
            walk: find(&names.walk)?,
            species: find(&names.species)?,
            date: find(&names.date)?,
            time: find(&names.time)?,
            latitude: find(&names.latitude)?,
            longitude: find(&names.longitude)?,
        })
    }

    fn parse(&self, record: &StringRecord, line: u64, config: &ReaderConfig) -> Result<Sample> {
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let parse_error = |field_name: &'static str, value: &str| WalkError::Parse {
            line,
            field: field_name,
            value: value.to_string(),
        };

        let raw = field(self.walk);
        let walk_id: u32 = raw.parse().map_err(|_| parse_error("walk", raw))?;

        let raw = field(self.species);
        let species: Species = raw.parse().map_err(|_| parse_error("species", raw))?;

        let raw = field(self.date);
        let date = NaiveDate::parse_from_str(raw, &config.date_format)
            .map_err(|_| parse_error("date", raw))?;

        let raw = field(self.time);
        let time = NaiveTime::parse_from_str(raw, &config.time_format)
            .map_err(|_| parse_error("time", raw))?;

        let raw = field(self.latitude);
        let latitude: f64 = raw.parse().map_err(|_| parse_error("latitude", raw))?;

        let raw = field(self.longitude);
        let longitude: f64 = raw.parse().map_err(|_| parse_error("longitude", raw))?;

        Ok(Sample::new(walk_id, species, date, time, GeoPoint::new(latitude, longitude)))
    }
}

/// Read every fix from a delimited table.
///
/// A missing column is reported before any row is read. A field that cannot
/// be parsed fails the whole read with the offending line number.
///
/// # Example
///
/// ```rust
/// use walk_disturbance::{read_samples, ReaderConfig, Species};
///
/// let data = "walk,species,date,time,lat,long\n\
///             1,human,17/04/2021,09:00:00,50.7000,-1.9000\n\
///             1,dog,17/04/2021,09:00:00,50.7001,-1.9001\n";
///
/// let samples = read_samples(data.as_bytes(), &ReaderConfig::default()).unwrap();
/// assert_eq!(samples.len(), 2);
/// assert_eq!(samples[1].species, Species::Dog);
/// ```
pub fn read_samples<R: io::Read>(reader: R, config: &ReaderConfig) -> Result<Vec<Sample>> {
    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let columns = ColumnIndex::locate(&headers, &config.columns)?;
    debug!("Input columns: {:?}", headers);

    let mut samples = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let line = record.position().map_or(0, |p| p.line());
        samples.push(columns.parse(&record, line, config)?);
    }

    info!("Read {} samples", samples.len());
    Ok(samples)
}

/// Read every fix from a file on disk. See [`read_samples`].
pub fn read_samples_from_path(path: impl AsRef<Path>, config: &ReaderConfig) -> Result<Vec<Sample>> {
    let path = path.as_ref();
    info!("Reading samples from {}", path.display());
    let file = File::open(path)?;
    read_samples(io::BufReader::new(file), config)
}

/// One line of the summary table. Field names are the CSV header.
#[derive(Serialize)]
struct SummaryRow {
    walk: u32,
    date: String,
    time: String,
    human_max_distance_m: Option<f64>,
    dog_max_distance_m: Option<f64>,
    human_total_distance_m: Option<f64>,
    dog_total_distance_m: Option<f64>,
    human_duration_s: Option<f64>,
    dog_duration_s: Option<f64>,
    median_separation_m: f64,
    aligned_points: usize,
}

impl From<&PairSummary> for SummaryRow {
    fn from(s: &PairSummary) -> Self {
        SummaryRow {
            walk: s.walk_id,
            date: s.date.format("%d/%m/%Y").to_string(),
            time: s.time.format("%H:%M:%S").to_string(),
            human_max_distance_m: s.human_max_distance,
            dog_max_distance_m: s.dog_max_distance,
            human_total_distance_m: s.human_total_distance,
            dog_total_distance_m: s.dog_total_distance,
            human_duration_s: s.human_duration_secs,
            dog_duration_s: s.dog_duration_secs,
            median_separation_m: s.median_separation,
            aligned_points: s.aligned_points,
        }
    }
}

/// Header written for an empty table, where no row carries it.
const SUMMARY_HEADER: [&str; 11] = [
    "walk",
    "date",
    "time",
    "human_max_distance_m",
    "dog_max_distance_m",
    "human_total_distance_m",
    "dog_total_distance_m",
    "human_duration_s",
    "dog_duration_s",
    "median_separation_m",
    "aligned_points",
];

/// Write the summary table as CSV, one row per walk in the given order.
///
/// Statistics of degenerate tracks are written as empty fields, never as 0.
pub fn write_summaries<W: io::Write>(writer: W, summaries: &[PairSummary]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    if summaries.is_empty() {
        wtr.write_record(SUMMARY_HEADER)?;
    }

    for s in summaries {
        wtr.serialize(SummaryRow::from(s))?;
    }

    wtr.flush()?;
    Ok(())
}
