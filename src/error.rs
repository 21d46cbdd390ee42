//! Error taxonomy for the whole pipeline.
//!
//! Variants fall into three groups: configuration errors (fatal, reported
//! immediately), data integrity errors (reported per walk, a batch skips the
//! walk and carries on) and I/O errors from reading or writing tables.

use thiserror::Error;

use crate::Species;

/// Errors raised while reading, projecting or analysing walks.
#[derive(Debug, Error)]
pub enum WalkError {
    // -- configuration
    #[error("Unsupported reference system {0}")]
    UnsupportedCrs(String),
    #[error("Missing required column '{0}' in input table")]
    MissingColumn(String),
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    // -- data integrity
    #[error("Walk {0} is not present in the input")]
    UnknownWalk(u32),
    #[error("Walk {walk_id} has no {species} samples")]
    MissingSubject { walk_id: u32, species: Species },
    #[error("Walk {walk_id} ({species}) is not chronological at sample {index}")]
    OutOfOrder {
        walk_id: u32,
        species: Species,
        index: usize,
    },
    #[error("Walk {walk_id}: human and dog tracks share no aligned timepoints")]
    NoAlignedTimepoints { walk_id: u32 },
    #[error("Walk {walk_id} ({species}) has no samples")]
    EmptyTrack { walk_id: u32, species: Species },
    #[error("Invalid coordinate ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },
    #[error("Line {line}: cannot parse {field} from '{value}'")]
    Parse {
        line: u64,
        field: &'static str,
        value: String,
    },

    // -- io
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[cfg(feature = "json")]
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl WalkError {
    /// True for errors that concern a single walk, which a batch may skip.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            WalkError::UnknownWalk(_)
                | WalkError::MissingSubject { .. }
                | WalkError::OutOfOrder { .. }
                | WalkError::NoAlignedTimepoints { .. }
                | WalkError::EmptyTrack { .. }
                | WalkError::InvalidCoordinate { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, WalkError>;
