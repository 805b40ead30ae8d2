// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum PatternError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("invalid namespace '{0}', expected letters, digits and underscores only")]
    InvalidNamespace(String),
    #[error(
        "pattern {pattern_id} halt at stop_sequence {stop_sequence} must reference exactly one of stop_id, location_id or location_group_id"
    )]
    AmbiguousHaltReference {
        pattern_id: String,
        stop_sequence: i32,
    },
    #[error("trip {trip_id} stop_sequence {stop_sequence} must reference exactly one of stop_id, location_id or location_group_id")]
    AmbiguousStopTimeReference { trip_id: String, stop_sequence: i32 },
    #[error("pattern {0} does not exist")]
    UnknownPattern(String),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
}

/// Reasons an edit to a pattern's halts is rejected. Messages are shown to
/// whoever made the edit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("changes to pattern stops must be made one at a time: multiple differences found in new stop list (detected stop {0})")]
    MultipleDifferences(&'static str),
    #[error("substituting one stop for another is not supported, add the new stop and then delete the old one")]
    Substitution,
    #[error("changes to pattern stops must be made one at a time: not a simple, single move")]
    NotASimpleMove,
    #[error("changes to pattern stops must be made one at a time: moving stop at position {from} to {to} changed other stops")]
    InteriorChanged { from: usize, to: usize },
    #[error("when adding more than one stop to a pattern, new stops must all be at the end")]
    NotAppendedAtEnd,
    #[error("changes to pattern stops must be made one at a time: stop count changed by {0}")]
    UnsupportedSizeChange(i64),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("shape_dist_traveled must be set for every stop to interpolate (missing at stop_sequence {0})")]
    MissingShapeDistTraveled(i32),
    #[error("interpolation needs at least 2 timepoints, pattern has {0}")]
    TooFewTimepoints(usize),
    #[error("stop_sequence {0} is not between two timepoints and cannot be interpolated")]
    OutsideTimepoints(i32),
    #[error("timepoint at stop_sequence {0} has no default_travel_time to interpolate with")]
    MissingTimepointTravelTime(i32),
    #[error("interpolated normalization only supports fixed stops, found flex halt at stop_sequence {0}")]
    FlexHalt(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    MultipleShapesForPattern,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::MultipleShapesForPattern => "MULTIPLE_SHAPES_FOR_PATTERN",
        }
    }
}

/// A data-quality problem that does not stop loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGtfsError {
    pub entity_type: &'static str,
    pub entity_id: String,
    pub error_type: ErrorType,
    pub bad_value: String,
}

pub trait ErrorSink {
    fn store_error(&mut self, error: NewGtfsError);
}

impl ErrorSink for Vec<NewGtfsError> {
    fn store_error(&mut self, error: NewGtfsError) {
        warn!(
            "{} for {} {}: {}",
            error.error_type.as_str(),
            error.entity_type,
            error.entity_id,
            error.bad_value
        );
        self.push(error);
    }
}
