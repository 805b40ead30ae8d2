// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! The storage operations pattern building and editing need. Postgres
//! implements these in [`crate::pg_store`].

use super::{Pattern, PatternError, PatternHalt, StopTimeRecord};
use std::future::Future;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Collects rows and hands them back once `batch_size` are waiting, so
/// inserts go out in bounded chunks.
pub struct BatchTracker<T> {
    batch_size: usize,
    rows: Vec<T>,
    total: usize,
}

impl<T> BatchTracker<T> {
    pub fn new(batch_size: usize) -> BatchTracker<T> {
        let batch_size = batch_size.max(1);
        BatchTracker {
            batch_size,
            rows: Vec::with_capacity(batch_size),
            total: 0,
        }
    }

    /// Returns a full batch to execute, if adding `row` filled one.
    #[must_use]
    pub fn add(&mut self, row: T) -> Option<Vec<T>> {
        self.rows.push(row);
        self.total += 1;

        match self.rows.len() >= self.batch_size {
            true => Some(self.take()),
            false => None,
        }
    }

    /// Whatever is left over, possibly empty.
    pub fn take(&mut self) -> Vec<T> {
        std::mem::replace(&mut self.rows, Vec::with_capacity(self.batch_size))
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// `(trip_id, pattern_id)` pairs waiting to be bulk loaded into trips.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TripPatternStaging {
    pub trip_ids: Vec<String>,
    pub pattern_ids: Vec<String>,
}

impl TripPatternStaging {
    pub fn push(&mut self, trip_id: &str, pattern_id: &str) {
        self.trip_ids.push(trip_id.to_string());
        self.pattern_ids.push(pattern_id.to_string());
    }

    pub fn len(&self) -> usize {
        self.trip_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trip_ids.is_empty()
    }

    /// Column-wise chunks, ready to bind as arrays.
    pub fn chunks(&self, size: usize) -> impl Iterator<Item = (&[String], &[String])> {
        let size = size.max(1);
        self.trip_ids
            .chunks(size)
            .zip(self.pattern_ids.chunks(size))
    }
}

/// Times read for one trip at one stop_sequence, used to seed normalization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TripSeed {
    pub trip_id: String,
    pub arrival_time: Option<i32>,
    pub departure_time: Option<i32>,
    pub start_pickup_drop_off_window: Option<i32>,
    pub end_pickup_drop_off_window: Option<i32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormalizedTimes {
    Fixed { arrival_time: i32, departure_time: i32 },
    Window { start: i32, end: i32 },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StopTimeUpdate {
    pub trip_id: String,
    pub stop_sequence: i32,
    pub times: NormalizedTimes,
}

/// Writes discovered patterns. Every call happens inside one transaction
/// owned by the caller.
pub trait PatternSink {
    /// Adds `pattern_id` to trips and creates the pattern tables. The
    /// patterns table is left alone when the feed already supplied it.
    fn prepare_tables(
        &mut self,
        reuse_feed_patterns: bool,
    ) -> impl Future<Output = Result<(), PatternError>> + Send;

    fn insert_patterns(
        &mut self,
        patterns: &[&Pattern],
    ) -> impl Future<Output = Result<(), PatternError>> + Send;

    fn insert_pattern_halts(
        &mut self,
        halts: &[PatternHalt],
    ) -> impl Future<Output = Result<(), PatternError>> + Send;

    /// Sets `trips.pattern_id` for every staged trip in one pass.
    fn assign_trip_patterns(
        &mut self,
        staging: &TripPatternStaging,
    ) -> impl Future<Output = Result<(), PatternError>> + Send;

    /// Primary keys and indexes, added once the rows are in.
    fn finalize_tables(
        &mut self,
        reuse_feed_patterns: bool,
    ) -> impl Future<Output = Result<(), PatternError>> + Send;
}

/// Reads and rewrites a persisted pattern and the stop times of its trips.
pub trait PatternEditStore {
    /// All halts of a pattern ordered by stop_sequence.
    fn pattern_halts(
        &mut self,
        pattern_id: &str,
    ) -> impl Future<Output = Result<Vec<PatternHalt>, PatternError>> + Send;

    fn trip_ids_for_pattern(
        &mut self,
        pattern_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, PatternError>> + Send;

    /// Adds `delta` to the stop_sequence of every stop time at or after
    /// `from_sequence` on the pattern's trips.
    fn shift_stop_sequences(
        &mut self,
        pattern_id: &str,
        from_sequence: i32,
        delta: i32,
    ) -> impl Future<Output = Result<usize, PatternError>> + Send;

    fn delete_stop_times(
        &mut self,
        pattern_id: &str,
        stop_sequence: i32,
    ) -> impl Future<Output = Result<usize, PatternError>> + Send;

    /// Inserts each of `stop_times` once for every trip.
    fn insert_blank_stop_times(
        &mut self,
        trip_ids: &[String],
        stop_times: &[StopTimeRecord],
    ) -> impl Future<Output = Result<usize, PatternError>> + Send;

    /// Moves the stop time at `from` to `to`, sliding everything in between
    /// by one position toward `from`.
    fn move_stop_sequence(
        &mut self,
        pattern_id: &str,
        from: i32,
        to: i32,
    ) -> impl Future<Output = Result<usize, PatternError>> + Send;

    fn replace_pattern_halts(
        &mut self,
        pattern_id: &str,
        halts: &[PatternHalt],
    ) -> impl Future<Output = Result<(), PatternError>> + Send;

    /// The stop time at `stop_sequence` for each trip on the pattern.
    fn stop_time_seeds(
        &mut self,
        pattern_id: &str,
        stop_sequence: i32,
    ) -> impl Future<Output = Result<Vec<TripSeed>, PatternError>> + Send;

    fn update_stop_time_times(
        &mut self,
        updates: &[StopTimeUpdate],
    ) -> impl Future<Output = Result<usize, PatternError>> + Send;
}
