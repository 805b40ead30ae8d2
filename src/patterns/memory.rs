// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! In-memory feed tables for exercising pattern code without Postgres.

use super::store::{
    NormalizedTimes, PatternEditStore, PatternSink, StopTimeUpdate, TripPatternStaging, TripSeed,
};
use super::{HaltRef, Pattern, PatternError, PatternHalt, StopTimeRecord, TripStopTimes};

#[derive(Clone, Debug)]
pub struct TripRow {
    pub trip_id: String,
    pub route_id: String,
    pub pattern_id: Option<String>,
}

#[derive(Clone, Debug)]
pub struct StopTimeRow {
    pub trip_id: String,
    pub record: StopTimeRecord,
}

#[derive(Clone, Debug)]
pub struct PatternRow {
    pub pattern_id: String,
    pub route_id: String,
    pub name: Option<String>,
    pub shape_id: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct MemoryFeed {
    pub trips: Vec<TripRow>,
    pub stop_times: Vec<StopTimeRow>,
    pub patterns: Vec<PatternRow>,
    pub pattern_halts: Vec<PatternHalt>,
    pub keys_added: bool,
    pub operations: Vec<String>,
}

/// A fixed-stop trip with five minutes between stops and 30 second dwells.
pub fn fixed_trip(trip_id: &str, route_id: &str, stops: &[&str], start: i32) -> TripStopTimes {
    TripStopTimes {
        trip_id: trip_id.to_string(),
        route_id: route_id.to_string(),
        shape_id: None,
        direction_id: Some(0),
        stop_times: stops
            .iter()
            .enumerate()
            .map(|(i, stop_id)| StopTimeRecord {
                arrival_time: Some(start + i as i32 * 300),
                departure_time: Some(start + i as i32 * 300 + 30),
                pickup_type: Some(0),
                drop_off_type: Some(0),
                ..StopTimeRecord::blank(i as i32, HaltRef::Stop(stop_id.to_string()))
            })
            .collect(),
    }
}

impl MemoryFeed {
    pub fn from_trips(trips: &[TripStopTimes]) -> MemoryFeed {
        let mut feed = MemoryFeed::default();

        for trip in trips {
            feed.trips.push(TripRow {
                trip_id: trip.trip_id.clone(),
                route_id: trip.route_id.clone(),
                pattern_id: None,
            });

            for stop_time in &trip.stop_times {
                feed.stop_times.push(StopTimeRow {
                    trip_id: trip.trip_id.clone(),
                    record: stop_time.clone(),
                });
            }
        }

        feed
    }

    /// Trips already assigned to `pattern_id`, with halts built from `stops`.
    pub fn with_pattern(pattern_id: &str, stops: &[&str], trip_ids: &[&str]) -> MemoryFeed {
        let trips: Vec<TripStopTimes> = trip_ids
            .iter()
            .enumerate()
            .map(|(i, trip_id)| fixed_trip(trip_id, "r1", stops, 28_800 + i as i32 * 3600))
            .collect();

        let mut feed = MemoryFeed::from_trips(&trips);

        for trip in &mut feed.trips {
            trip.pattern_id = Some(pattern_id.to_string());
        }

        feed.pattern_halts = stops
            .iter()
            .enumerate()
            .map(|(i, stop_id)| halt(pattern_id, i as i32, HaltRef::Stop(stop_id.to_string())))
            .collect();

        feed
    }

    pub fn trip_pattern(&self, trip_id: &str) -> Option<&str> {
        self.trips
            .iter()
            .find(|trip| trip.trip_id == trip_id)
            .and_then(|trip| trip.pattern_id.as_deref())
    }

    /// A trip's stop times ordered by stop_sequence.
    pub fn stop_times_for(&self, trip_id: &str) -> Vec<&StopTimeRecord> {
        let mut stop_times: Vec<&StopTimeRecord> = self
            .stop_times
            .iter()
            .filter(|row| row.trip_id == trip_id)
            .map(|row| &row.record)
            .collect();
        stop_times.sort_by_key(|record| record.stop_sequence);
        stop_times
    }

    /// `(stop_sequence, reference id)` of a trip, in order.
    pub fn sequence_of(&self, trip_id: &str) -> Vec<(i32, String)> {
        self.stop_times_for(trip_id)
            .into_iter()
            .map(|record| {
                (
                    record.stop_sequence,
                    record.halt.reference_id().to_string(),
                )
            })
            .collect()
    }

    fn trip_ids_on(&self, pattern_id: &str) -> Vec<String> {
        self.trips
            .iter()
            .filter(|trip| trip.pattern_id.as_deref() == Some(pattern_id))
            .map(|trip| trip.trip_id.clone())
            .collect()
    }

    fn stop_times_on_mut<'a>(
        &'a mut self,
        pattern_id: &str,
    ) -> impl Iterator<Item = &'a mut StopTimeRecord> + 'a {
        let trip_ids = self.trip_ids_on(pattern_id);
        self.stop_times
            .iter_mut()
            .filter(move |row| trip_ids.contains(&row.trip_id))
            .map(|row| &mut row.record)
    }
}

/// A fixed-stop halt with no derived times.
pub fn halt(pattern_id: &str, stop_sequence: i32, halt: HaltRef) -> PatternHalt {
    PatternHalt {
        pattern_id: pattern_id.to_string(),
        stop_sequence,
        halt,
        travel_time: None,
        dwell_time: None,
        drop_off_type: Some(0),
        pickup_type: Some(0),
        timepoint: None,
        stop_headsign: None,
        shape_dist_traveled: None,
        continuous_pickup: None,
        continuous_drop_off: None,
        pickup_booking_rule_id: None,
        drop_off_booking_rule_id: None,
    }
}

impl PatternSink for MemoryFeed {
    async fn prepare_tables(&mut self, reuse_feed_patterns: bool) -> Result<(), PatternError> {
        if !reuse_feed_patterns {
            self.patterns.clear();
        }
        self.pattern_halts.clear();
        self.operations.push("prepare_tables".to_string());
        Ok(())
    }

    async fn insert_patterns(&mut self, patterns: &[&Pattern]) -> Result<(), PatternError> {
        for pattern in patterns {
            self.patterns.push(PatternRow {
                pattern_id: pattern.pattern_id.clone(),
                route_id: pattern.route_id.clone(),
                name: pattern.name.clone(),
                shape_id: pattern.shape_id().map(String::from),
            });
        }
        self.operations.push("insert_patterns".to_string());
        Ok(())
    }

    async fn insert_pattern_halts(&mut self, halts: &[PatternHalt]) -> Result<(), PatternError> {
        self.pattern_halts.extend_from_slice(halts);
        self.operations.push("insert_pattern_halts".to_string());
        Ok(())
    }

    async fn assign_trip_patterns(
        &mut self,
        staging: &TripPatternStaging,
    ) -> Result<(), PatternError> {
        for (trip_id, pattern_id) in staging.trip_ids.iter().zip(&staging.pattern_ids) {
            if let Some(trip) = self.trips.iter_mut().find(|trip| &trip.trip_id == trip_id) {
                trip.pattern_id = Some(pattern_id.clone());
            }
        }
        self.operations.push("assign_trip_patterns".to_string());
        Ok(())
    }

    async fn finalize_tables(&mut self, _reuse_feed_patterns: bool) -> Result<(), PatternError> {
        self.keys_added = true;
        self.operations.push("finalize_tables".to_string());
        Ok(())
    }
}

impl PatternEditStore for MemoryFeed {
    async fn pattern_halts(&mut self, pattern_id: &str) -> Result<Vec<PatternHalt>, PatternError> {
        let mut halts: Vec<PatternHalt> = self
            .pattern_halts
            .iter()
            .filter(|halt| halt.pattern_id == pattern_id)
            .cloned()
            .collect();
        halts.sort_by_key(|halt| halt.stop_sequence);
        Ok(halts)
    }

    async fn trip_ids_for_pattern(&mut self, pattern_id: &str) -> Result<Vec<String>, PatternError> {
        Ok(self.trip_ids_on(pattern_id))
    }

    async fn shift_stop_sequences(
        &mut self,
        pattern_id: &str,
        from_sequence: i32,
        delta: i32,
    ) -> Result<usize, PatternError> {
        let mut updated = 0;
        for record in self.stop_times_on_mut(pattern_id) {
            if record.stop_sequence >= from_sequence {
                record.stop_sequence += delta;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_stop_times(
        &mut self,
        pattern_id: &str,
        stop_sequence: i32,
    ) -> Result<usize, PatternError> {
        let trip_ids = self.trip_ids_on(pattern_id);
        let before = self.stop_times.len();
        self.stop_times.retain(|row| {
            !(trip_ids.contains(&row.trip_id) && row.record.stop_sequence == stop_sequence)
        });
        Ok(before - self.stop_times.len())
    }

    async fn insert_blank_stop_times(
        &mut self,
        trip_ids: &[String],
        stop_times: &[StopTimeRecord],
    ) -> Result<usize, PatternError> {
        for trip_id in trip_ids {
            for record in stop_times {
                self.stop_times.push(StopTimeRow {
                    trip_id: trip_id.clone(),
                    record: record.clone(),
                });
            }
        }
        Ok(trip_ids.len() * stop_times.len())
    }

    async fn move_stop_sequence(
        &mut self,
        pattern_id: &str,
        from: i32,
        to: i32,
    ) -> Result<usize, PatternError> {
        let mut updated = 0;
        for record in self.stop_times_on_mut(pattern_id) {
            let sequence = record.stop_sequence;
            record.stop_sequence = if sequence == from {
                to
            } else if from < to && sequence > from && sequence <= to {
                sequence - 1
            } else if to < from && sequence >= to && sequence < from {
                sequence + 1
            } else {
                sequence
            };
            updated += 1;
        }
        Ok(updated)
    }

    async fn replace_pattern_halts(
        &mut self,
        pattern_id: &str,
        halts: &[PatternHalt],
    ) -> Result<(), PatternError> {
        self.pattern_halts.retain(|halt| halt.pattern_id != pattern_id);
        self.pattern_halts.extend_from_slice(halts);
        Ok(())
    }

    async fn stop_time_seeds(
        &mut self,
        pattern_id: &str,
        stop_sequence: i32,
    ) -> Result<Vec<TripSeed>, PatternError> {
        let trip_ids = self.trip_ids_on(pattern_id);
        Ok(self
            .stop_times
            .iter()
            .filter(|row| {
                trip_ids.contains(&row.trip_id) && row.record.stop_sequence == stop_sequence
            })
            .map(|row| TripSeed {
                trip_id: row.trip_id.clone(),
                arrival_time: row.record.arrival_time,
                departure_time: row.record.departure_time,
                start_pickup_drop_off_window: row.record.start_pickup_drop_off_window,
                end_pickup_drop_off_window: row.record.end_pickup_drop_off_window,
            })
            .collect())
    }

    async fn update_stop_time_times(
        &mut self,
        updates: &[StopTimeUpdate],
    ) -> Result<usize, PatternError> {
        let mut updated = 0;
        for update in updates {
            for row in self.stop_times.iter_mut().filter(|row| {
                row.trip_id == update.trip_id && row.record.stop_sequence == update.stop_sequence
            }) {
                match update.times {
                    NormalizedTimes::Fixed {
                        arrival_time,
                        departure_time,
                    } => {
                        row.record.arrival_time = Some(arrival_time);
                        row.record.departure_time = Some(departure_time);
                    }
                    NormalizedTimes::Window { start, end } => {
                        row.record.start_pickup_drop_off_window = Some(start);
                        row.record.end_pickup_drop_off_window = Some(end);
                    }
                }
                updated += 1;
            }
        }
        Ok(updated)
    }
}
