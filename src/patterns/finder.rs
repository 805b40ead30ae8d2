// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::errors::{ErrorSink, ErrorType, NewGtfsError};
use super::key::PatternKey;
use super::naming::rename_patterns;
use super::{FeedPattern, HaltLookup, Pattern, TripStopTimes};
use ahash::AHashMap;
use itertools::Itertools;
use std::collections::BTreeSet;
use tracing::{info, warn};

#[derive(Clone, Debug)]
struct TripUnderPattern {
    trip_id: String,
    shape_id: Option<String>,
    direction_id: Option<i16>,
}

/// A discovered pattern together with the key it was grouped under. The key
/// keeps the stop times of the first trip seen, which the builder uses to
/// derive default travel and dwell times.
#[derive(Clone, Debug)]
pub struct DiscoveredPattern {
    pub key: PatternKey,
    pub pattern: Pattern,
}

/// Patterns in the order their keys were first seen.
#[derive(Clone, Debug, Default)]
pub struct DiscoveredPatterns {
    pub entries: Vec<DiscoveredPattern>,
    /// Ids and names came from the feed's own patterns table.
    pub reused_feed_patterns: bool,
}

impl DiscoveredPatterns {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &Pattern> {
        self.entries.iter().map(|entry| &entry.pattern)
    }

    pub fn get(&self, key: &PatternKey) -> Option<&Pattern> {
        self.entries
            .iter()
            .find(|entry| &entry.key == key)
            .map(|entry| &entry.pattern)
    }
}

/// Groups trips by [`PatternKey`]. Consumed by [`PatternFinder::create_pattern_objects`],
/// so a finder can only be finalized once.
#[derive(Default)]
pub struct PatternFinder {
    key_index: AHashMap<PatternKey, usize>,
    keys: Vec<PatternKey>,
    trips_for_key: Vec<Vec<TripUnderPattern>>,
    trips_processed: usize,
}

impl PatternFinder {
    pub fn new() -> PatternFinder {
        PatternFinder::default()
    }

    pub fn process_trip(&mut self, trip: &TripStopTimes) {
        if trip.stop_times.is_empty() {
            warn!("Trip {} has no stop times, skipping", trip.trip_id);
            return;
        }

        let key = PatternKey::from_stop_times(&trip.route_id, &trip.stop_times);

        let trip_under_pattern = TripUnderPattern {
            trip_id: trip.trip_id.clone(),
            shape_id: trip.shape_id.clone(),
            direction_id: trip.direction_id,
        };

        match self.key_index.get(&key) {
            Some(index) => self.trips_for_key[*index].push(trip_under_pattern),
            None => {
                self.key_index.insert(key.clone(), self.keys.len());
                self.keys.push(key);
                self.trips_for_key.push(vec![trip_under_pattern]);
            }
        }

        self.trips_processed += 1;
    }

    pub fn distinct_keys(&self) -> usize {
        self.keys.len()
    }

    /// Turns every distinct key into a [`Pattern`].
    ///
    /// Feed supplied patterns are only reused when there is exactly one per
    /// distinct key; they are then matched by position. Otherwise ids count up
    /// from 1 and names are generated.
    pub fn create_pattern_objects(
        self,
        lookup: &HaltLookup,
        feed_patterns: Option<&[FeedPattern]>,
        error_sink: &mut impl ErrorSink,
    ) -> DiscoveredPatterns {
        let use_feed_patterns = can_use_feed_patterns(feed_patterns, self.keys.len());

        info!(
            "Creating {} patterns from {} trips{}",
            self.keys.len(),
            self.trips_processed,
            match use_feed_patterns {
                true => " using feed supplied pattern ids",
                false => "",
            }
        );

        let mut entries = Vec::with_capacity(self.keys.len());

        for (index, (key, trips)) in self
            .keys
            .into_iter()
            .zip(self.trips_for_key)
            .enumerate()
        {
            let associated_shapes: BTreeSet<String> = trips
                .iter()
                .filter_map(|trip| trip.shape_id.clone())
                .collect();

            let (pattern_id, name) = match (use_feed_patterns, feed_patterns) {
                (true, Some(feed_patterns)) => (
                    feed_patterns[index].pattern_id.clone(),
                    feed_patterns[index].name.clone(),
                ),
                // one-based so an id of 0 is never mistaken for a missing id
                _ => ((index + 1).to_string(), None),
            };

            let pattern = Pattern {
                pattern_id,
                route_id: key.route_id.clone(),
                name,
                direction_id: trips.first().and_then(|trip| trip.direction_id),
                ordered_halts: key.ordered_halts(),
                associated_trips: trips.into_iter().map(|trip| trip.trip_id).collect(),
                associated_shapes,
            };

            if pattern.associated_shapes.len() > 1 {
                error_sink.store_error(NewGtfsError {
                    entity_type: "pattern",
                    entity_id: pattern.pattern_id.clone(),
                    error_type: ErrorType::MultipleShapesForPattern,
                    bad_value: format!(
                        "[{}]",
                        pattern.associated_shapes.iter().join(", ")
                    ),
                });
            }

            entries.push(DiscoveredPattern { key, pattern });
        }

        if !use_feed_patterns {
            let mut patterns: Vec<&mut Pattern> =
                entries.iter_mut().map(|entry| &mut entry.pattern).collect();
            rename_patterns(&mut patterns, lookup);
        }

        DiscoveredPatterns {
            entries,
            reused_feed_patterns: use_feed_patterns,
        }
    }
}

fn can_use_feed_patterns(feed_patterns: Option<&[FeedPattern]>, distinct_keys: usize) -> bool {
    match feed_patterns {
        Some(feed_patterns) => {
            if feed_patterns.len() != distinct_keys {
                warn!(
                    "Feed supplies {} patterns but {} were found, generating new patterns",
                    feed_patterns.len(),
                    distinct_keys
                );
                return false;
            }
            !feed_patterns.is_empty()
        }
        None => false,
    }
}

/// Groups every trip into patterns in one pass.
pub fn discover_patterns<'a>(
    trips: impl IntoIterator<Item = &'a TripStopTimes>,
    lookup: &HaltLookup,
    feed_patterns: Option<&[FeedPattern]>,
    error_sink: &mut impl ErrorSink,
) -> DiscoveredPatterns {
    let mut finder = PatternFinder::new();

    for trip in trips {
        finder.process_trip(trip);
    }

    finder.create_pattern_objects(lookup, feed_patterns, error_sink)
}
