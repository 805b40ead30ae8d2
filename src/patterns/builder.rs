// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::finder::DiscoveredPatterns;
use super::key::PatternKey;
use super::store::{BatchTracker, PatternSink, TripPatternStaging};
use super::travel_times::{calculate_dwell_times, calculate_travel_times};
use super::{PatternError, PatternHalt};
use tracing::info;

/// One halt row per position of `key`, with default travel and dwell times
/// taken from the key's representative trip.
pub fn pattern_halts_for_key(pattern_id: &str, key: &PatternKey) -> Vec<PatternHalt> {
    let travel_times = calculate_travel_times(key);
    let dwell_times = calculate_dwell_times(key);

    key.identity()
        .iter()
        .zip(key.payload())
        .enumerate()
        .map(|(i, (identity, payload))| PatternHalt {
            pattern_id: pattern_id.to_string(),
            stop_sequence: i as i32,
            halt: identity.halt.clone(),
            travel_time: travel_times[i],
            dwell_time: dwell_times[i],
            drop_off_type: payload.drop_off_type,
            pickup_type: payload.pickup_type,
            timepoint: payload.timepoint,
            stop_headsign: payload.stop_headsign.clone(),
            shape_dist_traveled: payload.shape_dist_traveled,
            continuous_pickup: payload.continuous_pickup,
            continuous_drop_off: payload.continuous_drop_off,
            pickup_booking_rule_id: payload.pickup_booking_rule_id.clone(),
            drop_off_booking_rule_id: payload.drop_off_booking_rule_id.clone(),
        })
        .collect()
}

/// Writes patterns and their halts, then points every trip at its pattern.
///
/// Trips are only updated after every pattern row exists, and they are
/// updated through one staged bulk assignment rather than row by row.
pub async fn write_patterns<S: PatternSink>(
    sink: &mut S,
    patterns: &DiscoveredPatterns,
    reuse_feed_patterns: bool,
    batch_size: usize,
) -> Result<(), PatternError> {
    sink.prepare_tables(reuse_feed_patterns).await?;

    let mut pattern_batch = BatchTracker::new(batch_size);
    let mut halt_batch = BatchTracker::new(batch_size);
    let mut staging = TripPatternStaging::default();

    for entry in &patterns.entries {
        let pattern = &entry.pattern;

        if !reuse_feed_patterns {
            if let Some(batch) = pattern_batch.add(pattern) {
                sink.insert_patterns(&batch).await?;
            }
        }

        for halt in pattern_halts_for_key(&pattern.pattern_id, &entry.key) {
            if let Some(batch) = halt_batch.add(halt) {
                sink.insert_pattern_halts(&batch).await?;
            }
        }

        for trip_id in &pattern.associated_trips {
            staging.push(trip_id, &pattern.pattern_id);
        }
    }

    let remaining_patterns = pattern_batch.take();
    if !remaining_patterns.is_empty() {
        sink.insert_patterns(&remaining_patterns).await?;
    }

    let remaining_halts = halt_batch.take();
    if !remaining_halts.is_empty() {
        sink.insert_pattern_halts(&remaining_halts).await?;
    }

    info!(
        "Inserted {} patterns and {} pattern halts, assigning {} trips",
        pattern_batch.total(),
        halt_batch.total(),
        staging.len()
    );

    sink.assign_trip_patterns(&staging).await?;
    sink.finalize_tables(reuse_feed_patterns).await?;

    Ok(())
}
