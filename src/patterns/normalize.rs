// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Rewrites stop times of a pattern's trips from the pattern's default
//! travel and dwell times.

use super::store::{DEFAULT_BATCH_SIZE, NormalizedTimes, PatternEditStore, StopTimeUpdate, TripSeed};
use super::{NormalizeError, PatternError, PatternHalt};
use tracing::{debug, info};

/// Clock value a trip's seed contributes, picking the window edge for flex
/// halts.
fn seed_time(seed: &TripSeed, flex: bool, use_departure: bool) -> Option<i32> {
    match (flex, use_departure) {
        (false, true) => seed.departure_time,
        (false, false) => seed.arrival_time,
        (true, true) => seed.end_pickup_drop_off_window,
        (true, false) => seed.start_pickup_drop_off_window,
    }
}

fn times_for(halt: &PatternHalt, arrival: i32, departure: i32) -> NormalizedTimes {
    match halt.is_flex() {
        true => NormalizedTimes::Window {
            start: arrival,
            end: departure,
        },
        false => NormalizedTimes::Fixed {
            arrival_time: arrival,
            departure_time: departure,
        },
    }
}

async fn write_updates<S: PatternEditStore>(
    store: &mut S,
    updates: &[StopTimeUpdate],
) -> Result<usize, PatternError> {
    let mut updated = 0;
    for chunk in updates.chunks(DEFAULT_BATCH_SIZE) {
        updated += store.update_stop_time_times(chunk).await?;
    }
    Ok(updated)
}

/// Recomputes times at and after `begin_stop_sequence` for every trip on the
/// pattern.
///
/// Each trip's clock starts from its own stop time just before
/// `begin_stop_sequence` (its departure, or window end for a flex halt), or
/// from its first arrival when starting at 0. Trips with no time there are
/// left alone. Missing default times count as 0.
pub async fn normalize_from<S: PatternEditStore>(
    store: &mut S,
    begin_stop_sequence: i32,
    pattern_id: &str,
) -> Result<usize, PatternError> {
    let halts = store.pattern_halts(pattern_id).await?;

    let seed_sequence = (begin_stop_sequence - 1).max(0);
    let seed_is_flex = halts
        .iter()
        .find(|halt| halt.stop_sequence == seed_sequence)
        .map(PatternHalt::is_flex)
        .unwrap_or(false);

    let kept: Vec<&PatternHalt> = halts
        .iter()
        .filter(|halt| halt.stop_sequence >= begin_stop_sequence)
        .collect();

    let seeds = store.stop_time_seeds(pattern_id, seed_sequence).await?;
    let mut updates = Vec::with_capacity(seeds.len() * kept.len());

    for seed in &seeds {
        let Some(mut cumulative) = seed_time(seed, seed_is_flex, begin_stop_sequence > 0) else {
            debug!(
                "Trip {} has no time at stop_sequence {}, not normalizing",
                seed.trip_id, seed_sequence
            );
            continue;
        };

        for halt in &kept {
            let arrival = cumulative + halt.travel_time.unwrap_or(0);
            let departure = arrival + halt.dwell_time.unwrap_or(0);
            cumulative = departure;

            updates.push(StopTimeUpdate {
                trip_id: seed.trip_id.clone(),
                stop_sequence: halt.stop_sequence,
                times: times_for(halt, arrival, departure),
            });
        }
    }

    let updated = write_updates(store, &updates).await?;

    info!(
        "Normalized {} stop times on pattern {} from stop_sequence {}",
        updated, pattern_id, begin_stop_sequence
    );

    Ok(updated)
}

/// Travel time from the previous timepoint for every halt of a fixed-stop
/// pattern.
///
/// Timepoints keep their default travel time. Other stops are placed at the
/// constant speed implied by the surrounding timepoints and their
/// shape_dist_traveled.
pub fn interpolated_travel_times(halts: &[PatternHalt]) -> Result<Vec<i32>, NormalizeError> {
    if let Some(flex) = halts.iter().find(|halt| halt.is_flex()) {
        return Err(NormalizeError::FlexHalt(flex.stop_sequence));
    }

    let timepoints: Vec<usize> = (0..halts.len())
        .filter(|&i| halts[i].is_timepoint())
        .collect();

    if timepoints.len() < 2 {
        return Err(NormalizeError::TooFewTimepoints(timepoints.len()));
    }

    let distance = |i: usize| {
        halts[i]
            .shape_dist_traveled
            .ok_or(NormalizeError::MissingShapeDistTraveled(halts[i].stop_sequence))
    };

    for i in 0..halts.len() {
        distance(i)?;
    }

    let mut travel_times = Vec::with_capacity(halts.len());

    for (i, halt) in halts.iter().enumerate() {
        if halt.is_timepoint() {
            let travel_time = match (i, halt.travel_time) {
                (_, Some(travel_time)) => travel_time,
                (0, None) => 0,
                (_, None) => {
                    return Err(NormalizeError::MissingTimepointTravelTime(
                        halt.stop_sequence,
                    ));
                }
            };
            travel_times.push(travel_time);
            continue;
        }

        let previous = timepoints.iter().rev().find(|&&tp| tp < i);
        let next = timepoints.iter().find(|&&tp| tp > i);

        let (Some(&previous), Some(&next)) = (previous, next) else {
            return Err(NormalizeError::OutsideTimepoints(halt.stop_sequence));
        };

        let segment_time = halts[next]
            .travel_time
            .ok_or(NormalizeError::MissingTimepointTravelTime(halts[next].stop_sequence))?;
        let segment_distance = distance(next)? - distance(previous)?;
        let covered = distance(i)? - distance(previous)?;

        let travel_time = match segment_distance > 0.0 && segment_time > 0 {
            true => {
                let speed = segment_distance / f64::from(segment_time);
                (covered / speed).round() as i32
            }
            false => 0,
        };

        travel_times.push(travel_time);
    }

    Ok(travel_times)
}

/// Like [`normalize_from`], but for fixed-stop patterns and optionally
/// interpolating stops between timepoints.
///
/// With interpolation the clock runs from each trip's first arrival so
/// every stop is placed relative to its surrounding timepoints. Timepoints
/// advance the true clock. Interpolated stops are offsets from the previous
/// timepoint's departure and never move later timepoints. Only halts at or
/// after `begin_stop_sequence` are written.
pub async fn normalize_stop_times<S: PatternEditStore>(
    store: &mut S,
    pattern_id: &str,
    begin_stop_sequence: i32,
    interpolate: bool,
) -> Result<usize, PatternError> {
    if !interpolate {
        return normalize_from(store, begin_stop_sequence, pattern_id).await;
    }

    let halts = store.pattern_halts(pattern_id).await?;
    let travel_times = interpolated_travel_times(&halts)?;

    let Some(first) = halts.first() else {
        return Ok(0);
    };

    let seeds = store.stop_time_seeds(pattern_id, first.stop_sequence).await?;
    let mut updates = Vec::new();

    for seed in &seeds {
        let Some(mut cumulative) = seed.arrival_time else {
            debug!("Trip {} has no first arrival, not interpolating", seed.trip_id);
            continue;
        };

        // departure of the last timepoint, which interpolated stops count from
        let mut timepoint_departure = cumulative;

        for (halt, travel_time) in halts.iter().zip(&travel_times) {
            let dwell_time = halt.dwell_time.unwrap_or(0);

            let (arrival, departure) = match halt.is_timepoint() {
                true => {
                    let arrival = cumulative + travel_time;
                    let departure = arrival + dwell_time;
                    cumulative = departure;
                    timepoint_departure = departure;
                    (arrival, departure)
                }
                false => {
                    let arrival = timepoint_departure + travel_time;
                    (arrival, arrival + dwell_time)
                }
            };

            if halt.stop_sequence >= begin_stop_sequence {
                updates.push(StopTimeUpdate {
                    trip_id: seed.trip_id.clone(),
                    stop_sequence: halt.stop_sequence,
                    times: times_for(halt, arrival, departure),
                });
            }
        }
    }

    let updated = write_updates(store, &updates).await?;

    info!(
        "Interpolated {} stop times on pattern {} from stop_sequence {}",
        updated, pattern_id, begin_stop_sequence
    );

    Ok(updated)
}
