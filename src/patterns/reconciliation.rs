// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Carries an edit of a pattern's halt list into the stop times of every trip
//! on that pattern.
//!
//! Only one structural change is accepted per edit: a single added stop, a
//! single removed stop, a single moved stop, or any number of stops appended
//! at the end. Anything else is rejected with a [`ReconcileError`] before a
//! row is touched.

use super::normalize::{interpolated_travel_times, normalize_stop_times};
use super::store::PatternEditStore;
use super::{PatternError, PatternHalt, ReconcileError};
use tracing::{debug, info};

/// The single change found between the stored halts and an edited list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatternDiff {
    NoChange,
    AddOne { index: usize },
    Delete { index: usize },
    /// The halt at `from` now sits at `to`.
    Transpose { from: usize, to: usize },
    /// `count` halts appended after the `start` original ones.
    AddMultiple { start: usize, count: usize },
}

impl PatternDiff {
    pub fn changed(&self) -> bool {
        *self != PatternDiff::NoChange
    }

    /// First stop_sequence whose times may need recomputing after the change.
    pub fn first_changed_sequence(&self) -> Option<i32> {
        match *self {
            PatternDiff::NoChange => None,
            PatternDiff::AddOne { index } | PatternDiff::Delete { index } => Some(index as i32),
            PatternDiff::Transpose { from, to } => Some(from.min(to) as i32),
            PatternDiff::AddMultiple { start, .. } => Some(start as i32),
        }
    }
}

/// First index where the lists disagree, counting running off the end of
/// either list as a disagreement.
fn first_difference(original: &[&str], new: &[&str]) -> usize {
    (0..original.len().max(new.len()))
        .find(|&i| original.get(i) != new.get(i))
        .unwrap_or(original.len().max(new.len()))
}

fn classify_add_one(original: &[&str], new: &[&str]) -> Result<PatternDiff, ReconcileError> {
    let index = first_difference(original, new);

    // everything after the inserted stop is the original, shifted right by one
    if (index..original.len()).any(|i| new[i + 1] != original[i]) {
        return Err(ReconcileError::MultipleDifferences("addition"));
    }

    Ok(PatternDiff::AddOne { index })
}

fn classify_delete(original: &[&str], new: &[&str]) -> Result<PatternDiff, ReconcileError> {
    let index = first_difference(original, new);

    if (index..new.len()).any(|i| new[i] != original[i + 1]) {
        return Err(ReconcileError::MultipleDifferences("deletion"));
    }

    Ok(PatternDiff::Delete { index })
}

fn classify_transpose(original: &[&str], new: &[&str]) -> Result<PatternDiff, ReconcileError> {
    let first_diff = first_difference(original, new);
    let last_diff = (0..original.len())
        .rev()
        .find(|&i| original[i] != new[i])
        .unwrap_or(first_diff);

    if first_diff == last_diff {
        return Err(ReconcileError::Substitution);
    }

    if original[first_diff] == new[last_diff] {
        // moved toward the end, the interior slides back one position
        if (first_diff..last_diff).any(|i| new[i] != original[i + 1]) {
            return Err(ReconcileError::InteriorChanged {
                from: first_diff,
                to: last_diff,
            });
        }

        return Ok(PatternDiff::Transpose {
            from: first_diff,
            to: last_diff,
        });
    }

    if new[first_diff] == original[last_diff] {
        if (first_diff + 1..=last_diff).any(|i| new[i] != original[i - 1]) {
            return Err(ReconcileError::InteriorChanged {
                from: last_diff,
                to: first_diff,
            });
        }

        return Ok(PatternDiff::Transpose {
            from: last_diff,
            to: first_diff,
        });
    }

    Err(ReconcileError::NotASimpleMove)
}

/// Compares the reference ids of the stored halts with an edited list.
///
/// Does not touch storage, so an edit can be validated before a transaction
/// is opened.
pub fn classify(
    original: &[&str],
    new: &[&str],
    has_trips: bool,
) -> Result<PatternDiff, ReconcileError> {
    if !has_trips || original == new {
        return Ok(PatternDiff::NoChange);
    }

    let size_diff = new.len() as i64 - original.len() as i64;

    match size_diff {
        1 => classify_add_one(original, new),
        -1 => classify_delete(original, new),
        0 => classify_transpose(original, new),
        size_diff if size_diff > 1 => {
            if new[..original.len()] != *original {
                return Err(ReconcileError::NotAppendedAtEnd);
            }
            Ok(PatternDiff::AddMultiple {
                start: original.len(),
                count: size_diff as usize,
            })
        }
        size_diff => Err(ReconcileError::UnsupportedSizeChange(size_diff)),
    }
}

/// Applies `diff` to the stop times of `trip_ids`. `new_halts` must already be
/// numbered densely from 0.
pub async fn apply<S: PatternEditStore>(
    store: &mut S,
    pattern_id: &str,
    diff: PatternDiff,
    trip_ids: &[String],
    new_halts: &[PatternHalt],
) -> Result<(), PatternError> {
    match diff {
        PatternDiff::NoChange => {}
        PatternDiff::AddOne { index } => {
            // make room before inserting so sequences never collide
            let shifted = store
                .shift_stop_sequences(pattern_id, index as i32, 1)
                .await?;
            let inserted = store
                .insert_blank_stop_times(trip_ids, &[new_halts[index].blank_stop_time()])
                .await?;
            debug!(
                "Pattern {}: shifted {} stop times, inserted {} at sequence {}",
                pattern_id, shifted, inserted, index
            );
        }
        PatternDiff::Delete { index } => {
            let deleted = store.delete_stop_times(pattern_id, index as i32).await?;
            let shifted = store
                .shift_stop_sequences(pattern_id, index as i32 + 1, -1)
                .await?;
            debug!(
                "Pattern {}: deleted {} stop times at sequence {}, shifted {}",
                pattern_id, deleted, index, shifted
            );
        }
        PatternDiff::Transpose { from, to } => {
            let moved = store
                .move_stop_sequence(pattern_id, from as i32, to as i32)
                .await?;
            debug!(
                "Pattern {}: moved sequence {} to {} across {} stop times",
                pattern_id, from, to, moved
            );
        }
        PatternDiff::AddMultiple { start, count } => {
            let blanks: Vec<_> = new_halts[start..start + count]
                .iter()
                .map(PatternHalt::blank_stop_time)
                .collect();
            let inserted = store.insert_blank_stop_times(trip_ids, &blanks).await?;
            debug!(
                "Pattern {}: appended {} stop times from sequence {}",
                pattern_id, inserted, start
            );
        }
    }

    Ok(())
}

/// Renumbers an edited halt list for `pattern_id`, positions counting from 0.
pub fn renumber_halts(pattern_id: &str, halts: &[PatternHalt]) -> Vec<PatternHalt> {
    halts
        .iter()
        .enumerate()
        .map(|(i, halt)| PatternHalt {
            pattern_id: pattern_id.to_string(),
            stop_sequence: i as i32,
            ..halt.clone()
        })
        .collect()
}

/// Replaces the halts of `pattern_id` with `new_halts` and rewrites the stop
/// times of every trip on the pattern to match. Returns the change that was
/// applied.
///
/// Callers run this inside a transaction and must not reconcile the same
/// pattern concurrently.
pub async fn reconcile_pattern<S: PatternEditStore>(
    store: &mut S,
    pattern_id: &str,
    new_halts: &[PatternHalt],
) -> Result<PatternDiff, PatternError> {
    let original_halts = store.pattern_halts(pattern_id).await?;
    let trip_ids = store.trip_ids_for_pattern(pattern_id).await?;

    if original_halts.is_empty() && trip_ids.is_empty() {
        return Err(PatternError::UnknownPattern(pattern_id.to_string()));
    }

    let original: Vec<&str> = original_halts
        .iter()
        .map(|halt| halt.halt.reference_id())
        .collect();
    let new: Vec<&str> = new_halts
        .iter()
        .map(|halt| halt.halt.reference_id())
        .collect();

    let diff = classify(&original, &new, !trip_ids.is_empty())?;
    let new_halts = renumber_halts(pattern_id, new_halts);

    info!(
        "Reconciling pattern {} across {} trips: {:?}",
        pattern_id,
        trip_ids.len(),
        diff
    );

    apply(store, pattern_id, diff, &trip_ids, &new_halts).await?;
    store.replace_pattern_halts(pattern_id, &new_halts).await?;

    Ok(diff)
}

/// Reconciles `pattern_id` and then recomputes stop times from the first
/// changed position. Returns the change and the number of stop times
/// rewritten.
///
/// Interpolation preconditions are checked against the edited halts before
/// anything is written. Run inside one transaction so a failure in either
/// step leaves no partial edit behind.
pub async fn reconcile_and_normalize<S: PatternEditStore>(
    store: &mut S,
    pattern_id: &str,
    new_halts: &[PatternHalt],
    interpolate: bool,
) -> Result<(PatternDiff, usize), PatternError> {
    if interpolate {
        interpolated_travel_times(&renumber_halts(pattern_id, new_halts))?;
    }

    let diff = reconcile_pattern(store, pattern_id, new_halts).await?;

    let updated = match diff.first_changed_sequence() {
        Some(begin) => normalize_stop_times(store, pattern_id, begin, interpolate).await?,
        None => 0,
    };

    Ok((diff, updated))
}
