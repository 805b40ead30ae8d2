// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! SQL for rewriting the stop times of a pattern's trips.
//!
//! Every statement restricts itself to trips whose `pattern_id` is `$1`.
//! Renumbering happens in two steps: affected rows are first parked at
//! `-(new stop_sequence) - 1`, then flipped back with [`unpark_sql`]. A
//! `(trip_id, stop_sequence)` key is checked row by row during an UPDATE, and
//! parked rows never share a sequence with a live one.

fn pattern_trips_join(namespace: &str) -> String {
    format!(
        "FROM {namespace}.trips t WHERE t.trip_id = st.trip_id AND t.pattern_id = $1",
        namespace = namespace
    )
}

fn park_sql(namespace: &str, new_sequence: &str, condition: &str) -> String {
    format!(
        "UPDATE {namespace}.stop_times st SET stop_sequence = -({new_sequence}) - 1 {join} AND {condition}",
        namespace = namespace,
        new_sequence = new_sequence,
        join = pattern_trips_join(namespace),
        condition = condition
    )
}

/// Restores every parked row of the pattern's trips.
pub fn unpark_sql(namespace: &str) -> String {
    format!(
        "UPDATE {namespace}.stop_times st SET stop_sequence = -st.stop_sequence - 1 {join} AND st.stop_sequence < 0",
        namespace = namespace,
        join = pattern_trips_join(namespace)
    )
}

/// Adds `$3` to every stop_sequence at or after `$2`.
pub fn shift_stop_sequences_sql(namespace: &str) -> String {
    park_sql(
        namespace,
        "st.stop_sequence + $3",
        "st.stop_sequence >= $2",
    )
}

/// Moves the row at `$2` (`from`) to `$3` (`to`), sliding the rows in between
/// one place towards `from`.
pub fn move_stop_sequence_sql(namespace: &str, from: i32, to: i32) -> String {
    let (slide, low, high) = match from < to {
        true => ("st.stop_sequence - 1", "$2", "$3"),
        false => ("st.stop_sequence + 1", "$3", "$2"),
    };

    park_sql(
        namespace,
        &format!(
            "CASE WHEN st.stop_sequence = $2 THEN $3 ELSE {} END",
            slide
        ),
        &format!("st.stop_sequence BETWEEN {} AND {}", low, high),
    )
}

/// Deletes the row at `$2`.
pub fn delete_stop_times_sql(namespace: &str) -> String {
    format!(
        "DELETE FROM {namespace}.stop_times st USING {namespace}.trips t \
         WHERE t.trip_id = st.trip_id AND t.pattern_id = $1 AND st.stop_sequence = $2",
        namespace = namespace
    )
}

/// One blank row per trip in `$1`, all at stop_sequence `$2`.
pub fn insert_blank_stop_time_sql(namespace: &str) -> String {
    format!(
        "INSERT INTO {}.stop_times (trip_id, stop_sequence, stop_id, location_id, location_group_id, \
         pickup_type, drop_off_type, timepoint, stop_headsign, shape_dist_traveled, \
         continuous_pickup, continuous_drop_off, pickup_booking_rule_id, drop_off_booking_rule_id) \
         SELECT trip_id, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14 \
         FROM unnest($1::text[]) AS trip_id",
        namespace
    )
}

pub fn trip_ids_for_pattern_sql(namespace: &str) -> String {
    format!(
        "SELECT trip_id FROM {}.trips WHERE pattern_id = $1 ORDER BY trip_id",
        namespace
    )
}

pub fn stop_time_seeds_sql(namespace: &str) -> String {
    format!(
        "SELECT st.trip_id, st.arrival_time, st.departure_time, \
         st.start_pickup_drop_off_window, st.end_pickup_drop_off_window \
         FROM {namespace}.stop_times st JOIN {namespace}.trips t ON t.trip_id = st.trip_id \
         WHERE t.pattern_id = $1 AND st.stop_sequence = $2 ORDER BY st.trip_id",
        namespace = namespace
    )
}

/// Sets a pair of time columns from unnested `(trip_id, stop_sequence,
/// first, second)` arrays.
pub fn update_times_sql(namespace: &str, first_column: &str, second_column: &str) -> String {
    format!(
        "UPDATE {namespace}.stop_times st SET {first} = u.first_time, {second} = u.second_time \
         FROM unnest($1::text[], $2::integer[], $3::integer[], $4::integer[]) \
         AS u(trip_id, stop_sequence, first_time, second_time) \
         WHERE st.trip_id = u.trip_id AND st.stop_sequence = u.stop_sequence",
        namespace = namespace,
        first = first_column,
        second = second_column
    )
}
