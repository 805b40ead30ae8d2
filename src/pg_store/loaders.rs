// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Reads a loaded feed back out of its schema for pattern discovery.

use crate::patterns::{
    FeedPattern, HaltLookup, HaltRef, LocationGroupInfo, LocationInfo, PatternError, StopInfo,
    StopTimeRecord, TripStopTimes,
};
use crate::postgres_tools::Namespace;
use ahash::AHashMap;
use diesel::QueryableByName;
use diesel::sql_types::{Bool, Double, Integer, Nullable, SmallInt, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::cmp::Ordering;
use tracing::info;

#[derive(QueryableByName)]
struct TripRow {
    #[diesel(sql_type = Text)]
    trip_id: String,
    #[diesel(sql_type = Text)]
    route_id: String,
    #[diesel(sql_type = Nullable<Text>)]
    shape_id: Option<String>,
    #[diesel(sql_type = Nullable<SmallInt>)]
    direction_id: Option<i16>,
}

#[derive(QueryableByName)]
struct StopTimeRow {
    #[diesel(sql_type = Text)]
    trip_id: String,
    #[diesel(sql_type = Integer)]
    stop_sequence: i32,
    #[diesel(sql_type = Nullable<Text>)]
    stop_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    location_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    location_group_id: Option<String>,
    #[diesel(sql_type = Nullable<Integer>)]
    arrival_time: Option<i32>,
    #[diesel(sql_type = Nullable<Integer>)]
    departure_time: Option<i32>,
    #[diesel(sql_type = Nullable<Integer>)]
    start_pickup_drop_off_window: Option<i32>,
    #[diesel(sql_type = Nullable<Integer>)]
    end_pickup_drop_off_window: Option<i32>,
    #[diesel(sql_type = Nullable<SmallInt>)]
    pickup_type: Option<i16>,
    #[diesel(sql_type = Nullable<SmallInt>)]
    drop_off_type: Option<i16>,
    #[diesel(sql_type = Nullable<SmallInt>)]
    timepoint: Option<i16>,
    #[diesel(sql_type = Nullable<Text>)]
    stop_headsign: Option<String>,
    #[diesel(sql_type = Nullable<Double>)]
    shape_dist_traveled: Option<f64>,
    #[diesel(sql_type = Nullable<SmallInt>)]
    continuous_pickup: Option<i16>,
    #[diesel(sql_type = Nullable<SmallInt>)]
    continuous_drop_off: Option<i16>,
    #[diesel(sql_type = Nullable<Text>)]
    pickup_booking_rule_id: Option<String>,
    #[diesel(sql_type = Nullable<Text>)]
    drop_off_booking_rule_id: Option<String>,
}

impl StopTimeRow {
    fn into_record(self) -> Result<(String, StopTimeRecord), PatternError> {
        let halt = HaltRef::from_ids(
            self.stop_id.as_deref(),
            self.location_id.as_deref(),
            self.location_group_id.as_deref(),
        )
        .ok_or_else(|| PatternError::AmbiguousStopTimeReference {
            trip_id: self.trip_id.clone(),
            stop_sequence: self.stop_sequence,
        })?;

        Ok((
            self.trip_id,
            StopTimeRecord {
                stop_sequence: self.stop_sequence,
                halt,
                arrival_time: self.arrival_time,
                departure_time: self.departure_time,
                start_pickup_drop_off_window: self.start_pickup_drop_off_window,
                end_pickup_drop_off_window: self.end_pickup_drop_off_window,
                pickup_type: self.pickup_type,
                drop_off_type: self.drop_off_type,
                timepoint: self.timepoint,
                stop_headsign: self.stop_headsign,
                shape_dist_traveled: self.shape_dist_traveled,
                continuous_pickup: self.continuous_pickup,
                continuous_drop_off: self.continuous_drop_off,
                pickup_booking_rule_id: self.pickup_booking_rule_id,
                drop_off_booking_rule_id: self.drop_off_booking_rule_id,
            },
        ))
    }
}

#[derive(QueryableByName)]
struct NameRow {
    #[diesel(sql_type = Text)]
    id: String,
    #[diesel(sql_type = Nullable<Text>)]
    name: Option<String>,
}

#[derive(QueryableByName)]
struct ExistsRow {
    #[diesel(sql_type = Bool)]
    present: bool,
}

async fn table_exists(
    conn: &mut AsyncPgConnection,
    namespace: &Namespace,
    table: &str,
) -> Result<bool, PatternError> {
    let row: ExistsRow = diesel::sql_query("SELECT to_regclass($1) IS NOT NULL AS present")
        .bind::<Text, _>(format!("{}.{}", namespace, table))
        .get_result(conn)
        .await?;

    Ok(row.present)
}

async fn load_names(
    conn: &mut AsyncPgConnection,
    namespace: &Namespace,
    table: &str,
    id_column: &str,
    name_column: &str,
) -> Result<Vec<NameRow>, PatternError> {
    if !table_exists(conn, namespace, table).await? {
        return Ok(Vec::new());
    }

    Ok(diesel::sql_query(format!(
        "SELECT {} AS id, {} AS name FROM {}.{}",
        id_column, name_column, namespace, table
    ))
    .load(conn)
    .await?)
}

/// Every trip with its stop times ordered by stop_sequence, trips ordered by
/// trip_id.
pub async fn load_trips(
    conn: &mut AsyncPgConnection,
    namespace: &Namespace,
) -> Result<Vec<TripStopTimes>, PatternError> {
    let trip_rows: Vec<TripRow> = diesel::sql_query(format!(
        "SELECT trip_id, route_id, shape_id, direction_id::smallint AS direction_id \
         FROM {}.trips ORDER BY trip_id",
        namespace
    ))
    .load(conn)
    .await?;

    let stop_time_rows: Vec<StopTimeRow> = diesel::sql_query(format!(
        "SELECT trip_id, stop_sequence, stop_id, location_id, location_group_id, \
         arrival_time, departure_time, start_pickup_drop_off_window, end_pickup_drop_off_window, \
         pickup_type::smallint AS pickup_type, drop_off_type::smallint AS drop_off_type, \
         timepoint::smallint AS timepoint, stop_headsign, shape_dist_traveled, \
         continuous_pickup::smallint AS continuous_pickup, \
         continuous_drop_off::smallint AS continuous_drop_off, \
         pickup_booking_rule_id, drop_off_booking_rule_id \
         FROM {}.stop_times ORDER BY trip_id, stop_sequence",
        namespace
    ))
    .load(conn)
    .await?;

    info!(
        "Loaded {} trips and {} stop times from {}",
        trip_rows.len(),
        stop_time_rows.len(),
        namespace
    );

    let mut stop_times_for_trip: AHashMap<String, Vec<StopTimeRecord>> = AHashMap::new();
    for row in stop_time_rows {
        let (trip_id, record) = row.into_record()?;
        stop_times_for_trip.entry(trip_id).or_default().push(record);
    }

    Ok(trip_rows
        .into_iter()
        .map(|trip| TripStopTimes {
            stop_times: stop_times_for_trip.remove(&trip.trip_id).unwrap_or_default(),
            trip_id: trip.trip_id,
            route_id: trip.route_id,
            shape_id: trip.shape_id,
            direction_id: trip.direction_id,
        })
        .collect())
}

/// Names of stops, flex locations and location groups. Flex tables are
/// optional.
pub async fn load_halt_lookup(
    conn: &mut AsyncPgConnection,
    namespace: &Namespace,
) -> Result<HaltLookup, PatternError> {
    let mut lookup = HaltLookup::default();

    for row in load_names(conn, namespace, "stops", "stop_id", "stop_name").await? {
        lookup.stops.insert(row.id, StopInfo { stop_name: row.name });
    }

    for row in load_names(conn, namespace, "locations", "location_id", "stop_name").await? {
        lookup
            .locations
            .insert(row.id, LocationInfo { stop_name: row.name });
    }

    for row in load_names(
        conn,
        namespace,
        "location_groups",
        "location_group_id",
        "location_group_name",
    )
    .await?
    {
        lookup.location_groups.insert(
            row.id,
            LocationGroupInfo {
                location_group_name: row.name,
            },
        );
    }

    Ok(lookup)
}

/// Numeric ids in numeric order, then any others as text. Row order of an
/// unordered SELECT is not stable, and feeds number patterns "1".."n", which
/// plain text order would put as "1", "10", "2".
pub fn order_feed_patterns(patterns: &mut [FeedPattern]) {
    patterns.sort_by(|a, b| {
        let a_number = a.pattern_id.parse::<u64>().ok();
        let b_number = b.pattern_id.parse::<u64>().ok();

        match (a_number, b_number) {
            (Some(a_number), Some(b_number)) => a_number
                .cmp(&b_number)
                .then_with(|| a.pattern_id.cmp(&b.pattern_id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.pattern_id.cmp(&b.pattern_id),
        }
    });
}

/// The feed's own patterns in [`order_feed_patterns`] order, or `None` when
/// the feed has none.
pub async fn load_feed_patterns(
    conn: &mut AsyncPgConnection,
    namespace: &Namespace,
) -> Result<Option<Vec<FeedPattern>>, PatternError> {
    let rows = load_names(conn, namespace, "patterns", "pattern_id", "name").await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let mut patterns: Vec<FeedPattern> = rows
        .into_iter()
        .map(|row| FeedPattern {
            pattern_id: row.id,
            name: row.name,
        })
        .collect();
    order_feed_patterns(&mut patterns);

    Ok(Some(patterns))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(patterns: &[FeedPattern]) -> Vec<&str> {
        patterns
            .iter()
            .map(|pattern| pattern.pattern_id.as_str())
            .collect()
    }

    #[test]
    fn numeric_pattern_ids_sort_as_numbers() {
        let mut patterns: Vec<FeedPattern> = ["10", "2", "express", "1", "07", "7", "a"]
            .iter()
            .map(|id| FeedPattern {
                pattern_id: id.to_string(),
                name: None,
            })
            .collect();

        order_feed_patterns(&mut patterns);

        assert_eq!(ids(&patterns), vec!["1", "2", "07", "7", "10", "a", "express"]);
    }
}
