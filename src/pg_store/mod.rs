// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Postgres storage for patterns, one schema per feed.
//!
//! Multi-row writes bind one array per column and expand them with `unnest`,
//! so a batch is a single statement no matter how many rows it carries.

pub mod loaders;
pub mod statements;

use crate::feed_tables::{FeedTables, HaltTableSpec};
use crate::patterns::builder::write_patterns;
use crate::patterns::finder::{DiscoveredPatterns, discover_patterns};
use crate::patterns::normalize;
use crate::patterns::reconciliation::{self, PatternDiff};
use crate::patterns::store::{
    NormalizedTimes, PatternEditStore, PatternSink, StopTimeUpdate, TripPatternStaging, TripSeed,
};
use crate::patterns::{
    ErrorSink, HaltRef, Pattern, PatternError, PatternHalt, StopTimeRecord,
};
use crate::postgres_tools::Namespace;
use diesel::QueryableByName;
use diesel::sql_types::{Array, Double, Integer, Nullable, SmallInt, Text};
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use tracing::info;

const STAGING_TABLE: &str = "pattern_for_trips";

#[derive(QueryableByName)]
struct HaltRow {
    #[diesel(sql_type = Text)]
    pattern_id: String,
    #[diesel(sql_type = Integer)]
    stop_sequence: i32,
    #[diesel(sql_type = Text)]
    reference_id: String,
    #[diesel(sql_type = Nullable<Integer>)]
    travel_time: Option<i32>,
    #[diesel(sql_type = Nullable<Integer>)]
    dwell_time: Option<i32>,
    #[diesel(sql_type = Nullable<SmallInt>)]
    drop_off_type: Option<i16>,
    #[diesel(sql_type = Nullable<SmallInt>)]
    pickup_type: Option<i16>,
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

impl HaltRow {
    fn into_halt(self, make_ref: fn(String) -> HaltRef) -> PatternHalt {
        PatternHalt {
            pattern_id: self.pattern_id,
            stop_sequence: self.stop_sequence,
            halt: make_ref(self.reference_id),
            travel_time: self.travel_time,
            dwell_time: self.dwell_time,
            drop_off_type: self.drop_off_type,
            pickup_type: self.pickup_type,
            timepoint: self.timepoint,
            stop_headsign: self.stop_headsign,
            shape_dist_traveled: self.shape_dist_traveled,
            continuous_pickup: self.continuous_pickup,
            continuous_drop_off: self.continuous_drop_off,
            pickup_booking_rule_id: self.pickup_booking_rule_id,
            drop_off_booking_rule_id: self.drop_off_booking_rule_id,
        }
    }
}

#[derive(QueryableByName)]
struct TripIdRow {
    #[diesel(sql_type = Text)]
    trip_id: String,
}

#[derive(QueryableByName)]
struct SeedRow {
    #[diesel(sql_type = Text)]
    trip_id: String,
    #[diesel(sql_type = Nullable<Integer>)]
    arrival_time: Option<i32>,
    #[diesel(sql_type = Nullable<Integer>)]
    departure_time: Option<i32>,
    #[diesel(sql_type = Nullable<Integer>)]
    start_pickup_drop_off_window: Option<i32>,
    #[diesel(sql_type = Nullable<Integer>)]
    end_pickup_drop_off_window: Option<i32>,
}

/// Pattern halts split into one vector per column, in table field order.
#[derive(Default)]
struct HaltColumns {
    pattern_id: Vec<String>,
    stop_sequence: Vec<i32>,
    reference_id: Vec<String>,
    travel_time: Vec<Option<i32>>,
    dwell_time: Vec<Option<i32>>,
    drop_off_type: Vec<Option<i16>>,
    pickup_type: Vec<Option<i16>>,
    timepoint: Vec<Option<i16>>,
    stop_headsign: Vec<Option<String>>,
    shape_dist_traveled: Vec<Option<f64>>,
    continuous_pickup: Vec<Option<i16>>,
    continuous_drop_off: Vec<Option<i16>>,
    pickup_booking_rule_id: Vec<Option<String>>,
    drop_off_booking_rule_id: Vec<Option<String>>,
}

impl HaltColumns {
    fn push(&mut self, halt: &PatternHalt) {
        self.pattern_id.push(halt.pattern_id.clone());
        self.stop_sequence.push(halt.stop_sequence);
        self.reference_id.push(halt.halt.reference_id().to_string());
        self.travel_time.push(halt.travel_time);
        self.dwell_time.push(halt.dwell_time);
        self.drop_off_type.push(halt.drop_off_type);
        self.pickup_type.push(halt.pickup_type);
        self.timepoint.push(halt.timepoint);
        self.stop_headsign.push(halt.stop_headsign.clone());
        self.shape_dist_traveled.push(halt.shape_dist_traveled);
        self.continuous_pickup.push(halt.continuous_pickup);
        self.continuous_drop_off.push(halt.continuous_drop_off);
        self.pickup_booking_rule_id
            .push(halt.pickup_booking_rule_id.clone());
        self.drop_off_booking_rule_id
            .push(halt.drop_off_booking_rule_id.clone());
    }

    fn is_empty(&self) -> bool {
        self.pattern_id.is_empty()
    }
}

/// A feed schema seen through one connection, usually inside a transaction.
pub struct PgFeedStore<'a> {
    conn: &'a mut AsyncPgConnection,
    namespace: &'a Namespace,
    tables: &'a FeedTables,
    batch_size: usize,
}

impl<'a> PgFeedStore<'a> {
    pub fn new(
        conn: &'a mut AsyncPgConnection,
        namespace: &'a Namespace,
        tables: &'a FeedTables,
        batch_size: usize,
    ) -> PgFeedStore<'a> {
        PgFeedStore {
            conn,
            namespace,
            tables,
            batch_size: batch_size.max(1),
        }
    }

    fn trips(&self) -> String {
        format!("{}.trips", self.namespace)
    }

    async fn execute_raw(&mut self, sql: &str) -> Result<usize, PatternError> {
        Ok(diesel::sql_query(sql).execute(self.conn).await?)
    }

    async fn unpark(&mut self, pattern_id: &str) -> Result<usize, PatternError> {
        Ok(diesel::sql_query(statements::unpark_sql(self.namespace.as_str()))
            .bind::<Text, _>(pattern_id)
            .execute(self.conn)
            .await?)
    }

    async fn insert_halt_columns(
        &mut self,
        spec: &HaltTableSpec,
        columns: HaltColumns,
    ) -> Result<(), PatternError> {
        if columns.is_empty() {
            return Ok(());
        }

        diesel::sql_query(spec.table.unnest_insert_sql(self.namespace.as_str()))
            .bind::<Array<Text>, _>(columns.pattern_id)
            .bind::<Array<Integer>, _>(columns.stop_sequence)
            .bind::<Array<Text>, _>(columns.reference_id)
            .bind::<Array<Nullable<Integer>>, _>(columns.travel_time)
            .bind::<Array<Nullable<Integer>>, _>(columns.dwell_time)
            .bind::<Array<Nullable<SmallInt>>, _>(columns.drop_off_type)
            .bind::<Array<Nullable<SmallInt>>, _>(columns.pickup_type)
            .bind::<Array<Nullable<SmallInt>>, _>(columns.timepoint)
            .bind::<Array<Nullable<Text>>, _>(columns.stop_headsign)
            .bind::<Array<Nullable<Double>>, _>(columns.shape_dist_traveled)
            .bind::<Array<Nullable<SmallInt>>, _>(columns.continuous_pickup)
            .bind::<Array<Nullable<SmallInt>>, _>(columns.continuous_drop_off)
            .bind::<Array<Nullable<Text>>, _>(columns.pickup_booking_rule_id)
            .bind::<Array<Nullable<Text>>, _>(columns.drop_off_booking_rule_id)
            .execute(self.conn)
            .await?;

        Ok(())
    }

    async fn insert_blank_stop_time(
        &mut self,
        trip_ids: &[String],
        record: &StopTimeRecord,
    ) -> Result<usize, PatternError> {
        let sql = statements::insert_blank_stop_time_sql(self.namespace.as_str());

        let mut inserted = 0;
        for chunk in trip_ids.chunks(self.batch_size) {
            inserted += diesel::sql_query(&sql)
                .bind::<Array<Text>, _>(chunk.to_vec())
                .bind::<Integer, _>(record.stop_sequence)
                .bind::<Nullable<Text>, _>(record.halt.stop_id())
                .bind::<Nullable<Text>, _>(record.halt.location_id())
                .bind::<Nullable<Text>, _>(record.halt.location_group_id())
                .bind::<Nullable<SmallInt>, _>(record.pickup_type)
                .bind::<Nullable<SmallInt>, _>(record.drop_off_type)
                .bind::<Nullable<SmallInt>, _>(record.timepoint)
                .bind::<Nullable<Text>, _>(record.stop_headsign.as_deref())
                .bind::<Nullable<Double>, _>(record.shape_dist_traveled)
                .bind::<Nullable<SmallInt>, _>(record.continuous_pickup)
                .bind::<Nullable<SmallInt>, _>(record.continuous_drop_off)
                .bind::<Nullable<Text>, _>(record.pickup_booking_rule_id.as_deref())
                .bind::<Nullable<Text>, _>(record.drop_off_booking_rule_id.as_deref())
                .execute(self.conn)
                .await?;
        }

        Ok(inserted)
    }

    async fn update_times(
        &mut self,
        updates: &[&StopTimeUpdate],
        first_column: &str,
        second_column: &str,
    ) -> Result<usize, PatternError> {
        let sql = statements::update_times_sql(self.namespace.as_str(), first_column, second_column);

        let mut updated = 0;
        for chunk in updates.chunks(self.batch_size) {
            let mut trip_ids = Vec::with_capacity(chunk.len());
            let mut stop_sequences = Vec::with_capacity(chunk.len());
            let mut first_times = Vec::with_capacity(chunk.len());
            let mut second_times = Vec::with_capacity(chunk.len());

            for update in chunk {
                let (first, second) = match update.times {
                    NormalizedTimes::Fixed {
                        arrival_time,
                        departure_time,
                    } => (arrival_time, departure_time),
                    NormalizedTimes::Window { start, end } => (start, end),
                };
                trip_ids.push(update.trip_id.clone());
                stop_sequences.push(update.stop_sequence);
                first_times.push(first);
                second_times.push(second);
            }

            updated += diesel::sql_query(&sql)
                .bind::<Array<Text>, _>(trip_ids)
                .bind::<Array<Integer>, _>(stop_sequences)
                .bind::<Array<Integer>, _>(first_times)
                .bind::<Array<Integer>, _>(second_times)
                .execute(self.conn)
                .await?;
        }

        Ok(updated)
    }
}

impl PatternSink for PgFeedStore<'_> {
    async fn prepare_tables(&mut self, reuse_feed_patterns: bool) -> Result<(), PatternError> {
        let namespace = self.namespace;
        let tables = self.tables;

        self.execute_raw(&format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS pattern_id text",
            self.trips()
        ))
        .await?;

        if !reuse_feed_patterns {
            self.execute_raw(&tables.patterns.drop_sql(namespace.as_str())).await?;
            self.execute_raw(&tables.patterns.create_sql(namespace.as_str()))
                .await?;
        }

        for spec in tables.halt_tables() {
            self.execute_raw(&spec.table.drop_sql(namespace.as_str())).await?;
            self.execute_raw(&spec.table.create_sql(namespace.as_str())).await?;
        }

        Ok(())
    }

    async fn insert_patterns(&mut self, patterns: &[&Pattern]) -> Result<(), PatternError> {
        if patterns.is_empty() {
            return Ok(());
        }

        let pattern_ids: Vec<String> = patterns.iter().map(|p| p.pattern_id.clone()).collect();
        let route_ids: Vec<String> = patterns.iter().map(|p| p.route_id.clone()).collect();
        let names: Vec<Option<String>> = patterns.iter().map(|p| p.name.clone()).collect();
        let direction_ids: Vec<Option<i16>> = patterns.iter().map(|p| p.direction_id).collect();
        let shape_ids: Vec<Option<String>> = patterns
            .iter()
            .map(|p| p.shape_id().map(String::from))
            .collect();

        diesel::sql_query(
            self.tables
                .patterns
                .unnest_insert_sql(self.namespace.as_str()),
        )
        .bind::<Array<Text>, _>(pattern_ids)
        .bind::<Array<Text>, _>(route_ids)
        .bind::<Array<Nullable<Text>>, _>(names)
        .bind::<Array<Nullable<SmallInt>>, _>(direction_ids)
        .bind::<Array<Nullable<Text>>, _>(shape_ids)
        .execute(self.conn)
        .await?;

        Ok(())
    }

    async fn insert_pattern_halts(&mut self, halts: &[PatternHalt]) -> Result<(), PatternError> {
        let tables = self.tables;
        let mut stops = HaltColumns::default();
        let mut locations = HaltColumns::default();
        let mut location_groups = HaltColumns::default();

        for halt in halts {
            match halt.halt {
                HaltRef::Stop(_) => stops.push(halt),
                HaltRef::Location(_) => locations.push(halt),
                HaltRef::LocationGroup(_) => location_groups.push(halt),
            }
        }

        self.insert_halt_columns(&tables.pattern_stops, stops)
            .await?;
        self.insert_halt_columns(&tables.pattern_locations, locations)
            .await?;
        self.insert_halt_columns(&tables.pattern_location_group_stops, location_groups)
            .await?;

        Ok(())
    }

    async fn assign_trip_patterns(
        &mut self,
        staging: &TripPatternStaging,
    ) -> Result<(), PatternError> {
        self.execute_raw(&format!(
            "CREATE TEMP TABLE {} (trip_id text, pattern_id text) ON COMMIT DROP",
            STAGING_TABLE
        ))
        .await?;

        let insert = format!(
            "INSERT INTO {} (trip_id, pattern_id) SELECT * FROM unnest($1::text[], $2::text[])",
            STAGING_TABLE
        );

        for (trip_ids, pattern_ids) in staging.chunks(self.batch_size) {
            diesel::sql_query(&insert)
                .bind::<Array<Text>, _>(trip_ids.to_vec())
                .bind::<Array<Text>, _>(pattern_ids.to_vec())
                .execute(self.conn)
                .await?;
        }

        self.execute_raw(&format!(
            "CREATE INDEX {table}_trip_id_idx ON {table} (trip_id)",
            table = STAGING_TABLE
        ))
        .await?;

        let updated = self
            .execute_raw(&format!(
                "UPDATE {} t SET pattern_id = p.pattern_id FROM {} p WHERE t.trip_id = p.trip_id",
                self.trips(),
                STAGING_TABLE
            ))
            .await?;

        self.execute_raw(&format!("DROP TABLE {}", STAGING_TABLE))
            .await?;

        info!(
            "Assigned patterns to {} trips in {}",
            updated, self.namespace
        );

        Ok(())
    }

    async fn finalize_tables(&mut self, reuse_feed_patterns: bool) -> Result<(), PatternError> {
        let namespace = self.namespace;
        let tables = self.tables;

        let mut statements = Vec::new();
        if !reuse_feed_patterns {
            statements.extend(tables.patterns.key_sql(namespace.as_str()));
        }
        for spec in tables.halt_tables() {
            statements.extend(spec.table.key_sql(namespace.as_str()));
        }
        statements.push(format!(
            "CREATE INDEX IF NOT EXISTS trips_pattern_id_idx ON {} (pattern_id)",
            self.trips()
        ));

        for statement in statements {
            self.execute_raw(&statement).await?;
        }

        Ok(())
    }
}

impl PatternEditStore for PgFeedStore<'_> {
    async fn pattern_halts(&mut self, pattern_id: &str) -> Result<Vec<PatternHalt>, PatternError> {
        let tables = self.tables;
        let namespace = self.namespace;
        let sources: [(&HaltTableSpec, fn(String) -> HaltRef); 3] = [
            (&tables.pattern_stops, HaltRef::Stop),
            (&tables.pattern_locations, HaltRef::Location),
            (&tables.pattern_location_group_stops, HaltRef::LocationGroup),
        ];

        let mut halts: Vec<PatternHalt> = Vec::new();

        for (spec, make_ref) in sources {
            let rows: Vec<HaltRow> = diesel::sql_query(spec.select_sql(namespace.as_str()))
                .bind::<Text, _>(pattern_id)
                .load(self.conn)
                .await?;
            halts.extend(rows.into_iter().map(|row| row.into_halt(make_ref)));
        }

        halts.sort_by_key(|halt| halt.stop_sequence);

        // one position can only be filled by one of the three tables
        if let Some(pair) = halts
            .windows(2)
            .find(|pair| pair[0].stop_sequence == pair[1].stop_sequence)
        {
            return Err(PatternError::AmbiguousHaltReference {
                pattern_id: pattern_id.to_string(),
                stop_sequence: pair[0].stop_sequence,
            });
        }

        Ok(halts)
    }

    async fn trip_ids_for_pattern(&mut self, pattern_id: &str) -> Result<Vec<String>, PatternError> {
        let rows: Vec<TripIdRow> =
            diesel::sql_query(statements::trip_ids_for_pattern_sql(self.namespace.as_str()))
                .bind::<Text, _>(pattern_id)
                .load(self.conn)
                .await?;

        Ok(rows.into_iter().map(|row| row.trip_id).collect())
    }

    async fn shift_stop_sequences(
        &mut self,
        pattern_id: &str,
        from_sequence: i32,
        delta: i32,
    ) -> Result<usize, PatternError> {
        let shifted =
            diesel::sql_query(statements::shift_stop_sequences_sql(self.namespace.as_str()))
                .bind::<Text, _>(pattern_id)
                .bind::<Integer, _>(from_sequence)
                .bind::<Integer, _>(delta)
                .execute(self.conn)
                .await?;

        self.unpark(pattern_id).await?;

        Ok(shifted)
    }

    async fn delete_stop_times(
        &mut self,
        pattern_id: &str,
        stop_sequence: i32,
    ) -> Result<usize, PatternError> {
        Ok(
            diesel::sql_query(statements::delete_stop_times_sql(self.namespace.as_str()))
                .bind::<Text, _>(pattern_id)
                .bind::<Integer, _>(stop_sequence)
                .execute(self.conn)
                .await?,
        )
    }

    async fn insert_blank_stop_times(
        &mut self,
        trip_ids: &[String],
        stop_times: &[StopTimeRecord],
    ) -> Result<usize, PatternError> {
        let mut inserted = 0;
        for record in stop_times {
            inserted += self.insert_blank_stop_time(trip_ids, record).await?;
        }
        Ok(inserted)
    }

    async fn move_stop_sequence(
        &mut self,
        pattern_id: &str,
        from: i32,
        to: i32,
    ) -> Result<usize, PatternError> {
        let moved = diesel::sql_query(statements::move_stop_sequence_sql(
            self.namespace.as_str(),
            from,
            to,
        ))
        .bind::<Text, _>(pattern_id)
        .bind::<Integer, _>(from)
        .bind::<Integer, _>(to)
        .execute(self.conn)
        .await?;

        self.unpark(pattern_id).await?;

        Ok(moved)
    }

    async fn replace_pattern_halts(
        &mut self,
        pattern_id: &str,
        halts: &[PatternHalt],
    ) -> Result<(), PatternError> {
        let namespace = self.namespace;
        let tables = self.tables;

        for spec in tables.halt_tables() {
            diesel::sql_query(format!(
                "DELETE FROM {} WHERE pattern_id = $1",
                spec.table.qualified_name(namespace.as_str())
            ))
            .bind::<Text, _>(pattern_id)
            .execute(self.conn)
            .await?;
        }

        self.insert_pattern_halts(halts).await
    }

    async fn stop_time_seeds(
        &mut self,
        pattern_id: &str,
        stop_sequence: i32,
    ) -> Result<Vec<TripSeed>, PatternError> {
        let rows: Vec<SeedRow> =
            diesel::sql_query(statements::stop_time_seeds_sql(self.namespace.as_str()))
                .bind::<Text, _>(pattern_id)
                .bind::<Integer, _>(stop_sequence)
                .load(self.conn)
                .await?;

        Ok(rows
            .into_iter()
            .map(|row| TripSeed {
                trip_id: row.trip_id,
                arrival_time: row.arrival_time,
                departure_time: row.departure_time,
                start_pickup_drop_off_window: row.start_pickup_drop_off_window,
                end_pickup_drop_off_window: row.end_pickup_drop_off_window,
            })
            .collect())
    }

    async fn update_stop_time_times(
        &mut self,
        updates: &[StopTimeUpdate],
    ) -> Result<usize, PatternError> {
        let (fixed, windows): (Vec<&StopTimeUpdate>, Vec<&StopTimeUpdate>) = updates
            .iter()
            .partition(|update| matches!(update.times, NormalizedTimes::Fixed { .. }));

        let mut updated = 0;
        if !fixed.is_empty() {
            updated += self
                .update_times(&fixed, "arrival_time", "departure_time")
                .await?;
        }
        if !windows.is_empty() {
            updated += self
                .update_times(
                    &windows,
                    "start_pickup_drop_off_window",
                    "end_pickup_drop_off_window",
                )
                .await?;
        }

        Ok(updated)
    }
}

/// Writes discovered patterns and assigns every trip its pattern, all in one
/// transaction.
pub async fn persist_patterns(
    conn: &mut AsyncPgConnection,
    namespace: &Namespace,
    tables: &FeedTables,
    patterns: &DiscoveredPatterns,
    batch_size: usize,
) -> Result<(), PatternError> {
    conn.transaction::<_, PatternError, _>(|conn| {
        async move {
            let mut store = PgFeedStore::new(conn, namespace, tables, batch_size);
            write_patterns(
                &mut store,
                patterns,
                patterns.reused_feed_patterns,
                batch_size,
            )
            .await
        }
        .scope_boxed()
    })
    .await
}

/// Discovers patterns from the trips already loaded into `namespace` and
/// persists them. Returns the number of patterns written.
pub async fn build_patterns(
    conn: &mut AsyncPgConnection,
    namespace: &Namespace,
    tables: &FeedTables,
    use_feed_patterns: bool,
    batch_size: usize,
    error_sink: &mut impl ErrorSink,
) -> Result<usize, PatternError> {
    let trips = loaders::load_trips(conn, namespace).await?;
    let lookup = loaders::load_halt_lookup(conn, namespace).await?;

    let feed_patterns = match use_feed_patterns {
        true => loaders::load_feed_patterns(conn, namespace).await?,
        false => None,
    };

    info!("Discovering patterns for {} trips in {}", trips.len(), namespace);

    let discovered = discover_patterns(&trips, &lookup, feed_patterns.as_deref(), error_sink);

    persist_patterns(conn, namespace, tables, &discovered, batch_size).await?;

    Ok(discovered.len())
}

/// Applies an edited halt list to a persisted pattern. Nothing is written
/// when the edit is rejected.
pub async fn reconcile_pattern(
    conn: &mut AsyncPgConnection,
    namespace: &Namespace,
    tables: &FeedTables,
    pattern_id: &str,
    new_halts: &[PatternHalt],
    batch_size: usize,
) -> Result<PatternDiff, PatternError> {
    conn.transaction::<_, PatternError, _>(|conn| {
        async move {
            let mut store = PgFeedStore::new(conn, namespace, tables, batch_size);
            reconciliation::reconcile_pattern(&mut store, pattern_id, new_halts).await
        }
        .scope_boxed()
    })
    .await
}

/// Reconciles a pattern and rewrites its stop times from the first changed
/// halt in a single transaction, so a failed normalization also undoes the
/// structural edit.
pub async fn reconcile_and_normalize(
    conn: &mut AsyncPgConnection,
    namespace: &Namespace,
    tables: &FeedTables,
    pattern_id: &str,
    new_halts: &[PatternHalt],
    interpolate: bool,
    batch_size: usize,
) -> Result<(PatternDiff, usize), PatternError> {
    conn.transaction::<_, PatternError, _>(|conn| {
        async move {
            let mut store = PgFeedStore::new(conn, namespace, tables, batch_size);
            reconciliation::reconcile_and_normalize(&mut store, pattern_id, new_halts, interpolate)
                .await
        }
        .scope_boxed()
    })
    .await
}

pub async fn normalize_stop_times(
    conn: &mut AsyncPgConnection,
    namespace: &Namespace,
    tables: &FeedTables,
    pattern_id: &str,
    begin_stop_sequence: i32,
    interpolate: bool,
    batch_size: usize,
) -> Result<usize, PatternError> {
    conn.transaction::<_, PatternError, _>(|conn| {
        async move {
            let mut store = PgFeedStore::new(conn, namespace, tables, batch_size);
            normalize::normalize_stop_times(&mut store, pattern_id, begin_stop_sequence, interpolate)
                .await
        }
        .scope_boxed()
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = "pattern_edit_test";

    #[derive(QueryableByName)]
    struct SequenceRow {
        #[diesel(sql_type = Integer)]
        stop_sequence: i32,
        #[diesel(sql_type = Nullable<Text>)]
        stop_id: Option<String>,
    }

    async fn sequence_of(conn: &mut AsyncPgConnection, trip_id: &str) -> Vec<(i32, String)> {
        let rows: Vec<SequenceRow> = diesel::sql_query(format!(
            "SELECT stop_sequence, stop_id FROM {}.stop_times WHERE trip_id = $1 ORDER BY stop_sequence",
            SCHEMA
        ))
        .bind::<Text, _>(trip_id)
        .load(conn)
        .await
        .unwrap();

        rows.into_iter()
            .map(|row| (row.stop_sequence, row.stop_id.unwrap_or_default()))
            .collect()
    }

    fn numbered(stops: &[&str]) -> Vec<(i32, String)> {
        stops
            .iter()
            .enumerate()
            .map(|(i, stop)| (i as i32, stop.to_string()))
            .collect()
    }

    async fn keyed_feed(conn: &mut AsyncPgConnection) {
        let statements = [
            format!("CREATE SCHEMA {}", SCHEMA),
            format!(
                "CREATE TABLE {}.trips (trip_id text PRIMARY KEY, route_id text NOT NULL, pattern_id text)",
                SCHEMA
            ),
            format!(
                "CREATE TABLE {}.stop_times (trip_id text NOT NULL, stop_sequence integer NOT NULL, \
                 stop_id text, location_id text, location_group_id text, \
                 arrival_time integer, departure_time integer, \
                 start_pickup_drop_off_window integer, end_pickup_drop_off_window integer, \
                 pickup_type smallint, drop_off_type smallint, timepoint smallint, stop_headsign text, \
                 shape_dist_traveled double precision, continuous_pickup smallint, \
                 continuous_drop_off smallint, pickup_booking_rule_id text, drop_off_booking_rule_id text, \
                 PRIMARY KEY (trip_id, stop_sequence))",
                SCHEMA
            ),
            format!(
                "INSERT INTO {}.trips VALUES ('t1', 'r1', 'p1'), ('t2', 'r1', 'p1'), ('other', 'r1', 'p2')",
                SCHEMA
            ),
            format!(
                "INSERT INTO {}.stop_times (trip_id, stop_sequence, stop_id) \
                 SELECT trip_id, n, 'S' || n FROM unnest(ARRAY['t1', 't2', 'other']) AS trip_id, \
                 generate_series(0, 3) AS n",
                SCHEMA
            ),
        ];

        for statement in statements {
            diesel::sql_query(statement).execute(&mut *conn).await.unwrap();
        }
    }

    // needs a disposable database; everything runs in a transaction that is never committed
    #[tokio::test]
    async fn renumbering_respects_the_stop_times_key() {
        let Ok(url) = std::env::var("PATTERN_TEST_DATABASE_URL") else {
            println!("PATTERN_TEST_DATABASE_URL not set, skipping");
            return;
        };

        let mut conn = AsyncPgConnection::establish(&url).await.unwrap();
        conn.begin_test_transaction().await.unwrap();
        keyed_feed(&mut conn).await;

        let namespace = Namespace::new(SCHEMA).unwrap();
        let tables = FeedTables::new();
        let mut store = PgFeedStore::new(&mut conn, &namespace, &tables, 100);

        assert_eq!(store.move_stop_sequence("p1", 1, 3).await.unwrap(), 6);
        assert_eq!(
            sequence_of(&mut *store.conn, "t1").await,
            numbered(&["S0", "S2", "S3", "S1"])
        );

        store.move_stop_sequence("p1", 3, 1).await.unwrap();
        assert_eq!(
            sequence_of(&mut *store.conn, "t2").await,
            numbered(&["S0", "S1", "S2", "S3"])
        );

        assert_eq!(store.shift_stop_sequences("p1", 1, 1).await.unwrap(), 6);
        assert_eq!(
            sequence_of(&mut *store.conn, "t1").await,
            vec![
                (0, "S0".to_string()),
                (2, "S1".to_string()),
                (3, "S2".to_string()),
                (4, "S3".to_string())
            ]
        );

        store.shift_stop_sequences("p1", 2, -1).await.unwrap();
        assert_eq!(store.delete_stop_times("p1", 1).await.unwrap(), 2);
        store.shift_stop_sequences("p1", 2, -1).await.unwrap();
        assert_eq!(
            sequence_of(&mut *store.conn, "t1").await,
            numbered(&["S0", "S2", "S3"])
        );

        assert_eq!(
            sequence_of(&mut *store.conn, "other").await,
            numbered(&["S0", "S1", "S2", "S3"])
        );
    }
}
