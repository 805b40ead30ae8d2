// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Column layouts of the tables pattern building writes.
//!
//! Built once with [`FeedTables::new`] and handed to whatever needs to create
//! or fill a table, so SQL text is generated from one description.

use crate::patterns::HaltRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    SmallInt,
    Double,
}

impl FieldType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::SmallInt => "smallint",
            FieldType::Double => "double precision",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub required: bool,
}

const fn field(name: &'static str, field_type: FieldType, required: bool) -> FieldSpec {
    FieldSpec {
        name,
        field_type,
        required,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub fields: Vec<FieldSpec>,
    pub primary_key: Vec<&'static str>,
    /// Extra indexed columns, one index each.
    pub indexes: Vec<&'static str>,
}

impl TableSpec {
    pub fn qualified_name(&self, namespace: &str) -> String {
        format!("{}.{}", namespace, self.name)
    }

    pub fn column_list(&self) -> String {
        self.fields
            .iter()
            .map(|field| field.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Without keys, which are added after loading.
    pub fn create_sql(&self, namespace: &str) -> String {
        let columns = self
            .fields
            .iter()
            .map(|field| {
                format!(
                    "{} {}{}",
                    field.name,
                    field.field_type.sql_type(),
                    match field.required {
                        true => " NOT NULL",
                        false => "",
                    }
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.qualified_name(namespace),
            columns
        )
    }

    pub fn drop_sql(&self, namespace: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.qualified_name(namespace))
    }

    /// Inserts one row per array element, one array bound per column in
    /// field order.
    pub fn unnest_insert_sql(&self, namespace: &str) -> String {
        let arrays = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, field)| format!("${}::{}[]", i + 1, field.field_type.sql_type()))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "INSERT INTO {} ({}) SELECT * FROM unnest({})",
            self.qualified_name(namespace),
            self.column_list(),
            arrays
        )
    }

    pub fn key_sql(&self, namespace: &str) -> Vec<String> {
        let mut statements = Vec::with_capacity(self.indexes.len() + 1);

        if !self.primary_key.is_empty() {
            statements.push(format!(
                "ALTER TABLE {} ADD PRIMARY KEY ({})",
                self.qualified_name(namespace),
                self.primary_key.join(", ")
            ));
        }

        for column in &self.indexes {
            statements.push(format!(
                "CREATE INDEX IF NOT EXISTS {}_{}_idx ON {} ({})",
                self.name,
                column,
                self.qualified_name(namespace),
                column
            ));
        }

        statements
    }
}

/// A pattern halt table. All three share one column order and differ in the
/// names of the reference and default time columns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HaltTableSpec {
    pub table: TableSpec,
    pub reference_column: &'static str,
    pub travel_time_column: &'static str,
    pub dwell_time_column: &'static str,
}

impl HaltTableSpec {
    fn new(
        name: &'static str,
        reference_column: &'static str,
        travel_time_column: &'static str,
        dwell_time_column: &'static str,
    ) -> HaltTableSpec {
        use FieldType::*;

        HaltTableSpec {
            table: TableSpec {
                name,
                fields: vec![
                    field("pattern_id", Text, true),
                    field("stop_sequence", Integer, true),
                    field(reference_column, Text, true),
                    field(travel_time_column, Integer, false),
                    field(dwell_time_column, Integer, false),
                    field("drop_off_type", SmallInt, false),
                    field("pickup_type", SmallInt, false),
                    field("timepoint", SmallInt, false),
                    field("stop_headsign", Text, false),
                    field("shape_dist_traveled", Double, false),
                    field("continuous_pickup", SmallInt, false),
                    field("continuous_drop_off", SmallInt, false),
                    field("pickup_booking_rule_id", Text, false),
                    field("drop_off_booking_rule_id", Text, false),
                ],
                primary_key: vec!["pattern_id", "stop_sequence"],
                indexes: vec![reference_column],
            },
            reference_column,
            travel_time_column,
            dwell_time_column,
        }
    }

    /// Columns read back into a pattern halt, with the time columns renamed
    /// to `travel_time` and `dwell_time`.
    pub fn select_sql(&self, namespace: &str) -> String {
        format!(
            "SELECT pattern_id, stop_sequence, {} AS reference_id, {} AS travel_time, {} AS dwell_time, \
             drop_off_type, pickup_type, timepoint, stop_headsign, shape_dist_traveled, \
             continuous_pickup, continuous_drop_off, pickup_booking_rule_id, drop_off_booking_rule_id \
             FROM {} WHERE pattern_id = $1",
            self.reference_column,
            self.travel_time_column,
            self.dwell_time_column,
            self.table.qualified_name(namespace)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedTables {
    pub patterns: TableSpec,
    pub pattern_stops: HaltTableSpec,
    pub pattern_locations: HaltTableSpec,
    pub pattern_location_group_stops: HaltTableSpec,
}

impl FeedTables {
    pub fn new() -> FeedTables {
        use FieldType::*;

        FeedTables {
            patterns: TableSpec {
                name: "patterns",
                fields: vec![
                    field("pattern_id", Text, true),
                    field("route_id", Text, true),
                    field("name", Text, false),
                    field("direction_id", SmallInt, false),
                    field("shape_id", Text, false),
                ],
                primary_key: vec!["pattern_id"],
                indexes: vec!["route_id"],
            },
            pattern_stops: HaltTableSpec::new(
                "pattern_stops",
                "stop_id",
                "default_travel_time",
                "default_dwell_time",
            ),
            pattern_locations: HaltTableSpec::new(
                "pattern_locations",
                "location_id",
                "flex_default_travel_time",
                "flex_default_zone_time",
            ),
            pattern_location_group_stops: HaltTableSpec::new(
                "pattern_location_group_stops",
                "location_group_id",
                "flex_default_travel_time",
                "flex_default_zone_time",
            ),
        }
    }

    pub fn halt_tables(&self) -> [&HaltTableSpec; 3] {
        [
            &self.pattern_stops,
            &self.pattern_locations,
            &self.pattern_location_group_stops,
        ]
    }

    pub fn halt_table_for(&self, halt: &HaltRef) -> &HaltTableSpec {
        match halt {
            HaltRef::Stop(_) => &self.pattern_stops,
            HaltRef::Location(_) => &self.pattern_locations,
            HaltRef::LocationGroup(_) => &self.pattern_location_group_stops,
        }
    }
}

impl Default for FeedTables {
    fn default() -> Self {
        FeedTables::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_stops_sql() {
        let tables = FeedTables::new();

        assert_eq!(
            tables.patterns.create_sql("feed_a"),
            "CREATE TABLE IF NOT EXISTS feed_a.patterns (pattern_id text NOT NULL, route_id text NOT NULL, name text, direction_id smallint, shape_id text)"
        );

        let insert = tables.pattern_stops.table.unnest_insert_sql("feed_a");
        assert!(insert.starts_with(
            "INSERT INTO feed_a.pattern_stops (pattern_id, stop_sequence, stop_id, default_travel_time"
        ));
        assert!(insert.ends_with("$13::text[], $14::text[])"));

        assert_eq!(
            tables.pattern_stops.table.key_sql("feed_a"),
            vec![
                "ALTER TABLE feed_a.pattern_stops ADD PRIMARY KEY (pattern_id, stop_sequence)"
                    .to_string(),
                "CREATE INDEX IF NOT EXISTS pattern_stops_stop_id_idx ON feed_a.pattern_stops (stop_id)"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn flex_tables_share_column_order() {
        let tables = FeedTables::new();

        let positions: Vec<Vec<FieldType>> = tables
            .halt_tables()
            .iter()
            .map(|spec| {
                spec.table
                    .fields
                    .iter()
                    .map(|field| field.field_type)
                    .collect()
            })
            .collect();
        assert_eq!(positions[0], positions[1]);
        assert_eq!(positions[1], positions[2]);

        assert_eq!(
            tables
                .halt_table_for(&HaltRef::LocationGroup("g".to_string()))
                .table
                .name,
            "pattern_location_group_stops"
        );
        assert!(
            tables
                .pattern_locations
                .select_sql("ns")
                .contains("flex_default_zone_time AS dwell_time")
        );
    }
}
