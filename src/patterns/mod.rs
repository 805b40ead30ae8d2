// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Pattern discovery, naming, persistence and edit reconciliation.
//!
//! A pattern is the ordered list of stops, flex locations and location groups
//! shared by every trip grouped under one [`key::PatternKey`].

pub mod builder;
pub mod errors;
pub mod finder;
pub mod gtfs_source;
pub mod key;
pub mod naming;
pub mod normalize;
pub mod reconciliation;
pub mod store;
pub mod travel_times;

#[cfg(test)]
pub(crate) mod memory;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

pub use errors::{ErrorSink, ErrorType, NewGtfsError, NormalizeError, PatternError, ReconcileError};

/// What a single position of a trip or pattern points at.
///
/// Exactly one reference exists per position, so a halt can never be
/// half stop and half flex zone.
#[derive(Hash, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum HaltRef {
    Stop(String),
    Location(String),
    LocationGroup(String),
}

impl HaltRef {
    /// Builds a reference from the three nullable id columns used by the
    /// GTFS tables. Empty strings count as absent.
    pub fn from_ids(
        stop_id: Option<&str>,
        location_id: Option<&str>,
        location_group_id: Option<&str>,
    ) -> Option<HaltRef> {
        let present = |id: Option<&str>| id.filter(|id| !id.is_empty()).map(String::from);

        match (
            present(stop_id),
            present(location_id),
            present(location_group_id),
        ) {
            (Some(stop_id), None, None) => Some(HaltRef::Stop(stop_id)),
            (None, Some(location_id), None) => Some(HaltRef::Location(location_id)),
            (None, None, Some(location_group_id)) => Some(HaltRef::LocationGroup(location_group_id)),
            _ => None,
        }
    }

    pub fn reference_id(&self) -> &str {
        match self {
            HaltRef::Stop(id) | HaltRef::Location(id) | HaltRef::LocationGroup(id) => id,
        }
    }

    /// Flex halts use a pickup/drop-off window instead of arrival/departure.
    pub fn is_flex(&self) -> bool {
        !matches!(self, HaltRef::Stop(_))
    }

    pub fn stop_id(&self) -> Option<&str> {
        match self {
            HaltRef::Stop(id) => Some(id),
            _ => None,
        }
    }

    pub fn location_id(&self) -> Option<&str> {
        match self {
            HaltRef::Location(id) => Some(id),
            _ => None,
        }
    }

    pub fn location_group_id(&self) -> Option<&str> {
        match self {
            HaltRef::LocationGroup(id) => Some(id),
            _ => None,
        }
    }
}

/// One visit of a trip to a stop, location or location group, as read from
/// stop_times. `None` marks a missing value, never zero.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StopTimeRecord {
    pub stop_sequence: i32,
    pub halt: HaltRef,
    pub arrival_time: Option<i32>,
    pub departure_time: Option<i32>,
    pub start_pickup_drop_off_window: Option<i32>,
    pub end_pickup_drop_off_window: Option<i32>,
    pub pickup_type: Option<i16>,
    pub drop_off_type: Option<i16>,
    pub timepoint: Option<i16>,
    pub stop_headsign: Option<String>,
    pub shape_dist_traveled: Option<f64>,
    pub continuous_pickup: Option<i16>,
    pub continuous_drop_off: Option<i16>,
    pub pickup_booking_rule_id: Option<String>,
    pub drop_off_booking_rule_id: Option<String>,
}

impl StopTimeRecord {
    /// A record with only the position and reference filled in.
    pub fn blank(stop_sequence: i32, halt: HaltRef) -> StopTimeRecord {
        StopTimeRecord {
            stop_sequence,
            halt,
            arrival_time: None,
            departure_time: None,
            start_pickup_drop_off_window: None,
            end_pickup_drop_off_window: None,
            pickup_type: None,
            drop_off_type: None,
            timepoint: None,
            stop_headsign: None,
            shape_dist_traveled: None,
            continuous_pickup: None,
            continuous_drop_off: None,
            pickup_booking_rule_id: None,
            drop_off_booking_rule_id: None,
        }
    }
}

/// A trip with its stop times already sorted by stop_sequence.
#[derive(Clone, Debug)]
pub struct TripStopTimes {
    pub trip_id: String,
    pub route_id: String,
    pub shape_id: Option<String>,
    pub direction_id: Option<i16>,
    pub stop_times: Vec<StopTimeRecord>,
}

/// A pattern read from a feed's own patterns table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedPattern {
    pub pattern_id: String,
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pattern {
    pub pattern_id: String,
    pub route_id: String,
    pub name: Option<String>,
    pub direction_id: Option<i16>,
    pub ordered_halts: Vec<HaltRef>,
    pub associated_trips: Vec<String>,
    /// Sorted so the rendered bad value and the persisted shape are stable.
    pub associated_shapes: std::collections::BTreeSet<String>,
}

impl Pattern {
    /// The shape written to the pattern row.
    pub fn shape_id(&self) -> Option<&str> {
        self.associated_shapes.iter().next().map(String::as_str)
    }
}

/// One position within a persisted pattern.
///
/// `travel_time` and `dwell_time` are stored as `default_travel_time` /
/// `default_dwell_time` for stops and as `flex_default_travel_time` /
/// `flex_default_zone_time` for locations and location groups.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PatternHalt {
    #[serde(default)]
    pub pattern_id: String,
    #[serde(default)]
    pub stop_sequence: i32,
    pub halt: HaltRef,
    pub travel_time: Option<i32>,
    pub dwell_time: Option<i32>,
    pub drop_off_type: Option<i16>,
    pub pickup_type: Option<i16>,
    pub timepoint: Option<i16>,
    pub stop_headsign: Option<String>,
    pub shape_dist_traveled: Option<f64>,
    pub continuous_pickup: Option<i16>,
    pub continuous_drop_off: Option<i16>,
    pub pickup_booking_rule_id: Option<String>,
    pub drop_off_booking_rule_id: Option<String>,
}

impl PatternHalt {
    pub fn is_flex(&self) -> bool {
        self.halt.is_flex()
    }

    pub fn is_timepoint(&self) -> bool {
        self.timepoint == Some(1)
    }

    /// Stop time row to insert when this halt is added to existing trips.
    pub fn blank_stop_time(&self) -> StopTimeRecord {
        StopTimeRecord {
            pickup_type: self.pickup_type,
            drop_off_type: self.drop_off_type,
            timepoint: self.timepoint,
            stop_headsign: self.stop_headsign.clone(),
            shape_dist_traveled: self.shape_dist_traveled,
            continuous_pickup: self.continuous_pickup,
            continuous_drop_off: self.continuous_drop_off,
            pickup_booking_rule_id: self.pickup_booking_rule_id.clone(),
            drop_off_booking_rule_id: self.drop_off_booking_rule_id.clone(),
            ..StopTimeRecord::blank(self.stop_sequence, self.halt.clone())
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StopInfo {
    pub stop_name: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LocationInfo {
    pub stop_name: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LocationGroupInfo {
    pub location_group_name: Option<String>,
}

/// Names of everything a halt can reference, keyed by GTFS id.
#[derive(Clone, Debug, Default)]
pub struct HaltLookup {
    pub stops: AHashMap<String, StopInfo>,
    pub locations: AHashMap<String, LocationInfo>,
    pub location_groups: AHashMap<String, LocationGroupInfo>,
}

impl HaltLookup {
    /// Display name of the entity an id points at, searching stops, then
    /// locations, then location groups. Entities without a name fall back to
    /// their id.
    pub fn display_name(&self, reference_id: &str) -> Option<String> {
        if let Some(stop) = self.stops.get(reference_id) {
            return Some(
                stop.stop_name
                    .clone()
                    .unwrap_or_else(|| reference_id.to_string()),
            );
        }

        if let Some(location) = self.locations.get(reference_id) {
            return Some(
                location
                    .stop_name
                    .clone()
                    .unwrap_or_else(|| reference_id.to_string()),
            );
        }

        self.location_groups.get(reference_id).map(|group| {
            group
                .location_group_name
                .clone()
                .unwrap_or_else(|| reference_id.to_string())
        })
    }
}
