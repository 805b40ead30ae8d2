// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::{HaltRef, StopTimeRecord};
use std::hash::{Hash, Hasher};

/// The part of a position that decides which pattern a trip belongs to.
#[derive(Hash, Clone, Debug, PartialEq, Eq)]
pub struct HaltIdentity {
    pub halt: HaltRef,
    pub pickup_type: i16,
    pub drop_off_type: i16,
    pub start_pickup_drop_off_window: Option<i32>,
    pub end_pickup_drop_off_window: Option<i32>,
}

/// Carried along with the key to build pattern halts, but two trips that
/// only differ here still share a pattern.
#[derive(Clone, Debug, PartialEq)]
pub struct HaltPayload {
    pub arrival_time: Option<i32>,
    pub departure_time: Option<i32>,
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

/// Identity of a stop pattern: the route plus, per visited position, what is
/// visited and how riders may board or alight there.
///
/// Clock times are deliberately left out of equality so that the same
/// geography served at different times of day is one pattern.
#[derive(Clone, Debug)]
pub struct PatternKey {
    pub route_id: String,
    identity: Vec<HaltIdentity>,
    payload: Vec<HaltPayload>,
}

/// Missing pickup and drop-off types mean regular service.
pub fn resolve_pickup_drop_off_type(value: Option<i16>) -> i16 {
    value.unwrap_or(0)
}

impl PatternKey {
    pub fn new(route_id: &str) -> PatternKey {
        PatternKey {
            route_id: route_id.to_string(),
            identity: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn from_stop_times(route_id: &str, stop_times: &[StopTimeRecord]) -> PatternKey {
        let mut key = PatternKey::new(route_id);
        for stop_time in stop_times {
            key.add_halt(stop_time);
        }
        key
    }

    pub fn add_halt(&mut self, stop_time: &StopTimeRecord) {
        self.identity.push(HaltIdentity {
            halt: stop_time.halt.clone(),
            pickup_type: resolve_pickup_drop_off_type(stop_time.pickup_type),
            drop_off_type: resolve_pickup_drop_off_type(stop_time.drop_off_type),
            start_pickup_drop_off_window: stop_time.start_pickup_drop_off_window,
            end_pickup_drop_off_window: stop_time.end_pickup_drop_off_window,
        });

        self.payload.push(HaltPayload {
            arrival_time: stop_time.arrival_time,
            departure_time: stop_time.departure_time,
            pickup_type: stop_time.pickup_type,
            drop_off_type: stop_time.drop_off_type,
            timepoint: stop_time.timepoint,
            stop_headsign: stop_time.stop_headsign.clone(),
            shape_dist_traveled: stop_time.shape_dist_traveled,
            continuous_pickup: stop_time.continuous_pickup,
            continuous_drop_off: stop_time.continuous_drop_off,
            pickup_booking_rule_id: stop_time.pickup_booking_rule_id.clone(),
            drop_off_booking_rule_id: stop_time.drop_off_booking_rule_id.clone(),
        });
    }

    pub fn len(&self) -> usize {
        self.identity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identity.is_empty()
    }

    pub fn identity(&self) -> &[HaltIdentity] {
        &self.identity
    }

    pub fn payload(&self) -> &[HaltPayload] {
        &self.payload
    }

    pub fn is_flex(&self, index: usize) -> bool {
        self.identity[index].halt.is_flex()
    }

    pub fn ordered_halts(&self) -> Vec<HaltRef> {
        self.identity
            .iter()
            .map(|identity| identity.halt.clone())
            .collect()
    }
}

impl PartialEq for PatternKey {
    fn eq(&self, other: &Self) -> bool {
        self.route_id == other.route_id && self.identity == other.identity
    }
}

impl Eq for PatternKey {}

impl Hash for PatternKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.route_id.hash(state);
        self.identity.hash(state);
    }
}
