// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Reads trips and stop names out of a `gtfs_structures` feed.
//!
//! `gtfs_structures` does not model GTFS-Flex locations, so every halt read
//! here is a fixed stop.

use super::{HaltLookup, HaltRef, StopInfo, StopTimeRecord, TripStopTimes};
use crate::enum_to_int::{
    continuous_pickup_drop_off_to_i16, direction_to_i16, pickup_dropoff_to_i16, timepoint_to_i16,
};
use gtfs_structures::Gtfs;

fn stop_time_record(stop_time: &gtfs_structures::StopTime) -> StopTimeRecord {
    StopTimeRecord {
        arrival_time: stop_time.arrival_time.map(|time| time as i32),
        departure_time: stop_time.departure_time.map(|time| time as i32),
        pickup_type: Some(pickup_dropoff_to_i16(&stop_time.pickup_type)),
        drop_off_type: Some(pickup_dropoff_to_i16(&stop_time.drop_off_type)),
        timepoint: Some(timepoint_to_i16(&stop_time.timepoint)),
        stop_headsign: stop_time.stop_headsign.clone(),
        shape_dist_traveled: stop_time.shape_dist_traveled.map(f64::from),
        continuous_pickup: Some(continuous_pickup_drop_off_to_i16(
            &stop_time.continuous_pickup,
        )),
        continuous_drop_off: Some(continuous_pickup_drop_off_to_i16(
            &stop_time.continuous_drop_off,
        )),
        ..StopTimeRecord::blank(
            stop_time.stop_sequence as i32,
            HaltRef::Stop(stop_time.stop.id.clone()),
        )
    }
}

/// Every trip of the feed, ordered by trip_id so discovery is repeatable.
pub fn trips_from_gtfs(gtfs: &Gtfs) -> Vec<TripStopTimes> {
    let mut trips: Vec<TripStopTimes> = gtfs
        .trips
        .values()
        .map(|trip| {
            let mut stop_times: Vec<StopTimeRecord> =
                trip.stop_times.iter().map(stop_time_record).collect();
            stop_times.sort_by_key(|stop_time| stop_time.stop_sequence);

            TripStopTimes {
                trip_id: trip.id.clone(),
                route_id: trip.route_id.clone(),
                shape_id: trip.shape_id.clone(),
                direction_id: trip.direction_id.as_ref().map(direction_to_i16),
                stop_times,
            }
        })
        .collect();

    trips.sort_by(|a, b| a.trip_id.cmp(&b.trip_id));
    trips
}

pub fn lookup_from_gtfs(gtfs: &Gtfs) -> HaltLookup {
    let mut lookup = HaltLookup::default();

    for (stop_id, stop) in &gtfs.stops {
        lookup.stops.insert(
            stop_id.clone(),
            StopInfo {
                stop_name: stop.name.clone(),
            },
        );
    }

    lookup
}
