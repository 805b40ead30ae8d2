// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

//! Default travel and dwell times of a pattern, derived from the stop times of
//! the first trip that produced its key.

use super::key::PatternKey;

/// `later - earlier`, or missing if either side is missing.
pub fn time_between(later: Option<i32>, earlier: Option<i32>) -> Option<i32> {
    Some(later? - earlier?)
}

/// Latest departure seen before each position. Position 0 is always 0, and
/// consecutive flex halts reset it to 0 since there is no travel between two
/// windows. A missing or earlier departure keeps the previous baseline.
pub fn calculate_previous_departure_times(key: &PatternKey) -> Vec<i32> {
    let payload = key.payload();
    let identity = key.identity();
    let mut previous_departure_times = vec![0; key.len()];

    for i in 1..key.len() {
        let previous_is_flex = key.is_flex(i - 1);

        if previous_is_flex && key.is_flex(i) {
            previous_departure_times[i] = 0;
            continue;
        }

        let previous_departure = match previous_is_flex {
            true => identity[i - 1].end_pickup_drop_off_window,
            false => payload[i - 1].departure_time,
        };

        previous_departure_times[i] = match previous_departure {
            Some(previous_departure) => previous_departure_times[i - 1].max(previous_departure),
            None => previous_departure_times[i - 1],
        };
    }

    previous_departure_times
}

/// Travel time into each position: fixed stops from their arrival, a flex
/// halt entered from a fixed stop from the start of its window, and zero
/// between two flex halts.
pub fn calculate_travel_times(key: &PatternKey) -> Vec<Option<i32>> {
    let previous_departure_times = calculate_previous_departure_times(key);
    let payload = key.payload();
    let identity = key.identity();

    (0..key.len())
        .map(|i| {
            if i == 0 {
                return Some(0);
            }

            let previous_departure = Some(previous_departure_times[i]);

            match (key.is_flex(i), key.is_flex(i - 1)) {
                (false, _) => time_between(payload[i].arrival_time, previous_departure),
                (true, false) => time_between(
                    identity[i].start_pickup_drop_off_window,
                    previous_departure,
                ),
                (true, true) => Some(0),
            }
        })
        .collect()
}

/// Time spent at each position, or in the zone for flex halts.
pub fn calculate_dwell_times(key: &PatternKey) -> Vec<Option<i32>> {
    let payload = key.payload();
    let identity = key.identity();

    (0..key.len())
        .map(|i| match key.is_flex(i) {
            false => time_between(payload[i].departure_time, payload[i].arrival_time),
            true => time_between(
                identity[i].end_pickup_drop_off_window,
                identity[i].start_pickup_drop_off_window,
            ),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{HaltRef, StopTimeRecord};

    fn stop(sequence: i32, arrival: Option<i32>, departure: Option<i32>) -> StopTimeRecord {
        StopTimeRecord {
            arrival_time: arrival,
            departure_time: departure,
            ..StopTimeRecord::blank(sequence, HaltRef::Stop(format!("s{}", sequence)))
        }
    }

    fn zone(sequence: i32, start: Option<i32>, end: Option<i32>) -> StopTimeRecord {
        StopTimeRecord {
            start_pickup_drop_off_window: start,
            end_pickup_drop_off_window: end,
            ..StopTimeRecord::blank(sequence, HaltRef::Location(format!("z{}", sequence)))
        }
    }

    fn key_for_departures(departures: &[i32]) -> PatternKey {
        let stop_times: Vec<StopTimeRecord> = departures
            .iter()
            .enumerate()
            .map(|(i, departure)| stop(i as i32, Some(*departure), Some(*departure)))
            .collect();
        PatternKey::from_stop_times("r1", &stop_times)
    }

    #[test]
    fn previous_departures_follow_each_stop() {
        let key = key_for_departures(&[2, 3, 4, 5, 6]);
        assert_eq!(calculate_previous_departure_times(&key), vec![0, 2, 3, 4, 5]);
    }

    #[test]
    fn previous_departures_never_regress() {
        let key = key_for_departures(&[2, 3, 0, 1, 6]);
        let previous = calculate_previous_departure_times(&key);

        assert_eq!(previous, vec![0, 2, 3, 3, 3]);
        assert!(previous.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn missing_departure_keeps_baseline() {
        let key = PatternKey::from_stop_times(
            "r1",
            &[
                stop(0, Some(100), Some(100)),
                stop(1, None, None),
                stop(2, Some(300), Some(330)),
            ],
        );

        assert_eq!(calculate_previous_departure_times(&key), vec![0, 100, 100]);
        assert_eq!(calculate_travel_times(&key), vec![Some(0), None, Some(200)]);
        assert_eq!(calculate_dwell_times(&key), vec![Some(0), None, Some(30)]);
    }

    #[test]
    fn consecutive_flex_halts_have_no_previous_departure() {
        let key = PatternKey::from_stop_times(
            "r1",
            &[zone(0, Some(0), Some(600)), zone(1, Some(600), Some(720))],
        );

        assert_eq!(calculate_previous_departure_times(&key), vec![0, 0]);
        assert_eq!(calculate_travel_times(&key), vec![Some(0), Some(0)]);
        assert_eq!(calculate_dwell_times(&key), vec![Some(600), Some(120)]);
    }

    #[test]
    fn mixed_fixed_and_flex_service() {
        let key = PatternKey::from_stop_times(
            "r1",
            &[
                stop(0, Some(1000), Some(1060)),
                zone(1, Some(1200), Some(1800)),
                stop(2, Some(2000), Some(2000)),
            ],
        );

        assert_eq!(
            calculate_previous_departure_times(&key),
            vec![0, 1060, 1800]
        );
        assert_eq!(
            calculate_travel_times(&key),
            vec![Some(0), Some(140), Some(200)]
        );
        assert_eq!(
            calculate_dwell_times(&key),
            vec![Some(60), Some(600), Some(0)]
        );
    }

    #[test]
    fn missing_window_propagates() {
        let key = PatternKey::from_stop_times(
            "r1",
            &[stop(0, Some(0), Some(10)), zone(1, None, Some(700))],
        );

        assert_eq!(calculate_travel_times(&key), vec![Some(0), None]);
        assert_eq!(calculate_dwell_times(&key), vec![Some(10), None]);
    }
}
