// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use gtfs_structures::ContinuousPickupDropOff;
use gtfs_structures::DirectionType;
use gtfs_structures::PickupDropOffType;
use gtfs_structures::TimepointType;

pub fn pickup_dropoff_to_i16(x: &PickupDropOffType) -> i16 {
    match x {
        PickupDropOffType::Regular => 0,
        PickupDropOffType::NotAvailable => 1,
        PickupDropOffType::ArrangeByPhone => 2,
        PickupDropOffType::CoordinateWithDriver => 3,
        PickupDropOffType::Unknown(x) => *x,
    }
}

pub fn continuous_pickup_drop_off_to_i16(x: &ContinuousPickupDropOff) -> i16 {
    match x {
        ContinuousPickupDropOff::Continuous => 0,
        ContinuousPickupDropOff::NotAvailable => 1,
        ContinuousPickupDropOff::ArrangeByPhone => 2,
        ContinuousPickupDropOff::CoordinateWithDriver => 3,
        ContinuousPickupDropOff::Unknown(x) => *x,
    }
}

/// `timepoint` as stored: 1 for exact times, 0 for approximate.
pub fn timepoint_to_i16(timepoint: &TimepointType) -> i16 {
    match timepoint {
        TimepointType::Exact => 1,
        TimepointType::Approximate => 0,
    }
}

pub fn direction_to_i16(direction: &DirectionType) -> i16 {
    match direction {
        DirectionType::Outbound => 0,
        DirectionType::Inbound => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_values_match_gtfs_codes() {
        assert_eq!(pickup_dropoff_to_i16(&PickupDropOffType::ArrangeByPhone), 2);
        assert_eq!(pickup_dropoff_to_i16(&PickupDropOffType::Unknown(7)), 7);
        assert_eq!(
            continuous_pickup_drop_off_to_i16(&ContinuousPickupDropOff::NotAvailable),
            1
        );
        assert_eq!(timepoint_to_i16(&TimepointType::Exact), 1);
        assert_eq!(direction_to_i16(&DirectionType::Inbound), 1);
    }
}
