// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

use super::{HaltLookup, Pattern};
use ahash::AHashMap;
use std::collections::BTreeSet;
use tracing::info;

const FROM_TERMINUS_UNKNOWN: &str = "fromTerminusNameUnknown";
const TO_TERMINUS_UNKNOWN: &str = "toTerminusNameUnknown";

/// Index of patterns within one route by terminus and intermediate names.
#[derive(Default)]
struct RouteNamingInfo {
    patterns: Vec<usize>,
    from_stops: AHashMap<String, BTreeSet<usize>>,
    to_stops: AHashMap<String, BTreeSet<usize>>,
    vias: AHashMap<String, BTreeSet<usize>>,
}

fn terminus_name(pattern: &Pattern, lookup: &HaltLookup, from: bool) -> String {
    let halt = match from {
        true => pattern.ordered_halts.first(),
        false => pattern.ordered_halts.last(),
    };

    halt.and_then(|halt| lookup.display_name(halt.reference_id()))
        .unwrap_or_else(|| {
            match from {
                true => FROM_TERMINUS_UNKNOWN,
                false => TO_TERMINUS_UNKNOWN,
            }
            .to_string()
        })
}

/// Intermediate names of a pattern in halt order, excluding its own termini.
fn via_names(pattern: &Pattern, lookup: &HaltLookup, from_name: &str, to_name: &str) -> Vec<String> {
    pattern
        .ordered_halts
        .iter()
        .filter_map(|halt| lookup.display_name(halt.reference_id()))
        .filter(|name| name != from_name && name != to_name)
        .collect()
}

/// Gives every pattern a name that is unique within its route, such as
/// `"5 stops from Union Station to Pasadena via Chinatown (12 trips)"`.
///
/// For each pattern the first of these that is unique wins: the terminus
/// pair, the terminus pair plus the first distinguishing intermediate stop,
/// local/express when exactly two patterns share the termini and differ in
/// length, and finally a reference to the pattern's first trip.
pub fn rename_patterns(patterns: &mut [&mut Pattern], lookup: &HaltLookup) {
    info!("Generating unique names for {} patterns", patterns.len());

    let mut info_for_route: AHashMap<String, RouteNamingInfo> = AHashMap::new();
    let mut termini: Vec<(String, String)> = Vec::with_capacity(patterns.len());
    let mut unindexed: Vec<usize> = Vec::new();

    for (index, pattern) in patterns.iter().enumerate() {
        let from_name = terminus_name(pattern, lookup, true);
        let to_name = terminus_name(pattern, lookup, false);

        if !pattern.associated_trips.is_empty() && !pattern.ordered_halts.is_empty() {
            let info = info_for_route.entry(pattern.route_id.clone()).or_default();

            info.from_stops
                .entry(from_name.clone())
                .or_default()
                .insert(index);
            info.to_stops.entry(to_name.clone()).or_default().insert(index);

            for via in via_names(pattern, lookup, &from_name, &to_name) {
                info.vias.entry(via).or_default().insert(index);
            }

            info.patterns.push(index);
        } else {
            unindexed.push(index);
        }

        termini.push((from_name, to_name));
    }

    // nothing to tell these apart by, so they keep the plain terminus name
    for index in unindexed {
        let (from_name, to_name) = &termini[index];
        let name = format!("from {} to {}", from_name, to_name);
        set_name(&mut *patterns[index], &name);
    }

    for info in info_for_route.values() {
        for &index in &info.patterns {
            let (from_name, to_name) = &termini[index];

            let sharing_termini: BTreeSet<usize> = match (
                info.from_stops.get(from_name),
                info.to_stops.get(to_name),
            ) {
                (Some(from), Some(to)) => from.intersection(to).copied().collect(),
                _ => BTreeSet::new(),
            };

            let name = name_within_termini(
                patterns,
                info,
                index,
                &sharing_termini,
                lookup,
                from_name,
                to_name,
            );

            set_name(&mut *patterns[index], &name);
        }
    }
}

fn set_name(pattern: &mut Pattern, name: &str) {
    pattern.name = Some(format!(
        "{} stops {} ({} trips)",
        pattern.ordered_halts.len(),
        name,
        pattern.associated_trips.len()
    ));
}

fn name_within_termini(
    patterns: &[&mut Pattern],
    info: &RouteNamingInfo,
    index: usize,
    sharing_termini: &BTreeSet<usize>,
    lookup: &HaltLookup,
    from_name: &str,
    to_name: &str,
) -> String {
    let pattern = &patterns[index];

    if sharing_termini.len() == 1 {
        return format!("from {} to {}", from_name, to_name);
    }

    for via in via_names(pattern, lookup, from_name, to_name) {
        let unique_via = info
            .vias
            .get(&via)
            .map(|with_via| with_via.intersection(sharing_termini).count() == 1)
            .unwrap_or(false);

        if unique_via {
            return format!("from {} to {} via {}", from_name, to_name, via);
        }
    }

    if sharing_termini.len() == 2 {
        // the only other pattern between the same termini
        if let Some(&other) = sharing_termini.iter().find(|other| **other != index) {
            let halts = pattern.ordered_halts.len();
            let other_halts = patterns[other].ordered_halts.len();

            if halts > other_halts {
                return format!("from {} to {} local", from_name, to_name);
            }
            if halts < other_halts {
                return format!("from {} to {} express", from_name, to_name);
            }
        }
    }

    // TODO: patterns sharing termini with no distinguishing via and more than
    // two siblings still fall back to a trip reference
    format!(
        "from {} to {} like trip {}",
        from_name,
        to_name,
        pattern
            .associated_trips
            .first()
            .map(String::as_str)
            .unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::{HaltRef, LocationInfo, StopInfo};

    fn lookup(stops: &[(&str, &str)]) -> HaltLookup {
        let mut lookup = HaltLookup::default();
        for (id, name) in stops {
            lookup.stops.insert(
                id.to_string(),
                StopInfo {
                    stop_name: Some(name.to_string()),
                },
            );
        }
        lookup
    }

    fn pattern(id: &str, route_id: &str, halts: &[&str], trips: &[&str]) -> Pattern {
        Pattern {
            pattern_id: id.to_string(),
            route_id: route_id.to_string(),
            name: None,
            direction_id: None,
            ordered_halts: halts
                .iter()
                .map(|halt| HaltRef::Stop(halt.to_string()))
                .collect(),
            associated_trips: trips.iter().map(|trip| trip.to_string()).collect(),
            associated_shapes: Default::default(),
        }
    }

    fn names(mut patterns: Vec<Pattern>, lookup: &HaltLookup) -> Vec<String> {
        let mut refs: Vec<&mut Pattern> = patterns.iter_mut().collect();
        rename_patterns(&mut refs, lookup);
        patterns
            .into_iter()
            .map(|pattern| pattern.name.unwrap())
            .collect()
    }

    #[test]
    fn unique_termini() {
        let lookup = lookup(&[("a", "Alpha"), ("b", "Bravo"), ("c", "Charlie")]);
        let result = names(
            vec![
                pattern("1", "r1", &["a", "b", "c"], &["t1", "t2"]),
                pattern("2", "r1", &["c", "b", "a"], &["t3"]),
            ],
            &lookup,
        );

        assert_eq!(
            result,
            vec![
                "3 stops from Alpha to Charlie (2 trips)",
                "3 stops from Charlie to Alpha (1 trips)"
            ]
        );
    }

    #[test]
    fn same_termini_on_other_routes_do_not_collide() {
        let lookup = lookup(&[("a", "Alpha"), ("c", "Charlie")]);
        let result = names(
            vec![
                pattern("1", "r1", &["a", "c"], &["t1"]),
                pattern("2", "r2", &["a", "c"], &["t2"]),
            ],
            &lookup,
        );

        assert_eq!(result[0], "2 stops from Alpha to Charlie (1 trips)");
        assert_eq!(result[1], "2 stops from Alpha to Charlie (1 trips)");
    }

    #[test]
    fn first_unique_via_distinguishes() {
        let lookup = lookup(&[
            ("a", "Alpha"),
            ("b", "Bravo"),
            ("x", "Xray"),
            ("y", "Yankee"),
            ("c", "Charlie"),
        ]);
        let result = names(
            vec![
                pattern("1", "r1", &["a", "b", "x", "c"], &["t1"]),
                pattern("2", "r1", &["a", "b", "y", "c"], &["t2"]),
            ],
            &lookup,
        );

        assert_eq!(result[0], "4 stops from Alpha to Charlie via Xray (1 trips)");
        assert_eq!(result[1], "4 stops from Alpha to Charlie via Yankee (1 trips)");
    }

    #[test]
    fn longer_pattern_is_local_shorter_is_express() {
        let lookup = lookup(&[("a", "Alpha"), ("b", "Bravo"), ("c", "Charlie")]);
        let result = names(
            vec![
                pattern("1", "r1", &["a", "b", "c"], &["t1"]),
                pattern("2", "r1", &["a", "c"], &["t2"]),
            ],
            &lookup,
        );

        // Bravo is on only one of the two patterns, so it is a unique via
        assert_eq!(result[0], "3 stops from Alpha to Charlie via Bravo (1 trips)");

        let result = names(
            vec![
                pattern("1", "r1", &["a", "b", "b", "c"], &["t1"]),
                pattern("2", "r1", &["a", "b", "c"], &["t2"]),
            ],
            &lookup,
        );

        assert_eq!(result[0], "4 stops from Alpha to Charlie local (1 trips)");
        assert_eq!(result[1], "3 stops from Alpha to Charlie express (1 trips)");
    }

    #[test]
    fn equal_length_siblings_fall_back_to_trip() {
        let lookup = lookup(&[("a", "Alpha"), ("b", "Bravo"), ("c", "Charlie")]);
        let result = names(
            vec![
                pattern("1", "r1", &["a", "b", "c"], &["t1", "t9"]),
                pattern("2", "r1", &["a", "b", "c"], &["t2"]),
            ],
            &lookup,
        );

        assert_eq!(
            result[0],
            "3 stops from Alpha to Charlie like trip t1 (2 trips)"
        );
        assert_eq!(result[1], "3 stops from Alpha to Charlie like trip t2 (1 trips)");
    }

    #[test]
    fn patterns_without_trips_or_halts_are_still_named() {
        let lookup = lookup(&[("a", "Alpha"), ("c", "Charlie")]);
        let result = names(
            vec![
                pattern("1", "r1", &["a", "c"], &[]),
                pattern("2", "r1", &[], &["t2"]),
                pattern("3", "r1", &["a", "c"], &["t3"]),
            ],
            &lookup,
        );

        assert_eq!(result[0], "2 stops from Alpha to Charlie (0 trips)");
        assert_eq!(
            result[1],
            "0 stops from fromTerminusNameUnknown to toTerminusNameUnknown (1 trips)"
        );
        assert_eq!(result[2], "2 stops from Alpha to Charlie (1 trips)");
    }

    #[test]
    fn unknown_termini_and_flex_names() {
        let mut lookup = lookup(&[("b", "Bravo")]);
        lookup.locations.insert(
            "zone".to_string(),
            LocationInfo {
                stop_name: Some("Airport zone".to_string()),
            },
        );

        let mut flex = pattern("1", "r1", &["b"], &["t1"]);
        flex.ordered_halts.push(HaltRef::Location("zone".to_string()));
        let unknown = pattern("2", "r2", &["nowhere", "b", "gone"], &["t2"]);

        let result = names(vec![flex, unknown], &lookup);

        assert_eq!(result[0], "2 stops from Bravo to Airport zone (1 trips)");
        assert_eq!(
            result[1],
            "3 stops from fromTerminusNameUnknown to toTerminusNameUnknown (1 trips)"
        );
    }
}
