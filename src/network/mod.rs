pub mod line;
pub mod palette;
pub mod shape;
pub mod stop;

use std::collections::{BTreeMap, BTreeSet};

use geo::{Distance, Haversine};
use geo_types::{coord, Point, Rect};
use itertools::Itertools;
use thiserror::Error;

use crate::network::{
    line::{LineCode, TramLine},
    stop::{Stop, StopCode},
};

/// Shape endpoints further than this from every stop of their line are reported.
const ENDPOINT_TOLERANCE_METERS: f64 = 300.0;

#[derive(Error, Debug, PartialEq)]
pub enum RegistryError {
    #[error("line {0} appears more than once in the input")]
    DuplicateLine(LineCode),
    #[error("line {0} does not reference any stop")]
    LineWithoutStops(LineCode),
    #[error("line {line} lists stop {stop} in its service order but never declares it")]
    UndeclaredStop { line: LineCode, stop: StopCode },
}

/// A stop declared with different attributes by two lines. The later line wins.
#[derive(Debug, Clone, PartialEq)]
pub struct StopConflict {
    pub code: StopCode,
    pub previous_name: String,
    pub previous_position: Point<f64>,
    pub name: String,
    pub position: Point<f64>,
    pub winning_line: LineCode,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    pub line: LineCode,
    pub shape_index: usize,
    pub endpoint: Point<f64>,
    /// Distance to the closest stop served by the line, in meters.
    pub distance: f64,
}

/// Deduplicated view of every stop and line loaded in one run.
///
/// The registry is immutable once built; query results stay the same for its
/// whole lifetime.
#[derive(Debug)]
pub struct NetworkRegistry {
    stops: BTreeMap<StopCode, Stop>,
    lines: BTreeMap<LineCode, TramLine>,
    conflicts: Vec<StopConflict>,
}

impl NetworkRegistry {
    /// Merges stop declarations across lines, visiting lines in ascending code
    /// order. A stop declared again with a different name or position takes
    /// the later values and a [`StopConflict`] is recorded.
    pub fn build(lines: Vec<TramLine>) -> Result<Self, RegistryError> {
        let lines = lines
            .into_iter()
            .sorted_by(|a, b| a.code.cmp(&b.code))
            .collect::<Vec<_>>();

        let mut stops: BTreeMap<StopCode, Stop> = BTreeMap::new();
        let mut by_code: BTreeMap<LineCode, TramLine> = BTreeMap::new();
        let mut conflicts = vec![];

        for line in lines {
            if by_code.contains_key(&line.code) {
                return Err(RegistryError::DuplicateLine(line.code));
            }
            if line.stops.is_empty() || line.stop_sequences.values().all(Vec::is_empty) {
                return Err(RegistryError::LineWithoutStops(line.code));
            }
            if let Some(stop) = line
                .stop_sequences
                .values()
                .flatten()
                .find(|code| !line.serves(code))
            {
                return Err(RegistryError::UndeclaredStop {
                    line: line.code.clone(),
                    stop: stop.clone(),
                });
            }

            for declared in line.stops.iter() {
                match stops.get_mut(&declared.code) {
                    None => {
                        let mut stop = declared.clone();
                        stop.lines.insert(line.code.clone());
                        stops.insert(stop.code.clone(), stop);
                    }
                    Some(existing) => {
                        if !existing.same_place(declared) {
                            let conflict = StopConflict {
                                code: declared.code.clone(),
                                previous_name: existing.name.clone(),
                                previous_position: existing.position,
                                name: declared.name.clone(),
                                position: declared.position,
                                winning_line: line.code.clone(),
                            };
                            log::warn!(
                                "stop {} redeclared by line {}: '{}' at ({}, {}) replaces '{}' at ({}, {})",
                                conflict.code,
                                conflict.winning_line,
                                conflict.name,
                                conflict.position.y(),
                                conflict.position.x(),
                                conflict.previous_name,
                                conflict.previous_position.y(),
                                conflict.previous_position.x(),
                            );
                            existing.name = declared.name.clone();
                            existing.position = declared.position;
                            conflicts.push(conflict);
                        }
                        if declared.object_id.is_some() {
                            existing.object_id = declared.object_id.clone();
                        }
                        existing.lines.extend(declared.lines.iter().cloned());
                        existing.lines.insert(line.code.clone());
                    }
                }
            }

            by_code.insert(line.code.clone(), line);
        }

        // lines carry the merged stops, so both query paths agree
        for line in by_code.values_mut() {
            for stop in line.stops.iter_mut() {
                if let Some(merged) = stops.get(&stop.code) {
                    *stop = merged.clone();
                }
            }
        }

        Ok(Self {
            stops,
            lines: by_code,
            conflicts,
        })
    }

    /// Ascending by stop code.
    pub fn stops(&self) -> impl Iterator<Item = &Stop> {
        self.stops.values()
    }

    /// Ascending by line code.
    pub fn lines(&self) -> impl Iterator<Item = &TramLine> {
        self.lines.values()
    }

    pub fn stop_by_code(&self, code: &StopCode) -> Option<&Stop> {
        self.stops.get(code)
    }

    pub fn line_by_code(&self, code: &LineCode) -> Option<&TramLine> {
        self.lines.get(code)
    }

    pub fn lines_serving(&self, code: &StopCode) -> Option<&BTreeSet<LineCode>> {
        self.stops.get(code).map(|s| &s.lines)
    }

    pub fn conflicts(&self) -> &[StopConflict] {
        &self.conflicts
    }

    pub fn shape_count(&self) -> usize {
        self.lines.values().map(|l| l.shapes.len()).sum()
    }

    /// Bounding box of every stop position, `None` for an empty network.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        let (min_x, max_x) = self
            .stops
            .values()
            .map(|s| s.lon())
            .minmax_by(f64::total_cmp)
            .into_option()?;
        let (min_y, max_y) = self
            .stops
            .values()
            .map(|s| s.lat())
            .minmax_by(f64::total_cmp)
            .into_option()?;

        Some(Rect::new(
            coord! { x: min_x, y: min_y },
            coord! { x: max_x, y: max_y },
        ))
    }

    /// Reports shape endpoints that are not close to any stop of their own line.
    pub fn validate(&self) -> Vec<ValidationWarning> {
        let mut warnings = vec![];

        for line in self.lines.values() {
            let positions = line
                .stops
                .iter()
                .filter_map(|s| self.stops.get(&s.code))
                .map(|s| s.position)
                .collect::<Vec<_>>();

            for (shape_index, shape) in line.shapes.iter().enumerate() {
                for endpoint in [shape.start(), shape.end()] {
                    let distance = positions
                        .iter()
                        .map(|p| Haversine.distance(endpoint, *p))
                        .min_by(f64::total_cmp)
                        .unwrap_or(f64::INFINITY);

                    if distance > ENDPOINT_TOLERANCE_METERS {
                        warnings.push(ValidationWarning {
                            line: line.code.clone(),
                            shape_index,
                            endpoint,
                            distance,
                        });
                    }
                }
            }
        }

        warnings
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::network::{line::Color, shape::Shape, stop::checked_position};
    use geo_types::coord;

    pub(crate) fn stop(code: &str, name: &str, lat: f64, lon: f64, line: &str) -> Stop {
        Stop::new(
            StopCode::new(code),
            name.to_owned(),
            checked_position(lat, lon).unwrap(),
            LineCode::new(line),
        )
    }

    /// A line with one shape running through its stops in order.
    pub(crate) fn line(code: &str, stops: &[(&str, &str, f64, f64)]) -> TramLine {
        let mut line = TramLine::new(LineCode::new(code), Color::parse("#112233").unwrap());
        let coords = stops
            .iter()
            .map(|(_, _, lat, lon)| coord! { x: *lon, y: *lat })
            .collect::<Vec<_>>();
        line.add_shape(Shape::new(0, coords).unwrap());
        for (c, name, lat, lon) in stops {
            line.stops.push(stop(c, name, *lat, *lon, code));
            line.stop_sequences
                .entry(0)
                .or_default()
                .push(StopCode::new(c));
        }
        line
    }

    fn codes(set: &BTreeSet<LineCode>) -> Vec<&str> {
        set.iter().map(|c| c.as_str()).collect()
    }

    #[test]
    fn shared_identical_stop_merges_into_one() {
        let registry = NetworkRegistry::build(vec![
            line("1", &[("A", "Alpha", 50.06, 19.94), ("B", "Beta", 50.07, 19.95)]),
            line("4", &[("B", "Beta", 50.07, 19.95), ("C", "Gamma", 50.08, 19.96)]),
        ])
        .unwrap();

        assert_eq!(registry.stops().count(), 3);
        assert!(registry.conflicts().is_empty());
        let b = registry.stop_by_code(&StopCode::new("B")).unwrap();
        assert_eq!(b.name, "Beta");
        assert_eq!(codes(&b.lines), vec!["1", "4"]);
    }

    #[test]
    fn conflicting_stop_takes_last_line_and_records_one_conflict() {
        let registry = NetworkRegistry::build(vec![
            line("10", &[("B", "Beta (moved)", 50.071, 19.951), ("D", "Delta", 50.0, 19.9)]),
            line("4", &[("B", "Beta", 50.07, 19.95), ("C", "Gamma", 50.08, 19.96)]),
        ])
        .unwrap();

        // "4" is merged before "10" regardless of input order.
        assert_eq!(registry.conflicts().len(), 1);
        let conflict = &registry.conflicts()[0];
        assert_eq!(conflict.code, StopCode::new("B"));
        assert_eq!(conflict.previous_name, "Beta");
        assert_eq!(conflict.winning_line, LineCode::new("10"));

        let b = registry.stop_by_code(&StopCode::new("B")).unwrap();
        assert_eq!(b.name, "Beta (moved)");
        assert_eq!(b.lat(), 50.071);
        assert_eq!(codes(&b.lines), vec!["4", "10"]);
    }

    #[test]
    fn line_stops_agree_with_stop_lookup_after_conflict() {
        let registry = NetworkRegistry::build(vec![
            line("4", &[("B", "Beta", 50.07, 19.95), ("C", "Gamma", 50.08, 19.96)]),
            line("10", &[("B", "Beta (moved)", 50.071, 19.951), ("D", "Delta", 50.0, 19.9)]),
        ])
        .unwrap();

        for line in registry.lines() {
            for stop in line.stops.iter() {
                assert_eq!(registry.stop_by_code(&stop.code), Some(stop));
            }
        }
        let via_four = registry
            .line_by_code(&LineCode::new("4"))
            .unwrap()
            .stops
            .iter()
            .find(|s| s.code == StopCode::new("B"))
            .unwrap();
        assert_eq!(via_four.name, "Beta (moved)");
        assert_eq!(codes(&via_four.lines), vec!["4", "10"]);
    }

    #[test]
    fn stop_object_id_survives_merge() {
        let mut first = line("1", &[("A", "Alpha", 50.06, 19.94)]);
        first.stops[0].object_id = Some("715".to_owned());
        let second = line("2", &[("A", "Alpha", 50.06, 19.94)]);

        let registry = NetworkRegistry::build(vec![first, second]).unwrap();
        let a = registry.stop_by_code(&StopCode::new("A")).unwrap();
        assert_eq!(a.object_id.as_deref(), Some("715"));
    }

    #[test]
    fn conflict_resolution_does_not_depend_on_input_order() {
        let build = |lines: Vec<TramLine>| {
            let registry = NetworkRegistry::build(lines).unwrap();
            let b = registry.stop_by_code(&StopCode::new("B")).unwrap().clone();
            (b, registry.conflicts().to_vec())
        };
        let l1 = line("1", &[("A", "Alpha", 50.06, 19.94), ("B", "Beta", 50.07, 19.95)]);
        let l2 = line("2", &[("B", "Beta 2", 50.07, 19.95), ("C", "Gamma", 50.08, 19.96)]);

        let forward = build(vec![l1.clone(), l2.clone()]);
        let backward = build(vec![l2, l1]);
        assert_eq!(forward, backward);
        assert_eq!(forward.0.name, "Beta 2");
    }

    #[test]
    fn lines_serving_matches_line_declarations() {
        let registry = NetworkRegistry::build(vec![
            line("1", &[("A", "Alpha", 50.06, 19.94), ("B", "Beta", 50.07, 19.95)]),
            line("4", &[("B", "Beta", 50.07, 19.95), ("C", "Gamma", 50.08, 19.96)]),
            line("8", &[("A", "Alpha", 50.06, 19.94), ("C", "Gamma", 50.08, 19.96)]),
        ])
        .unwrap();

        for stop in registry.stops() {
            let expected = registry
                .lines()
                .filter(|l| l.serves(&stop.code))
                .map(|l| l.code.clone())
                .collect::<BTreeSet<_>>();
            assert_eq!(registry.lines_serving(&stop.code), Some(&expected));
        }
        assert!(registry.lines_serving(&StopCode::new("Z")).is_none());
    }

    #[test]
    fn queries_are_sorted() {
        let registry = NetworkRegistry::build(vec![
            line("10", &[("C", "Gamma", 50.08, 19.96), ("A", "Alpha", 50.06, 19.94)]),
            line("2", &[("B", "Beta", 50.07, 19.95), ("A", "Alpha", 50.06, 19.94)]),
        ])
        .unwrap();

        let lines = registry.lines().map(|l| l.code.as_str()).collect::<Vec<_>>();
        assert_eq!(lines, vec!["2", "10"]);
        let stops = registry.stops().map(|s| s.code.as_str()).collect::<Vec<_>>();
        assert_eq!(stops, vec!["A", "B", "C"]);
    }

    #[test]
    fn line_without_stops_is_rejected() {
        let mut empty = TramLine::new(LineCode::new("3"), Color::parse("#000000").unwrap());
        empty.add_shape(
            Shape::new(0, vec![coord! { x: 19.9, y: 50.0 }, coord! { x: 19.8, y: 50.1 }]).unwrap(),
        );

        let err = NetworkRegistry::build(vec![
            line("1", &[("A", "Alpha", 50.06, 19.94), ("B", "Beta", 50.07, 19.95)]),
            empty,
        ])
        .unwrap_err();
        assert_eq!(err, RegistryError::LineWithoutStops(LineCode::new("3")));
    }

    #[test]
    fn duplicate_line_is_rejected() {
        let l = line("1", &[("A", "Alpha", 50.06, 19.94), ("B", "Beta", 50.07, 19.95)]);
        let err = NetworkRegistry::build(vec![l.clone(), l]).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateLine(LineCode::new("1")));
    }

    #[test]
    fn undeclared_stop_in_sequence_is_rejected() {
        let mut l = line("1", &[("A", "Alpha", 50.06, 19.94), ("B", "Beta", 50.07, 19.95)]);
        l.stop_sequences.entry(1).or_default().push(StopCode::new("X"));

        let err = NetworkRegistry::build(vec![l]).unwrap_err();
        assert_eq!(
            err,
            RegistryError::UndeclaredStop {
                line: LineCode::new("1"),
                stop: StopCode::new("X"),
            }
        );
    }

    #[test]
    fn bounds_cover_all_stops() {
        let registry = NetworkRegistry::build(vec![
            line("1", &[("A", "Alpha", 50.06, 19.94), ("B", "Beta", 50.07, 19.95)]),
            line("4", &[("B", "Beta", 50.07, 19.95), ("C", "Gamma", 50.08, 19.96)]),
        ])
        .unwrap();

        let bounds = registry.bounds().unwrap();
        assert_eq!(bounds.min(), coord! { x: 19.94, y: 50.06 });
        assert_eq!(bounds.max(), coord! { x: 19.96, y: 50.08 });
    }

    #[test]
    fn validate_flags_endpoints_far_from_stops() {
        let mut l = line("1", &[("A", "Alpha", 50.06, 19.94), ("B", "Beta", 50.07, 19.95)]);
        // ~1.1 km north of B
        l.add_shape(
            Shape::new(1, vec![coord! { x: 19.95, y: 50.07 }, coord! { x: 19.95, y: 50.08 }])
                .unwrap(),
        );
        let registry = NetworkRegistry::build(vec![l]).unwrap();

        let warnings = registry.validate();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].shape_index, 1);
        assert!(warnings[0].distance > 1000.0);
    }
}
