use std::collections::BTreeMap;

use geo::{Closest, ClosestPoint, Distance, Haversine, LineLocatePoint};
use geo_types::{Coord, LineString, Point};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use itertools::Itertools;
use serde_json::Value;

use crate::{
    cache::RawRecord,
    network::line::LineCode,
    parse::{identity, is_shape, position, property, shape_line},
};

/// A stop from the city-wide stops file, not yet tied to any line.
#[derive(Debug, Clone, PartialEq)]
struct StopCandidate {
    code: String,
    name: String,
    object_id: Option<String>,
    position: Point<f64>,
}

fn stop_candidates(stops: &FeatureCollection) -> Vec<StopCandidate> {
    stops
        .features
        .iter()
        .enumerate()
        .filter_map(|(idx, feature)| {
            let geojson::Value::Point(p) = &feature.geometry.as_ref()?.value else {
                return None;
            };
            let Some(code) = property(feature, &["kod_busman", "code"]).and_then(identity) else {
                log::debug!("stop feature {idx} has no code, ignored");
                return None;
            };
            let position = match position(p, idx) {
                Ok(position) => position,
                Err(e) => {
                    log::debug!("stop {code} ignored: {e}");
                    return None;
                }
            };
            let name = property(feature, &["Nazwa_przystanku_nr", "name"])
                .and_then(identity)
                .unwrap_or_else(|| code.clone());

            Some(StopCandidate {
                object_id: property(feature, &["OBJECTID", "object_id"]).and_then(identity),
                code,
                name,
                position,
            })
        })
        .collect()
}

fn path_of(feature: &Feature) -> Option<LineString<f64>> {
    match &feature.geometry.as_ref()?.value {
        geojson::Value::LineString(points) => Some(
            points
                .iter()
                .filter_map(|p| match p.as_slice() {
                    [lon, lat, ..] => Some(Coord { x: *lon, y: *lat }),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    }
}

/// Meters from the stop to the closest point of the path.
fn distance_to(path: &LineString<f64>, stop: Point<f64>) -> Option<f64> {
    match path.closest_point(&stop) {
        Closest::Intersection(p) | Closest::SinglePoint(p) => Some(Haversine.distance(p, stop)),
        Closest::Indeterminate => None,
    }
}

/// Stops within `radius` meters of the path, in travel order.
fn stops_along<'a>(
    path: &LineString<f64>,
    candidates: &'a [StopCandidate],
    radius: f64,
) -> Vec<&'a StopCandidate> {
    candidates
        .iter()
        .filter(|c| distance_to(path, c.position).is_some_and(|d| d <= radius))
        .filter_map(|c| Some((path.line_locate_point(&c.position)?, c)))
        .sorted_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, c)| c)
        .collect()
}

fn stop_feature(stop: &StopCandidate, direction: usize) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("code".to_owned(), stop.code.clone().into());
    properties.insert("name".to_owned(), stop.name.clone().into());
    if let Some(id) = &stop.object_id {
        properties.insert("object_id".to_owned(), id.clone().into());
    }
    properties.insert("direction".to_owned(), direction.into());

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(geojson::Value::from(&stop.position))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Splits the city-wide route and stop collections into one raw record per
/// line.
///
/// Routes are grouped by their `Numer` property and keep it, so each record
/// names its line through its features. Every route becomes one direction,
/// numbered in file order, served by the stops within `radius` meters of it
/// in the order the route passes them. Lines with no stop near any of their
/// routes are left out.
pub fn split_network(
    routes: &FeatureCollection,
    stops: &FeatureCollection,
    radius: f64,
) -> Result<BTreeMap<LineCode, RawRecord>, serde_json::Error> {
    let candidates = stop_candidates(stops);

    let mut by_line: BTreeMap<LineCode, Vec<&Feature>> = BTreeMap::new();
    for (idx, feature) in routes.features.iter().enumerate().filter(|(_, f)| is_shape(f)) {
        match shape_line(feature) {
            Some(line) => by_line.entry(line).or_default().push(feature),
            None => log::warn!("route feature {idx} has no line number, ignored"),
        }
    }

    let mut records = BTreeMap::new();
    for (line, shapes) in by_line {
        let mut features = vec![];
        let mut stop_features = vec![];

        for (direction, shape) in shapes.into_iter().enumerate() {
            let mut route = shape.clone();
            route
                .properties
                .get_or_insert_with(JsonObject::new)
                .insert("direction".to_owned(), Value::from(direction));

            if let Some(path) = path_of(shape) {
                let along = stops_along(&path, &candidates, radius);
                stop_features.extend(along.into_iter().map(|s| stop_feature(s, direction)));
            }
            features.push(route);
        }

        if stop_features.is_empty() {
            log::warn!("no stop lies within {radius} m of line {line}, line left out");
            continue;
        }

        features.append(&mut stop_features);
        let collection = FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        };
        records.insert(line, RawRecord::new(serde_json::to_string(&collection)?));
    }

    Ok(records)
}
