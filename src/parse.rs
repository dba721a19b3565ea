use std::{collections::BTreeSet, str::FromStr};

use geo_types::{Coord, Point};
use geojson::{Feature, GeoJson};
use serde_json::Value;
use thiserror::Error;

use crate::{
    cache::RawRecord,
    network::{
        line::{Color, Direction, LineCode, TramLine},
        palette::default_color,
        shape::{Shape, ShapeError},
        stop::{checked_position, Stop, StopCode},
    },
};

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("record is not a GeoJSON FeatureCollection: {0}")]
    InvalidDocument(String),
    #[error("record does not name its line")]
    MissingLineCode,
    #[error("invalid line color '{0}', expected #rrggbb")]
    InvalidColor(String),
    #[error("feature {feature}: stop has no code")]
    MissingStopCode { feature: usize },
    #[error("feature {feature}: malformed coordinates {coordinates:?}")]
    MalformedCoordinates {
        feature: usize,
        coordinates: Vec<f64>,
    },
    #[error("feature {feature}: direction must be a non-negative integer, found {value}")]
    InvalidDirection { feature: usize, value: String },
    #[error("feature {feature}: {source}")]
    Shape {
        feature: usize,
        #[source]
        source: ShapeError,
    },
    #[error("stop {0} is declared twice with different names or positions")]
    InconsistentStop(StopCode),
    #[error("record has no route geometry")]
    NoShapes,
    #[error("feature {feature}: route belongs to line {found}, not {expected}")]
    ForeignShape {
        feature: usize,
        expected: LineCode,
        found: LineCode,
    },
}

/// String or integer property, as upstream sources are not consistent about either.
pub(crate) fn identity(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn property<'a>(feature: &'a Feature, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| feature.property(k))
        .find(|v| !v.is_null())
}

pub(crate) fn position(coordinates: &[f64], feature: usize) -> Result<Point<f64>, ParseError> {
    let malformed = || ParseError::MalformedCoordinates {
        feature,
        coordinates: coordinates.to_vec(),
    };

    match coordinates {
        [lon, lat, ..] => checked_position(*lat, *lon).ok_or_else(malformed),
        _ => Err(malformed()),
    }
}

fn direction(feature: &Feature, idx: usize) -> Result<Option<Direction>, ParseError> {
    match property(feature, &["direction"]) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .and_then(|d| Direction::try_from(d).ok())
            .map(Some)
            .ok_or_else(|| ParseError::InvalidDirection {
                feature: idx,
                value: v.to_string(),
            }),
    }
}

pub(crate) fn is_shape(feature: &Feature) -> bool {
    matches!(
        feature.geometry.as_ref().map(|g| &g.value),
        Some(geojson::Value::LineString(_))
    )
}

pub(crate) fn shape_line(feature: &Feature) -> Option<LineCode> {
    property(feature, &["Numer", "line"])
        .and_then(identity)
        .map(|s| LineCode::new(&s))
}

/// Validates one line's raw record into a [`TramLine`].
///
/// The record is a GeoJSON FeatureCollection. The line code is the `line` (or
/// `Numer`) foreign member, or else the `Numer` property of its `LineString`
/// features, which must all agree. `color` is an optional foreign member.
/// `LineString` features become shapes, `Point` features become stops in
/// service order for their `direction`. Any other geometry is ignored.
///
/// A shape without a `direction` takes the lowest index no other shape of the
/// record uses.
pub fn parse(record: &RawRecord) -> Result<TramLine, ParseError> {
    let collection = match GeoJson::from_str(record.as_str()) {
        Ok(GeoJson::FeatureCollection(fc)) => fc,
        Ok(_) => {
            return Err(ParseError::InvalidDocument(
                "expected a FeatureCollection".to_owned(),
            ))
        }
        Err(e) => return Err(ParseError::InvalidDocument(e.to_string())),
    };

    let members = collection.foreign_members.as_ref();
    let member = |key: &str| members.and_then(|m| m.get(key)).filter(|v| !v.is_null());

    let code = member("line")
        .or_else(|| member("Numer"))
        .and_then(identity)
        .map(|s| LineCode::new(&s))
        .or_else(|| collection.features.iter().filter(|f| is_shape(f)).find_map(shape_line))
        .ok_or(ParseError::MissingLineCode)?;

    let mut used = BTreeSet::new();
    for (idx, feature) in collection.features.iter().enumerate() {
        if is_shape(feature) {
            used.extend(direction(feature, idx)?);
        }
    }
    let mut next_free: Direction = 0;

    let color = match member("color") {
        None => default_color(&code),
        Some(Value::String(s)) => {
            Color::parse(s).ok_or_else(|| ParseError::InvalidColor(s.clone()))?
        }
        Some(other) => return Err(ParseError::InvalidColor(other.to_string())),
    };

    let mut line = TramLine::new(code, color);

    for (idx, feature) in collection.features.iter().enumerate() {
        let Some(geometry) = &feature.geometry else {
            continue;
        };

        match &geometry.value {
            geojson::Value::LineString(points) => {
                let coords = points
                    .iter()
                    .map(|p| position(p, idx).map(Coord::from))
                    .collect::<Result<Vec<_>, _>>()?;
                if let Some(found) = shape_line(feature).filter(|found| found != &line.code) {
                    return Err(ParseError::ForeignShape {
                        feature: idx,
                        expected: line.code.clone(),
                        found,
                    });
                }
                let direction = match direction(feature, idx)? {
                    Some(d) => d,
                    None => {
                        while used.contains(&next_free) {
                            next_free += 1;
                        }
                        used.insert(next_free);
                        next_free
                    }
                };
                let shape = Shape::new(direction, coords)
                    .map_err(|source| ParseError::Shape { feature: idx, source })?;

                line.add_shape(shape);
            }
            geojson::Value::Point(p) => {
                let position = position(p, idx)?;
                let code = property(feature, &["code", "kod_busman"])
                    .and_then(identity)
                    .map(|s| StopCode::new(&s))
                    .ok_or(ParseError::MissingStopCode { feature: idx })?;
                let name = property(feature, &["name", "Nazwa_przystanku_nr"])
                    .and_then(identity)
                    .unwrap_or_else(|| code.to_string());
                let object_id = property(feature, &["object_id", "OBJECTID"]).and_then(identity);
                let direction = direction(feature, idx)?.unwrap_or(0);

                let stop = Stop::new(code.clone(), name, position, line.code.clone())
                    .with_object_id(object_id);
                match line.stops.iter().find(|s| s.code == code) {
                    Some(existing) if !existing.same_place(&stop) => {
                        return Err(ParseError::InconsistentStop(code));
                    }
                    Some(_) => {}
                    None => line.stops.push(stop),
                }

                let sequence = line.stop_sequences.entry(direction).or_default();
                if !sequence.contains(&code) {
                    sequence.push(code);
                }
            }
            _ => {}
        }
    }

    if line.shapes.is_empty() {
        return Err(ParseError::NoShapes);
    }

    Ok(line)
}
