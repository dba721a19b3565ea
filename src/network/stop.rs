use std::{collections::BTreeSet, fmt};

use geo_types::Point;
use serde::Serialize;

use crate::network::line::LineCode;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct StopCode(String);

impl StopCode {
    pub fn new(str: &str) -> Self {
        Self(str.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StopCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds a point from latitude and longitude, or `None` when either is out of range.
pub fn checked_position(lat: f64, lon: f64) -> Option<Point<f64>> {
    let valid = lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon);

    valid.then(|| Point::new(lon, lat))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stop {
    pub code: StopCode,
    pub name: String,
    /// x is longitude, y is latitude
    pub position: Point<f64>,
    pub lines: BTreeSet<LineCode>,
    /// Upstream object id, when the source carries one.
    pub object_id: Option<String>,
}

impl Stop {
    pub fn new(code: StopCode, name: String, position: Point<f64>, line: LineCode) -> Self {
        Self {
            code,
            name,
            position,
            lines: BTreeSet::from([line]),
            object_id: None,
        }
    }

    pub fn with_object_id(mut self, object_id: Option<String>) -> Self {
        self.object_id = object_id;
        self
    }

    pub fn lat(&self) -> f64 {
        self.position.y()
    }

    pub fn lon(&self) -> f64 {
        self.position.x()
    }

    /// Same name and position, ignoring which lines serve the stop.
    pub fn same_place(&self, other: &Stop) -> bool {
        self.name == other.name && self.position == other.position
    }
}
