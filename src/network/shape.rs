use geo_types::{Coord, LineString, Point};
use thiserror::Error;

use crate::network::line::Direction;

#[derive(Error, Debug, PartialEq)]
pub enum ShapeError {
    #[error("shape has {0} point(s), at least 2 are required")]
    TooFewPoints(usize),
    #[error("shape collapses to a single point once repeated points are removed")]
    Degenerate,
}

/// Path geometry of one directional variant of a line.
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub direction: Direction,
    pub path: LineString<f64>,
}

impl Shape {
    /// Consecutive duplicate points are collapsed.
    pub fn new(direction: Direction, coords: Vec<Coord<f64>>) -> Result<Self, ShapeError> {
        if coords.len() < 2 {
            return Err(ShapeError::TooFewPoints(coords.len()));
        }

        let mut path: Vec<Coord<f64>> = Vec::with_capacity(coords.len());
        for c in coords {
            if path.last() != Some(&c) {
                path.push(c);
            }
        }

        if path.len() < 2 {
            return Err(ShapeError::Degenerate);
        }

        Ok(Self {
            direction,
            path: LineString::new(path),
        })
    }

    pub fn start(&self) -> Point<f64> {
        Point::from(self.path.0[0])
    }

    pub fn end(&self) -> Point<f64> {
        Point::from(self.path.0[self.path.0.len() - 1])
    }
}
