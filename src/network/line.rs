use std::{cmp::Ordering, collections::BTreeMap, fmt};

use serde::Serialize;

use crate::network::{
    shape::Shape,
    stop::{Stop, StopCode},
};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct LineCode(String);

impl LineCode {
    pub fn new(str: &str) -> Self {
        Self(str.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn number(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl fmt::Display for LineCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Numbered lines come first in numeric order ("4" before "10"), named lines after them.
impl Ord for LineCode {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.number(), other.number()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for LineCode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// `#rrggbb`, lowercase.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Color(String);

impl Color {
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix('#')?;
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self(format!("#{}", hex.to_ascii_lowercase())))
    }

    /// For colors already known to be well formed.
    pub(super) fn trusted(s: &str) -> Self {
        Self(s.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub type Direction = u32;

#[derive(Debug, Clone)]
pub struct TramLine {
    pub code: LineCode,
    pub color: Color,
    pub shapes: Vec<Shape>,
    /// Stop codes in service order, per direction.
    pub stop_sequences: BTreeMap<Direction, Vec<StopCode>>,
    /// One declaration per distinct stop code, in first-seen order.
    pub stops: Vec<Stop>,
}

impl TramLine {
    pub fn new(code: LineCode, color: Color) -> Self {
        Self {
            code,
            color,
            shapes: vec![],
            stop_sequences: BTreeMap::new(),
            stops: vec![],
        }
    }

    pub fn add_shape(&mut self, shape: Shape) {
        self.shapes.push(shape);
    }

    pub fn serves(&self, code: &StopCode) -> bool {
        self.stops.iter().any(|s| &s.code == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn line_codes_sort_numerically_then_by_name() {
        let sorted = ["10", "N1", "4", "1", "52", "B"]
            .iter()
            .map(|s| LineCode::new(s))
            .sorted()
            .map(|c| c.to_string())
            .collect::<Vec<_>>();

        assert_eq!(sorted, vec!["1", "4", "10", "52", "B", "N1"]);
    }

    #[test]
    fn numerically_equal_codes_are_still_ordered() {
        let a = LineCode::new("01");
        let b = LineCode::new("1");
        assert_eq!(a.cmp(&b), Ordering::Less);
        assert_ne!(a, b);
    }

    #[test]
    fn color_parse_normalizes_case() {
        assert_eq!(Color::parse("#A1B2C3").unwrap().as_str(), "#a1b2c3");
        assert!(Color::parse("a1b2c3").is_none());
        assert!(Color::parse("#a1b2c").is_none());
        assert!(Color::parse("#zzzzzz").is_none());
    }
}
