use geo_types::{LineString, Point};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use handlebars::html_escape;
use itertools::Itertools;
use serde::Serialize;

use crate::network::{
    line::{Color, Direction, LineCode, TramLine},
    stop::{Stop, StopCode},
    NetworkRegistry,
};

pub const ROUTES_LAYER: &str = "Routes";
pub const STOPS_LAYER: &str = "Stops";

/// Metadata shown when a primitive is clicked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Popup {
    Route {
        line: LineCode,
        direction: Direction,
    },
    Stop {
        name: String,
        code: StopCode,
        lines: Vec<LineCode>,
        #[serde(skip_serializing_if = "Option::is_none")]
        object_id: Option<String>,
    },
}

impl Popup {
    pub fn html(&self) -> String {
        match self {
            Popup::Route { line, direction } => format!(
                "<b>Line {}</b><br>Direction {direction}",
                html_escape(line.as_str())
            ),
            Popup::Stop {
                name,
                code,
                lines,
                object_id,
            } => {
                let mut html = format!(
                    "<b>{}</b><br>Code: {}<br>Lines: {}",
                    html_escape(name),
                    html_escape(code.as_str()),
                    html_escape(&lines.iter().join(", "))
                );
                if let Some(id) = object_id {
                    html.push_str(&format!("<br>ID: {}", html_escape(id)));
                }
                html
            }
        }
    }

    pub fn tooltip(&self) -> String {
        match self {
            Popup::Route { line, .. } => format!("Tram Line {}", html_escape(line.as_str())),
            Popup::Stop { name, .. } => html_escape(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Polyline {
        path: LineString<f64>,
        color: Color,
        popup: Popup,
    },
    Marker {
        position: Point<f64>,
        popup: Popup,
    },
}

impl Primitive {
    fn to_feature(&self) -> Feature {
        let (geometry, color, popup) = match self {
            Primitive::Polyline { path, color, popup } => {
                (Geometry::new(geojson::Value::from(path)), Some(color), popup)
            }
            Primitive::Marker { position, popup } => {
                (Geometry::new(geojson::Value::from(position)), None, popup)
            }
        };

        let mut properties = match serde_json::to_value(popup) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => JsonObject::new(),
        };
        if let Some(color) = color {
            properties.insert("color".to_owned(), color.as_str().into());
        }
        properties.insert("popup".to_owned(), popup.html().into());
        properties.insert("tooltip".to_owned(), popup.tooltip().into());

        Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// A named group of primitives that can be toggled on the map as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub name: String,
    pub visible: bool,
    pub primitives: Vec<Primitive>,
}

impl Layer {
    pub fn new(name: &str, visible: bool) -> Self {
        Self {
            name: name.to_owned(),
            visible,
            primitives: vec![],
        }
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn marker_positions(&self) -> impl Iterator<Item = Point<f64>> + '_ {
        self.primitives.iter().filter_map(|p| match p {
            Primitive::Marker { position, .. } => Some(*position),
            Primitive::Polyline { .. } => None,
        })
    }

    pub fn to_geojson(&self) -> FeatureCollection {
        FeatureCollection {
            bbox: None,
            features: self.primitives.iter().map(Primitive::to_feature).collect(),
            foreign_members: None,
        }
    }
}

fn push_shapes(layer: &mut Layer, line: &TramLine) {
    for shape in line.shapes.iter() {
        layer.primitives.push(Primitive::Polyline {
            path: shape.path.clone(),
            color: line.color.clone(),
            popup: Popup::Route {
                line: line.code.clone(),
                direction: shape.direction,
            },
        });
    }
}

/// One polyline per shape, lines in ascending code order.
pub fn build_route_layer(registry: &NetworkRegistry) -> Layer {
    let mut layer = Layer::new(ROUTES_LAYER, true);
    for line in registry.lines() {
        push_shapes(&mut layer, line);
    }
    layer
}

fn stop_marker(stop: &Stop) -> Primitive {
    Primitive::Marker {
        position: stop.position,
        popup: Popup::Stop {
            name: stop.name.clone(),
            code: stop.code.clone(),
            lines: stop.lines.iter().cloned().collect(),
            object_id: stop.object_id.clone(),
        },
    }
}

/// One marker per stop, ascending by stop code.
pub fn build_stop_layer(registry: &NetworkRegistry) -> Layer {
    let mut layer = Layer::new(STOPS_LAYER, true);
    layer
        .primitives
        .extend(registry.stops().map(stop_marker));
    layer
}

/// A hidden layer per line so single lines can be shown on their own.
pub fn build_line_layers(registry: &NetworkRegistry) -> Vec<Layer> {
    registry
        .lines()
        .map(|line| {
            let mut layer = Layer::new(&format!("Line {}", line.code), false);
            push_shapes(&mut layer, line);
            layer
        })
        .collect()
}
