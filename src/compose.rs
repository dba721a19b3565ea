use std::{
    fs::{self, File},
    io::Write,
    path::Path,
};

use geo_types::{coord, Point, Rect};
use handlebars::Handlebars;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::layer::Layer;

/// Share of the stop extent added around it when fitting the view.
const FIT_MARGIN: f64 = 0.05;
const MIN_FIT_MARGIN_DEGREES: f64 = 0.002;
/// How far past the fitted view the map may be panned.
const PAN_SLACK_DEGREES: f64 = 0.1;

const DEFAULT_TITLE: &str = "Tram network";

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("nothing to draw: no layers were given")]
    NoLayers,
    #[error("no base map styles were given")]
    NoBaseStyles,
    #[error("cannot frame the map: no layer contains a stop marker")]
    NoBounds,
    #[error("failure serializing layer {layer}: {source}")]
    Serialize {
        layer: String,
        source: serde_json::Error,
    },
    #[error("failure rendering map document: {0}")]
    Template(#[from] handlebars::RenderError),
}

/// A selectable background map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseStyle {
    pub name: String,
    /// Tile URL template with `{z}`, `{x}`, `{y}` (and optionally `{s}`, `{r}`) placeholders.
    pub url: String,
    pub attribution: String,
    pub max_zoom: u8,
}

impl BaseStyle {
    pub fn light() -> Self {
        Self {
            name: "CartoDB Positron (Light)".to_owned(),
            url: "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}{r}.png".to_owned(),
            attribution: "&copy; OpenStreetMap contributors &copy; CARTO".to_owned(),
            max_zoom: 20,
        }
    }

    pub fn terrain() -> Self {
        Self {
            name: "OpenStreetMap (Terrain)".to_owned(),
            url: "https://tile.openstreetmap.org/{z}/{x}/{y}.png".to_owned(),
            attribution: "&copy; OpenStreetMap contributors".to_owned(),
            max_zoom: 19,
        }
    }

    pub fn transit() -> Self {
        Self {
            name: "Voyager (Transit)".to_owned(),
            url: "https://{s}.basemaps.cartocdn.com/rastertiles/voyager/{z}/{x}/{y}{r}.png"
                .to_owned(),
            attribution: "&copy; OpenStreetMap contributors &copy; CARTO".to_owned(),
            max_zoom: 20,
        }
    }

    pub fn presets() -> Vec<Self> {
        vec![Self::light(), Self::terrain(), Self::transit()]
    }
}

/// The rendered map page.
#[derive(Debug)]
pub struct Document {
    pub html: String,
    pub bounds: Rect<f64>,
    primitive_counts: Vec<(String, usize)>,
}

impl Document {
    pub fn primitive_count(&self, layer: &str) -> Option<usize> {
        self.primitive_counts
            .iter()
            .find(|(name, _)| name == layer)
            .map(|(_, n)| *n)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(path)?;
        file.write_all(self.html.as_bytes())?;
        Ok(())
    }
}

/// Bounding box of the points widened by a margin on every side.
pub fn fit_bounds<I: IntoIterator<Item = Point<f64>>>(points: I) -> Option<Rect<f64>> {
    let points = points.into_iter().collect::<Vec<_>>();
    let (min_x, max_x) = points.iter().map(|p| p.x()).minmax_by(f64::total_cmp).into_option()?;
    let (min_y, max_y) = points.iter().map(|p| p.y()).minmax_by(f64::total_cmp).into_option()?;

    let dx = ((max_x - min_x) * FIT_MARGIN).max(MIN_FIT_MARGIN_DEGREES);
    let dy = ((max_y - min_y) * FIT_MARGIN).max(MIN_FIT_MARGIN_DEGREES);

    Some(Rect::new(
        coord! { x: (min_x - dx).max(-180.0), y: (min_y - dy).max(-90.0) },
        coord! { x: (max_x + dx).min(180.0), y: (max_y + dy).min(90.0) },
    ))
}

/// `[[south, west], [north, east]]`, the corner order Leaflet expects.
fn lat_lng_bounds(rect: &Rect<f64>) -> serde_json::Value {
    json!([[rect.min().y, rect.min().x], [rect.max().y, rect.max().x]])
}

/// JSON that can be placed inside a `<script>` element.
fn script_json(value: &serde_json::Value) -> String {
    value.to_string().replace("</", "<\\/")
}

fn get_handlebars() -> Handlebars<'static> {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars
}

pub struct MapComposer {
    title: String,
}

impl Default for MapComposer {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE)
    }
}

impl MapComposer {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_owned(),
        }
    }

    /// Renders the layers over the base styles. The first style is shown
    /// initially; every layer gets its own toggle.
    pub fn compose(
        &self,
        layers: &[Layer],
        styles: &[BaseStyle],
    ) -> Result<Document, ComposeError> {
        if layers.is_empty() {
            return Err(ComposeError::NoLayers);
        }
        if styles.is_empty() {
            return Err(ComposeError::NoBaseStyles);
        }

        let bounds = fit_bounds(layers.iter().flat_map(Layer::marker_positions))
            .ok_or(ComposeError::NoBounds)?;
        let max_bounds = Rect::new(
            coord! { x: bounds.min().x - PAN_SLACK_DEGREES, y: bounds.min().y - PAN_SLACK_DEGREES },
            coord! { x: bounds.max().x + PAN_SLACK_DEGREES, y: bounds.max().y + PAN_SLACK_DEGREES },
        );

        let overlays = layers
            .iter()
            .map(|layer| {
                let geojson = serde_json::to_value(layer.to_geojson()).map_err(|source| {
                    ComposeError::Serialize {
                        layer: layer.name.clone(),
                        source,
                    }
                })?;
                Ok(json!({
                    "name": layer.name,
                    "visible": layer.visible,
                    "geojson": geojson,
                }))
            })
            .collect::<Result<Vec<_>, ComposeError>>()?;

        let data = json!({
            "title": self.title,
            "generated_at": chrono::Local::now().to_rfc3339(),
            "bounds": script_json(&lat_lng_bounds(&bounds)),
            "max_bounds": script_json(&lat_lng_bounds(&max_bounds)),
            "styles": script_json(&json!(styles)),
            "layers": script_json(&json!(overlays)),
        });

        let html = get_handlebars().render_template(TEMPLATE, &data)?;

        Ok(Document {
            html,
            bounds,
            primitive_counts: layers.iter().map(|l| (l.name.clone(), l.len())).collect(),
        })
    }
}

pub fn compose(layers: &[Layer], styles: &[BaseStyle]) -> Result<Document, ComposeError> {
    MapComposer::default().compose(layers, styles)
}

const TEMPLATE: &str = r##"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <meta name="generator" content="tram-map {{generated_at}}">
  <title>{{title}}</title>
  <link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
  <link rel="stylesheet" href="https://unpkg.com/leaflet.fullscreen@3.0.2/Control.FullScreen.css">
  <link rel="stylesheet" href="https://unpkg.com/leaflet.locatecontrol@0.79.0/dist/L.Control.Locate.min.css">
  <script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
  <script src="https://unpkg.com/leaflet.fullscreen@3.0.2/Control.FullScreen.js"></script>
  <script src="https://unpkg.com/leaflet.locatecontrol@0.79.0/dist/L.Control.Locate.min.js"></script>
  <style>
    html, body, #map { height: 100%; margin: 0; }
  </style>
</head>
<body>
  <div id="map"></div>
  <script>
    const styles = {{{styles}}};
    const overlays = {{{layers}}};

    const map = L.map("map", { maxBounds: {{{max_bounds}}}, zoomControl: true });

    const baseLayers = {};
    styles.forEach((style, i) => {
      const tiles = L.tileLayer(style.url, { attribution: style.attribution, maxZoom: style.max_zoom });
      baseLayers[style.name] = tiles;
      if (i === 0) tiles.addTo(map);
    });

    const overlayLayers = {};
    overlays.forEach((overlay) => {
      const layer = L.geoJSON(overlay.geojson, {
        style: (feature) => ({ color: feature.properties.color, weight: 3, opacity: 0.7 }),
        pointToLayer: (feature, latlng) => L.circleMarker(latlng, {
          radius: 6, color: "#1e6bb8", weight: 2, fill: true, fillColor: "#dbedff", fillOpacity: 0.9
        }),
        onEachFeature: (feature, leafletLayer) => {
          leafletLayer.bindPopup(feature.properties.popup, { maxWidth: 300 });
          leafletLayer.bindTooltip(feature.properties.tooltip);
        }
      });
      overlayLayers[overlay.name] = layer;
      if (overlay.visible) layer.addTo(map);
    });

    L.control.layers(baseLayers, overlayLayers, { collapsed: false }).addTo(map);
    L.control.fullscreen({ position: "topright" }).addTo(map);
    L.control.locate({ position: "topleft" }).addTo(map);
    map.fitBounds({{{bounds}}});
  </script>
</body>
</html>
"##;
