use std::path::PathBuf;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::compose::BaseStyle;

/// Name of the optional settings file looked up in the working directory.
pub const SETTINGS_FILE: &str = "tram-map";
const ENV_PREFIX: &str = "TRAM_MAP";

const ROUTES_URL: &str = "https://services-eu1.arcgis.com/svTzSt3AvH7sK6q9/arcgis/rest/services/Linie_KMK/FeatureServer/replicafilescache/Linie_KMK_7975846146257302888.geojson";
const STOPS_URL: &str = "https://services-eu1.arcgis.com/svTzSt3AvH7sK6q9/arcgis/rest/services/Przystanki_Komunikacji_Miejskiej_w_Krakowie/FeatureServer/replicafiles/Przystanki_Komunikacji_Miejskiej_w_Krakowie_a0e9215fd033414eb9f5f0d6d3ae21ab.geojson";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// City-wide GeoJSON of route geometries, one `LineString` per route
    /// with a `Numer` property.
    pub routes_url: String,
    /// City-wide GeoJSON of stop points.
    pub stops_url: String,
    /// A stop serves a route when it lies within this many meters of it.
    pub stop_radius: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub output: PathBuf,
    pub title: String,
    pub per_line_layers: bool,
    pub source: SourceSettings,
    pub styles: Vec<BaseStyle>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/lines"),
            output: PathBuf::from("tram_network_map.html"),
            title: "Tram network".to_owned(),
            per_line_layers: false,
            source: SourceSettings {
                routes_url: ROUTES_URL.to_owned(),
                stops_url: STOPS_URL.to_owned(),
                stop_radius: 40.0,
            },
            styles: BaseStyle::presets(),
        }
    }
}

impl Settings {
    /// Defaults, then `tram-map.toml` if present, then `TRAM_MAP__*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(SETTINGS_FILE)
    }

    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name(file).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()
    }
}
