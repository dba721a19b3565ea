use std::{collections::BTreeMap, str::FromStr, time::Duration};

use geojson::{FeatureCollection, GeoJson};
use reqwest::blocking::Client;
use thiserror::Error;

use crate::{
    cache::{CacheError, RawRecord, RecordCache},
    network::line::LineCode,
    settings::SourceSettings,
    split::split_network,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} is not a GeoJSON FeatureCollection: {reason}")]
    InvalidDocument { url: String, reason: String },
    #[error("cannot encode line record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("source has no record for line {0}")]
    UnknownLine(LineCode),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Where raw line records come from.
pub trait RecordSource {
    fn line_codes(&self) -> Result<Vec<LineCode>, FetchError>;
    fn fetch(&self, line: &LineCode) -> Result<RawRecord, FetchError>;
}

/// Per-line records cut from the city-wide route and stop files.
pub struct HttpSource {
    records: BTreeMap<LineCode, RawRecord>,
}

impl HttpSource {
    /// Downloads both files once and splits them by line.
    pub fn download(settings: &SourceSettings) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let routes = collection(&client, &settings.routes_url)?;
        let stops = collection(&client, &settings.stops_url)?;
        log::info!(
            "downloaded {} route and {} stop feature(s)",
            routes.features.len(),
            stops.features.len()
        );

        Self::from_collections(&routes, &stops, settings.stop_radius)
    }

    pub fn from_collections(
        routes: &FeatureCollection,
        stops: &FeatureCollection,
        stop_radius: f64,
    ) -> Result<Self, FetchError> {
        let records = split_network(routes, stops, stop_radius)?;
        Ok(Self { records })
    }
}

fn collection(client: &Client, url: &str) -> Result<FeatureCollection, FetchError> {
    let text = client.get(url).send()?.error_for_status()?.text()?;
    let invalid = |reason: String| FetchError::InvalidDocument {
        url: url.to_owned(),
        reason,
    };

    match GeoJson::from_str(&text) {
        Ok(GeoJson::FeatureCollection(fc)) => Ok(fc),
        Ok(_) => Err(invalid("expected a FeatureCollection".to_owned())),
        Err(e) => Err(invalid(e.to_string())),
    }
}

impl RecordSource for HttpSource {
    fn line_codes(&self) -> Result<Vec<LineCode>, FetchError> {
        Ok(self.records.keys().cloned().collect())
    }

    fn fetch(&self, line: &LineCode) -> Result<RawRecord, FetchError> {
        self.records
            .get(line)
            .cloned()
            .ok_or_else(|| FetchError::UnknownLine(line.clone()))
    }
}

#[derive(Debug, Default)]
pub struct FetchSummary {
    pub fetched: Vec<LineCode>,
    pub already_cached: Vec<LineCode>,
    pub failed: Vec<(LineCode, String)>,
}

/// Downloads every line the source lists that is not cached yet. A failing
/// line is logged and recorded, the others are still fetched.
pub fn fetch_into<S: RecordSource, C: RecordCache>(
    source: &S,
    cache: &C,
) -> Result<FetchSummary, FetchError> {
    let mut summary = FetchSummary::default();

    for line in source.line_codes()? {
        if cache.has(&line) {
            log::debug!("line {line} already cached");
            summary.already_cached.push(line);
            continue;
        }

        let stored = source
            .fetch(&line)
            .and_then(|record| cache.write(&line, &record).map_err(FetchError::from));
        match stored {
            Ok(()) => {
                log::info!("fetched line {line}");
                summary.fetched.push(line);
            }
            Err(e) => {
                log::warn!("failed to fetch line {line}: {e}");
                summary.failed.push((line, e.to_string()));
            }
        }
    }

    Ok(summary)
}
