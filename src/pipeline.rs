use itertools::Itertools;
use rayon::prelude::*;
use thiserror::Error;

use crate::{
    cache::{CacheError, RecordCache},
    compose::{BaseStyle, ComposeError, Document, MapComposer},
    layer::{build_line_layers, build_route_layer, build_stop_layer},
    network::{
        line::{LineCode, TramLine},
        NetworkRegistry, RegistryError, ValidationWarning,
    },
    parse::parse,
};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("cannot list cached records: {0}")]
    Cache(#[from] CacheError),
    #[error("no usable line records were found, run the fetch step first")]
    NothingLoaded,
    #[error("cannot build the network: {0}")]
    Registry(#[from] RegistryError),
    #[error("cannot compose the map: {0}")]
    Compose(#[from] ComposeError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub line: LineCode,
    pub reason: String,
}

/// Lines that parsed, and every record that did not.
#[derive(Debug)]
pub struct LoadReport {
    pub lines: Vec<TramLine>,
    pub skipped: Vec<SkippedRecord>,
}

impl LoadReport {
    pub fn log_summary(&self) {
        log::info!("loaded {} line(s)", self.lines.len());
        if self.skipped.is_empty() {
            return;
        }

        log::warn!(
            "skipped {} record(s): {}",
            self.skipped.len(),
            self.skipped.iter().map(|s| &s.line).join(", ")
        );
        for s in self.skipped.iter() {
            log::warn!("line {}: {}", s.line, s.reason);
        }
    }
}

/// Reads and parses every cached record in parallel. Bad records are
/// reported, never fatal.
pub fn load_lines<C: RecordCache + Sync>(cache: &C) -> Result<LoadReport, CacheError> {
    let codes = cache.line_codes()?;

    let results = codes
        .par_iter()
        .map(|code| {
            let line = cache
                .read(code)
                .map_err(|e| e.to_string())
                .and_then(|raw| parse(&raw).map_err(|e| e.to_string()))
                .and_then(|line| {
                    if &line.code == code {
                        Ok(line)
                    } else {
                        Err(format!("record describes line {} instead", line.code))
                    }
                });
            (code.clone(), line)
        })
        .collect::<Vec<_>>();

    let mut lines = vec![];
    let mut skipped = vec![];
    for (code, result) in results {
        match result {
            Ok(line) => lines.push(line),
            Err(reason) => skipped.push(SkippedRecord { line: code, reason }),
        }
    }
    lines.sort_by(|a, b| a.code.cmp(&b.code));
    skipped.sort_by(|a, b| a.line.cmp(&b.line));

    Ok(LoadReport { lines, skipped })
}

pub struct RenderOptions {
    pub title: String,
    pub per_line_layers: bool,
    pub styles: Vec<BaseStyle>,
}

pub struct Rendered {
    pub document: Document,
    pub registry: NetworkRegistry,
    pub skipped: Vec<SkippedRecord>,
    pub warnings: Vec<ValidationWarning>,
}

/// load, parse, register, build layers, compose.
pub fn render<C: RecordCache + Sync>(
    cache: &C,
    options: &RenderOptions,
) -> Result<Rendered, PipelineError> {
    let report = load_lines(cache)?;
    report.log_summary();
    if report.lines.is_empty() {
        return Err(PipelineError::NothingLoaded);
    }

    let registry = NetworkRegistry::build(report.lines)?;
    log::info!(
        "network has {} stop(s) on {} line(s), {} stop conflict(s)",
        registry.stops().count(),
        registry.lines().count(),
        registry.conflicts().len()
    );
    if let Some(bounds) = registry.bounds() {
        log::debug!(
            "stops span lat {}..{}, lon {}..{}",
            bounds.min().y,
            bounds.max().y,
            bounds.min().x,
            bounds.max().x
        );
    }

    let warnings = registry.validate();
    for w in warnings.iter() {
        log::warn!(
            "line {} shape {} ends {:.0} m from the nearest stop of the line",
            w.line,
            w.shape_index,
            w.distance
        );
    }

    let mut layers = vec![build_route_layer(&registry), build_stop_layer(&registry)];
    if options.per_line_layers {
        layers.extend(build_line_layers(&registry));
    }

    let document = MapComposer::new(&options.title).compose(&layers, &options.styles)?;

    Ok(Rendered {
        document,
        registry,
        skipped: report.skipped,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{DirectoryCache, RawRecord},
        layer::{ROUTES_LAYER, STOPS_LAYER},
        network::stop::StopCode,
        parse::tests::{record, shape_feature, stop_feature},
    };
    use std::{collections::BTreeMap, sync::Mutex};

    #[derive(Default)]
    struct MemoryCache {
        records: Mutex<BTreeMap<LineCode, RawRecord>>,
    }

    impl RecordCache for MemoryCache {
        fn has(&self, line: &LineCode) -> bool {
            self.records.lock().unwrap().contains_key(line)
        }

        fn read(&self, line: &LineCode) -> Result<RawRecord, CacheError> {
            self.records
                .lock()
                .unwrap()
                .get(line)
                .cloned()
                .ok_or_else(|| CacheError::InvalidKey(line.to_string()))
        }

        fn write(&self, line: &LineCode, record: &RawRecord) -> Result<(), CacheError> {
            self.records
                .lock()
                .unwrap()
                .insert(line.clone(), record.clone());
            Ok(())
        }

        fn line_codes(&self) -> Result<Vec<LineCode>, CacheError> {
            Ok(self.records.lock().unwrap().keys().cloned().collect())
        }
    }

    fn options() -> RenderOptions {
        RenderOptions {
            title: "Test".to_owned(),
            per_line_layers: false,
            styles: BaseStyle::presets(),
        }
    }

    fn two_line_cache<C: RecordCache>(cache: &C) {
        cache
            .write(
                &LineCode::new("1"),
                &record(
                    "1",
                    vec![
                        shape_feature(&[(50.06, 19.94), (50.07, 19.95)], 0),
                        stop_feature("A", "Alpha", 50.06, 19.94, 0),
                        stop_feature("B", "Beta", 50.07, 19.95, 0),
                    ],
                ),
            )
            .unwrap();
        cache
            .write(
                &LineCode::new("4"),
                &record(
                    "4",
                    vec![
                        shape_feature(&[(50.07, 19.95), (50.08, 19.96)], 0),
                        stop_feature("B", "Beta", 50.07, 19.95, 0),
                        stop_feature("C", "Gamma", 50.08, 19.96, 0),
                    ],
                ),
            )
            .unwrap();
    }

    #[test]
    fn two_lines_sharing_a_stop() {
        let cache = MemoryCache::default();
        two_line_cache(&cache);

        let rendered = render(&cache, &options()).unwrap();

        assert_eq!(rendered.registry.stops().count(), 3);
        let serving = rendered
            .registry
            .lines_serving(&StopCode::new("B"))
            .unwrap()
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>();
        assert_eq!(serving, vec!["1", "4"]);
        assert_eq!(rendered.document.primitive_count(ROUTES_LAYER), Some(2));
        assert_eq!(rendered.document.primitive_count(STOPS_LAYER), Some(3));
        assert_eq!(rendered.document.html.matches(r#""kind":"route""#).count(), 2);
        assert_eq!(rendered.document.html.matches(r#""kind":"stop""#).count(), 3);
        assert!(rendered.skipped.is_empty());
        assert!(rendered.warnings.is_empty());
    }

    #[test]
    fn malformed_record_is_skipped_and_reported() {
        let cache = MemoryCache::default();
        two_line_cache(&cache);
        cache
            .write(
                &LineCode::new("8"),
                &record(
                    "8",
                    vec![
                        shape_feature(&[(50.06, 19.94)], 0),
                        stop_feature("A", "Alpha", 50.06, 19.94, 0),
                    ],
                ),
            )
            .unwrap();

        let report = load_lines(&cache).unwrap();
        assert_eq!(report.lines.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].line, LineCode::new("8"));

        let rendered = render(&cache, &options()).unwrap();
        assert_eq!(rendered.registry.lines().count(), 2);
        assert_eq!(rendered.skipped.len(), 1);
    }

    #[test]
    fn record_filed_under_another_line_is_skipped() {
        let cache = MemoryCache::default();
        two_line_cache(&cache);
        let four = cache.read(&LineCode::new("4")).unwrap();
        cache.write(&LineCode::new("44"), &four).unwrap();

        let report = load_lines(&cache).unwrap();
        assert_eq!(report.lines.len(), 2);
        assert_eq!(
            report.skipped,
            vec![SkippedRecord {
                line: LineCode::new("44"),
                reason: "record describes line 4 instead".to_owned(),
            }]
        );
    }

    #[test]
    fn empty_cache_aborts() {
        let cache = MemoryCache::default();
        assert!(matches!(
            render(&cache, &options()),
            Err(PipelineError::NothingLoaded)
        ));
    }

    #[test]
    fn per_line_layers_are_added_on_request() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DirectoryCache::new(dir.path().join("lines"));
        two_line_cache(&cache);

        let rendered = render(
            &cache,
            &RenderOptions {
                per_line_layers: true,
                ..options()
            },
        )
        .unwrap();

        assert_eq!(rendered.document.primitive_count("Line 1"), Some(1));
        assert_eq!(rendered.document.primitive_count("Line 4"), Some(1));

        let out = dir.path().join("out").join("map.html");
        rendered.document.write(&out).unwrap();
        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written, rendered.document.html);
    }
}
