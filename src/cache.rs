use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::network::line::LineCode;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failure accessing {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("line code '{0}' cannot be used as a cache key")]
    InvalidKey(String),
}

/// Unparsed document for one line, as delivered by the upstream source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord(String);

impl RawRecord {
    pub fn new(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Storage for fetched raw records, keyed by line code.
pub trait RecordCache {
    fn has(&self, line: &LineCode) -> bool;
    fn read(&self, line: &LineCode) -> Result<RawRecord, CacheError>;
    fn write(&self, line: &LineCode, record: &RawRecord) -> Result<(), CacheError>;
    /// Every cached line, ascending.
    fn line_codes(&self) -> Result<Vec<LineCode>, CacheError>;
}

/// One `<line>.json` file per line inside a single directory.
pub struct DirectoryCache {
    dir: PathBuf,
}

impl DirectoryCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, line: &LineCode) -> Result<PathBuf, CacheError> {
        let key = line.as_str();
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !valid {
            return Err(CacheError::InvalidKey(key.to_owned()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl RecordCache for DirectoryCache {
    fn has(&self, line: &LineCode) -> bool {
        self.path_for(line).map_or(false, |p| p.is_file())
    }

    fn read(&self, line: &LineCode) -> Result<RawRecord, CacheError> {
        let path = self.path_for(line)?;
        let mut f = File::open(&path).map_err(io_error(&path))?;
        let mut text = String::new();
        f.read_to_string(&mut text).map_err(io_error(&path))?;
        Ok(RawRecord::new(text))
    }

    fn write(&self, line: &LineCode, record: &RawRecord) -> Result<(), CacheError> {
        let path = self.path_for(line)?;
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let mut f = File::create(&path).map_err(io_error(&path))?;
        f.write_all(record.as_str().as_bytes())
            .map_err(io_error(&path))
    }

    fn line_codes(&self) -> Result<Vec<LineCode>, CacheError> {
        let mut codes = fs::read_dir(&self.dir)
            .map_err(io_error(&self.dir))?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map_or(false, |ext| ext.to_ascii_lowercase() == "json")
            })
            .filter_map(|path| path.file_stem()?.to_str().map(LineCode::new))
            .collect::<Vec<_>>();

        codes.sort();
        Ok(codes)
    }
}
