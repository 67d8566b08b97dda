//! Semicolon-delimited table reader shared by both loaders.
//!
//! Fields are decoded as UTF-8 and fall back to Latin-1, so files exported by
//! either agency load without a separate encoding setting. A missing
//! `name.csv` is looked up as `name.csv.gz` before giving up.

use csv::{ByteRecord, ReaderBuilder};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::normalize::standardize_column;

/// A decoded table: standardized headers plus raw string rows.
#[derive(Debug, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    skipped_rows: usize,
}

impl Table {
    /// Index of the column whose standardized name equals `name`'s.
    pub fn column(&self, name: &str) -> Option<usize> {
        let wanted = standardize_column(name);
        self.headers.iter().position(|h| *h == wanted)
    }

    /// First column matching any of `names`, or a malformed-input error.
    pub fn require_column(&self, path: &Path, names: &[&str]) -> PipelineResult<usize> {
        names
            .iter()
            .find_map(|n| self.column(n))
            .ok_or_else(|| PipelineError::malformed(path, format!("missing column {:?}", names[0])))
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Rows the CSV reader could not parse.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    /// Parses delimited bytes from any reader.
    pub fn from_reader<R: Read>(reader: R, path: &Path) -> PipelineResult<Self> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b';')
            .quote(b'"')
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .byte_headers()
            .map_err(|e| PipelineError::malformed(path, e))?
            .iter()
            .map(|h| standardize_column(&decode_field(h)))
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(PipelineError::malformed(path, "empty header row"));
        }

        let mut rows = Vec::new();
        let mut skipped_rows = 0;
        let mut record = ByteRecord::new();

        loop {
            match rdr.read_byte_record(&mut record) {
                Ok(true) => rows.push(record.iter().map(decode_field).collect()),
                Ok(false) => break,
                Err(e) if e.is_io_error() => return Err(PipelineError::malformed(path, e)),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Skipping unparsable row");
                    skipped_rows += 1;
                }
            }
        }

        Ok(Self {
            headers,
            rows,
            skipped_rows,
        })
    }
}

/// Decodes one field as UTF-8, falling back to Latin-1.
pub fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// Resolves `path` or its `.gz` sibling; `None` when neither exists.
pub fn resolve_source(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let mut gz = path.as_os_str().to_owned();
    gz.push(".gz");
    let gz = PathBuf::from(gz);
    gz.is_file().then_some(gz)
}

/// Reads a table from disk, transparently decompressing `.gz` files.
pub fn read_table(path: &Path) -> PipelineResult<Table> {
    let source = resolve_source(path).ok_or_else(|| PipelineError::MissingInput {
        path: path.to_path_buf(),
    })?;

    let file = File::open(&source).map_err(|e| PipelineError::malformed(&source, e))?;
    let reader = BufReader::new(file);

    if source.extension().and_then(|e| e.to_str()) == Some("gz") {
        Table::from_reader(GzDecoder::new(reader), &source)
    } else {
        Table::from_reader(reader, &source)
    }
}
