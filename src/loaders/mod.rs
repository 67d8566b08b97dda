//! Yearly source loaders.
//!
//! Missing and malformed files are logged and skipped. When no file loads at
//! all the loaders return `None` so the caller can abandon just that branch.

pub mod outage;
pub mod table;
pub mod weather;

pub use outage::load_outages;
pub use weather::load_weather;

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::error::{PipelineError, PipelineResult};
use table::{Table, read_table};

/// File and row counts for one load.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub files_loaded: usize,
    pub files_missing: usize,
    pub files_failed: usize,
    pub rows_loaded: usize,
    pub rows_skipped: usize,
}

/// Records from every file that loaded, with their summary.
#[derive(Debug)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub summary: LoadSummary,
}

/// Reads one file per year and concatenates the parsed records.
///
/// `parse` turns a table into records plus a count of rows it rejected.
pub(crate) fn load_years<T, F>(
    source: &str,
    years: &[i32],
    path_for: impl Fn(i32) -> PathBuf,
    mut parse: F,
) -> Option<Loaded<T>>
where
    F: FnMut(&Table, i32, &Path) -> PipelineResult<(Vec<T>, usize)>,
{
    let mut records = Vec::new();
    let mut summary = LoadSummary::default();

    for &year in years {
        let path = path_for(year);
        let parsed = read_table(&path).and_then(|table| {
            let (rows, rejected) = parse(&table, year, &path)?;
            Ok((rows, rejected + table.skipped_rows()))
        });

        match parsed {
            Ok((rows, skipped)) => {
                info!(
                    source,
                    year,
                    path = %path.display(),
                    rows = rows.len(),
                    skipped,
                    "Loaded file"
                );
                summary.files_loaded += 1;
                summary.rows_loaded += rows.len();
                summary.rows_skipped += skipped;
                records.extend(rows);
            }
            Err(PipelineError::MissingInput { path }) => {
                warn!(source, year, path = %path.display(), "File not found, skipping");
                summary.files_missing += 1;
            }
            Err(e) => {
                warn!(source, year, error = %e, "Failed to read file, skipping");
                summary.files_failed += 1;
            }
        }
    }

    if summary.files_loaded == 0 {
        error!(source, ?summary, "No files loaded");
        return None;
    }

    info!(source, rows = summary.rows_loaded, ?summary, "Load complete");
    Some(Loaded { records, summary })
}
