//! Loader for yearly outage (interruption) files.

use std::path::Path;

use super::table::Table;
use super::{Loaded, load_years};
use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::normalize::{fold_text, parse_code, parse_outage_timestamp};
use crate::records::RawOutageRecord;

const AGENT: &str = "SigAgente";
const AREA: &str = "DscConjuntoUnidadeConsumidora";
const INTERRUPTION_TYPE: &str = "DscTipoInterrupcao";
const MOTIVE_CODE: &str = "IdeMotivoInterrupcao";
const CAUSE: &str = "DscFatoGeradorInterrupcao";
const START: &str = "DatInicioInterrupcao";
const END: &str = "DatFimInterrupcao";

/// Loads every configured year of outage records.
#[tracing::instrument(skip(config), fields(years = ?config.years))]
pub fn load_outages(config: &PipelineConfig) -> Option<Loaded<RawOutageRecord>> {
    let agent_filter = config.agent_filter.as_deref().map(fold_text);
    load_years(
        "outages",
        &config.years,
        |year| config.outage_path(year),
        |table, year, path| parse_outage_table(table, year, agent_filter.as_deref(), path),
    )
}

/// Converts a table into outage records.
///
/// Rows too short to hold the required columns are rejected. When
/// `agent_filter` (already folded) is set, rows from other agents are dropped
/// without counting as rejected.
pub fn parse_outage_table(
    table: &Table,
    year: i32,
    agent_filter: Option<&str>,
    path: &Path,
) -> PipelineResult<(Vec<RawOutageRecord>, usize)> {
    let area = table.require_column(path, &[AREA])?;
    let kind = table.require_column(path, &[INTERRUPTION_TYPE])?;
    let motive = table.require_column(path, &[MOTIVE_CODE])?;
    let cause = table.require_column(path, &[CAUSE])?;
    let start = table.require_column(path, &[START])?;
    let agent = table.column(AGENT);
    let end = table.column(END);

    let required_width = [area, kind, motive, cause, start]
        .into_iter()
        .max()
        .unwrap_or(0)
        + 1;

    let mut records = Vec::new();
    let mut rejected = 0;

    for row in table.rows() {
        if row.len() < required_width {
            rejected += 1;
            continue;
        }

        let agent_value = agent
            .and_then(|i| row.get(i))
            .cloned()
            .unwrap_or_default();

        if let Some(filter) = agent_filter {
            if !fold_text(&agent_value).contains(filter) {
                continue;
            }
        }

        records.push(RawOutageRecord {
            agent: agent_value,
            area: row[area].trim().to_string(),
            interruption_type: row[kind].trim().to_string(),
            motive_code: parse_code(&row[motive]),
            cause: row[cause].trim().to_string(),
            start: parse_outage_timestamp(&row[start]),
            end: end.and_then(|i| row.get(i)).and_then(|v| parse_outage_timestamp(v)),
            source_year: year,
        });
    }

    Ok((records, rejected))
}
