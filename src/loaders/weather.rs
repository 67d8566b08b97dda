//! Loader for per-city yearly weather station files.

use std::path::Path;

use super::table::Table;
use super::{Loaded, load_years};
use crate::config::{CityConfig, PipelineConfig};
use crate::error::PipelineResult;
use crate::records::{FEATURE_NAMES, RawWeatherObservation};

const DATE: &str = "Data";
const TIME: [&str; 2] = ["Hora (UTC)", "Hora"];

/// Loads every configured year of one city's weather observations.
#[tracing::instrument(skip(config, city), fields(city = %city.name))]
pub fn load_weather(
    config: &PipelineConfig,
    city: &CityConfig,
) -> Option<Loaded<RawWeatherObservation>> {
    load_years(
        "weather",
        &config.years,
        |year| config.weather_path(year, city),
        parse_weather_table,
    )
}

/// Converts a table into raw observations; values stay as text.
pub fn parse_weather_table(
    table: &Table,
    year: i32,
    path: &Path,
) -> PipelineResult<(Vec<RawWeatherObservation>, usize)> {
    let date = table.require_column(path, &[DATE])?;
    let time = table.require_column(path, &TIME)?;
    let mut features = [0usize; FEATURE_NAMES.len()];
    for (slot, name) in features.iter_mut().zip(FEATURE_NAMES) {
        *slot = table.require_column(path, &[name])?;
    }

    let field = |row: &[String], idx: usize| row.get(idx).cloned().unwrap_or_default();

    let mut records = Vec::with_capacity(table.rows().len());
    let mut rejected = 0;

    for row in table.rows().iter().map(Vec::as_slice) {
        if row.get(date).is_none_or(|d| d.trim().is_empty()) {
            rejected += 1;
            continue;
        }

        records.push(RawWeatherObservation {
            date: field(row, date),
            time: field(row, time),
            temperature: field(row, features[0]),
            wind_speed: field(row, features[1]),
            wind_gust: field(row, features[2]),
            pressure: field(row, features[3]),
            precipitation: field(row, features[4]),
            source_year: year,
        });
    }

    Ok((records, rejected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[test]
    fn test_parse_weather_table() {
        let data = "Data;Hora (UTC);Temp. Ins. (C);Umi. Ins. (%);Vel. Vento (m/s);Raj. Vento (m/s);Pressao Ins. (hPa);Chuva (mm)\n\
                    01/01/2021;0000;\"22,5\";80;\"1,2\";\"4,5\";\"1008,1\";\"0,2\"\n\
                    ;0100;1;1;1;1;1;1\n";
        let table = Table::from_reader(data.as_bytes(), Path::new("mem.csv")).unwrap();
        let (records, rejected) = parse_weather_table(&table, 2021, Path::new("mem.csv")).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(rejected, 1);
        assert_eq!(records[0].temperature, "22,5");
        assert_eq!(records[0].wind_gust, "4,5");
        assert_eq!(records[0].precipitation, "0,2");
    }

    #[test]
    fn test_parse_weather_table_missing_feature_column() {
        let data = "Data;Hora (UTC);Temp. Ins. (C)\n01/01/2021;0000;1\n";
        let table = Table::from_reader(data.as_bytes(), Path::new("mem.csv")).unwrap();
        let err = parse_weather_table(&table, 2021, Path::new("mem.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput { .. }));
    }
}
