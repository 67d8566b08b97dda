//! Persistence for labeled datasets, risk tables, reports and the batch summary.
//!
//! Each write is a single open-write-close; failures come back as
//! [`PipelineError::OutputWriteFailure`] for the caller to log.

use anyhow::Result;
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::records::LabeledSample;
use crate::risk::RiskRow;

/// One row of `dataset_{city}.csv`.
#[derive(Debug, Serialize)]
struct DatasetRow {
    #[serde(rename = "Temp. Ins. (C)")]
    temperature: f64,
    #[serde(rename = "Vel. Vento (m/s)")]
    wind_speed: f64,
    #[serde(rename = "Raj. Vento (m/s)")]
    wind_gust: f64,
    #[serde(rename = "Pressao Ins. (hPa)")]
    pressure: f64,
    #[serde(rename = "Chuva (mm)")]
    precipitation: f64,
    interrupcao_real: u8,
}

impl From<&LabeledSample> for DatasetRow {
    fn from(s: &LabeledSample) -> Self {
        Self {
            temperature: s.features.temperature,
            wind_speed: s.features.wind_speed,
            wind_gust: s.features.wind_gust,
            pressure: s.features.pressure,
            precipitation: s.features.precipitation,
            interrupcao_real: s.label,
        }
    }
}

/// Logs a value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes `content` to `path`, replacing any existing file.
pub fn write_text(path: &Path, content: &str) -> PipelineResult<()> {
    let write = || -> io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        file.flush()
    };
    write().map_err(|e| PipelineError::write_failure(path, e))?;
    debug!(path = %path.display(), bytes = content.len(), "Wrote text file");
    Ok(())
}

fn write_delimited<R: Serialize>(path: &Path, rows: impl IntoIterator<Item = R>) -> PipelineResult<usize> {
    let write = || -> io::Result<usize> {
        let mut writer = WriterBuilder::new().delimiter(b';').from_path(path)?;
        let mut count = 0;
        for row in rows {
            writer.serialize(row)?;
            count += 1;
        }
        writer.flush()?;
        Ok(count)
    };
    let count = write().map_err(|e| PipelineError::write_failure(path, e))?;
    debug!(path = %path.display(), rows = count, "Wrote CSV file");
    Ok(count)
}

/// Writes the five features plus the label column, `;`-delimited.
pub fn write_labeled_dataset(path: &Path, samples: &[LabeledSample]) -> PipelineResult<usize> {
    write_delimited(path, samples.iter().map(DatasetRow::from))
}

/// Writes `data;hora;chuva_mm;raj. vento (m/s);risco de chuva;risco de vento;risco de vegetacao` rows.
pub fn write_risk_table(path: &Path, rows: &[RiskRow]) -> PipelineResult<usize> {
    write_delimited(path, rows)
}

/// Writes `value` as pretty-printed JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    let content = serde_json::to_string_pretty(value)
        .map_err(|e| PipelineError::write_failure(path, io::Error::other(e)))?;
    write_text(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::WeatherFeatures;
    use crate::risk::RiskLevel;
    use chrono::NaiveDate;
    use std::fs;

    fn sample(label: u8) -> LabeledSample {
        LabeledSample {
            hour: NaiveDate::from_ymd_opt(2021, 3, 1)
                .unwrap()
                .and_hms_opt(5, 0, 0)
                .unwrap(),
            features: WeatherFeatures {
                temperature: 21.5,
                wind_speed: 1.0,
                wind_gust: 4.25,
                pressure: 1008.0,
                precipitation: 0.5,
            },
            label,
        }
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&serde_json::json!({ "city": "Santa Maria" })).unwrap();
    }

    #[test]
    fn test_write_labeled_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dataset_Santa_Maria.csv");

        let rows = write_labeled_dataset(&path, &[sample(0), sample(1)]).unwrap();
        assert_eq!(rows, 2);

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(
            lines[0],
            "Temp. Ins. (C);Vel. Vento (m/s);Raj. Vento (m/s);Pressao Ins. (hPa);Chuva (mm);interrupcao_real"
        );
        assert_eq!(lines[1], "21.5;1.0;4.25;1008.0;0.5;0");
        assert_eq!(lines[2], "21.5;1.0;4.25;1008.0;0.5;1");
    }

    #[test]
    fn test_write_risk_table_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cidade_Passo_Fundo.csv");
        let row = RiskRow {
            data: "01/06/2021".into(),
            hora: "0300".into(),
            precipitation: Some(1.5),
            wind_gust: None,
            rain: RiskLevel::Baixo,
            wind: RiskLevel::Unknown,
            vegetation: RiskLevel::Baixo,
        };

        write_risk_table(&path, &[row]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(
            content,
            "data;hora;chuva_mm;raj. vento (m/s);risco de chuva;risco de vento;risco de vegetacao\n01/06/2021;0300;1.5;;baixo;unknown;baixo\n"
        );
    }

    #[test]
    fn test_write_text_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.txt");
        let err = write_text(&path, "x").unwrap_err();
        assert!(matches!(err, PipelineError::OutputWriteFailure { .. }));
    }

    #[test]
    fn test_write_json_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch_summary.json");
        write_json(&path, &serde_json::json!({ "cities": 4 })).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["cities"], 4);
    }
}
