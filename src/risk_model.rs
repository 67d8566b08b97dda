//! Rain-risk classifier trained on the consolidated risk tables.
//!
//! Each city's `cidade_{city}.csv` is read back, the rain risk is collapsed
//! to a binary target (`alto`/`muito_alto` → 1) and a forest is fitted on the
//! hourly rain and wind gust. The resulting classification reports sit next
//! to the outage model's so the two model types can be compared per city.

use csv::ReaderBuilder;
use std::fmt::Write;
use std::path::Path;
use tracing::{debug, info};

use crate::config::TrainingConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::model::metrics::{self, ClassificationReport, ConfusionMatrix};
use crate::model::split::train_test_split;
use crate::model::{ClassWeight, ForestParams, RandomForest};
use crate::risk::{RiskLevel, RiskRow};

/// Sub-directory of the output directory holding the risk model reports.
pub const REPORT_DIR: &str = "RelatorioClassificacao";

const CLASS_NAMES: [&str; 2] = ["0", "1"];

/// Fixed forest settings; the risk model is not grid searched.
pub const RISK_MODEL_PARAMS: ForestParams = ForestParams {
    class_weight: ClassWeight::Uniform,
    max_depth: None,
    min_samples_leaf: 1,
    n_estimators: 100,
};

/// `cidade_{city}.csv`
pub fn risk_table_file_name(safe_city: &str) -> String {
    format!("cidade_{safe_city}.csv")
}

/// `relatorio_cidade_{city}.txt`
pub fn risk_report_file_name(safe_city: &str) -> String {
    format!("relatorio_cidade_{safe_city}.txt")
}

/// Binary rain target; `None` for levels outside the rain scale.
pub fn rain_target(level: RiskLevel) -> Option<u8> {
    match level {
        RiskLevel::Baixo | RiskLevel::Moderado => Some(0),
        RiskLevel::Alto | RiskLevel::MuitoAlto => Some(1),
        RiskLevel::Unknown | RiskLevel::Critico => None,
    }
}

/// Reads a risk table written by the risk batch. Rows that fail to
/// deserialize are skipped and counted.
pub fn read_risk_table(path: &Path) -> PipelineResult<(Vec<RiskRow>, usize)> {
    if !path.exists() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .from_path(path)
        .map_err(|e| PipelineError::malformed(path, e))?;

    let mut rows = Vec::new();
    let mut skipped = 0;
    for record in reader.deserialize::<RiskRow>() {
        match record {
            Ok(row) => rows.push(row),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping risk table row");
                skipped += 1;
            }
        }
    }
    Ok((rows, skipped))
}

/// Feature rows and binary targets extracted from a risk table.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RiskSamples {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<u8>,
    /// Rows lacking a reading or a rain level on the rain scale.
    pub dropped: usize,
}

impl RiskSamples {
    pub fn from_rows(rows: &[RiskRow]) -> Self {
        let mut samples = Self::default();
        for row in rows {
            match (row.precipitation, row.wind_gust, rain_target(row.rain)) {
                (Some(rain), Some(gust), Some(target)) => {
                    samples.x.push(vec![rain, gust]);
                    samples.y.push(target);
                }
                _ => samples.dropped += 1,
            }
        }
        samples
    }

    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn positives(&self) -> usize {
        self.y.iter().filter(|&&y| y == 1).count()
    }
}

/// Test-set scores of the rain-risk model.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskModelEvaluation {
    pub train_size: usize,
    pub test_size: usize,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
}

/// Unstratified hold-out split, fit and evaluation on the current rayon pool.
///
/// Fewer than two samples is [`PipelineError::InsufficientData`]; a single
/// target class is [`PipelineError::InsufficientLabelDiversity`].
pub fn train_risk_model(
    samples: &RiskSamples,
    config: &TrainingConfig,
) -> PipelineResult<RiskModelEvaluation> {
    if samples.len() < 2 {
        return Err(PipelineError::InsufficientData(format!(
            "{} usable risk row(s)",
            samples.len()
        )));
    }
    let positives = samples.positives();
    if positives == 0 || positives == samples.len() {
        return Err(PipelineError::InsufficientLabelDiversity(format!(
            "{} row(s), {positives} high rain risk",
            samples.len()
        )));
    }

    let split = train_test_split(samples.len(), config.test_fraction, config.seed)
        .map_err(|e| PipelineError::InsufficientData(e.to_string()))?;
    let pick = |indices: &[usize]| -> (Vec<Vec<f64>>, Vec<u8>) {
        indices
            .iter()
            .map(|&i| (samples.x[i].clone(), samples.y[i]))
            .unzip()
    };
    let (x_train, y_train) = pick(&split.train_indices);
    let (x_test, y_test) = pick(&split.test_indices);

    let model = RandomForest::fit(&x_train, &y_train, RISK_MODEL_PARAMS, config.seed)?;
    let y_pred = model.predict(&x_test);
    let confusion = ConfusionMatrix::from_predictions(&y_test, &y_pred);

    info!(
        train = y_train.len(),
        test = y_test.len(),
        accuracy = metrics::accuracy(&y_test, &y_pred),
        "Rain risk model evaluated"
    );

    Ok(RiskModelEvaluation {
        train_size: y_train.len(),
        test_size: y_test.len(),
        accuracy: metrics::accuracy(&y_test, &y_pred),
        report: ClassificationReport::from_confusion(&confusion),
        confusion,
    })
}

/// Report text for one risk table.
pub fn render_risk_report(table_file: &str, evaluation: &RiskModelEvaluation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Arquivo: {table_file}");
    let _ = writeln!(out, "Matriz de confusão:");
    let _ = writeln!(out, "{}", evaluation.confusion.render());
    let _ = writeln!(out);
    let _ = writeln!(out, "Relatório de classificação:");
    out.push_str(&evaluation.report.render_with_names(CLASS_NAMES));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(rain: Option<f64>, gust: Option<f64>, level: RiskLevel) -> RiskRow {
        RiskRow {
            data: "01/01/2021".into(),
            hora: "0000".into(),
            precipitation: rain,
            wind_gust: gust,
            rain: level,
            wind: RiskLevel::Baixo,
            vegetation: RiskLevel::Baixo,
        }
    }

    fn rows(n: usize) -> Vec<RiskRow> {
        (0..n)
            .map(|i| {
                let jitter = (i % 6) as f64;
                if i % 5 == 0 {
                    row(Some(32.0 + jitter), Some(20.0 + jitter), RiskLevel::MuitoAlto)
                } else {
                    row(Some(jitter / 2.0), Some(3.0 + jitter), RiskLevel::Baixo)
                }
            })
            .collect()
    }

    #[test]
    fn test_rain_target() {
        assert_eq!(rain_target(RiskLevel::Moderado), Some(0));
        assert_eq!(rain_target(RiskLevel::Alto), Some(1));
        assert_eq!(rain_target(RiskLevel::MuitoAlto), Some(1));
        assert_eq!(rain_target(RiskLevel::Unknown), None);
    }

    #[test]
    fn test_samples_drop_incomplete_rows() {
        let samples = RiskSamples::from_rows(&[
            row(Some(1.0), Some(4.0), RiskLevel::Baixo),
            row(None, Some(4.0), RiskLevel::Unknown),
            row(Some(20.0), None, RiskLevel::Alto),
            row(Some(40.0), Some(9.0), RiskLevel::MuitoAlto),
        ]);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples.dropped, 2);
        assert_eq!(samples.x[1], vec![40.0, 9.0]);
        assert_eq!(samples.positives(), 1);
    }

    #[test]
    fn test_train_risk_model_rejects_small_and_single_class() {
        let config = TrainingConfig::default();
        let one = RiskSamples::from_rows(&[row(Some(1.0), Some(1.0), RiskLevel::Baixo)]);
        assert!(matches!(
            train_risk_model(&one, &config),
            Err(PipelineError::InsufficientData(_))
        ));

        let flat = RiskSamples::from_rows(&[
            row(Some(1.0), Some(1.0), RiskLevel::Baixo),
            row(Some(2.0), Some(1.0), RiskLevel::Moderado),
        ]);
        assert!(matches!(
            train_risk_model(&flat, &config),
            Err(PipelineError::InsufficientLabelDiversity(_))
        ));
    }

    #[test]
    fn test_train_risk_model_learns_rain_threshold() {
        let samples = RiskSamples::from_rows(&rows(100));
        let evaluation = train_risk_model(&samples, &TrainingConfig::default()).unwrap();

        assert_eq!(evaluation.test_size, 20);
        assert_eq!(evaluation.train_size, 80);
        assert_eq!(evaluation.confusion.total(), 20);
        assert_eq!(evaluation.accuracy, 1.0);
    }

    #[test]
    fn test_render_risk_report() {
        let samples = RiskSamples::from_rows(&rows(50));
        let evaluation = train_risk_model(&samples, &TrainingConfig::default()).unwrap();
        let text = render_risk_report("cidade_Santa_Maria.csv", &evaluation);

        assert!(text.starts_with("Arquivo: cidade_Santa_Maria.csv\nMatriz de confusão:\n[["));
        assert!(text.contains("\n\nRelatório de classificação:\n"));
        assert!(text.contains("\n           1  "));
        assert!(text.contains("   macro avg  "));
    }

    #[test]
    fn test_read_risk_table_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(risk_table_file_name("Santa_Maria"));
        let written = vec![
            row(Some(35.5), Some(24.0), RiskLevel::MuitoAlto),
            row(None, Some(4.0), RiskLevel::Unknown),
        ];
        crate::output::write_risk_table(&path, &written).unwrap();

        let (read, skipped) = read_risk_table(&path).unwrap();
        assert_eq!(skipped, 0);
        assert_eq!(read, written);
    }

    #[test]
    fn test_read_risk_table_missing() {
        let err = read_risk_table(Path::new("/nonexistent/cidade_X.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::MissingInput { .. }));
    }
}
