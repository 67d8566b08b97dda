//! Batch orchestration over the configured cities.
//!
//! Cities run one after another. Whatever happens to one city is captured in
//! its [`CityOutcome`]; the batch always moves on and finishes by writing
//! `batch_summary.json`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::align::resample_hourly;
use crate::config::{CityConfig, PipelineConfig};
use crate::error::PipelineError;
use crate::label::{CityDataset, build_city_dataset};
use crate::loaders::{LoadSummary, load_outages, load_weather};
use crate::normalize::normalize_observation;
use crate::output::{write_json, write_labeled_dataset, write_risk_table, write_text};
use crate::records::{HourlyWeatherRecord, RawOutageRecord, RawWeatherObservation};
use crate::report::{
    ReportKind, render_abort_report, render_single_class_report, render_training_report,
    report_file_name,
};
use crate::risk::{RiskInput, RiskRow, assess_city};
use crate::risk_model::{
    REPORT_DIR, RiskSamples, read_risk_table, render_risk_report, risk_report_file_name,
    risk_table_file_name,
};
use crate::training::{Stage, Trainer, TrainingOutcome};

pub const SUMMARY_FILE: &str = "batch_summary.json";

/// Which batch produced a summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchKind {
    Train,
    Label,
    Risk,
    RiskTrain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CityStatus {
    Reported,
    Labeled,
    RiskAssessed,
    RiskModelTrained,
    SingleClassAbort,
    SplitDegenerateAbort,
    ModelFitFailure,
    InsufficientData,
    MissingInput,
    MalformedInput,
    OutputWriteFailure,
}

impl CityStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CityStatus::Reported
                | CityStatus::Labeled
                | CityStatus::RiskAssessed
                | CityStatus::RiskModelTrained
        )
    }
}

/// Headline metrics of a trained city model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub best_params: String,
    pub cv_f1: f64,
    pub accuracy: f64,
    pub auc: f64,
    pub f1: f64,
}

/// What happened to one city.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CityOutcome {
    pub city: String,
    pub status: CityStatus,
    pub stage: Stage,
    pub samples: usize,
    pub positives: usize,
    pub dataset_path: Option<PathBuf>,
    pub report_path: Option<PathBuf>,
    pub error: Option<String>,
    pub metrics: Option<MetricsSummary>,
}

impl CityOutcome {
    fn new(city: &str, status: CityStatus) -> Self {
        Self {
            city: city.to_string(),
            status,
            stage: Stage::Loaded,
            samples: 0,
            positives: 0,
            dataset_path: None,
            report_path: None,
            error: None,
            metrics: None,
        }
    }

    fn with_dataset(mut self, dataset: &CityDataset) -> Self {
        self.samples = dataset.len();
        self.positives = dataset.positives();
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub created_at: DateTime<Utc>,
    pub kind: BatchKind,
    pub success: usize,
    pub failure: usize,
    pub outage_load: Option<LoadSummary>,
    pub cities: Vec<CityOutcome>,
}

impl BatchSummary {
    fn new(kind: BatchKind, outage_load: Option<LoadSummary>, cities: Vec<CityOutcome>) -> Self {
        let success = cities.iter().filter(|c| c.status.is_success()).count();
        Self {
            created_at: Utc::now(),
            kind,
            success,
            failure: cities.len() - success,
            outage_load,
            cities,
        }
    }

    pub fn city(&self, name: &str) -> Option<&CityOutcome> {
        self.cities.iter().find(|c| c.city == name)
    }
}

fn prepare_output_dir(config: &PipelineConfig) -> Result<()> {
    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!("creating output directory {}", config.output_dir.display())
    })
}

fn finish(config: &PipelineConfig, summary: BatchSummary) -> Result<BatchSummary> {
    let path = config.output_dir.join(SUMMARY_FILE);
    if let Err(e) = write_json(&path, &summary) {
        error!(error = %e, "Failed to write batch summary");
    }
    info!(
        kind = ?summary.kind,
        success = summary.success,
        failure = summary.failure,
        summary = %path.display(),
        "Batch finished"
    );
    Ok(summary)
}

fn load_city_observations(config: &PipelineConfig, city: &CityConfig) -> Option<Vec<RawWeatherObservation>> {
    load_weather(config, city).map(|loaded| loaded.records)
}

/// Normalizes and resamples a city's observations; rows that fail cleaning
/// are dropped and counted.
fn hourly_weather(city: &str, raw: &[RawWeatherObservation]) -> Vec<HourlyWeatherRecord> {
    let observations: Vec<_> = raw.iter().filter_map(normalize_observation).collect();
    let dropped = raw.len() - observations.len();
    if dropped > 0 {
        info!(city, dropped, kept = observations.len(), "Dropped incomplete observations");
    }
    resample_hourly(&observations)
}

/// Labels a city, or explains why it cannot be labeled.
fn city_dataset(
    config: &PipelineConfig,
    city: &CityConfig,
    outages: &[RawOutageRecord],
) -> Result<CityDataset, (CityStatus, String)> {
    let Some(raw) = load_city_observations(config, city) else {
        return Err((CityStatus::MissingInput, "no weather file could be loaded".to_string()));
    };
    let hourly = hourly_weather(&city.name, &raw);
    let dataset = build_city_dataset(&city.name, outages, &hourly);
    if dataset.is_empty() {
        return Err((
            CityStatus::InsufficientData,
            "no complete hourly weather records".to_string(),
        ));
    }
    Ok(dataset)
}

/// Writes `dataset_{city}.csv`; a failure is logged and noted on the outcome.
fn persist_dataset(config: &PipelineConfig, city: &CityConfig, dataset: &CityDataset, outcome: &mut CityOutcome) {
    let path = config.output_dir.join(format!("dataset_{}.csv", city.safe_name()));
    match write_labeled_dataset(&path, &dataset.samples) {
        Ok(rows) => {
            info!(city = %city.name, rows, path = %path.display(), "Labeled dataset written");
            outcome.dataset_path = Some(path);
        }
        Err(e) => {
            error!(city = %city.name, error = %e, "Failed to write labeled dataset");
            outcome.status = CityStatus::OutputWriteFailure;
            outcome.error = Some(e.to_string());
        }
    }
}

fn write_report(dir: &Path, city: &CityConfig, kind: ReportKind, text: &str, outcome: &mut CityOutcome) {
    let path = dir.join(report_file_name(&city.safe_name(), kind));
    match write_text(&path, text) {
        Ok(()) => {
            info!(city = %city.name, path = %path.display(), "Report written");
            outcome.report_path = Some(path);
        }
        Err(e) => {
            error!(city = %city.name, error = %e, "Failed to write report");
            outcome.status = CityStatus::OutputWriteFailure;
            outcome.error = Some(e.to_string());
        }
    }
}

#[tracing::instrument(skip_all, fields(city = %city.name))]
fn train_city(
    config: &PipelineConfig,
    trainer: &Trainer,
    city: &CityConfig,
    outages: &[RawOutageRecord],
) -> CityOutcome {
    let dataset = match city_dataset(config, city, outages) {
        Ok(d) => d,
        Err((status, reason)) => {
            warn!(%reason, "City skipped before training");
            let mut outcome = CityOutcome::new(&city.name, status);
            outcome.error = Some(reason.clone());
            let text = render_abort_report(&city.name, ReportKind::DataError, &reason, None);
            write_report(&config.output_dir, city, ReportKind::DataError, &text, &mut outcome);
            return outcome;
        }
    };

    let mut outcome = CityOutcome::new(&city.name, CityStatus::Reported).with_dataset(&dataset);
    persist_dataset(config, city, &dataset, &mut outcome);

    let training = trainer.train(&dataset);
    outcome.stage = training.stage();

    let (kind, status, text) = match &training {
        TrainingOutcome::Trained(artifact) => {
            outcome.metrics = Some(MetricsSummary {
                best_params: artifact.best_params.to_string(),
                cv_f1: artifact.cv_f1,
                accuracy: artifact.evaluation.accuracy,
                auc: artifact.evaluation.auc,
                f1: artifact.evaluation.f1,
            });
            (
                ReportKind::Trained,
                CityStatus::Reported,
                render_training_report(&dataset, artifact),
            )
        }
        TrainingOutcome::SingleClass { samples, label } => (
            ReportKind::SingleClass,
            CityStatus::SingleClassAbort,
            render_single_class_report(&city.name, *samples, dataset.positives(), *label),
        ),
        TrainingOutcome::SplitDegenerate {
            train_size,
            train_positives,
        } => {
            let reason = format!(
                "training partition of {train_size} sample(s) holds a single class ({train_positives} positive(s))"
            );
            outcome.error = Some(reason.clone());
            (
                ReportKind::SplitDegenerate,
                CityStatus::SplitDegenerateAbort,
                render_abort_report(&city.name, ReportKind::SplitDegenerate, &reason, Some(&dataset)),
            )
        }
        TrainingOutcome::FitFailed { reason } => {
            outcome.error = Some(reason.clone());
            (
                ReportKind::FitFailure,
                CityStatus::ModelFitFailure,
                render_abort_report(&city.name, ReportKind::FitFailure, reason, Some(&dataset)),
            )
        }
        TrainingOutcome::InsufficientData { reason } => {
            outcome.error = Some(reason.clone());
            (
                ReportKind::DataError,
                CityStatus::InsufficientData,
                render_abort_report(&city.name, ReportKind::DataError, reason, Some(&dataset)),
            )
        }
    };

    // A failed dataset write outranks a successful training
    if outcome.status != CityStatus::OutputWriteFailure {
        outcome.status = status;
    }
    write_report(&config.output_dir, city, kind, &text, &mut outcome);
    if matches!(training, TrainingOutcome::Trained(_)) && outcome.report_path.is_some() {
        outcome.stage = Stage::Reported;
    }
    outcome
}

/// Labels, trains and reports every configured city.
pub fn run_training(config: &PipelineConfig) -> Result<BatchSummary> {
    prepare_output_dir(config)?;
    let trainer = Trainer::new(config.training.clone()).context("creating training worker pool")?;

    let Some(outages) = load_outages(config) else {
        error!("No outage file could be loaded, every city is reported as missing input");
        let cities = config
            .cities
            .iter()
            .map(|city| {
                let reason = "no outage file could be loaded";
                let mut outcome = CityOutcome::new(&city.name, CityStatus::MissingInput);
                outcome.error = Some(reason.to_string());
                let text = render_abort_report(&city.name, ReportKind::DataError, reason, None);
                write_report(&config.output_dir, city, ReportKind::DataError, &text, &mut outcome);
                outcome
            })
            .collect();
        return finish(config, BatchSummary::new(BatchKind::Train, None, cities));
    };

    info!(
        outages = outages.records.len(),
        cities = config.cities.len(),
        "Starting training batch"
    );
    let cities = config
        .cities
        .iter()
        .map(|city| train_city(config, &trainer, city, &outages.records))
        .collect();

    finish(
        config,
        BatchSummary::new(BatchKind::Train, Some(outages.summary), cities),
    )
}

/// Writes the labeled dataset of every configured city without training.
pub fn run_labeling(config: &PipelineConfig) -> Result<BatchSummary> {
    prepare_output_dir(config)?;

    let Some(outages) = load_outages(config) else {
        error!("No outage file could be loaded, nothing to label");
        let cities = config
            .cities
            .iter()
            .map(|city| {
                let mut outcome = CityOutcome::new(&city.name, CityStatus::MissingInput);
                outcome.error = Some("no outage file could be loaded".to_string());
                outcome
            })
            .collect();
        return finish(config, BatchSummary::new(BatchKind::Label, None, cities));
    };

    let cities = config
        .cities
        .iter()
        .map(|city| {
            let _span = tracing::info_span!("label_city", city = %city.name).entered();
            match city_dataset(config, city, &outages.records) {
                Ok(dataset) => {
                    let mut outcome =
                        CityOutcome::new(&city.name, CityStatus::Labeled).with_dataset(&dataset);
                    persist_dataset(config, city, &dataset, &mut outcome);
                    outcome
                }
                Err((status, reason)) => {
                    warn!(%reason, "City not labeled");
                    let mut outcome = CityOutcome::new(&city.name, status);
                    outcome.error = Some(reason);
                    outcome
                }
            }
        })
        .collect();

    finish(
        config,
        BatchSummary::new(BatchKind::Label, Some(outages.summary), cities),
    )
}

/// Writes `cidade_{city}.csv` rule-based risk tables. Independent of the
/// outage files.
pub fn run_risk(config: &PipelineConfig) -> Result<BatchSummary> {
    prepare_output_dir(config)?;

    let cities = config
        .cities
        .iter()
        .map(|city| {
            let _span = tracing::info_span!("risk_city", city = %city.name).entered();
            let Some(raw) = load_city_observations(config, city) else {
                let mut outcome = CityOutcome::new(&city.name, CityStatus::MissingInput);
                outcome.error = Some("no weather file could be loaded".to_string());
                return outcome;
            };

            let inputs: Vec<RiskInput> = raw.iter().filter_map(RiskInput::from_raw).collect();
            let assessed = assess_city(inputs);
            let rows: Vec<RiskRow> = assessed.iter().map(RiskRow::from).collect();

            let mut outcome = CityOutcome::new(&city.name, CityStatus::RiskAssessed);
            outcome.samples = rows.len();

            let path = config.output_dir.join(risk_table_file_name(&city.safe_name()));
            match write_risk_table(&path, &rows) {
                Ok(n) => {
                    info!(rows = n, path = %path.display(), "Risk table written");
                    outcome.dataset_path = Some(path);
                }
                Err(e) => {
                    error!(error = %e, "Failed to write risk table");
                    outcome.status = CityStatus::OutputWriteFailure;
                    outcome.error = Some(e.to_string());
                }
            }
            outcome
        })
        .collect();

    finish(config, BatchSummary::new(BatchKind::Risk, None, cities))
}

/// Fits the rain-risk classifier on every city's risk table and writes
/// `RelatorioClassificacao/relatorio_cidade_{city}.txt`. Reads the tables
/// written by [`run_risk`]; cities without usable data get no report.
pub fn run_risk_training(config: &PipelineConfig) -> Result<BatchSummary> {
    let report_dir = config.output_dir.join(REPORT_DIR);
    fs::create_dir_all(&report_dir)
        .with_context(|| format!("creating report directory {}", report_dir.display()))?;
    let trainer = Trainer::new(config.training.clone()).context("creating training worker pool")?;

    let cities = config
        .cities
        .iter()
        .map(|city| {
            let _span = tracing::info_span!("risk_train_city", city = %city.name).entered();
            let table_file = risk_table_file_name(&city.safe_name());
            let table_path = config.output_dir.join(&table_file);

            let rows = match read_risk_table(&table_path) {
                Ok((rows, skipped)) => {
                    info!(rows = rows.len(), skipped, path = %table_path.display(), "Risk table loaded");
                    rows
                }
                Err(e) => {
                    let status = match &e {
                        PipelineError::MissingInput { .. } => CityStatus::MissingInput,
                        _ => CityStatus::MalformedInput,
                    };
                    warn!(error = %e, "Risk table unavailable");
                    let mut outcome = CityOutcome::new(&city.name, status);
                    outcome.error = Some(e.to_string());
                    return outcome;
                }
            };

            let samples = RiskSamples::from_rows(&rows);
            let mut outcome = CityOutcome::new(&city.name, CityStatus::RiskModelTrained);
            outcome.samples = samples.len();
            outcome.positives = samples.positives();

            let evaluation = match trainer.train_risk_model(&samples) {
                Ok(evaluation) => evaluation,
                Err(e) => {
                    warn!(error = %e, "Skipping rain risk model");
                    outcome.status = match &e {
                        PipelineError::InsufficientLabelDiversity(_) => {
                            outcome.stage = Stage::LabelChecked;
                            CityStatus::SingleClassAbort
                        }
                        PipelineError::InsufficientData(_) => CityStatus::InsufficientData,
                        _ => CityStatus::ModelFitFailure,
                    };
                    outcome.error = Some(e.to_string());
                    return outcome;
                }
            };

            outcome.stage = Stage::Evaluated;
            let path = report_dir.join(risk_report_file_name(&city.safe_name()));
            match write_text(&path, &render_risk_report(&table_file, &evaluation)) {
                Ok(()) => {
                    info!(path = %path.display(), accuracy = evaluation.accuracy, "Rain risk report written");
                    outcome.report_path = Some(path);
                    outcome.stage = Stage::Reported;
                }
                Err(e) => {
                    error!(error = %e, "Failed to write rain risk report");
                    outcome.status = CityStatus::OutputWriteFailure;
                    outcome.error = Some(e.to_string());
                }
            }
            outcome
        })
        .collect();

    finish(config, BatchSummary::new(BatchKind::RiskTrain, None, cities))
}
