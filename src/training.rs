//! Per-city training state machine.
//!
//! A city moves through [`Stage`]s in order and may stop early; the
//! [`TrainingOutcome`] says where and why.

use serde::Serialize;
use tracing::{info, warn};

use crate::config::TrainingConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::label::CityDataset;
use crate::model::metrics::{self, ClassificationReport, ConfusionMatrix};
use crate::model::split::hold_out_split;
use crate::model::{ForestParams, RandomForest, grid_search};
use crate::records::{FEATURE_NAMES, LabeledSample};
use crate::risk_model::{self, RiskModelEvaluation, RiskSamples};

/// Progress of one city through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Loaded,
    LabelChecked,
    Split,
    GridSearched,
    Evaluated,
    Reported,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Test-set metrics of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub accuracy: f64,
    /// 0.0 when no positive-class probability or single-class test labels.
    pub auc: f64,
    pub f1: f64,
    pub confusion: ConfusionMatrix,
    pub report: ClassificationReport,
    /// Sorted by importance, highest first.
    pub importances: Vec<FeatureImportance>,
}

/// Everything the report needs about a trained city model.
#[derive(Debug, Clone, Serialize)]
pub struct TrainedModelArtifact {
    pub best_params: ForestParams,
    pub cv_f1: f64,
    pub cv_folds: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub train_positives: usize,
    pub test_positives: usize,
    /// Share of the samples held out for testing.
    pub test_fraction: f64,
    pub stratified: bool,
    pub evaluation: Evaluation,
    #[serde(skip)]
    pub model: RandomForest,
}

#[derive(Debug)]
pub enum TrainingOutcome {
    Trained(Box<TrainedModelArtifact>),
    /// No samples, or too few to split.
    InsufficientData { reason: String },
    /// Every sample carries `label`.
    SingleClass { samples: usize, label: u8 },
    /// The training partition came out single-class.
    SplitDegenerate {
        train_size: usize,
        train_positives: usize,
    },
    /// Grid search or refit failed.
    FitFailed { reason: String },
}

impl TrainingOutcome {
    /// Last stage the city completed.
    pub fn stage(&self) -> Stage {
        match self {
            TrainingOutcome::Trained(_) => Stage::Evaluated,
            TrainingOutcome::InsufficientData { .. } => Stage::Loaded,
            TrainingOutcome::SingleClass { .. } => Stage::LabelChecked,
            TrainingOutcome::SplitDegenerate { .. } => Stage::Split,
            TrainingOutcome::FitFailed { .. } => Stage::Split,
        }
    }
}

/// Fails with [`PipelineError::InsufficientLabelDiversity`] unless both
/// labels are present.
pub fn check_labels(dataset: &CityDataset) -> PipelineResult<()> {
    match dataset.distinct_labels() {
        0 | 1 => Err(PipelineError::InsufficientLabelDiversity(format!(
            "{} has {} sample(s) and {} positive(s)",
            dataset.city,
            dataset.len(),
            dataset.positives()
        ))),
        _ => Ok(()),
    }
}

fn feature_matrix(samples: &[LabeledSample], indices: &[usize]) -> (Vec<Vec<f64>>, Vec<u8>) {
    indices
        .iter()
        .map(|&i| (samples[i].features.to_array().to_vec(), samples[i].label))
        .unzip()
}

fn count_positive(labels: &[u8]) -> usize {
    labels.iter().filter(|&&l| l == 1).count()
}

/// Scores a fitted model on held-out rows.
pub fn evaluate(model: &RandomForest, x_test: &[Vec<f64>], y_test: &[u8]) -> Evaluation {
    let y_pred = model.predict(x_test);
    let confusion = ConfusionMatrix::from_predictions(y_test, &y_pred);

    let auc = match model.predict_positive_proba(x_test) {
        Some(scores) => metrics::roc_auc(y_test, &scores).unwrap_or_else(|| {
            warn!("Test labels hold a single class, AUC reported as 0.0");
            0.0
        }),
        None => {
            warn!("Model has no positive-class probability, AUC reported as 0.0");
            0.0
        }
    };

    let mut importances: Vec<FeatureImportance> = FEATURE_NAMES
        .iter()
        .zip(model.feature_importances())
        .map(|(name, &importance)| FeatureImportance {
            feature: name.to_string(),
            importance,
        })
        .collect();
    importances.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    Evaluation {
        accuracy: metrics::accuracy(y_test, &y_pred),
        auc,
        f1: metrics::f1_score(y_test, &y_pred),
        report: ClassificationReport::from_confusion(&confusion),
        confusion,
        importances,
    }
}

/// Runs the split, grid search and evaluation on a dedicated worker pool.
pub struct Trainer {
    config: TrainingConfig,
    pool: rayon::ThreadPool,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> PipelineResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.threads)
            .thread_name(|i| format!("forest-{i}"))
            .build()
            .map_err(|e| PipelineError::ModelFitFailure(format!("worker pool: {e}")))?;
        info!(threads = pool.current_num_threads(), "Training pool ready");
        Ok(Self { config, pool })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fits the rain-risk model on this trainer's pool.
    pub fn train_risk_model(&self, samples: &RiskSamples) -> PipelineResult<RiskModelEvaluation> {
        self.pool
            .install(|| risk_model::train_risk_model(samples, &self.config))
    }

    #[tracing::instrument(skip_all, fields(city = %dataset.city, samples = dataset.len()))]
    pub fn train(&self, dataset: &CityDataset) -> TrainingOutcome {
        if dataset.is_empty() {
            return TrainingOutcome::InsufficientData {
                reason: "no labeled samples".to_string(),
            };
        }

        if let Err(e) = check_labels(dataset) {
            warn!(error = %e, "Single-class dataset, training skipped");
            return TrainingOutcome::SingleClass {
                samples: dataset.len(),
                label: dataset.samples[0].label,
            };
        }

        let labels: Vec<u8> = dataset.samples.iter().map(|s| s.label).collect();
        let hold_out = match hold_out_split(&labels, self.config.test_fraction, self.config.seed) {
            Ok(h) => h,
            Err(e) => {
                return TrainingOutcome::InsufficientData {
                    reason: e.to_string(),
                };
            }
        };

        let (x_train, y_train) = feature_matrix(&dataset.samples, &hold_out.split.train_indices);
        let (x_test, y_test) = feature_matrix(&dataset.samples, &hold_out.split.test_indices);
        let train_positives = count_positive(&y_train);

        info!(
            train = y_train.len(),
            test = y_test.len(),
            train_positives,
            stratified = hold_out.stratified,
            "Split complete"
        );

        if train_positives == 0 || train_positives == y_train.len() {
            warn!(train_positives, "Training partition holds a single class");
            return TrainingOutcome::SplitDegenerate {
                train_size: y_train.len(),
                train_positives,
            };
        }

        let searched = self.pool.install(|| {
            grid_search(
                &x_train,
                &y_train,
                &self.config.grid,
                self.config.cv_folds,
                self.config.seed,
            )
        });
        let search = match searched {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Grid search failed");
                return TrainingOutcome::FitFailed {
                    reason: e.to_string(),
                };
            }
        };

        let evaluation = self
            .pool
            .install(|| evaluate(&search.best_model, &x_test, &y_test));

        info!(
            params = %search.best_params,
            cv_f1 = search.best_score,
            accuracy = evaluation.accuracy,
            auc = evaluation.auc,
            f1 = evaluation.f1,
            "Model evaluated"
        );

        TrainingOutcome::Trained(Box::new(TrainedModelArtifact {
            best_params: search.best_params,
            cv_f1: search.best_score,
            cv_folds: self.config.cv_folds,
            train_size: y_train.len(),
            test_size: y_test.len(),
            train_positives,
            test_positives: count_positive(&y_test),
            test_fraction: self.config.test_fraction,
            stratified: hold_out.stratified,
            evaluation,
            model: search.best_model,
        }))
    }
}
