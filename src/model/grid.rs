//! Exhaustive hyperparameter search scored by cross-validated positive-class F1.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::forest::{ClassWeight, ForestParams, RandomForest};
use super::metrics::f1_score;
use super::split::stratified_k_fold;
use crate::error::{PipelineError, PipelineResult};
use crate::stats::mean;

/// Candidate values per hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParamGrid {
    pub class_weight: Vec<ClassWeight>,
    pub max_depth: Vec<Option<usize>>,
    pub min_samples_leaf: Vec<usize>,
    pub n_estimators: Vec<usize>,
}

impl Default for ParamGrid {
    fn default() -> Self {
        Self {
            class_weight: vec![ClassWeight::Balanced],
            max_depth: vec![Some(10), Some(20), None],
            min_samples_leaf: vec![1, 2, 4],
            n_estimators: vec![100, 200],
        }
    }
}

impl ParamGrid {
    /// Every combination, keys in alphabetical order with the last key
    /// varying fastest.
    pub fn candidates(&self) -> Vec<ForestParams> {
        let mut out = Vec::with_capacity(self.len());
        for &class_weight in &self.class_weight {
            for &max_depth in &self.max_depth {
                for &min_samples_leaf in &self.min_samples_leaf {
                    for &n_estimators in &self.n_estimators {
                        out.push(ForestParams {
                            class_weight,
                            max_depth,
                            min_samples_leaf,
                            n_estimators,
                        });
                    }
                }
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.class_weight.len() * self.max_depth.len() * self.min_samples_leaf.len() * self.n_estimators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mean cross-validated F1 of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandidateScore {
    pub params: ForestParams,
    pub mean_f1: f64,
}

#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub best_params: ForestParams,
    pub best_score: f64,
    pub scores: Vec<CandidateScore>,
    /// Best candidate refit on the full training set.
    pub best_model: RandomForest,
}

fn select_rows<T: Clone>(rows: &[T], indices: &[usize]) -> Vec<T> {
    indices.iter().map(|&i| rows[i].clone()).collect()
}

/// Scores every grid candidate with stratified `cv_folds`-fold cross
/// validation, then refits the best one on all of `x`.
///
/// Ties keep the earliest candidate. Fits run on the current rayon pool.
#[tracing::instrument(skip_all, fields(samples = x.len(), candidates = grid.len(), cv_folds = cv_folds))]
pub fn grid_search(
    x: &[Vec<f64>],
    y: &[u8],
    grid: &ParamGrid,
    cv_folds: usize,
    seed: u64,
) -> PipelineResult<GridSearchResult> {
    let candidates = grid.candidates();
    if candidates.is_empty() {
        return Err(PipelineError::ModelFitFailure(
            "hyperparameter grid has no candidates".to_string(),
        ));
    }

    let folds = stratified_k_fold(y, cv_folds)?;
    let fold_data: Vec<_> = folds
        .iter()
        .map(|fold| {
            (
                select_rows(x, &fold.train_indices),
                select_rows(y, &fold.train_indices),
                select_rows(x, &fold.test_indices),
                select_rows(y, &fold.test_indices),
            )
        })
        .collect();

    let jobs: Vec<(usize, usize)> = (0..candidates.len())
        .flat_map(|c| (0..fold_data.len()).map(move |f| (c, f)))
        .collect();

    let fold_scores: Vec<f64> = jobs
        .par_iter()
        .map(|&(c, f)| {
            let (x_train, y_train, x_val, y_val) = &fold_data[f];
            let model = RandomForest::fit(x_train, y_train, candidates[c], seed)?;
            Ok(f1_score(y_val, &model.predict(x_val)))
        })
        .collect::<PipelineResult<_>>()?;

    let scores: Vec<CandidateScore> = candidates
        .iter()
        .zip(fold_scores.chunks(fold_data.len()))
        .map(|(&params, chunk)| CandidateScore {
            params,
            mean_f1: mean(chunk),
        })
        .collect();

    for score in &scores {
        debug!(params = %score.params, mean_f1 = score.mean_f1, "Candidate scored");
    }

    let mut best = scores[0];
    for score in &scores[1..] {
        if score.mean_f1 > best.mean_f1 {
            best = *score;
        }
    }

    info!(params = %best.params, cv_f1 = best.mean_f1, "Best candidate selected, refitting");
    let best_model = RandomForest::fit(x, y, best.params, seed)?;

    Ok(GridSearchResult {
        best_params: best.params,
        best_score: best.mean_f1,
        scores,
        best_model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_grid_order() {
        let candidates = ParamGrid::default().candidates();
        assert_eq!(candidates.len(), 18);
        assert_eq!(
            candidates[0].to_string(),
            "{'class_weight': 'balanced', 'max_depth': 10, 'min_samples_leaf': 1, 'n_estimators': 100}"
        );
        assert_eq!(candidates[1].n_estimators, 200);
        assert_eq!(candidates[2].min_samples_leaf, 2);
        assert_eq!(candidates[17].max_depth, None);
        assert_eq!(candidates[17].min_samples_leaf, 4);
    }

    #[test]
    fn test_grid_deserializes_partial() {
        let grid: ParamGrid = serde_json::from_str(r#"{"n_estimators": [5], "max_depth": [3, null]}"#).unwrap();
        assert_eq!(grid.n_estimators, vec![5]);
        assert_eq!(grid.max_depth, vec![Some(3), None]);
        assert_eq!(grid.min_samples_leaf, vec![1, 2, 4]);
        assert_eq!(grid.class_weight, vec![ClassWeight::Balanced]);
    }

    fn dataset() -> (Vec<Vec<f64>>, Vec<u8>) {
        let y: Vec<u8> = (0..60).map(|i| u8::from(i % 5 == 0)).collect();
        let x = y
            .iter()
            .enumerate()
            .map(|(i, &label)| {
                let rain = if label == 1 { 20.0 + (i % 4) as f64 } else { (i % 6) as f64 };
                vec![rain, rain * 0.5 + 1.0]
            })
            .collect();
        (x, y)
    }

    #[test]
    fn test_grid_search_picks_and_refits() {
        let (x, y) = dataset();
        let grid = ParamGrid {
            class_weight: vec![ClassWeight::Balanced],
            max_depth: vec![Some(1), None],
            min_samples_leaf: vec![1],
            n_estimators: vec![5],
        };

        let result = grid_search(&x, &y, &grid, 3, 42).unwrap();
        assert_eq!(result.scores.len(), 2);
        assert!((result.best_score - 1.0).abs() < 1e-12);
        // both candidates separate the data, so the first one wins the tie
        assert_eq!(result.best_params.max_depth, Some(1));
        assert_eq!(result.best_model.predict(&x), y);
    }

    #[test]
    fn test_grid_search_empty_grid() {
        let (x, y) = dataset();
        let grid = ParamGrid {
            n_estimators: vec![],
            ..ParamGrid::default()
        };
        let err = grid_search(&x, &y, &grid, 3, 42).unwrap_err();
        assert!(matches!(err, PipelineError::ModelFitFailure(_)));
    }
}
