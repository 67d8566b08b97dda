//! Random forest classifier over binary outage labels.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::tree::{DecisionTree, TreeParams};
use crate::error::{PipelineError, PipelineResult};

/// Label treated as the positive class.
pub const POSITIVE_LABEL: u8 = 1;

/// How sample weights are derived from class frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// `n_samples / (n_classes * count(class))`, computed on the training labels.
    #[default]
    Balanced,
    Uniform,
}

impl ClassWeight {
    fn as_str(&self) -> &'static str {
        match self {
            ClassWeight::Balanced => "balanced",
            ClassWeight::Uniform => "uniform",
        }
    }
}

/// One point of the hyperparameter grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForestParams {
    pub class_weight: ClassWeight,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub n_estimators: usize,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            class_weight: ClassWeight::Balanced,
            max_depth: None,
            min_samples_leaf: 1,
            n_estimators: 100,
        }
    }
}

/// Renders as a dict literal, keys in alphabetical order:
/// `{'class_weight': 'balanced', 'max_depth': None, 'min_samples_leaf': 1, 'n_estimators': 100}`
impl fmt::Display for ForestParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let depth = match self.max_depth {
            Some(d) => d.to_string(),
            None => "None".to_string(),
        };
        write!(
            f,
            "{{'class_weight': '{}', 'max_depth': {}, 'min_samples_leaf': {}, 'n_estimators': {}}}",
            self.class_weight.as_str(),
            depth,
            self.min_samples_leaf,
            self.n_estimators
        )
    }
}

#[derive(Debug, Clone)]
pub struct RandomForest {
    params: ForestParams,
    /// Distinct training labels, ascending; tree class indices point here.
    classes: Vec<u8>,
    trees: Vec<DecisionTree>,
    n_features: usize,
    feature_importances: Vec<f64>,
}

/// Square root of the feature count, rounded down, at least 1.
fn sqrt_features(n_features: usize) -> usize {
    ((n_features as f64).sqrt().floor() as usize).max(1)
}

fn class_weights(class_idx: &[usize], n_classes: usize, mode: ClassWeight) -> Vec<f64> {
    match mode {
        ClassWeight::Uniform => vec![1.0; n_classes],
        ClassWeight::Balanced => {
            let mut counts = vec![0usize; n_classes];
            for &c in class_idx {
                counts[c] += 1;
            }
            let n = class_idx.len() as f64;
            counts
                .iter()
                .map(|&c| if c == 0 { 0.0 } else { n / (n_classes as f64 * c as f64) })
                .collect()
        }
    }
}

impl RandomForest {
    /// Fits `params.n_estimators` trees on bootstrap samples, in parallel on
    /// the current rayon pool. Tree `i` draws from a generator seeded with
    /// `seed + i`, so results do not depend on scheduling.
    pub fn fit(x: &[Vec<f64>], y: &[u8], params: ForestParams, seed: u64) -> PipelineResult<Self> {
        if x.is_empty() {
            return Err(PipelineError::ModelFitFailure(
                "cannot fit a forest on zero samples".to_string(),
            ));
        }
        if x.len() != y.len() {
            return Err(PipelineError::ModelFitFailure(format!(
                "{} feature rows but {} labels",
                x.len(),
                y.len()
            )));
        }
        if params.n_estimators == 0 {
            return Err(PipelineError::ModelFitFailure(
                "n_estimators must be at least 1".to_string(),
            ));
        }

        let n_samples = x.len();
        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            return Err(PipelineError::ModelFitFailure(
                "feature rows have different lengths".to_string(),
            ));
        }

        let mut classes: Vec<u8> = y.to_vec();
        classes.sort_unstable();
        classes.dedup();

        let class_idx: Vec<usize> = y
            .iter()
            .map(|label| classes.binary_search(label).unwrap_or(0))
            .collect();
        let weights_by_class = class_weights(&class_idx, classes.len(), params.class_weight);

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: 2,
            min_samples_leaf: params.min_samples_leaf.max(1),
            max_features: sqrt_features(n_features),
        };

        let trees: Vec<DecisionTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(tree_idx as u64));

                let mut weights = vec![0.0; n_samples];
                for _ in 0..n_samples {
                    weights[rng.gen_range(0..n_samples)] += 1.0;
                }
                for (w, &c) in weights.iter_mut().zip(&class_idx) {
                    *w *= weights_by_class[c];
                }

                DecisionTree::fit(x, &class_idx, &weights, classes.len(), tree_params, &mut rng)
            })
            .collect();

        let feature_importances = average_importances(&trees, n_features);

        Ok(Self {
            params,
            classes,
            trees,
            n_features,
            feature_importances,
        })
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn classes(&self) -> &[u8] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean normalized impurity decrease per feature; sums to 1 unless no tree split.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    /// Mean leaf class distribution per sample, columns ordered as [`Self::classes`].
    pub fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let n_classes = self.classes.len();
        let n_trees = self.trees.len() as f64;

        x.par_iter()
            .map(|sample| {
                let mut proba = vec![0.0; n_classes];
                for tree in &self.trees {
                    for (p, leaf) in proba.iter_mut().zip(tree.predict_proba_one(sample)) {
                        *p += leaf;
                    }
                }
                proba.iter_mut().for_each(|p| *p /= n_trees);
                proba
            })
            .collect()
    }

    /// Probability of [`POSITIVE_LABEL`] per sample, or `None` when the
    /// forest never saw that label.
    pub fn predict_positive_proba(&self, x: &[Vec<f64>]) -> Option<Vec<f64>> {
        let column = self.classes.iter().position(|&c| c == POSITIVE_LABEL)?;
        Some(self.predict_proba(x).into_iter().map(|p| p[column]).collect())
    }

    /// Most probable label per sample; ties go to the lower label.
    pub fn predict(&self, x: &[Vec<f64>]) -> Vec<u8> {
        self.predict_proba(x)
            .into_iter()
            .map(|proba| {
                let mut best = 0;
                for (i, &p) in proba.iter().enumerate() {
                    if p > proba[best] {
                        best = i;
                    }
                }
                self.classes[best]
            })
            .collect()
    }
}

fn average_importances(trees: &[DecisionTree], n_features: usize) -> Vec<f64> {
    let mut total = vec![0.0; n_features];
    let mut contributing = 0usize;

    for tree in trees.iter().filter(|t| t.n_splits() > 0) {
        contributing += 1;
        for (acc, imp) in total.iter_mut().zip(tree.feature_importances()) {
            *acc += imp;
        }
    }

    if contributing == 0 {
        return total;
    }

    let sum: f64 = total.iter().sum();
    if sum > 0.0 {
        total.iter_mut().for_each(|v| *v /= sum);
    }
    total
}
