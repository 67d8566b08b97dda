//! Weighted CART classification tree.
//!
//! Sample weights carry both the bootstrap multiplicity and the class
//! weight, so a sample drawn twice from a rare class counts twice as much
//! as its class weight alone.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

/// Values closer than this are treated as equal when placing thresholds.
const FEATURE_THRESHOLD: f64 = 1e-7;
const IMPURITY_EPSILON: f64 = 1e-12;

/// Tree growth limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Non-constant features examined per split.
    pub max_features: usize,
}

/// Decision tree node
#[derive(Debug, Clone)]
pub enum TreeNode {
    /// Leaf holding the weighted class distribution (sums to 1)
    Leaf { distribution: Vec<f64> },
    /// Internal node; samples with `x[feature] <= threshold` go left
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    root: TreeNode,
    n_classes: usize,
    /// Impurity decrease per feature, normalized to sum to 1 (all zero when
    /// the tree never split).
    feature_importances: Vec<f64>,
    n_splits: usize,
}

struct Builder<'a, R: Rng> {
    x: &'a [Vec<f64>],
    y: &'a [usize],
    weights: &'a [f64],
    n_classes: usize,
    params: TreeParams,
    rng: &'a mut R,
    importances: Vec<f64>,
    n_splits: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    left_impurity_sum: f64,
}

impl DecisionTree {
    /// Grows a tree on the samples with positive weight.
    ///
    /// `y` holds class indices in `0..n_classes`.
    pub fn fit<R: Rng>(
        x: &[Vec<f64>],
        y: &[usize],
        weights: &[f64],
        n_classes: usize,
        params: TreeParams,
        rng: &mut R,
    ) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let indices: Vec<usize> = (0..x.len()).filter(|&i| weights[i] > 0.0).collect();

        let mut builder = Builder {
            x,
            y,
            weights,
            n_classes,
            params,
            rng,
            importances: vec![0.0; n_features],
            n_splits: 0,
        };
        let root = builder.build(indices, 0);

        let mut importances = builder.importances;
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for imp in &mut importances {
                *imp /= total;
            }
        }

        Self {
            root,
            n_classes,
            feature_importances: importances,
            n_splits: builder.n_splits,
        }
    }

    /// Class distribution of the leaf `sample` falls into.
    pub fn predict_proba_one(&self, sample: &[f64]) -> &[f64] {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { distribution } => return distribution,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if sample[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Number of internal nodes.
    pub fn n_splits(&self) -> usize {
        self.n_splits
    }

    pub fn depth(&self) -> usize {
        fn node_depth(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + node_depth(left).max(node_depth(right)),
            }
        }
        node_depth(&self.root)
    }
}

fn gini(counts: &[f64], total: f64) -> f64 {
    if total <= 0.0 {
        return 0.0;
    }
    1.0 - counts.iter().map(|c| (c / total).powi(2)).sum::<f64>()
}

impl<R: Rng> Builder<'_, R> {
    fn class_counts(&self, indices: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes];
        for &i in indices {
            counts[self.y[i]] += self.weights[i];
        }
        counts
    }

    fn leaf(counts: &[f64]) -> TreeNode {
        let total: f64 = counts.iter().sum();
        let distribution = if total > 0.0 {
            counts.iter().map(|c| c / total).collect()
        } else {
            vec![1.0 / counts.len() as f64; counts.len()]
        };
        TreeNode::Leaf { distribution }
    }

    fn build(&mut self, indices: Vec<usize>, depth: usize) -> TreeNode {
        let counts = self.class_counts(&indices);
        let total: f64 = counts.iter().sum();
        let impurity = gini(&counts, total);
        let n = indices.len();

        let should_stop = self.params.max_depth.is_some_and(|d| depth >= d)
            || n < self.params.min_samples_split
            || n < 2 * self.params.min_samples_leaf
            || impurity <= IMPURITY_EPSILON;

        if should_stop {
            return Self::leaf(&counts);
        }

        let Some(best) = self.find_best_split(&indices, &counts) else {
            return Self::leaf(&counts);
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[i][best.feature] <= best.threshold);

        self.importances[best.feature] += total * impurity - best.left_impurity_sum;
        self.n_splits += 1;

        let left = Box::new(self.build(left, depth + 1));
        let right = Box::new(self.build(right, depth + 1));

        TreeNode::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        }
    }

    /// Scans features in random order until `max_features` non-constant ones
    /// have been examined, keeping the split with the lowest weighted child
    /// impurity.
    fn find_best_split(&mut self, indices: &[usize], parent_counts: &[f64]) -> Option<BestSplit> {
        let n_features = self.importances.len();
        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(self.rng);

        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent_total: f64 = parent_counts.iter().sum();
        let mut best: Option<BestSplit> = None;
        let mut visited = 0;

        for feature in features {
            if visited >= self.params.max_features {
                break;
            }

            let mut column: Vec<(f64, usize)> =
                indices.iter().map(|&i| (self.x[i][feature], i)).collect();
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let (first, last) = (column[0].0, column[column.len() - 1].0);
            if last <= first + FEATURE_THRESHOLD {
                continue;
            }
            visited += 1;

            let mut left_counts = vec![0.0; self.n_classes];
            let mut left_total = 0.0;

            for pos in 0..column.len() - 1 {
                let (value, idx) = column[pos];
                let w = self.weights[idx];
                left_counts[self.y[idx]] += w;
                left_total += w;

                let next_value = column[pos + 1].0;
                if next_value <= value + FEATURE_THRESHOLD {
                    continue;
                }

                let n_left = pos + 1;
                let n_right = column.len() - n_left;
                if n_left < min_leaf || n_right < min_leaf {
                    continue;
                }

                let right_counts: Vec<f64> = parent_counts
                    .iter()
                    .zip(&left_counts)
                    .map(|(p, l)| p - l)
                    .collect();
                let right_total = parent_total - left_total;

                let children = left_total * gini(&left_counts, left_total)
                    + right_total * gini(&right_counts, right_total);

                if best.as_ref().is_none_or(|b| children < b.left_impurity_sum) {
                    let mut threshold = (value + next_value) / 2.0;
                    if threshold >= next_value || !threshold.is_finite() {
                        threshold = value;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        left_impurity_sum: children,
                    });
                }
            }
        }

        best
    }
}
