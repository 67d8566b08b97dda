//! Hold-out and cross-validation partitions.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::error::{PipelineError, PipelineResult};

/// Row indices of one partition pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Why a stratified hold-out split could not be drawn.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StratifyError {
    #[error("class {label} has only {count} member(s), at least 2 are required")]
    ClassTooSmall { label: u8, count: usize },
    #[error("{partition} partition of {size} cannot hold all {classes} classes")]
    PartitionTooSmall {
        partition: &'static str,
        size: usize,
        classes: usize,
    },
    #[error("cannot split {0} sample(s)")]
    TooFewSamples(usize),
}

/// A hold-out split and whether it preserved class proportions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldOut {
    pub split: CVSplit,
    pub stratified: bool,
}

fn partition_sizes(n: usize, test_fraction: f64) -> Result<(usize, usize), StratifyError> {
    let n_test = (test_fraction * n as f64).ceil() as usize;
    if n < 2 || n_test == 0 || n_test >= n {
        return Err(StratifyError::TooFewSamples(n));
    }
    Ok((n - n_test, n_test))
}

fn indices_by_class(labels: &[u8]) -> BTreeMap<u8, Vec<usize>> {
    let mut classes: BTreeMap<u8, Vec<usize>> = BTreeMap::new();
    for (i, &label) in labels.iter().enumerate() {
        classes.entry(label).or_default().push(i);
    }
    classes
}

/// Per-class test counts proportional to class size; the remainder goes to
/// the classes with the largest fractional share.
fn allocate_test_counts(counts: &[usize], n: usize, n_test: usize) -> Vec<usize> {
    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| c as f64 * n_test as f64 / n as f64)
        .collect();
    let mut alloc: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let mut remaining = n_test - alloc.iter().sum::<usize>();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = exact[a] - exact[a].floor();
        let fb = exact[b] - exact[b].floor();
        fb.total_cmp(&fa).then(counts[b].cmp(&counts[a]))
    });

    for &k in order.iter().cycle().take(order.len() * 2) {
        if remaining == 0 {
            break;
        }
        if alloc[k] < counts[k] - 1 {
            alloc[k] += 1;
            remaining -= 1;
        }
    }
    alloc
}

/// Shuffled split that keeps each class's share in both partitions.
///
/// The test partition holds `ceil(test_fraction * n)` rows.
pub fn stratified_train_test_split(
    labels: &[u8],
    test_fraction: f64,
    seed: u64,
) -> Result<CVSplit, StratifyError> {
    let n = labels.len();
    let (n_train, n_test) = partition_sizes(n, test_fraction)?;
    let classes = indices_by_class(labels);

    if let Some((&label, members)) = classes.iter().find(|(_, m)| m.len() < 2) {
        return Err(StratifyError::ClassTooSmall {
            label,
            count: members.len(),
        });
    }
    if n_test < classes.len() {
        return Err(StratifyError::PartitionTooSmall {
            partition: "test",
            size: n_test,
            classes: classes.len(),
        });
    }
    if n_train < classes.len() {
        return Err(StratifyError::PartitionTooSmall {
            partition: "train",
            size: n_train,
            classes: classes.len(),
        });
    }

    let counts: Vec<usize> = classes.values().map(Vec::len).collect();
    let test_counts = allocate_test_counts(&counts, n, n_test);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train_indices = Vec::with_capacity(n_train);
    let mut test_indices = Vec::with_capacity(n_test);

    for (members, &k) in classes.values().zip(&test_counts) {
        let mut members = members.clone();
        members.shuffle(&mut rng);
        test_indices.extend_from_slice(&members[..k]);
        train_indices.extend_from_slice(&members[k..]);
    }

    train_indices.shuffle(&mut rng);
    test_indices.shuffle(&mut rng);

    Ok(CVSplit {
        train_indices,
        test_indices,
    })
}

/// Shuffled split ignoring labels.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<CVSplit, StratifyError> {
    let (_, n_test) = partition_sizes(n, test_fraction)?;
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(&mut rng);
    let train_indices = order.split_off(n_test);

    Ok(CVSplit {
        train_indices,
        test_indices: order,
    })
}

/// Stratified split, falling back to a plain shuffled split when the class
/// counts cannot support stratification.
pub fn hold_out_split(labels: &[u8], test_fraction: f64, seed: u64) -> PipelineResult<HoldOut> {
    match stratified_train_test_split(labels, test_fraction, seed) {
        Ok(split) => Ok(HoldOut {
            split,
            stratified: true,
        }),
        Err(StratifyError::TooFewSamples(n)) => Err(PipelineError::InsufficientData(format!(
            "cannot split {n} sample(s) into train and test"
        ))),
        Err(reason) => {
            tracing::warn!(%reason, "Stratified split impossible, using unstratified split");
            let split = train_test_split(labels.len(), test_fraction, seed)
                .map_err(|e| PipelineError::InsufficientData(e.to_string()))?;
            Ok(HoldOut {
                split,
                stratified: false,
            })
        }
    }
}

/// Stratified K-fold without shuffling.
///
/// Each class's rows, in input order, are cut into `n_splits` contiguous
/// chunks whose sizes differ by at most one (earlier chunks take the extra
/// row); fold `k` tests on chunk `k` of every class.
pub fn stratified_k_fold(labels: &[u8], n_splits: usize) -> PipelineResult<Vec<CVSplit>> {
    let n = labels.len();
    if n_splits < 2 {
        return Err(PipelineError::ModelFitFailure(format!(
            "cross-validation needs at least 2 folds, got {n_splits}"
        )));
    }
    if n < n_splits {
        return Err(PipelineError::ModelFitFailure(format!(
            "cannot cut {n} sample(s) into {n_splits} folds"
        )));
    }

    let classes = indices_by_class(labels);
    if classes.values().all(|m| m.len() < n_splits) {
        return Err(PipelineError::ModelFitFailure(format!(
            "n_splits={n_splits} is greater than the number of members in each class"
        )));
    }
    if let Some((label, members)) = classes.iter().find(|(_, m)| m.len() < n_splits) {
        tracing::warn!(
            label,
            members = members.len(),
            n_splits,
            "Least populated class has fewer members than folds"
        );
    }

    let mut test_folds: Vec<Vec<usize>> = vec![Vec::new(); n_splits];
    for members in classes.values() {
        let base = members.len() / n_splits;
        let extra = members.len() % n_splits;
        let mut start = 0;
        for (k, fold) in test_folds.iter_mut().enumerate() {
            let size = base + usize::from(k < extra);
            fold.extend_from_slice(&members[start..start + size]);
            start += size;
        }
    }

    let splits: Vec<CVSplit> = test_folds
        .into_iter()
        .map(|mut test_indices| {
            test_indices.sort_unstable();
            let mut in_test = vec![false; n];
            for &i in &test_indices {
                in_test[i] = true;
            }
            let train_indices = (0..n).filter(|&i| !in_test[i]).collect();
            CVSplit {
                train_indices,
                test_indices,
            }
        })
        .collect();

    for (k, split) in splits.iter().enumerate() {
        let first = labels[split.train_indices[0]];
        if split.train_indices.iter().all(|&i| labels[i] == first) {
            return Err(PipelineError::ModelFitFailure(format!(
                "training part of fold {k} holds a single class"
            )));
        }
    }

    Ok(splits)
}
