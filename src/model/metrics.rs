//! Binary classification metrics and their text renderings.
//!
//! Class 1 is the positive class. Undefined ratios (no predicted or no true
//! positives) count as 0.

use serde::Serialize;
use std::fmt::Write;

use crate::stats::safe_ratio;

/// Display names of the two classes, in label order.
pub const TARGET_NAMES: [&str; 2] = ["0 (Sem Interrupção)", "1 (Com Interrupção)"];

/// 2x2 confusion matrix; rows are true labels, columns predictions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut cm = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred) {
            match (t == 1, p == 1) {
                (false, false) => cm.true_negatives += 1,
                (false, true) => cm.false_positives += 1,
                (true, false) => cm.false_negatives += 1,
                (true, true) => cm.true_positives += 1,
            }
        }
        cm
    }

    pub fn total(&self) -> usize {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    fn rows(&self) -> [[usize; 2]; 2] {
        [
            [self.true_negatives, self.false_positives],
            [self.false_negatives, self.true_positives],
        ]
    }

    /// Bracketed grid with every cell right-aligned to the widest count:
    /// `[[18  1]\n [ 1  0]]`.
    pub fn render(&self) -> String {
        let rows = self.rows();
        let width = rows
            .iter()
            .flatten()
            .map(|v| v.to_string().len())
            .max()
            .unwrap_or(1);

        let lines: Vec<String> = rows
            .iter()
            .map(|row| format!("[{:>width$} {:>width$}]", row[0], row[1]))
            .collect();
        format!("[{}]", lines.join("\n "))
    }
}

/// Precision, recall, F1 and support of one class (or one average).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassMetrics {
    fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
        let precision = safe_ratio(tp as f64, (tp + fp) as f64);
        let recall = safe_ratio(tp as f64, (tp + fn_) as f64);
        Self {
            precision,
            recall,
            f1: safe_ratio(2.0 * precision * recall, precision + recall),
            support: tp + fn_,
        }
    }
}

/// Per-class rows plus accuracy, macro and support-weighted averages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationReport {
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
}

impl ClassificationReport {
    pub fn from_confusion(cm: &ConfusionMatrix) -> Self {
        let negative = ClassMetrics::from_counts(cm.true_negatives, cm.false_negatives, cm.false_positives);
        let positive = ClassMetrics::from_counts(cm.true_positives, cm.false_positives, cm.false_negatives);
        let classes = [negative, positive];
        let total = cm.total();

        let macro_avg = ClassMetrics {
            precision: (negative.precision + positive.precision) / 2.0,
            recall: (negative.recall + positive.recall) / 2.0,
            f1: (negative.f1 + positive.f1) / 2.0,
            support: total,
        };
        let weighted = |pick: fn(&ClassMetrics) -> f64| {
            safe_ratio(
                classes.iter().map(|c| pick(c) * c.support as f64).sum(),
                total as f64,
            )
        };
        let weighted_avg = ClassMetrics {
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support: total,
        };

        Self {
            classes,
            accuracy: safe_ratio((cm.true_negatives + cm.true_positives) as f64, total as f64),
            macro_avg,
            weighted_avg,
        }
    }

    /// Fixed-width table with two decimals, class names right-aligned.
    pub fn render(&self) -> String {
        self.render_with_names(TARGET_NAMES)
    }

    /// [`render`](Self::render) with caller-chosen class names.
    pub fn render_with_names(&self, names: [&str; 2]) -> String {
        let width = names
            .iter()
            .map(|n| n.chars().count())
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(0);

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>width$}  {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        );
        out.push('\n');

        let row = |out: &mut String, name: &str, m: &ClassMetrics| {
            let _ = writeln!(
                out,
                "{:>width$}  {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, m.precision, m.recall, m.f1, m.support
            );
        };

        for (name, metrics) in names.iter().zip(&self.classes) {
            row(&mut out, name, metrics);
        }
        out.push('\n');

        let _ = writeln!(
            out,
            "{:>width$}  {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        );
        row(&mut out, "macro avg", &self.macro_avg);
        row(&mut out, "weighted avg", &self.weighted_avg);
        out
    }
}

pub fn accuracy(y_true: &[u8], y_pred: &[u8]) -> f64 {
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    safe_ratio(correct as f64, y_true.len() as f64)
}

/// F1 of the positive class.
pub fn f1_score(y_true: &[u8], y_pred: &[u8]) -> f64 {
    let cm = ConfusionMatrix::from_predictions(y_true, y_pred);
    ClassMetrics::from_counts(cm.true_positives, cm.false_positives, cm.false_negatives).f1
}

/// Area under the ROC curve from positive-class scores, via the rank-sum
/// statistic with tied scores sharing their mean rank.
///
/// `None` when `y_true` lacks either class.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> Option<f64> {
    let n_pos = y_true.iter().filter(|&&y| y == 1).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 || scores.len() != y_true.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based
        let mean_rank = (i + j) as f64 / 2.0 + 1.0;
        rank_sum += order[i..=j]
            .iter()
            .filter(|&&k| y_true[k] == 1)
            .count() as f64
            * mean_rank;
        i = j + 1;
    }

    let (pos, neg) = (n_pos as f64, n_neg as f64);
    Some((rank_sum - pos * (pos + 1.0) / 2.0) / (pos * neg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_matrix_render() {
        let cm = ConfusionMatrix {
            true_negatives: 18,
            false_positives: 1,
            false_negatives: 1,
            true_positives: 0,
        };
        assert_eq!(cm.render(), "[[18  1]\n [ 1  0]]");
        assert_eq!(cm.total(), 20);

        let small = ConfusionMatrix {
            true_negatives: 3,
            ..Default::default()
        };
        assert_eq!(small.render(), "[[3 0]\n [0 0]]");
    }

    #[test]
    fn test_confusion_from_predictions() {
        let cm = ConfusionMatrix::from_predictions(&[0, 0, 1, 1, 1], &[0, 1, 1, 0, 1]);
        assert_eq!(cm.true_negatives, 1);
        assert_eq!(cm.false_positives, 1);
        assert_eq!(cm.false_negatives, 1);
        assert_eq!(cm.true_positives, 2);
    }

    #[test]
    fn test_f1_and_accuracy() {
        let y_true = [0, 0, 1, 1, 1];
        let y_pred = [0, 1, 1, 0, 1];
        assert!((accuracy(&y_true, &y_pred) - 0.6).abs() < 1e-12);
        // precision 2/3, recall 2/3
        assert!((f1_score(&y_true, &y_pred) - 2.0 / 3.0).abs() < 1e-12);
        // no predicted positives
        assert_eq!(f1_score(&[0, 1], &[0, 0]), 0.0);
    }

    #[test]
    fn test_roc_auc() {
        assert_eq!(roc_auc(&[0, 0, 1, 1], &[0.1, 0.4, 0.35, 0.8]), Some(0.75));
        assert_eq!(roc_auc(&[0, 1], &[0.2, 0.9]), Some(1.0));
        // ties share their rank
        assert_eq!(roc_auc(&[0, 1], &[0.5, 0.5]), Some(0.5));
        assert_eq!(roc_auc(&[0, 0], &[0.1, 0.2]), None);
    }

    #[test]
    fn test_classification_report_render() {
        let cm = ConfusionMatrix {
            true_negatives: 18,
            false_positives: 1,
            false_negatives: 1,
            true_positives: 0,
        };
        let report = ClassificationReport::from_confusion(&cm);
        let expected = concat!(
            "                     precision    recall  f1-score   support\n",
            "\n",
            "0 (Sem Interrupção)       0.95      0.95      0.95        19\n",
            "1 (Com Interrupção)       0.00      0.00      0.00         1\n",
            "\n",
            "           accuracy                           0.90        20\n",
            "          macro avg       0.47      0.47      0.47        20\n",
            "       weighted avg       0.90      0.90      0.90        20\n",
        );
        assert_eq!(report.render(), expected);
    }

    #[test]
    fn test_classification_report_with_plain_labels() {
        let cm = ConfusionMatrix {
            true_negatives: 8,
            false_positives: 0,
            false_negatives: 1,
            true_positives: 1,
        };
        let report = ClassificationReport::from_confusion(&cm);
        let expected = concat!(
            "              precision    recall  f1-score   support\n",
            "\n",
            "           0       0.89      1.00      0.94         8\n",
            "           1       1.00      0.50      0.67         2\n",
            "\n",
            "    accuracy                           0.90        10\n",
            "   macro avg       0.94      0.75      0.80        10\n",
            "weighted avg       0.91      0.90      0.89        10\n",
        );
        assert_eq!(report.render_with_names(["0", "1"]), expected);
    }
}
