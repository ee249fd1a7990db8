use std::collections::BTreeSet;
use std::fmt;

use crate::models::Outcome;

/// Accuracy plus support-weighted precision, recall and F1.
///
/// Ratios with a zero denominator (a class that was never predicted, say)
/// count as 0 instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ClassificationMetrics {
    pub fn compute(actual: &[Outcome], predicted: &[Outcome]) -> Self {
        let total = actual.len().min(predicted.len());
        if total == 0 {
            return Self::default();
        }
        let pairs = || actual.iter().zip(predicted.iter()).take(total);

        let correct = pairs().filter(|&(a, p)| a == p).count();
        let labels: BTreeSet<Outcome> = pairs().flat_map(|(&a, &p)| [a, p]).collect();

        let mut precision = 0.0;
        let mut recall = 0.0;
        let mut f1_score = 0.0;
        for label in labels {
            let support = pairs().filter(|&(&a, _)| a == label).count();
            let predicted_count = pairs().filter(|&(_, &p)| p == label).count();
            let true_positives = pairs().filter(|&(&a, &p)| a == label && p == label).count();

            let p = ratio(true_positives, predicted_count);
            let r = ratio(true_positives, support);
            let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };

            let weight = support as f64 / total as f64;
            precision += weight * p;
            recall += weight * r;
            f1_score += weight * f;
        }

        Self {
            accuracy: correct as f64 / total as f64,
            precision,
            recall,
            f1_score,
            support: total,
        }
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl fmt::Display for ClassificationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Acc: {:.3} | Precision: {:.3} | Recall: {:.3} | F1: {:.3} | n={}",
            self.accuracy, self.precision, self.recall, self.f1_score, self.support
        )
    }
}
