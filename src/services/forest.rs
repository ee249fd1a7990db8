use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    /// Nodes with fewer samples than this become leaves
    pub min_samples_split: usize,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            min_samples_split: 10,
            seed: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForestError {
    #[error("no training samples")]
    EmptyInput,

    #[error("no feature columns")]
    NoFeatures,

    #[error("{rows} feature rows but {labels} labels")]
    ShapeMismatch { rows: usize, labels: usize },

    #[error("label {label} outside 0..{n_classes}")]
    LabelOutOfRange { label: usize, n_classes: usize },

    #[error("non-finite value at row {row}, column {column}")]
    NonFinite { row: usize, column: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn leaf_distribution(&self, features: &[f64]) -> &[f64] {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if features[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

struct TreeBuilder<'a> {
    x: &'a DMatrix<f64>,
    y: &'a [usize],
    n_classes: usize,
    min_samples_split: usize,
    max_features: usize,
    rng: StdRng,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl<'a> TreeBuilder<'a> {
    fn grow(mut self, sample: Vec<usize>) -> DecisionTree {
        let mut nodes = Vec::new();
        self.build(sample, &mut nodes);
        DecisionTree { nodes }
    }

    fn build(&mut self, indices: Vec<usize>, nodes: &mut Vec<Node>) -> usize {
        let counts = self.class_counts(&indices);
        let id = nodes.len();
        nodes.push(leaf(&counts, indices.len()));

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        if indices.len() < self.min_samples_split || pure {
            return id;
        }

        let Some(best) = self.best_split(&indices, gini(&counts, indices.len())) else {
            return id;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[(i, best.feature)] <= best.threshold);
        if left.is_empty() || right.is_empty() {
            return id;
        }

        let left_id = self.build(left, nodes);
        let right_id = self.build(right, nodes);
        nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    fn best_split(&mut self, indices: &[usize], parent_impurity: f64) -> Option<BestSplit> {
        let n = indices.len();
        let candidates = rand::seq::index::sample(&mut self.rng, self.x.ncols(), self.max_features).into_vec();
        let mut best: Option<BestSplit> = None;
        let mut order = indices.to_vec();

        for feature in candidates {
            order.sort_by(|&a, &b| self.x[(a, feature)].total_cmp(&self.x[(b, feature)]));

            let mut left_counts = vec![0usize; self.n_classes];
            let mut right_counts = self.class_counts(&order);

            for k in 0..n - 1 {
                let label = self.y[order[k]];
                left_counts[label] += 1;
                right_counts[label] -= 1;

                let value = self.x[(order[k], feature)];
                let next = self.x[(order[k + 1], feature)];
                if next <= value {
                    continue;
                }

                let n_left = k + 1;
                let n_right = n - n_left;
                let impurity = (n_left as f64 * gini(&left_counts, n_left)
                    + n_right as f64 * gini(&right_counts, n_right))
                    / n as f64;

                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    let midpoint = value + (next - value) / 2.0;
                    // midpoint can round up to `next` for adjacent floats
                    let threshold = if midpoint < next { midpoint } else { value };
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }

        best.filter(|b| b.impurity < parent_impurity - 1e-12)
    }

    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &i in indices {
            counts[self.y[i]] += 1;
        }
        counts
    }
}

fn leaf(counts: &[usize], total: usize) -> Node {
    let total = total.max(1) as f64;
    Node::Leaf {
        distribution: counts.iter().map(|&c| c as f64 / total).collect(),
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / total).powi(2)).sum::<f64>()
}

/// Bootstrap-sampled Gini trees. Probabilities average the leaf distributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
    n_classes: usize,
}

impl RandomForest {
    /// Fits on `x` (one row per sample) with labels `y` in `0..n_classes`.
    pub fn fit(x: &DMatrix<f64>, y: &[usize], n_classes: usize, params: &ForestParams) -> Result<Self, ForestError> {
        let (rows, columns) = x.shape();
        if rows == 0 {
            return Err(ForestError::EmptyInput);
        }
        if columns == 0 {
            return Err(ForestError::NoFeatures);
        }
        if rows != y.len() {
            return Err(ForestError::ShapeMismatch { rows, labels: y.len() });
        }
        if let Some(&label) = y.iter().find(|&&label| label >= n_classes) {
            return Err(ForestError::LabelOutOfRange { label, n_classes });
        }
        for row in 0..rows {
            for column in 0..columns {
                if !x[(row, column)].is_finite() {
                    return Err(ForestError::NonFinite { row, column });
                }
            }
        }

        let max_features = ((columns as f64).sqrt().floor() as usize).clamp(1, columns);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_trees.max(1))
            .map(|_| {
                let tree_rng = StdRng::seed_from_u64(rng.gen());
                let bootstrap: Vec<usize> = (0..rows).map(|_| rng.gen_range(0..rows)).collect();
                TreeBuilder {
                    x,
                    y,
                    n_classes,
                    min_samples_split: params.min_samples_split.max(2),
                    max_features,
                    rng: tree_rng,
                }
                .grow(bootstrap)
            })
            .collect();

        Ok(Self {
            trees,
            n_features: columns,
            n_classes,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Probability per class index; sums to 1.
    pub fn predict_proba(&self, features: &[f64]) -> Vec<f64> {
        let mut proba = vec![0.0; self.n_classes];
        for tree in &self.trees {
            for (p, leaf_p) in proba.iter_mut().zip(tree.leaf_distribution(features)) {
                *p += leaf_p;
            }
        }
        let total: f64 = proba.iter().sum();
        if total > 0.0 {
            proba.iter_mut().for_each(|p| *p /= total);
        }
        proba
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Class 1 iff the first column exceeds 5; second column is noise.
    fn threshold_problem() -> (DMatrix<f64>, Vec<usize>) {
        let n = 60;
        let x = DMatrix::from_fn(n, 2, |i, j| if j == 0 { (i % 10) as f64 } else { ((i * 7) % 13) as f64 });
        let y = (0..n).map(|i| usize::from(i % 10 > 5)).collect();
        (x, y)
    }

    fn predict(forest: &RandomForest, features: &[f64]) -> usize {
        let proba = forest.predict_proba(features);
        (0..proba.len()).fold(0, |best, class| if proba[class] > proba[best] { class } else { best })
    }

    #[test]
    fn test_learns_separable_threshold() {
        let (x, y) = threshold_problem();
        let params = ForestParams { n_trees: 25, ..ForestParams::default() };
        let forest = RandomForest::fit(&x, &y, 2, &params).unwrap();

        assert_eq!(predict(&forest, &[1.0, 3.0]), 0);
        assert_eq!(predict(&forest, &[9.0, 3.0]), 1);
        let proba = forest.predict_proba(&[9.0, 3.0]);
        assert_eq!(proba.len(), 2);
        assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(proba[1] > 0.5);
    }

    #[test]
    fn test_same_seed_gives_same_model() {
        let (x, y) = threshold_problem();
        let params = ForestParams { n_trees: 10, ..ForestParams::default() };
        let a = RandomForest::fit(&x, &y, 2, &params).unwrap();
        let b = RandomForest::fit(&x, &y, 2, &params).unwrap();
        for sample in [[0.0, 0.0], [5.5, 2.0], [7.0, 12.0]] {
            assert_eq!(a.predict_proba(&sample), b.predict_proba(&sample));
        }
    }

    #[test]
    fn test_single_class_predicts_it_with_certainty() {
        let x = DMatrix::from_fn(12, 3, |i, j| (i + j) as f64);
        let y = vec![0; 12];
        let forest = RandomForest::fit(&x, &y, 1, &ForestParams::default()).unwrap();
        assert_eq!(forest.predict_proba(&[1.0, 2.0, 3.0]), vec![1.0]);
    }

    #[test]
    fn test_rejects_bad_input() {
        let params = ForestParams::default();
        let empty = DMatrix::<f64>::zeros(0, 3);
        assert_eq!(RandomForest::fit(&empty, &[], 3, &params).unwrap_err(), ForestError::EmptyInput);

        let no_columns = DMatrix::<f64>::zeros(4, 0);
        assert_eq!(RandomForest::fit(&no_columns, &[0; 4], 3, &params).unwrap_err(), ForestError::NoFeatures);

        let mut x = DMatrix::<f64>::zeros(4, 2);
        assert!(matches!(
            RandomForest::fit(&x, &[0, 1], 3, &params),
            Err(ForestError::ShapeMismatch { rows: 4, labels: 2 })
        ));
        assert!(matches!(
            RandomForest::fit(&x, &[0, 1, 2, 3], 3, &params),
            Err(ForestError::LabelOutOfRange { label: 3, .. })
        ));

        x[(2, 1)] = f64::NAN;
        assert_eq!(
            RandomForest::fit(&x, &[0, 1, 2, 0], 3, &params).unwrap_err(),
            ForestError::NonFinite { row: 2, column: 1 }
        );
    }

    #[test]
    fn test_serialized_forest_predicts_identically() {
        let (x, y) = threshold_problem();
        let params = ForestParams { n_trees: 5, ..ForestParams::default() };
        let forest = RandomForest::fit(&x, &y, 2, &params).unwrap();
        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForest = serde_json::from_str(&json).unwrap();
        assert_eq!(forest.predict_proba(&[4.0, 1.0]), restored.predict_proba(&[4.0, 1.0]));
    }
}
