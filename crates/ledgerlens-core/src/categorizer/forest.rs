//! Random forest classifier over sparse text vectors
//!
//! Gini-impurity CART trees grown on bootstrap samples, with `sqrt(features)`
//! candidate features per split. Features that are constant within a node
//! do not count toward that budget, so sparse TF-IDF columns that are all
//! zero in a node are skipped without consuming a draw.

use std::collections::BTreeSet;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::text::SparseVector;
use crate::error::{Error, Result};

/// Random forest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Maximum depth of each tree (unbounded if None)
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        probs: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Value of `feature` in a sparse row (absent means zero)
fn value_at(row: &SparseVector, feature: usize) -> f64 {
    match row.binary_search_by_key(&feature, |(idx, _)| *idx) {
        Ok(pos) => row[pos].1,
        Err(_) => 0.0,
    }
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let n = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

struct TreeBuilder<'a> {
    rows: &'a [SparseVector],
    labels: &'a [usize],
    n_classes: usize,
    max_features: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
}

/// Best split found for a node: (feature, threshold, weighted child impurity)
type SplitCandidate = (usize, f64, f64);

impl<'a> TreeBuilder<'a> {
    fn class_counts(&self, indices: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &i in indices {
            counts[self.labels[i]] += 1;
        }
        counts
    }

    fn leaf(&self, counts: &[usize], total: usize) -> Node {
        let n = total.max(1) as f64;
        Node::Leaf {
            probs: counts.iter().map(|&c| c as f64 / n).collect(),
        }
    }

    fn build(&self, indices: &[usize], depth: usize, rng: &mut ChaCha8Rng) -> Node {
        let counts = self.class_counts(indices);
        let impurity = gini(&counts, indices.len());

        let depth_exhausted = self.max_depth.map_or(false, |d| depth >= d);
        if impurity < 1e-12 || indices.len() < self.min_samples_split || depth_exhausted {
            return self.leaf(&counts, indices.len());
        }

        let Some((feature, threshold, _)) = self.find_best_split(indices, rng) else {
            return self.leaf(&counts, indices.len());
        };

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
            .iter()
            .partition(|&&i| value_at(&self.rows[i], feature) <= threshold);

        let left = self.build(&left_idx, depth + 1, rng);
        let right = self.build(&right_idx, depth + 1, rng);

        Node::Split {
            feature,
            threshold,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    fn find_best_split(&self, indices: &[usize], rng: &mut ChaCha8Rng) -> Option<SplitCandidate> {
        // Only features that are non-zero somewhere in the node can vary
        let mut candidates: Vec<usize> = indices
            .iter()
            .flat_map(|&i| self.rows[i].iter().map(|(f, _)| *f))
            .collect::<BTreeSet<usize>>()
            .into_iter()
            .collect();
        candidates.shuffle(rng);

        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;

        for feature in candidates {
            if visited >= self.max_features {
                break;
            }
            let Some((threshold, score)) = self.best_threshold(indices, feature) else {
                continue; // constant in this node
            };
            visited += 1;
            if best.map_or(true, |(_, _, s)| score < s) {
                best = Some((feature, threshold, score));
            }
        }

        best
    }

    /// Lowest weighted Gini over thresholds of one feature, or None if the
    /// feature is constant across `indices`
    fn best_threshold(&self, indices: &[usize], feature: usize) -> Option<(f64, f64)> {
        let mut values: Vec<(f64, usize)> = indices
            .iter()
            .map(|&i| (value_at(&self.rows[i], feature), self.labels[i]))
            .collect();
        values.sort_by(|a, b| a.0.total_cmp(&b.0));

        let n = values.len();
        let mut right_counts = vec![0usize; self.n_classes];
        for &(_, label) in &values {
            right_counts[label] += 1;
        }
        let mut left_counts = vec![0usize; self.n_classes];

        let mut best: Option<(f64, f64)> = None;
        for i in 0..n - 1 {
            let label = values[i].1;
            left_counts[label] += 1;
            right_counts[label] -= 1;

            if values[i].0 >= values[i + 1].0 {
                continue;
            }

            let n_left = i + 1;
            let n_right = n - n_left;
            let score = (n_left as f64 * gini(&left_counts, n_left)
                + n_right as f64 * gini(&right_counts, n_right))
                / n as f64;

            if best.map_or(true, |(_, s)| score < s) {
                let mut threshold = (values[i].0 + values[i + 1].0) / 2.0;
                if threshold >= values[i + 1].0 {
                    threshold = values[i].0;
                }
                best = Some((threshold, score));
            }
        }

        best
    }
}

/// Random forest classifier. Labels are class indices `0..n_classes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    config: ForestConfig,
    n_classes: usize,
    trees: Vec<Node>,
}

impl RandomForestClassifier {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            n_classes: 0,
            trees: Vec::new(),
        }
    }

    /// Train on sparse rows with `n_features` columns
    pub fn fit(
        &mut self,
        rows: &[SparseVector],
        labels: &[usize],
        n_features: usize,
        n_classes: usize,
    ) -> Result<()> {
        if rows.is_empty() || rows.len() != labels.len() {
            return Err(Error::Training(format!(
                "forest needs matching non-empty rows and labels ({} rows, {} labels)",
                rows.len(),
                labels.len()
            )));
        }
        if n_classes == 0 || labels.iter().any(|&l| l >= n_classes) {
            return Err(Error::Training("label out of range".into()));
        }

        let max_features = ((n_features as f64).sqrt().floor() as usize).max(1);
        let builder = TreeBuilder {
            rows,
            labels,
            n_classes,
            max_features,
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split.max(2),
        };

        let n = rows.len();
        self.trees = (0..self.config.n_trees)
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed.wrapping_add(i as u64));
                let sample: Vec<usize> = if self.config.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                builder.build(&sample, 0, &mut rng)
            })
            .collect();
        self.n_classes = n_classes;

        Ok(())
    }

    /// Mean class probabilities across trees
    pub fn predict_proba(&self, row: &SparseVector) -> Result<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(Error::NotTrained("random forest has no trees".into()));
        }

        let mut probs = vec![0.0; self.n_classes];
        for tree in &self.trees {
            let mut node = tree;
            loop {
                match node {
                    Node::Leaf { probs: leaf } => {
                        for (p, l) in probs.iter_mut().zip(leaf) {
                            *p += l;
                        }
                        break;
                    }
                    Node::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        node = if value_at(row, *feature) <= *threshold {
                            left
                        } else {
                            right
                        };
                    }
                }
            }
        }

        let n = self.trees.len() as f64;
        for p in &mut probs {
            *p /= n;
        }
        Ok(probs)
    }

    /// Most probable class index; ties go to the lowest index
    pub fn predict(&self, row: &SparseVector) -> Result<usize> {
        let probs = self.predict_proba(row)?;
        let mut best = 0;
        for (i, &p) in probs.iter().enumerate() {
            if p > probs[best] {
                best = i;
            }
        }
        Ok(best)
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> (Vec<SparseVector>, Vec<usize>) {
        // class 0 uses feature 0, class 1 uses feature 1, class 2 uses feature 2
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..30 {
            let class = i % 3;
            let weight = 0.5 + (i as f64) / 100.0;
            rows.push(vec![(class, weight), (3, 0.1)]);
            labels.push(class);
        }
        (rows, labels)
    }

    #[test]
    fn test_forest_separates_classes() {
        let (rows, labels) = dataset();
        let mut forest = RandomForestClassifier::new(ForestConfig {
            n_trees: 25,
            ..Default::default()
        });
        forest.fit(&rows, &labels, 4, 3).unwrap();

        assert_eq!(forest.n_trees(), 25);
        let correct = rows
            .iter()
            .zip(&labels)
            .filter(|(r, l)| forest.predict(r).unwrap() == **l)
            .count();
        assert!(correct >= 27, "only {} of 30 correct", correct);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (rows, labels) = dataset();
        let mut forest = RandomForestClassifier::new(ForestConfig {
            n_trees: 10,
            ..Default::default()
        });
        forest.fit(&rows, &labels, 4, 3).unwrap();

        let probs = forest.predict_proba(&vec![(1, 0.7)]).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_model() {
        let (rows, labels) = dataset();
        let mut a = RandomForestClassifier::new(ForestConfig::default());
        let mut b = RandomForestClassifier::new(ForestConfig::default());
        a.fit(&rows, &labels, 4, 3).unwrap();
        b.fit(&rows, &labels, 4, 3).unwrap();

        let probe = vec![(0, 0.3), (2, 0.3)];
        assert_eq!(a.predict_proba(&probe).unwrap(), b.predict_proba(&probe).unwrap());
    }

    #[test]
    fn test_untrained_forest_errors() {
        let forest = RandomForestClassifier::new(ForestConfig::default());
        assert!(forest.predict(&vec![]).is_err());
    }

    #[test]
    fn test_fit_rejects_mismatched_input() {
        let mut forest = RandomForestClassifier::new(ForestConfig::default());
        assert!(forest.fit(&[vec![]], &[0, 1], 1, 2).is_err());
        assert!(forest.fit(&[vec![]], &[5], 1, 2).is_err());
    }
}
