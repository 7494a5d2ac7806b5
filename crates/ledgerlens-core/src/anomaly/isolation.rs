//! Isolation forest
//!
//! Each tree isolates points with random axis-aligned cuts on a sub-sample.
//! Outliers need fewer cuts, so their average path length is short and their
//! score `-2^(-E[h(x)] / c(psi))` is close to -1. Typical points score near -0.5.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::features::{FeatureRow, N_FEATURES};

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Expected path length of an unsuccessful BST search over `n` points
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Percentile of `values` with linear interpolation between closest ranks.
///
/// `q` is in `[0, 100]`. Returns NaN for an empty slice.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum ITree {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<ITree>,
        right: Box<ITree>,
    },
}

impl ITree {
    fn grow(
        rows: &[FeatureRow],
        indices: &[usize],
        depth: usize,
        height_limit: usize,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        if depth >= height_limit || indices.len() <= 1 {
            return Self::Leaf {
                size: indices.len(),
            };
        }

        let mut features: Vec<usize> = (0..N_FEATURES).collect();
        features.shuffle(rng);

        // First non-constant feature in random order
        let chosen = features.into_iter().find_map(|f| {
            let (lo, hi) = indices.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(rows[i][f]), hi.max(rows[i][f]))
            });
            (hi > lo).then_some((f, lo, hi))
        });

        let Some((feature, lo, hi)) = chosen else {
            return Self::Leaf {
                size: indices.len(),
            };
        };

        let threshold = rng.gen_range(lo..hi);
        let (left, right): (Vec<usize>, Vec<usize>) =
            indices.iter().partition(|&&i| rows[i][feature] <= threshold);

        Self::Split {
            feature,
            threshold,
            left: Box::new(Self::grow(rows, &left, depth + 1, height_limit, rng)),
            right: Box::new(Self::grow(rows, &right, depth + 1, height_limit, rng)),
        }
    }

    /// Path length of `row`, corrected by the expected length below the leaf
    fn path_length(&self, row: &FeatureRow) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Self::Leaf { size } => return depth + average_path_length(*size),
                Self::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Fitted isolation forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<ITree>,
    sample_size: usize,
}

impl IsolationForest {
    /// Grow `n_trees` trees on sub-samples of `min(max_samples, n)` rows drawn
    /// without replacement. Tree `i` uses seed `seed + i`.
    pub fn fit(rows: &[FeatureRow], n_trees: usize, max_samples: usize, seed: u64) -> Result<Self> {
        if rows.is_empty() {
            return Err(Error::Training("isolation forest needs at least one row".into()));
        }
        if n_trees == 0 {
            return Err(Error::Training("isolation forest needs at least one tree".into()));
        }

        let sample_size = max_samples.min(rows.len()).max(1);
        let height_limit = (sample_size as f64).log2().ceil().max(0.0) as usize;

        let all: Vec<usize> = (0..rows.len()).collect();
        let trees = (0..n_trees)
            .map(|i| {
                let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(i as u64));
                let sample: Vec<usize> = all
                    .choose_multiple(&mut rng, sample_size)
                    .copied()
                    .collect();
                ITree::grow(rows, &sample, 0, height_limit, &mut rng)
            })
            .collect();

        Ok(Self { trees, sample_size })
    }

    /// Anomaly score in `[-1, 0]`; lower is more anomalous
    pub fn score(&self, row: &FeatureRow) -> f64 {
        let mean_path = self.trees.iter().map(|t| t.path_length(row)).sum::<f64>()
            / self.trees.len() as f64;
        let c = average_path_length(self.sample_size);
        if c <= 0.0 {
            // A single-row sample cannot separate anything
            return -1.0;
        }
        -(2f64.powf(-mean_path / c))
    }

    pub fn score_all(&self, rows: &[FeatureRow]) -> Vec<f64> {
        rows.iter().map(|r| self.score(r)).collect()
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn sample_size(&self) -> usize {
        self.sample_size
    }
}
