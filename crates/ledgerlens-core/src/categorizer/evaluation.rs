//! Hold-out split and classification scores for the learned layer

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Indices of the train and evaluation partitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub stratified: bool,
}

/// Shuffle-split `labels` into train/test with `ceil(test_size * n)` test rows.
///
/// The split is stratified when there is more than one class, every class has
/// at least two rows, and both partitions can hold one row per class.
/// Otherwise it falls back to a plain shuffled split.
pub fn train_test_split<T: Ord + Copy>(labels: &[T], test_size: f64, seed: u64) -> Split {
    let n = labels.len();
    let n_test = ((test_size * n as f64).ceil() as usize).clamp(usize::from(n > 1), n.saturating_sub(1));
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let mut by_class: BTreeMap<T, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(i);
    }

    let n_classes = by_class.len();
    let can_stratify = n_classes > 1
        && by_class.values().all(|members| members.len() >= 2)
        && n_test >= n_classes
        && n - n_test >= n_classes;

    if !can_stratify {
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        let test = order[..n_test].to_vec();
        let train = order[n_test..].to_vec();
        return Split {
            train,
            test,
            stratified: false,
        };
    }

    let allocation = allocate_test_counts(&by_class, n_test, n);

    let mut train = Vec::with_capacity(n - n_test);
    let mut test = Vec::with_capacity(n_test);
    for (members, take) in by_class.values().zip(allocation) {
        let mut members = members.clone();
        members.shuffle(&mut rng);
        test.extend_from_slice(&members[..take]);
        train.extend_from_slice(&members[take..]);
    }
    train.shuffle(&mut rng);
    test.shuffle(&mut rng);

    Split {
        train,
        test,
        stratified: true,
    }
}

/// Proportional per-class test counts summing to `n_test`, largest remainders
/// first. Every class keeps at least one row on each side.
fn allocate_test_counts<T>(by_class: &BTreeMap<T, Vec<usize>>, n_test: usize, n: usize) -> Vec<usize> {
    let sizes: Vec<usize> = by_class.values().map(Vec::len).collect();
    let exact: Vec<f64> = sizes
        .iter()
        .map(|&s| n_test as f64 * s as f64 / n as f64)
        .collect();

    let mut counts: Vec<usize> = exact
        .iter()
        .zip(&sizes)
        .map(|(&e, &s)| (e.floor() as usize).clamp(1, s - 1))
        .collect();

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });

    let mut assigned: usize = counts.iter().sum();
    while assigned < n_test {
        let Some(&class) = order.iter().find(|&&c| counts[c] < sizes[c] - 1) else {
            break;
        };
        counts[class] += 1;
        assigned += 1;
        order.rotate_left(1);
    }
    while assigned > n_test {
        let Some(&class) = order.iter().rev().find(|&&c| counts[c] > 1) else {
            break;
        };
        counts[class] -= 1;
        assigned -= 1;
        order.rotate_right(1);
    }

    counts
}

/// Accuracy plus support-weighted precision, recall and F1
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClassificationScores {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Score predictions against truth. Classes with no predicted (or no true)
/// rows score 0 for the undefined ratio. If the weighted scores cannot be
/// computed, all four numbers report accuracy.
pub fn classification_scores<T: Ord + Copy>(truth: &[T], predicted: &[T]) -> ClassificationScores {
    let n = truth.len().min(predicted.len());
    if n == 0 {
        return ClassificationScores::default();
    }

    let correct = truth
        .iter()
        .zip(predicted)
        .filter(|(t, p)| t == p)
        .count();
    let accuracy = correct as f64 / n as f64;

    match weighted_scores(&truth[..n], &predicted[..n]) {
        Some((precision, recall, f1)) => ClassificationScores {
            accuracy,
            precision,
            recall,
            f1,
        },
        None => ClassificationScores {
            accuracy,
            precision: accuracy,
            recall: accuracy,
            f1: accuracy,
        },
    }
}

fn weighted_scores<T: Ord + Copy>(truth: &[T], predicted: &[T]) -> Option<(f64, f64, f64)> {
    #[derive(Default)]
    struct Tally {
        tp: usize,
        fp: usize,
        fn_: usize,
    }

    let mut tallies: BTreeMap<T, Tally> = BTreeMap::new();
    for (&t, &p) in truth.iter().zip(predicted) {
        if t == p {
            tallies.entry(t).or_default().tp += 1;
        } else {
            tallies.entry(p).or_default().fp += 1;
            tallies.entry(t).or_default().fn_ += 1;
        }
    }

    let total_support: usize = tallies.values().map(|t| t.tp + t.fn_).sum();
    if total_support == 0 {
        return None;
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };

    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for t in tallies.values() {
        let support = (t.tp + t.fn_) as f64;
        let p = ratio(t.tp, t.tp + t.fp);
        let r = ratio(t.tp, t.tp + t.fn_);
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        precision += support * p;
        recall += support * r;
        f1 += support * f;
    }

    let total = total_support as f64;
    let scores = (precision / total, recall / total, f1 / total);
    if scores.0.is_finite() && scores.1.is_finite() && scores.2.is_finite() {
        Some(scores)
    } else {
        None
    }
}
