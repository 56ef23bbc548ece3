//! Seeded train/test partitions and stratified folds.

use crate::error::{MlError, Result};
use ndarray::Array1;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// Row indices of one train/test partition, each sorted ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Ratios must lie strictly inside (0, 1).
pub fn validate_ratio(ratio: f64, what: &str) -> Result<()> {
    if ratio.is_finite() && ratio > 0.0 && ratio < 1.0 {
        Ok(())
    } else {
        Err(MlError::config(format!(
            "{what} must be in (0, 1), got {ratio}"
        )))
    }
}

/// `n_train = floor(ratio · n)`; the rest is held out.
pub fn split_by_train_ratio(
    y: &Array1<f64>,
    ratio: f64,
    stratify: bool,
    seed: u64,
) -> Result<Partition> {
    validate_ratio(ratio, "Train size")?;
    let n = y.len();
    let n_train = (ratio * n as f64).floor() as usize;
    partition(y, n.saturating_sub(n_train), stratify, seed)
}

/// `n_test = ceil(test_size · n)`; the rest is used for training.
pub fn split_by_test_size(
    y: &Array1<f64>,
    test_size: f64,
    stratify: bool,
    seed: u64,
) -> Result<Partition> {
    validate_ratio(test_size, "Test size")?;
    let n = y.len();
    let n_test = (test_size * n as f64).ceil() as usize;
    partition(y, n_test.min(n), stratify, seed)
}

fn partition(y: &Array1<f64>, n_test: usize, stratify: bool, seed: u64) -> Result<Partition> {
    let n = y.len();
    if n_test == 0 || n_test >= n {
        return Err(MlError::evaluation(format!(
            "With {n} samples a test set of {n_test} leaves an empty partition"
        )));
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);

    let (mut train, mut test) = if stratify {
        let classes = group_by_class(y);
        let sizes: Vec<usize> = classes.iter().map(Vec::len).collect();
        let quotas = allocate(&sizes, n_test);
        let mut train = Vec::with_capacity(n - n_test);
        let mut test = Vec::with_capacity(n_test);
        for (mut members, quota) in classes.into_iter().zip(quotas) {
            members.shuffle(&mut rng);
            test.extend_from_slice(&members[..quota]);
            train.extend_from_slice(&members[quota..]);
        }
        (train, test)
    } else {
        let mut rows: Vec<usize> = (0..n).collect();
        rows.shuffle(&mut rng);
        let train = rows.split_off(n_test);
        (train, rows)
    };

    train.sort_unstable();
    test.sort_unstable();
    Ok(Partition { train, test })
}

/// Row indices per distinct label, labels in ascending order.
fn group_by_class(y: &Array1<f64>) -> Vec<Vec<usize>> {
    let mut labels: Vec<f64> = y.to_vec();
    labels.sort_by(f64::total_cmp);
    labels.dedup();
    labels
        .iter()
        .map(|&label| (0..y.len()).filter(|&i| y[i] == label).collect())
        .collect()
}

/// Largest-remainder allocation of `total` across groups proportional to `sizes`.
fn allocate(sizes: &[usize], total: usize) -> Vec<usize> {
    let n: usize = sizes.iter().sum();
    if n == 0 {
        return vec![0; sizes.len()];
    }
    let exact: Vec<f64> = sizes
        .iter()
        .map(|&s| total as f64 * s as f64 / n as f64)
        .collect();
    let mut quotas: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();
    let mut remaining = total.saturating_sub(quotas.iter().sum());

    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| {
        let fa = exact[a] - exact[a].floor();
        let fb = exact[b] - exact[b].floor();
        fb.total_cmp(&fa).then(a.cmp(&b))
    });
    for &g in order.iter().cycle().take(order.len() * 2) {
        if remaining == 0 {
            break;
        }
        if quotas[g] < sizes[g] {
            quotas[g] += 1;
            remaining -= 1;
        }
    }
    quotas
}

/// `k` stratified folds: each class is shuffled and dealt round-robin.
pub fn stratified_kfold(y: &Array1<f64>, k: usize, seed: u64) -> Result<Vec<Partition>> {
    if k < 2 {
        return Err(MlError::config(format!("Need at least 2 folds, got {k}")));
    }
    let classes = group_by_class(y);
    if let Some(smallest) = classes.iter().map(Vec::len).min() {
        if smallest < k {
            return Err(MlError::config(format!(
                "Cannot build {k} stratified folds when a class has only {smallest} members"
            )));
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut assignment = vec![0usize; y.len()];
    let mut dealt = 0;
    for mut members in classes {
        members.shuffle(&mut rng);
        for row in members {
            assignment[row] = dealt % k;
            dealt += 1;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..y.len()).partition(|&row| assignment[row] == fold);
            Partition { train, test }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn labels(pos: usize, neg: usize) -> Array1<f64> {
        (0..pos + neg).map(|i| if i < pos { 1.0 } else { 0.0 }).collect()
    }

    #[test]
    fn test_train_ratio_sizes() {
        let y = labels(50, 50);
        let p = split_by_train_ratio(&y, 0.8, true, 42).unwrap();
        assert_eq!(p.train.len(), 80);
        assert_eq!(p.test.len(), 20);
    }

    #[test]
    fn test_test_size_rounds_up() {
        let y = labels(5, 6);
        let p = split_by_test_size(&y, 0.2, false, 42).unwrap();
        assert_eq!(p.test.len(), 3);
        assert_eq!(p.train.len(), 8);
    }

    #[test]
    fn test_stratified_preserves_balance() {
        let y = labels(30, 70);
        let p = split_by_train_ratio(&y, 0.6, true, 7).unwrap();
        let test_pos = p.test.iter().filter(|&&i| y[i] == 1.0).count();
        assert_eq!(p.test.len(), 40);
        assert_eq!(test_pos, 12);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let y = labels(13, 21);
        let p = split_by_train_ratio(&y, 0.7, true, 3).unwrap();
        let mut all: Vec<usize> = p.train.iter().chain(p.test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..34).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_partition() {
        let y = labels(20, 20);
        let a = split_by_train_ratio(&y, 0.7, true, 99).unwrap();
        let b = split_by_train_ratio(&y, 0.7, true, 99).unwrap();
        let c = split_by_train_ratio(&y, 0.7, true, 100).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_invalid_ratio_is_configuration_error() {
        let y = labels(5, 5);
        for ratio in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            let err = split_by_train_ratio(&y, ratio, true, 0).unwrap_err();
            assert_eq!(err.kind(), "configuration_error");
        }
    }

    #[test]
    fn test_empty_partition_is_evaluation_error() {
        let y = labels(1, 1);
        let err = split_by_train_ratio(&y, 0.3, false, 0).unwrap_err();
        assert_eq!(err.kind(), "evaluation_error");
    }

    #[test]
    fn test_largest_remainder_allocation() {
        assert_eq!(allocate(&[1, 1, 1], 2), vec![1, 1, 0]);
        assert_eq!(allocate(&[7, 3], 5), vec![4, 1]);
        assert_eq!(allocate(&[10, 10], 4), vec![2, 2]);
    }

    #[test]
    fn test_kfold_covers_each_row_once() {
        let y = labels(12, 18);
        let folds = stratified_kfold(&y, 5, 42).unwrap();
        assert_eq!(folds.len(), 5);
        let mut seen = vec![0; 30];
        for fold in &folds {
            assert_eq!(fold.test.len(), 6);
            assert_eq!(fold.train.len() + fold.test.len(), 30);
            let pos = fold.test.iter().filter(|&&i| y[i] == 1.0).count();
            assert!(pos >= 2);
            for &row in &fold.test {
                seen[row] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
    }

    #[test]
    fn test_kfold_rejects_small_class() {
        let y = labels(3, 20);
        assert_eq!(stratified_kfold(&y, 5, 0).unwrap_err().kind(), "configuration_error");
    }
}
