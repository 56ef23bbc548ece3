//! Property-based tests for splitting, metrics and calibration using proptest.

use ndarray::Array1;
use proptest::prelude::*;

use riskscope_ml::bundle::FeatureSpec;
use riskscope_ml::calibration::{IsotonicCalibrator, PlattScaler};
use riskscope_ml::data::{TargetEncoding, binarize_if_needed};
use riskscope_ml::eval::{mean_present, roc_auc, split_by_test_size, stratified_kfold};

/// Labels with at least one member of each class.
fn both_classes(bits: Vec<bool>) -> Array1<f64> {
    let mut y: Vec<f64> = bits.into_iter().map(|b| if b { 1.0 } else { 0.0 }).collect();
    y[0] = 0.0;
    y[1] = 1.0;
    Array1::from(y)
}

// --- Partition properties ---

proptest! {
    #[test]
    fn split_partitions_every_row_once(
        bits in prop::collection::vec(any::<bool>(), 10..80),
        test_size in 0.1f64..0.5,
        stratify in any::<bool>(),
        seed in any::<u64>(),
    ) {
        let y = both_classes(bits);
        let n = y.len();
        let p = split_by_test_size(&y, test_size, stratify, seed).unwrap();

        prop_assert_eq!(p.test.len(), (test_size * n as f64).ceil() as usize);
        let mut all: Vec<usize> = p.train.iter().chain(p.test.iter()).copied().collect();
        all.sort_unstable();
        prop_assert_eq!(all, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn split_is_deterministic_for_a_seed(
        bits in prop::collection::vec(any::<bool>(), 10..60),
        seed in any::<u64>(),
    ) {
        let y = both_classes(bits);
        let a = split_by_test_size(&y, 0.25, true, seed).unwrap();
        let b = split_by_test_size(&y, 0.25, true, seed).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn stratified_folds_cover_rows_once(
        pos in 5usize..30,
        neg in 5usize..30,
        k in 2usize..6,
        seed in any::<u64>(),
    ) {
        let y: Array1<f64> = (0..pos + neg).map(|i| if i < pos { 1.0 } else { 0.0 }).collect();
        let folds = stratified_kfold(&y, k, seed).unwrap();
        prop_assert_eq!(folds.len(), k);

        let mut seen = vec![0usize; y.len()];
        for fold in &folds {
            prop_assert_eq!(fold.train.len() + fold.test.len(), y.len());
            for &row in &fold.test {
                seen[row] += 1;
            }
            let fold_pos = fold.test.iter().filter(|&&r| y[r] == 1.0).count();
            prop_assert!(fold_pos >= pos / k && fold_pos <= pos / k + 1);
        }
        prop_assert!(seen.iter().all(|&c| c == 1));
    }
}

// --- Metric properties ---

proptest! {
    #[test]
    fn auc_is_bounded_when_both_classes_present(
        bits in prop::collection::vec(any::<bool>(), 2..60),
        scores in prop::collection::vec(-10.0f64..10.0, 60),
    ) {
        let y = both_classes(bits).to_vec();
        let auc = roc_auc(&y, &scores[..y.len()]).unwrap();
        prop_assert!((0.0..=1.0).contains(&auc));
    }

    #[test]
    fn auc_is_none_for_one_class(
        n in 1usize..40,
        label in prop::sample::select(vec![0.0f64, 1.0]),
    ) {
        let y = vec![label; n];
        let scores: Vec<f64> = (0..n).map(|i| i as f64).collect();
        prop_assert_eq!(roc_auc(&y, &scores), None);
    }

    #[test]
    fn mean_present_lies_between_extremes(
        values in prop::collection::vec(prop::option::of(-100.0f64..100.0), 0..30),
    ) {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        match mean_present(values) {
            None => prop_assert!(present.is_empty()),
            Some(mean) => {
                let lo = present.iter().copied().fold(f64::INFINITY, f64::min);
                let hi = present.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                prop_assert!(mean >= lo - 1e-9 && mean <= hi + 1e-9);
            }
        }
    }
}

// --- Target and calibration properties ---

proptest! {
    #[test]
    fn binarized_labels_are_zero_or_one(
        raw in prop::collection::vec(-50.0f64..50.0, 1..60),
    ) {
        let target = binarize_if_needed(&raw).unwrap();
        prop_assert!(target.y.iter().all(|&v| v == 0.0 || v == 1.0));
        if let TargetEncoding::BinarizedAtMedian { threshold } = target.encoding {
            let ones = target.y.iter().filter(|&&v| v == 1.0).count();
            prop_assert!(2 * ones >= raw.len());
            prop_assert!(target.encoding.note().starts_with("binarized_at_median_"));
            prop_assert!(raw.iter().zip(target.y.iter()).all(|(&r, &l)| (r >= threshold) == (l == 1.0)));
        }
    }

    #[test]
    fn isotonic_transform_is_monotone(
        bits in prop::collection::vec(any::<bool>(), 4..50),
        scores in prop::collection::vec(-5.0f64..5.0, 50),
        mut queries in prop::collection::vec(-8.0f64..8.0, 2..20),
    ) {
        let y = both_classes(bits);
        let s = Array1::from(scores[..y.len()].to_vec());
        let iso = IsotonicCalibrator::fit(&s, &y).unwrap();

        queries.sort_by(f64::total_cmp);
        let out: Vec<f64> = queries.iter().map(|&q| iso.transform(q)).collect();
        prop_assert!(out.windows(2).all(|w| w[0] <= w[1] + 1e-12));
        prop_assert!(out.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn platt_transform_is_monotone(
        bits in prop::collection::vec(any::<bool>(), 4..50),
        scores in prop::collection::vec(-5.0f64..5.0, 50),
        lo in -8.0f64..0.0,
        hi in 0.0f64..8.0,
    ) {
        let y = both_classes(bits);
        let s = Array1::from(scores[..y.len()].to_vec());
        let platt = PlattScaler::fit(&s, &y).unwrap();
        let (a, _) = platt.parameters();

        let (p_lo, p_hi) = (platt.transform(lo), platt.transform(hi));
        prop_assert!((0.0..=1.0).contains(&p_lo) && (0.0..=1.0).contains(&p_hi));
        if a >= 0.0 {
            prop_assert!(p_lo <= p_hi);
        } else {
            prop_assert!(p_lo >= p_hi);
        }
    }
}

// --- Feature spec properties ---

proptest! {
    #[test]
    fn feature_spec_rejects_duplicates(
        names in prop::collection::hash_set("[a-z]{1,8}", 1..10),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut names: Vec<String> = names.into_iter().collect();
        let dup = names[pick.index(names.len())].clone();
        prop_assert!(FeatureSpec::new(names.clone()).is_ok());
        names.push(dup);
        prop_assert!(FeatureSpec::new(names).is_err());
    }
}
