//! Classification metrics.

use std::cmp::Ordering;

/// Fraction of matching labels; `None` for empty input.
pub fn accuracy(y_true: &[f64], y_pred: &[f64]) -> Option<f64> {
    if y_true.is_empty() || y_true.len() != y_pred.len() {
        return None;
    }
    let hits = y_true.iter().zip(y_pred).filter(|(a, b)| a == b).count();
    Some(hits as f64 / y_true.len() as f64)
}

/// ROC AUC via the Mann–Whitney statistic with average ranks for ties.
///
/// `None` unless both classes are present.
pub fn roc_auc(y_true: &[f64], scores: &[f64]) -> Option<f64> {
    if y_true.len() != scores.len() || scores.iter().any(|s| s.is_nan()) {
        return None;
    }
    let n_pos = y_true.iter().filter(|&&y| y == 1.0).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].partial_cmp(&scores[b]).unwrap_or(Ordering::Equal));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; tied block i..=j shares the mean rank.
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = rank;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = (0..y_true.len())
        .filter(|&k| y_true[k] == 1.0)
        .map(|k| ranks[k])
        .sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// F1 score of the positive class; `None` unless both classes are present.
pub fn f1_score(y_true: &[f64], y_pred: &[f64]) -> Option<f64> {
    if y_true.len() != y_pred.len() {
        return None;
    }
    let positives = y_true.iter().filter(|&&y| y == 1.0).count();
    if positives == 0 || positives == y_true.len() {
        return None;
    }
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut fn_ = 0.0;
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t == 1.0, p == 1.0) {
            (true, true) => tp += 1.0,
            (false, true) => fp += 1.0,
            (true, false) => fn_ += 1.0,
            (false, false) => {}
        }
    }
    let denom = 2.0 * tp + fp + fn_;
    Some(if denom == 0.0 { 0.0 } else { 2.0 * tp / denom })
}

/// Mean of the present values; `None` when nothing is present.
pub fn mean_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[1.0, 0.0, 1.0, 1.0], &[1.0, 0.0, 0.0, 1.0]), Some(0.75));
        assert_eq!(accuracy(&[], &[]), None);
    }

    #[test]
    fn test_auc_perfect_and_inverted() {
        let y = [0.0, 0.0, 1.0, 1.0];
        assert_eq!(roc_auc(&y, &[0.1, 0.2, 0.8, 0.9]), Some(1.0));
        assert_eq!(roc_auc(&y, &[0.9, 0.8, 0.2, 0.1]), Some(0.0));
    }

    #[test]
    fn test_auc_with_ties() {
        let y = [0.0, 1.0, 0.0, 1.0];
        assert_eq!(roc_auc(&y, &[0.5, 0.5, 0.5, 0.5]), Some(0.5));
        // Three concordant pairs and one tie out of four.
        let auc = roc_auc(&[0.0, 0.0, 1.0, 1.0], &[0.1, 0.4, 0.4, 0.8]).unwrap();
        assert!((auc - 0.875).abs() < 1e-12);
    }

    #[test]
    fn test_auc_single_class_is_none() {
        assert_eq!(roc_auc(&[1.0, 1.0, 1.0], &[0.2, 0.5, 0.9]), None);
        assert_eq!(roc_auc(&[0.0, 0.0], &[0.2, 0.5]), None);
    }

    #[test]
    fn test_f1() {
        let f1 = f1_score(&[1.0, 1.0, 0.0, 0.0], &[1.0, 0.0, 1.0, 0.0]).unwrap();
        assert!((f1 - 0.5).abs() < 1e-12);
        assert_eq!(f1_score(&[0.0, 0.0], &[1.0, 0.0]), None);
    }

    #[test]
    fn test_mean_present_skips_nulls() {
        assert_eq!(mean_present([Some(0.5), None, Some(1.0)]), Some(0.75));
        assert_eq!(mean_present([None, None]), None);
        assert_eq!(mean_present(Vec::new()), None);
    }
}
