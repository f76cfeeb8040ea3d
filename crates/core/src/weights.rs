//! Score to weight conversion
//!
//! Scores in `[0, 1]` are cut to the best `max_entries` workers and scaled so the
//! submitted integer weights sum to at most the weight budget.

use crate::{Result, ScoreTable, ValidatorError, WeightTable, WorkerId};

/// Keep the `max_entries` highest scores. Ties keep their table order.
pub fn cut_to_max_allowed_weights(scores: &ScoreTable, max_entries: usize) -> Vec<(WorkerId, f64)> {
    let mut sorted: Vec<(WorkerId, f64)> = scores.iter().map(|(uid, s)| (*uid, *s)).collect();
    // sort_by is stable
    sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
    sorted.truncate(max_entries);
    sorted
}

/// Convert a score table into integer weights
///
/// Fails with [`ValidatorError::DivisionByZero`] when the retained scores sum to zero,
/// which includes an empty table. Entries that round down to zero are dropped, so the
/// result may be empty even on success.
pub fn normalize_scores(
    scores: &ScoreTable,
    max_entries: usize,
    budget: u16,
) -> Result<WeightTable> {
    let kept = cut_to_max_allowed_weights(scores, max_entries);
    let total: f64 = kept.iter().map(|(_, score)| score).sum();

    if total == 0.0 {
        return Err(ValidatorError::DivisionByZero);
    }

    let weights = kept
        .into_iter()
        .map(|(uid, score)| (uid, (score / total * budget as f64).floor() as u16))
        .filter(|(_, weight)| *weight != 0)
        .collect();

    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(entries: &[(WorkerId, f64)]) -> ScoreTable {
        entries.iter().copied().collect()
    }

    #[test]
    fn test_equal_scores_split_budget() {
        let weights = normalize_scores(&table(&[(1, 0.5), (2, 0.5)]), 400, 100).unwrap();
        assert_eq!(weights, table_u16(&[(1, 50), (2, 50)]));
    }

    #[test]
    fn test_tiny_weight_is_dropped() {
        let weights = normalize_scores(&table(&[(1, 0.001), (2, 0.999)]), 400, 100).unwrap();
        assert_eq!(weights, table_u16(&[(2, 99)]));
    }

    #[test]
    fn test_zero_total_fails() {
        let result = normalize_scores(&table(&[(1, 0.0), (2, 0.0)]), 400, 10_000);
        assert!(matches!(result, Err(ValidatorError::DivisionByZero)));
    }

    #[test]
    fn test_empty_table_fails() {
        let result = normalize_scores(&ScoreTable::new(), 400, 10_000);
        assert!(matches!(result, Err(ValidatorError::DivisionByZero)));
    }

    #[test]
    fn test_zero_max_entries_fails() {
        let result = normalize_scores(&table(&[(1, 1.0)]), 0, 10_000);
        assert!(matches!(result, Err(ValidatorError::DivisionByZero)));
    }

    #[test]
    fn test_truncation_keeps_highest_scores() {
        let scores = table(&[(1, 0.1), (2, 0.9), (3, 0.5), (4, 0.7)]);
        let kept = cut_to_max_allowed_weights(&scores, 2);
        assert_eq!(kept, vec![(2, 0.9), (4, 0.7)]);

        let weights = normalize_scores(&scores, 2, 10_000).unwrap();
        assert_eq!(weights.len(), 2);
        assert!(weights.contains_key(&2) && weights.contains_key(&4));
    }

    #[test]
    fn test_truncation_is_stable_on_ties() {
        let scores = table(&[(5, 1.0), (3, 1.0), (9, 1.0), (1, 0.2)]);
        let kept = cut_to_max_allowed_weights(&scores, 2);
        assert_eq!(kept, vec![(3, 1.0), (5, 1.0)]);
    }

    #[test]
    fn test_fewer_entries_than_limit_is_noop() {
        let scores = table(&[(1, 0.3), (2, 0.6)]);
        assert_eq!(cut_to_max_allowed_weights(&scores, 400).len(), 2);
    }

    fn table_u16(entries: &[(WorkerId, u16)]) -> WeightTable {
        entries.iter().copied().collect()
    }
}
