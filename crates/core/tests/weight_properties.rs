//! Property-based tests for score normalization

use compass_core::{cut_to_max_allowed_weights, normalize_scores, ScoreTable, ValidatorError};
use proptest::prelude::*;

/// Score tables with at least one positive score
fn positive_score_table() -> impl Strategy<Value = ScoreTable> {
    prop::collection::btree_map(any::<u16>(), 0.0f64..=1.0, 1..64)
        .prop_filter("needs a positive score", |table| {
            table.values().any(|score| *score > 0.0)
        })
}

proptest! {
    /// Property: weights never exceed the budget and never contain zeros
    #[test]
    fn prop_weights_bounded_and_nonzero(
        scores in positive_score_table(),
        max_entries in 1usize..80,
        budget in 1u16..=10_000,
    ) {
        let kept = cut_to_max_allowed_weights(&scores, max_entries);
        prop_assume!(kept.iter().any(|(_, score)| *score > 0.0));

        let weights = normalize_scores(&scores, max_entries, budget).unwrap();
        let sum: u64 = weights.values().map(|w| *w as u64).sum();

        prop_assert!(sum <= budget as u64);
        prop_assert!(weights.values().all(|w| *w > 0));
        prop_assert!(weights.len() <= max_entries);
    }

    /// Property: an all-zero table is a division error, never an empty success
    #[test]
    fn prop_zero_total_is_division_error(
        uids in prop::collection::btree_set(any::<u16>(), 0..32),
        max_entries in 0usize..40,
    ) {
        let scores: ScoreTable = uids.into_iter().map(|uid| (uid, 0.0)).collect();
        let result = normalize_scores(&scores, max_entries, 10_000);
        prop_assert!(matches!(result, Err(ValidatorError::DivisionByZero)));
    }

    /// Property: truncation keeps exactly min(max_entries, len) of the highest scores
    #[test]
    fn prop_truncation_keeps_top_entries(
        scores in prop::collection::btree_map(any::<u16>(), 0.0f64..=1.0, 0..64),
        max_entries in 0usize..80,
    ) {
        let kept = cut_to_max_allowed_weights(&scores, max_entries);
        prop_assert_eq!(kept.len(), max_entries.min(scores.len()));

        if let Some(lowest_kept) = kept.last().map(|(_, s)| *s) {
            let dropped = scores
                .iter()
                .filter(|(uid, _)| !kept.iter().any(|(k, _)| k == *uid));
            for (_, score) in dropped {
                prop_assert!(*score <= lowest_kept);
            }
        }
    }

    /// Property: equal scores keep ascending uid order after truncation
    #[test]
    fn prop_ties_are_stable(
        uids in prop::collection::btree_set(any::<u16>(), 1..32),
        max_entries in 1usize..40,
    ) {
        let scores: ScoreTable = uids.iter().map(|uid| (*uid, 0.5)).collect();
        let kept: Vec<u16> = cut_to_max_allowed_weights(&scores, max_entries)
            .into_iter()
            .map(|(uid, _)| uid)
            .collect();
        let expected: Vec<u16> = uids.into_iter().take(max_entries).collect();
        prop_assert_eq!(kept, expected);
    }
}
