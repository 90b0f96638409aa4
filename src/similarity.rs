//! Token-order-insensitive string similarity.
//!
//! The single scoring primitive shared by the attribution cascade and the
//! uniqueness classifier. Scores are relative rankings, not calibrated
//! probabilities: callers rely only on identical strings scoring 100, scores
//! decreasing with edit distance, and determinism.

use itertools::Itertools;
use strsim::levenshtein;

/// Scores two strings in `[0, 100]`, ignoring word order.
///
/// Both inputs are lower-cased, split on whitespace, token-sorted and
/// rejoined with single spaces before comparison. The rejoined strings are
/// compared with Levenshtein distance normalized against their combined
/// length, the usual token-sort ratio normalization.
///
/// Two empty strings score 100 (they are identical).
#[must_use]
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    let a = sort_tokens(a);
    let b = sort_tokens(b);
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return 100.0;
    }
    let distance = levenshtein(&a, &b);
    100.0 * (total - distance) as f64 / total as f64
}

/// Lower-cases, tokenizes and lexicographically re-sorts a string.
fn sort_tokens(s: &str) -> String {
    s.to_lowercase().split_whitespace().sorted().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[test]
    fn identical_strings_score_100() {
        assert_eq!(token_sort_ratio("Economic Analysis", "Economic Analysis"), 100.0);
        assert_eq!(token_sort_ratio("", ""), 100.0);
    }

    #[test]
    fn insensitive_to_token_order_and_case() {
        let forward = token_sort_ratio("Smith, John", "John Smith,");
        assert_eq!(forward, 100.0);
        assert_eq!(token_sort_ratio("ALPHA beta", "beta alpha"), 100.0);
    }

    #[test]
    fn symmetric_in_arguments() {
        let ab = token_sort_ratio("labor market dynamics", "labor supply effects");
        let ba = token_sort_ratio("labor supply effects", "labor market dynamics");
        assert_eq!(ab, ba);
    }

    #[test]
    fn decreases_with_edit_distance() {
        let close = token_sort_ratio("economic impact study", "economic impacts study");
        let far = token_sort_ratio("economic impact study", "minimum wage effects");
        assert!(close > far);
        assert!(far < 80.0);
    }

    #[rstest]
    #[case("Economic Impact of Trade Policies", "Economic Impacts of International Trade Policies")]
    #[case("A paper is important", "Paper is important")]
    fn near_matches_clear_the_default_threshold(#[case] a: &str, #[case] b: &str) {
        assert!(token_sort_ratio(a, b) > 80.0);
    }

    #[test]
    fn exact_ratio_is_reachable() {
        // 12 vs 8 identical chars: distance 4 over combined length 20.
        assert_eq!(token_sort_ratio("aaaaaaaaaaaa", "aaaaaaaa"), 80.0);
    }

    #[test]
    fn deterministic_across_runs() {
        let first = token_sort_ratio("Analysis of Labor Market Dynamics", "Labor Market Analysis");
        for _ in 0..10 {
            assert_eq!(
                token_sort_ratio("Analysis of Labor Market Dynamics", "Labor Market Analysis"),
                first
            );
        }
    }
}
