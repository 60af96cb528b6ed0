//! Token-overlap F1 between a prediction and a gold answer.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

const ARTICLES: [&str; 4] = ["a", "an", "the", "and"];

/// Normalize an answer for token comparison.
///
/// Commas are removed outright (so `1,000` stays one token), the text is
/// NFD-decomposed and lowercased, every character outside `[a-z0-9 ]`
/// becomes a space, and the words `a`, `an`, `the`, `and` are dropped.
/// Articles are dropped as whole tokens after punctuation is blanked so that
/// normalizing twice gives the same result as normalizing once. An article
/// glued to `_` or to a non-ASCII letter is therefore still dropped:
/// `the_x` becomes `x` and `ßthe` becomes empty, where a word-boundary match
/// on the raw text would keep `the`.
pub fn normalize_answer(text: &str) -> String {
    let decomposed: String = text.replace(',', "").nfd().collect();
    let blanked: String = decomposed
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                c
            } else {
                ' '
            }
        })
        .collect();

    blanked
        .split_whitespace()
        .filter(|token| !ARTICLES.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Token-overlap F1 in `[0, 1]`.
///
/// Computed over the sets of normalized tokens, so repeated words count once
/// and an answer always matches itself with `1.0`. When either side
/// normalizes to nothing, the score is `1.0` if both do and `0.0` otherwise.
pub fn token_f1(prediction: &str, gold: &str) -> f64 {
    let pred = normalize_answer(prediction);
    let gold = normalize_answer(gold);
    let pred_set: HashSet<&str> = pred.split_whitespace().collect();
    let gold_set: HashSet<&str> = gold.split_whitespace().collect();

    if pred_set.is_empty() || gold_set.is_empty() {
        return if pred_set.is_empty() && gold_set.is_empty() {
            1.0
        } else {
            0.0
        };
    }

    let common = pred_set.intersection(&gold_set).count();
    if common == 0 {
        return 0.0;
    }

    let precision = common as f64 / pred_set.len() as f64;
    let recall = common as f64 / gold_set.len() as f64;
    2.0 * precision * recall / (precision + recall)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_articles_glued_to_blanked_characters_are_dropped() {
        assert_eq!(normalize_answer("the_x"), "x");
        assert_eq!(normalize_answer("ßthe"), "");
        assert_eq!(normalize_answer(&normalize_answer("ßthe cat")), "cat");
    }

    #[test]
    fn test_normalize_strips_articles_and_punctuation() {
        assert_eq!(normalize_answer("The Database-Deadlock!"), "database deadlock");
        assert_eq!(normalize_answer("Salt and Pepper"), "salt pepper");
        assert_eq!(normalize_answer("1,000 requests"), "1000 requests");
        assert_eq!(normalize_answer("  many\n\tspaces  "), "many spaces");
    }

    #[test]
    fn test_normalize_decomposes_accents() {
        assert_eq!(normalize_answer("Café Résumé"), "cafe resume");
    }

    #[test]
    fn test_normalize_is_idempotent_for_underscore_articles() {
        let once = normalize_answer("the_x");
        assert_eq!(once, "x");
        assert_eq!(normalize_answer(&once), once);
    }

    #[test]
    fn test_f1_exact_match() {
        assert!(approx(token_f1("database deadlock", "Database deadlock."), 1.0));
    }

    #[test]
    fn test_f1_partial_overlap() {
        // P = 2/4, R = 2/2
        let f1 = token_f1("A database deadlock caused the outage", "database deadlock");
        assert!(approx(f1, 2.0 / 3.0));
    }

    #[test]
    fn test_f1_ignores_repeated_tokens() {
        assert!(approx(token_f1("x x x", "x"), 1.0));
        assert!(approx(token_f1("deadlock deadlock", "deadlock deadlock"), 1.0));
        // P = 1/2, R = 1/1
        assert!(approx(token_f1("x y x", "x"), 2.0 / 3.0));
    }

    #[test]
    fn test_f1_empty_rules() {
        assert!(approx(token_f1("", ""), 1.0));
        assert!(approx(token_f1("the", "a"), 1.0));
        assert!(approx(token_f1("", "deadlock"), 0.0));
        assert!(approx(token_f1("deadlock", "!!"), 0.0));
    }

    #[test]
    fn test_f1_no_overlap() {
        assert!(approx(token_f1("redis", "postgres"), 0.0));
    }
}
