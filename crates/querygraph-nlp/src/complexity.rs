// ABOUTME: Scores how hard a natural-language question is to translate
// ABOUTME: Pure function over the query text; feeds strategy selection

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Vocabulary that signals relationships, aggregation or comparison
const COMPLEXITY_INDICATORS: &[&str] = &[
    "relationship",
    "related",
    "connect",
    "between",
    "path",
    "compare",
    "versus",
    "difference",
    "similar",
    "average",
    "count",
    "total",
    "sum",
    "most",
    "least",
    "each",
    "every",
    "group",
    "both",
    "either",
    "more",
    "fewer",
];

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "without", "except", "none", "neither", "nor", "excluding",
];

const INDICATOR_INCREMENT: f32 = 0.1;
const LENGTH_INCREMENT: f32 = 0.1;
const PROPER_NOUN_INCREMENT: f32 = 0.1;
const NEGATION_INCREMENT: f32 = 0.15;

/// Token counts above which the query is considered long / very long
const LONG_QUERY_TOKENS: usize = 8;
const VERY_LONG_QUERY_TOKENS: usize = 15;
const PROPER_NOUN_THRESHOLD: usize = 2;

lazy_static! {
    static ref CAPITALIZED_SEQUENCE: Regex =
        Regex::new(r"\b\p{Lu}\p{Ll}+(?:\s+\p{Lu}\p{Ll}+)*\b").unwrap();
}

/// Complexity of a single incoming query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityScore {
    pub score: f32,
    pub indicators: BTreeSet<String>,
    pub token_count: usize,
    pub has_negation: bool,
}

/// Stateless complexity scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct ComplexityAnalyzer;

impl ComplexityAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, query: &str) -> ComplexityScore {
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();

        let mut score = 0.0f32;
        let mut indicators = BTreeSet::new();

        for token in &tokens {
            for indicator in COMPLEXITY_INDICATORS {
                if token.contains(indicator) {
                    score += INDICATOR_INCREMENT;
                    indicators.insert(indicator.to_string());
                }
            }
        }

        if tokens.len() > LONG_QUERY_TOKENS {
            score += LENGTH_INCREMENT;
        }
        if tokens.len() > VERY_LONG_QUERY_TOKENS {
            score += LENGTH_INCREMENT;
        }

        if CAPITALIZED_SEQUENCE.find_iter(query).count() > PROPER_NOUN_THRESHOLD {
            score += PROPER_NOUN_INCREMENT;
        }

        let has_negation = tokens.iter().any(|token| is_negation(token));
        if has_negation {
            score += NEGATION_INCREMENT;
        }

        ComplexityScore {
            score: score.clamp(0.0, 1.0),
            indicators,
            token_count: tokens.len(),
            has_negation,
        }
    }
}

fn is_negation(token: &str) -> bool {
    let word = token.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'');
    word.ends_with("n't") || NEGATION_WORDS.contains(&word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_simple_query_scores_zero() {
        let score = ComplexityAnalyzer::new().analyze("ingredients for Flammkuchen");
        assert_relative_eq!(score.score, 0.0);
        assert_eq!(score.token_count, 3);
        assert!(score.indicators.is_empty());
        assert!(!score.has_negation);
    }

    #[test]
    fn test_indicators_accumulate() {
        let score = ComplexityAnalyzer::new()
            .analyze("compare the average cooking time between recipes");
        assert_relative_eq!(score.score, 0.3, epsilon = 1e-6);
        let names: Vec<&str> = score.indicators.iter().map(String::as_str).collect();
        assert_eq!(names, vec!["average", "between", "compare"]);
    }

    #[test]
    fn test_length_proper_nouns_and_negation() {
        let analyzer = ComplexityAnalyzer::new();

        let long = analyzer.analyze("a b c d e f g h i");
        assert_relative_eq!(long.score, 0.1, epsilon = 1e-6);

        let very_long = analyzer.analyze(&"word ".repeat(16));
        assert_relative_eq!(very_long.score, 0.2, epsilon = 1e-6);

        let nouns = analyzer.analyze("Flammkuchen and Quiche and Pizza");
        assert_relative_eq!(nouns.score, 0.1, epsilon = 1e-6);

        let negated = analyzer.analyze("recipes that don't use flour");
        assert!(negated.has_negation);
        assert_relative_eq!(negated.score, 0.15, epsilon = 1e-6);
    }

    #[test]
    fn test_score_is_clamped() {
        let query = "compare count total average sum most least between each every group \
                     relationship path similar without";
        let score = ComplexityAnalyzer::new().analyze(query);
        assert_relative_eq!(score.score, 1.0);
    }

    proptest! {
        #[test]
        fn prop_score_is_within_unit_interval(query in ".{0,200}") {
            let score = ComplexityAnalyzer::new().analyze(&query);
            prop_assert!((0.0..=1.0).contains(&score.score));
        }
    }
}
