// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pattern Matcher
//!
//! Scores how well a stored correction pattern matches a fact:
//!
//! - fact-type mismatch scores 0.0, always;
//! - exact substring containment (either direction) scores 1.0;
//! - otherwise the score is max(token Jaccard, character ratio) plus a 0.10
//!   context-overlap bonus, capped at 1.0.

use std::collections::HashSet;
use thiserror::Error;

use crate::domain::fact::ClinicalFact;
use crate::domain::feedback::LearningPattern;

#[derive(Debug, Error)]
pub enum PatternValidationError {
    #[error("Original extraction cannot be empty")]
    EmptyOriginal,

    #[error("Correction cannot be empty")]
    EmptyCorrection,

    #[error("Original and correction are identical")]
    IdenticalCorrection,
}

pub struct PatternMatcher {
    /// Surrounding-context overlap required for the bonus.
    context_overlap_floor: f64,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternMatcher {
    /// Bonus added when the pattern's stored context matches the fact's.
    const CONTEXT_BONUS: f64 = 0.10;

    pub fn new() -> Self {
        Self {
            context_overlap_floor: 0.5,
        }
    }

    /// Validates a correction before it is stored as a pattern.
    pub fn validate_pattern(
        &self,
        original: &str,
        correction: &str,
    ) -> Result<(), PatternValidationError> {
        if original.trim().is_empty() {
            return Err(PatternValidationError::EmptyOriginal);
        }
        if correction.trim().is_empty() {
            return Err(PatternValidationError::EmptyCorrection);
        }
        if original.trim().eq_ignore_ascii_case(correction.trim()) {
            return Err(PatternValidationError::IdenticalCorrection);
        }
        Ok(())
    }

    /// Match confidence between a fact and a pattern, in `[0.0, 1.0]`.
    pub fn match_confidence(&self, fact: &ClinicalFact, pattern: &LearningPattern) -> f64 {
        if fact.fact_type != pattern.fact_type {
            return 0.0;
        }

        let fact_text = fact.text.to_lowercase();
        let pattern_text = pattern.original_extraction.to_lowercase();

        if fact_text.contains(&pattern_text) || pattern_text.contains(&fact_text) {
            return 1.0;
        }

        let token_score = self.token_jaccard(&fact_text, &pattern_text);
        let fuzzy_score = strsim::normalized_levenshtein(&fact_text, &pattern_text);
        let base = token_score.max(fuzzy_score);

        let bonus = if self.context_matches(fact, pattern) {
            Self::CONTEXT_BONUS
        } else {
            0.0
        };

        (base + bonus).min(1.0)
    }

    /// Best-scoring pattern above `min_confidence`, if any.
    pub fn find_best_match<'a>(
        &self,
        fact: &ClinicalFact,
        patterns: &'a [LearningPattern],
        min_confidence: f64,
    ) -> Option<(&'a LearningPattern, f64)> {
        patterns
            .iter()
            .map(|pattern| (pattern, self.match_confidence(fact, pattern)))
            .filter(|(_, confidence)| *confidence >= min_confidence)
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }

    fn token_jaccard(&self, a: &str, b: &str) -> f64 {
        let tokens_a: HashSet<&str> = tokenize(a).collect();
        let tokens_b: HashSet<&str> = tokenize(b).collect();

        if tokens_a.is_empty() || tokens_b.is_empty() {
            return 0.0;
        }

        let intersection = tokens_a.intersection(&tokens_b).count();
        let union = tokens_a.union(&tokens_b).count();
        intersection as f64 / union as f64
    }

    /// Context beyond the text itself: matching source-document name, or
    /// overlapping surrounding text.
    fn context_matches(&self, fact: &ClinicalFact, pattern: &LearningPattern) -> bool {
        if let Some(source) = &pattern.source_doc {
            if !source.is_empty()
                && fact
                    .source_doc
                    .to_lowercase()
                    .contains(&source.to_lowercase())
            {
                return true;
            }
        }

        if let (Some(fact_ctx), Some(pattern_ctx)) = (
            fact.temporal.as_ref().map(|t| t.surrounding.as_str()),
            pattern.surrounding_context.as_deref(),
        ) {
            if self.token_jaccard(&fact_ctx.to_lowercase(), &pattern_ctx.to_lowercase())
                > self.context_overlap_floor
            {
                return true;
            }
        }

        false
    }
}

/// Word tokens: alphanumeric runs, punctuation stripped.
fn tokenize(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fact::{ClinicalFact, FactType};
    use chrono::{TimeZone, Utc};

    fn fact(text: &str, fact_type: FactType) -> ClinicalFact {
        ClinicalFact::new(
            text,
            "doc",
            1,
            Utc.with_ymd_and_hms(2024, 11, 1, 8, 0, 0).unwrap(),
            0.85,
            fact_type,
        )
        .unwrap()
    }

    fn pattern(original: &str, fact_type: FactType) -> LearningPattern {
        LearningPattern::new("unc_001", fact_type, original, "corrected text")
    }

    #[test]
    fn test_exact_substring_match_is_certain() {
        let matcher = PatternMatcher::new();
        let fact = fact("Medication: nimodipine 60mg", FactType::Medication);
        let pattern = pattern("nimodipine", FactType::Medication);

        assert_eq!(matcher.match_confidence(&fact, &pattern), 1.0);
    }

    #[test]
    fn test_type_mismatch_scores_zero() {
        let matcher = PatternMatcher::new();
        let fact = fact("NIHSS: 8", FactType::ClinicalScore);
        let pattern = pattern("NIHSS: 8", FactType::Medication);

        assert_eq!(matcher.match_confidence(&fact, &pattern), 0.0);
    }

    #[test]
    fn test_token_overlap_scores_high() {
        let matcher = PatternMatcher::new();
        let fact = fact("Started nimodipine sixty milligrams", FactType::Medication);
        let pattern = pattern("nimodipine sixty mg", FactType::Medication);

        assert!(matcher.match_confidence(&fact, &pattern) >= 0.40);
    }

    #[test]
    fn test_unrelated_text_scores_low() {
        let matcher = PatternMatcher::new();
        let fact = fact("Lab: Sodium = 140 mmol/L", FactType::LabValue);
        let pattern = pattern("craniotomy revision planned", FactType::LabValue);

        assert!(matcher.match_confidence(&fact, &pattern) < 0.70);
    }

    #[test]
    fn test_validate_pattern_rules() {
        let matcher = PatternMatcher::new();

        assert!(matches!(
            matcher.validate_pattern("", "corrected"),
            Err(PatternValidationError::EmptyOriginal)
        ));
        assert!(matches!(
            matcher.validate_pattern("original", "  "),
            Err(PatternValidationError::EmptyCorrection)
        ));
        assert!(matches!(
            matcher.validate_pattern("same text", "Same Text"),
            Err(PatternValidationError::IdenticalCorrection)
        ));
        assert!(matcher
            .validate_pattern("POD#3", "post-operative day 3")
            .is_ok());
    }

    #[test]
    fn test_find_best_match_prefers_highest_score() {
        let matcher = PatternMatcher::new();
        let fact = fact("Medication: nimodipine 60mg q4h", FactType::Medication);
        let patterns = vec![
            pattern("levetiracetam", FactType::Medication),
            pattern("nimodipine 60mg", FactType::Medication),
        ];

        let (best, confidence) = matcher.find_best_match(&fact, &patterns, 0.70).unwrap();
        assert_eq!(best.original_extraction, "nimodipine 60mg");
        assert_eq!(confidence, 1.0);
    }
}
