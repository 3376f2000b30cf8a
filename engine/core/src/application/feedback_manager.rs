// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Feedback Manager
//!
//! Governs the learning loop over an injected [`PatternRepository`]:
//!
//! 1. A physician resolves an uncertainty and submits a correction.
//! 2. The correction is stored as a PENDING pattern.
//! 3. A human reviewer approves or rejects it — the only writes to the
//!    approval state; the core never self-approves.
//! 4. Only approved patterns with a success rate at or above the threshold
//!    are applied to future extractions.
//!
//! Applying an unapproved or sub-threshold pattern is a silent no-op by
//! contract; that is the subsystem's core safety property.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::fact::{ClinicalFact, FactType};
use crate::domain::feedback::{ApprovalError, LearningPattern, PatternId};
use crate::domain::repository::{PatternRepository, RepositoryError};

use super::pattern_matcher::{PatternMatcher, PatternValidationError};

#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    #[error(transparent)]
    Validation(#[from] PatternValidationError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error("Pattern not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// A physician correction arriving from the uncertainty-resolution surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackSubmission {
    pub uncertainty_id: String,
    pub fact_type: FactType,
    pub original_extraction: String,
    pub correction: String,
    #[serde(default)]
    pub source_doc: Option<String>,
    #[serde(default)]
    pub surrounding_context: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

/// Aggregate statistics over the pattern store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStatistics {
    pub total_patterns: usize,
    pub approved_count: usize,
    pub pending_count: usize,
    pub rejected_count: usize,
    pub approval_rate: f64,
    pub average_success_rate: f64,
    pub total_applications: u64,
}

pub struct FeedbackManager {
    repository: Arc<dyn PatternRepository>,
    matcher: PatternMatcher,
    /// Patterns below this success rate are never applied.
    success_threshold: f64,
    /// Minimum match confidence required to apply a pattern to a fact.
    min_match_confidence: f64,
}

impl FeedbackManager {
    pub const DEFAULT_SUCCESS_THRESHOLD: f64 = 0.70;
    pub const DEFAULT_MIN_MATCH_CONFIDENCE: f64 = 0.70;

    pub fn new(repository: Arc<dyn PatternRepository>) -> Self {
        Self {
            repository,
            matcher: PatternMatcher::new(),
            success_threshold: Self::DEFAULT_SUCCESS_THRESHOLD,
            min_match_confidence: Self::DEFAULT_MIN_MATCH_CONFIDENCE,
        }
    }

    pub fn with_thresholds(mut self, success_threshold: f64, min_match_confidence: f64) -> Self {
        self.success_threshold = success_threshold;
        self.min_match_confidence = min_match_confidence;
        self
    }

    // ── Submission ───────────────────────────────────────────────────────────

    /// Stores a correction as a PENDING pattern. Resubmitting an identical
    /// (type, original, correction) triple dedupes to the existing pattern
    /// and refreshes its context without touching the approval state.
    pub async fn add_feedback(
        &self,
        submission: FeedbackSubmission,
    ) -> Result<PatternId, FeedbackError> {
        self.matcher
            .validate_pattern(&submission.original_extraction, &submission.correction)?;

        let id = PatternId::derive(
            submission.fact_type,
            &submission.original_extraction,
            &submission.correction,
        );

        if let Some(mut existing) = self.repository.get(&id).await? {
            tracing::warn!(pattern = %id.short(), "pattern already exists - updating context");
            if submission.source_doc.is_some() {
                existing.source_doc = submission.source_doc;
            }
            if submission.surrounding_context.is_some() {
                existing.surrounding_context = submission.surrounding_context;
            }
            self.repository.put(&existing).await?;
            return Ok(id);
        }

        let mut pattern = LearningPattern::new(
            submission.uncertainty_id,
            submission.fact_type,
            submission.original_extraction,
            submission.correction,
        );
        pattern.source_doc = submission.source_doc;
        pattern.surrounding_context = submission.surrounding_context;
        pattern.created_by = submission.created_by;

        tracing::info!(
            pattern = %pattern.id.short(),
            original = %pattern.original_extraction,
            correction = %pattern.correction,
            "added PENDING learning pattern (requires approval before application)"
        );

        self.repository.put(&pattern).await?;
        Ok(pattern.id)
    }

    // ── Governance (human-actor driven) ──────────────────────────────────────

    /// Approves a pattern for automatic application. The critical safety
    /// gate: only approved patterns are ever applied.
    pub async fn approve(&self, id: &PatternId, actor: &str) -> Result<(), FeedbackError> {
        let mut pattern = self.require(id).await?;
        pattern.approve(actor)?;
        self.repository.put(&pattern).await?;
        tracing::info!(pattern = %id.short(), approved_by = actor, "pattern approved");
        Ok(())
    }

    pub async fn reject(
        &self,
        id: &PatternId,
        actor: &str,
        reason: Option<String>,
    ) -> Result<(), FeedbackError> {
        let mut pattern = self.require(id).await?;
        pattern.reject(actor, reason)?;
        self.repository.put(&pattern).await?;
        tracing::info!(pattern = %id.short(), rejected_by = actor, "pattern rejected");
        Ok(())
    }

    // ── Application ──────────────────────────────────────────────────────────

    /// Applies approved, high-performing corrections to the facts. Each fact
    /// takes at most the single best-matching applicable pattern; everything
    /// else passes through untouched.
    pub async fn apply_corrections(
        &self,
        mut facts: Vec<ClinicalFact>,
    ) -> Result<Vec<ClinicalFact>, FeedbackError> {
        let applicable: Vec<LearningPattern> = self
            .repository
            .list()
            .await?
            .into_iter()
            .filter(|p| p.is_applicable(self.success_threshold))
            .collect();

        if applicable.is_empty() {
            return Ok(facts);
        }

        let mut applied = 0usize;
        for fact in facts.iter_mut() {
            let Some((pattern, confidence)) =
                self.matcher
                    .find_best_match(fact, &applicable, self.min_match_confidence)
            else {
                continue;
            };

            let original = fact.text.clone();
            fact.apply_correction(pattern.id.clone(), &pattern.correction, pattern.success_rate);
            applied += 1;

            tracing::debug!(
                pattern = %pattern.id.short(),
                confidence,
                from = %original,
                to = %fact.text,
                "applied learning correction"
            );

            if let Some(mut stored) = self.repository.get(&pattern.id).await? {
                stored.applied_count += 1;
                self.repository.put(&stored).await?;
            }
        }

        if applied > 0 {
            tracing::info!(count = applied, "applied approved learning corrections");
        }

        Ok(facts)
    }

    // ── Performance tracking ─────────────────────────────────────────────────

    /// Records an application outcome. A rate that falls below the threshold
    /// logs a warning but does not auto-disable the pattern — disabling is a
    /// human decision.
    pub async fn update_success_rate(
        &self,
        id: &PatternId,
        success: bool,
    ) -> Result<f64, FeedbackError> {
        let mut pattern = self.require(id).await?;
        let rate = pattern.record_outcome(success);
        self.repository.put(&pattern).await?;

        if rate < self.success_threshold {
            tracing::warn!(
                pattern = %id.short(),
                success_rate = rate,
                threshold = self.success_threshold,
                "pattern success rate below threshold - consider rejecting"
            );
        }

        Ok(rate)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub async fn pending_patterns(&self) -> Result<Vec<LearningPattern>, FeedbackError> {
        Ok(self
            .repository
            .list()
            .await?
            .into_iter()
            .filter(|p| p.status.is_pending())
            .collect())
    }

    /// Approved patterns, most-applied first.
    pub async fn approved_patterns(&self) -> Result<Vec<LearningPattern>, FeedbackError> {
        let mut approved: Vec<LearningPattern> = self
            .repository
            .list()
            .await?
            .into_iter()
            .filter(|p| p.status.is_approved())
            .collect();
        approved.sort_by(|a, b| b.applied_count.cmp(&a.applied_count));
        Ok(approved)
    }

    pub async fn statistics(&self) -> Result<LearningStatistics, FeedbackError> {
        let patterns = self.repository.list().await?;

        let total = patterns.len();
        let approved: Vec<&LearningPattern> =
            patterns.iter().filter(|p| p.status.is_approved()).collect();
        let pending = patterns.iter().filter(|p| p.status.is_pending()).count();
        let rejected = patterns.iter().filter(|p| p.status.is_rejected()).count();

        Ok(LearningStatistics {
            total_patterns: total,
            approved_count: approved.len(),
            pending_count: pending,
            rejected_count: rejected,
            approval_rate: if total > 0 {
                approved.len() as f64 / total as f64
            } else {
                0.0
            },
            average_success_rate: if approved.is_empty() {
                0.0
            } else {
                approved.iter().map(|p| p.success_rate).sum::<f64>() / approved.len() as f64
            },
            total_applications: patterns.iter().map(|p| p.applied_count).sum(),
        })
    }

    pub async fn delete_pattern(&self, id: &PatternId) -> Result<bool, FeedbackError> {
        Ok(self.repository.delete(id).await?)
    }

    /// Bulk export for the persistence collaborator.
    pub async fn export_patterns(&self) -> Result<Vec<LearningPattern>, FeedbackError> {
        Ok(self.repository.list().await?)
    }

    /// Bulk import, e.g. restoring a persisted store at startup.
    pub async fn import_patterns(
        &self,
        patterns: Vec<LearningPattern>,
    ) -> Result<usize, FeedbackError> {
        let count = patterns.len();
        for pattern in &patterns {
            self.repository.put(pattern).await?;
        }
        tracing::info!(count, "imported learning patterns");
        Ok(count)
    }

    async fn require(&self, id: &PatternId) -> Result<LearningPattern, FeedbackError> {
        self.repository
            .get(id)
            .await?
            .ok_or_else(|| FeedbackError::NotFound(id.to_string()))
    }
}
