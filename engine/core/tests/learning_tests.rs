// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The approval-gated learning loop: submission, governance, application,
//! and success-rate tracking.

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use neurochart_core::application::{FeedbackManager, FeedbackSubmission};
use neurochart_core::domain::fact::{ClinicalFact, FactType};
use neurochart_core::domain::feedback::PatternId;
use neurochart_core::infrastructure::InMemoryPatternRepository;

fn manager() -> FeedbackManager {
    FeedbackManager::new(Arc::new(InMemoryPatternRepository::new()))
}

fn submission(original: &str, correction: &str) -> FeedbackSubmission {
    FeedbackSubmission {
        uncertainty_id: "unc_001".to_string(),
        fact_type: FactType::TemporalReference,
        original_extraction: original.to_string(),
        correction: correction.to_string(),
        source_doc: Some("progress".to_string()),
        surrounding_context: None,
        created_by: Some("dr_house".to_string()),
    }
}

fn temporal_fact(text: &str) -> ClinicalFact {
    ClinicalFact::new(
        text,
        "progress_note",
        5,
        Utc.with_ymd_and_hms(2024, 11, 5, 8, 0, 0).unwrap(),
        0.80,
        FactType::TemporalReference,
    )
    .unwrap()
}

// ── Submission ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_add_feedback_creates_pending_pattern() {
    let manager = manager();
    let id = manager
        .add_feedback(submission("POD#3", "post-operative day 3"))
        .await
        .unwrap();

    let pending = manager.pending_patterns().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].success_rate, 1.0);
    assert_eq!(pending[0].created_by.as_deref(), Some("dr_house"));
}

#[tokio::test]
async fn test_resubmission_dedupes_without_resetting_approval() {
    let manager = manager();
    let id = manager
        .add_feedback(submission("POD#3", "post-operative day 3"))
        .await
        .unwrap();
    manager.approve(&id, "dr_admin").await.unwrap();

    // Same (type, original, correction) triple arrives again.
    let again = manager
        .add_feedback(submission("POD#3", "post-operative day 3"))
        .await
        .unwrap();

    assert_eq!(id, again);
    assert_eq!(manager.approved_patterns().await.unwrap().len(), 1);
    assert!(manager.pending_patterns().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_invalid_submissions_rejected() {
    let manager = manager();

    assert!(manager.add_feedback(submission("", "fixed")).await.is_err());
    assert!(manager.add_feedback(submission("same", "same")).await.is_err());
}

// ── Governance ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_approval_decisions_are_terminal() {
    let manager = manager();
    let id = manager
        .add_feedback(submission("POD#3", "post-operative day 3"))
        .await
        .unwrap();

    manager.approve(&id, "dr_admin").await.unwrap();
    assert!(manager.reject(&id, "dr_admin", None).await.is_err());
    assert!(manager.approve(&id, "other_admin").await.is_err());
}

#[tokio::test]
async fn test_unknown_pattern_id_errors() {
    let manager = manager();
    let ghost = PatternId::from_hex("deadbeef");
    assert!(manager.approve(&ghost, "dr_admin").await.is_err());
}

// ── Application safety contract ──────────────────────────────────────────────

#[tokio::test]
async fn test_pending_pattern_is_never_applied() {
    let manager = manager();
    manager
        .add_feedback(submission("POD#3", "post-operative day 3"))
        .await
        .unwrap();

    let facts = manager
        .apply_corrections(vec![temporal_fact("POD#3")])
        .await
        .unwrap();

    // Perfect match quality, still untouched: the pattern is unapproved.
    assert_eq!(facts[0].text, "POD#3");
    assert!(facts[0].correction.is_none());
}

#[tokio::test]
async fn test_approved_pattern_corrects_matching_fact() {
    let manager = manager();
    let id = manager
        .add_feedback(submission("POD#3", "post-operative day 3"))
        .await
        .unwrap();
    manager.approve(&id, "dr_admin").await.unwrap();

    let facts = manager
        .apply_corrections(vec![temporal_fact("POD#3")])
        .await
        .unwrap();

    assert_eq!(facts[0].text, "post-operative day 3");
    let correction = facts[0].correction.as_ref().unwrap();
    assert_eq!(correction.pattern_id, id);
    assert_eq!(correction.original_text, "POD#3");
    // Confidence scaled by the (full) success rate.
    assert!((facts[0].confidence() - 0.80).abs() < 1e-9);
}

#[tokio::test]
async fn test_application_count_persists_through_repository() {
    let manager = manager();
    let id = manager
        .add_feedback(submission("POD#3", "post-operative day 3"))
        .await
        .unwrap();
    manager.approve(&id, "dr_admin").await.unwrap();

    for _ in 0..3 {
        manager
            .apply_corrections(vec![temporal_fact("POD#3")])
            .await
            .unwrap();
    }

    let approved = manager.approved_patterns().await.unwrap();
    assert_eq!(approved[0].applied_count, 3);
}

#[tokio::test]
async fn test_low_success_rate_stops_application_even_when_approved() {
    let manager = manager();
    let id = manager
        .add_feedback(submission("POD#3", "post-operative day 3"))
        .await
        .unwrap();
    manager.approve(&id, "dr_admin").await.unwrap();

    // Four failures drive the EMA to 0.6561, under the 0.70 floor.
    for _ in 0..4 {
        manager.update_success_rate(&id, false).await.unwrap();
    }

    let facts = manager
        .apply_corrections(vec![temporal_fact("POD#3")])
        .await
        .unwrap();
    assert_eq!(facts[0].text, "POD#3");
    assert!(facts[0].correction.is_none());
}

#[tokio::test]
async fn test_type_mismatch_is_never_corrected() {
    let manager = manager();
    let id = manager
        .add_feedback(submission("POD#3", "post-operative day 3"))
        .await
        .unwrap();
    manager.approve(&id, "dr_admin").await.unwrap();

    let mismatched = ClinicalFact::new(
        "POD#3",
        "progress_note",
        5,
        Utc.with_ymd_and_hms(2024, 11, 5, 8, 0, 0).unwrap(),
        0.80,
        FactType::Finding,
    )
    .unwrap();

    let facts = manager.apply_corrections(vec![mismatched]).await.unwrap();
    assert!(facts[0].correction.is_none());
}

// ── Success-rate tracking ────────────────────────────────────────────────────

#[tokio::test]
async fn test_success_rate_ema_arithmetic() {
    let manager = manager();
    let id = manager
        .add_feedback(submission("POD#3", "post-operative day 3"))
        .await
        .unwrap();

    let rate = manager.update_success_rate(&id, false).await.unwrap();
    assert!((rate - 0.90).abs() < 1e-9);

    let rate = manager.update_success_rate(&id, true).await.unwrap();
    assert!((rate - 0.91).abs() < 1e-9);
}

// ── Queries and bulk transfer ────────────────────────────────────────────────

#[tokio::test]
async fn test_statistics_over_mixed_states() {
    let manager = manager();

    let a = manager.add_feedback(submission("POD#1", "post-operative day 1")).await.unwrap();
    let b = manager.add_feedback(submission("POD#2", "post-operative day 2")).await.unwrap();
    let c = manager.add_feedback(submission("POD#4", "post-operative day 4")).await.unwrap();
    manager.add_feedback(submission("POD#5", "post-operative day 5")).await.unwrap();

    manager.approve(&a, "dr_admin").await.unwrap();
    manager.approve(&b, "dr_admin").await.unwrap();
    manager
        .reject(&c, "dr_admin", Some("not generalizable".to_string()))
        .await
        .unwrap();

    let stats = manager.statistics().await.unwrap();
    assert_eq!(stats.total_patterns, 4);
    assert_eq!(stats.approved_count, 2);
    assert_eq!(stats.pending_count, 1);
    assert_eq!(stats.rejected_count, 1);
    assert!((stats.approval_rate - 0.5).abs() < 1e-9);
    assert!((stats.average_success_rate - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_approved_patterns_sorted_by_usage() {
    let manager = manager();

    let rare = manager.add_feedback(submission("HD#2", "hospital day 2")).await.unwrap();
    let frequent = manager.add_feedback(submission("POD#3", "post-operative day 3")).await.unwrap();
    manager.approve(&rare, "dr_admin").await.unwrap();
    manager.approve(&frequent, "dr_admin").await.unwrap();

    for _ in 0..2 {
        manager
            .apply_corrections(vec![temporal_fact("POD#3")])
            .await
            .unwrap();
    }

    let approved = manager.approved_patterns().await.unwrap();
    assert_eq!(approved[0].id, frequent);
    assert_eq!(approved[1].id, rare);
}

#[tokio::test]
async fn test_export_import_round_trip() {
    let source = manager();
    let id = source
        .add_feedback(submission("POD#3", "post-operative day 3"))
        .await
        .unwrap();
    source.approve(&id, "dr_admin").await.unwrap();

    let exported = source.export_patterns().await.unwrap();

    let target = manager();
    let imported = target.import_patterns(exported).await.unwrap();
    assert_eq!(imported, 1);

    // Approval state travels with the pattern.
    let facts = target
        .apply_corrections(vec![temporal_fact("POD#3")])
        .await
        .unwrap();
    assert_eq!(facts[0].text, "post-operative day 3");
}

#[tokio::test]
async fn test_delete_pattern() {
    let manager = manager();
    let id = manager
        .add_feedback(submission("POD#3", "post-operative day 3"))
        .await
        .unwrap();

    assert!(manager.delete_pattern(&id).await.unwrap());
    assert!(!manager.delete_pattern(&id).await.unwrap());
    assert!(manager.pending_patterns().await.unwrap().is_empty());
}
