// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! The six-stage validation pipeline, stage by stage and end to end.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use neurochart_core::application::Validator;
use neurochart_core::domain::fact::{ClinicalFact, FactType, NormalizedValue, Severity};
use neurochart_core::domain::knowledge::ClinicalKnowledgeBase;
use neurochart_core::domain::timeline::{ClinicalTimeline, ProgressionSummary};
use neurochart_core::domain::uncertainty::{UncertaintyKind, UncertaintySeverity};

fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, day, hour, 0, 0).unwrap()
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 11, day).unwrap()
}

fn validator() -> Validator {
    Validator::new(Arc::new(ClinicalKnowledgeBase::builtin().unwrap())).unwrap()
}

fn kb() -> ClinicalKnowledgeBase {
    ClinicalKnowledgeBase::builtin().unwrap()
}

/// Ten-day course with a few populated days and sane bounds.
fn sample_timeline() -> ClinicalTimeline {
    let mut days = BTreeMap::new();
    days.insert(date(1), Vec::new());
    days.insert(date(2), Vec::new());
    days.insert(date(3), Vec::new());

    ClinicalTimeline {
        days,
        progression: ProgressionSummary::default(),
        key_events: Vec::new(),
        anchors: Vec::new(),
        admission_date: Some(ts(1, 8)),
        discharge_date: Some(ts(10, 10)),
        total_hospital_days: 10,
    }
}

fn fact(text: &str, fact_type: FactType, timestamp: DateTime<Utc>) -> ClinicalFact {
    ClinicalFact::new(text, "doc", 1, timestamp, 0.90, fact_type).unwrap()
}

fn score(name: &str, value: f64, timestamp: DateTime<Utc>) -> ClinicalFact {
    fact(&format!("{}: {}", name, value), FactType::ClinicalScore, timestamp)
        .with_normalized(NormalizedValue::Number(value))
}

fn lab(name: &str, value: f64, timestamp: DateTime<Utc>) -> ClinicalFact {
    let concept = kb().normalize_lab_value(name, value);
    let severity = concept.severity;
    fact(
        &format!("Lab: {} = {} {}", name, value, concept.unit),
        FactType::LabValue,
        timestamp,
    )
    .with_severity(severity)
    .with_normalized(NormalizedValue::Concept(concept))
}

fn kinds(uncertainties: &[neurochart_core::domain::uncertainty::ClinicalUncertainty]) -> Vec<UncertaintyKind> {
    uncertainties.iter().map(|u| u.kind).collect()
}

// ── Stage 1: format ──────────────────────────────────────────────────────────

#[test]
fn test_valid_fact_passes_format_stage() {
    let facts = vec![score("NIHSS", 8.0, ts(1, 8))];
    let (validated, uncertainties) = validator().validate(&facts, &sample_timeline());

    assert_eq!(validated.len(), 1);
    assert!(!kinds(&uncertainties).contains(&UncertaintyKind::MalformedFact));
}

#[test]
fn test_empty_fact_dropped_with_medium_finding() {
    let facts = vec![fact("", FactType::Finding, ts(1, 8))];
    let (validated, uncertainties) = validator().validate(&facts, &sample_timeline());

    assert!(validated.is_empty());
    let malformed: Vec<_> = uncertainties
        .iter()
        .filter(|u| u.kind == UncertaintyKind::MalformedFact)
        .collect();
    assert_eq!(malformed.len(), 1);
    assert_eq!(malformed[0].severity, UncertaintySeverity::Medium);
}

// ── Stage 2: clinical rules ──────────────────────────────────────────────────

#[test]
fn test_critical_lab_produces_high_finding() {
    let facts = vec![lab("Sodium", 125.0, ts(1, 8))];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    let critical: Vec<_> = uncertainties
        .iter()
        .filter(|u| u.kind == UncertaintyKind::CriticalLabValue)
        .collect();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].severity, UncertaintySeverity::High);
    assert!(critical[0].description.contains("Sodium"));
    assert!(critical[0].description.contains("125"));
}

#[test]
fn test_invalid_score_produces_high_finding() {
    let facts = vec![score("NIHSS", 99.0, ts(1, 8))];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    let invalid: Vec<_> = uncertainties
        .iter()
        .filter(|u| u.kind == UncertaintyKind::InvalidScoreRange)
        .collect();
    assert_eq!(invalid.len(), 1);
    assert_eq!(invalid[0].severity, UncertaintySeverity::High);
    assert!(invalid[0].description.contains("NIHSS"));
    assert!(invalid[0].description.contains("99"));
}

#[test]
fn test_excessive_dose_produces_high_finding() {
    let facts = vec![fact(
        "Medication: heparin 100000 units",
        FactType::Medication,
        ts(1, 8),
    )];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    let dose: Vec<_> = uncertainties
        .iter()
        .filter(|u| u.kind == UncertaintyKind::ExcessiveMedicationDose)
        .collect();
    assert_eq!(dose.len(), 1);
    assert_eq!(dose[0].severity, UncertaintySeverity::High);
    assert!(dose[0].description.to_lowercase().contains("heparin"));
}

#[test]
fn test_normal_lab_produces_no_stage2_findings() {
    let facts = vec![lab("Sodium", 140.0, ts(1, 8))];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    assert!(!kinds(&uncertainties).contains(&UncertaintyKind::CriticalLabValue));
}

// ── Stage 3: temporal consistency ────────────────────────────────────────────

#[test]
fn test_discharge_before_admission_flagged() {
    let mut timeline = sample_timeline();
    timeline.admission_date = Some(ts(5, 8));
    timeline.discharge_date = Some(ts(1, 10));

    let (_, uncertainties) = validator().validate(&[], &timeline);

    let temporal: Vec<_> = uncertainties
        .iter()
        .filter(|u| u.kind == UncertaintyKind::TemporalInconsistency)
        .collect();
    assert!(!temporal.is_empty());
    assert_eq!(temporal[0].severity, UncertaintySeverity::High);
    assert!(temporal[0].description.to_lowercase().contains("before admission"));
}

#[test]
fn test_documentation_gap_flagged_as_medium() {
    let mut timeline = sample_timeline();
    timeline.days.clear();
    timeline.days.insert(date(1), Vec::new());
    timeline.days.insert(date(8), Vec::new());

    let (_, uncertainties) = validator().validate(&[], &timeline);

    let gaps: Vec<_> = uncertainties
        .iter()
        .filter(|u| u.kind == UncertaintyKind::DocumentationGap)
        .collect();
    assert_eq!(gaps.len(), 1);
    assert_eq!(gaps[0].severity, UncertaintySeverity::Medium);
    assert!(gaps[0].description.contains("7-day gap"));
}

#[test]
fn test_contiguous_timeline_has_no_temporal_findings() {
    let (_, uncertainties) = validator().validate(&[], &sample_timeline());

    assert!(!kinds(&uncertainties).contains(&UncertaintyKind::TemporalInconsistency));
    assert!(!kinds(&uncertainties).contains(&UncertaintyKind::DocumentationGap));
}

// ── Stage 4: cross-fact consistency ──────────────────────────────────────────

#[test]
fn test_conflicting_scores_within_hour_flagged() {
    let facts = vec![
        score("NIHSS", 6.0, ts(1, 8)),
        score("NIHSS", 12.0, Utc.with_ymd_and_hms(2024, 11, 1, 8, 30, 0).unwrap()),
    ];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    let conflicts: Vec<_> = uncertainties
        .iter()
        .filter(|u| u.kind == UncertaintyKind::ConflictingInformation)
        .collect();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].severity, UncertaintySeverity::High);
    assert!(conflicts[0].description.contains("NIHSS"));
    assert_eq!(conflicts[0].fact_ids.len(), 2);
}

#[test]
fn test_score_change_across_days_is_not_a_conflict() {
    let facts = vec![score("NIHSS", 6.0, ts(1, 8)), score("NIHSS", 12.0, ts(3, 8))];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    assert!(!kinds(&uncertainties).contains(&UncertaintyKind::ConflictingInformation));
}

#[test]
fn test_anticoagulant_interaction_surfaced() {
    let facts = vec![fact(
        "Medication: heparin 5000 units",
        FactType::Medication,
        ts(3, 8),
    )];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    let interactions: Vec<_> = uncertainties
        .iter()
        .filter(|u| u.kind == UncertaintyKind::MedicationInteraction)
        .collect();
    assert!(!interactions.is_empty());
    assert!(interactions[0]
        .description
        .to_lowercase()
        .contains("anticoagulant"));
}

// ── Stage 5: contradictions ──────────────────────────────────────────────────

#[test]
fn test_no_complications_vs_documented_complication() {
    let facts = vec![
        fact(
            "Procedure completed without complications",
            FactType::Finding,
            ts(2, 14),
        ),
        fact("Complication: CSF leak noted POD#1", FactType::Complication, ts(3, 8))
            .with_severity(Severity::High),
    ];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    let contradictions: Vec<_> = uncertainties
        .iter()
        .filter(|u| u.kind == UncertaintyKind::ContradictoryStatements)
        .collect();
    assert!(!contradictions.is_empty());
    assert_eq!(contradictions[0].severity, UncertaintySeverity::High);
    assert!(contradictions[0]
        .description
        .to_lowercase()
        .contains("no complication"));
}

#[test]
fn test_revision_after_completed_procedure() {
    let facts = vec![
        fact("Procedure: Craniotomy successful", FactType::Procedure, ts(2, 14)),
        fact(
            "Procedure: Revision craniotomy for CSF leak repair",
            FactType::Procedure,
            ts(5, 14),
        ),
    ];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    let outcomes: Vec<_> = uncertainties
        .iter()
        .filter(|u| u.kind == UncertaintyKind::ContradictoryOutcomes)
        .collect();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].severity, UncertaintySeverity::Medium);
    assert!(outcomes[0].description.to_lowercase().contains("revision"));
}

#[test]
fn test_stable_discharge_near_critical_lab() {
    let facts = vec![
        ClinicalFact::new(
            "Patient stable for discharge",
            "discharge_summary",
            1,
            ts(10, 10),
            0.90,
            FactType::Finding,
        )
        .unwrap(),
        lab("Sodium", 125.0, ts(9, 8)),
    ];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    let discharge: Vec<_> = uncertainties
        .iter()
        .filter(|u| u.kind == UncertaintyKind::DischargeStatusContradiction)
        .collect();
    assert!(!discharge.is_empty());
    assert_eq!(discharge[0].severity, UncertaintySeverity::High);
    assert!(discharge[0].description.to_lowercase().contains("stable"));
    assert!(discharge[0].description.to_lowercase().contains("critical"));
}

#[test]
fn test_clean_course_has_no_contradictions() {
    let facts = vec![
        fact("Procedure: Craniotomy completed", FactType::Procedure, ts(2, 14)),
        fact("Patient progressing well", FactType::Finding, ts(5, 8)),
    ];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    for kind in [
        UncertaintyKind::ContradictoryStatements,
        UncertaintyKind::ContradictoryOutcomes,
        UncertaintyKind::DischargeStatusContradiction,
    ] {
        assert!(!kinds(&uncertainties).contains(&kind));
    }
}

// ── Stage 6: completeness ────────────────────────────────────────────────────

#[test]
fn test_missing_diagnosis_is_high() {
    let facts = vec![fact("Medication: nimodipine 60mg", FactType::Medication, ts(1, 8))];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    let missing: Vec<_> = uncertainties
        .iter()
        .filter(|u| {
            u.kind == UncertaintyKind::MissingInformation
                && u.description.to_lowercase().contains("diagnosis")
        })
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].severity, UncertaintySeverity::High);
}

#[test]
fn test_missing_procedure_flagged() {
    let facts = vec![score("NIHSS", 8.0, ts(1, 8))];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    assert!(uncertainties
        .iter()
        .any(|u| u.description.to_lowercase().contains("procedure")));
}

#[test]
fn test_missing_discharge_medications_is_high() {
    let facts = vec![fact("Diagnosis: SAH", FactType::Diagnosis, ts(1, 8))];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    let missing: Vec<_> = uncertainties
        .iter()
        .filter(|u| u.description.to_lowercase().contains("discharge medication"))
        .collect();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].severity, UncertaintySeverity::High);
}

#[test]
fn test_complete_case_has_no_high_completeness_findings() {
    let facts = vec![
        fact("Diagnosis: SAH", FactType::Diagnosis, ts(1, 8)),
        fact(
            "Procedure: Craniotomy for aneurysm clipping",
            FactType::Procedure,
            ts(2, 14),
        ),
        ClinicalFact::new(
            "Medication: nimodipine 60mg q4h",
            "discharge_medications",
            1,
            ts(10, 10),
            0.85,
            FactType::Medication,
        )
        .unwrap(),
    ];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    let high_missing: Vec<_> = uncertainties
        .iter()
        .filter(|u| {
            u.kind == UncertaintyKind::MissingInformation
                && u.severity == UncertaintySeverity::High
        })
        .collect();
    assert!(high_missing.is_empty());
}

// ── Full pipeline ────────────────────────────────────────────────────────────

#[test]
fn test_all_stages_run_even_with_format_failures() {
    let facts = vec![fact("", FactType::Finding, ts(1, 8))];
    let (validated, uncertainties) = validator().validate(&facts, &sample_timeline());

    assert!(validated.is_empty());
    // Stage 1 finding plus completeness findings prove stage 6 still ran.
    assert!(uncertainties.len() >= 2);
    assert!(kinds(&uncertainties).contains(&UncertaintyKind::MalformedFact));
    assert!(kinds(&uncertainties).contains(&UncertaintyKind::MissingInformation));
}

#[test]
fn test_validation_does_not_mutate_surviving_facts() {
    let original = score("NIHSS", 8.0, ts(1, 8));
    let text = original.text.clone();
    let confidence = original.confidence();

    let (validated, _) = validator().validate(&[original], &sample_timeline());

    assert_eq!(validated[0].text, text);
    assert_eq!(validated[0].confidence(), confidence);
}

#[test]
fn test_problematic_case_collects_multiple_high_findings() {
    let facts = vec![score("NIHSS", 99.0, ts(1, 8)), lab("Sodium", 120.0, ts(1, 9))];
    let (_, uncertainties) = validator().validate(&facts, &sample_timeline());

    let high = uncertainties
        .iter()
        .filter(|u| u.severity == UncertaintySeverity::High)
        .count();
    assert!(high >= 3);
}

#[test]
fn test_summary_reflects_review_requirement() {
    let v = validator();
    let facts = vec![lab("Sodium", 120.0, ts(1, 8))];
    let (_, uncertainties) = v.validate(&facts, &sample_timeline());
    let summary = v.summary(&uncertainties);

    assert_eq!(summary.total, uncertainties.len());
    assert!(summary.high_count >= 1);
    assert!(summary.requires_review);
}
