// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Clinical Timeline Domain
//!
//! The [`ClinicalTimeline`] is the ordered, date-grouped view of a hospital
//! course: facts grouped by calendar day, progression trends per clinical
//! metric, ranked key events, and the admission/discharge bounds. Built once
//! per run and read-only afterwards.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::fact::{ClinicalFact, FactType, Severity};

/// Kind of document-derived reference timestamp used for temporal
/// resolution. Recomputed per run, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    Surgery,
    Admission,
}

/// A reference timestamp derived from document metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorEvent {
    pub kind: AnchorKind,
    pub timestamp: DateTime<Utc>,
    pub description: String,
    pub source_doc: String,
    pub specialty: Option<String>,
}

/// Direction of a tracked clinical metric across the course.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Worsening,
    Stable,
    Increasing,
    Decreasing,
    InsufficientData,
}

/// One observation of a clinical score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreObservation {
    pub date: NaiveDate,
    pub value: f64,
    pub source_doc: String,
    pub confidence: f64,
}

/// Trend of one clinical score (NIHSS, GCS, ...) over the course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreProgression {
    pub metric: String,
    pub trend: Trend,
    pub observations: Vec<ScoreObservation>,
}

/// One observation of a lab value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabObservation {
    pub date: NaiveDate,
    pub value: f64,
    pub severity: Severity,
    pub source_doc: String,
}

/// Clinical reading of a lab trend relative to its normal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabSignificance {
    ImprovingToNormal,
    WorseningFromNormal,
    Stable,
    Increasing,
    Decreasing,
    InsufficientData,
}

/// Knowledge-base interpretation of a lab series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTrendAnalysis {
    pub trend: Trend,
    pub clinical_significance: LabSignificance,
    pub first_value: f64,
    pub last_value: f64,
    pub change_percent: f64,
}

/// Trend of one lab analyte over the course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabProgression {
    pub lab: String,
    pub analysis: LabTrendAnalysis,
    pub observations: Vec<LabObservation>,
}

/// A complication, listed chronologically (complications are not trended).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplicationEntry {
    pub date: NaiveDate,
    pub description: String,
    pub severity: Option<Severity>,
    pub source_doc: String,
}

/// A procedure or recommendation, listed chronologically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionEntry {
    pub date: NaiveDate,
    pub description: String,
    pub fact_type: FactType,
    pub source_doc: String,
}

/// Clinical progression across the four tracked dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressionSummary {
    pub neurological: Vec<ScoreProgression>,
    pub laboratory: Vec<LabProgression>,
    pub complications: Vec<ComplicationEntry>,
    pub interventions: Vec<InterventionEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEventKind {
    Surgery,
    Admission,
    Complication,
    CriticalLab,
    Procedure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyEventCategory {
    Milestone,
    Complication,
    Laboratory,
    Intervention,
}

/// A ranked, high-significance event on the course timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub kind: KeyEventKind,
    pub category: KeyEventCategory,
    pub description: String,
    pub significance: Severity,
}

/// The reconstructed hospital course. Read-only after build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalTimeline {
    /// Facts grouped by calendar date of their effective timestamp, each
    /// day sorted by time ascending then confidence descending.
    pub days: BTreeMap<NaiveDate, Vec<ClinicalFact>>,
    pub progression: ProgressionSummary,
    pub key_events: Vec<KeyEvent>,
    pub anchors: Vec<AnchorEvent>,
    pub admission_date: Option<DateTime<Utc>>,
    pub discharge_date: Option<DateTime<Utc>>,
    /// Inclusive day count between admission and discharge, 0 when either
    /// bound is unknown.
    pub total_hospital_days: i64,
}

impl ClinicalTimeline {
    pub fn total_facts(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }

    pub fn surgery_anchors(&self) -> impl Iterator<Item = &AnchorEvent> {
        self.anchors.iter().filter(|a| a.kind == AnchorKind::Surgery)
    }

    pub fn admission_anchors(&self) -> impl Iterator<Item = &AnchorEvent> {
        self.anchors.iter().filter(|a| a.kind == AnchorKind::Admission)
    }

    pub fn summary(&self) -> TimelineSummary {
        let mut facts_by_type = BTreeMap::new();
        for fact in self.days.values().flatten() {
            *facts_by_type.entry(fact.fact_type).or_insert(0usize) += 1;
        }

        TimelineSummary {
            total_facts: self.total_facts(),
            total_days: self.days.len(),
            facts_by_type,
            key_event_count: self.key_events.len(),
            anchor_count: self.anchors.len(),
            admission_date: self.admission_date,
            discharge_date: self.discharge_date,
            total_hospital_days: self.total_hospital_days,
        }
    }
}

/// Summary statistics over a built timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSummary {
    pub total_facts: usize,
    pub total_days: usize,
    pub facts_by_type: BTreeMap<FactType, usize>,
    pub key_event_count: usize,
    pub anchor_count: usize,
    pub admission_date: Option<DateTime<Utc>>,
    pub discharge_date: Option<DateTime<Utc>>,
    pub total_hospital_days: i64,
}
