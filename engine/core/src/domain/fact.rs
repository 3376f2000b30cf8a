// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Clinical Fact Domain
//!
//! A [`ClinicalFact`] is one atomic extracted clinical statement with full
//! provenance: source document, source line, original timestamp, and a
//! confidence score that is enforced to `[0.0, 1.0]` at construction.
//!
//! ## Key Concepts
//!
//! | Type | Description |
//! |------|-------------|
//! | `ClinicalFact` | Extracted statement + provenance + confidence |
//! | `ClinicalConcept` | Normalized lab/score interpretation with severity |
//! | `TemporalContext` | Raw relative time reference awaiting resolution |
//! | `ResolutionOutcome` | How (and whether) the reference was resolved |
//! | `AppliedCorrection` | Learning-loop provenance for rewritten text |
//!
//! Facts are mutated in exactly two places: temporal resolution (timestamp +
//! confidence boost) and learning corrections (text + confidence scaling).
//! Both preserve the pre-mutation state so the original extraction stays
//! recoverable.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::feedback::PatternId;

/// Stable identity for a fact within a run; referenced by uncertainties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FactId(pub Uuid);

impl FactId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FactId {
    fn default() -> Self {
        Self::new()
    }
}

/// Clinical severity grading shared by labs, complications, and medications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Normal,
    Low,
    High,
    Critical,
    Unknown,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Normal => "NORMAL",
            Self::Low => "LOW",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Category of extracted fact. Drives rule selection downstream: trending,
/// validation stages, and learning-pattern matching all dispatch on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactType {
    Medication,
    LabValue,
    ClinicalScore,
    VitalSign,
    TemporalReference,
    Procedure,
    Finding,
    Complication,
    Recommendation,
    Diagnosis,
}

impl std::fmt::Display for FactType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Medication => "medication",
            Self::LabValue => "lab_value",
            Self::ClinicalScore => "clinical_score",
            Self::VitalSign => "vital_sign",
            Self::TemporalReference => "temporal_reference",
            Self::Procedure => "procedure",
            Self::Finding => "finding",
            Self::Complication => "complication",
            Self::Recommendation => "recommendation",
            Self::Diagnosis => "diagnosis",
        };
        f.write_str(s)
    }
}

/// Normalized interpretation of a lab value or clinical score. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalConcept {
    pub kind: String,
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub normal_range: Option<(f64, f64)>,
    pub severity: Severity,
    pub implications: Vec<String>,
}

/// Machine-usable value attached to a fact alongside its display text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedValue {
    Number(f64),
    Text(String),
    Concept(ClinicalConcept),
}

impl NormalizedValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Concept(c) => Some(c.value),
            Self::Text(_) => None,
        }
    }

    pub fn as_concept(&self) -> Option<&ClinicalConcept> {
        match self {
            Self::Concept(c) => Some(c),
            _ => None,
        }
    }
}

/// Fixed taxonomy of relative time references the knowledge base recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalKind {
    PostOperativeDay,
    HospitalDay,
    HoursAfter,
    DaysAfter,
    NextMorning,
    TodayMorning,
    PreviousDay,
    PreviousNight,
    SameDay,
    SameEvening,
    NextDay,
    TwoDaysAfter,
}

/// Raw temporal reference captured at extraction time. Never self-resolves;
/// the resolver rewrites the owning fact later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalContext {
    pub kind: TemporalKind,
    pub raw_text: String,
    pub surrounding: String,
}

/// Resolution strategy applied to a temporal reference, for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    PodAnchor,
    HdAnchor,
    RelativeHours,
    RelativeDays,
    PreviousDay,
    NextMorning,
    SameDayMidnight,
    SameDayEvening,
    NextDay,
}

/// Outcome of temporal resolution for one fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub resolved: bool,
    pub method: Option<ResolutionMethod>,
}

/// Knowledge-base context carried by medication facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationContext {
    pub drug_class: String,
    pub subclass: Option<String>,
    pub indications: Vec<String>,
    pub monitoring: Vec<String>,
    pub high_risk: bool,
}

/// Knowledge-base context carried by lab facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabContext {
    pub normal_range: Option<(f64, f64)>,
    pub implications: Vec<String>,
}

/// Learning-loop provenance: which pattern rewrote this fact, and what the
/// extractor originally produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedCorrection {
    pub pattern_id: PatternId,
    pub original_text: String,
}

#[derive(Debug, Error)]
pub enum FactError {
    #[error("Confidence must be between 0.0 and 1.0, got {0}")]
    InvalidConfidence(f64),
}

/// One atomic extracted clinical statement with provenance and confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalFact {
    pub id: FactId,
    pub text: String,
    pub source_doc: String,
    pub source_line: usize,
    pub timestamp: DateTime<Utc>,
    pub resolved_timestamp: Option<DateTime<Utc>>,
    confidence: f64,
    pub fact_type: FactType,
    pub severity: Option<Severity>,
    pub normalized: Option<NormalizedValue>,
    pub requires_review: bool,
    /// How many identical extractions merged into this fact.
    pub dedup_count: u32,
    pub temporal: Option<TemporalContext>,
    pub resolution: Option<ResolutionOutcome>,
    pub medication: Option<MedicationContext>,
    pub lab: Option<LabContext>,
    pub correction: Option<AppliedCorrection>,
}

impl ClinicalFact {
    /// Construct a fact, enforcing the confidence invariant. Out-of-range
    /// confidence fails fast and is never coerced.
    pub fn new(
        text: impl Into<String>,
        source_doc: impl Into<String>,
        source_line: usize,
        timestamp: DateTime<Utc>,
        confidence: f64,
        fact_type: FactType,
    ) -> Result<Self, FactError> {
        if !(0.0..=1.0).contains(&confidence) || confidence.is_nan() {
            return Err(FactError::InvalidConfidence(confidence));
        }

        Ok(Self {
            id: FactId::new(),
            text: text.into(),
            source_doc: source_doc.into(),
            source_line,
            timestamp,
            resolved_timestamp: None,
            confidence,
            fact_type,
            severity: None,
            normalized: None,
            requires_review: false,
            dedup_count: 1,
            temporal: None,
            resolution: None,
            medication: None,
            lab: None,
            correction: None,
        })
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_normalized(mut self, value: NormalizedValue) -> Self {
        self.normalized = Some(value);
        self
    }

    pub fn with_review_required(mut self) -> Self {
        self.requires_review = true;
        self
    }

    pub fn with_temporal(mut self, temporal: TemporalContext) -> Self {
        self.temporal = Some(temporal);
        self
    }

    pub fn with_medication(mut self, medication: MedicationContext) -> Self {
        self.medication = Some(medication);
        self
    }

    pub fn with_lab(mut self, lab: LabContext) -> Self {
        self.lab = Some(lab);
        self
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Resolved timestamp when available, original otherwise. All grouping,
    /// ordering, and conflict detection work on this.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        self.resolved_timestamp.unwrap_or(self.timestamp)
    }

    pub fn effective_date(&self) -> NaiveDate {
        self.effective_timestamp().date_naive()
    }

    /// Records a successful temporal resolution: rewrites the absolute
    /// timestamp and boosts confidence by `delta`, capped at `cap`.
    pub fn mark_resolved(
        &mut self,
        resolved: DateTime<Utc>,
        method: ResolutionMethod,
        delta: f64,
        cap: f64,
    ) {
        self.resolved_timestamp = Some(resolved);
        self.confidence = (self.confidence + delta).min(cap);
        self.resolution = Some(ResolutionOutcome {
            resolved: true,
            method: Some(method),
        });
    }

    pub fn mark_unresolved(&mut self) {
        self.resolution = Some(ResolutionOutcome {
            resolved: false,
            method: None,
        });
    }

    /// Applies an approved learning correction: swaps the text, scales
    /// confidence by the pattern's success rate, and preserves the original
    /// extraction for audit.
    pub fn apply_correction(
        &mut self,
        pattern_id: PatternId,
        corrected_text: impl Into<String>,
        success_rate: f64,
    ) {
        let original = std::mem::replace(&mut self.text, corrected_text.into());
        self.confidence = (self.confidence * success_rate).clamp(0.0, 1.0);
        self.correction = Some(AppliedCorrection {
            pattern_id,
            original_text: original,
        });
    }

    /// Folds an exact-text duplicate into this fact, keeping the higher
    /// confidence and summing the merge count.
    pub fn absorb_duplicate(&mut self, other: &ClinicalFact) {
        if other.confidence > self.confidence {
            self.confidence = other.confidence;
        }
        self.dedup_count += other.dedup_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 1, h, 0, 0).unwrap()
    }

    // ── Construction invariants ───────────────────────────────────────────────

    #[test]
    fn test_confidence_in_range_accepted() {
        for c in [0.0, 0.5, 1.0] {
            assert!(ClinicalFact::new("NIHSS: 8", "doc", 1, ts(8), c, FactType::ClinicalScore).is_ok());
        }
    }

    #[test]
    fn test_confidence_out_of_range_rejected() {
        for c in [-0.1, 1.5, f64::NAN] {
            let err = ClinicalFact::new("NIHSS: 8", "doc", 1, ts(8), c, FactType::ClinicalScore)
                .expect_err("out-of-range confidence must fail");
            assert!(err.to_string().contains("between 0.0 and 1.0"));
        }
    }

    // ── Mutation paths ────────────────────────────────────────────────────────

    #[test]
    fn test_resolution_boost_is_capped() {
        let mut fact =
            ClinicalFact::new("POD#3", "doc", 1, ts(8), 0.90, FactType::TemporalReference).unwrap();
        fact.mark_resolved(ts(14), ResolutionMethod::PodAnchor, 0.15, 0.95);

        assert_eq!(fact.confidence(), 0.95);
        assert_eq!(fact.effective_timestamp(), ts(14));
        assert!(fact.resolution.as_ref().unwrap().resolved);
    }

    #[test]
    fn test_correction_preserves_original_text() {
        let mut fact =
            ClinicalFact::new("POD#3", "doc", 1, ts(8), 0.80, FactType::TemporalReference).unwrap();
        fact.apply_correction(PatternId::from_hex("abc123"), "post-operative day 3", 0.9);

        assert_eq!(fact.text, "post-operative day 3");
        assert_eq!(fact.correction.as_ref().unwrap().original_text, "POD#3");
        assert!((fact.confidence() - 0.72).abs() < 1e-9);
    }

    #[test]
    fn test_absorb_duplicate_keeps_highest_confidence() {
        let mut kept =
            ClinicalFact::new("Medication: nimodipine 60mg", "doc1", 10, ts(8), 0.85, FactType::Medication)
                .unwrap();
        let dup =
            ClinicalFact::new("Medication: nimodipine 60mg", "doc2", 15, ts(8), 0.90, FactType::Medication)
                .unwrap();

        kept.absorb_duplicate(&dup);
        assert_eq!(kept.confidence(), 0.90);
        assert_eq!(kept.dedup_count, 2);
    }
}
