// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Extraction Rules
//!
//! Each rule is an independent, pure predicate + transform unit over a
//! document: it owns its compiled patterns, reads the knowledge base, and
//! emits facts. Rules share no mutable state, so the extractor can run them
//! in any order and the orchestrator can extract documents concurrently.
//!
//! | Rule | Fact types | Notes |
//! |------|-----------|-------|
//! | `MedicationRule` | medication | knowledge-base adjusted confidence |
//! | `LabValueRule` | lab_value | severity-graded via reference ranges |
//! | `ClinicalScoreRule` | clinical_score | range-checked against the KB |
//! | `VitalSignRule` | vital_sign | BP, HR, RR, SpO2, Temp |
//! | `TemporalReferenceRule` | temporal_reference | never self-resolves |
//! | `DiagnosisRule` | diagnosis | assessment/impression lines |
//! | `OperativeNoteRule` | procedure, finding, complication | operative notes only |
//! | `ConsultNoteRule` | recommendation | consult notes only, specialty aware |

use regex::{Regex, RegexBuilder};
use std::sync::Arc;

use crate::domain::document::{ClinicalDocument, DocumentType};
use crate::domain::fact::{
    ClinicalFact, FactType, LabContext, MedicationContext, NormalizedValue, Severity,
    TemporalContext,
};
use crate::domain::knowledge::ClinicalKnowledgeBase;

use super::extractor::ExtractionError;

/// One pure extraction unit. `applies_to` is the predicate, `extract` the
/// transform.
pub trait ExtractionRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn applies_to(&self, _doc: &ClinicalDocument) -> bool {
        true
    }

    fn extract(&self, doc: &ClinicalDocument) -> Result<Vec<ClinicalFact>, ExtractionError>;
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Lines of a document with their 1-based line numbers.
fn numbered_lines(doc: &ClinicalDocument) -> impl Iterator<Item = (usize, &str)> {
    doc.content.lines().enumerate().map(|(i, line)| (i + 1, line))
}

// ============================================================================
// Medications
// ============================================================================

pub struct MedicationRule {
    kb: Arc<ClinicalKnowledgeBase>,
    pattern: Regex,
}

impl MedicationRule {
    /// Baseline confidence for a syntactic medication match.
    const BASE_CONFIDENCE: f64 = 0.85;
    /// Confidence when the knowledge base recognizes the drug.
    const KNOWN_CONFIDENCE: f64 = 0.92;
    /// Hard cap for high-risk agents, applied regardless of dose.
    const HIGH_RISK_CAP: f64 = 0.75;

    pub fn new(kb: Arc<ClinicalKnowledgeBase>) -> Result<Self, regex::Error> {
        let pattern = case_insensitive(
            r"\b(?:started|starting|start|continue|continued|continuing|given|administered|resumed|receiving|recommend)\s+([A-Za-z][A-Za-z-]{2,})\s+(\d+(?:\.\d+)?\s*(?:mg|mcg|g|units?|ml)\b[^,;()\n]*)",
        )?;
        Ok(Self { kb, pattern })
    }
}

impl ExtractionRule for MedicationRule {
    fn name(&self) -> &'static str {
        "medication"
    }

    fn extract(&self, doc: &ClinicalDocument) -> Result<Vec<ClinicalFact>, ExtractionError> {
        let mut facts = Vec::new();

        for (line_no, line) in numbered_lines(doc) {
            for caps in self.pattern.captures_iter(line) {
                let name = caps[1].to_string();
                let dosing = caps[2].trim();
                let text = format!("Medication: {} {}", name, dosing);

                let high_risk = self.kb.is_high_risk_medication(&name);
                let entry = self.kb.classify_medication(&name);

                let confidence = if high_risk {
                    Self::HIGH_RISK_CAP
                } else if entry.is_some() {
                    Self::KNOWN_CONFIDENCE
                } else {
                    Self::BASE_CONFIDENCE
                };

                let medication = match entry {
                    Some(entry) => MedicationContext {
                        drug_class: entry.class.clone(),
                        subclass: entry.subclass.clone(),
                        indications: entry.indications.clone(),
                        monitoring: entry.monitoring.clone(),
                        high_risk,
                    },
                    None => MedicationContext {
                        drug_class: "Unknown".to_string(),
                        subclass: None,
                        indications: Vec::new(),
                        monitoring: Vec::new(),
                        high_risk,
                    },
                };

                let mut fact = ClinicalFact::new(
                    text,
                    &doc.name,
                    line_no,
                    doc.timestamp,
                    confidence,
                    FactType::Medication,
                )?
                .with_normalized(NormalizedValue::Text(name.to_lowercase()))
                .with_medication(medication);

                if high_risk {
                    fact = fact.with_severity(Severity::High).with_review_required();
                }

                facts.push(fact);
            }
        }

        Ok(facts)
    }
}

// ============================================================================
// Lab values
// ============================================================================

pub struct LabValueRule {
    kb: Arc<ClinicalKnowledgeBase>,
    pattern: Regex,
    confidence: f64,
    report_only: bool,
}

impl LabValueRule {
    /// Confidence for labs mentioned inside narrative notes.
    pub const NARRATIVE_CONFIDENCE: f64 = 0.95;
    /// Confidence for structured lab reports.
    pub const REPORT_CONFIDENCE: f64 = 0.97;

    pub fn new(
        kb: Arc<ClinicalKnowledgeBase>,
        confidence: f64,
        report_only: bool,
    ) -> Result<Self, regex::Error> {
        let names = kb
            .lab_names()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("|");
        let pattern = case_insensitive(&format!(
            r"\b({names})\b\s*[:=]?\s*(\d+(?:\.\d+)?)"
        ))?;
        Ok(Self {
            kb,
            pattern,
            confidence,
            report_only,
        })
    }
}

impl ExtractionRule for LabValueRule {
    fn name(&self) -> &'static str {
        "lab_value"
    }

    fn applies_to(&self, doc: &ClinicalDocument) -> bool {
        (doc.doc_type == DocumentType::LabReport) == self.report_only
    }

    fn extract(&self, doc: &ClinicalDocument) -> Result<Vec<ClinicalFact>, ExtractionError> {
        let mut facts = Vec::new();

        for (line_no, line) in numbered_lines(doc) {
            for caps in self.pattern.captures_iter(line) {
                let name = &caps[1];
                let value_text = &caps[2];
                let Ok(value) = value_text.parse::<f64>() else {
                    continue;
                };

                let concept = self.kb.normalize_lab_value(name, value);
                let severity = concept.severity;
                let text = format!("Lab: {} = {} {}", name, value_text, concept.unit)
                    .trim_end()
                    .to_string();

                let mut fact = ClinicalFact::new(
                    text,
                    &doc.name,
                    line_no,
                    doc.timestamp,
                    self.confidence,
                    FactType::LabValue,
                )?
                .with_severity(severity)
                .with_lab(LabContext {
                    normal_range: concept.normal_range,
                    implications: concept.implications.clone(),
                })
                .with_normalized(NormalizedValue::Concept(concept));

                if severity != Severity::Normal && severity != Severity::Unknown {
                    fact = fact.with_review_required();
                }

                facts.push(fact);
            }
        }

        Ok(facts)
    }
}

// ============================================================================
// Clinical scores
// ============================================================================

pub struct ClinicalScoreRule {
    kb: Arc<ClinicalKnowledgeBase>,
    pattern: Regex,
}

impl ClinicalScoreRule {
    const CONFIDENCE: f64 = 0.95;
    /// Confidence after the knowledge base flags the value as out of range.
    const OUT_OF_RANGE_CONFIDENCE: f64 = 0.70;

    pub fn new(kb: Arc<ClinicalKnowledgeBase>) -> Result<Self, regex::Error> {
        let pattern = case_insensitive(
            r"\b(NIHSS|GCS|mRS|Hunt[-\s]?Hess|Fisher(?:\s+Grade)?|WFNS|Spetzler[-\s]?Martin)\b\s*[:=]?\s*(?:grade\s*)?(\d+)",
        )?;
        Ok(Self { kb, pattern })
    }

    fn canonical_name(raw: &str) -> &'static str {
        let lowered = raw.to_ascii_lowercase();
        match lowered.as_str() {
            "nihss" => "NIHSS",
            "gcs" => "GCS",
            "mrs" => "mRS",
            "wfns" => "WFNS",
            s if s.starts_with("hunt") => "Hunt-Hess",
            s if s.starts_with("fisher") => "Fisher",
            _ => "Spetzler-Martin",
        }
    }
}

impl ExtractionRule for ClinicalScoreRule {
    fn name(&self) -> &'static str {
        "clinical_score"
    }

    fn extract(&self, doc: &ClinicalDocument) -> Result<Vec<ClinicalFact>, ExtractionError> {
        let mut facts = Vec::new();

        for (line_no, line) in numbered_lines(doc) {
            for caps in self.pattern.captures_iter(line) {
                let name = Self::canonical_name(&caps[1]);
                let Ok(value) = caps[2].parse::<f64>() else {
                    continue;
                };

                let in_range = self.kb.score_in_range(name, value).unwrap_or(true);
                let confidence = if in_range {
                    Self::CONFIDENCE
                } else {
                    Self::OUT_OF_RANGE_CONFIDENCE
                };

                let mut fact = ClinicalFact::new(
                    format!("{}: {}", name, caps[2].trim()),
                    &doc.name,
                    line_no,
                    doc.timestamp,
                    confidence,
                    FactType::ClinicalScore,
                )?
                .with_normalized(NormalizedValue::Number(value));

                if !in_range {
                    fact = fact.with_review_required();
                }

                facts.push(fact);
            }
        }

        Ok(facts)
    }
}

// ============================================================================
// Vital signs
// ============================================================================

pub struct VitalSignRule {
    patterns: Vec<(&'static str, Regex)>,
}

impl VitalSignRule {
    const CONFIDENCE: f64 = 0.90;

    pub fn new() -> Result<Self, regex::Error> {
        let patterns = vec![
            ("BP", case_insensitive(r"\b(?:BP|blood pressure)\s*[:=]?\s*(\d{2,3}\s*/\s*\d{2,3})")?),
            ("HR", case_insensitive(r"\b(?:HR|heart rate)\s*[:=]?\s*(\d{2,3})\b")?),
            ("RR", case_insensitive(r"\b(?:RR|respiratory rate)\s*[:=]?\s*(\d{1,2})\b")?),
            ("SpO2", case_insensitive(r"\bSpO2\s*[:=]?\s*(\d{1,3})")?),
            ("Temp", case_insensitive(r"\btemp(?:erature)?\s*[:=]?\s*(\d{2}(?:\.\d+)?)")?),
        ];
        Ok(Self { patterns })
    }
}

impl ExtractionRule for VitalSignRule {
    fn name(&self) -> &'static str {
        "vital_sign"
    }

    fn extract(&self, doc: &ClinicalDocument) -> Result<Vec<ClinicalFact>, ExtractionError> {
        let mut facts = Vec::new();

        for (line_no, line) in numbered_lines(doc) {
            for (label, pattern) in &self.patterns {
                for caps in pattern.captures_iter(line) {
                    let value: String = caps[1].chars().filter(|c| !c.is_whitespace()).collect();

                    let normalized = value
                        .parse::<f64>()
                        .ok()
                        .map(NormalizedValue::Number)
                        .unwrap_or_else(|| NormalizedValue::Text(value.clone()));

                    facts.push(
                        ClinicalFact::new(
                            format!("{}: {}", label, value),
                            &doc.name,
                            line_no,
                            doc.timestamp,
                            Self::CONFIDENCE,
                            FactType::VitalSign,
                        )?
                        .with_normalized(normalized),
                    );
                }
            }
        }

        Ok(facts)
    }
}

// ============================================================================
// Temporal references
// ============================================================================

pub struct TemporalReferenceRule {
    kb: Arc<ClinicalKnowledgeBase>,
}

impl TemporalReferenceRule {
    const CONFIDENCE: f64 = 0.80;
    /// Characters of surrounding context preserved for later resolution.
    const CONTEXT_WINDOW: usize = 60;

    pub fn new(kb: Arc<ClinicalKnowledgeBase>) -> Self {
        Self { kb }
    }

    fn surrounding(line: &str, start: usize, end: usize) -> String {
        let from = start.saturating_sub(Self::CONTEXT_WINDOW);
        let to = (end + Self::CONTEXT_WINDOW).min(line.len());
        // Clamp to char boundaries so multi-byte text cannot split a char.
        let from = (0..=from).rev().find(|i| line.is_char_boundary(*i)).unwrap_or(0);
        let to = (to..=line.len()).find(|i| line.is_char_boundary(*i)).unwrap_or(line.len());
        line[from..to].trim().to_string()
    }
}

impl ExtractionRule for TemporalReferenceRule {
    fn name(&self) -> &'static str {
        "temporal_reference"
    }

    fn extract(&self, doc: &ClinicalDocument) -> Result<Vec<ClinicalFact>, ExtractionError> {
        let mut facts = Vec::new();

        for (line_no, line) in numbered_lines(doc) {
            for m in self.kb.temporal_matches(line) {
                facts.push(
                    ClinicalFact::new(
                        m.matched.clone(),
                        &doc.name,
                        line_no,
                        doc.timestamp,
                        Self::CONFIDENCE,
                        FactType::TemporalReference,
                    )?
                    .with_temporal(TemporalContext {
                        kind: m.kind,
                        raw_text: m.matched,
                        surrounding: Self::surrounding(line, m.start, m.end),
                    }),
                );
            }
        }

        Ok(facts)
    }
}

// ============================================================================
// Diagnoses
// ============================================================================

pub struct DiagnosisRule {
    pattern: Regex,
}

impl DiagnosisRule {
    const CONFIDENCE: f64 = 0.90;

    pub fn new() -> Result<Self, regex::Error> {
        let pattern = case_insensitive(r"\b(?:diagnosis|assessment|impression)\s*:\s*(.{3,})")?;
        Ok(Self { pattern })
    }
}

impl ExtractionRule for DiagnosisRule {
    fn name(&self) -> &'static str {
        "diagnosis"
    }

    fn extract(&self, doc: &ClinicalDocument) -> Result<Vec<ClinicalFact>, ExtractionError> {
        let mut facts = Vec::new();

        for (line_no, line) in numbered_lines(doc) {
            if let Some(caps) = self.pattern.captures(line) {
                facts.push(ClinicalFact::new(
                    format!("Diagnosis: {}", caps[1].trim()),
                    &doc.name,
                    line_no,
                    doc.timestamp,
                    Self::CONFIDENCE,
                    FactType::Diagnosis,
                )?);
            }
        }

        Ok(facts)
    }
}

// ============================================================================
// Operative notes
// ============================================================================

pub struct OperativeNoteRule {
    procedure: Regex,
    findings: Regex,
    complications: Regex,
    negated_complications: Regex,
}

impl OperativeNoteRule {
    const PROCEDURE_CONFIDENCE: f64 = 0.95;
    const FINDING_CONFIDENCE: f64 = 0.92;
    const COMPLICATION_CONFIDENCE: f64 = 0.90;

    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            procedure: case_insensitive(r"\bprocedure(?:\s+performed)?\s*:\s*(.{3,})")?,
            findings: case_insensitive(r"\bfindings?\s*:\s*(.{3,})")?,
            complications: case_insensitive(r"\bcomplications?\s*:\s*(.+)")?,
            negated_complications: case_insensitive(
                r"(?:without complication|no complication)",
            )?,
        })
    }
}

impl ExtractionRule for OperativeNoteRule {
    fn name(&self) -> &'static str {
        "operative_note"
    }

    fn applies_to(&self, doc: &ClinicalDocument) -> bool {
        doc.doc_type == DocumentType::Operative
    }

    fn extract(&self, doc: &ClinicalDocument) -> Result<Vec<ClinicalFact>, ExtractionError> {
        let mut facts = Vec::new();

        for (line_no, line) in numbered_lines(doc) {
            if let Some(caps) = self.procedure.captures(line) {
                facts.push(
                    ClinicalFact::new(
                        format!("Procedure: {}", caps[1].trim()),
                        &doc.name,
                        line_no,
                        doc.timestamp,
                        Self::PROCEDURE_CONFIDENCE,
                        FactType::Procedure,
                    )?
                    .with_severity(Severity::High),
                );
            }

            if let Some(caps) = self.findings.captures(line) {
                facts.push(ClinicalFact::new(
                    format!("Finding: {}", caps[1].trim()),
                    &doc.name,
                    line_no,
                    doc.timestamp,
                    Self::FINDING_CONFIDENCE,
                    FactType::Finding,
                )?);
            }

            if let Some(caps) = self.complications.captures(line) {
                let detail = caps[1].trim();
                let negated = detail.eq_ignore_ascii_case("none")
                    || detail.eq_ignore_ascii_case("none.")
                    || self.negated_complications.is_match(line);

                if negated {
                    facts.push(ClinicalFact::new(
                        "No complications reported",
                        &doc.name,
                        line_no,
                        doc.timestamp,
                        Self::FINDING_CONFIDENCE,
                        FactType::Finding,
                    )?);
                } else {
                    facts.push(
                        ClinicalFact::new(
                            format!("Complication: {}", detail),
                            &doc.name,
                            line_no,
                            doc.timestamp,
                            Self::COMPLICATION_CONFIDENCE,
                            FactType::Complication,
                        )?
                        .with_severity(Severity::High)
                        .with_review_required(),
                    );
                }
            } else if self.negated_complications.is_match(line) {
                // Narrative "completed without complications" statements,
                // kept as findings so contradiction detection can see them.
                facts.push(ClinicalFact::new(
                    line.trim(),
                    &doc.name,
                    line_no,
                    doc.timestamp,
                    Self::FINDING_CONFIDENCE,
                    FactType::Finding,
                )?);
            }
        }

        Ok(facts)
    }
}

// ============================================================================
// Consult notes
// ============================================================================

pub struct ConsultNoteRule {
    bullet: Regex,
    inline: Regex,
    antibiotics: Regex,
    prophylaxis: Regex,
}

impl ConsultNoteRule {
    const CONFIDENCE: f64 = 0.88;

    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            bullet: Regex::new(r"^\s*(?:\d+\.|[-*•])\s+(.{3,})$")?,
            inline: case_insensitive(r"\brecommendations?\s*:\s*(.{3,})")?,
            antibiotics: case_insensitive(r"\bantibiotic[^:]*:\s*(.{3,})")?,
            prophylaxis: case_insensitive(r"\b(?:DVT prophylaxis|anticoagulation)\s*:\s*(.{3,})")?,
        })
    }

    fn specialty_matches(doc: &ClinicalDocument, needles: &[&str]) -> bool {
        doc.specialty
            .as_deref()
            .map(str::to_ascii_lowercase)
            .is_some_and(|s| needles.iter().any(|n| s.contains(n)))
    }
}

impl ExtractionRule for ConsultNoteRule {
    fn name(&self) -> &'static str {
        "consult_note"
    }

    fn applies_to(&self, doc: &ClinicalDocument) -> bool {
        doc.doc_type == DocumentType::Consult
    }

    fn extract(&self, doc: &ClinicalDocument) -> Result<Vec<ClinicalFact>, ExtractionError> {
        let mut facts = Vec::new();
        let infectious = Self::specialty_matches(doc, &["infectious"]);
        let thrombosis = Self::specialty_matches(doc, &["thrombosis", "hematology"]);

        for (line_no, line) in numbered_lines(doc) {
            let mut push = |text: String| -> Result<(), ExtractionError> {
                facts.push(ClinicalFact::new(
                    text,
                    &doc.name,
                    line_no,
                    doc.timestamp,
                    Self::CONFIDENCE,
                    FactType::Recommendation,
                )?);
                Ok(())
            };

            if infectious {
                if let Some(caps) = self.antibiotics.captures(line) {
                    push(format!("ID recommendation: {}", caps[1].trim()))?;
                    continue;
                }
            }

            if thrombosis {
                if let Some(caps) = self.prophylaxis.captures(line) {
                    push(format!("Thrombosis recommendation: {}", caps[1].trim()))?;
                    continue;
                }
            }

            if let Some(caps) = self.bullet.captures(line) {
                push(format!("Recommendation: {}", caps[1].trim()))?;
            } else if let Some(caps) = self.inline.captures(line) {
                let detail = caps[1].trim();
                if !detail.is_empty() {
                    push(format!("Recommendation: {}", detail))?;
                }
            }
        }

        Ok(facts)
    }
}
