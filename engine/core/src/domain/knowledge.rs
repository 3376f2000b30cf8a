// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Clinical Knowledge Base
//!
//! Static lookup tables for the neurosurgical service line: lab reference
//! ranges and critical thresholds, medication classes with monitoring
//! requirements, clinical-score valid ranges, per-drug dose ceilings, and
//! the temporal-phrase taxonomy. No state.
//!
//! The tables are configuration, not code: they deserialize from YAML
//! (`data/clinical.yaml` ships as the built-in default) so the rules can
//! evolve without touching the extraction or validation logic.

use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::fact::{ClinicalConcept, Severity, TemporalKind};
use crate::domain::timeline::{LabSignificance, LabTrendAnalysis, Trend};
use crate::domain::uncertainty::UncertaintySeverity;

const BUILTIN_TABLES: &str = include_str!("../../data/clinical.yaml");

/// Reference range and critical thresholds for one lab analyte.
#[derive(Debug, Clone, Deserialize)]
pub struct LabRange {
    pub range: (f64, f64),
    pub unit: String,
    pub critical_low: f64,
    pub critical_high: f64,
    #[serde(default)]
    pub implications: BTreeMap<String, String>,
}

/// Classification entry for one medication.
#[derive(Debug, Clone, Deserialize)]
pub struct MedicationEntry {
    pub class: String,
    #[serde(default)]
    pub subclass: Option<String>,
    #[serde(default)]
    pub indications: Vec<String>,
    #[serde(default)]
    pub contraindications: Vec<String>,
    #[serde(default)]
    pub monitoring: Vec<String>,
    #[serde(default)]
    pub high_risk: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct TemporalPatternSpec {
    pattern: String,
    kind: TemporalKind,
}

#[derive(Debug, Clone, Deserialize)]
struct KnowledgeTables {
    labs: BTreeMap<String, LabRange>,
    medications: BTreeMap<String, MedicationEntry>,
    #[serde(default)]
    high_risk_name_patterns: Vec<String>,
    score_ranges: BTreeMap<String, (f64, f64)>,
    #[serde(default)]
    dose_ceilings: BTreeMap<String, f64>,
    temporal_patterns: Vec<TemporalPatternSpec>,
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("knowledge tables failed to parse: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid temporal pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },
}

/// A recognized temporal phrase inside a text span.
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalMatch {
    pub kind: TemporalKind,
    pub matched: String,
    pub start: usize,
    pub end: usize,
}

/// A knowledge-base medication interaction finding.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionWarning {
    pub severity: UncertaintySeverity,
    pub description: String,
    pub recommendation: String,
}

/// Immutable clinical lookup tables plus the compiled temporal taxonomy.
pub struct ClinicalKnowledgeBase {
    labs: BTreeMap<String, LabRange>,
    medications: BTreeMap<String, MedicationEntry>,
    high_risk_name_patterns: Vec<String>,
    score_ranges: BTreeMap<String, (f64, f64)>,
    dose_ceilings: BTreeMap<String, f64>,
    temporal: Vec<(Regex, TemporalKind)>,
}

impl ClinicalKnowledgeBase {
    /// Loads the built-in neurosurgical tables shipped with the crate.
    pub fn builtin() -> Result<Self, KnowledgeError> {
        Self::from_yaml(BUILTIN_TABLES)
    }

    /// Loads custom tables, e.g. a site-specific override file.
    pub fn from_yaml(yaml: &str) -> Result<Self, KnowledgeError> {
        let tables: KnowledgeTables = serde_yaml::from_str(yaml)?;

        let mut temporal = Vec::with_capacity(tables.temporal_patterns.len());
        for spec in &tables.temporal_patterns {
            let regex = RegexBuilder::new(&spec.pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| KnowledgeError::Pattern {
                    pattern: spec.pattern.clone(),
                    source,
                })?;
            temporal.push((regex, spec.kind));
        }

        Ok(Self {
            labs: tables.labs,
            medications: tables.medications,
            high_risk_name_patterns: tables.high_risk_name_patterns,
            score_ranges: tables.score_ranges,
            dose_ceilings: tables.dose_ceilings,
            temporal,
        })
    }

    // ── Lab interpretation ───────────────────────────────────────────────────

    pub fn lab_names(&self) -> impl Iterator<Item = &str> {
        self.labs.keys().map(String::as_str)
    }

    /// Normalizes a lab value into a [`ClinicalConcept`] with severity and
    /// clinical implications. Critical thresholds are inclusive, so boundary
    /// values grade as critical.
    pub fn normalize_lab_value(&self, lab_name: &str, value: f64) -> ClinicalConcept {
        let key = lab_name.to_ascii_lowercase();

        let Some(lab) = self.labs.get(&key) else {
            return ClinicalConcept {
                kind: "lab".to_string(),
                name: lab_name.to_string(),
                value,
                unit: String::new(),
                normal_range: None,
                severity: Severity::Unknown,
                implications: Vec::new(),
            };
        };

        let (severity, implication_key) = if value <= lab.critical_low {
            (Severity::Critical, Some("critical_low"))
        } else if value >= lab.critical_high {
            (Severity::Critical, Some("critical_high"))
        } else if value < lab.range.0 {
            (Severity::Low, Some("low"))
        } else if value > lab.range.1 {
            (Severity::High, Some("high"))
        } else {
            (Severity::Normal, None)
        };

        let implications = implication_key
            .and_then(|k| lab.implications.get(k))
            .map(|s| vec![s.clone()])
            .unwrap_or_default();

        ClinicalConcept {
            kind: "lab".to_string(),
            name: lab_name.to_string(),
            value,
            unit: lab.unit.clone(),
            normal_range: Some(lab.range),
            severity,
            implications,
        }
    }

    /// Interprets a series of lab values over time against the normal range.
    /// Less than two points is insufficient data; a relative change under
    /// 10% reads as stable.
    pub fn interpret_lab_trend(
        &self,
        lab_name: &str,
        points: &[(chrono::NaiveDate, f64)],
    ) -> LabTrendAnalysis {
        if points.len() < 2 {
            return LabTrendAnalysis {
                trend: Trend::InsufficientData,
                clinical_significance: LabSignificance::InsufficientData,
                first_value: 0.0,
                last_value: 0.0,
                change_percent: 0.0,
            };
        }

        let mut sorted: Vec<_> = points.to_vec();
        sorted.sort_by_key(|(date, _)| *date);
        let first = sorted[0].1;
        let last = sorted[sorted.len() - 1].1;

        let relative_change = if first != 0.0 {
            ((last - first) / first).abs()
        } else {
            0.0
        };

        let trend = if relative_change < 0.1 {
            Trend::Stable
        } else if last > first {
            Trend::Increasing
        } else {
            Trend::Decreasing
        };

        let significance = match self.labs.get(&lab_name.to_ascii_lowercase()) {
            Some(lab) => {
                let in_range = |v: f64| lab.range.0 <= v && v <= lab.range.1;
                match (in_range(first), in_range(last)) {
                    (false, true) => LabSignificance::ImprovingToNormal,
                    (true, false) => LabSignificance::WorseningFromNormal,
                    _ => trend_significance(trend),
                }
            }
            None => trend_significance(trend),
        };

        LabTrendAnalysis {
            trend,
            clinical_significance: significance,
            first_value: first,
            last_value: last,
            change_percent: relative_change * 100.0,
        }
    }

    // ── Medication classification ────────────────────────────────────────────

    /// Classifies a medication mention. Longest table key wins so that e.g.
    /// `enoxaparin` does not resolve through the `heparin` entry.
    pub fn classify_medication(&self, med_name: &str) -> Option<&MedicationEntry> {
        let med_lower = med_name.to_ascii_lowercase();

        let mut best: Option<(&String, &MedicationEntry)> = None;
        for (key, entry) in &self.medications {
            if med_lower.contains(key.as_str()) {
                match best {
                    Some((current, _)) if current.len() >= key.len() => {}
                    _ => best = Some((key, entry)),
                }
            }
        }
        best.map(|(_, entry)| entry)
    }

    /// High-risk medications: anticoagulants, opioids, and the named agents
    /// in the pattern list. These are capped in confidence and always
    /// flagged for review regardless of dose.
    pub fn is_high_risk_medication(&self, med_name: &str) -> bool {
        if self
            .classify_medication(med_name)
            .is_some_and(|entry| entry.high_risk)
        {
            return true;
        }

        let med_lower = med_name.to_ascii_lowercase();
        self.high_risk_name_patterns
            .iter()
            .any(|pattern| med_lower.contains(pattern.as_str()))
    }

    /// Single-administration dose ceiling for validation stage 2.
    pub fn dose_ceiling(&self, med_name: &str) -> Option<f64> {
        let med_lower = med_name.to_ascii_lowercase();
        self.dose_ceilings
            .iter()
            .find(|(key, _)| med_lower.contains(key.as_str()))
            .map(|(_, ceiling)| *ceiling)
    }

    /// Knowledge-base interaction checks over the medications seen in a run:
    /// any anticoagulant in a neurosurgical patient, and stacked opioids.
    pub fn medication_interactions(&self, med_names: &[String]) -> Vec<InteractionWarning> {
        let mut warnings = Vec::new();

        let has_anticoagulant = med_names.iter().any(|med| {
            self.classify_medication(med)
                .is_some_and(|entry| entry.class == "Anticoagulant")
        });

        if has_anticoagulant {
            warnings.push(InteractionWarning {
                severity: UncertaintySeverity::High,
                description:
                    "Anticoagulant use in neurosurgical patient - verify appropriateness"
                        .to_string(),
                recommendation: "Review timing of anticoagulation initiation post-surgery"
                    .to_string(),
            });
        }

        let opioid_count = med_names
            .iter()
            .filter(|med| {
                self.classify_medication(med)
                    .is_some_and(|entry| entry.class.to_ascii_lowercase().contains("opioid"))
            })
            .count();

        if opioid_count > 1 {
            warnings.push(InteractionWarning {
                severity: UncertaintySeverity::Medium,
                description: "Multiple opioid medications".to_string(),
                recommendation: "Monitor for excessive sedation and respiratory depression"
                    .to_string(),
            });
        }

        warnings
    }

    // ── Clinical scores ──────────────────────────────────────────────────────

    pub fn score_range(&self, score_name: &str) -> Option<(f64, f64)> {
        self.score_ranges.get(score_name).copied()
    }

    /// `None` for unknown scores (cannot validate), otherwise whether the
    /// value sits inside the valid range.
    pub fn score_in_range(&self, score_name: &str, value: f64) -> Option<bool> {
        self.score_range(score_name)
            .map(|(min, max)| min <= value && value <= max)
    }

    // ── Temporal taxonomy ────────────────────────────────────────────────────

    /// All temporal phrases recognized inside a text span, in match order.
    pub fn temporal_matches(&self, text: &str) -> Vec<TemporalMatch> {
        let mut matches = Vec::new();
        for (regex, kind) in &self.temporal {
            for m in regex.find_iter(text) {
                // A longer phrase may already cover this span ("the
                // following day" vs a bare "day" offset match).
                let overlaps = matches
                    .iter()
                    .any(|prior: &TemporalMatch| m.start() < prior.end && prior.start < m.end());
                if !overlaps {
                    matches.push(TemporalMatch {
                        kind: *kind,
                        matched: m.as_str().to_string(),
                        start: m.start(),
                        end: m.end(),
                    });
                }
            }
        }
        matches.sort_by_key(|m| m.start);
        matches
    }
}

fn trend_significance(trend: Trend) -> LabSignificance {
    match trend {
        Trend::Stable => LabSignificance::Stable,
        Trend::Increasing => LabSignificance::Increasing,
        Trend::Decreasing => LabSignificance::Decreasing,
        _ => LabSignificance::InsufficientData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn kb() -> ClinicalKnowledgeBase {
        ClinicalKnowledgeBase::builtin().unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 11, day).unwrap()
    }

    // ── Lab normalization ─────────────────────────────────────────────────────

    #[test]
    fn test_sodium_120_is_critical() {
        let concept = kb().normalize_lab_value("sodium", 120.0);
        assert_eq!(concept.severity, Severity::Critical);
        assert_eq!(concept.normal_range, Some((135.0, 145.0)));
        assert!(concept.implications[0].contains("seizures"));
    }

    #[test]
    fn test_sodium_boundary_values() {
        let kb = kb();
        assert_eq!(kb.normalize_lab_value("sodium", 125.0).severity, Severity::Critical);
        assert_eq!(kb.normalize_lab_value("sodium", 155.0).severity, Severity::Critical);
        assert_eq!(kb.normalize_lab_value("sodium", 130.0).severity, Severity::Low);
        assert_eq!(kb.normalize_lab_value("sodium", 150.0).severity, Severity::High);
        assert_eq!(kb.normalize_lab_value("sodium", 140.0).severity, Severity::Normal);
    }

    #[test]
    fn test_unknown_lab_is_unknown_severity() {
        let concept = kb().normalize_lab_value("troponin", 0.4);
        assert_eq!(concept.severity, Severity::Unknown);
        assert_eq!(concept.normal_range, None);
    }

    // ── Medications ───────────────────────────────────────────────────────────

    #[test]
    fn test_classify_known_medication() {
        let kb = kb();
        let entry = kb.classify_medication("nimodipine 60mg q4h").unwrap();
        assert_eq!(entry.class, "Calcium Channel Blocker");
        assert!(entry.monitoring.contains(&"Blood pressure".to_string()));
    }

    #[test]
    fn test_enoxaparin_does_not_resolve_through_heparin() {
        let kb = kb();
        let entry = kb.classify_medication("enoxaparin 40mg SQ").unwrap();
        assert_eq!(entry.subclass.as_deref(), Some("Low molecular weight heparin"));
    }

    #[test]
    fn test_high_risk_detection() {
        let kb = kb();
        assert!(kb.is_high_risk_medication("heparin 5000 units"));
        assert!(kb.is_high_risk_medication("insulin sliding scale"));
        assert!(!kb.is_high_risk_medication("cefazolin 2g"));
        assert!(!kb.is_high_risk_medication("acetaminophen 650mg"));
    }

    #[test]
    fn test_anticoagulant_interaction_flagged() {
        let warnings = kb().medication_interactions(&["heparin 5000 units".to_string()]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, UncertaintySeverity::High);
        assert!(warnings[0].description.to_lowercase().contains("anticoagulant"));
    }

    #[test]
    fn test_multiple_opioids_flagged() {
        let warnings = kb().medication_interactions(&[
            "morphine 2mg IV".to_string(),
            "fentanyl 25mcg".to_string(),
        ]);
        assert!(warnings
            .iter()
            .any(|w| w.description.contains("Multiple opioid")));
    }

    // ── Scores ────────────────────────────────────────────────────────────────

    #[test]
    fn test_score_ranges() {
        let kb = kb();
        assert_eq!(kb.score_in_range("NIHSS", 6.0), Some(true));
        assert_eq!(kb.score_in_range("NIHSS", 99.0), Some(false));
        assert_eq!(kb.score_in_range("GCS", 2.0), Some(false));
        assert_eq!(kb.score_in_range("APACHE", 20.0), None);
    }

    // ── Temporal taxonomy ─────────────────────────────────────────────────────

    #[test]
    fn test_temporal_taxonomy_matches() {
        let kb = kb();

        let pod = kb.temporal_matches("POD#3: Patient developed vasospasm");
        assert_eq!(pod[0].kind, TemporalKind::PostOperativeDay);
        assert_eq!(pod[0].matched, "POD#3");

        let mixed = kb.temporal_matches("Overnight patient had confusion. Yesterday was stable.");
        let kinds: Vec<_> = mixed.iter().map(|m| m.kind).collect();
        assert!(kinds.contains(&TemporalKind::NextMorning));
        assert!(kinds.contains(&TemporalKind::PreviousDay));

        let hours = kb.temporal_matches("2 hours after the procedure");
        assert_eq!(hours[0].kind, TemporalKind::HoursAfter);
    }

    // ── Lab trends ────────────────────────────────────────────────────────────

    #[test]
    fn test_lab_trend_improving_to_normal() {
        let analysis = kb().interpret_lab_trend("sodium", &[(d(1), 125.0), (d(3), 140.0)]);
        assert_eq!(analysis.trend, Trend::Increasing);
        assert_eq!(analysis.clinical_significance, LabSignificance::ImprovingToNormal);
        assert_eq!(analysis.first_value, 125.0);
        assert_eq!(analysis.last_value, 140.0);
    }

    #[test]
    fn test_lab_trend_insufficient_data() {
        let analysis = kb().interpret_lab_trend("sodium", &[(d(1), 140.0)]);
        assert_eq!(analysis.trend, Trend::InsufficientData);
    }

    #[test]
    fn test_lab_trend_stable_under_ten_percent() {
        let analysis = kb().interpret_lab_trend("sodium", &[(d(1), 138.0), (d(2), 140.0)]);
        assert_eq!(analysis.trend, Trend::Stable);
        assert_eq!(analysis.clinical_significance, LabSignificance::Stable);
    }
}
