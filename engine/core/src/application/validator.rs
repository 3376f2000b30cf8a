// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Six-Stage Validation Pipeline
//!
//! Always runs all six stages in order, never short-circuiting — the
//! completeness stage needs full context even when earlier stages found
//! problems. Stage 1 is the only stage that removes facts; stages 2–6
//! annotate and report through [`ClinicalUncertainty`] values, never by
//! raising errors.
//!
//! | Stage | Check |
//! |-------|-------|
//! | 1 | Format: empty fact text |
//! | 2 | Clinical rules: critical labs, score ranges, dose ceilings |
//! | 3 | Temporal: discharge before admission, documentation gaps |
//! | 4 | Cross-fact: conflicting scores, medication interactions |
//! | 5 | Contradictions: statements vs documented course |
//! | 6 | Completeness: diagnosis, procedure, discharge plan |

use chrono::Duration;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::fact::{ClinicalFact, FactType, Severity};
use crate::domain::knowledge::ClinicalKnowledgeBase;
use crate::domain::timeline::ClinicalTimeline;
use crate::domain::uncertainty::{
    ClinicalUncertainty, UncertaintyKind, UncertaintySeverity, ValidationSummary,
};

/// Gap length between documented days that triggers a finding.
const MAX_DOCUMENTATION_GAP_DAYS: i64 = 3;
/// Window (hours) within which two differing scores count as conflicting.
const SCORE_CONFLICT_WINDOW_HOURS: i64 = 1;
/// How close (hours) a critical lab must be to a discharge-stability
/// statement to contradict it.
const DISCHARGE_LOOKBACK_HOURS: i64 = 72;

pub struct Validator {
    kb: Arc<ClinicalKnowledgeBase>,
    dose_pattern: Regex,
    revision_pattern: Regex,
}

impl Validator {
    pub fn new(kb: Arc<ClinicalKnowledgeBase>) -> Result<Self, regex::Error> {
        Ok(Self {
            kb,
            dose_pattern: Regex::new(r"(\d+(?:\.\d+)?)")?,
            revision_pattern: Regex::new(r"(?i)\b(?:revision|re-?exploration|repair)\b")?,
        })
    }

    /// Runs the full pipeline. Returns the stage-1 survivors and every
    /// uncertainty the six stages produced, in stage order.
    pub fn validate(
        &self,
        facts: &[ClinicalFact],
        timeline: &ClinicalTimeline,
    ) -> (Vec<ClinicalFact>, Vec<ClinicalUncertainty>) {
        let mut uncertainties = Vec::new();

        let validated = self.validate_format(facts, &mut uncertainties);
        self.validate_clinical_rules(&validated, &mut uncertainties);
        self.validate_temporal_consistency(timeline, &mut uncertainties);
        self.validate_cross_facts(&validated, &mut uncertainties);
        self.detect_contradictions(&validated, &mut uncertainties);
        self.check_completeness(&validated, timeline, &mut uncertainties);

        tracing::info!(
            facts = validated.len(),
            uncertainties = uncertainties.len(),
            high = uncertainties
                .iter()
                .filter(|u| u.severity == UncertaintySeverity::High)
                .count(),
            "validation pipeline complete"
        );

        (validated, uncertainties)
    }

    pub fn summary(&self, uncertainties: &[ClinicalUncertainty]) -> ValidationSummary {
        ValidationSummary::from_uncertainties(uncertainties)
    }

    // ── Stage 1: format ──────────────────────────────────────────────────────

    fn validate_format(
        &self,
        facts: &[ClinicalFact],
        uncertainties: &mut Vec<ClinicalUncertainty>,
    ) -> Vec<ClinicalFact> {
        let mut validated = Vec::with_capacity(facts.len());

        for fact in facts {
            if fact.text.trim().is_empty() {
                uncertainties.push(
                    ClinicalUncertainty::new(
                        UncertaintyKind::MalformedFact,
                        UncertaintySeverity::Medium,
                        format!(
                            "Empty fact text from {} line {}",
                            fact.source_doc, fact.source_line
                        ),
                    )
                    .with_facts(vec![fact.id]),
                );
                continue;
            }
            // Confidence bounds are enforced at construction, not here.
            validated.push(fact.clone());
        }

        validated
    }

    // ── Stage 2: clinical rules ──────────────────────────────────────────────

    fn validate_clinical_rules(
        &self,
        facts: &[ClinicalFact],
        uncertainties: &mut Vec<ClinicalUncertainty>,
    ) {
        for fact in facts {
            match fact.fact_type {
                FactType::LabValue => {
                    let Some(concept) = fact.normalized.as_ref().and_then(|n| n.as_concept())
                    else {
                        continue;
                    };
                    if concept.severity == Severity::Critical {
                        uncertainties.push(
                            ClinicalUncertainty::new(
                                UncertaintyKind::CriticalLabValue,
                                UncertaintySeverity::High,
                                format!(
                                    "Critical lab value: {} = {} {}",
                                    concept.name, concept.value, concept.unit
                                ),
                            )
                            .with_facts(vec![fact.id])
                            .with_resolution("Verify value and confirm clinical response"),
                        );
                    }
                }

                FactType::ClinicalScore => {
                    let Some(name) = fact.text.split(':').next().map(str::trim) else {
                        continue;
                    };
                    let Some(value) = fact.normalized.as_ref().and_then(|n| n.as_number())
                    else {
                        continue;
                    };
                    if self.kb.score_in_range(name, value) == Some(false) {
                        let range = self.kb.score_range(name).unwrap_or((0.0, 0.0));
                        uncertainties.push(
                            ClinicalUncertainty::new(
                                UncertaintyKind::InvalidScoreRange,
                                UncertaintySeverity::High,
                                format!(
                                    "{} score {} outside valid range [{}-{}]",
                                    name, value, range.0, range.1
                                ),
                            )
                            .with_facts(vec![fact.id])
                            .with_resolution("Confirm score against the source note"),
                        );
                    }
                }

                FactType::Medication => {
                    self.check_dose_ceiling(fact, uncertainties);
                }

                _ => {}
            }
        }
    }

    fn check_dose_ceiling(
        &self,
        fact: &ClinicalFact,
        uncertainties: &mut Vec<ClinicalUncertainty>,
    ) {
        let Some(ceiling) = self.kb.dose_ceiling(&fact.text) else {
            return;
        };
        let Some(dose) = self
            .dose_pattern
            .captures(&fact.text)
            .and_then(|caps| caps[1].parse::<f64>().ok())
        else {
            return;
        };

        if dose > ceiling {
            uncertainties.push(
                ClinicalUncertainty::new(
                    UncertaintyKind::ExcessiveMedicationDose,
                    UncertaintySeverity::High,
                    format!(
                        "Dose in '{}' exceeds the ceiling of {} for this agent",
                        fact.text, ceiling
                    ),
                )
                .with_facts(vec![fact.id])
                .with_resolution("Verify dose and units against the order"),
            );
        }
    }

    // ── Stage 3: temporal consistency ────────────────────────────────────────

    fn validate_temporal_consistency(
        &self,
        timeline: &ClinicalTimeline,
        uncertainties: &mut Vec<ClinicalUncertainty>,
    ) {
        if let (Some(admission), Some(discharge)) =
            (timeline.admission_date, timeline.discharge_date)
        {
            if discharge < admission {
                uncertainties.push(
                    ClinicalUncertainty::new(
                        UncertaintyKind::TemporalInconsistency,
                        UncertaintySeverity::High,
                        format!(
                            "Discharge ({}) dated before admission ({})",
                            discharge, admission
                        ),
                    )
                    .with_resolution("Verify document timestamps"),
                );
            }
        }

        let dates: Vec<_> = timeline.days.keys().copied().collect();
        for pair in dates.windows(2) {
            let gap = (pair[1] - pair[0]).num_days();
            if gap > MAX_DOCUMENTATION_GAP_DAYS {
                uncertainties.push(
                    ClinicalUncertainty::new(
                        UncertaintyKind::DocumentationGap,
                        UncertaintySeverity::Medium,
                        format!(
                            "{}-day gap in documentation between {} and {}",
                            gap, pair[0], pair[1]
                        ),
                    )
                    .with_resolution("Confirm no notes are missing for the interval"),
                );
            }
        }
    }

    // ── Stage 4: cross-fact consistency ──────────────────────────────────────

    fn validate_cross_facts(
        &self,
        facts: &[ClinicalFact],
        uncertainties: &mut Vec<ClinicalUncertainty>,
    ) {
        // Same score reported with different values inside the window.
        let mut scores: BTreeMap<&str, Vec<&ClinicalFact>> = BTreeMap::new();
        for fact in facts {
            if fact.fact_type == FactType::ClinicalScore {
                if let Some(name) = fact.text.split(':').next().map(str::trim) {
                    scores.entry(name).or_default().push(fact);
                }
            }
        }

        for (name, mut group) in scores {
            group.sort_by_key(|f| f.effective_timestamp());
            for pair in group.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                let close_in_time = b.effective_timestamp() - a.effective_timestamp()
                    <= Duration::hours(SCORE_CONFLICT_WINDOW_HOURS);
                let differing = match (
                    a.normalized.as_ref().and_then(|n| n.as_number()),
                    b.normalized.as_ref().and_then(|n| n.as_number()),
                ) {
                    (Some(x), Some(y)) => x != y,
                    _ => false,
                };

                if close_in_time && differing {
                    uncertainties.push(
                        ClinicalUncertainty::new(
                            UncertaintyKind::ConflictingInformation,
                            UncertaintySeverity::High,
                            format!(
                                "{} reported with conflicting values ('{}' vs '{}') within one hour",
                                name, a.text, b.text
                            ),
                        )
                        .with_facts(vec![a.id, b.id])
                        .with_resolution("Reconcile against both source notes"),
                    );
                }
            }
        }

        // Knowledge-base interaction checks over the medications in the run.
        let med_names: Vec<String> = facts
            .iter()
            .filter(|f| f.fact_type == FactType::Medication)
            .map(|f| f.text.clone())
            .collect();

        for warning in self.kb.medication_interactions(&med_names) {
            uncertainties.push(
                ClinicalUncertainty::new(
                    UncertaintyKind::MedicationInteraction,
                    warning.severity,
                    warning.description,
                )
                .with_resolution(warning.recommendation),
            );
        }
    }

    // ── Stage 5: contradiction detection ─────────────────────────────────────

    fn detect_contradictions(
        &self,
        facts: &[ClinicalFact],
        uncertainties: &mut Vec<ClinicalUncertainty>,
    ) {
        // "No complications" statements vs later documented complications.
        let negations: Vec<&ClinicalFact> = facts
            .iter()
            .filter(|f| {
                let text = f.text.to_ascii_lowercase();
                text.contains("no complication") || text.contains("without complication")
            })
            .collect();

        let complications: Vec<&ClinicalFact> = facts
            .iter()
            .filter(|f| f.fact_type == FactType::Complication)
            .collect();

        for negation in &negations {
            for complication in &complications {
                if complication.effective_timestamp() >= negation.effective_timestamp() {
                    uncertainties.push(
                        ClinicalUncertainty::new(
                            UncertaintyKind::ContradictoryStatements,
                            UncertaintySeverity::High,
                            format!(
                                "'no complications' statement ('{}') contradicted by later documented complication ('{}')",
                                negation.text, complication.text
                            ),
                        )
                        .with_facts(vec![negation.id, complication.id])
                        .with_resolution("Review both notes and amend the record"),
                    );
                }
            }
        }

        // Completed procedure followed by a revision or repair.
        let mut procedures: Vec<&ClinicalFact> = facts
            .iter()
            .filter(|f| f.fact_type == FactType::Procedure)
            .collect();
        procedures.sort_by_key(|f| f.effective_timestamp());

        for (i, earlier) in procedures.iter().enumerate() {
            if self.revision_pattern.is_match(&earlier.text) {
                continue;
            }
            for later in &procedures[i + 1..] {
                if self.revision_pattern.is_match(&later.text) {
                    uncertainties.push(
                        ClinicalUncertainty::new(
                            UncertaintyKind::ContradictoryOutcomes,
                            UncertaintySeverity::Medium,
                            format!(
                                "Completed procedure ('{}') followed by revision procedure ('{}')",
                                earlier.text, later.text
                            ),
                        )
                        .with_facts(vec![earlier.id, later.id])
                        .with_resolution("Confirm the operative course and outcomes"),
                    );
                }
            }
        }

        // Discharge-stability statements near a critical lab value.
        let stability_statements: Vec<&ClinicalFact> = facts
            .iter()
            .filter(|f| {
                let text = f.text.to_ascii_lowercase();
                text.contains("stable")
                    && (text.contains("discharge")
                        || f.source_doc.to_ascii_lowercase().contains("discharge"))
            })
            .collect();

        let critical_labs: Vec<&ClinicalFact> = facts
            .iter()
            .filter(|f| {
                f.fact_type == FactType::LabValue && f.severity == Some(Severity::Critical)
            })
            .collect();

        for statement in &stability_statements {
            for lab in &critical_labs {
                let delta = statement.effective_timestamp() - lab.effective_timestamp();
                if delta >= Duration::zero() && delta <= Duration::hours(DISCHARGE_LOOKBACK_HOURS) {
                    uncertainties.push(
                        ClinicalUncertainty::new(
                            UncertaintyKind::DischargeStatusContradiction,
                            UncertaintySeverity::High,
                            format!(
                                "Stable-for-discharge statement ('{}') conflicts with critical lab value ('{}') from the preceding 72 hours",
                                statement.text, lab.text
                            ),
                        )
                        .with_facts(vec![statement.id, lab.id])
                        .with_resolution("Re-check the lab before discharge"),
                    );
                }
            }
        }
    }

    // ── Stage 6: completeness ────────────────────────────────────────────────

    fn check_completeness(
        &self,
        facts: &[ClinicalFact],
        timeline: &ClinicalTimeline,
        uncertainties: &mut Vec<ClinicalUncertainty>,
    ) {
        let has = |fact_type: FactType| facts.iter().any(|f| f.fact_type == fact_type);

        if !has(FactType::Diagnosis) {
            uncertainties.push(
                ClinicalUncertainty::new(
                    UncertaintyKind::MissingInformation,
                    UncertaintySeverity::High,
                    "No diagnosis documented in the record",
                )
                .with_resolution("Add a primary diagnosis"),
            );
        }

        if !has(FactType::Procedure) {
            // A surgery anchor means an operation happened but no operative
            // detail was captured — that is a harder miss.
            let severity = if timeline.surgery_anchors().next().is_some() {
                UncertaintySeverity::High
            } else {
                UncertaintySeverity::Medium
            };
            uncertainties.push(
                ClinicalUncertainty::new(
                    UncertaintyKind::MissingInformation,
                    severity,
                    "No procedure documented in the record",
                )
                .with_resolution("Confirm whether an operation took place"),
            );
        }

        let has_discharge_meds = facts.iter().any(|f| {
            f.fact_type == FactType::Medication
                && f.source_doc.to_ascii_lowercase().contains("discharge")
        });
        if !has_discharge_meds {
            uncertainties.push(
                ClinicalUncertainty::new(
                    UncertaintyKind::MissingInformation,
                    UncertaintySeverity::High,
                    "No discharge medications documented",
                )
                .with_resolution("Reconcile the discharge medication list"),
            );
        }

        let has_follow_up = facts.iter().any(|f| {
            let text = f.text.to_ascii_lowercase();
            text.contains("follow-up") || text.contains("follow up")
        });
        if !has_follow_up {
            uncertainties.push(ClinicalUncertainty::new(
                UncertaintyKind::MissingInformation,
                UncertaintySeverity::Low,
                "No follow-up documented",
            ));
        }

        let has_instructions = facts
            .iter()
            .any(|f| f.text.to_ascii_lowercase().contains("instruction"));
        if !has_instructions {
            uncertainties.push(ClinicalUncertainty::new(
                UncertaintyKind::MissingInformation,
                UncertaintySeverity::Low,
                "No discharge instructions documented",
            ));
        }
    }
}
