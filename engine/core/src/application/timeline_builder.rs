// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Timeline Builder
//!
//! Assembles the reconstructed hospital course: resolves temporal
//! references, groups facts by calendar date, derives progression trends,
//! extracts ranked key events, and computes the admission/discharge bounds.
//!
//! Ordering inside a day is deterministic: ascending effective time, then
//! descending confidence.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::document::ClinicalDocument;
use crate::domain::fact::{ClinicalFact, FactType, Severity};
use crate::domain::knowledge::ClinicalKnowledgeBase;
use crate::domain::timeline::{
    AnchorEvent, AnchorKind, ClinicalTimeline, ComplicationEntry, InterventionEntry, KeyEvent,
    KeyEventCategory, KeyEventKind, LabObservation, LabProgression, ProgressionSummary,
    ScoreObservation, ScoreProgression, Trend,
};

use super::temporal_resolver::TemporalResolver;

pub struct TimelineBuilder {
    resolver: TemporalResolver,
    kb: Arc<ClinicalKnowledgeBase>,
}

impl TimelineBuilder {
    pub fn new(kb: Arc<ClinicalKnowledgeBase>) -> Result<Self, regex::Error> {
        Ok(Self {
            resolver: TemporalResolver::new()?,
            kb,
        })
    }

    /// Full build: identify anchors, resolve references, then assemble.
    pub fn build(
        &self,
        mut facts: Vec<ClinicalFact>,
        documents: &[ClinicalDocument],
    ) -> ClinicalTimeline {
        let anchors = self.resolver.identify_anchors(documents);
        self.resolver.resolve(&mut facts, &anchors);
        self.assemble(&facts, anchors)
    }

    /// Assembles a timeline from already-resolved facts. The engine uses
    /// this path so the resolved facts stay available for validation.
    pub fn assemble(&self, facts: &[ClinicalFact], anchors: Vec<AnchorEvent>) -> ClinicalTimeline {
        let days = group_by_date(facts);
        let progression = self.identify_progression(&days);
        let key_events = identify_key_events(&days, &anchors);
        let (admission_date, discharge_date) = timeline_bounds(facts, &anchors);
        let total_hospital_days = hospital_days(admission_date, discharge_date);

        tracing::info!(
            days = days.len(),
            key_events = key_events.len(),
            total_hospital_days,
            "timeline assembled"
        );

        ClinicalTimeline {
            days,
            progression,
            key_events,
            anchors,
            admission_date,
            discharge_date,
            total_hospital_days,
        }
    }

    // ── Progression analysis ─────────────────────────────────────────────────

    fn identify_progression(
        &self,
        days: &BTreeMap<chrono::NaiveDate, Vec<ClinicalFact>>,
    ) -> ProgressionSummary {
        let mut scores: BTreeMap<String, Vec<ScoreObservation>> = BTreeMap::new();
        let mut labs: BTreeMap<String, Vec<LabObservation>> = BTreeMap::new();
        let mut complications = Vec::new();
        let mut interventions = Vec::new();

        for (date, facts) in days {
            for fact in facts {
                match fact.fact_type {
                    FactType::ClinicalScore => {
                        let Some(metric) = fact.text.split(':').next() else {
                            continue;
                        };
                        let Some(value) = fact.normalized.as_ref().and_then(|n| n.as_number())
                        else {
                            continue;
                        };
                        scores.entry(metric.trim().to_string()).or_default().push(
                            ScoreObservation {
                                date: *date,
                                value,
                                source_doc: fact.source_doc.clone(),
                                confidence: fact.confidence(),
                            },
                        );
                    }

                    FactType::LabValue => {
                        let Some(concept) =
                            fact.normalized.as_ref().and_then(|n| n.as_concept())
                        else {
                            continue;
                        };
                        labs.entry(concept.name.to_ascii_lowercase()).or_default().push(
                            LabObservation {
                                date: *date,
                                value: concept.value,
                                severity: concept.severity,
                                source_doc: fact.source_doc.clone(),
                            },
                        );
                    }

                    FactType::Complication => complications.push(ComplicationEntry {
                        date: *date,
                        description: fact.text.clone(),
                        severity: fact.severity,
                        source_doc: fact.source_doc.clone(),
                    }),

                    FactType::Procedure | FactType::Recommendation => {
                        interventions.push(InterventionEntry {
                            date: *date,
                            description: fact.text.clone(),
                            fact_type: fact.fact_type,
                            source_doc: fact.source_doc.clone(),
                        })
                    }

                    _ => {}
                }
            }
        }

        let neurological = scores
            .into_iter()
            .filter(|(_, observations)| observations.len() > 1)
            .map(|(metric, observations)| ScoreProgression {
                trend: score_trend(&metric, &observations),
                metric,
                observations,
            })
            .collect();

        let laboratory = labs
            .into_iter()
            .filter(|(_, observations)| observations.len() > 1)
            .map(|(lab, observations)| {
                let points: Vec<_> = observations.iter().map(|o| (o.date, o.value)).collect();
                LabProgression {
                    analysis: self.kb.interpret_lab_trend(&lab, &points),
                    lab,
                    observations,
                }
            })
            .collect();

        ProgressionSummary {
            neurological,
            laboratory,
            complications,
            interventions,
        }
    }
}

// ── Grouping and ordering ────────────────────────────────────────────────────

fn group_by_date(facts: &[ClinicalFact]) -> BTreeMap<chrono::NaiveDate, Vec<ClinicalFact>> {
    let mut days: BTreeMap<chrono::NaiveDate, Vec<ClinicalFact>> = BTreeMap::new();

    for fact in facts {
        days.entry(fact.effective_date()).or_default().push(fact.clone());
    }

    for facts in days.values_mut() {
        facts.sort_by(|a, b| {
            a.effective_timestamp()
                .cmp(&b.effective_timestamp())
                .then_with(|| {
                    b.confidence()
                        .partial_cmp(&a.confidence())
                        .unwrap_or(Ordering::Equal)
                })
        });
    }

    days
}

// ── Score trends ─────────────────────────────────────────────────────────────

/// NIHSS and mRS improve downward, GCS improves upward; anything else just
/// reports its raw direction. A change of one point or less is stable.
fn score_trend(metric: &str, observations: &[ScoreObservation]) -> Trend {
    if observations.len() < 2 {
        return Trend::InsufficientData;
    }

    let first = observations[0].value;
    let last = observations[observations.len() - 1].value;

    if (last - first).abs() <= 1.0 {
        return Trend::Stable;
    }

    match metric {
        "NIHSS" | "mRS" => {
            if last < first {
                Trend::Improving
            } else {
                Trend::Worsening
            }
        }
        "GCS" => {
            if last > first {
                Trend::Improving
            } else {
                Trend::Worsening
            }
        }
        _ => {
            if last > first {
                Trend::Increasing
            } else {
                Trend::Decreasing
            }
        }
    }
}

// ── Key events ───────────────────────────────────────────────────────────────

fn identify_key_events(
    days: &BTreeMap<chrono::NaiveDate, Vec<ClinicalFact>>,
    anchors: &[AnchorEvent],
) -> Vec<KeyEvent> {
    let mut events = Vec::new();

    for anchor in anchors {
        events.push(KeyEvent {
            date: anchor.timestamp.date_naive(),
            timestamp: anchor.timestamp,
            kind: match anchor.kind {
                AnchorKind::Surgery => KeyEventKind::Surgery,
                AnchorKind::Admission => KeyEventKind::Admission,
            },
            category: KeyEventCategory::Milestone,
            description: anchor.description.clone(),
            significance: Severity::High,
        });
    }

    for (date, facts) in days {
        for fact in facts {
            let (kind, category) = match fact.fact_type {
                FactType::Complication => (KeyEventKind::Complication, KeyEventCategory::Complication),
                FactType::LabValue if fact.severity == Some(Severity::Critical) => {
                    (KeyEventKind::CriticalLab, KeyEventCategory::Laboratory)
                }
                FactType::Procedure => (KeyEventKind::Procedure, KeyEventCategory::Intervention),
                _ => continue,
            };

            events.push(KeyEvent {
                date: *date,
                timestamp: fact.effective_timestamp(),
                kind,
                category,
                description: fact.text.clone(),
                significance: Severity::High,
            });
        }
    }

    events.sort_by_key(|e| e.timestamp);
    events
}

// ── Bounds ───────────────────────────────────────────────────────────────────

fn timeline_bounds(
    facts: &[ClinicalFact],
    anchors: &[AnchorEvent],
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let admission = anchors
        .iter()
        .filter(|a| a.kind == AnchorKind::Admission)
        .map(|a| a.timestamp)
        .min();

    // Discharge is the latest effective timestamp among non-temporal facts
    // sourced from a discharge document.
    let discharge = facts
        .iter()
        .filter(|f| {
            f.fact_type != FactType::TemporalReference
                && f.source_doc.to_ascii_lowercase().contains("discharge")
        })
        .map(|f| f.effective_timestamp())
        .max();

    (admission, discharge)
}

fn hospital_days(
    admission: Option<DateTime<Utc>>,
    discharge: Option<DateTime<Utc>>,
) -> i64 {
    match (admission, discharge) {
        // Admission day counts, so a same-day discharge is one hospital day.
        (Some(admission), Some(discharge)) if discharge >= admission => {
            (discharge - admission).num_days() + 1
        }
        _ => 0,
    }
}
