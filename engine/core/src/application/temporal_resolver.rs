// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Temporal Resolver
//!
//! Rewrites relative temporal references (POD#, HD#, "yesterday", ...) to
//! absolute timestamps using anchor events derived from document metadata:
//! one surgery anchor per operative note, one admission anchor per
//! admission note.
//!
//! Resolution failures are data, not errors: an unresolvable reference
//! keeps its original timestamp and shows up through
//! [`TemporalResolver::detect_conflicts`].

use chrono::{DateTime, Duration, Timelike, Utc};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::document::{ClinicalDocument, DocumentType};
use crate::domain::fact::{
    ClinicalFact, FactId, FactType, ResolutionMethod, TemporalKind,
};
use crate::domain::timeline::{AnchorEvent, AnchorKind};

/// Confidence boost applied when a reference resolves, and its cap.
const RESOLUTION_CONFIDENCE_BOOST: f64 = 0.15;
const RESOLUTION_CONFIDENCE_CAP: f64 = 0.95;

/// Temporal inconsistency categories reported by conflict detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    BeforeAdmission,
    PodWithoutSurgery,
    HdWithoutAdmission,
}

/// A detected temporal inconsistency. Reported, never raised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalConflict {
    pub kind: ConflictKind,
    pub description: String,
    pub fact_ids: Vec<FactId>,
    /// Raw reference text for POD/HD conflicts, for the review surface.
    pub references: Vec<String>,
}

/// Statistics over a resolution pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionStats {
    pub total_temporal_references: usize,
    pub resolved: usize,
    pub failed: usize,
    pub resolution_rate: f64,
    pub methods: BTreeMap<ResolutionMethod, usize>,
}

pub struct TemporalResolver {
    pod_number: Regex,
    hd_number: Regex,
    hours_number: Regex,
    days_number: Regex,
}

impl TemporalResolver {
    pub fn new() -> Result<Self, regex::Error> {
        let ci = |p: &str| RegexBuilder::new(p).case_insensitive(true).build();
        Ok(Self {
            pod_number: ci(r"POD[#\s]*(\d+)")?,
            hd_number: ci(r"HD[#\s]*(\d+)")?,
            hours_number: ci(r"(\d+)\s*hour")?,
            days_number: ci(r"(\d+)\s*day")?,
        })
    }

    // ── Anchor identification ────────────────────────────────────────────────

    /// Derives anchor events from document metadata: surgery per operative
    /// note, admission per admission note. All anchors are retained and
    /// returned in ascending timestamp order.
    pub fn identify_anchors(&self, documents: &[ClinicalDocument]) -> Vec<AnchorEvent> {
        let mut anchors: Vec<AnchorEvent> = documents
            .iter()
            .filter_map(|doc| match doc.doc_type {
                DocumentType::Operative => Some(AnchorEvent {
                    kind: AnchorKind::Surgery,
                    timestamp: doc.timestamp,
                    description: "Surgical procedure".to_string(),
                    source_doc: doc.name.clone(),
                    specialty: doc.specialty.clone(),
                }),
                DocumentType::Admission => Some(AnchorEvent {
                    kind: AnchorKind::Admission,
                    timestamp: doc.timestamp,
                    description: "Hospital admission".to_string(),
                    source_doc: doc.name.clone(),
                    specialty: doc.specialty.clone(),
                }),
                _ => None,
            })
            .collect();

        anchors.sort_by_key(|a| a.timestamp);

        tracing::info!(
            total = anchors.len(),
            surgeries = anchors.iter().filter(|a| a.kind == AnchorKind::Surgery).count(),
            admissions = anchors.iter().filter(|a| a.kind == AnchorKind::Admission).count(),
            "identified anchor events"
        );

        anchors
    }

    // ── Reference resolution ─────────────────────────────────────────────────

    /// Resolves every temporal-reference fact in place. Success means the
    /// computed timestamp differs from the original; on success confidence
    /// rises by 0.15 (capped at 0.95) and the outcome records the method.
    pub fn resolve(&self, facts: &mut [ClinicalFact], anchors: &[AnchorEvent]) {
        let mut resolved_count = 0usize;
        let mut failed_count = 0usize;

        for fact in facts.iter_mut() {
            if fact.fact_type != FactType::TemporalReference {
                continue;
            }

            match self.resolve_single(fact, anchors) {
                Some((timestamp, method)) if timestamp != fact.timestamp => {
                    fact.mark_resolved(
                        timestamp,
                        method,
                        RESOLUTION_CONFIDENCE_BOOST,
                        RESOLUTION_CONFIDENCE_CAP,
                    );
                    resolved_count += 1;
                }
                _ => {
                    fact.mark_unresolved();
                    failed_count += 1;
                }
            }
        }

        tracing::info!(resolved = resolved_count, failed = failed_count, "temporal resolution");
    }

    fn resolve_single(
        &self,
        fact: &ClinicalFact,
        anchors: &[AnchorEvent],
    ) -> Option<(DateTime<Utc>, ResolutionMethod)> {
        let temporal = fact.temporal.as_ref()?;
        let raw = temporal.raw_text.as_str();

        match temporal.kind {
            TemporalKind::PostOperativeDay => {
                let pod: i64 = self.pod_number.captures(raw)?[1].parse().ok()?;
                // Latest surgery at or before the fact's own timestamp; the
                // anchor's time of day carries into the resolved timestamp.
                let surgery = anchors
                    .iter()
                    .filter(|a| a.kind == AnchorKind::Surgery && a.timestamp <= fact.timestamp)
                    .next_back()?;
                Some((surgery.timestamp + Duration::days(pod), ResolutionMethod::PodAnchor))
            }

            TemporalKind::HospitalDay => {
                let hd: i64 = self.hd_number.captures(raw)?[1].parse().ok()?;
                // HD#1 is the admission day itself.
                let admission = anchors.iter().find(|a| a.kind == AnchorKind::Admission)?;
                Some((
                    admission.timestamp + Duration::days(hd - 1),
                    ResolutionMethod::HdAnchor,
                ))
            }

            TemporalKind::HoursAfter => {
                let hours: i64 = self.hours_number.captures(raw)?[1].parse().ok()?;
                Some((fact.timestamp + Duration::hours(hours), ResolutionMethod::RelativeHours))
            }

            TemporalKind::DaysAfter => {
                let days: i64 = self.days_number.captures(raw)?[1].parse().ok()?;
                Some((fact.timestamp + Duration::days(days), ResolutionMethod::RelativeDays))
            }

            TemporalKind::PreviousDay => {
                Some((fact.timestamp - Duration::days(1), ResolutionMethod::PreviousDay))
            }

            TemporalKind::NextMorning => {
                let next = fact.timestamp + Duration::days(1);
                Some((at_clock(next, 8)?, ResolutionMethod::NextMorning))
            }

            TemporalKind::SameDay => {
                Some((at_clock(fact.timestamp, 0)?, ResolutionMethod::SameDayMidnight))
            }

            TemporalKind::SameEvening => {
                Some((at_clock(fact.timestamp, 18)?, ResolutionMethod::SameDayEvening))
            }

            TemporalKind::NextDay => {
                Some((fact.timestamp + Duration::days(1), ResolutionMethod::NextDay))
            }

            // Recognized taxonomy without a resolution rule stays
            // unresolved and is surfaced through conflict detection.
            other => {
                tracing::warn!(
                    reference = raw,
                    kind = ?other,
                    "unable to resolve temporal reference"
                );
                None
            }
        }
    }

    // ── Conflict detection ───────────────────────────────────────────────────

    /// Reports temporal inconsistencies without failing the run: facts
    /// dated before admission, POD references with no surgery anchor, and
    /// HD references with no admission anchor.
    pub fn detect_conflicts(
        &self,
        facts: &[ClinicalFact],
        anchors: &[AnchorEvent],
    ) -> Vec<TemporalConflict> {
        let mut conflicts = Vec::new();

        let earliest_admission = anchors
            .iter()
            .filter(|a| a.kind == AnchorKind::Admission)
            .map(|a| a.timestamp)
            .min();

        if let Some(admission) = earliest_admission {
            let before_admission: Vec<&ClinicalFact> = facts
                .iter()
                .filter(|f| {
                    f.fact_type != FactType::TemporalReference
                        && f.effective_timestamp() < admission
                })
                .collect();

            if !before_admission.is_empty() {
                conflicts.push(TemporalConflict {
                    kind: ConflictKind::BeforeAdmission,
                    description: format!(
                        "{} facts dated before admission ({})",
                        before_admission.len(),
                        admission
                    ),
                    fact_ids: before_admission.iter().map(|f| f.id).collect(),
                    references: Vec::new(),
                });
            }
        }

        let has_surgery = anchors.iter().any(|a| a.kind == AnchorKind::Surgery);
        let has_admission = earliest_admission.is_some();

        let pod_facts = temporal_facts_of_kind(facts, TemporalKind::PostOperativeDay);
        if !pod_facts.is_empty() && !has_surgery {
            conflicts.push(TemporalConflict {
                kind: ConflictKind::PodWithoutSurgery,
                description: "POD references found but no operative note/surgery date available"
                    .to_string(),
                fact_ids: pod_facts.iter().map(|f| f.id).collect(),
                references: raw_references(&pod_facts),
            });
        }

        let hd_facts = temporal_facts_of_kind(facts, TemporalKind::HospitalDay);
        if !hd_facts.is_empty() && !has_admission {
            conflicts.push(TemporalConflict {
                kind: ConflictKind::HdWithoutAdmission,
                description: "HD references found but no admission note/admission date available"
                    .to_string(),
                fact_ids: hd_facts.iter().map(|f| f.id).collect(),
                references: raw_references(&hd_facts),
            });
        }

        tracing::info!(conflicts = conflicts.len(), "temporal conflict detection");
        conflicts
    }

    // ── Statistics ───────────────────────────────────────────────────────────

    pub fn resolution_stats(&self, facts: &[ClinicalFact]) -> ResolutionStats {
        let temporal: Vec<&ClinicalFact> = facts
            .iter()
            .filter(|f| f.fact_type == FactType::TemporalReference)
            .collect();

        let mut methods = BTreeMap::new();
        let mut resolved = 0usize;

        for fact in &temporal {
            if let Some(outcome) = &fact.resolution {
                if outcome.resolved {
                    resolved += 1;
                    if let Some(method) = outcome.method {
                        *methods.entry(method).or_insert(0) += 1;
                    }
                }
            }
        }

        let total = temporal.len();
        ResolutionStats {
            total_temporal_references: total,
            resolved,
            failed: total - resolved,
            resolution_rate: if total > 0 {
                resolved as f64 / total as f64
            } else {
                0.0
            },
            methods,
        }
    }
}

fn temporal_facts_of_kind(facts: &[ClinicalFact], kind: TemporalKind) -> Vec<&ClinicalFact> {
    facts
        .iter()
        .filter(|f| {
            f.fact_type == FactType::TemporalReference
                && f.temporal.as_ref().is_some_and(|t| t.kind == kind)
        })
        .collect()
}

fn raw_references(facts: &[&ClinicalFact]) -> Vec<String> {
    facts
        .iter()
        .filter_map(|f| f.temporal.as_ref().map(|t| t.raw_text.clone()))
        .collect()
}

fn at_clock(timestamp: DateTime<Utc>, hour: u32) -> Option<DateTime<Utc>> {
    timestamp
        .with_hour(hour)?
        .with_minute(0)?
        .with_second(0)?
        .with_nanosecond(0)
}
