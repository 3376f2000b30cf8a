// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Validator findings.
//!
//! A [`ClinicalUncertainty`] is the only channel validation communicates
//! through: findings require human attention, they are never raised as
//! errors and never remove facts past stage 1.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::fact::FactId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UncertaintyId(pub Uuid);

impl UncertaintyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UncertaintyId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UncertaintySeverity {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for UncertaintySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// Every finding category the six-stage validator and the temporal conflict
/// detector can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UncertaintyKind {
    // Stage 1
    MalformedFact,
    // Stage 2
    CriticalLabValue,
    InvalidScoreRange,
    ExcessiveMedicationDose,
    // Stage 3
    TemporalInconsistency,
    DocumentationGap,
    // Stage 4
    ConflictingInformation,
    MedicationInteraction,
    // Stage 5
    ContradictoryStatements,
    ContradictoryOutcomes,
    DischargeStatusContradiction,
    // Stage 6
    MissingInformation,
    // Temporal conflict detection
    BeforeAdmission,
    PodWithoutSurgery,
    HdWithoutAdmission,
}

/// A single validator finding requiring human attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalUncertainty {
    pub id: UncertaintyId,
    pub kind: UncertaintyKind,
    pub severity: UncertaintySeverity,
    pub description: String,
    pub fact_ids: Vec<FactId>,
    pub suggested_resolution: Option<String>,
}

impl ClinicalUncertainty {
    pub fn new(
        kind: UncertaintyKind,
        severity: UncertaintySeverity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: UncertaintyId::new(),
            kind,
            severity,
            description: description.into(),
            fact_ids: Vec::new(),
            suggested_resolution: None,
        }
    }

    pub fn with_facts(mut self, fact_ids: Vec<FactId>) -> Self {
        self.fact_ids = fact_ids;
        self
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.suggested_resolution = Some(resolution.into());
        self
    }
}

/// Roll-up across a run's uncertainties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total: usize,
    pub high_count: usize,
    pub medium_count: usize,
    pub low_count: usize,
    pub by_kind: BTreeMap<UncertaintyKind, usize>,
    /// True exactly when any HIGH severity uncertainty exists.
    pub requires_review: bool,
}

impl ValidationSummary {
    pub fn from_uncertainties(uncertainties: &[ClinicalUncertainty]) -> Self {
        let mut by_kind = BTreeMap::new();
        let mut high_count = 0;
        let mut medium_count = 0;
        let mut low_count = 0;

        for u in uncertainties {
            *by_kind.entry(u.kind).or_insert(0) += 1;
            match u.severity {
                UncertaintySeverity::High => high_count += 1,
                UncertaintySeverity::Medium => medium_count += 1,
                UncertaintySeverity::Low => low_count += 1,
            }
        }

        Self {
            total: uncertainties.len(),
            high_count,
            medium_count,
            low_count,
            by_kind,
            requires_review: high_count > 0,
        }
    }
}
