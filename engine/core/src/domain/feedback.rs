// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Learning Pattern Domain
//!
//! A [`LearningPattern`] is a stored physician correction (original → text)
//! gated by a human approval workflow before automatic application:
//!
//! ```text
//! pending ──approve──▶ approved   (terminal)
//!    └─────reject────▶ rejected   (terminal)
//! ```
//!
//! The approval state is an explicit three-value enum — the core never
//! self-approves, and a pattern is only ever applied while `Approved` with a
//! success rate at or above the application threshold.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::fact::FactType;

/// Stable content-derived pattern identity: identical (type, original,
/// correction) triples always hash to the same id, which is what makes
/// resubmission dedupe to the existing pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(pub String);

impl PatternId {
    pub fn derive(fact_type: FactType, original: &str, correction: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(fact_type.to_string().as_bytes());
        hasher.update(b"_");
        hasher.update(original.as_bytes());
        hasher.update(b"_");
        hasher.update(correction.as_bytes());
        let digest = hasher.finalize();
        Self(hex_encode(digest.as_slice()))
    }

    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Leading eight characters, used in log lines.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(8);
        &self.0[..end]
    }
}

impl std::fmt::Display for PatternId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Approval state machine. `Approved` and `Rejected` are terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved {
        by: String,
        at: DateTime<Utc>,
    },
    Rejected {
        by: String,
        at: DateTime<Utc>,
        reason: Option<String>,
    },
}

impl ApprovalStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved { .. } => "approved",
            Self::Rejected { .. } => "rejected",
        }
    }
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Pattern {id} is already {state}; approval decisions are terminal")]
    AlreadyDecided { id: String, state: &'static str },
}

/// Persisted physician correction with matching context and performance
/// tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPattern {
    pub id: PatternId,
    /// Uncertainty whose resolution produced this correction.
    pub uncertainty_id: String,
    pub original_extraction: String,
    pub correction: String,
    /// Matching context: the fact type is mandatory, the rest optional.
    pub fact_type: FactType,
    pub source_doc: Option<String>,
    pub surrounding_context: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub status: ApprovalStatus,
    /// Exponential moving average of application outcomes, seeded at 1.0.
    pub success_rate: f64,
    pub applied_count: u64,
}

impl LearningPattern {
    pub fn new(
        uncertainty_id: impl Into<String>,
        fact_type: FactType,
        original_extraction: impl Into<String>,
        correction: impl Into<String>,
    ) -> Self {
        let original_extraction = original_extraction.into();
        let correction = correction.into();
        Self {
            id: PatternId::derive(fact_type, &original_extraction, &correction),
            uncertainty_id: uncertainty_id.into(),
            original_extraction,
            correction,
            fact_type,
            source_doc: None,
            surrounding_context: None,
            created_at: Utc::now(),
            created_by: None,
            status: ApprovalStatus::Pending,
            success_rate: 1.0,
            applied_count: 0,
        }
    }

    pub fn approve(&mut self, by: impl Into<String>) -> Result<(), ApprovalError> {
        if !self.status.is_pending() {
            return Err(ApprovalError::AlreadyDecided {
                id: self.id.to_string(),
                state: self.status.label(),
            });
        }
        self.status = ApprovalStatus::Approved {
            by: by.into(),
            at: Utc::now(),
        };
        Ok(())
    }

    pub fn reject(
        &mut self,
        by: impl Into<String>,
        reason: Option<String>,
    ) -> Result<(), ApprovalError> {
        if !self.status.is_pending() {
            return Err(ApprovalError::AlreadyDecided {
                id: self.id.to_string(),
                state: self.status.label(),
            });
        }
        self.status = ApprovalStatus::Rejected {
            by: by.into(),
            at: Utc::now(),
            reason,
        };
        Ok(())
    }

    /// EMA update with α = 0.1: recent outcomes dominate slowly, so one bad
    /// application does not kill a long-performing pattern.
    pub fn record_outcome(&mut self, success: bool) -> f64 {
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate = 0.9 * self.success_rate + 0.1 * outcome;
        self.success_rate
    }

    /// Whether the pattern may be auto-applied: approved AND performing at
    /// or above `threshold`.
    pub fn is_applicable(&self, threshold: f64) -> bool {
        self.status.is_approved() && self.success_rate >= threshold
    }
}
