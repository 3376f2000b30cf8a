// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Fact Extractor
//!
//! Scans one document with the ordered rule list from
//! [`crate::application::rules`] and emits typed, confidence-scored,
//! source-attributed facts. Extraction is stateless per document — no
//! cross-document side effects — which is what makes per-document fan-out
//! safe for the orchestrator.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::document::ClinicalDocument;
use crate::domain::fact::{ClinicalFact, FactError, FactType};
use crate::domain::knowledge::ClinicalKnowledgeBase;

use super::rules::{
    ClinicalScoreRule, ConsultNoteRule, DiagnosisRule, ExtractionRule, LabValueRule,
    MedicationRule, OperativeNoteRule, TemporalReferenceRule, VitalSignRule,
};

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Fact(#[from] FactError),

    #[error("extraction rule pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

/// Knowledge-base-aware extractor over an ordered, independent rule list.
pub struct FactExtractor {
    rules: Vec<Box<dyn ExtractionRule>>,
}

impl FactExtractor {
    pub fn new(kb: Arc<ClinicalKnowledgeBase>) -> Result<Self, ExtractionError> {
        let rules: Vec<Box<dyn ExtractionRule>> = vec![
            Box::new(MedicationRule::new(Arc::clone(&kb))?),
            Box::new(LabValueRule::new(
                Arc::clone(&kb),
                LabValueRule::NARRATIVE_CONFIDENCE,
                false,
            )?),
            Box::new(LabValueRule::new(
                Arc::clone(&kb),
                LabValueRule::REPORT_CONFIDENCE,
                true,
            )?),
            Box::new(ClinicalScoreRule::new(Arc::clone(&kb))?),
            Box::new(VitalSignRule::new()?),
            Box::new(TemporalReferenceRule::new(Arc::clone(&kb))),
            Box::new(DiagnosisRule::new()?),
            Box::new(OperativeNoteRule::new()?),
            Box::new(ConsultNoteRule::new()?),
        ];

        Ok(Self { rules })
    }

    /// Extracts all facts from one document. An empty document yields an
    /// empty list, never an error.
    pub fn extract(&self, doc: &ClinicalDocument) -> Result<Vec<ClinicalFact>, ExtractionError> {
        if doc.content.trim().is_empty() {
            tracing::debug!(document = %doc.name, "skipping empty document");
            return Ok(Vec::new());
        }

        let mut facts = Vec::new();
        for rule in &self.rules {
            if !rule.applies_to(doc) {
                continue;
            }
            let mut extracted = rule.extract(doc)?;
            tracing::debug!(
                document = %doc.name,
                rule = rule.name(),
                count = extracted.len(),
                "rule extraction complete"
            );
            facts.append(&mut extracted);
        }

        let facts = Self::deduplicate(facts);
        tracing::info!(document = %doc.name, facts = facts.len(), "extracted facts");
        Ok(facts)
    }

    /// Strict exact-text deduplication: the surviving fact keeps the highest
    /// confidence and records how many extractions merged into it. Near
    /// duplicates with real differences intentionally survive.
    pub fn deduplicate(facts: Vec<ClinicalFact>) -> Vec<ClinicalFact> {
        let mut kept: Vec<ClinicalFact> = Vec::with_capacity(facts.len());
        let mut index: HashMap<String, usize> = HashMap::new();

        for fact in facts {
            match index.get(&fact.text) {
                Some(&i) => kept[i].absorb_duplicate(&fact),
                None => {
                    index.insert(fact.text.clone(), kept.len());
                    kept.push(fact);
                }
            }
        }

        kept
    }
}

/// Aggregate statistics over an extraction pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionStats {
    pub total: usize,
    pub by_type: BTreeMap<FactType, usize>,
    pub avg_confidence: f64,
    pub requires_review: usize,
}

impl ExtractionStats {
    pub fn from_facts(facts: &[ClinicalFact]) -> Self {
        let mut by_type = BTreeMap::new();
        let mut confidence_sum = 0.0;
        let mut requires_review = 0;

        for fact in facts {
            *by_type.entry(fact.fact_type).or_insert(0) += 1;
            confidence_sum += fact.confidence();
            if fact.requires_review {
                requires_review += 1;
            }
        }

        Self {
            total: facts.len(),
            by_type,
            avg_confidence: if facts.is_empty() {
                0.0
            } else {
                confidence_sum / facts.len() as f64
            },
            requires_review,
        }
    }
}
