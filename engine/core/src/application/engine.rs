// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Course Engine
//!
//! Composes one full run: per-document extraction (optionally one tokio
//! task per document), learning corrections, temporal resolution, timeline
//! assembly, conflict detection, and the six-stage validator — in that
//! order. Everything after extraction is strictly sequential because each
//! stage consumes the complete prior output.
//!
//! Per-document failure is isolated: a document whose extraction task fails
//! contributes zero facts plus a diagnostic, and the batch continues. A run
//! either completes all stages or its result is discarded — there is no
//! mid-run cancellation, since completeness checks need full context.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::domain::document::ClinicalDocument;
use crate::domain::fact::ClinicalFact;
use crate::domain::knowledge::{ClinicalKnowledgeBase, KnowledgeError};
use crate::domain::repository::PatternRepository;
use crate::domain::timeline::ClinicalTimeline;
use crate::domain::uncertainty::{
    ClinicalUncertainty, UncertaintyKind, UncertaintySeverity, ValidationSummary,
};

use super::extractor::{ExtractionStats, FactExtractor};
use super::feedback_manager::{FeedbackError, FeedbackManager};
use super::temporal_resolver::{ConflictKind, ResolutionStats, TemporalConflict, TemporalResolver};
use super::timeline_builder::TimelineBuilder;
use super::validator::Validator;

fn default_true() -> bool {
    true
}
fn default_success_threshold() -> f64 {
    FeedbackManager::DEFAULT_SUCCESS_THRESHOLD
}
fn default_min_match_confidence() -> f64 {
    FeedbackManager::DEFAULT_MIN_MATCH_CONFIDENCE
}

/// Engine configuration, loadable from YAML alongside the knowledge tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fan extraction out to one task per document.
    #[serde(default = "default_true")]
    pub parallel_extraction: bool,
    /// Apply approved learning corrections between extraction and
    /// resolution.
    #[serde(default = "default_true")]
    pub enable_learning: bool,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: f64,
    #[serde(default = "default_min_match_confidence")]
    pub min_match_confidence: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_extraction: true,
            enable_learning: true,
            success_threshold: default_success_threshold(),
            min_match_confidence: default_min_match_confidence(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error("engine pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Extraction(#[from] super::extractor::ExtractionError),

    #[error(transparent)]
    Feedback(#[from] FeedbackError),
}

/// Run metrics, including the diagnostics of documents whose extraction was
/// isolated rather than allowed to abort the batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub documents_processed: usize,
    pub facts_extracted: usize,
    pub facts_validated: usize,
    pub corrections_applied: usize,
    pub parallel_tasks: usize,
    /// (document name, diagnostic) per isolated extraction failure.
    pub extraction_failures: Vec<(String, String)>,
    pub elapsed_ms: u64,
}

/// The result surface of one run: validated facts, the timeline, every
/// uncertainty, and the statistics the review UI needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseRecord {
    pub validated_facts: Vec<ClinicalFact>,
    pub timeline: ClinicalTimeline,
    pub uncertainties: Vec<ClinicalUncertainty>,
    pub extraction_stats: ExtractionStats,
    pub resolution_stats: ResolutionStats,
    pub validation_summary: ValidationSummary,
    /// Mean confidence over the validated facts.
    pub confidence_score: f64,
    pub requires_review: bool,
    pub metrics: ProcessingMetrics,
}

pub struct CourseEngine {
    config: EngineConfig,
    extractor: Arc<FactExtractor>,
    resolver: TemporalResolver,
    builder: TimelineBuilder,
    validator: Validator,
    feedback: FeedbackManager,
}

impl CourseEngine {
    pub fn new(
        config: EngineConfig,
        repository: Arc<dyn PatternRepository>,
    ) -> Result<Self, EngineError> {
        let kb = Arc::new(ClinicalKnowledgeBase::builtin()?);
        Self::with_knowledge_base(config, repository, kb)
    }

    pub fn with_knowledge_base(
        config: EngineConfig,
        repository: Arc<dyn PatternRepository>,
        kb: Arc<ClinicalKnowledgeBase>,
    ) -> Result<Self, EngineError> {
        let feedback = FeedbackManager::new(repository)
            .with_thresholds(config.success_threshold, config.min_match_confidence);

        Ok(Self {
            extractor: Arc::new(FactExtractor::new(Arc::clone(&kb))?),
            resolver: TemporalResolver::new()?,
            builder: TimelineBuilder::new(Arc::clone(&kb))?,
            validator: Validator::new(kb)?,
            feedback,
            config,
        })
    }

    pub fn feedback(&self) -> &FeedbackManager {
        &self.feedback
    }

    /// Processes one complete document set into a [`CourseRecord`]. Callers
    /// finish all I/O first; nothing in here touches network or disk.
    pub async fn process(
        &self,
        documents: Vec<ClinicalDocument>,
    ) -> Result<CourseRecord, EngineError> {
        let started = Instant::now();
        let mut metrics = ProcessingMetrics {
            documents_processed: documents.len(),
            ..ProcessingMetrics::default()
        };

        // Stage A: per-document extraction, embarrassingly parallel.
        let mut facts = if self.config.parallel_extraction {
            self.extract_parallel(&documents, &mut metrics).await
        } else {
            self.extract_sequential(&documents, &mut metrics)
        };
        metrics.facts_extracted = facts.len();

        // Cross-document duplicates collapse exactly like in-document ones.
        facts = FactExtractor::deduplicate(facts);

        // Stage B: approved learning corrections.
        if self.config.enable_learning {
            let before = count_corrected(&facts);
            facts = self.feedback.apply_corrections(facts).await?;
            metrics.corrections_applied = count_corrected(&facts) - before;
        }

        // Stage C: anchors + temporal resolution (sequential from here on).
        let anchors = self.resolver.identify_anchors(&documents);
        self.resolver.resolve(&mut facts, &anchors);
        let resolution_stats = self.resolver.resolution_stats(&facts);
        let conflicts = self.resolver.detect_conflicts(&facts, &anchors);

        // Stage D: timeline assembly.
        let timeline = self.builder.assemble(&facts, anchors);

        // Stage E: six-stage validation, then resolver conflicts appended to
        // the same uncertainty surface.
        let extraction_stats = ExtractionStats::from_facts(&facts);
        let (validated_facts, mut uncertainties) = self.validator.validate(&facts, &timeline);
        uncertainties.extend(conflicts.into_iter().map(conflict_to_uncertainty));

        let validation_summary = ValidationSummary::from_uncertainties(&uncertainties);
        let confidence_score = mean_confidence(&validated_facts);

        metrics.facts_validated = validated_facts.len();
        metrics.elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            documents = metrics.documents_processed,
            facts = metrics.facts_extracted,
            validated = metrics.facts_validated,
            uncertainties = uncertainties.len(),
            elapsed_ms = metrics.elapsed_ms,
            "course processing complete"
        );

        Ok(CourseRecord {
            requires_review: validation_summary.requires_review,
            validated_facts,
            timeline,
            uncertainties,
            extraction_stats,
            resolution_stats,
            validation_summary,
            confidence_score,
            metrics,
        })
    }

    async fn extract_parallel(
        &self,
        documents: &[ClinicalDocument],
        metrics: &mut ProcessingMetrics,
    ) -> Vec<ClinicalFact> {
        let mut handles = Vec::with_capacity(documents.len());
        for doc in documents {
            let extractor = Arc::clone(&self.extractor);
            let doc = doc.clone();
            handles.push((
                doc.name.clone(),
                tokio::spawn(async move { extractor.extract(&doc) }),
            ));
        }
        metrics.parallel_tasks = handles.len();

        let mut facts = Vec::new();
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(mut extracted)) => facts.append(&mut extracted),
                Ok(Err(e)) => {
                    tracing::error!(document = %name, error = %e, "extraction failed; isolating document");
                    metrics.extraction_failures.push((name, e.to_string()));
                }
                Err(e) => {
                    tracing::error!(document = %name, error = %e, "extraction task panicked; isolating document");
                    metrics.extraction_failures.push((name, e.to_string()));
                }
            }
        }
        facts
    }

    fn extract_sequential(
        &self,
        documents: &[ClinicalDocument],
        metrics: &mut ProcessingMetrics,
    ) -> Vec<ClinicalFact> {
        let mut facts = Vec::new();
        for doc in documents {
            match self.extractor.extract(doc) {
                Ok(mut extracted) => facts.append(&mut extracted),
                Err(e) => {
                    tracing::error!(document = %doc.name, error = %e, "extraction failed; isolating document");
                    metrics.extraction_failures.push((doc.name.clone(), e.to_string()));
                }
            }
        }
        facts
    }
}

fn conflict_to_uncertainty(conflict: TemporalConflict) -> ClinicalUncertainty {
    let kind = match conflict.kind {
        ConflictKind::BeforeAdmission => UncertaintyKind::BeforeAdmission,
        ConflictKind::PodWithoutSurgery => UncertaintyKind::PodWithoutSurgery,
        ConflictKind::HdWithoutAdmission => UncertaintyKind::HdWithoutAdmission,
    };
    ClinicalUncertainty::new(kind, UncertaintySeverity::High, conflict.description)
        .with_facts(conflict.fact_ids)
}

fn count_corrected(facts: &[ClinicalFact]) -> usize {
    facts.iter().filter(|f| f.correction.is_some()).count()
}

fn mean_confidence(facts: &[ClinicalFact]) -> f64 {
    if facts.is_empty() {
        return 0.0;
    }
    facts.iter().map(|f| f.confidence()).sum::<f64>() / facts.len() as f64
}
