// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pattern Repository Contract
//!
//! Persistence contract for the learning-pattern store, following the
//! one-repository-per-aggregate pattern: the interface lives in the domain
//! layer, implementations in `crate::infrastructure` (in-memory) or in the
//! orchestrator's persistence collaborator (PostgreSQL, Redis).
//!
//! Implementations must serialize approve / reject / apply on a given
//! pattern id — single-writer discipline — so a pattern can never be
//! applied mid-transition.

use async_trait::async_trait;

use crate::domain::feedback::{LearningPattern, PatternId};

/// Repository interface for [`LearningPattern`] aggregates.
#[async_trait]
pub trait PatternRepository: Send + Sync {
    /// Find pattern by id.
    async fn get(&self, id: &PatternId) -> Result<Option<LearningPattern>, RepositoryError>;

    /// Save pattern (create or update).
    async fn put(&self, pattern: &LearningPattern) -> Result<(), RepositoryError>;

    /// Delete pattern by id; returns whether it existed.
    async fn delete(&self, id: &PatternId) -> Result<bool, RepositoryError>;

    /// List all patterns (bulk export and scan-by-predicate callers).
    async fn list(&self) -> Result<Vec<LearningPattern>, RepositoryError>;
}

/// Repository errors.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Pattern not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
