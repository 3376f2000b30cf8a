// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory pattern repository.
//!
//! Used for development, tests, and single-process runs. The interior
//! `Mutex` serializes every approve / reject / apply write on the store, so
//! a pattern can never be observed mid-transition. Production deployments
//! swap in the orchestrator's persistent implementation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::feedback::{LearningPattern, PatternId};
use crate::domain::repository::{PatternRepository, RepositoryError};

#[derive(Clone, Default)]
pub struct InMemoryPatternRepository {
    patterns: Arc<Mutex<HashMap<PatternId, LearningPattern>>>,
}

impl InMemoryPatternRepository {
    pub fn new() -> Self {
        Self {
            patterns: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl PatternRepository for InMemoryPatternRepository {
    async fn get(&self, id: &PatternId) -> Result<Option<LearningPattern>, RepositoryError> {
        let patterns = self
            .patterns
            .lock()
            .map_err(|_| RepositoryError::Storage("Mutex poisoned".to_string()))?;
        Ok(patterns.get(id).cloned())
    }

    async fn put(&self, pattern: &LearningPattern) -> Result<(), RepositoryError> {
        let mut patterns = self
            .patterns
            .lock()
            .map_err(|_| RepositoryError::Storage("Mutex poisoned".to_string()))?;
        patterns.insert(pattern.id.clone(), pattern.clone());
        Ok(())
    }

    async fn delete(&self, id: &PatternId) -> Result<bool, RepositoryError> {
        let mut patterns = self
            .patterns
            .lock()
            .map_err(|_| RepositoryError::Storage("Mutex poisoned".to_string()))?;
        Ok(patterns.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<LearningPattern>, RepositoryError> {
        let patterns = self
            .patterns
            .lock()
            .map_err(|_| RepositoryError::Storage("Mutex poisoned".to_string()))?;
        Ok(patterns.values().cloned().collect())
    }
}
