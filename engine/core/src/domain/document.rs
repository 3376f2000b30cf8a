// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Clinical document ingestion types.
//!
//! A [`ClinicalDocument`] is the immutable unit of input to the pipeline. It
//! is created once at ingestion from a [`DocumentIngest`] payload (name, raw
//! text, ISO-8601 timestamp, type tag) and never mutated afterwards.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category of a clinical note, parsed from the ingestion type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Admission,
    Operative,
    Progress,
    Consult,
    LabReport,
    DischargePlanning,
    Nursing,
    Imaging,
    Other,
}

impl DocumentType {
    /// Maps a free-form ingestion tag onto a document type. Unknown tags land
    /// in `Other` rather than failing the batch.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "admission" | "admission_note" => Self::Admission,
            "operative" | "operative_note" | "op_note" => Self::Operative,
            "progress" | "progress_note" => Self::Progress,
            "consult" | "consultation" | "consult_note" => Self::Consult,
            "lab" | "lab_report" | "labs" => Self::LabReport,
            "discharge" | "discharge_planning" | "discharge_summary" => Self::DischargePlanning,
            "nursing" | "nursing_note" => Self::Nursing,
            "imaging" | "imaging_report" | "radiology" => Self::Imaging,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("unparsable timestamp '{0}' (expected ISO-8601)")]
    InvalidTimestamp(String),

    #[error("document '{0}' has no content")]
    EmptyDocument(String),
}

/// Raw ingestion payload, matching the orchestrator's wire item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentIngest {
    pub name: String,
    #[serde(alias = "text")]
    pub content: String,
    /// ISO-8601 timestamp, with or without an offset.
    #[serde(alias = "date")]
    pub timestamp: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
}

/// Immutable clinical note. Input to extraction and anchor identification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalDocument {
    pub name: String,
    pub doc_type: DocumentType,
    pub timestamp: DateTime<Utc>,
    pub author: Option<String>,
    pub specialty: Option<String>,
    pub content: String,
}

impl ClinicalDocument {
    pub fn new(
        name: impl Into<String>,
        doc_type: DocumentType,
        timestamp: DateTime<Utc>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            doc_type,
            timestamp,
            author: None,
            specialty: None,
            content: content.into(),
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_specialty(mut self, specialty: impl Into<String>) -> Self {
        self.specialty = Some(specialty.into());
        self
    }

    pub fn date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

impl TryFrom<DocumentIngest> for ClinicalDocument {
    type Error = DocumentError;

    fn try_from(ingest: DocumentIngest) -> Result<Self, Self::Error> {
        let timestamp = parse_timestamp(&ingest.timestamp)
            .ok_or_else(|| DocumentError::InvalidTimestamp(ingest.timestamp.clone()))?;

        Ok(Self {
            name: ingest.name,
            doc_type: DocumentType::from_tag(&ingest.doc_type),
            timestamp,
            author: ingest.author,
            specialty: ingest.specialty,
            content: ingest.content,
        })
    }
}

/// Accepts RFC 3339 as well as the offset-less forms clinical systems emit.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }

    None
}
