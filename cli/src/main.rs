// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # NeuroChart CLI
//!
//! The `neurochart` binary runs the clinical course engine over a document
//! set on disk and prints the resulting course record as JSON.
//!
//! ## Commands
//!
//! - `neurochart process --documents <FILE>` - Reconstruct a hospital course
//! - `neurochart patterns list` - Show stored learning patterns
//!
//! Document sets are YAML lists of ingestion items (name, text, ISO-8601
//! timestamp, type tag, optional author/specialty). Learning patterns can be
//! imported from and exported to JSON so the store survives between runs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use neurochart_core::application::{CourseEngine, EngineConfig};
use neurochart_core::domain::document::{ClinicalDocument, DocumentIngest};
use neurochart_core::domain::feedback::LearningPattern;
use neurochart_core::infrastructure::InMemoryPatternRepository;

/// NeuroChart - verified clinical course reconstruction
#[derive(Parser)]
#[command(name = "neurochart")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "NEUROCHART_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process a document set into a validated course record
    Process {
        /// YAML file with the document set
        #[arg(short, long, value_name = "FILE")]
        documents: PathBuf,

        /// Engine configuration file (YAML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// JSON file with learning patterns to load before the run
        #[arg(long, value_name = "FILE")]
        patterns: Option<PathBuf>,

        /// Write the (possibly updated) pattern store back out as JSON
        #[arg(long, value_name = "FILE")]
        patterns_out: Option<PathBuf>,

        /// Extract documents one at a time instead of fanning out
        #[arg(long)]
        sequential: bool,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Inspect a stored pattern file
    Patterns {
        /// JSON file with learning patterns
        #[arg(long, value_name = "FILE")]
        patterns: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Commands::Process {
            documents,
            config,
            patterns,
            patterns_out,
            sequential,
            pretty,
        } => {
            process(
                &documents,
                config.as_deref(),
                patterns.as_deref(),
                patterns_out.as_deref(),
                sequential,
                pretty,
            )
            .await
        }
        Commands::Patterns { patterns } => list_patterns(&patterns),
    }
}

async fn process(
    documents_path: &Path,
    config_path: Option<&Path>,
    patterns_path: Option<&Path>,
    patterns_out: Option<&Path>,
    sequential: bool,
    pretty: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if sequential {
        config.parallel_extraction = false;
    }

    let documents = load_documents(documents_path)?;
    info!(count = documents.len(), "loaded document set");

    let repository = Arc::new(InMemoryPatternRepository::new());
    let engine = CourseEngine::new(config, repository)?;

    if let Some(path) = patterns_path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading patterns from {}", path.display()))?;
        let patterns: Vec<LearningPattern> =
            serde_json::from_str(&raw).context("parsing pattern store")?;
        let imported = engine.feedback().import_patterns(patterns).await?;
        info!(count = imported, "loaded learning patterns");
    }

    let record = engine.process(documents).await?;

    if let Some(path) = patterns_out {
        let patterns = engine.feedback().export_patterns().await?;
        std::fs::write(path, serde_json::to_string_pretty(&patterns)?)
            .with_context(|| format!("writing patterns to {}", path.display()))?;
    }

    let output = if pretty {
        serde_json::to_string_pretty(&record)?
    } else {
        serde_json::to_string(&record)?
    };
    println!("{output}");

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config from {}", path.display()))?;
            serde_yaml::from_str(&raw).context("parsing engine config")
        }
        None => Ok(EngineConfig::default()),
    }
}

fn load_documents(path: &Path) -> Result<Vec<ClinicalDocument>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading documents from {}", path.display()))?;
    let ingests: Vec<DocumentIngest> =
        serde_yaml::from_str(&raw).context("parsing document set")?;

    ingests
        .into_iter()
        .map(|ingest| {
            let name = ingest.name.clone();
            ClinicalDocument::try_from(ingest)
                .with_context(|| format!("invalid document '{name}'"))
        })
        .collect()
}

fn list_patterns(path: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading patterns from {}", path.display()))?;
    let patterns: Vec<LearningPattern> =
        serde_json::from_str(&raw).context("parsing pattern store")?;

    for pattern in &patterns {
        println!(
            "{}  [{}]  {:.2}  {} -> {}",
            pattern.id.short(),
            pattern.status.label(),
            pattern.success_rate,
            pattern.original_extraction,
            pattern.correction,
        );
    }
    println!("{} patterns", patterns.len());

    Ok(())
}
