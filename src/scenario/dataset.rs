//! Dataset loading and the deterministic validation/training split.
//!
//! Datasets are JSON arrays fetched from a local path or an `http(s)://`
//! URL. Two record shapes are understood:
//!
//! - summarization rows, one per question:
//!   `{"document_id", "document_extracted", "question", "answer"}`, grouped
//!   by document in first-appearance order;
//! - job contexts: `{"context": {"job_title", "language", "skills"?}}`.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::info;

use crate::config::{DatasetConfig, TaskKind, TrainingConfig};

use super::types::{ListingScenario, QaPair, Scenario, SummaryScenario};

#[derive(Debug, Deserialize)]
struct SummaryRow {
    document_id: String,
    document_extracted: String,
    question: String,
    answer: String,
}

#[derive(Debug, Deserialize)]
struct ListingRecord {
    context: JobContext,
}

#[derive(Debug, Deserialize)]
struct JobContext {
    job_title: String,
    language: String,
    #[serde(default)]
    skills: Option<Vec<String>>,
}

/// Read the raw dataset text from a path or URL.
pub async fn read_source(source: &str) -> Result<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let resp = reqwest::get(source)
            .await
            .with_context(|| format!("Failed to fetch dataset from {source}"))?;
        let status = resp.status();
        if !status.is_success() {
            bail!("dataset fetch from {source} returned {status}");
        }
        resp.text()
            .await
            .with_context(|| format!("Failed to read dataset body from {source}"))
    } else {
        tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("Failed to read dataset from {source}"))
    }
}

/// Build summary scenarios from flat question rows.
pub fn parse_summary_rows(text: &str) -> Result<Vec<Scenario>> {
    let rows: Vec<SummaryRow> =
        serde_json::from_str(text).context("Failed to parse summarization rows")?;

    let mut order: Vec<String> = Vec::new();
    let mut documents: HashMap<String, (String, Vec<QaPair>)> = HashMap::new();
    for row in rows {
        let entry = documents
            .entry(row.document_id.clone())
            .or_insert_with(|| {
                order.push(row.document_id.clone());
                (row.document_extracted, Vec::new())
            });
        entry.1.push(QaPair::new(row.question, row.answer));
    }

    order
        .into_iter()
        .map(|id| {
            let (document, questions) = documents
                .remove(&id)
                .with_context(|| format!("document {id} vanished while grouping"))?;
            let scenario = SummaryScenario::new(document, questions)
                .with_context(|| format!("invalid document {id}"))?
                .with_id(id);
            Ok(Scenario::Summary(scenario))
        })
        .collect()
}

/// Build listing scenarios from job-context records.
pub fn parse_listing_records(text: &str) -> Result<Vec<Scenario>> {
    let records: Vec<ListingRecord> =
        serde_json::from_str(text).context("Failed to parse job contexts")?;

    records
        .into_iter()
        .enumerate()
        .map(|(i, record)| {
            let ctx = record.context;
            let scenario =
                ListingScenario::new(ctx.job_title, ctx.language, ctx.skills.unwrap_or_default())
                    .with_context(|| format!("invalid job context at index {i}"))?;
            Ok(Scenario::Listing(scenario))
        })
        .collect()
}

/// Load every scenario of the configured task.
pub async fn load_scenarios(config: &DatasetConfig) -> Result<Vec<Scenario>> {
    let text = read_source(&config.source).await?;
    let scenarios = match config.task {
        TaskKind::Summary => parse_summary_rows(&text)?,
        TaskKind::Listing => parse_listing_records(&text)?,
    };
    info!(
        source = %config.source,
        task = ?config.task,
        count = scenarios.len(),
        "Loaded scenarios"
    );
    Ok(scenarios)
}

/// A validation/training partition.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit<T> {
    pub validation: Vec<T>,
    pub training: Vec<T>,
}

/// Shuffle with the configured seed and partition.
///
/// Validation takes the first `val_size` items (default `min(max_val_size,
/// n / 10)`), training the next `train_size` (default: the rest). The same
/// input and seed always yield the same partition in the same order.
pub fn split_dataset<T>(mut items: Vec<T>, config: &TrainingConfig) -> Result<DatasetSplit<T>> {
    let mut rng = StdRng::seed_from_u64(config.shuffle_seed);
    items.shuffle(&mut rng);

    let total = items.len();
    let val_size = config
        .val_size
        .unwrap_or_else(|| config.max_val_size.min(total / 10));
    if val_size > total {
        bail!("val size ({val_size}) is greater than the number of records ({total})");
    }
    let train_size = config.train_size.unwrap_or(total - val_size);
    let Some(requested) = val_size.checked_add(train_size) else {
        bail!("train size ({train_size}) + val size ({val_size}) overflows");
    };
    if requested > total {
        bail!("train size + val size ({requested}) is greater than the number of records ({total})");
    }

    let mut rest = items.split_off(val_size);
    rest.truncate(train_size);

    info!(
        total,
        validation = items.len(),
        training = rest.len(),
        seed = config.shuffle_seed,
        "Split dataset"
    );

    Ok(DatasetSplit {
        validation: items,
        training: rest,
    })
}
