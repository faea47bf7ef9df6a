//! Append-only record of completed runs.

use crate::core::FinalArtifact;
use crate::errors::HistoryError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// One completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    /// The run identifier.
    pub id: Uuid,
    /// When the run completed.
    pub timestamp: DateTime<Utc>,
    /// The seed input.
    pub seed: String,
    /// The final artifact text.
    pub artifact_text: String,
}

impl RunRecord {
    /// Builds a record from a final artifact.
    #[must_use]
    pub fn from_artifact(artifact: &FinalArtifact) -> Self {
        Self {
            id: artifact.run_id,
            timestamp: artifact.completed_at,
            seed: artifact.seed.clone(),
            artifact_text: artifact.text.clone(),
        }
    }
}

/// Receives a record for every completed run.
#[async_trait]
pub trait RunHistorySink: Send + Sync {
    /// Appends a record.
    async fn append(&self, record: RunRecord) -> Result<(), HistoryError>;
}

/// In-memory run history.
#[derive(Debug, Default)]
pub struct InMemoryRunHistory {
    records: Mutex<Vec<RunRecord>>,
}

impl InMemoryRunHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all records in append order.
    #[must_use]
    pub fn records(&self) -> Vec<RunRecord> {
        self.records.lock().clone()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl RunHistorySink for InMemoryRunHistory {
    async fn append(&self, record: RunRecord) -> Result<(), HistoryError> {
        self.records.lock().push(record);
        Ok(())
    }
}

/// Run history kept as JSON lines in a file.
#[derive(Debug, Clone)]
pub struct JsonlRunHistory {
    path: PathBuf,
}

impl JsonlRunHistory {
    /// Creates a history writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads every record back.
    pub async fn read_all(&self) -> Result<Vec<RunRecord>, HistoryError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(HistoryError::from))
            .collect()
    }
}

#[async_trait]
impl RunHistorySink for JsonlRunHistory {
    async fn append(&self, record: RunRecord) -> Result<(), HistoryError> {
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seed: &str) -> RunRecord {
        RunRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            seed: seed.to_string(),
            artifact_text: format!("artifact for {seed}"),
        }
    }

    #[tokio::test]
    async fn test_in_memory_history() {
        let history = InMemoryRunHistory::new();
        assert!(history.is_empty());

        history.append(record("a")).await.unwrap();
        history.append(record("b")).await.unwrap();

        let seeds: Vec<_> = history.records().into_iter().map(|r| r.seed).collect();
        assert_eq!(seeds, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_jsonl_history_appends() {
        let dir = tempfile::tempdir().unwrap();
        let history = JsonlRunHistory::new(dir.path().join("runs").join("history.jsonl"));
        assert!(history.read_all().await.unwrap().is_empty());

        let first = record("a");
        history.append(first.clone()).await.unwrap();
        history.append(record("b")).await.unwrap();

        let records = history.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], first);
    }
}
