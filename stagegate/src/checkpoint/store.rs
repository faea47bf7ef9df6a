//! Checkpoint storage backends.

use super::Checkpoint;
use crate::errors::CheckpointError;
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Storage for checkpoints keyed by slot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Reads the checkpoint in a slot.
    async fn get(&self, slot: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Writes a checkpoint, replacing whatever the slot held.
    async fn put(&self, slot: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Removes a slot. Removing an empty slot is not an error.
    async fn delete(&self, slot: &str) -> Result<(), CheckpointError>;
}

/// In-memory checkpoint store.
///
/// Entries are kept encoded so reads never alias the writer's context.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointStore {
    slots: DashMap<String, String>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Stores raw data in a slot, bypassing encoding.
    pub fn put_raw(&self, slot: impl Into<String>, raw: impl Into<String>) {
        self.slots.insert(slot.into(), raw.into());
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn get(&self, slot: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let Some(raw) = self.slots.get(slot).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        Checkpoint::from_json(slot, &raw).map(Some)
    }

    async fn put(&self, slot: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let raw = checkpoint.to_json()?;
        self.slots.insert(slot.to_string(), raw);
        Ok(())
    }

    async fn delete(&self, slot: &str) -> Result<(), CheckpointError> {
        self.slots.remove(slot);
        Ok(())
    }
}

/// File-backed checkpoint store: one JSON file per slot under a root directory.
///
/// Writes go to a temporary file that is then renamed over the slot file, so a
/// crash mid-write leaves the previous checkpoint intact.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    root: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file backing a slot.
    ///
    /// The readable part is the slot with unsafe characters replaced; a short
    /// digest of the raw slot keeps slots that sanitise alike apart.
    #[must_use]
    pub fn path_for(&self, slot: &str) -> PathBuf {
        let name: String = slot
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let digest = Sha256::digest(slot.as_bytes());
        self.root
            .join(format!("{name}-{}.json", hex::encode(&digest[..4])))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, slot: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(slot);
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Checkpoint::from_json(slot, &raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, slot: &str, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.path_for(slot);
        let tmp = path.with_extension("json.tmp");

        tokio::fs::write(&tmp, checkpoint.to_json()?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "Checkpoint written");
        Ok(())
    }

    async fn delete(&self, slot: &str) -> Result<(), CheckpointError> {
        match tokio::fs::remove_file(self.path_for(slot)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
