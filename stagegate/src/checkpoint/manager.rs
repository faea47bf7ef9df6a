//! Binds a checkpoint store to the engine's slot.

use super::{Checkpoint, CheckpointStore};
use crate::context::RunContext;
use crate::errors::CheckpointError;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Saves, loads and clears the checkpoint of the active run.
///
/// The manager owns a single slot. Concurrent runs sharing a manager would
/// overwrite each other's checkpoints; give them distinct slots.
#[derive(Clone)]
pub struct CheckpointManager {
    store: Arc<dyn CheckpointStore>,
    slot: String,
}

impl CheckpointManager {
    /// Creates a manager for `slot`.
    #[must_use]
    pub fn new(store: Arc<dyn CheckpointStore>, slot: impl Into<String>) -> Self {
        Self {
            store,
            slot: slot.into(),
        }
    }

    /// Returns the slot key.
    #[must_use]
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Returns the same store bound to a different slot.
    #[must_use]
    pub fn with_slot(&self, slot: impl Into<String>) -> Self {
        Self {
            store: Arc::clone(&self.store),
            slot: slot.into(),
        }
    }

    /// Snapshots the context after its last completed stage.
    pub async fn save(&self, ctx: &RunContext) -> Result<Checkpoint, CheckpointError> {
        let checkpoint = Checkpoint::capture(ctx)
            .ok_or_else(|| CheckpointError::corrupt(&self.slot, "no completed stage to record"))?;
        self.store.put(&self.slot, &checkpoint).await?;
        debug!(
            slot = %self.slot,
            stage = %checkpoint.last_completed_stage,
            "Checkpoint saved"
        );
        Ok(checkpoint)
    }

    /// Loads the pending checkpoint, if any.
    pub async fn load(&self) -> Result<Option<Checkpoint>, CheckpointError> {
        self.store.get(&self.slot).await
    }

    /// Removes the pending checkpoint.
    pub async fn clear(&self) -> Result<(), CheckpointError> {
        self.store.delete(&self.slot).await?;
        debug!(slot = %self.slot, "Checkpoint cleared");
        Ok(())
    }
}

impl fmt::Debug for CheckpointManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckpointManager")
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{InMemoryCheckpointStore, MockCheckpointStore};
    use crate::context::RunOptions;
    use uuid::Uuid;

    fn context() -> RunContext {
        let mut ctx = RunContext::new(Uuid::new_v4(), "Autumn lamp launch", RunOptions::default());
        ctx.record_output("concept", "text").unwrap();
        ctx.mark_stage_completed("concept");
        ctx
    }

    #[tokio::test]
    async fn test_save_load_clear() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let manager = CheckpointManager::new(store.clone(), "run");

        assert!(manager.load().await.unwrap().is_none());
        manager.save(&context()).await.unwrap();
        assert_eq!(
            manager.load().await.unwrap().unwrap().last_completed_stage,
            "concept"
        );

        manager.clear().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_save_before_any_stage_fails() {
        let manager = CheckpointManager::new(Arc::new(InMemoryCheckpointStore::new()), "run");
        let ctx = RunContext::new(Uuid::new_v4(), "seed", RunOptions::default());
        assert!(manager.save(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_slots_are_independent() {
        let store = Arc::new(InMemoryCheckpointStore::new());
        let a = CheckpointManager::new(store.clone(), "a");
        let b = a.with_slot("b");

        a.save(&context()).await.unwrap();
        assert!(b.load().await.unwrap().is_none());
        assert_eq!(b.slot(), "b");
    }

    #[tokio::test]
    async fn test_store_failure_surfaces() {
        let mut store = MockCheckpointStore::new();
        store
            .expect_put()
            .times(1)
            .returning(|_, _| Err(CheckpointError::corrupt("run", "disk full")));

        let manager = CheckpointManager::new(Arc::new(store), "run");
        let err = manager.save(&context()).await.unwrap_err();
        assert!(err.to_string().contains("disk full"));
    }
}
