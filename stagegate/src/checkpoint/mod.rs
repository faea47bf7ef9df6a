//! Durable snapshots of in-flight runs.
//!
//! This module provides:
//! - [`Checkpoint`], the versioned snapshot written after every stage
//! - [`CheckpointStore`] with in-memory and file-backed implementations
//! - [`CheckpointManager`], which binds a store to a single slot key

mod manager;
mod snapshot;
mod store;

pub use manager::CheckpointManager;
pub use snapshot::{Checkpoint, CHECKPOINT_VERSION};
pub use store::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};

#[cfg(test)]
pub use store::MockCheckpointStore;
