//! Run lifecycle events.
//!
//! The engine reports progress to an [`EventSink`] passed in at build time.
//! Event names are dotted and stable; payloads are JSON objects.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A run started from a fresh seed.
pub const RUN_STARTED: &str = "run.started";
/// A run resumed from a checkpoint.
pub const RUN_RESUMED: &str = "run.resumed";
/// A run produced its final artifact.
pub const RUN_COMPLETED: &str = "run.completed";
/// A run unwound on cancellation.
pub const RUN_CANCELLED: &str = "run.cancelled";
/// A run stopped on an error.
pub const RUN_FAILED: &str = "run.failed";
/// A stage is about to be composed and invoked.
pub const STAGE_STARTED: &str = "stage.started";
/// A stage output was accepted into the run context.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// A gate asked for another attempt.
pub const GATE_RETRY: &str = "gate.retry";
/// A gate was passed by policy without its signal clearing.
pub const GATE_UNRESOLVED: &str = "gate.unresolved";
/// A revision loop finished one draft→critique iteration.
pub const REVISION_ATTEMPT: &str = "revision.attempt";
/// A checkpoint was written.
pub const CHECKPOINT_SAVED: &str = "checkpoint.saved";
