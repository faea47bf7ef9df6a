//! Observability utilities.

mod spans;
mod subscriber;

pub use spans::{run_span, stage_span, SpanTimer};
pub use subscriber::{init_tracing, LogFormat, DEFAULT_FILTER};
