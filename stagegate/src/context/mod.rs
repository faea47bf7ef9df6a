//! Run state threaded explicitly through every stage call.
//!
//! This module provides:
//! - [`RunOptions`], the standing directives and loop bounds of a run
//! - [`RunContext`], the append-only accumulator of stage outputs
//! - [`ExtractionRule`] and [`DerivedConstraints`] for values locked by early stages

mod constraints;
mod options;
mod run_context;

pub use constraints::{DerivedConstraints, ExtractionRule};
pub use options::{ExhaustionPolicy, RunOptions, DEFAULT_MAX_REVISIONS, MAX_REVISIONS_LIMIT};
pub use run_context::RunContext;
