//! Cooperative cancellation for runs.
//!
//! A single [`CancellationToken`] is shared between the caller and the
//! engine. The engine checks it on both edges of every gateway call.

mod token;

pub use token::CancellationToken;
