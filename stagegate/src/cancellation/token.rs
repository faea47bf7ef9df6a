//! Cancellation token shared between callers and the engine.

use std::sync::OnceLock;
use tracing::{debug, info};

/// A token for cooperative cancellation.
///
/// Setting the token never interrupts an in-flight gateway call; the engine
/// observes it at the next suspension edge. Cancellation is idempotent and
/// only the first reason is kept.
#[derive(Debug, Default)]
pub struct CancellationToken {
    reason: OnceLock<String>,
}

impl CancellationToken {
    /// Creates an unset token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Returns true if this call set the token.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        match self.reason.set(reason) {
            Ok(()) => {
                info!(reason = self.reason.get().map(String::as_str), "Cancellation requested");
                true
            }
            Err(ignored) => {
                debug!(ignored = %ignored, "Token already cancelled");
                false
            }
        }
    }

    /// Returns whether cancellation has been requested.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.reason.get().is_some()
    }

    /// Returns the first cancellation reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.reason.get().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_token_starts_unset() {
        let token = CancellationToken::new();
        assert!(!token.is_set());
        assert_eq!(token.reason(), None);
    }

    #[test]
    fn test_first_reason_wins() {
        let token = CancellationToken::new();
        assert!(token.cancel("operator abort"));
        assert!(!token.cancel("deadline"));

        assert!(token.is_set());
        assert_eq!(token.reason().as_deref(), Some("operator abort"));
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let token = Arc::new(CancellationToken::new());
        let remote = Arc::clone(&token);

        std::thread::spawn(move || remote.cancel("from worker"))
            .join()
            .unwrap();

        assert_eq!(token.reason().as_deref(), Some("from worker"));
    }
}
