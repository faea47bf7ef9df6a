//! Spans and timing helpers for runs and stages.

use std::time::Instant;
use tracing::{info_span, Span};
use uuid::Uuid;

/// Creates the span wrapping a whole run.
#[must_use]
pub fn run_span(run_id: Uuid, resumed: bool) -> Span {
    info_span!("run", run_id = %run_id, resumed)
}

/// Creates the span wrapping one stage, including its loops.
#[must_use]
pub fn stage_span(stage_id: &str, gate: &str) -> Span {
    info_span!("stage", stage = stage_id, gate = gate)
}

/// Wall-clock timer for run duration fields.
#[derive(Debug, Clone, Copy)]
pub struct SpanTimer(Instant);

impl SpanTimer {
    /// Starts timing now.
    #[must_use]
    pub fn start() -> Self {
        Self(Instant::now())
    }

    /// Milliseconds since [`Self::start`].
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.0.elapsed().as_secs_f64() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_spans_without_subscriber() {
        let span = stage_span("concept", "rejection");
        let _guard = span.enter();
        let _run = run_span(Uuid::new_v4(), false);
    }
}
