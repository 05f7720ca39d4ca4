//! Metrics for renderer runs.

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Duration;

/// Metric names for the render pipeline.
pub mod names {
    /// Renderer runs by outcome.
    pub const RENDER_RUNS_TOTAL: &str = "mosaic_render_runs_total";
    /// Renderer runs killed at the deadline.
    pub const RENDER_TIMEOUTS_TOTAL: &str = "mosaic_render_timeouts_total";
    /// Renderer wall time in seconds.
    pub const RENDER_DURATION_SECONDS: &str = "mosaic_render_duration_seconds";
    /// Runs that produced no artifacts.
    pub const RENDER_ARTIFACTS_MISSING_TOTAL: &str = "mosaic_render_artifacts_missing_total";
    /// Paths that could not be removed.
    pub const RENDER_CLEANUP_FAILURES_TOTAL: &str = "mosaic_render_cleanup_failures_total";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::RENDER_RUNS_TOTAL, "Total renderer runs by outcome");
    describe_counter!(
        names::RENDER_TIMEOUTS_TOTAL,
        "Total renderer runs killed at the deadline"
    );
    describe_histogram!(
        names::RENDER_DURATION_SECONDS,
        "Renderer process wall time in seconds"
    );
    describe_counter!(
        names::RENDER_ARTIFACTS_MISSING_TOTAL,
        "Total runs that produced no artifacts"
    );
    describe_counter!(
        names::RENDER_CLEANUP_FAILURES_TOTAL,
        "Total temporary paths that could not be removed"
    );
}

/// Render metrics recorder.
#[derive(Clone)]
pub struct RenderMetrics;

impl RenderMetrics {
    /// Record the end of a renderer run.
    pub fn run_finished(outcome: &'static str, duration: Duration) {
        counter!(names::RENDER_RUNS_TOTAL, "outcome" => outcome).increment(1);
        if outcome == "timeout" {
            counter!(names::RENDER_TIMEOUTS_TOTAL).increment(1);
        }
        histogram!(names::RENDER_DURATION_SECONDS, "outcome" => outcome)
            .record(duration.as_secs_f64());
    }

    pub fn artifacts_missing() {
        counter!(names::RENDER_ARTIFACTS_MISSING_TOTAL).increment(1);
    }

    pub fn cleanup_failures(count: usize) {
        counter!(names::RENDER_CLEANUP_FAILURES_TOTAL).increment(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_metrics() {
        register_metrics();
        RenderMetrics::run_finished("success", Duration::from_millis(120));
        RenderMetrics::run_finished("timeout", Duration::from_secs(600));
        RenderMetrics::artifacts_missing();
        RenderMetrics::cleanup_failures(2);
    }
}
