//! Progress reporting for migration runs.

use std::time::Duration;
use sync_core::{LoadSummary, Offset};

/// Receives progress from the pipeline. Calls are fire-and-forget.
pub trait ProgressReporter: Send + Sync {
    /// A batch was extracted and (unless in dry-run) loaded.
    fn batch_done(&self, offset: &Offset, records: usize, summary: &LoadSummary, elapsed: Duration);

    /// The run finished, successfully or not.
    fn finished(&self, report: &crate::pipeline::PipelineReport);
}

/// Emits progress as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn batch_done(&self, offset: &Offset, records: usize, summary: &LoadSummary, elapsed: Duration) {
        tracing::info!(
            offset = %offset,
            records,
            written = summary.written,
            skipped = summary.skipped,
            records_per_second = %format!("{:.1}", records_per_second(records, elapsed)),
            "Batch processed"
        );
    }

    fn finished(&self, report: &crate::pipeline::PipelineReport) {
        tracing::info!(
            state = %report.state,
            batches = report.batches,
            extracted = report.extracted,
            final_offset = %report.final_offset,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Migration finished: {}",
            report.summary
        );
    }
}

pub(crate) fn records_per_second(records: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        records as f64 / secs
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_per_second() {
        assert_eq!(records_per_second(500, Duration::from_millis(250)), 2000.0);
        assert_eq!(records_per_second(10, Duration::ZERO), 0.0);
    }
}
