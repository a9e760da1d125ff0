//! Resumable batch pipeline.
//!
//! Drives any [`Extractor`] into any [`Loader`] one batch at a time:
//!
//! 1. Start from the stored checkpoint (or `--from-offset`, or the beginning)
//! 2. Extract a batch; an empty batch ends the run
//! 3. Load it (skipped in dry-run)
//! 4. Persist the next offset (skipped in dry-run)
//!
//! On completion the checkpoint is removed. On failure it is left at the
//! last persisted offset, so the next resuming run retries the failed batch.

use checkpoint::{Checkpoint, CheckpointManager};
use std::fmt;
use std::time::{Duration, Instant};
use sync_core::{Extractor, LoadSummary, Loader, Offset};
use tracing::Instrument;

use crate::error::MigrationError;
use crate::progress::{records_per_second, ProgressReporter, TracingProgress};

pub const DEFAULT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Idle => "idle",
            PipelineState::Running => "running",
            PipelineState::Completed => "completed",
            PipelineState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: usize,
    /// Walk the source without writing to the target or the checkpoint
    pub dry_run: bool,
    /// Start from the stored checkpoint, if there is one
    pub resume: bool,
    /// Explicit start position. Takes precedence over the stored checkpoint.
    pub start_offset: Option<Offset>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            resume: true,
            start_offset: None,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub state: PipelineState,
    pub batches: usize,
    /// Records read from the source
    pub extracted: usize,
    /// Totals over every loaded batch. Empty in dry-run.
    pub summary: LoadSummary,
    pub start_offset: Offset,
    pub final_offset: Offset,
    pub elapsed: Duration,
    pub dry_run: bool,
}

impl PipelineReport {
    pub fn records_per_second(&self) -> f64 {
        records_per_second(self.extracted, self.elapsed)
    }
}

pub struct Pipeline<E, L> {
    extractor: E,
    loader: L,
    checkpoints: CheckpointManager,
    options: PipelineOptions,
    progress: Box<dyn ProgressReporter>,
    state: PipelineState,
}

impl<E: Extractor, L: Loader> Pipeline<E, L> {
    pub fn new(
        extractor: E,
        loader: L,
        checkpoints: CheckpointManager,
        options: PipelineOptions,
    ) -> Self {
        Self {
            extractor,
            loader,
            checkpoints,
            options,
            progress: Box::new(TracingProgress),
            state: PipelineState::Idle,
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressReporter + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn into_parts(self) -> (E, L) {
        (self.extractor, self.loader)
    }

    /// Run the migration to completion.
    pub async fn run(&mut self) -> Result<PipelineReport, MigrationError> {
        if self.state != PipelineState::Idle {
            return Err(MigrationError::InvalidState(self.state));
        }
        self.state = PipelineState::Running;

        let span = tracing::info_span!(
            "migrate",
            source = %self.extractor.source_name(),
            target = %self.loader.target_name(),
            dry_run = self.options.dry_run,
        );

        let result = self.run_batches().instrument(span).await;
        self.state = match &result {
            Ok(_) => PipelineState::Completed,
            Err(_) => PipelineState::Failed,
        };

        match result {
            Ok(mut report) => {
                report.state = self.state;
                self.progress.finished(&report);
                Ok(report)
            }
            Err(e) => {
                tracing::error!("Migration failed: {e}");
                if let Some(offset) = e.resume_offset() {
                    tracing::info!(
                        "Resume from checkpoint at {} (or pass --from-offset {})",
                        self.checkpoints.location(),
                        offset.to_cli_string()
                    );
                }
                Err(e)
            }
        }
    }

    async fn start_offset(&self) -> Result<Offset, MigrationError> {
        if let Some(offset) = &self.options.start_offset {
            tracing::info!("Starting from explicit offset {offset}");
            return Ok(offset.clone());
        }
        if !self.options.resume {
            return Ok(Offset::None);
        }

        let stored = self
            .checkpoints
            .load::<Offset>()
            .await
            .map_err(MigrationError::Checkpoint)?;
        match stored {
            Some(offset) => {
                tracing::info!(
                    "Resuming from checkpoint {} at offset {offset}",
                    self.checkpoints.location()
                );
                Ok(offset)
            }
            None => Ok(Offset::None),
        }
    }

    async fn run_batches(&mut self) -> Result<PipelineReport, MigrationError> {
        let started = Instant::now();
        let batch_size = self.options.batch_size.max(1);
        let dry_run = self.options.dry_run;

        let start_offset = self.start_offset().await?;
        let mut offset = start_offset.clone();
        let mut batches = 0;
        let mut extracted = 0;
        let mut total = LoadSummary::default();

        if dry_run {
            tracing::info!("Running in dry-run mode - no data will be written");
        }

        loop {
            let batch_started = Instant::now();
            let batch = self
                .extractor
                .extract(batch_size, &offset)
                .await
                .map_err(|source| MigrationError::Extraction {
                    source_name: self.extractor.source_name().to_string(),
                    offset: offset.clone(),
                    source,
                })?;

            if batch.is_end() {
                break;
            }

            let summary = if dry_run {
                tracing::debug!(
                    "Dry run: would load {} records into {}",
                    batch.len(),
                    self.loader.target_name()
                );
                LoadSummary::default()
            } else {
                self.loader
                    .load(&batch.records)
                    .await
                    .map_err(|source| MigrationError::Load {
                        target: self.loader.target_name().to_string(),
                        offset: offset.clone(),
                        source,
                    })?
            };

            offset = batch.next_offset.clone();
            if !dry_run {
                self.checkpoints
                    .save(&offset)
                    .await
                    .map_err(MigrationError::Checkpoint)?;
            }

            batches += 1;
            extracted += batch.len();
            total.merge(&summary);
            self.progress
                .batch_done(&offset, batch.len(), &summary, batch_started.elapsed());
        }

        if !dry_run {
            self.checkpoints
                .clear()
                .await
                .map_err(MigrationError::Checkpoint)?;
        }

        Ok(PipelineReport {
            state: PipelineState::Running,
            batches,
            extracted,
            summary: total,
            start_offset,
            final_offset: offset,
            elapsed: started.elapsed(),
            dry_run,
        })
    }
}
