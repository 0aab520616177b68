//! Per-unit pipeline orchestration
//!
//! Strictly sequential: one identifier at a time, its stages in order. For
//! each unit the completed-stage set is re-detected from disk, outstanding
//! stages run through the retry policy (remote ones taking a rate-limiter
//! permit per attempt), and a terminal failure becomes one ledger entry
//! before moving on to the next identifier. A ledger that can no longer be
//! appended to ends the run with a [`ConfigError`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indicatif::ProgressBar;
use papercrawl_core::{
    ConfigError, ProgressContext, RateLimiter, RetryPolicy, SharedProgress, StageError,
};

use crate::benchmark::{BenchmarkLog, BenchmarkRow};
use crate::clean::CleanReport;
use crate::detect;
use crate::identifier::{IdRange, Identifier};
use crate::layout::{self, WorkUnit};
use crate::ledger::{FailureLedger, LedgerEntry};
use crate::stage::{Stage, UnitState};
use crate::stats::RunStats;

/// What a successful stage produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StageReport {
    Download { versions: u32, bytes: u64 },
    Clean(CleanReport),
    Metadata { versions: usize },
    References { count: usize },
}

/// Executes one stage for one unit.
///
/// Collaborators are stateless between calls. The orchestrator takes a
/// limiter permit before each attempt of a remote stage; a collaborator making
/// more than one outbound request per attempt calls `limiter.acquire()` before
/// each additional request.
pub trait StageCollaborator {
    fn run(&self, unit: &WorkUnit, limiter: &RateLimiter) -> Result<StageReport, StageError>;
}

/// The four collaborators, one per stage.
pub struct Pipeline {
    pub download: Box<dyn StageCollaborator>,
    pub clean: Box<dyn StageCollaborator>,
    pub metadata: Box<dyn StageCollaborator>,
    pub references: Box<dyn StageCollaborator>,
}

impl Pipeline {
    pub fn collaborator(&self, stage: Stage) -> &dyn StageCollaborator {
        match stage {
            Stage::Download => self.download.as_ref(),
            Stage::Clean => self.clean.as_ref(),
            Stage::Metadata => self.metadata.as_ref(),
            Stage::References => self.references.as_ref(),
        }
    }
}

/// How processing one unit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Every stage was already complete on entry
    Skipped,
    Completed,
    Failed { stage: Stage, reason: String },
    /// Shutdown requested before the unit finished
    Interrupted(UnitState),
}

pub struct Orchestrator<'a> {
    root: PathBuf,
    pipeline: Pipeline,
    limiter: RateLimiter,
    retry: RetryPolicy,
    ledger: FailureLedger,
    benchmark: BenchmarkLog,
    shutdown: &'a AtomicBool,
    progress: SharedProgress,
}

impl Orchestrator<'static> {
    /// Create the output root and open its ledger and benchmark log. Fails
    /// before any unit is touched.
    pub fn new(
        root: impl Into<PathBuf>,
        pipeline: Pipeline,
        limiter: RateLimiter,
        retry: RetryPolicy,
    ) -> Result<Self, ConfigError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| ConfigError::UnwritableRoot {
            path: root.clone(),
            source,
        })?;
        let ledger = FailureLedger::open(layout::ledger_path(&root))?;
        let benchmark_path = layout::benchmark_path(&root);
        let benchmark = BenchmarkLog::open(&benchmark_path).map_err(|source| {
            ConfigError::UnwritableRoot {
                path: benchmark_path,
                source,
            }
        })?;
        Ok(Orchestrator {
            root,
            pipeline,
            limiter,
            retry,
            ledger,
            benchmark,
            shutdown: papercrawl_core::shutdown_flag(),
            progress: Arc::new(ProgressContext::hidden()),
        })
    }
}

impl<'a> Orchestrator<'a> {
    /// Use `flag` instead of the process-wide shutdown flag.
    pub fn with_shutdown<'b>(self, flag: &'b AtomicBool) -> Orchestrator<'b> {
        Orchestrator {
            root: self.root,
            pipeline: self.pipeline,
            limiter: self.limiter,
            retry: self.retry,
            ledger: self.ledger,
            benchmark: self.benchmark,
            shutdown: flag,
            progress: self.progress,
        }
    }

    pub fn with_progress(mut self, progress: SharedProgress) -> Self {
        self.progress = progress;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Process every identifier in `range`.
    pub fn run_range(&self, range: &IdRange) -> Result<RunStats, ConfigError> {
        let label = format!("{:04}{:02}", range.year(), range.month());
        self.run_ids(&label, range.iter(), range.len())
    }

    /// Process `ids` in order; `total` sizes the progress bar.
    ///
    /// Stage failures are recorded and the run moves on; only a failure to
    /// record one is returned as an error.
    pub fn run_ids(
        &self,
        label: &str,
        ids: impl IntoIterator<Item = Identifier>,
        total: usize,
    ) -> Result<RunStats, ConfigError> {
        let start = Instant::now();
        let mut stats = RunStats::default();
        let pb = self.progress.range_bar(label, total as u64);

        for id in ids {
            if self.shutdown_requested() {
                log::warn!("Shutdown requested, stopping before {id}");
                stats.interrupted = true;
                break;
            }
            pb.set_message(id.canonical());
            let unit_start = Instant::now();
            let outcome = match self.process_unit(id, &mut stats, &pb) {
                Ok(outcome) => outcome,
                Err(e) => {
                    pb.finish_and_clear();
                    log::error!("{id}: {e}, aborting run");
                    return Err(e);
                }
            };
            if outcome != UnitOutcome::Skipped {
                self.record_benchmark(id, &outcome, unit_start, &mut stats);
            }
            match outcome {
                UnitOutcome::Interrupted(state) => {
                    log::warn!("{id}: interrupted ({state}), will resume on next run");
                    stats.interrupted = true;
                    break;
                }
                UnitOutcome::Failed { stage, reason } => {
                    log::error!("{id}: {stage} failed: {reason}");
                }
                UnitOutcome::Completed => log::info!("{id}: complete"),
                UnitOutcome::Skipped => log::debug!("{id}: already complete, skipping"),
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        stats.elapsed = start.elapsed();
        stats.peak_rss_kb = papercrawl_core::peak_rss_kb();
        Ok(stats)
    }

    /// Append the unit's benchmark row. A row that cannot be written is only logged.
    fn record_benchmark(
        &self,
        id: Identifier,
        outcome: &UnitOutcome,
        started: Instant,
        stats: &mut RunStats,
    ) {
        let mut row = BenchmarkRow::new(id, outcome, started.elapsed());
        let dir = WorkUnit::new(&self.root, id).dir;
        row.output_bytes = layout::dir_size(&dir).unwrap_or_else(|e| {
            log::debug!("{id}: cannot size {}: {e}", dir.display());
            0
        });
        row.peak_rss_kb = papercrawl_core::peak_rss_kb();
        stats.output_bytes += row.output_bytes;

        if let Err(e) = self.benchmark.append(&row) {
            log::warn!(
                "{id}: cannot append to {}: {e}",
                self.benchmark.path().display()
            );
        }
    }

    /// Drive one unit through its outstanding stages, updating `stats`.
    ///
    /// Errors only when a terminal failure cannot be written to the ledger.
    fn process_unit(
        &self,
        id: Identifier,
        stats: &mut RunStats,
        pb: &ProgressBar,
    ) -> Result<UnitOutcome, ConfigError> {
        let unit = WorkUnit::new(&self.root, id);
        let done = detect::completed_stages(&unit);
        if done.len() == Stage::ALL.len() {
            stats.skipped += 1;
            return Ok(UnitOutcome::Skipped);
        }

        stats.attempted += 1;
        let mut state = UnitState::from_completed(&done);
        log::debug!("{id}: resuming from {state}");

        for stage in Stage::ALL {
            if done.contains(&stage) {
                continue;
            }
            if self.shutdown_requested() {
                return Ok(UnitOutcome::Interrupted(state));
            }
            pb.set_message(format!("{id} {stage}"));

            match self.run_stage(&unit, stage, pb) {
                Ok(report) => {
                    log::debug!("{id}: {stage} done: {report:?}");
                    stats.record_report(&report);
                    state = UnitState::after(stage);
                }
                Err(reason) => {
                    let entry = LedgerEntry::new(id, stage, reason.clone());
                    self.ledger
                        .append(&entry)
                        .map_err(|source| ConfigError::UnwritableRoot {
                            path: self.ledger.path().to_path_buf(),
                            source,
                        })?;
                    stats.record_failure(stage);
                    return Ok(UnitOutcome::Failed { stage, reason });
                }
            }
        }

        stats.succeeded += 1;
        Ok(UnitOutcome::Completed)
    }

    fn run_stage(&self, unit: &WorkUnit, stage: Stage, pb: &ProgressBar) -> Result<StageReport, String> {
        let collaborator = self.pipeline.collaborator(stage);
        let label = format!("{} {stage}", unit.id);
        let attempt = || collaborator.run(unit, &self.limiter);
        let result = if stage.is_remote() {
            self.retry.execute_guarded(&self.limiter, &label, pb, attempt)
        } else {
            self.retry.execute(&label, pb, attempt)
        };
        result.map_err(|failure| failure.to_string())
    }
}
