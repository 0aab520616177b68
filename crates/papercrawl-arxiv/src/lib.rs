//! Papercrawl arXiv - resumable, rate-limited arXiv crawl pipeline
//!
//! Each paper in an identifier range runs through four stages, each writing
//! its artifacts under `<root>/<yyyymm-nnnnn>/`:
//!
//! 1. download: every version's source archive (arXiv e-print)
//! 2. clean: unpack, drop images, strip figure markup
//! 3. metadata: `metadata.json` + `references.bib` (arXiv Atom API)
//! 4. references: `references.json` (Semantic Scholar Graph API)
//!
//! Completed stages are detected from disk, so re-running a range resumes
//! where the previous run stopped. Terminal failures are appended to
//! `<root>/failed_ids.tsv`, per-paper timings to `<root>/benchmark.csv`, and
//! each run's summary replaces `<root>/statistics.txt`.
//!
//! # Example
//!
//! ```no_run
//! use papercrawl_arxiv::{CrawlConfig, IdRange, run};
//! use std::sync::Arc;
//!
//! let config = CrawlConfig::default();
//! let range = IdRange::new(824, 830, 2025, 10).expect("valid range");
//! let progress = Arc::new(papercrawl_core::ProgressContext::new());
//!
//! let stats = run(&config, &range, progress).expect("crawl failed");
//! println!("{} succeeded, {} failed", stats.succeeded, stats.failed);
//! ```

pub mod arxiv_api;
pub mod benchmark;
pub mod clean;
pub mod config;
pub mod detect;
pub mod download;
pub mod identifier;
pub mod layout;
pub mod ledger;
pub mod metadata;
pub mod orchestrator;
pub mod references;
pub mod runner;
pub mod stage;
pub mod stats;
pub mod status;

// Re-exports for convenience
pub use clean::{CleanReport, Cleaner};
pub use config::CrawlConfig;
pub use detect::completed_stages;
pub use download::Downloader;
pub use identifier::{IdRange, Identifier, IdentifierError, enumerate};
pub use layout::WorkUnit;
pub use ledger::{FailureLedger, LedgerEntry};
pub use metadata::MetadataWriter;
pub use orchestrator::{Orchestrator, Pipeline, StageCollaborator, StageReport, UnitOutcome};
pub use references::ReferenceFetcher;
pub use runner::{retry_failed, run};
pub use stage::{Stage, UnitState};
pub use stats::RunStats;
pub use status::{StatusReport, scan as scan_status};
