//! Entry points for a crawl run

use std::path::Path;

use anyhow::{Context, Result};
use papercrawl_core::{SharedProgress, fmt_num};

use crate::config::CrawlConfig;
use crate::identifier::IdRange;
use crate::layout;
use crate::ledger;
use crate::stats::RunStats;

/// Crawl every identifier in `range`.
pub fn run(config: &CrawlConfig, range: &IdRange, progress: SharedProgress) -> Result<RunStats> {
    let orchestrator = config
        .orchestrator()
        .context("Invalid crawl configuration")?
        .with_progress(progress);

    log::info!(
        "Crawling {}..{} ({} ids) into {} (min interval {:?})",
        range.first(),
        range.last(),
        fmt_num(range.len()),
        config.output_dir.display(),
        config.interval
    );
    let stats = orchestrator.run_range(range).context("Crawl aborted")?;
    save_report(&stats, &config.output_dir);
    Ok(stats)
}

/// Re-run every identifier recorded in the failure ledger.
///
/// The ledger is only appended to: identifiers that fail again get a new entry,
/// ones that now succeed keep their old lines.
pub fn retry_failed(config: &CrawlConfig, progress: SharedProgress) -> Result<RunStats> {
    let path = layout::ledger_path(&config.output_dir);
    let entries = ledger::read_entries(&path)
        .with_context(|| format!("Failed to read ledger {}", path.display()))?;
    let ids = ledger::failed_ids(&entries);
    if ids.is_empty() {
        log::info!("No failed identifiers in {}", path.display());
        return Ok(RunStats::default());
    }

    let orchestrator = config
        .orchestrator()
        .context("Invalid crawl configuration")?
        .with_progress(progress);

    log::info!(
        "Retrying {} failed ids ({} ledger entries)",
        fmt_num(ids.len()),
        fmt_num(entries.len())
    );
    let total = ids.len();
    let stats = orchestrator
        .run_ids("retry", ids, total)
        .context("Retry aborted")?;
    save_report(&stats, &config.output_dir);
    Ok(stats)
}

fn save_report(stats: &RunStats, root: &Path) {
    match stats.write_report(root) {
        Ok(path) => log::info!("Statistics written to {}", path.display()),
        Err(e) => log::warn!("Cannot write statistics under {}: {e}", root.display()),
    }
}
