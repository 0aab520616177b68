//! Run statistics collection and reporting.
//!
//! Counters are reported once at the end of a run: as a table on a TTY, as
//! log lines otherwise. The same table, without colors, is saved to
//! `<root>/statistics.txt`.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use papercrawl_core::fmt_num;

use crate::layout;
use crate::orchestrator::StageReport;
use crate::stage::Stage;

/// Aggregated outcome of one crawl run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStats {
    /// Units for which at least one stage was run
    pub attempted: usize,
    /// Units that reached the final stage in this run
    pub succeeded: usize,
    /// Units abandoned after a terminal stage failure
    pub failed: usize,
    /// Units already complete on entry
    pub skipped: usize,
    /// Run stopped early by a shutdown request
    pub interrupted: bool,
    pub elapsed: Duration,

    /// Terminal failures per stage
    pub failures_by_stage: BTreeMap<Stage, usize>,
    /// Archive versions fetched and their bytes
    pub versions_downloaded: usize,
    pub bytes_downloaded: u64,
    /// Extracted source size before/after stripping figures (cleaned units only)
    pub cleaned_units: usize,
    pub source_bytes_before: u64,
    pub source_bytes_after: u64,
    pub figures_stripped: usize,
    pub images_removed: usize,
    /// Units whose references stage ran
    pub reference_units: usize,
    /// arXiv-identified references found across those units
    pub references_total: usize,
    /// Units with at least one arXiv reference
    pub units_with_references: usize,
    /// On-disk size of the attempted units once each finished
    pub output_bytes: u64,
    /// Peak resident memory of the process at the end of the run
    pub peak_rss_kb: Option<u64>,
}

impl RunStats {
    /// Fold one successful stage report into the totals.
    pub fn record_report(&mut self, report: &StageReport) {
        match report {
            StageReport::Download { versions, bytes } => {
                self.versions_downloaded += *versions as usize;
                self.bytes_downloaded += bytes;
            }
            StageReport::Clean(clean) => {
                self.cleaned_units += 1;
                self.source_bytes_before += clean.bytes_before;
                self.source_bytes_after += clean.bytes_after;
                self.figures_stripped += clean.figures_stripped;
                self.images_removed += clean.images_removed;
            }
            StageReport::Metadata { .. } => {}
            StageReport::References { count } => {
                self.reference_units += 1;
                self.references_total += count;
                if *count > 0 {
                    self.units_with_references += 1;
                }
            }
        }
    }

    pub fn record_failure(&mut self, stage: Stage) {
        self.failed += 1;
        *self.failures_by_stage.entry(stage).or_default() += 1;
    }

    /// Units seen by the run (attempted + skipped).
    pub fn total(&self) -> usize {
        self.attempted + self.skipped
    }

    pub fn success_rate(&self) -> f64 {
        pct(self.succeeded, self.attempted)
    }

    /// Average extracted size per cleaned unit, before and after stripping (MB).
    pub fn avg_size_mb(&self) -> (f64, f64) {
        if self.cleaned_units == 0 {
            return (0.0, 0.0);
        }
        let n = self.cleaned_units as f64;
        (
            self.source_bytes_before as f64 / n / MB,
            self.source_bytes_after as f64 / n / MB,
        )
    }

    pub fn size_reduction_pct(&self) -> f64 {
        if self.source_bytes_before == 0 {
            return 0.0;
        }
        let saved = self.source_bytes_before.saturating_sub(self.source_bytes_after);
        saved as f64 / self.source_bytes_before as f64 * 100.0
    }

    pub fn avg_references(&self) -> f64 {
        if self.reference_units == 0 {
            return 0.0;
        }
        self.references_total as f64 / self.reference_units as f64
    }

    pub fn reference_hit_rate(&self) -> f64 {
        pct(self.units_with_references, self.reference_units)
    }

    pub fn avg_time_per_success(&self) -> Duration {
        match u32::try_from(self.succeeded) {
            Ok(n) if n > 0 => self.elapsed / n,
            _ => Duration::ZERO,
        }
    }

    /// Format summary table as a string.
    pub fn format_table(&self) -> String {
        format!("\n{}", self.build_table())
    }

    /// Plain-text report: timestamp and the summary table without colors.
    pub fn format_report(&self) -> String {
        let mut table = self.build_table();
        table.force_no_tty();
        format!(
            "papercrawl run finished {}\n\n{table}\n",
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    /// Replace `<root>/statistics.txt` with this run's report.
    pub fn write_report(&self, root: &Path) -> io::Result<PathBuf> {
        let path = layout::statistics_path(root);
        layout::write_atomic(&path, self.format_report().as_bytes())?;
        Ok(path)
    }

    fn build_table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .apply_modifier(UTF8_ROUND_CORNERS)
            .set_header(vec![
                Cell::new("Crawl Summary")
                    .fg(Color::Cyan)
                    .add_attribute(comfy_table::Attribute::Bold),
                Cell::new("Value").fg(Color::Cyan),
            ]);

        table.add_row(vec![
            Cell::new("Units"),
            Cell::new(format!(
                "{} ({} attempted, {} skipped)",
                fmt_num(self.total()),
                fmt_num(self.attempted),
                fmt_num(self.skipped)
            )),
        ]);
        table.add_row(vec![
            Cell::new("Succeeded").fg(Color::Green),
            Cell::new(format!(
                "{} ({:.1}%)",
                fmt_num(self.succeeded),
                self.success_rate()
            ))
            .fg(Color::Green),
        ]);
        let failed_color = if self.failed > 0 {
            Color::Red
        } else {
            Color::Reset
        };
        table.add_row(vec![
            Cell::new("Failed").fg(failed_color),
            Cell::new(format!("{}{}", fmt_num(self.failed), self.failure_breakdown()))
                .fg(failed_color),
        ]);
        if self.versions_downloaded > 0 {
            table.add_row(vec![
                Cell::new("Downloaded"),
                Cell::new(format!(
                    "{} versions, {:.2} MB",
                    fmt_num(self.versions_downloaded),
                    self.bytes_downloaded as f64 / MB
                )),
            ]);
        }
        if self.cleaned_units > 0 {
            let (before, after) = self.avg_size_mb();
            table.add_row(vec![
                Cell::new("Avg size before/after"),
                Cell::new(format!(
                    "{before:.2} MB / {after:.2} MB (-{:.1}%)",
                    self.size_reduction_pct()
                )),
            ]);
            table.add_row(vec![
                Cell::new("Figures/images removed"),
                Cell::new(format!(
                    "{} / {}",
                    fmt_num(self.figures_stripped),
                    fmt_num(self.images_removed)
                )),
            ]);
        }
        if self.output_bytes > 0 {
            table.add_row(vec![
                Cell::new("Output written"),
                Cell::new(format!("{:.2} MB", self.output_bytes as f64 / MB)),
            ]);
        }
        if let Some(kb) = self.peak_rss_kb {
            table.add_row(vec![
                Cell::new("Peak memory"),
                Cell::new(format!("{:.1} MB", kb as f64 / 1024.0)),
            ]);
        }
        if self.reference_units > 0 {
            table.add_row(vec![
                Cell::new("Avg references"),
                Cell::new(format!(
                    "{:.2} ({:.1}% of papers with any)",
                    self.avg_references(),
                    self.reference_hit_rate()
                )),
            ]);
        }
        table.add_row(vec![
            Cell::new("Time"),
            Cell::new(format!(
                "{} ({} per paper)",
                format_duration(self.elapsed),
                format_duration(self.avg_time_per_success())
            )),
        ]);
        if self.interrupted {
            table.add_row(vec![
                Cell::new("Interrupted").fg(Color::Yellow),
                Cell::new("resume by re-running the same command").fg(Color::Yellow),
            ]);
        }
        table
    }

    /// Log minimal summary (non-TTY mode).
    pub fn log(&self) {
        log::info!(
            "Crawl {}: {} succeeded, {} failed, {} skipped ({} attempted) in {}",
            if self.interrupted {
                "interrupted"
            } else {
                "complete"
            },
            fmt_num(self.succeeded),
            fmt_num(self.failed),
            fmt_num(self.skipped),
            fmt_num(self.attempted),
            format_duration(self.elapsed)
        );
        if self.failed > 0 {
            log::info!("Failures by stage:{}", self.failure_breakdown());
        }
        if self.cleaned_units > 0 {
            let (before, after) = self.avg_size_mb();
            log::info!(
                "Avg size {before:.2} MB -> {after:.2} MB (-{:.1}%)",
                self.size_reduction_pct()
            );
        }
        if let Some(kb) = self.peak_rss_kb {
            log::info!(
                "Output written {:.2} MB, peak memory {:.1} MB",
                self.output_bytes as f64 / MB,
                kb as f64 / 1024.0
            );
        }
        if self.reference_units > 0 {
            log::info!(
                "Avg references {:.2}, {:.1}% of papers with any",
                self.avg_references(),
                self.reference_hit_rate()
            );
        }
    }

    fn failure_breakdown(&self) -> String {
        self.failures_by_stage
            .iter()
            .map(|(stage, n)| format!(" {stage}={n}"))
            .collect()
    }
}

const MB: f64 = 1024.0 * 1024.0;

/// `12.34s`, `2.50m (150.00s)` or `1.50h (30.00m)`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.2}s")
    } else if secs < 3600.0 {
        format!("{:.2}m ({secs:.2}s)", secs / 60.0)
    } else {
        format!("{:.2}h ({:.2}m)", secs / 3600.0, (secs % 3600.0) / 60.0)
    }
}

/// Calculate percentage safely.
fn pct(part: usize, total: usize) -> f64 {
    if total > 0 {
        part as f64 / total as f64 * 100.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::CleanReport;

    #[test]
    fn pct_zero_total() {
        assert_eq!(pct(3, 0), 0.0);
    }

    #[test]
    fn format_duration_units() {
        assert_eq!(format_duration(Duration::from_millis(12_340)), "12.34s");
        assert_eq!(format_duration(Duration::from_secs(150)), "2.50m (150.00s)");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1.50h (30.00m)");
    }

    #[test]
    fn failures_counted_per_stage() {
        let mut stats = RunStats::default();
        stats.record_failure(Stage::Download);
        stats.record_failure(Stage::Download);
        stats.record_failure(Stage::References);
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.failures_by_stage[&Stage::Download], 2);
        assert_eq!(stats.failure_breakdown(), " download=2 references=1");
    }

    #[test]
    fn clean_reports_aggregate_sizes() {
        let mut stats = RunStats::default();
        stats.record_report(&StageReport::Clean(CleanReport {
            bytes_before: 4 * 1024 * 1024,
            bytes_after: 1024 * 1024,
            ..Default::default()
        }));
        stats.record_report(&StageReport::Clean(CleanReport {
            bytes_before: 0,
            bytes_after: 0,
            ..Default::default()
        }));
        let (before, after) = stats.avg_size_mb();
        assert!((before - 2.0).abs() < 1e-9);
        assert!((after - 0.5).abs() < 1e-9);
        assert!((stats.size_reduction_pct() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn reference_rates() {
        let mut stats = RunStats::default();
        for count in [0, 4, 8] {
            stats.record_report(&StageReport::References { count });
        }
        assert!((stats.avg_references() - 4.0).abs() < 1e-9);
        assert!((stats.reference_hit_rate() - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn avg_time_ignores_zero_successes() {
        let stats = RunStats {
            elapsed: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(stats.avg_time_per_success(), Duration::ZERO);
        let stats = RunStats {
            succeeded: 4,
            ..stats
        };
        assert_eq!(stats.avg_time_per_success(), Duration::from_millis(2500));
    }

    #[test]
    fn table_mentions_interruption() {
        let stats = RunStats {
            attempted: 2,
            succeeded: 1,
            interrupted: true,
            ..Default::default()
        };
        let table = stats.format_table();
        assert!(table.contains("Crawl Summary"));
        assert!(table.contains("Interrupted"));
    }

    #[test]
    fn report_is_plain_text() {
        let stats = RunStats {
            attempted: 3,
            succeeded: 2,
            failed: 1,
            output_bytes: 3 * 1024 * 1024,
            peak_rss_kb: Some(20480),
            ..Default::default()
        };
        let report = stats.format_report();
        assert!(report.starts_with("papercrawl run finished "));
        assert!(!report.contains('\u{1b}'));
        assert!(report.contains("Output written"));
        assert!(report.contains("3.00 MB"));
        assert!(report.contains("Peak memory"));
        assert!(report.contains("20.0 MB"));
    }

    #[test]
    fn report_replaces_previous_file() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(layout::statistics_path(dir.path()), "stale").unwrap();

        let stats = RunStats {
            attempted: 1,
            succeeded: 1,
            ..Default::default()
        };
        let path = stats.write_report(dir.path()).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(!text.contains("stale"));
        assert!(text.contains("Crawl Summary"));
    }
}
