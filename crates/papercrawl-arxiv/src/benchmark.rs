//! Per-paper benchmark log
//!
//! `<root>/benchmark.csv` gets one row per attempted unit as soon as the unit
//! finishes: wall time spent on it, bytes it occupies on disk afterwards, and
//! the process's peak resident memory at that point. Rows accumulate across
//! runs; the header is written once, when the file is created.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::identifier::Identifier;
use crate::orchestrator::UnitOutcome;
use crate::stage::Stage;

pub const HEADER: &str = "id,outcome,stage,seconds,output_bytes,peak_rss_kb";

/// One processed unit.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRow {
    pub id: Identifier,
    pub outcome: &'static str,
    /// Stage that failed
    pub stage: Option<Stage>,
    pub elapsed: Duration,
    pub output_bytes: u64,
    pub peak_rss_kb: Option<u64>,
}

impl BenchmarkRow {
    pub fn new(id: Identifier, outcome: &UnitOutcome, elapsed: Duration) -> Self {
        let (outcome, stage) = match outcome {
            UnitOutcome::Skipped => ("skipped", None),
            UnitOutcome::Completed => ("completed", None),
            UnitOutcome::Failed { stage, .. } => ("failed", Some(*stage)),
            UnitOutcome::Interrupted(_) => ("interrupted", None),
        };
        Self {
            id,
            outcome,
            stage,
            elapsed,
            output_bytes: 0,
            peak_rss_kb: None,
        }
    }

    /// CSV line without the trailing newline. No field can contain a comma.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{:.3},{},{}",
            self.id.canonical(),
            self.outcome,
            self.stage.map(Stage::name).unwrap_or_default(),
            self.elapsed.as_secs_f64(),
            self.output_bytes,
            self.peak_rss_kb.map(|kb| kb.to_string()).unwrap_or_default()
        )
    }
}

/// Append handle for the benchmark file.
#[derive(Debug)]
pub struct BenchmarkLog {
    path: PathBuf,
}

impl BenchmarkLog {
    /// Open for appending, writing the header if the file is new or empty.
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{HEADER}")?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, row: &BenchmarkRow) -> io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", row.to_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::UnitState;
    use std::fs;
    use tempfile::TempDir;

    fn id(seq: u32) -> Identifier {
        Identifier::new(2025, 10, seq).unwrap()
    }

    #[test]
    fn row_columns() {
        let mut row = BenchmarkRow::new(
            id(824),
            &UnitOutcome::Failed {
                stage: Stage::Metadata,
                reason: "not found".into(),
            },
            Duration::from_millis(1500),
        );
        row.output_bytes = 2048;
        row.peak_rss_kb = Some(9000);
        assert_eq!(row.to_line(), "202510-00824,failed,metadata,1.500,2048,9000");

        let row = BenchmarkRow::new(id(1), &UnitOutcome::Completed, Duration::ZERO);
        assert_eq!(row.to_line(), "202510-00001,completed,,0.000,0,");

        let row = BenchmarkRow::new(
            id(2),
            &UnitOutcome::Interrupted(UnitState::Downloaded),
            Duration::ZERO,
        );
        assert!(row.to_line().starts_with("202510-00002,interrupted,"));
    }

    #[test]
    fn header_written_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("benchmark.csv");

        let log = BenchmarkLog::open(&path).unwrap();
        log.append(&BenchmarkRow::new(id(1), &UnitOutcome::Completed, Duration::ZERO))
            .unwrap();
        drop(log);

        let log = BenchmarkLog::open(&path).unwrap();
        log.append(&BenchmarkRow::new(id(2), &UnitOutcome::Completed, Duration::ZERO))
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], HEADER);
        let rows = &lines[1..];
        assert_eq!(rows.len(), 2);
        assert!(rows[1].starts_with("202510-00002,"));
    }

    #[test]
    fn open_fails_on_directory() {
        let dir = TempDir::new().unwrap();
        assert!(BenchmarkLog::open(dir.path()).is_err());
    }
}
