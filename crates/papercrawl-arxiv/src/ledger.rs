//! Durable, append-only failure ledger
//!
//! One tab-separated line per terminal failure:
//! `yyyymm-nnnnn \t stage \t reason \t RFC 3339 timestamp`.
//! Entries are only ever appended; retrying an identifier never rewrites
//! earlier lines.

use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use papercrawl_core::ConfigError;

use crate::identifier::Identifier;
use crate::stage::Stage;

/// One terminal failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub id: Identifier,
    pub stage: Stage,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(id: Identifier, stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            id,
            stage,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }

    /// Serialized line, without the trailing newline.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.id.canonical(),
            self.stage,
            flatten(&self.reason),
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }

    pub fn parse_line(line: &str) -> Option<Self> {
        let mut fields = line.split('\t');
        let id = Identifier::parse_canonical(fields.next()?).ok()?;
        let stage = fields.next()?.parse().ok()?;
        let reason = fields.next()?.to_string();
        let timestamp = DateTime::parse_from_rfc3339(fields.next()?.trim())
            .ok()?
            .with_timezone(&Utc);
        if fields.next().is_some() {
            return None;
        }
        Some(Self {
            id,
            stage,
            reason,
            timestamp,
        })
    }
}

/// Keep a reason on one line and inside its column.
fn flatten(reason: &str) -> String {
    reason
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect()
}

/// Append handle for the ledger file.
#[derive(Debug)]
pub struct FailureLedger {
    path: PathBuf,
}

impl FailureLedger {
    /// Create parent directories and check the file can be appended to.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let unwritable = |source| ConfigError::UnwritableRoot {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(unwritable)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(unwritable)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and fsync before returning.
    pub fn append(&self, entry: &LedgerEntry) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", entry.to_line())?;
        file.flush()?;
        file.sync_all()
    }
}

/// Read every well-formed entry; a missing file has none.
///
/// Lines that are not valid UTF-8 or do not parse are skipped with a warning.
pub fn read_entries(path: &Path) -> io::Result<Vec<LedgerEntry>> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut entries = Vec::new();
    for (lineno, raw) in content.split(|b| *b == b'\n').enumerate() {
        let line = std::str::from_utf8(raw).ok().map(|l| l.trim_end_matches('\r'));
        if line.is_some_and(|l| l.trim().is_empty()) {
            continue;
        }
        match line.and_then(LedgerEntry::parse_line) {
            Some(entry) => entries.push(entry),
            None => log::warn!("{}:{}: skipping malformed ledger line", path.display(), lineno + 1),
        }
    }
    Ok(entries)
}

/// Distinct identifiers in the ledger, ascending.
pub fn failed_ids(entries: &[LedgerEntry]) -> Vec<Identifier> {
    entries
        .iter()
        .map(|e| e.id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn id(seq: u32) -> Identifier {
        Identifier::new(2025, 10, seq).unwrap()
    }

    #[test]
    fn line_format() {
        let mut entry = LedgerEntry::new(id(2), Stage::Download, "not found:\tHTTP 404\nbody");
        entry.timestamp = DateTime::parse_from_rfc3339("2025-10-05T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            entry.to_line(),
            "202510-00002\tdownload\tnot found: HTTP 404 body\t2025-10-05T12:00:00Z"
        );
    }

    #[test]
    fn parse_line_inverts_to_line() {
        let entry = LedgerEntry::new(id(7), Stage::References, "transient: timeout");
        let parsed = LedgerEntry::parse_line(&entry.to_line()).unwrap();
        assert_eq!(parsed.id, entry.id);
        assert_eq!(parsed.stage, Stage::References);
        assert_eq!(parsed.reason, "transient: timeout");
        assert_eq!(parsed.timestamp.timestamp(), entry.timestamp.timestamp());
    }

    #[test]
    fn append_accumulates_lines() {
        let dir = TempDir::new().unwrap();
        let ledger = FailureLedger::open(dir.path().join("nested/failed_ids.tsv")).unwrap();
        ledger
            .append(&LedgerEntry::new(id(1), Stage::Clean, "corrupt"))
            .unwrap();
        ledger
            .append(&LedgerEntry::new(id(3), Stage::Metadata, "malformed"))
            .unwrap();

        let entries = read_entries(ledger.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, id(1));
        assert_eq!(entries[1].stage, Stage::Metadata);
    }

    #[test]
    fn reopen_never_truncates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failed_ids.tsv");
        FailureLedger::open(&path)
            .unwrap()
            .append(&LedgerEntry::new(id(1), Stage::Download, "x"))
            .unwrap();
        FailureLedger::open(&path)
            .unwrap()
            .append(&LedgerEntry::new(id(2), Stage::Download, "y"))
            .unwrap();
        assert_eq!(read_entries(&path).unwrap().len(), 2);
    }

    #[test]
    fn malformed_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failed_ids.tsv");
        let good = LedgerEntry::new(id(4), Stage::Download, "gone").to_line();
        fs::write(&path, format!("garbage\n\n{good}\n202510-00005\tupload\tx\tnow\n")).unwrap();
        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id(4));
    }

    #[test]
    fn non_ascii_and_invalid_utf8_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("failed_ids.tsv");
        let good = LedgerEntry::new(id(6), Stage::Clean, "corrupt").to_line();
        let mut content = Vec::new();
        content.extend_from_slice("202é5-00001\tdownload\tx\t2025-10-05T12:00:00Z\n".as_bytes());
        content.extend_from_slice(b"202510-00002\tdownload\t\xff\xfe\t2025-10-05T12:00:00Z\r\n");
        content.extend_from_slice(good.as_bytes());
        content.extend_from_slice(b"\r\n");
        fs::write(&path, content).unwrap();

        let entries = read_entries(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id(6));
        assert!(LedgerEntry::parse_line("202é5-00001\tdownload\tx\t2025-10-05T12:00:00Z").is_none());
    }

    #[test]
    fn missing_file_reads_empty() {
        let dir = TempDir::new().unwrap();
        assert!(read_entries(&dir.path().join("none.tsv")).unwrap().is_empty());
    }

    #[test]
    fn failed_ids_dedup_sorted() {
        let entries = vec![
            LedgerEntry::new(id(9), Stage::Download, "a"),
            LedgerEntry::new(id(2), Stage::Clean, "b"),
            LedgerEntry::new(id(9), Stage::References, "c"),
        ];
        assert_eq!(failed_ids(&entries), vec![id(2), id(9)]);
    }

    #[test]
    fn unwritable_location_is_config_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();
        // Parent is a regular file, so the directory cannot be created
        let err = FailureLedger::open(blocker.join("failed_ids.tsv")).unwrap_err();
        assert!(matches!(err, ConfigError::UnwritableRoot { .. }));
    }
}
