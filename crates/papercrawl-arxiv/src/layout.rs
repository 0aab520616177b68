//! On-disk layout of a crawl output root
//!
//! ```text
//! <root>/
//!   failed_ids.tsv
//!   benchmark.csv                    one row per paper processed
//!   statistics.txt                   summary of the latest run
//!   <yyyymm-nnnnn>/
//!     tex/
//!       .versions                    number of versions arXiv lists
//!       <yyyymm-nnnnn>v1.tar.gz      downloaded source archive
//!       <yyyymm-nnnnn>v1/            extracted and cleaned sources
//!     metadata.json
//!     references.bib
//!     references.json
//! ```

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::identifier::Identifier;

pub const LEDGER_FILE: &str = "failed_ids.tsv";
pub const BENCHMARK_FILE: &str = "benchmark.csv";
pub const STATISTICS_FILE: &str = "statistics.txt";
pub const METADATA_FILE: &str = "metadata.json";
pub const BIBTEX_FILE: &str = "references.bib";
pub const REFERENCES_FILE: &str = "references.json";
pub const TEX_DIR: &str = "tex";
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";
/// Written after the last archive lands; holds the version count.
pub const VERSIONS_FILE: &str = ".versions";

/// Path of the failure ledger under `root`.
pub fn ledger_path(root: &Path) -> PathBuf {
    root.join(LEDGER_FILE)
}

pub fn benchmark_path(root: &Path) -> PathBuf {
    root.join(BENCHMARK_FILE)
}

pub fn statistics_path(root: &Path) -> PathBuf {
    root.join(STATISTICS_FILE)
}

/// One identifier and the directory holding its artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkUnit {
    pub id: Identifier,
    pub dir: PathBuf,
}

impl WorkUnit {
    pub fn new(root: &Path, id: Identifier) -> Self {
        Self {
            dir: root.join(id.canonical()),
            id,
        }
    }

    pub fn tex_dir(&self) -> PathBuf {
        self.dir.join(TEX_DIR)
    }

    /// `tex/<canonical>v<version>.tar.gz`
    pub fn archive_path(&self, version: u32) -> PathBuf {
        self.tex_dir()
            .join(format!("{}v{version}{ARCHIVE_SUFFIX}", self.id.canonical()))
    }

    /// `tex/<canonical>v<version>/`
    pub fn extract_dir(&self, version: u32) -> PathBuf {
        self.tex_dir()
            .join(format!("{}v{version}", self.id.canonical()))
    }

    pub fn versions_path(&self) -> PathBuf {
        self.tex_dir().join(VERSIONS_FILE)
    }

    /// Version count recorded by a finished download, if any.
    pub fn recorded_versions(&self) -> Option<u32> {
        let text = fs::read_to_string(self.versions_path()).ok()?;
        text.trim().parse().ok().filter(|n| *n > 0)
    }

    /// Mark the download finished with `versions` archives.
    pub fn record_versions(&self, versions: u32) -> io::Result<()> {
        write_atomic(&self.versions_path(), format!("{versions}\n").as_bytes())
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }

    pub fn bibtex_path(&self) -> PathBuf {
        self.dir.join(BIBTEX_FILE)
    }

    pub fn references_path(&self) -> PathBuf {
        self.dir.join(REFERENCES_FILE)
    }

    /// Version number encoded in an archive file name belonging to this unit.
    pub fn archive_version(&self, file_name: &str) -> Option<u32> {
        let prefix = format!("{}v", self.id.canonical());
        file_name
            .strip_prefix(&prefix)?
            .strip_suffix(ARCHIVE_SUFFIX)?
            .parse()
            .ok()
    }

    /// Archives present in `tex/`, sorted by version. Missing directory yields none.
    pub fn archives(&self) -> io::Result<Vec<(u32, PathBuf)>> {
        let entries = match fs::read_dir(self.tex_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut archives = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(version) = self.archive_version(name) {
                if entry.file_type()?.is_file() {
                    archives.push((version, entry.path()));
                }
            }
        }
        archives.sort_by_key(|(v, _)| *v);
        Ok(archives)
    }
}

/// Every regular file below `dir`, recursively. Missing directory yields none.
pub fn walk_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let paths = glob::glob(&pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut files = Vec::new();
    for path in paths {
        let path = path.map_err(glob::GlobError::into_error)?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Total size in bytes of the regular files below `dir`.
pub fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut total = 0;
    for file in walk_files(dir)? {
        total += fs::metadata(&file)?.len();
    }
    Ok(total)
}

/// Write `bytes` to `path` via a `.tmp` sibling and rename, so readers never
/// observe a partial file.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = papercrawl_core::http::tmp_path(path);
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path)
}
