//! Download stage: fetch every version's source archive
//!
//! The Atom API tells us the latest version N; versions 1..=N are then fetched
//! from the e-print endpoint into `tex/<canonical>v<k>.tar.gz`. Archives that
//! are already present and non-empty are kept, so a resumed download only
//! fetches what is missing. `tex/.versions` is written last.

use std::fs;
use std::path::Path;

use papercrawl_core::{RateLimiter, StageError, http};

use crate::arxiv_api::{self, DEFAULT_API_BASE};
use crate::layout::WorkUnit;
use crate::orchestrator::{StageCollaborator, StageReport};

pub const DEFAULT_EPRINT_BASE: &str = "https://arxiv.org/e-print";

#[derive(Debug, Clone)]
pub struct Downloader {
    api_base: String,
    eprint_base: String,
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE, DEFAULT_EPRINT_BASE)
    }
}

impl Downloader {
    pub fn new(api_base: impl Into<String>, eprint_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            eprint_base: eprint_base.into(),
        }
    }

    fn eprint_url(&self, external: &str, version: u32) -> String {
        format!(
            "{}/{external}v{version}",
            self.eprint_base.trim_end_matches('/')
        )
    }
}

/// Remove partial downloads left behind by an interrupted run.
fn remove_partials(unit: &WorkUnit) -> std::io::Result<()> {
    let entries = match fs::read_dir(unit.tex_dir()) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if entry.file_name().to_string_lossy().ends_with(".tmp") && entry.file_type()?.is_file() {
            log::debug!("Removing partial {}", entry.path().display());
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Fetch each missing archive of `v1..=latest`, one limiter permit per request,
/// then record the version count.
fn fetch_versions(
    unit: &WorkUnit,
    latest: u32,
    limiter: &RateLimiter,
    mut fetch: impl FnMut(u32, &Path) -> Result<u64, StageError>,
) -> Result<StageReport, StageError> {
    fs::create_dir_all(unit.tex_dir())?;
    remove_partials(unit)?;

    let mut bytes = 0;
    for version in 1..=latest {
        let dest = unit.archive_path(version);
        if fs::metadata(&dest).is_ok_and(|m| m.len() > 0) {
            log::debug!("{}: v{version} already downloaded", unit.id);
            continue;
        }
        limiter.acquire();
        bytes += fetch(version, &dest)?;
    }
    unit.record_versions(latest)?;

    log::debug!("{}: {latest} version(s), {bytes} bytes fetched", unit.id);
    Ok(StageReport::Download {
        versions: latest,
        bytes,
    })
}

impl StageCollaborator for Downloader {
    fn run(&self, unit: &WorkUnit, limiter: &RateLimiter) -> Result<StageReport, StageError> {
        // First request of the attempt: the orchestrator already took a permit
        let entry = arxiv_api::fetch_entry(&self.api_base, &unit.id)?;
        let latest = entry.latest_version().unwrap_or(1);

        let external = unit.id.external();
        fetch_versions(unit, latest, limiter, |version, dest| {
            let context = format!("e-print {external}v{version}");
            http::download_to_file(&self.eprint_url(&external, version), dest, &context)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect;
    use crate::identifier::Identifier;
    use crate::stage::Stage;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn unit(dir: &TempDir) -> WorkUnit {
        WorkUnit::new(dir.path(), Identifier::new(2025, 10, 1).unwrap())
    }

    /// Fetch stand-in writing a small archive and noting the permit it ran under.
    fn recording<'a>(
        limiter: &'a RateLimiter,
        permits: &'a mut Vec<(u32, Instant)>,
    ) -> impl FnMut(u32, &Path) -> Result<u64, StageError> + 'a {
        move |version, dest| {
            permits.push((version, limiter.last_permitted().unwrap()));
            fs::write(dest, b"archive")?;
            Ok(7)
        }
    }

    #[test]
    fn eprint_url_has_version() {
        let d = Downloader::new(DEFAULT_API_BASE, "https://arxiv.org/e-print/");
        assert_eq!(
            d.eprint_url("2510.00824", 2),
            "https://arxiv.org/e-print/2510.00824v2"
        );
    }

    #[test]
    fn partials_removed_archives_kept() {
        let dir = TempDir::new().unwrap();
        let unit = WorkUnit::new(dir.path(), Identifier::new(2025, 10, 1).unwrap());
        fs::create_dir_all(unit.tex_dir()).unwrap();
        fs::write(unit.archive_path(1), b"a").unwrap();
        let partial = unit.tex_dir().join("202510-00001v2.tar.gz.tmp");
        fs::write(&partial, b"half").unwrap();

        remove_partials(&unit).unwrap();
        assert!(!partial.exists());
        assert!(unit.archive_path(1).exists());
    }

    #[test]
    fn one_permit_per_version() {
        let dir = TempDir::new().unwrap();
        let unit = unit(&dir);
        let interval = Duration::from_millis(20);
        let limiter = RateLimiter::new(interval).unwrap();
        let mut permits = Vec::new();

        let report = fetch_versions(&unit, 3, &limiter, recording(&limiter, &mut permits)).unwrap();

        assert!(matches!(report, StageReport::Download { versions: 3, bytes: 21 }));
        let versions: Vec<u32> = permits.iter().map(|(v, _)| *v).collect();
        assert_eq!(versions, [1, 2, 3]);
        for pair in permits.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= interval);
        }
        assert_eq!(unit.recorded_versions(), Some(3));
        assert!(detect::is_complete(&unit, Stage::Download));
    }

    #[test]
    fn interrupted_download_resumes_missing_versions() {
        let dir = TempDir::new().unwrap();
        let unit = unit(&dir);
        let limiter = RateLimiter::new(Duration::from_millis(1)).unwrap();

        // v2 fails after v1 landed
        let result = fetch_versions(&unit, 3, &limiter, |version, dest| {
            if version == 2 {
                return Err(StageError::Transient("connection reset".into()));
            }
            fs::write(dest, b"archive")?;
            Ok(7)
        });
        assert!(result.is_err());
        assert!(unit.archive_path(1).exists());
        assert_eq!(unit.recorded_versions(), None);
        assert!(!detect::is_complete(&unit, Stage::Download));

        let mut permits = Vec::new();
        fetch_versions(&unit, 3, &limiter, recording(&limiter, &mut permits)).unwrap();
        let versions: Vec<u32> = permits.iter().map(|(v, _)| *v).collect();
        assert_eq!(versions, [2, 3]);
        assert!(detect::is_complete(&unit, Stage::Download));
    }

    #[test]
    fn complete_download_fetches_nothing() {
        let dir = TempDir::new().unwrap();
        let unit = unit(&dir);
        let limiter = RateLimiter::new(Duration::from_millis(1)).unwrap();
        let mut permits = Vec::new();
        fetch_versions(&unit, 2, &limiter, recording(&limiter, &mut permits)).unwrap();

        let mut again = Vec::new();
        fetch_versions(&unit, 2, &limiter, recording(&limiter, &mut again)).unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn partials_missing_dir_ok() {
        let dir = TempDir::new().unwrap();
        let unit = WorkUnit::new(dir.path(), Identifier::new(2025, 10, 1).unwrap());
        remove_partials(&unit).unwrap();
    }
}
