//! Clean stage: unpack source archives and strip figures
//!
//! arXiv e-prints are gzip-compressed: either a tarball of the TeX tree or a
//! single gzipped `.tex` file. Each version is unpacked into
//! `tex/<canonical>v<N>/` (single files become `main.tex`), then image files
//! are deleted and figure environments / `\includegraphics` calls are replaced
//! by TeX comments.

use std::borrow::Cow;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use flate2::read::GzDecoder;
use papercrawl_core::{RateLimiter, StageError};
use regex::bytes::{NoExpand, Regex};

use crate::detect::{is_image_file, is_tex_file};
use crate::layout::{self, WorkUnit};
use crate::orchestrator::{StageCollaborator, StageReport};

const FIGURE_COMMENT: &[u8] = b"% removed figure env";
const GRAPHICS_COMMENT: &[u8] = b"% removed includegraphics";

static FIGURE_ENV: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\\begin\{figure\*?\}.*?\\end\{figure\*?\}").expect("valid figure regex")
});

static INCLUDEGRAPHICS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\includegraphics\*?(?:\[[^\]]*\])?(?:\{[^}]*\})?")
        .expect("valid includegraphics regex")
});

/// Unbalanced or unusual figure delimiters left after the environment pass.
static FIGURE_DELIMITER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\(?:begin|end)\{figure[^}\n]*\}?").expect("valid figure delimiter regex")
});

/// What cleaning one unit did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Archives unpacked in this run
    pub versions_extracted: usize,
    pub images_removed: usize,
    /// Figure environments, graphics includes and stray delimiters replaced
    pub figures_stripped: usize,
    /// Extracted size before stripping
    pub bytes_before: u64,
    /// Extracted size after stripping
    pub bytes_after: u64,
}

/// Local, stateless cleaner.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cleaner;

impl StageCollaborator for Cleaner {
    fn run(&self, unit: &WorkUnit, _limiter: &RateLimiter) -> Result<StageReport, StageError> {
        let archives = unit.archives()?;
        if archives.is_empty() {
            return Err(StageError::NotFound(format!(
                "{}: no downloaded archives to clean",
                unit.id
            )));
        }

        let mut report = CleanReport::default();
        for (version, archive) in archives {
            let dest = unit.extract_dir(version);
            if layout::walk_files(&dest)?.is_empty() {
                let size = extract_archive(&archive, &dest)?;
                log::debug!("{}: v{version} unpacked ({size} bytes)", unit.id);
                report.versions_extracted += 1;
            }
            report.bytes_before += layout::dir_size(&dest)?;
            strip_dir(&dest, &mut report)?;
            if layout::walk_files(&dest)?.is_empty() {
                return Err(corrupt(&archive, "no source left after removing images"));
            }
            report.bytes_after += layout::dir_size(&dest)?;
        }
        Ok(StageReport::Clean(report))
    }
}

fn corrupt(archive: &Path, msg: impl std::fmt::Display) -> StageError {
    StageError::CorruptArchive(format!("{}: {msg}", archive.display()))
}

fn is_tarball(data: &[u8]) -> bool {
    data.get(257..262) == Some(b"ustar".as_slice())
}

fn staging_dir(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".extracting");
    dest.with_file_name(name)
}

/// Gunzip `archive` and unpack it into `dest`, replacing whatever was there.
///
/// Unpacks into a sibling staging directory first so an interrupted run never
/// leaves a half-populated `dest`. Returns the decompressed size.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<u64, StageError> {
    let compressed = fs::read(archive)?;
    if !compressed.starts_with(&[0x1f, 0x8b]) {
        if compressed.starts_with(b"%PDF") {
            return Err(corrupt(archive, "no TeX source (PDF only)"));
        }
        return Err(corrupt(archive, "not a gzip stream"));
    }
    let mut data = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut data)
        .map_err(|e| corrupt(archive, e))?;
    if data.is_empty() {
        return Err(corrupt(archive, "empty after decompression"));
    }

    let staging = staging_dir(dest);
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    if is_tarball(&data) {
        let mut tarball = tar::Archive::new(data.as_slice());
        let entries = tarball.entries().map_err(|e| corrupt(archive, e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| corrupt(archive, e))?;
            let unpacked = entry.unpack_in(&staging).map_err(|e| corrupt(archive, e))?;
            if !unpacked {
                log::warn!("{}: skipped entry outside the archive root", archive.display());
            }
        }
    } else {
        fs::write(staging.join("main.tex"), &data)?;
    }

    if layout::walk_files(&staging)?.is_empty() {
        fs::remove_dir_all(&staging)?;
        return Err(corrupt(archive, "archive holds no files"));
    }
    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    fs::rename(&staging, dest)?;
    Ok(data.len() as u64)
}

/// Replace figure environments and graphics includes with comments.
///
/// Returns the rewritten text and the number of replacements; afterwards the
/// text holds neither `\begin{figure` nor `\includegraphics`.
pub fn strip_figures(text: &[u8]) -> (Cow<'_, [u8]>, usize) {
    let passes: [(&Regex, &[u8]); 3] = [
        (&*FIGURE_ENV, FIGURE_COMMENT),
        (&*INCLUDEGRAPHICS, GRAPHICS_COMMENT),
        (&*FIGURE_DELIMITER, FIGURE_COMMENT),
    ];
    let mut out = Cow::Borrowed(text);
    let mut replaced = 0;
    for (re, comment) in passes {
        let n = re.find_iter(&out).count();
        if n > 0 {
            replaced += n;
            out = Cow::Owned(re.replace_all(&out, NoExpand(comment)).into_owned());
        }
    }
    (out, replaced)
}

/// Delete images and strip figure markup from every `.tex` file under `dir`.
fn strip_dir(dir: &Path, report: &mut CleanReport) -> Result<(), StageError> {
    for file in layout::walk_files(dir)? {
        if is_image_file(&file) {
            fs::remove_file(&file)?;
            report.images_removed += 1;
        } else if is_tex_file(&file) {
            let text = fs::read(&file)?;
            let (stripped, n) = strip_figures(&text);
            if n > 0 {
                layout::write_atomic(&file, &stripped)?;
                report.figures_stripped += n;
            }
        }
    }
    Ok(())
}
