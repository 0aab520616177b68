//! Work-unit state detection from persisted artifacts
//!
//! The filesystem is the only resume marker: each stage has a predicate over
//! the unit directory, and any artifact that is empty or fails to parse counts
//! as absent. Detection never writes.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::layout::{self, WorkUnit};
use crate::stage::Stage;

/// Extensions removed by the cleaner (compared case-insensitively).
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "pdf", "eps", "svg", "tif", "tiff", "bmp",
];

pub const FIGURE_MARKERS: &[&[u8]] = &[b"\\begin{figure", b"\\includegraphics"];

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| wanted.iter().any(|w| e.eq_ignore_ascii_case(w)))
}

pub fn is_image_file(path: &Path) -> bool {
    has_extension(path, IMAGE_EXTENSIONS)
}

pub fn is_tex_file(path: &Path) -> bool {
    has_extension(path, &["tex"])
}

/// Whether TeX source still carries figure environments or graphics includes.
pub fn contains_figure_markup(text: &[u8]) -> bool {
    FIGURE_MARKERS
        .iter()
        .any(|marker| text.windows(marker.len()).any(|w| w == *marker))
}

/// Stages whose output is present and structurally valid.
pub fn completed_stages(unit: &WorkUnit) -> BTreeSet<Stage> {
    Stage::ALL
        .into_iter()
        .filter(|&stage| is_complete(unit, stage))
        .collect()
}

pub fn is_complete(unit: &WorkUnit, stage: Stage) -> bool {
    match stage {
        Stage::Download => download_complete(unit),
        Stage::Clean => clean_complete(unit),
        Stage::Metadata => metadata_complete(unit),
        Stage::References => references_complete(unit),
    }
}

/// Version count recorded, exactly v1..=vN present and non-empty, no partial download.
fn download_complete(unit: &WorkUnit) -> bool {
    let Some(expected) = unit.recorded_versions() else {
        return false;
    };
    let Ok(archives) = unit.archives() else {
        return false;
    };
    let versions: Vec<u32> = archives.iter().map(|(v, _)| *v).collect();
    if !versions.iter().copied().eq(1..=expected) {
        return false;
    }
    let non_empty = archives
        .iter()
        .all(|(_, path)| fs::metadata(path).is_ok_and(|m| m.len() > 0));
    non_empty && !has_partial_download(unit)
}

fn has_partial_download(unit: &WorkUnit) -> bool {
    let Ok(entries) = fs::read_dir(unit.tex_dir()) else {
        return false;
    };
    entries
        .flatten()
        .any(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
}

/// Every archive extracted into a non-empty directory free of images and figure markup.
fn clean_complete(unit: &WorkUnit) -> bool {
    if !download_complete(unit) {
        return false;
    }
    let Ok(archives) = unit.archives() else {
        return false;
    };
    archives
        .iter()
        .all(|(version, _)| extract_dir_clean(&unit.extract_dir(*version)))
}

fn extract_dir_clean(dir: &Path) -> bool {
    let Ok(files) = layout::walk_files(dir) else {
        return false;
    };
    if files.is_empty() {
        return false;
    }
    files.iter().all(|file| {
        if is_image_file(file) {
            return false;
        }
        if is_tex_file(file) {
            return fs::read(file).is_ok_and(|text| !contains_figure_markup(&text));
        }
        true
    })
}

fn read_json_object(path: &Path) -> Option<serde_json::Map<String, serde_json::Value>> {
    let bytes = fs::read(path).ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        serde_json::Value::Object(map) => Some(map),
        _ => None,
    }
}

fn non_empty_array(map: &serde_json::Map<String, serde_json::Value>, key: &str) -> bool {
    map.get(key)
        .and_then(|v| v.as_array())
        .is_some_and(|a| !a.is_empty())
}

/// `metadata.json` with title, authors and versions, plus a BibTeX record.
fn metadata_complete(unit: &WorkUnit) -> bool {
    let Some(meta) = read_json_object(&unit.metadata_path()) else {
        return false;
    };
    let has_title = meta
        .get("title")
        .and_then(|v| v.as_str())
        .is_some_and(|t| !t.trim().is_empty());
    if !has_title || !non_empty_array(&meta, "authors") || !non_empty_array(&meta, "versions") {
        return false;
    }
    fs::read_to_string(unit.bibtex_path()).is_ok_and(|bib| bib.trim_start().starts_with('@'))
}

/// `references.json` is a JSON object; `{}` means no arXiv references.
fn references_complete(unit: &WorkUnit) -> bool {
    read_json_object(&unit.references_path()).is_some()
}
