//! Metadata stage: `metadata.json` and a BibTeX record from the Atom API

use papercrawl_core::{RateLimiter, StageError};
use serde::{Deserialize, Serialize};

use crate::arxiv_api::{self, AtomEntry, DEFAULT_API_BASE};
use crate::identifier::Identifier;
use crate::layout::{self, WorkUnit};
use crate::orchestrator::{StageCollaborator, StageReport};

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub title: String,
    pub authors: Vec<String>,
    pub submission_date: Option<String>,
    pub revised_dates: Vec<String>,
    /// Journal reference, when the paper has been published
    pub venue: Option<String>,
    /// `yyyymm-nnnnnvK` for every version
    pub versions: Vec<String>,
}

impl PaperMetadata {
    pub fn from_entry(id: &Identifier, entry: &AtomEntry) -> Self {
        let latest = entry.latest_version().unwrap_or(1);
        let canonical = id.canonical();
        Self {
            title: entry.title.clone(),
            authors: entry.authors.clone(),
            submission_date: entry.published.clone(),
            revised_dates: entry.updated.iter().cloned().collect(),
            venue: entry.journal_ref.clone(),
            versions: (1..=latest).map(|v| format!("{canonical}v{v}")).collect(),
        }
    }
}

/// Minimal `@misc` record for the paper itself.
pub fn bibtex(id: &Identifier, entry: &AtomEntry) -> String {
    let external = id.external();
    let mut fields = vec![
        ("title", format!("{{{}}}", entry.title)),
        ("author", format!("{{{}}}", entry.authors.join(" and "))),
    ];
    if let Some(year) = entry.published.as_deref().and_then(|d| d.get(..4)) {
        fields.push(("year", format!("{{{year}}}")));
    }
    fields.push(("eprint", format!("{{{external}}}")));
    fields.push(("archivePrefix", "{arXiv}".to_string()));
    if let Some(category) = &entry.primary_category {
        fields.push(("primaryClass", format!("{{{category}}}")));
    }
    if let Some(venue) = &entry.journal_ref {
        fields.push(("note", format!("{{{venue}}}")));
    }
    fields.push((
        "howpublished",
        format!("{{arXiv preprint arXiv:{external}}}"),
    ));

    let body: Vec<String> = fields
        .iter()
        .map(|(key, value)| format!("  {key} = {value}"))
        .collect();
    format!("@misc{{arXiv:{external},\n{}\n}}\n", body.join(",\n"))
}

#[derive(Debug, Clone)]
pub struct MetadataWriter {
    api_base: String,
}

impl Default for MetadataWriter {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

impl MetadataWriter {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

impl StageCollaborator for MetadataWriter {
    fn run(&self, unit: &WorkUnit, _limiter: &RateLimiter) -> Result<StageReport, StageError> {
        let entry = arxiv_api::fetch_entry(&self.api_base, &unit.id)?;
        if entry.title.is_empty() || entry.authors.is_empty() {
            return Err(StageError::Malformed(format!(
                "arXiv API {}: entry lacks title or authors",
                unit.id.external()
            )));
        }

        let metadata = PaperMetadata::from_entry(&unit.id, &entry);
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| StageError::Malformed(format!("{}: {e}", unit.id)))?;

        std::fs::create_dir_all(&unit.dir)?;
        layout::write_atomic(&unit.metadata_path(), &json)?;
        layout::write_atomic(&unit.bibtex_path(), bibtex(&unit.id, &entry).as_bytes())?;

        Ok(StageReport::Metadata {
            versions: metadata.versions.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> AtomEntry {
        AtomEntry {
            id_url: "http://arxiv.org/abs/2510.00824v2".into(),
            title: "Rate-Limited Crawling".into(),
            authors: vec!["Ada Lovelace".into(), "Alan Turing".into()],
            published: Some("2025-10-01".into()),
            updated: Some("2025-10-14".into()),
            journal_ref: None,
            primary_category: Some("cs.DL".into()),
        }
    }

    fn id() -> Identifier {
        Identifier::new(2025, 10, 824).unwrap()
    }

    #[test]
    fn metadata_lists_every_version() {
        let meta = PaperMetadata::from_entry(&id(), &entry());
        assert_eq!(meta.versions, ["202510-00824v1", "202510-00824v2"]);
        assert_eq!(meta.submission_date.as_deref(), Some("2025-10-01"));
        assert_eq!(meta.revised_dates, ["2025-10-14"]);
        assert_eq!(meta.venue, None);
    }

    #[test]
    fn metadata_json_shape() {
        let meta = PaperMetadata::from_entry(&id(), &entry());
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["title"], "Rate-Limited Crawling");
        assert_eq!(value["authors"][1], "Alan Turing");
        assert!(value["venue"].is_null());
    }

    #[test]
    fn bibtex_record() {
        let bib = bibtex(&id(), &entry());
        assert!(bib.starts_with("@misc{arXiv:2510.00824,\n"));
        assert!(bib.contains("  author = {Ada Lovelace and Alan Turing},\n"));
        assert!(bib.contains("  year = {2025},\n"));
        assert!(bib.contains("  primaryClass = {cs.DL},\n"));
        assert!(bib.ends_with("  howpublished = {arXiv preprint arXiv:2510.00824}\n}\n"));
    }

    #[test]
    fn bibtex_includes_journal_ref() {
        let mut e = entry();
        e.journal_ref = Some("J. Crawl. 12 (2025)".into());
        assert!(bibtex(&id(), &e).contains("  note = {J. Crawl. 12 (2025)},\n"));
    }
}
