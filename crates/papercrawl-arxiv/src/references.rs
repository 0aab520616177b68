//! References stage: arXiv-identified references from the Semantic Scholar Graph API

use std::collections::{BTreeMap, HashMap};

use papercrawl_core::{RateLimiter, StageError, http};
use serde::{Deserialize, Serialize};

use crate::identifier::Identifier;
use crate::layout::{self, WorkUnit};
use crate::orchestrator::{StageCollaborator, StageReport};

pub const DEFAULT_S2_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

const FIELDS: &str =
    "references,references.externalIds,references.title,references.authors,references.year";

/// One entry of `references.json`, keyed by the cited paper's canonical id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub title: Option<String>,
    pub authors: Vec<String>,
    /// Not provided by the references endpoint
    pub submission_date: Option<String>,
    pub revised_dates: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct S2Paper {
    #[serde(default)]
    references: Option<Vec<S2Reference>>,
}

#[derive(Debug, Deserialize)]
struct S2Reference {
    #[serde(rename = "externalIds", default)]
    external_ids: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Option<Vec<S2Author>>,
}

#[derive(Debug, Deserialize)]
struct S2Author {
    #[serde(default)]
    name: Option<String>,
}

/// Keep references that carry an arXiv id, keyed by canonical id.
///
/// Old-style ids (`hep-th/9901001`) have no canonical form and are dropped.
pub fn parse_references(body: &str) -> Result<BTreeMap<String, ReferenceRecord>, StageError> {
    let paper: S2Paper = serde_json::from_str(body)
        .map_err(|e| StageError::Malformed(format!("Semantic Scholar response: {e}")))?;

    let mut refs = BTreeMap::new();
    for reference in paper.references.unwrap_or_default() {
        let Some(arxiv) = reference
            .external_ids
            .as_ref()
            .and_then(|ids| ids.get("ArXiv"))
            .and_then(|v| v.as_str())
        else {
            continue;
        };
        let canonical = match Identifier::parse_external(arxiv) {
            Ok(id) => id.canonical(),
            Err(e) => {
                log::debug!("Skipping reference {arxiv}: {e}");
                continue;
            }
        };
        let authors = reference
            .authors
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| a.name)
            .filter(|n| !n.is_empty())
            .collect();
        refs.insert(
            canonical,
            ReferenceRecord {
                title: reference.title,
                authors,
                submission_date: None,
                revised_dates: Vec::new(),
            },
        );
    }
    Ok(refs)
}

#[derive(Debug, Clone)]
pub struct ReferenceFetcher {
    api_base: String,
    api_key: Option<String>,
}

impl Default for ReferenceFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_S2_API_BASE, None)
    }
}

impl ReferenceFetcher {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            api_base: api_base.into(),
            api_key,
        }
    }

    fn paper_url(&self, id: &Identifier) -> String {
        format!(
            "{}/paper/arXiv:{}?fields={FIELDS}",
            self.api_base.trim_end_matches('/'),
            id.external()
        )
    }
}

impl StageCollaborator for ReferenceFetcher {
    fn run(&self, unit: &WorkUnit, _limiter: &RateLimiter) -> Result<StageReport, StageError> {
        let context = format!("Semantic Scholar {}", unit.id.external());
        let headers: Vec<(&str, &str)> = self
            .api_key
            .as_deref()
            .map(|key| ("x-api-key", key))
            .into_iter()
            .collect();

        let refs = match http::get_text_optional(&self.paper_url(&unit.id), &headers, &context)? {
            Some(body) => parse_references(&body)?,
            None => {
                log::debug!("{context}: paper not indexed, writing empty references");
                BTreeMap::new()
            }
        };

        let json = serde_json::to_vec_pretty(&refs)
            .map_err(|e| StageError::Malformed(format!("{context}: {e}")))?;
        std::fs::create_dir_all(&unit.dir)?;
        layout::write_atomic(&unit.references_path(), &json)?;

        Ok(StageReport::References { count: refs.len() })
    }
}
