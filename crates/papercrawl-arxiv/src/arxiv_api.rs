//! arXiv Atom API client (`export.arxiv.org/api/query`)
//!
//! One query per identifier yields the latest version number (from the entry
//! id, e.g. `http://arxiv.org/abs/2510.00824v3`) and the bibliographic fields
//! used for `metadata.json` and `references.bib`.

use anyhow::{Context, Result};
use papercrawl_core::{StageError, http};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::identifier::Identifier;

pub const DEFAULT_API_BASE: &str = "https://export.arxiv.org/api/query";

/// One `<entry>` of an Atom feed.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AtomEntry {
    /// Entry id URL, e.g. `http://arxiv.org/abs/2510.00824v3`
    pub id_url: String,
    pub title: String,
    pub authors: Vec<String>,
    /// `YYYY-MM-DD` of the first version
    pub published: Option<String>,
    /// `YYYY-MM-DD` of the latest version
    pub updated: Option<String>,
    pub journal_ref: Option<String>,
    pub primary_category: Option<String>,
}

impl AtomEntry {
    /// Latest version number, taken from the `vN` suffix of the entry id.
    pub fn latest_version(&self) -> Option<u32> {
        let tail = self.id_url.rsplit('/').next()?;
        let (_, version) = tail.rsplit_once('v')?;
        version.parse().ok().filter(|v| *v >= 1)
    }

    /// arXiv reports unknown ids as an entry whose id points at its errors page.
    fn is_error(&self) -> bool {
        self.id_url.contains("/api/errors")
    }
}

/// Query URL for a single identifier.
pub fn query_url(api_base: &str, id: &Identifier) -> String {
    format!("{api_base}?id_list={}&max_results=1", id.external())
}

/// Fetch the Atom entry for `id`. An empty feed means the paper does not exist.
pub fn fetch_entry(api_base: &str, id: &Identifier) -> Result<AtomEntry, StageError> {
    let context = format!("arXiv API {}", id.external());
    let body = http::get_text(&query_url(api_base, id), &context)?;
    let entry = parse_feed(&body)
        .map_err(|e| StageError::Malformed(format!("{context}: {e:#}")))?
        .ok_or_else(|| StageError::NotFound(format!("{context}: no such paper")))?;
    if entry.latest_version().is_none() {
        return Err(StageError::Malformed(format!(
            "{context}: entry id {:?} has no version",
            entry.id_url
        )));
    }
    Ok(entry)
}

/// Parse the first real entry of an Atom feed, if any.
pub fn parse_feed(xml: &str) -> Result<Option<AtomEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"entry" => {
                let entry = parse_entry(&mut reader).context("Failed to parse Atom entry")?;
                if entry.is_error() {
                    log::debug!("arXiv API error entry: {}", entry.title);
                    return Ok(None);
                }
                return Ok(Some(entry));
            }
            Ok(Event::Eof) => return Ok(None),
            Err(e) => return Err(e).context("XML parse error"),
            _ => {}
        }
        buf.clear();
    }
}

fn parse_entry(reader: &mut Reader<&[u8]>) -> Result<AtomEntry> {
    let mut entry = AtomEntry::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => match e.name().as_ref() {
                b"id" => entry.id_url = read_text(reader)?.trim().to_string(),
                b"title" => entry.title = normalize_ws(&read_text(reader)?),
                b"published" => entry.published = Some(date_part(&read_text(reader)?)),
                b"updated" => entry.updated = Some(date_part(&read_text(reader)?)),
                b"author" => {
                    if let Some(name) = parse_author(reader)? {
                        entry.authors.push(name);
                    }
                }
                b"arxiv:journal_ref" => {
                    let text = normalize_ws(&read_text(reader)?);
                    entry.journal_ref = Some(text).filter(|t| !t.is_empty());
                }
                b"arxiv:primary_category" => {
                    entry.primary_category = term_attr(&e)?;
                    skip_to_end(reader)?;
                }
                _ => {}
            },
            Event::Empty(e) if e.name().as_ref() == b"arxiv:primary_category" => {
                entry.primary_category = term_attr(&e)?;
            }
            Event::End(e) if e.name().as_ref() == b"entry" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(entry)
}

fn parse_author(reader: &mut Reader<&[u8]>) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let mut name = None;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == b"name" => {
                let text = normalize_ws(&read_text(reader)?);
                if !text.is_empty() {
                    name = Some(text);
                }
            }
            Event::Start(_) => skip_to_end(reader)?,
            Event::End(e) if e.name().as_ref() == b"author" => break,
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(name)
}

fn term_attr(e: &BytesStart<'_>) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == b"term" {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Read element text, flattening nested elements.
fn read_text(reader: &mut Reader<&[u8]>) -> Result<String> {
    let mut buf = Vec::new();
    let mut text = String::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e)),
            Event::End(_) => break,
            Event::Start(_) => text.push_str(&read_text(reader)?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(text)
}

fn skip_to_end(reader: &mut Reader<&[u8]>) -> Result<()> {
    read_text(reader).map(|_| ())
}

/// Collapse line breaks and indentation runs (Atom titles wrap).
fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `2025-10-01T17:59:59Z` -> `2025-10-01`
fn date_part(s: &str) -> String {
    let s = s.trim();
    s.split('T').next().unwrap_or(s).to_string()
}
