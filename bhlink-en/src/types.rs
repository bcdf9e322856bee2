//! Core data types for the enrichment pipeline
//!
//! The row structure is strongly typed with explicit optional fields
//! (empty TSV cells round-trip as `None`), replacing the ad-hoc
//! dynamically-keyed dictionaries of earlier tooling.

use serde::{Deserialize, Serialize};

/// A candidate document handed to the pipeline: a file name (unique key
/// within a run) plus its raw markup text.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// File name, without any namespace prefix
    pub file_name: String,
    /// Raw page markup as served by the repository
    pub markup: String,
}

impl SourceDocument {
    pub fn new(file_name: impl Into<String>, markup: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            markup: markup.into(),
        }
    }
}

/// Canonical archive identity of a document, as produced by the
/// resolution cascade. At most one per document; absence means skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedIdentity {
    /// BHL page id (always present once resolved)
    pub page_id: String,
    /// Parent item id, when the producing strategy already knows it
    pub item_id: Option<String>,
    /// Bibliography title id, when the producing strategy already knows it
    pub title_id: Option<String>,
    /// Which cascade step produced this identity
    pub strategy: crate::resolver::ResolveStrategy,
}

/// Denormalized metadata row for one document.
///
/// Keyed by `file` within a run; serialized to the tab-separated
/// checkpoint file with the named columns below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataRow {
    #[serde(rename = "File")]
    pub file: String,
    #[serde(rename = "BHL Page ID")]
    pub page_id: String,
    #[serde(rename = "Page Types")]
    pub page_types: Option<String>,
    #[serde(rename = "Names")]
    pub taxon_names: Option<String>,
    #[serde(rename = "Published In")]
    pub publication: Option<String>,
    #[serde(rename = "Collection")]
    pub institution: Option<String>,
    #[serde(rename = "Sponsor")]
    pub sponsor: Option<String>,
    #[serde(rename = "Bibliography ID")]
    pub title_id: Option<String>,
    #[serde(rename = "Illustrator")]
    pub illustrator: Option<String>,
    #[serde(rename = "Engraver")]
    pub engraver: Option<String>,
    #[serde(rename = "Lithographer")]
    pub lithographer: Option<String>,
    #[serde(rename = "Painter")]
    pub painter: Option<String>,
    #[serde(rename = "Inception")]
    pub inception: Option<String>,
    #[serde(rename = "Item ID")]
    pub item_id: Option<String>,
    #[serde(rename = "Photo ID")]
    pub photo_id: Option<String>,
    #[serde(rename = "Photo Tags")]
    pub photo_tags: Option<String>,
    #[serde(rename = "Copyright Status")]
    pub copyright_status: Option<String>,
    #[serde(rename = "Volume")]
    pub volume: Option<String>,
}

impl MetadataRow {
    /// Photo tags as a list (stored comma-joined in the flat file)
    pub fn photo_tag_list(&self) -> Vec<String> {
        self.photo_tags
            .as_deref()
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Taxon name strings as a list (stored semicolon-joined)
    pub fn taxon_name_list(&self) -> Vec<String> {
        self.taxon_names
            .as_deref()
            .map(|names| {
                names
                    .split(';')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}
