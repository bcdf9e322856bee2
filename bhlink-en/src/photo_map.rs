//! Bidirectional BHL-page-id <-> photo-id table
//!
//! Precomputed from a harvest of the photo-sharing account that mirrors
//! the archive's page scans. Loaded once at startup; the reverse
//! direction backs the photo-id resolution strategy, the forward
//! direction enriches resolved pages with their photo id.

use bhlink_common::{Error, Result};
use std::collections::HashMap;
use std::path::Path;

/// Bidirectional id table. Exact-match lookups only.
#[derive(Debug, Default)]
pub struct PhotoMap {
    forward: HashMap<String, String>,
    reverse: HashMap<String, String>,
}

impl PhotoMap {
    /// Empty map: every lookup misses.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from a page-id -> photo-id map.
    pub fn from_map(forward: HashMap<String, String>) -> Self {
        let reverse = forward
            .iter()
            .map(|(page, photo)| (photo.clone(), page.clone()))
            .collect();
        Self { forward, reverse }
    }

    /// Load the JSON table produced by the photo-harvest tooling
    /// (`{"<page id>": "<photo id>", ...}`).
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let forward: HashMap<String, String> = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
        Ok(Self::from_map(forward))
    }

    /// Photo id for an archive page id.
    pub fn photo_for_page(&self, page_id: &str) -> Option<&str> {
        self.forward.get(page_id).map(String::as_str)
    }

    /// Archive page id for a photo id.
    pub fn page_for_photo(&self, photo_id: &str) -> Option<&str> {
        self.reverse.get(photo_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
