//! Metadata aggregation layer
//!
//! Composes the three-tier bibliographic hierarchy (page -> item ->
//! title) into one denormalized [`MetadataRow`], memoizing every fetched
//! record in the injected [`RecordCache`].
//!
//! # Error handling
//! API failures degrade to empty results here (logged, never fatal).
//! The one escalating condition is an ambiguous knowledge-base linkage
//! for a title: zero or multiple candidate ids. That is routed through
//! the [`LinkArbiter`] port and, if unresolved, surfaces as a terminal
//! error for the title.

use crate::cache::RecordCache;
use crate::clients::bhl::{BhlError, BhlItem, BhlPage, BhlTitle};
use crate::types::{MetadataRow, ResolvedIdentity};
use async_trait::async_trait;
use bhlink_common::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bibliographic API operations consumed by the aggregator.
///
/// Implemented by [`crate::clients::bhl::BhlClient`]; tests inject
/// in-memory implementations.
#[async_trait]
pub trait BhlApi: Send + Sync {
    async fn get_page(&self, page_id: &str) -> std::result::Result<Option<BhlPage>, BhlError>;
    async fn get_item(&self, item_id: &str) -> std::result::Result<Option<BhlItem>, BhlError>;
    async fn get_title(&self, title_id: &str) -> std::result::Result<Option<BhlTitle>, BhlError>;
    async fn get_item_by_archive_id(
        &self,
        archive_id: &str,
    ) -> std::result::Result<Option<BhlItem>, BhlError>;
}

/// Resolution port for ambiguous publication linkages.
///
/// The interactive implementation blocks awaiting an operator answer;
/// the batch implementation consults a pre-seeded override map and is
/// fail-closed (`None` aborts enrichment for that title).
#[async_trait]
pub trait LinkArbiter: Send + Sync {
    /// Return the publication entity id for a title, or `None` if no
    /// resolution can be obtained.
    async fn resolve(&self, title_id: &str, candidates: &[String]) -> Option<String>;
}

/// Interactive arbiter: prompts the operator on stdin.
pub struct ConsoleArbiter;

#[async_trait]
impl LinkArbiter for ConsoleArbiter {
    async fn resolve(&self, title_id: &str, candidates: &[String]) -> Option<String> {
        let title_id = title_id.to_string();
        let candidates = candidates.to_vec();
        // Blocking prompt; the pipeline suspends until answered.
        tokio::task::spawn_blocking(move || {
            if candidates.is_empty() {
                eprintln!("No knowledge-base identifier found for BHL title {title_id}.");
            } else {
                eprintln!(
                    "Multiple knowledge-base identifiers for BHL title {title_id}: {}",
                    candidates.join(", ")
                );
            }
            eprintln!("Enter the publication entity id (blank to skip this title):");
            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_err() {
                return None;
            }
            let answer = line.trim().to_string();
            if answer.is_empty() {
                None
            } else {
                Some(answer)
            }
        })
        .await
        .ok()
        .flatten()
    }
}

/// Batch arbiter: pre-seeded title-id -> publication-entity overrides.
pub struct OverrideArbiter {
    overrides: HashMap<String, String>,
}

impl OverrideArbiter {
    pub fn new(overrides: HashMap<String, String>) -> Self {
        Self { overrides }
    }
}

#[async_trait]
impl LinkArbiter for OverrideArbiter {
    async fn resolve(&self, title_id: &str, _candidates: &[String]) -> Option<String> {
        self.overrides.get(title_id).cloned()
    }
}

/// Aggregates and memoizes three-tier bibliographic records.
pub struct MetadataAggregator {
    api: Arc<dyn BhlApi>,
    cache: Arc<RecordCache>,
    arbiter: Arc<dyn LinkArbiter>,
}

impl MetadataAggregator {
    pub fn new(api: Arc<dyn BhlApi>, cache: Arc<RecordCache>, arbiter: Arc<dyn LinkArbiter>) -> Self {
        Self { api, cache, arbiter }
    }

    /// Fetch a page record, cache-first. API failures degrade to `None`.
    pub async fn get_page(&self, page_id: &str) -> Option<BhlPage> {
        if let Some(page) = self.cache.page(page_id).await {
            return Some(page);
        }
        match self.api.get_page(page_id).await {
            Ok(Some(page)) => {
                self.cache.put_page(page_id, page.clone()).await;
                Some(page)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(page_id = %page_id, error = %e, "BHL page fetch failed");
                None
            }
        }
    }

    /// Fetch an item record, cache-first.
    pub async fn get_item(&self, item_id: &str) -> Option<BhlItem> {
        if let Some(item) = self.cache.item(item_id).await {
            return Some(item);
        }
        match self.api.get_item(item_id).await {
            Ok(Some(item)) => {
                self.cache.put_item(item_id, item.clone()).await;
                Some(item)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(item_id = %item_id, error = %e, "BHL item fetch failed");
                None
            }
        }
    }

    /// Fetch a title record, cache-first.
    pub async fn get_title(&self, title_id: &str) -> Option<BhlTitle> {
        if let Some(title) = self.cache.title(title_id).await {
            return Some(title);
        }
        match self.api.get_title(title_id).await {
            Ok(Some(title)) => {
                self.cache.put_title(title_id, title.clone()).await;
                Some(title)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(title_id = %title_id, error = %e, "BHL title fetch failed");
                None
            }
        }
    }

    /// Fetch an item (with its ordered page list) by archive identifier.
    ///
    /// Cached under the archive id, separately from BHL item ids.
    pub async fn get_item_by_archive_id(&self, archive_id: &str) -> Option<BhlItem> {
        if let Some(item) = self.cache.archive_item(archive_id).await {
            return Some(item);
        }
        match self.api.get_item_by_archive_id(archive_id).await {
            Ok(Some(item)) => {
                self.cache.put_archive_item(archive_id, item.clone()).await;
                Some(item)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(archive_id = %archive_id, error = %e, "BHL archive-item fetch failed");
                None
            }
        }
    }

    /// Resolve the publication linkage of a title.
    ///
    /// Exactly one knowledge-base identifier on the title record
    /// establishes the linkage directly. Zero or multiple is the
    /// ambiguous-link condition: the arbiter decides, and its answer
    /// (or refusal) is memoized per title id so subsequent rows citing
    /// the same title never re-prompt.
    pub async fn resolve_publication(&self, title_id: &str, title: &BhlTitle) -> Result<String> {
        let candidates = title.knowledge_base_ids();

        if let Some(memoized) = self.cache.publication_link(title_id).await {
            return match memoized {
                Some(link) => Ok(link),
                None => Err(Error::AmbiguousLink {
                    title_id: title_id.to_string(),
                    candidate_count: candidates.len(),
                }),
            };
        }

        if candidates.len() == 1 {
            let link = candidates.into_iter().next().expect("checked length");
            self.cache.put_publication_link(title_id, Some(link.clone())).await;
            return Ok(link);
        }

        warn!(
            title_id = %title_id,
            candidate_count = candidates.len(),
            "Ambiguous publication linkage, escalating to arbiter"
        );

        match self.arbiter.resolve(title_id, &candidates).await {
            Some(link) => {
                info!(title_id = %title_id, link = %link, "Publication linkage resolved by arbiter");
                self.cache.put_publication_link(title_id, Some(link.clone())).await;
                Ok(link)
            }
            None => {
                self.cache.put_publication_link(title_id, None).await;
                Err(Error::AmbiguousLink {
                    title_id: title_id.to_string(),
                    candidate_count: candidates.len(),
                })
            }
        }
    }

    /// Compose the bibliographic portion of a metadata row for one
    /// resolved identity.
    ///
    /// `Ok(None)` means the page record could not be fetched; the
    /// document is skipped, mirroring resolution failure. The only
    /// `Err` is the ambiguous-link condition.
    pub async fn aggregate(
        &self,
        file_name: &str,
        identity: &ResolvedIdentity,
    ) -> Result<Option<MetadataRow>> {
        let page = match self.get_page(&identity.page_id).await {
            Some(page) => page,
            None => {
                debug!(file = %file_name, page_id = %identity.page_id, "No page metadata, skipping");
                return Ok(None);
            }
        };

        let item_id = page
            .item_id
            .map(|id| id.to_string())
            .or_else(|| identity.item_id.clone());
        let item = match &item_id {
            Some(id) => self.get_item(id).await,
            None => None,
        };

        let title_id = item
            .as_ref()
            .and_then(|item| item.title_id.map(|id| id.to_string()))
            .or_else(|| identity.title_id.clone());
        let title = match &title_id {
            Some(id) => self.get_title(id).await,
            None => None,
        };

        let publication = match (&title_id, &title) {
            (Some(id), Some(title)) => Some(self.resolve_publication(id, title).await?),
            _ => None,
        };

        let page_types = join_nonempty(
            page.page_types
                .iter()
                .filter_map(|t| t.page_type_name.as_deref()),
            "; ",
        );
        let taxon_names = join_nonempty(page.names.iter().filter_map(|n| n.best()), "; ");

        let row = MetadataRow {
            file: file_name.to_string(),
            page_id: identity.page_id.clone(),
            page_types,
            taxon_names,
            publication,
            institution: item
                .as_ref()
                .and_then(|i| nonempty(i.holding_institution.as_deref())),
            sponsor: item.as_ref().and_then(|i| nonempty(i.sponsor.as_deref())),
            title_id,
            inception: title
                .as_ref()
                .and_then(|t| nonempty(t.publication_date.as_deref())),
            item_id,
            copyright_status: item
                .as_ref()
                .and_then(|i| nonempty(i.copyright_status.as_deref())),
            volume: nonempty(page.volume.as_deref())
                .or_else(|| item.as_ref().and_then(|i| nonempty(i.volume.as_deref()))),
            ..Default::default()
        };

        Ok(Some(row))
    }
}

fn nonempty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn join_nonempty<'a>(parts: impl Iterator<Item = &'a str>, sep: &str) -> Option<String> {
    let joined = parts
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(sep);
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

// ============================================================================
// Tests
// ============================================================================
