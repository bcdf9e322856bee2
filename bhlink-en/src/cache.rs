//! Run-scoped record cache
//!
//! Injected into the aggregation layer and keyed by record kind + id.
//! Process-scoped with no eviction and no cross-run persistence: a
//! record fetched once is reused for the remainder of the run.

use crate::clients::bhl::{BhlItem, BhlPage, BhlTitle};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory cache for the three-tier bibliographic records, the
/// archive-item page listings, and memoized publication-link
/// resolutions.
#[derive(Default)]
pub struct RecordCache {
    pages: RwLock<HashMap<String, BhlPage>>,
    items: RwLock<HashMap<String, BhlItem>>,
    titles: RwLock<HashMap<String, BhlTitle>>,
    archive_items: RwLock<HashMap<String, BhlItem>>,
    publication_links: RwLock<HashMap<String, Option<String>>>,
}

impl RecordCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn page(&self, id: &str) -> Option<BhlPage> {
        self.pages.read().await.get(id).cloned()
    }

    pub async fn put_page(&self, id: &str, page: BhlPage) {
        self.pages.write().await.insert(id.to_string(), page);
    }

    pub async fn item(&self, id: &str) -> Option<BhlItem> {
        self.items.read().await.get(id).cloned()
    }

    pub async fn put_item(&self, id: &str, item: BhlItem) {
        self.items.write().await.insert(id.to_string(), item);
    }

    pub async fn title(&self, id: &str) -> Option<BhlTitle> {
        self.titles.read().await.get(id).cloned()
    }

    pub async fn put_title(&self, id: &str, title: BhlTitle) {
        self.titles.write().await.insert(id.to_string(), title);
    }

    pub async fn archive_item(&self, archive_id: &str) -> Option<BhlItem> {
        self.archive_items.read().await.get(archive_id).cloned()
    }

    pub async fn put_archive_item(&self, archive_id: &str, item: BhlItem) {
        self.archive_items
            .write()
            .await
            .insert(archive_id.to_string(), item);
    }

    /// Memoized publication-link resolution for a title id.
    ///
    /// The outer `Option` is a cache miss; the inner `Option` is a
    /// memoized "no linkage obtainable" outcome.
    pub async fn publication_link(&self, title_id: &str) -> Option<Option<String>> {
        self.publication_links.read().await.get(title_id).cloned()
    }

    pub async fn put_publication_link(&self, title_id: &str, link: Option<String>) {
        self.publication_links
            .write()
            .await
            .insert(title_id.to_string(), link);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_page_round_trip() {
        let cache = RecordCache::new();
        assert!(cache.page("42").await.is_none());

        cache
            .put_page(
                "42",
                BhlPage {
                    page_id: Some(42),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(cache.page("42").await.unwrap().page_id, Some(42));
    }

    #[tokio::test]
    async fn test_memoized_absent_link_is_a_hit() {
        let cache = RecordCache::new();
        assert!(cache.publication_link("7").await.is_none());

        cache.put_publication_link("7", None).await;

        // Miss and memoized-absence are distinguishable
        assert_eq!(cache.publication_link("7").await, Some(None));
    }

    #[tokio::test]
    async fn test_archive_items_keyed_separately_from_items() {
        let cache = RecordCache::new();
        cache
            .put_archive_item("monographofjacam00scla", BhlItem::default())
            .await;
        assert!(cache.item("monographofjacam00scla").await.is_none());
        assert!(cache.archive_item("monographofjacam00scla").await.is_some());
    }
}
