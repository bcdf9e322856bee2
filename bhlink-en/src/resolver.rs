//! Identifier-resolution cascade
//!
//! Extracts a canonical archive page identifier from unstructured
//! document markup. Four strategies run in fixed precedence, each trying
//! independently and failing silently to the next:
//!
//! 1. Structured extraction: embedded provenance template, highest
//!    confidence, short-circuits the cascade.
//! 2. Archive-offset inference (flag-gated): full-text archive URL plus
//!    the item's ordered page list.
//! 3. Reverse photo-id mapping (flag-gated): exact match against the
//!    precomputed bidirectional id table.
//! 4. Direct URL scan: accepted only if exactly one distinct id
//!    appears across every page/page-image URL in the markup.
//!
//! A document that defeats all four strategies is skipped: no row, no
//! error. That is expected, common behavior.

use crate::aggregator::MetadataAggregator;
use crate::photo_map::PhotoMap;
use crate::types::{ResolvedIdentity, SourceDocument};
use bhlink_common::config::ResolverConfig;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which cascade step produced an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    /// Embedded structured provenance template
    Template,
    /// Full-text-archive URL with configured page-order offset
    ArchiveOffset,
    /// Reverse lookup in the photo-id table
    PhotoMap,
    /// Single distinct id across direct page URLs
    UrlScan,
}

impl ResolveStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            ResolveStrategy::Template => "template",
            ResolveStrategy::ArchiveOffset => "archive-offset",
            ResolveStrategy::PhotoMap => "photo-map",
            ResolveStrategy::UrlScan => "url-scan",
        }
    }
}

/// Four-strategy page-id resolver.
pub struct IdentifierResolver {
    aggregator: Arc<MetadataAggregator>,
    photo_map: Arc<PhotoMap>,
    config: ResolverConfig,
    template_re: Regex,
    archive_re: Regex,
    photo_re: Regex,
    page_url_re: Regex,
    page_image_url_re: Regex,
}

impl IdentifierResolver {
    pub fn new(
        aggregator: Arc<MetadataAggregator>,
        photo_map: Arc<PhotoMap>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            aggregator,
            photo_map,
            config,
            template_re: Regex::new(r"\|\s*pageid\s*=\s*(\d+)").expect("static regex"),
            archive_re: Regex::new(r"https://archive\.org/stream/([^/#\s|]+)\S*?#page/n(\d+)")
                .expect("static regex"),
            photo_re: Regex::new(r"https://www\.flickr\.com/photos/biodivlibrary/(\d+)")
                .expect("static regex"),
            page_url_re: Regex::new(r"https://www\.biodiversitylibrary\.org/page/(\d+)")
                .expect("static regex"),
            page_image_url_re: Regex::new(r"https://www\.biodiversitylibrary\.org/pageimage/(\d+)")
                .expect("static regex"),
        }
    }

    /// Run the cascade for one document.
    ///
    /// `None` is the valid terminal skip state, never an error.
    pub async fn resolve(&self, doc: &SourceDocument) -> Option<ResolvedIdentity> {
        if let Some(identity) = self.from_template(doc) {
            debug!(file = %doc.file_name, page_id = %identity.page_id, "Resolved via template");
            return Some(identity);
        }

        if self.config.infer_from_archive {
            if let Some(identity) = self.from_archive_offset(doc).await {
                debug!(file = %doc.file_name, page_id = %identity.page_id, "Resolved via archive offset");
                return Some(identity);
            }
        }

        if self.config.infer_from_photo_id {
            if let Some(identity) = self.from_photo_map(doc) {
                debug!(file = %doc.file_name, page_id = %identity.page_id, "Resolved via photo map");
                return Some(identity);
            }
        }

        if let Some(identity) = self.from_url_scan(doc) {
            debug!(file = %doc.file_name, page_id = %identity.page_id, "Resolved via URL scan");
            return Some(identity);
        }

        debug!(file = %doc.file_name, "No page identifier resolved, skipping");
        None
    }

    /// Strategy 1: read the page-id field of the embedded provenance
    /// template directly.
    fn from_template(&self, doc: &SourceDocument) -> Option<ResolvedIdentity> {
        if !doc.markup.contains("{{BHL") {
            return None;
        }
        let captures = self.template_re.captures(&doc.markup)?;
        Some(ResolvedIdentity {
            page_id: captures[1].to_string(),
            item_id: None,
            title_id: None,
            strategy: ResolveStrategy::Template,
        })
    }

    /// Strategy 2: parse the archive item identifier and internal page
    /// number from a full-text-archive URL, then select from the item's
    /// ordered page list at `target_order = page_number - offset`
    /// (1-indexed).
    async fn from_archive_offset(&self, doc: &SourceDocument) -> Option<ResolvedIdentity> {
        let captures = self.archive_re.captures(&doc.markup)?;
        let archive_id = captures[1].to_string();
        let page_number: i64 = captures[2].parse().ok()?;

        // Offset sign convention preserved from observed behavior:
        // a negative offset advances the target order.
        let target_order = page_number - self.config.archive_offset;
        if target_order < 1 {
            warn!(
                file = %doc.file_name,
                target_order,
                "Archive target order below 1, strategy failed"
            );
            return None;
        }

        let item = self.aggregator.get_item_by_archive_id(&archive_id).await?;
        if target_order as usize > item.pages.len() {
            warn!(
                file = %doc.file_name,
                target_order,
                page_count = item.pages.len(),
                "Archive target order exceeds page list, strategy failed"
            );
            return None;
        }

        let page = &item.pages[target_order as usize - 1];
        Some(ResolvedIdentity {
            page_id: page.page_id.map(|id| id.to_string())?,
            item_id: item.item_id.map(|id| id.to_string()),
            title_id: item.title_id.map(|id| id.to_string()),
            strategy: ResolveStrategy::ArchiveOffset,
        })
    }

    /// Strategy 3: numeric photo id from the markup, reversed through
    /// the precomputed id table. Exact matches only.
    fn from_photo_map(&self, doc: &SourceDocument) -> Option<ResolvedIdentity> {
        let captures = self.photo_re.captures(&doc.markup)?;
        let photo_id = &captures[1];
        let page_id = self.photo_map.page_for_photo(photo_id)?;
        Some(ResolvedIdentity {
            page_id: page_id.to_string(),
            item_id: None,
            title_id: None,
            strategy: ResolveStrategy::PhotoMap,
        })
    }

    /// Strategy 4: scan the full markup for direct page and page-image
    /// URLs. Succeeds only if exactly one distinct id appears.
    fn from_url_scan(&self, doc: &SourceDocument) -> Option<ResolvedIdentity> {
        let ids: HashSet<&str> = self
            .page_url_re
            .captures_iter(&doc.markup)
            .chain(self.page_image_url_re.captures_iter(&doc.markup))
            .map(|c| c.get(1).expect("capture group").as_str())
            .collect();

        if ids.len() != 1 {
            if ids.len() > 1 {
                debug!(
                    file = %doc.file_name,
                    distinct_ids = ids.len(),
                    "Ambiguous direct page URLs, strategy failed"
                );
            }
            return None;
        }

        Some(ResolvedIdentity {
            page_id: ids.into_iter().next().expect("checked length").to_string(),
            item_id: None,
            title_id: None,
            strategy: ResolveStrategy::UrlScan,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::{BhlApi, LinkArbiter, MetadataAggregator};
    use crate::cache::RecordCache;
    use crate::clients::bhl::{BhlError, BhlItem, BhlPage, BhlTitle};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// API fake serving an archive item with `page_count` ordered pages
    /// whose page ids are `1000 + order`.
    struct ArchiveApi {
        page_count: usize,
        archive_calls: AtomicUsize,
    }

    impl ArchiveApi {
        fn with_pages(page_count: usize) -> Self {
            Self {
                page_count,
                archive_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl BhlApi for ArchiveApi {
        async fn get_page(&self, _: &str) -> Result<Option<BhlPage>, BhlError> {
            Ok(None)
        }
        async fn get_item(&self, _: &str) -> Result<Option<BhlItem>, BhlError> {
            Ok(None)
        }
        async fn get_title(&self, _: &str) -> Result<Option<BhlTitle>, BhlError> {
            Ok(None)
        }
        async fn get_item_by_archive_id(&self, _: &str) -> Result<Option<BhlItem>, BhlError> {
            self.archive_calls.fetch_add(1, Ordering::SeqCst);
            let pages = (1..=self.page_count)
                .map(|order| BhlPage {
                    page_id: Some(1000 + order as u64),
                    ..Default::default()
                })
                .collect();
            Ok(Some(BhlItem {
                item_id: Some(77),
                title_id: Some(88),
                pages,
                ..Default::default()
            }))
        }
    }

    struct NoArbiter;

    #[async_trait]
    impl LinkArbiter for NoArbiter {
        async fn resolve(&self, _: &str, _: &[String]) -> Option<String> {
            None
        }
    }

    fn resolver_with(
        api: Arc<ArchiveApi>,
        photo_map: PhotoMap,
        config: ResolverConfig,
    ) -> IdentifierResolver {
        let aggregator = Arc::new(MetadataAggregator::new(
            api,
            Arc::new(RecordCache::new()),
            Arc::new(NoArbiter),
        ));
        IdentifierResolver::new(aggregator, Arc::new(photo_map), config)
    }

    fn all_enabled(offset: i64) -> ResolverConfig {
        ResolverConfig {
            infer_from_archive: true,
            archive_offset: offset,
            infer_from_photo_id: true,
            photo_map_path: None,
        }
    }

    #[tokio::test]
    async fn test_template_short_circuits_cascade() {
        let api = Arc::new(ArchiveApi::with_pages(10));
        let resolver = resolver_with(api.clone(), PhotoMap::empty(), all_enabled(0));

        // Markup carries every signal; the template must win without
        // the archive strategy ever being invoked.
        let doc = SourceDocument::new(
            "plate.jpg",
            "{{BHL|pageid= 46007529}}\n\
             https://archive.org/stream/monographofjacam00scla#page/n125/mode/1up\n\
             https://www.flickr.com/photos/biodivlibrary/51197657114",
        );

        let identity = resolver.resolve(&doc).await.unwrap();
        assert_eq!(identity.page_id, "46007529");
        assert_eq!(identity.strategy, ResolveStrategy::Template);
        assert_eq!(api.archive_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_archive_offset_negative_advances_order() {
        // page/n125 with offset -1: target_order = 125 - (-1) = 126
        let api = Arc::new(ArchiveApi::with_pages(130));
        let resolver = resolver_with(api, PhotoMap::empty(), all_enabled(-1));

        let doc = SourceDocument::new(
            "plate.jpg",
            "BHL Consortium https://archive.org/stream/monographofjacam00scla/monographofjacam00scla#page/n125/mode/1up",
        );

        let identity = resolver.resolve(&doc).await.unwrap();
        assert_eq!(identity.page_id, "1126"); // page at 1-indexed position 126
        assert_eq!(identity.strategy, ResolveStrategy::ArchiveOffset);
        assert_eq!(identity.item_id.as_deref(), Some("77"));
        assert_eq!(identity.title_id.as_deref(), Some("88"));
    }

    #[tokio::test]
    async fn test_archive_offset_fails_past_page_list() {
        let api = Arc::new(ArchiveApi::with_pages(125));
        let resolver = resolver_with(api, PhotoMap::empty(), all_enabled(-1));

        // target_order 126 > 125 pages
        let doc = SourceDocument::new(
            "plate.jpg",
            "https://archive.org/stream/monographofjacam00scla#page/n125/mode/1up",
        );
        assert!(resolver.resolve(&doc).await.is_none());
    }

    #[tokio::test]
    async fn test_archive_offset_fails_below_one() {
        let api = Arc::new(ArchiveApi::with_pages(10));
        let resolver = resolver_with(api.clone(), PhotoMap::empty(), all_enabled(5));

        let doc = SourceDocument::new(
            "plate.jpg",
            "https://archive.org/stream/monographofjacam00scla#page/n3/mode/1up",
        );
        assert!(resolver.resolve(&doc).await.is_none());
        // Failed before any fetch
        assert_eq!(api.archive_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_archive_strategy_disabled_by_flag() {
        let api = Arc::new(ArchiveApi::with_pages(200));
        let mut config = all_enabled(0);
        config.infer_from_archive = false;
        let resolver = resolver_with(api.clone(), PhotoMap::empty(), config);

        let doc = SourceDocument::new(
            "plate.jpg",
            "https://archive.org/stream/monographofjacam00scla#page/n5/mode/1up",
        );
        assert!(resolver.resolve(&doc).await.is_none());
        assert_eq!(api.archive_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_photo_map_exact_match() {
        let api = Arc::new(ArchiveApi::with_pages(0));
        let map = PhotoMap::from_map(
            [("46007529".to_string(), "51197657114".to_string())]
                .into_iter()
                .collect(),
        );
        let resolver = resolver_with(api, map, all_enabled(0));

        let doc = SourceDocument::new(
            "plate.jpg",
            "Source: https://www.flickr.com/photos/biodivlibrary/51197657114/in/album-1",
        );
        let identity = resolver.resolve(&doc).await.unwrap();
        assert_eq!(identity.page_id, "46007529");
        assert_eq!(identity.strategy, ResolveStrategy::PhotoMap);
    }

    #[tokio::test]
    async fn test_photo_map_miss_falls_through() {
        let api = Arc::new(ArchiveApi::with_pages(0));
        let resolver = resolver_with(api, PhotoMap::empty(), all_enabled(0));

        let doc = SourceDocument::new(
            "plate.jpg",
            "https://www.flickr.com/photos/biodivlibrary/999999 \
             https://www.biodiversitylibrary.org/page/123",
        );
        // Photo map misses, URL scan then resolves
        let identity = resolver.resolve(&doc).await.unwrap();
        assert_eq!(identity.page_id, "123");
        assert_eq!(identity.strategy, ResolveStrategy::UrlScan);
    }

    #[tokio::test]
    async fn test_url_scan_ambiguous_means_skip() {
        let api = Arc::new(ArchiveApi::with_pages(0));
        let resolver = resolver_with(api, PhotoMap::empty(), ResolverConfig::default());

        let doc = SourceDocument::new(
            "plate.jpg",
            "https://www.biodiversitylibrary.org/page/111 and \
             https://www.biodiversitylibrary.org/pageimage/222",
        );
        assert!(resolver.resolve(&doc).await.is_none());
    }

    #[tokio::test]
    async fn test_url_scan_repeated_single_id_succeeds() {
        let api = Arc::new(ArchiveApi::with_pages(0));
        let resolver = resolver_with(api, PhotoMap::empty(), ResolverConfig::default());

        let doc = SourceDocument::new(
            "plate.jpg",
            "https://www.biodiversitylibrary.org/page/333 again \
             https://www.biodiversitylibrary.org/pageimage/333",
        );
        let identity = resolver.resolve(&doc).await.unwrap();
        assert_eq!(identity.page_id, "333");
    }

    #[tokio::test]
    async fn test_no_signal_skips() {
        let api = Arc::new(ArchiveApi::with_pages(0));
        let resolver = resolver_with(api, PhotoMap::empty(), ResolverConfig::default());

        let doc = SourceDocument::new("plate.jpg", "plain description, no links");
        assert!(resolver.resolve(&doc).await.is_none());
    }
}
