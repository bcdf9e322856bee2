//! Taxon name resolution
//!
//! Maps scientific names extracted from page OCR to knowledge-base
//! entities. Resolution is strictly best-effort: a name that cannot be
//! matched is dropped with a log line and never blocks the rest of the
//! document's enrichment.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A successful name match against the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonMatch {
    /// Knowledge-base entity id (e.g. "Q1747689")
    pub entity: String,
    /// The name the match was found under
    pub matched_name: String,
    /// Currently accepted name, when the matched name is a synonym
    pub accepted_name: Option<String>,
}

/// Knowledge-base lookup seam. The production implementation queries
/// the SPARQL endpoint; tests substitute an in-memory table.
#[async_trait]
pub trait TaxonMatcher: Send + Sync {
    /// Match a scientific name, directly or through recorded synonyms.
    /// `Ok(None)` means no entity carries the name.
    async fn match_name(&self, name: &str) -> anyhow::Result<Option<TaxonMatch>>;
}

/// Best-effort resolver over a [`TaxonMatcher`], with a per-run memo so
/// a name recurring across plates is looked up once.
pub struct TaxonNameResolver {
    matcher: Arc<dyn TaxonMatcher>,
    memo: RwLock<HashMap<String, Option<TaxonMatch>>>,
}

impl TaxonNameResolver {
    pub fn new(matcher: Arc<dyn TaxonMatcher>) -> Self {
        Self {
            matcher,
            memo: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a batch of names, in order, dropping every failure.
    pub async fn resolve_all(&self, names: &[String]) -> Vec<TaxonMatch> {
        let mut matches = Vec::new();
        for name in names {
            if let Some(m) = self.resolve(name).await {
                matches.push(m);
            }
        }
        matches
    }

    /// Resolve a single name. Returns `None` for rejected, unmatched,
    /// or failed lookups alike.
    pub async fn resolve(&self, name: &str) -> Option<TaxonMatch> {
        let name = name.trim();
        if !Self::looks_binomial(name) {
            debug!(name, "Rejected taxon name before lookup");
            return None;
        }

        if let Some(memoized) = self.memo.read().await.get(name) {
            return memoized.clone();
        }

        let result = match self.matcher.match_name(name).await {
            Ok(result) => result,
            Err(e) => {
                warn!(name, error = %e, "Taxon lookup failed, dropping name");
                None
            }
        };

        if let Some(m) = &result {
            if let Some(accepted) = &m.accepted_name {
                info!(
                    matched = %m.matched_name,
                    accepted = %accepted,
                    entity = %m.entity,
                    "Taxon name matched via synonym"
                );
            }
        } else {
            debug!(name, "No taxon entity found");
        }

        self.memo
            .write()
            .await
            .insert(name.to_string(), result.clone());
        result
    }

    /// Genus-plus-epithet filter. Single-token strings are genus names
    /// or OCR fragments, too ambiguous to query.
    fn looks_binomial(name: &str) -> bool {
        let mut words = name.split_whitespace();
        words.next().is_some() && words.next().is_some()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TableMatcher {
        table: HashMap<String, TaxonMatch>,
        calls: AtomicUsize,
    }

    impl TableMatcher {
        fn new(entries: Vec<TaxonMatch>) -> Self {
            let table = entries
                .into_iter()
                .map(|m| (m.matched_name.clone(), m))
                .collect();
            Self {
                table,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TaxonMatcher for TableMatcher {
        async fn match_name(&self, name: &str) -> anyhow::Result<Option<TaxonMatch>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.table.get(name).cloned())
        }
    }

    struct FailingMatcher;

    #[async_trait]
    impl TaxonMatcher for FailingMatcher {
        async fn match_name(&self, _name: &str) -> anyhow::Result<Option<TaxonMatch>> {
            anyhow::bail!("endpoint unreachable")
        }
    }

    fn direct(name: &str, entity: &str) -> TaxonMatch {
        TaxonMatch {
            entity: entity.to_string(),
            matched_name: name.to_string(),
            accepted_name: None,
        }
    }

    #[tokio::test]
    async fn test_single_token_rejected_without_lookup() {
        let matcher = Arc::new(TableMatcher::new(vec![direct("Falco", "Q43489")]));
        let resolver = TaxonNameResolver::new(matcher.clone());

        assert!(resolver.resolve("Falco").await.is_none());
        assert_eq!(matcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_direct_match() {
        let matcher = Arc::new(TableMatcher::new(vec![direct(
            "Galbula albirostris",
            "Q1266979",
        )]));
        let resolver = TaxonNameResolver::new(matcher);

        let m = resolver.resolve("Galbula albirostris").await.unwrap();
        assert_eq!(m.entity, "Q1266979");
        assert!(m.accepted_name.is_none());
    }

    #[tokio::test]
    async fn test_synonym_match_carries_accepted_name() {
        let matcher = Arc::new(TableMatcher::new(vec![TaxonMatch {
            entity: "Q1266979".to_string(),
            matched_name: "Galbula leucogastra".to_string(),
            accepted_name: Some("Galbula albirostris".to_string()),
        }]));
        let resolver = TaxonNameResolver::new(matcher);

        let m = resolver.resolve("Galbula leucogastra").await.unwrap();
        assert_eq!(m.accepted_name.as_deref(), Some("Galbula albirostris"));
    }

    #[tokio::test]
    async fn test_unmatched_and_failed_names_are_dropped() {
        let resolver = TaxonNameResolver::new(Arc::new(FailingMatcher));
        assert!(resolver.resolve("Nonexistens species").await.is_none());

        let resolver = TaxonNameResolver::new(Arc::new(TableMatcher::new(vec![])));
        let matches = resolver
            .resolve_all(&["Ignotum nomen".to_string(), "Aliud ignotum".to_string()])
            .await;
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_memo_avoids_repeat_lookups() {
        let matcher = Arc::new(TableMatcher::new(vec![direct(
            "Galbula albirostris",
            "Q1266979",
        )]));
        let resolver = TaxonNameResolver::new(matcher.clone());

        resolver.resolve("Galbula albirostris").await;
        resolver.resolve("Galbula albirostris").await;
        // Negative results are memoized too
        resolver.resolve("Ignotum nomen").await;
        resolver.resolve("Ignotum nomen").await;

        assert_eq!(matcher.calls.load(Ordering::SeqCst), 2);
    }
}
