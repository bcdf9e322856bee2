//! End-to-end pipeline tests against in-memory trait implementations.

use async_trait::async_trait;
use bhlink_common::config::{CreatorConfig, ResolverConfig, SynthesisConfig};
use bhlink_en::aggregator::{BhlApi, MetadataAggregator, OverrideArbiter};
use bhlink_en::claims::{
    P_BHL_PAGE_ID, P_COLLECTION, P_COPYRIGHT_STATUS, P_DEPICTS, P_FLICKR_ID, P_PUBLISHED_IN,
    P_SPONSOR,
};
use bhlink_en::clients::bhl::{BhlError, BhlIdentifier, BhlItem, BhlName, BhlPage, BhlTitle};
use bhlink_en::taxon::{TaxonMatch, TaxonMatcher};
use bhlink_en::{
    ClaimSynthesizer, ExistingClaim, IdentifierResolver, PhotoMap, Pipeline, PipelineConfig,
    RecordCache, SourceDocument, Statement, StatementValue, TargetStore, TaxonNameResolver,
    WriteBatch,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

// ============================================================================
// In-memory doubles
// ============================================================================

/// Target repository held in memory; `apply` mutates the claim state so
/// reruns observe their own earlier writes.
#[derive(Default)]
struct InMemoryStore {
    markup: HashMap<String, String>,
    claims: RwLock<HashMap<String, Vec<ExistingClaim>>>,
    writes: AtomicUsize,
}

impl InMemoryStore {
    fn with_document(file_name: &str, markup: &str) -> Self {
        let mut store = Self::default();
        store
            .markup
            .insert(file_name.to_string(), markup.to_string());
        store
    }

    async fn seed_claims(&self, file_name: &str, claims: Vec<ExistingClaim>) {
        self.claims
            .write()
            .await
            .insert(file_name.to_string(), claims);
    }

    async fn claims_for(&self, file_name: &str) -> Vec<ExistingClaim> {
        self.claims
            .read()
            .await
            .get(file_name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TargetStore for InMemoryStore {
    async fn list_documents(&self, _category: &str) -> anyhow::Result<Vec<String>> {
        let mut files: Vec<String> = self.markup.keys().cloned().collect();
        files.sort();
        Ok(files)
    }

    async fn fetch_document(&self, file_name: &str) -> anyhow::Result<Option<SourceDocument>> {
        Ok(self
            .markup
            .get(file_name)
            .map(|markup| SourceDocument::new(file_name, markup.as_str())))
    }

    async fn existing_claims(&self, file_name: &str) -> anyhow::Result<Vec<ExistingClaim>> {
        Ok(self.claims_for(file_name).await)
    }

    async fn apply(
        &self,
        file_name: &str,
        batch: &WriteBatch,
        _summary: &str,
    ) -> anyhow::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut claims = self.claims.write().await;
        let record = claims.entry(file_name.to_string()).or_default();
        record.retain(|claim| {
            !batch
                .retractions
                .iter()
                .any(|r| r.property == claim.property && r.value == claim.value)
        });
        for statement in &batch.additions {
            record.push(ExistingClaim::new(&statement.property, statement.value.clone()));
        }
        Ok(())
    }
}

/// Bibliographic API serving one page → item → title chain.
struct ChainApi {
    title_kb_ids: Vec<String>,
}

impl ChainApi {
    fn new() -> Self {
        Self {
            title_kb_ids: vec!["Q51431973".to_string()],
        }
    }
}

#[async_trait]
impl BhlApi for ChainApi {
    async fn get_page(&self, page_id: &str) -> Result<Option<BhlPage>, BhlError> {
        if page_id != "46007529" {
            return Ok(None);
        }
        Ok(Some(BhlPage {
            page_id: Some(46007529),
            item_id: Some(77),
            names: vec![BhlName {
                name_canonical: Some("Galbula albirostris".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }))
    }

    async fn get_item(&self, _item_id: &str) -> Result<Option<BhlItem>, BhlError> {
        Ok(Some(BhlItem {
            item_id: Some(77),
            title_id: Some(88),
            holding_institution: Some("Q1609326".to_string()),
            sponsor: Some("Q466089".to_string()),
            copyright_status: Some("Public domain".to_string()),
            ..Default::default()
        }))
    }

    async fn get_title(&self, _title_id: &str) -> Result<Option<BhlTitle>, BhlError> {
        Ok(Some(BhlTitle {
            title_id: Some(88),
            publication_date: Some("1852".to_string()),
            identifiers: self
                .title_kb_ids
                .iter()
                .map(|id| BhlIdentifier {
                    identifier_name: Some("Wikidata".to_string()),
                    identifier_value: Some(id.clone()),
                })
                .collect(),
            ..Default::default()
        }))
    }

    async fn get_item_by_archive_id(&self, _: &str) -> Result<Option<BhlItem>, BhlError> {
        Ok(None)
    }
}

struct TableMatcher;

#[async_trait]
impl TaxonMatcher for TableMatcher {
    async fn match_name(&self, name: &str) -> anyhow::Result<Option<TaxonMatch>> {
        if name == "Galbula albirostris" {
            return Ok(Some(TaxonMatch {
                entity: "Q1266979".to_string(),
                matched_name: name.to_string(),
                accepted_name: None,
            }));
        }
        Ok(None)
    }
}

fn build_pipeline(
    store: Arc<InMemoryStore>,
    api: Arc<dyn BhlApi>,
    checkpoint_path: &Path,
) -> Pipeline {
    let cache = Arc::new(RecordCache::new());
    let arbiter = Arc::new(OverrideArbiter::new(HashMap::new()));
    let aggregator = Arc::new(MetadataAggregator::new(api, cache, arbiter));
    let resolver = IdentifierResolver::new(
        aggregator.clone(),
        Arc::new(PhotoMap::empty()),
        ResolverConfig::default(),
    );
    let taxa = TaxonNameResolver::new(Arc::new(TableMatcher));
    let synthesizer = ClaimSynthesizer::new(
        SynthesisConfig::default(),
        CreatorConfig::default(),
        HashMap::new(),
        "https://www.biodiversitylibrary.org",
    );
    Pipeline::new(
        PipelineConfig {
            category: "Test category".to_string(),
            checkpoint_path: checkpoint_path.to_path_buf(),
            checkpoint_every: 1,
            test_limit: None,
            dry_run: false,
            category_publication: None,
        },
        store,
        resolver,
        aggregator,
        taxa,
        synthesizer,
        Arc::new(PhotoMap::empty()),
        None,
        CreatorConfig::default(),
    )
}

const TEMPLATE_MARKUP: &str = "{{BHL|pageid=46007529}}";

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_end_to_end_writes_expected_claims() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::with_document("plate.jpg", TEMPLATE_MARKUP));

    let pipeline = build_pipeline(store.clone(), Arc::new(ChainApi::new()), &dir.path().join("rows.tsv"));
    pipeline.run().await.unwrap();

    let claims = store.claims_for("plate.jpg").await;
    let has = |property: &str| claims.iter().any(|c| c.property == property);
    assert!(has(P_BHL_PAGE_ID));
    assert!(has(P_PUBLISHED_IN));
    assert!(has(P_COLLECTION));
    assert!(has(P_SPONSOR));
    assert!(has(P_DEPICTS));
    assert!(has(P_COPYRIGHT_STATUS));
    assert!(claims
        .iter()
        .any(|c| c.value == StatementValue::ExternalId("46007529".to_string())));
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::with_document("plate.jpg", TEMPLATE_MARKUP));

    let pipeline = build_pipeline(store.clone(), Arc::new(ChainApi::new()), &dir.path().join("first.tsv"));
    pipeline.run().await.unwrap();
    let after_first = store.claims_for("plate.jpg").await;
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);

    // Fresh checkpoint so the document is reprocessed, same store
    let pipeline = build_pipeline(store.clone(), Arc::new(ChainApi::new()), &dir.path().join("second.tsv"));
    pipeline.run().await.unwrap();

    let after_second = store.claims_for("plate.jpg").await;
    assert_eq!(after_first.len(), after_second.len());
    // Everything was reconciled away, so no second write happened
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_minimal_complete_record_gets_refresh_only() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::with_document("plate.jpg", TEMPLATE_MARKUP));
    store
        .seed_claims(
            "plate.jpg",
            vec![
                ExistingClaim::new(P_FLICKR_ID, StatementValue::ExternalId("51197657114".into())),
                ExistingClaim::new(P_PUBLISHED_IN, StatementValue::Entity("Q51431973".into())),
                ExistingClaim::new(P_BHL_PAGE_ID, StatementValue::ExternalId("46007529".into())),
                ExistingClaim::new(P_COLLECTION, StatementValue::Entity("Q1609326".into())),
                ExistingClaim::new(P_SPONSOR, StatementValue::Entity("Q466089".into())),
            ],
        )
        .await;

    let pipeline = build_pipeline(store.clone(), Arc::new(ChainApi::new()), &dir.path().join("rows.tsv"));
    pipeline.run().await.unwrap();

    let claims = store.claims_for("plate.jpg").await;
    let new_properties: Vec<&str> = claims
        .iter()
        .skip(5)
        .map(|c| c.property.as_str())
        .collect();
    assert!(!new_properties.is_empty());
    assert!(new_properties
        .iter()
        .all(|p| *p == P_DEPICTS || *p == P_COPYRIGHT_STATUS));
}

#[tokio::test]
async fn test_checkpoint_resume_skips_processed_files() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = dir.path().join("rows.tsv");
    let store = Arc::new(InMemoryStore::with_document("plate.jpg", TEMPLATE_MARKUP));

    let pipeline = build_pipeline(store.clone(), Arc::new(ChainApi::new()), &checkpoint);
    pipeline.run().await.unwrap();
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);

    // Same checkpoint: the file is skipped before any store access
    let pipeline = build_pipeline(store.clone(), Arc::new(ChainApi::new()), &checkpoint);
    pipeline.run().await.unwrap();
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ambiguous_link_fails_document_without_write() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::with_document("plate.jpg", TEMPLATE_MARKUP));
    let api = Arc::new(ChainApi {
        title_kb_ids: vec!["Q1".to_string(), "Q2".to_string()],
    });

    let pipeline = build_pipeline(store.clone(), api, &dir.path().join("rows.tsv"));
    // The batch itself completes; the document is isolated as a failure
    pipeline.run().await.unwrap();

    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    assert!(store.claims_for("plate.jpg").await.is_empty());
}

#[tokio::test]
async fn test_unresolvable_document_is_skipped_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::with_document(
        "plain.jpg",
        "A description with no archive links at all",
    ));

    let pipeline = build_pipeline(store.clone(), Arc::new(ChainApi::new()), &dir.path().join("rows.tsv"));
    pipeline.run().await.unwrap();
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_retraction_matching_ignores_statement_additions() {
    // Guard against the in-memory apply conflating additions and
    // retractions: a batch with only additions leaves prior claims
    // intact.
    let store = InMemoryStore::with_document("plate.jpg", TEMPLATE_MARKUP);
    store
        .seed_claims(
            "plate.jpg",
            vec![ExistingClaim::new(
                P_COLLECTION,
                StatementValue::Entity("Q1609326".into()),
            )],
        )
        .await;
    let batch = WriteBatch {
        additions: vec![Statement::new(
            P_BHL_PAGE_ID,
            StatementValue::ExternalId("1".into()),
        )],
        retractions: vec![],
    };
    store.apply("plate.jpg", &batch, "summary").await.unwrap();
    assert_eq!(store.claims_for("plate.jpg").await.len(), 2);
}
