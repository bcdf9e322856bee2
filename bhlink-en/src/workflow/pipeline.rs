//! Pipeline orchestrator
//!
//! Drives one category of documents through the full enrichment flow:
//! resolve → aggregate → enrich → synthesize → merge → write. Strictly
//! sequential; per-document errors are isolated so one bad document
//! never aborts the batch. Progress is checkpointed every N rows and a
//! restarted run resumes by skipping file names already recorded.

use super::checkpoint::Checkpoint;
use super::{TagSource, TargetStore};
use crate::aggregator::MetadataAggregator;
use crate::claims::Provenance;
use crate::merge::{is_minimal_complete, MergeEngine};
use crate::photo_map::PhotoMap;
use crate::resolver::IdentifierResolver;
use crate::synthesizer::{ClaimSynthesizer, TaxonCandidate};
use crate::taxon::TaxonNameResolver;
use crate::types::MetadataRow;
use anyhow::{Context, Result};
use bhlink_common::config::CreatorConfig;
use bhlink_common::summary::generate_edit_summary;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Batch-level pipeline settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Category whose files are enumerated
    pub category: String,
    /// Checkpoint row file
    pub checkpoint_path: PathBuf,
    /// Flush the checkpoint every N processed rows
    pub checkpoint_every: usize,
    /// Stop after this many processed documents
    pub test_limit: Option<usize>,
    /// Synthesize and reconcile but never write
    pub dry_run: bool,
    /// Publication entity the category itself corresponds to, used
    /// when the bibliographic hierarchy yields no publication
    pub category_publication: Option<String>,
}

pub struct Pipeline {
    config: PipelineConfig,
    run_id: Uuid,
    edit_summary: String,
    store: Arc<dyn TargetStore>,
    resolver: IdentifierResolver,
    aggregator: Arc<MetadataAggregator>,
    taxa: TaxonNameResolver,
    synthesizer: ClaimSynthesizer,
    photo_map: Arc<PhotoMap>,
    tags: Option<Arc<dyn TagSource>>,
    creators: CreatorConfig,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn TargetStore>,
        resolver: IdentifierResolver,
        aggregator: Arc<MetadataAggregator>,
        taxa: TaxonNameResolver,
        synthesizer: ClaimSynthesizer,
        photo_map: Arc<PhotoMap>,
        tags: Option<Arc<dyn TagSource>>,
        creators: CreatorConfig,
    ) -> Self {
        let run_id = Uuid::new_v4();
        let test_edit = config.dry_run || config.test_limit.is_some();
        Self {
            edit_summary: generate_edit_summary(run_id, test_edit),
            config,
            run_id,
            store,
            resolver,
            aggregator,
            taxa,
            synthesizer,
            photo_map,
            tags,
            creators,
        }
    }

    /// Process every document in the configured category, in
    /// enumeration order.
    pub async fn run(&self) -> Result<()> {
        let mut checkpoint = Checkpoint::open(
            &self.config.checkpoint_path,
            self.config.checkpoint_every,
        )
        .context("Failed to open checkpoint")?;

        let files = self
            .store
            .list_documents(&self.config.category)
            .await
            .with_context(|| format!("Failed to list category {}", self.config.category))?;
        info!(
            run_id = %self.run_id,
            category = %self.config.category,
            documents = files.len(),
            "Starting enrichment run"
        );

        let mut processed = 0usize;
        let mut skipped = 0usize;
        let mut failed = 0usize;

        for file_name in &files {
            if let Some(limit) = self.config.test_limit {
                if processed >= limit {
                    info!(limit, "Test limit reached, stopping");
                    break;
                }
            }
            if checkpoint.is_processed(file_name) {
                debug!(file = %file_name, "Already in checkpoint, skipping");
                continue;
            }
            if is_unsupported_format(file_name) {
                warn!(file = %file_name, "Unsupported file format, skipping");
                skipped += 1;
                continue;
            }

            match self.process_document(file_name).await {
                Ok(Some(row)) => {
                    checkpoint.record(row);
                    processed += 1;
                }
                Ok(None) => {
                    skipped += 1;
                }
                Err(e) => {
                    error!(file = %file_name, error = %e, "Document failed, continuing");
                    failed += 1;
                }
            }
        }

        checkpoint.flush().context("Final checkpoint flush failed")?;
        info!(
            run_id = %self.run_id,
            processed,
            skipped,
            failed,
            "Enrichment run finished"
        );
        Ok(())
    }

    /// One document end to end. `Ok(None)` is the expected skip path
    /// (no markup, no resolvable identity, no page metadata).
    async fn process_document(&self, file_name: &str) -> Result<Option<MetadataRow>> {
        let Some(doc) = self.store.fetch_document(file_name).await? else {
            warn!(file = %file_name, "No markup retrieved, skipping");
            return Ok(None);
        };

        let Some(identity) = self.resolver.resolve(&doc).await else {
            return Ok(None);
        };

        let Some(row) = self.aggregator.aggregate(file_name, &identity).await? else {
            return Ok(None);
        };
        let row = self.enrich(row).await;

        let existing = self.store.existing_claims(file_name).await?;
        let taxa = self.taxon_candidates(&row).await;

        let statements = if is_minimal_complete(&existing) {
            debug!(file = %file_name, "Record already enriched, refresh only");
            self.synthesizer.synthesize_refresh(&row, &existing, &taxa)
        } else {
            self.synthesizer.synthesize(&row, &existing, &taxa)
        };

        let batch = MergeEngine::reconcile(&statements, &existing);
        if batch.is_empty() {
            info!(file = %file_name, "Nothing to write");
        } else if self.config.dry_run {
            info!(
                file = %file_name,
                additions = batch.additions.len(),
                retractions = batch.retractions.len(),
                "Dry run, not writing"
            );
        } else {
            self.store
                .apply(file_name, &batch, &self.edit_summary)
                .await
                .with_context(|| format!("Write rejected for {file_name}"))?;
        }

        Ok(Some(row))
    }

    /// Fill in the row fields that come from configuration and the
    /// photo-id table rather than the bibliographic API.
    async fn enrich(&self, mut row: MetadataRow) -> MetadataRow {
        if row.publication.is_none() {
            if let Some(publication) = &self.config.category_publication {
                debug!(file = %row.file, publication = %publication, "Falling back to category publication");
                row.publication = Some(publication.clone());
            }
        }
        row.illustrator = self.creators.illustrator.clone();
        row.painter = self.creators.painter.clone();
        row.engraver = self.creators.engraver.clone();
        row.lithographer = self.creators.lithographer.clone();

        if let Some(photo_id) = self.photo_map.photo_for_page(&row.page_id) {
            row.photo_id = Some(photo_id.to_string());
            if let Some(tags) = &self.tags {
                match tags.photo_tags(photo_id).await {
                    Ok(tags) if !tags.is_empty() => {
                        row.photo_tags = Some(tags.join(", "));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(photo_id, error = %e, "Tag fetch failed, continuing without tags");
                    }
                }
            }
        }
        row
    }

    /// Depicted-taxon candidates from page names (OCR) and photo tags,
    /// de-duplicated by entity with the first provenance winning.
    async fn taxon_candidates(&self, row: &MetadataRow) -> Vec<TaxonCandidate> {
        let mut candidates = Vec::new();
        for m in self.taxa.resolve_all(&row.taxon_name_list()).await {
            candidates.push(TaxonCandidate {
                entity: m.entity,
                provenance: Provenance::OcrInferred,
            });
        }
        let tag_names = crate::clients::flickr::binomial_names(&row.photo_tag_list());
        for m in self.taxa.resolve_all(&tag_names).await {
            candidates.push(TaxonCandidate {
                entity: m.entity,
                provenance: Provenance::TagInferred,
            });
        }
        dedup_candidates(candidates)
    }
}

fn dedup_candidates(candidates: Vec<TaxonCandidate>) -> Vec<TaxonCandidate> {
    let mut seen = std::collections::HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.entity.clone()))
        .collect()
}

/// The write path only supports bitmap media; PDF and DjVu containers
/// are skipped up front.
fn is_unsupported_format(file_name: &str) -> bool {
    let lower = file_name.to_ascii_lowercase();
    lower.ends_with(".pdf") || lower.ends_with(".djvu")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_formats() {
        assert!(is_unsupported_format("scan.PDF"));
        assert!(is_unsupported_format("book.djvu"));
        assert!(!is_unsupported_format("plate.jpg"));
    }

    #[test]
    fn test_dedup_keeps_first_provenance() {
        let candidates = vec![
            TaxonCandidate {
                entity: "Q1".to_string(),
                provenance: Provenance::OcrInferred,
            },
            TaxonCandidate {
                entity: "Q1".to_string(),
                provenance: Provenance::TagInferred,
            },
            TaxonCandidate {
                entity: "Q2".to_string(),
                provenance: Provenance::TagInferred,
            },
        ];
        let deduped = dedup_candidates(candidates);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].provenance, Provenance::OcrInferred);
    }
}
