//! Batch enrichment workflow
//!
//! Sequential orchestration over one category of documents: checkpoint
//! persistence and the pipeline itself. The target repository is
//! reached through the [`TargetStore`] seam so the pipeline can be
//! driven against an in-memory store in tests.

pub mod checkpoint;
pub mod pipeline;

use crate::claims::{ExistingClaim, WriteBatch};
use crate::types::SourceDocument;
use async_trait::async_trait;

/// Photo-tag retrieval port (forward enrichment of resolved pages).
#[async_trait]
pub trait TagSource: Send + Sync {
    /// Raw tags for a photo id; failures degrade to an empty list at
    /// the call site.
    async fn photo_tags(&self, photo_id: &str) -> anyhow::Result<Vec<String>>;
}

/// Read/write port onto the target media repository.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// File names of every document in a category.
    async fn list_documents(&self, category: &str) -> anyhow::Result<Vec<String>>;

    /// Fetch a document's markup. `None` when the file does not exist.
    async fn fetch_document(&self, file_name: &str) -> anyhow::Result<Option<SourceDocument>>;

    /// Structured claims already present on the document's record.
    async fn existing_claims(&self, file_name: &str) -> anyhow::Result<Vec<ExistingClaim>>;

    /// Apply a reconciled write batch with an edit summary.
    async fn apply(
        &self,
        file_name: &str,
        batch: &WriteBatch,
        summary: &str,
    ) -> anyhow::Result<()>;
}
