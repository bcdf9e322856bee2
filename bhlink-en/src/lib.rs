//! bhlink-en library interface
//!
//! Exposes the enrichment pipeline for integration testing: the
//! identifier-resolution cascade, the metadata aggregation layer, claim
//! synthesis, the merge engine, and the batch workflow.

pub mod aggregator;
pub mod cache;
pub mod claims;
pub mod clients;
pub mod photo_map;
pub mod resolver;
pub mod synthesizer;
pub mod taxon;
pub mod types;
pub mod workflow;

mod merge;
pub use merge::{is_minimal_complete, MergeEngine};

pub use aggregator::{ConsoleArbiter, LinkArbiter, MetadataAggregator, OverrideArbiter};
pub use cache::RecordCache;
pub use claims::{ExistingClaim, MergePolicy, Rank, Statement, StatementValue, WriteBatch};
pub use photo_map::PhotoMap;
pub use resolver::{IdentifierResolver, ResolveStrategy};
pub use synthesizer::{ClaimSynthesizer, TaxonCandidate};
pub use taxon::{TaxonMatch, TaxonMatcher, TaxonNameResolver};
pub use types::{MetadataRow, ResolvedIdentity, SourceDocument};
pub use workflow::pipeline::{Pipeline, PipelineConfig};
pub use workflow::{TagSource, TargetStore};
