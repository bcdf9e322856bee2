//! bhlink-en: batch enrichment of scanned-literature media records
//!
//! Enumerates a media-repository category, resolves each file to its
//! bibliographic page identity, aggregates archive metadata, and writes
//! reconciled structured claims back to the repository.

use anyhow::{Context, Result};
use bhlink_common::config::{self, CreatorConfig};
use bhlink_en::aggregator::{ConsoleArbiter, LinkArbiter, MetadataAggregator, OverrideArbiter};
use bhlink_en::clients::bhl::BhlClient;
use bhlink_en::clients::commons::{CommonsClient, Credentials};
use bhlink_en::clients::flickr::FlickrClient;
use bhlink_en::clients::wikidata::WikidataClient;
use bhlink_en::workflow::TagSource;
use bhlink_en::{
    ClaimSynthesizer, IdentifierResolver, PhotoMap, Pipeline, PipelineConfig, RecordCache,
    TaxonNameResolver,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Debug, Parser)]
#[command(name = "bhlink-en", version, about = "Structured-data enrichment for scanned biodiversity literature")]
struct Args {
    /// Configuration file path (overrides BHLINK_CONFIG and defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Category to process (overrides the configured category)
    #[arg(long)]
    category: Option<String>,

    /// Resolve and reconcile, but do not write to the repository
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();
    info!("Starting bhlink-en {}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(args.config.as_deref())?;
    let category = args
        .category
        .or_else(|| config.category.clone())
        .context("No category given (--category or config `category`)")?;

    let bhl_api_key = config::resolve_bhl_api_key(&config)?;
    let flickr_api_key = config::resolve_flickr_api_key(&config)?;

    let endpoints = &config.endpoints;
    let credentials = repository_credentials();
    if credentials.is_none() && !args.dry_run {
        warn!(
            "No repository credentials (BHLINK_COMMONS_USER / BHLINK_COMMONS_PASSWORD); \
             writes will fail. Consider --dry-run."
        );
    }

    let store = Arc::new(CommonsClient::new(
        &endpoints.commons_api,
        credentials,
        &endpoints.user_agent,
    )?);
    let bhl = Arc::new(BhlClient::new(
        &endpoints.bhl_api,
        &bhl_api_key,
        &endpoints.user_agent,
    )?);
    let wikidata = Arc::new(WikidataClient::new(
        &endpoints.sparql,
        &endpoints.user_agent,
    )?);
    // Some categories are catalogued as publications themselves;
    // their entity backs a publication fallback for pages whose
    // bibliographic hierarchy yields none.
    let category_publication = match wikidata.find_publication_from_category(&category).await {
        Ok(Some(record)) => {
            info!(
                entity = %record.entity,
                label = record.label.as_deref().unwrap_or(""),
                "Category resolves to a catalogued publication"
            );
            Some(record.entity)
        }
        Ok(None) => None,
        Err(e) => {
            warn!(error = %e, "Category publication lookup failed, continuing without");
            None
        }
    };

    let tags: Option<Arc<dyn TagSource>> = flickr_api_key
        .map(|key| {
            FlickrClient::new(&endpoints.flickr_api, Some(key), &endpoints.user_agent)
                .map(|client| Arc::new(client) as Arc<dyn TagSource>)
        })
        .transpose()?;

    let photo_map = Arc::new(match &config.resolver.photo_map_path {
        Some(path) => PhotoMap::from_path(path)?,
        None => PhotoMap::empty(),
    });

    let arbiter: Arc<dyn LinkArbiter> = if config.batch.interactive {
        Arc::new(ConsoleArbiter)
    } else {
        Arc::new(OverrideArbiter::new(config.batch.title_overrides.clone()))
    };

    let cache = Arc::new(RecordCache::new());
    let aggregator = Arc::new(MetadataAggregator::new(bhl, cache, arbiter));
    let resolver = IdentifierResolver::new(
        aggregator.clone(),
        photo_map.clone(),
        config.resolver.clone(),
    );
    let taxa = TaxonNameResolver::new(wikidata);
    let synthesizer = ClaimSynthesizer::new(
        config.synthesis.clone(),
        config.creators.clone(),
        config.institutions.clone(),
        &endpoints.bhl_base_url,
    );

    let pipeline = Pipeline::new(
        PipelineConfig {
            category,
            checkpoint_path: config.batch.checkpoint_path.clone(),
            checkpoint_every: config.batch.checkpoint_every,
            test_limit: config.batch.test_limit,
            dry_run: args.dry_run,
            category_publication,
        },
        store,
        resolver,
        aggregator,
        taxa,
        synthesizer,
        photo_map,
        tags,
        warn_if_partial(config.creators.clone()),
    );

    pipeline.run().await
}

/// Bot-password credentials from the environment; both halves required.
fn repository_credentials() -> Option<Credentials> {
    let username = std::env::var("BHLINK_COMMONS_USER").ok()?;
    let password = std::env::var("BHLINK_COMMONS_PASSWORD").ok()?;
    Some(Credentials { username, password })
}

/// Creator-role claims need the reference URL for audit; warn when
/// entities are configured without one.
fn warn_if_partial(creators: CreatorConfig) -> CreatorConfig {
    if !creators.is_empty() && creators.reference_url.is_none() {
        warn!("Creator entities configured without creators.reference_url");
    }
    creators
}
