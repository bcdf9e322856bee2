//! Knowledge-base SPARQL client
//!
//! Two query surfaces: scientific-name matching (the production
//! [`TaxonMatcher`]) and the category-to-publication fallback used when
//! a title record carries no usable knowledge-base link.

use crate::clients::RateLimiter;
use crate::taxon::{TaxonMatch, TaxonMatcher};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

/// Minimum interval between SPARQL requests (endpoint etiquette)
const RATE_LIMIT_MS: u64 = 500;

#[derive(Debug, Error)]
pub enum WikidataError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse SPARQL response: {0}")]
    Parse(String),
}

// ============================================================================
// SPARQL response envelope
// ============================================================================

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    bindings: Vec<HashMap<String, SparqlBinding>>,
}

#[derive(Debug, Deserialize)]
struct SparqlBinding {
    value: String,
}

/// Publication entity resolved from a category name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicationRecord {
    /// Knowledge-base entity id (e.g. "Q51431973")
    pub entity: String,
    pub label: Option<String>,
    /// Publication date, date portion only
    pub publication_date: Option<String>,
    /// Bibliography id recorded on the entity, when present
    pub bibliography_id: Option<String>,
}

// ============================================================================
// Client
// ============================================================================

pub struct WikidataClient {
    http_client: reqwest::Client,
    endpoint: String,
    rate_limiter: RateLimiter,
}

impl WikidataClient {
    pub fn new(endpoint: &str, user_agent: &str) -> Result<Self, WikidataError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| WikidataError::Network(e.to_string()))?;
        Ok(Self {
            http_client,
            endpoint: endpoint.to_string(),
            rate_limiter: RateLimiter::new(RATE_LIMIT_MS),
        })
    }

    async fn query(
        &self,
        sparql: &str,
    ) -> Result<Vec<HashMap<String, SparqlBinding>>, WikidataError> {
        self.rate_limiter.wait().await;

        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[("query", sparql), ("format", "json")])
            .send()
            .await
            .map_err(|e| WikidataError::Network(e.to_string()))?;

        if !response.status().is_success() {
            warn!(status = %response.status(), "SPARQL endpoint returned non-success");
            return Ok(Vec::new());
        }

        let body: SparqlResponse = response
            .json()
            .await
            .map_err(|e| WikidataError::Parse(e.to_string()))?;
        Ok(body.results.bindings)
    }

    /// Resolve a category name to its publication entity via the
    /// category link or bibliography/archive-item id recorded on it.
    /// First binding wins; no binding is a valid empty result.
    pub async fn find_publication_from_category(
        &self,
        category_name: &str,
    ) -> Result<Option<PublicationRecord>, WikidataError> {
        let sparql = format!(
            r#"SELECT ?item ?itemLabel ?publicationDate ?bib_id WHERE {{
  ?item wdt:P373 "{}" .
  {{ ?item wdt:P4327 ?bib_id . }}
  UNION
  {{ ?item wdt:P11959 ?archive_item_id . }}
  OPTIONAL {{ ?item wdt:P577 ?publicationDate . }}
  SERVICE wikibase:label {{ bd:serviceParam wikibase:language "en". }}
}}"#,
            escape_literal(category_name)
        );

        let bindings = self.query(&sparql).await?;
        let Some(binding) = bindings.first() else {
            debug!(category = category_name, "No publication entity for category");
            return Ok(None);
        };

        let Some(entity) = binding.get("item").map(|b| entity_id(&b.value)) else {
            return Ok(None);
        };
        Ok(Some(PublicationRecord {
            entity,
            label: binding.get("itemLabel").map(|b| b.value.clone()),
            publication_date: binding
                .get("publicationDate")
                .map(|b| b.value.split('T').next().unwrap_or(&b.value).to_string()),
            bibliography_id: binding.get("bib_id").map(|b| b.value.clone()),
        }))
    }

    /// Exact scientific-name match. Accepted only when a single entity
    /// carries the name.
    async fn match_direct(&self, name: &str) -> Result<Option<String>, WikidataError> {
        let sparql = format!(
            r#"SELECT ?item WHERE {{ ?item wdt:P225 "{}" . }}"#,
            escape_literal(name)
        );
        let bindings = self.query(&sparql).await?;
        if bindings.len() != 1 {
            if bindings.len() > 1 {
                debug!(name, candidates = bindings.len(), "Taxon name is not unique");
            }
            return Ok(None);
        }
        Ok(bindings[0].get("item").map(|b| entity_id(&b.value)))
    }

    /// Synonym match: the name appears on a taxon listed as a synonym
    /// of an accepted taxon. Returns (accepted entity, accepted name).
    async fn match_synonym(&self, name: &str) -> Result<Option<(String, String)>, WikidataError> {
        let sparql = format!(
            r#"SELECT ?item ?acceptedName WHERE {{
  ?synonym wdt:P225 "{}" .
  ?item wdt:P1420 ?synonym .
  ?item wdt:P225 ?acceptedName .
}}"#,
            escape_literal(name)
        );
        let bindings = self.query(&sparql).await?;
        if bindings.len() != 1 {
            return Ok(None);
        }
        let entity = bindings[0].get("item").map(|b| entity_id(&b.value));
        let accepted = bindings[0].get("acceptedName").map(|b| b.value.clone());
        Ok(entity.zip(accepted))
    }
}

#[async_trait]
impl TaxonMatcher for WikidataClient {
    async fn match_name(&self, name: &str) -> anyhow::Result<Option<TaxonMatch>> {
        if let Some(entity) = self.match_direct(name).await? {
            return Ok(Some(TaxonMatch {
                entity,
                matched_name: name.to_string(),
                accepted_name: None,
            }));
        }
        if let Some((entity, accepted)) = self.match_synonym(name).await? {
            return Ok(Some(TaxonMatch {
                entity,
                matched_name: name.to_string(),
                accepted_name: Some(accepted),
            }));
        }
        Ok(None)
    }
}

/// Strip the entity URI prefix from a SPARQL item binding.
fn entity_id(uri: &str) -> String {
    uri.rsplit('/').next().unwrap_or(uri).to_string()
}

/// SPARQL string-literal escaping for interpolated names.
fn escape_literal(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

// ============================================================================
// Tests
// ============================================================================
