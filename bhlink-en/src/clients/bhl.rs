//! BHL bibliographic API client
//!
//! Queries the three-tier metadata hierarchy (page within item within
//! title) plus the archive-item page listing used by the archive-offset
//! resolution strategy.
//!
//! A non-ok payload or an HTTP error status yields `Ok(None)`; missing
//! metadata is an expected, common condition, not a fault. Transport
//! failures surface as typed errors so the caller can decide how far to
//! degrade.

use super::RateLimiter;
use crate::aggregator::BhlApi;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const RATE_LIMIT_MS: u64 = 350; // stay well under the BHL request ceiling

/// BHL client errors
#[derive(Debug, Error)]
pub enum BhlError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

/// One record from `GetPageMetadata`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BhlPage {
    #[serde(rename = "PageID")]
    pub page_id: Option<u64>,
    #[serde(rename = "ItemID")]
    pub item_id: Option<u64>,
    #[serde(rename = "Volume")]
    pub volume: Option<String>,
    #[serde(rename = "PageTypes")]
    pub page_types: Vec<BhlPageType>,
    #[serde(rename = "Names")]
    pub names: Vec<BhlName>,
    #[serde(rename = "PageNumbers")]
    pub page_numbers: Vec<BhlPageNumber>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BhlPageType {
    #[serde(rename = "PageTypeName")]
    pub page_type_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BhlName {
    #[serde(rename = "NameFound")]
    pub name_found: Option<String>,
    #[serde(rename = "NameCanonical")]
    pub name_canonical: Option<String>,
}

impl BhlName {
    /// Canonical form when recognized, otherwise the raw OCR find
    pub fn best(&self) -> Option<&str> {
        self.name_canonical
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.name_found.as_deref())
            .filter(|n| !n.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BhlPageNumber {
    #[serde(rename = "Prefix")]
    pub prefix: Option<String>,
    #[serde(rename = "Number")]
    pub number: Option<String>,
}

/// One record from `GetItemMetadata`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BhlItem {
    #[serde(rename = "ItemID")]
    pub item_id: Option<u64>,
    #[serde(rename = "TitleID")]
    pub title_id: Option<u64>,
    #[serde(rename = "HoldingInstitution")]
    pub holding_institution: Option<String>,
    #[serde(rename = "Sponsor")]
    pub sponsor: Option<String>,
    #[serde(rename = "CopyrightStatus")]
    pub copyright_status: Option<String>,
    #[serde(rename = "Volume")]
    pub volume: Option<String>,
    /// Ordered page list; populated only when requested (`pages=t`)
    #[serde(rename = "Pages")]
    pub pages: Vec<BhlPage>,
}

/// One record from `GetTitleMetadata`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BhlTitle {
    #[serde(rename = "TitleID")]
    pub title_id: Option<u64>,
    #[serde(rename = "FullTitle")]
    pub full_title: Option<String>,
    #[serde(rename = "PublicationDate")]
    pub publication_date: Option<String>,
    #[serde(rename = "Identifiers")]
    pub identifiers: Vec<BhlIdentifier>,
}

/// External identifier attached to a title
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BhlIdentifier {
    #[serde(rename = "IdentifierName")]
    pub identifier_name: Option<String>,
    #[serde(rename = "IdentifierValue")]
    pub identifier_value: Option<String>,
}

impl BhlTitle {
    /// Values of identifiers whose name matches the knowledge base
    pub fn knowledge_base_ids(&self) -> Vec<String> {
        self.identifiers
            .iter()
            .filter(|id| id.identifier_name.as_deref() == Some("Wikidata"))
            .filter_map(|id| id.identifier_value.clone())
            .collect()
    }
}

/// Envelope common to every api3 operation
#[derive(Debug, Deserialize)]
struct BhlEnvelope<T> {
    #[serde(rename = "Status")]
    status: Option<String>,
    #[serde(rename = "ErrorMessage")]
    error_message: Option<String>,
    #[serde(rename = "Result")]
    result: Option<Vec<T>>,
}

/// BHL api3 client
pub struct BhlClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    rate_limiter: Arc<RateLimiter>,
}

impl BhlClient {
    pub fn new(endpoint: &str, api_key: &str, user_agent: &str) -> Result<Self, BhlError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| BhlError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            rate_limiter: Arc::new(RateLimiter::new(RATE_LIMIT_MS)),
        })
    }

    /// Run one api3 operation and unwrap its envelope.
    ///
    /// Returns the first result record; `Ok(None)` when the service
    /// reports a non-ok status, an error HTTP code, or an empty result.
    async fn query<T: serde::de::DeserializeOwned>(
        &self,
        op: &str,
        params: &[(&str, &str)],
    ) -> Result<Option<T>, BhlError> {
        self.rate_limiter.wait().await;

        let mut query: Vec<(&str, &str)> = vec![
            ("op", op),
            ("format", "json"),
            ("apikey", self.api_key.as_str()),
        ];
        query.extend_from_slice(params);

        debug!(op = %op, "Querying BHL api3");

        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .map_err(|e| BhlError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(op = %op, status = status.as_u16(), "BHL api3 returned error status");
            return Ok(None);
        }

        let envelope: BhlEnvelope<T> = response
            .json()
            .await
            .map_err(|e| BhlError::Parse(e.to_string()))?;

        if envelope.status.as_deref() != Some("ok") {
            warn!(
                op = %op,
                message = envelope.error_message.as_deref().unwrap_or("unknown"),
                "BHL api3 returned non-ok status"
            );
            return Ok(None);
        }

        Ok(envelope.result.and_then(|mut records| {
            if records.is_empty() {
                None
            } else {
                Some(records.remove(0))
            }
        }))
    }
}

#[async_trait::async_trait]
impl BhlApi for BhlClient {
    async fn get_page(&self, page_id: &str) -> Result<Option<BhlPage>, BhlError> {
        self.query(
            "GetPageMetadata",
            &[("pageid", page_id), ("ocr", "f"), ("names", "t")],
        )
        .await
    }

    async fn get_item(&self, item_id: &str) -> Result<Option<BhlItem>, BhlError> {
        self.query("GetItemMetadata", &[("id", item_id), ("idtype", "bhl")])
            .await
    }

    async fn get_title(&self, title_id: &str) -> Result<Option<BhlTitle>, BhlError> {
        self.query("GetTitleMetadata", &[("id", title_id)]).await
    }

    async fn get_item_by_archive_id(&self, archive_id: &str) -> Result<Option<BhlItem>, BhlError> {
        self.query(
            "GetItemMetadata",
            &[("id", archive_id), ("idtype", "ia"), ("pages", "t")],
        )
        .await
    }
}

// ============================================================================
// Tests
// ============================================================================
