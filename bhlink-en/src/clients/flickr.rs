//! Photo-sharing tag client
//!
//! Fetches the raw tag list for a photo. Tags feed depicted-taxon
//! candidates (`taxonomy:binomial=` tags) and are recorded verbatim in
//! the checkpoint row. An absent API key disables tag retrieval rather
//! than failing the run.

use crate::clients::RateLimiter;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

const RATE_LIMIT_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum FlickrError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse tag response: {0}")]
    Parse(String),
}

#[derive(Debug, Deserialize)]
struct TagEnvelope {
    stat: String,
    message: Option<String>,
    photo: Option<TagPhoto>,
}

#[derive(Debug, Deserialize)]
struct TagPhoto {
    tags: TagList,
}

#[derive(Debug, Deserialize)]
struct TagList {
    tag: Vec<Tag>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    raw: String,
}

pub struct FlickrClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    rate_limiter: RateLimiter,
}

impl FlickrClient {
    pub fn new(
        endpoint: &str,
        api_key: Option<String>,
        user_agent: &str,
    ) -> Result<Self, FlickrError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| FlickrError::Network(e.to_string()))?;
        Ok(Self {
            http_client,
            endpoint: endpoint.to_string(),
            api_key,
            rate_limiter: RateLimiter::new(RATE_LIMIT_MS),
        })
    }

    /// Raw tags for a photo id. Service errors degrade to an empty
    /// list; only transport failures surface as errors.
    pub async fn get_photo_tags(&self, photo_id: &str) -> Result<Vec<String>, FlickrError> {
        let Some(api_key) = &self.api_key else {
            debug!("No photo-sharing API key configured, skipping tag fetch");
            return Ok(Vec::new());
        };

        self.rate_limiter.wait().await;

        let response = self
            .http_client
            .get(&self.endpoint)
            .query(&[
                ("method", "flickr.tags.getListPhoto"),
                ("api_key", api_key),
                ("photo_id", photo_id),
                ("format", "json"),
                ("nojsoncallback", "1"),
            ])
            .send()
            .await
            .map_err(|e| FlickrError::Network(e.to_string()))?;

        if !response.status().is_success() {
            warn!(photo_id, status = %response.status(), "Tag fetch returned non-success");
            return Ok(Vec::new());
        }

        let envelope: TagEnvelope = response
            .json()
            .await
            .map_err(|e| FlickrError::Parse(e.to_string()))?;

        if envelope.stat != "ok" {
            warn!(
                photo_id,
                message = envelope.message.as_deref().unwrap_or("unknown"),
                "Tag service reported an error"
            );
            return Ok(Vec::new());
        }

        Ok(envelope
            .photo
            .map(|p| p.tags.tag.into_iter().map(|t| t.raw).collect())
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl crate::workflow::TagSource for FlickrClient {
    async fn photo_tags(&self, photo_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self.get_photo_tags(photo_id).await?)
    }
}

/// Extract binomial names from `taxonomy:binomial=` tags.
pub fn binomial_names(tags: &[String]) -> Vec<String> {
    tags.iter()
        .filter_map(|tag| tag.split_once("taxonomy:binomial=").map(|(_, name)| name))
        .map(|name| name.trim().replace('\'', ""))
        .filter(|name| !name.is_empty())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
