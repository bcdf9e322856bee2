//! Configuration loading for BHLink
//!
//! A single immutable [`TomlConfig`] is resolved once at startup and passed
//! through the pipeline; nothing mutates configuration in place.
//!
//! Config file resolution priority:
//! 1. Explicit path (command-line argument)
//! 2. `BHLINK_CONFIG` environment variable
//! 3. Platform config directory (`~/.config/bhlink/bhlink.toml`)
//! 4. Compiled defaults (no file)
//!
//! API keys resolve ENV → TOML, warning when both are set.

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Media-repository category naming the candidate documents
    pub category: Option<String>,
    #[serde(default)]
    pub endpoints: Endpoints,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub creators: CreatorConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub keys: KeyConfig,
    /// Curated institution-name -> knowledge-base entity id table.
    /// The bibliographic API reports holding institutions and sponsors
    /// as free-text names; only mapped names become claims.
    #[serde(default)]
    pub institutions: HashMap<String, String>,
}

/// External service endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    /// Wikimedia Commons API endpoint (markup retrieval + write sink)
    pub commons_api: String,
    /// Wikidata SPARQL endpoint (graph queries, name matching)
    pub sparql: String,
    /// BHL bibliographic API endpoint
    pub bhl_api: String,
    /// Flickr REST endpoint (photo tag retrieval)
    pub flickr_api: String,
    /// BHL public base URL, used for locator references
    pub bhl_base_url: String,
    /// User-Agent sent with every request
    pub user_agent: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            commons_api: "https://commons.wikimedia.org/w/api.php".to_string(),
            sparql: "https://query.wikidata.org/sparql".to_string(),
            bhl_api: "https://www.biodiversitylibrary.org/api3".to_string(),
            flickr_api: "https://www.flickr.com/services/rest/".to_string(),
            bhl_base_url: "https://www.biodiversitylibrary.org".to_string(),
            user_agent: "BHLink/0.1.0 (https://github.com/bhlink/bhlink)".to_string(),
        }
    }
}

/// Identifier-resolution cascade settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Enable the archive-offset inference strategy
    pub infer_from_archive: bool,
    /// Signed correction between archive page numbering and BHL page order.
    /// `target_order = archive_page_number - archive_offset`
    pub archive_offset: i64,
    /// Enable the reverse photo-id mapping strategy
    pub infer_from_photo_id: bool,
    /// Path to the JSON BHL-page-id -> Flickr-photo-id table
    pub photo_map_path: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            infer_from_archive: false,
            archive_offset: 0,
            infer_from_photo_id: false,
            photo_map_path: None,
        }
    }
}

/// Creator-role entities applied to illustration pages
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreatorConfig {
    pub illustrator: Option<String>,
    pub painter: Option<String>,
    pub engraver: Option<String>,
    pub lithographer: Option<String>,
    /// Reference URL attached to creator-role statements
    pub reference_url: Option<String>,
}

impl CreatorConfig {
    /// True when no creator entity is configured at all
    pub fn is_empty(&self) -> bool {
        self.illustrator.is_none()
            && self.painter.is_none()
            && self.engraver.is_none()
            && self.lithographer.is_none()
    }
}

/// Claim-synthesis business rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Emit an unknown-value sponsor statement when the sponsor field is empty
    pub add_missing_sponsor: bool,
    /// Suppress publication-link synthesis entirely
    pub skip_published_in: bool,
    /// Suppress inception-date synthesis entirely
    pub skip_dates: bool,
    /// Suppress creator-role synthesis entirely
    pub skip_creators: bool,
    /// Illustration work-type is only derived for publications strictly
    /// before this year (avoids misclassifying photographs)
    pub illustration_year_cutoff: u32,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            add_missing_sponsor: false,
            skip_published_in: false,
            skip_dates: false,
            skip_creators: false,
            illustration_year_cutoff: 1880,
        }
    }
}

/// Batch iteration and checkpointing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Checkpoint row file (tab-separated, fixed named columns)
    pub checkpoint_path: PathBuf,
    /// Flush the checkpoint every N processed rows
    pub checkpoint_every: usize,
    /// Block for operator input on ambiguous publication links
    pub interactive: bool,
    /// Stop after this many documents (test runs)
    pub test_limit: Option<usize>,
    /// Pre-seeded title-id -> publication-entity overrides for batch mode
    pub title_overrides: HashMap<String, String>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: PathBuf::from("bhlink_rows.tsv"),
            checkpoint_every: 25,
            interactive: false,
            test_limit: None,
            title_overrides: HashMap::new(),
        }
    }
}

/// API keys (TOML tier; ENV takes priority, see resolvers below)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub bhl_api_key: Option<String>,
    pub flickr_api_key: Option<String>,
}

/// Default configuration file path for the platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("bhlink").join("bhlink.toml"))
}

/// Load configuration following the resolution priority above.
///
///// A missing file is not an error: compiled defaults apply. A file that
/// exists but fails to parse is a hard configuration error.
pub fn load_config(cli_path: Option<&Path>) -> Result<TomlConfig> {
    let candidate = cli_path
        .map(PathBuf::from)
        .or_else(|| std::env::var("BHLINK_CONFIG").ok().map(PathBuf::from))
        .or_else(default_config_path);

    let config = match candidate {
        Some(path) if path.exists() => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
            let config: TomlConfig = toml::from_str(&content)
                .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
            info!("Configuration loaded from {}", path.display());
            config
        }
        Some(path) if cli_path.is_some() => {
            // An explicitly named file must exist
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        _ => {
            info!("No config file found, using defaults");
            TomlConfig::default()
        }
    };

    validate(&config)?;
    Ok(config)
}

/// Validate cross-field constraints
fn validate(config: &TomlConfig) -> Result<()> {
    if config.batch.checkpoint_every == 0 {
        return Err(Error::Config(
            "batch.checkpoint_every must be at least 1".to_string(),
        ));
    }
    if config.resolver.infer_from_photo_id && config.resolver.photo_map_path.is_none() {
        return Err(Error::Config(
            "resolver.infer_from_photo_id requires resolver.photo_map_path".to_string(),
        ));
    }
    Ok(())
}

/// Resolve the BHL API key from ENV -> TOML.
///
/// The bibliographic API rejects unkeyed requests, so absence is an error.
pub fn resolve_bhl_api_key(config: &TomlConfig) -> Result<String> {
    resolve_key(
        "BHLINK_BHL_API_KEY",
        config.keys.bhl_api_key.as_deref(),
        "BHL",
    )?
    .ok_or_else(|| {
        Error::Config(
            "BHL API key not configured. Set BHLINK_BHL_API_KEY or \
             keys.bhl_api_key in bhlink.toml. Obtain a key at: \
             https://www.biodiversitylibrary.org/getapikey.aspx"
                .to_string(),
        )
    })
}

/// Resolve the Flickr API key from ENV -> TOML.
///
///// Optional: without it, photo-tag enrichment is skipped.
pub fn resolve_flickr_api_key(config: &TomlConfig) -> Result<Option<String>> {
    resolve_key(
        "BHLINK_FLICKR_API_KEY",
        config.keys.flickr_api_key.as_deref(),
        "Flickr",
    )
}

fn resolve_key(env_var: &str, toml_key: Option<&str>, label: &str) -> Result<Option<String>> {
    let env_key = std::env::var(env_var).ok().filter(|k| is_valid_key(k));
    let toml_key = toml_key.filter(|k| is_valid_key(k)).map(String::from);

    if env_key.is_some() && toml_key.is_some() {
        warn!(
            "{} API key found in both environment and TOML. Using environment (highest priority).",
            label
        );
    }

    match env_key.or(toml_key) {
        Some(key) => {
            info!("{} API key resolved", label);
            Ok(Some(key))
        }
        None => Ok(None),
    }
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
