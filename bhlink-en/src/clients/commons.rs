//! Media repository client (MediaWiki API)
//!
//! Implements [`TargetStore`]: category listing, markup retrieval,
//! structured-claim reads, and structured-claim writes through the
//! wikibase edit action. Writes require bot-password credentials; the
//! login session and CSRF token are established lazily on first write.

use crate::claims::{ExistingClaim, Rank, Statement, StatementValue, WriteBatch};
use crate::clients::RateLimiter;
use crate::types::SourceDocument;
use crate::workflow::TargetStore;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

const RATE_LIMIT_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum CommonsError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to parse API response: {0}")]
    Parse(String),

    #[error("Login failed: {0}")]
    Auth(String),

    #[error("Edit rejected: {0}")]
    Edit(String),
}

/// Bot-password credentials for the write path.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub struct CommonsClient {
    http_client: reqwest::Client,
    endpoint: String,
    credentials: Option<Credentials>,
    rate_limiter: RateLimiter,
    // MediaInfo ids are derived from page ids; memoized per file name
    page_ids: RwLock<HashMap<String, u64>>,
    csrf_token: Mutex<Option<String>>,
}

impl CommonsClient {
    pub fn new(
        endpoint: &str,
        credentials: Option<Credentials>,
        user_agent: &str,
    ) -> Result<Self, CommonsError> {
        let http_client = reqwest::Client::builder()
            .user_agent(user_agent)
            .cookie_store(true)
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| CommonsError::Network(e.to_string()))?;
        Ok(Self {
            http_client,
            endpoint: endpoint.to_string(),
            credentials,
            rate_limiter: RateLimiter::new(RATE_LIMIT_MS),
            page_ids: RwLock::new(HashMap::new()),
            csrf_token: Mutex::new(None),
        })
    }

    async fn get_json(&self, params: &[(&str, &str)]) -> Result<Value, CommonsError> {
        self.rate_limiter.wait().await;
        let response = self
            .http_client
            .get(&self.endpoint)
            .query(params)
            .send()
            .await
            .map_err(|e| CommonsError::Network(e.to_string()))?;
        response
            .json()
            .await
            .map_err(|e| CommonsError::Parse(e.to_string()))
    }

    /// Page id for a file, memoized. `None` for missing files.
    async fn page_id(&self, file_name: &str) -> Result<Option<u64>, CommonsError> {
        if let Some(id) = self.page_ids.read().await.get(file_name) {
            return Ok(Some(*id));
        }
        let title = format!("File:{file_name}");
        let data = self
            .get_json(&[
                ("action", "query"),
                ("titles", &title),
                ("formatversion", "2"),
                ("format", "json"),
            ])
            .await?;
        let page = data["query"]["pages"].get(0).cloned().unwrap_or(Value::Null);
        if page["missing"].as_bool().unwrap_or(false) {
            return Ok(None);
        }
        let Some(id) = page["pageid"].as_u64() else {
            return Ok(None);
        };
        self.page_ids
            .write()
            .await
            .insert(file_name.to_string(), id);
        Ok(Some(id))
    }

    /// Lazily log in and fetch a CSRF token for the edit action.
    async fn edit_token(&self) -> Result<String, CommonsError> {
        let mut token_slot = self.csrf_token.lock().await;
        if let Some(token) = token_slot.as_ref() {
            return Ok(token.clone());
        }

        let credentials = self
            .credentials
            .as_ref()
            .ok_or_else(|| CommonsError::Auth("no credentials configured".to_string()))?;

        let data = self
            .get_json(&[
                ("action", "query"),
                ("meta", "tokens"),
                ("type", "login"),
                ("format", "json"),
            ])
            .await?;
        let login_token = data["query"]["tokens"]["logintoken"]
            .as_str()
            .ok_or_else(|| CommonsError::Auth("no login token in response".to_string()))?
            .to_string();

        self.rate_limiter.wait().await;
        let response: Value = self
            .http_client
            .post(&self.endpoint)
            .form(&[
                ("action", "login"),
                ("lgname", credentials.username.as_str()),
                ("lgpassword", credentials.password.as_str()),
                ("lgtoken", login_token.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| CommonsError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|e| CommonsError::Parse(e.to_string()))?;
        let result = response["login"]["result"].as_str().unwrap_or("Unknown");
        if result != "Success" {
            return Err(CommonsError::Auth(format!("login result {result}")));
        }
        info!(user = %credentials.username, "Logged in to media repository");

        let data = self
            .get_json(&[
                ("action", "query"),
                ("meta", "tokens"),
                ("format", "json"),
            ])
            .await?;
        let csrf = data["query"]["tokens"]["csrftoken"]
            .as_str()
            .ok_or_else(|| CommonsError::Auth("no csrf token in response".to_string()))?
            .to_string();
        *token_slot = Some(csrf.clone());
        Ok(csrf)
    }
}

#[async_trait]
impl TargetStore for CommonsClient {
    async fn list_documents(&self, category: &str) -> anyhow::Result<Vec<String>> {
        let title = format!("Category:{category}");
        let mut files = Vec::new();
        let mut continue_from: Option<String> = None;

        loop {
            let mut params = vec![
                ("action", "query"),
                ("list", "categorymembers"),
                ("cmtitle", title.as_str()),
                ("cmtype", "file"),
                ("cmlimit", "max"),
                ("format", "json"),
            ];
            if let Some(cmcontinue) = &continue_from {
                params.push(("cmcontinue", cmcontinue.as_str()));
            }
            let data = self.get_json(&params).await?;

            if let Some(members) = data["query"]["categorymembers"].as_array() {
                files.extend(members.iter().filter_map(|m| {
                    m["title"]
                        .as_str()
                        .map(|t| t.trim_start_matches("File:").to_string())
                }));
            }

            match data["continue"]["cmcontinue"].as_str() {
                Some(next) => continue_from = Some(next.to_string()),
                None => break,
            }
        }

        debug!(category, count = files.len(), "Listed category members");
        Ok(files)
    }

    async fn fetch_document(&self, file_name: &str) -> anyhow::Result<Option<SourceDocument>> {
        let title = format!("File:{file_name}");
        let data = self
            .get_json(&[
                ("action", "query"),
                ("prop", "revisions"),
                ("titles", &title),
                ("rvslots", "*"),
                ("rvprop", "content"),
                ("formatversion", "2"),
                ("format", "json"),
            ])
            .await?;

        let page = data["query"]["pages"].get(0).cloned().unwrap_or(Value::Null);
        if page.is_null() || page["missing"].as_bool().unwrap_or(false) {
            return Ok(None);
        }
        let markup = page["revisions"][0]["slots"]["main"]["content"]
            .as_str()
            .unwrap_or_default();
        Ok(Some(SourceDocument::new(file_name, markup)))
    }

    async fn existing_claims(&self, file_name: &str) -> anyhow::Result<Vec<ExistingClaim>> {
        let Some(page_id) = self.page_id(file_name).await? else {
            return Ok(Vec::new());
        };
        let media_id = format!("M{page_id}");
        let data = self
            .get_json(&[
                ("action", "wbgetentities"),
                ("ids", &media_id),
                ("format", "json"),
            ])
            .await?;

        let statements = &data["entities"][&media_id]["statements"];
        Ok(parse_statements(statements))
    }

    async fn apply(
        &self,
        file_name: &str,
        batch: &WriteBatch,
        summary: &str,
    ) -> anyhow::Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let Some(page_id) = self.page_id(file_name).await? else {
            anyhow::bail!("no media record for {file_name}");
        };
        let media_id = format!("M{page_id}");
        let token = self.edit_token().await?;

        let mut claims: Vec<Value> = batch
            .retractions
            .iter()
            .filter_map(|claim| {
                if claim.id.is_none() {
                    warn!(file = file_name, property = %claim.property, "Retraction without claim id, skipping");
                }
                claim.id.as_ref().map(|id| json!({"id": id, "remove": ""}))
            })
            .collect();
        claims.extend(batch.additions.iter().map(statement_to_claim));
        let payload = json!({ "claims": claims }).to_string();

        self.rate_limiter.wait().await;
        let response: Value = self
            .http_client
            .post(&self.endpoint)
            .form(&[
                ("action", "wbeditentity"),
                ("id", media_id.as_str()),
                ("data", payload.as_str()),
                ("summary", summary),
                ("token", token.as_str()),
                ("format", "json"),
            ])
            .send()
            .await
            .map_err(|e| CommonsError::Network(e.to_string()))?
            .json()
            .await
            .map_err(|e| CommonsError::Parse(e.to_string()))?;

        if response["success"].as_i64() != Some(1) {
            let message = response["error"]["info"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            return Err(CommonsError::Edit(message).into());
        }
        info!(
            file = file_name,
            additions = batch.additions.len(),
            retractions = batch.retractions.len(),
            "Wrote structured data"
        );
        Ok(())
    }
}

// ============================================================================
// Claim JSON mapping
// ============================================================================

fn snak(property: &str, value: &StatementValue) -> Value {
    match value {
        StatementValue::Entity(id) => json!({
            "snaktype": "value",
            "property": property,
            "datavalue": {
                "value": {"entity-type": "item", "id": id},
                "type": "wikibase-entityid"
            }
        }),
        StatementValue::ExternalId(s) | StatementValue::Url(s) => json!({
            "snaktype": "value",
            "property": property,
            "datavalue": {"value": s, "type": "string"}
        }),
        StatementValue::Year(year) => json!({
            "snaktype": "value",
            "property": property,
            "datavalue": {
                "value": {
                    "time": format!("+{year}-00-00T00:00:00Z"),
                    "timezone": 0,
                    "before": 0,
                    "after": 0,
                    "precision": 9,
                    "calendarmodel": "http://www.wikidata.org/entity/Q1985727"
                },
                "type": "time"
            }
        }),
        StatementValue::SomeValue => json!({
            "snaktype": "somevalue",
            "property": property
        }),
    }
}

/// Map a statement into the wikibase claim JSON accepted by the edit
/// action.
fn statement_to_claim(statement: &Statement) -> Value {
    let mut claim = json!({
        "mainsnak": snak(&statement.property, &statement.value),
        "type": "statement",
        "rank": match statement.rank {
            Rank::Preferred => "preferred",
            Rank::Normal => "normal",
        }
    });

    if !statement.qualifiers.is_empty() {
        let mut qualifiers = serde_json::Map::new();
        let mut order = Vec::new();
        for qualifier in &statement.qualifiers {
            let entry = qualifiers
                .entry(qualifier.property.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(list) = entry.as_array_mut() {
                list.push(snak(
                    &qualifier.property,
                    &StatementValue::Entity(qualifier.value.clone()),
                ));
            }
            if !order.contains(&qualifier.property) {
                order.push(qualifier.property.clone());
            }
        }
        claim["qualifiers"] = Value::Object(qualifiers);
        claim["qualifiers-order"] = json!(order);
    }

    if !statement.references.is_empty() {
        let references: Vec<Value> = statement
            .references
            .iter()
            .map(|reference| {
                let mut snaks = serde_json::Map::new();
                let mut order = Vec::new();
                if let Some(heuristic) = &reference.heuristic {
                    snaks.insert(
                        crate::claims::P_BASED_ON_HEURISTIC.to_string(),
                        json!([snak(
                            crate::claims::P_BASED_ON_HEURISTIC,
                            &StatementValue::Entity(heuristic.entity().to_string()),
                        )]),
                    );
                    order.push(crate::claims::P_BASED_ON_HEURISTIC);
                }
                if let Some(url) = &reference.url {
                    snaks.insert(
                        crate::claims::P_REFERENCE_URL.to_string(),
                        json!([snak(
                            crate::claims::P_REFERENCE_URL,
                            &StatementValue::Url(url.clone()),
                        )]),
                    );
                    order.push(crate::claims::P_REFERENCE_URL);
                }
                json!({"snaks": Value::Object(snaks), "snaks-order": order})
            })
            .collect();
        claim["references"] = json!(references);
    }

    claim
}

/// Parse the statements map of a MediaInfo entity into existing claims.
/// Unrecognized value shapes are skipped, not errors.
fn parse_statements(statements: &Value) -> Vec<ExistingClaim> {
    let Some(map) = statements.as_object() else {
        return Vec::new();
    };
    let mut claims = Vec::new();
    for (property, group) in map {
        let Some(group) = group.as_array() else {
            continue;
        };
        for entry in group {
            let Some(value) = parse_snak_value(&entry["mainsnak"]) else {
                continue;
            };
            let mut claim = ExistingClaim::new(property, value);
            claim.id = entry["id"].as_str().map(str::to_string);
            claims.push(claim);
        }
    }
    claims
}

fn parse_snak_value(mainsnak: &Value) -> Option<StatementValue> {
    match mainsnak["snaktype"].as_str()? {
        "somevalue" => return Some(StatementValue::SomeValue),
        "value" => {}
        _ => return None,
    }
    let datavalue = &mainsnak["datavalue"];
    match datavalue["type"].as_str()? {
        "wikibase-entityid" => datavalue["value"]["id"]
            .as_str()
            .map(|id| StatementValue::Entity(id.to_string())),
        "time" => {
            let time = datavalue["value"]["time"].as_str()?;
            let year: String = time
                .trim_start_matches(['+', '-'])
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            (!year.is_empty()).then(|| StatementValue::Year(year))
        }
        "string" => {
            let s = datavalue["value"].as_str()?.to_string();
            match mainsnak["datatype"].as_str() {
                Some("url") => Some(StatementValue::Url(s)),
                _ => Some(StatementValue::ExternalId(s)),
            }
        }
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::{
        Provenance, P_APPLIES_TO_PART, P_DEPICTS, P_INCEPTION, Q_ANALOG_WORK,
    };

    #[test]
    fn test_entity_claim_json() {
        let statement = Statement::new(P_DEPICTS, StatementValue::Entity("Q1266979".to_string()))
            .with_qualifier(P_APPLIES_TO_PART, Q_ANALOG_WORK)
            .with_reference(Some(Provenance::OcrInferred), None);
        let claim = statement_to_claim(&statement);

        assert_eq!(claim["mainsnak"]["property"], P_DEPICTS);
        assert_eq!(
            claim["mainsnak"]["datavalue"]["value"]["id"],
            "Q1266979"
        );
        assert_eq!(claim["rank"], "normal");
        assert_eq!(
            claim["qualifiers"][P_APPLIES_TO_PART][0]["datavalue"]["value"]["id"],
            Q_ANALOG_WORK
        );
        assert_eq!(
            claim["references"][0]["snaks"]["P887"][0]["datavalue"]["value"]["id"],
            Provenance::OcrInferred.entity()
        );
    }

    #[test]
    fn test_year_claim_json() {
        let statement = Statement::new(P_INCEPTION, StatementValue::Year("1880".to_string()));
        let claim = statement_to_claim(&statement);
        let time = &claim["mainsnak"]["datavalue"]["value"];
        assert_eq!(time["time"], "+1880-00-00T00:00:00Z");
        assert_eq!(time["precision"], 9);
    }

    #[test]
    fn test_somevalue_claim_json() {
        let statement = Statement::new("P859", StatementValue::SomeValue);
        let claim = statement_to_claim(&statement);
        assert_eq!(claim["mainsnak"]["snaktype"], "somevalue");
        assert!(claim["mainsnak"]["datavalue"].is_null());
    }

    #[test]
    fn test_parse_statements_round() {
        let statements = serde_json::json!({
            "P687": [{
                "id": "M123$abc",
                "mainsnak": {
                    "snaktype": "value",
                    "property": "P687",
                    "datatype": "external-id",
                    "datavalue": {"value": "46007529", "type": "string"}
                }
            }],
            "P571": [{
                "id": "M123$def",
                "mainsnak": {
                    "snaktype": "value",
                    "property": "P571",
                    "datavalue": {
                        "value": {"time": "+1880-01-01T00:00:00Z", "precision": 9},
                        "type": "time"
                    }
                }
            }],
            "P859": [{
                "id": "M123$ghi",
                "mainsnak": {"snaktype": "somevalue", "property": "P859"}
            }]
        });
        let mut claims = parse_statements(&statements);
        claims.sort_by(|a, b| a.property.cmp(&b.property));

        assert_eq!(claims.len(), 3);
        assert_eq!(
            claims[0].value,
            StatementValue::Year("1880".to_string())
        );
        assert_eq!(
            claims[1].value,
            StatementValue::ExternalId("46007529".to_string())
        );
        assert_eq!(claims[1].id.as_deref(), Some("M123$abc"));
        assert_eq!(claims[2].value, StatementValue::SomeValue);
    }

    #[test]
    fn test_parse_statements_skips_unknown_shapes() {
        let statements = serde_json::json!({
            "P180": [{
                "mainsnak": {
                    "snaktype": "value",
                    "property": "P180",
                    "datavalue": {"value": {"amount": "+3"}, "type": "quantity"}
                }
            }]
        });
        assert!(parse_statements(&statements).is_empty());
        assert!(parse_statements(&Value::Null).is_empty());
    }
}
