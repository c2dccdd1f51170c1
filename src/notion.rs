//! Notion as the record store: the last-synced cursor comes out of a sorted
//! database query, and each scraped order becomes one new page.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::{self, Config};
use crate::error::SyncError;
use crate::extract::ExtractedRecord;

const NOTION_API: &str = "https://api.notion.com/v1";
const NOTION_VERSION: &str = "2022-06-28";

// Properties whose database spelling differs from the scraped field name.
const PROP_DEVICE_TYPE: &str = "Typ Urządzenia";
const PROP_SERIAL: &str = "Numer Seryjny (SN)";
const PROP_NOTES: &str = "Uwagi (obsługa)";
const PROP_DEFECT: &str = "Opis Usterki (Klient)";

// Stamped onto every new page regardless of what was scraped.
const PROP_STATUS: &str = "Status Zgłoszenia";
const PROP_MANAGER: &str = "Manager Zgłoszenia";
const PROP_PRIORITY: &str = "Priorytet";

/// The external store a scan syncs into.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Highest order id the store knows, or `None` when it holds nothing.
    async fn last_known_rma(&self) -> Result<Option<u32>, SyncError>;

    /// Create one record. Rejects a record without an RMA before anything
    /// goes over the wire.
    async fn persist(&self, record: &ExtractedRecord) -> Result<(), SyncError>;
}

pub struct NotionClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    database_id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<PageObject>,
}

#[derive(Debug, Deserialize)]
struct PageObject {
    properties: serde_json::Map<String, Value>,
}

impl NotionClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: NOTION_API.to_string(),
            token: config.notion_token.clone(),
            database_id: config.notion_database_id.clone(),
        }
    }

    #[cfg(test)]
    fn with_base(api_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.to_string(),
            token: "test-token".to_string(),
            database_id: "test-db".to_string(),
        }
    }
}

#[async_trait]
impl RecordStore for NotionClient {
    async fn last_known_rma(&self) -> Result<Option<u32>, SyncError> {
        let url = format!("{}/databases/{}/query", self.api_base, self.database_id);
        let body = json!({
            "sorts": [{ "property": config::FIELD_RMA, "direction": "descending" }],
            "page_size": 1,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        let payload: QueryResponse = response.json().await?;

        let cursor = cursor_from_response(&payload);
        if cursor.is_none() {
            info!("no usable cursor in the database, treating it as empty");
        }
        Ok(cursor)
    }

    async fn persist(&self, record: &ExtractedRecord) -> Result<(), SyncError> {
        let properties = build_properties(record)?;
        let url = format!("{}/pages", self.api_base);
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": properties,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message: String = response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(300)
        .collect();
    Err(SyncError::NotionApi {
        status: status.as_u16(),
        message,
    })
}

/// The store cursor out of a sorted, page-size-1 query: the RMA of the
/// newest page, or `None` for an empty database or an unreadable property.
fn cursor_from_response(payload: &QueryResponse) -> Option<u32> {
    payload
        .results
        .first()?
        .properties
        .get(config::FIELD_RMA)
        .and_then(rma_from_property)
}

/// Digits off the end of a display value, e.g. `"№ 2864"` → 2864. `None`
/// when the value does not end in digits or overflows.
fn trailing_number(value: &str) -> Option<u32> {
    let trimmed = value.trim_end();
    let digits: String = trimmed
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<String>()
        .chars()
        .rev()
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Pull an order id out of whatever property shape the RMA column uses.
fn rma_from_property(property: &Value) -> Option<u32> {
    match property["type"].as_str()? {
        "title" => trailing_number(property["title"][0]["plain_text"].as_str()?),
        "rich_text" => trailing_number(property["rich_text"][0]["plain_text"].as_str()?),
        "number" => property["number"]
            .as_u64()
            .and_then(|n| u32::try_from(n).ok()),
        _ => None,
    }
}

fn rich_text(content: &str) -> Value {
    json!({ "rich_text": [{ "text": { "content": content } }] })
}

fn select(name: &str) -> Value {
    json!({ "select": { "name": name } })
}

fn people(id: &str) -> Value {
    json!({ "people": [{ "object": "user", "id": id }] })
}

/// Map one record onto the database's property schema. Fails when the record
/// has no RMA; everything else is optional and simply omitted when absent.
pub(crate) fn build_properties(record: &ExtractedRecord) -> Result<Value, SyncError> {
    let rma = record
        .get(config::FIELD_RMA)
        .ok_or(SyncError::MissingOrderNumber)?;

    let mut properties = serde_json::Map::new();
    properties.insert(
        config::FIELD_RMA.to_string(),
        json!({ "title": [{ "text": { "content": format!("№ {rma}") } }] }),
    );

    if let Some(v) = record.get(config::FIELD_CLIENT) {
        properties.insert(config::FIELD_CLIENT.to_string(), rich_text(v));
    }
    if let Some(v) = record.get(config::FIELD_PHONE) {
        properties.insert(
            config::FIELD_PHONE.to_string(),
            json!({ "phone_number": v }),
        );
    }
    if let Some(v) = record.get(config::FIELD_MANUFACTURER) {
        properties.insert(config::FIELD_MANUFACTURER.to_string(), select(v));
    }
    if let Some(v) = record.get(config::FIELD_DEVICE_TYPE) {
        properties.insert(PROP_DEVICE_TYPE.to_string(), select(v));
    }
    if let Some(v) = record.get(config::FIELD_MODEL) {
        properties.insert(config::FIELD_MODEL.to_string(), rich_text(v));
    }
    if let Some(v) = record.get(config::FIELD_SERIAL) {
        properties.insert(PROP_SERIAL.to_string(), rich_text(v));
    }
    if let Some(v) = record.get(config::FIELD_NOTES) {
        properties.insert(PROP_NOTES.to_string(), rich_text(v));
    }
    if let Some(v) = record.get(config::FIELD_DEFECT) {
        properties.insert(PROP_DEFECT.to_string(), rich_text(v));
    }
    if let Some(v) = record.get(config::FIELD_CONDITION) {
        properties.insert(config::FIELD_CONDITION.to_string(), rich_text(v));
    }
    if let Some(v) = record.get(config::FIELD_TECHNICIAN) {
        // The value may still carry its workload suffix; the directory key is
        // the name up to the first parenthesis either way.
        let name = v.split('(').next().unwrap_or(v).trim();
        if let Some(id) = config::notion_user_id(name) {
            properties.insert(config::FIELD_TECHNICIAN.to_string(), people(id));
        }
    }

    properties.insert(
        PROP_STATUS.to_string(),
        json!({ "status": { "name": config::STATUS_NEW } }),
    );
    if let Some(id) = config::notion_user_id(config::MANAGER_NAME) {
        properties.insert(PROP_MANAGER.to_string(), people(id));
    }
    properties.insert(
        PROP_PRIORITY.to_string(),
        select(config::PRIORITY_STANDARD),
    );

    if let Some(v) = record.get(config::FIELD_URL) {
        properties.insert(config::FIELD_URL.to_string(), json!({ "url": v }));
    }

    Ok(Value::Object(properties))
}
