//! Facebook Pages adapter over the Graph API.
//!
//! A Facebook listing is a Page. The credential's `external_account_id` is
//! the Page id and its `auth` is a Page access token. Pages cannot be created
//! through the API, so a first publish claims the credential's own Page.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};

use listsync_core::{Credential, Field, FieldValues, LocalSnapshot, Platform, PlatformSnapshot};

use crate::adapter::{PlatformAdapter, PushAck};
use crate::error::{AdapterError, Result};

/// Default Graph API root.
pub const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com/v19.0";

/// Client-side bound on one Graph API request, connect to last body byte.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const PAGE_FIELDS: &str = "id,name,location,phone,website,category,about,fan_count";

/// Graph API error codes that mean "slow down".
const RATE_LIMIT_CODES: [i64; 4] = [4, 17, 32, 613];

/// Graph API error code for an invalid or expired access token.
const INVALID_TOKEN_CODE: i64 = 190;

/// Graph API error code for missing permissions.
const PERMISSION_CODE: i64 = 200;

/// The Facebook Pages adapter.
#[derive(Debug, Clone)]
pub struct FacebookAdapter {
    client: Client,
    graph_url: String,
}

impl FacebookAdapter {
    /// An adapter against the public Graph API.
    pub fn new() -> Result<Self> {
        Self::with_graph_url(DEFAULT_GRAPH_URL)
    }

    /// An adapter against a custom Graph API root (for proxies and tests).
    pub fn with_graph_url(graph_url: impl Into<String>) -> Result<Self> {
        Self::with_options(graph_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// An adapter against `graph_url` whose requests give up after `timeout`.
    pub fn with_options(graph_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AdapterError::Client(e.to_string()))?;
        Ok(Self {
            client,
            graph_url: graph_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn page_url(&self, page_id: &str) -> String {
        format!("{}/{}", self.graph_url, page_id)
    }

    async fn read_response(response: reqwest::Response) -> Result<String> {
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let body = response.text().await.map_err(map_transport)?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(classify_error(status, retry_after, &body))
        }
    }
}

#[async_trait]
impl PlatformAdapter for FacebookAdapter {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    async fn fetch(&self, credential: &Credential, external_id: &str) -> Result<PlatformSnapshot> {
        let response = self
            .client
            .get(self.page_url(external_id))
            .query(&[("fields", PAGE_FIELDS)])
            .bearer_auth(&credential.auth)
            .send()
            .await
            .map_err(map_transport)?;

        let body = Self::read_response(response).await?;
        parse_page(&body)
    }

    async fn push(
        &self,
        credential: &Credential,
        external_id: Option<&str>,
        local: &LocalSnapshot,
    ) -> Result<PushAck> {
        let page_id = external_id.unwrap_or(&credential.external_account_id);
        let response = self
            .client
            .post(self.page_url(page_id))
            .bearer_auth(&credential.auth)
            .json(&PageUpdate::from_local(local))
            .send()
            .await
            .map_err(map_transport)?;

        let body = Self::read_response(response).await?;
        let ack: UpdateResponse = serde_json::from_str(&body)
            .map_err(|e| AdapterError::Transient(format!("malformed update response: {}", e)))?;
        if !ack.success {
            return Err(AdapterError::Rejected(format!(
                "page {} update not applied",
                page_id
            )));
        }

        Ok(PushAck::new(page_id, PageUpdate::WRITTEN.to_vec()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct PageLocation {
    #[serde(default)]
    street: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    zip: Option<String>,
    #[serde(default)]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Page {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    location: Option<PageLocation>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    about: Option<String>,
    #[serde(default)]
    fan_count: Option<u64>,
}

/// The writable subset of a Page. Category is not writable by name.
///
/// Every field is sent; an empty string clears the value on the Page.
#[derive(Debug, Serialize)]
struct PageUpdate {
    name: String,
    phone: String,
    website: String,
    location: PageUpdateLocation,
}

#[derive(Debug, Serialize)]
struct PageUpdateLocation {
    street: String,
    city: String,
    state: String,
    zip: String,
    country: String,
}

impl PageUpdate {
    /// Fields a successful update overwrites.
    const WRITTEN: [Field; 9] = [
        Field::Name,
        Field::Address,
        Field::Address2,
        Field::City,
        Field::State,
        Field::PostalCode,
        Field::Country,
        Field::Phone,
        Field::Website,
    ];

    fn from_local(local: &LocalSnapshot) -> Self {
        let value = |field: Field| local.get(field).trim().to_string();
        let street = match (value(Field::Address), value(Field::Address2)) {
            (line1, line2) if line2.is_empty() => line1,
            (line1, line2) if line1.is_empty() => line2,
            (line1, line2) => format!("{}\n{}", line1, line2),
        };
        Self {
            name: value(Field::Name),
            phone: value(Field::Phone),
            website: value(Field::Website),
            location: PageUpdateLocation {
                street,
                city: value(Field::City),
                state: value(Field::State),
                zip: value(Field::PostalCode),
                country: value(Field::Country),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct UpdateResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<i64>,
}

/// Normalize a Graph API Page document into a snapshot.
///
/// A multi-line street is split into `address` and `address2`.
fn parse_page(body: &str) -> Result<PlatformSnapshot> {
    let page: Page = serde_json::from_str(body)
        .map_err(|e| AdapterError::Transient(format!("malformed page response: {}", e)))?;

    let mut fields = FieldValues::default();
    let mut set = |field: Field, value: Option<String>| {
        if let Some(v) = value {
            fields.set(field, v);
        }
    };

    set(Field::Name, page.name);
    set(Field::Phone, page.phone);
    set(Field::Website, page.website);
    set(Field::Category, page.category);

    let location = page.location.unwrap_or_default();
    if let Some(street) = location.street {
        let mut lines = street.splitn(2, '\n');
        set(Field::Address, lines.next().map(str::to_string));
        set(Field::Address2, lines.next().map(str::to_string));
    }
    set(Field::City, location.city);
    set(Field::State, location.state);
    set(Field::PostalCode, location.zip);
    set(Field::Country, location.country);

    let mut extras = BTreeMap::new();
    if let Some(count) = page.fan_count {
        extras.insert("follower_count".to_string(), count.to_string());
    }
    if let Some(about) = page.about {
        extras.insert("about".to_string(), about);
    }

    let mut snapshot = PlatformSnapshot::new(Platform::Facebook, page.id, fields);
    snapshot.extras = extras;
    Ok(snapshot)
}

/// Map a failed Graph API response onto the adapter taxonomy.
///
/// The Graph error code wins over the HTTP status: rate limits commonly
/// arrive as 400s.
fn classify_error(status: StatusCode, retry_after: Option<Duration>, body: &str) -> AdapterError {
    let graph = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    let message = match &graph {
        Some(g) if !g.message.trim().is_empty() => format!("{} ({})", g.message.trim(), status.as_u16()),
        _ => format!("HTTP {}", status.as_u16()),
    };

    match graph.and_then(|g| g.code) {
        Some(code) if RATE_LIMIT_CODES.contains(&code) => {
            return AdapterError::RateLimited { retry_after };
        }
        Some(INVALID_TOKEN_CODE) | Some(PERMISSION_CODE) => {
            return AdapterError::Unauthorized(message);
        }
        _ => {}
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AdapterError::Unauthorized(message),
        StatusCode::TOO_MANY_REQUESTS => AdapterError::RateLimited { retry_after },
        StatusCode::NOT_FOUND => AdapterError::NotFound(message),
        s if s.is_server_error() => AdapterError::Transient(message),
        _ => AdapterError::Rejected(message),
    }
}

fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn map_transport(error: reqwest::Error) -> AdapterError {
    if error.is_timeout() {
        AdapterError::Transient(format!("request timed out: {}", error))
    } else {
        AdapterError::Transient(error.to_string())
    }
}
