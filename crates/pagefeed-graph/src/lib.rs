//! Graph API client and the typed records it hands to the ingestion pipeline.
//!
//! Payloads are given a fixed shape here, at the boundary; nothing downstream
//! ever touches an untyped JSON map.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com/v18.0";

/// Field projection requested for page events. Fixed; one request, first
/// page only.
const EVENT_FIELDS: &str =
    "id,name,description,start_time,end_time,place,is_online,attending_count,interested_count";

/// Field projection for page enrichment during registration.
const PAGE_FIELDS: &str = "name,description,link";

#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub base_url: String,
    pub access_token: String,
    pub max_events_per_page: u32,
    pub timeout: Duration,
}

impl GraphConfig {
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("FACEBOOK_GRAPH_URL")
                .unwrap_or_else(|_| DEFAULT_GRAPH_URL.to_string()),
            access_token: std::env::var("FACEBOOK_ACCESS_TOKEN").unwrap_or_default(),
            max_events_per_page: std::env::var("MAX_EVENTS_PER_PAGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
            timeout: Duration::from_secs(
                std::env::var("HTTP_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(20),
            ),
        }
    }
}

/// Any failure talking to the source: transport, non-success status, or a
/// payload that does not parse. Callers treat all of these as "zero results,
/// log and continue".
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph api request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("graph api returned status {status} for {endpoint}")]
    Status { status: u16, endpoint: String },
    #[error("graph api payload not understood: {0}")]
    Payload(#[from] serde_json::Error),
}

/// One event as the source reports it. Optional fields stay optional until
/// ingestion applies its defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawEvent {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub timezone: Option<String>,
    pub place: Option<RawPlace>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub attending_count: i32,
    #[serde(default)]
    pub interested_count: i32,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RawPlace {
    pub name: Option<String>,
    pub location: Option<RawLocation>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct RawLocation {
    pub city: Option<String>,
    pub country: Option<String>,
}

impl RawEvent {
    /// Free-text location: place name, city, country, comma-joined with
    /// empty parts omitted. No place means no location.
    pub fn location(&self) -> Option<String> {
        let place = self.place.as_ref()?;
        let mut parts: Vec<&str> = Vec::new();
        if let Some(name) = nonempty(place.name.as_deref()) {
            parts.push(name);
        }
        if let Some(loc) = &place.location {
            if let Some(city) = nonempty(loc.city.as_deref()) {
                parts.push(city);
            }
            if let Some(country) = nonempty(loc.country.as_deref()) {
                parts.push(country);
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

fn nonempty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

/// Page metadata used to enrich a registration.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct PageInfo {
    pub name: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventsEnvelope {
    #[serde(default)]
    data: Vec<RawEvent>,
}

/// Seam between ingestion and the external source.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events(&self, fb_page_id: &str, limit: u32)
        -> Result<Vec<RawEvent>, GraphError>;

    async fn fetch_page_info(&self, fb_page_id: &str) -> Result<PageInfo, GraphError>;
}

pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    max_events_per_page: u32,
}

impl GraphClient {
    pub fn new(config: GraphConfig) -> Result<Self, GraphError> {
        if config.access_token.is_empty() {
            warn!("no graph api access token configured; source calls will be rejected upstream");
        }
        let http = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            access_token: config.access_token,
            max_events_per_page: config.max_events_per_page,
        })
    }

    /// Issue one GET and decode the body. The access token travels as a query
    /// parameter and is kept out of every error message.
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: String,
        query: &[(&str, &str)],
    ) -> Result<T, GraphError> {
        let response = self
            .http
            .get(&endpoint)
            .query(query)
            .query(&[("access_token", self.access_token.as_str())])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GraphError::Status {
                status: status.as_u16(),
                endpoint,
            });
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl EventSource for GraphClient {
    async fn fetch_events(
        &self,
        fb_page_id: &str,
        limit: u32,
    ) -> Result<Vec<RawEvent>, GraphError> {
        let limit = limit.min(self.max_events_per_page);
        let endpoint = format!("{}/{}/events", self.base_url, fb_page_id);
        let envelope: EventsEnvelope = self
            .get_json(
                endpoint,
                &[("fields", EVENT_FIELDS), ("limit", &limit.to_string())],
            )
            .await?;
        Ok(envelope.data)
    }

    async fn fetch_page_info(&self, fb_page_id: &str) -> Result<PageInfo, GraphError> {
        let endpoint = format!("{}/{}", self.base_url, fb_page_id);
        self.get_json(endpoint, &[("fields", PAGE_FIELDS)]).await
    }
}
