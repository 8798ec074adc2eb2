//! Core domain model for pagefeed: monitored pages and their events.

pub mod timestamp;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name stored for events the source returns without one.
pub const UNNAMED_EVENT: &str = "Unnamed Event";

/// Base path for synthesized event URLs. Event URLs are always derived from
/// the external id, never taken verbatim from the payload.
pub const EVENT_URL_BASE: &str = "https://facebook.com/events";

/// A monitored social page. Owned by the store; the ingestion core only ever
/// sees it as a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub id: i64,
    pub fb_page_id: String,
    pub name: String,
    pub description: Option<String>,
    pub page_url: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration input for a page not yet in the store. Fields the caller
/// leaves out may be filled in from the external source before insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPage {
    pub fb_page_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
}

impl NewPage {
    /// Display name used when neither the caller nor the source supplied one.
    pub fn display_name(&self) -> String {
        self.name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(ToString::to_string)
            .unwrap_or_else(|| self.fb_page_id.clone())
    }
}

/// A normalized event belonging to exactly one page. `fb_event_id` is unique
/// across all pages; re-ingesting it updates the same row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub fb_event_id: String,
    pub page_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub event_url: String,
    pub location: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub is_online: bool,
    pub attending_count: i32,
    pub interested_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The complete mutable field set written on every upsert. A `None` here
/// clears the stored column; upserts replace, they never merge.
#[derive(Debug, Clone, PartialEq)]
pub struct EventWrite {
    pub fb_event_id: String,
    pub page_id: i64,
    pub name: String,
    pub description: Option<String>,
    pub event_url: String,
    pub location: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub is_online: bool,
    pub attending_count: i32,
    pub interested_count: i32,
}

/// Synthesize the canonical URL for an event from its external id.
pub fn event_url(fb_event_id: &str) -> String {
    format!("{EVENT_URL_BASE}/{fb_event_id}")
}
