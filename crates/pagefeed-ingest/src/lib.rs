//! Fetch-and-ingest orchestration for monitored pages.

mod upsert;

pub use upsert::event_write_from_raw;

use std::sync::Arc;

use pagefeed_core::{Event, NewPage, Page};
use pagefeed_graph::EventSource;
use pagefeed_storage::{EventStore, StoreError};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Ceiling on events fetched per page per call.
    pub max_events_per_page: u32,
}

impl IngestConfig {
    pub fn from_env() -> Self {
        Self {
            max_events_per_page: std::env::var("MAX_EVENTS_PER_PAGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_events_per_page: 100,
        }
    }
}

/// Coordinates the source adapter and the store for one page at a time.
/// Request-scoped: holds no per-call state between invocations.
pub struct Ingestor {
    store: Arc<dyn EventStore>,
    source: Arc<dyn EventSource>,
    max_events_per_page: u32,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn EventStore>,
        source: Arc<dyn EventSource>,
        config: &IngestConfig,
    ) -> Self {
        Self {
            store,
            source,
            max_events_per_page: config.max_events_per_page,
        }
    }

    /// Fetch up to `limit` events for `page` and upsert each one, returning
    /// the finalized rows in source order.
    ///
    /// A source failure is logged and degrades to an empty result; it never
    /// aborts the caller or touches previously stored events. Store failures
    /// do propagate.
    pub async fn fetch_and_ingest(
        &self,
        page: &Page,
        limit: u32,
    ) -> Result<Vec<Event>, StoreError> {
        let limit = limit.min(self.max_events_per_page);
        let raw_events = match self.source.fetch_events(&page.fb_page_id, limit).await {
            Ok(raw_events) => raw_events,
            Err(err) => {
                warn!(page = %page.fb_page_id, error = %err, "event fetch failed, returning no events");
                return Ok(Vec::new());
            }
        };

        let mut events = Vec::with_capacity(raw_events.len());
        for raw in &raw_events {
            let write = event_write_from_raw(page.id, raw);
            events.push(self.store.upsert_event(write).await?);
        }
        Ok(events)
    }

    /// Register a page to monitor. Idempotent by external id: an existing
    /// page is returned as-is without any source call. Otherwise the source
    /// fills in whichever of name/description/url the caller omitted, on a
    /// best-effort basis, and the page is inserted active.
    pub async fn register_page(&self, mut candidate: NewPage) -> Result<Page, StoreError> {
        if let Some(existing) = self.store.page_by_fb_id(&candidate.fb_page_id).await? {
            return Ok(existing);
        }

        match self.source.fetch_page_info(&candidate.fb_page_id).await {
            Ok(info) => {
                if is_blank(&candidate.name) {
                    candidate.name = info.name;
                }
                if is_blank(&candidate.description) {
                    candidate.description = info.description;
                }
                if is_blank(&candidate.page_url) {
                    candidate.page_url = info.link;
                }
            }
            Err(err) => {
                warn!(page = %candidate.fb_page_id, error = %err, "page info lookup failed, registering with caller-provided fields");
            }
        }

        self.store.insert_page(candidate).await
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |s| s.trim().is_empty())
}
