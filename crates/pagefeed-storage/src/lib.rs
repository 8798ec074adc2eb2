//! Store seam for pages and events: Postgres plus an in-memory stand-in.

pub mod memory;
mod pg;

pub use pg::PgStore;

use async_trait::async_trait;
use pagefeed_core::{Event, EventWrite, NewPage, Page};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Persistence contract the ingestion core runs against.
///
/// `upsert_event` must be atomic per call: concurrent upserts of the same
/// `fb_event_id` may interleave in any order but can never produce two rows
/// or expose a half-written one.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_page(&self, page: NewPage) -> Result<Page, StoreError>;
    async fn page(&self, id: i64) -> Result<Option<Page>, StoreError>;
    async fn page_by_fb_id(&self, fb_page_id: &str) -> Result<Option<Page>, StoreError>;
    async fn pages(&self, skip: i64, limit: i64) -> Result<Vec<Page>, StoreError>;

    /// Delete a page and, by cascade, every event it owns.
    async fn delete_page(&self, id: i64) -> Result<bool, StoreError>;

    /// Insert-or-replace keyed by `fb_event_id`; every mutable field is
    /// overwritten from `write`, including fields that became null.
    async fn upsert_event(&self, write: EventWrite) -> Result<Event, StoreError>;
    async fn event(&self, id: i64) -> Result<Option<Event>, StoreError>;
    async fn event_by_fb_id(&self, fb_event_id: &str) -> Result<Option<Event>, StoreError>;
    async fn events(
        &self,
        page_id: Option<i64>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Event>, StoreError>;
}
