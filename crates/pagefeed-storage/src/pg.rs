//! Postgres-backed store.

use async_trait::async_trait;
use pagefeed_core::{Event, EventWrite, NewPage, Page};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::{EventStore, StoreError};

const PAGE_COLUMNS: &str =
    "id, fb_page_id, name, description, page_url, is_active, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, fb_event_id, page_id, name, description, event_url, location, \
     start_time, end_time, timezone, is_online, attending_count, interested_count, \
     created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        Ok(Self::new(PgPool::connect(database_url).await?))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }
}

fn page_from_row(row: &PgRow) -> Result<Page, sqlx::Error> {
    Ok(Page {
        id: row.try_get("id")?,
        fb_page_id: row.try_get("fb_page_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        page_url: row.try_get("page_url")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<Event, sqlx::Error> {
    Ok(Event {
        id: row.try_get("id")?,
        fb_event_id: row.try_get("fb_event_id")?,
        page_id: row.try_get("page_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        event_url: row.try_get("event_url")?,
        location: row.try_get("location")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        timezone: row.try_get("timezone")?,
        is_online: row.try_get("is_online")?,
        attending_count: row.try_get("attending_count")?,
        interested_count: row.try_get("interested_count")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl EventStore for PgStore {
    async fn insert_page(&self, page: NewPage) -> Result<Page, StoreError> {
        let row = sqlx::query(&format!(
            "INSERT INTO pages (fb_page_id, name, description, page_url, is_active) \
             VALUES ($1, $2, $3, $4, TRUE) \
             RETURNING {PAGE_COLUMNS}"
        ))
        .bind(&page.fb_page_id)
        .bind(page.display_name())
        .bind(&page.description)
        .bind(&page.page_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(page_from_row(&row)?)
    }

    async fn page(&self, id: i64) -> Result<Option<Page>, StoreError> {
        let row = sqlx::query(&format!("SELECT {PAGE_COLUMNS} FROM pages WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(page_from_row).transpose()?)
    }

    async fn page_by_fb_id(&self, fb_page_id: &str) -> Result<Option<Page>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages WHERE fb_page_id = $1"
        ))
        .bind(fb_page_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(page_from_row).transpose()?)
    }

    async fn pages(&self, skip: i64, limit: i64) -> Result<Vec<Page>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PAGE_COLUMNS} FROM pages ORDER BY id OFFSET $1 LIMIT $2"
        ))
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| page_from_row(row).map_err(StoreError::from))
            .collect()
    }

    async fn delete_page(&self, id: i64) -> Result<bool, StoreError> {
        // Owned events go with the page via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM pages WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_event(&self, write: EventWrite) -> Result<Event, StoreError> {
        // Single statement so a concurrent fetch of the same fb_event_id
        // cannot race a separate read-then-write pair.
        let row = sqlx::query(&format!(
            "INSERT INTO events (fb_event_id, page_id, name, description, event_url, \
                 location, start_time, end_time, timezone, is_online, \
                 attending_count, interested_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (fb_event_id) DO UPDATE SET \
                 page_id = EXCLUDED.page_id, \
                 name = EXCLUDED.name, \
                 description = EXCLUDED.description, \
                 event_url = EXCLUDED.event_url, \
                 location = EXCLUDED.location, \
                 start_time = EXCLUDED.start_time, \
                 end_time = EXCLUDED.end_time, \
                 timezone = EXCLUDED.timezone, \
                 is_online = EXCLUDED.is_online, \
                 attending_count = EXCLUDED.attending_count, \
                 interested_count = EXCLUDED.interested_count, \
                 updated_at = now() \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(&write.fb_event_id)
        .bind(write.page_id)
        .bind(&write.name)
        .bind(&write.description)
        .bind(&write.event_url)
        .bind(&write.location)
        .bind(write.start_time)
        .bind(write.end_time)
        .bind(&write.timezone)
        .bind(write.is_online)
        .bind(write.attending_count)
        .bind(write.interested_count)
        .fetch_one(&self.pool)
        .await?;
        Ok(event_from_row(&row)?)
    }

    async fn event(&self, id: i64) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(event_from_row).transpose()?)
    }

    async fn event_by_fb_id(&self, fb_event_id: &str) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE fb_event_id = $1"
        ))
        .bind(fb_event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(event_from_row).transpose()?)
    }

    async fn events(
        &self,
        page_id: Option<i64>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Event>, StoreError> {
        let rows = match page_id {
            Some(page_id) => {
                sqlx::query(&format!(
                    "SELECT {EVENT_COLUMNS} FROM events WHERE page_id = $1 \
                     ORDER BY id OFFSET $2 LIMIT $3"
                ))
                .bind(page_id)
                .bind(skip)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {EVENT_COLUMNS} FROM events ORDER BY id OFFSET $1 LIMIT $2"
                ))
                .bind(skip)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.iter()
            .map(|row| event_from_row(row).map_err(StoreError::from))
            .collect()
    }
}
