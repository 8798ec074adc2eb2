//! In-memory store used by tests and offline development.
//!
//! Same contract as [`PgStore`](crate::PgStore), including full-overwrite
//! upsert semantics and cascade deletion, minus durability.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use pagefeed_core::{Event, EventWrite, NewPage, Page};

use crate::{EventStore, StoreError};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_page_id: i64,
    next_event_id: i64,
    pages: HashMap<i64, Page>,
    events: HashMap<i64, Event>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_page(&self, page: NewPage) -> Result<Page, StoreError> {
        let mut inner = self.lock();
        inner.next_page_id += 1;
        let now = Utc::now();
        let stored = Page {
            id: inner.next_page_id,
            name: page.display_name(),
            fb_page_id: page.fb_page_id,
            description: page.description,
            page_url: page.page_url,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        inner.pages.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn page(&self, id: i64) -> Result<Option<Page>, StoreError> {
        Ok(self.lock().pages.get(&id).cloned())
    }

    async fn page_by_fb_id(&self, fb_page_id: &str) -> Result<Option<Page>, StoreError> {
        Ok(self
            .lock()
            .pages
            .values()
            .find(|p| p.fb_page_id == fb_page_id)
            .cloned())
    }

    async fn pages(&self, skip: i64, limit: i64) -> Result<Vec<Page>, StoreError> {
        let inner = self.lock();
        let mut pages: Vec<Page> = inner.pages.values().cloned().collect();
        pages.sort_by_key(|p| p.id);
        Ok(pages
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn delete_page(&self, id: i64) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        if inner.pages.remove(&id).is_none() {
            return Ok(false);
        }
        inner.events.retain(|_, event| event.page_id != id);
        Ok(true)
    }

    async fn upsert_event(&self, write: EventWrite) -> Result<Event, StoreError> {
        let mut inner = self.lock();
        let now = Utc::now();
        let existing_id = inner
            .events
            .values()
            .find(|e| e.fb_event_id == write.fb_event_id)
            .map(|e| e.id);

        let (id, created_at) = match existing_id {
            Some(id) => (id, inner.events[&id].created_at),
            None => {
                inner.next_event_id += 1;
                (inner.next_event_id, now)
            }
        };
        let stored = Event {
            id,
            fb_event_id: write.fb_event_id,
            page_id: write.page_id,
            name: write.name,
            description: write.description,
            event_url: write.event_url,
            location: write.location,
            start_time: write.start_time,
            end_time: write.end_time,
            timezone: write.timezone,
            is_online: write.is_online,
            attending_count: write.attending_count,
            interested_count: write.interested_count,
            created_at,
            updated_at: now,
        };
        inner.events.insert(id, stored.clone());
        Ok(stored)
    }

    async fn event(&self, id: i64) -> Result<Option<Event>, StoreError> {
        Ok(self.lock().events.get(&id).cloned())
    }

    async fn event_by_fb_id(&self, fb_event_id: &str) -> Result<Option<Event>, StoreError> {
        Ok(self
            .lock()
            .events
            .values()
            .find(|e| e.fb_event_id == fb_event_id)
            .cloned())
    }

    async fn events(
        &self,
        page_id: Option<i64>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Event>, StoreError> {
        let inner = self.lock();
        let mut events: Vec<Event> = inner
            .events
            .values()
            .filter(|e| page_id.map_or(true, |id| e.page_id == id))
            .cloned()
            .collect();
        events.sort_by_key(|e| e.id);
        Ok(events
            .into_iter()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }
}
