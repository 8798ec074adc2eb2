//! In-memory queue used by tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::{AnalysisQueue, FetchConfig, QueueError};

#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    analysis: Vec<i64>,
    scheduled: BTreeSet<i64>,
    configs: HashMap<i64, FetchConfig>,
    fetch_interval_secs: u64,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let queue = Self::default();
        queue.lock().fetch_interval_secs = 3600;
        queue
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("queue mutex poisoned")
    }

    /// Ids pushed for analysis so far, in push order.
    pub fn queued(&self) -> Vec<i64> {
        self.lock().analysis.clone()
    }

    pub fn is_scheduled(&self, page_id: i64) -> bool {
        self.lock().scheduled.contains(&page_id)
    }

    pub fn fetch_config(&self, page_id: i64) -> Option<FetchConfig> {
        self.lock().configs.get(&page_id).cloned()
    }
}

#[async_trait]
impl AnalysisQueue for MemoryQueue {
    async fn enqueue_for_analysis(&self, event_ids: &[i64]) -> Result<(), QueueError> {
        self.lock().analysis.extend_from_slice(event_ids);
        Ok(())
    }

    async fn schedule_fetch(&self, page_id: i64) -> Result<(), QueueError> {
        let mut inner = self.lock();
        let interval = inner.fetch_interval_secs;
        inner.scheduled.insert(page_id);
        inner.configs.insert(
            page_id,
            FetchConfig {
                page_id,
                interval,
                last_fetch: 0,
            },
        );
        Ok(())
    }

    async fn unschedule_fetch(&self, page_id: i64) -> Result<(), QueueError> {
        let mut inner = self.lock();
        inner.scheduled.remove(&page_id);
        inner.configs.remove(&page_id);
        Ok(())
    }

    async fn scheduled_pages(&self) -> Result<Vec<i64>, QueueError> {
        Ok(self.lock().scheduled.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_enqueue_is_a_successful_noop() {
        let queue = MemoryQueue::new();
        queue.enqueue_for_analysis(&[]).await.unwrap();
        assert!(queue.queued().is_empty());
    }

    #[tokio::test]
    async fn schedule_and_unschedule_are_idempotent() {
        let queue = MemoryQueue::new();
        queue.schedule_fetch(7).await.unwrap();
        queue.schedule_fetch(7).await.unwrap();
        assert_eq!(queue.scheduled_pages().await.unwrap(), vec![7]);
        assert_eq!(
            queue.fetch_config(7),
            Some(FetchConfig {
                page_id: 7,
                interval: 3600,
                last_fetch: 0
            })
        );

        queue.unschedule_fetch(7).await.unwrap();
        queue.unschedule_fetch(7).await.unwrap();
        assert!(queue.scheduled_pages().await.unwrap().is_empty());
        assert_eq!(queue.fetch_config(7), None);
    }
}
