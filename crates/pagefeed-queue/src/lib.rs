//! Work-queue handoff to the downstream analysis service.
//!
//! Best-effort by contract: the HTTP response is already determined before
//! any of this runs, a failure is reported to the caller and never retried.
//! A lost enqueue heals on the next fetch cycle because ingestion is
//! idempotent by external id.

pub mod memory;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// List of event ids awaiting analysis.
pub const EVENTS_TO_ANALYZE_KEY: &str = "events_to_analyze";

/// Set of page ids registered for periodic fetching.
pub const SCHEDULED_PAGES_KEY: &str = "scheduled_pages";

/// Hash of per-page fetch configuration, keyed by page id.
pub const PAGE_FETCH_CONFIG_KEY: &str = "page_fetch_config";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue transport failed: {0}")]
    Transport(#[from] redis::RedisError),
    #[error("encoding fetch config: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub url: String,
    pub fetch_interval_secs: u64,
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| {
            let host = std::env::var("REDIS_HOST").unwrap_or_else(|_| "redis".to_string());
            let port = std::env::var("REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
            format!("redis://{host}:{port}")
        });
        Self {
            url,
            fetch_interval_secs: std::env::var("FETCH_INTERVAL")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        }
    }
}

/// Per-page registration record read by the external scheduler.
/// `last_fetch` starts at zero and is maintained by the scheduler, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    pub page_id: i64,
    pub interval: u64,
    pub last_fetch: i64,
}

/// Queue seam consumed by the HTTP layer. All operations are idempotent:
/// scheduling twice or unscheduling a non-member are safe no-ops.
#[async_trait]
pub trait AnalysisQueue: Send + Sync {
    /// Push each id onto the analysis list, at least once each. An empty
    /// slice is a successful no-op.
    async fn enqueue_for_analysis(&self, event_ids: &[i64]) -> Result<(), QueueError>;

    async fn schedule_fetch(&self, page_id: i64) -> Result<(), QueueError>;
    async fn unschedule_fetch(&self, page_id: i64) -> Result<(), QueueError>;
    async fn scheduled_pages(&self) -> Result<Vec<i64>, QueueError>;
}

#[derive(Clone)]
pub struct RedisQueue {
    manager: ConnectionManager,
    fetch_interval_secs: u64,
}

impl RedisQueue {
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        info!(url = %config.url, "connected to work queue");
        Ok(Self {
            manager,
            fetch_interval_secs: config.fetch_interval_secs,
        })
    }
}

#[async_trait]
impl AnalysisQueue for RedisQueue {
    async fn enqueue_for_analysis(&self, event_ids: &[i64]) -> Result<(), QueueError> {
        if event_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.manager.clone();
        for event_id in event_ids {
            let _: i64 = conn.lpush(EVENTS_TO_ANALYZE_KEY, *event_id).await?;
        }
        info!(count = event_ids.len(), "queued events for analysis");
        Ok(())
    }

    async fn schedule_fetch(&self, page_id: i64) -> Result<(), QueueError> {
        let config = FetchConfig {
            page_id,
            interval: self.fetch_interval_secs,
            last_fetch: 0,
        };
        let encoded = serde_json::to_string(&config)?;
        let mut conn = self.manager.clone();
        let _: i64 = conn.sadd(SCHEDULED_PAGES_KEY, page_id).await?;
        let _: i64 = conn.hset(PAGE_FETCH_CONFIG_KEY, page_id, encoded).await?;
        info!(page_id, interval = config.interval, "scheduled page fetch");
        Ok(())
    }

    async fn unschedule_fetch(&self, page_id: i64) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.srem(SCHEDULED_PAGES_KEY, page_id).await?;
        let _: i64 = conn.hdel(PAGE_FETCH_CONFIG_KEY, page_id).await?;
        info!(page_id, "unscheduled page fetch");
        Ok(())
    }

    async fn scheduled_pages(&self) -> Result<Vec<i64>, QueueError> {
        let mut conn = self.manager.clone();
        Ok(conn.smembers(SCHEDULED_PAGES_KEY).await?)
    }
}
