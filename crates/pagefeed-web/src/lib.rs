//! HTTP API over the store, the ingestor, and the work queue.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pagefeed_core::NewPage;
use pagefeed_ingest::Ingestor;
use pagefeed_queue::AnalysisQueue;
use pagefeed_storage::{EventStore, StoreError};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{error, warn};

pub const SERVICE_NAME: &str = "Pagefeed Event Fetcher";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub queue: Arc<dyn AnalysisQueue>,
    pub ingestor: Arc<Ingestor>,
    /// Whether a source access token was configured at startup. Reported by
    /// the health endpoint, never enforced here.
    pub has_credentials: bool,
}

enum ApiError {
    NotFound(&'static str),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, detail.to_string()),
            ApiError::Internal(err) => {
                error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
        };
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Internal(err.into())
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/pages", post(create_page_handler).get(list_pages_handler))
        .route("/pages/{id}", get(get_page_handler).delete(delete_page_handler))
        .route("/pages/{id}/fetch", post(fetch_page_events_handler))
        .route(
            "/pages/{id}/schedule",
            post(schedule_page_handler).delete(unschedule_page_handler),
        )
        .route("/events", get(list_events_handler))
        .route("/events/{id}", get(get_event_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": SERVICE_NAME }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "facebook_credentials": if state.has_credentials { "available" } else { "missing" },
    }))
}

async fn create_page_handler(
    State(state): State<Arc<AppState>>,
    Json(candidate): Json<NewPage>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.ingestor.register_page(candidate).await?;
    Ok((StatusCode::CREATED, Json(page)))
}

#[derive(Debug, Deserialize, Default)]
struct PageQuery {
    skip: Option<i64>,
    limit: Option<i64>,
}

async fn list_pages_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let pages = state
        .store
        .pages(query.skip.unwrap_or(0), query.limit.unwrap_or(100))
        .await?;
    Ok(Json(pages))
}

async fn get_page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.store.page(id).await? {
        Some(page) => Ok(Json(page)),
        None => Err(ApiError::NotFound("Page not found")),
    }
}

async fn delete_page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.store.delete_page(id).await? {
        return Err(ApiError::NotFound("Page not found"));
    }
    // Best effort: a page that no longer exists should not stay scheduled.
    if let Err(err) = state.queue.unschedule_fetch(id).await {
        warn!(page_id = id, error = %err, "failed to unschedule deleted page");
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Default)]
struct FetchQuery {
    limit: Option<u32>,
}

async fn fetch_page_events_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Query(query): Query<FetchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .store
        .page(id)
        .await?
        .ok_or(ApiError::NotFound("Page not found"))?;

    let events = state
        .ingestor
        .fetch_and_ingest(&page, query.limit.unwrap_or(10))
        .await?;

    // The response does not wait on the queue; a failed handoff is logged
    // and heals on the next fetch.
    let event_ids: Vec<i64> = events.iter().map(|e| e.id).collect();
    let queue = state.queue.clone();
    tokio::spawn(async move {
        if let Err(err) = queue.enqueue_for_analysis(&event_ids).await {
            error!(page_id = id, error = %err, "failed to queue events for analysis");
        }
    });

    Ok(Json(events))
}

async fn schedule_page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.page(id).await?.is_none() {
        return Err(ApiError::NotFound("Page not found"));
    }
    state
        .queue
        .schedule_fetch(id)
        .await
        .map_err(|err| ApiError::Internal(anyhow::Error::new(err).context("Failed to schedule fetch")))?;
    Ok(Json(serde_json::json!({
        "detail": "Page scheduled for periodic fetching",
        "page_id": id,
    })))
}

async fn unschedule_page_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if state.store.page(id).await?.is_none() {
        return Err(ApiError::NotFound("Page not found"));
    }
    state
        .queue
        .unschedule_fetch(id)
        .await
        .map_err(|err| ApiError::Internal(anyhow::Error::new(err).context("Failed to unschedule fetch")))?;
    Ok(Json(serde_json::json!({
        "detail": "Page unscheduled",
        "page_id": id,
    })))
}

#[derive(Debug, Deserialize, Default)]
struct EventQuery {
    page_id: Option<i64>,
    skip: Option<i64>,
    limit: Option<i64>,
}

async fn list_events_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let events = state
        .store
        .events(query.page_id, query.skip.unwrap_or(0), query.limit.unwrap_or(100))
        .await?;
    Ok(Json(events))
}

async fn get_event_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    match state.store.event(id).await? {
        Some(event) => Ok(Json(event)),
        None => Err(ApiError::NotFound("Event not found")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use pagefeed_graph::{EventSource, GraphError, PageInfo, RawEvent, RawPlace};
    use pagefeed_ingest::IngestConfig;
    use pagefeed_queue::memory::MemoryQueue;
    use pagefeed_storage::memory::MemoryStore;
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedSource {
        events: Vec<RawEvent>,
    }

    #[async_trait]
    impl EventSource for FixedSource {
        async fn fetch_events(
            &self,
            _fb_page_id: &str,
            _limit: u32,
        ) -> Result<Vec<RawEvent>, GraphError> {
            Ok(self.events.clone())
        }

        async fn fetch_page_info(&self, _fb_page_id: &str) -> Result<PageInfo, GraphError> {
            Ok(PageInfo::default())
        }
    }

    struct Harness {
        app: Router,
        store: Arc<MemoryStore>,
        queue: Arc<MemoryQueue>,
    }

    fn harness_with(events: Vec<RawEvent>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let source = Arc::new(FixedSource { events });
        let ingestor = Arc::new(Ingestor::new(
            store.clone(),
            source,
            &IngestConfig::default(),
        ));
        let app = app(AppState {
            store: store.clone(),
            queue: queue.clone(),
            ingestor,
            has_credentials: false,
        });
        Harness { app, store, queue }
    }

    fn sample_raw_event() -> RawEvent {
        RawEvent {
            id: "123456789".into(),
            name: Some("Test Event".into()),
            description: None,
            start_time: Some("2025-04-01T18:00:00+0000".into()),
            end_time: None,
            timezone: None,
            place: Some(RawPlace {
                name: Some("Test Venue".into()),
                location: None,
            }),
            is_online: false,
            attending_count: 10,
            interested_count: 0,
        }
    }

    async fn request(app: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let request = match body {
            Some(json) => Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn registered_page(harness: &Harness) -> i64 {
        let (status, body) = request(
            harness.app.clone(),
            "POST",
            "/pages",
            Some(serde_json::json!({ "fb_page_id": "page123", "name": "Test Page" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn health_reports_version_and_credentials() {
        let harness = harness_with(vec![]);
        let (status, body) = request(harness.app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["facebook_credentials"], "missing");
    }

    #[tokio::test]
    async fn registering_and_fetching_a_page() {
        let harness = harness_with(vec![]);
        let id = registered_page(&harness).await;

        let (status, body) = request(harness.app.clone(), "GET", &format!("/pages/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fb_page_id"], "page123");
        assert_eq!(body["name"], "Test Page");
        assert_eq!(body["is_active"], true);

        let (status, body) = request(harness.app, "GET", "/pages", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_ids_are_404_with_a_detail_body() {
        let harness = harness_with(vec![]);
        for (method, uri) in [
            ("GET", "/pages/999"),
            ("DELETE", "/pages/999"),
            ("POST", "/pages/999/fetch"),
            ("POST", "/pages/999/schedule"),
            ("DELETE", "/pages/999/schedule"),
        ] {
            let (status, body) = request(harness.app.clone(), method, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
            assert_eq!(body["detail"], "Page not found");
        }

        let (status, body) = request(harness.app, "GET", "/events/999", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["detail"], "Event not found");
    }

    #[tokio::test]
    async fn fetch_returns_events_and_queues_them_in_the_background() {
        let harness = harness_with(vec![sample_raw_event()]);
        let id = registered_page(&harness).await;

        let (status, body) =
            request(harness.app.clone(), "POST", &format!("/pages/{id}/fetch"), None).await;
        assert_eq!(status, StatusCode::OK);
        let events = body.as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["fb_event_id"], "123456789");
        assert_eq!(events[0]["event_url"], "https://facebook.com/events/123456789");
        let event_id = events[0]["id"].as_i64().unwrap();

        // The handoff runs after the response; give the spawned task a beat.
        for _ in 0..50 {
            if !harness.queue.queued().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(harness.queue.queued(), vec![event_id]);
    }

    #[tokio::test]
    async fn schedule_roundtrip() {
        let harness = harness_with(vec![]);
        let id = registered_page(&harness).await;

        let (status, body) =
            request(harness.app.clone(), "POST", &format!("/pages/{id}/schedule"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page_id"], id);
        assert!(harness.queue.is_scheduled(id));

        let (status, _) =
            request(harness.app.clone(), "DELETE", &format!("/pages/{id}/schedule"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!harness.queue.is_scheduled(id));
    }

    #[tokio::test]
    async fn deleting_a_page_removes_its_events_and_schedule() {
        let harness = harness_with(vec![sample_raw_event()]);
        let id = registered_page(&harness).await;
        request(harness.app.clone(), "POST", &format!("/pages/{id}/fetch"), None).await;
        request(harness.app.clone(), "POST", &format!("/pages/{id}/schedule"), None).await;

        let (status, _) = request(harness.app.clone(), "DELETE", &format!("/pages/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        assert!(!harness.queue.is_scheduled(id));
        assert!(harness.store.events(None, 0, 100).await.unwrap().is_empty());
        let (status, _) = request(harness.app, "GET", &format!("/pages/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn event_listing_filters_by_page() {
        let harness = harness_with(vec![sample_raw_event()]);
        let id = registered_page(&harness).await;
        request(harness.app.clone(), "POST", &format!("/pages/{id}/fetch"), None).await;

        let (status, body) = request(
            harness.app.clone(),
            "GET",
            &format!("/events?page_id={id}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = request(harness.app, "GET", "/events?page_id=999", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());
    }
}
