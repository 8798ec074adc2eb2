//! Projection from raw source payloads to store writes.

use chrono::{DateTime, Utc};
use pagefeed_core::{event_url, timestamp, EventWrite, UNNAMED_EVENT};
use pagefeed_graph::RawEvent;
use tracing::warn;

/// Shape a raw source event into a write keyed to `page_id`.
///
/// Each timestamp is normalized independently; one that fails to parse is
/// logged and stored as NULL without disturbing the other. Counts are
/// clamped at zero.
pub fn event_write_from_raw(page_id: i64, raw: &RawEvent) -> EventWrite {
    EventWrite {
        fb_event_id: raw.id.clone(),
        page_id,
        name: raw
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| UNNAMED_EVENT.to_string()),
        description: raw.description.clone(),
        start_time: normalized(raw.start_time.as_deref(), &raw.id, "start_time"),
        end_time: normalized(raw.end_time.as_deref(), &raw.id, "end_time"),
        timezone: raw.timezone.clone(),
        location: raw.location(),
        is_online: raw.is_online,
        event_url: event_url(&raw.id),
        attending_count: raw.attending_count.max(0),
        interested_count: raw.interested_count.max(0),
    }
}

fn normalized(raw: Option<&str>, event_id: &str, field: &str) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match timestamp::normalize(raw) {
        Ok(ts) => Some(ts),
        Err(err) => {
            warn!(event = %event_id, field, error = %err, "unparseable timestamp stored as null");
            None
        }
    }
}
