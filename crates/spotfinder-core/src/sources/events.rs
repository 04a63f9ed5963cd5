use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{fetch_payload, shape_of, text_field, JsonSource};
use crate::error::DegradedError;
use crate::model::{Coordinate, EventRecord, SourceKind, NOT_AVAILABLE};

const CALENDAR_BASE: &str = "https://calendar.tamu.edu/live/";
const DISPLAY_FORMAT: &str = "%Y-%m-%d %I:%M %p";
pub const DEFAULT_EVENT_LIMIT: usize = 20;

/// Campus calendar feed. Events arrive either grouped by day under `events`
/// or as a flat array.
pub struct EventsAdapter {
    source: Arc<dyn JsonSource>,
    timeout: Duration,
    display_offset: FixedOffset,
}

impl EventsAdapter {
    pub fn new(source: Arc<dyn JsonSource>, timeout: Duration, display_offset: FixedOffset) -> Self {
        Self {
            source,
            timeout,
            display_offset,
        }
    }

    /// Fetch, parse, sort by start time and keep the first `limit` events.
    #[instrument(name = "fetch_events", skip(self), fields(source = %self.source.describe()))]
    pub async fn fetch(&self, limit: usize) -> Vec<EventRecord> {
        let Some(payload) = fetch_payload(SourceKind::Event, self.source.as_ref(), self.timeout).await
        else {
            return Vec::new();
        };
        let events = parse_events(&payload, self.display_offset, limit);
        debug!(count = events.len(), limit, "events parsed");
        events
    }
}

/// Normalize a calendar payload. Records with an unparsable timestamp or
/// coordinate are dropped one by one; missing values become `"N/A"`.
pub fn parse_events(payload: &Value, offset: FixedOffset, limit: usize) -> Vec<EventRecord> {
    let raw: Vec<&Value> = match payload {
        Value::Object(map) => match map.get("events") {
            Some(Value::Object(days)) => days
                .values()
                .filter_map(Value::as_array)
                .flatten()
                .collect(),
            Some(Value::Array(items)) => items.iter().collect(),
            _ => {
                DegradedError::source_unavailable(
                    SourceKind::Event,
                    "object payload has no `events` collection",
                )
                .log();
                return Vec::new();
            }
        },
        Value::Array(items) => items.iter().collect(),
        other => {
            DegradedError::source_unavailable(
                SourceKind::Event,
                format!("unexpected event payload: {}", shape_of(other)),
            )
            .log();
            return Vec::new();
        }
    };

    let mut events: Vec<EventRecord> = raw
        .into_iter()
        .filter_map(|item| match parse_event(item, offset) {
            Ok(event) => Some(event),
            Err(err) => {
                err.log();
                None
            }
        })
        .collect();

    // Stable: events without a start keep feed order, after every dated one.
    events.sort_by_key(|event| (event.starts_at.is_none(), event.starts_at));
    events.truncate(limit);
    events
}

fn parse_event(item: &Value, offset: FixedOffset) -> Result<EventRecord, DegradedError> {
    let record = item.as_object().ok_or_else(|| {
        DegradedError::malformed(SourceKind::Event, item.to_string(), "not an object")
    })?;
    let title = text_field(record, "title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Untitled Event")
        .to_string();
    let malformed = |reason: String| DegradedError::malformed(SourceKind::Event, title.as_str(), reason);

    let starts_at = timestamp_field(record, "ts_start").map_err(malformed)?;
    let ends_at = timestamp_field(record, "ts_end").map_err(malformed)?;
    let start_time = display_time(starts_at, offset).map_err(malformed)?;
    let end_time = display_time(ends_at, offset).map_err(malformed)?;
    let latitude = coordinate_field(record, "latitude").map_err(malformed)?;
    let longitude = coordinate_field(record, "longitude").map_err(malformed)?;

    let location = text_field(record, "location")
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or("Unknown")
        .to_string();
    let href = text_field(record, "href").unwrap_or_default();
    let summary = text_field(record, "summary").unwrap_or_default().trim().to_string();

    Ok(EventRecord {
        title,
        location,
        latitude,
        longitude,
        start_time,
        end_time,
        link: format!("{CALENDAR_BASE}{}", href.trim_start_matches('/')),
        summary,
        starts_at,
        ends_at,
    })
}

/// Absent, null, zero and empty values are "no timestamp"; anything else must
/// be an integral Unix timestamp.
fn timestamp_field(record: &Map<String, Value>, key: &str) -> Result<Option<i64>, String> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(false)) => Ok(None),
        Some(Value::Number(n)) => {
            let ts = n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
                .ok_or_else(|| format!("`{key}` is not a usable timestamp"))?;
            Ok((ts != 0).then_some(ts))
        }
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(|ts| (ts != 0).then_some(ts))
            .map_err(|_| format!("`{key}` is not a Unix timestamp (got `{s}`)")),
        Some(other) => Err(format!("`{key}` has unexpected type: {other}")),
    }
}

fn display_time(ts: Option<i64>, offset: FixedOffset) -> Result<String, String> {
    let Some(ts) = ts else {
        return Ok(NOT_AVAILABLE.to_string());
    };
    let utc = DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| format!("timestamp {ts} is out of range"))?;
    Ok(utc.with_timezone(&offset).format(DISPLAY_FORMAT).to_string())
}

fn coordinate_field(record: &Map<String, Value>, key: &str) -> Result<Coordinate, String> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(Coordinate::NotAvailable),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Coordinate::Value)
            .ok_or_else(|| format!("`{key}` is not a finite number")),
        Some(Value::String(s)) if s.trim().is_empty() || s.trim() == NOT_AVAILABLE => {
            Ok(Coordinate::NotAvailable)
        }
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Coordinate::Value)
            .map_err(|_| format!("`{key}` is not numeric (got `{s}`)")),
        Some(other) => Err(format!("`{key}` has unexpected type: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::testing::StaticSource;
    use serde_json::json;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn event(title: &str, ts_start: Value) -> Value {
        json!({
            "title": title,
            "location": "MSC",
            "latitude": 30.6123,
            "longitude": "-96.3412",
            "ts_start": ts_start,
            "ts_end": 1_700_003_600,
            "href": "event/123",
            "summary": "  Come by!  "
        })
    }

    #[test]
    fn flattens_day_groups_and_sorts_by_start() {
        let payload = json!({
            "events": {
                "2023-11-15": [event("Late", json!(1_700_010_000))],
                "2023-11-14": [event("Early", json!(1_700_000_000))]
            }
        });
        let events = parse_events(&payload, utc(), 10);
        let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Early", "Late"]);
        let first = &events[0];
        assert_eq!(first.start_time, "2023-11-14 10:13 PM");
        assert_eq!(first.latitude, Coordinate::Value(30.6123));
        assert_eq!(first.longitude, Coordinate::Value(-96.3412));
        assert_eq!(first.link, "https://calendar.tamu.edu/live/event/123");
        assert_eq!(first.summary, "Come by!");
    }

    #[test]
    fn missing_start_becomes_sentinel_not_a_drop() {
        let mut items: Vec<Value> = (0..4)
            .map(|i| event(&format!("Event {i}"), json!(1_700_000_000 + i * 60)))
            .collect();
        let mut undated = event("Undated", Value::Null);
        undated.as_object_mut().unwrap().remove("ts_start");
        items.insert(2, undated);

        let events = parse_events(&Value::Array(items), utc(), 20);
        assert_eq!(events.len(), 5);
        let last = events.last().unwrap();
        assert_eq!(last.title, "Undated");
        assert_eq!(last.start_time, NOT_AVAILABLE);
        assert_eq!(last.starts_at, None);
    }

    #[test]
    fn malformed_records_are_dropped_individually() {
        let mut bad_coord = event("Bad coordinate", json!(1_700_000_100));
        bad_coord["latitude"] = json!("north-ish");
        let payload = json!([
            event("Good", json!(1_700_000_000)),
            event("Bad timestamp", json!("tomorrow")),
            bad_coord,
            event("Out of range", json!(i64::MAX)),
            42
        ]);
        let events = parse_events(&payload, utc(), 20);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].title, "Good");
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let events = parse_events(&json!([{"ts_start": 1_700_000_000}]), utc(), 20);
        let only = &events[0];
        assert_eq!(only.title, "Untitled Event");
        assert_eq!(only.location, "Unknown");
        assert_eq!(only.latitude, Coordinate::NotAvailable);
        assert_eq!(only.end_time, NOT_AVAILABLE);
        assert_eq!(only.link, CALENDAR_BASE);
    }

    #[test]
    fn truncates_after_sorting() {
        let items: Vec<Value> = (0..5)
            .rev()
            .map(|i| event(&format!("E{i}"), json!(1_700_000_000 + i * 3600)))
            .collect();
        let events = parse_events(&Value::Array(items), utc(), 2);
        let titles: Vec<_> = events.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["E0", "E1"]);
    }

    #[test]
    fn applies_display_offset() {
        let central = FixedOffset::east_opt(-6 * 3600).unwrap();
        let events = parse_events(&json!([event("Yell Practice", json!(1_700_000_000))]), central, 5);
        assert_eq!(events[0].start_time, "2023-11-14 04:13 PM");
    }

    #[test]
    fn unexpected_shape_is_empty() {
        assert!(parse_events(&json!({"data": []}), utc(), 5).is_empty());
        assert!(parse_events(&json!("nope"), utc(), 5).is_empty());
    }

    #[tokio::test]
    async fn fetch_honours_limit() {
        let items: Vec<Value> = (0..6)
            .map(|i| event(&format!("E{i}"), json!(1_700_000_000 + i)))
            .collect();
        let adapter = EventsAdapter::new(
            StaticSource::json(Value::Array(items)),
            Duration::from_secs(1),
            utc(),
        );
        assert_eq!(adapter.fetch(3).await.len(), 3);
    }
}
