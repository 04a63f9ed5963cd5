use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{count_field, fetch_payload, shape_of, text_field, JsonSource};
use crate::error::DegradedError;
use crate::model::{OccupancySample, SourceKind};

/// Facility counter feed: a JSON array of `LocationName` / `LastCount` /
/// `TotalCapacity` / `IsClosed` / `LastUpdatedDateAndTime` objects.
pub struct RecreationAdapter {
    source: Arc<dyn JsonSource>,
    timeout: Duration,
}

impl RecreationAdapter {
    pub fn new(source: Arc<dyn JsonSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    #[instrument(name = "fetch_recreation", skip(self), fields(source = %self.source.describe()))]
    pub async fn fetch(&self) -> Vec<OccupancySample> {
        let Some(payload) = fetch_payload(SourceKind::Recreation, self.source.as_ref(), self.timeout).await
        else {
            return Vec::new();
        };
        let samples = parse_facilities(&payload);
        debug!(count = samples.len(), "recreation samples parsed");
        samples
    }
}

/// Normalize a raw recreation payload. A non-array payload yields nothing.
pub fn parse_facilities(payload: &Value) -> Vec<OccupancySample> {
    let Some(items) = payload.as_array() else {
        DegradedError::source_unavailable(
            SourceKind::Recreation,
            format!("expected a JSON array, got {}", shape_of(payload)),
        )
        .log();
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| match parse_facility(item) {
            Ok(sample) => Some(sample),
            Err(err) => {
                err.log();
                None
            }
        })
        .collect()
}

fn parse_facility(item: &Value) -> Result<OccupancySample, DegradedError> {
    let record = item
        .as_object()
        .ok_or_else(|| DegradedError::malformed(SourceKind::Recreation, item.to_string(), "not an object"))?;
    let name = text_field(record, "LocationName").unwrap_or("Unknown").trim();
    let malformed = |reason: String| DegradedError::malformed(SourceKind::Recreation, name, reason);

    let current = count_field(record, "LastCount").map_err(malformed)?;
    let capacity = count_field(record, "TotalCapacity").map_err(malformed)?.unwrap_or(1);
    let is_closed = closed_flag(record);
    let last_updated = text_field(record, "LastUpdatedDateAndTime").and_then(parse_timestamp);

    Ok(OccupancySample::new(
        SourceKind::Recreation,
        name,
        current,
        capacity,
        is_closed,
        last_updated,
    ))
}

fn closed_flag(record: &Map<String, Value>) -> bool {
    match record.get("IsClosed") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
        _ => false,
    }
}

/// Parse `2024-10-01T14:05:33.123Z`-style stamps. Fractional seconds and a
/// trailing `Z` are ignored.
pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim().trim_end_matches('Z');
    let whole = trimmed.split('.').next().unwrap_or(trimmed);
    NaiveDateTime::parse_from_str(whole, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(whole, "%Y-%m-%d %H:%M:%S"))
        .ok()
}
