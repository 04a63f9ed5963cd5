use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::{count_field, fetch_payload, shape_of, text_field, JsonSource};
use crate::error::DegradedError;
use crate::model::{round_tenth, OccupancySample, SourceKind};

const LAST_UPDATE_KEY: &str = "lastupdate";

/// Library occupancy feed. The payload is either an object keyed by library id
/// (plus a synthetic `lastupdate` entry) or a plain array.
pub struct LibraryAdapter {
    source: Arc<dyn JsonSource>,
    timeout: Duration,
}

impl LibraryAdapter {
    pub fn new(source: Arc<dyn JsonSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    #[instrument(name = "fetch_library", skip(self), fields(source = %self.source.describe()))]
    pub async fn fetch(&self) -> Vec<OccupancySample> {
        let Some(payload) = fetch_payload(SourceKind::Library, self.source.as_ref(), self.timeout).await
        else {
            return Vec::new();
        };
        let samples = parse_libraries(&payload);
        debug!(count = samples.len(), "library samples parsed");
        samples
    }
}

/// Normalize either payload shape into samples.
pub fn parse_libraries(payload: &Value) -> Vec<OccupancySample> {
    let entries: Vec<(Option<&str>, &Value)> = match payload {
        Value::Object(map) => map
            .iter()
            .filter(|(key, value)| key.as_str() != LAST_UPDATE_KEY && value.is_object())
            .map(|(key, value)| (Some(key.as_str()), value))
            .collect(),
        Value::Array(items) => items.iter().map(|value| (None, value)).collect(),
        other => {
            DegradedError::source_unavailable(
                SourceKind::Library,
                format!("expected an object or array, got {}", shape_of(other)),
            )
            .log();
            return Vec::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|(key, value)| match parse_library(key, value) {
            Ok(sample) => Some(sample),
            Err(err) => {
                err.log();
                None
            }
        })
        .collect()
}

fn parse_library(key: Option<&str>, value: &Value) -> Result<OccupancySample, DegradedError> {
    let record: &Map<String, Value> = value.as_object().ok_or_else(|| {
        DegradedError::malformed(SourceKind::Library, value.to_string(), "not an object")
    })?;
    let name = text_field(record, "name")
        .or(key)
        .unwrap_or("Unknown")
        .trim()
        .to_string();
    let malformed = |reason: String| DegradedError::malformed(SourceKind::Library, name.as_str(), reason);

    let max = count_field(record, "max").map_err(malformed)?;
    let remaining = count_field(record, "remaining").map_err(malformed)?;
    let reported = reported_percent(record);

    let current = match (max, remaining) {
        (Some(max), Some(remaining)) => Some(max.saturating_sub(remaining)),
        _ => None,
    };
    let mut sample = OccupancySample::new(
        SourceKind::Library,
        name,
        current,
        max.unwrap_or(1),
        false,
        None,
    );
    if sample.percent_full.is_none() {
        sample.percent_full = reported;
    }
    Ok(sample)
}

fn reported_percent(record: &Map<String, Value>) -> Option<f64> {
    let raw = match record.get("percentfull")? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    raw.is_finite().then(|| round_tenth(raw.max(0.0)))
}
