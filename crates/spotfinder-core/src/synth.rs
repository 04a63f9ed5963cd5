use std::cmp::Ordering;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::engine::{OccupancyEstimator, PlaceholderEstimator};
use crate::error::DegradedError;
use crate::llm::TextGenerator;
use crate::model::{OccupancyStatus, RankedResult, Snapshot, SourceKind};

/// Maximum number of rows an answer may carry.
pub const MAX_RESULTS: usize = 3;

const SYSTEM_PROMPT: &str = "You help students find an uncrowded spot on campus using live occupancy data. \
Respond ONLY with a JSON array of at most 3 objects. Each object must have exactly these keys: \
\"name\" (string), \"percentFull\" (number), \"availableSeats\" (integer). \
Do not include prose, explanations, markdown or code fences.";

/// Opening bracket of an array of objects, or of an empty array.
static ARRAY_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*[{\]]").expect("valid array regex"));

/// Turns a free-form request into at most [`MAX_RESULTS`] well-typed rows.
pub struct QuerySynthesizer {
    generator: Arc<dyn TextGenerator>,
    timeout: Duration,
    estimator: Arc<dyn OccupancyEstimator>,
}

impl QuerySynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>, timeout: Duration) -> Self {
        Self::with_estimator(generator, timeout, Arc::new(PlaceholderEstimator))
    }

    pub fn with_estimator(
        generator: Arc<dyn TextGenerator>,
        timeout: Duration,
        estimator: Arc<dyn OccupancyEstimator>,
    ) -> Self {
        Self {
            generator,
            timeout,
            estimator,
        }
    }

    /// Ask the generator, repair its answer, or fall back to local ranking.
    /// Never fails and never returns more than [`MAX_RESULTS`] rows.
    #[instrument(
        name = "answer_query",
        skip(self, prompt, snapshot),
        fields(provider = self.generator.label(), prompt_len = prompt.len())
    )]
    pub async fn answer_query(&self, prompt: &str, snapshot: &Snapshot) -> Vec<RankedResult> {
        let user = user_message(prompt, snapshot);
        let outcome = tokio::time::timeout(self.timeout, self.generator.generate(SYSTEM_PROMPT, &user)).await;

        let failure = match outcome {
            Ok(Ok(raw)) => {
                debug_log_payload(self.generator.label(), &raw);
                match repair_response(&raw) {
                    Some(results) => {
                        debug!(count = results.len(), "generator answer accepted");
                        return results;
                    }
                    None => DegradedError::generation("response contained no parseable JSON array"),
                }
            }
            Ok(Err(err)) => DegradedError::generation(err),
            Err(_) => DegradedError::generation(format!(
                "no response within {}",
                humantime::format_duration(self.timeout)
            )),
        };
        failure.log();
        fallback_ranking(snapshot, self.estimator.as_ref())
    }
}

fn user_message(prompt: &str, snapshot: &Snapshot) -> String {
    format!(
        "Live campus occupancy data (as of {}):\n{}\n\nQuestion: {}",
        snapshot.as_of.to_rfc3339(),
        grounding_payload(snapshot),
        prompt.trim()
    )
}

#[derive(Serialize)]
struct GroundingSample<'a> {
    name: &'a str,
    current: Option<u32>,
    capacity: u32,
    percent_full: Option<f64>,
    available_seats: u32,
    status: OccupancyStatus,
}

#[derive(Serialize)]
struct GroundingEvent<'a> {
    title: &'a str,
    location: &'a str,
    start_time: &'a str,
    end_time: &'a str,
}

#[derive(Serialize)]
struct Grounding<'a> {
    recreation: Vec<GroundingSample<'a>>,
    libraries: Vec<GroundingSample<'a>>,
    events: Vec<GroundingEvent<'a>>,
}

/// Serialized snapshot embedded in the user turn.
pub fn grounding_payload(snapshot: &Snapshot) -> String {
    let samples = |kind: SourceKind| {
        snapshot
            .samples_of(kind)
            .map(|s| GroundingSample {
                name: &s.name,
                current: s.current_count,
                capacity: s.capacity,
                percent_full: s.percent_full,
                available_seats: s.available_seats(),
                status: s.status(),
            })
            .collect::<Vec<_>>()
    };
    let grounding = Grounding {
        recreation: samples(SourceKind::Recreation),
        libraries: samples(SourceKind::Library),
        events: snapshot
            .events
            .iter()
            .map(|e| GroundingEvent {
                title: &e.title,
                location: &e.location,
                start_time: &e.start_time,
                end_time: &e.end_time,
            })
            .collect(),
    };
    serde_json::to_string(&grounding).unwrap_or_else(|_| "{}".to_string())
}

/// Strict parse of the whole text, then of the first embedded array of
/// objects (strict, then relaxed JSON5). `None` when nothing qualifies.
pub fn repair_response(raw: &str) -> Option<Vec<RankedResult>> {
    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw.trim()) {
        return Some(coerce_results(&items));
    }

    ARRAY_START
        .find_iter(raw)
        .find_map(|start| embedded_array(&raw[start.start()..]))
        .map(|items| coerce_results(&items))
}

/// Array beginning at the first byte of `tail`. Trailing text is ignored.
fn embedded_array(tail: &str) -> Option<Vec<Value>> {
    let strict = serde_json::Deserializer::from_str(tail)
        .into_iter::<Value>()
        .next()
        .and_then(Result::ok);
    let parsed = strict.or_else(|| {
        tail.match_indices(']')
            .find_map(|(end, _)| json5::from_str::<Value>(&tail[..=end]).ok())
    });
    match parsed {
        Some(Value::Array(items)) if items.is_empty() || items.iter().any(Value::is_object) => {
            Some(items)
        }
        _ => None,
    }
}

/// Coerce the first [`MAX_RESULTS`] elements; unusable fields take their
/// zero value instead of rejecting the row.
pub fn coerce_results(items: &[Value]) -> Vec<RankedResult> {
    static EMPTY: Lazy<Map<String, Value>> = Lazy::new(Map::new);
    items
        .iter()
        .take(MAX_RESULTS)
        .map(|item| {
            let record = item.as_object().unwrap_or(&EMPTY);
            RankedResult {
                name: coerce_name(lookup(record, "name", "name")),
                percent_full: coerce_percent(lookup(record, "percentFull", "percent_full")),
                available_seats: coerce_seats(lookup(record, "availableSeats", "available_seats")),
            }
        })
        .collect()
}

fn lookup<'a>(record: &'a Map<String, Value>, key: &str, alias: &str) -> Option<&'a Value> {
    record.get(key).or_else(|| record.get(alias))
}

fn coerce_name(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}

fn coerce_percent(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|p| p.is_finite())
        .map_or(0.0, |p| p.clamp(0.0, 100.0))
}

fn coerce_seats(value: Option<&Value>) -> u32 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() && v > 0.0 => v.min(f64::from(u32::MAX)).trunc() as u32,
        _ => 0,
    }
}

/// Deterministic answer used whenever the generator cannot be trusted.
///
/// Open samples with a known percentage and every event (zero seats, estimated
/// percentage) are merged, then ordered by available seats descending and
/// fill percentage ascending.
pub fn fallback_ranking(snapshot: &Snapshot, estimator: &dyn OccupancyEstimator) -> Vec<RankedResult> {
    let samples = snapshot
        .samples
        .iter()
        .filter(|s| !s.is_closed)
        .filter_map(|s| {
            s.percent_full.map(|pct| RankedResult {
                name: s.name.clone(),
                percent_full: pct,
                available_seats: s.available_seats(),
            })
        });
    let events = snapshot.events.iter().map(|e| RankedResult {
        name: e.location.clone(),
        percent_full: estimator.estimate(e),
        available_seats: 0,
    });

    let mut candidates: Vec<RankedResult> = samples.chain(events).collect();
    candidates.sort_by(|a, b| {
        b.available_seats.cmp(&a.available_seats).then_with(|| {
            a.percent_full
                .partial_cmp(&b.percent_full)
                .unwrap_or(Ordering::Equal)
        })
    });
    candidates.truncate(MAX_RESULTS);
    candidates
}

fn debug_log_payload(provider: &str, payload: &str) {
    if debug_enabled() {
        warn!("{} raw generator payload: {}", provider, payload);
    }
}

fn debug_enabled() -> bool {
    matches!(env::var("SPOTFINDER_DEBUG"), Ok(val) if !val.is_empty() && val != "0")
}
