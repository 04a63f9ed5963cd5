use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value};

use crate::error::DegradedError;
use crate::model::SourceKind;

pub mod events;
pub mod library;
pub mod recreation;

pub use events::EventsAdapter;
pub use library::LibraryAdapter;
pub use recreation::RecreationAdapter;

/// Transport that yields one raw JSON document per call.
///
/// Adapters own the schema handling; implementations only move bytes.
#[async_trait]
pub trait JsonSource: Send + Sync {
    /// Human-readable origin, used in log lines.
    fn describe(&self) -> String;

    async fn fetch_json(&self) -> Result<Value>;
}

/// Polls an HTTP endpoint with `GET`.
#[derive(Debug, Clone)]
pub struct HttpJsonSource {
    http: Client,
    url: String,
}

impl HttpJsonSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent("spotfinder/0.6")
            .timeout(timeout)
            .build()
            .context("failed to build source HTTP client")?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl JsonSource for HttpJsonSource {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn fetch_json(&self) -> Result<Value> {
        let response = self
            .http
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", self.url, status, truncate(&body, 200));
        }

        response
            .json()
            .await
            .with_context(|| format!("{} did not return valid JSON", self.url))
    }
}

/// Reads a captured payload from disk (`file://` locations).
#[derive(Debug, Clone)]
pub struct FileJsonSource {
    path: PathBuf,
}

impl FileJsonSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl JsonSource for FileJsonSource {
    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }

    async fn fetch_json(&self) -> Result<Value> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("failed to read payload at {}", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid JSON payload at {}", self.path.display()))
    }
}

/// Pick a transport for a configured location: `file://` paths are read from
/// disk, anything else is treated as an HTTP URL.
pub fn source_for(location: &str, timeout: Duration) -> Result<Arc<dyn JsonSource>> {
    let location = location.trim();
    if location.is_empty() {
        bail!("source location must not be empty");
    }
    if let Some(path) = location.strip_prefix("file://") {
        return Ok(Arc::new(FileJsonSource::new(path)));
    }
    if !(location.starts_with("http://") || location.starts_with("https://")) {
        bail!("unsupported source location `{location}` (expected http(s):// or file://)");
    }
    Ok(Arc::new(HttpJsonSource::new(location, timeout)?))
}

/// Run one bounded fetch. Any failure is logged as `SourceUnavailable` and
/// reported as `None`.
pub(crate) async fn fetch_payload(
    kind: SourceKind,
    source: &dyn JsonSource,
    timeout: Duration,
) -> Option<Value> {
    match tokio::time::timeout(timeout, source.fetch_json()).await {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            DegradedError::source_unavailable(kind, err).log();
            None
        }
        Err(_) => {
            DegradedError::source_unavailable(
                kind,
                format!(
                    "{} timed out after {}",
                    source.describe(),
                    humantime::format_duration(timeout)
                ),
            )
            .log();
            None
        }
    }
}

/// Read a non-negative count. Missing or null is `Ok(None)`; negative values
/// clamp to zero; anything non-numeric is an error.
pub(crate) fn count_field(record: &Map<String, Value>, key: &str) -> Result<Option<u32>, String> {
    match record.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => {
            let raw = n
                .as_i64()
                .map(|v| v as f64)
                .or_else(|| n.as_f64())
                .ok_or_else(|| format!("`{key}` is not a finite number"))?;
            Ok(Some(clamp_count(raw)))
        }
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|v| Some(clamp_count(v)))
            .map_err(|_| format!("`{key}` is not numeric (got `{s}`)")),
        Some(other) => Err(format!("`{key}` has unexpected type: {other}")),
    }
}

fn clamp_count(raw: f64) -> u32 {
    if raw.is_nan() || raw <= 0.0 {
        0
    } else if raw >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        raw.trunc() as u32
    }
}

pub(crate) fn text_field<'a>(record: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    record.get(key).and_then(Value::as_str)
}

/// Article-prefixed JSON type name for error messages.
pub(crate) fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory source returning a fixed payload or error.
    pub struct StaticSource {
        payload: Result<Value, String>,
        delay: Option<Duration>,
        pub calls: AtomicUsize,
    }

    impl StaticSource {
        pub fn json(payload: Value) -> Arc<Self> {
            Arc::new(Self {
                payload: Ok(payload),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn failing(message: &str) -> Arc<Self> {
            Arc::new(Self {
                payload: Err(message.to_string()),
                delay: None,
                calls: AtomicUsize::new(0),
            })
        }

        pub fn slow(payload: Value, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                payload: Ok(payload),
                delay: Some(delay),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl JsonSource for StaticSource {
        fn describe(&self) -> String {
            "static".into()
        }

        async fn fetch_json(&self) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.payload {
                Ok(value) => Ok(value.clone()),
                Err(message) => Err(anyhow::anyhow!(message.clone())),
            }
        }
    }
}
