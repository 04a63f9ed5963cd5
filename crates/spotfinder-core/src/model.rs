use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

/// Display placeholder used wherever an upstream value is absent.
pub const NOT_AVAILABLE: &str = "N/A";

/// Upstream feed a record originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Recreation,
    Library,
    Event,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Recreation => "recreation",
            Self::Library => "library",
            Self::Event => "event",
        };
        f.write_str(label)
    }
}

/// Qualitative occupancy buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccupancyStatus {
    Closed,
    Quiet,
    Moderate,
    Busy,
    Full,
    Unknown,
}

impl OccupancyStatus {
    pub const QUIET_BELOW: f64 = 40.0;
    pub const MODERATE_BELOW: f64 = 70.0;
    pub const BUSY_BELOW: f64 = 90.0;

    /// Classify a fill percentage. Half-open intervals: `[0,40)`, `[40,70)`,
    /// `[70,90)`, `[90,..)`.
    pub fn classify(percent: Option<f64>, is_closed: bool) -> Self {
        if is_closed {
            return Self::Closed;
        }
        match percent {
            None => Self::Unknown,
            Some(p) if p.is_nan() => Self::Unknown,
            Some(p) if p < Self::QUIET_BELOW => Self::Quiet,
            Some(p) if p < Self::MODERATE_BELOW => Self::Moderate,
            Some(p) if p < Self::BUSY_BELOW => Self::Busy,
            Some(_) => Self::Full,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Quiet => "quiet",
            Self::Moderate => "moderate",
            Self::Busy => "busy",
            Self::Full => "full",
            Self::Unknown => "unknown",
        }
    }
}

/// Compute `round(current / capacity * 100, 1)`.
///
/// Returns `None` (unknown) when the count is missing or the capacity is not
/// positive.
pub fn fill_percentage(current: Option<u32>, capacity: u32) -> Option<f64> {
    let current = current?;
    if capacity == 0 {
        return None;
    }
    let raw = f64::from(current) / f64::from(capacity) * 100.0;
    Some(round_tenth(raw))
}

pub(crate) fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// One physical location's state at fetch time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccupancySample {
    pub source_kind: SourceKind,
    pub name: String,
    pub current_count: Option<u32>,
    pub capacity: u32,
    /// `None` means unknown; see [`fill_percentage`].
    pub percent_full: Option<f64>,
    pub is_closed: bool,
    pub last_updated: Option<NaiveDateTime>,
}

impl OccupancySample {
    /// Build a sample, deriving `percent_full` from the count and capacity.
    pub fn new(
        source_kind: SourceKind,
        name: impl Into<String>,
        current_count: Option<u32>,
        capacity: u32,
        is_closed: bool,
        last_updated: Option<NaiveDateTime>,
    ) -> Self {
        Self {
            source_kind,
            name: name.into(),
            current_count,
            capacity,
            percent_full: fill_percentage(current_count, capacity),
            is_closed,
            last_updated,
        }
    }

    pub fn status(&self) -> OccupancyStatus {
        OccupancyStatus::classify(self.percent_full, self.is_closed)
    }

    /// Free seats, `max(capacity - current, 0)`. Zero when the count is unknown.
    pub fn available_seats(&self) -> u32 {
        match self.current_count {
            Some(current) => self.capacity.saturating_sub(current),
            None => 0,
        }
    }
}

/// Latitude/longitude as published by the calendar feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Coordinate {
    Value(f64),
    NotAvailable,
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::NotAvailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Value(v) => serializer.serialize_f64(*v),
            Self::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(Self::Value)
                .ok_or_else(|| D::Error::custom("coordinate out of range")),
            serde_json::Value::String(s) if s == NOT_AVAILABLE => Ok(Self::NotAvailable),
            serde_json::Value::Null => Ok(Self::NotAvailable),
            other => Err(D::Error::custom(format!("invalid coordinate: {other}"))),
        }
    }
}

/// A calendar entry; its true occupancy is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub title: String,
    pub location: String,
    pub latitude: Coordinate,
    pub longitude: Coordinate,
    /// Display form, or `"N/A"`.
    pub start_time: String,
    pub end_time: String,
    pub link: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub starts_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ends_at: Option<i64>,
}

/// Immutable point-in-time view of every source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Recreation samples followed by library samples, in adapter order.
    pub samples: Vec<OccupancySample>,
    pub events: Vec<EventRecord>,
    pub as_of: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(samples: Vec<OccupancySample>, events: Vec<EventRecord>) -> Self {
        Self::at(samples, events, Utc::now())
    }

    pub fn at(samples: Vec<OccupancySample>, events: Vec<EventRecord>, as_of: DateTime<Utc>) -> Self {
        Self {
            samples,
            events,
            as_of,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn samples_of(&self, kind: SourceKind) -> impl Iterator<Item = &OccupancySample> {
        self.samples.iter().filter(move |s| s.source_kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.events.is_empty()
    }
}

/// External-facing answer row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    pub name: String,
    pub percent_full: f64,
    pub available_seats: u32,
}

/// Which kind of spot a ranking query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpotCategory {
    Study,
    Workout,
}

impl SpotCategory {
    pub fn source_kind(&self) -> SourceKind {
        match self {
            Self::Study => SourceKind::Library,
            Self::Workout => SourceKind::Recreation,
        }
    }

    pub fn default_limit(&self) -> usize {
        match self {
            Self::Study => 3,
            Self::Workout => 5,
        }
    }
}

/// Entry of a best-spot ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSpot {
    pub name: String,
    pub percent_full: f64,
    pub status: OccupancyStatus,
    pub current_count: u32,
    pub capacity: u32,
    pub available_seats: u32,
}

/// How much a reported percentage can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Measured,
    Estimated,
}

/// Row of the all-locations view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationOccupancy {
    pub location: String,
    pub percent_full: Option<f64>,
    pub confidence: Confidence,
}
