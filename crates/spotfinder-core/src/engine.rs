use std::cmp::Ordering;
use std::sync::Arc;

use tracing::{debug, info, instrument};
use xxhash_rust::xxh3::xxh3_64;

use crate::model::{
    Confidence, EventRecord, LocationOccupancy, OccupancySample, OccupancyStatus, RankedSpot,
    Snapshot, SourceKind, SpotCategory,
};
use crate::sources::{EventsAdapter, LibraryAdapter, RecreationAdapter};

/// Produces a fill percentage for locations whose true occupancy is unknown.
pub trait OccupancyEstimator: Send + Sync {
    /// Estimated percentage in `0.0..100.0`.
    fn estimate(&self, event: &EventRecord) -> f64;
}

/// Stand-in estimate for calendar events.
///
/// Values are spread over `[0, 100)` like a uniform draw, but derived from an
/// xxh3 hash of the title and start timestamp so the same event reports the
/// same number across refreshes. Always surfaced as [`Confidence::Estimated`].
#[derive(Debug, Default, Clone, Copy)]
pub struct PlaceholderEstimator;

impl OccupancyEstimator for PlaceholderEstimator {
    fn estimate(&self, event: &EventRecord) -> f64 {
        let mut key = event.title.as_bytes().to_vec();
        key.extend_from_slice(&event.starts_at.unwrap_or_default().to_le_bytes());
        (xxh3_64(&key) % 1000) as f64 / 10.0
    }
}

/// Assembles snapshots from the three adapters.
pub struct AggregationEngine {
    recreation: RecreationAdapter,
    library: LibraryAdapter,
    events: EventsAdapter,
    events_limit: usize,
}

impl AggregationEngine {
    pub fn new(
        recreation: RecreationAdapter,
        library: LibraryAdapter,
        events: EventsAdapter,
        events_limit: usize,
    ) -> Self {
        Self {
            recreation,
            library,
            events,
            events_limit,
        }
    }

    /// Fetch every source concurrently and assemble a fresh snapshot.
    #[instrument(name = "build_snapshot", skip(self))]
    pub async fn build_snapshot(&self) -> Snapshot {
        let (recreation, library, events) = tokio::join!(
            self.recreation.fetch(),
            self.library.fetch(),
            self.events.fetch(self.events_limit),
        );
        info!(
            recreation = recreation.len(),
            library = library.len(),
            events = events.len(),
            "snapshot assembled"
        );
        let mut samples = recreation;
        samples.extend(library);
        Snapshot::new(samples, events)
    }
}

/// Least-occupied open spots of a category, lowest percentage first.
///
/// Closed, full and unknown-occupancy entries are excluded. The sort is
/// stable, so ties keep adapter order.
pub fn rank_best_spots(snapshot: &Snapshot, category: SpotCategory, limit: usize) -> Vec<RankedSpot> {
    let mut candidates: Vec<(&OccupancySample, f64)> = snapshot
        .samples_of(category.source_kind())
        .filter_map(|sample| match sample.status() {
            OccupancyStatus::Quiet | OccupancyStatus::Moderate | OccupancyStatus::Busy => {
                sample.percent_full.map(|pct| (sample, pct))
            }
            _ => None,
        })
        .collect();
    candidates.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    debug!(?category, candidates = candidates.len(), limit, "ranked best spots");

    candidates
        .into_iter()
        .take(limit)
        .map(|(sample, pct)| RankedSpot {
            name: sample.name.clone(),
            percent_full: pct,
            status: sample.status(),
            current_count: sample.current_count.unwrap_or_default(),
            capacity: sample.capacity,
            available_seats: sample.available_seats(),
        })
        .collect()
}

/// Every sample plus every event as `{location, percent_full, confidence}`.
pub fn all_locations(snapshot: &Snapshot, estimator: &dyn OccupancyEstimator) -> Vec<LocationOccupancy> {
    let measured = snapshot.samples.iter().map(|sample| LocationOccupancy {
        location: sample.name.clone(),
        percent_full: sample.percent_full,
        confidence: Confidence::Measured,
    });
    let estimated = snapshot.events.iter().map(|event| LocationOccupancy {
        location: event.location.clone(),
        percent_full: Some(estimator.estimate(event)),
        confidence: Confidence::Estimated,
    });
    measured.chain(estimated).collect()
}

/// Ordering for per-source listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Most occupied first; unknown percentages last.
    #[default]
    Capacity,
    Name,
}

/// Samples of one source, sorted for display.
pub fn list_samples(snapshot: &Snapshot, kind: SourceKind, order: SortOrder) -> Vec<OccupancySample> {
    let mut samples: Vec<OccupancySample> = snapshot.samples_of(kind).cloned().collect();
    match order {
        SortOrder::Capacity => samples.sort_by(|a, b| {
            let a = a.percent_full.unwrap_or(f64::NEG_INFINITY);
            let b = b.percent_full.unwrap_or(f64::NEG_INFINITY);
            b.partial_cmp(&a).unwrap_or(Ordering::Equal)
        }),
        SortOrder::Name => samples.sort_by(|a, b| a.name.cmp(&b.name)),
    }
    samples
}

/// Shared handle type used by the service layer.
pub type SharedEstimator = Arc<dyn OccupancyEstimator>;
