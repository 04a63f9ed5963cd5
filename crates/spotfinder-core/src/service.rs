use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, instrument};

use crate::cache::SnapshotCache;
use crate::engine::{self, AggregationEngine, PlaceholderEstimator, SharedEstimator, SortOrder};
use crate::llm::{build_generator, LlmSettings, TextGenerator};
use crate::model::{
    EventRecord, LocationOccupancy, OccupancySample, RankedResult, RankedSpot, Snapshot,
    SourceKind, SpotCategory,
};
use crate::settings::{AppSettings, RankingSettings};
use crate::sources::{source_for, EventsAdapter, LibraryAdapter, RecreationAdapter};
use crate::synth::QuerySynthesizer;

/// Best study and workout spot in one view.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuickSummary {
    pub as_of: String,
    pub best_study: Option<RankedSpot>,
    pub best_workout: Option<RankedSpot>,
}

/// Entry point used by front ends: owns the cache and answers every query
/// against the currently published snapshot.
pub struct OccupancyService {
    cache: SnapshotCache,
    synthesizer: QuerySynthesizer,
    estimator: SharedEstimator,
    ranking: RankingSettings,
}

impl OccupancyService {
    pub fn new(
        cache: SnapshotCache,
        generator: Arc<dyn TextGenerator>,
        generation_timeout: Duration,
        ranking: RankingSettings,
    ) -> Self {
        let estimator: SharedEstimator = Arc::new(PlaceholderEstimator);
        Self {
            synthesizer: QuerySynthesizer::with_estimator(
                generator,
                generation_timeout,
                Arc::clone(&estimator),
            ),
            cache,
            estimator,
            ranking,
        }
    }

    /// Wire adapters, cache and generator from loaded settings.
    pub fn from_settings(settings: &AppSettings, llm: &LlmSettings) -> Result<Self> {
        let sources = &settings.sources;
        let timeout = sources.fetch_timeout()?;
        let offset = sources.display_offset()?;

        let recreation = source_for(&sources.recreation_url, timeout)
            .context("invalid recreation source")?;
        let library = source_for(&sources.library_url, timeout).context("invalid library source")?;
        let events = source_for(&sources.events_url, timeout).context("invalid events source")?;

        let engine = AggregationEngine::new(
            RecreationAdapter::new(recreation, timeout),
            LibraryAdapter::new(library, timeout),
            EventsAdapter::new(events, timeout, offset),
            sources.events_limit,
        );
        let generator = build_generator(llm).context("failed to configure text generator")?;
        info!(provider = generator.label(), "occupancy service configured");

        Ok(Self::new(
            SnapshotCache::new(engine),
            generator,
            llm.timeout(),
            settings.ranking.clone(),
        ))
    }

    /// Currently published snapshot; never triggers a fetch.
    pub async fn get_snapshot(&self) -> Arc<Snapshot> {
        self.cache.current().await
    }

    pub async fn refresh(&self) -> Arc<Snapshot> {
        self.cache.refresh().await
    }

    /// Least-occupied spots of `category`; `None` uses the configured limit.
    pub async fn rank_best_spots(&self, category: SpotCategory, limit: Option<usize>) -> Vec<RankedSpot> {
        let limit = limit.unwrap_or_else(|| self.default_limit(category));
        let snapshot = self.get_snapshot().await;
        engine::rank_best_spots(&snapshot, category, limit)
    }

    #[instrument(name = "service_answer_query", skip(self, prompt))]
    pub async fn answer_query(&self, prompt: &str) -> Vec<RankedResult> {
        let snapshot = self.get_snapshot().await;
        self.synthesizer.answer_query(prompt, &snapshot).await
    }

    pub async fn list_all_locations_with_occupancy(&self) -> Vec<LocationOccupancy> {
        let snapshot = self.get_snapshot().await;
        engine::all_locations(&snapshot, self.estimator.as_ref())
    }

    pub async fn quick_summary(&self) -> QuickSummary {
        let snapshot = self.get_snapshot().await;
        let best = |category| engine::rank_best_spots(&snapshot, category, 1).into_iter().next();
        QuickSummary {
            as_of: snapshot.as_of.to_rfc3339(),
            best_study: best(SpotCategory::Study),
            best_workout: best(SpotCategory::Workout),
        }
    }

    pub async fn list_samples(&self, kind: SourceKind, order: SortOrder) -> Vec<OccupancySample> {
        let snapshot = self.get_snapshot().await;
        engine::list_samples(&snapshot, kind, order)
    }

    /// Upcoming events in start order, at most `limit` of them.
    pub async fn events(&self, limit: Option<usize>) -> Vec<EventRecord> {
        let snapshot = self.get_snapshot().await;
        let limit = limit.unwrap_or(snapshot.events.len());
        snapshot.events.iter().take(limit).cloned().collect()
    }

    fn default_limit(&self, category: SpotCategory) -> usize {
        match category {
            SpotCategory::Study => self.ranking.study_limit,
            SpotCategory::Workout => self.ranking.workout_limit,
        }
    }
}
