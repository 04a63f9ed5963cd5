pub mod cache;
pub mod engine;
pub mod error;
pub mod llm;
pub mod model;
pub mod report;
pub mod service;
pub mod settings;
pub mod sources;
pub mod synth;

pub use cache::SnapshotCache;
pub use engine::{AggregationEngine, OccupancyEstimator, PlaceholderEstimator, SortOrder};
pub use error::DegradedError;
pub use llm::{build_generator, LlmSettings, NoopGenerator, TextGenerator};
pub use model::{
    Confidence, Coordinate, EventRecord, LocationOccupancy, OccupancySample, OccupancyStatus,
    RankedResult, RankedSpot, Snapshot, SourceKind, SpotCategory,
};
pub use report::{
    render_answer, render_events, render_locations, render_overview, render_ranked_spots,
    OutputFormat,
};
pub use service::{OccupancyService, QuickSummary};
pub use settings::{AppSettings, RankingSettings, SettingsError, SourceSettings};
pub use sources::{FileJsonSource, HttpJsonSource, JsonSource};
pub use synth::QuerySynthesizer;
