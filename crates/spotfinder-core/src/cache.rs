use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::engine::AggregationEngine;
use crate::model::Snapshot;

/// Owns the latest snapshot. Readers get a shared immutable handle; a refresh
/// builds the replacement off-lock and swaps it in whole.
pub struct SnapshotCache {
    engine: AggregationEngine,
    current: RwLock<Arc<Snapshot>>,
}

impl SnapshotCache {
    /// Start with an empty snapshot; nothing is fetched until [`refresh`](Self::refresh).
    pub fn new(engine: AggregationEngine) -> Self {
        Self::with_snapshot(engine, Snapshot::empty())
    }

    pub fn with_snapshot(engine: AggregationEngine, snapshot: Snapshot) -> Self {
        Self {
            engine,
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The cached snapshot, without touching any source.
    pub async fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Rebuild from every source and publish the result.
    #[instrument(name = "refresh_snapshot", skip(self))]
    pub async fn refresh(&self) -> Arc<Snapshot> {
        let fresh = Arc::new(self.engine.build_snapshot().await);
        let mut slot = self.current.write().await;
        *slot = Arc::clone(&fresh);
        debug!(as_of = %fresh.as_of, samples = fresh.samples.len(), "snapshot published");
        fresh
    }
}
