//! Projection processor for feeding ledger entries to projections.

use futures_util::StreamExt;
use stock_store::{MovementRecord, StockStore};

use crate::Result;
use crate::projection::Projection;

/// Replays the movement ledger into projections.
///
/// The processor supports:
/// - Catch-up: streams the ledger and delivers entries a projection has not seen
/// - Single entry delivery: hands a freshly recorded movement to every projection
/// - Rebuild: resets all projections and replays from the start of the ledger
pub struct ProjectionProcessor<S: StockStore> {
    store: S,
    projections: Vec<Box<dyn Projection>>,
}

impl<S: StockStore> ProjectionProcessor<S> {
    /// Creates a new processor over the given stock store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            projections: Vec::new(),
        }
    }

    /// Registers a projection with this processor.
    pub fn register(&mut self, projection: Box<dyn Projection>) {
        self.projections.push(projection);
    }

    /// Returns the number of registered projections.
    pub fn projection_count(&self) -> usize {
        self.projections.len()
    }

    /// Returns a reference to the underlying stock store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs catch-up processing: streams the whole ledger and delivers each
    /// entry to every projection that hasn't already seen it.
    #[tracing::instrument(skip(self))]
    pub async fn run_catch_up(&self) -> Result<u64> {
        let mut stream = self.store.stream_movements().await?;
        let mut index: u64 = 0;

        while let Some(result) = stream.next().await {
            let record = result?;
            index += 1;

            for projection in &self.projections {
                let pos = projection.position().await;
                if pos.movements_processed < index {
                    projection.handle(&record).await?;
                    metrics::counter!("projections_movements_processed").increment(1);
                }
            }
        }

        tracing::info!(movements_processed = index, "catch-up complete");

        Ok(index)
    }

    /// Delivers a single ledger entry to all registered projections.
    #[tracing::instrument(skip(self, record), fields(movement_id = %record.movement_id))]
    pub async fn process_movement(&self, record: &MovementRecord) -> Result<()> {
        for projection in &self.projections {
            projection.handle(record).await?;
        }
        Ok(())
    }

    /// Resets all projections and replays the ledger from the start.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_all(&self) -> Result<u64> {
        for projection in &self.projections {
            tracing::debug!(projection = projection.name(), "resetting projection");
            projection.reset().await?;
        }
        self.run_catch_up().await
    }
}
