//! Read-side re-aggregation
//!
//! Persisted rows for one key may be split across many flushes and service
//! instances. Queries fold them back together through a throwaway
//! [`Aggregator`] and return the totals sorted by event name.
//!
//! Only flushed data is visible: records still buffered in a live
//! [`crate::BatchWriter`] appear after their next flush.

use std::time::Duration;

use myko_common::{AggregatedRecord, EventFilter, EventSink, Result, StoredEvent};
use tracing::{debug, instrument};

use crate::aggregator::Aggregator;
use crate::deadline::with_deadline;

/// Capacity hint for the per-query aggregator
const QUERY_CAPACITY: usize = 128;

/// Answers aggregate queries from a sink
pub struct QueryEngine<S> {
    sink: S,
    backend_timeout: Duration,
}

impl<S: EventSink> QueryEngine<S> {
    pub fn new(sink: S, backend_timeout: Duration) -> Self {
        Self {
            sink,
            backend_timeout,
        }
    }

    /// Fetch matching rows and return their per-key totals.
    ///
    /// Rejects filters naming neither a scope nor an origin. Never touches a
    /// batch writer's lock.
    #[instrument(skip(self))]
    pub async fn query(&self, filter: EventFilter) -> Result<Vec<AggregatedRecord>> {
        let filter = filter.normalized();
        filter.validate()?;

        let rows = with_deadline(self.backend_timeout, "query", self.sink.query(&filter)).await?;
        let records = reaggregate(&rows);
        debug!(rows = rows.len(), records = records.len(), "Re-aggregated query rows");
        Ok(records)
    }
}

/// Sum rows per aggregation key, sorted ascending by event name.
///
/// The sort is stable, so records with equal names keep the order in which
/// their keys were first encountered.
pub fn reaggregate(rows: &[StoredEvent]) -> Vec<AggregatedRecord> {
    let mut aggregator = Aggregator::new(rows.len().min(QUERY_CAPACITY));
    for row in rows {
        aggregator.add(&row.scope, &row.origin, &row.as_event());
    }

    let mut records = aggregator.drain();
    records.sort_by(|a, b| a.name.cmp(&b.name));
    records
}
