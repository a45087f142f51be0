//! Storage backend contract
//!
//! The aggregation core persists and retrieves rows only through this trait.
//! Concrete backends live in `myko-datastore`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{filter::EventFilter, record::AggregatedRecord, record::StoredEvent};

/// Persistence/query capability
///
/// Implementations need not be atomic across records: a failed `ingest` may
/// have persisted a prefix of the batch.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Durably persist every record, assigning ids and creation timestamps.
    async fn ingest(&self, records: &[AggregatedRecord]) -> Result<()>;

    /// Return every live row matching the filter.
    async fn query(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>>;

    /// Remove matching rows, returning how many were removed.
    async fn delete(&self, filter: &EventFilter) -> Result<u64>;
}

#[async_trait]
impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    async fn ingest(&self, records: &[AggregatedRecord]) -> Result<()> {
        (**self).ingest(records).await
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>> {
        (**self).query(filter).await
    }

    async fn delete(&self, filter: &EventFilter) -> Result<u64> {
        (**self).delete(filter).await
    }
}
