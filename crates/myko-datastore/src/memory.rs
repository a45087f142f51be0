//! In-memory sink using DashMap
//!
//! Rows ingested with a TTL are treated as absent once expired and are
//! pruned lazily by queries. Deletes remove rows eagerly.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use myko_common::{AggregatedRecord, EventFilter, EventSink, Result, StoredEvent};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Process-local event store
#[derive(Debug, Default)]
pub struct InMemorySink {
    rows: DashMap<Uuid, StoredEvent>,
    default_ttl: Option<Duration>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire every ingested row after `ttl`
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Number of stored rows, including expired rows not yet pruned
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl EventSink for InMemorySink {
    #[instrument(skip(self, records), fields(records = records.len()))]
    async fn ingest(&self, records: &[AggregatedRecord]) -> Result<()> {
        let now = Utc::now();
        for record in records {
            let row = StoredEvent::from_record(record, now, self.default_ttl)?;
            self.rows.insert(row.id, row);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn query(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>> {
        let now = Utc::now();
        let mut expired = Vec::new();
        let mut rows: Vec<StoredEvent> = self
            .rows
            .iter()
            .filter(|entry| {
                if entry.is_expired(now) {
                    expired.push(*entry.key());
                    return false;
                }
                filter.matches(entry.value())
            })
            .map(|entry| entry.value().clone())
            .collect();

        if !expired.is_empty() {
            debug!(count = expired.len(), "Pruning expired rows");
            for id in &expired {
                self.rows.remove(id);
            }
        }

        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    #[instrument(skip(self))]
    async fn delete(&self, filter: &EventFilter) -> Result<u64> {
        let ids: Vec<Uuid> = self
            .rows
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| *entry.key())
            .collect();

        let deleted = ids
            .iter()
            .filter(|id| self.rows.remove(id).is_some())
            .count() as u64;
        debug!(deleted, "Deleted rows");
        Ok(deleted)
    }
}
