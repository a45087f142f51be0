//! Myko service operations
//!
//! Binds one batch writer and one query engine to a sink and exposes the three
//! caller-facing operations: insert, query and delete.

use std::time::Duration;

use myko_aggregator::{with_deadline, BatchWriter, QueryEngine, WriterConfig, WriterStats};
use myko_common::format::{escape, verify_all};
use myko_common::{AggregatedRecord, Entry, EventFilter, EventSink, Result};
use tracing::{debug, instrument};

/// Service-level settings that do not belong to the writer
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    /// Rewrite key delimiters instead of rejecting entries
    pub escape: bool,
}

/// Metrics ingestion service over a single sink
pub struct MykoService<S> {
    writer: BatchWriter<S>,
    queries: QueryEngine<S>,
    sink: S,
    backend_timeout: Duration,
    options: ServiceOptions,
}

impl<S> MykoService<S>
where
    S: EventSink + Clone + 'static,
{
    pub fn new(sink: S, writer_config: WriterConfig, options: ServiceOptions) -> Self {
        let backend_timeout = writer_config.backend_timeout;
        Self {
            writer: BatchWriter::new(sink.clone(), writer_config),
            queries: QueryEngine::new(sink.clone(), backend_timeout),
            sink,
            backend_timeout,
            options,
        }
    }

    /// Validate every entry, then hand all of them to the batch writer.
    ///
    /// Nothing is buffered if any entry fails validation. Returns the number
    /// of events accepted.
    #[instrument(skip(self, entries), fields(entries = entries.len()))]
    pub async fn insert_events(&self, entries: Vec<Entry>) -> Result<usize> {
        let entries: Vec<Entry> = if self.options.escape {
            entries.into_iter().map(escape).collect()
        } else {
            entries
        };
        verify_all(&entries)?;

        let events = entries.iter().map(Entry::len).sum();
        self.writer.write(&entries).await?;
        debug!(events, "Accepted events");
        Ok(events)
    }

    /// Aggregate totals for the filter, sorted by event name
    pub async fn query(&self, filter: EventFilter) -> Result<Vec<AggregatedRecord>> {
        self.queries.query(filter).await
    }

    /// Remove persisted rows matching the filter
    #[instrument(skip(self))]
    pub async fn delete_events(&self, filter: EventFilter) -> Result<u64> {
        let filter = filter.normalized();
        filter.validate()?;

        let deleted = with_deadline(self.backend_timeout, "delete", self.sink.delete(&filter)).await?;
        debug!(deleted, "Deleted events");
        Ok(deleted)
    }

    /// Flush whatever is buffered, regardless of thresholds
    pub async fn flush(&self) -> Result<()> {
        self.writer.flush_now().await
    }

    pub async fn stats(&self) -> WriterStats {
        self.writer.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use myko_common::{Event, MykoError, ValidationError};
    use myko_datastore::InMemorySink;
    use std::sync::Arc;

    fn service(buffer_size: usize, escape: bool) -> MykoService<Arc<InMemorySink>> {
        let config = WriterConfig {
            buffer_size,
            flush_interval: Duration::from_secs(3600),
            ..Default::default()
        };
        MykoService::new(
            Arc::new(InMemorySink::new()),
            config,
            ServiceOptions { escape },
        )
    }

    #[tokio::test]
    async fn test_insert_counts_events() {
        let svc = service(100, false);
        let accepted = svc
            .insert_events(vec![
                Entry::new("t1", "o1")
                    .with_event(Event::new("lat", 1.0))
                    .with_event(Event::new("lat", 2.0)),
                Entry::new("t1", "o2"),
            ])
            .await
            .unwrap();

        assert_eq!(accepted, 2);
        assert_eq!(svc.stats().await.buffered, 1);
    }

    #[tokio::test]
    async fn test_escape_mode_rewrites_delimiters() {
        let svc = service(1, true);
        svc.insert_events(vec![
            Entry::new("t:1", "o:1").with_event(Event::new("a:b", 1.0))
        ])
        .await
        .unwrap();

        let records = svc.query(EventFilter::by_origin("o_1")).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].scope, "t_1");
        assert_eq!(records[0].name, "a_b");
    }

    #[tokio::test]
    async fn test_escape_mode_still_requires_origin() {
        let svc = service(1, true);
        let err = svc
            .insert_events(vec![Entry::new("t1", "").with_event(Event::new("lat", 1.0))])
            .await
            .unwrap_err();
        assert!(matches!(err, MykoError::Validation(ValidationError::MissingOrigin)));
    }

    #[tokio::test]
    async fn test_delete_rejects_empty_filter() {
        let svc = service(1, false);
        let err = svc
            .delete_events(EventFilter::default().with_name("lat"))
            .await
            .unwrap_err();
        assert!(matches!(err, MykoError::Validation(ValidationError::EmptyFilter)));
    }
}
