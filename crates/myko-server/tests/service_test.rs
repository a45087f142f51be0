//! End-to-end service tests over the in-memory sink

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use myko_aggregator::{FlushMode, WriterConfig};
use myko_common::{
    AggregatedRecord, Entry, Event, EventFilter, EventSink, MykoError, Result, StoredEvent,
    ValidationError,
};
use myko_datastore::InMemorySink;
use myko_server::{MykoService, ServiceOptions};

const EPSILON: f64 = 1e-9;

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

fn writer_config(buffer_size: usize, mode: FlushMode) -> WriterConfig {
    WriterConfig {
        buffer_size,
        flush_interval: Duration::from_secs(3600),
        mode,
        backend_timeout: Duration::from_secs(1),
    }
}

fn memory_service(buffer_size: usize) -> (Arc<InMemorySink>, MykoService<Arc<InMemorySink>>) {
    let sink = Arc::new(InMemorySink::new());
    let service = MykoService::new(
        sink.clone(),
        writer_config(buffer_size, FlushMode::Blocking),
        ServiceOptions::default(),
    );
    (sink, service)
}

/// Wraps the in-memory sink and fails ingest on demand
struct FlakySink {
    inner: InMemorySink,
    fail: AtomicBool,
}

#[async_trait]
impl EventSink for FlakySink {
    async fn ingest(&self, records: &[AggregatedRecord]) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(MykoError::backend("connection refused"));
        }
        self.inner.ingest(records).await
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>> {
        self.inner.query(filter).await
    }

    async fn delete(&self, filter: &EventFilter) -> Result<u64> {
        self.inner.delete(filter).await
    }
}

#[tokio::test]
async fn test_query_example_sums_per_name() {
    let (_, service) = memory_service(1);

    service
        .insert_events(vec![Entry::new("t1", "o1")
            .with_event(Event::new("lat", 5.0))
            .with_event(Event::new("cnt", 1.0))])
        .await
        .unwrap();
    service
        .insert_events(vec![
            Entry::new("t1", "o1").with_event(Event::new("lat", 7.0))
        ])
        .await
        .unwrap();

    let records = service.query(EventFilter::by_origin("o1")).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].name, "cnt");
    assert!(approx_eq(records[0].value, 1.0));
    assert_eq!(records[1].name, "lat");
    assert!(approx_eq(records[1].value, 12.0));
}

#[tokio::test]
async fn test_invalid_entry_rejects_whole_request() {
    let (sink, service) = memory_service(1);

    let err = service
        .insert_events(vec![
            Entry::new("t1", "o1").with_event(Event::new("lat", 1.0)),
            Entry::new("t1", "bad:origin").with_event(Event::new("lat", 1.0)),
        ])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MykoError::Validation(ValidationError::IllegalCharacter { field: "origin", .. })
    ));
    assert_eq!(service.stats().await.buffered, 0);
    assert_eq!(service.stats().await.events_merged, 0);
    assert!(sink.is_empty());
}

#[tokio::test]
async fn test_missing_origin_is_rejected() {
    let (_, service) = memory_service(1);
    let err = service
        .insert_events(vec![Entry::new("t1", "").with_event(Event::new("lat", 1.0))])
        .await
        .unwrap_err();
    assert!(matches!(err, MykoError::Validation(ValidationError::MissingOrigin)));
}

#[tokio::test]
async fn test_buffered_data_is_invisible_until_flushed() {
    let (_, service) = memory_service(100);

    service
        .insert_events(vec![
            Entry::new("t1", "o1").with_event(Event::new("lat", 3.0))
        ])
        .await
        .unwrap();
    assert!(service.query(EventFilter::by_scope("t1")).await.unwrap().is_empty());

    service.flush().await.unwrap();
    let records = service.query(EventFilter::by_scope("t1")).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(approx_eq(records[0].value, 3.0));
}

#[tokio::test]
async fn test_failed_flush_is_retried_on_next_write() {
    for mode in [FlushMode::Blocking, FlushMode::Detached] {
        let sink = Arc::new(FlakySink {
            inner: InMemorySink::new(),
            fail: AtomicBool::new(true),
        });
        let service = MykoService::new(
            sink.clone(),
            writer_config(1, mode),
            ServiceOptions::default(),
        );

        let err = service
            .insert_events(vec![
                Entry::new("t1", "o1").with_event(Event::new("lat", 4.0))
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, MykoError::Backend(_)));
        assert_eq!(service.stats().await.buffered, 1);

        sink.fail.store(false, Ordering::SeqCst);
        service
            .insert_events(vec![
                Entry::new("t1", "o1").with_event(Event::new("lat", 6.0))
            ])
            .await
            .unwrap();

        let records = service.query(EventFilter::by_origin("o1")).await.unwrap();
        assert_eq!(records.len(), 1, "{mode:?}");
        assert!(approx_eq(records[0].value, 10.0), "{mode:?}");
        assert_eq!(service.stats().await.buffered, 0);
    }
}

#[tokio::test]
async fn test_rows_from_separate_flushes_are_reaggregated() {
    let (sink, service) = memory_service(1);

    for value in [1.0, 2.0, 3.0] {
        service
            .insert_events(vec![
                Entry::new("t1", "o1").with_event(Event::new("lat", value).with_unit("ms"))
            ])
            .await
            .unwrap();
    }
    assert_eq!(sink.len(), 3);

    let records = service
        .query(EventFilter::by_scope("t1").with_name("lat"))
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].unit, "ms");
    assert!(approx_eq(records[0].value, 6.0));
}

#[tokio::test]
async fn test_delete_events() {
    let (sink, service) = memory_service(1);

    service
        .insert_events(vec![
            Entry::new("t1", "o1").with_event(Event::new("lat", 1.0)),
            Entry::new("t1", "o2").with_event(Event::new("lat", 1.0)),
        ])
        .await
        .unwrap();
    assert_eq!(sink.len(), 2);

    let deleted = service
        .delete_events(EventFilter::by_origin("o1"))
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let records = service.query(EventFilter::by_scope("t1")).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].origin, "o2");
}

#[tokio::test]
async fn test_query_requires_scope_or_origin() {
    let (_, service) = memory_service(1);
    let err = service
        .query(EventFilter::default().with_name("lat"))
        .await
        .unwrap_err();
    assert!(matches!(err, MykoError::Validation(ValidationError::EmptyFilter)));
}
