//! # Myko Datastore
//!
//! Concrete [`EventSink`] implementations:
//! - [`InMemorySink`]: DashMap-backed, lazy TTL expiry
//! - [`RedisSink`]: one key per row plus secondary index sets, `EX`-based TTL
//!
//! A service binds exactly one of them at startup through [`Backend`].

pub mod memory;
pub mod redis_store;

pub use memory::InMemorySink;
pub use redis_store::RedisSink;

use async_trait::async_trait;
use myko_common::{AggregatedRecord, EventFilter, EventSink, Result, StoredEvent};

/// The sink selected by configuration
pub enum Backend {
    Memory(InMemorySink),
    Redis(RedisSink),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Memory(_) => "memory",
            Backend::Redis(_) => "redis",
        }
    }
}

#[async_trait]
impl EventSink for Backend {
    async fn ingest(&self, records: &[AggregatedRecord]) -> Result<()> {
        match self {
            Backend::Memory(sink) => sink.ingest(records).await,
            Backend::Redis(sink) => sink.ingest(records).await,
        }
    }

    async fn query(&self, filter: &EventFilter) -> Result<Vec<StoredEvent>> {
        match self {
            Backend::Memory(sink) => sink.query(filter).await,
            Backend::Redis(sink) => sink.query(filter).await,
        }
    }

    async fn delete(&self, filter: &EventFilter) -> Result<u64> {
        match self {
            Backend::Memory(sink) => sink.delete(filter).await,
            Backend::Redis(sink) => sink.delete(filter).await,
        }
    }
}
