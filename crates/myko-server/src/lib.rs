//! # Myko Server
//!
//! Configuration, service wiring and the HTTP surface of the Myko metrics
//! ingestion service.

pub mod config;
pub mod http;
pub mod service;

pub use config::{BackendKind, DataSettings, MykoConfig, DEFAULT_CONFIG_PATH};
pub use http::{router, ApiError};
pub use service::{MykoService, ServiceOptions};

use myko_common::Result;
use myko_datastore::{Backend, InMemorySink, RedisSink};
use tracing::info;

/// Bind the sink selected by configuration
pub async fn connect_backend(settings: &DataSettings) -> Result<Backend> {
    let backend = match settings.backend {
        BackendKind::Memory => {
            let mut sink = InMemorySink::new();
            if let Some(ttl) = settings.ttl() {
                sink = sink.with_ttl(ttl);
            }
            Backend::Memory(sink)
        }
        BackendKind::Redis => {
            let mut sink = RedisSink::connect(&settings.redis.url)
                .await?
                .with_prefix(&settings.redis.prefix);
            if let Some(ttl) = settings.ttl() {
                sink = sink.with_ttl(ttl);
            }
            Backend::Redis(sink)
        }
    };
    info!(backend = backend.name(), ttl_secs = ?settings.ttl_secs, "Storage backend ready");
    Ok(backend)
}

/// Build the service from a loaded configuration and a bound sink
pub fn build_service<S>(config: &MykoConfig, sink: S) -> MykoService<S>
where
    S: myko_common::EventSink + Clone + 'static,
{
    MykoService::new(
        sink,
        config.writer_config(),
        ServiceOptions {
            escape: config.ingest.escape,
        },
    )
}
