//! # Myko Aggregator
//!
//! The in-memory engine between the request boundary and storage.
//!
//! ```text
//! write:  entries ──► BatchWriter ──► Aggregator.add ──► flush? ──► EventSink.ingest
//! query:  filter  ──► QueryEngine ──► EventSink.query ──► Aggregator ──► sort by name
//! ```
//!
//! - [`Aggregator`]: keyed summation over `(scope, origin, name, unit)`
//! - [`BatchWriter`]: size/interval flush policy evaluated on write
//! - [`QueryEngine`]: read-side re-aggregation of persisted rows

pub mod aggregator;
pub mod batch_writer;
pub mod deadline;
pub mod query;

pub use aggregator::Aggregator;
pub use batch_writer::{BatchWriter, FlushMode, WriterConfig, WriterMetrics, WriterStats};
pub use deadline::with_deadline;
pub use query::{reaggregate, QueryEngine};

/// Default aggregator capacity hint
pub const DEFAULT_CAPACITY: usize = 1024;
