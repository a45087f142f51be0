//! # Myko Common
//!
//! Shared types, errors, and the storage contract for the Myko metrics service.
//!
//! ## Core Types
//!
//! - [`Event`]: a single named, valued measurement
//! - [`Entry`]: a batch of events sharing one scope and origin
//! - [`AggregationKey`]: the `(scope, origin, name, unit)` summation identity
//! - [`AggregatedRecord`]: one row of summed totals
//! - [`StoredEvent`]: a persisted row as returned by a sink
//! - [`EventFilter`]: query/delete predicate
//!
//! ## Contracts
//!
//! - [`sink::EventSink`]: persistence/query backend capability
//! - [`format`]: entry verification and the legacy escape mode

pub mod error;
pub mod format;
pub mod sink;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ErrorKind, MykoError, Result, ValidationError};
pub use sink::EventSink;
pub use types::{
    event::{Entry, Event},
    filter::EventFilter,
    record::{expiry_after, AggregatedRecord, AggregationKey, StoredEvent},
};

/// Myko version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Reserved separator of storage keys.
///
/// Scope, origin, event names and units must never contain it.
pub const KEY_DELIMITER: char = ':';

/// Replacement used by the legacy escape mode
pub const ESCAPE_REPLACEMENT: char = '_';

/// Longest accepted row TTL (100 years)
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 60 * 60;
