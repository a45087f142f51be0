//! Aggregated rows and their persisted form
//!
//! An [`AggregatedRecord`] is the unit of exchange between the aggregator,
//! the batch writer and the sinks. A [`StoredEvent`] is what a sink hands
//! back: the same row plus its identity and timestamps.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::Event;
use crate::error::MykoError;

/// Summation identity of a measurement
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AggregationKey {
    pub scope: String,
    pub origin: String,
    pub name: String,
    pub unit: String,
}

impl AggregationKey {
    /// Create a key from an event
    pub fn from_event(scope: &str, origin: &str, event: &Event) -> Self {
        Self {
            scope: scope.to_string(),
            origin: origin.to_string(),
            name: event.name.clone(),
            unit: event.unit.clone(),
        }
    }
}

/// One row of summed totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRecord {
    pub scope: String,
    pub origin: String,
    pub name: String,
    pub unit: String,
    pub value: f64,
    /// Earliest client-supplied creation time among the summed events
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AggregatedRecord {
    /// Start a record from its first event
    pub fn from_event(scope: &str, origin: &str, event: &Event) -> Self {
        Self {
            scope: scope.to_string(),
            origin: origin.to_string(),
            name: event.name.clone(),
            unit: event.unit.clone(),
            value: event.value,
            created_at: event.created_at,
        }
    }

    /// Fold another event with the same key into this record
    pub fn add_event(&mut self, event: &Event) {
        self.value += event.value;
        self.created_at = match (self.created_at, event.created_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    /// Fold another record with the same key into this one
    pub fn merge(&mut self, other: &AggregatedRecord) {
        self.value += other.value;
        self.created_at = match (self.created_at, other.created_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    pub fn key(&self) -> AggregationKey {
        AggregationKey {
            scope: self.scope.clone(),
            origin: self.origin.clone(),
            name: self.name.clone(),
            unit: self.unit.clone(),
        }
    }

    /// View this record as an event, for re-aggregation
    pub fn as_event(&self) -> Event {
        Event {
            name: self.name.clone(),
            unit: self.unit.clone(),
            value: self.value,
            created_at: self.created_at,
        }
    }
}

/// A persisted row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: Uuid,
    pub scope: String,
    pub origin: String,
    pub name: String,
    pub unit: String,
    pub value: f64,
    pub created_at: DateTime<Utc>,
    /// Expiry deadline when the row was ingested with a TTL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredEvent {
    /// Materialize a record for persistence.
    ///
    /// Assigns a fresh id, stamps `now` unless the record carries its own
    /// creation time, and sets the expiry from the TTL if one applies. Fails
    /// when `now + ttl` is not representable.
    pub fn from_record(
        record: &AggregatedRecord,
        now: DateTime<Utc>,
        ttl: Option<Duration>,
    ) -> Result<Self, MykoError> {
        let expires_at = ttl.map(|ttl| expiry_after(now, ttl)).transpose()?;
        Ok(Self {
            id: Uuid::new_v4(),
            scope: record.scope.clone(),
            origin: record.origin.clone(),
            name: record.name.clone(),
            unit: record.unit.clone(),
            value: record.value,
            created_at: record.created_at.unwrap_or(now),
            expires_at,
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|at| at <= now).unwrap_or(false)
    }

    /// View this row as an event, for re-aggregation
    pub fn as_event(&self) -> Event {
        Event {
            name: self.name.clone(),
            unit: self.unit.clone(),
            value: self.value,
            created_at: Some(self.created_at),
        }
    }
}

/// `now + ttl`, or an error when the sum overflows the calendar
pub fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, MykoError> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| MykoError::Config(format!("ttl of {}s is out of range", ttl.as_secs())))
}
