//! Client-submitted measurements
//!
//! An [`Entry`] groups events produced by one origin under one scope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single named, valued measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event name (required, non-empty)
    pub name: String,

    /// Optional unit tag, empty when absent
    #[serde(default)]
    pub unit: String,

    /// Additive quantity
    pub value: f64,

    /// Client-side creation time, if the client supplied one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Create a unit-less event
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            unit: String::new(),
            value,
            created_at: None,
        }
    }

    /// Set the unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Set the creation time
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// A batch of events sharing one scope and origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Correlation id (request trace, fleet or target); may be empty
    #[serde(default)]
    pub scope: String,

    /// Logical source that produced the events
    pub origin: String,

    /// Events in submission order
    #[serde(default)]
    pub events: Vec<Event>,
}

impl Entry {
    pub fn new(scope: impl Into<String>, origin: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            origin: origin.into(),
            events: Vec::new(),
        }
    }

    /// Append an event
    pub fn with_event(mut self, event: Event) -> Self {
        self.events.push(event);
        self
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the entry carries no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
