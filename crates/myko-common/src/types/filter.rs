//! Query and delete predicate

use serde::{Deserialize, Serialize};

use super::record::StoredEvent;
use crate::error::ValidationError;

/// Selects persisted rows; every present field must match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EventFilter {
    pub fn by_scope(scope: impl Into<String>) -> Self {
        Self {
            scope: Some(scope.into()),
            ..Self::default()
        }
    }

    pub fn by_origin(origin: impl Into<String>) -> Self {
        Self {
            origin: Some(origin.into()),
            ..Self::default()
        }
    }

    /// Narrow the filter to one event name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Treat empty strings as absent fields.
    pub fn normalized(self) -> Self {
        let keep = |v: Option<String>| v.filter(|s| !s.is_empty());
        Self {
            scope: keep(self.scope),
            origin: keep(self.origin),
            name: keep(self.name),
        }
    }

    /// A filter must name a scope or an origin.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.is_empty());
        if !present(&self.scope) && !present(&self.origin) {
            return Err(ValidationError::EmptyFilter);
        }
        Ok(())
    }

    pub fn matches(&self, row: &StoredEvent) -> bool {
        let field = |want: &Option<String>, have: &str| want.as_deref().map_or(true, |w| w == have);
        field(&self.scope, &row.scope) && field(&self.origin, &row.origin) && field(&self.name, &row.name)
    }
}
