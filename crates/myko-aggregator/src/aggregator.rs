//! Keyed summation of measurements
//!
//! Combines events sharing `(scope, origin, name, unit)` into a single
//! [`AggregatedRecord`] whose value is the sum of every added value.

use std::collections::HashMap;

use myko_common::{AggregatedRecord, AggregationKey, Event};

/// Mutable keyed-summation table
///
/// Not synchronized: the owner serializes `add` against draining.
/// Records are kept in first-insertion order so draining is deterministic.
#[derive(Debug, Clone)]
pub struct Aggregator {
    /// Capacity hint restored on reset
    capacity: usize,
    /// Position of each key in `records`
    index: HashMap<AggregationKey, usize>,
    /// Summed rows in first-insertion order
    records: Vec<AggregatedRecord>,
}

impl Aggregator {
    /// Create an empty table pre-sized for `capacity` distinct keys
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            records: Vec::with_capacity(capacity),
        }
    }

    /// Add an event's value under its aggregation key
    pub fn add(&mut self, scope: &str, origin: &str, event: &Event) {
        let key = AggregationKey::from_event(scope, origin, event);
        match self.index.get(&key) {
            Some(&pos) => self.records[pos].add_event(event),
            None => {
                self.index.insert(key, self.records.len());
                self.records
                    .push(AggregatedRecord::from_event(scope, origin, event));
            }
        }
    }

    /// Fold an already-aggregated record back in
    pub fn add_record(&mut self, record: AggregatedRecord) {
        let key = record.key();
        match self.index.get(&key) {
            Some(&pos) => self.records[pos].merge(&record),
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(record);
            }
        }
    }

    /// Re-merge records previously taken out with [`Aggregator::drain`]
    pub fn merge(&mut self, records: Vec<AggregatedRecord>) {
        for record in records {
            self.add_record(record);
        }
    }

    /// Number of distinct keys currently held
    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Visit every held record exactly once
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &str, &AggregatedRecord),
    {
        for record in &self.records {
            visit(&record.scope, &record.origin, record);
        }
    }

    /// Copy of every held record, in drain order
    pub fn snapshot(&self) -> Vec<AggregatedRecord> {
        let mut batch = Vec::with_capacity(self.size());
        self.for_each(|_, _, record| batch.push(record.clone()));
        batch
    }

    /// Discard all records and re-initialize at the original capacity hint
    pub fn reset(&mut self) {
        self.index = HashMap::with_capacity(self.capacity);
        self.records = Vec::with_capacity(self.capacity);
    }

    /// Take every record and leave the table empty
    pub fn drain(&mut self) -> Vec<AggregatedRecord> {
        let records = std::mem::replace(&mut self.records, Vec::with_capacity(self.capacity));
        self.index = HashMap::with_capacity(self.capacity);
        records
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(crate::DEFAULT_CAPACITY)
    }
}
