//! Row id allocation.
//!
//! Ids are allocated in memory per (database, collection, doc-part); the
//! counters are seeded from `last_row_id_used` when the backend opens. Root
//! doc-parts allocate document ids.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{DocrelError, Result};
use crate::metainf::TableRef;

type RidKey = (String, String, TableRef);

#[derive(Debug, Default)]
pub struct RidGenerator {
    next: Mutex<HashMap<RidKey, i64>>,
}

impl RidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the highest id already stored. Seeding never moves a counter
    /// backwards.
    pub fn seed(&self, database: &str, collection: &str, table_ref: &TableRef, last: Option<i32>) {
        let next = last.map_or(0, |last| i64::from(last) + 1);
        let mut counters = self.next.lock();
        let entry = counters
            .entry((database.to_string(), collection.to_string(), table_ref.clone()))
            .or_insert(0);
        if next > *entry {
            *entry = next;
        }
        debug!(
            "Seeded row ids of {}.{} {} at {}",
            database, collection, table_ref, *entry
        );
    }

    pub fn next_rid(&self, database: &str, collection: &str, table_ref: &TableRef) -> Result<i32> {
        let mut counters = self.next.lock();
        let entry = counters
            .entry((database.to_string(), collection.to_string(), table_ref.clone()))
            .or_insert(0);
        let rid = i32::try_from(*entry).map_err(|_| {
            DocrelError::Precondition(format!(
                "row ids of {}.{} {} exhausted",
                database, collection, table_ref
            ))
        })?;
        *entry += 1;
        Ok(rid)
    }

    /// Drop every counter of a collection, after the collection is dropped.
    pub fn forget_collection(&self, database: &str, collection: &str) {
        self.next
            .lock()
            .retain(|(db, col, _), _| !(db == database && col == collection));
    }
}
