//! Outcome store: the append-only attempt history the scheduler reads.
//!
//! The scheduler needs exactly one query from the store: a per-target aggregate
//! of past attempts. [`OutcomeStore`] is that query. Writes happen outside the
//! scheduling core, after each audit, through the concrete store types.
//!
//! - [`SqliteOutcomeStore`]: `attempts` table in a SQLite file
//! - [`MemoryOutcomeStore`]: `Vec<AttemptRecord>` for tests and dry runs

mod memory;
mod sqlite;

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::domain::{AttemptOutcome, AttemptRecord};
use crate::error::Result;

pub use memory::MemoryOutcomeStore;
pub use sqlite::SqliteOutcomeStore;

/// Per-target reduction of the attempt history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetHistory {
    /// Attempts of any outcome
    pub total: u32,
    /// Successful attempts
    pub successes: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

impl TargetHistory {
    /// Fold one attempt into the aggregate.
    pub fn absorb(&mut self, record: &AttemptRecord) {
        self.total += 1;
        match record.outcome {
            AttemptOutcome::Success { .. } => {
                self.successes += 1;
                self.last_success = self.last_success.max(Some(record.timestamp));
            }
            AttemptOutcome::Failure { .. } => {
                self.last_failure = self.last_failure.max(Some(record.timestamp));
            }
        }
    }

    /// Reduce a set of records, grouped by target id.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AttemptRecord>) -> HashMap<String, TargetHistory> {
        let mut histories: HashMap<String, TargetHistory> = HashMap::new();
        for record in records {
            histories.entry(record.target_id.clone()).or_default().absorb(record);
        }
        histories
    }
}

/// Read side of the outcome store.
pub trait OutcomeStore {
    /// Aggregate history for every target that has at least one attempt.
    ///
    /// Targets with no attempts are simply absent from the map.
    fn histories(&self) -> Result<HashMap<String, TargetHistory>>;
}
