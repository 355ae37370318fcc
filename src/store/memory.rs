//! In-memory outcome store.

use std::collections::HashMap;
use std::sync::Mutex;

use super::{OutcomeStore, TargetHistory};
use crate::domain::AttemptRecord;
use crate::error::{AuditqError, Result};

/// Outcome store holding raw attempt records in memory.
#[derive(Debug, Default)]
pub struct MemoryOutcomeStore {
    records: Mutex<Vec<AttemptRecord>>,
}

impl MemoryOutcomeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records.
    pub fn with_records(records: Vec<AttemptRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Append one attempt.
    pub fn record(&self, record: AttemptRecord) -> Result<()> {
        self.records
            .lock()
            .map_err(|e| AuditqError::Store(e.to_string()))?
            .push(record);
        Ok(())
    }

    /// Number of stored attempts.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl OutcomeStore for MemoryOutcomeStore {
    fn histories(&self) -> Result<HashMap<String, TargetHistory>> {
        let records = self.records.lock().map_err(|e| AuditqError::Store(e.to_string()))?;
        Ok(TargetHistory::from_records(records.iter()))
    }
}
