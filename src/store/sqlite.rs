//! SQLite-backed outcome store.
//!
//! One append-only `attempts` table; the scheduler's read is a single
//! `GROUP BY target_id` aggregate over it.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{OutcomeStore, TargetHistory};
use crate::domain::{AttemptOutcome, AttemptRecord, ScoreSet};
use crate::error::{AuditqError, Result};

/// Outcome store persisted to a SQLite database.
///
/// `rusqlite::Connection` isn't Sync, so it sits behind a Mutex.
pub struct SqliteOutcomeStore {
    path: Option<PathBuf>,
    db: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteOutcomeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteOutcomeStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteOutcomeStore {
    /// Open or create the database at `path`, creating parent directories as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                AuditqError::Store(format!("Failed to create store directory {}: {}", parent.display(), e))
            })?;
        }

        let db = Connection::open(path)?;
        Self::init_schema(&db)?;
        log::debug!("Opened outcome store at {}", path.display());

        Ok(Self {
            path: Some(path.to_path_buf()),
            db: Mutex::new(db),
        })
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self {
            path: None,
            db: Mutex::new(db),
        })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                target_id TEXT NOT NULL,
                attempted_at INTEGER NOT NULL,
                success INTEGER NOT NULL,
                performance INTEGER,
                accessibility INTEGER,
                best_practices INTEGER,
                seo INTEGER,
                pwa INTEGER,
                reason TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_attempts_target ON attempts(target_id);
            CREATE INDEX IF NOT EXISTS idx_attempts_at ON attempts(attempted_at);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|e| AuditqError::Store(e.to_string()))
    }

    /// Append one attempt.
    pub fn record(&self, record: &AttemptRecord) -> Result<()> {
        let at = record.timestamp.timestamp_millis();
        let db = self.conn()?;

        match &record.outcome {
            AttemptOutcome::Success { scores } => {
                db.execute(
                    r#"
                    INSERT INTO attempts
                    (target_id, attempted_at, success, performance, accessibility, best_practices, seo, pwa)
                    VALUES (?1, ?2, 1, ?3, ?4, ?5, ?6, ?7)
                    "#,
                    params![
                        record.target_id,
                        at,
                        scores.performance,
                        scores.accessibility,
                        scores.best_practices,
                        scores.seo,
                        scores.pwa,
                    ],
                )?;
            }
            AttemptOutcome::Failure { reason } => {
                db.execute(
                    "INSERT INTO attempts (target_id, attempted_at, success, reason) VALUES (?1, ?2, 0, ?3)",
                    params![record.target_id, at, reason],
                )?;
            }
        }

        Ok(())
    }

    pub fn record_success(&self, target_id: &str, scores: ScoreSet, at: DateTime<Utc>) -> Result<()> {
        self.record(&AttemptRecord::success(target_id, at, scores))
    }

    pub fn record_failure(&self, target_id: &str, reason: &str, at: DateTime<Utc>) -> Result<()> {
        self.record(&AttemptRecord::failure(target_id, at, reason))
    }

    /// Total number of stored attempts.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self.conn()?.query_row("SELECT COUNT(*) FROM attempts", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Most recent successful scores for a target, if any.
    pub fn latest_scores(&self, target_id: &str) -> Result<Option<ScoreSet>> {
        let result = self.conn()?.query_row(
            r#"
            SELECT performance, accessibility, best_practices, seo, pwa FROM attempts
            WHERE target_id = ?1 AND success = 1
            ORDER BY attempted_at DESC, id DESC LIMIT 1
            "#,
            [target_id],
            |row| {
                Ok(ScoreSet {
                    performance: row.get(0)?,
                    accessibility: row.get(1)?,
                    best_practices: row.get(2)?,
                    seo: row.get(3)?,
                    pwa: row.get(4)?,
                })
            },
        );

        match result {
            Ok(scores) => Ok(Some(scores)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::<Utc>::from_timestamp_millis)
}

impl OutcomeStore for SqliteOutcomeStore {
    fn histories(&self) -> Result<HashMap<String, TargetHistory>> {
        let db = self.conn()?;
        let mut stmt = db.prepare(
            r#"
            SELECT target_id,
                   COUNT(*),
                   SUM(success),
                   MAX(CASE WHEN success = 1 THEN attempted_at END),
                   MAX(CASE WHEN success = 0 THEN attempted_at END)
            FROM attempts
            GROUP BY target_id
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            let target_id: String = row.get(0)?;
            let total: i64 = row.get(1)?;
            let successes: i64 = row.get(2)?;
            let last_success: Option<i64> = row.get(3)?;
            let last_failure: Option<i64> = row.get(4)?;
            Ok((target_id, total, successes, last_success, last_failure))
        })?;

        let mut histories = HashMap::new();
        for row in rows {
            let (target_id, total, successes, last_success, last_failure) = row?;
            histories.insert(
                target_id,
                TargetHistory {
                    total: total as u32,
                    successes: successes as u32,
                    last_success: from_millis(last_success),
                    last_failure: from_millis(last_failure),
                },
            );
        }

        Ok(histories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use tempfile::TempDir;

    fn scores(performance: u8) -> ScoreSet {
        ScoreSet {
            performance,
            accessibility: 90,
            best_practices: 80,
            seo: 70,
            pwa: 0,
        }
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("outcomes.db");

        let store = SqliteOutcomeStore::open(&path).unwrap();

        assert!(path.exists());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_histories_aggregate() {
        let store = SqliteOutcomeStore::open_in_memory().unwrap();
        let now = Utc::now();
        let recent = now - TimeDelta::hours(2);
        let older = now - TimeDelta::days(4);

        store.record_success("a.gov", scores(50), older).unwrap();
        store.record_success("a.gov", scores(60), recent).unwrap();
        store.record_failure("a.gov", "Target closed", now - TimeDelta::days(1)).unwrap();
        store.record_failure("b.gov", "net::ERR_NAME_NOT_RESOLVED", recent).unwrap();

        let histories = store.histories().unwrap();

        let a = &histories["a.gov"];
        assert_eq!(a.total, 3);
        assert_eq!(a.successes, 2);
        assert_eq!(a.last_success.unwrap().timestamp_millis(), recent.timestamp_millis());
        assert!(a.last_failure.is_some());

        let b = &histories["b.gov"];
        assert_eq!(b.total, 1);
        assert_eq!(b.successes, 0);
        assert!(b.last_success.is_none());
        assert_eq!(b.last_failure.unwrap().timestamp_millis(), recent.timestamp_millis());
    }

    #[test]
    fn test_histories_match_memory_reduction() {
        let store = SqliteOutcomeStore::open_in_memory().unwrap();
        let base = DateTime::<Utc>::from_timestamp_millis(1_750_000_000_000).unwrap();
        let records = vec![
            AttemptRecord::success("a.gov", base, scores(10)),
            AttemptRecord::failure("a.gov", base + TimeDelta::days(1), "timeout"),
            AttemptRecord::failure("c.gov", base + TimeDelta::days(2), "timeout"),
        ];
        for record in &records {
            store.record(record).unwrap();
        }

        assert_eq!(store.histories().unwrap(), TargetHistory::from_records(&records));
    }

    #[test]
    fn test_latest_scores() {
        let store = SqliteOutcomeStore::open_in_memory().unwrap();
        let now = Utc::now();

        assert!(store.latest_scores("a.gov").unwrap().is_none());

        store.record_success("a.gov", scores(40), now - TimeDelta::days(3)).unwrap();
        store.record_success("a.gov", scores(95), now - TimeDelta::days(1)).unwrap();
        store.record_failure("a.gov", "timeout", now).unwrap();

        assert_eq!(store.latest_scores("a.gov").unwrap(), Some(scores(95)));
    }

    #[test]
    fn test_reopen_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("outcomes.db");

        {
            let store = SqliteOutcomeStore::open(&path).unwrap();
            store.record_failure("a.gov", "dns", Utc::now()).unwrap();
        }

        let store = SqliteOutcomeStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.histories().unwrap()["a.gov"].total, 1);
    }
}
