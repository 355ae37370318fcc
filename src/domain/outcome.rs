//! Audit attempt records and score sets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The five category scores an audit produces, each an integer percentage in [0, 100].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSet {
    pub performance: u8,
    pub accessibility: u8,
    pub best_practices: u8,
    pub seo: u8,
    pub pwa: u8,
}

impl ScoreSet {
    /// All-zero scores, the shape of a failed attempt.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Scores as an array in fixed order: performance, accessibility, best practices, seo, pwa.
    pub fn as_array(&self) -> [u8; 5] {
        [self.performance, self.accessibility, self.best_practices, self.seo, self.pwa]
    }

    pub fn is_zero(&self) -> bool {
        self.as_array().iter().all(|s| *s == 0)
    }
}

/// Outcome of one audit attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Audit completed and produced scores
    Success { scores: ScoreSet },
    /// Audit did not produce scores
    Failure { reason: String },
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success { .. })
    }
}

/// One historical attempt against one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub target_id: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: AttemptOutcome,
}

impl AttemptRecord {
    /// Record a successful attempt
    pub fn success(target_id: impl Into<String>, timestamp: DateTime<Utc>, scores: ScoreSet) -> Self {
        Self {
            target_id: target_id.into(),
            timestamp,
            outcome: AttemptOutcome::Success { scores },
        }
    }

    /// Record a failed attempt
    pub fn failure(target_id: impl Into<String>, timestamp: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            timestamp,
            outcome: AttemptOutcome::Failure { reason: reason.into() },
        }
    }
}
