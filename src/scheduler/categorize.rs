//! Target categorization and cooldown calculation.
//!
//! Categories are evaluated top to bottom, first match wins:
//! - `NeverTested`: no attempts at all
//! - `ReliableSuccess`: at least 3 successes, latest within 7 days
//! - `RecentMixed`: latest success within 14 days
//! - `OldSuccess`: latest success within 30 days
//! - `FailedOnly`: no successes, or latest success older than 30 days
//!
//! Cooldown comes from the latest failure alone, independent of category.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::{Category, Target};
use crate::error::{AuditqError, Result};
use crate::store::{OutcomeStore, TargetHistory};

/// Classification thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryPolicy {
    /// Successes needed for `ReliableSuccess`
    pub reliable_min_successes: u32,
    /// Latest success must be this recent for `ReliableSuccess`
    pub reliable_window_days: i64,
    /// Latest success must be this recent for `RecentMixed`
    pub recent_window_days: i64,
    /// Past this, a success no longer counts and the target is `FailedOnly`
    pub stale_after_days: i64,
    /// Ascending cooldown windows measured from the latest failure
    pub cooldown_windows_days: Vec<i64>,
}

impl Default for CategoryPolicy {
    fn default() -> Self {
        Self {
            reliable_min_successes: 3,
            reliable_window_days: 7,
            recent_window_days: 14,
            stale_after_days: 30,
            cooldown_windows_days: vec![1, 3, 7],
        }
    }
}

impl CategoryPolicy {
    /// Reject thresholds that would make a category unreachable.
    pub fn validate(&self) -> Result<()> {
        if self.reliable_window_days <= 0 {
            return Err(AuditqError::Config("reliable_window_days must be positive".to_string()));
        }
        if self.recent_window_days < self.reliable_window_days {
            return Err(AuditqError::Config(format!(
                "recent_window_days ({}) must be at least reliable_window_days ({})",
                self.recent_window_days, self.reliable_window_days
            )));
        }
        if self.stale_after_days < self.recent_window_days {
            return Err(AuditqError::Config(format!(
                "stale_after_days ({}) must be at least recent_window_days ({})",
                self.stale_after_days, self.recent_window_days
            )));
        }
        if self.cooldown_windows_days.iter().any(|w| *w <= 0) {
            return Err(AuditqError::Config("cooldown windows must be positive".to_string()));
        }
        if !self.cooldown_windows_days.windows(2).all(|w| w[0] < w[1]) {
            return Err(AuditqError::Config("cooldown windows must be strictly ascending".to_string()));
        }
        Ok(())
    }
}

/// Assign a category from a target's aggregate history.
pub fn classify(history: &TargetHistory, now: DateTime<Utc>, policy: &CategoryPolicy) -> Category {
    if history.total == 0 {
        return Category::NeverTested;
    }

    let Some(last_success) = history.last_success.filter(|_| history.successes > 0) else {
        return Category::FailedOnly;
    };

    let age = now - last_success;
    if history.successes >= policy.reliable_min_successes && age <= TimeDelta::days(policy.reliable_window_days) {
        Category::ReliableSuccess
    } else if age <= TimeDelta::days(policy.recent_window_days) {
        Category::RecentMixed
    } else if age <= TimeDelta::days(policy.stale_after_days) {
        Category::OldSuccess
    } else {
        Category::FailedOnly
    }
}

/// Whole days of cooldown remaining after the latest failure; 0 means eligible.
///
/// With windows `[1, 3, 7]`: a failure under a day old leaves 1 day, under 3 days
/// leaves the rest of the 3-day window, under 7 the rest of the 7-day window.
pub fn cooldown_days(last_failure: Option<DateTime<Utc>>, now: DateTime<Utc>, policy: &CategoryPolicy) -> u32 {
    let Some(failed_at) = last_failure else {
        return 0;
    };

    let age_days = (now - failed_at).num_days().max(0);
    policy
        .cooldown_windows_days
        .iter()
        .find(|window| age_days < **window)
        .map(|window| (window - age_days) as u32)
        .unwrap_or(0)
}

/// A target with its category and cooldown for this run.
#[derive(Debug, Clone, PartialEq)]
pub struct CategorizedTarget {
    pub target: Target,
    pub category: Category,
    pub cooldown_days: u32,
}

impl CategorizedTarget {
    pub fn in_cooldown(&self) -> bool {
        self.cooldown_days > 0
    }
}

/// Categorize every target against a precomputed history map.
///
/// Targets without history are `NeverTested` with no cooldown; none are dropped.
pub fn categorize_with_histories(
    targets: &[Target],
    histories: &HashMap<String, TargetHistory>,
    now: DateTime<Utc>,
    policy: &CategoryPolicy,
) -> Vec<CategorizedTarget> {
    let empty = TargetHistory::default();
    targets
        .iter()
        .map(|target| {
            let history = histories.get(&target.id).unwrap_or(&empty);
            CategorizedTarget {
                target: target.clone(),
                category: classify(history, now, policy),
                cooldown_days: cooldown_days(history.last_failure, now, policy),
            }
        })
        .collect()
}

/// Categorize every target using the store's history.
///
/// An unreachable store is not fatal: every target falls back to `NeverTested`.
pub fn categorize(
    targets: &[Target],
    store: &dyn OutcomeStore,
    now: DateTime<Utc>,
    policy: &CategoryPolicy,
) -> Vec<CategorizedTarget> {
    let histories = match store.histories() {
        Ok(histories) => histories,
        Err(e) => {
            log::warn!("Outcome store unavailable, treating all {} targets as never tested: {}", targets.len(), e);
            HashMap::new()
        }
    };

    categorize_with_histories(targets, &histories, now, policy)
}

/// Categorized targets split into selectable and cooling-down pools.
#[derive(Debug, Clone, Default)]
pub struct Pools {
    pub available: BTreeMap<Category, Vec<Target>>,
    pub cooldown: BTreeMap<Category, Vec<Target>>,
}

impl Pools {
    pub fn from_categorized(categorized: impl IntoIterator<Item = CategorizedTarget>) -> Self {
        let mut pools = Self::default();
        for entry in categorized {
            let bucket = if entry.in_cooldown() {
                &mut pools.cooldown
            } else {
                &mut pools.available
            };
            bucket.entry(entry.category).or_default().push(entry.target);
        }
        pools
    }

    /// Available targets in a category (empty slice if none).
    pub fn available_in(&self, category: Category) -> &[Target] {
        self.available.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Count per category for every category, zeros included.
    pub fn available_counts(&self) -> BTreeMap<Category, usize> {
        counts(&self.available)
    }

    pub fn cooldown_counts(&self) -> BTreeMap<Category, usize> {
        counts(&self.cooldown)
    }

    pub fn total_available(&self) -> usize {
        self.available.values().map(Vec::len).sum()
    }
}

fn counts(pool: &BTreeMap<Category, Vec<Target>>) -> BTreeMap<Category, usize> {
    Category::ALL
        .into_iter()
        .map(|c| (c, pool.get(&c).map(Vec::len).unwrap_or(0)))
        .collect()
}
