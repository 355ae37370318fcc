//! Target categories used to prioritize scheduling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A target's classification, recomputed every run from its attempt history.
///
/// Variant order is scheduling priority: `NeverTested` first, `FailedOnly` last.
/// `Ord` follows that order, so `BTreeMap<Category, _>` iterates in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// No attempt has ever been recorded
    NeverTested,
    /// Enough successes, the latest one recent
    ReliableSuccess,
    /// Some recent success, but below the reliable bar
    RecentMixed,
    /// Succeeded before, but not lately
    OldSuccess,
    /// Never succeeded, or the last success is too old to count
    FailedOnly,
}

impl Category {
    /// All categories in priority order.
    pub const ALL: [Category; 5] = [
        Category::NeverTested,
        Category::ReliableSuccess,
        Category::RecentMixed,
        Category::OldSuccess,
        Category::FailedOnly,
    ];

    /// Stable snake_case name, matches the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::NeverTested => "never_tested",
            Category::ReliableSuccess => "reliable_success",
            Category::RecentMixed => "recent_mixed",
            Category::OldSuccess => "old_success",
            Category::FailedOnly => "failed_only",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}
