//! Audit targets as loaded from the registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Opaque key-values carried through from the registry untouched.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// A single external endpoint (domain) subject to audit.
///
/// Identity is the `id` string; two targets with the same id are the same target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// Domain, e.g. `example.gov`
    pub id: String,

    /// Grouping labels and anything else the registry attaches
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
}

impl Target {
    /// Create a target with no metadata
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            metadata: Metadata::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
