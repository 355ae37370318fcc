//! Target registry loading.
//!
//! The registry is a YAML file listing targets, either as bare ids or as
//! `{ id, metadata }` entries, optionally wrapped in a `targets:` key:
//!
//! ```yaml
//! targets:
//!   - example.gov
//!   - id: data.example.gov
//!     metadata:
//!       agency: GSA
//! ```
//!
//! Metadata is carried through untouched. Duplicate ids keep the first entry.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::domain::{Metadata, Target};
use crate::error::{AuditqError, Result};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RegistryEntry {
    Bare(String),
    Full {
        id: String,
        #[serde(default)]
        metadata: Metadata,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RegistryFile {
    List(Vec<RegistryEntry>),
    Wrapped { targets: Vec<RegistryEntry> },
}

/// Parse registry YAML into targets, in file order.
pub fn parse_registry(content: &str) -> Result<Vec<Target>> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries = match serde_yaml::from_str::<RegistryFile>(content)? {
        RegistryFile::List(entries) => entries,
        RegistryFile::Wrapped { targets } => targets,
    };

    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(entries.len());
    for (index, entry) in entries.into_iter().enumerate() {
        let (id, metadata) = match entry {
            RegistryEntry::Bare(id) => (id, Metadata::new()),
            RegistryEntry::Full { id, metadata } => (id, metadata),
        };
        let id = id.trim().to_string();
        if id.is_empty() {
            return Err(AuditqError::Registry(format!("Entry {} has a blank id", index + 1)));
        }
        if !seen.insert(id.clone()) {
            log::warn!("Duplicate registry entry {} ignored", id);
            continue;
        }
        targets.push(Target { id, metadata });
    }

    Ok(targets)
}

/// Load the registry file. A missing file is an error.
pub fn load_registry(path: &Path) -> Result<Vec<Target>> {
    if !path.exists() {
        return Err(AuditqError::Registry(format!("Registry not found: {}", path.display())));
    }
    let content = fs::read_to_string(path)?;
    let targets = parse_registry(&content)?;
    log::info!("Loaded {} target(s) from {}", targets.len(), path.display());
    Ok(targets)
}
