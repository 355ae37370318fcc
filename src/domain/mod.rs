//! Domain types for auditq
//!
//! This module contains the core domain types:
//! - Target: a domain from the registry plus its opaque metadata
//! - Category: classification derived from a target's attempt history
//! - AttemptRecord / AttemptOutcome / ScoreSet: one audit attempt and its result

pub mod category;
pub mod outcome;
pub mod target;

pub use category::Category;
pub use outcome::{AttemptOutcome, AttemptRecord, ScoreSet};
pub use target::{Metadata, Target};
