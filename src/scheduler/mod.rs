//! Scheduler: decides which targets to audit this run.
//!
//! This module provides:
//! - **Categorization**: joins registry targets with their attempt history to
//!   assign each one a [`Category`](crate::domain::Category) and a cooldown.
//! - **Allocation**: splits a fixed batch across categories by percentage,
//!   redistributes shortfall in priority order, and draws targets at random.
//!
//! # Example
//!
//! ```ignore
//! use auditq::scheduler::{CategoryPolicy, Percentages, Pools, categorize, select_batch};
//!
//! let categorized = categorize(&targets, &store, Utc::now(), &CategoryPolicy::default());
//! let pools = Pools::from_categorized(categorized);
//! let selection = select_batch(&pools, 10, &Percentages::default(), &mut rand::rng());
//! ```

mod allocate;
mod categorize;

pub use allocate::{BatchSelection, Percentages, allocate, select_batch};
pub use categorize::{
    CategorizedTarget, CategoryPolicy, Pools, categorize, categorize_with_histories, classify, cooldown_days,
};
