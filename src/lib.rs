//! auditq - a prioritized batch scheduler for site audits
//!
//! auditq decides which targets to audit next from their attempt history,
//! draws a bounded batch across priority categories, and drives an external
//! auditing tool one target at a time under a hard timeout, retrying transient
//! failures and never leaving a child process behind.

pub mod audit;
pub mod domain;
pub mod error;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod store;

pub use error::{AuditqError, Result};
