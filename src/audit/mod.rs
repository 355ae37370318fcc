//! Audit execution: supervising the external auditing tool.
//!
//! This module provides:
//! - **Launcher/session traits** over the child process ([`AuditLauncher`], [`AuditSession`])
//! - **CommandLauncher**: spawns the Lighthouse CLI with `kill_on_drop`
//! - **AuditEngine**: one bounded, retryable audit per target, never leaking a process
//! - **Classification** of failures into retryable classes and backoff policy
//! - **MockLauncher**: scripted sessions for tests

pub mod engine;
pub mod error;
pub mod mock;
pub mod process;
pub mod report;
pub mod retry;
pub mod target;

pub use engine::{AttemptPhase, AttemptReport, AuditEngine, AuditResult, Auditor, EngineConfig, FailureResult};
pub use error::{AuditError, ErrorClass, classify, classify_message};
pub use mock::{MockLauncher, MockStats, MockStep};
pub use process::{AuditLauncher, AuditSession, ChildSession, CommandLauncher, Termination};
pub use report::parse_report;
pub use retry::RetryPolicy;
pub use target::normalize_target;
