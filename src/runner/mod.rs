//! Batch runner module - audits a selected batch one target at a time.
//!
//! This module provides:
//! - BatchRunner for sequential execution with a fixed inter-attempt delay
//! - TargetOutcome pairing each target with its audit result
//! - BatchReport with per-target outcomes and the success/failure tally

mod batch_runner;

pub use batch_runner::{BatchReport, BatchRunner, TargetOutcome};
