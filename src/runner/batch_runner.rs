//! Batch runner implementation.
//!
//! Targets are audited strictly in order. Each outcome is handed to a sink as
//! soon as it is known so the caller can persist it, then the runner waits the
//! inter-attempt delay before the next target. The delay is skipped after the
//! last target. A failing target never stops the batch.

use std::sync::Arc;
use std::time::Duration;

use crate::audit::{AuditResult, Auditor};
use crate::domain::Target;

/// One audited target.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOutcome {
    pub target: Target,
    pub result: AuditResult,
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub outcomes: Vec<TargetOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    fn push(&mut self, outcome: TargetOutcome) {
        if outcome.result.is_error() {
            self.failed += 1;
        } else {
            self.succeeded += 1;
        }
        self.outcomes.push(outcome);
    }
}

/// Runs a batch through an [`Auditor`].
pub struct BatchRunner {
    auditor: Arc<dyn Auditor>,
    delay: Duration,
}

impl BatchRunner {
    pub fn new(auditor: Arc<dyn Auditor>, delay: Duration) -> Self {
        Self { auditor, delay }
    }

    /// Audit every target, returning the combined report.
    pub async fn run(&self, targets: &[Target]) -> BatchReport {
        self.run_with(targets, |_| {}).await
    }

    /// Audit every target, calling `sink` with each outcome as it completes.
    pub async fn run_with<F>(&self, targets: &[Target], mut sink: F) -> BatchReport
    where
        F: FnMut(&TargetOutcome),
    {
        let mut report = BatchReport::default();
        log::info!("Running batch of {} target(s)", targets.len());

        for (index, target) in targets.iter().enumerate() {
            log::debug!("Auditing {} ({}/{})", target.id, index + 1, targets.len());
            let result = self.auditor.run_audit(&target.id).await;

            let outcome = TargetOutcome {
                target: target.clone(),
                result,
            };
            sink(&outcome);
            report.push(outcome);

            if index + 1 < targets.len() && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
        }

        log::info!(
            "Batch complete: {} succeeded, {} failed",
            report.succeeded,
            report.failed
        );
        report
    }
}
