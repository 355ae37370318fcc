//! Audit execution engine.
//!
//! Each attempt walks a fixed lifecycle:
//!
//! ```text
//! Launching -> Running -> Succeeded ----------> Cleanup
//!                      -> Failed -------------> Cleanup
//!                      -> TimingOut -> Failed -> Cleanup
//! Launching -> Failed (launch error, nothing to clean up)
//! ```
//!
//! Cleanup always checks whether the process is still alive and terminates it,
//! including after a success. A timed-out process is terminated before the
//! attempt resolves. Retryable failures are retried with escalating backoff;
//! everything ends as an [`AuditResult`], never an error.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use super::error::{AuditError, ErrorClass, classify};
use super::process::AuditLauncher;
use super::report::parse_report;
use super::retry::RetryPolicy;
use super::target::normalize_target;
use crate::domain::ScoreSet;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard wall-clock limit for one attempt
    pub timeout: Duration,
    /// How long a process gets to exit after SIGTERM before it is killed
    pub grace: Duration,
    /// Failure messages are truncated to this many characters
    pub max_message_len: usize,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            grace: Duration::from_secs(5),
            max_message_len: 500,
            retry: RetryPolicy::default(),
        }
    }
}

/// Lifecycle phases of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Launching,
    Running,
    TimingOut,
    Succeeded,
    Failed,
    Cleanup,
}

impl fmt::Display for AttemptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttemptPhase::Launching => "launching",
            AttemptPhase::Running => "running",
            AttemptPhase::TimingOut => "timing_out",
            AttemptPhase::Succeeded => "succeeded",
            AttemptPhase::Failed => "failed",
            AttemptPhase::Cleanup => "cleanup",
        };
        write!(f, "{}", name)
    }
}

/// Result of a single attempt, with the phases it went through.
#[derive(Debug)]
pub struct AttemptReport {
    pub result: Result<ScoreSet, AuditError>,
    pub phases: Vec<AttemptPhase>,
}

/// A terminal audit failure, shaped like an audit that produced nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureResult {
    /// Always all zeros
    pub scores: ScoreSet,
    /// Truncated failure message
    pub message: String,
    pub class: ErrorClass,
    /// Attempts made, 0 if the target was never launched
    pub attempts: u32,
}

/// Outcome of [`AuditEngine::run_audit`].
#[derive(Debug, Clone, PartialEq)]
pub enum AuditResult {
    Success { scores: ScoreSet, attempts: u32 },
    Failure(FailureResult),
}

impl AuditResult {
    pub fn is_error(&self) -> bool {
        matches!(self, AuditResult::Failure(_))
    }

    /// Scores, all zeros on failure.
    pub fn scores(&self) -> ScoreSet {
        match self {
            AuditResult::Success { scores, .. } => *scores,
            AuditResult::Failure(failure) => failure.scores,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            AuditResult::Success { attempts, .. } => *attempts,
            AuditResult::Failure(failure) => failure.attempts,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            AuditResult::Success { .. } => None,
            AuditResult::Failure(failure) => Some(&failure.message),
        }
    }
}

/// Anything that can audit a target and always come back with a result.
#[async_trait]
pub trait Auditor: Send + Sync {
    async fn run_audit(&self, target: &str) -> AuditResult;
}

/// Truncate to `max` characters, marking the cut.
pub fn truncate_message(message: &str, max: usize) -> String {
    if message.chars().count() <= max {
        return message.to_string();
    }
    let mut truncated: String = message.chars().take(max).collect();
    truncated.push_str("...");
    truncated
}

/// Drives one target through launch, timeout, retry and cleanup.
pub struct AuditEngine {
    launcher: Arc<dyn AuditLauncher>,
    config: EngineConfig,
}

impl AuditEngine {
    pub fn new(launcher: Arc<dyn AuditLauncher>) -> Self {
        Self {
            launcher,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Upper bound on how long `run_audit` can take.
    pub fn time_budget(&self) -> Duration {
        let attempts = self.config.retry.max_retries + 1;
        // Each attempt: the timeout, then up to two grace periods (timing out, then cleanup)
        (self.config.timeout + self.config.grace * 2) * attempts + self.config.retry.worst_case_backoff()
    }

    /// Run a single attempt against an already-normalized URL.
    pub async fn run_attempt(&self, url: &str) -> AttemptReport {
        let mut phases = vec![AttemptPhase::Launching];

        let mut session = match self.launcher.launch(url).await {
            Ok(session) => session,
            Err(e) => {
                phases.push(AttemptPhase::Failed);
                return AttemptReport { result: Err(e), phases };
            }
        };

        phases.push(AttemptPhase::Running);
        tracing::debug!(url, pid = ?session.pid(), "Audit running");
        let deadline = Instant::now() + self.config.timeout;

        let collected = match tokio::time::timeout_at(deadline, session.collect(deadline)).await {
            Ok(Err(AuditError::Timeout(_))) | Err(_) => None,
            Ok(collected) => Some(collected),
        };

        let result = match collected {
            Some(Ok(raw)) => parse_report(&raw),
            Some(Err(e)) => Err(e),
            None => {
                phases.push(AttemptPhase::TimingOut);
                let termination = session.terminate(self.config.grace).await;
                tracing::warn!(url, ?termination, "Audit timed out, process terminated");
                Err(AuditError::Timeout(self.config.timeout))
            }
        };

        phases.push(if result.is_ok() {
            AttemptPhase::Succeeded
        } else {
            AttemptPhase::Failed
        });

        phases.push(AttemptPhase::Cleanup);
        if session.is_running() {
            let termination = session.terminate(self.config.grace).await;
            tracing::debug!(url, ?termination, "Audit process still alive at cleanup, terminated");
        }

        AttemptReport { result, phases }
    }

    fn failure(&self, error: &AuditError, class: ErrorClass, attempts: u32) -> AuditResult {
        AuditResult::Failure(FailureResult {
            scores: ScoreSet::zero(),
            message: truncate_message(&error.to_string(), self.config.max_message_len),
            class,
            attempts,
        })
    }

    /// Audit a target, retrying retryable failures.
    pub async fn run_audit(&self, target: &str) -> AuditResult {
        let url = match normalize_target(target) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Skipping {}: {}", target, e);
                return self.failure(&e, ErrorClass::Terminal, 0);
            }
        };

        let policy = &self.config.retry;
        let mut retry = 0;
        loop {
            let report = self.run_attempt(&url).await;
            let attempts = retry + 1;

            let error = match report.result {
                Ok(scores) => {
                    log::info!("Audit of {} succeeded on attempt {}", url, attempts);
                    return AuditResult::Success { scores, attempts };
                }
                Err(error) => error,
            };

            let class = classify(&error);
            if !policy.should_retry(class, retry) {
                log::warn!("Audit of {} failed after {} attempt(s): {}", url, attempts, error);
                return self.failure(&error, class, attempts);
            }

            let delay = policy.delay_for(class, retry);
            tracing::warn!(
                url = url.as_str(),
                attempt = attempts,
                ?class,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Retryable audit failure, backing off"
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}

#[async_trait]
impl Auditor for AuditEngine {
    async fn run_audit(&self, target: &str) -> AuditResult {
        AuditEngine::run_audit(self, target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::mock::{MockLauncher, MockStep};

    const REPORT: &str = r#"{"categories": {"performance": {"score": 0.9}, "accessibility": {"score": 0.8},
        "best-practices": {"score": 0.7}, "seo": {"score": 0.6}, "pwa": {"score": 0.5}}}"#;

    fn engine(launcher: &Arc<MockLauncher>) -> AuditEngine {
        AuditEngine::new(launcher.clone()).with_config(EngineConfig {
            timeout: Duration::from_secs(60),
            grace: Duration::from_secs(1),
            max_message_len: 40,
            retry: RetryPolicy::new(2, Duration::from_secs(1), 3, 4),
        })
    }

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("short", 10), "short");
        assert_eq!(truncate_message("abcdefghij", 4), "abcd...");
        assert_eq!(truncate_message("ééééé", 2), "éé...");
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(AttemptPhase::TimingOut.to_string(), "timing_out");
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_first_attempt() {
        let launcher = Arc::new(MockLauncher::new(vec![MockStep::Report(REPORT.into())]));

        let result = engine(&launcher).run_audit("example.gov/path?x=1").await;

        assert_eq!(
            result,
            AuditResult::Success {
                scores: ScoreSet {
                    performance: 90,
                    accessibility: 80,
                    best_practices: 70,
                    seo: 60,
                    pwa: 50
                },
                attempts: 1
            }
        );
        assert_eq!(launcher.stats().urls(), vec!["https://example.gov".to_string()]);
        assert_eq!(launcher.stats().leaked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_phases_on_success() {
        let launcher = Arc::new(MockLauncher::new(vec![MockStep::Report(REPORT.into())]));

        let report = engine(&launcher).run_attempt("https://example.gov").await;

        assert!(report.result.is_ok());
        assert_eq!(
            report.phases,
            vec![
                AttemptPhase::Launching,
                AttemptPhase::Running,
                AttemptPhase::Succeeded,
                AttemptPhase::Cleanup
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_terminates_lingering_process_after_success() {
        let launcher = Arc::new(MockLauncher::new(vec![MockStep::ReportAndLinger(REPORT.into())]));

        let result = engine(&launcher).run_audit("example.gov").await;

        assert!(!result.is_error());
        assert_eq!(launcher.stats().terminations(), 1);
        assert_eq!(launcher.stats().live(), 0);
        assert_eq!(launcher.stats().leaked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_closed_retried_until_success() {
        let launcher = Arc::new(MockLauncher::new(vec![
            MockStep::Fail(AuditError::Process("Protocol error: Target closed".into())),
            MockStep::Fail(AuditError::Process("Protocol error: Target closed".into())),
            MockStep::Report(REPORT.into()),
        ]));
        let started = Instant::now();

        let result = engine(&launcher).run_audit("example.gov").await;

        assert!(!result.is_error());
        assert_eq!(result.attempts(), 3);
        assert_eq!(launcher.stats().launches(), 3);
        // 1s * 1 * 3, then 1s * 2 * 3
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(9), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(10), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_errors_back_off_longer() {
        let launcher = Arc::new(MockLauncher::new(vec![
            MockStep::Fail(AuditError::Process("net::ERR_CONNECTION_REFUSED".into())),
            MockStep::Report(REPORT.into()),
        ]));
        let started = Instant::now();

        let result = engine(&launcher).run_audit("example.gov").await;

        assert!(!result.is_error());
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_hangs_returns_timeout_failure() {
        let launcher = Arc::new(MockLauncher::new(vec![MockStep::Hang]));
        let engine = engine(&launcher);
        let started = Instant::now();

        let result = engine.run_audit("example.gov").await;

        assert!(result.is_error());
        assert!(result.scores().is_zero());
        assert_eq!(result.attempts(), 3);
        assert!(result.error_message().unwrap().contains("timed out"));
        assert_eq!(launcher.stats().launches(), 3);
        assert!(launcher.stats().terminations() >= 3);
        assert_eq!(launcher.stats().live(), 0);
        assert_eq!(launcher.stats().leaked(), 0);
        assert!(started.elapsed() <= engine.time_budget());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_phases() {
        let launcher = Arc::new(MockLauncher::new(vec![MockStep::Hang]));

        let report = engine(&launcher).run_attempt("https://example.gov").await;

        assert!(matches!(report.result, Err(AuditError::Timeout(_))));
        assert_eq!(
            report.phases,
            vec![
                AttemptPhase::Launching,
                AttemptPhase::Running,
                AttemptPhase::TimingOut,
                AttemptPhase::Failed,
                AttemptPhase::Cleanup
            ]
        );
        assert_eq!(launcher.stats().terminations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_report_not_retried() {
        let launcher = Arc::new(MockLauncher::new(vec![MockStep::Report("<html>oops</html>".into())]));

        let result = engine(&launcher).run_audit("example.gov").await;

        match result {
            AuditResult::Failure(failure) => {
                assert_eq!(failure.class, ErrorClass::Terminal);
                assert_eq!(failure.attempts, 1);
                assert!(failure.scores.is_zero());
                assert!(failure.message.starts_with("Malformed audit report"));
                assert!(failure.message.chars().count() <= 43);
            }
            other => panic!("Expected failure, got {:?}", other),
        }
        assert_eq!(launcher.stats().launches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_is_retried() {
        let launcher = Arc::new(MockLauncher::new(vec![
            MockStep::LaunchFail("resource temporarily unavailable".into()),
            MockStep::Report(REPORT.into()),
        ]));

        let result = engine(&launcher).run_audit("example.gov").await;

        assert!(!result.is_error());
        assert_eq!(result.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_failure_phases() {
        let launcher = Arc::new(MockLauncher::new(vec![MockStep::LaunchFail("spawn failed".into())]));

        let report = engine(&launcher).run_attempt("https://example.gov").await;

        assert!(matches!(report.result, Err(AuditError::Launch(_))));
        assert_eq!(report.phases, vec![AttemptPhase::Launching, AttemptPhase::Failed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_target_never_launches() {
        let launcher = Arc::new(MockLauncher::new(vec![MockStep::Report(REPORT.into())]));

        let result = engine(&launcher).run_audit("ftp://example.gov").await;

        assert!(result.is_error());
        assert_eq!(result.attempts(), 0);
        assert_eq!(launcher.stats().launches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_process_alive_at_a_time() {
        let launcher = Arc::new(MockLauncher::new(vec![
            MockStep::Hang,
            MockStep::Fail(AuditError::Process("Target closed".into())),
            MockStep::ReportAndLinger(REPORT.into()),
        ]));

        let result = engine(&launcher).run_audit("example.gov").await;

        assert!(!result.is_error());
        assert_eq!(launcher.stats().max_live(), 1);
        assert_eq!(launcher.stats().live(), 0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_crashing_process_is_retried() {
        use crate::audit::process::CommandLauncher;

        let launcher = CommandLauncher::new("sh", vec!["-c".to_string(), "kill -SEGV $$".to_string()]);
        let engine = AuditEngine::new(Arc::new(launcher)).with_config(EngineConfig {
            timeout: Duration::from_secs(10),
            grace: Duration::from_millis(100),
            max_message_len: 200,
            retry: RetryPolicy::new(2, Duration::from_millis(10), 3, 4),
        });

        match engine.run_audit("example.gov").await {
            AuditResult::Failure(failure) => {
                assert_eq!(failure.class, ErrorClass::SessionClosed);
                assert_eq!(failure.attempts, 3);
                assert!(failure.message.contains("process crashed"));
            }
            other => panic!("Expected failure, got {:?}", other),
        }
    }
}
