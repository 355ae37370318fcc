//! Scripted audit launcher for tests and dry runs.
//!
//! Each launch consumes the next [`MockStep`]; once the script runs out the
//! last step repeats. [`MockStats`] records launches, terminations and any
//! session dropped while its process was still "running".

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::error::AuditError;
use super::process::{AuditLauncher, AuditSession, Termination};

/// What a scripted attempt does.
#[derive(Debug, Clone)]
pub enum MockStep {
    /// Exit cleanly after printing this report
    Report(String),
    /// Print the report but keep running
    ReportAndLinger(String),
    /// Exit with this error
    Fail(AuditError),
    /// Never finish
    Hang,
    /// Fail to start at all
    LaunchFail(String),
}

/// Counters shared by a launcher and its sessions.
#[derive(Debug, Default)]
pub struct MockStats {
    launches: AtomicU32,
    terminations: AtomicU32,
    live: AtomicI32,
    max_live: AtomicI32,
    leaked: AtomicU32,
    urls: Mutex<Vec<String>>,
}

impl MockStats {
    pub fn launches(&self) -> u32 {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> u32 {
        self.terminations.load(Ordering::SeqCst)
    }

    /// Sessions currently running.
    pub fn live(&self) -> i32 {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously running sessions seen.
    pub fn max_live(&self) -> i32 {
        self.max_live.load(Ordering::SeqCst)
    }

    /// Sessions dropped while still running.
    pub fn leaked(&self) -> u32 {
        self.leaked.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

/// Launcher that plays back a script of [`MockStep`]s.
#[derive(Debug)]
pub struct MockLauncher {
    script: Mutex<VecDeque<MockStep>>,
    last: Mutex<Option<MockStep>>,
    stats: Arc<MockStats>,
}

impl MockLauncher {
    pub fn new(script: Vec<MockStep>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            stats: Arc::new(MockStats::default()),
        }
    }

    /// Launcher that repeats `step` on every launch.
    pub fn always(step: MockStep) -> Self {
        Self::new(vec![step])
    }

    pub fn stats(&self) -> Arc<MockStats> {
        self.stats.clone()
    }

    fn next_step(&self) -> MockStep {
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match next {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or(MockStep::Hang),
        }
    }
}

#[async_trait]
impl AuditLauncher for MockLauncher {
    async fn launch(&self, url: &str) -> Result<Box<dyn AuditSession>, AuditError> {
        let step = self.next_step();
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut urls) = self.stats.urls.lock() {
            urls.push(url.to_string());
        }

        if let MockStep::LaunchFail(msg) = step {
            return Err(AuditError::Launch(msg));
        }

        let live = self.stats.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_live.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(MockSession {
            step,
            running: true,
            stats: self.stats.clone(),
        }))
    }
}

struct MockSession {
    step: MockStep,
    running: bool,
    stats: Arc<MockStats>,
}

impl MockSession {
    fn exit(&mut self) {
        if self.running {
            self.running = false;
            self.stats.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl AuditSession for MockSession {
    fn pid(&self) -> Option<u32> {
        None
    }

    async fn collect(&mut self, _deadline: Instant) -> Result<String, AuditError> {
        match self.step.clone() {
            MockStep::Report(report) => {
                self.exit();
                Ok(report)
            }
            MockStep::ReportAndLinger(report) => Ok(report),
            MockStep::Fail(error) => {
                self.exit();
                Err(error)
            }
            MockStep::Hang | MockStep::LaunchFail(_) => {
                std::future::pending::<()>().await;
                unreachable!("pending never resolves")
            }
        }
    }

    fn is_running(&mut self) -> bool {
        self.running
    }

    async fn terminate(&mut self, _grace: Duration) -> Termination {
        self.stats.terminations.fetch_add(1, Ordering::SeqCst);
        if self.running {
            self.exit();
            Termination::Graceful
        } else {
            Termination::AlreadyExited
        }
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        if self.running {
            self.stats.leaked.fetch_add(1, Ordering::SeqCst);
            self.exit();
        }
    }
}
