//! End-to-end batch integration tests
//!
//! Registry file -> SQLite store -> categorizer -> allocator -> runner with a
//! scripted launcher -> recorded outcomes -> categorizer again.

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use auditq::audit::{AuditEngine, AuditError, AuditResult, EngineConfig, MockLauncher, MockStep, RetryPolicy};
use auditq::domain::{Category, ScoreSet};
use auditq::error::Result;
use auditq::registry::load_registry;
use auditq::runner::BatchRunner;
use auditq::scheduler::{CategoryPolicy, Percentages, Pools, categorize, select_batch};
use auditq::store::SqliteOutcomeStore;
use chrono::{TimeDelta, Utc};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;

const REPORT: &str = r#"{"categories": {"performance": {"score": 0.91}, "accessibility": {"score": 1},
    "best-practices": {"score": 0.5}, "seo": {"score": 0.88}, "pwa": {"score": null}}}"#;

fn write_registry(dir: &TempDir, count: usize) -> Result<std::path::PathBuf> {
    let mut yaml = String::from("targets:\n");
    for i in 0..count {
        yaml.push_str(&format!("  - id: site{}.gov\n    metadata:\n      index: {}\n", i, i));
    }
    let path = dir.path().join("targets.yml");
    fs::write(&path, yaml)?;
    Ok(path)
}

fn engine(launcher: &Arc<MockLauncher>) -> AuditEngine {
    AuditEngine::new(launcher.clone()).with_config(EngineConfig {
        timeout: Duration::from_secs(10),
        grace: Duration::from_millis(100),
        max_message_len: 200,
        retry: RetryPolicy::new(1, Duration::from_millis(10), 3, 4),
    })
}

/// A target that failed hours ago is cooling down and never selected
#[test]
fn test_cooldown_target_excluded_from_selection() -> Result<()> {
    let dir = TempDir::new()?;
    let targets = load_registry(&write_registry(&dir, 6)?)?;
    let store = SqliteOutcomeStore::open(&dir.path().join("state").join("outcomes.db"))?;

    let now = Utc::now();
    for days in [2, 3, 4] {
        store.record_success("site0.gov", ScoreSet::zero(), now - TimeDelta::days(days))?;
    }
    store.record_failure("site0.gov", "Target closed", now - TimeDelta::hours(12))?;

    let categorized = categorize(&targets, &store, now, &CategoryPolicy::default());
    let site0 = categorized.iter().find(|c| c.target.id == "site0.gov").unwrap();
    assert_eq!(site0.category, Category::ReliableSuccess);
    assert_eq!(site0.cooldown_days, 1);

    let pools = Pools::from_categorized(categorized);
    let mut rng = StdRng::seed_from_u64(3);
    let selection = select_batch(&pools, 10, &Percentages::default(), &mut rng);

    assert_eq!(selection.selected.len(), 5);
    assert!(selection.selected.iter().all(|t| t.id != "site0.gov"));
    assert_eq!(selection.cooldown_counts[&Category::ReliableSuccess], 1);
    Ok(())
}

/// A full run records every outcome and the next categorization reflects it
#[tokio::test(start_paused = true)]
async fn test_run_records_outcomes_and_recategorizes() -> Result<()> {
    let dir = TempDir::new()?;
    let targets = load_registry(&write_registry(&dir, 20)?)?;
    let store = SqliteOutcomeStore::open(&dir.path().join("outcomes.db"))?;
    let policy = CategoryPolicy::default();

    let pools = Pools::from_categorized(categorize(&targets, &store, Utc::now(), &policy));
    let mut rng = StdRng::seed_from_u64(11);
    let selection = select_batch(&pools, 4, &Percentages::default(), &mut rng);
    assert_eq!(selection.allocation[&Category::NeverTested], 4);

    let launcher = Arc::new(MockLauncher::new(vec![
        MockStep::Report(REPORT.into()),
        MockStep::Fail(AuditError::Malformed("no categories".into())),
        MockStep::Report(REPORT.into()),
    ]));
    let runner = BatchRunner::new(Arc::new(engine(&launcher)), Duration::from_secs(1));

    let mut write_errors = 0;
    let report = runner
        .run_with(&selection.selected, |outcome| {
            let now = Utc::now();
            let written = match &outcome.result {
                AuditResult::Success { scores, .. } => store.record_success(&outcome.target.id, *scores, now),
                AuditResult::Failure(failure) => store.record_failure(&outcome.target.id, &failure.message, now),
            };
            if written.is_err() {
                write_errors += 1;
            }
        })
        .await;

    assert_eq!(write_errors, 0);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(store.count()?, 4);
    assert_eq!(launcher.stats().leaked(), 0);

    let failed_id = report.outcomes[1].target.id.clone();
    let first_id = report.outcomes[0].target.id.clone();
    assert_eq!(
        store.latest_scores(&first_id)?,
        Some(ScoreSet {
            performance: 91,
            accessibility: 100,
            best_practices: 50,
            seo: 88,
            pwa: 0
        })
    );

    let categorized = categorize(&targets, &store, Utc::now(), &policy);
    for entry in &categorized {
        let audited = selection.selected.iter().any(|t| t.id == entry.target.id);
        if entry.target.id == failed_id {
            assert_eq!(entry.category, Category::FailedOnly);
            assert!(entry.in_cooldown());
        } else if audited {
            assert_eq!(entry.category, Category::RecentMixed);
            assert!(!entry.in_cooldown());
        } else {
            assert_eq!(entry.category, Category::NeverTested);
        }
    }

    // The next batch never repeats the cooling-down failure
    let pools = Pools::from_categorized(categorized);
    let next = select_batch(&pools, 20, &Percentages::default(), &mut rng);
    assert_eq!(next.selected.len(), 19);
    let ids: HashSet<_> = next.selected.iter().map(|t| t.id.clone()).collect();
    assert_eq!(ids.len(), 19);
    assert!(!ids.contains(&failed_id));
    Ok(())
}

/// An unreadable registry is fatal before anything is scheduled
#[test]
fn test_missing_registry_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    assert!(load_registry(&dir.path().join("nope.yml")).is_err());
    Ok(())
}
