use chrono::Utc;
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

mod cli;
mod config;

use auditq::audit::{AuditEngine, AuditResult};
use auditq::domain::Category;
use auditq::registry::load_registry;
use auditq::runner::{BatchRunner, TargetOutcome};
use auditq::scheduler::{BatchSelection, Pools, categorize, select_batch};
use auditq::store::{MemoryOutcomeStore, OutcomeStore, SqliteOutcomeStore};
use cli::Cli;
use cli::commands::{Commands, SelectArgs};
use config::Config;

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("auditq")
        .join("logs");
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("auditq.log");
    let target = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .context("Failed to open log file")?;

    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .target(env_logger::Target::Pipe(Box::new(target)))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Plan { select } => handle_plan_command(select, config),
        Commands::Run { select } => handle_run_command(select, config).await,
        Commands::Status { registry } => handle_status_command(registry.as_deref(), config),
        Commands::Audit { target } => handle_audit_command(target, config).await,
    }
}

/// Open the outcome store. An unusable store is not fatal: scheduling
/// proceeds as if no target had history.
fn open_store(path: &Path) -> Option<SqliteOutcomeStore> {
    match SqliteOutcomeStore::open(path) {
        Ok(store) => Some(store),
        Err(e) => {
            log::warn!("Outcome store {} unavailable, scheduling without history: {}", path.display(), e);
            None
        }
    }
}

/// Load the registry and store, and split targets into pools.
fn load_pools(registry: Option<&Path>, config: &Config) -> Result<(Option<SqliteOutcomeStore>, Pools)> {
    let registry_path = registry.unwrap_or(config.registry.path.as_path());
    let targets = load_registry(registry_path).context("Failed to load target registry")?;

    let store = open_store(&config.store.path);
    let empty = MemoryOutcomeStore::new();
    let history: &dyn OutcomeStore = match &store {
        Some(store) => store,
        None => &empty,
    };

    let categorized = categorize(&targets, history, Utc::now(), &config.policy);
    Ok((store, Pools::from_categorized(categorized)))
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

fn select_targets(select: &SelectArgs, config: &Config) -> Result<(Option<SqliteOutcomeStore>, BatchSelection)> {
    let (store, pools) = load_pools(select.registry.as_deref(), config)?;
    let batch_size = select.batch_size.unwrap_or(config.batch.size);
    let mut rng = make_rng(select.seed);
    let selection = select_batch(&pools, batch_size, &config.batch.percentages, &mut rng);
    Ok((store, selection))
}

fn print_counts(selection: &BatchSelection) {
    println!(
        "{:<18} {:>9} {:>9} {:>9}",
        "Category".bold(),
        "Available".bold(),
        "Cooldown".bold(),
        "Allocated".bold()
    );
    for category in Category::ALL {
        let count = |map: &std::collections::BTreeMap<Category, usize>| map.get(&category).copied().unwrap_or(0);
        println!(
            "{:<18} {:>9} {:>9} {:>9}",
            category.as_str(),
            count(&selection.available_counts),
            count(&selection.cooldown_counts),
            count(&selection.allocation)
        );
    }
}

fn print_selection(selection: &BatchSelection) {
    print_counts(selection);
    println!();
    println!("{} {} target(s)", "Selected:".green(), selection.selected.len());
    for target in &selection.selected {
        println!("  {}", target.id);
    }
}

fn print_result(id: &str, result: &AuditResult) {
    match result {
        AuditResult::Success { scores, attempts } => println!(
            "{} {} perf {} a11y {} bp {} seo {} pwa {} ({} attempt(s))",
            "✓".green(),
            id,
            scores.performance,
            scores.accessibility,
            scores.best_practices,
            scores.seo,
            scores.pwa,
            attempts
        ),
        AuditResult::Failure(failure) => {
            println!("{} {} {}", "✗".red(), id, failure.message.as_str().dimmed())
        }
    }
}

fn handle_plan_command(select_args: &SelectArgs, config: &Config) -> Result<()> {
    info!("Planning batch: {:?}", select_args);
    let (_, selection) = select_targets(select_args, config)?;
    print_selection(&selection);
    Ok(())
}

fn persist(store: &SqliteOutcomeStore, outcome: &TargetOutcome) -> auditq::Result<()> {
    let now = Utc::now();
    match &outcome.result {
        AuditResult::Success { scores, .. } => store.record_success(&outcome.target.id, *scores, now),
        AuditResult::Failure(failure) => store.record_failure(&outcome.target.id, &failure.message, now),
    }
}

async fn handle_run_command(select_args: &SelectArgs, config: &Config) -> Result<()> {
    info!("Running batch: {:?}", select_args);
    let (store, selection) = select_targets(select_args, config)?;
    print_selection(&selection);
    println!();

    let engine = AuditEngine::new(Arc::new(config.launcher())).with_config(config.engine_config());
    let runner = BatchRunner::new(Arc::new(engine), config.inter_attempt_delay());

    if store.is_none() {
        println!("{} outcome store unavailable, results will not be recorded", "Warning:".yellow());
    }

    let mut unsaved = 0;
    let report = runner
        .run_with(&selection.selected, |outcome| {
            print_result(&outcome.target.id, &outcome.result);
            let Some(store) = &store else {
                unsaved += 1;
                return;
            };
            if let Err(e) = persist(store, outcome) {
                log::error!("Failed to record outcome for {}: {}", outcome.target.id, e);
                unsaved += 1;
            }
        })
        .await;

    println!();
    println!(
        "{} {} succeeded, {} failed",
        "Done:".green(),
        report.succeeded.to_string().green(),
        report.failed.to_string().red()
    );
    if unsaved > 0 {
        println!("{} {} outcome(s) could not be recorded", "Warning:".yellow(), unsaved);
    }
    Ok(())
}

fn handle_status_command(registry: Option<&Path>, config: &Config) -> Result<()> {
    info!("Showing status");
    let (store, pools) = load_pools(registry, config)?;
    let selection = BatchSelection {
        available_counts: pools.available_counts(),
        cooldown_counts: pools.cooldown_counts(),
        ..BatchSelection::default()
    };
    print_counts(&selection);
    println!();
    match &store {
        Some(store) => println!(
            "{} {} available, {} attempt(s) recorded",
            "Total:".green(),
            pools.total_available(),
            store.count().context("Failed to count attempts")?
        ),
        None => println!(
            "{} {} available, outcome store unavailable",
            "Total:".green(),
            pools.total_available()
        ),
    }
    Ok(())
}

async fn handle_audit_command(target: &str, config: &Config) -> Result<()> {
    info!("Auditing single target: {}", target);
    let engine = AuditEngine::new(Arc::new(config.launcher())).with_config(config.engine_config());
    let result = engine.run_audit(target).await;
    print_result(target, &result);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.is_verbose()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
