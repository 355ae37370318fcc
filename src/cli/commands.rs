//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - plan: select a batch without auditing
//! - run: select a batch, audit it, persist outcomes
//! - status: per-category counts
//! - audit: audit one target

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// auditq - prioritized batch scheduler for site audits
#[derive(Parser, Debug)]
#[command(name = "auditq")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Batch selection options shared by `plan` and `run`
#[derive(Args, Debug, Clone, Default)]
pub struct SelectArgs {
    /// Override the configured batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Seed the shuffle for a reproducible selection
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Override the registry file
    #[arg(short, long)]
    pub registry: Option<PathBuf>,
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Select the next batch and print it without auditing
    Plan {
        #[command(flatten)]
        select: SelectArgs,
    },

    /// Select the next batch, audit it, and record every outcome
    Run {
        #[command(flatten)]
        select: SelectArgs,
    },

    /// Show per-category counts of available and cooling-down targets
    Status {
        /// Override the registry file
        #[arg(short, long)]
        registry: Option<PathBuf>,
    },

    /// Audit a single target and print its scores (not recorded)
    Audit {
        /// Target domain or URL
        target: String,
    },
}
