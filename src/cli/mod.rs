//! CLI module for auditq - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for planning a batch,
//! running it, inspecting category counts, and auditing a single target.

pub mod commands;

pub use commands::Cli;
