//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::registry::Selection;

/// Test runner that spreads tests across worker processes by historical runtime
#[derive(Parser, Debug)]
#[command(name = "testfleet")]
#[command(version)]
#[command(about = "Run tests across parallel workers scheduled by historical runtime")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: search standard locations)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run tests
    Run(RunArgs),

    /// List registered tests and their estimates
    List(ListArgs),

    /// Inspect or manage the runtime history
    History(HistoryArgs),

    /// Show or create configuration
    Config(ConfigArgs),
}

/// Test selection shared by `run` and `list`
#[derive(Parser, Debug, Clone, Default)]
pub struct SelectArgs {
    /// Test specifiers (`suite:name` or `name`); none selects all
    pub specifiers: Vec<String>,

    /// Match specifiers exactly instead of by substring
    #[arg(long)]
    pub exact: bool,

    /// Only tests defined in this source file (repeatable)
    #[arg(long = "file", value_name = "FILE")]
    pub files: Vec<String>,

    /// Only tests whose source file lives under this directory
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

impl SelectArgs {
    pub fn selection(&self) -> Selection {
        Selection {
            specifiers: self.specifiers.clone(),
            exact: self.exact,
            files: self.files.clone(),
            target_dir: self.dir.clone(),
        }
    }
}

/// Arguments for run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Worker leaf mode: run the selection here and print one JSON line
    #[arg(long, hide = true)]
    pub automated: bool,

    /// Number of worker processes (default: logical cores)
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Run everything in this process instead of dispatching workers
    #[arg(long)]
    pub in_process: bool,

    /// Overlap asynchronous tests (per-test timings become unreliable)
    #[arg(long)]
    pub async_parallel: bool,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Runtime history file
    #[arg(long, value_name = "PATH")]
    pub history: Option<PathBuf>,

    /// Do not record this run in the history
    #[arg(long)]
    pub no_record: bool,

    /// Skip resource sampling of worker processes
    #[arg(long)]
    pub no_resources: bool,

    /// Echo test log lines to stderr as they are written
    #[arg(long)]
    pub echo_logs: bool,

    /// Also write the report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub select: SelectArgs,

    /// Show the worker groups a run would use
    #[arg(long)]
    pub plan: bool,

    /// Number of workers for `--plan` (default: logical cores)
    #[arg(short, long)]
    pub concurrency: Option<usize>,
}

/// Arguments for history management
#[derive(Parser, Debug)]
pub struct HistoryArgs {
    #[command(subcommand)]
    pub action: HistoryAction,

    /// Runtime history file
    #[arg(long, value_name = "PATH", global = true)]
    pub history: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum HistoryAction {
    /// Show recorded tests with their run counts and estimates
    Show {
        /// Only tests whose name contains this text
        filter: Option<String>,
    },

    /// Drop runs older than the retention window and save
    Prune {
        /// Retention in days (default: from configuration)
        #[arg(long)]
        days: Option<i64>,
    },

    /// Delete all recorded runs
    Clear,
}

/// Arguments for configuration management
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration
    Show,

    /// Write a default configuration file
    Init {
        /// Destination (default: ~/.config/testfleet/config.yaml)
        #[arg(long)]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Describe the environment variables that override configuration
    Env,
}
