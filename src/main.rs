//! testfleet - run tests across parallel workers scheduled by historical runtime
//!
//! ## Usage
//!
//! ```bash
//! # Run every registered test across one worker per core
//! testfleet run
//!
//! # Run matching tests on 4 workers and print CSV
//! testfleet run --concurrency 4 --format csv timing
//!
//! # Run in this process only
//! testfleet run --in-process basics:adds
//!
//! # Show how tests would be spread over 3 workers
//! testfleet list --plan -c 3
//!
//! # Inspect recorded runtimes
//! testfleet history show
//! ```

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, info, warn};

use testfleet::cli::{self, Args, Command};
use testfleet::config::{default_config_path, print_env_help, AppConfig};
use testfleet::dispatch::{aggregate, Aggregated, Dispatcher, WorkerCommand};
use testfleet::executor::{ExecutorConfig, LaunchMode, TestRunner};
use testfleet::history::{run_id_for, HistoryStore};
use testfleet::output::{write_report_to_file, OutputFormat, ResultFormatter, RunReport};
use testfleet::process::ProcessSpawner;
use testfleet::registry::Registry;
use testfleet::scheduler::{estimate_for, makespan, plan_jobs, schedule};
use testfleet::suites;
use testfleet::utils::{init_logger, LogLevel, Stopwatch};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let automated = matches!(&args.command, Command::Run(run) if run.automated);
    init_logger(LogLevel::for_run(args.verbose, automated));

    let mut registry = Registry::new();
    suites::register_all(&mut registry).context("Failed to register built-in suites")?;

    let (config, source) = AppConfig::resolve(args.config.as_deref())?;
    match &source {
        Some(path) => debug!("Using configuration from {}", path.display()),
        None => debug!("No configuration file found, using defaults"),
    }

    match args.command {
        Command::Run(run_args) => {
            run_tests(&registry, config, source, run_args, args.verbose).await
        }
        Command::List(list_args) => {
            list_tests(&registry, &config, list_args)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::History(history_args) => {
            manage_history(&config, history_args)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Config(config_args) => {
            manage_config(&config, source, config_args)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_tests(
    registry: &Registry,
    mut config: AppConfig,
    config_source: Option<PathBuf>,
    args: cli::RunArgs,
    verbose: bool,
) -> Result<ExitCode> {
    if let Some(concurrency) = args.concurrency {
        config.concurrency = Some(concurrency);
    }
    if let Some(path) = &args.history {
        config.history_path = Some(path.clone());
    }
    config.async_parallel |= args.async_parallel;
    config.echo_test_logs |= args.echo_logs;
    if args.no_resources {
        config.resource_sampling = false;
    }
    config.validate()?;

    let selection = args.select.selection();
    let mode = if config.async_parallel {
        LaunchMode::AsyncParallel
    } else {
        LaunchMode::Sequential
    };
    let spawner = if config.resource_sampling {
        ProcessSpawner::detect()
    } else {
        ProcessSpawner::unsampled()
    };
    let executor = ExecutorConfig::new(spawner.clone()).echo_test_logs(config.echo_test_logs);

    if args.automated {
        let payload = TestRunner::new(registry, executor)
            .with_mode(mode)
            .run_worker(&selection)
            .await;
        let line = payload
            .to_line()
            .context("Failed to encode worker payload")?;
        println!("{line}");
        return Ok(ExitCode::SUCCESS);
    }

    let format = OutputFormat::from_str(&args.format)
        .ok_or_else(|| anyhow!("Unknown output format: {}", args.format))?;
    let run_id = run_id_for(Utc::now());
    let mut stopwatch = Stopwatch::new();

    let mut history = HistoryStore::open(config.history_file(), config.retention_days)?;
    let jobs = plan_jobs(registry, &selection, &history, config.default_estimate_ms);
    if jobs.is_empty() {
        warn!("No registered tests match the selection");
    }

    let (aggregated, workers, expected_makespan_ms) = if args.in_process {
        let expected: f64 = jobs.iter().map(|j| j.test_time_estimate_ms).sum();
        stopwatch.lap("plan");

        let results = TestRunner::new(registry, executor)
            .with_mode(mode)
            .run(&selection)
            .await;
        stopwatch.lap("execute");
        (Aggregated::in_process(results), 1, expected)
    } else {
        let workers = config.worker_count();
        let groups = schedule(jobs, workers);
        let expected = makespan(&groups);
        info!(
            "Scheduled {} test(s) on {} worker(s), expected makespan {:.0}ms",
            groups.iter().map(|g| g.jobs.len()).sum::<usize>(),
            workers,
            expected
        );
        stopwatch.lap("plan");

        let command = worker_command(&config, config_source.as_deref(), verbose)?;
        let outcomes = Dispatcher::new(spawner, command).dispatch(&groups).await;
        stopwatch.lap("dispatch");
        (aggregate(&outcomes), workers, expected)
    };

    if args.no_record {
        debug!("Not recording this run");
    } else if config.async_parallel {
        warn!("Async-parallel timings overlap; not recording them in the history");
    } else if !aggregated.results.is_empty() {
        history.record_results(&aggregated.results, &run_id);
        if let Err(e) = history.save() {
            warn!("Failed to save runtime history: {:#}", e);
        }
    }
    stopwatch.lap("record");

    let report = RunReport::new(
        &run_id,
        &aggregated,
        workers,
        expected_makespan_ms,
        stopwatch.lap_times(),
    );
    let formatter = ResultFormatter::new(format);
    println!("{}", formatter.format_report(&report)?);

    if let Some(path) = &args.output {
        write_report_to_file(path, &report, format)?;
        info!("Report written to {}", path.display());
    }

    Ok(ExitCode::from(aggregated.exit_code() as u8))
}

/// Command line that re-enters this binary as a worker with the same settings
fn worker_command(
    config: &AppConfig,
    config_source: Option<&std::path::Path>,
    verbose: bool,
) -> Result<WorkerCommand> {
    let mut command = match &config.worker_program {
        Some(program) => WorkerCommand::new(program),
        None => WorkerCommand::current_exe().context("Failed to locate the running executable")?,
    };

    let mut prefix = Vec::new();
    if verbose {
        prefix.push("--verbose".to_string());
    }
    if let Some(path) = config_source {
        prefix.push("--config".to_string());
        prefix.push(path.display().to_string());
    }
    command = command.with_prefix_args(prefix);

    if config.async_parallel {
        command = command.with_run_flag("--async-parallel");
    }
    if config.echo_test_logs {
        command = command.with_run_flag("--echo-logs");
    }
    if !config.resource_sampling {
        command = command.with_run_flag("--no-resources");
    }
    Ok(command)
}

fn list_tests(registry: &Registry, config: &AppConfig, args: cli::ListArgs) -> Result<()> {
    let selection = args.select.selection();
    let history = HistoryStore::open(config.history_file(), config.retention_days)?;
    let tests = registry.discover(&selection);

    println!("\nRegistered tests ({} of {})\n", tests.len(), registry.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut current_file = "";
    for test in &tests {
        if test.file != current_file {
            println!("\n{}:", test.file);
            current_file = test.file.as_str();
        }
        let name = test.qualified_name();
        let runs = history.runs_for(&name).len();
        let estimate = estimate_for(&history, &name, config.default_estimate_ms);
        let kind = if test.body.is_async() { "async" } else { "sync" };
        println!("  {name:40} {kind:5} ~{estimate:>6.0}ms  ({runs} run(s))");
    }
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");

    if args.plan {
        let workers = args
            .concurrency
            .unwrap_or_else(|| config.worker_count())
            .max(1);
        let jobs = plan_jobs(registry, &selection, &history, config.default_estimate_ms);
        let groups = schedule(jobs, workers);
        println!("{}", ResultFormatter::default().format_plan(&groups));
        println!("Expected makespan: {:.0}ms", makespan(&groups));
    }

    Ok(())
}

fn manage_history(config: &AppConfig, args: cli::HistoryArgs) -> Result<()> {
    let path = args.history.unwrap_or_else(|| config.history_file());

    match args.action {
        cli::HistoryAction::Show { filter } => {
            let store = HistoryStore::open(&path, config.retention_days)?;
            println!("History: {} ({} test(s))\n", store.path().display(), store.len());

            let mut shown = 0;
            for (name, runs) in store.tests() {
                if filter.as_deref().is_some_and(|f| !name.contains(f)) {
                    continue;
                }
                let estimate = estimate_for(&store, name, config.default_estimate_ms);
                println!("  {name:40} {runs:>3} run(s)  ~{estimate:>8.1}ms");
                shown += 1;
            }
            if shown == 0 {
                println!("  (no recorded runs)");
            }
        }
        cli::HistoryAction::Prune { days } => {
            let days = days.unwrap_or(config.retention_days);
            let store = HistoryStore::open(&path, days)?;
            store.save()?;
            println!(
                "Kept {} test(s) with runs in the last {} day(s)",
                store.len(),
                days
            );
        }
        cli::HistoryAction::Clear => {
            let mut store = HistoryStore::new(&path);
            store.clear();
            store.save()?;
            println!("Cleared {}", path.display());
        }
    }

    Ok(())
}

fn manage_config(
    config: &AppConfig,
    source: Option<PathBuf>,
    args: cli::ConfigArgs,
) -> Result<()> {
    match args.action {
        cli::ConfigAction::Show => {
            match &source {
                Some(path) => println!("# Loaded from {}", path.display()),
                None => println!("# Defaults (no configuration file found)"),
            }
            print!("{}", serde_yaml::to_string(config).context("Failed to render config")?);
            println!("# Effective worker count: {}", config.worker_count());
            println!("# History file: {}", config.history_file().display());
        }
        cli::ConfigAction::Init { path, force } => {
            let path = path.unwrap_or_else(default_config_path);
            if path.exists() && !force {
                bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            AppConfig::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
        cli::ConfigAction::Env => print_env_help(),
    }

    Ok(())
}
