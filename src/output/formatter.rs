//! Output formatters for test results
//!
//! Provides Table, JSON, CSV and summary output formats.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::dispatch::{Aggregated, WorkerMetrics};
use crate::models::{RunSummary, TestResult, TestStatus, WorkerGroup};
use crate::utils::Lap;

/// Log lines shown for the first failing test
const FAILURE_LOG_LINES: usize = 50;

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Everything reported about one top-level run
#[derive(Clone, Debug, Serialize)]
pub struct RunReport<'a> {
    pub run_id: &'a str,
    pub workers: usize,
    pub expected_makespan_ms: f64,
    pub summary: RunSummary,
    pub phases: Vec<Lap>,
    pub results: &'a [TestResult],
    pub metrics: &'a [WorkerMetrics],
}

impl<'a> RunReport<'a> {
    pub fn new(
        run_id: &'a str,
        aggregated: &'a Aggregated,
        workers: usize,
        expected_makespan_ms: f64,
        phases: Vec<Lap>,
    ) -> Self {
        Self {
            run_id,
            workers,
            expected_makespan_ms,
            summary: aggregated.summary(),
            phases,
            results: &aggregated.results,
            metrics: &aggregated.metrics,
        }
    }

    pub fn first_failure(&self) -> Option<&TestResult> {
        self.results.iter().find(|r| !r.passed())
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if self.colorize {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    fn status_label(&self, status: TestStatus) -> String {
        match status {
            TestStatus::Pass => self.paint("✓ PASS", "32"),
            TestStatus::Fail => self.paint("✗ FAIL", "31"),
        }
    }

    fn format_result_table(&self, result: &TestResult) -> String {
        let mut line = format!(
            "{} {:40} [{:>7.0}ms]",
            self.status_label(result.status()),
            result.qualified_name(),
            result.duration_ms
        );
        if let Some(failure) = &result.failure {
            line.push_str(&format!(" {}: {}", failure.kind, first_line(&failure.message)));
        }
        line
    }

    /// Format the report of a whole run
    pub fn format_report(&self, report: &RunReport) -> Result<String> {
        match self.format {
            OutputFormat::Table => Ok(self.format_report_table(report)),
            OutputFormat::Json => {
                serde_json::to_string(report).context("Failed to serialize report")
            }
            OutputFormat::JsonPretty => {
                serde_json::to_string_pretty(report).context("Failed to serialize report")
            }
            OutputFormat::Csv => self.format_results_csv(report.results),
            OutputFormat::Summary => Ok(format!(
                "{} in {} worker(s) - {}",
                report.run_id, report.workers, report.summary
            )),
        }
    }

    fn format_report_table(&self, report: &RunReport) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!("║  Run {:56} ║\n", report.run_id));
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");
        for result in report.results {
            output.push_str(&format!("  {}\n", self.format_result_table(result)));
        }
        output.push_str("╠══════════════════════════════════════════════════════════════╣\n");

        let summary = &report.summary;
        let pass_str = self.paint(&summary.passed.to_string(), "32");
        let fail_str = if summary.failed > 0 {
            self.paint(&summary.failed.to_string(), "31")
        } else {
            summary.failed.to_string()
        };
        output.push_str(&format!(
            "║  Total: {:3} | Pass: {} | Fail: {} | Pass Rate: {:5.1}%\n",
            summary.total,
            pass_str,
            fail_str,
            summary.pass_rate()
        ));
        output.push_str(&format!(
            "║  Workers: {} | Expected makespan: {:.0}ms | Test time: {:.0}ms\n",
            report.workers, report.expected_makespan_ms, summary.total_duration_ms
        ));
        if !report.phases.is_empty() {
            let phases: Vec<String> = report
                .phases
                .iter()
                .map(|lap| format!("{} {:.0}ms", lap.label, lap.ms))
                .collect();
            output.push_str(&format!("║  Phases: {}\n", phases.join(", ")));
        }
        output.push_str("╚══════════════════════════════════════════════════════════════╝\n");

        if !report.metrics.is_empty() {
            output.push_str(&self.format_worker_metrics(report.metrics));
        }

        for metrics in report.metrics.iter().filter(|m| m.error.is_some()) {
            let missing = metrics.missing(report.results);
            output.push_str(&self.paint(
                &format!(
                    "\nWorker {} produced no results ({} test(s) missing): {}\n",
                    metrics.worker,
                    missing.len(),
                    metrics.error.as_deref().unwrap_or_default()
                ),
                "31",
            ));
            for spec in missing {
                output.push_str(&format!("   - {spec}\n"));
            }
        }

        if let Some(failure) = report.first_failure() {
            output.push_str(&self.format_failure_detail(failure));
        }

        output
    }

    /// Per-worker diagnostics table
    pub fn format_worker_metrics(&self, metrics: &[WorkerMetrics]) -> String {
        let mut output = String::new();
        output.push_str("\n┌────────┬───────┬────────────┬────────────┬────────────┬─────────┐\n");
        output.push_str("│ Worker │ Tests │ Expected   │ Actual     │ Max RSS    │ Status  │\n");
        output.push_str("├────────┼───────┼────────────┼────────────┼────────────┼─────────┤\n");

        for m in metrics {
            let rss = m
                .resources
                .map(|r| format!("{} KB", r.maxrss))
                .unwrap_or_else(|| "-".to_string());
            let status = if m.error.is_some() {
                self.paint("failed ", "31")
            } else {
                self.paint("ok     ", "32")
            };
            output.push_str(&format!(
                "│ {:>6} │ {:>2}/{:<2} │ {:>8.0}ms │ {:>8.0}ms │ {:>10} │ {} │\n",
                m.worker,
                m.tests_reported,
                m.jobs.len(),
                m.expected_runtime_ms,
                m.duration_ms,
                rss,
                status
            ));
        }

        output.push_str("└────────┴───────┴────────────┴────────────┴────────────┴─────────┘\n");
        output
    }

    /// Failure, logs and assertion history of one failed test
    pub fn format_failure_detail(&self, result: &TestResult) -> String {
        let mut output = String::new();
        output.push_str(&format!(
            "\n── First failure: {} ({}) ──\n",
            self.paint(&result.qualified_name(), "1"),
            result.file
        ));

        if let Some(failure) = &result.failure {
            output.push_str(&format!(
                " {}: {}\n",
                self.paint(&failure.kind.to_string(), "31"),
                failure.message
            ));
            for cause in &failure.causes {
                output.push_str(&format!("   caused by: {cause}\n"));
            }
        }

        if !result.logs.is_empty() {
            output.push_str(" Logs:\n");
            let skip = result.logs.len().saturating_sub(FAILURE_LOG_LINES);
            if skip > 0 {
                output.push_str(&format!("   ... {skip} earlier line(s)\n"));
            }
            for line in &result.logs[skip..] {
                output.push_str(&format!("   {line}\n"));
            }
        }

        let metrics = &result.assertion_metrics;
        for (name, buffer) in &metrics.logs {
            let calls = metrics.count(name);
            let shown = buffer.len();
            output.push_str(&format!(
                " assert.{} ({} call(s){}):\n",
                name,
                calls,
                if (shown as u64) < calls {
                    format!(", last {shown} kept")
                } else {
                    String::new()
                }
            ));
            for entry in buffer.ordered() {
                let args = entry.args.join(", ");
                match &entry.failure {
                    Some(reason) => output.push_str(&format!(
                        "   {}({}) {}\n",
                        name,
                        args,
                        self.paint(&format!("failed: {reason}"), "31")
                    )),
                    None => output.push_str(&format!("   {name}({args})\n")),
                }
            }
        }

        output
    }

    fn format_results_csv(&self, results: &[TestResult]) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        writer.write_record([
            "suite",
            "name",
            "file",
            "status",
            "failure_kind",
            "duration_ms",
            "cpu_ms",
            "assertions",
            "message",
        ])?;

        for result in results {
            writer.write_record([
                result.suite.clone().unwrap_or_default(),
                result.name.clone(),
                result.file.clone(),
                result.status().to_string(),
                result
                    .failure
                    .as_ref()
                    .map(|f| f.kind.to_string())
                    .unwrap_or_default(),
                format!("{:.3}", result.duration_ms),
                format!("{:.3}", result.cpu.overall()),
                result.assertion_metrics.total().to_string(),
                result
                    .failure
                    .as_ref()
                    .map(|f| f.message.clone())
                    .unwrap_or_default(),
            ])?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| anyhow!("Failed to finish CSV output: {}", e.error()))?;
        String::from_utf8(bytes).context("CSV output is not UTF-8")
    }

    /// Worker groups a run would use
    pub fn format_plan(&self, groups: &[WorkerGroup]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string(groups).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(groups).unwrap_or_default(),
            _ => {
                let mut output = String::new();
                for group in groups {
                    output.push_str(&format!(
                        "Worker {} (~{:.0}ms, {} test(s))\n",
                        group.worker,
                        group.total_expected_runtime_ms,
                        group.jobs.len()
                    ));
                    for job in &group.jobs {
                        output.push_str(&format!("   {job}\n"));
                    }
                }
                output
            }
        }
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// Write a run report to a file, without color
pub fn write_report_to_file(path: &Path, report: &RunReport, format: OutputFormat) -> Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_report(report)?;

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create report file: {}", path.display()))?;
    file.write_all(content.as_bytes())?;
    file.write_all(b"\n")?;

    Ok(())
}
