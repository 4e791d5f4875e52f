//! Cargo test-like console output for a run.

use descant::{HookKind, ReportSink, RunResult, RunSummary, TestInfo, TestOutcome};
use std::time::Instant;

/// Reporter configuration.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Echo captured test output as it arrives.
    pub verbose: bool,
    /// Use colors in output.
    pub color: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            color: true,
        }
    }
}

/// Sink that renders run progress to stdout, one line per test, with a
/// `failures:` section and a closing `test result:` line.
pub struct ConsoleSink {
    config: ReporterConfig,
    started_at: Instant,
    failures: Vec<(String, String, Vec<String>)>,
}

impl ConsoleSink {
    #[must_use]
    pub fn new(config: ReporterConfig) -> Self {
        Self {
            config,
            started_at: Instant::now(),
            failures: Vec::new(),
        }
    }
}

impl ReportSink for ConsoleSink {
    fn test_starting(&mut self, info: &TestInfo) {
        if self.config.verbose {
            println!("  starting: {}", info.full_description);
        }
    }

    fn test_output(&mut self, _info: &TestInfo, line: &str) {
        if self.config.verbose {
            println!("    {line}");
        }
    }

    fn test_finished(&mut self, info: &TestInfo, result: &RunResult) {
        println!("{}", result_line(info, result, self.config.color));
        if let TestOutcome::Failed(error) = &result.outcome {
            self.failures.push((
                info.full_description.clone(),
                error.to_string(),
                result.output.clone(),
            ));
        }
    }

    fn hook_diagnostic(&mut self, kind: HookKind, scope_description: &str, message: &str) {
        println!(
            "{}",
            diagnostic_line(kind, scope_description, message, self.config.color)
        );
    }

    fn run_finished(&mut self, summary: &RunSummary) {
        if !self.failures.is_empty() {
            println!();
            println!("failures:");
            println!();
            for (name, error, output) in &self.failures {
                println!("---- {name} ----");
                println!("    {error}");
                for line in output {
                    println!("    {line}");
                }
                println!();
            }
        }
        println!();
        println!(
            "{}",
            summary_line(summary, self.started_at.elapsed().as_secs_f64(), self.config.color)
        );
    }
}

fn status_label(result: &RunResult, color: bool) -> String {
    match &result.outcome {
        TestOutcome::Passed => {
            if color {
                "\x1b[32mok\x1b[0m".to_string()
            } else {
                "ok".to_string()
            }
        }
        TestOutcome::Failed(_) => {
            if color {
                "\x1b[31mFAILED\x1b[0m".to_string()
            } else {
                "FAILED".to_string()
            }
        }
        TestOutcome::Skipped(reason) => {
            if color {
                format!("\x1b[33mignored\x1b[0m ({reason})")
            } else {
                format!("ignored ({reason})")
            }
        }
    }
}

fn result_line(info: &TestInfo, result: &RunResult, color: bool) -> String {
    format!(
        "test {} ... {}",
        info.full_description,
        status_label(result, color)
    )
}

fn diagnostic_line(kind: HookKind, scope_description: &str, message: &str, color: bool) -> String {
    let label = if color {
        "\x1b[33mwarning\x1b[0m"
    } else {
        "warning"
    };
    format!("{label}: {} hook failed in '{scope_description}': {message}", kind.name())
}

fn summary_line(summary: &RunSummary, elapsed_secs: f64, color: bool) -> String {
    let status = if summary.is_success() {
        if color { "\x1b[32mok\x1b[0m" } else { "ok" }
    } else if color {
        "\x1b[31mFAILED\x1b[0m"
    } else {
        "FAILED"
    };
    format!(
        "test result: {status}. {} passed; {} failed; {} skipped; finished in {elapsed_secs:.2}s",
        summary.passed, summary.failed, summary.skipped
    )
}
