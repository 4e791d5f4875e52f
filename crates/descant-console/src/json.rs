//! Machine-readable run reports.

use descant::{HookKind, ReportSink, RunResult, RunSummary, SourceLocation, TestInfo, TestOutcome};
use serde::Serialize;

/// One leaf test, flattened for serialization.
#[derive(Debug, Clone, Serialize)]
pub struct TestRecord {
    /// Stable structural id, rendered as a dotted path.
    pub id: String,
    pub description: String,
    pub full_description: String,
    pub location: SourceLocation,
    /// `passed`, `failed` or `skipped`.
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub duration_ms: u128,
    pub output: Vec<String>,
}

/// A teardown hook failure, reported out of band.
#[derive(Debug, Clone, Serialize)]
pub struct HookDiagnostic {
    pub hook: &'static str,
    pub scope: String,
    pub message: String,
}

/// Everything a run produced, as one serializable document.
#[derive(Debug, Clone, Serialize)]
pub struct JsonReport {
    pub tests: Vec<TestRecord>,
    pub diagnostics: Vec<HookDiagnostic>,
    pub summary: RunSummary,
}

impl JsonReport {
    /// Render the report as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Sink that records every result for a final JSON document.
#[derive(Debug, Default)]
pub struct JsonSink {
    tests: Vec<TestRecord>,
    diagnostics: Vec<HookDiagnostic>,
    summary: Option<RunSummary>,
}

impl JsonSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn into_report(self) -> JsonReport {
        JsonReport {
            tests: self.tests,
            diagnostics: self.diagnostics,
            summary: self.summary.unwrap_or_default(),
        }
    }
}

impl ReportSink for JsonSink {
    fn test_finished(&mut self, info: &TestInfo, result: &RunResult) {
        let (status, error, skip_reason) = match &result.outcome {
            TestOutcome::Passed => ("passed", None, None),
            TestOutcome::Failed(error) => ("failed", Some(error.to_string()), None),
            TestOutcome::Skipped(reason) => ("skipped", None, Some(reason.to_string())),
        };
        self.tests.push(TestRecord {
            id: info.id.to_string(),
            description: info.description.clone(),
            full_description: info.full_description.clone(),
            location: info.location,
            status,
            error,
            skip_reason,
            duration_ms: result.duration.as_millis(),
            output: result.output.clone(),
        });
    }

    fn hook_diagnostic(&mut self, kind: HookKind, scope_description: &str, message: &str) {
        self.diagnostics.push(HookDiagnostic {
            hook: kind.name(),
            scope: scope_description.to_string(),
            message: message.to_string(),
        });
    }

    fn run_finished(&mut self, summary: &RunSummary) {
        self.summary = Some(*summary);
    }
}
