//! Reporting seam between the engine and its hosts.
//!
//! The runner pushes events into a [`ReportSink`]; the engine itself
//! never prints. Hosts either implement the trait directly or take the
//! channel-backed sink and render events on their own task.

use crate::result::{HookKind, RunResult, TestError};
use crate::scope::{SourceLocation, TestId};
use crate::select::SkipReason;
use crate::summary::RunSummary;
use std::time::Duration;
use tokio::sync::mpsc;

/// Immutable facts about one leaf test, established at registration.
/// Carries everything a host adapter needs without reaching into the
/// tree: stable identity, descriptions, source location and timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInfo {
    pub id: TestId,
    /// The test's own description.
    pub description: String,
    /// The description prefixed with every enclosing suite, root first.
    pub full_description: String,
    pub location: SourceLocation,
    pub timeout: Option<Duration>,
}

/// Receives run progress. Per executed leaf the order is fixed:
/// `test_starting`, zero or more `test_output` calls, exactly one
/// terminal call (`test_passed` xor `test_failed`), then
/// `test_finished`. Skipped leaves get `test_skipped` then
/// `test_finished`. `run_finished` is called last, once.
///
/// Every method defaults to a no-op so sinks override only what they
/// render.
pub trait ReportSink {
    fn test_starting(&mut self, info: &TestInfo) {
        let _ = info;
    }

    fn test_output(&mut self, info: &TestInfo, line: &str) {
        let _ = (info, line);
    }

    fn test_passed(&mut self, info: &TestInfo, result: &RunResult) {
        let _ = (info, result);
    }

    fn test_failed(&mut self, info: &TestInfo, error: &TestError, result: &RunResult) {
        let _ = (info, error, result);
    }

    fn test_skipped(&mut self, info: &TestInfo, reason: SkipReason) {
        let _ = (info, reason);
    }

    fn test_finished(&mut self, info: &TestInfo, result: &RunResult) {
        let _ = (info, result);
    }

    /// A cleanup hook failed after its test already concluded. The
    /// test's outcome is not affected.
    fn hook_diagnostic(&mut self, kind: HookKind, scope_description: &str, message: &str) {
        let _ = (kind, scope_description, message);
    }

    fn run_finished(&mut self, summary: &RunSummary) {
        let _ = summary;
    }
}

/// Discards everything. Useful when only the returned summary matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ReportSink for NullSink {}

/// One progress event, as carried by [`ChannelSink`].
#[derive(Debug, Clone)]
pub enum RunEvent {
    TestStarting {
        info: TestInfo,
    },
    TestOutput {
        info: TestInfo,
        line: String,
    },
    TestPassed {
        info: TestInfo,
        result: RunResult,
    },
    TestFailed {
        info: TestInfo,
        error: TestError,
        result: RunResult,
    },
    TestSkipped {
        info: TestInfo,
        reason: SkipReason,
    },
    TestFinished {
        info: TestInfo,
        result: RunResult,
    },
    HookDiagnostic {
        kind: HookKind,
        scope_description: String,
        message: String,
    },
    RunFinished {
        summary: RunSummary,
    },
}

/// Sink that forwards every event over an unbounded channel, for hosts
/// that render progress on a separate task.
#[derive(Debug)]
pub struct ChannelSink {
    events: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (Self { events }, receiver)
    }

    fn send(&self, event: RunEvent) {
        // A dropped receiver just means nobody is watching anymore.
        let _ = self.events.send(event);
    }
}

impl ReportSink for ChannelSink {
    fn test_starting(&mut self, info: &TestInfo) {
        self.send(RunEvent::TestStarting { info: info.clone() });
    }

    fn test_output(&mut self, info: &TestInfo, line: &str) {
        self.send(RunEvent::TestOutput {
            info: info.clone(),
            line: line.to_string(),
        });
    }

    fn test_passed(&mut self, info: &TestInfo, result: &RunResult) {
        self.send(RunEvent::TestPassed {
            info: info.clone(),
            result: result.clone(),
        });
    }

    fn test_failed(&mut self, info: &TestInfo, error: &TestError, result: &RunResult) {
        self.send(RunEvent::TestFailed {
            info: info.clone(),
            error: error.clone(),
            result: result.clone(),
        });
    }

    fn test_skipped(&mut self, info: &TestInfo, reason: SkipReason) {
        self.send(RunEvent::TestSkipped {
            info: info.clone(),
            reason,
        });
    }

    fn test_finished(&mut self, info: &TestInfo, result: &RunResult) {
        self.send(RunEvent::TestFinished {
            info: info.clone(),
            result: result.clone(),
        });
    }

    fn hook_diagnostic(&mut self, kind: HookKind, scope_description: &str, message: &str) {
        self.send(RunEvent::HookDiagnostic {
            kind,
            scope_description: scope_description.to_string(),
            message: message.to_string(),
        });
    }

    fn run_finished(&mut self, summary: &RunSummary) {
        self.send(RunEvent::RunFinished { summary: *summary });
    }
}
