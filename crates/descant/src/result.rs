//! Per-test outcome types shared across the engine.

use crate::select::SkipReason;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// A failure raised by a test body or hook.
///
/// Bodies and hooks report failure by returning this (or by panicking;
/// panics are caught and converted, carrying the panic message).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct Failure {
    pub message: String,
}

impl Failure {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for Failure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for Failure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Which hook list a callback was registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HookKind {
    BeforeAll,
    BeforeEach,
    AfterEach,
    AfterAll,
}

impl HookKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BeforeAll => "before-all",
            Self::BeforeEach => "before-each",
            Self::AfterEach => "after-each",
            Self::AfterAll => "after-all",
        }
    }
}

/// The error recorded for a failed test, tagged by kind.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TestError {
    /// The body returned a failure or panicked.
    #[error("{message}")]
    Failed { message: String },
    /// The body did not finish before its configured deadline.
    #[error("timed out after {limit:?}")]
    TimedOut { limit: Duration },
    /// A setup hook the test depends on failed; the body never ran.
    #[error("{} hook failed: {message}", .kind.name())]
    Hook { kind: HookKind, message: String },
}

impl TestError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// Terminal state of one leaf test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TestOutcome {
    Passed,
    Failed(TestError),
    Skipped(SkipReason),
}

impl TestOutcome {
    #[must_use]
    pub const fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }

    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

/// Everything observed for one leaf test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub outcome: TestOutcome,
    pub duration: Duration,
    /// Output lines captured while the body ran, in order.
    pub output: Vec<String>,
}

impl RunResult {
    pub(crate) const fn skipped(reason: SkipReason) -> Self {
        Self {
            outcome: TestOutcome::Skipped(reason),
            duration: Duration::ZERO,
            output: Vec::new(),
        }
    }

    pub(crate) const fn failed_setup(error: TestError) -> Self {
        Self {
            outcome: TestOutcome::Failed(error),
            duration: Duration::ZERO,
            output: Vec::new(),
        }
    }
}

/// Snapshot of a concluded test, handed to `after_each` hooks.
#[derive(Debug, Clone)]
pub struct FinishedTestContext {
    pub passed: bool,
    pub error: Option<TestError>,
    pub output: Vec<String>,
    pub duration: Duration,
}
