//! Run-wide tallies.

use crate::result::{RunResult, TestError, TestOutcome};
use serde::Serialize;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// Counters for a run, or any slice of one. Summaries from partial runs
/// combine with `+`; combining is associative and the default value is
/// the identity, so hosts can merge per-subtree tallies in any
/// grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Failures that were deadline expiries; also counted in `failed`.
    pub timed_out: u64,
    /// Wall time spent in test bodies, hooks excluded.
    pub duration: Duration,
}

impl RunSummary {
    /// Tally for a single concluded test.
    #[must_use]
    pub const fn of(result: &RunResult) -> Self {
        let mut summary = Self {
            passed: 0,
            failed: 0,
            skipped: 0,
            timed_out: 0,
            duration: result.duration,
        };
        match &result.outcome {
            TestOutcome::Passed => summary.passed = 1,
            TestOutcome::Failed(error) => {
                summary.failed = 1;
                if let TestError::TimedOut { .. } = error {
                    summary.timed_out = 1;
                }
            }
            TestOutcome::Skipped(_) => summary.skipped = 1,
        }
        summary
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.passed + self.failed + self.skipped
    }

    /// A run succeeds when nothing failed; skips do not fail a run.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl Add for RunSummary {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            passed: self.passed.saturating_add(other.passed),
            failed: self.failed.saturating_add(other.failed),
            skipped: self.skipped.saturating_add(other.skipped),
            timed_out: self.timed_out.saturating_add(other.timed_out),
            duration: self.duration.saturating_add(other.duration),
        }
    }
}

impl AddAssign for RunSummary {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sum for RunSummary {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::select::SkipReason;

    fn passed(ms: u64) -> RunSummary {
        RunSummary {
            passed: 1,
            duration: Duration::from_millis(ms),
            ..RunSummary::default()
        }
    }

    #[test]
    fn test_default_is_the_identity() {
        let summary = passed(5);
        assert_eq!(summary + RunSummary::default(), summary);
        assert_eq!(RunSummary::default() + summary, summary);
    }

    #[test]
    fn test_combining_is_associative() {
        let a = passed(1);
        let b = RunSummary {
            failed: 2,
            timed_out: 1,
            duration: Duration::from_millis(7),
            ..RunSummary::default()
        };
        let c = RunSummary {
            skipped: 3,
            ..RunSummary::default()
        };

        assert_eq!((a + b) + c, a + (b + c));
        assert_eq!(a + b, b + a);
    }

    #[test]
    fn test_of_maps_each_outcome_to_one_counter() {
        let pass = RunSummary::of(&RunResult {
            outcome: TestOutcome::Passed,
            duration: Duration::from_millis(2),
            output: Vec::new(),
        });
        let timeout = RunSummary::of(&RunResult {
            outcome: TestOutcome::Failed(TestError::TimedOut {
                limit: Duration::from_millis(50),
            }),
            duration: Duration::from_millis(50),
            output: Vec::new(),
        });
        let skip = RunSummary::of(&RunResult::skipped(SkipReason::ExplicitSkip));

        assert_eq!((pass.passed, pass.failed, pass.skipped), (1, 0, 0));
        assert_eq!((timeout.failed, timeout.timed_out), (1, 1));
        assert_eq!(skip.skipped, 1);

        let all: RunSummary = [pass, timeout, skip].into_iter().sum();
        assert_eq!(all.total(), 3);
        assert!(!all.is_success());
        assert_eq!(all.duration, Duration::from_millis(52));
    }
}
