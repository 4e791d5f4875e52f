//! Effective run/skip resolution, computed once per run.

use crate::scope::{Scope, TestBlock};
use serde::Serialize;
use std::fmt;

/// Why a leaf test was reported without executing its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SkipReason {
    /// The test was registered with `skip`. Takes precedence over
    /// everything else, including an `only` mark on the same test.
    ExplicitSkip,
    /// Another test is marked `only` and this one is not.
    OnlyElsewhere,
}

impl SkipReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExplicitSkip => "explicit-skip",
            Self::OnlyElsewhere => "only-elsewhere",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The run-wide selection mode, resolved by a single scan over the
/// completed tree before execution starts. Decisions are stable for
/// the whole run.
#[derive(Debug, Clone, Copy)]
pub struct Selection {
    only_filtered: bool,
}

impl Selection {
    /// Scan every leaf test; any `only` mark anywhere puts the run in
    /// only-filtered mode.
    #[must_use]
    pub fn resolve(root: &Scope) -> Self {
        Self {
            only_filtered: any_only(root),
        }
    }

    #[must_use]
    pub const fn is_only_filtered(self) -> bool {
        self.only_filtered
    }

    /// The effective decision for one leaf: `None` means eligible to
    /// execute.
    #[must_use]
    pub const fn decide(self, test: &TestBlock) -> Option<SkipReason> {
        if test.is_skipped() {
            Some(SkipReason::ExplicitSkip)
        } else if self.only_filtered && !test.is_only() {
            Some(SkipReason::OnlyElsewhere)
        } else {
            None
        }
    }
}

fn any_only(scope: &Scope) -> bool {
    scope.tests().iter().any(TestBlock::is_only) || scope.children().iter().any(any_only)
}
