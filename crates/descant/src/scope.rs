//! The scope tree: suites, leaf tests and hooks built during one
//! registration pass.
//!
//! The tree is immutable after registration; the runner consumes it and
//! only the two once-flags per scope change while a run is in flight.

use crate::executor::TestContext;
use crate::result::{Failure, FinishedTestContext};
use futures::future::BoxFuture;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Future produced by test bodies and hooks.
pub type BodyFuture = BoxFuture<'static, Result<(), Failure>>;

/// A leaf test body. Receives the per-test context and runs once.
pub type TestBody = Box<dyn FnOnce(TestContext) -> BodyFuture + Send>;

/// A `before_all`, `before_each` or `after_all` hook.
pub type HookFn = Box<dyn FnMut() -> BodyFuture + Send>;

/// An `after_each` hook; receives a snapshot of the finished test.
pub type AfterEachFn = Box<dyn FnMut(FinishedTestContext) -> BodyFuture + Send>;

/// Where a leaf test was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
}

impl From<&'static std::panic::Location<'static>> for SourceLocation {
    fn from(location: &'static std::panic::Location<'static>) -> Self {
        Self {
            file: location.file(),
            line: location.line(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

/// Per-test options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestOptions {
    /// Deadline for the body; `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl TestOptions {
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Stable structural identity of a leaf test: the owning scope's path
/// (sibling indices from the root) plus the test's own sibling index.
///
/// Rebuilding an identical registration pass yields identical ids, so
/// hosts can serialize an id, re-register the suite and look the test
/// up again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TestId {
    pub scope: Vec<usize>,
    pub index: usize,
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.scope {
            write!(f, "{segment}.")?;
        }
        write!(f, "{}", self.index)
    }
}

/// A registered leaf test.
pub struct TestBlock {
    pub(crate) description: String,
    pub(crate) location: SourceLocation,
    pub(crate) is_only: bool,
    pub(crate) is_skipped: bool,
    pub(crate) options: TestOptions,
    pub(crate) index: usize,
    pub(crate) body: TestBody,
}

impl TestBlock {
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[must_use]
    pub const fn location(&self) -> SourceLocation {
        self.location
    }

    #[must_use]
    pub const fn is_only(&self) -> bool {
        self.is_only
    }

    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        self.is_skipped
    }

    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.options.timeout
    }

    /// Index among the owning scope's direct children and tests, in
    /// declaration order.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Debug for TestBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestBlock")
            .field("description", &self.description)
            .field("location", &self.location)
            .field("is_only", &self.is_only)
            .field("is_skipped", &self.is_skipped)
            .field("options", &self.options)
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

/// A suite node. Owns its children; hooks, tests and child suites
/// attach in declaration order.
pub struct Scope {
    pub(crate) description: String,
    pub(crate) path: Vec<usize>,
    pub(crate) index: usize,
    pub(crate) before_all: Vec<HookFn>,
    pub(crate) before_each: Vec<HookFn>,
    pub(crate) after_each: Vec<AfterEachFn>,
    pub(crate) after_all: Vec<HookFn>,
    pub(crate) children: Vec<Scope>,
    pub(crate) tests: Vec<TestBlock>,
    /// Shared declaration counter for children and tests, so the merged
    /// declaration order is recoverable.
    pub(crate) next_index: usize,
    pub(crate) ran_before_all: bool,
    pub(crate) ran_after_all: bool,
}

impl Scope {
    pub(crate) const fn new(description: String, path: Vec<usize>, index: usize) -> Self {
        Self {
            description,
            path,
            index,
            before_all: Vec::new(),
            before_each: Vec::new(),
            after_each: Vec::new(),
            after_all: Vec::new(),
            children: Vec::new(),
            tests: Vec::new(),
            next_index: 0,
            ran_before_all: false,
            ran_after_all: false,
        }
    }

    pub(crate) const fn allocate_index(&mut self) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Structural path from the root; empty for the root itself.
    #[must_use]
    pub fn path(&self) -> &[usize] {
        &self.path
    }

    #[must_use]
    pub fn children(&self) -> &[Self] {
        &self.children
    }

    #[must_use]
    pub fn tests(&self) -> &[TestBlock] {
        &self.tests
    }

    /// Total number of leaf tests in this subtree.
    #[must_use]
    pub fn test_count(&self) -> usize {
        self.tests.len() + self.children.iter().map(Self::test_count).sum::<usize>()
    }

    /// The identity of a test belonging to this scope.
    #[must_use]
    pub fn test_id(&self, test: &TestBlock) -> TestId {
        TestId {
            scope: self.path.clone(),
            index: test.index,
        }
    }

    /// All leaf tests of this subtree with their owning scopes, in
    /// declaration order (children and tests interleaved as declared).
    #[must_use]
    pub fn enumerate_tests(&self) -> Vec<(&Self, &TestBlock)> {
        let mut out = Vec::new();
        self.collect_tests(&mut out);
        out
    }

    fn collect_tests<'a>(&'a self, out: &mut Vec<(&'a Self, &'a TestBlock)>) {
        let mut children = self.children.iter().peekable();
        let mut tests = self.tests.iter().peekable();
        loop {
            let child_next = match (children.peek(), tests.peek()) {
                (Some(child), Some(test)) => child.index < test.index,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            if child_next {
                if let Some(child) = children.next() {
                    child.collect_tests(out);
                }
            } else if let Some(test) = tests.next() {
                out.push((self, test));
            }
        }
    }

    /// Look a leaf test up by its structural identity. Side-effect
    /// free, so a host may re-register a suite just to locate one test.
    #[must_use]
    pub fn find_test(&self, id: &TestId) -> Option<&TestBlock> {
        let mut scope = self;
        for &segment in &id.scope {
            scope = scope.children.iter().find(|c| c.index == segment)?;
        }
        scope.tests.iter().find(|t| t.index == id.index)
    }

    /// The test's description prefixed with every enclosing suite
    /// description, root first.
    #[must_use]
    pub fn full_description(&self, id: &TestId) -> Option<String> {
        let mut parts = vec![self.description.as_str()];
        let mut scope = self;
        for &segment in &id.scope {
            scope = scope.children.iter().find(|c| c.index == segment)?;
            parts.push(scope.description.as_str());
        }
        let test = scope.tests.iter().find(|t| t.index == id.index)?;
        parts.push(test.description.as_str());
        Some(parts.join(" "))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("description", &self.description)
            .field("path", &self.path)
            .field("children", &self.children)
            .field("tests", &self.tests)
            .finish_non_exhaustive()
    }
}
