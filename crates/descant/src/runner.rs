//! The lifecycle runner: one depth-first, declaration-order pass over a
//! consumed scope tree.
//!
//! The tree is flattened into an arena before execution so hook state
//! (the once-flags and any recorded setup failure) lives next to parent
//! links instead of behind back-references.

use crate::executor::{execute, run_hook};
use crate::report::{ReportSink, TestInfo};
use crate::result::{FinishedTestContext, HookKind, RunResult, TestError, TestOutcome};
use crate::scope::{AfterEachFn, HookFn, Scope, TestBody, TestId};
use crate::select::{Selection, SkipReason};
use crate::summary::RunSummary;

struct ScopeCell {
    description: String,
    parent: Option<usize>,
    before_all: Vec<HookFn>,
    before_each: Vec<HookFn>,
    after_each: Vec<AfterEachFn>,
    after_all: Vec<HookFn>,
    ran_before_all: bool,
    /// First `before_all` failure under this scope; poisons every
    /// later dependent test instead of re-running setup.
    before_all_error: Option<String>,
    ran_after_all: bool,
    /// Position (in traversal order) of the last leaf in this scope's
    /// subtree; `None` for a subtree without tests, whose hooks never
    /// run.
    last_leaf: Option<usize>,
}

struct FlatTest {
    scope: usize,
    skip: Option<SkipReason>,
    info: TestInfo,
    body: TestBody,
}

/// Run every leaf test under `root` sequentially, pushing progress into
/// `sink`, and return the folded summary.
///
/// Failures are contained per test; the traversal always reaches every
/// leaf. The summary is also handed to the sink as the final event.
pub async fn run<S: ReportSink>(root: Scope, sink: &mut S) -> RunSummary {
    let selection = Selection::resolve(&root);
    let mut scopes = Vec::new();
    let mut tests = Vec::new();
    flatten(root, None, "", selection, &mut scopes, &mut tests);

    let mut summary = RunSummary::default();
    for (position, test) in tests.into_iter().enumerate() {
        let FlatTest {
            scope,
            skip,
            info,
            body,
        } = test;
        let chain = ancestor_chain(&scopes, scope);

        // Setup runs lazily on the first traversal that reaches each
        // scope, before the skip check.
        let setup_error = ensure_before_all(&mut scopes, &chain).await;

        let result = if let Some(reason) = skip {
            sink.test_skipped(&info, reason);
            RunResult::skipped(reason)
        } else {
            sink.test_starting(&info);
            let result = match setup_error {
                Some(error) => RunResult::failed_setup(error),
                None => execute_leaf(&mut scopes, &chain, &info, body, sink).await,
            };
            match &result.outcome {
                TestOutcome::Failed(error) => sink.test_failed(&info, error, &result),
                TestOutcome::Passed | TestOutcome::Skipped(_) => sink.test_passed(&info, &result),
            }
            result
        };

        sink.test_finished(&info, &result);
        summary += RunSummary::of(&result);

        finish_scopes(&mut scopes, scope, position, sink).await;
    }

    sink.run_finished(&summary);
    summary
}

/// Run the hooks and body for one eligible leaf.
async fn execute_leaf<S: ReportSink>(
    scopes: &mut [ScopeCell],
    chain: &[usize],
    info: &TestInfo,
    body: TestBody,
    sink: &mut S,
) -> RunResult {
    let mut setup_failure = None;
    'setup: for &index in chain {
        for hook in &mut scopes[index].before_each {
            if let Err(failure) = run_hook(hook()).await {
                setup_failure = Some(TestError::Hook {
                    kind: HookKind::BeforeEach,
                    message: failure.message,
                });
                break 'setup;
            }
        }
    }

    let result = match setup_failure {
        Some(error) => RunResult::failed_setup(error),
        None => {
            let report = execute(body, info.timeout, |line| sink.test_output(info, line)).await;
            RunResult {
                outcome: report
                    .error
                    .map_or(TestOutcome::Passed, TestOutcome::Failed),
                duration: report.duration,
                output: report.output,
            }
        }
    };

    // Teardown runs even when setup failed, so fixtures registered
    // before the failing hook still get released.
    let error = match &result.outcome {
        TestOutcome::Passed | TestOutcome::Skipped(_) => None,
        TestOutcome::Failed(error) => Some(error.clone()),
    };
    for &index in chain {
        for hook in &mut scopes[index].after_each {
            let context = FinishedTestContext {
                passed: result.outcome.is_passed(),
                error: error.clone(),
                output: result.output.clone(),
                duration: result.duration,
            };
            if let Err(failure) = run_hook(hook(context)).await {
                sink.hook_diagnostic(
                    HookKind::AfterEach,
                    &scopes[index].description,
                    &failure.message,
                );
            }
        }
    }

    result
}

/// Run any pending `before_all` hooks along the chain, outermost first.
/// Returns the setup failure to attribute to the current test, if any.
async fn ensure_before_all(scopes: &mut [ScopeCell], chain: &[usize]) -> Option<TestError> {
    for &index in chain {
        if let Some(message) = &scopes[index].before_all_error {
            return Some(TestError::Hook {
                kind: HookKind::BeforeAll,
                message: message.clone(),
            });
        }
        if scopes[index].ran_before_all {
            continue;
        }
        scopes[index].ran_before_all = true;
        for hook in &mut scopes[index].before_all {
            if let Err(failure) = run_hook(hook()).await {
                scopes[index].before_all_error = Some(failure.message.clone());
                return Some(TestError::Hook {
                    kind: HookKind::BeforeAll,
                    message: failure.message,
                });
            }
        }
    }
    None
}

/// Fire `after_all` for every scope whose subtree ended at `position`,
/// innermost scope first.
async fn finish_scopes<S: ReportSink>(
    scopes: &mut [ScopeCell],
    leaf_scope: usize,
    position: usize,
    sink: &mut S,
) {
    let mut current = Some(leaf_scope);
    while let Some(index) = current {
        if scopes[index].last_leaf == Some(position) && !scopes[index].ran_after_all {
            scopes[index].ran_after_all = true;
            for hook in &mut scopes[index].after_all {
                if let Err(failure) = run_hook(hook()).await {
                    sink.hook_diagnostic(
                        HookKind::AfterAll,
                        &scopes[index].description,
                        &failure.message,
                    );
                }
            }
        }
        current = scopes[index].parent;
    }
}

fn ancestor_chain(scopes: &[ScopeCell], leaf_scope: usize) -> Vec<usize> {
    let mut chain = vec![leaf_scope];
    let mut current = leaf_scope;
    while let Some(parent) = scopes[current].parent {
        chain.push(parent);
        current = parent;
    }
    chain.reverse();
    chain
}

/// Move one scope into the arena, interleaving child suites and leaf
/// tests back into declaration order.
fn flatten(
    scope: Scope,
    parent: Option<usize>,
    prefix: &str,
    selection: Selection,
    scopes: &mut Vec<ScopeCell>,
    tests: &mut Vec<FlatTest>,
) {
    let Scope {
        description,
        path,
        before_all,
        before_each,
        after_each,
        after_all,
        children,
        tests: leaves,
        ran_before_all,
        ran_after_all,
        ..
    } = scope;

    let full_description = if prefix.is_empty() {
        description.clone()
    } else {
        format!("{prefix} {description}")
    };
    let cell = scopes.len();
    scopes.push(ScopeCell {
        description,
        parent,
        before_all,
        before_each,
        after_each,
        after_all,
        ran_before_all,
        before_all_error: None,
        ran_after_all,
        last_leaf: None,
    });

    let first = tests.len();
    let mut children = children.into_iter().peekable();
    let mut leaves = leaves.into_iter().peekable();
    loop {
        let child_next = match (children.peek(), leaves.peek()) {
            (Some(child), Some(leaf)) => child.index < leaf.index,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        if child_next {
            if let Some(child) = children.next() {
                flatten(child, Some(cell), &full_description, selection, scopes, tests);
            }
        } else if let Some(leaf) = leaves.next() {
            let skip = selection.decide(&leaf);
            tests.push(FlatTest {
                scope: cell,
                skip,
                info: TestInfo {
                    id: TestId {
                        scope: path.clone(),
                        index: leaf.index,
                    },
                    full_description: format!("{full_description} {}", leaf.description),
                    description: leaf.description,
                    location: leaf.location,
                    timeout: leaf.options.timeout,
                },
                body: leaf.body,
            });
        }
    }
    if tests.len() > first {
        scopes[cell].last_leaf = Some(tests.len() - 1);
    }
}
