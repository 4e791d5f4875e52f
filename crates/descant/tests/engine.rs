//! End-to-end engine tests driving registration, selection, the
//! lifecycle runner and reporting together.

use descant::{
    BuilderError, Failure, HookKind, ReportSink, RunResult, RunSummary, SkipReason, TestError,
    TestInfo, TestOutcome, run,
};
use std::future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

type Log = Arc<Mutex<Vec<String>>>;

fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

/// Captures the full event stream for assertions.
#[derive(Default)]
struct RecordingSink {
    events: Vec<String>,
    finished: Vec<(String, RunResult)>,
    diagnostics: Vec<(HookKind, String, String)>,
    summary: Option<RunSummary>,
}

impl ReportSink for RecordingSink {
    fn test_starting(&mut self, info: &TestInfo) {
        self.events
            .push(format!("starting {}", info.full_description));
    }

    fn test_output(&mut self, info: &TestInfo, line: &str) {
        self.events.push(format!("output {}: {line}", info.description));
    }

    fn test_passed(&mut self, info: &TestInfo, _result: &RunResult) {
        self.events.push(format!("passed {}", info.full_description));
    }

    fn test_failed(&mut self, info: &TestInfo, _error: &TestError, _result: &RunResult) {
        self.events.push(format!("failed {}", info.full_description));
    }

    fn test_skipped(&mut self, info: &TestInfo, reason: SkipReason) {
        self.events
            .push(format!("skipped {} ({reason})", info.full_description));
    }

    fn test_finished(&mut self, info: &TestInfo, result: &RunResult) {
        self.events
            .push(format!("finished {}", info.full_description));
        self.finished
            .push((info.full_description.clone(), result.clone()));
    }

    fn hook_diagnostic(&mut self, kind: HookKind, scope_description: &str, message: &str) {
        self.diagnostics
            .push((kind, scope_description.to_string(), message.to_string()));
    }

    fn run_finished(&mut self, summary: &RunSummary) {
        self.summary = Some(*summary);
    }
}

#[tokio::test]
async fn test_hooks_run_in_lifecycle_order() -> Result<(), BuilderError> {
    let trace = log();
    let mut builder = descant::TestBuilder::new();
    let t0 = Arc::clone(&trace);
    builder.describe("root", move |t| {
        let trace = Arc::clone(&t0);
        let (a, b, c, d) = (
            Arc::clone(&trace),
            Arc::clone(&trace),
            Arc::clone(&trace),
            Arc::clone(&trace),
        );
        t.before_all(move || {
            let trace = Arc::clone(&a);
            async move {
                trace.lock().await.push("root before_all".to_string());
                Ok(())
            }
        })?;
        t.before_each(move || {
            let trace = Arc::clone(&b);
            async move {
                trace.lock().await.push("root before_each".to_string());
                Ok(())
            }
        })?;
        t.after_each(move |_| {
            let trace = Arc::clone(&c);
            async move {
                trace.lock().await.push("root after_each".to_string());
                Ok(())
            }
        })?;
        t.after_all(move || {
            let trace = Arc::clone(&d);
            async move {
                trace.lock().await.push("root after_all".to_string());
                Ok(())
            }
        })?;

        let body = Arc::clone(&trace);
        t.it("one", move |_| async move {
            body.lock().await.push("body one".to_string());
            Ok(())
        })?;

        let inner = Arc::clone(&trace);
        t.describe("inner", move |t| {
            let (e, f, g, h) = (
                Arc::clone(&inner),
                Arc::clone(&inner),
                Arc::clone(&inner),
                Arc::clone(&inner),
            );
            t.before_all(move || {
                let trace = Arc::clone(&e);
                async move {
                    trace.lock().await.push("inner before_all".to_string());
                    Ok(())
                }
            })?;
            t.before_each(move || {
                let trace = Arc::clone(&f);
                async move {
                    trace.lock().await.push("inner before_each".to_string());
                    Ok(())
                }
            })?;
            t.after_each(move |_| {
                let trace = Arc::clone(&g);
                async move {
                    trace.lock().await.push("inner after_each".to_string());
                    Ok(())
                }
            })?;
            t.after_all(move || {
                let trace = Arc::clone(&h);
                async move {
                    trace.lock().await.push("inner after_all".to_string());
                    Ok(())
                }
            })?;

            let body = Arc::clone(&inner);
            t.it("two", move |_| async move {
                body.lock().await.push("body two".to_string());
                Ok(())
            })
        })
    })?;
    let root = builder.consume()?;

    let summary = run(root, &mut RecordingSink::default()).await;

    assert_eq!(summary.passed, 2);
    assert_eq!(
        *trace.lock().await,
        vec![
            "root before_all",
            "root before_each",
            "body one",
            "root after_each",
            "inner before_all",
            "root before_each",
            "inner before_each",
            "body two",
            "root after_each",
            "inner after_each",
            "inner after_all",
            "root after_all",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_suite_hooks_run_exactly_once_across_many_tests() -> Result<(), BuilderError> {
    let before = Arc::new(AtomicU32::new(0));
    let after = Arc::new(AtomicU32::new(0));

    let mut builder = descant::TestBuilder::new();
    let (b, a) = (Arc::clone(&before), Arc::clone(&after));
    let observed = Arc::clone(&before);
    builder.describe("suite", move |t| {
        t.before_all(move || {
            b.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })?;
        t.after_all(move || {
            a.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })?;
        // Each body sees the counter at 1, not once per test.
        for name in ["first", "second", "third"] {
            let seen = Arc::clone(&observed);
            t.it(name, move |_| async move {
                if seen.load(Ordering::SeqCst) == 1 {
                    Ok(())
                } else {
                    Err(Failure::new("setup ran more than once"))
                }
            })?;
        }
        Ok(())
    })?;
    let root = builder.consume()?;

    let summary = run(root, &mut descant::NullSink).await;

    assert_eq!(summary.passed, 3);
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(after.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_only_restricts_the_run_and_reports_the_rest_skipped() -> Result<(), BuilderError> {
    let mut builder = descant::TestBuilder::new();
    builder.describe("suite", |t| {
        t.it("a", |_| async { Ok(()) })?;
        t.it("b", |_| async { Ok(()) })?;
        t.describe("nested", |t| {
            t.only("chosen", |_| async { Ok(()) })?;
            t.it("c", |_| async { Ok(()) })
        })?;
        t.it("d", |_| async { Ok(()) })
    })?;
    let root = builder.consume()?;

    let mut sink = RecordingSink::default();
    let summary = run(root, &mut sink).await;

    assert_eq!(summary.passed, 1);
    assert_eq!(summary.skipped, 4);

    let started: Vec<&str> = sink
        .events
        .iter()
        .filter(|e| e.starts_with("starting"))
        .map(String::as_str)
        .collect();
    assert_eq!(started, vec!["starting suite nested chosen"]);

    for (name, result) in &sink.finished {
        if name.ends_with("chosen") {
            assert!(result.outcome.is_passed());
        } else {
            assert_eq!(
                result.outcome,
                TestOutcome::Skipped(SkipReason::OnlyElsewhere),
                "{name} should be filtered out"
            );
        }
    }
    Ok(())
}

#[tokio::test]
async fn test_skipped_test_still_triggers_suite_setup() -> Result<(), BuilderError> {
    let before = Arc::new(AtomicU32::new(0));
    let after = Arc::new(AtomicU32::new(0));

    let mut builder = descant::TestBuilder::new();
    let (b, a) = (Arc::clone(&before), Arc::clone(&after));
    builder.describe("suite", move |t| {
        t.before_all(move || {
            b.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })?;
        t.after_all(move || {
            a.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })?;
        t.skip("parked", |_| async { Ok(()) })
    })?;
    let root = builder.consume()?;

    let mut sink = RecordingSink::default();
    let summary = run(root, &mut sink).await;

    assert_eq!(summary.skipped, 1);
    assert_eq!(before.load(Ordering::SeqCst), 1);
    assert_eq!(after.load(Ordering::SeqCst), 1);
    // Skipped tests conclude without a starting event.
    assert_eq!(
        sink.events,
        vec![
            "skipped suite parked (explicit-skip)",
            "finished suite parked"
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_parameterized_tests_run_per_value_in_order() -> Result<(), BuilderError> {
    let mut builder = descant::TestBuilder::new();
    builder.describe("numbers", |t| {
        t.it_each([1_u32, 2, 3], "n={0}", |n, _| async move {
            if n > 0 {
                Ok(())
            } else {
                Err(Failure::new("not positive"))
            }
        })
    })?;
    let root = builder.consume()?;

    let mut sink = RecordingSink::default();
    let summary = run(root, &mut sink).await;

    assert_eq!(summary.passed, 3);
    let names: Vec<&str> = sink.finished.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(
        names,
        vec!["numbers n=1", "numbers n=2", "numbers n=3"]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_timeout_is_contained_and_the_run_continues() -> Result<(), BuilderError> {
    let mut builder = descant::TestBuilder::new();
    builder.describe("suite", |t| {
        t.it_with(
            "stuck",
            descant::TestOptions::with_timeout(Duration::from_millis(50)),
            |_| async {
                future::pending::<()>().await;
                Ok(())
            },
        )?;
        t.it("after", |_| async { Ok(()) })
    })?;
    let root = builder.consume()?;

    let mut sink = RecordingSink::default();
    let summary = run(root, &mut sink).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.passed, 1);

    let (_, stuck) = &sink.finished[0];
    assert!(matches!(
        stuck.outcome,
        TestOutcome::Failed(TestError::TimedOut { .. })
    ));
    Ok(())
}

#[tokio::test]
async fn test_before_all_failure_poisons_dependent_tests() -> Result<(), BuilderError> {
    let bodies = Arc::new(AtomicU32::new(0));
    let cleanups = Arc::new(AtomicU32::new(0));

    let mut builder = descant::TestBuilder::new();
    let (ran, cleaned) = (Arc::clone(&bodies), Arc::clone(&cleanups));
    builder.describe("suite", move |t| {
        t.before_all(|| async { Err(Failure::new("db down")) })?;
        t.after_each(move |_| {
            cleaned.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        })?;
        let first = Arc::clone(&ran);
        t.it("a", move |_| async move {
            first.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })?;
        let second = Arc::clone(&ran);
        t.it("b", move |_| async move {
            second.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    })?;
    let root = builder.consume()?;

    let mut sink = RecordingSink::default();
    let summary = run(root, &mut sink).await;

    assert_eq!(summary.failed, 2);
    assert_eq!(bodies.load(Ordering::SeqCst), 0);
    assert_eq!(cleanups.load(Ordering::SeqCst), 0);

    for (name, result) in &sink.finished {
        assert_eq!(
            result.outcome,
            TestOutcome::Failed(TestError::Hook {
                kind: HookKind::BeforeAll,
                message: "db down".to_string(),
            }),
            "{name} should carry the setup failure"
        );
    }
    Ok(())
}

#[tokio::test]
async fn test_before_each_failure_skips_the_body_but_not_teardown() -> Result<(), BuilderError> {
    let bodies = Arc::new(AtomicU32::new(0));
    let seen = log();

    let mut builder = descant::TestBuilder::new();
    let (ran, observed) = (Arc::clone(&bodies), Arc::clone(&seen));
    builder.describe("suite", move |t| {
        t.before_each(|| async { Err(Failure::new("fixture refused")) })?;
        t.after_each(move |cx| {
            let observed = Arc::clone(&observed);
            async move {
                let error = cx.error.map_or_else(|| "none".to_string(), |e| e.to_string());
                observed.lock().await.push(format!("passed={} error={error}", cx.passed));
                Ok(())
            }
        })?;
        t.it("a", move |_| async move {
            ran.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    })?;
    let root = builder.consume()?;

    let mut sink = RecordingSink::default();
    let summary = run(root, &mut sink).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(bodies.load(Ordering::SeqCst), 0);
    assert_eq!(
        sink.finished[0].1.outcome,
        TestOutcome::Failed(TestError::Hook {
            kind: HookKind::BeforeEach,
            message: "fixture refused".to_string(),
        })
    );
    assert_eq!(
        *seen.lock().await,
        vec!["passed=false error=before-each hook failed: fixture refused"]
    );
    Ok(())
}

#[tokio::test]
async fn test_teardown_failures_become_diagnostics_not_outcomes() -> Result<(), BuilderError> {
    let mut builder = descant::TestBuilder::new();
    builder.describe("suite", |t| {
        t.after_each(|_| async { Err(Failure::new("could not drop table")) })?;
        t.after_all(|| async { Err(Failure::new("socket already closed")) })?;
        t.it("still passes", |_| async { Ok(()) })
    })?;
    let root = builder.consume()?;

    let mut sink = RecordingSink::default();
    let summary = run(root, &mut sink).await;

    assert_eq!(summary.passed, 1);
    assert!(summary.is_success());
    assert!(sink.finished[0].1.outcome.is_passed());
    assert_eq!(
        sink.diagnostics,
        vec![
            (
                HookKind::AfterEach,
                "suite".to_string(),
                "could not drop table".to_string()
            ),
            (
                HookKind::AfterAll,
                "suite".to_string(),
                "socket already closed".to_string()
            ),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_output_is_streamed_and_replayed() -> Result<(), BuilderError> {
    let mut builder = descant::TestBuilder::new();
    builder.describe("suite", |t| {
        t.it("chatty", |cx| async move {
            cx.log("step 1");
            cx.log("step 2");
            Err(Failure::new("gave up at step 3"))
        })
    })?;
    let root = builder.consume()?;

    let mut sink = RecordingSink::default();
    run(root, &mut sink).await;

    assert_eq!(
        sink.events,
        vec![
            "starting suite chatty",
            "output chatty: step 1",
            "output chatty: step 2",
            "failed suite chatty",
            "finished suite chatty",
        ]
    );
    // Captured output rides along with the failure for replay.
    assert_eq!(sink.finished[0].1.output, vec!["step 1", "step 2"]);
    assert!(sink.finished[0].1.outcome.is_failed());
    Ok(())
}

#[tokio::test]
async fn test_event_stream_matches_the_reporting_contract() -> Result<(), BuilderError> {
    let mut builder = descant::TestBuilder::new();
    builder.describe("suite", |t| {
        t.it("passes", |_| async { Ok(()) })?;
        t.it("fails", |_| async { Err(Failure::new("no")) })?;
        t.skip("parked", |_| async { Ok(()) })
    })?;
    let root = builder.consume()?;

    let mut sink = RecordingSink::default();
    let summary = run(root, &mut sink).await;

    let count = |prefix: &str| sink.events.iter().filter(|e| e.starts_with(prefix)).count();
    // One starting per executed test, one terminal per test, one
    // finished after each terminal.
    assert_eq!(count("starting"), 2);
    assert_eq!(count("passed"), 1);
    assert_eq!(count("failed"), 1);
    assert_eq!(count("skipped"), 1);
    assert_eq!(count("finished"), 3);
    assert_eq!(
        sink.events.last().map(String::as_str),
        Some("finished suite parked")
    );
    assert_eq!(sink.summary, Some(summary));
    Ok(())
}

#[tokio::test]
async fn test_failures_carry_panic_messages() -> Result<(), Box<dyn std::error::Error>> {
    let mut builder = descant::TestBuilder::new();
    builder.describe("suite", |t| {
        t.it("blows up", |_| async {
            assert_eq!(2 + 2, 5, "arithmetic check");
            Ok(())
        })
    })?;
    let root = builder.consume()?;

    let mut sink = RecordingSink::default();
    let summary = run(root, &mut sink).await;

    assert_eq!(summary.failed, 1);
    let TestOutcome::Failed(TestError::Failed { message }) = &sink.finished[0].1.outcome else {
        return Err("expected a body failure".into());
    };
    assert!(message.contains("arithmetic check"));
    Ok(())
}
