//! Runs one test body to completion, failure or timeout.
//!
//! Exactly one body runs at a time; parallelism, if a host wants it, is
//! layered above by driving independent runners over separate trees.

use crate::result::{Failure, TestError};
use crate::scope::TestBody;
use futures::FutureExt;
use std::any::Any;
use std::future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Handle handed to each test body for incremental output capture.
///
/// Lines logged here are forwarded to the reporting sink while the body
/// runs and attached to the final result for replay.
#[derive(Debug, Clone)]
pub struct TestContext {
    output: mpsc::UnboundedSender<String>,
}

impl TestContext {
    /// Record a line of test output.
    pub fn log(&self, line: impl Into<String>) {
        let _ = self.output.send(line.into());
    }

    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (output, lines) = mpsc::unbounded_channel();
        (Self { output }, lines)
    }
}

/// What the executor observed for a single body.
#[derive(Debug)]
pub(crate) struct ExecutionReport {
    pub error: Option<TestError>,
    pub duration: Duration,
    pub output: Vec<String>,
}

/// Run one body, capturing output and enforcing the optional deadline.
///
/// Panics inside the body are caught and reported as ordinary failures
/// carrying the panic message. Cancellation on timeout is cooperative:
/// the body future is dropped, which stops it at its next suspension
/// point; a body that never suspends cannot be preempted, but the
/// reported outcome is a timeout failure either way.
pub(crate) async fn execute<F>(
    body: TestBody,
    timeout: Option<Duration>,
    mut on_output: F,
) -> ExecutionReport
where
    F: FnMut(&str),
{
    let (context, mut lines) = TestContext::channel();
    let fut = AssertUnwindSafe(body(context)).catch_unwind();
    tokio::pin!(fut);

    let deadline = async move {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let started = Instant::now();
    let mut output = Vec::new();
    let mut body_alive = true;
    let error = loop {
        tokio::select! {
            line = lines.recv(), if body_alive => match line {
                Some(line) => {
                    on_output(&line);
                    output.push(line);
                }
                // Body dropped its context handle early; stop polling
                // the channel until it finishes.
                None => body_alive = false,
            },
            result = &mut fut => break match result {
                Ok(Ok(())) => None,
                Ok(Err(failure)) => Some(TestError::Failed {
                    message: failure.message,
                }),
                Err(payload) => Some(TestError::Failed {
                    message: panic_message(payload.as_ref()),
                }),
            },
            () = &mut deadline => break timeout.map(|limit| TestError::TimedOut { limit }),
        }
    };
    let duration = started.elapsed();

    // The body finished or was dropped; pick up whatever it logged last.
    while let Ok(line) = lines.try_recv() {
        on_output(&line);
        output.push(line);
    }

    ExecutionReport {
        error,
        duration,
        output,
    }
}

/// Await a hook future, converting panics into hook failures.
pub(crate) async fn run_hook(fut: crate::scope::BodyFuture) -> Result<(), Failure> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(Failure::new(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload.downcast_ref::<&str>().map_or_else(
        || {
            payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "test body panicked".to_string())
        },
        |message| (*message).to_string(),
    )
}
