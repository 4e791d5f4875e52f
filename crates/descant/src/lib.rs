//! Core library for the descant test engine.
//!
//! This crate provides behavior-driven test organization and execution:
//! - Scope tree registration (`describe`/`it` with hooks)
//! - Parameterized test expansion
//! - Selection resolution (`only`/`skip`)
//! - Sequential lifecycle runner with exactly-once suite hooks
//! - Async per-test execution with timeouts and output capture
//! - Progress reporting through an abstract sink
//! - Run summary aggregation

pub mod builder;
pub mod executor;
pub mod report;
pub mod result;
pub mod runner;
pub mod scope;
pub mod select;
pub mod summary;

pub use builder::{BuilderError, TestBuilder, format_description};
pub use executor::TestContext;
pub use report::{ChannelSink, NullSink, ReportSink, RunEvent, TestInfo};
pub use result::{Failure, FinishedTestContext, HookKind, RunResult, TestError, TestOutcome};
pub use runner::run;
pub use scope::{Scope, SourceLocation, TestBlock, TestId, TestOptions};
pub use select::{Selection, SkipReason};
pub use summary::RunSummary;
