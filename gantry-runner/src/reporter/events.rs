// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events and outcome types shared between the runner and reporters.

use crate::{list::TestId, timing::Action};
use chrono::{DateTime, FixedOffset, Local};
use std::time::Duration;

/// A test event.
///
/// Events are produced by a [`TestRunner`](crate::runner::TestRunner) and
/// consumed by the run's event callback.
#[derive(Clone, Debug)]
pub struct TestEvent {
    /// The time at which the event was generated, including the offset from
    /// UTC.
    pub timestamp: DateTime<FixedOffset>,

    /// The amount of time elapsed since the start of the test run.
    pub elapsed: Duration,

    /// The kind of test event this is.
    pub kind: TestEventKind,
}

/// The kind of test event this is.
///
/// Forms part of [`TestEvent`].
#[derive(Clone, Debug)]
pub enum TestEventKind {
    /// The test run started.
    RunStarted {
        /// The number of tests that will be scheduled.
        run_count: usize,

        /// The number of tests in the parallel lane.
        parallel_count: usize,

        /// The number of tests in the sequential lane.
        serial_count: usize,

        /// The number of registrations rejected as malformed.
        rejected_count: usize,
    },

    /// A test began executing (after its permit, for the parallel lane).
    TestStarted {
        /// The test that started.
        id: TestId,

        /// The number of tests currently running, including this one.
        running: usize,
    },

    /// A test carried the skip flag and produced a skipped outcome without
    /// running.
    TestSkipped {
        /// The test that was skipped.
        id: TestId,
    },

    /// A test finished and produced its outcome.
    TestFinished {
        /// The outcome of the test.
        outcome: TestOutcome,

        /// Current statistics for the number of tests run so far.
        current_stats: RunStats,

        /// The number of tests still running, excluding this one.
        running: usize,
    },

    /// A cancellation notice was received.
    RunBeginCancel {
        /// The number of tests still running.
        running: usize,

        /// The reason the run is being cancelled.
        reason: CancelReason,
    },

    /// The test run finished.
    RunFinished {
        /// The time at which the run was started.
        start_time: DateTime<FixedOffset>,

        /// The amount of time it took for the tests to run.
        elapsed: Duration,

        /// Statistics for the run.
        run_stats: RunStats,
    },
}

/// The reason why a test run is being cancelled.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum CancelReason {
    /// An error occurred while reporting results.
    ReportError,

    /// A termination signal (on Unix, SIGTERM or SIGHUP) was received.
    Signal,

    /// An interrupt (on Unix, Ctrl-C) was received.
    Interrupt,
}

impl CancelReason {
    pub(crate) fn to_static_str(self) -> &'static str {
        match self {
            CancelReason::ReportError => "reporting error",
            CancelReason::Signal => "signal",
            CancelReason::Interrupt => "interrupt",
        }
    }
}

/// Terminal status of one test execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TestStatus {
    /// The test ran to completion without a failure.
    Passed,

    /// The test failed.
    Failed,

    /// The test carried the skip flag and never ran.
    Skipped,
}

impl TestStatus {
    /// Returns true if this status is a pass or a skip.
    pub fn is_success(self) -> bool {
        matches!(self, TestStatus::Passed | TestStatus::Skipped)
    }
}

/// The result of running one test: created exactly once per scheduled test.
#[derive(Clone, Debug)]
pub struct TestOutcome {
    /// The identity of the test.
    pub id: TestId,

    /// Terminal status.
    pub status: TestStatus,

    /// Wall-clock start of the test.
    pub start_time: DateTime<Local>,

    /// Wall-clock elapsed time. Zero for skipped tests.
    pub duration: Duration,

    /// The failure message, for failed tests.
    pub error: Option<String>,

    /// The instrumented actions recorded while the test ran, in recorded
    /// order. For a failed test with a non-empty timeline, the last action
    /// is annotated as the failure pivot.
    pub actions: Vec<Action>,
}

impl TestOutcome {
    /// Wall-clock start in milliseconds since the Unix epoch.
    pub fn start_millis(&self) -> i64 {
        self.start_time.timestamp_millis()
    }

    /// Wall-clock end in milliseconds since the Unix epoch.
    pub fn end_millis(&self) -> i64 {
        self.start_millis() + self.duration.as_millis() as i64
    }
}

/// Statistics for a test run.
#[derive(Copy, Clone, Default, Debug, Eq, PartialEq)]
pub struct RunStats {
    /// The total number of tests that were expected to be run at the
    /// beginning.
    ///
    /// If the test run is cancelled, this will be more than
    /// `finished_count` at the end.
    pub initial_run_count: usize,

    /// The total number of tests that produced an outcome.
    pub finished_count: usize,

    /// The number of tests that passed.
    pub passed: usize,

    /// The number of tests that failed.
    pub failed: usize,

    /// The number of tests that were skipped.
    pub skipped: usize,
}

impl RunStats {
    /// Returns true if this run is considered a success: every scheduled
    /// test produced an outcome and none failed.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.finished_count == self.initial_run_count
    }

    pub(crate) fn on_outcome(&mut self, status: TestStatus) {
        self.finished_count += 1;
        match status {
            TestStatus::Passed => self.passed += 1,
            TestStatus::Failed => self.failed += 1,
            TestStatus::Skipped => self.skipped += 1,
        }
    }
}
