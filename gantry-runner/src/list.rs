// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test definitions: registration, classification and the run list.
//!
//! gantry does not scan for tests; the host harness registers each test
//! function with a [`TestRegistry`] at startup, tagging it with its
//! concurrency class and an optional skip flag. The registry validates the
//! registrations and produces a [`TestList`]: the two disjoint, ordered
//! lanes the scheduler consumes, plus any rejected (malformed) units.

use crate::{
    assertions::Assertions,
    driver::InstrumentedSession,
    errors::{MalformedTestError, MalformedTestReason, TestFailure},
};
use futures::future::BoxFuture;
use std::{collections::HashSet, fmt, future::Future, sync::Arc};
use tracing::{debug, error};

/// Identity of a test: owning suite plus test name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestId {
    /// The owning suite's name.
    pub suite: String,
    /// The test's name within its suite.
    pub name: String,
}

impl TestId {
    /// Creates a test identity.
    pub fn new(suite: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.suite, self.name)
    }
}

/// A test's concurrency class.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Safe to run concurrently with other tests; admitted through the
    /// session permit pool.
    Parallel,

    /// Must run alone, one after another in registration order (tests with
    /// global side effects).
    Serial,
}

/// Everything a test body may touch: its instrumented session and its
/// assertion service. Owned exclusively by one test execution.
#[derive(Clone)]
pub struct TestContext {
    session: Arc<InstrumentedSession>,
    assertions: Arc<Assertions>,
}

impl TestContext {
    pub(crate) fn new(session: Arc<InstrumentedSession>, assertions: Arc<Assertions>) -> Self {
        Self {
            session,
            assertions,
        }
    }

    /// The instrumented browser session.
    pub fn session(&self) -> &InstrumentedSession {
        &self.session
    }

    /// The assertion service bound to this test's timing recorder.
    pub fn assert(&self) -> &Assertions {
        &self.assertions
    }
}

/// A registered test function.
pub type TestFn =
    Arc<dyn Fn(TestContext) -> BoxFuture<'static, Result<(), TestFailure>> + Send + Sync>;

/// Adapts a plain `async fn(TestContext) -> Result<(), TestFailure>` into a
/// [`TestFn`].
pub fn test_fn<F, Fut>(f: F) -> TestFn
where
    F: Fn(TestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TestFailure>> + Send + 'static,
{
    use futures::FutureExt;
    Arc::new(move |cx| f(cx).boxed())
}

/// One registered test: identity, concurrency class, skip flag and body.
/// Immutable once admitted into a [`TestList`].
#[derive(Clone)]
pub struct TestCase {
    id: TestId,
    mode: ExecutionMode,
    skip: bool,
    run: TestFn,
}

impl TestCase {
    /// Creates a parallel, non-skipped test case.
    pub fn new(suite: impl Into<String>, name: impl Into<String>, run: TestFn) -> Self {
        Self {
            id: TestId::new(suite, name),
            mode: ExecutionMode::Parallel,
            skip: false,
            run,
        }
    }

    /// Marks this test as serial: it runs in the sequential lane.
    pub fn serial(mut self) -> Self {
        self.mode = ExecutionMode::Serial;
        self
    }

    /// Marks this test as skipped: it produces a skipped outcome without
    /// acquiring a permit or session.
    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    /// The test's identity.
    pub fn id(&self) -> &TestId {
        &self.id
    }

    /// The test's concurrency class.
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Whether the test carries the skip flag.
    pub fn is_skip(&self) -> bool {
        self.skip
    }

    pub(crate) fn run_fn(&self) -> TestFn {
        Arc::clone(&self.run)
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("skip", &self.skip)
            .finish_non_exhaustive()
    }
}

/// Collects test registrations before a run.
#[derive(Default)]
pub struct TestRegistry {
    cases: Vec<TestCase>,
}

impl TestRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a test case. Validation happens in [`Self::into_test_list`].
    pub fn add(&mut self, case: TestCase) -> &mut Self {
        self.cases.push(case);
        self
    }

    /// Validates all registrations and produces the run list.
    ///
    /// Malformed registrations (empty names, duplicate identities) are
    /// reported and excluded; they never abort the scan.
    pub fn into_test_list(self) -> TestList {
        let mut parallel = Vec::new();
        let mut serial = Vec::new();
        let mut rejected = Vec::new();
        let mut seen = HashSet::new();

        for case in self.cases {
            let reason = if case.id.suite.is_empty() || case.id.name.is_empty() {
                Some(MalformedTestReason::EmptyName)
            } else if !seen.insert(case.id.clone()) {
                Some(MalformedTestReason::DuplicateIdentity)
            } else {
                None
            };

            if let Some(reason) = reason {
                let malformed = MalformedTestError {
                    suite: case.id.suite.clone(),
                    name: case.id.name.clone(),
                    reason,
                };
                error!("{malformed}");
                rejected.push(malformed);
                continue;
            }

            match case.mode {
                ExecutionMode::Parallel => {
                    debug!(test = %case.id, "registered parallel test");
                    parallel.push(case);
                }
                ExecutionMode::Serial => {
                    debug!(test = %case.id, "registered serial test");
                    serial.push(case);
                }
            }
        }

        TestList {
            parallel,
            serial,
            rejected,
        }
    }
}

/// The validated set of tests for one run: two disjoint ordered lanes plus
/// the registrations that failed validation.
pub struct TestList {
    parallel: Vec<TestCase>,
    serial: Vec<TestCase>,
    rejected: Vec<MalformedTestError>,
}

impl TestList {
    /// Creates an empty test list.
    pub fn empty() -> Self {
        Self {
            parallel: Vec::new(),
            serial: Vec::new(),
            rejected: Vec::new(),
        }
    }

    /// Tests admitted to the parallel lane, in registration order.
    pub fn parallel_tests(&self) -> &[TestCase] {
        &self.parallel
    }

    /// Tests admitted to the sequential lane, in registration order.
    pub fn serial_tests(&self) -> &[TestCase] {
        &self.serial
    }

    /// Registrations excluded from the run.
    pub fn rejected(&self) -> &[MalformedTestError] {
        &self.rejected
    }

    /// The number of tests that will be scheduled.
    pub fn run_count(&self) -> usize {
        self.parallel.len() + self.serial.len()
    }
}
