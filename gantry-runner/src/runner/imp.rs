// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::dispatcher::{DispatcherContext, InternalTestEvent};
use crate::{
    assertions::Assertions,
    config::{GantryConfig, SessionCount},
    driver::{BrowserConfig, InstrumentedSession, Session, SessionProvider},
    errors::RunnerBuildError,
    list::{TestCase, TestContext, TestList},
    reporter::{CancelReason, RunStats, TestEvent, TestOutcome, TestStatus},
    signal::{SignalHandler, SignalHandlerKind},
    timing::TimingRecorder,
};
use async_scoped::TokioScope;
use chrono::Local;
use futures::FutureExt;
use std::{
    convert::Infallible,
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{
    runtime::Runtime,
    sync::{
        Semaphore,
        mpsc::{UnboundedSender, unbounded_channel},
    },
};
use tracing::{debug, info, warn};

/// Test runner options.
#[derive(Debug, Default)]
pub struct RunnerBuilder {
    session_count: Option<SessionCount>,
    wait_timeout: Option<Duration>,
    poll_interval: Option<Duration>,
}

impl RunnerBuilder {
    /// Overrides the parallel lane's session permit-pool size.
    ///
    /// Defaults to the `execution.thread_count` config key.
    pub fn set_session_count(&mut self, session_count: SessionCount) -> &mut Self {
        self.session_count = Some(session_count);
        self
    }

    /// Overrides the element-wait and navigation timeout.
    ///
    /// Defaults to the `execution.timeout` config key.
    pub fn set_wait_timeout(&mut self, wait_timeout: Duration) -> &mut Self {
        self.wait_timeout = Some(wait_timeout);
        self
    }

    /// Overrides the element-wait poll interval.
    pub fn set_poll_interval(&mut self, poll_interval: Duration) -> &mut Self {
        self.poll_interval = Some(poll_interval);
        self
    }

    /// Creates a new test runner.
    pub fn build<'a>(
        self,
        test_list: &'a TestList,
        config: &GantryConfig,
        provider: Arc<dyn SessionProvider>,
        signal_handler: SignalHandlerKind,
    ) -> Result<TestRunner<'a>, RunnerBuildError> {
        let session_count = self
            .session_count
            .unwrap_or(config.execution.thread_count)
            .compute()
            .max(1);
        let wait_timeout = self
            .wait_timeout
            .unwrap_or_else(|| config.execution.wait_timeout());
        let browser_config = BrowserConfig::from_config(config);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("gantry-runner-worker")
            .build()
            .map_err(RunnerBuildError::TokioRuntimeCreate)?;
        let _guard = runtime.enter();

        // signal_handler.build() must be called from within the guard.
        let signal_handler = signal_handler.build()?;

        Ok(TestRunner {
            inner: RunnerInner {
                session_count,
                wait_timeout,
                poll_interval: self.poll_interval,
                browser_config,
                provider,
                test_list,
                runtime,
            },
            signal_handler,
        })
    }
}

/// Context for running tests.
///
/// Created using [`RunnerBuilder::build`].
pub struct TestRunner<'a> {
    inner: RunnerInner<'a>,
    signal_handler: SignalHandler,
}

impl fmt::Debug for TestRunner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRunner")
            .field("session_count", &self.inner.session_count)
            .field("wait_timeout", &self.inner.wait_timeout)
            .finish_non_exhaustive()
    }
}

impl TestRunner<'_> {
    /// Executes the listed tests.
    ///
    /// The callback is called with an event stream describing the run; the
    /// returned report carries the aggregated outcomes.
    pub fn execute<F>(self, mut callback: F) -> RunReport
    where
        F: FnMut(TestEvent) + Send,
    {
        match self.try_execute::<Infallible, _>(|event| {
            callback(event);
            Ok(())
        }) {
            Ok(report) => report,
            Err(never) => match never {},
        }
    }

    /// Executes the listed tests, with a fallible event callback.
    ///
    /// If the callback returns an error the run is cancelled, outstanding
    /// tasks wind down through their own cleanup paths, and the first
    /// callback error is returned.
    pub fn try_execute<E, F>(mut self, mut callback: F) -> Result<RunReport, E>
    where
        F: FnMut(TestEvent) -> Result<(), E> + Send,
        E: fmt::Debug + Send,
    {
        let mut first_error = None;

        let report = self
            .inner
            .execute(&mut self.signal_handler, |event| match callback(event) {
                Ok(()) => true,
                Err(error) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                    false
                }
            });

        match first_error {
            None => Ok(report),
            Some(error) => Err(error),
        }
    }
}

/// The aggregated result of a run, produced after both lanes join.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Per-status counts for the run.
    pub run_stats: RunStats,

    /// One outcome per test that completed before any cancellation.
    pub outcomes: Vec<TestOutcome>,

    /// Why the run was cancelled, if it was.
    pub cancel_reason: Option<CancelReason>,
}

struct RunnerInner<'a> {
    session_count: usize,
    wait_timeout: Duration,
    poll_interval: Option<Duration>,
    browser_config: BrowserConfig,
    provider: Arc<dyn SessionProvider>,
    test_list: &'a TestList,
    runtime: Runtime,
}

impl RunnerInner<'_> {
    fn execute<F>(&self, signal_handler: &mut SignalHandler, callback: F) -> RunReport
    where
        F: FnMut(TestEvent) -> bool + Send,
    {
        let cancelled = AtomicBool::new(false);
        let cancelled_ref = &cancelled;

        // The permit pool is the only state shared across parallel tasks.
        let session_permits = Arc::new(Semaphore::new(self.session_count));
        let permits_ref = &session_permits;

        let mut dispatcher_cx = DispatcherContext::new(callback, self.test_list.run_count());
        dispatcher_cx.run_started(self.test_list);
        let dispatcher_cx_mut = &mut dispatcher_cx;

        let _guard = self.runtime.enter();

        let (_, results) = TokioScope::scope_and_block(move |scope| {
            let (resp_tx, resp_rx) = unbounded_channel::<InternalTestEvent>();

            let dispatcher_fut =
                dispatcher_cx_mut.run(resp_rx, signal_handler, cancelled_ref, permits_ref);
            scope.spawn_cancellable(dispatcher_fut, || ());

            // Sequential lane: exactly one worker, registration order, no
            // permit involved.
            {
                let this_resp_tx = resp_tx.clone();
                let serial_fut = async move {
                    for test in self.test_list.serial_tests() {
                        if cancelled_ref.load(Ordering::Acquire) {
                            debug!(test = %test.id(), "run cancelled, not starting serial test");
                            continue;
                        }
                        self.run_test(test.clone(), &this_resp_tx).await;
                    }
                };
                scope.spawn_cancellable(serial_fut, || ());
            }

            // Parallel lane: every task is issued eagerly; only session
            // creation is throttled, by permit acquisition.
            for test in self.test_list.parallel_tests() {
                let this_resp_tx = resp_tx.clone();
                let session_permits = Arc::clone(permits_ref);
                let test = test.clone();

                let fut = async move {
                    if cancelled_ref.load(Ordering::Acquire) {
                        return;
                    }
                    if test.is_skip() {
                        // Skipped tests never touch the permit pool.
                        self.run_test(test, &this_resp_tx).await;
                        return;
                    }

                    debug!(test = %test.id(), "waiting for session permit");
                    let permit = match session_permits.acquire_owned().await {
                        Ok(permit) => permit,
                        // The pool is closed: the run was cancelled while
                        // this task was waiting for admission.
                        Err(_) => return,
                    };

                    self.run_test(test, &this_resp_tx).await;

                    // The permit outlives the session: it is released only
                    // after run_test has quit the session.
                    drop(permit);
                };
                scope.spawn_cancellable(fut, || ());
            }
        });

        for result in results {
            if let Err(join_error) = result {
                warn!("a test task failed to execute: {join_error}");
            }
        }

        dispatcher_cx.convert_unfinished();
        dispatcher_cx.run_finished();
        dispatcher_cx.into_report()
    }

    /// Runs one test to its outcome, which is sent to the dispatcher.
    ///
    /// For skipped tests this produces the outcome directly; otherwise it
    /// wires up the session, recorder and assertion service, invokes the
    /// body, and tears everything down on every exit path.
    async fn run_test(&self, test: TestCase, resp_tx: &UnboundedSender<InternalTestEvent>) {
        if test.is_skip() {
            let _ = resp_tx.send(InternalTestEvent::Skipped {
                outcome: TestOutcome {
                    id: test.id().clone(),
                    status: TestStatus::Skipped,
                    start_time: Local::now(),
                    duration: Duration::ZERO,
                    error: None,
                    actions: Vec::new(),
                },
            });
            return;
        }

        let _ = resp_tx.send(InternalTestEvent::Started {
            id: test.id().clone(),
        });
        info!("🔄 starting test: {}", test.id());

        let stopwatch = crate::time::stopwatch();
        let recorder = TimingRecorder::new();

        let result = self.run_test_inner(&test, &recorder).await;
        let snapshot = stopwatch.snapshot();

        let outcome = match result {
            Ok(()) => TestOutcome {
                id: test.id().clone(),
                status: TestStatus::Passed,
                start_time: snapshot.start_time,
                duration: snapshot.duration,
                error: None,
                actions: recorder.actions(),
            },
            Err(message) => {
                let mut actions = recorder.actions();
                // Rewrite the last recorded action into the failure pivot:
                // an apparently-successful trailing action is what makes a
                // timeline misleading. Earlier actions stay untouched.
                if let Some(last) = actions.pop() {
                    let last = if last.success {
                        last.into_failure_pivot(format!("Test failed with error: {message}"))
                    } else {
                        last
                    };
                    actions.push(last);
                }
                TestOutcome {
                    id: test.id().clone(),
                    status: TestStatus::Failed,
                    start_time: snapshot.start_time,
                    duration: snapshot.duration,
                    error: Some(message),
                    actions,
                }
            }
        };

        let _ = resp_tx.send(InternalTestEvent::Finished { outcome });
    }

    async fn run_test_inner(
        &self,
        test: &TestCase,
        recorder: &TimingRecorder,
    ) -> Result<(), String> {
        let raw = self
            .provider
            .create_session(&self.browser_config)
            .await
            .map_err(|err| display_chain(&err))?;

        let mut session = InstrumentedSession::new(raw, recorder.clone(), self.wait_timeout);
        if let Some(poll_interval) = self.poll_interval {
            session = session.with_poll_interval(poll_interval);
        }
        let session = Arc::new(session);
        let assertions = Arc::new(Assertions::with_recorder(recorder.clone()));
        let cx = TestContext::new(Arc::clone(&session), assertions);

        let run = test.run_fn();
        let result = AssertUnwindSafe(run(cx)).catch_unwind().await;

        // Teardown runs on every path: the session is destroyed exactly
        // once whether the body returned, failed or panicked.
        if let Err(quit_error) = session.quit().await {
            warn!(test = %test.id(), "failed to quit session: {quit_error}");
        }

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(failure)) => Err(failure.to_string()),
            Err(panic) => Err(panic_message(panic)),
        }
    }
}

fn display_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(err) = source {
        message.push_str(": ");
        message.push_str(&err.to_string());
        source = err.source();
    }
    message
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        format!("test panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("test panicked: {message}")
    } else {
        "test panicked".to_owned()
    }
}
