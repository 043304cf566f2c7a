// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The dispatcher: funnels per-task events to the run callback and
//! accumulates outcomes and statistics.
//!
//! Aggregation is a barrier: the dispatcher only completes once every task
//! sender has dropped, so the report never misses a late outcome -- and
//! after a cancellation, outcomes from tasks that were already in flight
//! are discarded rather than reported (their cleanup still runs in-task).

use super::RunReport;
use crate::{
    list::{TestId, TestList},
    reporter::{CancelReason, RunStats, TestEvent, TestEventKind, TestOutcome, TestStatus},
    signal::{ShutdownEvent, SignalHandler},
    time::StopwatchStart,
};
use chrono::Local;
use std::{
    collections::HashSet,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tokio::sync::{Semaphore, mpsc::UnboundedReceiver};
use tracing::{debug, warn};

/// Events sent from individual test tasks to the dispatcher.
#[derive(Clone, Debug)]
pub(super) enum InternalTestEvent {
    Started { id: TestId },
    Skipped { outcome: TestOutcome },
    Finished { outcome: TestOutcome },
}

pub(super) struct DispatcherContext<F> {
    callback: F,
    stopwatch: StopwatchStart,
    run_stats: RunStats,
    outcomes: Vec<TestOutcome>,
    in_flight: HashSet<TestId>,
    cancel_reason: Option<CancelReason>,
    callback_failed: bool,
}

impl<F> DispatcherContext<F>
where
    F: FnMut(TestEvent) -> bool + Send,
{
    pub(super) fn new(callback: F, initial_run_count: usize) -> Self {
        Self {
            callback,
            stopwatch: crate::time::stopwatch(),
            run_stats: RunStats {
                initial_run_count,
                ..RunStats::default()
            },
            outcomes: Vec::with_capacity(initial_run_count),
            in_flight: HashSet::new(),
            cancel_reason: None,
            callback_failed: false,
        }
    }

    pub(super) fn run_started(&mut self, test_list: &TestList) {
        self.emit(TestEventKind::RunStarted {
            run_count: test_list.run_count(),
            parallel_count: test_list.parallel_tests().len(),
            serial_count: test_list.serial_tests().len(),
            rejected_count: test_list.rejected().len(),
        });
    }

    /// Runs the dispatcher to completion: until every task-side sender has
    /// dropped.
    pub(super) async fn run(
        &mut self,
        mut resp_rx: UnboundedReceiver<InternalTestEvent>,
        signal_handler: &mut SignalHandler,
        cancelled: &AtomicBool,
        session_permits: &Semaphore,
    ) {
        loop {
            tokio::select! {
                internal = resp_rx.recv() => {
                    match internal {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
                Some(event) = signal_handler.recv(), if self.cancel_reason.is_none() => {
                    let reason = match event {
                        ShutdownEvent::Interrupt => CancelReason::Interrupt,
                        #[cfg(unix)]
                        ShutdownEvent::Term | ShutdownEvent::Hangup => CancelReason::Signal,
                    };
                    self.begin_cancel(reason, cancelled, session_permits);
                }
            }

            if self.callback_failed && self.cancel_reason.is_none() {
                self.begin_cancel(CancelReason::ReportError, cancelled, session_permits);
            }
        }
    }

    fn handle_event(&mut self, event: InternalTestEvent) {
        match event {
            InternalTestEvent::Started { id } => {
                if self.cancel_reason.is_some() {
                    return;
                }
                self.in_flight.insert(id.clone());
                self.emit(TestEventKind::TestStarted {
                    id,
                    running: self.in_flight.len(),
                });
            }
            InternalTestEvent::Skipped { outcome } => {
                if self.cancel_reason.is_some() {
                    debug!(test = %outcome.id, "run cancelled, discarding skip outcome");
                    return;
                }
                self.run_stats.on_outcome(outcome.status);
                self.emit(TestEventKind::TestSkipped {
                    id: outcome.id.clone(),
                });
                self.outcomes.push(outcome);
            }
            InternalTestEvent::Finished { outcome } => {
                self.in_flight.remove(&outcome.id);
                if self.cancel_reason.is_some() {
                    debug!(test = %outcome.id, "run cancelled, discarding outcome");
                    return;
                }
                self.run_stats.on_outcome(outcome.status);
                self.emit(TestEventKind::TestFinished {
                    outcome: outcome.clone(),
                    current_stats: self.run_stats,
                    running: self.in_flight.len(),
                });
                self.outcomes.push(outcome);
            }
        }
    }

    fn begin_cancel(
        &mut self,
        reason: CancelReason,
        cancelled: &AtomicBool,
        session_permits: &Semaphore,
    ) {
        warn!("cancelling test run: {}", reason.to_static_str());
        self.cancel_reason = Some(reason);
        cancelled.store(true, Ordering::Release);
        // Closing the pool wakes every task blocked on permit acquisition;
        // those tasks return without producing an outcome.
        session_permits.close();
        self.emit(TestEventKind::RunBeginCancel {
            running: self.in_flight.len(),
            reason,
        });
    }

    /// Converts tests whose task died without reporting an outcome into
    /// failed outcomes, so aggregation never crashes on an
    /// execution-framework error.
    pub(super) fn convert_unfinished(&mut self) {
        if self.cancel_reason.is_some() {
            return;
        }
        let mut stranded: Vec<TestId> = self.in_flight.drain().collect();
        stranded.sort();
        for id in stranded {
            warn!(test = %id, "❌ test task failed to execute correctly");
            self.run_stats.on_outcome(TestStatus::Failed);
            self.outcomes.push(TestOutcome {
                id,
                status: TestStatus::Failed,
                start_time: Local::now(),
                duration: Duration::ZERO,
                error: Some("test task failed to execute correctly".to_owned()),
                actions: Vec::new(),
            });
        }
    }

    pub(super) fn run_finished(&mut self) {
        let snapshot = self.stopwatch.snapshot();
        self.emit(TestEventKind::RunFinished {
            start_time: snapshot.start_time.fixed_offset(),
            elapsed: snapshot.duration,
            run_stats: self.run_stats,
        });
    }

    pub(super) fn into_report(self) -> RunReport {
        RunReport {
            run_stats: self.run_stats,
            outcomes: self.outcomes,
            cancel_reason: self.cancel_reason,
        }
    }

    fn emit(&mut self, kind: TestEventKind) {
        let event = TestEvent {
            timestamp: Local::now().fixed_offset(),
            elapsed: self.stopwatch.snapshot().duration,
            kind,
        };
        if !(self.callback)(event) {
            self.callback_failed = true;
        }
    }
}
