// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-test timing ledger.
//!
//! Every test execution owns exactly one [`TimingRecorder`]. Session
//! wrappers, element wrappers and the assertion service all record into it;
//! because no recorder is ever shared across tests, cross-test races are
//! impossible by construction. Within a test the recorder is still safe for
//! concurrent use: in-flight starts are keyed by `(operation, target)` so
//! overlapping waits on different targets don't collide.

use chrono::Utc;
use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

/// Operation names used by the engine's own instrumentation.
pub mod ops {
    /// A bounded wait for a single element.
    pub const WAIT_FOR_ELEMENT: &str = "Wait for Element";
    /// A bounded wait for a non-empty element set.
    pub const WAIT_FOR_ELEMENTS: &str = "Wait for Elements";
    /// A page navigation.
    pub const NAVIGATE: &str = "Navigate to URL";
    /// A window switch.
    pub const SWITCH_WINDOW: &str = "Switch Window";
    /// An element click.
    pub const CLICK: &str = "Click Element";
    /// Keystrokes sent to an element.
    pub const SEND_KEYS: &str = "Send Keys";
    /// An element text read.
    pub const GET_TEXT: &str = "Get Text";
    /// An assertion evaluation.
    pub const ASSERTION: &str = "Assertion";
}

/// The suffix appended to a failed test's final successful action when the
/// engine annotates it as the failure pivot.
pub const LAST_ACTION_SUFFIX: &str = " (last action before failure)";

/// One instrumented operation, immutable once recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Action {
    /// Operation name; failed operations carry a `" (Failed)"` suffix.
    pub name: String,
    /// What the operation acted on (locator, URL, assertion description).
    pub target: String,
    /// Operation start, milliseconds since the Unix epoch.
    pub start_ms: i64,
    /// Operation end, milliseconds since the Unix epoch.
    pub end_ms: i64,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Extra detail: error messages, assertion mismatches.
    pub detail: Option<String>,
}

impl Action {
    /// Returns the operation duration in milliseconds.
    pub fn duration_millis(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// Returns a copy annotated as the last action before the owning test
    /// failed.
    pub(crate) fn into_failure_pivot(self, detail: String) -> Action {
        Action {
            name: format!("{}{LAST_ACTION_SUFFIX}", self.name),
            success: false,
            detail: Some(detail),
            ..self
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "✅" } else { "❌" };
        write!(
            f,
            "  {status} {}: '{}' | {}ms",
            self.name,
            self.target,
            self.duration_millis()
        )?;
        if let Some(detail) = &self.detail {
            write!(f, " | {detail}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecorderInner {
    actions: Mutex<Vec<Action>>,
    in_flight: Mutex<HashMap<(String, String), i64>>,
}

/// Thread-safe start/stop event ledger producing ordered [`Action`]s.
///
/// Cheaply cloneable; all clones share the same ledger.
#[derive(Clone, Debug, Default)]
pub struct TimingRecorder {
    inner: Arc<RecorderInner>,
}

impl TimingRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of an operation against a target.
    ///
    /// A second `start` for the same `(operation, target)` pair before the
    /// first ends overwrites the earlier start.
    pub fn start(&self, operation: &str, target: &str) {
        let mut in_flight = self.inner.in_flight.lock().expect("in-flight lock poisoned");
        in_flight.insert(
            (operation.to_owned(), target.to_owned()),
            Utc::now().timestamp_millis(),
        );
    }

    /// Marks the end of an operation, appending an [`Action`] to the ledger.
    ///
    /// If no matching `start` is in flight this is a no-op: the recorder
    /// never fabricates an action.
    pub fn end(&self, operation: &str, target: &str, success: bool, detail: Option<String>) {
        let start_ms = {
            let mut in_flight = self.inner.in_flight.lock().expect("in-flight lock poisoned");
            in_flight.remove(&(operation.to_owned(), target.to_owned()))
        };

        let Some(start_ms) = start_ms else {
            return;
        };

        let name = if success {
            operation.to_owned()
        } else {
            format!("{operation} (Failed)")
        };
        let action = Action {
            name,
            target: target.to_owned(),
            start_ms,
            end_ms: Utc::now().timestamp_millis(),
            success,
            detail,
        };
        self.inner
            .actions
            .lock()
            .expect("action lock poisoned")
            .push(action);
    }

    /// Returns a snapshot copy of the recorded actions, in recorded order.
    ///
    /// Safe to call while more actions are still being recorded.
    pub fn actions(&self) -> Vec<Action> {
        self.inner
            .actions
            .lock()
            .expect("action lock poisoned")
            .clone()
    }
}
