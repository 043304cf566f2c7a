// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Matcher-style assertions with observable before/success/failure events.
//!
//! The assertion service is deliberately decoupled from timing: listeners
//! observe assertion events, and the [`TimingRecorder`] integration is just
//! one such listener. Each test receives its own [`Assertions`] handle
//! through its context; there is no ambient thread-bound state.

use crate::{
    errors::AssertionFailure,
    timing::{TimingRecorder, ops},
};
use std::fmt::Debug;

/// A predicate over an actual value, with self-description for reporting.
pub trait Matcher<T: ?Sized> {
    /// Evaluates the predicate.
    fn matches(&self, actual: &T) -> bool;

    /// Describes the expectation, e.g. `equal to "Dashboard"`.
    fn describe(&self) -> String;

    /// Describes how the actual value fell short, e.g. `was "Dashboad"`.
    fn describe_mismatch(&self, actual: &T) -> String;
}

/// Matches values equal to the expected value.
pub struct EqMatcher<'e, T: ?Sized> {
    expected: &'e T,
}

impl<T: PartialEq + Debug + ?Sized> Matcher<T> for EqMatcher<'_, T> {
    fn matches(&self, actual: &T) -> bool {
        actual == self.expected
    }

    fn describe(&self) -> String {
        format!("equal to {:?}", self.expected)
    }

    fn describe_mismatch(&self, actual: &T) -> String {
        format!("was {actual:?}")
    }
}

/// Matches values equal to `expected`.
pub fn eq<T: ?Sized>(expected: &T) -> EqMatcher<'_, T> {
    EqMatcher { expected }
}

/// Matches strings containing `needle`.
pub struct ContainsMatcher<'e> {
    needle: &'e str,
}

impl<T: AsRef<str> + Debug + ?Sized> Matcher<T> for ContainsMatcher<'_> {
    fn matches(&self, actual: &T) -> bool {
        actual.as_ref().contains(self.needle)
    }

    fn describe(&self) -> String {
        format!("a string containing {:?}", self.needle)
    }

    fn describe_mismatch(&self, actual: &T) -> String {
        format!("was {actual:?}")
    }
}

/// Matches strings containing `needle`.
pub fn contains(needle: &str) -> ContainsMatcher<'_> {
    ContainsMatcher { needle }
}

/// Observes assertion events.
///
/// `detail` carries the expectation summary on success and the full
/// expected/actual description on failure.
pub trait AssertionListener: Send + Sync {
    /// Called before the predicate is evaluated.
    fn before_assertion(&self, description: &str);

    /// Called after a successful assertion.
    fn on_success(&self, description: &str, detail: &str);

    /// Called after a failed assertion, before the failure propagates.
    fn on_failure(&self, description: &str, detail: &str);
}

/// Bridges assertion events into a test's [`TimingRecorder`].
pub struct RecorderListener {
    recorder: TimingRecorder,
}

impl RecorderListener {
    /// Creates a listener recording into `recorder`.
    pub fn new(recorder: TimingRecorder) -> Self {
        Self { recorder }
    }
}

impl AssertionListener for RecorderListener {
    fn before_assertion(&self, description: &str) {
        self.recorder.start(ops::ASSERTION, description);
    }

    fn on_success(&self, description: &str, detail: &str) {
        self.recorder
            .end(ops::ASSERTION, description, true, Some(detail.to_owned()));
    }

    fn on_failure(&self, description: &str, detail: &str) {
        self.recorder
            .end(ops::ASSERTION, description, false, Some(detail.to_owned()));
    }
}

/// The per-test assertion service.
///
/// Failures are returned as [`AssertionFailure`] values; propagating one
/// out of the test body (via `?`) makes it the test's terminal error.
#[derive(Default)]
pub struct Assertions {
    listeners: Vec<Box<dyn AssertionListener>>,
}

impl Assertions {
    /// Creates an assertion service with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an assertion service wired to a test's timing recorder.
    pub fn with_recorder(recorder: TimingRecorder) -> Self {
        let mut assertions = Self::new();
        assertions.add_listener(Box::new(RecorderListener::new(recorder)));
        assertions
    }

    /// Registers an additional listener.
    pub fn add_listener(&mut self, listener: Box<dyn AssertionListener>) {
        self.listeners.push(listener);
    }

    /// Asserts that `actual` satisfies `matcher`.
    pub fn that<T: Debug + ?Sized>(
        &self,
        actual: &T,
        matcher: impl Matcher<T>,
        description: &str,
    ) -> Result<(), AssertionFailure> {
        for listener in &self.listeners {
            listener.before_assertion(description);
        }

        let expected = matcher.describe();
        if matcher.matches(actual) {
            let detail = format!("Expected: {expected}");
            for listener in &self.listeners {
                listener.on_success(description, &detail);
            }
            Ok(())
        } else {
            let failure = AssertionFailure {
                description: description.to_owned(),
                expected,
                mismatch: matcher.describe_mismatch(actual),
            };
            let detail = format!("Expected: {}, {}", failure.expected, failure.mismatch);
            for listener in &self.listeners {
                listener.on_failure(description, &detail);
            }
            Err(failure)
        }
    }

    /// Asserts that two values are equal.
    pub fn eq<T: PartialEq + Debug + ?Sized>(
        &self,
        actual: &T,
        expected: &T,
        description: &str,
    ) -> Result<(), AssertionFailure> {
        self.that(actual, eq(expected), description)
    }

    /// Asserts that a condition holds.
    pub fn is_true(&self, condition: bool, description: &str) -> Result<(), AssertionFailure> {
        self.that(&condition, eq(&true), description)
    }

    /// Asserts that a condition does not hold.
    pub fn is_false(&self, condition: bool, description: &str) -> Result<(), AssertionFailure> {
        self.that(&condition, eq(&false), description)
    }
}
