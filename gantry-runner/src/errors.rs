// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by gantry.

use std::time::Duration;
use thiserror::Error;

/// An error that occurred while assembling the layered run configuration.
#[derive(Debug, Error)]
#[error("failed to load gantry configuration")]
pub struct ConfigLoadError {
    #[source]
    err: config::ConfigError,
}

impl ConfigLoadError {
    pub(crate) fn new(err: config::ConfigError) -> Self {
        Self { err }
    }
}

/// Error returned while parsing a
/// [`SessionCount`](crate::config::SessionCount) value from a string.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct SessionCountParseError {
    message: String,
}

impl SessionCountParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error returned while parsing a
/// [`BrowserKind`](crate::driver::BrowserKind) from a string.
#[derive(Clone, Debug, Error)]
#[error("unsupported browser specified: {name}")]
pub struct UnsupportedBrowserError {
    name: String,
}

impl UnsupportedBrowserError {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The browser name that failed to parse.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// An error that occurred while creating a browser session.
///
/// Session creation failures are scoped to the requesting test: that test is
/// recorded as failed and the run continues.
#[derive(Debug, Error)]
pub enum SessionCreateError {
    /// The configured browser kind is not supported by the provider.
    #[error(transparent)]
    UnsupportedBrowser(#[from] UnsupportedBrowserError),

    /// The provider failed to start a session.
    #[error("failed to start {browser} session")]
    Startup {
        /// The browser kind that was requested.
        browser: String,
        /// The underlying driver error.
        #[source]
        source: DriverError,
    },
}

/// An error produced by a [`Session`](crate::driver::Session) or
/// [`Element`](crate::driver::Element) operation.
#[derive(Clone, Debug, Error)]
pub enum DriverError {
    /// No element currently matches the locator.
    ///
    /// Transient: the instrumented wrapper keeps polling through this.
    #[error("no element currently matches `{locator}`")]
    NoSuchElement {
        /// The locator that did not match.
        locator: String,
    },

    /// An element reference went stale (the DOM node was replaced).
    ///
    /// Transient: the instrumented wrapper keeps polling through this.
    #[error("element reference for `{locator}` went stale")]
    StaleElement {
        /// The locator the stale reference was resolved from.
        locator: String,
    },

    /// A bounded wait elapsed without the locator ever matching.
    #[error("no element matching `{locator}` found within {timeout:?}")]
    ElementNotFound {
        /// The locator that never matched.
        locator: String,
        /// The wait bound that elapsed.
        timeout: Duration,
    },

    /// The underlying driver rejected or failed a command.
    #[error("driver command failed: {message}")]
    Command {
        /// Driver-reported failure detail.
        message: String,
    },
}

impl DriverError {
    /// Creates a [`DriverError::Command`] from a message.
    pub fn command(message: impl Into<String>) -> Self {
        DriverError::Command {
            message: message.into(),
        }
    }

    /// Returns true if polling should continue past this error.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(
            self,
            DriverError::NoSuchElement { .. } | DriverError::StaleElement { .. }
        )
    }
}

/// A failed assertion: the terminal error of the owning test.
#[derive(Clone, Debug, Error)]
#[error("assertion failed: {description}: expected {expected}, {mismatch}")]
pub struct AssertionFailure {
    /// The caller-supplied assertion description.
    pub description: String,
    /// What the matcher expected.
    pub expected: String,
    /// How the actual value fell short.
    pub mismatch: String,
}

/// Any failure that terminates a test body.
///
/// Both driver errors and assertion failures convert into this via `?`
/// inside test functions.
#[derive(Debug, Error)]
pub enum TestFailure {
    /// An assertion did not hold.
    #[error(transparent)]
    Assertion(#[from] AssertionFailure),

    /// A session or element operation failed, including wait timeouts.
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// A free-form failure raised by the test itself.
    #[error("{0}")]
    Message(String),
}

impl TestFailure {
    /// Creates a free-form test failure.
    pub fn message(message: impl Into<String>) -> Self {
        TestFailure::Message(message.into())
    }
}

/// A test registration that could not be admitted into the run.
///
/// Malformed units are reported and excluded from both lanes; they never
/// abort the scan.
#[derive(Clone, Debug, Error)]
#[error("malformed test `{suite}.{name}`: {reason}")]
pub struct MalformedTestError {
    /// The suite name as registered (possibly empty).
    pub suite: String,
    /// The test name as registered (possibly empty).
    pub name: String,
    /// Why the registration was rejected.
    pub reason: MalformedTestReason,
}

/// The reason a test registration was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MalformedTestReason {
    /// The suite or test name was empty.
    EmptyName,
    /// Another test with the same `(suite, name)` identity was already
    /// registered.
    DuplicateIdentity,
}

impl std::fmt::Display for MalformedTestReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedTestReason::EmptyName => write!(f, "suite and test names must be non-empty"),
            MalformedTestReason::DuplicateIdentity => {
                write!(f, "a test with this identity is already registered")
            }
        }
    }
}

/// An error that occurred while building a
/// [`TestRunner`](crate::runner::TestRunner).
#[derive(Debug, Error)]
pub enum RunnerBuildError {
    /// An error occurred while creating the tokio runtime.
    #[error("error creating tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// An error occurred while setting up the signal handler.
    #[error(transparent)]
    SignalHandlerSetup(#[from] SignalHandlerSetupError),
}

/// An error that occurred while setting up signal handling.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] pub(crate) std::io::Error);

/// An error produced by a report sink.
///
/// Sink errors are isolated per sink: they are logged and never block
/// delivery to other sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Serializing the run summary failed.
    #[error("failed to serialize run summary")]
    Serialize(#[from] serde_json::Error),

    /// Writing the report to its destination failed.
    #[error("failed to write report to `{path}`")]
    Write {
        /// The destination that could not be written.
        path: camino::Utf8PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}
