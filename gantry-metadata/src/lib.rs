// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Machine-readable report formats for gantry test runs.
//!
//! The types in this crate form the wire format written by gantry's report
//! sinks and consumed by external tooling (dashboards, CI annotators). They
//! are plain serde structures with no behavior beyond conversion helpers, so
//! downstream consumers can depend on this crate without pulling in the
//! runner itself.
//!
//! Field names are camelCase on the wire (`testName`, `startTimestamp`),
//! and timestamps are milliseconds since the Unix epoch.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// The result of one full test run: one entry per scheduled test that
/// produced an outcome.
///
/// Ordering of `test_results` is not significant; per-test action ordering
/// is (actions are sorted by recorded start time).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestRunSummary {
    /// One entry per completed test.
    pub test_results: Vec<TestResultSummary>,
}

impl TestRunSummary {
    /// Creates a new summary from a set of per-test results.
    pub fn new(test_results: Vec<TestResultSummary>) -> Self {
        Self { test_results }
    }

    /// Returns the number of results with the given status.
    pub fn count(&self, status: SummaryStatus) -> usize {
        self.test_results
            .iter()
            .filter(|result| result.status == status)
            .count()
    }
}

/// The reported outcome of a single test.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultSummary {
    /// Fully qualified test name (`Suite.test_name`).
    pub test_name: String,

    /// Terminal status of the test.
    pub status: SummaryStatus,

    /// Wall-clock start of the test, in milliseconds since the Unix epoch.
    pub start_timestamp: i64,

    /// Wall-clock end of the test, in milliseconds since the Unix epoch.
    pub end_timestamp: i64,

    /// The failure message, present only for failed tests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The instrumented actions recorded while the test ran, in recorded
    /// order.
    pub test_actions: Vec<ActionRecord>,
}

impl TestResultSummary {
    /// Returns the test duration in milliseconds.
    pub fn duration_millis(&self) -> i64 {
        self.end_timestamp - self.start_timestamp
    }
}

/// One instrumented operation within a test: an element wait, a click, a
/// navigation, an assertion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRecord {
    /// Operation name, e.g. `"Wait for Element"`. A failed test's final
    /// action may carry the `" (last action before failure)"` suffix.
    pub action: String,

    /// The target the operation acted on (locator, URL, assertion
    /// description).
    pub target: String,

    /// Operation start, milliseconds since the Unix epoch.
    pub start_timestamp: i64,

    /// Operation end, milliseconds since the Unix epoch.
    pub end_timestamp: i64,

    /// Whether the operation succeeded.
    pub success: bool,

    /// Extra detail: timeout messages, assertion mismatches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail_msg: Option<String>,
}

/// Terminal status of a test, as serialized into reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SummaryStatus {
    /// The test ran to completion without a failure.
    Passed,

    /// The test failed: an assertion mismatch, a wait timeout, a driver
    /// error, or a panic in the test body.
    Failed,

    /// The test carried the skip flag and was never started.
    Skipped,
}

impl fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryStatus::Passed => write!(f, "PASSED"),
            SummaryStatus::Failed => write!(f, "FAILED"),
            SummaryStatus::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Error returned while parsing a [`SummaryStatus`] from a string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SummaryStatusParseError {
    input: String,
}

impl fmt::Display for SummaryStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unrecognized test status: {} (known values: PASSED, FAILED, SKIPPED)",
            self.input
        )
    }
}

impl std::error::Error for SummaryStatusParseError {}

impl FromStr for SummaryStatus {
    type Err = SummaryStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASSED" => Ok(SummaryStatus::Passed),
            "FAILED" => Ok(SummaryStatus::Failed),
            "SKIPPED" => Ok(SummaryStatus::Skipped),
            other => Err(SummaryStatusParseError {
                input: other.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn sample_run() -> TestRunSummary {
        TestRunSummary::new(vec![
            TestResultSummary {
                test_name: "LoginSuite.dashboard_title".to_owned(),
                status: SummaryStatus::Passed,
                start_timestamp: 1_700_000_000_000,
                end_timestamp: 1_700_000_002_500,
                error: None,
                test_actions: vec![ActionRecord {
                    action: "Wait for Element".to_owned(),
                    target: "css `#dashboard`".to_owned(),
                    start_timestamp: 1_700_000_000_100,
                    end_timestamp: 1_700_000_000_700,
                    success: true,
                    detail_msg: None,
                }],
            },
            TestResultSummary {
                test_name: "LoginSuite.bad_password".to_owned(),
                status: SummaryStatus::Failed,
                start_timestamp: 1_700_000_003_000,
                end_timestamp: 1_700_000_005_250,
                error: Some("assertion failed: title mismatch".to_owned()),
                test_actions: vec![
                    ActionRecord {
                        action: "Navigate to URL".to_owned(),
                        target: "https://example.test/login".to_owned(),
                        start_timestamp: 1_700_000_003_100,
                        end_timestamp: 1_700_000_003_400,
                        success: true,
                        detail_msg: None,
                    },
                    ActionRecord {
                        action: "Assertion (last action before failure)".to_owned(),
                        target: "title equals Dashboard".to_owned(),
                        start_timestamp: 1_700_000_005_000,
                        end_timestamp: 1_700_000_005_200,
                        success: false,
                        detail_msg: Some("expected \"Dashboard\", was \"Dashboad\"".to_owned()),
                    },
                ],
            },
            TestResultSummary {
                test_name: "AdminSuite.audit_log".to_owned(),
                status: SummaryStatus::Skipped,
                start_timestamp: 1_700_000_006_000,
                end_timestamp: 1_700_000_006_000,
                error: None,
                test_actions: vec![],
            },
        ])
    }

    #[test]
    fn round_trip_preserves_results_and_action_order() {
        let run = sample_run();
        let json = serde_json::to_string(&run).expect("summary serializes");
        let decoded: TestRunSummary = serde_json::from_str(&json).expect("summary deserializes");

        assert_eq!(decoded.test_results.len(), run.test_results.len());
        assert_eq!(decoded, run);

        // Action ordering within a test must survive the round trip.
        let failed = &decoded.test_results[1];
        assert_eq!(failed.test_actions[0].action, "Navigate to URL");
        assert!(
            failed.test_actions[1]
                .action
                .ends_with("(last action before failure)")
        );
    }

    #[test]
    fn wire_format_uses_camel_case_and_screaming_status() {
        let json = serde_json::to_string(&sample_run()).unwrap();
        assert!(json.contains("\"testResults\""));
        assert!(json.contains("\"testName\""));
        assert!(json.contains("\"startTimestamp\""));
        assert!(json.contains("\"detailMsg\""));
        assert!(json.contains("\"PASSED\""));
        assert!(json.contains("\"SKIPPED\""));
        // Absent optional fields are omitted entirely.
        assert!(!json.contains("\"error\":null"));
    }

    #[test]
    fn status_counts() {
        let run = sample_run();
        assert_eq!(run.count(SummaryStatus::Passed), 1);
        assert_eq!(run.count(SummaryStatus::Failed), 1);
        assert_eq!(run.count(SummaryStatus::Skipped), 1);
    }

    #[test_case("PASSED", Some(SummaryStatus::Passed); "passed")]
    #[test_case("FAILED", Some(SummaryStatus::Failed); "failed")]
    #[test_case("SKIPPED", Some(SummaryStatus::Skipped); "skipped")]
    #[test_case("passed", None; "lowercase rejected")]
    #[test_case("UNKNOWN", None; "unknown rejected")]
    fn status_from_str(input: &str, expected: Option<SummaryStatus>) {
        match expected {
            Some(status) => {
                assert_eq!(input.parse::<SummaryStatus>().unwrap(), status);
                assert_eq!(status.to_string(), input);
            }
            None => assert!(input.parse::<SummaryStatus>().is_err()),
        }
    }
}
