// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Report the results of a test run in human and machine-readable formats.
//!
//! The [`ReporterService`] consumes the complete set of outcomes once both
//! lanes have joined: it logs the human summary (including the annotated
//! action timeline of every failed test) and forwards the machine-readable
//! [`TestRunSummary`] to each registered [`ReportSink`]. A sink failure is
//! logged and isolated; it never blocks delivery to other sinks.

mod events;
mod sinks;

pub use events::*;
pub use sinks::*;

use crate::{config::GantryConfig, runner::RunReport};
use gantry_metadata::{ActionRecord, SummaryStatus, TestResultSummary, TestRunSummary};
use tracing::{error, info, warn};

/// Converts a run's outcomes into the machine-readable summary.
pub fn run_summary(report: &RunReport) -> TestRunSummary {
    let test_results = report
        .outcomes
        .iter()
        .map(|outcome| TestResultSummary {
            test_name: outcome.id.to_string(),
            status: match outcome.status {
                TestStatus::Passed => SummaryStatus::Passed,
                TestStatus::Failed => SummaryStatus::Failed,
                TestStatus::Skipped => SummaryStatus::Skipped,
            },
            start_timestamp: outcome.start_millis(),
            end_timestamp: outcome.end_millis(),
            error: outcome.error.clone(),
            test_actions: outcome
                .actions
                .iter()
                .map(|action| ActionRecord {
                    action: action.name.clone(),
                    target: action.target.clone(),
                    start_timestamp: action.start_ms,
                    end_timestamp: action.end_ms,
                    success: action.success,
                    detail_msg: action.detail.clone(),
                })
                .collect(),
        })
        .collect();
    TestRunSummary::new(test_results)
}

/// Aggregates outcomes into the final report and fans it out to sinks.
#[derive(Default)]
pub struct ReporterService {
    sinks: Vec<Box<dyn ReportSink>>,
}

impl ReporterService {
    /// Creates a reporter with no sinks registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a reporter with the sinks enabled in the configuration.
    pub fn from_config(config: &GantryConfig) -> Self {
        let mut service = Self::new();
        if config.report.json {
            service.register(Box::new(JsonReportSink::new(
                config.report.json_path.clone(),
            )));
        }
        service
    }

    /// Registers an additional sink.
    pub fn register(&mut self, sink: Box<dyn ReportSink>) {
        self.sinks.push(sink);
    }

    /// Logs the human summary and forwards the structured summary to every
    /// registered sink.
    pub fn process(&self, report: &RunReport) {
        if report.outcomes.is_empty() {
            warn!("no test results to process for reporting");
            return;
        }

        self.log_outcomes(report);

        if self.sinks.is_empty() {
            return;
        }

        let summary = run_summary(report);
        for sink in &self.sinks {
            if let Err(err) = sink.publish(&summary) {
                error!(sink = sink.name(), "failed to publish report: {err}");
            }
        }
    }

    fn log_outcomes(&self, report: &RunReport) {
        for outcome in &report.outcomes {
            match outcome.status {
                TestStatus::Passed => {
                    info!("✅ PASSED: {}", outcome.id);
                    for action in &outcome.actions {
                        info!("{action}");
                    }
                }
                TestStatus::Failed => {
                    error!(
                        "❌ FAILED: {} - Reason: {}",
                        outcome.id,
                        outcome.error.as_deref().unwrap_or("unknown")
                    );
                    for action in &outcome.actions {
                        error!("{action}");
                    }
                }
                TestStatus::Skipped => {
                    info!("⏭️ SKIPPED: {}", outcome.id);
                }
            }
        }

        let stats = report.run_stats;
        info!(
            "--- Summary --- Passed: {}, Failed: {}, Skipped: {}",
            stats.passed, stats.failed, stats.skipped
        );
        if let Some(reason) = report.cancel_reason {
            warn!(
                "run cancelled ({}): {} of {} tests produced outcomes",
                reason.to_static_str(),
                stats.finished_count,
                stats.initial_run_count
            );
        }
    }
}
