// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! External report sinks.

use crate::errors::SinkError;
use camino::Utf8PathBuf;
use gantry_metadata::TestRunSummary;
use tracing::info;

/// A destination for the machine-readable run summary.
///
/// Sinks are invoked after both lanes have joined; a sink error is isolated
/// and never aborts the run or other sinks.
pub trait ReportSink: Send + Sync {
    /// A short name used in log messages.
    fn name(&self) -> &str;

    /// Delivers the summary.
    fn publish(&self, summary: &TestRunSummary) -> Result<(), SinkError>;
}

/// Writes the run summary as JSON to a file.
pub struct JsonReportSink {
    path: Utf8PathBuf,
}

impl JsonReportSink {
    const DEFAULT_OUTPUT_FILE: &str = "test-results.json";

    /// Creates a JSON sink writing to `path`, or to `test-results.json` if
    /// no path is given.
    pub fn new(path: Option<Utf8PathBuf>) -> Self {
        Self {
            path: path.unwrap_or_else(|| Self::DEFAULT_OUTPUT_FILE.into()),
        }
    }
}

impl ReportSink for JsonReportSink {
    fn name(&self) -> &str {
        "json"
    }

    fn publish(&self, summary: &TestRunSummary) -> Result<(), SinkError> {
        let json = serde_json::to_string(summary)?;
        std::fs::write(&self.path, json).map_err(|source| SinkError::Write {
            path: self.path.clone(),
            source,
        })?;
        info!("JSON report generated successfully: {}", self.path);
        Ok(())
    }
}
