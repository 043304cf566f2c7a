// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered run configuration.
//!
//! Configuration is assembled from three layers, later layers winning:
//! built-in defaults, an optional `gantry.toml` in the working directory,
//! and `GANTRY_*` environment variables (`__` separates nested keys, so
//! `GANTRY_EXECUTION__THREAD_COUNT=2` overrides `execution.thread_count`).

use crate::errors::{ConfigLoadError, SessionCountParseError};
use camino::Utf8PathBuf;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::{cmp::Ordering, fmt, str::FromStr, time::Duration};
use tracing::warn;

/// The complete run configuration consumed by the engine.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct GantryConfig {
    /// Browser selection and startup options.
    pub browser: BrowserSettings,
    /// Scheduling and wait bounds.
    pub execution: ExecutionSettings,
    /// Logging verbosity.
    pub logging: LoggingSettings,
    /// Report sink toggles.
    pub report: ReportSettings,
    /// Browser window sizing.
    pub viewport: ViewportSettings,
}

impl GantryConfig {
    /// Loads configuration from `gantry.toml` (if present) and the
    /// environment, on top of the built-in defaults.
    pub fn load() -> Result<Self, ConfigLoadError> {
        Self::from_builder(
            Config::builder().add_source(File::with_name("gantry").required(false)),
        )
    }

    /// Loads configuration from an inline TOML string on top of the
    /// defaults. Primarily useful for tests and embedders.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigLoadError> {
        Self::from_builder(
            Config::builder().add_source(File::from_str(toml, FileFormat::Toml)),
        )
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigLoadError> {
        builder
            .add_source(
                Environment::with_prefix("GANTRY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(Config::try_deserialize)
            .map_err(ConfigLoadError::new)
    }
}

/// Browser selection and startup options.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Browser kind requested from the session provider.
    pub kind: String,
    /// Whether to start the browser headless.
    pub headless: bool,
    /// Requested browser version.
    pub version: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            kind: "chrome".to_owned(),
            headless: false,
            version: "latest".to_owned(),
        }
    }
}

/// Scheduling and wait bounds.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ExecutionSettings {
    /// Size of the parallel lane's session permit pool.
    #[serde(alias = "thread-count")]
    pub thread_count: SessionCount,
    /// Element-wait and navigation timeout, in seconds.
    pub timeout: u64,
}

impl ExecutionSettings {
    /// The element-wait and navigation timeout.
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            thread_count: SessionCount::Auto,
            timeout: 30,
        }
    }
}

/// Logging verbosity.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive handed to the subscriber, e.g. `"info"` or
    /// `"gantry_runner=debug"`.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
        }
    }
}

/// Report sink toggles.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Whether to register the JSON report sink.
    pub json: bool,
    /// Destination for the JSON report; defaults to `test-results.json`.
    #[serde(alias = "json-path")]
    pub json_path: Option<Utf8PathBuf>,
}

/// Browser window sizing.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ViewportSettings {
    /// Named viewport size, e.g. `"desktop.medium"` or `"mobile.small"`.
    pub name: String,
    /// Custom width override; takes effect together with `height`.
    pub width: Option<u32>,
    /// Custom height override; takes effect together with `width`.
    pub height: Option<u32>,
}

impl Default for ViewportSettings {
    fn default() -> Self {
        Self {
            name: "desktop.medium".to_owned(),
            width: None,
            height: None,
        }
    }
}

/// Type for the `execution.thread_count` config key: the number of browser
/// sessions the parallel lane may hold open at once.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionCount {
    /// A fixed permit-pool size.
    Count(usize),

    /// Half the available hardware parallelism, minimum one.
    Auto,
}

impl SessionCount {
    /// Gets the actual permit-pool size computed at runtime.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(count) => count,
            Self::Auto => (get_num_cpus() / 2).max(1),
        }
    }
}

impl Default for SessionCount {
    fn default() -> Self {
        Self::Auto
    }
}

impl FromStr for SessionCount {
    type Err = SessionCountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" {
            return Ok(Self::Auto);
        }

        match s.parse::<isize>() {
            Err(e) => Err(SessionCountParseError::new(format!(
                "Error: {e} parsing {s}"
            ))),
            Ok(0) => Err(SessionCountParseError::new("session count may not be 0")),
            Ok(n) if n < 0 => Ok(SessionCount::Count(
                (get_num_cpus() as isize + n).max(1) as usize,
            )),
            Ok(n) => Ok(SessionCount::Count(n as usize)),
        }
    }
}

impl fmt::Display for SessionCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(count) => write!(f, "{count}"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl<'de> Deserialize<'de> for SessionCount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = SessionCount;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an integer or the string \"auto\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "auto" {
                    Ok(SessionCount::Auto)
                } else {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Str(v),
                        &self,
                    ))
                }
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v.cmp(&0) {
                    Ordering::Greater => Ok(SessionCount::Count(v as usize)),
                    Ordering::Less => Ok(SessionCount::Count(
                        (get_num_cpus() as i64 + v).max(1) as usize,
                    )),
                    Ordering::Equal => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Signed(v),
                        &self,
                    )),
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == 0 {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Unsigned(v),
                        &self,
                    ))
                } else {
                    Ok(SessionCount::Count(v as usize))
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}

pub(crate) fn get_num_cpus() -> usize {
    match std::thread::available_parallelism() {
        Ok(count) => count.into(),
        Err(err) => {
            warn!("unable to determine available parallelism, assuming 1: {err}");
            1
        }
    }
}
