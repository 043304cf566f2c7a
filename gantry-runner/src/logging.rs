// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Logging initialization for embedders.
//!
//! The engine itself only emits `tracing` events; wiring a subscriber is
//! the host's choice. [`init`] installs a sensible default: a fmt
//! subscriber filtered by the `logging.level` config key, overridable
//! through `RUST_LOG`.

use crate::config::GantryConfig;
use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber using the configured level.
///
/// Does nothing if a global subscriber is already set (e.g. in tests).
pub fn init(config: &GantryConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
