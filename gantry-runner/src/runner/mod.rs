// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The execution scheduler.
//!
//! This module contains the main engine for running tests: two lanes
//! (bounded-parallel and strictly-sequential), a permit pool rationing
//! browser sessions, per-task instrumentation wiring and teardown, and the
//! dispatcher that turns per-task events into the final run report.

mod dispatcher;
mod imp;

pub use imp::*;
