// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Composing wrappers that add bounded waits and timing hooks to a raw
//! session.
//!
//! [`InstrumentedSession`] implements [`Session`] over any inner session,
//! so test bodies only ever see the instrumented interface. Find calls
//! become polling waits; navigation, window switches and element
//! interactions are timed; plain reads pass straight through.

use super::{Element, Locator, Session};
use crate::{
    errors::DriverError,
    timing::{TimingRecorder, ops},
};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

/// The interval at which find waits re-poll the underlying session.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A [`Session`] wrapper bound to one test's [`TimingRecorder`].
pub struct InstrumentedSession {
    inner: Box<dyn Session>,
    recorder: TimingRecorder,
    wait_timeout: Duration,
    poll_interval: Duration,
}

impl InstrumentedSession {
    /// Wraps a raw session, recording into `recorder` and bounding find
    /// waits by `wait_timeout`.
    pub fn new(inner: Box<dyn Session>, recorder: TimingRecorder, wait_timeout: Duration) -> Self {
        Self {
            inner,
            recorder,
            wait_timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Overrides the poll interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn wrap_element(&self, element: Box<dyn Element>) -> Box<dyn Element> {
        Box::new(InstrumentedElement {
            inner: element,
            recorder: self.recorder.clone(),
        })
    }
}

#[async_trait]
impl Session for InstrumentedSession {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        debug!(url, "navigating");
        self.recorder.start(ops::NAVIGATE, url);
        match self.inner.goto(url).await {
            Ok(()) => {
                self.recorder.end(ops::NAVIGATE, url, true, None);
                Ok(())
            }
            Err(err) => {
                self.recorder
                    .end(ops::NAVIGATE, url, false, Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn find(&self, locator: &Locator) -> Result<Box<dyn Element>, DriverError> {
        let target = locator.to_string();
        debug!(%locator, timeout = ?self.wait_timeout, "waiting for element");
        self.recorder.start(ops::WAIT_FOR_ELEMENT, &target);

        let deadline = Instant::now() + self.wait_timeout;
        loop {
            match self.inner.find(locator).await {
                Ok(element) => {
                    self.recorder.end(ops::WAIT_FOR_ELEMENT, &target, true, None);
                    return Ok(self.wrap_element(element));
                }
                Err(err) if err.is_transient() => {
                    trace!(%locator, "poll miss: {err}");
                }
                Err(err) => {
                    self.recorder
                        .end(ops::WAIT_FOR_ELEMENT, &target, false, Some(err.to_string()));
                    return Err(err);
                }
            }

            if Instant::now() >= deadline {
                let err = DriverError::ElementNotFound {
                    locator: target.clone(),
                    timeout: self.wait_timeout,
                };
                self.recorder
                    .end(ops::WAIT_FOR_ELEMENT, &target, false, Some(err.to_string()));
                return Err(err);
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Box<dyn Element>>, DriverError> {
        let target = locator.to_string();
        self.recorder.start(ops::WAIT_FOR_ELEMENTS, &target);

        let deadline = Instant::now() + self.wait_timeout;
        loop {
            match self.inner.find_all(locator).await {
                Ok(elements) if !elements.is_empty() => {
                    self.recorder
                        .end(ops::WAIT_FOR_ELEMENTS, &target, true, None);
                    return Ok(elements
                        .into_iter()
                        .map(|element| self.wrap_element(element))
                        .collect());
                }
                Ok(_) => {}
                Err(err) if err.is_transient() => {}
                Err(err) => {
                    self.recorder.end(
                        ops::WAIT_FOR_ELEMENTS,
                        &target,
                        false,
                        Some(err.to_string()),
                    );
                    return Err(err);
                }
            }

            if Instant::now() >= deadline {
                // An empty result set is not a failure for find_all.
                self.recorder
                    .end(ops::WAIT_FOR_ELEMENTS, &target, false, None);
                return Ok(Vec::new());
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.inner.current_url().await
    }

    async fn title(&self) -> Result<String, DriverError> {
        self.inner.title().await
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        self.inner.page_source().await
    }

    async fn window_handles(&self) -> Result<Vec<String>, DriverError> {
        self.inner.window_handles().await
    }

    async fn switch_to_window(&self, handle: &str) -> Result<(), DriverError> {
        self.recorder.start(ops::SWITCH_WINDOW, handle);
        match self.inner.switch_to_window(handle).await {
            Ok(()) => {
                self.recorder.end(ops::SWITCH_WINDOW, handle, true, None);
                Ok(())
            }
            Err(err) => {
                self.recorder
                    .end(ops::SWITCH_WINDOW, handle, false, Some(err.to_string()));
                Err(err)
            }
        }
    }

    async fn quit(&self) -> Result<(), DriverError> {
        self.inner.quit().await
    }
}

/// An [`Element`] wrapper that records interaction timings.
pub struct InstrumentedElement {
    inner: Box<dyn Element>,
    recorder: TimingRecorder,
}

impl InstrumentedElement {
    async fn timed<T>(
        &self,
        operation: &str,
        result: Result<T, DriverError>,
        success_detail: Option<String>,
    ) -> Result<T, DriverError> {
        let target = self.inner.describe();
        match result {
            Ok(value) => {
                self.recorder.end(operation, &target, true, success_detail);
                Ok(value)
            }
            Err(err) => {
                self.recorder
                    .end(operation, &target, false, Some(err.to_string()));
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Element for InstrumentedElement {
    async fn click(&self) -> Result<(), DriverError> {
        self.recorder.start(ops::CLICK, &self.inner.describe());
        let result = self.inner.click().await;
        self.timed(ops::CLICK, result, None).await
    }

    async fn send_keys(&self, keys: &str) -> Result<(), DriverError> {
        self.recorder.start(ops::SEND_KEYS, &self.inner.describe());
        let result = self.inner.send_keys(keys).await;
        self.timed(ops::SEND_KEYS, result, Some(keys.to_owned()))
            .await
    }

    async fn text(&self) -> Result<String, DriverError> {
        self.recorder.start(ops::GET_TEXT, &self.inner.describe());
        let result = self.inner.text().await;
        self.timed(ops::GET_TEXT, result, None).await
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}
