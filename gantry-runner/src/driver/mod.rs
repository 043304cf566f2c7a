// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The browser-automation boundary.
//!
//! gantry does not drive browsers itself. The engine consumes a
//! [`SessionProvider`] that knows how to start sessions, and talks to each
//! browser through the [`Session`] and [`Element`] capability traits. The
//! [`InstrumentedSession`] wrapper composes over any `Session`
//! implementation, adding bounded waits and timing hooks.

mod instrumented;

pub use instrumented::{DEFAULT_POLL_INTERVAL, InstrumentedElement, InstrumentedSession};

use crate::{
    config::GantryConfig,
    errors::{DriverError, SessionCreateError, UnsupportedBrowserError},
};
use async_trait::async_trait;
use std::{fmt, str::FromStr, time::Duration};
use tracing::warn;

/// Creates and destroys browser sessions.
///
/// One session is created per non-skipped test and destroyed by the engine
/// on every exit path. Implementations must be safe to call concurrently:
/// the parallel lane creates sessions from many tasks at once (bounded by
/// the permit pool).
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Starts a new browser session.
    ///
    /// Fails with [`SessionCreateError::UnsupportedBrowser`] if the
    /// configured browser kind is not supported; that failure is scoped to
    /// the requesting test.
    async fn create_session(
        &self,
        config: &BrowserConfig,
    ) -> Result<Box<dyn Session>, SessionCreateError>;
}

/// One live browser instance.
///
/// Handles are internally synchronized (WebDriver-protocol clients are), so
/// all operations take `&self`; the engine still confines each session to
/// the single test that requested it.
#[async_trait]
pub trait Session: Send + Sync {
    /// Navigates to a URL.
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    /// Finds the first element matching the locator.
    ///
    /// Raw sessions report a currently-missing element as
    /// [`DriverError::NoSuchElement`]; the instrumented wrapper turns that
    /// into a bounded poll.
    async fn find(&self, locator: &Locator) -> Result<Box<dyn Element>, DriverError>;

    /// Finds all elements matching the locator. An empty vec is not an
    /// error.
    async fn find_all(&self, locator: &Locator) -> Result<Vec<Box<dyn Element>>, DriverError>;

    /// Returns the current URL.
    async fn current_url(&self) -> Result<String, DriverError>;

    /// Returns the page title.
    async fn title(&self) -> Result<String, DriverError>;

    /// Returns the page source.
    async fn page_source(&self) -> Result<String, DriverError>;

    /// Returns the open window handles.
    async fn window_handles(&self) -> Result<Vec<String>, DriverError>;

    /// Switches to the window with the given handle.
    async fn switch_to_window(&self, handle: &str) -> Result<(), DriverError>;

    /// Shuts the session down. Called exactly once per created session.
    async fn quit(&self) -> Result<(), DriverError>;
}

/// One element within a session's current page.
#[async_trait]
pub trait Element: Send + Sync {
    /// Clicks the element.
    async fn click(&self) -> Result<(), DriverError>;

    /// Sends keystrokes to the element.
    async fn send_keys(&self, keys: &str) -> Result<(), DriverError>;

    /// Reads the element's visible text.
    async fn text(&self) -> Result<String, DriverError>;

    /// A short human-readable description of the element, used as the
    /// target of recorded actions.
    fn describe(&self) -> String;
}

impl fmt::Debug for dyn Element + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("describe", &self.describe())
            .finish()
    }
}

/// An element selector.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Locator {
    /// A CSS selector.
    Css(String),
    /// An XPath expression.
    XPath(String),
    /// An element id.
    Id(String),
}

impl Locator {
    /// Creates a CSS selector locator.
    pub fn css(selector: impl Into<String>) -> Self {
        Locator::Css(selector.into())
    }

    /// Creates an XPath locator.
    pub fn xpath(expression: impl Into<String>) -> Self {
        Locator::XPath(expression.into())
    }

    /// Creates an element-id locator.
    pub fn id(id: impl Into<String>) -> Self {
        Locator::Id(id.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Css(selector) => write!(f, "css `{selector}`"),
            Locator::XPath(expression) => write!(f, "xpath `{expression}`"),
            Locator::Id(id) => write!(f, "id `{id}`"),
        }
    }
}

/// The browser kinds a provider may support.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BrowserKind {
    /// Google Chrome / Chromium.
    Chrome,
    /// Mozilla Firefox.
    Firefox,
    /// Microsoft Edge.
    Edge,
    /// Apple Safari. Headless mode is not supported.
    Safari,
}

impl FromStr for BrowserKind {
    type Err = UnsupportedBrowserError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" => Ok(BrowserKind::Chrome),
            "firefox" => Ok(BrowserKind::Firefox),
            "edge" => Ok(BrowserKind::Edge),
            "safari" => Ok(BrowserKind::Safari),
            other => Err(UnsupportedBrowserError::new(other)),
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserKind::Chrome => write!(f, "chrome"),
            BrowserKind::Firefox => write!(f, "firefox"),
            BrowserKind::Edge => write!(f, "edge"),
            BrowserKind::Safari => write!(f, "safari"),
        }
    }
}

/// Startup options handed to [`SessionProvider::create_session`].
#[derive(Clone, Debug)]
pub struct BrowserConfig {
    /// Requested browser kind, as configured. Kept as a string so an
    /// unsupported kind fails the requesting session, not the whole run.
    pub browser: String,
    /// Whether to start headless.
    pub headless: bool,
    /// Requested browser version.
    pub version: String,
    /// Window size to apply at startup.
    pub viewport: Viewport,
    /// Page-load and script timeout for the session.
    pub timeout: Duration,
}

impl BrowserConfig {
    /// Resolves browser startup options from the run configuration.
    pub fn from_config(config: &GantryConfig) -> Self {
        Self {
            browser: config.browser.kind.clone(),
            headless: config.browser.headless,
            version: config.browser.version.clone(),
            viewport: Viewport::resolve(
                &config.viewport.name,
                config.viewport.width,
                config.viewport.height,
            ),
            timeout: config.execution.wait_timeout(),
        }
    }

    /// Parses the configured browser kind.
    pub fn kind(&self) -> Result<BrowserKind, UnsupportedBrowserError> {
        self.browser.parse()
    }
}

/// A browser window size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    /// Width in CSS pixels.
    pub width: u32,
    /// Height in CSS pixels.
    pub height: u32,
}

impl Viewport {
    /// The fallback size, `desktop.medium`.
    pub const DEFAULT: Viewport = Viewport {
        width: 1280,
        height: 800,
    };

    /// Resolves a viewport from a named size plus optional custom
    /// dimensions. Custom dimensions win when both are present; an unknown
    /// name falls back to `desktop.medium`.
    pub fn resolve(name: &str, width: Option<u32>, height: Option<u32>) -> Viewport {
        if let (Some(width), Some(height)) = (width, height) {
            return Viewport { width, height };
        }
        match Viewport::from_name(name) {
            Some(viewport) => viewport,
            None => {
                warn!("unknown viewport: {name}, using desktop.medium as default");
                Viewport::DEFAULT
            }
        }
    }

    /// Looks up a named viewport size.
    pub fn from_name(name: &str) -> Option<Viewport> {
        let (width, height) = match name.to_ascii_lowercase().as_str() {
            "mobile.small" => (375, 667),
            "mobile.medium" => (390, 844),
            "mobile.large" => (428, 926),
            "tablet.small" => (768, 1024),
            "tablet.medium" => (834, 1112),
            "tablet.large" => (1024, 1366),
            "desktop.small" => (1024, 768),
            "desktop.medium" => (1280, 800),
            "desktop.large" => (1920, 1080),
            _ => return None,
        };
        Some(Viewport { width, height })
    }
}
