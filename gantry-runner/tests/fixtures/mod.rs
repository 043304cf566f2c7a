// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared test doubles: a scripted session provider with a full
//! create/destroy ledger.

#![allow(dead_code)]

use async_trait::async_trait;
use gantry_runner::{
    driver::{BrowserConfig, Element, Locator, Session, SessionProvider},
    errors::{DriverError, SessionCreateError},
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

/// Records every session's lifecycle so tests can assert on resource
/// accounting: create/destroy balance, concurrency high-water mark and
/// session lifetime overlap.
#[derive(Debug, Default)]
pub struct SessionLedger {
    created: AtomicUsize,
    destroyed: AtomicUsize,
    double_quits: AtomicUsize,
    active: AtomicUsize,
    high_water: AtomicUsize,
    spans: Mutex<Vec<(Instant, Option<Instant>)>>,
}

impl SessionLedger {
    fn open_span(&self) -> usize {
        self.created.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.high_water.fetch_max(now_active, Ordering::SeqCst);

        let mut spans = self.spans.lock().unwrap();
        spans.push((Instant::now(), None));
        spans.len() - 1
    }

    fn close_span(&self, index: usize) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.spans.lock().unwrap()[index].1 = Some(Instant::now());
    }

    fn record_double_quit(&self) {
        self.double_quits.fetch_add(1, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn high_water(&self) -> usize {
        self.high_water.load(Ordering::SeqCst)
    }

    /// Asserts that every created session was destroyed exactly once.
    pub fn assert_balanced(&self) {
        assert_eq!(
            self.created(),
            self.destroyed(),
            "every created session must be destroyed"
        );
        assert_eq!(
            self.double_quits.load(Ordering::SeqCst),
            0,
            "no session may be quit twice"
        );
    }

    /// Returns true if any two session lifetimes overlapped.
    pub fn any_sessions_overlapped(&self) -> bool {
        let spans = self.spans.lock().unwrap();
        for (i, a) in spans.iter().enumerate() {
            for b in spans.iter().skip(i + 1) {
                let (a_start, Some(a_end)) = *a else {
                    panic!("session span left open");
                };
                let (b_start, Some(b_end)) = *b else {
                    panic!("session span left open");
                };
                if a_start < b_end && b_start < a_end {
                    return true;
                }
            }
        }
        false
    }
}

/// How a scripted element behaves.
#[derive(Clone, Debug)]
pub struct ElementScript {
    /// The element only matches once this much time has passed since
    /// session creation.
    pub appear_after: Duration,
    /// The first N find calls report a stale element reference.
    pub stale_polls: usize,
    /// Visible text.
    pub text: String,
    /// Whether clicks fail.
    pub fail_click: bool,
}

impl Default for ElementScript {
    fn default() -> Self {
        Self {
            appear_after: Duration::ZERO,
            stale_polls: 0,
            text: String::new(),
            fail_click: false,
        }
    }
}

impl ElementScript {
    pub fn with_text(text: &str) -> Self {
        Self {
            text: text.to_owned(),
            ..Self::default()
        }
    }
}

/// A scripted [`SessionProvider`]: every created session shares the same
/// element scripts and page title.
pub struct FakeProvider {
    pub ledger: Arc<SessionLedger>,
    elements: Mutex<HashMap<String, ElementScript>>,
    title: Mutex<String>,
    fail_creations: AtomicUsize,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(SessionLedger::default()),
            elements: Mutex::new(HashMap::new()),
            title: Mutex::new("Fake Page".to_owned()),
            fail_creations: AtomicUsize::new(0),
        }
    }

    pub fn set_title(&self, title: &str) {
        *self.title.lock().unwrap() = title.to_owned();
    }

    pub fn add_element(&self, locator: &Locator, script: ElementScript) {
        self.elements
            .lock()
            .unwrap()
            .insert(locator.to_string(), script);
    }

    /// Makes the next `count` session creations fail.
    pub fn fail_next_creations(&self, count: usize) {
        self.fail_creations.store(count, Ordering::SeqCst);
    }

    /// Creates a standalone session outside the runner, for direct wrapper
    /// tests.
    pub fn standalone_session(&self) -> Box<dyn Session> {
        self.new_session()
    }

    fn new_session(&self) -> Box<dyn Session> {
        Box::new(FakeSession {
            ledger: Arc::clone(&self.ledger),
            span: self.ledger.open_span(),
            created_at: Instant::now(),
            elements: self.elements.lock().unwrap().clone(),
            title: self.title.lock().unwrap().clone(),
            current_url: Mutex::new("about:blank".to_owned()),
            find_counts: Mutex::new(HashMap::new()),
            quit_called: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl SessionProvider for FakeProvider {
    async fn create_session(
        &self,
        config: &BrowserConfig,
    ) -> Result<Box<dyn Session>, SessionCreateError> {
        let should_fail = self
            .fail_creations
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if should_fail {
            return Err(SessionCreateError::Startup {
                browser: config.browser.clone(),
                source: DriverError::command("scripted session startup failure"),
            });
        }
        Ok(self.new_session())
    }
}

struct FakeSession {
    ledger: Arc<SessionLedger>,
    span: usize,
    created_at: Instant,
    elements: HashMap<String, ElementScript>,
    title: String,
    current_url: Mutex<String>,
    find_counts: Mutex<HashMap<String, usize>>,
    quit_called: AtomicBool,
}

impl FakeSession {
    fn lookup(&self, locator: &Locator) -> Result<Option<FakeElement>, DriverError> {
        let key = locator.to_string();
        let Some(script) = self.elements.get(&key) else {
            return Ok(None);
        };

        let polls = {
            let mut counts = self.find_counts.lock().unwrap();
            let count = counts.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if polls <= script.stale_polls {
            return Err(DriverError::StaleElement { locator: key });
        }
        if self.created_at.elapsed() < script.appear_after {
            return Ok(None);
        }

        Ok(Some(FakeElement {
            description: key,
            text: script.text.clone(),
            fail_click: script.fail_click,
        }))
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        *self.current_url.lock().unwrap() = url.to_owned();
        Ok(())
    }

    async fn find(&self, locator: &Locator) -> Result<Box<dyn Element>, DriverError> {
        match self.lookup(locator)? {
            Some(element) => Ok(Box::new(element)),
            None => Err(DriverError::NoSuchElement {
                locator: locator.to_string(),
            }),
        }
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Box<dyn Element>>, DriverError> {
        match self.lookup(locator)? {
            Some(element) => {
                let element: Box<dyn Element> = Box::new(element);
                Ok(vec![element])
            }
            None => Ok(Vec::new()),
        }
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.current_url.lock().unwrap().clone())
    }

    async fn title(&self) -> Result<String, DriverError> {
        Ok(self.title.clone())
    }

    async fn page_source(&self) -> Result<String, DriverError> {
        Ok("<html></html>".to_owned())
    }

    async fn window_handles(&self) -> Result<Vec<String>, DriverError> {
        Ok(vec!["main".to_owned()])
    }

    async fn switch_to_window(&self, handle: &str) -> Result<(), DriverError> {
        if handle == "main" {
            Ok(())
        } else {
            Err(DriverError::command(format!("no such window: {handle}")))
        }
    }

    async fn quit(&self) -> Result<(), DriverError> {
        if self.quit_called.swap(true, Ordering::SeqCst) {
            self.ledger.record_double_quit();
        } else {
            self.ledger.close_span(self.span);
        }
        Ok(())
    }
}

struct FakeElement {
    description: String,
    text: String,
    fail_click: bool,
}

#[async_trait]
impl Element for FakeElement {
    async fn click(&self) -> Result<(), DriverError> {
        if self.fail_click {
            Err(DriverError::command(format!(
                "element not interactable: {}",
                self.description
            )))
        } else {
            Ok(())
        }
    }

    async fn send_keys(&self, _keys: &str) -> Result<(), DriverError> {
        Ok(())
    }

    async fn text(&self) -> Result<String, DriverError> {
        Ok(self.text.clone())
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}
