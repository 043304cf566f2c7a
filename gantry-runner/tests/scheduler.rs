// Copyright (c) The gantry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end scheduler tests against a scripted session provider.

mod fixtures;

use fixtures::{ElementScript, FakeProvider};
use gantry_runner::{
    config::{GantryConfig, SessionCount},
    driver::{Element, Locator, Session, SessionProvider},
    errors::TestFailure,
    list::{TestCase, TestRegistry, test_fn},
    reporter::{TestEventKind, TestOutcome, TestStatus},
    runner::{RunReport, RunnerBuilder},
    signal::SignalHandlerKind,
    timing::{LAST_ACTION_SUFFIX, ops},
};
use pretty_assertions::assert_eq;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

fn run_with(registry: TestRegistry, provider: &Arc<FakeProvider>, capacity: usize) -> RunReport {
    run_with_timeout(
        registry,
        provider,
        capacity,
        Duration::from_secs(2),
        Duration::from_millis(25),
    )
}

fn run_with_timeout(
    registry: TestRegistry,
    provider: &Arc<FakeProvider>,
    capacity: usize,
    wait_timeout: Duration,
    poll_interval: Duration,
) -> RunReport {
    let list = registry.into_test_list();
    let config = GantryConfig::default();
    let mut builder = RunnerBuilder::default();
    builder
        .set_session_count(SessionCount::Count(capacity))
        .set_wait_timeout(wait_timeout)
        .set_poll_interval(poll_interval);
    let runner = builder
        .build(
            &list,
            &config,
            Arc::clone(provider) as Arc<dyn SessionProvider>,
            SignalHandlerKind::Noop,
        )
        .expect("runner builds");
    runner.execute(|_event| {})
}

fn outcome<'a>(report: &'a RunReport, name: &str) -> &'a TestOutcome {
    report
        .outcomes
        .iter()
        .find(|outcome| outcome.id.name == name)
        .unwrap_or_else(|| panic!("no outcome for test {name}"))
}

fn sleeping_case(suite: &str, name: &str, sleep: Duration) -> TestCase {
    TestCase::new(
        suite,
        name,
        test_fn(move |_cx| async move {
            tokio::time::sleep(sleep).await;
            Ok(())
        }),
    )
}

#[test]
fn mixed_lanes_each_outcome_reported_once() {
    // Scenario: one serial test and one parallel test in the same run.
    let provider = Arc::new(FakeProvider::new());
    provider.set_title("Dashboard");

    let mut registry = TestRegistry::new();
    registry
        .add(TestCase::new(
            "Mixed",
            "parallel_title",
            test_fn(|cx| async move {
                let title = cx.session().title().await?;
                cx.assert().eq(title.as_str(), "Dashboard", "title matches")?;
                Ok(())
            }),
        ))
        .add(
            TestCase::new(
                "Mixed",
                "serial_title",
                test_fn(|cx| async move {
                    let title = cx.session().title().await?;
                    cx.assert().eq(title.as_str(), "Dashboard", "title matches")?;
                    Ok(())
                }),
            )
            .serial(),
        );

    let report = run_with(registry, &provider, 2);

    assert_eq!(report.run_stats.passed, 2);
    assert_eq!(report.run_stats.finished_count, 2);
    assert!(report.run_stats.is_success());
    assert_eq!(report.outcomes.len(), 2);
    for name in ["parallel_title", "serial_title"] {
        let count = report
            .outcomes
            .iter()
            .filter(|outcome| outcome.id.name == name)
            .count();
        assert_eq!(count, 1, "{name} must appear exactly once");
    }
    provider.ledger.assert_balanced();
}

#[test]
fn capacity_one_serializes_session_lifetimes() {
    // Scenario: pool capacity 1, three parallel tests submitted at once.
    // Session lifetimes must not overlap.
    let provider = Arc::new(FakeProvider::new());
    let mut registry = TestRegistry::new();
    for name in ["first", "second", "third"] {
        registry.add(sleeping_case("CapacityOne", name, Duration::from_millis(50)));
    }

    let report = run_with(registry, &provider, 1);

    assert_eq!(report.run_stats.passed, 3);
    assert_eq!(provider.ledger.created(), 3);
    assert_eq!(provider.ledger.high_water(), 1);
    assert!(
        !provider.ledger.any_sessions_overlapped(),
        "with one permit no two sessions may coexist"
    );
    provider.ledger.assert_balanced();
}

#[test]
fn session_count_bounds_concurrent_sessions() {
    let provider = Arc::new(FakeProvider::new());
    let mut registry = TestRegistry::new();
    for i in 0..8 {
        registry.add(sleeping_case(
            "Bounded",
            &format!("case_{i}"),
            Duration::from_millis(30),
        ));
    }

    let report = run_with(registry, &provider, 2);

    assert_eq!(report.run_stats.passed, 8);
    assert_eq!(provider.ledger.created(), 8);
    assert_eq!(provider.ledger.destroyed(), 8);
    assert!(
        provider.ledger.high_water() <= 2,
        "at most 2 concurrent sessions, saw {}",
        provider.ledger.high_water()
    );
    provider.ledger.assert_balanced();
}

#[test]
fn serial_lane_runs_in_registration_order() {
    let provider = Arc::new(FakeProvider::new());
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut registry = TestRegistry::new();
    for name in ["alpha", "beta", "gamma"] {
        let order_handle = Arc::clone(&order);
        registry.add(
            TestCase::new(
                "Serial",
                name,
                test_fn(move |_cx| {
                    let order = Arc::clone(&order_handle);
                    async move {
                        order.lock().unwrap().push(name);
                        Ok(())
                    }
                }),
            )
            .serial(),
        );
    }

    let report = run_with(registry, &provider, 4);

    assert_eq!(report.run_stats.passed, 3);
    assert_eq!(*order.lock().unwrap(), ["alpha", "beta", "gamma"]);
    assert!(
        !provider.ledger.any_sessions_overlapped(),
        "sequential tests must never overlap in session lifetime"
    );
}

#[test]
fn skipped_tests_acquire_nothing() {
    let provider = Arc::new(FakeProvider::new());
    let mut registry = TestRegistry::new();
    registry
        .add(
            TestCase::new("Skips", "parallel_skip", test_fn(|_cx| async { Ok(()) })).skip(),
        )
        .add(
            TestCase::new("Skips", "serial_skip", test_fn(|_cx| async { Ok(()) }))
                .serial()
                .skip(),
        );

    let report = run_with(registry, &provider, 2);

    assert_eq!(report.run_stats.skipped, 2);
    assert_eq!(report.run_stats.finished_count, 2);
    for outcome in &report.outcomes {
        assert_eq!(outcome.status, TestStatus::Skipped);
        assert_eq!(outcome.duration, Duration::ZERO);
        assert!(outcome.actions.is_empty());
    }
    assert_eq!(
        provider.ledger.created(),
        0,
        "skipped tests must not create sessions"
    );
}

#[test]
fn failure_rewrites_only_the_last_action() {
    let provider = Arc::new(FakeProvider::new());
    provider.add_element(&Locator::css("#submit"), ElementScript::default());

    let mut registry = TestRegistry::new();
    registry.add(TestCase::new(
        "Rewrite",
        "fails_after_actions",
        test_fn(|cx| async move {
            cx.session().goto("https://example.test/login").await?;
            let button = cx.session().find(&Locator::css("#submit")).await?;
            button.click().await?;
            Err(TestFailure::message("login flow broke"))
        }),
    ));

    let report = run_with(registry, &provider, 1);
    let failed = outcome(&report, "fails_after_actions");

    assert_eq!(failed.status, TestStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("login flow broke"));

    let actions = &failed.actions;
    assert_eq!(actions.len(), 3);
    // Earlier actions are unchanged...
    assert_eq!(actions[0].name, ops::NAVIGATE);
    assert!(actions[0].success);
    assert_eq!(actions[1].name, ops::WAIT_FOR_ELEMENT);
    assert!(actions[1].success);
    // ...and the last is rewritten into the failure pivot.
    let last = &actions[2];
    assert!(last.name.ends_with(LAST_ACTION_SUFFIX), "got {}", last.name);
    assert!(last.name.starts_with(ops::CLICK));
    assert!(!last.success);
    assert!(
        last.detail.as_deref().unwrap().contains("login flow broke"),
        "pivot detail carries the failure"
    );
    provider.ledger.assert_balanced();
}

#[test]
fn already_failed_last_action_is_not_rewritten() {
    // A wait timeout records its own failed action; the pivot rewrite must
    // not stack another annotation on top.
    let provider = Arc::new(FakeProvider::new());
    let mut registry = TestRegistry::new();
    registry.add(TestCase::new(
        "Rewrite",
        "wait_timeout",
        test_fn(|cx| async move {
            cx.session().find(&Locator::css("#never")).await?;
            Ok(())
        }),
    ));

    let report = run_with_timeout(
        registry,
        &provider,
        1,
        Duration::from_millis(200),
        Duration::from_millis(25),
    );
    let failed = outcome(&report, "wait_timeout");

    assert_eq!(failed.status, TestStatus::Failed);
    let last = failed.actions.last().unwrap();
    assert_eq!(last.name, "Wait for Element (Failed)");
    assert!(!last.name.contains(LAST_ACTION_SUFFIX));
    assert!(!last.success);
}

#[test]
fn assertion_pass_then_fail_shapes_the_outcome() {
    // Scenario: assertEqual("Dashboard", "Dashboard") then
    // assertEqual("Dashboard", "Dashboad").
    let provider = Arc::new(FakeProvider::new());
    provider.set_title("Dashboard");

    let mut registry = TestRegistry::new();
    registry.add(TestCase::new(
        "Assertions",
        "dashboard_typo",
        test_fn(|cx| async move {
            let title = cx.session().title().await?;
            cx.assert().eq(title.as_str(), "Dashboard", "title spelled right")?;
            cx.assert().eq(title.as_str(), "Dashboad", "title spelled wrong")?;
            Ok(())
        }),
    ));

    let report = run_with(registry, &provider, 1);
    let failed = outcome(&report, "dashboard_typo");

    assert_eq!(failed.status, TestStatus::Failed);
    assert!(
        failed
            .error
            .as_deref()
            .unwrap()
            .contains("title spelled wrong")
    );

    assert_eq!(failed.actions.len(), 2);
    assert!(failed.actions[0].success);
    assert_eq!(failed.actions[0].name, ops::ASSERTION);
    assert!(!failed.actions[1].success);
    assert_eq!(failed.actions[1].target, "title spelled wrong");
    provider.ledger.assert_balanced();
}

#[test]
fn panicking_body_becomes_failed_outcome_with_cleanup() {
    let provider = Arc::new(FakeProvider::new());
    let mut registry = TestRegistry::new();
    registry
        .add(TestCase::new(
            "Panics",
            "explodes",
            test_fn(|_cx| async {
                panic!("unexpected page state");
            }),
        ))
        .add(TestCase::new("Panics", "survives", test_fn(|_cx| async { Ok(()) })));

    let report = run_with(registry, &provider, 2);

    let failed = outcome(&report, "explodes");
    assert_eq!(failed.status, TestStatus::Failed);
    assert!(
        failed
            .error
            .as_deref()
            .unwrap()
            .contains("unexpected page state")
    );
    assert_eq!(outcome(&report, "survives").status, TestStatus::Passed);
    assert_eq!(report.run_stats.failed, 1);
    assert_eq!(report.run_stats.passed, 1);
    provider.ledger.assert_balanced();
}

#[test]
fn session_create_failure_is_scoped_to_one_test() {
    let provider = Arc::new(FakeProvider::new());
    provider.fail_next_creations(1);

    let mut registry = TestRegistry::new();
    registry
        .add(
            TestCase::new("Creation", "unlucky", test_fn(|_cx| async { Ok(()) })).serial(),
        )
        .add(
            TestCase::new("Creation", "lucky", test_fn(|_cx| async { Ok(()) })).serial(),
        );

    let report = run_with(registry, &provider, 1);

    let failed = outcome(&report, "unlucky");
    assert_eq!(failed.status, TestStatus::Failed);
    assert!(
        failed
            .error
            .as_deref()
            .unwrap()
            .contains("failed to start chrome session")
    );
    assert!(failed.actions.is_empty());

    assert_eq!(outcome(&report, "lucky").status, TestStatus::Passed);
    provider.ledger.assert_balanced();
}

#[test]
fn event_stream_brackets_the_run() {
    let provider = Arc::new(FakeProvider::new());
    let mut registry = TestRegistry::new();
    registry
        .add(TestCase::new("Events", "one", test_fn(|_cx| async { Ok(()) })))
        .add(TestCase::new("Events", "two", test_fn(|_cx| async { Ok(()) })).skip());

    let list = registry.into_test_list();
    let config = GantryConfig::default();
    let mut builder = RunnerBuilder::default();
    builder.set_session_count(SessionCount::Count(1));
    let runner = builder
        .build(
            &list,
            &config,
            Arc::clone(&provider) as Arc<dyn SessionProvider>,
            SignalHandlerKind::Noop,
        )
        .unwrap();

    let mut kinds = Vec::new();
    let report = runner.execute(|event| {
        kinds.push(event.kind);
    });

    assert!(matches!(
        kinds.first(),
        Some(TestEventKind::RunStarted {
            run_count: 2,
            parallel_count: 2,
            serial_count: 0,
            rejected_count: 0,
        })
    ));
    assert!(matches!(kinds.last(), Some(TestEventKind::RunFinished { .. })));

    let finished = kinds
        .iter()
        .filter(|kind| matches!(kind, TestEventKind::TestFinished { .. }))
        .count();
    let skipped = kinds
        .iter()
        .filter(|kind| matches!(kind, TestEventKind::TestSkipped { .. }))
        .count();
    assert_eq!(finished, 1);
    assert_eq!(skipped, 1);
    assert_eq!(report.run_stats.finished_count, 2);
}

#[test]
fn callback_error_cancels_the_run() {
    let provider = Arc::new(FakeProvider::new());
    let mut registry = TestRegistry::new();
    for i in 0..4 {
        registry.add(sleeping_case(
            "Cancelled",
            &format!("case_{i}"),
            Duration::from_millis(40),
        ));
    }

    let list = registry.into_test_list();
    let config = GantryConfig::default();
    let mut builder = RunnerBuilder::default();
    builder.set_session_count(SessionCount::Count(1));
    let runner = builder
        .build(
            &list,
            &config,
            Arc::clone(&provider) as Arc<dyn SessionProvider>,
            SignalHandlerKind::Noop,
        )
        .unwrap();

    let result = runner.try_execute(|event| match event.kind {
        TestEventKind::TestFinished { .. } => Err("reporter broke"),
        _ => Ok(()),
    });

    assert_eq!(result.unwrap_err(), "reporter broke");
    // Cleanup is attached per task: whatever was created is destroyed even
    // though the run was cut short.
    provider.ledger.assert_balanced();
}
