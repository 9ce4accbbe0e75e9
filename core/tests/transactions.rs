//! Integration tests for the transaction aspect
//!
//! Uses the mock driver from `weave-testing` to observe begin, commit and
//! rollback around real dispatches.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use http::StatusCode;
use serde_json::json;
use std::panic::{AssertUnwindSafe, catch_unwind};
use weave_core::error::TransactionStage;
use weave_core::prelude::*;
use weave_testing::helpers::{CallLog, get, post_body};
use weave_testing::mocks::{MockTransaction, MockTransactionDriver};

// ============================================================================
// Test Fixtures
// ============================================================================

fn setup(config: EngineConfig) -> (Dispatcher, MockTransactionDriver) {
    let driver = MockTransactionDriver::new();
    let dispatcher = Dispatcher::new(config);
    assert!(dispatcher.install_transactions(driver.clone()));
    (dispatcher, driver)
}

fn insert(tx: Tx<MockTransaction>, title: String) -> weave_core::Result<Json<String>> {
    tx.with(|t| t.execute(format!("INSERT {title}")))?;
    Ok(Json(title))
}

// ============================================================================
// Commit and rollback
// ============================================================================

#[test]
fn test_success_commits_once() {
    let (mut dispatcher, driver) = setup(EngineConfig::new());
    let op = dispatcher
        .register(
            OperationDescriptor::post("/items")
                .transactional()
                .param_from("tx", ParamSource::Implicit)
                .param_from("title", ParamSource::Query),
            insert,
        )
        .unwrap();

    let response = dispatcher.dispatch(&op, post_body("/items?title=milk", "")).unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(driver.begun(), 1);
    assert_eq!(driver.commits(), 1);
    assert_eq!(driver.rollbacks(), 0);
    assert_eq!(driver.committed(), ["INSERT milk"]);
}

#[test]
fn test_runtime_failure_rolls_back_and_maps() {
    let (mut dispatcher, driver) = setup(EngineConfig::new());
    let op = dispatcher
        .register(
            OperationDescriptor::post("/items").transactional(),
            |tx: Tx<MockTransaction>| -> weave_core::Result<()> {
                tx.with(|t| t.execute("INSERT half"))?;
                Err(RuntimeError::new(409, "item exists").into())
            },
        )
        .unwrap();

    let response = dispatcher.dispatch(&op, post_body("/items", "")).unwrap();

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(driver.commits(), 0);
    assert_eq!(driver.rollbacks(), 1);
    assert!(driver.committed().is_empty());
}

#[test]
fn test_rollback_happens_before_error_mapping_sees_failure() {
    let log = CallLog::new();
    let (mut dispatcher, driver) = setup(EngineConfig::new().with_error_mapping(false));

    let observer = log.clone();
    let counter = driver.clone();
    dispatcher
        .aspects()
        .register("/**", 50, move |ctx, next| {
            let outcome = next.run(ctx);
            observer.record(format!("rollbacks={}", counter.rollbacks()));
            outcome
        })
        .unwrap();

    let op = dispatcher
        .register(OperationDescriptor::delete("/items").transactional(), || -> weave_core::Result<()> {
            Err(anyhow::anyhow!("disk full").into())
        })
        .unwrap();

    let err = dispatcher.dispatch(&op, post_body("/items", "")).unwrap_err();
    assert_eq!(err.kind(), "unclassified");
    assert_eq!(log.entries(), ["rollbacks=1"]);
}

#[test]
fn test_commit_failure_propagates() {
    let (mut dispatcher, driver) = setup(EngineConfig::new());
    driver.fail_commit(true);
    let op = dispatcher
        .register(OperationDescriptor::post("/items").transactional(), || Ok(()))
        .unwrap();

    let err = dispatcher.dispatch(&op, post_body("/items", "")).unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Transaction {
            stage: TransactionStage::Commit,
            ..
        }
    ));
    assert_eq!(driver.commits(), 1);
    assert_eq!(driver.rollbacks(), 0);
}

#[test]
fn test_failed_rollback_still_reports_handler_failure() {
    let (mut dispatcher, driver) = setup(EngineConfig::new());
    driver.fail_rollback(true);
    let op = dispatcher
        .register(OperationDescriptor::post("/items").transactional(), || -> weave_core::Result<()> {
            Err(RuntimeError::new(409, "item exists").into())
        })
        .unwrap();

    let response = dispatcher.dispatch(&op, post_body("/items", "")).unwrap();

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(driver.rollbacks(), 1);
    assert_eq!(driver.commits(), 0);
}

#[test]
fn test_begin_failure_skips_handler() {
    let log = CallLog::new();
    let (mut dispatcher, driver) = setup(EngineConfig::new());
    driver.fail_begin(true);

    let handler_log = log.clone();
    let op = dispatcher
        .register(OperationDescriptor::post("/items").transactional(), move || {
            handler_log.record("handler");
            Ok(())
        })
        .unwrap();

    let err = dispatcher.dispatch(&op, post_body("/items", "")).unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Transaction {
            stage: TransactionStage::Begin,
            ..
        }
    ));
    assert!(log.is_empty());
    assert_eq!(driver.commits() + driver.rollbacks(), 0);
}

#[test]
fn test_panic_rolls_back_and_resumes() {
    let (mut dispatcher, driver) = setup(EngineConfig::new());
    let op = dispatcher
        .register(OperationDescriptor::post("/items").transactional(), || -> weave_core::Result<()> {
            panic!("handler bug")
        })
        .unwrap();

    let outcome = catch_unwind(AssertUnwindSafe(|| dispatcher.dispatch(&op, post_body("/items", ""))));

    assert!(outcome.is_err());
    assert_eq!(driver.rollbacks(), 1);
    assert_eq!(driver.commits(), 0);
}

// ============================================================================
// Scope of the aspect
// ============================================================================

#[test]
fn test_non_transactional_operation_is_untouched() {
    let (mut dispatcher, driver) = setup(EngineConfig::new());
    let op = dispatcher
        .register(OperationDescriptor::get("/items"), || Ok(Json(json!([]))))
        .unwrap();

    dispatcher.dispatch(&op, get("/items")).unwrap();
    assert_eq!(driver.begun(), 0);
}

#[test]
fn test_controller_flag_makes_every_operation_transactional() {
    let (mut dispatcher, driver) = setup(EngineConfig::new());
    let ops = dispatcher
        .register_controller(
            Controller::new("ledger", "/ledger")
                .transactional()
                .operation(OperationDescriptor::get("/balance"), || Ok(Json(0)))
                .operation(OperationDescriptor::post("/entries"), || Ok(())),
        )
        .unwrap();

    dispatcher.dispatch(&ops[0], get("/ledger/balance")).unwrap();
    dispatcher.dispatch(&ops[1], post_body("/ledger/entries", "")).unwrap();

    assert_eq!(driver.begun(), 2);
    assert_eq!(driver.commits(), 2);
}

#[test]
fn test_transactions_install_once() {
    let (dispatcher, first) = setup(EngineConfig::new());
    let second = MockTransactionDriver::new();
    assert!(!dispatcher.install_transactions(second.clone()));

    let mut dispatcher = dispatcher;
    let op = dispatcher
        .register(OperationDescriptor::post("/once").transactional(), || Ok(()))
        .unwrap();
    dispatcher.dispatch(&op, post_body("/once", "")).unwrap();

    assert_eq!(first.commits(), 1);
    assert_eq!(second.begun(), 0);
}

#[test]
fn test_transaction_handle_closed_after_call() {
    let (mut dispatcher, _driver) = setup(EngineConfig::new());
    let kept = std::sync::Arc::new(std::sync::Mutex::new(None));
    let slot = std::sync::Arc::clone(&kept);
    let op = dispatcher
        .register(OperationDescriptor::post("/keep").transactional(), move |tx: Tx<MockTransaction>| {
            assert!(tx.is_open());
            *slot.lock().unwrap() = Some(tx);
            Ok(())
        })
        .unwrap();

    dispatcher.dispatch(&op, post_body("/keep", "")).unwrap();

    let tx = kept.lock().unwrap().take().unwrap();
    assert!(!tx.is_open());
    assert!(matches!(
        tx.with(|_| ()),
        Err(DispatchError::MissingResource("transaction"))
    ));
}

#[test]
fn test_tx_parameter_without_transaction_is_missing() {
    let mut dispatcher = Dispatcher::new(EngineConfig::new().with_error_mapping(false));
    let op = dispatcher
        .register(OperationDescriptor::post("/plain"), |_tx: Tx<MockTransaction>| Ok(()))
        .unwrap();

    let err = dispatcher.dispatch(&op, post_body("/plain", "")).unwrap_err();
    assert!(matches!(err, DispatchError::MissingResource("transaction")));
}
