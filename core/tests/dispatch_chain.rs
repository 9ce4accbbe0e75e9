//! Integration tests for chain composition
//!
//! Ordering, short-circuiting, argument and result rewriting, automatic
//! return and common parameters, all driven through the dispatcher.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use http::StatusCode;
use serde_json::{Value, json};
use std::collections::HashMap;
use weave_core::prelude::*;
use weave_testing::helpers::{CallLog, get, post_json};

// ============================================================================
// Test Fixtures
// ============================================================================

fn dispatcher() -> Dispatcher {
    Dispatcher::new(EngineConfig::new().with_error_mapping(false))
}

fn body(response: &Response) -> Value {
    serde_json::from_slice(&response.body).unwrap()
}

fn traced(
    log: &CallLog,
    label: &'static str,
) -> impl Fn(&mut ExecutionContext, Next<'_>) -> weave_core::Result<()> + Send + Sync + 'static {
    let log = log.clone();
    move |ctx: &mut ExecutionContext, next: Next<'_>| {
        log.record(format!("{label}:before"));
        let outcome = next.run(ctx);
        log.record(format!("{label}:after"));
        outcome
    }
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_higher_priority_wraps_lower() {
    let log = CallLog::new();
    let mut dispatcher = dispatcher();
    dispatcher.aspects().register("/api/**", 0, traced(&log, "inner")).unwrap();
    dispatcher.aspects().register("/api/**", 100, traced(&log, "outer")).unwrap();

    let handler_log = log.clone();
    let op = dispatcher
        .register(OperationDescriptor::get("/api/test"), move || {
            handler_log.record("handler");
            Ok(())
        })
        .unwrap();

    dispatcher.dispatch(&op, get("/api/test")).unwrap();
    assert_eq!(
        log.entries(),
        ["outer:before", "inner:before", "handler", "inner:after", "outer:after"]
    );
}

#[test]
fn test_equal_priority_keeps_registration_order() {
    let log = CallLog::new();
    let mut dispatcher = dispatcher();
    dispatcher.aspects().register("/**", 10, traced(&log, "first")).unwrap();
    dispatcher.aspects().register("/**", 10, traced(&log, "second")).unwrap();
    let op = dispatcher.register(OperationDescriptor::get("/x"), || Ok(())).unwrap();

    dispatcher.dispatch(&op, get("/x")).unwrap();
    assert_eq!(
        log.entries(),
        ["first:before", "second:before", "second:after", "first:after"]
    );
}

#[test]
fn test_aspects_only_apply_to_matching_paths() {
    let log = CallLog::new();
    let mut dispatcher = dispatcher();
    dispatcher.aspects().register("/admin/*", 10, traced(&log, "admin")).unwrap();
    let users = dispatcher.register(OperationDescriptor::get("/users/list"), || Ok(())).unwrap();
    let admin = dispatcher.register(OperationDescriptor::get("/admin/list"), || Ok(())).unwrap();

    dispatcher.dispatch(&users, get("/users/list")).unwrap();
    assert!(log.is_empty());

    dispatcher.dispatch(&admin, get("/admin/list")).unwrap();
    assert_eq!(log.entries(), ["admin:before", "admin:after"]);
}

#[test]
fn test_controller_prefix_is_matched() {
    let log = CallLog::new();
    let mut dispatcher = dispatcher();
    dispatcher.aspects().register("/shop/**", 10, traced(&log, "shop")).unwrap();
    let ops = dispatcher
        .register_controller(
            Controller::new("orders", "/shop/orders")
                .operation(OperationDescriptor::get("/recent"), || Ok(())),
        )
        .unwrap();

    dispatcher.dispatch(&ops[0], get("/shop/orders/recent")).unwrap();
    assert_eq!(log.count("shop:before"), 1);
}

// ============================================================================
// Short-circuit
// ============================================================================

#[test]
fn test_short_circuit_skips_handler_and_inner_aspects() {
    let log = CallLog::new();
    let mut dispatcher = dispatcher();
    dispatcher.aspects().register("/**", 0, traced(&log, "inner")).unwrap();

    let guard_log = log.clone();
    dispatcher
        .aspects()
        .register("/**", 100, move |ctx, _next| {
            guard_log.record("guard");
            ctx.response().write_json(StatusCode::FORBIDDEN, &json!({"denied": true})).unwrap();
            ctx.set_auto_return(false);
            Ok(())
        })
        .unwrap();

    let handler_log = log.clone();
    let op = dispatcher
        .register(OperationDescriptor::get("/secret"), move || {
            handler_log.record("handler");
            Ok(Json("secret"))
        })
        .unwrap();

    let response = dispatcher.dispatch(&op, get("/secret")).unwrap();
    assert_eq!(log.entries(), ["guard"]);
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(body(&response), json!({"denied": true}));
}

// ============================================================================
// Arguments and results
// ============================================================================

#[test]
fn test_aspect_rewrites_arguments_and_results() {
    let mut dispatcher = dispatcher();
    dispatcher
        .aspects()
        .register("/calc/**", 10, |ctx, next| {
            ctx.set_argument(0, 10_i64);
            next.run(ctx)?;
            let doubled = ctx.results()[0].as_i64().unwrap() * 2;
            ctx.set_result(0, json!(doubled));
            Ok(())
        })
        .unwrap();

    let op = dispatcher
        .register(OperationDescriptor::get("/calc/add").param("a").param("b"), |a: i64, b: i64| {
            Ok(Json(a + b))
        })
        .unwrap();

    let response = dispatcher.dispatch(&op, get("/calc/add?a=1&b=2")).unwrap();
    assert_eq!(body(&response), json!(24));
}

#[test]
fn test_arguments_visible_after_pipeline() {
    let seen = CallLog::new();
    let mut dispatcher = dispatcher();
    let aspect_seen = seen.clone();
    dispatcher
        .aspects()
        .register("/**", 10, move |ctx, next| {
            assert!(ctx.results().is_empty());
            next.run(ctx)?;
            let names = ctx.argument_names().join(",");
            let name = ctx.argument::<String>(0).cloned().unwrap_or_default();
            aspect_seen.record(format!("{names}={name}"));
            Ok(())
        })
        .unwrap();
    let op = dispatcher
        .register(OperationDescriptor::get("/hello").param("name"), |name: String| {
            Ok(Json(name))
        })
        .unwrap();

    dispatcher.dispatch(&op, get("/hello?name=ann")).unwrap();
    assert_eq!(seen.entries(), ["name=ann"]);
}

#[test]
fn test_wrong_argument_type_is_reported() {
    let mut dispatcher = dispatcher();
    dispatcher
        .aspects()
        .register("/**", 10, |ctx, next| {
            ctx.set_argument(0, "not a number");
            next.run(ctx)
        })
        .unwrap();
    let op = dispatcher
        .register(OperationDescriptor::get("/n").param("n"), |n: i64| Ok(Json(n)))
        .unwrap();

    let err = dispatcher.dispatch(&op, get("/n?n=1")).unwrap_err();
    assert!(matches!(err, DispatchError::ArgumentType { index: 0, .. }));
}

// ============================================================================
// Parameter defaults
// ============================================================================

#[test]
fn test_get_integer_without_value_is_zero() {
    let mut dispatcher = dispatcher();
    let op = dispatcher
        .register(OperationDescriptor::get("/api/test"), |n: i32| Ok(Json(n)))
        .unwrap();

    let response = dispatcher.dispatch(&op, get("/api/test")).unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(body(&response), json!(0));
}

#[test]
fn test_post_defaults_to_json_body() {
    let mut dispatcher = dispatcher();
    let op = dispatcher
        .register(OperationDescriptor::post("/echo"), |payload: HashMap<String, Value>| {
            Ok(Json(payload))
        })
        .unwrap();

    assert_eq!(op.descriptor().parameters[0].source, ParamSource::Json);
    let response = dispatcher
        .dispatch(&op, post_json("/echo", &json!({"k": [1, 2]})))
        .unwrap();
    assert_eq!(body(&response), json!({"k": [1, 2]}));
}

// ============================================================================
// Automatic return
// ============================================================================

#[test]
fn test_auto_return_off_writes_only_aspect_response() {
    let mut dispatcher = dispatcher();
    dispatcher
        .aspects()
        .register("/**", 10, |ctx, next| {
            ctx.set_auto_return(false);
            next.run(ctx)?;
            let wrapped = json!({ "data": ctx.results()[0] });
            ctx.response().write_json(StatusCode::ACCEPTED, &wrapped).unwrap();
            Ok(())
        })
        .unwrap();
    let op = dispatcher
        .register(OperationDescriptor::get("/wrapped"), || Ok(Json("payload")))
        .unwrap();

    let response = dispatcher.dispatch(&op, get("/wrapped")).unwrap();
    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(body(&response), json!({ "data": "payload" }));
}

#[test]
fn test_auto_return_off_without_write_is_empty() {
    let mut dispatcher = dispatcher();
    dispatcher
        .aspects()
        .register("/**", 10, |ctx, next| {
            ctx.set_auto_return(false);
            next.run(ctx)
        })
        .unwrap();
    let op = dispatcher
        .register(OperationDescriptor::get("/silent"), || Ok(Json("ignored")))
        .unwrap();

    let response = dispatcher.dispatch(&op, get("/silent")).unwrap();
    assert!(response.body.is_empty());
}

// ============================================================================
// Common parameters
// ============================================================================

#[test]
fn test_common_parameter_overrides_request() {
    let mut dispatcher = dispatcher();
    dispatcher
        .common_params()
        .register("/api/**", |request| {
            let user = request
                .headers()
                .get("x-user")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("anonymous")
                .to_string();
            CommonParams::from([("user".to_string(), json!(user))])
        })
        .unwrap();

    let op = dispatcher
        .register(OperationDescriptor::get("/api/whoami").param("user"), |user: String| {
            Ok(Json(user))
        })
        .unwrap();

    let response = dispatcher.dispatch(&op, get("/api/whoami?user=mallory")).unwrap();
    assert_eq!(body(&response), json!("anonymous"));
}

#[test]
fn test_aspect_registered_later_applies_to_next_call() {
    let log = CallLog::new();
    let mut dispatcher = dispatcher();
    let op = dispatcher.register(OperationDescriptor::get("/late"), || Ok(())).unwrap();

    dispatcher.dispatch(&op, get("/late")).unwrap();
    dispatcher.aspects().register("/late", 1, traced(&log, "late")).unwrap();
    dispatcher.dispatch(&op, get("/late")).unwrap();

    assert_eq!(log.entries(), ["late:before", "late:after"]);
}
