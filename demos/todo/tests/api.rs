//! Integration tests for the todo service
//!
//! Most tests call the dispatcher directly; the last one goes through the
//! Axum router to cover the HTTP shell.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use weave_core::prelude::*;
use weave_demo_todo::{TodoItem, TodoStore, api};
use weave_testing::helpers::{delete, get, post_body, post_json};

// ============================================================================
// Test Fixtures
// ============================================================================

struct Service {
    dispatcher: Dispatcher,
    store: TodoStore,
}

impl Service {
    fn new() -> Self {
        weave_testing::init_tracing();
        let store = TodoStore::new();
        let mut dispatcher = Dispatcher::default();
        api::install(&mut dispatcher, store.clone()).unwrap();
        Self { dispatcher, store }
    }

    fn call(&self, method: Method, path: &str, request: Request) -> Response {
        let op = self.dispatcher.find(&method, path).cloned().unwrap();
        self.dispatcher.dispatch(&op, request).unwrap()
    }

    fn create(&self, user: &str, body: &Value) -> Response {
        self.call(Method::POST, "/todos/items", as_user(post_json("/todos/items", body), user))
    }
}

fn as_user(request: Request, user: &str) -> Request {
    let mut headers = request.headers().clone();
    headers.insert(api::USER_HEADER, HeaderValue::from_str(user).unwrap());
    request.with_headers(headers)
}

fn json_body(response: &Response) -> Value {
    serde_json::from_slice(&response.body).unwrap()
}

// ============================================================================
// Create and list
// ============================================================================

#[test]
fn test_create_then_list_own_items() {
    let service = Service::new();
    let created = service.create("ann", &json!({"title": "Buy milk", "tags": ["home"]}));
    assert_eq!(created.status, StatusCode::OK);
    let item: TodoItem = serde_json::from_slice(&created.body).unwrap();
    assert_eq!(item.owner, "ann");

    service.create("bob", &json!({"title": "Fix bike"}));

    let listed = service.call(
        Method::GET,
        "/todos/items",
        as_user(get("/todos/items"), "ann"),
    );
    let items: Vec<TodoItem> = serde_json::from_slice(&listed.body).unwrap();
    assert_eq!(items, vec![item]);
    assert_eq!(service.store.len(), 2);
}

#[test]
fn test_owner_cannot_be_spoofed_by_query() {
    let service = Service::new();
    service.create("ann", &json!({"title": "secret"}));

    let listed = service.call(Method::GET, "/todos/items", get("/todos/items?owner=ann"));
    assert_eq!(json_body(&listed), json!([]));
}

#[test]
fn test_list_filters_by_tag() {
    let service = Service::new();
    service.create("ann", &json!({"title": "a", "tags": ["work"]}));
    service.create("ann", &json!({"title": "b", "tags": ["home"]}));

    let listed = service.call(
        Method::GET,
        "/todos/items",
        as_user(get("/todos/items?tag=work"), "ann"),
    );
    let titles: Vec<String> = serde_json::from_slice::<Vec<TodoItem>>(&listed.body)
        .unwrap()
        .into_iter()
        .map(|item| item.title)
        .collect();
    assert_eq!(titles, ["a"]);
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_missing_title_is_rejected_and_nothing_stored() {
    let service = Service::new();
    let response = service.create("ann", &json!({"tags": [""]}));

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(&response),
        json!({"success": false, "messages": ["title is required", "tags must not be blank"]})
    );
    assert!(service.store.is_empty());
}

#[test]
fn test_malformed_id_is_a_validation_failure() {
    let service = Service::new();
    let response = service.call(
        Method::DELETE,
        "/todos/items",
        delete("/todos/items?id=not-a-uuid"),
    );
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(json_body(&response)["messages"], json!(["id must be a UUID"]));
}

// ============================================================================
// Complete and delete
// ============================================================================

#[test]
fn test_complete_twice_conflicts() {
    let service = Service::new();
    let item: TodoItem =
        serde_json::from_slice(&service.create("ann", &json!({"title": "x"})).body).unwrap();
    let path = format!("/todos/items/complete?id={}", item.id);

    let first = service.call(
        Method::POST,
        "/todos/items/complete",
        as_user(post_body(&path, ""), "ann"),
    );
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(json_body(&first)["completed"], json!(true));

    let second = service.call(
        Method::POST,
        "/todos/items/complete",
        as_user(post_body(&path, ""), "ann"),
    );
    assert_eq!(second.status, StatusCode::CONFLICT);
}

#[test]
fn test_delete_someone_elses_item_is_not_found() {
    let service = Service::new();
    let item: TodoItem =
        serde_json::from_slice(&service.create("ann", &json!({"title": "x"})).body).unwrap();
    let path = format!("/todos/items?id={}", item.id);

    let denied = service.call(Method::DELETE, "/todos/items", as_user(delete(&path), "bob"));
    assert_eq!(denied.status, StatusCode::NOT_FOUND);
    assert_eq!(service.store.len(), 1);

    let deleted = service.call(Method::DELETE, "/todos/items", as_user(delete(&path), "ann"));
    assert_eq!(deleted.status, StatusCode::OK);
    assert!(service.store.is_empty());
}

#[test]
fn test_dry_run_short_circuits_writes() {
    let service = Service::new();
    let response = service.call(
        Method::POST,
        "/todos/items",
        post_json("/todos/items?dry_run=1", &json!({"title": "x"})),
    );

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert!(service.store.is_empty());
}

#[test]
fn test_store_refusing_transactions_surfaces_as_failure() {
    let service = Service::new();
    service.store.set_read_only(true);

    let op = service.dispatcher.find(&Method::GET, "/todos/summary").cloned().unwrap();
    let err = service.dispatcher.dispatch(&op, get("/todos/summary")).unwrap_err();
    assert_eq!(err.kind(), "transaction");
}

#[test]
fn test_summary_versions_differ_only_in_tags() {
    let service = Service::new();
    service.create("ann", &json!({"title": "a", "tags": ["home"]}));

    let v1 = service.call(Method::GET, "/todos/summary", as_user(get("/todos/summary"), "ann"));
    let v2 = service.call(
        Method::GET,
        "/todos/summary/v2",
        as_user(get("/todos/summary/v2"), "ann"),
    );
    assert_eq!(json_body(&v1), json!({"open": 1, "completed": 0}));
    assert_eq!(json_body(&v2), json!({"open": 1, "completed": 0, "tags": ["home"]}));
}

#[test]
fn test_install_refuses_dispatcher_with_other_driver() {
    let mut dispatcher = Dispatcher::default();
    assert!(dispatcher.install_transactions(TodoStore::new()));

    let err = api::install(&mut dispatcher, TodoStore::new()).unwrap_err();
    assert!(matches!(err, api::InstallError::TransactionsInUse));
    assert!(dispatcher.operations().is_empty());
}

// ============================================================================
// HTTP shell
// ============================================================================

#[tokio::test]
async fn test_router_serves_todos() {
    let store = TodoStore::new();
    let mut dispatcher = Dispatcher::default();
    api::install(&mut dispatcher, store.clone()).unwrap();
    let app = weave_web::router(Arc::new(dispatcher), &weave_web::WebConfig::default());

    let mut headers = HeaderMap::new();
    headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let mut request = http::Request::builder()
        .method(Method::POST)
        .uri("/todos/items")
        .body(axum::body::Body::from(r#"{"title":"via http"}"#))
        .unwrap();
    *request.headers_mut() = headers;

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.len(), 1);
}
