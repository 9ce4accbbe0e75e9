//! Mounting registered operations on an Axum router.
//!
//! Every distinct operation path becomes one route. The route looks up the
//! operation for the request method (405 if there is none), buffers the
//! body, and runs the synchronous chain on Tokio's blocking pool.

use crate::config::WebConfig;
use crate::error::AppError;
use axum::{
    Router,
    body::{Body, to_bytes},
    extract::Request,
    response::Response,
    routing::any,
};
use http::Method;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use weave_core::dispatch::{Dispatcher, Operation};

type MethodTable = HashMap<Method, Arc<Operation>>;

/// Build a router serving every operation registered on `dispatcher`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use weave_core::prelude::*;
/// use weave_web::{WebConfig, router};
///
/// let mut dispatcher = Dispatcher::default();
/// dispatcher
///     .register(OperationDescriptor::get("/health"), || Ok(Json("ok")))
///     .unwrap();
///
/// let app: axum::Router = router(Arc::new(dispatcher), &WebConfig::default());
/// ```
#[must_use]
pub fn router(dispatcher: Arc<Dispatcher>, config: &WebConfig) -> Router {
    let mut paths: BTreeMap<String, MethodTable> = BTreeMap::new();
    for operation in dispatcher.operations() {
        paths
            .entry(operation.path().to_string())
            .or_default()
            .insert(operation.method().clone(), Arc::clone(operation));
    }

    let body_limit = config.body_limit;
    paths
        .into_iter()
        .fold(Router::new(), |router, (path, methods)| {
            tracing::debug!(
                path = %path,
                methods = ?methods.keys().collect::<Vec<_>>(),
                "Mounting operation"
            );
            let dispatcher = Arc::clone(&dispatcher);
            let methods = Arc::new(methods);
            router.route(
                &path,
                any(move |request: Request| {
                    serve(Arc::clone(&dispatcher), Arc::clone(&methods), body_limit, request)
                }),
            )
        })
}

async fn serve(
    dispatcher: Arc<Dispatcher>,
    methods: Arc<MethodTable>,
    body_limit: usize,
    request: Request,
) -> Result<Response, AppError> {
    let operation = methods
        .get(request.method())
        .cloned()
        .ok_or_else(|| AppError::method_not_allowed(request.method(), request.uri().path()))?;

    let (parts, body) = request.into_parts();
    let body = to_bytes(body, body_limit)
        .await
        .map_err(|_| AppError::payload_too_large(body_limit))?;
    let uri = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), ToString::to_string);

    let request = weave_core::request::Request::new(parts.method, &uri)
        .with_headers(parts.headers)
        .with_body(body.to_vec());

    let response = tokio::task::spawn_blocking(move || dispatcher.dispatch(&operation, request))
        .await
        .map_err(|err| AppError::internal("Dispatch task failed").with_source(err.into()))??;

    Ok(into_http(response))
}

fn into_http(response: weave_core::request::Response) -> Response {
    let mut http = Response::new(Body::from(response.body));
    *http.status_mut() = response.status;
    *http.headers_mut() = response.headers;
    http
}
