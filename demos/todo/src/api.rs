//! Operations and aspects of the todo service.
//!
//! Everything under `/todos` runs inside a [`TodoStore`] transaction. The
//! caller's identity comes from the `x-user` header and is injected as the
//! `owner` common parameter, so clients cannot claim someone else's items
//! through the query string.

// Handlers receive their arguments by value.
#![allow(clippy::needless_pass_by_value)]

use crate::store::{TodoStore, TodoTransaction};
use crate::types::{NewTodo, TodoId, TodoItem};
use http::StatusCode;
use serde_json::json;
use weave_core::prelude::*;

/// Header carrying the caller's name.
pub const USER_HEADER: &str = "x-user";

/// Owner used when no user header is sent.
pub const ANONYMOUS: &str = "anonymous";

/// Priority of the logging aspect: outside the transaction, inside error
/// mapping, so logged failures are the ones the handler raised.
const LOGGING_PRIORITY: i32 = 50;

/// Priority of the dry-run short-circuit: outermost.
const GUARD_PRIORITY: i32 = 200;

/// Path of the summary operation.
pub const SUMMARY_PATH: &str = "/summary";

/// Candidate replacement for the summary, compared through shadow traffic.
pub const SUMMARY_V2_PATH: &str = "/summary/v2";

type TodoTx = Tx<TodoTransaction>;

/// Failure to set up the todo service.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    /// An aspect, supplier or operation could not be registered.
    #[error(transparent)]
    Registration(#[from] RegistrationError),

    /// The dispatcher already runs transactions against another driver, so
    /// the todo store would never see a write.
    #[error("dispatcher already has a transaction driver installed")]
    TransactionsInUse,
}

/// Register the todo service on `dispatcher`.
///
/// # Errors
///
/// - [`InstallError::TransactionsInUse`] if `dispatcher` already has a
///   transaction driver
/// - [`InstallError::Registration`] if an operation clashes with one already
///   registered
pub fn install(dispatcher: &mut Dispatcher, store: TodoStore) -> Result<(), InstallError> {
    if !dispatcher.install_transactions(store) {
        return Err(InstallError::TransactionsInUse);
    }

    dispatcher
        .aspects()
        .register_aspect("/todos/**", LOGGING_PRIORITY, LoggingAspect)?;
    dispatcher.aspects().register("/todos/**", GUARD_PRIORITY, |ctx, next| {
        if ctx.request().query("dry_run").is_some() && ctx.operation().method != http::Method::GET {
            ctx.response()
                .write_json(StatusCode::ACCEPTED, &json!({ "success": true, "dry_run": true }))
                .map_err(anyhow::Error::from)?;
            ctx.set_auto_return(false);
            return Ok(());
        }
        next.run(ctx)
    })?;

    dispatcher.common_params().register("/todos/**", |request| {
        let owner = request
            .headers()
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .unwrap_or(ANONYMOUS);
        CommonParams::from([("owner".to_string(), json!(owner))])
    })?;

    dispatcher.register_controller(
        Controller::new("todos", "/todos")
            .transactional()
            .operation(
                OperationDescriptor::get("/items").param("tx").param("owner").param("tag"),
                list,
            )
            .operation(
                OperationDescriptor::post("/items").param("tx").param("owner").param("todo"),
                create,
            )
            .operation(
                OperationDescriptor::post("/items/complete")
                    .param("tx")
                    .param("owner")
                    .param_from("id", ParamSource::Query),
                complete,
            )
            .operation(
                OperationDescriptor::delete("/items")
                    .param("tx")
                    .param("owner")
                    .param_from("id", ParamSource::Query),
                remove,
            )
            .operation(
                OperationDescriptor::get(SUMMARY_PATH).param("tx").param("owner"),
                summary,
            )
            .operation(
                OperationDescriptor::get(SUMMARY_V2_PATH).param("tx").param("owner"),
                summary_v2,
            ),
    )?;

    Ok(())
}

fn list(tx: TodoTx, owner: String, tag: String) -> weave_core::Result<Json<Vec<TodoItem>>> {
    let items = tx.with(|t| t.items())?;
    Ok(Json(
        items
            .into_iter()
            .filter(|item| item.owner == owner)
            .filter(|item| tag.is_empty() || item.tags.contains(&tag))
            .collect(),
    ))
}

fn create(tx: TodoTx, owner: String, todo: Record<NewTodo>) -> weave_core::Result<Json<TodoItem>> {
    let item = TodoItem::new(owner, todo.into_inner());
    tx.with(|t| t.put(item.clone()))?;
    tracing::info!(id = %item.id, owner = %item.owner, "Todo created");
    Ok(Json(item))
}

fn complete(tx: TodoTx, owner: String, id: String) -> weave_core::Result<Json<TodoItem>> {
    let id = parse_id(&id)?;
    let mut item = tx
        .with(|t| t.get(id))?
        .filter(|item| item.owner == owner)
        .ok_or_else(|| not_found(id))?;

    if item.completed {
        return Err(RuntimeError::new(409, "todo is already completed").into());
    }
    item.completed = true;
    item.completed_at = Some(chrono::Utc::now());
    tx.with(|t| t.put(item.clone()))?;
    Ok(Json(item))
}

fn remove(tx: TodoTx, owner: String, id: String) -> weave_core::Result<()> {
    let id = parse_id(&id)?;
    let owned = tx.with(|t| t.get(id))?.is_some_and(|item| item.owner == owner);
    if !owned || !tx.with(|t| t.remove(id))? {
        return Err(not_found(id));
    }
    Ok(())
}

fn summary(tx: TodoTx, owner: String) -> weave_core::Result<serde_json::Value> {
    let items = tx.with(|t| t.items())?;
    let (done, open): (Vec<_>, Vec<_>) = items
        .iter()
        .filter(|item| item.owner == owner)
        .partition(|item| item.completed);
    Ok(json!({ "open": open.len(), "completed": done.len() }))
}

fn summary_v2(tx: TodoTx, owner: String) -> weave_core::Result<serde_json::Value> {
    let items = tx.with(|t| t.items())?;
    let mut open = 0;
    let mut completed = 0;
    let mut tags = std::collections::BTreeSet::new();
    for item in items.iter().filter(|item| item.owner == owner) {
        if item.completed {
            completed += 1;
        } else {
            open += 1;
        }
        tags.extend(item.tags.iter().cloned());
    }
    Ok(json!({ "open": open, "completed": completed, "tags": tags }))
}

fn parse_id(raw: &str) -> weave_core::Result<TodoId> {
    TodoId::parse(raw).ok_or_else(|| ValidationError::single("id must be a UUID").into())
}

fn not_found(id: TodoId) -> DispatchError {
    RuntimeError::new(404, format!("todo {id} not found")).into()
}
