//! Todo HTTP server.
//!
//! Environment:
//!
//! - `TODO_ADDR`: listen address (default `127.0.0.1:3000`)
//! - `TODO_SHADOW_DIR`: when set, summary requests are replayed against the
//!   v2 summary and differing responses are written to this directory

use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weave_core::prelude::*;
use weave_demo_todo::{TodoStore, api};
use weave_web::{ShadowConfig, ShadowLayer, WebConfig, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "todo=info,weave_demo_todo=info,weave_core=info,weave_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting todo server");

    let store = TodoStore::new();
    let mut dispatcher = Dispatcher::new(EngineConfig::new());
    api::install(&mut dispatcher, store)?;
    info!(operations = dispatcher.operations().len(), "Operations registered");

    let mut app = router(Arc::new(dispatcher), &WebConfig::default());

    if let Ok(dir) = std::env::var("TODO_SHADOW_DIR") {
        let summary = format!("/todos{}", api::SUMMARY_PATH);
        let candidate = format!("/todos{}", api::SUMMARY_V2_PATH);
        let shadow = ShadowLayer::new(ShadowConfig::new(&dir).route(summary, candidate))?;
        app = app.layer(shadow);
        info!(log_dir = %dir, "Shadow comparison enabled");
    }

    let addr = std::env::var("TODO_ADDR").unwrap_or_else(|_| "127.0.0.1:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Graceful shutdown signal handler.
///
/// Waits for Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
