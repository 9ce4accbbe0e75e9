//! Shadow-traffic middleware.
//!
//! For configured paths the layer lets the real request through, then
//! replays it against a shadow path in a detached task and compares the two
//! response bodies. When they differ, a JSON record of the request and both
//! bodies is written to the log directory.
//!
//! # Example
//!
//! ```no_run
//! use axum::{Router, routing::get};
//! use weave_web::config::ShadowConfig;
//! use weave_web::middleware::ShadowLayer;
//!
//! let layer = ShadowLayer::new(
//!     ShadowConfig::new("/tmp/shadow").route("/api/v1/orders", "/api/v2/orders"),
//! )
//! .unwrap();
//!
//! let app: Router = Router::new()
//!     .route("/api/v1/orders", get(|| async { "v1" }))
//!     .route("/api/v2/orders", get(|| async { "v2" }))
//!     .layer(layer);
//! ```
//!
//! # Flow
//!
//! 1. **Match** the request path (query stripped) against the configured routes
//! 2. **Buffer** the request body so it can be sent twice; a body over
//!    `body_limit` goes to the handler as streamed and is not replayed
//! 3. **Forward** the original request and capture its response body
//! 4. **Replay** method, headers, query and body against the shadow path
//! 5. **Record** a diff file when the bodies differ
//!
//! Buffering, replay and logging failures are logged and never touch the
//! original request or response.

use crate::config::ShadowConfig;
use axum::{
    body::{Body, Bytes, HttpBody},
    extract::Request,
    http::{HeaderMap, Method, header},
    response::Response,
};
use futures::{StreamExt, future, stream};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use uuid::Uuid;

/// Layer replaying configured routes against their shadow paths.
#[derive(Clone, Debug)]
pub struct ShadowLayer {
    state: Arc<ShadowState>,
}

#[derive(Debug)]
struct ShadowState {
    config: ShadowConfig,
    client: reqwest::Client,
}

impl ShadowLayer {
    /// Create the layer, creating the log directory if it is missing.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the log directory cannot be created.
    pub fn new(config: ShadowConfig) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.log_dir)?;
        tracing::debug!(
            log_dir = %config.log_dir.display(),
            routes = config.routes.len(),
            "Shadow traffic enabled"
        );
        Ok(Self {
            state: Arc::new(ShadowState {
                config,
                client: reqwest::Client::new(),
            }),
        })
    }
}

impl<S> Layer<S> for ShadowLayer {
    type Service = ShadowMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ShadowMiddleware {
            inner,
            state: Arc::clone(&self.state),
        }
    }
}

/// Middleware service created by [`ShadowLayer`].
#[derive(Clone, Debug)]
pub struct ShadowMiddleware<S> {
    inner: S,
    state: Arc<ShadowState>,
}

impl<S> Service<Request> for ShadowMiddleware<S>
where
    S: Service<Request, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let Some(shadow_path) = self.state.config.routes.get(req.uri().path()).cloned() else {
            return Box::pin(self.inner.call(req));
        };

        // The clone that was polled ready handles this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let state = Arc::clone(&self.state);

        Box::pin(async move {
            let (parts, body) = req.into_parts();
            let body = match buffer(body, state.config.body_limit).await {
                Buffered::Complete(bytes) => bytes,
                Buffered::Partial(body) => {
                    tracing::debug!(path = %parts.uri.path(), "Request body not buffered, skipping shadow replay");
                    return inner.call(Request::from_parts(parts, body)).await;
                }
            };

            let captured = CapturedRequest {
                method: parts.method.clone(),
                url: parts.uri.to_string(),
                query: parts.uri.query().map(ToString::to_string),
                headers: parts.headers.clone(),
                body: body.clone(),
                shadow_path,
            };

            let response = inner
                .call(Request::from_parts(parts, Body::from(body)))
                .await?;
            let (parts, body) = response.into_parts();
            let original = match buffer(body, usize::MAX).await {
                Buffered::Complete(bytes) => bytes,
                Buffered::Partial(body) => {
                    tracing::warn!(path = %captured.url, "Could not capture response body, skipping shadow replay");
                    return Ok(Response::from_parts(parts, body));
                }
            };

            let compared = original.clone();
            tokio::spawn(async move {
                if let Err(err) = replay(&state, captured, compared).await {
                    tracing::warn!(error = %err, "Shadow replay failed");
                }
            });

            Ok(Response::from_parts(parts, Body::from(original)))
        })
    }
}

/// Outcome of reading a body into memory.
enum Buffered {
    /// The whole body, within the limit.
    Complete(Bytes),
    /// The body went over the limit or failed mid-stream. The returned body
    /// yields the chunks already read, then the unread remainder (or the
    /// read error), so the receiver sees exactly what it would have seen
    /// without the layer.
    Partial(Body),
}

async fn buffer(body: Body, limit: usize) -> Buffered {
    let declared = usize::try_from(body.size_hint().lower()).unwrap_or(usize::MAX);
    if declared > limit {
        return Buffered::Partial(body);
    }

    let mut rest = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut len = 0usize;
    while let Some(next) = rest.next().await {
        match next {
            Ok(chunk) if len.saturating_add(chunk.len()) <= limit => {
                len += chunk.len();
                chunks.push(chunk);
            }
            outcome => {
                let read = stream::iter(chunks.into_iter().map(Ok))
                    .chain(stream::once(future::ready(outcome)))
                    .chain(rest);
                return Buffered::Partial(Body::from_stream(read));
            }
        }
    }

    Buffered::Complete(match chunks.len() {
        0 => Bytes::new(),
        1 => chunks.swap_remove(0),
        _ => Bytes::from(chunks.concat()),
    })
}

struct CapturedRequest {
    method: Method,
    url: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    shadow_path: String,
}

#[derive(Debug, Serialize)]
struct ShadowRecord {
    request: RecordedRequest,
    original_response: String,
    duplicate_response: String,
}

#[derive(Debug, Serialize)]
struct RecordedRequest {
    method: String,
    url: String,
    headers: BTreeMap<String, Vec<String>>,
    body: String,
    query: String,
}

async fn replay(
    state: &ShadowState,
    captured: CapturedRequest,
    original: Bytes,
) -> anyhow::Result<()> {
    let url = shadow_url(&state.config, &captured)?;

    let mut request = state
        .client
        .request(captured.method.clone(), &url)
        .body(captured.body.clone());
    for (name, value) in &captured.headers {
        if name != header::HOST && name != header::CONTENT_LENGTH {
            request = request.header(name, value);
        }
    }

    let duplicate = request.send().await?.bytes().await?;
    if duplicate == original {
        tracing::debug!(url = %url, "Shadow response matches");
        return Ok(());
    }

    let path = write_record(&state.config, &captured, &original, &duplicate).await?;
    tracing::info!(
        path = %captured.url,
        shadow = %captured.shadow_path,
        record = %path.display(),
        "Shadow response differs"
    );
    Ok(())
}

fn shadow_url(config: &ShadowConfig, captured: &CapturedRequest) -> anyhow::Result<String> {
    let base = match &config.base_url {
        Some(base) => base.trim_end_matches('/').to_string(),
        None => {
            let host = captured
                .headers
                .get(header::HOST)
                .and_then(|value| value.to_str().ok())
                .ok_or_else(|| anyhow::anyhow!("request has no Host header to replay against"))?;
            format!("http://{host}")
        }
    };

    let mut url = format!("{base}{}", captured.shadow_path);
    if let Some(query) = &captured.query {
        url.push('?');
        url.push_str(query);
    }
    Ok(url)
}

async fn write_record(
    config: &ShadowConfig,
    captured: &CapturedRequest,
    original: &Bytes,
    duplicate: &Bytes,
) -> anyhow::Result<PathBuf> {
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in &captured.headers {
        headers
            .entry(name.to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }

    let record = ShadowRecord {
        request: RecordedRequest {
            method: captured.method.to_string(),
            url: captured.url.clone(),
            headers,
            body: String::from_utf8_lossy(&captured.body).into_owned(),
            query: captured.query.clone().unwrap_or_default(),
        },
        original_response: String::from_utf8_lossy(original).into_owned(),
        duplicate_response: String::from_utf8_lossy(duplicate).into_owned(),
    };

    let name = format!(
        "{}_{}.json",
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S"),
        Uuid::new_v4()
    );
    let path = config.log_dir.join(name);
    tokio::fs::write(&path, serde_json::to_vec(&record)?).await?;
    Ok(path)
}
