//! Dashboard proxy — Axum server forwarding browser calls to the backend.
//!
//! `/api/proxy/<path>` is forwarded to `<upstream>/<path>` with method, query
//! string and body intact. Responses are streamed back, so event streams
//! pass through unbuffered. CORS enabled for local development.

use anyhow::{Context, Result};
use axum::{
    body::{Body, Bytes},
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use reqwest::Client;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::client::join_url;

/// Headers copied from the browser request to the backend.
const FORWARDED_REQUEST_HEADERS: [header::HeaderName; 3] =
    [header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION];

/// Headers copied from the backend response to the browser.
const FORWARDED_RESPONSE_HEADERS: [header::HeaderName; 2] =
    [header::CONTENT_TYPE, header::CACHE_CONTROL];

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct ProxyState {
    http: Client,
    /// Backend API root, e.g. `http://127.0.0.1:8000/api`.
    upstream: String,
}

impl ProxyState {
    pub fn new(upstream: impl Into<String>) -> Result<Self> {
        // No overall timeout: proxied event streams stay open indefinitely.
        let http = Client::builder()
            .build()
            .context("Failed to build HTTP client for dashboard proxy")?;
        Ok(Self {
            http,
            upstream: upstream.into(),
        })
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }
}

pub type AppState = Arc<ProxyState>;

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// A running proxy server.
pub struct ProxyServer {
    pub addr: SocketAddr,
    pub task: JoinHandle<Result<()>>,
}

/// Bind `addr` and serve until `shutdown` fires.
///
/// Port 0 picks an ephemeral port; the bound address is returned.
pub async fn spawn_proxy(
    state: AppState,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<ProxyServer> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard proxy on {addr}"))?;
    let addr = listener.local_addr().context("Proxy listener has no address")?;
    info!(%addr, "Dashboard proxy listening on http://{addr}");

    let task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .context("Dashboard proxy server error")?;
        info!("Dashboard proxy stopped");
        Ok(())
    });

    Ok(ProxyServer { addr, task })
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/api/proxy/*path", any(forward))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "upstream": state.upstream,
    }))
}

async fn forward(
    State(state): State<AppState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut url = join_url(&state.upstream, &path);
    if let Some(q) = query.filter(|q| !q.is_empty()) {
        url.push('?');
        url.push_str(&q);
    }
    debug!(%method, url = %url, "Proxying request");

    let mut req = state.http.request(method.clone(), &url);
    for name in FORWARDED_REQUEST_HEADERS {
        if let Some(value) = headers.get(&name) {
            req = req.header(name, value.clone());
        }
    }
    if !body.is_empty() {
        req = req.body(body);
    }

    let upstream = match req.send().await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(%method, url = %url, error = %e, "Backend unreachable");
            return (StatusCode::BAD_GATEWAY, format!("Backend unreachable: {e}")).into_response();
        }
    };

    let mut builder = Response::builder().status(upstream.status());
    for name in FORWARDED_RESPONSE_HEADERS {
        if let Some(value) = upstream.headers().get(&name) {
            builder = builder.header(name, value.clone());
        }
    }
    builder = builder.header("x-kat-proxy", HeaderValue::from_static("1"));

    builder
        .body(Body::from_stream(upstream.bytes_stream()))
        .unwrap_or_else(|e| {
            warn!(error = %e, "Failed to build proxied response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
