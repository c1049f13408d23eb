//! In-process mock of the trading backend for integration testing.
//!
//! Serves both the pipeline control API and the dashboard data API under
//! `/api` on an ephemeral port. State is in-memory and inspectable from
//! test code.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Backend state shared with the handlers.
#[derive(Default)]
pub struct BackendState {
    pub running: Mutex<bool>,
    pub configured: Mutex<bool>,
    pub thresholds: Mutex<Option<Value>>,
    pub last_order: Mutex<Option<Value>>,
    pub news_connects: AtomicU32,
    pub ticker_hits: AtomicU32,
}

/// A running mock backend. Dropping it shuts the server down.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<BackendState>,
    shutdown: CancellationToken,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());
        let app = router(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
                .unwrap();
        });
        Self {
            addr,
            state,
            shutdown,
        }
    }

    /// Pipeline API root (paths already carry `/api`).
    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Dashboard API root.
    pub fn api_base(&self) -> String {
        format!("http://{}/api", self.addr)
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn router(state: Arc<BackendState>) -> Router {
    Router::new()
        .route("/api/status", get(status))
        .route("/api/trades", get(trades))
        .route("/api/config", post(configure))
        .route("/api/thresholds", post(thresholds))
        .route("/api/start", post(start))
        .route("/api/pause", post(pause))
        .route("/api/logs", get(logs))
        .route("/api/news/stream", get(news_stream))
        .route("/api/news", get(news))
        .route("/api/tickers", get(tickers))
        .route("/api/sentiment", post(sentiment))
        .route("/api/orders", post(orders))
        .with_state(state)
}

// -- Pipeline API ---------------------------------------------------------

async fn status(State(state): State<Arc<BackendState>>) -> Json<Value> {
    let running = *state.running.lock().unwrap();
    let configured = *state.configured.lock().unwrap();
    Json(json!({
        "running": running,
        "configured": configured,
        "max_buy_price": 60,
        "profit_target_cents": 7,
    }))
}

async fn trades() -> Json<Value> {
    // CSV-backed rows: numeric columns arrive as strings.
    Json(json!([
        {"headline": "Fed cuts rates", "ticker": "KXFED-25", "final_signal": "1", "finbert_score": "0.91", "timestamp": "12:00:01"},
        {"headline": "Oil slides", "ticker": "OIL-70", "signal": -1, "conf": 0.7, "timestamp": "12:00:00"},
        {"headline": "Quiet day", "ticker": "SPX", "timestamp": "11:59:59"}
    ]))
}

async fn configure(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Json<Value> {
    let complete = ["groq_key", "kalshi_api_key", "kalshi_private_key"]
        .iter()
        .all(|k| body[*k].as_str().is_some_and(|v| !v.is_empty()));
    *state.configured.lock().unwrap() = complete;
    Json(json!({"status": "ok", "configured": complete}))
}

async fn thresholds(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Json<Value> {
    *state.thresholds.lock().unwrap() = Some(body.clone());
    Json(body)
}

async fn start(State(state): State<Arc<BackendState>>) -> Json<Value> {
    *state.running.lock().unwrap() = true;
    Json(json!({"status": "started"}))
}

async fn pause(State(state): State<Arc<BackendState>>) -> Json<Value> {
    *state.running.lock().unwrap() = false;
    Json(json!({"status": "paused"}))
}

type EventResults = Sse<stream::Iter<std::vec::IntoIter<Result<Event, Infallible>>>>;

fn finite_sse(lines: Vec<String>) -> EventResults {
    let events: Vec<Result<Event, Infallible>> =
        lines.into_iter().map(|l| Ok(Event::default().data(l))).collect();
    Sse::new(stream::iter(events))
}

async fn logs() -> impl IntoResponse {
    finite_sse(vec![
        "[boot] pipeline ready".into(),
        "[rss] 12 new headlines".into(),
        "[order] KXFED-25 yes @ 45".into(),
    ])
}

/// One good decision and one malformed payload per connection, then close.
async fn news_stream(State(state): State<Arc<BackendState>>) -> EventResults {
    let n = state.news_connects.fetch_add(1, Ordering::SeqCst) + 1;
    let good = json!({
        "headline": "Fed cuts rates",
        "ticker": "KXFED-25",
        "final_decision": 1,
        "timestamp": n,
    })
    .to_string();
    finite_sse(vec![good, "{not json".into()])
}

// -- Dashboard API --------------------------------------------------------

async fn news(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let limit: usize = params.get("limit").and_then(|l| l.parse().ok()).unwrap_or(50);
    let articles: Vec<Value> = (0..limit.min(60))
        .map(|i| {
            json!({
                "source": "Reuters",
                "headline": format!("Headline {i}"),
                "content_header": "",
                "date": "2026-02-28",
                "timestamp": 1_700_000_000 + i,
                "link": format!("https://example.com/{i}"),
                "sentiment": if i % 2 == 0 { "positive" } else { "negative" },
            })
        })
        .collect();
    Json(Value::Array(articles))
}

async fn tickers(State(state): State<Arc<BackendState>>) -> Json<Value> {
    state.ticker_hits.fetch_add(1, Ordering::SeqCst);
    Json(json!([
        {"market_ticker": "KXFED-25", "yes_bid": 45, "yes_ask": 55},
        {"market_ticker": "NVDA-250", "yes_bid": 61, "yes_ask": 64, "last_updated": 1700000000.0}
    ]))
}

async fn sentiment(Json(body): Json<Value>) -> Json<Value> {
    let text = body["text"].as_str().unwrap_or_default();
    let label = if text.contains("beats") { "positive" } else { "neutral" };
    Json(json!({"label": label, "score": 0.87}))
}

async fn orders(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    *state.last_order.lock().unwrap() = Some(body.clone());
    match body["ticker"].as_str().unwrap_or_default() {
        "REJECT" => (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "Price outside allowed range"})),
        )
            .into_response(),
        "BOOM" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        _ => Json(json!({"order_id": "ord-42", "status": "resting"})).into_response(),
    }
}
