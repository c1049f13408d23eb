//! End-to-end tests: the reqwest clients, event-stream views, proxy and order
//! flow, all driven against an in-process mock backend.

mod mock_backend;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use kat::client::dashboard::DashboardClient;
use kat::client::pipeline::PipelineClient;
use kat::client::sse::event_stream;
use kat::client::{DashboardApi, PipelineApi};
use kat::config::{CredentialsConfig, FeedConfig};
use kat::dashboard::orders::{FormStatus, OrderForm};
use kat::dashboard::proxy::{spawn_proxy, ProxyState};
use kat::dashboard::{OverviewPage, QueryClient, BACKEND_DOWN_BANNER};
use kat::feed::stream::{parse_decision, parse_log_line, Reconnect, StreamView};
use kat::site::controls::{ControlPanel, LiveViews};
use kat::types::{Credentials, KatError, OrderRequest, OrderSide};

use mock_backend::MockBackend;

const TIMEOUT: Duration = Duration::from_secs(5);

/// Poll `cond` until it holds or the deadline passes.
async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + TIMEOUT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}

fn pipeline(backend: &MockBackend) -> Arc<PipelineClient> {
    Arc::new(PipelineClient::new(backend.base(), TIMEOUT).unwrap())
}

fn order(ticker: &str) -> OrderRequest {
    OrderRequest {
        ticker: ticker.into(),
        side: OrderSide::Yes,
        count: 2,
        price_cents: 45,
    }
}

// ---------------------------------------------------------------------------
// Pipeline API
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_pause_round_trip() {
    let backend = MockBackend::start().await;
    let api = pipeline(&backend);
    let panel = ControlPanel::new(api.clone());

    let status = api.status().await.unwrap();
    assert!(!status.running);
    assert_eq!(status.max_buy_price, 60);

    panel.toggle(&status).await.unwrap();
    let status = api.status().await.unwrap();
    assert!(status.running);

    panel.toggle(&status).await.unwrap();
    assert!(!api.status().await.unwrap().running);
}

#[tokio::test]
async fn test_thresholds_clamped_on_the_wire() {
    let backend = MockBackend::start().await;
    let panel = ControlPanel::new(pipeline(&backend));

    let held = panel.submit_thresholds(250, 0).await.unwrap();
    assert_eq!(held.max_buy_price, 99);
    assert_eq!(held.profit_target_cents, 1);

    let sent = backend.state.thresholds.lock().unwrap().clone().unwrap();
    assert_eq!(sent["max_buy_price"], 99);
    assert_eq!(sent["profit_target_cents"], 1);
}

#[tokio::test]
async fn test_configure_requires_all_credentials() {
    let backend = MockBackend::start().await;
    let panel = ControlPanel::new(pipeline(&backend));

    let partial = Credentials::new("groq".into(), "  ".into(), "pem".into());
    assert!(!panel.configure(&partial).await.unwrap().configured);

    let full = Credentials::new(" groq ".into(), "key".into(), "pem".into());
    assert!(panel.configure(&full).await.unwrap().configured);
    assert!(*backend.state.configured.lock().unwrap());
}

#[tokio::test]
async fn test_configure_with_credentials_from_env() {
    let backend = MockBackend::start().await;
    let panel = ControlPanel::new(pipeline(&backend));

    std::env::set_var("KAT_IT_GROQ", "groq");
    std::env::set_var("KAT_IT_KALSHI_KEY", "key");
    std::env::set_var("KAT_IT_KALSHI_PEM", "pem");
    let names = CredentialsConfig {
        groq_key_env: "KAT_IT_GROQ".into(),
        kalshi_api_key_env: "KAT_IT_KALSHI_KEY".into(),
        kalshi_private_key_env: "KAT_IT_KALSHI_PEM".into(),
    };
    let credentials = names.from_env().unwrap();

    assert!(panel.configure(&credentials).await.unwrap().configured);
    assert!(*backend.state.configured.lock().unwrap());

    let missing = CredentialsConfig {
        groq_key_env: "KAT_IT_UNSET_GROQ".into(),
        ..names
    };
    let Err(err) = missing.from_env() else {
        panic!("unset variable resolved");
    };
    assert!(err.to_string().contains("KAT_IT_UNSET_GROQ"));
}

#[tokio::test]
async fn test_trades_normalized_from_csv_rows() {
    let backend = MockBackend::start().await;
    let trades = kat::feed::trades::normalize_all(pipeline(&backend).trades().await.unwrap());

    assert_eq!(trades.len(), 3);
    assert_eq!(trades[0].signal, 1.0);
    assert!((trades[0].conf - 0.91).abs() < 1e-9);
    assert_eq!(trades[1].signal, -1.0);
    assert_eq!(trades[2].signal, 0.0);
    assert_eq!(trades[2].conf, 0.0);
}

#[tokio::test]
async fn test_unreachable_backend_is_error() {
    let api = PipelineClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
    assert_err!(api.status().await);
}

// ---------------------------------------------------------------------------
// Event streams
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_log_stream_closes_without_reconnect() {
    let backend = MockBackend::start().await;
    let api = pipeline(&backend);
    let cancel = CancellationToken::new();

    let logs = StreamView::spawn(
        "logs",
        200,
        Reconnect::Never,
        cancel.clone(),
        move || {
            let api = api.clone();
            async move { api.logs().await }
        },
        parse_log_line,
    );

    assert!(eventually(|| logs.items().len() == 3).await);
    assert_eq!(logs.items()[0], "[order] KXFED-25 yes @ 45");
    assert!(eventually(|| logs.is_stopped()).await);
    assert_eq!(logs.connect_count(), 1);
}

#[tokio::test]
async fn test_news_stream_reconnects_and_skips_malformed() {
    let backend = MockBackend::start().await;
    let api = pipeline(&backend);
    let cancel = CancellationToken::new();

    let news = StreamView::spawn(
        "news",
        50,
        Reconnect::After(Duration::from_millis(50)),
        cancel.clone(),
        move || {
            let api = api.clone();
            async move { api.news_stream().await }
        },
        parse_decision,
    );

    assert!(eventually(|| news.items().len() >= 2).await);
    // Each connection contributes exactly one decision; the malformed event is dropped.
    let items = news.items();
    assert!(items.iter().all(|d| d.ticker == "KXFED-25" && d.final_decision == "1"));
    assert!(backend.state.news_connects.load(Ordering::SeqCst) >= 2);

    cancel.cancel();
    assert!(eventually(|| news.is_stopped()).await);
}

#[tokio::test]
async fn test_live_views_against_backend() {
    let backend = MockBackend::start().await;
    let cancel = CancellationToken::new();
    let views = LiveViews::spawn(pipeline(&backend), &FeedConfig::default(), &cancel);

    assert!(eventually(|| views.status.has_data() && views.logs.items().len() == 3).await);
    let text = views.render(10);
    assert!(text.contains("PIPELINE PAUSED"));
    assert!(text.contains("[boot] pipeline ready"));

    cancel.cancel();
}

// ---------------------------------------------------------------------------
// Dashboard API
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dashboard_reads() {
    let backend = MockBackend::start().await;
    let api = DashboardClient::new(backend.api_base(), TIMEOUT).unwrap();

    assert_eq!(api.news(10).await.unwrap().len(), 10);
    let tickers = api.tickers().await.unwrap();
    assert_eq!(tickers[0].spread(), 10);
    assert_eq!(tickers[1].last_updated, Some(1_700_000_000.0));

    let score = api.sentiment("Apple beats earnings").await.unwrap();
    assert_eq!(score.label, "positive");
}

#[tokio::test]
async fn test_order_outcomes() {
    let backend = MockBackend::start().await;
    let api = DashboardClient::new(backend.api_base(), TIMEOUT).unwrap();

    let ok = assert_ok!(api.place_order(&order("KXFED-25")).await);
    assert!(ok.success);
    assert_eq!(ok.order_id.as_deref(), Some("ord-42"));
    let sent = backend.state.last_order.lock().unwrap().clone().unwrap();
    assert_eq!(sent["side"], "yes");
    assert_eq!(sent["count"], 2);

    let rejected = api.place_order(&order("REJECT")).await.unwrap();
    assert!(!rejected.success);
    assert_eq!(rejected.error.as_deref(), Some("Price outside allowed range"));

    let boom = api.place_order(&order("BOOM")).await.unwrap();
    assert!(!boom.success);
    assert_eq!(boom.error.as_deref(), Some("Internal Server Error"));
}

#[tokio::test]
async fn test_non_2xx_read_is_backend_error() {
    let backend = MockBackend::start().await;
    // No such route on the mock: 404.
    let api = DashboardClient::new(format!("{}/missing", backend.api_base()), TIMEOUT).unwrap();
    let err = api.tickers().await.unwrap_err();
    match err.downcast_ref::<KatError>() {
        Some(KatError::Backend { status, .. }) => assert_eq!(*status, 404),
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_order_form_refreshes_tickers() {
    let backend = MockBackend::start().await;
    let api: Arc<dyn DashboardApi> =
        Arc::new(DashboardClient::new(backend.api_base(), TIMEOUT).unwrap());
    let queries = QueryClient::new(api.clone(), Duration::from_secs(10));

    queries.tickers().await;
    queries.tickers().await;
    assert_eq!(backend.state.ticker_hits.load(Ordering::SeqCst), 1);

    let mut form = OrderForm::new();
    form.ticker = "KXFED-25".into();
    assert_eq!(form.submit(api.as_ref(), &queries).await, FormStatus::Success);
    assert_eq!(form.message(), "Order placed. ID: ord-42");

    queries.tickers().await;
    assert_eq!(backend.state.ticker_hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_overview_banner_with_backend_down() {
    let api: Arc<dyn DashboardApi> =
        Arc::new(DashboardClient::new("http://127.0.0.1:9/api", Duration::from_millis(500)).unwrap());
    let queries = QueryClient::new(api, Duration::from_secs(10));

    let text = OverviewPage::load(&queries, 10).await.render();
    assert!(text.contains(BACKEND_DOWN_BANNER));
}

// ---------------------------------------------------------------------------
// Proxy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_proxy_forwards_reads_orders_and_streams() {
    let backend = MockBackend::start().await;
    let shutdown = CancellationToken::new();
    let state = Arc::new(ProxyState::new(backend.api_base()).unwrap());
    let proxy = spawn_proxy(state, "127.0.0.1:0".parse().unwrap(), shutdown.clone())
        .await
        .unwrap();
    let proxied = format!("http://{}/api/proxy", proxy.addr);

    // Dashboard client pointed at the proxy instead of the backend.
    let api = DashboardClient::new(proxied.clone(), TIMEOUT).unwrap();
    assert_eq!(api.news(5).await.unwrap().len(), 5);
    assert_eq!(api.tickers().await.unwrap().len(), 2);
    let rejected = api.place_order(&order("REJECT")).await.unwrap();
    assert_eq!(rejected.error.as_deref(), Some("Price outside allowed range"));

    let resp = reqwest::get(format!("{proxied}/logs")).await.unwrap();
    assert_eq!(resp.headers()["x-kat-proxy"], "1");
    let events: Vec<_> = event_stream(resp).collect().await;
    let lines: Vec<String> = events.into_iter().map(|e| e.unwrap().data).collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "[boot] pipeline ready");

    shutdown.cancel();
    assert_ok!(proxy.task.await.unwrap());
}
