//! Dashboard API client (`/news`, `/tickers`, `/sentiment`, `/orders`).
//!
//! Every call is bounded by the fetch timeout (5s by default).

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ensure_success, join_url, DashboardApi};
use crate::config::BackendConfig;
use crate::types::{NewsArticle, OrderRequest, OrderResult, SentimentScore, TickerSnapshot};

/// HTTP client for the dashboard data API.
#[derive(Clone)]
pub struct DashboardClient {
    http: Client,
    base: String,
}

impl DashboardClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("kat-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for dashboard API")?;

        Ok(Self {
            http,
            base: base.into(),
        })
    }

    pub fn from_config(cfg: &BackendConfig) -> Result<Self> {
        Self::new(cfg.dashboard_base.clone(), cfg.fetch_timeout())
    }
}

/// Build the form-facing result of an order submission.
///
/// A rejection carries the backend's `detail`, or the status text when there
/// is none. An accepted order is `success: true` overlaid with the body's own
/// fields.
pub fn order_result(status: StatusCode, body: Value) -> OrderResult {
    if !status.is_success() {
        let detail = match body.get("detail") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(Value::String(_)) => None,
            Some(other) => Some(other.to_string()),
        };
        let error = detail.or_else(|| status.canonical_reason().map(str::to_string));
        return OrderResult {
            success: false,
            order_id: None,
            error,
        };
    }

    let mut merged = serde_json::Map::new();
    merged.insert("success".into(), Value::Bool(true));
    if let Value::Object(fields) = body {
        merged.extend(fields);
    }
    serde_json::from_value(Value::Object(merged)).unwrap_or_else(|e| {
        warn!(error = %e, "Unexpected order response shape");
        OrderResult {
            success: true,
            order_id: None,
            error: None,
        }
    })
}

#[async_trait]
impl DashboardApi for DashboardClient {
    async fn news(&self, limit: usize) -> Result<Vec<NewsArticle>> {
        let url = join_url(&self.base, "/news");
        debug!(url = %url, limit, "Fetching news");

        let resp = self
            .http
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await
            .context("Failed to fetch news")?;
        let resp = ensure_success("/news", resp).await?;

        resp.json().await.context("Failed to parse news response")
    }

    async fn tickers(&self) -> Result<Vec<TickerSnapshot>> {
        let url = join_url(&self.base, "/tickers");
        debug!(url = %url, "Fetching tickers");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch tickers")?;
        let resp = ensure_success("/tickers", resp).await?;

        resp.json().await.context("Failed to parse tickers response")
    }

    async fn sentiment(&self, text: &str) -> Result<SentimentScore> {
        let url = join_url(&self.base, "/sentiment");
        let resp = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await
            .context("Failed to get sentiment")?;
        let resp = ensure_success("/sentiment", resp).await?;

        resp.json().await.context("Failed to parse sentiment response")
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult> {
        let url = join_url(&self.base, "/orders");
        info!(
            ticker = %order.ticker,
            side = %order.side,
            count = order.count,
            price_cents = order.price_cents,
            "Placing order"
        );

        let resp = self
            .http
            .post(&url)
            .json(order)
            .send()
            .await
            .context("Order request failed")?;

        let status = resp.status();
        // An unreadable body counts as an empty object.
        let body = resp
            .json::<Value>()
            .await
            .unwrap_or_else(|_| Value::Object(Default::default()));

        let result = order_result(status, body);
        if result.success {
            info!(order_id = ?result.order_id, "Order accepted");
        } else {
            warn!(status = status.as_u16(), error = ?result.error, "Order rejected");
        }
        Ok(result)
    }
}
