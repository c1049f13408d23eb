//! Backend clients.
//!
//! Two HTTP surfaces are consumed:
//! - the pipeline control API (`/api/status`, `/api/trades`, `/api/logs`, ...)
//!   used by the main site's operator panel, and
//! - the dashboard API (`/news`, `/tickers`, `/sentiment`, `/orders`),
//!   normally reached through the dashboard proxy.
//!
//! Views depend on the traits below, never on reqwest directly, so they can be
//! driven by mocks in tests.

pub mod dashboard;
pub mod pipeline;
pub mod sse;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Response;

use crate::feed::trades::TradeRow;
use crate::types::{
    ConfigureResponse, ControlAck, Credentials, KatError, NewsArticle, OrderRequest, OrderResult,
    PipelineStatus, SentimentScore, Thresholds, TickerSnapshot,
};
use sse::EventStream;

/// Pipeline control API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PipelineApi: Send + Sync {
    async fn status(&self) -> Result<PipelineStatus>;

    /// Most recent trades, newest first.
    async fn trades(&self) -> Result<Vec<TradeRow>>;

    async fn configure(&self, credentials: &Credentials) -> Result<ConfigureResponse>;

    /// Returns the thresholds the backend now holds.
    async fn set_thresholds(&self, thresholds: Thresholds) -> Result<Thresholds>;

    async fn start(&self) -> Result<ControlAck>;

    async fn pause(&self) -> Result<ControlAck>;

    /// Pipeline stdout, one line per event.
    async fn logs(&self) -> Result<EventStream>;

    /// Scored headlines, one JSON object per event.
    async fn news_stream(&self) -> Result<EventStream>;
}

/// Dashboard data API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DashboardApi: Send + Sync {
    async fn news(&self, limit: usize) -> Result<Vec<NewsArticle>>;

    async fn tickers(&self) -> Result<Vec<TickerSnapshot>>;

    async fn sentiment(&self, text: &str) -> Result<SentimentScore>;

    /// Rejections by the backend come back as `Ok` with `success == false`;
    /// only transport failures are errors.
    async fn place_order(&self, order: &OrderRequest) -> Result<OrderResult>;
}

/// Join a base URL and a path without doubling slashes.
pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Turn a non-2xx response into [`KatError::Backend`].
pub(crate) async fn ensure_success(endpoint: &str, resp: Response) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(KatError::Backend {
        endpoint: endpoint.to_string(),
        status,
        body,
    })
    .context(format!("Request to {endpoint} failed"))
}
