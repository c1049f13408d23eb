//! Pipeline control API client (`/api/*`).
//!
//! Request/response calls carry a per-request timeout. Event streams do not:
//! they are meant to stay open for the life of the view.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use super::sse::{event_stream, EventStream};
use super::{ensure_success, join_url, PipelineApi};
use crate::config::BackendConfig;
use crate::feed::trades::TradeRow;
use crate::types::{ConfigureResponse, ControlAck, Credentials, PipelineStatus, Thresholds};

/// HTTP client for the pipeline backend.
#[derive(Clone)]
pub struct PipelineClient {
    http: Client,
    base: String,
    timeout: Duration,
}

impl PipelineClient {
    pub fn new(base: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(timeout)
            .user_agent(concat!("kat/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client for pipeline API")?;

        Ok(Self {
            http,
            base: base.into(),
            timeout,
        })
    }

    pub fn from_config(cfg: &BackendConfig) -> Result<Self> {
        Self::new(cfg.api_base.clone(), cfg.fetch_timeout())
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    // -- Internal helpers ------------------------------------------------

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = join_url(&self.base, path);
        debug!(url = %url, "GET");

        let resp = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;
        let resp = ensure_success(path, resp).await?;

        resp.json()
            .await
            .with_context(|| format!("Failed to parse {path} response"))
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = join_url(&self.base, path);
        debug!(url = %url, "POST");

        let resp = self
            .http
            .post(&url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path} failed"))?;
        let resp = ensure_success(path, resp).await?;

        resp.json()
            .await
            .with_context(|| format!("Failed to parse {path} response"))
    }

    async fn open_stream(&self, path: &str) -> Result<EventStream> {
        let url = join_url(&self.base, path);
        let resp = self
            .http
            .get(&url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .with_context(|| format!("Failed to open event stream {path}"))?;
        let resp = ensure_success(path, resp).await?;

        debug!(url = %url, "Event stream open");
        Ok(event_stream(resp))
    }
}

#[async_trait]
impl PipelineApi for PipelineClient {
    async fn status(&self) -> Result<PipelineStatus> {
        self.get_json("/api/status").await
    }

    async fn trades(&self) -> Result<Vec<TradeRow>> {
        self.get_json("/api/trades").await
    }

    async fn configure(&self, credentials: &Credentials) -> Result<ConfigureResponse> {
        let resp: ConfigureResponse = self.post_json("/api/config", &credentials.to_body()).await?;
        info!(configured = resp.configured, "Credentials sent to backend");
        Ok(resp)
    }

    async fn set_thresholds(&self, thresholds: Thresholds) -> Result<Thresholds> {
        let resp: Thresholds = self.post_json("/api/thresholds", &thresholds).await?;
        info!(
            max_buy_price = resp.max_buy_price,
            profit_target_cents = resp.profit_target_cents,
            "Thresholds updated"
        );
        Ok(resp)
    }

    async fn start(&self) -> Result<ControlAck> {
        let ack: ControlAck = self.post_json("/api/start", &serde_json::json!({})).await?;
        info!(status = %ack.status, "Pipeline start requested");
        Ok(ack)
    }

    async fn pause(&self) -> Result<ControlAck> {
        let ack: ControlAck = self.post_json("/api/pause", &serde_json::json!({})).await?;
        info!(status = %ack.status, "Pipeline pause requested");
        Ok(ack)
    }

    async fn logs(&self) -> Result<EventStream> {
        self.open_stream("/api/logs").await
    }

    async fn news_stream(&self) -> Result<EventStream> {
        self.open_stream("/api/news/stream").await
    }
}
