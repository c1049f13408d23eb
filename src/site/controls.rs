//! Operator control panel for the pipeline backend.
//!
//! Polls run state and recent trades, tails the log and news streams, and
//! sends the few write operations the backend exposes: credentials,
//! thresholds, start and pause. Failed polls leave the panel as it was; this
//! surface shows no error banner.

use anyhow::Result;
use std::fmt::Write as _;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::client::PipelineApi;
use crate::config::FeedConfig;
use crate::feed::poller::PollView;
use crate::feed::stream::{parse_decision, parse_log_line, Reconnect, StreamView};
use crate::feed::trades::{normalize_all, truncate, Trade};
use crate::types::{ConfigureResponse, Credentials, Decision, PipelineStatus, Thresholds};

/// Lowest threshold the panel will send, in cents.
pub const THRESHOLD_MIN: i64 = 1;
/// Highest threshold the panel will send, in cents.
pub const THRESHOLD_MAX: i64 = 99;

/// Clamp a threshold into the tradeable price range.
pub fn clamp_threshold(cents: i64) -> i64 {
    cents.clamp(THRESHOLD_MIN, THRESHOLD_MAX)
}

/// Write side of the panel.
#[derive(Clone)]
pub struct ControlPanel {
    api: Arc<dyn PipelineApi>,
}

impl ControlPanel {
    pub fn new(api: Arc<dyn PipelineApi>) -> Self {
        Self { api }
    }

    /// Send thresholds, each clamped to `[1, 99]` first.
    pub async fn submit_thresholds(&self, max_buy_price: i64, profit_target_cents: i64) -> Result<Thresholds> {
        let thresholds = Thresholds {
            max_buy_price: clamp_threshold(max_buy_price),
            profit_target_cents: clamp_threshold(profit_target_cents),
        };
        if thresholds.max_buy_price != max_buy_price
            || thresholds.profit_target_cents != profit_target_cents
        {
            warn!(
                requested_max_buy = max_buy_price,
                requested_profit = profit_target_cents,
                sent_max_buy = thresholds.max_buy_price,
                sent_profit = thresholds.profit_target_cents,
                "Thresholds clamped"
            );
        }
        self.api.set_thresholds(thresholds).await
    }

    pub async fn configure(&self, credentials: &Credentials) -> Result<ConfigureResponse> {
        if !credentials.is_complete() {
            info!("Some credentials are empty; backend will report unconfigured");
        }
        self.api.configure(credentials).await
    }

    pub async fn start(&self) -> Result<()> {
        self.api.start().await.map(|_| ())
    }

    pub async fn pause(&self) -> Result<()> {
        self.api.pause().await.map(|_| ())
    }

    /// Start or pause depending on the current run state.
    pub async fn toggle(&self, status: &PipelineStatus) -> Result<()> {
        if status.running {
            self.pause().await
        } else {
            self.start().await
        }
    }
}

/// Read side of the panel: every live view it shows.
pub struct LiveViews {
    pub status: PollView<PipelineStatus>,
    pub trades: PollView<Vec<Trade>>,
    pub logs: StreamView<String>,
    pub news: StreamView<Decision>,
}

impl LiveViews {
    /// Spawn all views; they stop when `cancel` fires or on drop.
    pub fn spawn(api: Arc<dyn PipelineApi>, cfg: &FeedConfig, cancel: &CancellationToken) -> Self {
        let status = {
            let api = api.clone();
            PollView::spawn_with_token("status", cfg.status_interval(), cancel.clone(), move || {
                let api = api.clone();
                async move { api.status().await }
            })
        };

        let trades = {
            let api = api.clone();
            PollView::spawn_with_token("trades", cfg.trades_interval(), cancel.clone(), move || {
                let api = api.clone();
                async move { api.trades().await.map(normalize_all) }
            })
        };

        let logs = {
            let api = api.clone();
            StreamView::spawn(
                "logs",
                cfg.log_cap,
                Reconnect::Never,
                cancel.clone(),
                move || {
                    let api = api.clone();
                    async move { api.logs().await }
                },
                parse_log_line,
            )
        };

        let news = StreamView::spawn(
            "news",
            cfg.news_cap,
            Reconnect::After(cfg.reconnect_delay()),
            cancel.clone(),
            move || {
                let api = api.clone();
                async move { api.news_stream().await }
            },
            parse_decision,
        );

        Self {
            status,
            trades,
            logs,
            news,
        }
    }

    pub fn stop(&self) {
        self.status.stop();
        self.trades.stop();
        self.logs.stop();
        self.news.stop();
    }

    /// Text rendering of the panel. Views without data render as empty.
    pub fn render(&self, log_lines: usize) -> String {
        let mut out = String::new();

        match self.status.current() {
            Some(s) => {
                let _ = writeln!(
                    out,
                    "PIPELINE {}  ·  keys {}  ·  max buy {}¢  ·  target +{}¢",
                    if s.running { "RUNNING" } else { "PAUSED" },
                    if s.configured { "configured" } else { "missing" },
                    s.max_buy_price,
                    s.profit_target_cents
                );
            }
            None => {
                let _ = writeln!(out, "PIPELINE --");
            }
        }

        let _ = writeln!(out, "\n// Recent trades");
        for trade in self.trades.current().unwrap_or_default() {
            let _ = writeln!(out, "{trade}");
        }

        let _ = writeln!(out, "\n// Decisions");
        for d in self.news.items() {
            let _ = writeln!(
                out,
                "{:<18} {:>4}  {}",
                truncate(&d.ticker, 18),
                d.final_decision,
                truncate(&d.headline, 60)
            );
        }

        let _ = writeln!(out, "\n// Logs");
        // Newest first in the buffer; print oldest first like a terminal.
        let logs = self.logs.items();
        for line in logs.iter().take(log_lines).rev() {
            let _ = writeln!(out, "{line}");
        }

        out
    }
}
