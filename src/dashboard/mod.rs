//! Dashboard app: overview, markets, news and orders pages.
//!
//! Pages read through a [`QueryClient`], a small query cache in the manner
//! of a browser data-fetching cache: each query key holds its last data and
//! last error, answers from cache while fresh (10s by default), never
//! retries, and can be invalidated to force a refetch. Unlike the marketing
//! site, the dashboard tells the user when the backend is unreachable.

pub mod orders;
pub mod proxy;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::DashboardApi;
use crate::config::DashboardConfig;
use crate::feed::timer_period;
use crate::feed::trades::truncate;
use crate::types::{NewsArticle, TickerSnapshot};

pub const BACKEND_DOWN_BANNER: &str =
    "Backend not reachable. Start it with: uvicorn backend.main:app --reload --port 8000";

/// Overview lists show this many rows.
const OVERVIEW_ROWS: usize = 5;

// ---------------------------------------------------------------------------
// Query cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    News(usize),
    Tickers,
}

/// What a page sees for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySnapshot<T> {
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> QuerySnapshot<T> {
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.error.is_none()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone)]
struct Entry<T> {
    data: Option<T>,
    error: Option<String>,
    fetched_at: Option<Instant>,
    invalidated: bool,
}

impl<T> Default for Entry<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            fetched_at: None,
            invalidated: false,
        }
    }
}

impl<T: Clone> Entry<T> {
    fn is_fresh(&self, stale_time: Duration) -> bool {
        !self.invalidated
            && self.error.is_none()
            && self.fetched_at.is_some_and(|t| t.elapsed() < stale_time)
    }

    fn snapshot(&self) -> QuerySnapshot<T> {
        QuerySnapshot {
            data: self.data.clone(),
            error: self.error.clone(),
        }
    }
}

#[derive(Default)]
struct Cache {
    news: HashMap<usize, Entry<Vec<NewsArticle>>>,
    tickers: Entry<Vec<TickerSnapshot>>,
    fetches: u64,
}

/// Shared query cache in front of the dashboard API.
#[derive(Clone)]
pub struct QueryClient {
    api: Arc<dyn DashboardApi>,
    cache: Arc<Mutex<Cache>>,
    stale_time: Duration,
}

impl QueryClient {
    pub fn new(api: Arc<dyn DashboardApi>, stale_time: Duration) -> Self {
        Self {
            api,
            cache: Arc::new(Mutex::new(Cache::default())),
            stale_time,
        }
    }

    pub fn from_config(api: Arc<dyn DashboardApi>, cfg: &DashboardConfig) -> Self {
        Self::new(api, Duration::from_millis(cfg.stale_time_ms))
    }

    pub fn api(&self) -> &Arc<dyn DashboardApi> {
        &self.api
    }

    fn lock(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of network fetches issued so far.
    pub fn fetch_count(&self) -> u64 {
        self.lock().fetches
    }

    /// Tickers, from cache when fresh.
    pub async fn tickers(&self) -> QuerySnapshot<Vec<TickerSnapshot>> {
        {
            let cache = self.lock();
            if cache.tickers.is_fresh(self.stale_time) {
                return cache.tickers.snapshot();
            }
        }
        self.refetch_tickers().await
    }

    /// News for `limit`, from cache when fresh. Each limit is its own query.
    pub async fn news(&self, limit: usize) -> QuerySnapshot<Vec<NewsArticle>> {
        {
            let cache = self.lock();
            if let Some(entry) = cache.news.get(&limit) {
                if entry.is_fresh(self.stale_time) {
                    return entry.snapshot();
                }
            }
        }
        self.refetch_news(limit).await
    }

    pub async fn refetch_tickers(&self) -> QuerySnapshot<Vec<TickerSnapshot>> {
        self.lock().fetches += 1;
        let result = self.api.tickers().await;
        let mut cache = self.lock();
        store(&mut cache.tickers, result, "tickers");
        cache.tickers.snapshot()
    }

    pub async fn refetch_news(&self, limit: usize) -> QuerySnapshot<Vec<NewsArticle>> {
        self.lock().fetches += 1;
        let result = self.api.news(limit).await;
        let mut cache = self.lock();
        let entry = cache.news.entry(limit).or_default();
        store(entry, result, "news");
        entry.snapshot()
    }

    /// Mark a query stale so its next read goes to the network.
    pub fn invalidate(&self, key: QueryKey) {
        debug!(?key, "Invalidating query");
        let mut cache = self.lock();
        match key {
            QueryKey::Tickers => cache.tickers.invalidated = true,
            QueryKey::News(limit) => {
                if let Some(entry) = cache.news.get_mut(&limit) {
                    entry.invalidated = true;
                }
            }
        }
    }

    /// Refetch tickers every `every` until cancelled.
    pub fn spawn_ticker_refresh(&self, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(timer_period(every));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        client.refetch_tickers().await;
                    }
                }
            }
        })
    }
}

/// A failed fetch keeps the previous data alongside the error.
fn store<T>(entry: &mut Entry<T>, result: anyhow::Result<T>, query: &str) {
    entry.fetched_at = Some(Instant::now());
    entry.invalidated = false;
    match result {
        Ok(data) => {
            entry.data = Some(data);
            entry.error = None;
        }
        Err(e) => {
            debug!(query, error = %e, "Query failed");
            entry.error = Some(format!("{e:#}"));
        }
    }
}

// ---------------------------------------------------------------------------
// Pages
// ---------------------------------------------------------------------------

/// Overview page: first few tickers and headlines plus the backend banner.
pub struct OverviewPage {
    pub tickers: QuerySnapshot<Vec<TickerSnapshot>>,
    pub news: QuerySnapshot<Vec<NewsArticle>>,
}

impl OverviewPage {
    pub async fn load(client: &QueryClient, news_limit: usize) -> Self {
        let (news, tickers) = tokio::join!(client.news(news_limit), client.tickers());
        Self { tickers, news }
    }

    pub fn backend_down(&self) -> bool {
        self.news.is_error() || self.tickers.is_error()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Dashboard\nNews-driven prediction market overview");
        if self.backend_down() {
            let _ = writeln!(out, "\n⚠ {BACKEND_DOWN_BANNER}");
        }

        let _ = writeln!(out, "\nLive Tickers");
        let tickers = self.tickers.data.as_deref().unwrap_or_default();
        if self.tickers.is_loading() {
            let _ = writeln!(out, "  Loading tickers…");
        } else if tickers.is_empty() {
            let _ = writeln!(out, "  No tickers. Start the backend and add a watchlist.");
        } else {
            for t in tickers.iter().take(OVERVIEW_ROWS) {
                let _ = writeln!(out, "  {:<28} {}¢ / {}¢", t.market_ticker, t.yes_bid, t.yes_ask);
            }
        }

        let _ = writeln!(out, "\nLatest News");
        let news = self.news.data.as_deref().unwrap_or_default();
        if self.news.is_loading() {
            let _ = writeln!(out, "  Loading news…");
        } else if news.is_empty() {
            let _ = writeln!(out, "  No articles. Start the backend and RSS pipeline.");
        } else {
            for a in news.iter().take(OVERVIEW_ROWS) {
                let _ = writeln!(out, "  {}\n    {} · {}", truncate(&a.headline, 80), a.source, a.date);
            }
        }
        out
    }
}

/// Markets page: every watchlist ticker as a card.
pub struct MarketsPage {
    pub tickers: QuerySnapshot<Vec<TickerSnapshot>>,
}

impl MarketsPage {
    pub async fn load(client: &QueryClient) -> Self {
        Self {
            tickers: client.tickers().await,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Markets\nLive bid/ask from your watchlist (updates every 5s)\n");
        let tickers = self.tickers.data.as_deref().unwrap_or_default();
        if self.tickers.is_loading() {
            let _ = writeln!(out, "Loading tickers…");
        }
        if self.tickers.is_error() {
            let _ = writeln!(out, "Failed to load tickers. Is the backend running on port 8000?");
        }
        if !self.tickers.is_loading() && !self.tickers.is_error() && tickers.is_empty() {
            let _ = writeln!(out, "No tickers in watchlist. Configure watchlist in the backend.");
        }
        for t in tickers {
            let _ = writeln!(out, "{t}");
        }
        out
    }
}

/// News page: full article cards with sentiment badges.
pub struct NewsPage {
    pub articles: QuerySnapshot<Vec<NewsArticle>>,
}

impl NewsPage {
    pub async fn load(client: &QueryClient, limit: usize) -> Self {
        Self {
            articles: client.news(limit).await,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "News Feed\nHeadlines from RSS pipeline; sentiment from backend when available\n");
        let articles = self.articles.data.as_deref().unwrap_or_default();
        if self.articles.is_loading() {
            let _ = writeln!(out, "Loading news…");
        }
        if self.articles.is_error() {
            let _ = writeln!(out, "Failed to load news. Is the backend running on port 8000?");
        }
        if !self.articles.is_loading() && !self.articles.is_error() && articles.is_empty() {
            let _ = writeln!(out, "No articles yet. Run the RSS pipeline to ingest news.");
        }
        for a in articles {
            let badge = a.sentiment.map(|s| format!("  [{s}]")).unwrap_or_default();
            let _ = writeln!(out, "{}{badge}", a.headline);
            if !a.content_header.is_empty() {
                let _ = writeln!(out, "  {}", truncate(&a.content_header, 120));
            }
            let _ = writeln!(out, "  {} · {}", a.source, a.date);
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
