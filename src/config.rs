//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section has defaults, so a missing file or a partial table still yields a
//! usable configuration. Secrets are referenced by env-var name and resolved
//! at runtime.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::types::{Credentials, KatError};

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub opener: OpenerConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub dashboard: DashboardConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BackendConfig {
    /// Pipeline control backend (serves `/api/status`, `/api/logs`, ...).
    pub api_base: String,
    /// Dashboard backend (serves `/news`, `/tickers`, `/sentiment`, `/orders`).
    pub dashboard_base: String,
    pub fetch_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8000".into(),
            dashboard_base: "http://127.0.0.1:8000/api".into(),
            fetch_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OpenerConfig {
    pub glitch_after_ms: u64,
    pub completion_grace_ms: u64,
    pub frame_interval_ms: u64,
    pub trend_lines: usize,
    pub ticker_labels: usize,
    pub width: u32,
    pub height: u32,
    /// Fixed RNG seed; random when absent.
    pub seed: Option<u64>,
}

impl Default for OpenerConfig {
    fn default() -> Self {
        Self {
            glitch_after_ms: 3_800,
            completion_grace_ms: 80,
            frame_interval_ms: 16,
            trend_lines: 40,
            ticker_labels: 22,
            width: 1280,
            height: 720,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FeedConfig {
    pub status_interval_ms: u64,
    pub trades_interval_ms: u64,
    pub tickers_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub demo_interval_ms: u64,
    pub log_cap: usize,
    pub news_cap: usize,
    pub demo_cap: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            status_interval_ms: 3_000,
            trades_interval_ms: 10_000,
            tickers_interval_ms: 5_000,
            reconnect_delay_ms: 3_000,
            demo_interval_ms: 2_800,
            log_cap: crate::feed::LOG_CAP,
            news_cap: crate::feed::NEWS_CAP,
            demo_cap: crate::feed::DEMO_TRADES_CAP,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub proxy_port: u16,
    pub stale_time_ms: u64,
    pub news_limit: usize,
    pub overview_news_limit: usize,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            proxy_port: 3_000,
            stale_time_ms: 10_000,
            news_limit: 50,
            overview_news_limit: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CredentialsConfig {
    pub groq_key_env: String,
    pub kalshi_api_key_env: String,
    pub kalshi_private_key_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            groq_key_env: "GROQ_API_KEY".into(),
            kalshi_api_key_env: "KALSHI_API_KEY".into(),
            kalshi_private_key_env: "KALSHI_PRIVATE_KEY".into(),
        }
    }
}

impl CredentialsConfig {
    /// Resolve the three configured env vars into credentials. Values are
    /// passed through as-is; the backend decides what "configured" means.
    pub fn from_env(&self) -> Result<Credentials> {
        Ok(Credentials::new(
            AppConfig::resolve_env(&self.groq_key_env)?,
            AppConfig::resolve_env(&self.kalshi_api_key_env)?,
            AppConfig::resolve_env(&self.kalshi_private_key_env)?,
        ))
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall a timer or every request.
    pub fn validate(&self) -> Result<(), KatError> {
        let periods = [
            ("backend.fetch_timeout_ms", self.backend.fetch_timeout_ms),
            ("opener.frame_interval_ms", self.opener.frame_interval_ms),
            ("feed.status_interval_ms", self.feed.status_interval_ms),
            ("feed.trades_interval_ms", self.feed.trades_interval_ms),
            ("feed.tickers_interval_ms", self.feed.tickers_interval_ms),
            ("feed.demo_interval_ms", self.feed.demo_interval_ms),
        ];
        if let Some((key, _)) = periods.iter().find(|(_, ms)| *ms == 0) {
            return Err(KatError::Config(format!("{key} must be greater than zero")));
        }
        Ok(())
    }

    /// Load `path` if it exists, otherwise fall back to defaults. Env
    /// overrides are applied in both cases.
    pub fn load_or_default(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::load(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// `KAT_API_URL` and `KAT_DASHBOARD_API_URL` take precedence over the file.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("KAT_API_URL") {
            if !url.trim().is_empty() {
                self.backend.api_base = url.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(url) = std::env::var("KAT_DASHBOARD_API_URL") {
            if !url.trim().is_empty() {
                self.backend.dashboard_base = url.trim().trim_end_matches('/').to_string();
            }
        }
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

impl BackendConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl FeedConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    pub fn trades_interval(&self) -> Duration {
        Duration::from_millis(self.trades_interval_ms)
    }

    pub fn tickers_interval(&self) -> Duration {
        Duration::from_millis(self.tickers_interval_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn demo_interval(&self) -> Duration {
        Duration::from_millis(self.demo_interval_ms)
    }
}
