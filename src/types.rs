//! Shared types for the KAT console.
//!
//! These mirror the JSON shapes the trading backend returns. They are plain
//! data-transfer types: the backend owns the semantics, the console only
//! renders them.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Dashboard: news, tickers, orders
// ---------------------------------------------------------------------------

/// A headline ingested by the backend's RSS pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsArticle {
    #[serde(default)]
    pub source: String,
    pub headline: String,
    #[serde(default)]
    pub content_header: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub timestamp: f64,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub sentiment_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "POSITIVE"),
            Sentiment::Negative => write!(f, "NEGATIVE"),
            Sentiment::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Bid/ask snapshot for one watchlist market, prices in cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSnapshot {
    pub market_ticker: String,
    pub yes_bid: i64,
    pub yes_ask: i64,
    #[serde(default)]
    pub last_updated: Option<f64>,
}

impl TickerSnapshot {
    /// Spread in cents between the YES ask and the YES bid.
    pub fn spread(&self) -> i64 {
        self.yes_ask - self.yes_bid
    }
}

impl fmt::Display for TickerSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<28} bid {:>3}¢  ask {:>3}¢  spread {}¢",
            self.market_ticker,
            self.yes_bid,
            self.yes_ask,
            self.spread()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Yes,
    No,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Yes => write!(f, "yes"),
            OrderSide::No => write!(f, "no"),
        }
    }
}

impl FromStr for OrderSide {
    type Err = KatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" => Ok(OrderSide::Yes),
            "no" => Ok(OrderSide::No),
            other => Err(KatError::InvalidSide(other.to_string())),
        }
    }
}

/// Limit order submitted through the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub ticker: String,
    pub side: OrderSide,
    pub count: u32,
    pub price_cents: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    #[serde(default, deserialize_with = "loose_opt_string")]
    pub order_id: Option<String>,
    #[serde(default, deserialize_with = "loose_opt_string")]
    pub error: Option<String>,
}

/// Ad-hoc FinBERT score returned by `/sentiment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: String,
    pub score: f64,
}

// ---------------------------------------------------------------------------
// Pipeline control API
// ---------------------------------------------------------------------------

const DEFAULT_MAX_BUY_PRICE: i64 = 60;
const DEFAULT_PROFIT_TARGET_CENTS: i64 = 7;

fn default_max_buy_price() -> i64 {
    DEFAULT_MAX_BUY_PRICE
}

fn default_profit_target_cents() -> i64 {
    DEFAULT_PROFIT_TARGET_CENTS
}

/// Run state of the backend pipeline (`GET /api/status`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStatus {
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub configured: bool,
    #[serde(default = "default_max_buy_price")]
    pub max_buy_price: i64,
    #[serde(default = "default_profit_target_cents")]
    pub profit_target_cents: i64,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self {
            running: false,
            configured: false,
            max_buy_price: DEFAULT_MAX_BUY_PRICE,
            profit_target_cents: DEFAULT_PROFIT_TARGET_CENTS,
        }
    }
}

/// Trading thresholds, both in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    pub max_buy_price: i64,
    pub profit_target_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigureResponse {
    #[serde(default)]
    pub status: String,
    pub configured: bool,
}

/// Acknowledgement from `/api/start` and `/api/pause`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlAck {
    #[serde(default)]
    pub status: String,
}

/// One scored headline from `/api/news/stream`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    #[serde(default)]
    pub headline: String,
    #[serde(default)]
    pub ticker: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub final_decision: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub timestamp: String,
}

/// API credentials forwarded to `/api/config`.
///
/// Values are kept behind `SecretString` so they never end up in logs.
pub struct Credentials {
    pub groq_key: SecretString,
    pub kalshi_api_key: SecretString,
    pub kalshi_private_key: SecretString,
}

impl Credentials {
    pub fn new(groq_key: String, kalshi_api_key: String, kalshi_private_key: String) -> Self {
        Self {
            groq_key: SecretString::new(groq_key),
            kalshi_api_key: SecretString::new(kalshi_api_key),
            kalshi_private_key: SecretString::new(kalshi_private_key),
        }
    }

    /// The backend only reports `configured` when all three keys are present.
    pub fn is_complete(&self) -> bool {
        [&self.groq_key, &self.kalshi_api_key, &self.kalshi_private_key]
            .iter()
            .all(|s| !s.expose_secret().trim().is_empty())
    }

    /// Request body for `POST /api/config`, values trimmed.
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "groq_key": self.groq_key.expose_secret().trim(),
            "kalshi_api_key": self.kalshi_api_key.expose_secret().trim(),
            "kalshi_private_key": self.kalshi_private_key.expose_secret().trim(),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("complete", &self.is_complete())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Loose JSON helpers
// ---------------------------------------------------------------------------

/// The backend serves CSV rows as JSON, so numeric columns arrive as strings.
/// Accepts a number or a numeric string; empty or unparseable values are `None`.
pub fn loose_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(serde_json::Value::Bool(b)) => Some(if b { 1.0 } else { 0.0 }),
        _ => None,
    })
}

/// Any JSON scalar as a string; null or missing becomes empty.
pub fn loose_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    })
}

/// Like [`loose_string`], but empty becomes `None`.
pub fn loose_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = loose_string(deserializer)?;
    Ok((!s.is_empty()).then_some(s))
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for KAT.
#[derive(Debug, thiserror::Error)]
pub enum KatError {
    #[error("Backend error ({endpoint}): HTTP {status}: {body}")]
    Backend {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Malformed payload on {stream}: {message}")]
    MalformedPayload { stream: String, message: String },

    #[error("{0}")]
    Validation(String),

    #[error("Invalid order side: {0} (expected yes or no)")]
    InvalidSide(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_spread() {
        let t = TickerSnapshot {
            market_ticker: "KXFED".into(),
            yes_bid: 45,
            yes_ask: 55,
            last_updated: None,
        };
        assert_eq!(t.spread(), 10);
        assert!(format!("{t}").contains("spread 10¢"));
    }

    #[test]
    fn test_order_side_parse() {
        assert_eq!("YES".parse::<OrderSide>().unwrap(), OrderSide::Yes);
        assert_eq!(" no ".parse::<OrderSide>().unwrap(), OrderSide::No);
        assert!("maybe".parse::<OrderSide>().is_err());
    }

    #[test]
    fn test_order_request_wire_shape() {
        let order = OrderRequest {
            ticker: "KXFED".into(),
            side: OrderSide::No,
            count: 2,
            price_cents: 40,
        };
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["side"], "no");
        assert_eq!(json["price_cents"], 40);
    }

    #[test]
    fn test_status_defaults_when_fields_missing() {
        let status: PipelineStatus = serde_json::from_str(r#"{"running":true}"#).unwrap();
        assert!(status.running);
        assert!(!status.configured);
        assert_eq!(status.max_buy_price, 60);
        assert_eq!(status.profit_target_cents, 7);
    }

    #[test]
    fn test_news_article_optional_sentiment() {
        let a: NewsArticle = serde_json::from_str(
            r#"{"source":"Demo","headline":"H","content_header":"","date":"d","timestamp":1,"link":"l","sentiment":"negative"}"#,
        )
        .unwrap();
        assert_eq!(a.sentiment, Some(Sentiment::Negative));
        assert!(a.sentiment_score.is_none());
    }

    #[test]
    fn test_decision_accepts_numeric_fields() {
        let d: Decision = serde_json::from_str(
            r#"{"headline":"Fed cuts","ticker":"KXFED","final_decision":-1,"timestamp":1700000000}"#,
        )
        .unwrap();
        assert_eq!(d.final_decision, "-1");
        assert_eq!(d.timestamp, "1700000000");
    }

    #[test]
    fn test_order_result_numeric_id() {
        let r: OrderResult = serde_json::from_str(r#"{"success":true,"order_id":12345}"#).unwrap();
        assert_eq!(r.order_id.as_deref(), Some("12345"));
        assert!(r.error.is_none());
    }

    #[test]
    fn test_credentials_completeness() {
        let full = Credentials::new("g".into(), "k".into(), "p".into());
        assert!(full.is_complete());
        let partial = Credentials::new("g".into(), "   ".into(), "p".into());
        assert!(!partial.is_complete());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let c = Credentials::new("groq-secret".into(), "k".into(), "p".into());
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("groq-secret"));
    }

    #[test]
    fn test_credentials_body_trims() {
        let c = Credentials::new(" g ".into(), "k".into(), "p\n".into());
        let body = c.to_body();
        assert_eq!(body["groq_key"], "g");
        assert_eq!(body["kalshi_private_key"], "p");
    }

    #[test]
    fn test_error_display() {
        let e = KatError::Backend {
            endpoint: "/api/status".into(),
            status: 502,
            body: "bad gateway".into(),
        };
        assert!(e.to_string().contains("502"));
    }
}
