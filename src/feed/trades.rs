//! Executed-trade rows.
//!
//! `/api/trades` serves rows of the pipeline's CSV output, so column names
//! drifted over time (`final_signal` vs `signal`, `finbert_score` vs `conf`)
//! and every value may arrive as a string. [`TradeRow`] accepts all of that;
//! [`TradeRow::normalize`] resolves it into a [`Trade`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{loose_f64, loose_string};

/// A trade row as the backend sends it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeRow {
    #[serde(default, deserialize_with = "loose_string")]
    pub headline: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub ticker: String,
    #[serde(default, deserialize_with = "loose_f64")]
    pub final_signal: Option<f64>,
    #[serde(default, deserialize_with = "loose_f64")]
    pub signal: Option<f64>,
    #[serde(default, deserialize_with = "loose_f64")]
    pub finbert_score: Option<f64>,
    #[serde(default, deserialize_with = "loose_f64")]
    pub conf: Option<f64>,
    #[serde(default, deserialize_with = "loose_string")]
    pub timestamp: String,
}

/// A trade ready for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub headline: String,
    pub ticker: String,
    /// +1 buy YES, -1 buy NO, 0 no position.
    pub signal: f64,
    /// Model confidence in `0.0..=1.0`.
    pub conf: f64,
    pub timestamp: String,
}

impl TradeRow {
    /// Signal prefers `final_signal`, then `signal`, then 0.
    /// Confidence prefers `finbert_score`, then `conf`, then 0.
    pub fn normalize(self) -> Trade {
        Trade {
            signal: self.final_signal.or(self.signal).unwrap_or(0.0),
            conf: self.finbert_score.or(self.conf).unwrap_or(0.0),
            headline: self.headline,
            ticker: self.ticker,
            timestamp: self.timestamp,
        }
    }
}

pub fn normalize_all(rows: Vec<TradeRow>) -> Vec<Trade> {
    rows.into_iter().map(TradeRow::normalize).collect()
}

impl Trade {
    pub fn direction(&self) -> &'static str {
        if self.signal > 0.0 {
            "▲ YES"
        } else if self.signal < 0.0 {
            "▼  NO"
        } else {
            "·   --"
        }
    }
}

impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<9} {:<6} {:<18} {:<44} {:>3.0}%",
            self.timestamp,
            self.direction(),
            truncate(&self.ticker, 18),
            truncate(&self.headline, 44),
            self.conf * 100.0
        )
    }
}

/// Cut to `max` chars, marking the cut with an ellipsis.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
