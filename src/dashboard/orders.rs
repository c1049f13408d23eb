//! Orders page: limit-order form state machine.
//!
//! `Idle → Loading → Success | Error`. An empty ticker, or a count or price
//! below 1, goes straight to `Error` without touching the network. A
//! successful order invalidates the tickers query so the markets view
//! refreshes.

use tracing::{info, warn};

use super::{QueryClient, QueryKey};
use crate::client::DashboardApi;
use crate::types::{KatError, OrderRequest, OrderResult, OrderSide, TickerSnapshot};

const DEFAULT_COUNT: i64 = 1;
const DEFAULT_PRICE_CENTS: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormStatus {
    Idle,
    Loading,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct OrderForm {
    pub ticker: String,
    pub side: OrderSide,
    pub count: i64,
    pub price_cents: i64,
    status: FormStatus,
    message: String,
}

impl Default for OrderForm {
    fn default() -> Self {
        Self {
            ticker: String::new(),
            side: OrderSide::Yes,
            count: DEFAULT_COUNT,
            price_cents: DEFAULT_PRICE_CENTS,
            status: FormStatus::Idle,
            message: String::new(),
        }
    }
}

impl OrderForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> FormStatus {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Zero or unparseable input falls back to 1 contract. Negative input
    /// is kept and rejected on submit.
    pub fn set_count_input(&mut self, input: &str) {
        self.count = parse_non_zero(input).unwrap_or(DEFAULT_COUNT);
    }

    /// Zero or unparseable input falls back to 50¢. Negative input is kept
    /// and rejected on submit.
    pub fn set_price_input(&mut self, input: &str) {
        self.price_cents = parse_non_zero(input).unwrap_or(DEFAULT_PRICE_CENTS);
    }

    /// Build the request, or the message to show inline.
    pub fn validate(&self) -> Result<OrderRequest, KatError> {
        let ticker = self.ticker.trim();
        if ticker.is_empty() {
            return Err(KatError::Validation("Enter a ticker".into()));
        }
        let count = u32::try_from(self.count)
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| KatError::Validation("Count must be at least 1".into()))?;
        let price_cents = u32::try_from(self.price_cents)
            .ok()
            .filter(|p| *p > 0)
            .ok_or_else(|| KatError::Validation("Price must be at least 1¢".into()))?;
        Ok(OrderRequest {
            ticker: ticker.to_string(),
            side: self.side,
            count,
            price_cents,
        })
    }

    pub fn button_label(&self) -> &'static str {
        if self.status == FormStatus::Loading {
            "Placing…"
        } else {
            "Place limit order"
        }
    }

    pub fn is_submit_disabled(&self) -> bool {
        self.status == FormStatus::Loading
    }

    /// Validate and move to `Loading`. Returns the request to send, or
    /// `None` when the form is invalid or already submitting.
    pub fn begin_submit(&mut self) -> Option<OrderRequest> {
        if self.status == FormStatus::Loading {
            return None;
        }
        match self.validate() {
            Ok(order) => {
                self.status = FormStatus::Loading;
                self.message.clear();
                Some(order)
            }
            Err(e) => {
                self.status = FormStatus::Error;
                self.message = e.to_string();
                None
            }
        }
    }

    /// Apply the outcome of a submission.
    pub fn finish(&mut self, result: anyhow::Result<OrderResult>) {
        match result {
            Ok(r) if r.success => {
                self.status = FormStatus::Success;
                self.message = match r.order_id {
                    Some(id) => format!("Order placed. ID: {id}"),
                    None => "Order placed.".into(),
                };
            }
            Ok(r) => {
                self.status = FormStatus::Error;
                self.message = r.error.unwrap_or_else(|| "Order failed".into());
            }
            Err(e) => {
                self.status = FormStatus::Error;
                self.message = format!("Order failed: {e}");
            }
        }
    }

    /// Full submission: validate, send, record the result and refresh tickers
    /// on success.
    pub async fn submit(&mut self, api: &dyn DashboardApi, queries: &QueryClient) -> FormStatus {
        let Some(order) = self.begin_submit() else {
            return self.status;
        };
        let result = api.place_order(&order).await;
        if let Err(e) = &result {
            warn!(ticker = %order.ticker, error = %e, "Order submission failed");
        }
        self.finish(result);
        if self.status == FormStatus::Success {
            info!(ticker = %order.ticker, message = %self.message, "Order form succeeded");
            queries.invalidate(QueryKey::Tickers);
        }
        self.status
    }

    /// Watchlist tickers offered as suggestions for the ticker field.
    pub fn suggestions<'a>(&self, tickers: &'a [TickerSnapshot]) -> Vec<&'a str> {
        let needle = self.ticker.trim().to_ascii_uppercase();
        tickers
            .iter()
            .map(|t| t.market_ticker.as_str())
            .filter(|t| needle.is_empty() || t.to_ascii_uppercase().contains(&needle))
            .collect()
    }
}

fn parse_non_zero(input: &str) -> Option<i64> {
    input.trim().parse::<i64>().ok().filter(|n| *n != 0)
}
