//! Simulated trade feed for the marketing site.
//!
//! Starts with a fixed set of canned trades and, every tick, prepends the
//! next canned trade restamped with the current wall-clock time.

use chrono::{Local, NaiveTime};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::trades::Trade;
use super::{timer_period, RecentBuffer, DEMO_TRADES_CAP};

struct Canned {
    time: &'static str,
    headline: &'static str,
    ticker: &'static str,
    conf: f64,
    signal: f64,
}

const FAKE_TRADES: [Canned; 5] = [
    Canned { time: "14:32:07", headline: "Fed raises rates 50bps", ticker: "KXFED-25-0525", conf: 0.94, signal: -1.0 },
    Canned { time: "14:31:44", headline: "Apple beats earnings expectations", ticker: "NASDAQ-HIGH-MAR", conf: 0.88, signal: 1.0 },
    Canned { time: "14:30:21", headline: "Nvidia AI chip demand raised guidance", ticker: "NVDA-250-JUN", conf: 0.91, signal: 1.0 },
    Canned { time: "14:29:55", headline: "Oil tumbles on weak China demand", ticker: "OIL-70-Q2", conf: 0.82, signal: -1.0 },
    Canned { time: "14:28:13", headline: "OpenAI releases GPT-5 flagship model", ticker: "AI-PROD-MAR", conf: 0.87, signal: 1.0 },
];

impl Canned {
    fn at(&self, time: String) -> Trade {
        Trade {
            headline: self.headline.to_string(),
            ticker: self.ticker.to_string(),
            signal: self.signal,
            conf: self.conf,
            timestamp: time,
        }
    }
}

/// The rotating demo feed.
#[derive(Debug, Clone)]
pub struct DemoFeed {
    trades: RecentBuffer<Trade>,
    next: usize,
}

impl Default for DemoFeed {
    fn default() -> Self {
        Self::new(DEMO_TRADES_CAP)
    }
}

impl DemoFeed {
    pub fn new(cap: usize) -> Self {
        let seed = FAKE_TRADES.iter().map(|c| c.at(c.time.to_string()));
        Self {
            trades: RecentBuffer::with_items(cap, seed),
            next: 0,
        }
    }

    /// Prepend the next canned trade stamped `now` (`HH:MM:SS`).
    pub fn advance(&mut self, now: NaiveTime) {
        let canned = &FAKE_TRADES[self.next % FAKE_TRADES.len()];
        self.trades.push_front(canned.at(now.format("%H:%M:%S").to_string()));
        self.next += 1;
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.trades.to_vec()
    }

    /// Row opacity fades with age, never below 0.3.
    pub fn opacity(row: usize) -> f64 {
        (1.0 - row as f64 * 0.09).max(0.3)
    }

    /// Run the feed on a timer until `cancel` fires.
    pub fn spawn(
        mut self,
        every: Duration,
        cancel: CancellationToken,
    ) -> (watch::Receiver<Vec<Trade>>, JoinHandle<()>) {
        let (tx, rx) = watch::channel(self.trades());
        let task = tokio::spawn(async move {
            let every = timer_period(every);
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.advance(Local::now().time());
                        tx.send_replace(self.trades());
                    }
                }
            }
        });
        (rx, task)
    }
}
