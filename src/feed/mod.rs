//! Live data views.
//!
//! Backend collections reach the console two ways: fixed-interval polls
//! ([`poller`]) and server-pushed event streams ([`stream`]). Either way the
//! view owns its state exclusively and publishes snapshots through a
//! `tokio::sync::watch` channel; renderers only ever read the latest one.

pub mod demo;
pub mod poller;
pub mod stream;
pub mod trades;

use std::collections::VecDeque;
use std::time::Duration;

/// Pipeline log lines kept by the log view.
pub const LOG_CAP: usize = 200;
/// Scored headlines kept by the news stream view.
pub const NEWS_CAP: usize = 50;
/// Rows shown by the simulated trade feed.
pub const DEMO_TRADES_CAP: usize = 8;

/// Shortest timer period a view will run with; `tokio::time::interval`
/// rejects zero.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Clamp a configured period to at least [`MIN_PERIOD`].
pub fn timer_period(every: Duration) -> Duration {
    every.max(MIN_PERIOD)
}

/// Newest-first buffer holding at most `cap` entries.
///
/// Entries are prepended; once full, the oldest entry falls off the back.
/// Nothing is deduplicated.
#[derive(Debug, Clone)]
pub struct RecentBuffer<T> {
    items: VecDeque<T>,
    cap: usize,
}

impl<T> RecentBuffer<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(cap),
            cap,
        }
    }

    /// Seed with `items`, already newest-first.
    pub fn with_items(cap: usize, items: impl IntoIterator<Item = T>) -> Self {
        let mut buf = Self::new(cap);
        buf.items.extend(items.into_iter().take(cap));
        buf
    }

    pub fn push_front(&mut self, item: T) {
        if self.cap == 0 {
            return;
        }
        self.items.push_front(item);
        self.items.truncate(self.cap);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }
}

impl<T: Clone> RecentBuffer<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
