//! Fixed-interval polling views.
//!
//! A [`PollView`] re-fetches on every tick and replaces its state wholesale
//! on success. Failures are swallowed: the previous snapshot simply stays in
//! place, with nothing distinguishing stale data from fresh.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::timer_period;

/// A polled snapshot; `None` until the first successful fetch.
pub struct PollView<T> {
    name: &'static str,
    rx: watch::Receiver<Option<T>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<T> PollView<T>
where
    T: Send + Sync + 'static,
{
    /// Start polling `fetch` every `every`, beginning immediately.
    pub fn spawn<F, Fut>(name: &'static str, every: Duration, fetch: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send,
    {
        Self::spawn_with_token(name, every, CancellationToken::new(), fetch)
    }

    /// Like [`PollView::spawn`], stopping when `parent` is cancelled.
    pub fn spawn_with_token<F, Fut>(
        name: &'static str,
        every: Duration,
        parent: CancellationToken,
        mut fetch: F,
    ) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send,
    {
        let (tx, rx) = watch::channel(None);
        let cancel = parent.child_token();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval(timer_period(every));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let result = tokio::select! {
                    _ = token.cancelled() => break,
                    r = fetch() => r,
                };

                match result {
                    Ok(value) => {
                        tx.send_replace(Some(value));
                    }
                    Err(e) => debug!(view = name, error = %e, "Poll failed, keeping previous state"),
                }
            }
            debug!(view = name, "Poll view stopped");
        });

        Self {
            name,
            rx,
            cancel,
            task,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.rx.clone()
    }

    pub fn has_data(&self) -> bool {
        self.rx.borrow().is_some()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T: Clone> PollView<T> {
    /// The latest snapshot.
    pub fn current(&self) -> Option<T> {
        self.rx.borrow().clone()
    }
}

impl<T> Drop for PollView<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
