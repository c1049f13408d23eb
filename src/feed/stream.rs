//! Server-pushed views.
//!
//! A [`StreamView`] keeps one event stream open, parses each event and
//! prepends it to a [`RecentBuffer`]. A payload that fails to parse is
//! dropped on its own; the connection stays up. When the stream errors or
//! ends the view either stops or reopens after a fixed delay, per its
//! [`Reconnect`] policy. The buffer survives reconnects, so a server that
//! replays its backlog on connect produces duplicates.

use anyhow::{Context, Result};
use futures::StreamExt;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::RecentBuffer;
use crate::client::sse::{EventStream, SseEvent};
use crate::types::{Decision, KatError};

/// What to do once the stream fails or closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    /// Close and stay closed.
    Never,
    /// Reopen after the given delay.
    After(Duration),
}

/// Newest-first snapshot of a bounded event stream.
pub struct StreamView<T> {
    name: &'static str,
    rx: watch::Receiver<Vec<T>>,
    connects: watch::Receiver<u32>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<T> StreamView<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn spawn<O, Fut, P>(
        name: &'static str,
        cap: usize,
        reconnect: Reconnect,
        parent: CancellationToken,
        mut open: O,
        parse: P,
    ) -> Self
    where
        O: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<EventStream>> + Send,
        P: Fn(&SseEvent) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = watch::channel(Vec::new());
        let (connects_tx, connects) = watch::channel(0u32);
        let cancel = parent.child_token();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut buffer = RecentBuffer::new(cap);

            loop {
                let opened = tokio::select! {
                    _ = token.cancelled() => break,
                    r = open() => r,
                };

                match opened {
                    Ok(mut events) => {
                        connects_tx.send_modify(|n| *n += 1);
                        debug!(view = name, "Stream connected");
                        loop {
                            let next = tokio::select! {
                                _ = token.cancelled() => return,
                                next = events.next() => next,
                            };
                            match next {
                                Some(Ok(event)) => match parse(&event) {
                                    Ok(item) => {
                                        buffer.push_front(item);
                                        tx.send_replace(buffer.to_vec());
                                    }
                                    Err(e) => debug!(view = name, error = %e, "Discarding malformed event"),
                                },
                                Some(Err(e)) => {
                                    warn!(view = name, error = %e, "Stream error");
                                    break;
                                }
                                None => {
                                    debug!(view = name, "Stream closed by server");
                                    break;
                                }
                            }
                        }
                    }
                    Err(e) => warn!(view = name, error = %e, "Failed to open stream"),
                }

                match reconnect {
                    Reconnect::Never => {
                        info!(view = name, "Stream closed, not reconnecting");
                        break;
                    }
                    Reconnect::After(delay) => {
                        warn!(view = name, delay_ms = delay.as_millis() as u64, "Reconnecting");
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = token.cancelled() => break,
                        }
                    }
                }
            }
        });

        Self {
            name,
            rx,
            connects,
            cancel,
            task,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Current buffer, newest first.
    pub fn items(&self) -> Vec<T> {
        self.rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.rx.clone()
    }

    /// How many times the stream has been opened successfully.
    pub fn connect_count(&self) -> u32 {
        *self.connects.borrow()
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Drop for StreamView<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Payload parsers
// ---------------------------------------------------------------------------

/// Log events are plain text lines.
pub fn parse_log_line(event: &SseEvent) -> Result<String> {
    Ok(event.data.clone())
}

/// News events are JSON objects; anything else is malformed.
pub fn parse_decision(event: &SseEvent) -> Result<Decision> {
    serde_json::from_str(&event.data)
        .map_err(|e| KatError::MalformedPayload {
            stream: "/api/news/stream".into(),
            message: e.to_string(),
        })
        .context("Failed to parse news event")
}
