//! Host scheduler for the opener.
//!
//! Owns every timer the opener needs (frame loop, glitch trigger, typewriter,
//! caret blink, completion grace) plus the window resize subscription, all
//! inside one task. Cancelling the host tears all of them down at once; the
//! completion callback fires at most once per mount, whether from the
//! natural end of the sequence or from [`OpenerHost::skip`].

use anyhow::{Context, Result};
use rand::Rng;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::glitch::{self, Surface};
use super::typewriter::{Typewriter, CARET_BLINK, START_DELAY};
use super::{Hud, Opener, Phase, Viewport};

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// The host window: publishes its size and counts resize listeners.
pub struct Window {
    viewport: watch::Sender<Viewport>,
    listeners: Arc<AtomicUsize>,
}

impl Window {
    pub fn new(viewport: Viewport) -> Self {
        let (tx, _rx) = watch::channel(viewport);
        Self {
            viewport: tx,
            listeners: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn viewport(&self) -> Viewport {
        *self.viewport.borrow()
    }

    pub fn resize(&self, viewport: Viewport) {
        self.viewport.send_replace(viewport);
    }

    pub fn subscribe_resize(&self) -> ResizeListener {
        self.listeners.fetch_add(1, Ordering::SeqCst);
        ResizeListener {
            rx: self.viewport.subscribe(),
            listeners: self.listeners.clone(),
        }
    }

    /// Number of live resize listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.load(Ordering::SeqCst)
    }
}

/// A registered resize listener; deregisters itself on drop.
pub struct ResizeListener {
    rx: watch::Receiver<Viewport>,
    listeners: Arc<AtomicUsize>,
}

impl Drop for ResizeListener {
    fn drop(&mut self) {
        self.listeners.fetch_sub(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Once-only completion signal.
struct Completion {
    fired: AtomicBool,
    callback: Mutex<Option<Callback>>,
}

impl Completion {
    fn new(callback: Callback) -> Self {
        Self {
            fired: AtomicBool::new(false),
            callback: Mutex::new(Some(callback)),
        }
    }

    /// Invoke the callback unless it already ran. Returns whether it ran now.
    fn fire(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match callback {
            Some(cb) => {
                cb();
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

/// A mounted opener. Dropping it unmounts.
pub struct OpenerHost<S> {
    cancel: CancellationToken,
    completion: Arc<Completion>,
    hud: watch::Receiver<Hud>,
    task: Option<JoinHandle<S>>,
}

impl<S> OpenerHost<S>
where
    S: Surface + Send + 'static,
{
    /// Mount the opener: start its timers and render loop onto `surface`.
    pub fn spawn<R, F>(opener: Opener<R>, mut surface: S, window: &Window, on_complete: F) -> Self
    where
        R: Rng + Send + 'static,
        F: FnOnce() + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let completion = Arc::new(Completion::new(Box::new(on_complete)));
        let (hud_tx, hud_rx) = watch::channel(Hud::default());

        let resize = window.subscribe_resize();
        let mut opener = opener;
        let viewport = window.viewport();
        opener.resize(viewport);
        surface.resize(viewport);

        let task = tokio::spawn(run(
            opener,
            surface,
            resize,
            hud_tx,
            completion.clone(),
            cancel.clone(),
        ));

        Self {
            cancel,
            completion,
            hud: hud_rx,
            task: Some(task),
        }
    }

    pub fn hud(&self) -> watch::Receiver<Hud> {
        self.hud.clone()
    }

    /// Complete immediately and unmount.
    pub fn skip(&self) {
        if self.completion.fire() {
            info!("Opener skipped");
        }
        self.cancel.cancel();
    }

    /// Unmount without completing.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the host task to end and get the surface back.
    pub async fn join(mut self) -> Result<S> {
        let task = self.task.take().context("Opener host already joined")?;
        task.await.context("Opener host task failed")
    }
}

impl<S> Drop for OpenerHost<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run<R, S>(
    mut opener: Opener<R>,
    mut surface: S,
    mut resize: ResizeListener,
    hud: watch::Sender<Hud>,
    completion: Arc<Completion>,
    cancel: CancellationToken,
) -> S
where
    R: Rng,
    S: Surface,
{
    let timings = *opener.timings();
    let mounted = Instant::now();

    let mut frames = interval(timings.frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut caret = interval_at(mounted + CARET_BLINK, CARET_BLINK);

    let glitch_timer = sleep(timings.glitch_after);
    tokio::pin!(glitch_timer);
    let mut glitch_pending = true;

    let mut typewriter = Typewriter::default();
    let typing = sleep(START_DELAY);
    tokio::pin!(typing);
    let mut typing_active = true;

    let grace = sleep(timings.completion_grace);
    tokio::pin!(grace);
    let mut grace_armed = false;

    let mut window_open = true;
    let mut last_frame = mounted;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!(phase = %opener.phase(), "Opener unmounted");
                break;
            }

            _ = &mut grace, if grace_armed => {
                if completion.fire() {
                    info!(elapsed_ms = mounted.elapsed().as_millis() as u64, "Opener complete");
                }
                break;
            }

            _ = &mut glitch_timer, if glitch_pending => {
                glitch_pending = false;
                if opener.begin_glitch_at(Instant::now() - last_frame) {
                    hud.send_modify(|h| h.phase = Phase::Glitching);
                }
            }

            _ = &mut typing, if typing_active => {
                match typewriter.step() {
                    Some(delay) => typing.as_mut().reset(Instant::now() + delay),
                    None => typing_active = false,
                }
                let text = typewriter.text().to_string();
                hud.send_modify(|h| h.boot_text = text);
            }

            _ = caret.tick() => {
                hud.send_modify(|h| h.caret_on = !h.caret_on);
            }

            changed = resize.rx.changed(), if window_open => {
                match changed {
                    Ok(()) => {
                        let viewport = *resize.rx.borrow_and_update();
                        debug!(width = viewport.width, height = viewport.height, "Opener resized");
                        opener.resize(viewport);
                        surface.resize(viewport);
                    }
                    Err(_) => window_open = false,
                }
            }

            _ = frames.tick(), if opener.phase() != Phase::Done => {
                let now = Instant::now();
                let frame = opener.tick(now - last_frame);
                last_frame = now;
                glitch::render(&mut surface, &frame);
                hud.send_modify(|h| {
                    h.frames += 1;
                    h.phase = frame.phase;
                });
                if frame.completed {
                    grace.as_mut().reset(now + timings.completion_grace);
                    grace_armed = true;
                }
            }
        }
    }

    drop(resize);
    surface
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
