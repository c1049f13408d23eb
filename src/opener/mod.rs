//! Opener — the full-screen intro sequence shown before the main site.
//!
//! The sequence is a three-phase state machine (`Flying → Glitching → Done`)
//! advanced by [`Opener::tick`]. A tick takes the elapsed frame time and
//! returns the frame's draw commands; it never touches a real canvas, so the
//! whole choreography can be driven and inspected from tests. Randomness is
//! injected through the `R: Rng` parameter.
//!
//! The host scheduler in [`host`] owns the timers (frame loop, glitch
//! trigger, typewriter, caret) and delivers the completion signal.

pub mod glitch;
pub mod host;
pub mod particles;
pub mod typewriter;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::time::Duration;
use tracing::info;

use particles::{project, FrameContext, Particle, TickerLabel, TrendLine};

// ---------------------------------------------------------------------------
// Drawing primitives
// ---------------------------------------------------------------------------

/// An sRGB colour with straight (non-premultiplied) alpha in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const GREEN: Rgba = Rgba::rgb(0x00, 0xD1, 0x66);
    pub const GREEN_BRIGHT: Rgba = Rgba::rgb(0x00, 0xFF, 0x80);
    pub const GREEN_DIM: Rgba = Rgba::rgb(0x00, 0x3D, 0x1F);
    pub const RED: Rgba = Rgba::rgb(0xFF, 0x45, 0x60);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn with_alpha(self, a: f64) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// One drawing instruction for a frame.
///
/// `RgbShift` and `Tear` read back pixels that earlier commands drew; a
/// surface may refuse pixel access, in which case they are skipped.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    FillRect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        color: Rgba,
    },
    Line {
        from: Point,
        to: Point,
        color: Rgba,
        width: f64,
    },
    Polyline {
        points: Vec<Point>,
        color: Rgba,
        width: f64,
    },
    Text {
        text: &'static str,
        at: Point,
        size: f64,
        color: Rgba,
    },
    /// Shift the red channel left and the blue channel right by `shift` px.
    RgbShift { shift: u32 },
    /// Copy a horizontal strip and paste it back offset by `dx`.
    Tear { y: f64, height: f64, dx: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn center(&self) -> FrameContext {
        FrameContext {
            cx: self.width as f64 / 2.0,
            cy: self.height as f64 / 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Lifecycle stage of the opener. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Flying,
    Glitching,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Flying => write!(f, "flying"),
            Phase::Glitching => write!(f, "glitching"),
            Phase::Done => write!(f, "done"),
        }
    }
}

// ---------------------------------------------------------------------------
// Timings
// ---------------------------------------------------------------------------

/// Time constants of the choreography.
#[derive(Debug, Clone, Copy)]
pub struct OpenerTimings {
    /// Delay from mount until the glitch starts.
    pub glitch_after: Duration,
    /// Delay between reaching `Done` and notifying the host.
    pub completion_grace: Duration,
    pub frame_interval: Duration,
    /// Glitch time over which intensity ramps 0 → 1.
    pub glitch_ramp: Duration,
    /// Length of the fade-to-black that follows the ramp.
    pub fade: Duration,
    /// Length of the fade-in from black at mount.
    pub fade_in: Duration,
}

impl Default for OpenerTimings {
    fn default() -> Self {
        Self {
            glitch_after: Duration::from_millis(3_800),
            completion_grace: Duration::from_millis(80),
            frame_interval: Duration::from_millis(16),
            glitch_ramp: Duration::from_millis(1_100),
            fade: Duration::from_millis(450),
            fade_in: Duration::from_millis(700),
        }
    }
}

impl From<&crate::config::OpenerConfig> for OpenerTimings {
    fn from(cfg: &crate::config::OpenerConfig) -> Self {
        Self {
            glitch_after: Duration::from_millis(cfg.glitch_after_ms),
            completion_grace: Duration::from_millis(cfg.completion_grace_ms),
            frame_interval: Duration::from_millis(cfg.frame_interval_ms.max(1)),
            ..Self::default()
        }
    }
}

/// Fade alpha at which the sequence counts as fully black.
const FADE_SATURATION: f64 = 0.99;
const GRID_DEPTHS: [f64; 5] = [400.0, 700.0, 1100.0, 1600.0, 2100.0];

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// Output of one tick.
#[derive(Debug, Clone)]
pub struct Frame {
    pub phase: Phase,
    pub commands: Vec<DrawCommand>,
    /// True only on the tick that entered `Done`.
    pub completed: bool,
}

// ---------------------------------------------------------------------------
// Opener
// ---------------------------------------------------------------------------

/// The opener state machine and its particle pool.
pub struct Opener<R: Rng = StdRng> {
    phase: Phase,
    elapsed: Duration,
    glitch_elapsed: Duration,
    /// Opener-clock time at which the glitch began.
    glitch_started: Duration,
    viewport: Viewport,
    timings: OpenerTimings,
    lines: Vec<TrendLine>,
    labels: Vec<TickerLabel>,
    rng: R,
}

impl Opener<StdRng> {
    /// Build from configuration; seeded when `seed` is set.
    pub fn from_config(cfg: &crate::config::OpenerConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(
            Viewport::new(cfg.width, cfg.height),
            OpenerTimings::from(cfg),
            cfg.trend_lines,
            cfg.ticker_labels,
            rng,
        )
    }
}

impl<R: Rng> Opener<R> {
    pub fn new(
        viewport: Viewport,
        timings: OpenerTimings,
        trend_lines: usize,
        ticker_labels: usize,
        mut rng: R,
    ) -> Self {
        let lines = (0..trend_lines).map(|_| TrendLine::spawn(&mut rng)).collect();
        let labels = (0..ticker_labels).map(|_| TickerLabel::spawn(&mut rng)).collect();
        Self {
            phase: Phase::Flying,
            elapsed: Duration::ZERO,
            glitch_elapsed: Duration::ZERO,
            glitch_started: Duration::ZERO,
            viewport,
            timings,
            lines,
            labels,
            rng,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn timings(&self) -> &OpenerTimings {
        &self.timings
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Enter the glitch phase. Only valid from `Flying`; returns whether the
    /// transition happened.
    pub fn begin_glitch(&mut self) -> bool {
        self.begin_glitch_at(Duration::ZERO)
    }

    /// Enter the glitch phase `offset` after the last tick. Only the part of
    /// the next `dt` past that boundary counts as glitch time.
    pub fn begin_glitch_at(&mut self, offset: Duration) -> bool {
        if self.phase != Phase::Flying {
            return false;
        }
        self.phase = Phase::Glitching;
        self.glitch_started = self.elapsed + offset;
        self.glitch_elapsed = Duration::ZERO;
        info!(
            elapsed_ms = self.glitch_started.as_millis() as u64,
            "Opener phase: flying -> glitching"
        );
        true
    }

    /// Glitch intensity in `0.0..=1.0`; zero outside the glitch phase.
    pub fn glitch_intensity(&self) -> f64 {
        if self.phase != Phase::Glitching {
            return 0.0;
        }
        (self.glitch_elapsed.as_secs_f64() / self.timings.glitch_ramp.as_secs_f64()).min(1.0)
    }

    /// Advance by `dt` and produce the frame's draw commands.
    pub fn tick(&mut self, dt: Duration) -> Frame {
        if self.phase == Phase::Done {
            return Frame {
                phase: Phase::Done,
                commands: Vec::new(),
                completed: false,
            };
        }

        self.elapsed += dt;
        let glitching = self.phase == Phase::Glitching;
        if glitching {
            self.glitch_elapsed = self.elapsed.saturating_sub(self.glitch_started);
        }

        let w = self.viewport.width as f64;
        let h = self.viewport.height as f64;
        let ctx = self.viewport.center();
        let mut out = Vec::with_capacity(64 + self.lines.len() + self.labels.len());

        // Trail clear
        let trail = if glitching {
            0.12 + self.rng.gen::<f64>() * 0.15
        } else {
            0.16
        };
        out.push(fill(0.0, 0.0, w, h, Rgba::BLACK.with_alpha(trail)));

        self.draw_grid(&ctx, &mut out);

        for line in &mut self.lines {
            if let Some(cmd) = line.advance_and_draw(&mut self.rng, &ctx, glitching) {
                out.push(cmd);
            }
        }
        for label in &mut self.labels {
            if let Some(cmd) = label.advance_and_draw(&mut self.rng, &ctx, glitching) {
                out.push(cmd);
            }
        }

        // Scanlines
        let scan = Rgba::BLACK.with_alpha(0.025);
        let mut y = 0.0;
        while y < h {
            out.push(fill(0.0, y, w, 2.0, scan));
            y += 4.0;
        }

        let mut completed = false;
        if glitching {
            completed = self.draw_glitch(w, h, &mut out);
        }

        if self.elapsed < self.timings.fade_in {
            let a = 1.0 - self.elapsed.as_secs_f64() / self.timings.fade_in.as_secs_f64();
            out.push(fill(0.0, 0.0, w, h, Rgba::BLACK.with_alpha(a)));
        }

        Frame {
            phase: self.phase,
            commands: out,
            completed,
        }
    }

    fn draw_grid(&self, ctx: &FrameContext, out: &mut Vec<DrawCommand>) {
        for gz in GRID_DEPTHS {
            let color = Rgba::GREEN_DIM.with_alpha((0.06 - gz / 40_000.0).max(0.0));
            let mut gy = -500.0;
            while gy <= 500.0 {
                if let (Some(p0), Some(p1)) = (
                    project(-1400.0, gy, gz, ctx.cx, ctx.cy),
                    project(1400.0, gy, gz, ctx.cx, ctx.cy),
                ) {
                    out.push(DrawCommand::Line {
                        from: Point::new(p0.x, p0.y),
                        to: Point::new(p1.x, p1.y),
                        color,
                        width: 0.4,
                    });
                }
                gy += 100.0;
            }
        }

        // Vanishing-point verticals
        let color = Rgba::GREEN_DIM.with_alpha(0.04);
        let mut vx = -1400.0;
        while vx <= 1400.0 {
            out.push(DrawCommand::Line {
                from: Point::new(ctx.cx + vx, 0.0),
                to: Point::new(ctx.cx, ctx.cy),
                color,
                width: 0.4,
            });
            vx += 180.0;
        }
    }

    /// Emit glitch effects; returns true on the tick that reaches `Done`.
    fn draw_glitch(&mut self, w: f64, h: f64, out: &mut Vec<DrawCommand>) -> bool {
        let intensity = self.glitch_intensity();

        out.push(DrawCommand::RgbShift {
            shift: (intensity * 28.0).floor() as u32,
        });

        let tears = (intensity * 14.0).floor() as usize;
        for _ in 0..tears {
            let y = self.rng.gen::<f64>() * h;
            let height = self.rng.gen::<f64>() * 10.0 + 2.0;
            let dx = (self.rng.gen::<f64>() - 0.5) * intensity * 70.0;
            out.push(DrawCommand::Tear { y, height, dx });
        }

        let blocks = (intensity * 8.0).floor() as usize;
        for _ in 0..blocks {
            let color = Rgba {
                r: 0,
                g: self.rng.gen_range(0..=255),
                b: self.rng.gen_range(0..80),
                a: self.rng.gen::<f64>() * 0.35,
            };
            let x = self.rng.gen::<f64>() * w;
            let y = self.rng.gen::<f64>() * h;
            let bw = self.rng.gen::<f64>() * 140.0 + 20.0;
            let bh = self.rng.gen::<f64>() * 14.0 + 4.0;
            out.push(fill(x, y, bw, bh, color));
        }

        let ramp = self.timings.glitch_ramp.as_secs_f64();
        let ge = self.glitch_elapsed.as_secs_f64();
        if ge > ramp {
            let fade = ((ge - ramp) / self.timings.fade.as_secs_f64()).min(1.0);
            out.push(fill(0.0, 0.0, w, h, Rgba::BLACK.with_alpha(fade)));
            if fade >= FADE_SATURATION && self.phase != Phase::Done {
                self.phase = Phase::Done;
                info!(
                    elapsed_ms = self.elapsed.as_millis() as u64,
                    glitch_ms = self.glitch_elapsed.as_millis() as u64,
                    "Opener phase: glitching -> done"
                );
                return true;
            }
        }
        false
    }
}

fn fill(x: f64, y: f64, w: f64, h: f64, color: Rgba) -> DrawCommand {
    DrawCommand::FillRect { x, y, w, h, color }
}

// ---------------------------------------------------------------------------
// HUD
// ---------------------------------------------------------------------------

/// Overlay text shown above the canvas.
#[derive(Debug, Clone, PartialEq)]
pub struct Hud {
    pub phase: Phase,
    pub boot_text: String,
    pub caret_on: bool,
    pub frames: u64,
}

impl Default for Hud {
    fn default() -> Self {
        Self {
            phase: Phase::Flying,
            boot_text: String::new(),
            caret_on: true,
            frames: 0,
        }
    }
}

impl Hud {
    pub const TITLE: &'static str = "KAT — KALSHI ALGORITHMIC TRADING";

    pub fn depth_label(&self) -> &'static str {
        if self.phase == Phase::Glitching {
            "DEPTH: ⚠ ERR"
        } else {
            "DEPTH: ∞"
        }
    }

    /// The crosshair disappears once the glitch starts.
    pub fn crosshair_visible(&self) -> bool {
        self.phase == Phase::Flying
    }

    pub fn telemetry(&self) -> [&'static str; 3] {
        [self.depth_label(), "MARKETS: 2,847", "LATENCY: 9ms"]
    }
}

impl fmt::Display for Hud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caret = if self.caret_on { "_" } else { " " };
        write!(
            f,
            "{} | {}{} | {}",
            Self::TITLE,
            self.boot_text,
            caret,
            self.telemetry().join(" · ")
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(16);

    fn opener(seed: u64) -> Opener<StdRng> {
        Opener::new(
            Viewport::new(320, 180),
            OpenerTimings::default(),
            40,
            22,
            StdRng::seed_from_u64(seed),
        )
    }

    /// Drive an opener through its full sequence, recording every phase seen.
    fn run_to_done(o: &mut Opener<StdRng>) -> (Vec<Phase>, usize) {
        let mut phases = vec![o.phase()];
        let mut completions = 0;
        let mut t = Duration::ZERO;
        for _ in 0..2_000 {
            if t >= o.timings().glitch_after {
                o.begin_glitch();
            }
            let frame = o.tick(FRAME);
            t += FRAME;
            if frame.completed {
                completions += 1;
            }
            if phases.last() != Some(&frame.phase) {
                phases.push(frame.phase);
            }
        }
        (phases, completions)
    }

    #[test]
    fn test_phase_order_and_single_completion() {
        let mut o = opener(1);
        let (phases, completions) = run_to_done(&mut o);
        assert_eq!(phases, vec![Phase::Flying, Phase::Glitching, Phase::Done]);
        assert_eq!(completions, 1);
    }

    #[test]
    fn test_glitch_time_starts_at_boundary() {
        let mut o = opener(5);
        o.tick(Duration::from_millis(100));
        assert!(o.begin_glitch_at(Duration::from_millis(60)));
        o.tick(Duration::from_millis(100));
        let expected = 0.040 / o.timings().glitch_ramp.as_secs_f64();
        assert!((o.glitch_intensity() - expected).abs() < 1e-9);

        o.tick(Duration::from_millis(100));
        let expected = 0.140 / o.timings().glitch_ramp.as_secs_f64();
        assert!((o.glitch_intensity() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_begin_glitch_only_from_flying() {
        let mut o = opener(2);
        assert!(o.begin_glitch());
        assert!(!o.begin_glitch());
        assert_eq!(o.phase(), Phase::Glitching);
    }

    #[test]
    fn test_done_is_terminal() {
        let mut o = opener(3);
        run_to_done(&mut o);
        assert_eq!(o.phase(), Phase::Done);
        assert!(!o.begin_glitch());
        let frame = o.tick(FRAME);
        assert_eq!(frame.phase, Phase::Done);
        assert!(frame.commands.is_empty());
        assert!(!frame.completed);
    }

    #[test]
    fn test_done_after_ramp_plus_fade() {
        let mut o = opener(4);
        o.begin_glitch();
        let mut glitch_time = Duration::ZERO;
        while o.phase() != Phase::Done {
            o.tick(FRAME);
            glitch_time += FRAME;
            assert!(glitch_time < Duration::from_secs(3), "glitch never finished");
        }
        // Ramp (1.1s) plus 99% of the fade (0.45s).
        assert!(glitch_time >= Duration::from_millis(1_540));
        assert!(glitch_time <= Duration::from_millis(1_600));
    }

    #[test]
    fn test_never_completes_without_glitch() {
        let mut o = opener(5);
        for _ in 0..1_000 {
            let frame = o.tick(FRAME);
            assert_eq!(frame.phase, Phase::Flying);
            assert!(!frame.completed);
        }
    }

    #[test]
    fn test_flying_frame_has_no_glitch_commands() {
        let mut o = opener(6);
        let frame = o.tick(FRAME);
        assert!(!frame
            .commands
            .iter()
            .any(|c| matches!(c, DrawCommand::RgbShift { .. } | DrawCommand::Tear { .. })));
    }

    #[test]
    fn test_fade_in_overlay_only_at_start() {
        let mut o = opener(7);
        let first = o.tick(FRAME);
        let last_is_black_overlay = |f: &Frame| {
            matches!(f.commands.last(), Some(DrawCommand::FillRect { color, .. }) if *color == Rgba::BLACK.with_alpha(color.a) && color.a > 0.9)
        };
        assert!(last_is_black_overlay(&first));
        for _ in 0..60 {
            o.tick(FRAME);
        }
        let later = o.tick(FRAME);
        assert!(!last_is_black_overlay(&later));
    }

    #[test]
    fn test_glitch_escalates() {
        let mut o = opener(8);
        o.begin_glitch();
        let tears = |f: &Frame| f.commands.iter().filter(|c| matches!(c, DrawCommand::Tear { .. })).count();
        let early = tears(&o.tick(FRAME));
        for _ in 0..60 {
            o.tick(FRAME);
        }
        let late = tears(&o.tick(FRAME));
        assert!(late > early);
        assert!(late <= 14);
        assert!(o.glitch_intensity() > 0.8);
    }

    #[test]
    fn test_same_seed_same_frames() {
        let mut a = opener(42);
        let mut b = opener(42);
        for _ in 0..10 {
            assert_eq!(a.tick(FRAME).commands, b.tick(FRAME).commands);
        }
    }

    #[test]
    fn test_particle_pool_size_is_fixed() {
        let mut o = opener(9);
        for _ in 0..500 {
            o.tick(FRAME);
        }
        assert_eq!(o.lines.len(), 40);
        assert_eq!(o.labels.len(), 22);
    }

    #[test]
    fn test_hud_labels_follow_phase() {
        let mut hud = Hud::default();
        assert_eq!(hud.depth_label(), "DEPTH: ∞");
        assert!(hud.crosshair_visible());
        hud.phase = Phase::Glitching;
        assert_eq!(hud.depth_label(), "DEPTH: ⚠ ERR");
        assert!(!hud.crosshair_visible());
        assert!(hud.to_string().contains("MARKETS: 2,847"));
    }
}
