//! Flythrough particles: trend lines and floating ticker labels.
//!
//! Each particle owns its depth and drift parameters. Every tick it moves
//! toward the camera by its own speed; once it crosses the near plane it
//! re-randomizes itself and reappears at the far plane, so a fixed pool
//! produces an endless flythrough.

use rand::Rng;

use super::{DrawCommand, Point, Rgba};

/// Focal length of the perspective projection.
pub const FOV: f64 = 420.0;
/// Depth at which recycled particles reappear.
pub const FAR_Z: f64 = 2200.0;
/// Particles at or below this depth are recycled.
pub const NEAR_Z: f64 = 30.0;
/// Depth span over which brightness ramps from 0 to 1.
const FADE_SPAN: f64 = 1800.0;

pub const TICKERS: &[&str] = &[
    "KXFED +2.3%", "NASDAQ-HIGH ▲", "AI-PROD-MAR", "OIL-70-Q2 ▼",
    "KXKHAMENEI ▲", "NVDA-250 +4.1%", "BTC-100K ▲", "KXFEDCHAIRNOM",
    "SP500-HIGH ▲", "GOLD-3000 +0.8%", "CONF: 0.94", "SIGNAL: +1",
    "KXELECTION ▲", "RATE-CUT-MAR ▼", "CONF: 0.88", "SIGNAL: −1",
    "KXSUPREME ▲", "EUR-USD 1.09 ▼", "CONF: 0.91", "KALSHI API ✓",
];

/// A point mapped onto the screen, with the scale factor used for sizing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projected {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

/// Perspective-project `(x, y, z)` around the screen centre `(cx, cy)`.
/// Points at or behind the camera are culled.
pub fn project(x: f64, y: f64, z: f64, cx: f64, cy: f64) -> Option<Projected> {
    if z <= 0.0 {
        return None;
    }
    let scale = FOV / z;
    Some(Projected {
        x: cx + x * scale,
        y: cy + y * scale,
        scale,
    })
}

/// Per-frame inputs shared by every particle.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext {
    pub cx: f64,
    pub cy: f64,
}

/// Brightness grows as a particle approaches the camera.
fn brightness(z: f64) -> f64 {
    ((FAR_Z - z) / FADE_SPAN).min(1.0)
}

pub trait Particle {
    /// Move one step toward the camera and emit this frame's draw command.
    /// Returns `None` on the tick the particle recycles or when it is culled.
    fn advance_and_draw<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        ctx: &FrameContext,
        glitching: bool,
    ) -> Option<DrawCommand>;

    fn depth(&self) -> f64;
}

// ---------------------------------------------------------------------------
// Trend line
// ---------------------------------------------------------------------------

/// A random-walk price path drifting through space.
#[derive(Debug, Clone)]
pub struct TrendLine {
    z: f64,
    ox: f64,
    oy: f64,
    speed: f64,
    color: Rgba,
    path: Vec<f64>,
}

impl TrendLine {
    /// Spawn at a random depth so the initial pool is spread through space.
    pub fn spawn<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut line = Self {
            z: FAR_Z,
            ox: 0.0,
            oy: 0.0,
            speed: 0.0,
            color: Rgba::GREEN,
            path: Vec::new(),
        };
        let z = rng.gen::<f64>() * FAR_Z;
        line.reset(rng, z);
        line
    }

    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R, z: f64) {
        self.z = z;
        self.ox = (rng.gen::<f64>() - 0.5) * 2400.0;
        self.oy = (rng.gen::<f64>() - 0.5) * 1400.0;
        let n = 50 + rng.gen_range(0..50);
        self.speed = 9.0 + rng.gen::<f64>() * 14.0;
        self.color = if rng.gen::<f64>() > 0.15 {
            Rgba::GREEN
        } else {
            Rgba::GREEN_BRIGHT
        };

        let drift = (rng.gen::<f64>() - 0.48) * 0.4;
        let mut v = 0.0;
        self.path.clear();
        for _ in 0..n {
            v += (rng.gen::<f64>() - 0.5) * 7.0 + drift;
            self.path.push(v);
        }
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn origin(&self) -> (f64, f64) {
        (self.ox, self.oy)
    }

    pub fn path(&self) -> &[f64] {
        &self.path
    }
}

impl Particle for TrendLine {
    fn advance_and_draw<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        ctx: &FrameContext,
        glitching: bool,
    ) -> Option<DrawCommand> {
        self.z -= self.speed;
        if self.z <= NEAR_Z {
            self.reset(rng, FAR_Z);
            return None;
        }

        let b = brightness(self.z);
        let flicker = if glitching { 0.3 + rng.gen::<f64>() * 0.7 } else { 1.0 };
        let alpha = (0.08 + b * 0.92) * flicker;
        let width = (b * 2.8).max(0.4);

        let half = self.path.len() as f64 / 2.0;
        let points: Vec<Point> = self
            .path
            .iter()
            .enumerate()
            .filter_map(|(i, v)| {
                project(
                    self.ox + (i as f64 - half) * 16.0,
                    self.oy + v * 1.8,
                    self.z,
                    ctx.cx,
                    ctx.cy,
                )
            })
            .map(|p| Point::new(p.x, p.y))
            .collect();

        Some(DrawCommand::Polyline {
            points,
            color: self.color.with_alpha(alpha),
            width,
        })
    }

    fn depth(&self) -> f64 {
        self.z
    }
}

// ---------------------------------------------------------------------------
// Ticker label
// ---------------------------------------------------------------------------

/// A floating market ticker label; green when bullish, red otherwise.
#[derive(Debug, Clone)]
pub struct TickerLabel {
    z: f64,
    ox: f64,
    oy: f64,
    speed: f64,
    text: &'static str,
    bullish: bool,
}

impl TickerLabel {
    pub fn spawn<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut label = Self {
            z: FAR_Z,
            ox: 0.0,
            oy: 0.0,
            speed: 0.0,
            text: TICKERS[0],
            bullish: false,
        };
        let z = rng.gen::<f64>() * FAR_Z;
        label.reset(rng, z);
        label
    }

    pub fn reset<R: Rng + ?Sized>(&mut self, rng: &mut R, z: f64) {
        self.z = z;
        self.ox = (rng.gen::<f64>() - 0.5) * 2600.0;
        self.oy = (rng.gen::<f64>() - 0.5) * 1600.0;
        self.text = TICKERS[rng.gen_range(0..TICKERS.len())];
        self.speed = 7.0 + rng.gen::<f64>() * 11.0;
        self.bullish = self.text.contains('▲') || self.text.contains('+');
    }

    pub fn text(&self) -> &'static str {
        self.text
    }

    pub fn is_bullish(&self) -> bool {
        self.bullish
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }
}

impl Particle for TickerLabel {
    fn advance_and_draw<R: Rng + ?Sized>(
        &mut self,
        rng: &mut R,
        ctx: &FrameContext,
        glitching: bool,
    ) -> Option<DrawCommand> {
        self.z -= self.speed;
        if self.z <= NEAR_Z {
            self.reset(rng, FAR_Z);
            return None;
        }

        let b = brightness(self.z);
        let p = project(self.ox, self.oy, self.z, ctx.cx, ctx.cy)?;
        let flicker = if glitching { rng.gen::<f64>() } else { 1.0 };
        let color = if self.bullish { Rgba::GREEN } else { Rgba::RED };

        Some(DrawCommand::Text {
            text: self.text,
            at: Point::new(p.x, p.y),
            size: (p.scale * 13.0).max(8.0),
            color: color.with_alpha(b * 0.55 * flicker),
        })
    }

    fn depth(&self) -> f64 {
        self.z
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CTX: FrameContext = FrameContext { cx: 640.0, cy: 360.0 };

    #[test]
    fn test_project_culls_behind_camera() {
        assert!(project(10.0, 10.0, 0.0, 0.0, 0.0).is_none());
        assert!(project(10.0, 10.0, -5.0, 0.0, 0.0).is_none());
    }

    #[test]
    fn test_project_scales_by_depth() {
        let p = project(100.0, -50.0, 420.0, 640.0, 360.0).unwrap();
        assert!((p.scale - 1.0).abs() < 1e-12);
        assert!((p.x - 740.0).abs() < 1e-9);
        assert!((p.y - 310.0).abs() < 1e-9);

        let far = project(100.0, 0.0, 840.0, 0.0, 0.0).unwrap();
        assert!((far.x - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_line_depth_decreases_until_recycle() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut line = TrendLine::spawn(&mut rng);
        line.reset(&mut rng, FAR_Z);

        let mut prev = line.depth();
        let mut recycled = false;
        for _ in 0..400 {
            let before_path = line.path().to_vec();
            let drawn = line.advance_and_draw(&mut rng, &CTX, false);
            if drawn.is_none() {
                // Crossed the near plane: fresh parameters at the far plane.
                assert_eq!(line.depth(), FAR_Z);
                assert!(prev - 23.0 <= NEAR_Z);
                assert_ne!(line.path(), before_path.as_slice());
                recycled = true;
                break;
            }
            assert!(line.depth() < prev, "depth must strictly decrease");
            prev = line.depth();
        }
        assert!(recycled, "a line starting at the far plane must recycle");
    }

    #[test]
    fn test_trend_line_parameters_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let line = TrendLine::spawn(&mut rng);
            assert!((9.0..23.0).contains(&line.speed()));
            assert!((50..100).contains(&line.path().len()));
            assert!((0.0..FAR_Z).contains(&line.depth()));
            let (ox, oy) = line.origin();
            assert!(ox.abs() <= 1200.0 && oy.abs() <= 700.0);
        }
    }

    #[test]
    fn test_trend_line_alpha_grows_with_proximity() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut line = TrendLine::spawn(&mut rng);
        line.reset(&mut rng, FAR_Z);
        let alpha_of = |cmd: Option<DrawCommand>| match cmd {
            Some(DrawCommand::Polyline { color, .. }) => color.a,
            other => panic!("expected polyline, got {other:?}"),
        };
        let far = alpha_of(line.advance_and_draw(&mut rng, &CTX, false));
        for _ in 0..20 {
            line.advance_and_draw(&mut rng, &CTX, false);
        }
        let near = alpha_of(line.advance_and_draw(&mut rng, &CTX, false));
        assert!(near > far);
        assert!(near <= 1.0);
    }

    #[test]
    fn test_glitch_flicker_never_brightens() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut steady = TrendLine::spawn(&mut rng);
        steady.reset(&mut rng, 1000.0);
        let mut glitchy = steady.clone();

        let mut rng_a = StdRng::seed_from_u64(1);
        let mut rng_b = StdRng::seed_from_u64(1);
        let a = steady.advance_and_draw(&mut rng_a, &CTX, false);
        let b = glitchy.advance_and_draw(&mut rng_b, &CTX, true);
        match (a, b) {
            (
                Some(DrawCommand::Polyline { color: ca, .. }),
                Some(DrawCommand::Polyline { color: cb, .. }),
            ) => assert!(cb.a <= ca.a + 1e-12),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_ticker_label_polarity() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            let label = TickerLabel::spawn(&mut rng);
            let expect = label.text().contains('▲') || label.text().contains('+');
            assert_eq!(label.is_bullish(), expect);
            assert!((7.0..18.0).contains(&label.speed()));
        }
    }

    #[test]
    fn test_ticker_label_recycles_to_far_plane() {
        let mut rng = StdRng::seed_from_u64(17);
        let mut label = TickerLabel::spawn(&mut rng);
        label.reset(&mut rng, NEAR_Z + 1.0);
        assert!(label.advance_and_draw(&mut rng, &CTX, false).is_none());
        assert_eq!(label.depth(), FAR_Z);
    }

    #[test]
    fn test_ticker_label_text_size_floor() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut label = TickerLabel::spawn(&mut rng);
        label.reset(&mut rng, FAR_Z);
        match label.advance_and_draw(&mut rng, &CTX, false) {
            Some(DrawCommand::Text { size, .. }) => assert!(size >= 8.0),
            other => panic!("expected text, got {other:?}"),
        }
    }
}
