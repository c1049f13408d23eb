//! Software RGBA surface and the glitch pixel passes.
//!
//! Drawing commands are rasterised onto a [`Surface`]. The glitch commands
//! read pixels back; a surface may forbid that (as a tainted browser canvas
//! does), in which case the pass is skipped and the frame is otherwise
//! unaffected. Pixel access failures never reach the phase state machine.

use tracing::trace;

use super::{DrawCommand, Frame, Point, Rgba, Viewport};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SurfaceError {
    #[error("pixel access denied by surface")]
    AccessDenied,
    #[error("region {w}x{h} at ({x},{y}) is outside the surface")]
    OutOfBounds { x: i64, y: i64, w: u32, h: u32 },
}

/// A rectangular block of RGBA8 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl ImageData {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }
}

/// Something frames can be drawn onto.
pub trait Surface {
    fn viewport(&self) -> Viewport;
    fn resize(&mut self, viewport: Viewport);
    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Rgba);
    fn draw_line(&mut self, from: Point, to: Point, color: Rgba, width: f64);
    fn fill_text(&mut self, text: &str, at: Point, size: f64, color: Rgba);
    fn get_image_data(&self, x: i64, y: i64, w: u32, h: u32) -> Result<ImageData, SurfaceError>;
    fn put_image_data(&mut self, image: &ImageData, x: i64, y: i64) -> Result<(), SurfaceError>;
}

/// Rasterise one frame onto `surface`.
pub fn render<S: Surface + ?Sized>(surface: &mut S, frame: &Frame) {
    for cmd in &frame.commands {
        match cmd {
            DrawCommand::FillRect { x, y, w, h, color } => surface.fill_rect(*x, *y, *w, *h, *color),
            DrawCommand::Line { from, to, color, width } => {
                surface.draw_line(*from, *to, *color, *width)
            }
            DrawCommand::Polyline { points, color, width } => {
                for pair in points.windows(2) {
                    surface.draw_line(pair[0], pair[1], *color, *width);
                }
            }
            DrawCommand::Text { text, at, size, color } => surface.fill_text(text, *at, *size, *color),
            DrawCommand::RgbShift { shift } => {
                if let Err(e) = apply_rgb_shift(surface, *shift) {
                    trace!(error = %e, "RGB shift skipped");
                }
            }
            DrawCommand::Tear { y, height, dx } => {
                if let Err(e) = apply_tear(surface, *y, *height, *dx) {
                    trace!(error = %e, "Tear skipped");
                }
            }
        }
    }
}

fn apply_rgb_shift<S: Surface + ?Sized>(surface: &mut S, shift: u32) -> Result<(), SurfaceError> {
    let vp = surface.viewport();
    let src = surface.get_image_data(0, 0, vp.width, vp.height)?;
    surface.put_image_data(&rgb_shift(&src, shift), 0, 0)
}

fn apply_tear<S: Surface + ?Sized>(
    surface: &mut S,
    y: f64,
    height: f64,
    dx: f64,
) -> Result<(), SurfaceError> {
    let vp = surface.viewport();
    let top = y.floor() as i64;
    let h = (height.floor() as u32).min(vp.height.saturating_sub(top.max(0) as u32));
    if h == 0 {
        return Ok(());
    }
    let strip = surface.get_image_data(0, top, vp.width, h)?;
    surface.put_image_data(&strip, dx.floor() as i64, top)
}

/// Chromatic-aberration pass: red sampled `shift` px to the right, blue
/// `shift` px to the left, clamped at the edges.
pub fn rgb_shift(src: &ImageData, shift: u32) -> ImageData {
    let mut out = ImageData::new(src.width, src.height);
    if src.width == 0 {
        return out;
    }
    let max_x = src.width - 1;
    for py in 0..src.height {
        for px in 0..src.width {
            let i = src.offset(px, py);
            let ri = src.offset((px + shift).min(max_x), py);
            let bi = src.offset(px.saturating_sub(shift), py);
            out.data[i] = src.data[ri];
            out.data[i + 1] = src.data[i + 1];
            out.data[i + 2] = src.data[bi + 2];
            out.data[i + 3] = if src.data[i + 3] == 0 { 255 } else { src.data[i + 3] };
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Canvas
// ---------------------------------------------------------------------------

/// In-memory RGBA8 surface.
#[derive(Debug, Clone)]
pub struct Canvas {
    image: ImageData,
    pixel_access: bool,
}

impl Canvas {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            image: ImageData::new(viewport.width, viewport.height),
            pixel_access: true,
        }
    }

    /// A canvas whose pixels cannot be read back.
    pub fn without_pixel_access(viewport: Viewport) -> Self {
        Self {
            pixel_access: false,
            ..Self::new(viewport)
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.image.width || y >= self.image.height {
            return None;
        }
        let i = self.image.offset(x, y);
        Some([
            self.image.data[i],
            self.image.data[i + 1],
            self.image.data[i + 2],
            self.image.data[i + 3],
        ])
    }

    /// Mean luminance in `0.0..=1.0`; handy for checking fades.
    pub fn mean_luminance(&self) -> f64 {
        let n = (self.image.width as usize * self.image.height as usize).max(1);
        let sum: f64 = self
            .image
            .data
            .chunks_exact(4)
            .map(|p| 0.2126 * p[0] as f64 + 0.7152 * p[1] as f64 + 0.0722 * p[2] as f64)
            .sum();
        sum / n as f64 / 255.0
    }

    fn blend(&mut self, x: i64, y: i64, color: Rgba) {
        if x < 0 || y < 0 || x >= self.image.width as i64 || y >= self.image.height as i64 {
            return;
        }
        let i = self.image.offset(x as u32, y as u32);
        let a = color.a;
        let mix = |dst: u8, src: u8| (src as f64 * a + dst as f64 * (1.0 - a)).round() as u8;
        self.image.data[i] = mix(self.image.data[i], color.r);
        self.image.data[i + 1] = mix(self.image.data[i + 1], color.g);
        self.image.data[i + 2] = mix(self.image.data[i + 2], color.b);
        self.image.data[i + 3] = 255;
    }
}

impl Surface for Canvas {
    fn viewport(&self) -> Viewport {
        Viewport::new(self.image.width, self.image.height)
    }

    fn resize(&mut self, viewport: Viewport) {
        // Resizing clears the backing store, as a canvas element does.
        self.image = ImageData::new(viewport.width, viewport.height);
    }

    fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, color: Rgba) {
        if color.a <= 0.0 {
            return;
        }
        let x0 = x.floor().max(0.0) as i64;
        let y0 = y.floor().max(0.0) as i64;
        let x1 = (x + w).ceil().min(self.image.width as f64) as i64;
        let y1 = (y + h).ceil().min(self.image.height as f64) as i64;
        for py in y0..y1 {
            for px in x0..x1 {
                self.blend(px, py, color);
            }
        }
    }

    fn draw_line(&mut self, from: Point, to: Point, color: Rgba, _width: f64) {
        if color.a <= 0.0 {
            return;
        }
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let steps = dx.abs().max(dy.abs()).ceil().min(8_192.0) as i64;
        if steps == 0 {
            self.blend(from.x.round() as i64, from.y.round() as i64, color);
            return;
        }
        for s in 0..=steps {
            let t = s as f64 / steps as f64;
            self.blend(
                (from.x + dx * t).round() as i64,
                (from.y + dy * t).round() as i64,
                color,
            );
        }
    }

    fn fill_text(&mut self, text: &str, at: Point, size: f64, color: Rgba) {
        // Glyphs are approximated by their bounding box on the baseline.
        let w = text.chars().count() as f64 * size * 0.6;
        self.fill_rect(at.x, at.y - size, w, size, color);
    }

    fn get_image_data(&self, x: i64, y: i64, w: u32, h: u32) -> Result<ImageData, SurfaceError> {
        if !self.pixel_access {
            return Err(SurfaceError::AccessDenied);
        }
        if x < 0
            || y < 0
            || x as u64 + w as u64 > self.image.width as u64
            || y as u64 + h as u64 > self.image.height as u64
        {
            return Err(SurfaceError::OutOfBounds { x, y, w, h });
        }
        let mut out = ImageData::new(w, h);
        for row in 0..h {
            let src = self.image.offset(x as u32, y as u32 + row);
            let dst = out.offset(0, row);
            let len = w as usize * 4;
            out.data[dst..dst + len].copy_from_slice(&self.image.data[src..src + len]);
        }
        Ok(out)
    }

    fn put_image_data(&mut self, image: &ImageData, x: i64, y: i64) -> Result<(), SurfaceError> {
        if !self.pixel_access {
            return Err(SurfaceError::AccessDenied);
        }
        // Parts falling outside the surface are clipped.
        for row in 0..image.height as i64 {
            let ty = y + row;
            if ty < 0 || ty >= self.image.height as i64 {
                continue;
            }
            for col in 0..image.width as i64 {
                let tx = x + col;
                if tx < 0 || tx >= self.image.width as i64 {
                    continue;
                }
                let s = image.offset(col as u32, row as u32);
                let d = self.image.offset(tx as u32, ty as u32);
                self.image.data[d..d + 4].copy_from_slice(&image.data[s..s + 4]);
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
