// Window + software drawing utilities.
// 1) A fixed-size window that shows the visible surface.
// 2) Filled circles on the backbuffer, hard-edged or anti-aliased per its hints.
// 3) A tiny 5x7 bitmap font for the FPS readout.
// 4) The sample paint callback that puts the balls on screen.

use image::{Pixel, Rgba};
use minifb::{Key, Window, WindowOptions};

use crate::error::Error;
use crate::gamma::GammaLut;
use crate::render_loop::DrawContext;
use crate::surface::{Backbuffer, Compositing, Smoothing, TextRendering};
use crate::types::{Ball, FrameBuffer};

pub const DEEP_SKY_BLUE: Rgba<u8> = Rgba([0, 191, 255, 255]);
pub const ALICE_BLUE: Rgba<u8> = Rgba([240, 248, 255, 255]);
/// Black at roughly half opacity.
pub const TRANSLUCENT_BLACK: Rgba<u8> = Rgba([0, 0, 0, 128]);

/// Window presentation rate; the render thread runs independently of this.
const PRESENT_FPS: usize = 60;

pub struct Drawer {
    window: Window, // the on-screen window you see
}

impl Drawer {
    /// Create a non-resizable window with a client area of exactly `width x height`.
    pub fn new(title: &str, width: usize, height: usize) -> Result<Self, Error> {
        let options = WindowOptions { resize: false, ..WindowOptions::default() };
        let mut window = Window::new(title, width, height, options)
            .map_err(|e| Error::WindowInit(e.to_string()))?;
        window.set_target_fps(PRESENT_FPS);
        Ok(Self { window })
    }

    /// Push the pixels for this frame to the screen (also pumps window events).
    pub fn present(&mut self, framebuffer: &FrameBuffer) -> Result<(), Error> {
        self.window
            .update_with_buffer(&framebuffer.pixels, framebuffer.width, framebuffer.height)
            .map_err(|e| Error::WindowUpdate(e.to_string()))
    }

    /// Returns false once the user closes the window.
    pub fn is_open(&self) -> bool {
        self.window.is_open()
    }

    pub fn esc_pressed(&self) -> bool {
        self.window.is_key_down(Key::Escape)
    }
}

/* ---------- Software drawing on the backbuffer ---------- */

/// Write `color` at (x,y) honoring the backbuffer's compositing mode.
/// Out-of-bounds writes are dropped.
#[inline]
fn put_pixel(back: &mut Backbuffer, x: i32, y: i32, color: Rgba<u8>) {
    if x < 0 || y < 0 || x as usize >= back.width() || y as usize >= back.height() {
        return;
    }
    let compositing = back.hints().compositing;
    let dst = back.image_mut().get_pixel_mut(x as u32, y as u32);
    match compositing {
        Compositing::SourceOver if color[3] < 255 => dst.blend(&color),
        _ => *dst = color,
    }
}

/// Mix `color` into (x,y) by `coverage` in linear light. Used for circle rims.
#[inline]
fn cover_pixel(back: &mut Backbuffer, lut: &GammaLut, x: i32, y: i32, color: Rgba<u8>, coverage: f32) {
    if x < 0 || y < 0 || x as usize >= back.width() || y as usize >= back.height() {
        return;
    }
    let alpha = coverage * color[3] as f32 / 255.0;
    if alpha <= 0.0 {
        return;
    }
    let dst = back.image_mut().get_pixel_mut(x as u32, y as u32);
    let [r, g, b] = lut.mix([dst[0], dst[1], dst[2]], [color[0], color[1], color[2]], alpha);
    *dst = Rgba([r, g, b, dst[3].max(color[3])]);
}

/// Fill the circle inscribed in the `ball`'s bounding box.
/// Anti-aliased backbuffers get a one-pixel soft rim; others test each sample point.
pub fn fill_ball(back: &mut Backbuffer, lut: &GammaLut, ball: &Ball, color: Rgba<u8>) {
    let hints = back.hints();
    let radius = ball.w as f32 / 2.0;
    let cx = ball.x as f32 + radius;
    let cy = ball.y as f32 + ball.h as f32 / 2.0;

    match hints.smoothing {
        Smoothing::None => {
            for py in ball.y..ball.y + ball.h {
                for px in ball.x..ball.x + ball.w {
                    let dx = hints.pixel_offset.sample(px) - cx;
                    let dy = hints.pixel_offset.sample(py) - cy;
                    if dx * dx + dy * dy <= radius * radius {
                        put_pixel(back, px, py, color);
                    }
                }
            }
        }
        Smoothing::AntiAlias => {
            // One extra pixel around the box catches the rim's outer half.
            for py in (ball.y - 1)..=(ball.y + ball.h) {
                for px in (ball.x - 1)..=(ball.x + ball.w) {
                    let dx = hints.pixel_offset.sample(px) - cx;
                    let dy = hints.pixel_offset.sample(py) - cy;
                    let dist = (dx * dx + dy * dy).sqrt();
                    let coverage = (radius - dist + 0.5).clamp(0.0, 1.0);
                    if coverage >= 1.0 && color[3] == 255 {
                        put_pixel(back, px, py, color);
                    } else if coverage > 0.0 {
                        cover_pixel(back, lut, px, py, color, coverage);
                    }
                }
            }
        }
    }
}

/* ---------- 5x7 bitmap font (just enough for "FPS: 123") ---------- */

/// Each u8 is a row; the low 5 bits are the pixels (bit 4 = leftmost).
fn glyph5x7(ch: char) -> Option<[u8; 7]> {
    macro_rules! g { ($a:expr,$b:expr,$c:expr,$d:expr,$e:expr,$f:expr,$g:expr) => {
        Some([$a,$b,$c,$d,$e,$f,$g])
    }; }

    match ch {
        '0' => g!(0b01110,0b10001,0b10011,0b10101,0b11001,0b10001,0b01110),
        '1' => g!(0b00100,0b01100,0b00100,0b00100,0b00100,0b00100,0b01110),
        '2' => g!(0b01110,0b10001,0b00001,0b00010,0b00100,0b01000,0b11111),
        '3' => g!(0b11110,0b00001,0b00001,0b01110,0b00001,0b00001,0b11110),
        '4' => g!(0b00010,0b00110,0b01010,0b10010,0b11111,0b00010,0b00010),
        '5' => g!(0b11111,0b10000,0b11110,0b00001,0b00001,0b10001,0b01110),
        '6' => g!(0b00110,0b01000,0b10000,0b11110,0b10001,0b10001,0b01110),
        '7' => g!(0b11111,0b00001,0b00010,0b00100,0b01000,0b01000,0b01000),
        '8' => g!(0b01110,0b10001,0b10001,0b01110,0b10001,0b10001,0b01110),
        '9' => g!(0b01110,0b10001,0b10001,0b01111,0b00001,0b00010,0b01100),
        'F' => g!(0b11111,0b10000,0b10000,0b11110,0b10000,0b10000,0b10000),
        'P' => g!(0b11110,0b10001,0b10001,0b11110,0b10000,0b10000,0b10000),
        'S' => g!(0b01111,0b10000,0b10000,0b01110,0b00001,0b00001,0b11110),
        ' ' => g!(0b00000,0b00000,0b00000,0b00000,0b00000,0b00000,0b00000),
        ':' => g!(0b00000,0b00100,0b00000,0b00000,0b00100,0b00000,0b00000),
        _ => None,
    }
}

#[inline]
fn glyph_bit(rows: &[u8; 7], gx: i32, gy: i32) -> bool {
    if !(0..5).contains(&gx) || !(0..7).contains(&gy) {
        return false;
    }
    rows[gy as usize] & (1 << (4 - gx)) != 0
}

/// Fill one glyph cell as a `scale x scale` block.
fn fill_cell(back: &mut Backbuffer, x: i32, y: i32, scale: i32, color: Rgba<u8>) {
    for sy in 0..scale {
        for sx in 0..scale {
            put_pixel(back, x + sx, y + sy, color);
        }
    }
}

/// Draw a single glyph with its top-left at (x,y).
/// With anti-aliased text, empty cells that close a diagonal step get half the alpha.
fn draw_char_5x7(back: &mut Backbuffer, x: i32, y: i32, ch: char, color: Rgba<u8>, scale: i32) {
    let Some(rows) = glyph5x7(ch) else { return };
    let smooth = back.hints().text == TextRendering::AntiAlias;
    let half = Rgba([color[0], color[1], color[2], color[3] / 2]);

    for gy in 0..7 {
        for gx in 0..5 {
            let (px, py) = (x + gx * scale, y + gy * scale);
            if glyph_bit(&rows, gx, gy) {
                fill_cell(back, px, py, scale, color);
            } else if smooth {
                let left = glyph_bit(&rows, gx - 1, gy);
                let right = glyph_bit(&rows, gx + 1, gy);
                let up = glyph_bit(&rows, gx, gy - 1);
                let down = glyph_bit(&rows, gx, gy + 1);
                if (left || right) && (up || down) {
                    fill_cell(back, px, py, scale, half);
                }
            }
        }
    }
}

/// Draw `text` with 5x7 glyphs at `scale`, one blank column between glyphs.
pub fn draw_text_5x7(back: &mut Backbuffer, mut x: i32, y: i32, text: &str, color: Rgba<u8>, scale: i32) {
    for ch in text.chars() {
        draw_char_5x7(back, x, y, ch, color, scale);
        x += 6 * scale;
    }
}

/* ---------- The sample scene ---------- */

/// Sky-blue background, one pale circle per ball, FPS in the top-left corner.
pub fn paint_scene(ctx: &mut DrawContext<'_>) -> anyhow::Result<()> {
    ctx.canvas.clear(DEEP_SKY_BLUE);
    for ball in ctx.balls {
        fill_ball(ctx.canvas, ctx.lut, ball, ALICE_BLUE);
    }
    if let Some(fps) = ctx.fps {
        draw_text_5x7(ctx.canvas, 8, 8, &format!("FPS: {fps}"), TRANSLUCENT_BLACK, 2);
    }
    Ok(())
}
