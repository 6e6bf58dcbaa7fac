// Off-screen backbuffer and the visible surface it is blitted onto.
// The backbuffer is an RGBA image owned by the render thread. The visible
// surface is the `0x00RRGGBB` buffer the window presents; the render thread
// writes it with one unscaled copy per tick and the window thread reads it.

use std::sync::{Arc, Mutex};

use image::{Rgba, RgbaImage};

use crate::error::Error;
use crate::types::FrameBuffer;

/// How shapes are edged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Smoothing {
    None,
    AntiAlias,
}

/// How glyphs are edged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRendering {
    SystemDefault,
    AntiAlias,
}

/// What happens to the destination pixel when a source pixel lands on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositing {
    /// Blend by source alpha.
    SourceOver,
    /// Replace; alpha is discarded.
    SourceCopy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompositingQuality {
    HighSpeed,
    AssumeLinear,
}

/// Resampling filter. Blits here are never scaled, so this is informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Low,
    NearestNeighbor,
}

/// Where a pixel's sample point sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelOffset {
    /// Sample at the pixel centre (x + 0.5).
    Half,
    /// Sample at the integer coordinate.
    HighSpeed,
}

impl PixelOffset {
    #[inline]
    pub fn sample(self, coord: i32) -> f32 {
        match self {
            PixelOffset::Half => coord as f32 + 0.5,
            PixelOffset::HighSpeed => coord as f32,
        }
    }
}

/// The rendering-quality state bound to a drawing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderHints {
    pub smoothing: Smoothing,
    pub text: TextRendering,
    pub compositing: Compositing,
    pub compositing_quality: CompositingQuality,
    pub interpolation: Interpolation,
    pub pixel_offset: PixelOffset,
}

impl RenderHints {
    /// Hints for the backbuffer: smooth edges when `antialiasing`, otherwise
    /// hard edges; translucent draws always blend.
    pub fn backbuffer(antialiasing: bool) -> Self {
        let (smoothing, text) = if antialiasing {
            (Smoothing::AntiAlias, TextRendering::AntiAlias)
        } else {
            (Smoothing::None, TextRendering::SystemDefault)
        };
        Self {
            smoothing,
            text,
            compositing: Compositing::SourceOver,
            compositing_quality: CompositingQuality::HighSpeed,
            interpolation: Interpolation::Low,
            pixel_offset: PixelOffset::Half,
        }
    }

    /// Hints for the visible surface: everything is already composited on the
    /// backbuffer, so the blit is a raw copy.
    pub fn blit() -> Self {
        Self {
            smoothing: Smoothing::None,
            text: TextRendering::SystemDefault,
            compositing: Compositing::SourceCopy,
            compositing_quality: CompositingQuality::AssumeLinear,
            interpolation: Interpolation::NearestNeighbor,
            pixel_offset: PixelOffset::HighSpeed,
        }
    }
}

/// Off-screen RGBA buffer plus the hints its drawing context uses.
pub struct Backbuffer {
    image: RgbaImage,
    hints: RenderHints,
}

impl Backbuffer {
    /// Allocate a `width x height` transparent-black buffer.
    pub fn new(width: usize, height: usize, antialiasing: bool) -> Result<Self, Error> {
        let bytes = width
            .checked_mul(height)
            .and_then(|n| n.checked_mul(4))
            .filter(|&n| n > 0)
            .ok_or_else(|| Error::Allocation(format!("invalid backbuffer size {width}x{height}")))?;
        let w = u32::try_from(width)
            .map_err(|_| Error::Allocation(format!("backbuffer width {width} too large")))?;
        let h = u32::try_from(height)
            .map_err(|_| Error::Allocation(format!("backbuffer height {height} too large")))?;

        // Reserve up front so an out-of-memory is reported instead of aborting.
        let mut raw: Vec<u8> = Vec::new();
        raw.try_reserve_exact(bytes)
            .map_err(|e| Error::Allocation(format!("backbuffer {width}x{height}: {e}")))?;
        raw.resize(bytes, 0);

        let image = RgbaImage::from_raw(w, h, raw)
            .ok_or_else(|| Error::Allocation(format!("backbuffer {width}x{height}: size mismatch")))?;

        Ok(Self { image, hints: RenderHints::backbuffer(antialiasing) })
    }

    /// Re-apply the quality hints. Same flag in, same hints out.
    pub fn configure(&mut self, antialiasing: bool) {
        self.hints = RenderHints::backbuffer(antialiasing);
    }

    pub fn hints(&self) -> RenderHints {
        self.hints
    }

    pub fn width(&self) -> usize {
        self.image.width() as usize
    }

    pub fn height(&self) -> usize {
        self.image.height() as usize
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbaImage {
        &mut self.image
    }

    /// Fill every pixel with `color`, ignoring compositing.
    pub fn clear(&mut self, color: Rgba<u8>) {
        for px in self.image.pixels_mut() {
            *px = color;
        }
    }
}

/// The window-facing pixel buffer.
/// Cloning shares the same pixels; the render thread blits, the window thread copies out.
#[derive(Clone)]
pub struct Surface {
    frame: Arc<Mutex<FrameBuffer>>,
    hints: RenderHints,
}

impl Surface {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            frame: Arc::new(Mutex::new(FrameBuffer::new(width, height))),
            hints: RenderHints::blit(),
        }
    }

    pub fn hints(&self) -> RenderHints {
        self.hints
    }

    /// Copy the backbuffer onto the surface at (0,0), unscaled, alpha dropped.
    pub fn blit(&self, back: &Backbuffer) -> Result<(), Error> {
        let mut frame = self
            .frame
            .lock()
            .map_err(|_| Error::Blit("surface lock poisoned".into()))?;

        if frame.width != back.width() || frame.height != back.height() {
            return Err(Error::Blit(format!(
                "backbuffer {}x{} does not match surface {}x{}",
                back.width(),
                back.height(),
                frame.width,
                frame.height
            )));
        }

        // Pack each RGBA pixel as 0x00RRGGBB.
        for (dst, src) in frame.pixels.iter_mut().zip(back.image().pixels()) {
            let [r, g, b, _a] = src.0;
            *dst = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
        }
        Ok(())
    }

    /// Copy the latest surface contents into `out` (resized if needed).
    pub fn copy_into(&self, out: &mut FrameBuffer) -> Result<(), Error> {
        let frame = self
            .frame
            .lock()
            .map_err(|_| Error::WindowUpdate("surface lock poisoned".into()))?;
        out.width = frame.width;
        out.height = frame.height;
        out.pixels.clear();
        out.pixels.extend_from_slice(&frame.pixels);
        Ok(())
    }
}

/// The pair of drawing targets the render loop needs.
pub struct SurfaceManager {
    pub backbuffer: Backbuffer,
    pub surface: Surface,
}

impl SurfaceManager {
    /// Allocate the backbuffer and the visible surface, both `width x height`.
    pub fn initialize(width: usize, height: usize, antialiasing: bool) -> Result<Self, Error> {
        let backbuffer = Backbuffer::new(width, height, antialiasing)?;
        let surface = Surface::new(width, height);
        log::debug!(
            "Surfaces ready: {width}x{height}, backbuffer {:?}, surface {:?}",
            backbuffer.hints(),
            surface.hints()
        );
        Ok(Self { backbuffer, surface })
    }

    /// Handle the window thread keeps for presenting.
    pub fn surface(&self) -> Surface {
        self.surface.clone()
    }
}
