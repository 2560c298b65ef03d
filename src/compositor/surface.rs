//! Off-screen drawing surface
//!
//! A small RGBA canvas with the handful of 2D drawing operations the
//! compositors need: clear, full-size image draws, Porter-Duff composite
//! modes, a blur filter, a circular clip, and a save/restore state stack.

use super::blur::{blur, BlurQuality};
use crate::capture::Frame;
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

/// Porter-Duff compositing mode applied by `draw_image`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositeOp {
    /// Source painted over destination
    #[default]
    SourceOver,
    /// Source kept only where destination is opaque; destination discarded
    SourceIn,
    /// Source painted behind destination
    DestinationOver,
}

impl CompositeOp {
    /// Coefficients `(Fa, Fb)` applied to premultiplied source and destination
    fn factors(self, sa: f32, da: f32) -> (f32, f32) {
        match self {
            CompositeOp::SourceOver => (1.0, 1.0 - sa),
            CompositeOp::SourceIn => (da, 0.0),
            CompositeOp::DestinationOver => (1.0 - da, 1.0),
        }
    }
}

/// Filter applied to the source image before compositing
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Filter {
    #[default]
    None,
    Blur { sigma: f32, quality: BlurQuality },
}

/// Circular clip region in surface pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircleClip {
    pub cx: f32,
    pub cy: f32,
    pub radius: f32,
}

impl CircleClip {
    /// Whether the centre of pixel `(x, y)` lies inside the circle
    pub fn contains(&self, x: u32, y: u32) -> bool {
        let dx = x as f32 + 0.5 - self.cx;
        let dy = y as f32 + 0.5 - self.cy;
        dx * dx + dy * dy <= self.radius * self.radius
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct DrawState {
    composite: CompositeOp,
    filter: Filter,
    clip: Option<CircleClip>,
}

/// The compositing target and recording source
pub struct DrawingSurface {
    pixels: RgbaImage,
    state: DrawState,
    saved: Vec<DrawState>,
    resize_count: u64,
}

impl DrawingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
            state: DrawState::default(),
            saved: Vec::new(),
            resize_count: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// How many times the surface has been resized since creation
    pub fn resize_count(&self) -> u64 {
        self.resize_count
    }

    /// Current composited pixels
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Resize to `width`x`height` if the dimensions differ.
    ///
    /// Returns whether a resize happened. Resizing discards the content and
    /// resets the drawing state, like a canvas does.
    pub fn match_dimensions(&mut self, width: u32, height: u32) -> bool {
        if self.dimensions() == (width, height) {
            return false;
        }
        tracing::debug!(
            "Resizing drawing surface {}x{} -> {}x{}",
            self.width(),
            self.height(),
            width,
            height
        );
        self.pixels = RgbaImage::new(width, height);
        self.state = DrawState::default();
        self.saved.clear();
        self.resize_count += 1;
        true
    }

    /// Make every pixel fully transparent
    pub fn clear(&mut self) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    /// Push the current drawing state
    pub fn save(&mut self) {
        self.saved.push(self.state);
    }

    /// Pop the last saved drawing state; no-op when nothing was saved
    pub fn restore(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
    }

    pub fn set_composite(&mut self, op: CompositeOp) {
        self.state.composite = op;
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.state.filter = filter;
    }

    /// Restrict subsequent draws to a circle
    pub fn clip_circle(&mut self, clip: CircleClip) {
        self.state.clip = Some(clip);
    }

    /// Draw `source` stretched over the whole surface using the current state
    pub fn draw_image(&mut self, source: &RgbaImage) {
        let (width, height) = self.dimensions();
        if width == 0 || height == 0 || source.width() == 0 || source.height() == 0 {
            return;
        }

        let scaled;
        let source = if source.dimensions() != (width, height) {
            scaled = imageops::resize(source, width, height, FilterType::Triangle);
            &scaled
        } else {
            source
        };

        let filtered;
        let source = match self.state.filter {
            Filter::None => source,
            Filter::Blur { sigma, quality } => {
                filtered = blur(source, sigma, quality);
                &filtered
            }
        };

        let op = self.state.composite;
        let clip = self.state.clip;
        for (x, y, dst) in self.pixels.enumerate_pixels_mut() {
            if let Some(clip) = clip {
                if !clip.contains(x, y) {
                    continue;
                }
            }
            *dst = composite_pixel(op, *source.get_pixel(x, y), *dst);
        }
    }

    /// Draw the surface's own current content back onto itself
    pub fn draw_self(&mut self) {
        let current = self.pixels.clone();
        self.draw_image(&current);
    }

    /// Copy the composited output into a frame
    pub fn to_frame(&self, sequence: u64) -> Frame {
        Frame::new(self.pixels.clone(), sequence)
    }
}

fn composite_pixel(op: CompositeOp, src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    if op == CompositeOp::SourceOver && src[3] == 255 {
        return src;
    }

    let sa = src[3] as f32 / 255.0;
    let da = dst[3] as f32 / 255.0;
    let (fa, fb) = op.factors(sa, da);

    let alpha = sa * fa + da * fb;
    if alpha <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let value = (src[c] as f32 * sa * fa + dst[c] as f32 * da * fb) / alpha;
        out[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (alpha * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}
