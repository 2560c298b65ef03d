//! Full-frame blur with a sharp circular face window
//!
//! Each pass draws the frame, blurs the surface onto itself, then redraws the
//! raw frame inside a circle centred on the surface so the middle of the
//! picture (where the face usually is) stays sharp.

use super::blur::BlurQuality;
use super::surface::{CircleClip, DrawingSurface, Filter};
use crate::capture::Frame;

pub struct FaceWindowCompositor {
    blur_radius: f32,
    face_window_ratio: f32,
    quality: BlurQuality,
}

impl FaceWindowCompositor {
    pub fn new(blur_radius: f32, face_window_ratio: f32, quality: BlurQuality) -> Self {
        Self {
            blur_radius,
            face_window_ratio,
            quality,
        }
    }

    /// The sharp window for a `width`x`height` surface
    pub fn face_window(&self, width: u32, height: u32) -> CircleClip {
        CircleClip {
            cx: width as f32 / 2.0,
            cy: height as f32 / 2.0,
            radius: width.min(height) as f32 * self.face_window_ratio,
        }
    }

    /// Run one compositing pass
    pub fn composite(&self, surface: &mut DrawingSurface, frame: &Frame, blur_enabled: bool) {
        let (width, height) = frame.dimensions();
        surface.match_dimensions(width, height);

        surface.clear();
        surface.draw_image(frame.image());

        if !blur_enabled {
            return;
        }

        surface.save();
        surface.set_filter(Filter::Blur {
            sigma: self.blur_radius,
            quality: self.quality,
        });
        surface.draw_self();
        surface.restore();

        surface.save();
        surface.clip_circle(self.face_window(width, height));
        surface.draw_image(frame.image());
        surface.restore();
    }
}

impl Default for FaceWindowCompositor {
    fn default() -> Self {
        Self::new(12.0, 0.25, BlurQuality::Fast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn checkerboard(size: u32) -> Frame {
        let image = RgbaImage::from_fn(size, size, |x, y| {
            if ((x / 4) + (y / 4)) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        Frame::new(image, 0)
    }

    #[test]
    fn test_face_window_geometry() {
        let compositor = FaceWindowCompositor::default();
        let clip = compositor.face_window(640, 480);
        assert_eq!(clip.cx, 320.0);
        assert_eq!(clip.cy, 240.0);
        assert_eq!(clip.radius, 120.0);
    }

    #[test]
    fn test_blur_toggle_has_no_carryover() {
        let compositor = FaceWindowCompositor::default();
        let frame = checkerboard(64);
        let mut surface = DrawingSurface::new(0, 0);

        // off: exact copy of the frame
        compositor.composite(&mut surface, &frame, false);
        assert_eq!(surface.pixels(), frame.image());

        // on: blurred outside, sharp inside the window
        compositor.composite(&mut surface, &frame, true);
        assert_ne!(surface.pixels(), frame.image());
        assert_eq!(surface.pixels().get_pixel(32, 32), frame.image().get_pixel(32, 32));
        assert_eq!(surface.pixels().get_pixel(30, 40), frame.image().get_pixel(30, 40));
        assert_ne!(surface.pixels().get_pixel(1, 1), frame.image().get_pixel(1, 1));
        assert_ne!(surface.pixels().get_pixel(62, 62), frame.image().get_pixel(62, 62));

        // off again: sharp immediately
        compositor.composite(&mut surface, &frame, false);
        assert_eq!(surface.pixels(), frame.image());
        assert_eq!(surface.resize_count(), 1);
    }

    #[test]
    fn test_surface_follows_frame_size() {
        let compositor = FaceWindowCompositor::default();
        let mut surface = DrawingSurface::new(16, 16);

        compositor.composite(&mut surface, &checkerboard(32), true);
        assert_eq!(surface.dimensions(), (32, 32));

        compositor.composite(&mut surface, &checkerboard(32), false);
        assert_eq!(surface.resize_count(), 1);
    }
}
