//! Mask-driven background blur
//!
//! Layer order per pass:
//! 1. mask as an alpha layer
//! 2. `source-in` raw frame: only foreground survives, sharp
//! 3. `destination-over` blurred frame: background fills in behind
//! 4. `destination-over` raw frame: anything still transparent shows the raw frame
//!
//! For opaque input the result is `fg * conf + blurred * (1 - conf)`.

use super::blur::BlurQuality;
use super::surface::{CompositeOp, DrawingSurface, Filter};
use crate::capture::Frame;
use crate::segmentation::SegmentationMask;

pub struct MaskCompositor {
    blur_radius: f32,
    quality: BlurQuality,
}

impl MaskCompositor {
    pub fn new(blur_radius: f32, quality: BlurQuality) -> Self {
        Self {
            blur_radius,
            quality,
        }
    }

    /// Run one compositing pass for a model callback
    pub fn composite(&self, surface: &mut DrawingSurface, frame: &Frame, mask: Option<&SegmentationMask>) {
        let (width, height) = frame.dimensions();
        surface.match_dimensions(width, height);
        surface.clear();

        let Some(mask) = mask else {
            surface.draw_image(frame.image());
            return;
        };

        surface.save();
        surface.draw_image(&mask.to_alpha_image(width, height));

        surface.set_composite(CompositeOp::SourceIn);
        surface.draw_image(frame.image());

        surface.set_composite(CompositeOp::DestinationOver);
        surface.set_filter(Filter::Blur {
            sigma: self.blur_radius,
            quality: self.quality,
        });
        surface.draw_image(frame.image());

        surface.set_filter(Filter::None);
        surface.draw_image(frame.image());
        surface.restore();
    }
}

impl Default for MaskCompositor {
    fn default() -> Self {
        Self::new(10.0, BlurQuality::Fast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn stripes(size: u32) -> Frame {
        let image = RgbaImage::from_fn(size, size, |x, _| {
            if (x / 2) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        Frame::new(image, 3)
    }

    #[test]
    fn test_foreground_sharp_background_blurred() {
        let compositor = MaskCompositor::default();
        let frame = stripes(32);
        // Left half person, right half background
        let mask = SegmentationMask::new(2, 1, vec![1.0, 0.0]).unwrap();
        let mut surface = DrawingSurface::new(32, 32);

        compositor.composite(&mut surface, &frame, Some(&mask));

        for y in 0..32 {
            for x in 0..16 {
                assert_eq!(surface.pixels().get_pixel(x, y), frame.image().get_pixel(x, y));
            }
        }
        let blurred_differs = (16..32).any(|x| surface.pixels().get_pixel(x, 10) != frame.image().get_pixel(x, 10));
        assert!(blurred_differs);
        assert!(surface.pixels().pixels().all(|p| p[3] == 255));
    }

    #[test]
    fn test_missing_mask_draws_raw_frame() {
        let compositor = MaskCompositor::default();
        let frame = stripes(16);
        let mut surface = DrawingSurface::new(0, 0);

        compositor.composite(&mut surface, &frame, None);

        assert_eq!(surface.pixels(), frame.image());
        assert_eq!(surface.resize_count(), 1);
    }

    #[test]
    fn test_full_foreground_mask_keeps_frame() {
        let compositor = MaskCompositor::default();
        let frame = stripes(16);
        let mask = SegmentationMask::uniform(4, 4, 1.0);
        let mut surface = DrawingSurface::new(16, 16);

        compositor.composite(&mut surface, &frame, Some(&mask));

        assert_eq!(surface.pixels(), frame.image());
    }
}
