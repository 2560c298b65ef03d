//! Blur filter
//!
//! Blurring happens on premultiplied pixels so transparent regions do not
//! bleed dark fringes into their neighbours.

use image::{imageops, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

/// Which blur implementation to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BlurQuality {
    /// Box-blur approximation, fast enough for live preview
    #[default]
    Fast,
    /// True separable Gaussian
    Gaussian,
}

/// Blur `source` with standard deviation `sigma` (in pixels)
pub fn blur(source: &RgbaImage, sigma: f32, quality: BlurQuality) -> RgbaImage {
    if sigma <= 0.0 || source.width() == 0 || source.height() == 0 {
        return source.clone();
    }

    let premultiplied = premultiply(source);
    let blurred = match quality {
        BlurQuality::Fast => imageops::fast_blur(&premultiplied, sigma),
        BlurQuality::Gaussian => imageops::blur(&premultiplied, sigma),
    };
    unpremultiply(blurred)
}

fn premultiply(source: &RgbaImage) -> RgbaImage {
    let mut out = source.clone();
    for pixel in out.pixels_mut() {
        let a = pixel[3] as u32;
        if a == 255 {
            continue;
        }
        for c in 0..3 {
            pixel[c] = ((pixel[c] as u32 * a + 127) / 255) as u8;
        }
    }
    out
}

fn unpremultiply(mut image: RgbaImage) -> RgbaImage {
    for pixel in image.pixels_mut() {
        let a = pixel[3] as u32;
        if a == 255 {
            continue;
        }
        if a == 0 {
            *pixel = Rgba([0, 0, 0, 0]);
            continue;
        }
        for c in 0..3 {
            pixel[c] = ((pixel[c] as u32 * 255 + a / 2) / a).min(255) as u8;
        }
    }
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stripes() -> RgbaImage {
        RgbaImage::from_fn(32, 32, |x, _| {
            if (x / 4) % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        })
    }

    #[test]
    fn test_zero_sigma_is_identity() {
        let source = stripes();
        assert_eq!(blur(&source, 0.0, BlurQuality::Fast), source);
    }

    #[test]
    fn test_blur_softens_edges() {
        let source = stripes();
        for quality in [BlurQuality::Fast, BlurQuality::Gaussian] {
            let blurred = blur(&source, 6.0, quality);
            assert_eq!(blurred.dimensions(), source.dimensions());
            // A black stripe pixel picks up light from its white neighbours
            let value = blurred.get_pixel(2, 16)[0];
            assert!(value > 20, "{:?} left pixel too dark: {}", quality, value);
            assert!(value < 235, "{:?} left pixel too bright: {}", quality, value);
        }
    }

    #[test]
    fn test_transparent_pixels_stay_clean() {
        let mut source = RgbaImage::new(16, 16);
        for x in 0..8 {
            for y in 0..16 {
                source.put_pixel(x, y, Rgba([200, 100, 50, 255]));
            }
        }
        let blurred = blur(&source, 2.0, BlurQuality::Gaussian);
        // Colour next to the transparent edge keeps its hue instead of darkening
        let edge = blurred.get_pixel(8, 8);
        assert!(edge[3] > 0);
        assert!(edge[0] > 150);
    }
}
