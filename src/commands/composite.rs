//! `composite`: run the face window compositor on an image file

use crate::capture::Frame;
use crate::compositor::{BlurQuality, DrawingSurface, FaceWindowCompositor};
use crate::utils::error::AppResult;
use clap::Args;
use std::path::{Path, PathBuf};

#[derive(Debug, Args)]
pub struct CompositeArgs {
    /// Input image
    pub input: PathBuf,

    /// Output image; the format follows the extension
    pub output: PathBuf,

    /// Blur strength in pixels
    #[arg(long, default_value_t = 12.0)]
    pub blur_radius: f32,

    /// Face window radius as a fraction of the shorter side
    #[arg(long, default_value_t = 0.25)]
    pub face_window_ratio: f32,

    #[arg(long, value_enum, default_value_t = BlurQuality::Gaussian)]
    pub quality: BlurQuality,

    /// Draw the frame without blur
    #[arg(long)]
    pub no_blur: bool,
}

pub fn composite_file(args: &CompositeArgs) -> AppResult<()> {
    let (width, height) = composite_image(
        &args.input,
        &args.output,
        FaceWindowCompositor::new(args.blur_radius, args.face_window_ratio, args.quality),
        !args.no_blur,
    )?;
    println!("Wrote {}x{} image to {}", width, height, args.output.display());
    Ok(())
}

fn composite_image(
    input: &Path,
    output: &Path,
    compositor: FaceWindowCompositor,
    blur: bool,
) -> AppResult<(u32, u32)> {
    let image = image::open(input)?.to_rgba8();
    let frame = Frame::new(image, 0);
    tracing::debug!("Compositing {:?} ({}x{})", input, frame.width(), frame.height());

    let mut surface = DrawingSurface::new(0, 0);
    compositor.composite(&mut surface, &frame, blur);
    surface.pixels().save(output)?;

    Ok(surface.dimensions())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::tempdir;

    #[test]
    fn test_composite_image_writes_output() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        let source = RgbaImage::from_fn(40, 30, |x, _| {
            if x % 2 == 0 {
                Rgba([0, 0, 0, 255])
            } else {
                Rgba([255, 255, 255, 255])
            }
        });
        source.save(&input).unwrap();

        let size = composite_image(&input, &output, FaceWindowCompositor::default(), true).unwrap();
        assert_eq!(size, (40, 30));

        let written = image::open(&output).unwrap().to_rgba8();
        assert_eq!(written.dimensions(), (40, 30));
        // Centre is inside the sharp window, the corner is not
        assert_eq!(written.get_pixel(20, 15), source.get_pixel(20, 15));
        assert_ne!(written.get_pixel(0, 0), source.get_pixel(0, 0));
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let dir = tempdir().unwrap();
        let result = composite_image(
            &dir.path().join("missing.png"),
            &dir.path().join("out.png"),
            FaceWindowCompositor::default(),
            false,
        );
        assert!(result.is_err());
    }
}
