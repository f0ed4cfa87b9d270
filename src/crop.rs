//! Region extraction with bounds clamping.

use crate::error::PipelineError;
use crate::frame::Frame;
use crate::geometry::PixelRect;

/// Crop `rect` out of `image`.
///
/// The rectangle is widened to whole pixels (left/top floor, right/bottom
/// ceil) and intersected with the image. An empty intersection is
/// `EmptyCrop`; the source frame is never touched.
pub fn crop(image: &Frame, rect: &PixelRect) -> Result<Frame, PipelineError> {
    let (width, height) = image.dimensions();
    let empty = || PipelineError::EmptyCrop {
        x: rect.x,
        y: rect.y,
        width: rect.width,
        height: rect.height,
    };

    let x0 = rect.x.floor().max(0.0);
    let y0 = rect.y.floor().max(0.0);
    let x1 = rect.right().ceil().min(f64::from(width));
    let y1 = rect.bottom().ceil().min(f64::from(height));

    // NaN fails both comparisons and lands here too.
    if !(x1 > x0 && y1 > y0) {
        return Err(empty());
    }

    let (x0, y0, x1, y1) = (x0 as u32, y0 as u32, x1 as u32, y1 as u32);
    Ok(image.region(x0, y0, x1 - x0, y1 - y0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn checker(width: u32, height: u32) -> Frame {
        Frame::from_rgb(RgbImage::from_fn(width, height, |x, y| {
            Rgb([x as u8, y as u8, 7])
        }))
    }

    fn rect(x: f64, y: f64, width: f64, height: f64) -> PixelRect {
        PixelRect {
            x,
            y,
            width,
            height,
        }
    }

    #[test]
    fn inside_rect_has_exact_size() {
        let image = checker(100, 80);
        let out = crop(&image, &rect(10.0, 20.0, 30.0, 40.0)).unwrap();
        assert_eq!(out.dimensions(), (30, 40));
        assert_eq!(out.as_rgb().get_pixel(0, 0), &Rgb([10, 20, 7]));
        assert_eq!(out.as_rgb().get_pixel(29, 39), &Rgb([39, 59, 7]));
    }

    #[test]
    fn overhanging_rect_is_clipped_to_intersection() {
        let image = checker(100, 80);
        let out = crop(&image, &rect(-10.0, 60.0, 50.0, 50.0)).unwrap();
        assert_eq!(out.dimensions(), (40, 20));
        assert_eq!(out.as_rgb().get_pixel(0, 0), &Rgb([0, 60, 7]));

        let covering = crop(&image, &rect(-5.0, -5.0, 500.0, 500.0)).unwrap();
        assert_eq!(covering.dimensions(), (100, 80));
    }

    #[test]
    fn fractional_edges_round_outward() {
        let image = checker(100, 80);
        let out = crop(&image, &rect(10.4, 20.6, 9.2, 9.0)).unwrap();
        // x: floor(10.4)=10 .. ceil(19.6)=20, y: floor(20.6)=20 .. ceil(29.6)=30
        assert_eq!(out.dimensions(), (10, 10));
    }

    #[test]
    fn disjoint_or_degenerate_rect_is_empty_crop() {
        let image = checker(100, 80);
        for r in [
            rect(150.0, 10.0, 20.0, 20.0),
            rect(-40.0, 10.0, 20.0, 20.0),
            rect(10.0, 80.0, 20.0, 20.0),
            rect(10.0, 10.0, 0.0, 20.0),
            rect(10.0, 10.0, -5.0, 20.0),
            rect(f64::NAN, 10.0, 20.0, 20.0),
        ] {
            assert!(
                matches!(crop(&image, &r), Err(PipelineError::EmptyCrop { .. })),
                "{r:?}"
            );
        }
    }

    #[test]
    fn source_is_not_modified() {
        let image = checker(20, 20);
        let before = image.to_rgb();
        let _ = crop(&image, &rect(2.0, 2.0, 5.0, 5.0)).unwrap();
        assert_eq!(image.as_rgb(), &before);
    }
}
