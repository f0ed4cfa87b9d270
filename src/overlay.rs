//! Visual feedback: detection boxes and labels drawn on a copy of the frame.

use std::convert::Infallible;

use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::Rgb888,
    prelude::*,
    text::{Baseline, Text},
};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;

use crate::frame::Frame;
use crate::geometry::PixelRect;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb888 = Rgb888::WHITE;

/// Box width divided by this gives the stroke width.
const STROKE_DIVISOR: f64 = 20.0;
/// Box width divided by this gives the label height in pixels.
const FONT_DIVISOR: f64 = 5.0;

/// `FONT_6X10` cell, spacing included.
const GLYPH_W: u32 = 6;
const GLYPH_H: u32 = 10;
/// Background margin around the text, in font pixels.
const PAD: u32 = 1;
const CELL_H: u32 = GLYPH_H + 2 * PAD;

/// Draw every box, with `labels[i]` at the top-left of `boxes[i]` when
/// present. Boxes past the end of `labels` are drawn without text.
pub fn render<S: AsRef<str>>(image: &Frame, boxes: &[PixelRect], labels: &[S]) -> Frame {
    if boxes.is_empty() {
        return image.clone();
    }

    let mut canvas = image.to_rgb();
    for (index, rect) in boxes.iter().enumerate() {
        stroke_rect(&mut canvas, rect);
        if let Some(label) = labels.get(index) {
            draw_label(&mut canvas, rect, label.as_ref());
        }
    }
    Frame::from_rgb(canvas)
}

fn stroke_rect(canvas: &mut RgbImage, rect: &PixelRect) {
    if !(rect.width > 0.0 && rect.height > 0.0) {
        return;
    }
    let thickness = (rect.width / STROKE_DIVISOR).round().max(1.0);
    let half = thickness / 2.0;
    let outer_x = rect.x - half;
    let outer_y = rect.y - half;
    let outer_w = rect.width + thickness;
    let outer_h = rect.height + thickness;

    // Stroke is centered on the box edge, one filled band per side.
    fill(canvas, outer_x, outer_y, outer_w, thickness, BOX_COLOR);
    fill(canvas, outer_x, rect.bottom() - half, outer_w, thickness, BOX_COLOR);
    fill(canvas, outer_x, outer_y, thickness, outer_h, BOX_COLOR);
    fill(canvas, rect.right() - half, outer_y, thickness, outer_h, BOX_COLOR);
}

fn draw_label(canvas: &mut RgbImage, rect: &PixelRect, text: &str) {
    let columns = text.chars().count() as u32;
    if columns == 0 || !(rect.width > 0.0) {
        return;
    }
    let font_px = rect.width / FONT_DIVISOR;
    let unit = (font_px / f64::from(CELL_H)).round().max(1.0);
    let block_w = f64::from(columns * GLYPH_W + 2 * PAD) * unit;
    let block_h = f64::from(CELL_H) * unit;

    // Sits on top of the box edge, pushed back inside the image if needed.
    let max_x = (f64::from(canvas.width()) - block_w).max(0.0);
    let max_y = (f64::from(canvas.height()) - block_h).max(0.0);
    let left = rect.x.clamp(0.0, max_x);
    let top = (rect.y - block_h).clamp(0.0, max_y);

    fill(canvas, left, top, block_w, block_h, BOX_COLOR);

    let style = MonoTextStyle::new(&FONT_6X10, TEXT_COLOR);
    let mut target = ScaledTarget {
        canvas,
        left,
        top,
        unit,
    };
    let origin = Point::new(PAD as i32, PAD as i32);
    let _ = Text::with_baseline(text, origin, style, Baseline::Top).draw(&mut target);
}

/// Draws font pixels onto the canvas as `unit`-sized squares.
struct ScaledTarget<'a> {
    canvas: &'a mut RgbImage,
    left: f64,
    top: f64,
    unit: f64,
}

impl OriginDimensions for ScaledTarget<'_> {
    fn size(&self) -> Size {
        let scale = |px: u32| (f64::from(px) / self.unit).ceil() as u32;
        Size::new(scale(self.canvas.width()), scale(self.canvas.height()))
    }
}

impl DrawTarget for ScaledTarget<'_> {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(coord, color) in pixels {
            fill(
                &mut *self.canvas,
                self.left + f64::from(coord.x) * self.unit,
                self.top + f64::from(coord.y) * self.unit,
                self.unit,
                self.unit,
                Rgb([color.r(), color.g(), color.b()]),
            );
        }
        Ok(())
    }
}

/// Fill a float rectangle, clipped to the canvas before it reaches imageproc
/// so wild detector boxes never overflow `Rect` arithmetic.
fn fill(canvas: &mut RgbImage, x: f64, y: f64, width: f64, height: f64, color: Rgb<u8>) {
    let x0 = x.round().max(0.0);
    let y0 = y.round().max(0.0);
    let x1 = (x + width).round().min(f64::from(canvas.width()));
    let y1 = (y + height).round().min(f64::from(canvas.height()));
    if !(x1 > x0 && y1 > y0) {
        return;
    }
    let rect = Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32);
    draw_filled_rect_mut(canvas, rect, color);
}
