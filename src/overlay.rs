//! Overlay drawing: detection boxes and a small bitmap font for status text.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::BoundingBox;

pub const FPS_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const SOURCE_COLOR: Rgb<u8> = Rgb([255, 255, 0]);

const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: i32 = 2;
const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;

/// Box colors, cycled by category index.
const PALETTE: [Rgb<u8>; 6] = [
    Rgb([255, 56, 56]),
    Rgb([255, 157, 151]),
    Rgb([255, 112, 31]),
    Rgb([72, 249, 10]),
    Rgb([0, 194, 255]),
    Rgb([132, 56, 255]),
];

pub fn palette_color(index: usize) -> Rgb<u8> {
    PALETTE[index % PALETTE.len()]
}

/// Draw one detection box with a filled label tab above it.
pub fn draw_detection(image: &mut RgbImage, bbox: &BoundingBox, label: &str, color_index: usize) {
    let color = palette_color(color_index);
    let (x, y, w, h) = bbox.to_pixel_rect(image.width(), image.height());
    if w == 0 || h == 0 {
        return;
    }
    for t in 0..BOX_THICKNESS {
        let inner_w = w.saturating_sub(2 * t as u32);
        let inner_h = h.saturating_sub(2 * t as u32);
        if inner_w == 0 || inner_h == 0 {
            break;
        }
        draw_hollow_rect_mut(
            image,
            Rect::at(x + t, y + t).of_size(inner_w, inner_h),
            color,
        );
    }

    let scale = 1;
    let tab_h = (GLYPH_HEIGHT + 4) * scale;
    let tab_w = text_width(label, scale) + 4;
    let tab_y = if y >= tab_h { y - tab_h } else { y };
    draw_filled_rect_mut(
        image,
        Rect::at(x, tab_y).of_size(tab_w.max(1) as u32, tab_h as u32),
        color,
    );
    draw_text(image, x + 2, tab_y + 2, label, LABEL_TEXT_COLOR, scale);
}

/// Width in pixels of `text` rendered at `scale`.
pub fn text_width(text: &str, scale: i32) -> i32 {
    text.chars().count() as i32 * (GLYPH_WIDTH + 1) * scale
}

/// Render `text` with its top-left corner at (x, y). Lowercase letters are
/// drawn as uppercase; characters without a glyph advance as blanks.
pub fn draw_text(image: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>, scale: i32) {
    let scale = scale.max(1);
    let mut cursor = x;
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        draw_filled_rect_mut(
                            image,
                            Rect::at(cursor + col * scale, y + row as i32 * scale)
                                .of_size(scale as u32, scale as u32),
                            color,
                        );
                    }
                }
            }
        }
        cursor += (GLYPH_WIDTH + 1) * scale;
    }
}

fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11111, 0b00010, 0b00100, 0b00010, 0b00001, 0b10001, 0b01110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '.' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b01100, 0b01100],
        ':' => [0b00000, 0b01100, 0b01100, 0b00000, 0b01100, 0b01100, 0b00000],
        '-' => [0b00000, 0b00000, 0b00000, 0b11111, 0b00000, 0b00000, 0b00000],
        '_' => [0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b00000, 0b11111],
        '/' => [0b00000, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b00000],
        '%' => [0b11000, 0b11001, 0b00010, 0b00100, 0b01000, 0b10011, 0b00011],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([0, 0, 0]))
    }

    fn lit_pixels(image: &RgbImage) -> usize {
        image.pixels().filter(|p| p.0 != [0, 0, 0]).count()
    }

    #[test]
    fn text_is_case_insensitive() {
        let mut upper = blank(120, 20);
        let mut lower = blank(120, 20);
        draw_text(&mut upper, 1, 1, "FPS: 9.5", FPS_COLOR, 1);
        draw_text(&mut lower, 1, 1, "fps: 9.5", FPS_COLOR, 1);
        assert_eq!(upper.as_raw(), lower.as_raw());
        assert!(lit_pixels(&upper) > 0);
    }

    #[test]
    fn text_past_the_edge_is_clipped() {
        let mut image = blank(16, 8);
        draw_text(&mut image, 10, 4, "STREAM", SOURCE_COLOR, 3);
        assert!(lit_pixels(&image) > 0);
    }

    #[test]
    fn detection_box_outline_uses_palette() {
        let mut image = blank(100, 100);
        let bbox = BoundingBox::new(20.0, 30.0, 80.0, 90.0);
        draw_detection(&mut image, &bbox, "x", 1);
        assert_eq!(*image.get_pixel(20, 60), palette_color(1));
        assert_eq!(*image.get_pixel(50, 89), palette_color(1));
        // interior stays untouched
        assert_eq!(*image.get_pixel(50, 60), Rgb([0, 0, 0]));
    }

    #[test]
    fn degenerate_boxes_are_ignored() {
        let mut image = blank(50, 50);
        draw_detection(&mut image, &BoundingBox::new(10.0, 10.0, 10.0, 40.0), "x", 0);
        assert_eq!(lit_pixels(&image), 0);
    }
}
