/// Image utilities for drawing detections
use crate::types::Detection;
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

/// Deterministic, reasonably dark color for a class label
pub fn generate_class_color(class_id: u32) -> Rgb<u8> {
    // Use a simple hash to generate pseudo-random but deterministic values
    let mut hash = class_id.wrapping_mul(2654435761); // Golden ratio prime

    let r = (hash & 0xFF) as u16;
    hash = hash.wrapping_mul(2654435761);
    let g = (hash & 0xFF) as u16;
    hash = hash.wrapping_mul(2654435761);
    let b = (hash & 0xFF) as u16;

    // Cap at 180 per channel, keep the dominant channel at least 100
    let max_value = 180u16;
    let min_bright = 100u16;

    let r = (r.min(max_value)).max(if r > g && r > b { min_bright } else { 40 });
    let g = (g.min(max_value)).max(if g > r && g > b { min_bright } else { 40 });
    let b = (b.min(max_value)).max(if b > r && b > g { min_bright } else { 40 });

    Rgb([r as u8, g as u8, b as u8])
}

/// Draw a rectangle outline `thickness` pixels wide, growing outwards
pub fn draw_rect(
    img: &mut RgbImage,
    x: i32,
    y: i32,
    width: u32,
    height: u32,
    color: Rgb<u8>,
    thickness: i32,
) {
    if width == 0 || height == 0 {
        return;
    }

    for offset in 0..thickness.max(1) {
        let rect = Rect::at(x - offset, y - offset).of_size(
            width + (offset * 2) as u32,
            height + (offset * 2) as u32,
        );
        draw_hollow_rect_mut(img, rect, color);
    }
}

/// Outline every detection. Boxes must already be in the image's pixel space.
pub fn draw_detections(img: &mut RgbImage, detections: &[Detection], thickness: i32) {
    for det in detections {
        let [x, y, w, h] = det.bounding;
        draw_rect(
            img,
            x.round() as i32,
            y.round() as i32,
            w.round().max(0.0) as u32,
            h.round().max(0.0) as u32,
            generate_class_color(det.label),
            thickness,
        );
    }
}
