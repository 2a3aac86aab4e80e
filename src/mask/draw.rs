// 描画: マスク領域の塗りつぶしと診断用の枠線

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};

use crate::detect::Rect;

/// Colour used for redaction.
pub const REDACTION_COLOR: Rgb<u8> = Rgb([0, 0, 0]);

/// Outline colour for unverified areas of interest.
pub const AREA_OF_INTEREST_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
/// Outline colour for verified maskable areas.
pub const MASKABLE_AREA_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
/// Outline colour for individual detected features.
pub const DETECTED_FEATURE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Outline thickness in pixels.
pub const OUTLINE_THICKNESS: u32 = 2;

fn to_imageproc(rect: &Rect) -> imageproc::rect::Rect {
    imageproc::rect::Rect::at(rect.x as i32, rect.y as i32).of_size(rect.width, rect.height)
}

/// 指定領域を不透明な黒で塗りつぶす。空の矩形は何もしない。
pub fn fill_area(image: &mut RgbImage, area: &Rect) {
    if area.is_empty() {
        return;
    }
    draw_filled_rect_mut(image, to_imageproc(area), REDACTION_COLOR);
}

pub fn fill_areas(image: &mut RgbImage, areas: &[Rect]) {
    for area in areas {
        fill_area(image, area);
    }
}

/// 矩形の枠線を描く（内側に向かって `OUTLINE_THICKNESS` ピクセル）。
pub fn outline_areas(image: &mut RgbImage, areas: &[Rect], color: Rgb<u8>) {
    for area in areas {
        for inset in 0..OUTLINE_THICKNESS {
            let w = area.width.saturating_sub(inset * 2);
            let h = area.height.saturating_sub(inset * 2);
            if w == 0 || h == 0 {
                break;
            }
            let ring = Rect::new(area.x + inset, area.y + inset, w, h);
            draw_hollow_rect_mut(image, to_imageproc(&ring), color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_area_is_opaque_and_bounded() {
        let mut img = RgbImage::from_pixel(20, 20, Rgb([255, 255, 255]));
        let area = Rect::new(5, 5, 10, 10);
        fill_area(&mut img, &area);

        for (x, y, p) in img.enumerate_pixels() {
            let inside = area.contains(&Rect::new(x, y, 1, 1));
            if inside {
                assert_eq!(*p, REDACTION_COLOR, "({x},{y}) should be redacted");
            } else {
                assert_eq!(*p, Rgb([255, 255, 255]), "({x},{y}) should be untouched");
            }
        }
    }

    #[test]
    fn test_fill_empty_area_is_noop() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([9, 9, 9]));
        fill_area(&mut img, &Rect::new(1, 1, 0, 3));
        assert!(img.pixels().all(|p| *p == Rgb([9, 9, 9])));
    }

    #[test]
    fn test_outline_leaves_interior() {
        let mut img = RgbImage::from_pixel(20, 20, Rgb([255, 255, 255]));
        outline_areas(&mut img, &[Rect::new(2, 2, 10, 10)], DETECTED_FEATURE_COLOR);

        assert_eq!(*img.get_pixel(2, 2), DETECTED_FEATURE_COLOR);
        assert_eq!(*img.get_pixel(3, 3), DETECTED_FEATURE_COLOR);
        assert_eq!(*img.get_pixel(7, 7), Rgb([255, 255, 255]));
        assert_eq!(*img.get_pixel(15, 15), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_outline_tiny_rect() {
        let mut img = RgbImage::from_pixel(5, 5, Rgb([255, 255, 255]));
        outline_areas(&mut img, &[Rect::new(1, 1, 1, 1)], MASKABLE_AREA_COLOR);
        assert_eq!(*img.get_pixel(1, 1), MASKABLE_AREA_COLOR);
    }
}
