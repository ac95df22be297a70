//! Debug overlay: slot and belt boxes drawn over the analysed frame.

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;

use crate::calibration::Rect;
use crate::detection::pass::DetectionResult;

const SUPPRESSED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const MATCHED: Rgba<u8> = Rgba([0, 255, 0, 255]);
const UNKNOWN: Rgba<u8> = Rgba([255, 165, 0, 255]);
const BELT: Rgba<u8> = Rgba([0, 0, 255, 255]);

/// Outline thickness in pixels.
const THICKNESS: i32 = 2;

fn outline(img: &mut RgbaImage, rect: Rect, color: Rgba<u8>) {
    let Some(rect) = rect.clip(img.width(), img.height()) else {
        return;
    };
    for inset in 0..THICKNESS {
        let (w, h) = (rect.w - 2 * inset, rect.h - 2 * inset);
        if w <= 0 || h <= 0 {
            break;
        }
        let r = imageproc::rect::Rect::at(rect.x + inset, rect.y + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(img, r, color);
    }
}

/// Copy of `frame` with every slot outlined: red when suppressed, green when
/// identified, orange when unknown. Context belts are outlined in blue.
pub fn annotate(frame: &RgbaImage, results: &[DetectionResult]) -> RgbaImage {
    let mut out = frame.clone();
    for result in results {
        if let Some(belt) = result.belt {
            outline(&mut out, belt, BELT);
        }
        let color = if result.is_suppressed {
            SUPPRESSED
        } else if result.entity_id.is_some() {
            MATCHED
        } else {
            UNKNOWN
        };
        outline(&mut out, result.roi, color);
    }
    out
}
