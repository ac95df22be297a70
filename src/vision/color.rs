//! Color statistics over screen regions.

use image::RgbaImage;

use crate::config::HueBand;

/// HSV triple, 8-bit convention: hue in 0..=180 (degrees / 2), S and V in 0..=255.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

/// Converts one RGB pixel to HSV.
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let vf = v as f32;
    let diff = vf - min as f32;

    let s = if v == 0 {
        0
    } else {
        (255.0 * diff / vf).round() as u8
    };

    let h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (gf - bf) / diff
    } else if v == g {
        120.0 + 60.0 * (bf - rf) / diff
    } else {
        240.0 + 60.0 * (rf - gf) / diff
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    Hsv {
        h: (h / 2.0).round().min(180.0) as u8,
        s,
        v,
    }
}

/// Mean saturation and mean value of a region, or `None` for an empty region.
///
/// Low saturation = greyed out, low value = darkened.
pub fn saturation_value_means(img: &RgbaImage) -> Option<(f32, f32)> {
    if img.width() == 0 || img.height() == 0 {
        return None;
    }

    let mut s_total: f64 = 0.0;
    let mut v_total: f64 = 0.0;
    let pixel_count = (img.width() as u64 * img.height() as u64) as f64;

    for pixel in img.pixels() {
        let hsv = rgb_to_hsv(pixel[0], pixel[1], pixel[2]);
        s_total += hsv.s as f64;
        v_total += hsv.v as f64;
    }

    Some(((s_total / pixel_count) as f32, (v_total / pixel_count) as f32))
}

/// Fraction of pixels whose hue falls in any of `bands` with enough
/// saturation and value to count as a vivid color. 0 for an empty region.
pub fn red_ratio(img: &RgbaImage, bands: &[HueBand], min_s: u8, min_v: u8) -> f32 {
    if img.width() == 0 || img.height() == 0 {
        return 0.0;
    }

    let hits = img
        .pixels()
        .filter(|p| {
            let hsv = rgb_to_hsv(p[0], p[1], p[2]);
            hsv.s >= min_s
                && hsv.v >= min_v
                && bands.iter().any(|band| hsv.h >= band.lo && hsv.h <= band.hi)
        })
        .count();

    hits as f32 / (img.width() as u64 * img.height() as u64) as f32
}
