//! Coordinate conversion between calibration resolution and live frame resolution.
//!
//! The axes scale independently, so a window that was resized with a different
//! aspect ratio still lines up.

use super::profile::Rect;

/// Rounds to the nearest integer, ties to even.
fn round_coord(v: f64) -> i32 {
    v.round_ties_even() as i32
}

/// Scales a calibration-resolution rectangle to the current frame resolution.
///
/// Each coordinate is rounded on its own. The result is not clamped and may be
/// degenerate; consumers clip it against the frame before reading pixels.
pub fn scale(roi: Rect, base_w: u32, base_h: u32, cur_w: u32, cur_h: u32) -> Rect {
    let sx = cur_w as f64 / base_w.max(1) as f64;
    let sy = cur_h as f64 / base_h.max(1) as f64;
    Rect {
        x: round_coord(roi.x as f64 * sx),
        y: round_coord(roi.y as f64 * sy),
        w: round_coord(roi.w as f64 * sx),
        h: round_coord(roi.h as f64 * sy),
    }
}

/// Scales every slot region, preserving order.
pub fn scale_all(rois: &[Rect], base_w: u32, base_h: u32, cur_w: u32, cur_h: u32) -> Vec<Rect> {
    rois.iter()
        .map(|roi| scale(*roi, base_w, base_h, cur_w, cur_h))
        .collect()
}

/// Scales a template size, never below one pixel per side.
pub fn scale_size(w: u32, h: u32, base_w: u32, base_h: u32, cur_w: u32, cur_h: u32) -> (u32, u32) {
    let sx = cur_w as f64 / base_w.max(1) as f64;
    let sy = cur_h as f64 / base_h.max(1) as f64;
    let nw = round_coord(w as f64 * sx).max(1) as u32;
    let nh = round_coord(h as f64 * sy).max(1) as u32;
    (nw, nh)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_doubles() {
        let roi = Rect::new(100, 100, 50, 50);
        assert_eq!(scale(roi, 1000, 800, 2000, 1600), Rect::new(200, 200, 100, 100));
    }

    #[test]
    fn test_axes_scale_independently() {
        let roi = Rect::new(100, 100, 40, 40);
        assert_eq!(scale(roi, 1000, 1000, 500, 2000), Rect::new(50, 200, 20, 80));
    }

    #[test]
    fn test_scale_then_inverse_within_one_pixel() {
        let rois = [
            Rect::new(13, 27, 91, 45),
            Rect::new(641, 312, 77, 77),
            Rect::new(1, 1, 3, 5),
        ];
        let sizes = [(1920, 1080), (1280, 720), (1366, 768), (2560, 1440), (1600, 900)];
        for roi in rois {
            for &(cw, ch) in &sizes {
                let there = scale(roi, 1920, 1080, cw, ch);
                let back = scale(there, cw, ch, 1920, 1080);
                assert!((back.x - roi.x).abs() <= 1, "{:?} via {:?}", roi, there);
                assert!((back.y - roi.y).abs() <= 1, "{:?} via {:?}", roi, there);
                assert!((back.w - roi.w).abs() <= 1, "{:?} via {:?}", roi, there);
                assert!((back.h - roi.h).abs() <= 1, "{:?} via {:?}", roi, there);
            }
        }
    }

    #[test]
    fn test_rounds_instead_of_truncating() {
        // 10 * 0.67 = 6.7 -> 7
        let roi = Rect::new(10, 10, 10, 10);
        assert_eq!(scale(roi, 300, 300, 201, 201), Rect::new(7, 7, 7, 7));
    }

    #[test]
    fn test_tiny_region_may_become_degenerate() {
        let roi = Rect::new(10, 10, 1, 1);
        let scaled = scale(roi, 1000, 1000, 100, 100);
        assert_eq!(scaled, Rect::new(1, 1, 0, 0));
        assert!(scaled.is_empty());
    }

    #[test]
    fn test_scale_size_never_zero() {
        assert_eq!(scale_size(3, 3, 1000, 1000, 100, 100), (1, 1));
        assert_eq!(scale_size(120, 30, 1920, 1080, 3840, 2160), (240, 60));
    }

    #[test]
    fn test_scale_all_preserves_order() {
        let rois = vec![Rect::new(0, 0, 10, 10), Rect::new(20, 0, 10, 10)];
        let scaled = scale_all(&rois, 100, 100, 200, 200);
        assert_eq!(scaled, vec![Rect::new(0, 0, 20, 20), Rect::new(40, 0, 20, 20)]);
    }
}
