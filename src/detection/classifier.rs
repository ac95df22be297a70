//! Suppressed-slot (banned hero) classifier.
//!
//! A banned slot is drawn greyed out and darkened, with a red ribbon just to
//! its right, and sometimes a "banned" caption. Brightness varies a lot across
//! machines, so dimming is judged both in absolute terms and relative to the
//! other slots on the same frame. That needs every slot measured first.

use image::{GrayImage, RgbaImage};
use serde::Serialize;

use crate::calibration::Rect;
use crate::config::ClassifierConfig;
use crate::vision::{crop_rect, match_template_peak, red_ratio, saturation_value_means, to_gray};

/// Per-slot measurements.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RegionMetrics {
    pub saturation_mean: f32,
    pub value_mean: f32,
    pub context_red_ratio: f32,
    pub text_match_score: f32,
}

/// Why a slot was judged suppressed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SuppressionReason {
    /// The marker caption was found next to the slot
    Text,
    /// A red ribbon next to a dimmed slot
    RibbonAndDim,
}

/// Outcome for one slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Classification {
    /// Slot region in frame coordinates, before clipping
    pub roi: Rect,
    /// Context belt, clipped to the frame
    pub belt: Option<Rect>,
    pub metrics: RegionMetrics,
    /// False when the region fell entirely outside the frame
    pub has_data: bool,
    pub suppressed: Option<SuppressionReason>,
}

impl Classification {
    pub fn is_suppressed(&self) -> bool {
        self.suppressed.is_some()
    }
}

/// Strip to the right of a slot where the ribbon and caption appear.
pub fn context_belt(roi: Rect, frame_w: u32, frame_h: u32, config: &ClassifierConfig) -> Option<Rect> {
    let (x, y, w, h) = (roi.x as f32, roi.y as f32, roi.w as f32, roi.h as f32);
    let x0 = roi.right();
    let x1 = ((x + w + config.belt_width_ratio * w) as i32).min(frame_w as i32);
    let y0 = ((y - config.belt_y_pad * h) as i32).max(0);
    let y1 = ((y + (1.0 + config.belt_y_pad) * h) as i32).min(frame_h as i32);
    Rect::from_corners(x0, y0, x1, y1).clip(frame_w, frame_h)
}

fn measure(
    frame: &RgbaImage,
    roi: Rect,
    marker: Option<&GrayImage>,
    config: &ClassifierConfig,
) -> Classification {
    let (w, h) = frame.dimensions();
    let mut metrics = RegionMetrics::default();

    let means = crop_rect(frame, roi).and_then(|crop| saturation_value_means(&crop));
    let has_data = means.is_some();
    if let Some((s, v)) = means {
        metrics.saturation_mean = s;
        metrics.value_mean = v;
    }

    let belt = context_belt(roi, w, h, config);
    if let Some(belt_img) = belt.and_then(|b| crop_rect(frame, b)) {
        metrics.context_red_ratio = red_ratio(
            &belt_img,
            &config.red_bands,
            config.red_min_saturation,
            config.red_min_value,
        );
        if let Some(marker) = marker {
            metrics.text_match_score = match_template_peak(&to_gray(&belt_img), marker);
        }
    }

    Classification {
        roi,
        belt,
        metrics,
        has_data,
        suppressed: None,
    }
}

/// Second-lowest value, the single value when there is only one, 0 when empty.
///
/// With two slots this is the brighter one, so a banned slot is compared
/// against its clean neighbour.
pub fn second_lowest(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        _ => sorted[1],
    }
}

/// Classifies every slot of one frame. Output order matches `rois`.
pub fn classify(
    frame: &RgbaImage,
    rois: &[Rect],
    marker: Option<&GrayImage>,
    config: &ClassifierConfig,
) -> Vec<Classification> {
    let mut slots: Vec<Classification> = rois
        .iter()
        .map(|&roi| measure(frame, roi, marker, config))
        .collect();

    let saturations: Vec<f32> = slots
        .iter()
        .filter(|s| s.has_data)
        .map(|s| s.metrics.saturation_mean)
        .collect();
    let baseline = second_lowest(&saturations);
    log::debug!("Saturation baseline: {:.1}", baseline);

    for (i, slot) in slots.iter_mut().enumerate() {
        if !slot.has_data {
            log::debug!("Slot {}: no pixels inside frame", i + 1);
            continue;
        }
        let m = &slot.metrics;
        let absolute_dim = m.saturation_mean <= config.sat_abs_max && m.value_mean <= config.val_abs_max;
        let relative_dim = m.saturation_mean <= config.rel_sat_ratio * baseline;
        let ribbon = m.context_red_ratio >= config.red_ratio_min;

        slot.suppressed = if m.text_match_score >= config.text_match_min {
            Some(SuppressionReason::Text)
        } else if ribbon && absolute_dim && relative_dim {
            Some(SuppressionReason::RibbonAndDim)
        } else {
            None
        };

        if let Some(reason) = slot.suppressed {
            log::info!(
                "Slot {} suppressed ({:?}): S={:.1} V={:.1} red={:.3} text={:.2}",
                i + 1,
                reason,
                m.saturation_mean,
                m.value_mean,
                m.context_red_ratio,
                m.text_match_score
            );
        }
    }

    slots
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgba};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const BLUE: Rgba<u8> = Rgba([60, 120, 220, 255]);
    const GREY: Rgba<u8> = Rgba([90, 90, 90, 255]);
    const RED: Rgba<u8> = Rgba([220, 20, 20, 255]);

    /// Slots are 50x50 at y=20, spaced 100px apart; belts are 30x70.
    fn slot(i: i32) -> Rect {
        Rect::new(10 + 100 * i, 20, 50, 50)
    }

    fn belt_of(i: i32) -> Rect {
        Rect::new(60 + 100 * i, 10, 30, 70)
    }

    fn paint(img: &mut RgbaImage, rect: Rect, color: Rgba<u8>) {
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }

    fn blank(w: u32) -> RgbaImage {
        ImageBuffer::from_pixel(w, 100, Rgba([0, 0, 0, 255]))
    }

    #[test]
    fn test_belt_geometry() {
        let config = ClassifierConfig::default();
        let belt = context_belt(Rect::new(100, 100, 50, 40), 1000, 1000, &config);
        assert_eq!(belt, Some(Rect::from_corners(150, 92, 180, 148)));
        assert_eq!(context_belt(slot(0), 300, 100, &config), Some(belt_of(0)));
    }

    #[test]
    fn test_belt_clipped_at_frame_edge() {
        let config = ClassifierConfig::default();
        let belt = context_belt(Rect::new(80, 0, 20, 20), 100, 100, &config);
        assert_eq!(belt, None);
        let belt = context_belt(Rect::new(70, 0, 20, 20), 100, 100, &config);
        assert_eq!(belt, Some(Rect::from_corners(90, 0, 100, 24)));
    }

    #[test]
    fn test_second_lowest() {
        assert_eq!(second_lowest(&[]), 0.0);
        assert_eq!(second_lowest(&[42.0]), 42.0);
        assert_eq!(second_lowest(&[10.0, 90.0]), 90.0);
        assert_eq!(second_lowest(&[90.0, 5.0, 60.0, 120.0]), 60.0);
    }

    #[test]
    fn test_no_slots() {
        let frame = blank(300);
        assert!(classify(&frame, &[], None, &ClassifierConfig::default()).is_empty());
    }

    #[test]
    fn test_single_grey_slot_with_ribbon() {
        let mut frame = blank(100);
        paint(&mut frame, slot(0), GREY);
        paint(&mut frame, belt_of(0), RED);

        let out = classify(&frame, &[slot(0)], None, &ClassifierConfig::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].suppressed, Some(SuppressionReason::RibbonAndDim));
    }

    #[test]
    fn test_two_slots_banned_next_to_clean() {
        let mut frame = blank(300);
        paint(&mut frame, slot(0), BLUE);
        paint(&mut frame, slot(1), GREY);
        paint(&mut frame, belt_of(1), RED);

        let out = classify(&frame, &[slot(0), slot(1)], None, &ClassifierConfig::default());
        assert!(!out[0].is_suppressed());
        assert!(out[1].is_suppressed());
        assert!(out[1].metrics.context_red_ratio > 0.99);
    }

    #[test]
    fn test_ribbon_alone_is_not_enough() {
        let mut frame = blank(400);
        for i in 0..3 {
            paint(&mut frame, slot(i), BLUE);
        }
        // Vivid slot with a ribbon: not dimmed
        paint(&mut frame, belt_of(0), RED);
        // Grey slot without a ribbon
        paint(&mut frame, slot(2), GREY);

        let rois = [slot(0), slot(1), slot(2)];
        let out = classify(&frame, &rois, None, &ClassifierConfig::default());
        assert!(out.iter().all(|c| !c.is_suppressed()));
    }

    #[test]
    fn test_dim_but_not_dimmer_than_neighbours() {
        // V = 128 everywhere; S is about 40, 50 and 60
        let mut frame = blank(400);
        paint(&mut frame, slot(0), Rgba([108, 108, 128, 255]));
        paint(&mut frame, slot(1), Rgba([103, 103, 128, 255]));
        paint(&mut frame, slot(2), Rgba([98, 98, 128, 255]));
        paint(&mut frame, belt_of(0), RED);
        paint(&mut frame, belt_of(2), RED);

        let rois = [slot(0), slot(1), slot(2)];
        let out = classify(&frame, &rois, None, &ClassifierConfig::default());
        for c in &out {
            assert!(c.metrics.saturation_mean <= 80.0);
            assert!(c.metrics.value_mean <= 150.0);
        }
        // Baseline is slot 1 (~50); 40 <= 0.85 * 50 < 60
        assert_eq!(out[0].suppressed, Some(SuppressionReason::RibbonAndDim));
        assert!(!out[1].is_suppressed());
        assert!(out[2].metrics.context_red_ratio > 0.99);
        assert!(!out[2].is_suppressed());
    }

    #[test]
    fn test_bright_grey_fails_absolute_dim() {
        let mut frame = blank(300);
        paint(&mut frame, slot(0), BLUE);
        paint(&mut frame, slot(1), Rgba([200, 200, 200, 255]));
        paint(&mut frame, belt_of(1), RED);

        let out = classify(&frame, &[slot(0), slot(1)], None, &ClassifierConfig::default());
        assert!(!out[1].is_suppressed());
    }

    #[test]
    fn test_marker_confirms_on_its_own() {
        let mut rng = StdRng::seed_from_u64(21);
        let cells: Vec<u8> = (0..36).map(|_| rng.gen_range(0..=255)).collect();
        let marker: GrayImage =
            ImageBuffer::from_fn(24, 24, |x, y| Luma([cells[((y / 4) * 6 + x / 4) as usize]]));

        let mut frame = blank(300);
        paint(&mut frame, slot(0), BLUE);
        paint(&mut frame, slot(1), BLUE);
        let belt = belt_of(0);
        for y in 0..24 {
            for x in 0..24 {
                let v = marker.get_pixel(x, y)[0];
                frame.put_pixel(belt.x as u32 + 3 + x, belt.y as u32 + 20 + y, Rgba([v, v, v, 255]));
            }
        }

        let out = classify(&frame, &[slot(0), slot(1)], Some(&marker), &ClassifierConfig::default());
        assert_eq!(out[0].suppressed, Some(SuppressionReason::Text));
        assert!(out[0].metrics.text_match_score > 0.95);
        assert!(!out[1].is_suppressed());
    }

    #[test]
    fn test_off_frame_slot_is_skipped() {
        let mut frame = blank(300);
        paint(&mut frame, slot(0), GREY);
        paint(&mut frame, belt_of(0), RED);
        let off = Rect::new(500, 500, 50, 50);

        let out = classify(&frame, &[slot(0), off], None, &ClassifierConfig::default());
        assert_eq!(out.len(), 2);
        assert!(!out[1].has_data);
        assert!(!out[1].is_suppressed());
        assert_eq!(out[1].belt, None);
        // The missing slot adds nothing to the baseline: slot 0 compares with itself
        assert!(out[0].is_suppressed());
    }
}
