//! Screen-state gate.
//!
//! The anchor (a crop of the draft screen taken during calibration) is scaled
//! to the live frame and correlated against it. Raw scores are noisy, so the
//! decision runs through a hysteresis state machine: a run of strong frames to
//! enter, a run of weak frames to leave, then a cooldown.

use std::borrow::Cow;
use std::time::{Duration, Instant};

use image::{imageops::FilterType, GrayImage};

use crate::calibration::{scale_size, CalibrationProfile};
use crate::config::GateConfig;
use crate::vision::match_template_peak_pyramid;

/// Peak anchor correlation in `[0, 1]` for a grayscale full frame.
///
/// 0 when the scaled anchor does not fit inside the frame.
pub fn gate_score(frame: &GrayImage, profile: &CalibrationProfile, config: &GateConfig) -> f32 {
    let (w, h) = frame.dimensions();
    let anchor: Cow<'_, GrayImage> = match profile.base_size {
        Some((bw, bh)) => {
            let (aw, ah) = scale_size(profile.anchor.width(), profile.anchor.height(), bw, bh, w, h);
            if (aw, ah) == profile.anchor.dimensions() {
                Cow::Borrowed(&profile.anchor)
            } else {
                Cow::Owned(image::imageops::resize(&profile.anchor, aw, ah, FilterType::Triangle))
            }
        }
        None => Cow::Borrowed(&profile.anchor),
    };

    if anchor.width() > w || anchor.height() > h {
        return 0.0;
    }

    match_template_peak_pyramid(
        frame,
        &anchor,
        config.max_pyramid_factor,
        config.min_coarse_anchor_side,
    )
}

/// Gate states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Target screen not showing
    Idle,
    /// Target screen confirmed; stays until enough misses
    Triggered,
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GateState::Idle => write!(f, "Idle"),
            GateState::Triggered => write!(f, "Triggered"),
        }
    }
}

/// What a single score did to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    Unchanged,
    Entered,
    Exited,
}

/// Hysteresis over consecutive gate scores.
#[derive(Debug, Clone)]
pub struct GateController {
    state: GateState,
    hit_count: u32,
    miss_count: u32,
    cooldown_until: Option<Instant>,
    enter_threshold: f32,
    stay_threshold: f32,
    hit_required: u32,
    miss_required: u32,
    cooldown: Duration,
}

impl GateController {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            state: GateState::Idle,
            hit_count: 0,
            miss_count: 0,
            cooldown_until: None,
            enter_threshold: config.enter_threshold,
            stay_threshold: config.stay_threshold,
            hit_required: config.hit_required.max(1),
            miss_required: config.miss_required.max(1),
            cooldown: Duration::from_secs_f64(config.cooldown_secs.max(0.0)),
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// True while the post-release quiet period is running. Clears the
    /// deadline once it has passed.
    pub fn in_cooldown(&mut self, now: Instant) -> bool {
        match self.cooldown_until {
            Some(until) if now < until => true,
            Some(_) => {
                self.cooldown_until = None;
                false
            }
            None => false,
        }
    }

    /// Feeds one score.
    pub fn update(&mut self, score: f32, now: Instant) -> GateTransition {
        match self.state {
            GateState::Idle => {
                if score >= self.enter_threshold {
                    self.hit_count += 1;
                    if self.hit_count >= self.hit_required {
                        self.state = GateState::Triggered;
                        self.hit_count = 0;
                        self.miss_count = 0;
                        return GateTransition::Entered;
                    }
                } else {
                    self.hit_count = 0;
                }
            }
            GateState::Triggered => {
                if score >= self.stay_threshold {
                    self.miss_count = 0;
                } else {
                    self.miss_count += 1;
                    if self.miss_count >= self.miss_required {
                        self.state = GateState::Idle;
                        self.miss_count = 0;
                        self.hit_count = 0;
                        self.cooldown_until = Some(now + self.cooldown);
                        return GateTransition::Exited;
                    }
                }
            }
        }
        GateTransition::Unchanged
    }

    /// Back to `Idle` with counters and cooldown cleared.
    pub fn reset(&mut self) {
        self.state = GateState::Idle;
        self.hit_count = 0;
        self.miss_count = 0;
        self.cooldown_until = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn controller(enter: f32, stay: f32, hit: u32, miss: u32) -> GateController {
        GateController::new(&GateConfig {
            enter_threshold: enter,
            stay_threshold: stay,
            hit_required: hit,
            miss_required: miss,
            cooldown_secs: 5.0,
            ..GateConfig::default()
        })
    }

    /// Index of the sample that entered `Triggered`, if any.
    fn trigger_index(gate: &mut GateController, scores: &[f32]) -> Option<usize> {
        let now = Instant::now();
        scores
            .iter()
            .position(|&s| gate.update(s, now) == GateTransition::Entered)
    }

    #[test]
    fn test_triggers_on_third_consecutive_hit() {
        let mut gate = controller(0.86, 0.70, 3, 3);
        assert_eq!(trigger_index(&mut gate, &[0.9, 0.9, 0.9]), Some(2));
        assert_eq!(gate.state(), GateState::Triggered);
    }

    #[test]
    fn test_miss_resets_hit_count() {
        let mut gate = controller(0.86, 0.70, 3, 3);
        assert_eq!(trigger_index(&mut gate, &[0.9, 0.5, 0.9, 0.9, 0.9]), Some(4));
    }

    #[test]
    fn test_never_triggers_below_enter() {
        let mut gate = controller(0.86, 0.70, 3, 3);
        assert_eq!(trigger_index(&mut gate, &[0.85; 20]), None);
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn test_stay_threshold_keeps_triggered() {
        let mut gate = controller(0.78, 0.70, 2, 3);
        let now = Instant::now();
        gate.update(0.8, now);
        assert_eq!(gate.update(0.8, now), GateTransition::Entered);

        // Between stay and enter: still a hit while triggered
        for _ in 0..10 {
            assert_eq!(gate.update(0.72, now), GateTransition::Unchanged);
        }
        // Two misses, one recovery, two misses: never three in a row
        for s in [0.5, 0.5, 0.75, 0.5, 0.5] {
            assert_eq!(gate.update(s, now), GateTransition::Unchanged);
        }
        assert_eq!(gate.update(0.5, now), GateTransition::Exited);
        assert_eq!(gate.state(), GateState::Idle);
    }

    #[test]
    fn test_thresholds_are_inclusive() {
        let mut gate = controller(0.75, 0.5, 2, 2);
        let now = Instant::now();
        assert_eq!(gate.update(0.75, now), GateTransition::Unchanged);
        assert_eq!(gate.update(0.75, now), GateTransition::Entered);

        // Exactly at stay counts as a hit
        for _ in 0..5 {
            assert_eq!(gate.update(0.5, now), GateTransition::Unchanged);
        }
        assert_eq!(gate.update(0.4999, now), GateTransition::Unchanged);
        assert_eq!(gate.update(0.4999, now), GateTransition::Exited);
    }

    #[test]
    fn test_cooldown_after_exit() {
        let mut gate = controller(0.78, 0.70, 1, 1);
        let t0 = Instant::now();
        assert_eq!(gate.update(0.9, t0), GateTransition::Entered);
        assert_eq!(gate.update(0.1, t0), GateTransition::Exited);

        assert!(gate.in_cooldown(t0 + Duration::from_secs(1)));
        assert!(gate.in_cooldown(t0 + Duration::from_millis(4999)));
        assert!(!gate.in_cooldown(t0 + Duration::from_secs(5)));
        // Deadline cleared once passed
        assert!(!gate.in_cooldown(t0));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut gate = controller(0.78, 0.70, 2, 1);
        let t0 = Instant::now();
        gate.update(0.9, t0);
        gate.reset();
        // Pending hit was dropped
        assert_eq!(gate.update(0.9, t0), GateTransition::Unchanged);
        assert_eq!(gate.update(0.9, t0), GateTransition::Entered);
        assert_eq!(gate.update(0.1, t0), GateTransition::Exited);
        assert!(gate.in_cooldown(t0));
        gate.reset();
        assert!(!gate.in_cooldown(t0));
        assert_eq!(gate.state(), GateState::Idle);
    }

    fn textured(w: u32, h: u32, seed: u64) -> GrayImage {
        let mut rng = StdRng::seed_from_u64(seed);
        let cells_w = w.div_ceil(4);
        let cells: Vec<u8> = (0..cells_w * h.div_ceil(4)).map(|_| rng.gen_range(0..=255)).collect();
        ImageBuffer::from_fn(w, h, |x, y| Luma([cells[((y / 4) * cells_w + x / 4) as usize]]))
    }

    fn profile(anchor: GrayImage, base_size: Option<(u32, u32)>) -> CalibrationProfile {
        CalibrationProfile {
            base_size,
            anchor,
            marker: None,
            rois: Vec::new(),
        }
    }

    #[test]
    fn test_gate_score_finds_anchor() {
        let frame = textured(320, 240, 11);
        let anchor = image::imageops::crop_imm(&frame, 100, 60, 64, 40).to_image();
        let score = gate_score(&frame, &profile(anchor, Some((320, 240))), &GateConfig::default());
        assert!(score > 0.95, "score = {}", score);
    }

    #[test]
    fn test_gate_score_rescales_anchor() {
        // Calibrated at 320x240, live frame is 2x
        let base = textured(320, 240, 12);
        let anchor = image::imageops::crop_imm(&base, 96, 64, 64, 48).to_image();
        let frame = image::imageops::resize(&base, 640, 480, FilterType::Triangle);
        let score = gate_score(&frame, &profile(anchor, Some((320, 240))), &GateConfig::default());
        assert!(score > 0.8, "score = {}", score);
    }

    #[test]
    fn test_gate_score_anchor_larger_than_frame() {
        let frame = textured(50, 50, 13);
        let anchor = textured(80, 20, 14);
        assert_eq!(gate_score(&frame, &profile(anchor, None), &GateConfig::default()), 0.0);
    }
}
