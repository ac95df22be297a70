//! One detection pass over a frozen frame: scale the slots, classify them,
//! identify the clean ones.

use image::RgbaImage;
use serde::Serialize;

use crate::calibration::{CalibrationProfile, Rect};
use crate::config::ClassifierConfig;
use crate::detection::classifier::{classify, RegionMetrics, SuppressionReason};
use crate::detection::matcher::Identify;
use crate::vision::crop_rect;

/// Result for one slot. Serialized as a line of the result record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionResult {
    /// 1-based slot index, in calibration order
    pub slot: usize,
    #[serde(rename = "entity")]
    pub entity_id: Option<String>,
    pub score: f32,
    #[serde(rename = "suppressed")]
    pub is_suppressed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<SuppressionReason>,
    pub roi: Rect,
    pub belt: Option<Rect>,
    pub metrics: RegionMetrics,
}

/// Runs classification and identification for every slot of `frame`.
///
/// Suppressed and off-frame slots are never sent to the matcher.
pub fn run_pass(
    frame: &RgbaImage,
    profile: &CalibrationProfile,
    config: &ClassifierConfig,
    identifier: &dyn Identify,
) -> Vec<DetectionResult> {
    let (w, h) = frame.dimensions();
    let rois = profile.scaled_rois(w, h);
    let slots = classify(frame, &rois, profile.marker.as_ref(), config);

    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| {
            let identification = if slot.is_suppressed() || !slot.has_data {
                None
            } else {
                crop_rect(frame, slot.roi).map(|crop| identifier.identify(&crop))
            };
            let (entity_id, score) = identification
                .map(|id| (id.entity_id, id.score))
                .unwrap_or((None, 0.0));

            match (&entity_id, slot.is_suppressed()) {
                (_, true) => log::info!("[Slot {}] BANNED", i + 1),
                (Some(id), false) => log::info!("[Slot {}] {} (score {:.0})", i + 1, id, score),
                (None, false) => log::info!("[Slot {}] unknown (score {:.0})", i + 1, score),
            }

            DetectionResult {
                slot: i + 1,
                entity_id,
                score,
                is_suppressed: slot.is_suppressed(),
                reason: slot.suppressed,
                roi: slot.roi,
                belt: slot.belt,
                metrics: slot.metrics,
            }
        })
        .collect()
}

/// What a pass means for the draft: who is available and who is banned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DetectionSummary {
    /// Resolved, non-suppressed entities in slot order
    pub clean: Vec<String>,
    /// Entity of the first suppressed slot that carries one
    pub banned: Option<String>,
}

impl DetectionSummary {
    pub fn from_results(results: &[DetectionResult], max_clean: usize) -> Self {
        let clean = results
            .iter()
            .filter(|r| !r.is_suppressed)
            .filter_map(|r| r.entity_id.clone())
            .take(max_clean)
            .collect();
        let banned = results
            .iter()
            .filter(|r| r.is_suppressed)
            .find_map(|r| r.entity_id.clone());
        Self { clean, banned }
    }
}
