//! Identity matching for clean slots.
//!
//! Scores every catalog entity against a slot crop and applies the refusal
//! policy: a winner must clear the minimum score and lead the runner-up by a
//! margin, otherwise the slot stays unresolved.

use std::cmp::Ordering;

use image::RgbaImage;
use rayon::prelude::*;

use crate::config::MatcherConfig;
use crate::detection::catalog::Catalog;
use crate::vision::{count_good_matches, to_gray, FeatureExtractor};

/// Matcher verdict for one region.
#[derive(Clone, Debug, PartialEq)]
pub struct Identification {
    /// `None` when no entity was confident enough
    pub entity_id: Option<String>,
    /// Top entity score, kept even when unresolved
    pub score: f32,
}

impl Identification {
    pub fn unresolved(score: f32) -> Self {
        Self {
            entity_id: None,
            score,
        }
    }
}

/// Anything that can name the entity shown in a region.
pub trait Identify: Send + Sync {
    fn identify(&self, region: &RgbaImage) -> Identification;
}

/// Applies the minimum-score and margin policy to raw per-entity scores.
///
/// Candidates below `min_match_count` are dropped, the rest are ordered by
/// score (ties by id), and the top one wins only when there is no runner-up or
/// it leads by at least `min_score_margin`.
pub fn rank_candidates(mut scores: Vec<(String, f32)>, config: &MatcherConfig) -> Identification {
    scores.retain(|(_, score)| *score >= config.min_match_count as f32);
    scores.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let Some((top_id, top_score)) = scores.first() else {
        return Identification::unresolved(0.0);
    };

    if let Some((runner_id, runner_score)) = scores.get(1) {
        if top_score - runner_score < config.min_score_margin {
            log::debug!(
                "Ambiguous match: {} ({:.0}) vs {} ({:.0})",
                top_id,
                top_score,
                runner_id,
                runner_score
            );
            return Identification::unresolved(*top_score);
        }
    }

    Identification {
        entity_id: Some(top_id.clone()),
        score: *top_score,
    }
}

/// Feature matcher over a prebuilt catalog.
pub struct CatalogMatcher {
    catalog: Catalog,
    extractor: FeatureExtractor,
    config: MatcherConfig,
}

impl CatalogMatcher {
    pub fn new(catalog: Catalog, extractor: FeatureExtractor, config: MatcherConfig) -> Self {
        Self {
            catalog,
            extractor,
            config,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Raw score for every entity: the best variant's good-match count.
    pub fn score_all(&self, region: &RgbaImage) -> Option<Vec<(String, f32)>> {
        let descriptors = self.extractor.extract(&to_gray(region));
        if descriptors.len() < self.config.min_region_features.max(2) {
            log::debug!("Region has only {} descriptors", descriptors.len());
            return None;
        }

        let ratio = self.config.lowe_ratio;
        Some(
            self.catalog
                .entries()
                .par_iter()
                .map(|entry| {
                    let best = entry
                        .variants
                        .iter()
                        .map(|v| count_good_matches(&v.descriptors, &descriptors, ratio))
                        .max()
                        .unwrap_or(0);
                    (entry.entity_id.clone(), best as f32)
                })
                .collect(),
        )
    }
}

impl Identify for CatalogMatcher {
    fn identify(&self, region: &RgbaImage) -> Identification {
        match self.score_all(region) {
            Some(scores) => rank_candidates(scores, &self.config),
            None => Identification::unresolved(0.0),
        }
    }
}
