//! The detection engine: configuration, calibration and catalog, loaded once
//! at startup and shared read-only with every detection pass.

use std::path::Path;

use image::RgbaImage;

use crate::calibration::{CalibrationPaths, CalibrationProfile};
use crate::config::EngineConfig;
use crate::detection::{gate_score, run_pass, Catalog, CatalogMatcher, DetectionResult, Identify};
use crate::error::Result;
use crate::vision::{to_gray, FeatureExtractor};

pub struct Engine {
    config: EngineConfig,
    profile: CalibrationProfile,
    identifier: Box<dyn Identify>,
}

impl Engine {
    /// Loads calibration from `calibration_dir` and builds the catalog from
    /// `catalog_dir`. Any failure here is fatal.
    pub fn load(config: EngineConfig, calibration_dir: &Path, catalog_dir: &Path) -> Result<Self> {
        let profile = CalibrationProfile::load(&CalibrationPaths::in_dir(calibration_dir))?;
        let extractor = FeatureExtractor::new(&config.matcher);
        let catalog = Catalog::build(catalog_dir, &extractor)?;
        let matcher = CatalogMatcher::new(catalog, extractor, config.matcher.clone());
        Ok(Self::with_identifier(config, profile, Box::new(matcher)))
    }

    /// Assembles an engine around any identifier.
    pub fn with_identifier(
        config: EngineConfig,
        profile: CalibrationProfile,
        identifier: Box<dyn Identify>,
    ) -> Self {
        Self {
            config,
            profile,
            identifier,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn profile(&self) -> &CalibrationProfile {
        &self.profile
    }

    /// Gate score of a full frame.
    pub fn gate_score(&self, frame: &RgbaImage) -> f32 {
        gate_score(&to_gray(frame), &self.profile, &self.config.gate)
    }

    /// Runs one detection pass.
    pub fn detect(&self, frame: &RgbaImage) -> Vec<DetectionResult> {
        run_pass(
            frame,
            &self.profile,
            &self.config.classifier,
            self.identifier.as_ref(),
        )
    }
}
