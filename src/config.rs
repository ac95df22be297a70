//! Engine configuration.
//!
//! Loads tunables from config.json at startup. Every field has a default so a
//! partial (or absent) file is fine; the defaults are the values the detector
//! was tuned with on the live draft screen.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ScanError};

/// Accepted `gate.fps` range.
const FPS_RANGE: std::ops::RangeInclusive<f64> = 0.01..=1000.0;

/// Longest accepted interval setting (one day).
const MAX_INTERVAL_SECS: f64 = 86_400.0;

/// Where and how to find the target window.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Exact window title of the game client (substring matches are rejected)
    pub window_title: String,
    /// Executable name of the owning process; `None` skips the process check
    pub process_name: Option<String>,
    /// Poll interval while the window is missing (seconds)
    pub absent_poll_secs: f64,
    /// Crop captures to the client area (drop title bar and borders)
    pub crop_to_client: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            window_title: "Epic Seven".to_string(),
            process_name: Some("EpicSeven.exe".to_string()),
            absent_poll_secs: 1.0,
            crop_to_client: false,
        }
    }
}

/// Gate hysteresis parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Polling rate (Hz)
    pub fps: f64,
    /// Score needed to count a hit while idle (the draft screen scores ~0.84)
    pub enter_threshold: f32,
    /// Score needed to count a hit while triggered (must be <= enter)
    pub stay_threshold: f32,
    /// Consecutive hits to trigger
    pub hit_required: u32,
    /// Consecutive misses to release
    pub miss_required: u32,
    /// Quiet period after release (seconds)
    pub cooldown_secs: f64,
    /// Interval between `gate_score` events (seconds)
    pub score_emit_secs: f64,
    /// Largest downscale used for the coarse anchor search
    pub max_pyramid_factor: u32,
    /// The coarse anchor's smaller side never drops below this many pixels
    pub min_coarse_anchor_side: u32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            fps: 3.0,
            enter_threshold: 0.78,
            stay_threshold: 0.70,
            hit_required: 2,
            miss_required: 3,
            cooldown_secs: 5.0,
            score_emit_secs: 3.0,
            max_pyramid_factor: 4,
            min_coarse_anchor_side: 12,
        }
    }
}

/// A hue interval on OpenCV's 0-180 hue scale, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HueBand {
    pub lo: u8,
    pub hi: u8,
}

/// Suppressed-state (banned slot) thresholds.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Belt width as a fraction of the slot width
    pub belt_width_ratio: f32,
    /// Vertical belt padding above and below the slot, as a fraction of slot height
    pub belt_y_pad: f32,
    /// Fraction of red belt pixels that counts as a ribbon
    pub red_ratio_min: f32,
    /// Red wraps around hue 0, so it takes two bands
    pub red_bands: Vec<HueBand>,
    pub red_min_saturation: u8,
    pub red_min_value: u8,
    /// Absolute dimming: mean saturation at or below this (lower = greyer)
    pub sat_abs_max: f32,
    /// Absolute dimming: mean value at or below this (lower = darker)
    pub val_abs_max: f32,
    /// Relative dimming: saturation at or below this fraction of the second-lowest slot
    pub rel_sat_ratio: f32,
    /// Marker template score that confirms suppression on its own
    pub text_match_min: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            belt_width_ratio: 0.6,
            belt_y_pad: 0.20,
            red_ratio_min: 0.035,
            red_bands: vec![HueBand { lo: 0, hi: 10 }, HueBand { lo: 170, hi: 180 }],
            red_min_saturation: 100,
            red_min_value: 100,
            sat_abs_max: 80.0,
            val_abs_max: 150.0,
            rel_sat_ratio: 0.85,
            text_match_min: 0.70,
        }
    }
}

/// Identity matcher parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Ratio test cutoff (0.70-0.80 typical)
    pub lowe_ratio: f32,
    /// Entities scoring below this many good matches are discarded
    pub min_match_count: u32,
    /// Required lead of the best entity over the runner-up
    pub min_score_margin: f32,
    /// Cap on keypoints per image
    pub max_features: usize,
    /// Images are resized so their longest side is this many pixels
    pub canonical_size: u32,
    /// FAST corner intensity threshold
    pub fast_threshold: u8,
    /// Smoothing applied before descriptor sampling
    pub descriptor_blur_sigma: f32,
    /// Extra smoothing applied to reference images only (0 disables)
    pub reference_blur_sigma: f32,
    /// Regions with fewer descriptors than this are unresolved
    pub min_region_features: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            lowe_ratio: 0.75,
            min_match_count: 8,
            min_score_margin: 5.0,
            max_features: 600,
            canonical_size: 128,
            fast_threshold: 20,
            descriptor_blur_sigma: 2.0,
            reference_blur_sigma: 0.8,
            min_region_features: 2,
        }
    }
}

/// Per-pass output files and event shaping.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output directory; defaults to `<exe_dir>/out`
    pub out_dir: Option<PathBuf>,
    pub write_results: bool,
    pub write_annotated: bool,
    /// Max entity ids reported in the `clean` list of a `detected` event
    pub max_clean: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            out_dir: None,
            write_results: true,
            write_annotated: true,
            max_clean: 4,
        }
    }
}

/// Complete engine configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub capture: CaptureConfig,
    pub gate: GateConfig,
    pub classifier: ClassifierConfig,
    pub matcher: MatcherConfig,
    pub output: OutputConfig,
}

impl EngineConfig {
    /// Loads configuration from an explicit path, or from config.json next to
    /// the executable when `path` is `None`.
    ///
    /// An explicit path must exist and parse. The implicit file falls back to
    /// defaults when it is missing or broken.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let config = Self::from_file(path)?;
                config.validate(path)?;
                Ok(config)
            }
            None => {
                let path = crate::paths::get_config_path();
                let config = Self::load_implicit(&path);
                config.validate(&path)?;
                Ok(config)
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ScanError::ConfigMissing(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| ScanError::invalid(path, e.to_string()))
    }

    fn load_implicit(config_path: &Path) -> Self {
        log::info!("Looking for config at: {}", config_path.display());

        if !config_path.exists() {
            log::info!("config.json not found. Using default config.");
            return Self::default();
        }

        match Self::from_file(config_path) {
            Ok(config) => {
                log::info!("Config loaded from {}", config_path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to load config.json: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    /// Rejects combinations the detector cannot run with. `path` names the
    /// file in the error.
    pub fn validate(&self, path: &Path) -> Result<()> {
        let gate = &self.gate;
        if !FPS_RANGE.contains(&gate.fps) {
            return Err(ScanError::invalid(
                path,
                format!(
                    "gate.fps must be in [{}, {}], got {}",
                    FPS_RANGE.start(),
                    FPS_RANGE.end(),
                    gate.fps
                ),
            ));
        }
        for (name, secs) in [
            ("gate.cooldown_secs", gate.cooldown_secs),
            ("gate.score_emit_secs", gate.score_emit_secs),
            ("capture.absent_poll_secs", self.capture.absent_poll_secs),
        ] {
            if !(0.0..=MAX_INTERVAL_SECS).contains(&secs) {
                return Err(ScanError::invalid(
                    path,
                    format!("{} must be in [0, {}], got {}", name, MAX_INTERVAL_SECS, secs),
                ));
            }
        }
        if gate.stay_threshold > gate.enter_threshold {
            return Err(ScanError::invalid(
                path,
                format!(
                    "gate.stay_threshold ({}) exceeds gate.enter_threshold ({})",
                    gate.stay_threshold, gate.enter_threshold
                ),
            ));
        }
        if gate.hit_required == 0 || gate.miss_required == 0 {
            return Err(ScanError::invalid(
                path,
                "gate.hit_required and gate.miss_required must be at least 1",
            ));
        }
        let ratio = self.matcher.lowe_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(ScanError::invalid(path, "matcher.lowe_ratio must be in (0, 1]"));
        }
        if self.matcher.canonical_size < 32 {
            return Err(ScanError::invalid(
                path,
                "matcher.canonical_size must be at least 32",
            ));
        }
        Ok(())
    }

    /// Resolved output directory.
    pub fn out_dir(&self) -> PathBuf {
        self.output
            .out_dir
            .clone()
            .unwrap_or_else(crate::paths::get_out_dir)
    }
}
