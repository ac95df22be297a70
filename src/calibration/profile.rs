//! Calibration profile: the slot regions, the gate anchor and the optional
//! suppression marker, all expressed at calibration resolution.
//!
//! File layout (inside the calibration directory):
//! - `roi_config.json`: `{"rois": [[x,y,w,h], ...], "screen_path": "...", "base_size": [W,H]}`
//! - `anchor.png` + `anchor_config.json` (`{"x","y","w","h"}`)
//! - `banned.png` (optional marker template)

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, ScanError};

/// An integer pixel rectangle. Serialized as `[x, y, w, h]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl From<[i32; 4]> for Rect {
    fn from([x, y, w, h]: [i32; 4]) -> Self {
        Self { x, y, w, h }
    }
}

impl From<Rect> for [i32; 4] {
    fn from(r: Rect) -> Self {
        [r.x, r.y, r.w, r.h]
    }
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Builds a rectangle from corner coordinates (right/bottom exclusive).
    pub fn from_corners(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self {
            x: x0,
            y: y0,
            w: x1 - x0,
            h: y1 - y0,
        }
    }

    pub fn right(&self) -> i32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Intersects with a `width x height` frame. `None` when nothing is left.
    pub fn clip(&self, width: u32, height: u32) -> Option<Rect> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = self.right().min(width as i32);
        let y1 = self.bottom().min(height as i32);
        let clipped = Rect::from_corners(x0, y0, x1, y1);
        (!clipped.is_empty()).then_some(clipped)
    }
}

/// Contents of `roi_config.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoiConfig {
    pub rois: Vec<Rect>,
    /// Calibration screenshot the regions were drawn on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screen_path: Option<PathBuf>,
    /// Explicit calibration resolution; wins over the screenshot's size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_size: Option<[u32; 2]>,
}

impl RoiConfig {
    /// Reads and validates a calibration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ScanError::ConfigMissing(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        let config: RoiConfig =
            serde_json::from_str(&contents).map_err(|e| ScanError::invalid(path, e.to_string()))?;

        if config.rois.is_empty() {
            return Err(ScanError::invalid(path, "no ROIs found"));
        }
        if let Some(bad) = config.rois.iter().position(Rect::is_empty) {
            return Err(ScanError::invalid(
                path,
                format!("ROI {} has non-positive width or height", bad + 1),
            ));
        }
        if let Some([w, h]) = config.base_size {
            if w == 0 || h == 0 {
                return Err(ScanError::invalid(path, "base_size must be positive"));
            }
        }
        Ok(config)
    }

    /// Writes the calibration file (pretty-printed, ROI order preserved).
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Calibration resolution: `base_size` if present, else the dimensions of
    /// the referenced screenshot. Relative screenshot paths are tried against
    /// `config_dir` first, then as given.
    pub fn resolve_base_size(&self, config_dir: &Path) -> Option<(u32, u32)> {
        if let Some([w, h]) = self.base_size {
            return Some((w, h));
        }
        let screen = self.screen_path.as_ref()?;
        let candidates = [config_dir.join(screen), screen.clone()];
        candidates.iter().find_map(|p| match image::image_dimensions(p) {
            Ok(dims) => Some(dims),
            Err(e) => {
                log::debug!("Calibration screenshot {} unusable: {}", p.display(), e);
                None
            }
        })
    }
}

/// Contents of `anchor_config.json`: where the anchor was cut from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnchorConfig {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl From<AnchorConfig> for Rect {
    fn from(a: AnchorConfig) -> Self {
        Rect::new(a.x, a.y, a.w, a.h)
    }
}

/// Locations of the calibration files.
#[derive(Clone, Debug)]
pub struct CalibrationPaths {
    pub roi_config: PathBuf,
    pub anchor_image: PathBuf,
    pub anchor_config: PathBuf,
    pub marker_image: PathBuf,
}

impl CalibrationPaths {
    /// Standard file names inside one calibration directory.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            roi_config: dir.join("roi_config.json"),
            anchor_image: dir.join("anchor.png"),
            anchor_config: dir.join("anchor_config.json"),
            marker_image: dir.join("banned.png"),
        }
    }
}

/// Everything the gate and the classifier need from calibration. Immutable after load.
#[derive(Clone, Debug)]
pub struct CalibrationProfile {
    /// `None` when neither `base_size` nor a readable screenshot is available;
    /// regions and anchor are then used unscaled.
    pub base_size: Option<(u32, u32)>,
    pub anchor: GrayImage,
    pub marker: Option<GrayImage>,
    pub rois: Vec<Rect>,
}

impl CalibrationProfile {
    /// Loads the profile. ROI config and anchor image are required; the
    /// anchor config and the marker template are optional.
    pub fn load(paths: &CalibrationPaths) -> Result<Self> {
        let roi_config = RoiConfig::load(&paths.roi_config)?;
        let config_dir = paths
            .roi_config
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let base_size = roi_config.resolve_base_size(&config_dir);
        match base_size {
            Some((w, h)) => log::info!("Calibration base size: {}x{}", w, h),
            None => log::warn!("No calibration base size; regions and anchor will not be scaled"),
        }

        let anchor = load_gray(&paths.anchor_image)?;
        if paths.anchor_config.exists() {
            check_anchor_config(&paths.anchor_config, &anchor)?;
        }

        let marker = if paths.marker_image.exists() {
            let marker = load_gray(&paths.marker_image)?;
            log::info!(
                "Marker template loaded: {}x{}",
                marker.width(),
                marker.height()
            );
            Some(marker)
        } else {
            None
        };

        log::info!(
            "Calibration loaded: {} slots, anchor {}x{}",
            roi_config.rois.len(),
            anchor.width(),
            anchor.height()
        );

        Ok(Self {
            base_size,
            anchor,
            marker,
            rois: roi_config.rois,
        })
    }

    /// Slot regions mapped onto a `cur_w x cur_h` frame.
    pub fn scaled_rois(&self, cur_w: u32, cur_h: u32) -> Vec<Rect> {
        match self.base_size {
            Some((bw, bh)) => super::scale_all(&self.rois, bw, bh, cur_w, cur_h),
            None => self.rois.clone(),
        }
    }
}

/// Reads `anchor_config.json`. Its size must match the anchor image.
fn check_anchor_config(path: &Path, anchor: &GrayImage) -> Result<()> {
    let contents = fs::read_to_string(path)?;
    let cfg: AnchorConfig =
        serde_json::from_str(&contents).map_err(|e| ScanError::invalid(path, e.to_string()))?;
    let rect = Rect::from(cfg);
    log::info!(
        "Anchor cut from ({}, {}) {}x{}",
        rect.x,
        rect.y,
        rect.w,
        rect.h
    );

    if (rect.w as i64, rect.h as i64) != (anchor.width() as i64, anchor.height() as i64) {
        return Err(ScanError::invalid(
            path,
            format!(
                "anchor is {}x{} but anchor.png is {}x{}",
                rect.w,
                rect.h,
                anchor.width(),
                anchor.height()
            ),
        ));
    }
    Ok(())
}

fn load_gray(path: &Path) -> Result<GrayImage> {
    if !path.exists() {
        return Err(ScanError::ConfigMissing(path.to_path_buf()));
    }
    Ok(image::open(path)?.to_luma8())
}
