//! Calibration data: slot regions, anchor template and the coordinate scaling
//! that maps them from the calibration screenshot onto live frames.

pub mod profile;
pub mod scale;

pub use profile::{AnchorConfig, CalibrationPaths, CalibrationProfile, Rect, RoiConfig};
pub use scale::{scale, scale_all, scale_size};
