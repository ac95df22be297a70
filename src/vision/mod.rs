//! Image primitives shared by the gate, the classifier and the matcher.
//!
//! - HSV statistics in the 8-bit convention (hue 0-180, S/V 0-255)
//! - Clamped cropping
//! - Zero-mean normalized cross-correlation template matching
//! - Binary local features and ratio-test matching

pub mod color;
pub mod crop;
pub mod features;
pub mod ncc;

pub use color::{red_ratio, rgb_to_hsv, saturation_value_means, Hsv};
pub use crop::{crop_rect, to_gray};
pub use features::{count_good_matches, DescriptorSet, FeatureExtractor};
pub use ncc::{match_template_peak, match_template_peak_pyramid};
