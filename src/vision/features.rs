//! Binary local features: FAST-9 corners described by 256-bit BRIEF strings.
//!
//! Every image is first resized so its longest side is `canonical_size`, which
//! puts a catalog portrait and a live slot crop on the same scale before any
//! corners are found. The sampling pattern is generated once from a fixed seed
//! so descriptors from different runs stay comparable.

use image::{imageops::FilterType, GrayImage};
use imageproc::{corners::corners_fast9, filter::gaussian_blur_f32};
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::config::MatcherConfig;

pub const DESCRIPTOR_BYTES: usize = 32;
const DESCRIPTOR_BITS: usize = DESCRIPTOR_BYTES * 8;

/// 256 intensity comparisons packed into bytes.
pub type Descriptor = [u8; DESCRIPTOR_BYTES];

/// Sample offsets stay inside a 31x31 patch around the keypoint.
const PATCH_RADIUS: i32 = 15;
/// Keypoints closer than this to an edge are dropped.
const BORDER: u32 = PATCH_RADIUS as u32 + 1;
const PATTERN_SEED: u64 = 0x0B81_EF5E_ED00_0256;

/// Descriptors of one image. Order follows keypoint strength.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptorSet {
    descriptors: Vec<Descriptor>,
}

impl DescriptorSet {
    pub fn new(descriptors: Vec<Descriptor>) -> Self {
        Self { descriptors }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn as_slice(&self) -> &[Descriptor] {
        &self.descriptors
    }
}

/// A pair of sample points relative to the keypoint.
#[derive(Clone, Copy, Debug)]
struct SamplePair {
    a: (i32, i32),
    b: (i32, i32),
}

/// Detects and describes keypoints. Cheap to share across threads.
#[derive(Clone, Debug)]
pub struct FeatureExtractor {
    pattern: Vec<SamplePair>,
    fast_threshold: u8,
    max_features: usize,
    canonical_size: u32,
    blur_sigma: f32,
    reference_blur_sigma: f32,
}

impl FeatureExtractor {
    pub fn new(config: &MatcherConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
        let mut offset = || {
            (
                rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
                rng.gen_range(-PATCH_RADIUS..=PATCH_RADIUS),
            )
        };
        let pattern = (0..DESCRIPTOR_BITS)
            .map(|_| SamplePair {
                a: offset(),
                b: offset(),
            })
            .collect();

        Self {
            pattern,
            fast_threshold: config.fast_threshold,
            max_features: config.max_features,
            canonical_size: config.canonical_size,
            blur_sigma: config.descriptor_blur_sigma,
            reference_blur_sigma: config.reference_blur_sigma,
        }
    }

    /// Resizes so the longest side equals the canonical size.
    pub fn normalize(&self, gray: &GrayImage) -> GrayImage {
        let (w, h) = gray.dimensions();
        let longest = w.max(h);
        if longest == 0 || longest == self.canonical_size {
            return gray.clone();
        }
        let scale = self.canonical_size as f64 / longest as f64;
        let nw = ((w as f64 * scale).round() as u32).max(1);
        let nh = ((h as f64 * scale).round() as u32).max(1);
        image::imageops::resize(gray, nw, nh, FilterType::Triangle)
    }

    /// Descriptors of a live region.
    pub fn extract(&self, gray: &GrayImage) -> DescriptorSet {
        self.describe(&self.normalize(gray))
    }

    /// Descriptors of a catalog image. References are smoothed a little more
    /// than live crops, which arrive already softened by the game's scaler.
    pub fn extract_reference(&self, gray: &GrayImage) -> DescriptorSet {
        let normalized = self.normalize(gray);
        if self.reference_blur_sigma > 0.0 {
            self.describe(&gaussian_blur_f32(&normalized, self.reference_blur_sigma))
        } else {
            self.describe(&normalized)
        }
    }

    fn describe(&self, img: &GrayImage) -> DescriptorSet {
        let (w, h) = img.dimensions();
        if w <= 2 * BORDER || h <= 2 * BORDER {
            return DescriptorSet::default();
        }

        let mut corners = corners_fast9(img, self.fast_threshold);
        corners.retain(|c| c.x >= BORDER && c.y >= BORDER && c.x < w - BORDER && c.y < h - BORDER);
        corners.sort_by(|a, b| b.score.total_cmp(&a.score));
        corners.truncate(self.max_features);

        let smoothed = if self.blur_sigma > 0.0 {
            gaussian_blur_f32(img, self.blur_sigma)
        } else {
            img.clone()
        };

        DescriptorSet::new(
            corners
                .iter()
                .map(|c| self.brief(&smoothed, c.x as i32, c.y as i32))
                .collect(),
        )
    }

    fn brief(&self, img: &GrayImage, x: i32, y: i32) -> Descriptor {
        let sample = |(dx, dy): (i32, i32)| img.get_pixel((x + dx) as u32, (y + dy) as u32)[0];
        let mut desc = [0u8; DESCRIPTOR_BYTES];
        for (i, pair) in self.pattern.iter().enumerate() {
            if sample(pair.a) < sample(pair.b) {
                desc[i / 8] |= 1 << (i % 8);
            }
        }
        desc
    }
}

pub fn hamming_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// Counts query descriptors whose nearest neighbour in `train` passes the
/// ratio test (`best < ratio * second_best`).
///
/// Needs at least two train descriptors to form a ratio; otherwise 0.
pub fn count_good_matches(query: &DescriptorSet, train: &DescriptorSet, ratio: f32) -> u32 {
    if train.len() < 2 {
        return 0;
    }

    let mut good = 0;
    for q in query.as_slice() {
        let mut best = u32::MAX;
        let mut second = u32::MAX;
        for t in train.as_slice() {
            let d = hamming_distance(q, t);
            if d < best {
                second = best;
                best = d;
            } else if d < second {
                second = d;
            }
        }
        if (best as f32) < ratio * second as f32 {
            good += 1;
        }
    }
    good
}
