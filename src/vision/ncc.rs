//! Zero-mean normalized cross-correlation.
//!
//! Score at each placement is
//! `sum(T' * I') / sqrt(sum(T'^2) * sum(I'^2))` where `T'` and `I'` are the
//! template and window with their means removed. Window sums come from integral
//! images so only the cross term is computed per pixel.

use image::{imageops::FilterType, GrayImage};
use rayon::prelude::*;

const EPSILON: f64 = 1e-6;

/// Summed-area tables for a grayscale image, `(w + 1) x (h + 1)`.
struct Integral {
    stride: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl Integral {
    fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq_sum = vec![0u64; stride * (h + 1)];
        let raw = img.as_raw();

        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = raw[y * w + x] as u64;
                row_sum += v;
                row_sq += v * v;
                let dst = (y + 1) * stride + x + 1;
                sum[dst] = sum[dst - stride] + row_sum;
                sq_sum[dst] = sq_sum[dst - stride] + row_sq;
            }
        }

        Self { stride, sum, sq_sum }
    }

    /// Sum and squared sum over `[x0, x1) x [y0, y1)`.
    fn rect(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> (f64, f64) {
        let idx = |x: usize, y: usize| y * self.stride + x;
        let s = self.sum[idx(x1, y1)] + self.sum[idx(x0, y0)]
            - self.sum[idx(x0, y1)]
            - self.sum[idx(x1, y0)];
        let sq = self.sq_sum[idx(x1, y1)] + self.sq_sum[idx(x0, y0)]
            - self.sq_sum[idx(x0, y1)]
            - self.sq_sum[idx(x1, y0)];
        (s as f64, sq as f64)
    }
}

/// Template with its mean removed.
struct CenteredTemplate {
    width: usize,
    height: usize,
    values: Vec<f32>,
    norm_sq: f64,
}

impl CenteredTemplate {
    /// `None` for a flat template, which correlates with nothing.
    fn new(template: &GrayImage) -> Option<Self> {
        let (width, height) = (template.width() as usize, template.height() as usize);
        let n = (width * height) as f64;
        if n == 0.0 {
            return None;
        }
        let mean = template.as_raw().iter().map(|&v| v as f64).sum::<f64>() / n;
        let values: Vec<f32> = template
            .as_raw()
            .iter()
            .map(|&v| (v as f64 - mean) as f32)
            .collect();
        let norm_sq: f64 = values.iter().map(|&v| (v as f64) * (v as f64)).sum();
        (norm_sq > EPSILON).then_some(Self {
            width,
            height,
            values,
            norm_sq,
        })
    }
}

/// Placements to evaluate, inclusive ranges of top-left corners.
#[derive(Clone, Copy, Debug)]
struct SearchWindow {
    u0: usize,
    u1: usize,
    v0: usize,
    v1: usize,
}

/// Best `(score, u, v)` over the window.
fn search(image: &GrayImage, integral: &Integral, t: &CenteredTemplate, window: SearchWindow) -> Option<(f64, usize, usize)> {
    let iw = image.width() as usize;
    let raw = image.as_raw();
    let n = (t.width * t.height) as f64;

    (window.v0..=window.v1)
        .into_par_iter()
        .filter_map(|v| {
            let mut row_best: Option<(f64, usize, usize)> = None;
            for u in window.u0..=window.u1 {
                let (s, sq) = integral.rect(u, v, u + t.width, v + t.height);
                let var = sq - s * s / n;
                let score = if var <= EPSILON {
                    0.0
                } else {
                    let mut cross = 0.0f64;
                    for ty in 0..t.height {
                        let img_row = &raw[(v + ty) * iw + u..(v + ty) * iw + u + t.width];
                        let tpl_row = &t.values[ty * t.width..(ty + 1) * t.width];
                        let row: f32 = img_row
                            .iter()
                            .zip(tpl_row)
                            .map(|(&i, &tv)| i as f32 * tv)
                            .sum();
                        cross += row as f64;
                    }
                    cross / (t.norm_sq * var).sqrt()
                };
                if row_best.is_none_or(|(best, _, _)| score > best) {
                    row_best = Some((score, u, v));
                }
            }
            row_best
        })
        .reduce_with(|a, b| if b.0 > a.0 || (b.0 == a.0 && (b.2, b.1) < (a.2, a.1)) { b } else { a })
}

fn full_window(image: &GrayImage, template: &GrayImage) -> Option<SearchWindow> {
    if template.width() == 0
        || template.height() == 0
        || template.width() > image.width()
        || template.height() > image.height()
    {
        return None;
    }
    Some(SearchWindow {
        u0: 0,
        u1: (image.width() - template.width()) as usize,
        v0: 0,
        v1: (image.height() - template.height()) as usize,
    })
}

/// Peak correlation of `template` anywhere inside `image`, clamped to `[0, 1]`.
///
/// 0 when the template is larger than the image, empty or flat.
pub fn match_template_peak(image: &GrayImage, template: &GrayImage) -> f32 {
    let Some(window) = full_window(image, template) else {
        return 0.0;
    };
    let Some(t) = CenteredTemplate::new(template) else {
        return 0.0;
    };
    let integral = Integral::new(image);
    search(image, &integral, &t, window)
        .map(|(score, _, _)| score.clamp(0.0, 1.0) as f32)
        .unwrap_or(0.0)
}

/// Coarse-to-fine version of [`match_template_peak`] for large frames.
///
/// Both images are shrunk by a factor chosen so the template's smaller side
/// stays at least `min_side` pixels (capped at `max_factor`). The best coarse
/// placement is then refined at full resolution within a few pixels.
/// Falls back to the exhaustive search when no shrinking is possible.
pub fn match_template_peak_pyramid(
    image: &GrayImage,
    template: &GrayImage,
    max_factor: u32,
    min_side: u32,
) -> f32 {
    let Some(window) = full_window(image, template) else {
        return 0.0;
    };
    let factor = (template.width().min(template.height()) / min_side.max(1)).clamp(1, max_factor.max(1));
    if factor == 1 {
        return match_template_peak(image, template);
    }
    let Some(t_full) = CenteredTemplate::new(template) else {
        return 0.0;
    };

    let small_image = image::imageops::resize(
        image,
        (image.width() / factor).max(1),
        (image.height() / factor).max(1),
        FilterType::Triangle,
    );
    let small_template = image::imageops::resize(
        template,
        (template.width() / factor).max(1),
        (template.height() / factor).max(1),
        FilterType::Triangle,
    );

    let coarse = full_window(&small_image, &small_template).and_then(|coarse_window| {
        let t_small = CenteredTemplate::new(&small_template)?;
        let integral = Integral::new(&small_image);
        search(&small_image, &integral, &t_small, coarse_window)
    });
    let Some((_, cu, cv)) = coarse else {
        return match_template_peak(image, template);
    };

    let f = factor as usize;
    let reach = f + 1;
    let (cu, cv) = (cu * f, cv * f);
    let refine = SearchWindow {
        u0: cu.saturating_sub(reach).min(window.u1),
        u1: (cu + reach).min(window.u1),
        v0: cv.saturating_sub(reach).min(window.v1),
        v1: (cv + reach).min(window.v1),
    };

    let integral = Integral::new(image);
    search(image, &integral, &t_full, refine)
        .map(|(score, _, _)| score.clamp(0.0, 1.0) as f32)
        .unwrap_or(0.0)
}
