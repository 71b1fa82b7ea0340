//! Gaussian image pyramids.

use log::trace;

use crate::GrayImage;

/// A chain of progressively blurred and halved copies of an image.
///
/// Level 0 is the image itself; level `l + 1` is level `l` blurred with
/// a separable Gaussian of standard deviation `sigma` and subsampled by
/// two along each axis.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianPyramid {
    levels: Vec<GrayImage>,
    sigma: f32,
}

impl GaussianPyramid {
    /// Build a pyramid of `nb_levels` levels over `image`. With
    /// `nb_levels == 0` levels are added until one side reaches a single
    /// pixel. Construction also stops early at that size.
    pub fn new(image: GrayImage, nb_levels: usize, sigma: f32) -> Self {
        let kernel = gaussian_kernel(sigma);
        let mut levels = vec![image];
        loop {
            if nb_levels != 0 && levels.len() >= nb_levels {
                break;
            }
            let Some(top) = levels.last() else { break };
            if top.width() <= 1 || top.height() <= 1 {
                break;
            }
            let next = downsample(&blur(top, &kernel));
            levels.push(next);
        }
        trace!(
            "pyramid of {} levels from {}x{}",
            levels.len(),
            levels[0].width(),
            levels[0].height()
        );
        Self { levels, sigma }
    }

    /// Number of levels.
    pub fn nb_levels(&self) -> usize {
        self.levels.len()
    }

    /// Blur standard deviation.
    pub fn sigma(&self) -> f32 {
        self.sigma
    }

    /// Image at `level`.
    pub fn level(&self, level: usize) -> Option<&GrayImage> {
        self.levels.get(level)
    }

    /// Bilinear read at level-0 coordinates `(x, y)` from `level`.
    /// Returns 0 for a missing level or a point outside the image.
    pub fn pixel(&self, level: usize, x: f64, y: f64) -> f32 {
        let Some(img) = self.levels.get(level) else {
            return 0.0;
        };
        let scale = (1u64 << level.min(62)) as f64;
        img.bilinear(x / scale, y / scale)
    }
}

/// Normalized 1D Gaussian taps covering `±3σ`. A non-positive sigma gives
/// the identity kernel.
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    if !(sigma > 0.0) {
        return vec![1.0];
    }
    let radius = (3.0 * sigma).ceil() as isize;
    let denom = 2.0 * sigma * sigma;
    let mut taps: Vec<f32> = (-radius..=radius)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = taps.iter().sum();
    for t in &mut taps {
        *t /= sum;
    }
    taps
}

/// Separable convolution with edge clamping.
fn blur(img: &GrayImage, kernel: &[f32]) -> GrayImage {
    if kernel.len() == 1 {
        return img.clone();
    }
    let radius = (kernel.len() / 2) as isize;
    let (w, h) = (img.width(), img.height());

    let mut rows = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let v: f32 = kernel
                .iter()
                .enumerate()
                .map(|(k, t)| t * img.clamped(x as isize + k as isize - radius, y as isize))
                .sum();
            rows.set(x, y, v);
        }
    }
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let v: f32 = kernel
                .iter()
                .enumerate()
                .map(|(k, t)| t * rows.clamped(x as isize, y as isize + k as isize - radius))
                .sum();
            out.set(x, y, v);
        }
    }
    out
}

/// Keep every other pixel along each axis.
fn downsample(img: &GrayImage) -> GrayImage {
    let w = (img.width() / 2).max(1);
    let h = (img.height() / 2).max(1);
    let mut out = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            out.set(x, y, img.clamped(2 * x as isize, 2 * y as isize));
        }
    }
    out
}
