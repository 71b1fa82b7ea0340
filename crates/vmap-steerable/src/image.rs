//! Single-channel float images.

use vmap_math::Point2;

/// A row-major grayscale image with `f32` pixels in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayImage {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl GrayImage {
    /// Black image of the given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    /// Image filled with `value`.
    pub fn filled(width: usize, height: usize, value: f32) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixel values, row by row.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Value at `(x, y)`, or `None` outside the image.
    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        (x < self.width && y < self.height).then(|| self.data[y * self.width + x])
    }

    /// Value at `(x, y)` with coordinates clamped to the image.
    pub(crate) fn clamped(&self, x: isize, y: isize) -> f32 {
        let x = x.clamp(0, self.width as isize - 1) as usize;
        let y = y.clamp(0, self.height as isize - 1) as usize;
        self.data[y * self.width + x]
    }

    /// Set the pixel at `(x, y)`; writes outside the image are ignored.
    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = value;
        }
    }

    /// Add `value` to the pixel at `(x, y)`, saturating at 1.
    pub fn add(&mut self, x: usize, y: usize, value: f32) {
        if x < self.width && y < self.height {
            let p = &mut self.data[y * self.width + x];
            *p = (*p + value).min(1.0);
        }
    }

    /// Bilinear sample at `(x, y)`, pixel centres at integer coordinates.
    /// Returns 0 outside `[0, width - 1] × [0, height - 1]`.
    pub fn bilinear(&self, x: f64, y: f64) -> f32 {
        if self.data.is_empty()
            || !(x >= 0.0 && y >= 0.0)
            || x > (self.width - 1) as f64
            || y > (self.height - 1) as f64
        {
            return 0.0;
        }
        let x0 = x.floor() as isize;
        let y0 = y.floor() as isize;
        let fx = (x - x0 as f64) as f32;
        let fy = (y - y0 as f64) as f32;
        let top = self.clamped(x0, y0) * (1.0 - fx) + self.clamped(x0 + 1, y0) * fx;
        let bottom = self.clamped(x0, y0 + 1) * (1.0 - fx) + self.clamped(x0 + 1, y0 + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    }

    /// Add `value` to every pixel the segment `a`–`b` passes over, one
    /// sample per pixel step. The end pixel is left to the following
    /// segment of a chain.
    pub fn draw_line(&mut self, a: &Point2, b: &Point2, value: f32) {
        let d = *b - *a;
        let steps = d.x.abs().max(d.y.abs()).ceil() as usize;
        if steps == 0 {
            return;
        }
        let mut last = None;
        for k in 0..steps {
            let p = *a + d * (k as f64 / steps as f64);
            if p.x < 0.0 || p.y < 0.0 {
                continue;
            }
            let px = (p.x as usize, p.y as usize);
            if last != Some(px) {
                self.add(px.0, px.1, value);
                last = Some(px);
            }
        }
    }

    /// Quantize to 8 bits.
    pub fn to_u8(&self) -> Vec<u8> {
        self.data
            .iter()
            .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_get_and_set() {
        let mut img = GrayImage::new(4, 3);
        img.set(3, 2, 0.5);
        assert_eq!(img.get(3, 2), Some(0.5));
        assert_eq!(img.get(4, 0), None);
        img.set(10, 10, 1.0);
        assert!(img.data().iter().filter(|&&v| v != 0.0).count() == 1);
    }

    #[test]
    fn test_add_saturates() {
        let mut img = GrayImage::new(1, 1);
        for _ in 0..10 {
            img.add(0, 0, 0.25);
        }
        assert_eq!(img.get(0, 0), Some(1.0));
    }

    #[test]
    fn test_bilinear() {
        let mut img = GrayImage::new(2, 2);
        img.set(1, 0, 1.0);
        img.set(1, 1, 1.0);
        assert_relative_eq!(img.bilinear(0.0, 0.0), 0.0);
        assert_relative_eq!(img.bilinear(0.25, 0.5), 0.25);
        assert_relative_eq!(img.bilinear(1.0, 1.0), 1.0);
        assert_eq!(img.bilinear(1.5, 0.0), 0.0, "outside the image");
        assert_eq!(img.bilinear(-0.1, 0.0), 0.0);
    }

    #[test]
    fn test_draw_horizontal_line() {
        let mut img = GrayImage::new(16, 8);
        img.draw_line(&Point2::new(2.5, 3.5), &Point2::new(10.5, 3.5), 0.5);
        for x in 0..16 {
            let expected = if (2..10).contains(&x) { 0.5 } else { 0.0 };
            assert_eq!(img.get(x, 3), Some(expected), "pixel {x}");
        }
        let total: f32 = img.data().iter().sum();
        assert_relative_eq!(total, 4.0);
    }

    #[test]
    fn test_draw_clips_to_image() {
        let mut img = GrayImage::new(4, 4);
        img.draw_line(&Point2::new(-3.0, 1.0), &Point2::new(8.0, 1.0), 0.25);
        assert_eq!(img.get(0, 1), Some(0.25));
        assert_eq!(img.get(3, 1), Some(0.25));
    }

    #[test]
    fn test_to_u8() {
        let img = GrayImage::filled(2, 1, 0.5);
        assert_eq!(img.to_u8(), vec![128, 128]);
    }
}
