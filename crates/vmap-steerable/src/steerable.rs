//! Orientation-split density maps of the visible feature lines.

use std::f64::consts::PI;

use fxhash::FxHashMap;
use log::{debug, warn};
use vmap::{FEdge, FEdgeId, ViewMap};
use vmap_math::Vec2;

use crate::{GaussianPyramid, GrayImage, Result, SteerableError};

/// Orientation bins used when none is requested.
pub const DEFAULT_NB_ORIENTATIONS: usize = 4;

/// Number of coincident lines one 8-bit pixel can count: a pixel value
/// of 1 stands for `255 / ENCODING` lines.
pub const ENCODING: f32 = 32.0;

/// Line density images split by direction.
///
/// The `N` reference directions are spread evenly over `[0, π)`; a
/// feature edge contributes to bin `i` with weight
/// `cos(N/2 · acos|d · r_i|)`, zero once the angle to `r_i` exceeds
/// `π/N`. Bin `N` counts every edge with weight 1.
#[derive(Debug, Clone)]
pub struct SteerableViewMap {
    nb_orientations: usize,
    bound: f64,
    directions: Vec<Vec2>,
    weights: FxHashMap<FEdgeId, Vec<f64>>,
    pyramids: Vec<GaussianPyramid>,
}

impl Default for SteerableViewMap {
    fn default() -> Self {
        Self::new(DEFAULT_NB_ORIENTATIONS)
    }
}

impl SteerableViewMap {
    /// Steerable map with `nb_orientations` direction bins (at least 1).
    pub fn new(nb_orientations: usize) -> Self {
        let n = if nb_orientations == 0 {
            warn!("a steerable view map needs at least one orientation, using 1");
            1
        } else {
            nb_orientations
        };
        let directions = (0..n)
            .map(|i| {
                let angle = i as f64 * PI / n as f64;
                Vec2::new(angle.cos(), angle.sin())
            })
            .collect();
        Self {
            nb_orientations: n,
            bound: (PI / n as f64).cos(),
            directions,
            weights: FxHashMap::default(),
            pyramids: Vec::new(),
        }
    }

    /// Number of direction bins, without the complete bin.
    pub fn nb_orientations(&self) -> usize {
        self.nb_orientations
    }

    /// Reference direction of bin `i`.
    pub fn direction(&self, i: usize) -> Option<Vec2> {
        self.directions.get(i).copied()
    }

    /// Weight of the unit direction `dir` in bin `i`. Bin
    /// `nb_orientations` is the complete bin, always 1.
    pub fn compute_weight(&self, dir: &Vec2, i: usize) -> f64 {
        if i == self.nb_orientations {
            return 1.0;
        }
        let Some(r) = self.directions.get(i) else {
            return 0.0;
        };
        let dot = dir.dot(r).abs().min(1.0);
        if dot < self.bound {
            return 0.0;
        }
        (self.nb_orientations as f64 / 2.0 * dot.acos()).cos()
    }

    /// Weights of `fe` in every bin, complete bin last. Computed once per
    /// feature edge.
    pub fn add_fedge(&mut self, vm: &ViewMap, fe: &FEdge) -> &[f64] {
        if !self.weights.contains_key(&fe.id) {
            let a = vm.svertex(fe.a).point_2d;
            let b = vm.svertex(fe.b).point_2d;
            let dir = Vec2::new(b.x - a.x, b.y - a.y).try_normalize(1e-12);
            let mut w: Vec<f64> = (0..self.nb_orientations)
                .map(|i| dir.map_or(0.0, |d| self.compute_weight(&d, i)))
                .collect();
            w.push(1.0);
            self.weights.insert(fe.id, w);
        }
        &self.weights[&fe.id]
    }

    /// Bin whose reference direction is closest to `dir`.
    pub fn equivalent_orientation(&self, dir: &Vec2) -> usize {
        let Some(d) = dir.try_normalize(1e-12) else {
            return self.nb_orientations;
        };
        (0..self.nb_orientations)
            .map(|i| (i, d.dot(&self.directions[i]).abs()))
            .fold((0, f64::NEG_INFINITY), |best, (i, c)| if c > best.1 { (i, c) } else { best })
            .0
    }

    /// Draw every visible feature edge of `vm` into `nb_orientations + 1`
    /// images of `width × height` pixels. Each pixel a line crosses gains
    /// `weight / 255 · ENCODING`.
    pub fn rasterize_orientations(
        &mut self,
        vm: &ViewMap,
        width: usize,
        height: usize,
    ) -> Vec<GrayImage> {
        let mut images = vec![GrayImage::new(width, height); self.nb_orientations + 1];
        let unit = ENCODING / 255.0;
        let mut drawn = 0;
        for fe in vm.fedges().iter().filter(|fe| fe.qi == 0) {
            let a = vm.svertex(fe.a).point_2d.xy();
            let b = vm.svertex(fe.b).point_2d.xy();
            let weights = self.add_fedge(vm, fe);
            for (img, &w) in images.iter_mut().zip(weights) {
                if w > 0.0 {
                    img.draw_line(&a, &b, w as f32 * unit);
                }
            }
            drawn += 1;
        }
        debug!("rasterized {drawn} visible feature edges at {width}x{height}");
        images
    }

    /// Wrap each of the `nb_orientations + 1` images in a Gaussian
    /// pyramid, replacing any previous pyramids.
    pub fn build_images_pyramids(
        &mut self,
        images: Vec<GrayImage>,
        nb_levels: usize,
        sigma: f32,
    ) -> Result<()> {
        let expected = self.nb_orientations + 1;
        if images.len() != expected {
            return Err(SteerableError::ImageCount {
                expected,
                got: images.len(),
            });
        }
        self.pyramids = images
            .into_iter()
            .map(|img| GaussianPyramid::new(img, nb_levels, sigma))
            .collect();
        Ok(())
    }

    /// Pyramid of bin `orientation`, once built.
    pub fn pyramid(&self, orientation: usize) -> Option<&GaussianPyramid> {
        self.pyramids.get(orientation)
    }

    /// Levels per pyramid, 0 before [`Self::build_images_pyramids`].
    pub fn nb_levels(&self) -> usize {
        self.pyramids.first().map_or(0, GaussianPyramid::nb_levels)
    }

    /// Line density of bin `orientation` around level-0 pixel `(x, y)`
    /// at pyramid `level`: roughly the number of lines of that direction
    /// crossing the pixel.
    ///
    /// Reads outside the pyramid give 0, and so do reads before any
    /// pyramid was built.
    pub fn read_steerable_view_map_pixel(&self, orientation: usize, level: usize, x: f64, y: f64) -> f32 {
        if self.pyramids.is_empty() {
            warn!("steerable view map read before its pyramids were built");
            return 0.0;
        }
        match self.pyramids.get(orientation) {
            Some(p) => p.pixel(level, x, y) * 255.0 / ENCODING,
            None => 0.0,
        }
    }

    /// [`Self::read_steerable_view_map_pixel`] on the complete bin.
    pub fn read_complete_view_map_pixel(&self, level: usize, x: f64, y: f64) -> f32 {
        self.read_steerable_view_map_pixel(self.nb_orientations, level, x, y)
    }

    /// Forget cached weights and pyramids.
    pub fn reset(&mut self) {
        self.weights.clear();
        self.pyramids.clear();
    }
}
