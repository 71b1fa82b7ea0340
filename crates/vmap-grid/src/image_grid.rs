//! Image-space grid of projected occluders.

use log::debug;
use vmap_math::{Camera, Point2};

use crate::{Occluder, RayScratch};

/// Occluders bucketed by the 2D bounding box of their projection.
///
/// Any occluder that can hide a point must cover that point's projection,
/// so the candidate set for a line-of-sight query is the single cell
/// under the point plus the occluders that could not be projected (one
/// vertex on or behind the eye plane), which are always tested.
#[derive(Debug, Clone, Default)]
pub struct ImageGrid {
    min: Point2,
    cell_size: f64,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<u32>>,
    unprojectable: Vec<u32>,
    culled: usize,
}

impl ImageGrid {
    /// Bucket `occluders` in image space.
    ///
    /// With `cull_margin = Some(m)`, occluders whose projection lies
    /// entirely outside the viewport grown by `m` are left out.
    pub fn build(occluders: &[Occluder], camera: &Camera, cull_margin: Option<f64>) -> Self {
        let viewport = camera.viewport();
        let mut boxes = Vec::with_capacity(occluders.len());
        let mut unprojectable = Vec::new();
        let mut culled = 0;

        let mut min = Point2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (i, occ) in occluders.iter().enumerate() {
            if !occ.vertices.iter().all(|v| camera.is_in_front(v)) {
                unprojectable.push(i as u32);
                continue;
            }
            let mut lo = Point2::new(f64::INFINITY, f64::INFINITY);
            let mut hi = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
            for v in &occ.vertices {
                let p = camera.project(v);
                lo = lo.inf(&Point2::new(p.x, p.y));
                hi = hi.sup(&Point2::new(p.x, p.y));
            }
            if let Some(margin) = cull_margin {
                if !viewport.overlaps_with_margin((lo.x, lo.y), (hi.x, hi.y), margin) {
                    culled += 1;
                    continue;
                }
            }
            min = min.inf(&lo);
            max = max.sup(&hi);
            boxes.push((i as u32, lo, hi));
        }

        let mut grid = Self {
            unprojectable,
            culled,
            ..Self::default()
        };
        if boxes.is_empty() {
            return grid;
        }

        let extent = max - min;
        let side = (boxes.len() as f64).sqrt().ceil().max(1.0);
        let cell_size = (extent.x.max(extent.y) / side).max(1e-9);
        grid.min = min;
        grid.cell_size = cell_size;
        grid.cols = (extent.x / cell_size).floor() as usize + 1;
        grid.rows = (extent.y / cell_size).floor() as usize + 1;
        grid.cells = vec![Vec::new(); grid.cols * grid.rows];

        for (idx, lo, hi) in boxes {
            let (c0, r0) = grid.cell_of(&lo);
            let (c1, r1) = grid.cell_of(&hi);
            for r in r0..=r1 {
                for c in c0..=c1 {
                    grid.cells[r * grid.cols + c].push(idx);
                }
            }
        }
        debug!(
            "image grid: {}x{} cells, {} unprojectable, {} culled",
            grid.cols,
            grid.rows,
            grid.unprojectable.len(),
            grid.culled
        );
        grid
    }

    /// Number of occluders left out by viewport culling.
    pub fn culled(&self) -> usize {
        self.culled
    }

    /// Number of projected occluders whose box covers the cell under
    /// `p`, not counting unprojectable ones.
    pub fn density_at(&self, p: &Point2) -> usize {
        self.cell_at(p).map_or(0, |c| self.cells[c].len())
    }

    /// Visit every candidate occluder for a line of sight through `p`,
    /// each once.
    pub fn for_each_candidate<F>(&self, p: &Point2, scratch: &mut RayScratch, num_occluders: usize, mut visit: F)
    where
        F: FnMut(u32) -> std::ops::ControlFlow<()>,
    {
        scratch.begin(num_occluders);
        let cell = self.cell_at(p).map(|c| self.cells[c].as_slice()).unwrap_or(&[]);
        for &idx in cell.iter().chain(&self.unprojectable) {
            if scratch.mark(idx) && visit(idx).is_break() {
                return;
            }
        }
    }

    fn cell_at(&self, p: &Point2) -> Option<usize> {
        if self.cells.is_empty() {
            return None;
        }
        let fx = ((p.x - self.min.x) / self.cell_size).floor();
        let fy = ((p.y - self.min.y) / self.cell_size).floor();
        if !(fx >= 0.0 && fy >= 0.0) {
            return None;
        }
        let (c, r) = (fx as usize, fy as usize);
        if c >= self.cols || r >= self.rows {
            return None;
        }
        Some(r * self.cols + c)
    }

    fn cell_of(&self, p: &Point2) -> (usize, usize) {
        let fx = ((p.x - self.min.x) / self.cell_size).floor().max(0.0) as usize;
        let fy = ((p.y - self.min.y) / self.cell_size).floor().max(0.0) as usize;
        (fx.min(self.cols - 1), fy.min(self.rows - 1))
    }
}
