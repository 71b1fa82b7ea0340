//! Uniform 3D grid of occluding triangles.

use std::ops::ControlFlow;

use log::{debug, warn};
use vmap_math::{geom, Aabb3, Point3, Vec3};
use vmap_winged::{FaceId, FaceRef, WingedEdgeMesh};

use crate::{Occluder, Ray, RayScratch};

/// Upper bound on the number of cells, whatever the requested occupancy.
pub const MAX_CELLS: usize = 1 << 22;

/// Relative size given to a zero-extent axis.
const AXIS_NUDGE: f64 = 1e-3;

/// Absolute size given to a zero-extent axis when every other axis is
/// also tiny.
const MIN_AXIS: f64 = 1e-6;

/// Axis-aligned box partitioned into equal cubic cells, each listing the
/// occluders overlapping it.
///
/// Every occluder appears in every cell its triangle intersects. The grid
/// is read-only while rays are cast, so queries take `&self` and keep
/// their per-query state in a [`RayScratch`].
#[derive(Debug, Clone, Default)]
pub struct SpatialGrid {
    origin: Point3,
    size: Vec3,
    cell_size: f64,
    cells_per_axis: [usize; 3],
    cells: Vec<Vec<u32>>,
    occluders: Vec<Occluder>,
}

impl SpatialGrid {
    /// An unconfigured grid that holds nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grid over every non-degenerate face of `mesh`, with roughly
    /// `density` cells per face.
    pub fn from_mesh(mesh: &WingedEdgeMesh, density: f64) -> Self {
        let mut grid = Self::new();
        let bbox = mesh.bbox();
        if !bbox.is_valid() {
            return grid;
        }
        // Pad so faces on the bbox sides fall strictly inside.
        let pad = bbox.size().norm() * 1e-3 + MIN_AXIS;
        let origin = bbox.min - Vec3::repeat(pad);
        let size = bbox.size() + Vec3::repeat(2.0 * pad);
        let target = (mesh.num_faces() as f64 * density.max(0.0)).ceil() as usize;
        grid.configure(origin, size, target.max(1));

        for shape in &mesh.shapes {
            for (i, face) in shape.faces.iter().enumerate() {
                if face.is_degenerate() {
                    continue;
                }
                let face_id = FaceId(i as u32);
                grid.insert(Occluder {
                    face: FaceRef {
                        shape: shape.id,
                        face: face_id,
                    },
                    vertices: shape.face_positions(face_id),
                    normal: face.normal,
                });
            }
        }
        debug!(
            "spatial grid: {} occluders in {:?} cells",
            grid.occluders.len(),
            grid.cells_per_axis
        );
        grid
    }

    /// Allocate `nb_cells` (approximately) cubic cells spanning the box
    /// `origin .. origin + size`, discarding any previous content.
    ///
    /// Zero-extent axes are widened to a small fraction of the largest
    /// axis with a warning. A box that is degenerate along every axis
    /// leaves the grid empty.
    pub fn configure(&mut self, origin: Point3, size: Vec3, nb_cells: usize) {
        self.clear();
        self.cells.clear();
        self.cells_per_axis = [0; 3];

        let largest = size.max();
        if !(largest.is_finite() && largest > 0.0) {
            warn!("spatial grid: scene box {size:?} is degenerate on every axis; grid left empty");
            return;
        }

        let mut size = size;
        for axis in 0..3 {
            if size[axis] <= 0.0 {
                let nudged = (largest * AXIS_NUDGE).max(MIN_AXIS);
                warn!("spatial grid: axis {axis} has zero extent, widening to {nudged}");
                size[axis] = nudged;
            }
        }

        let nb_cells = nb_cells.clamp(1, MAX_CELLS);
        let cell_volume = size.x * size.y * size.z / nb_cells as f64;
        let mut edge = cell_volume.cbrt();
        let mut per_axis = cells_for(&size, edge);
        while per_axis.iter().product::<usize>() > MAX_CELLS {
            edge *= 1.25;
            per_axis = cells_for(&size, edge);
        }

        self.origin = origin;
        self.size = size;
        self.cell_size = edge;
        self.cells_per_axis = per_axis;
        self.cells = vec![Vec::new(); per_axis.iter().product()];
    }

    /// Add an occluder to every cell its triangle overlaps.
    pub fn insert(&mut self, occluder: Occluder) {
        if self.cells.is_empty() {
            return;
        }
        let index = self.occluders.len() as u32;
        let bbox = Aabb3::from_points(occluder.vertices.iter());
        let lo = self.cell_of(&bbox.min);
        let hi = self.cell_of(&bbox.max);
        let half = Vec3::repeat(self.cell_size * 0.5 * (1.0 + 1e-9));
        let [v0, v1, v2] = &occluder.vertices;

        for k in lo[2]..=hi[2] {
            for j in lo[1]..=hi[1] {
                for i in lo[0]..=hi[0] {
                    let center = self.cell_min([i, j, k]) + half;
                    if geom::triangle_box_overlap(&center, &half, v0, v1, v2) {
                        let c = self.cell_index([i, j, k]);
                        self.cells[c].push(index);
                    }
                }
            }
        }
        self.occluders.push(occluder);
    }

    /// Drop every occluder, keeping the cell layout.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.occluders.clear();
    }

    /// Every occluder inserted so far.
    pub fn occluders(&self) -> &[Occluder] {
        &self.occluders
    }

    /// Number of cells along each axis.
    pub fn cells_per_axis(&self) -> [usize; 3] {
        self.cells_per_axis
    }

    /// Edge length of a cell.
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Whether the grid has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Box covered by the cells.
    pub fn bounds(&self) -> Aabb3 {
        let extent = Vec3::new(
            self.cells_per_axis[0] as f64,
            self.cells_per_axis[1] as f64,
            self.cells_per_axis[2] as f64,
        ) * self.cell_size;
        Aabb3::new(self.origin, self.origin + extent)
    }

    /// Occluder indices stored in the cell containing `p`.
    pub fn cell_content(&self, p: &Point3) -> &[u32] {
        if self.cells.is_empty() {
            return &[];
        }
        &self.cells[self.cell_index(self.cell_of(p))]
    }

    /// Visit every occluder in the cells crossed by `ray` between
    /// parameters `0` and `t_max`, each at most once, in front-to-back
    /// cell order. The visitor may stop the walk early.
    pub fn cast_ray<F>(&self, ray: &Ray, t_max: f64, scratch: &mut RayScratch, mut visit: F)
    where
        F: FnMut(u32, &Occluder) -> ControlFlow<()>,
    {
        if self.cells.is_empty() {
            return;
        }
        let Some((t_enter, t_exit)) = ray.intersect_aabb(&self.bounds()) else {
            return;
        };
        let t_end = t_exit.min(t_max);
        if t_enter > t_end {
            return;
        }

        scratch.begin(self.occluders.len());
        let start = ray.at(t_enter);
        let mut cell = self.cell_of(&start);

        let mut step = [0isize; 3];
        let mut t_next = [f64::INFINITY; 3];
        let mut t_delta = [f64::INFINITY; 3];
        for axis in 0..3 {
            let d = ray.direction[axis];
            if d > 0.0 {
                step[axis] = 1;
                let boundary = self.origin[axis] + (cell[axis] + 1) as f64 * self.cell_size;
                t_next[axis] = t_enter + (boundary - start[axis]) / d;
                t_delta[axis] = self.cell_size / d;
            } else if d < 0.0 {
                step[axis] = -1;
                let boundary = self.origin[axis] + cell[axis] as f64 * self.cell_size;
                t_next[axis] = t_enter + (boundary - start[axis]) / d;
                t_delta[axis] = -self.cell_size / d;
            }
        }

        loop {
            for &idx in &self.cells[self.cell_index(cell)] {
                if scratch.mark(idx) && visit(idx, &self.occluders[idx as usize]).is_break() {
                    return;
                }
            }

            let axis = if t_next[0] <= t_next[1] && t_next[0] <= t_next[2] {
                0
            } else if t_next[1] <= t_next[2] {
                1
            } else {
                2
            };
            if t_next[axis] > t_end {
                return;
            }
            let next = cell[axis] as isize + step[axis];
            if next < 0 || next as usize >= self.cells_per_axis[axis] {
                return;
            }
            cell[axis] = next as usize;
            t_next[axis] += t_delta[axis];
        }
    }

    fn cell_of(&self, p: &Point3) -> [usize; 3] {
        let mut c = [0usize; 3];
        for axis in 0..3 {
            let f = ((p[axis] - self.origin[axis]) / self.cell_size).floor();
            let max = self.cells_per_axis[axis].saturating_sub(1);
            c[axis] = if f.is_nan() || f < 0.0 {
                0
            } else {
                (f as usize).min(max)
            };
        }
        c
    }

    fn cell_min(&self, c: [usize; 3]) -> Point3 {
        self.origin + Vec3::new(c[0] as f64, c[1] as f64, c[2] as f64) * self.cell_size
    }

    fn cell_index(&self, c: [usize; 3]) -> usize {
        (c[2] * self.cells_per_axis[1] + c[1]) * self.cells_per_axis[0] + c[0]
    }
}

fn cells_for(size: &Vec3, edge: f64) -> [usize; 3] {
    [
        (size.x / edge).floor() as usize + 1,
        (size.y / edge).floor() as usize + 1,
        (size.z / edge).floor() as usize + 1,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmap_winged::{primitives, ShapeId};

    fn stacked_quads(n: usize) -> WingedEdgeMesh {
        let meshes: Vec<_> = (0..n).map(|i| primitives::quad(i as f64, 1.0)).collect();
        WingedEdgeMesh::from_triangle_meshes(&meshes).unwrap()
    }

    #[test]
    fn test_configure_cell_count() {
        let mut grid = SpatialGrid::new();
        grid.configure(Point3::origin(), Vec3::new(2.0, 2.0, 2.0), 8);
        // edge = 1.0, floor(2/1) + 1 = 3 cells per axis
        assert_eq!(grid.cells_per_axis(), [3, 3, 3]);
        assert!((grid.cell_size() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_configure_degenerate_axis_is_nudged() {
        let mut grid = SpatialGrid::new();
        grid.configure(Point3::origin(), Vec3::new(4.0, 4.0, 0.0), 16);
        assert!(!grid.is_empty());
        assert!(grid.cells_per_axis()[2] >= 1);
    }

    #[test]
    fn test_configure_fully_degenerate_is_empty() {
        let mut grid = SpatialGrid::new();
        grid.configure(Point3::origin(), Vec3::zeros(), 16);
        assert!(grid.is_empty());
        // Inserting into an empty grid is a no-op.
        grid.insert(Occluder {
            face: FaceRef {
                shape: ShapeId(0),
                face: FaceId(0),
            },
            vertices: [Point3::origin(); 3],
            normal: Vec3::z(),
        });
        assert!(grid.occluders().is_empty());
    }

    #[test]
    fn test_cell_count_is_capped() {
        let mut grid = SpatialGrid::new();
        grid.configure(Point3::origin(), Vec3::new(1.0, 1.0, 1.0), usize::MAX);
        assert!(grid.cells_per_axis().iter().product::<usize>() <= MAX_CELLS);
    }

    #[test]
    fn test_every_overlapped_cell_lists_triangle() {
        let mesh = WingedEdgeMesh::from_triangle_meshes(&[primitives::cube(1.0)]).unwrap();
        let grid = SpatialGrid::from_mesh(&mesh, 4.0);
        assert_eq!(grid.occluders().len(), 12);
        // A point on the top face must find a top-face triangle in its cell.
        let cell = grid.cell_content(&Point3::new(0.3, 0.6, 1.0));
        assert!(cell
            .iter()
            .any(|&i| grid.occluders()[i as usize].normal.z > 0.99));
    }

    #[test]
    fn test_cast_ray_visits_each_occluder_once() {
        let mesh = stacked_quads(4);
        let grid = SpatialGrid::from_mesh(&mesh, 8.0);
        let mut scratch = RayScratch::new();
        let ray = Ray::new(Point3::new(0.3, -0.2, -1.0), Vec3::z()).unwrap();
        let mut seen = Vec::new();
        grid.cast_ray(&ray, 100.0, &mut scratch, |i, _| {
            seen.push(i);
            ControlFlow::Continue(())
        });
        let mut unique = seen.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), seen.len(), "mailboxing must prevent repeats");
        let shapes: std::collections::BTreeSet<_> = seen
            .iter()
            .map(|&i| grid.occluders()[i as usize].face.shape)
            .collect();
        assert_eq!(shapes.len(), 4, "ray crosses all four quads");
    }

    #[test]
    fn test_cast_ray_early_exit() {
        let mesh = stacked_quads(3);
        let grid = SpatialGrid::from_mesh(&mesh, 8.0);
        let mut scratch = RayScratch::new();
        let ray = Ray::new(Point3::new(0.3, -0.2, -1.0), Vec3::z()).unwrap();
        let mut count = 0;
        grid.cast_ray(&ray, 100.0, &mut scratch, |_, _| {
            count += 1;
            ControlFlow::Break(())
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn test_cast_ray_respects_t_max() {
        let mesh = stacked_quads(4);
        let grid = SpatialGrid::from_mesh(&mesh, 8.0);
        let mut scratch = RayScratch::new();
        let ray = Ray::new(Point3::new(0.3, -0.2, -1.0), Vec3::z()).unwrap();
        let mut max_z: f64 = f64::NEG_INFINITY;
        grid.cast_ray(&ray, 1.5, &mut scratch, |_, occ| {
            max_z = max_z.max(occ.vertices[0].z);
            ControlFlow::Continue(())
        });
        // Cells are coarse, so occluders slightly beyond t_max may be
        // reported, but never the far quads.
        assert!(max_z < 3.0);
    }
}
