//! Lines of sight from points on feature edges toward the viewer.

use std::ops::ControlFlow;

use vmap_grid::{ImageGrid, Occluder, Ray, RayScratch, SpatialGrid};
use vmap_math::{geom, Camera, Point2, Point3};
use vmap_winged::{FaceRef, ShapeId, VertexId, WingedEdgeMesh};

use crate::silhouette::{FEdge, Occludee};

/// Barycentric margin for occluder hits. Slightly negative, so a line of
/// sight through an edge shared by two triangles hits both; the hits are
/// then merged by depth.
const BORDER_EPS: f64 = -1e-9;

/// Hits on the own shape of a smooth line closer than this many times
/// the longest edge of its face are grazing hits on the neighbouring
/// facets, not occlusion.
const SMOOTH_NEIGHBOURHOOD: f64 = 2.0;

/// Faces a line of sight from a given feature edge must ignore.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Exclusion {
    faces: [Option<FaceRef>; 2],
    /// For lines drawn inside a face: the face corners, whose incident
    /// faces are ignored too.
    around: Option<(ShapeId, [VertexId; 3])>,
    /// For lines drawn inside a face: own-shape hits nearer than this
    /// are ignored.
    near: Option<(ShapeId, f64)>,
}

impl Exclusion {
    pub(crate) fn for_fedge(fe: &FEdge, mesh: &WingedEdgeMesh) -> Self {
        let mut excl = Self {
            faces: [fe.face_a, fe.face_b],
            ..Self::default()
        };
        if let Some(f) = fe.face_a.filter(|_| fe.is_smooth()) {
            let shape = mesh.shape(f.shape);
            let [a, b, c] = shape.face_positions(f.face);
            let longest = (b - a).norm().max((c - b).norm()).max((a - c).norm());
            excl.around = Some((f.shape, shape.face(f.face).vertices));
            excl.near = Some((f.shape, SMOOTH_NEIGHBOURHOOD * longest));
        }
        excl
    }

    fn excludes(&self, mesh: &WingedEdgeMesh, occ: &Occluder) -> bool {
        if self.faces.contains(&Some(occ.face)) {
            return true;
        }
        match self.around {
            Some((shape, corners)) if shape == occ.face.shape => mesh
                .face(occ.face)
                .vertices
                .iter()
                .any(|v| corners.contains(v)),
            _ => false,
        }
    }

    fn excludes_hit(&self, occ: &Occluder, t: f64) -> bool {
        matches!(self.near, Some((shape, radius)) if shape == occ.face.shape && t < radius)
    }
}

/// Result of one line-of-sight query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Sample {
    pub qi: u32,
    /// Shapes crossed, sorted and unique.
    pub occluders: Vec<ShapeId>,
}

/// Ray caster shared by every visibility variant.
///
/// With an image grid, candidates come from the image-space bucket under
/// the projected sample; otherwise the ray walks the 3D grid.
pub(crate) struct LineOfSight<'a> {
    mesh: &'a WingedEdgeMesh,
    grid: &'a SpatialGrid,
    image_grid: Option<&'a ImageGrid>,
    camera: &'a Camera,
    viewpoint: Point3,
    min_t: f64,
    scratch: RayScratch,
    hits: Vec<(f64, ShapeId)>,
}

impl<'a> LineOfSight<'a> {
    pub(crate) fn new(
        mesh: &'a WingedEdgeMesh,
        grid: &'a SpatialGrid,
        image_grid: Option<&'a ImageGrid>,
        camera: &'a Camera,
        epsilon: f64,
    ) -> Self {
        Self {
            mesh,
            grid,
            image_grid,
            camera,
            viewpoint: camera.viewpoint(),
            min_t: epsilon.max(1e-9),
            scratch: RayScratch::new(),
            hits: Vec::new(),
        }
    }

    pub(crate) fn mesh(&self) -> &'a WingedEdgeMesh {
        self.mesh
    }

    /// Ray from `p` toward the viewer and the distance to the eye
    /// (infinite for orthographic cameras).
    fn ray_to_viewer(&self, p: &Point3) -> Option<(Ray, f64)> {
        if self.camera.is_orthographic() {
            Ray::new(*p, -self.camera.view_direction()).map(|r| (r, f64::INFINITY))
        } else {
            Ray::between(*p, self.viewpoint)
        }
    }

    /// Count the surfaces between `p` and the viewer.
    ///
    /// A degenerate line of sight (the sample sits on the eye) reports
    /// QI 0.
    pub(crate) fn sample(&mut self, p: &Point3, excl: &Exclusion) -> Sample {
        let Some((ray, dist)) = self.ray_to_viewer(p) else {
            return Sample::default();
        };
        let min_t = self.min_t;
        let t_max = dist - min_t;
        let mesh = self.mesh;
        let hits = &mut self.hits;
        hits.clear();
        let mut test = |occ: &Occluder| {
            if excl.excludes(mesh, occ) {
                return;
            }
            let [v0, v1, v2] = &occ.vertices;
            if let Some(t) = geom::ray_triangle(&ray.origin, &ray.direction, v0, v1, v2, BORDER_EPS) {
                if t > min_t && t < t_max && !excl.excludes_hit(occ, t) {
                    hits.push((t, occ.face.shape));
                }
            }
        };

        let occluders = self.grid.occluders();
        match self.image_grid {
            Some(image) => {
                let q = self.camera.project(p);
                image.for_each_candidate(&Point2::new(q.x, q.y), &mut self.scratch, occluders.len(), |i| {
                    test(&occluders[i as usize]);
                    ControlFlow::Continue(())
                });
            }
            None => self.grid.cast_ray(&ray, t_max, &mut self.scratch, |_, occ| {
                test(occ);
                ControlFlow::Continue(())
            }),
        }
        layers(&mut self.hits, min_t)
    }

    /// First surface behind `p`, looking away from the viewer.
    pub(crate) fn occludee(&mut self, p: &Point3, excl: &Exclusion) -> Option<Occludee> {
        let (toward, _) = self.ray_to_viewer(p)?;
        let ray = Ray::new(*p, -toward.direction.into_inner())?;
        let min_t = self.min_t;
        let mesh = self.mesh;
        let mut best: Option<(f64, FaceRef)> = None;
        self.grid.cast_ray(&ray, f64::INFINITY, &mut self.scratch, |_, occ| {
            if excl.excludes(mesh, occ) {
                return ControlFlow::Continue(());
            }
            let [v0, v1, v2] = &occ.vertices;
            if let Some(t) = geom::ray_triangle(&ray.origin, &ray.direction, v0, v1, v2, BORDER_EPS) {
                if t > min_t && !excl.excludes_hit(occ, t) && best.map_or(true, |(b, _)| t < b) {
                    best = Some((t, occ.face));
                }
            }
            ControlFlow::Continue(())
        });
        best.map(|(t, face)| Occludee {
            face,
            point: ray.at(t),
        })
    }

    /// Projected occluders covering the image cell under `p`.
    pub(crate) fn density_at(&self, p: &Point3) -> usize {
        self.image_grid.map_or(0, |image| {
            let q = self.camera.project(p);
            image.density_at(&Point2::new(q.x, q.y))
        })
    }
}

/// Group hits by depth and count distinct shapes per group: triangles
/// meeting along the line of sight form one surface.
fn layers(hits: &mut [(f64, ShapeId)], tolerance: f64) -> Sample {
    hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    let mut qi = 0u32;
    let mut start = 0;
    while start < hits.len() {
        let mut end = start + 1;
        while end < hits.len() && hits[end].0 - hits[end - 1].0 <= tolerance {
            end += 1;
        }
        let mut shapes: Vec<ShapeId> = hits[start..end].iter().map(|h| h.1).collect();
        shapes.sort_unstable();
        shapes.dedup();
        qi += shapes.len() as u32;
        start = end;
    }
    let mut occluders: Vec<ShapeId> = hits.iter().map(|h| h.1).collect();
    occluders.sort_unstable();
    occluders.dedup();
    Sample { qi, occluders }
}
