//! Classification of mesh edges and faces into feature lines.

use log::{debug, trace};
use vmap_math::{geom, Camera, CancelToken, Point3, Vec3};
use vmap_winged::{
    EdgeId, EdgePoint, FaceId, FaceLayer, Nature, SmoothSegment, VertexId, WingedEdgeMesh, WxShape,
};

use crate::{curvature, FeatureConfig};

/// Counts of what one detection pass found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStats {
    /// Shapes processed.
    pub shapes: usize,
    /// Faces facing the viewer.
    pub front_faces: usize,
    /// Edges flagged `SILHOUETTE`.
    pub silhouettes: usize,
    /// Edges flagged `BORDER`.
    pub borders: usize,
    /// Edges flagged `CREASE`.
    pub creases: usize,
    /// Edges flagged `MATERIAL_BOUNDARY`.
    pub material_boundaries: usize,
    /// In-face smooth silhouette segments.
    pub smooth_silhouettes: usize,
    /// In-face ridge segments.
    pub ridges: usize,
    /// In-face valley segments.
    pub valleys: usize,
    /// In-face suggestive contour segments.
    pub suggestive_contours: usize,
    /// Vertices with a curvature estimate.
    pub curvature_vertices: usize,
}

impl DetectionStats {
    fn add(&mut self, other: &DetectionStats) {
        self.shapes += other.shapes;
        self.front_faces += other.front_faces;
        self.silhouettes += other.silhouettes;
        self.borders += other.borders;
        self.creases += other.creases;
        self.material_boundaries += other.material_boundaries;
        self.smooth_silhouettes += other.smooth_silhouettes;
        self.ridges += other.ridges;
        self.valleys += other.valleys;
        self.suggestive_contours += other.suggestive_contours;
        self.curvature_vertices += other.curvature_vertices;
    }
}

/// Zero crossing of a scalar field on a mesh edge.
#[derive(Debug, Clone, Copy)]
struct Crossing {
    t: f64,
    /// Endpoint on the non-negative side.
    positive: VertexId,
}

/// Flags feature edges and smooth feature lines for one viewpoint.
///
/// The detector writes its results into the mesh: [`Nature`] bits on
/// edges, the facing flag and smooth [`FaceLayer`]s on faces, and
/// curvature on vertices. Each run starts by clearing earlier results.
#[derive(Debug, Clone)]
pub struct FeatureEdgeDetector {
    config: FeatureConfig,
    viewpoint: Point3,
    view_direction: Option<Vec3>,
}

impl Default for FeatureEdgeDetector {
    fn default() -> Self {
        Self::new(FeatureConfig::default())
    }
}

impl FeatureEdgeDetector {
    /// Detector with the given settings, viewing from the origin.
    pub fn new(config: FeatureConfig) -> Self {
        Self {
            config: config.sanitized(),
            viewpoint: Point3::origin(),
            view_direction: None,
        }
    }

    /// Current settings.
    pub fn config(&self) -> &FeatureConfig {
        &self.config
    }

    /// Perspective viewpoint.
    pub fn set_viewpoint(&mut self, p: Point3) {
        self.viewpoint = p;
        self.view_direction = None;
    }

    /// Orthographic viewing along `direction` (away from the viewer).
    pub fn set_view_direction(&mut self, direction: Vec3) {
        self.view_direction = vmap_math::try_normalize(&direction);
    }

    /// Take the viewpoint (or view direction) from a camera.
    pub fn set_camera(&mut self, camera: &Camera) {
        if camera.is_orthographic() {
            self.set_view_direction(camera.view_direction());
        } else {
            self.set_viewpoint(camera.viewpoint());
        }
    }

    /// Toggle ridge and valley detection.
    pub fn enable_ridges_and_valleys(&mut self, enable: bool) {
        self.config.ridges_and_valleys = enable;
    }

    /// Toggle suggestive contour detection.
    pub fn enable_suggestive_contours(&mut self, enable: bool) {
        self.config.suggestive_contours = enable;
    }

    /// Toggle material boundary detection.
    pub fn enable_material_boundaries(&mut self, enable: bool) {
        self.config.material_boundaries = enable;
    }

    /// Toggle in-face silhouettes on smooth shapes.
    pub fn enable_face_smoothness(&mut self, enable: bool) {
        self.config.face_smoothness = enable;
    }

    /// Curvature neighbourhood radius.
    pub fn set_sphere_radius(&mut self, r: f64) {
        self.config.sphere_radius = r;
        self.config = self.config.sanitized();
    }

    /// Crease threshold in degrees.
    pub fn set_crease_angle(&mut self, theta: f64) {
        self.config.crease_angle = theta;
        self.config = self.config.sanitized();
    }

    /// Suggestive contour derivative threshold.
    pub fn set_kr_derivative_epsilon(&mut self, eps: f64) {
        self.config.kr_derivative_epsilon = eps;
        self.config = self.config.sanitized();
    }

    /// Unit vector from `p` toward the viewer, zero if `p` is the eye.
    fn to_viewer(&self, p: &Point3) -> Vec3 {
        match self.view_direction {
            Some(d) => -d,
            None => vmap_math::try_normalize(&(self.viewpoint - p)).unwrap_or_else(Vec3::zeros),
        }
    }

    /// Flag every shape of `mesh`.
    ///
    /// Returns `None` if `token` is cancelled between passes; the mesh is
    /// then partially flagged and should be re-processed before use.
    pub fn process_shapes(
        &self,
        mesh: &mut WingedEdgeMesh,
        token: &CancelToken,
    ) -> Option<DetectionStats> {
        let mut stats = DetectionStats::default();
        for shape in &mut mesh.shapes {
            if token.is_cancelled() {
                return None;
            }
            let s = self.process_shape(shape, token)?;
            trace!("shape '{}': {s:?}", shape.name);
            stats.add(&s);
        }
        debug!(
            "feature detection: {} silhouettes, {} borders, {} creases, {} smooth segments",
            stats.silhouettes,
            stats.borders,
            stats.creases,
            stats.smooth_silhouettes + stats.ridges + stats.valleys + stats.suggestive_contours
        );
        Some(stats)
    }

    fn process_shape(&self, shape: &mut WxShape, token: &CancelToken) -> Option<DetectionStats> {
        let mut stats = DetectionStats {
            shapes: 1,
            ..DetectionStats::default()
        };
        shape.reset_features();

        for face in &mut shape.faces {
            let v = self.to_viewer(&face.centroid);
            face.front = face.normal.dot(&v) > 0.0;
            stats.front_faces += usize::from(face.front);
        }
        if token.is_cancelled() {
            return None;
        }

        self.flag_edges(shape, &mut stats);
        if token.is_cancelled() {
            return None;
        }

        let skipped = self.skipped_smooth_lines(shape);
        if !skipped.is_empty() {
            debug!("shape '{}' has no smooth faces, skipping {skipped:?}", shape.name);
        }

        if self.config.face_smoothness {
            let values: Vec<f64> = shape
                .vertices
                .iter()
                .map(|v| v.normal.dot(&self.to_viewer(&v.position)))
                .collect();
            let crossings = vertex_field_crossings(shape, &values);
            stats.smooth_silhouettes =
                add_layers(shape, Nature::SILHOUETTE, &crossings, |_, _| true);
        }

        if self.config.needs_curvature() {
            stats.curvature_vertices =
                curvature::compute_curvatures(shape, self.config.sphere_radius);
            if token.is_cancelled() {
                return None;
            }
            if self.config.suggestive_contours {
                stats.suggestive_contours = self.add_suggestive_contours(shape);
            }
            if self.config.ridges_and_valleys {
                let (ridges, valleys) = add_ridges_and_valleys(shape);
                stats.ridges = ridges;
                stats.valleys = valleys;
            }
        }
        Some(stats)
    }

    /// Enabled in-face line kinds that `shape` cannot carry: they are only
    /// traced across smooth faces.
    fn skipped_smooth_lines(&self, shape: &WxShape) -> Nature {
        if shape.faces.iter().any(|f| f.smooth) {
            return Nature::empty();
        }
        let mut natures = Nature::empty();
        if self.config.face_smoothness {
            natures |= Nature::SILHOUETTE;
        }
        if self.config.ridges_and_valleys {
            natures |= Nature::RIDGE | Nature::VALLEY;
        }
        if self.config.suggestive_contours {
            natures |= Nature::SUGGESTIVE_CONTOUR;
        }
        natures
    }

    fn flag_edges(&self, shape: &mut WxShape, stats: &mut DetectionStats) {
        let crease_cos = self.config.crease_cosine();
        for e in 0..shape.edges.len() {
            let id = EdgeId(e as u32);
            let (f0, f1) = shape.edge_faces(id);
            let mut nature = Nature::empty();
            match f1 {
                None => nature |= Nature::BORDER,
                Some(f1) => {
                    let a = shape.face(f0);
                    let b = shape.face(f1);
                    let both_smooth = self.config.face_smoothness && a.smooth && b.smooth;
                    if a.front != b.front && !both_smooth {
                        nature |= Nature::SILHOUETTE;
                    }
                    if !a.is_degenerate()
                        && !b.is_degenerate()
                        && a.normal.dot(&b.normal) <= crease_cos
                    {
                        nature |= Nature::CREASE;
                    }
                    if self.config.material_boundaries && a.material != b.material {
                        nature |= Nature::MATERIAL_BOUNDARY;
                    }
                }
            }
            stats.silhouettes += usize::from(nature.contains(Nature::SILHOUETTE));
            stats.borders += usize::from(nature.contains(Nature::BORDER));
            stats.creases += usize::from(nature.contains(Nature::CREASE));
            stats.material_boundaries += usize::from(nature.contains(Nature::MATERIAL_BOUNDARY));
            shape.edges[e].nature = nature;
        }
    }

    fn add_suggestive_contours(&self, shape: &mut WxShape) -> usize {
        let kr: Vec<f64> = shape
            .vertices
            .iter()
            .map(|v| {
                let Some(info) = v.curvature else {
                    return f64::NAN;
                };
                let to_viewer = self.to_viewer(&v.position);
                let w = to_viewer - v.normal * to_viewer.dot(&v.normal);
                match vmap_math::try_normalize(&w) {
                    Some(w) => {
                        let c = w.dot(&info.e1);
                        let s = w.dot(&info.e2);
                        info.k1 * c * c + info.k2 * s * s
                    }
                    None => 0.0,
                }
            })
            .collect();
        let crossings = vertex_field_crossings(shape, &kr);
        let eps = self.config.kr_derivative_epsilon;

        let keep: Vec<bool> = (0..shape.faces.len())
            .map(|f| {
                let face = &shape.faces[f];
                if !face.front {
                    return false;
                }
                let vals = face.vertices.map(|v| kr[v.index()]);
                if vals.iter().any(|k| k.is_nan()) {
                    return false;
                }
                let [p0, p1, p2] = shape.face_positions(FaceId(f as u32));
                let Some(grad) = geom::face_gradient([&p0, &p1, &p2], vals) else {
                    return false;
                };
                let to_viewer = self.to_viewer(&face.centroid);
                let w = to_viewer - face.normal * to_viewer.dot(&face.normal);
                match vmap_math::try_normalize(&w) {
                    Some(w) => grad.dot(&w) > eps,
                    None => false,
                }
            })
            .collect();
        add_layers(shape, Nature::SUGGESTIVE_CONTOUR, &crossings, |_, f| {
            keep[f.index()]
        })
    }
}

/// Crossings of a per-vertex scalar field; NaN values never cross.
fn vertex_field_crossings(shape: &WxShape, values: &[f64]) -> Vec<Option<Crossing>> {
    shape
        .edges
        .iter()
        .map(|e| {
            let fa = values[e.a.index()];
            let fb = values[e.b.index()];
            if fa.is_nan() || fb.is_nan() {
                return None;
            }
            geom::zero_crossing(fa, fb).map(|t| Crossing {
                t,
                positive: if fa >= 0.0 { e.a } else { e.b },
            })
        })
        .collect()
}

/// Ridge and valley crossings: zeros of the extremality of the dominant
/// curvature, with principal directions aligned per edge.
fn add_ridges_and_valleys(shape: &mut WxShape) -> (usize, usize) {
    let n = shape.vertices.len();
    let mut k_dom = vec![f64::NAN; n];
    let mut e_dom = vec![Vec3::zeros(); n];
    for (i, v) in shape.vertices.iter().enumerate() {
        if let Some(info) = v.curvature {
            let (k, e) = info.dominant();
            k_dom[i] = k;
            e_dom[i] = e;
        }
    }

    // Vertex gradient of k_dom: area-weighted mean of face gradients.
    let mut grad = vec![Vec3::zeros(); n];
    let mut weight = vec![0.0; n];
    for (f, face) in shape.faces.iter().enumerate() {
        let vals = face.vertices.map(|v| k_dom[v.index()]);
        if vals.iter().any(|k| k.is_nan()) {
            continue;
        }
        let [p0, p1, p2] = shape.face_positions(FaceId(f as u32));
        if let Some(g) = geom::face_gradient([&p0, &p1, &p2], vals) {
            for v in face.vertices {
                grad[v.index()] += g * face.area;
                weight[v.index()] += face.area;
            }
        }
    }

    let mut ridges = Vec::with_capacity(shape.edges.len());
    let mut valleys = Vec::with_capacity(shape.edges.len());
    for e in &shape.edges {
        let (a, b) = (e.a.index(), e.b.index());
        if k_dom[a].is_nan() || k_dom[b].is_nan() || weight[a] == 0.0 || weight[b] == 0.0 {
            ridges.push(None);
            valleys.push(None);
            continue;
        }
        let ea = e_dom[a];
        let eb = if ea.dot(&e_dom[b]) < 0.0 { -e_dom[b] } else { e_dom[b] };
        let xa = grad[a].dot(&ea) / weight[a];
        let xb = grad[b].dot(&eb) / weight[b];
        let crossing = geom::zero_crossing(xa, xb).map(|t| Crossing {
            t,
            positive: if xa >= 0.0 { e.a } else { e.b },
        });
        let k = k_dom[a] + (k_dom[b] - k_dom[a]) * crossing.map_or(0.0, |c| c.t);
        ridges.push(crossing.filter(|_| k > 0.0));
        valleys.push(crossing.filter(|_| k < 0.0));
    }

    let r = add_layers(shape, Nature::RIDGE, &ridges, |_, _| true);
    let v = add_layers(shape, Nature::VALLEY, &valleys, |_, _| true);
    (r, v)
}

/// Add a layer to every smooth face crossed on exactly two of its edges.
///
/// Segments are oriented so the non-negative side of the field lies to
/// the left when looking down the face normal.
fn add_layers<F>(
    shape: &mut WxShape,
    nature: Nature,
    crossings: &[Option<Crossing>],
    keep: F,
) -> usize
where
    F: Fn(&WxShape, FaceId) -> bool,
{
    let mut added = Vec::new();
    for f in 0..shape.faces.len() {
        let face_id = FaceId(f as u32);
        let face = &shape.faces[f];
        if !face.smooth || face.is_degenerate() || !keep(shape, face_id) {
            continue;
        }
        let hits: Vec<(EdgeId, Crossing)> = shape
            .face_edges(face_id)
            .into_iter()
            .filter_map(|e| crossings[e.index()].map(|c| (e, c)))
            .collect();
        let [(ea, ca), (eb, cb)] = hits.as_slice() else {
            continue;
        };

        let mut a = EdgePoint { edge: *ea, t: ca.t };
        let mut b = EdgePoint { edge: *eb, t: cb.t };
        let pa = shape.edge_point(&a);
        let pb = shape.edge_point(&b);
        if (pb - pa).norm_squared() == 0.0 {
            continue;
        }
        let positive = shape.vertex(ca.positive).position;
        let left = face.normal.cross(&(pb - pa));
        if left.dot(&(positive - pa)) < 0.0 {
            std::mem::swap(&mut a, &mut b);
        }

        let interp = |p: &EdgePoint| {
            let e = shape.edge(p.edge);
            shape.vertex(e.a).normal * (1.0 - p.t) + shape.vertex(e.b).normal * p.t
        };
        let normal =
            vmap_math::try_normalize(&(interp(&a) + interp(&b))).unwrap_or(face.normal);
        added.push((
            f,
            FaceLayer {
                nature,
                segment: SmoothSegment { a, b },
                normal,
            },
        ));
    }
    let count = added.len();
    for (f, layer) in added {
        shape.faces[f].layers.push(layer);
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmap_winged::primitives;

    fn detect(meshes: &[vmap_winged::TriangleMesh], detector: &FeatureEdgeDetector) -> (WingedEdgeMesh, DetectionStats) {
        let mut mesh = WingedEdgeMesh::from_triangle_meshes(meshes).unwrap();
        let stats = detector.process_shapes(&mut mesh, &CancelToken::new()).unwrap();
        (mesh, stats)
    }

    #[test]
    fn test_cube_from_front() {
        let mut det = FeatureEdgeDetector::default();
        det.set_viewpoint(Point3::new(0.5, 0.5, 5.0));
        let (mesh, stats) = detect(&[primitives::cube(1.0)], &det);
        assert_eq!(stats.creases, 12);
        assert_eq!(stats.borders, 0);
        // Only the +Z face is visible, so its four edges are silhouettes.
        assert_eq!(stats.silhouettes, 4);
        assert_eq!(stats.front_faces, 2);
        let shape = &mesh.shapes[0];
        for e in &shape.edges {
            if e.nature.contains(Nature::SILHOUETTE) {
                assert!(e.nature.contains(Nature::CREASE));
                let za = shape.vertex(e.a).position.z;
                let zb = shape.vertex(e.b).position.z;
                assert_eq!((za, zb), (1.0, 1.0));
            }
        }
    }

    #[test]
    fn test_crease_angle_threshold() {
        let mut det = FeatureEdgeDetector::default();
        det.set_viewpoint(Point3::new(0.5, 0.5, 5.0));
        det.set_crease_angle(60.0);
        let (_, stats) = detect(&[primitives::cube(1.0)], &det);
        assert_eq!(stats.creases, 0, "90° edges are not creases below a 90° threshold");
    }

    #[test]
    fn test_quad_borders() {
        let mut det = FeatureEdgeDetector::default();
        det.set_viewpoint(Point3::new(0.0, 0.0, 5.0));
        let (_, stats) = detect(&[primitives::quad(0.0, 1.0)], &det);
        assert_eq!(stats.borders, 4);
        assert_eq!(stats.silhouettes, 0);
    }

    #[test]
    fn test_material_boundaries() {
        let mut a = primitives::rect([0.0, 0.0], [1.0, 1.0], 0.0);
        a.materials = vec![0, 1];
        let mut det = FeatureEdgeDetector::default();
        det.set_viewpoint(Point3::new(0.5, 0.5, 5.0));
        let (_, stats) = detect(std::slice::from_ref(&a), &det);
        assert_eq!(stats.material_boundaries, 0, "disabled by default");
        det.enable_material_boundaries(true);
        let (_, stats) = detect(&[a], &det);
        assert_eq!(stats.material_boundaries, 1);
    }

    #[test]
    fn test_smooth_sphere_silhouette_layers() {
        let mut det = FeatureEdgeDetector::default();
        det.set_viewpoint(Point3::new(0.0, 0.0, 10.0));
        det.enable_face_smoothness(true);
        let (mesh, stats) = detect(&[primitives::uv_sphere([0.0; 3], 1.0, 24, 12)], &det);
        assert_eq!(stats.silhouettes, 0, "no sharp silhouettes between smooth faces");
        assert!(stats.smooth_silhouettes >= 24);
        let shape = &mesh.shapes[0];
        for face in &shape.faces {
            for layer in &face.layers {
                let p = shape.edge_point(&layer.segment.a);
                // The contour of a unit sphere seen from z = 10 lies at z = 0.1.
                assert!((p.z - 0.1).abs() < 0.15, "contour point off the rim: {p:?}");
            }
        }
    }

    #[test]
    fn test_sharp_sphere_silhouettes_without_smoothness() {
        let mut det = FeatureEdgeDetector::default();
        det.set_viewpoint(Point3::new(0.0, 0.0, 10.0));
        let (_, stats) = detect(&[primitives::uv_sphere([0.0; 3], 1.0, 24, 12)], &det);
        assert!(stats.silhouettes >= 24);
        assert_eq!(stats.smooth_silhouettes, 0);
    }

    #[test]
    fn test_flat_shapes_skip_smooth_lines() {
        let mut det = FeatureEdgeDetector::default();
        det.set_viewpoint(Point3::new(0.5, 0.5, 5.0));
        det.enable_face_smoothness(true);
        det.enable_ridges_and_valleys(true);
        det.enable_suggestive_contours(true);

        let cube = WingedEdgeMesh::from_triangle_meshes(&[primitives::cube(1.0)]).unwrap();
        assert_eq!(
            det.skipped_smooth_lines(&cube.shapes[0]),
            Nature::SILHOUETTE | Nature::RIDGE | Nature::VALLEY | Nature::SUGGESTIVE_CONTOUR
        );
        let (mesh, stats) = detect(&[primitives::cube(1.0)], &det);
        assert_eq!(stats.smooth_silhouettes + stats.ridges + stats.valleys, 0);
        assert_eq!(stats.suggestive_contours, 0);
        assert!(mesh.shapes[0].faces.iter().all(|f| f.layers.is_empty()));
        assert_eq!(stats.silhouettes, 4, "sharp silhouettes are still flagged");

        let sphere =
            WingedEdgeMesh::from_triangle_meshes(&[primitives::uv_sphere([0.0; 3], 1.0, 12, 6)]).unwrap();
        assert!(det.skipped_smooth_lines(&sphere.shapes[0]).is_empty());
        assert!(FeatureEdgeDetector::default()
            .skipped_smooth_lines(&cube.shapes[0])
            .is_empty());
    }

    #[test]
    fn test_ridge_on_parabolic_cylinder() {
        let mut det = FeatureEdgeDetector::default();
        det.set_viewpoint(Point3::new(0.5, 0.5, 5.0));
        det.enable_ridges_and_valleys(true);
        det.set_sphere_radius(0.08);
        let (mesh, stats) = detect(
            &[primitives::heightfield(21, 1.0, |_, y| -2.0 * (y - 0.5) * (y - 0.5))],
            &det,
        );
        assert!(stats.curvature_vertices > 0);
        let shape = &mesh.shapes[0];
        let central_ridge = shape.faces.iter().flat_map(|f| &f.layers).any(|l| {
            let p = shape.edge_point(&l.segment.a);
            l.nature == Nature::RIDGE && (p.y - 0.5).abs() < 0.1 && (0.2..0.8).contains(&p.x)
        });
        assert!(central_ridge, "expected a ridge along y = 0.5");
    }

    #[test]
    fn test_suggestive_contours_on_front_faces() {
        let mut det = FeatureEdgeDetector::default();
        det.set_viewpoint(Point3::new(-2.0, 0.5, 3.0));
        det.enable_suggestive_contours(true);
        det.set_sphere_radius(0.06);
        let wave = |x: f64, _: f64| 0.05 * (std::f64::consts::TAU * 2.0 * x).sin();
        let (mesh, stats) = detect(&[primitives::heightfield(40, 1.0, wave)], &det);
        assert!(stats.suggestive_contours > 0);
        let shape = &mesh.shapes[0];
        for face in &shape.faces {
            if face.layers.iter().any(|l| l.nature == Nature::SUGGESTIVE_CONTOUR) {
                assert!(face.front);
            }
        }
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let mut det = FeatureEdgeDetector::default();
        det.set_viewpoint(Point3::new(0.5, 0.5, 5.0));
        let mut mesh = WingedEdgeMesh::from_triangle_meshes(&[primitives::cube(1.0)]).unwrap();
        let first = det.process_shapes(&mut mesh, &CancelToken::new()).unwrap();
        let second = det.process_shapes(&mut mesh, &CancelToken::new()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_cancelled() {
        let det = FeatureEdgeDetector::default();
        let mut mesh = WingedEdgeMesh::from_triangle_meshes(&[primitives::cube(1.0)]).unwrap();
        let token = CancelToken::new();
        token.cancel();
        assert!(det.process_shapes(&mut mesh, &token).is_none());
    }

    #[test]
    fn test_orthographic_facing() {
        let mut det = FeatureEdgeDetector::default();
        det.set_view_direction(Vec3::new(0.0, 0.0, -1.0));
        let (_, stats) = detect(&[primitives::cube(1.0)], &det);
        assert_eq!(stats.front_faces, 2);
        assert_eq!(stats.silhouettes, 4);
    }
}
