//! View-map construction.
//!
//! [`ViewMapBuilder::build_view_map`] runs, in order:
//!
//! 1. chaining of the flagged mesh features into feature edges and view
//!    edges, one shape at a time;
//! 2. cusp detection on smooth silhouettes;
//! 3. image-space crossings, which become T-vertices;
//! 4. splitting of view edges at every view vertex found so far;
//! 5. visibility;
//! 6. splitting wherever the QI changes along a view edge;
//! 7. per-view-edge summaries and the angular order around vertices.
//!
//! The cancel token is polled between stages.

mod chaining;
mod cusps;
mod intersections;
pub(crate) mod split;

use log::{debug, info};
use vmap_grid::SpatialGrid;
use vmap_math::{Aabb3, Camera, CancelToken};
use vmap_winged::{ShapeId, WingedEdgeMesh};

use crate::config::ViewMapConfig;
use crate::silhouette::FEdgeId;
use crate::view_map::ViewMap;
use crate::visibility::{self, VisibilityAlgorithm, VisibilityOutcome, VisibilityParams};
use crate::ViewEdgeId;

/// Builds a [`ViewMap`] from a flagged winged-edge mesh for one camera.
#[derive(Debug, Clone)]
pub struct ViewMapBuilder {
    camera: Camera,
    algorithm: VisibilityAlgorithm,
    epsilon: f64,
    cull_margin: f64,
    adaptive_threshold: usize,
}

impl ViewMapBuilder {
    /// Builder with the default visibility settings.
    pub fn new(camera: Camera) -> Self {
        Self::from_config(camera, &ViewMapConfig::default())
    }

    /// Builder taking its visibility settings from `config`.
    pub fn from_config(camera: Camera, config: &ViewMapConfig) -> Self {
        Self {
            camera,
            algorithm: config.visibility,
            epsilon: 0.0,
            cull_margin: config.cull_margin,
            adaptive_threshold: config.adaptive_threshold,
        }
    }

    /// The camera views are built for.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Select the visibility algorithm.
    pub fn set_visibility_algorithm(&mut self, algorithm: VisibilityAlgorithm) {
        self.algorithm = algorithm;
    }

    /// The selected visibility algorithm.
    pub fn visibility_algorithm(&self) -> VisibilityAlgorithm {
        self.algorithm
    }

    /// Scene tolerance, usually [`vmap_math::scene_epsilon`] of the
    /// mesh's smallest edge. Feature elements no longer than this are
    /// dropped, and occluder hits closer than this to the sample are
    /// ignored.
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon.max(0.0);
    }

    /// Viewport margin of the culled algorithms, as a fraction of the
    /// larger viewport side.
    pub fn set_cull_margin(&mut self, margin: f64) {
        self.cull_margin = margin.max(0.0);
    }

    /// Image-cell occluder count above which adaptive algorithms take
    /// three samples per feature edge.
    pub fn set_adaptive_threshold(&mut self, threshold: usize) {
        self.adaptive_threshold = threshold.max(1);
    }

    /// Build the view map of `mesh`, whose features must already be
    /// flagged for this builder's camera.
    ///
    /// `grid` holds the mesh triangles; `num_faces` sizes the arrays.
    /// Returns `None` if `token` is cancelled; a mesh without features
    /// gives an empty map.
    pub fn build_view_map(
        &self,
        mesh: &WingedEdgeMesh,
        grid: &SpatialGrid,
        scene_bbox: Aabb3,
        num_faces: usize,
        token: &CancelToken,
    ) -> Option<ViewMap> {
        let camera = &self.camera;
        let mut vm = ViewMap::new();
        vm.scene_bbox = scene_bbox;
        vm.camera = camera.snapshot();
        vm.model_names = mesh.shapes.iter().map(|s| s.name.clone()).collect();
        if num_faces == 0 || mesh.is_empty() {
            debug!("empty scene: nothing to build");
            return Some(vm);
        }
        vm.fedges.reserve(num_faces / 4);
        vm.svertices.reserve(num_faces / 4);

        for shape in &mesh.shapes {
            if token.is_cancelled() {
                return None;
            }
            chaining::chain_shape(&mut vm, shape, camera, self.epsilon);
        }
        debug!(
            "chaining: {} feature edges in {} view edges",
            vm.fedges.len(),
            vm.view_edges.len()
        );

        let cusps = cusps::insert_cusps(&mut vm, camera);
        if token.is_cancelled() {
            return None;
        }
        let crossings = intersections::insert_t_vertices(&mut vm, camera, self.epsilon.max(1e-9));
        debug!("{cusps} cusps, {crossings} T-vertices");
        if token.is_cancelled() {
            return None;
        }

        let initial = vm.view_edges.len();
        let mut pieces = 0;
        for i in 0..initial {
            pieces += split::split_view_edge(&mut vm, ViewEdgeId(i as u32));
        }
        let loops = split::split_self_loops(&mut vm, camera);
        debug!("split {initial} view edges into {} pieces, {loops} loops opened", initial + pieces);
        if token.is_cancelled() {
            return None;
        }

        let params = VisibilityParams {
            algorithm: self.algorithm,
            epsilon: self.epsilon,
            cull_margin: self.cull_margin,
            adaptive_threshold: self.adaptive_threshold,
        };
        let outcome = visibility::compute_visibility(&mut vm, mesh, grid, camera, &params, token)?;
        let qi_splits = split::split_at_qi_changes(&mut vm);
        debug!("{qi_splits} view edges added at QI changes");

        summarize_view_edges(&mut vm, &outcome);
        split::sort_vertex_edges(&mut vm);

        let stats = vm.stats();
        info!(
            "view map ({}): {} view edges ({} visible), {} T-vertices, {} cusps",
            self.algorithm, stats.view_edges, stats.visible_view_edges, stats.t_vertices, stats.cusps
        );
        Some(vm)
    }
}

/// QI, occluders and occludee of every view edge, from its feature edges.
fn summarize_view_edges(vm: &mut ViewMap, outcome: &VisibilityOutcome) {
    for i in 0..vm.view_edges.len() {
        let chain: Vec<FEdgeId> = vm.chain(ViewEdgeId(i as u32)).collect();
        let mut occluders: Vec<ShapeId> = chain
            .iter()
            .filter_map(|f| outcome.occluders.get(f.index()))
            .flatten()
            .copied()
            .collect();
        occluders.sort_unstable();
        occluders.dedup();
        let occludee = chain
            .iter()
            .find_map(|f| vm.fedges[f.index()].occludee)
            .map(|o| o.face.shape);
        let qi = vm.fedges[vm.view_edges[i].fedge_a.index()].qi;

        let ve = &mut vm.view_edges[i];
        ve.qi = qi;
        ve.occluders = occluders;
        ve.occludee = occludee;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::fixtures;
    use crate::view_map::ViewVertex;
    use crate::visibility::{Exclusion, LineOfSight};
    use vmap_winged::{primitives, Nature};

    #[test]
    fn test_cube_outline() {
        let camera = fixtures::cube_camera();
        let vm = fixtures::build(&[primitives::cube(1.0)], &camera, Default::default());
        fixtures::check_invariants(&vm);
        assert_eq!(vm.shapes().len(), 1);

        let visible: Vec<_> = vm.view_edges().iter().filter(|ve| ve.is_visible()).collect();
        assert_eq!(visible.len(), 4, "top square outline");
        let mut corners = BTreeSet::new();
        for ve in &visible {
            assert_eq!(ve.nature, Nature::SILHOUETTE | Nature::CREASE);
            assert!(ve.occluders.is_empty());
            corners.insert(ve.a);
            corners.insert(ve.b);
        }
        assert_eq!(corners.len(), 4);
        for v in corners {
            assert!(vm.view_vertex(v).as_non_t_vertex().is_some());
        }

        let stats = vm.stats();
        assert_eq!(stats.t_vertices, 0);
        assert_eq!(stats.non_t_vertices, 8);
        let hidden: Vec<_> = vm.view_edges().iter().filter(|ve| !ve.is_visible()).collect();
        assert_eq!(hidden.len(), 8);
        for ve in hidden {
            assert_eq!(ve.nature, Nature::CREASE);
            assert_eq!(ve.qi, 1, "hidden behind the top face");
            assert_eq!(ve.occluders, vec![ShapeId(0)]);
        }
    }

    #[test]
    fn test_stacked_planes_qi_equals_count() {
        let camera = fixtures::camera_at([0.0, 0.0, 20.0], [0.0, 0.0, 0.0]);
        for algorithm in VisibilityAlgorithm::ALL {
            for n in 0..=8u32 {
                let vm = fixtures::build(&fixtures::stacked_quads(n as usize), &camera, algorithm);
                let target: Vec<_> = vm
                    .view_edges()
                    .iter()
                    .filter(|ve| ve.shape == ShapeId(0))
                    .collect();
                assert!(!target.is_empty());
                for ve in target {
                    assert_eq!(ve.qi, n, "{algorithm} with {n} planes");
                    assert_eq!(ve.occluders.len(), n as usize);
                }
            }
        }
    }

    #[test]
    fn test_view_edges_are_homogeneous() {
        let camera = fixtures::two_cubes_camera();
        for algorithm in [
            VisibilityAlgorithm::RayCasting,
            VisibilityAlgorithm::RayCastingAdaptiveTraditional,
        ] {
            let vm = fixtures::build(&fixtures::two_cubes(), &camera, algorithm);
            fixtures::check_invariants(&vm);
            for ve in vm.view_edges() {
                for f in vm.chain(ve.id) {
                    let fe = vm.fedge(f);
                    assert_eq!(fe.nature, ve.nature);
                    assert_eq!(fe.qi, ve.qi, "{algorithm}: QI constant along view edge {:?}", ve.id);
                }
            }
            assert!(vm.stats().t_vertices > 0, "the upper box crosses the cube's outline");
            assert!(vm.view_edges().iter().any(|ve| ve.qi > 0));
            assert!(vm.view_edges().iter().any(|ve| ve.qi == 0));
        }
    }

    #[test]
    fn test_view_edge_qi_matches_independent_samples() {
        let camera = fixtures::two_cubes_camera();
        let config = ViewMapConfig {
            visibility: VisibilityAlgorithm::RayCasting,
            ..ViewMapConfig::default()
        };
        let (mesh, grid) = fixtures::scene(&fixtures::two_cubes(), &camera, &config);
        let vm = fixtures::build_scene(&mesh, &grid, &camera, &config);
        let epsilon = vmap_math::scene_epsilon(mesh.min_edge_size());
        let mut los = LineOfSight::new(&mesh, &grid, None, &camera, epsilon);
        for ve in vm.view_edges() {
            for f in vm.chain(ve.id) {
                let fe = vm.fedge(f);
                let a = vm.svertex(fe.a).point_3d;
                let b = vm.svertex(fe.b).point_3d;
                let s = los.sample(&(a + (b - a) * 0.5), &Exclusion::for_fedge(fe, &mesh));
                assert_eq!(s.qi, ve.qi);
            }
        }
    }

    #[test]
    fn test_sampled_algorithms_keep_qi_constant_per_view_edge() {
        let camera = fixtures::camera_at([0.0, 0.0, 20.0], [0.0, 0.0, 0.0]);
        for algorithm in [
            VisibilityAlgorithm::RayCastingFast,
            VisibilityAlgorithm::RayCastingVeryFast,
            VisibilityAlgorithm::RayCastingAdaptiveCumulative,
            VisibilityAlgorithm::RayCastingCulledAdaptiveCumulative,
        ] {
            for n in [1, 3, 5] {
                let vm = fixtures::build(&fixtures::stacked_quads(n), &camera, algorithm);
                fixtures::check_invariants(&vm);
                for ve in vm.view_edges() {
                    for f in vm.chain(ve.id) {
                        assert_eq!(
                            vm.fedge(f).qi,
                            ve.qi,
                            "{algorithm} with {n} planes: view edge {:?}",
                            ve.id
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_t_vertices_have_four_edges() {
        let camera = fixtures::two_cubes_camera();
        let vm = fixtures::build(&fixtures::two_cubes(), &camera, Default::default());
        let mut between_shapes = 0;
        for v in vm.view_vertices() {
            let ViewVertex::T(t) = v else {
                continue;
            };
            assert_eq!(v.degree(), 4);
            let front = vm.svertex(t.front).shape;
            let back = vm.svertex(t.back).shape;
            if front != back {
                assert_eq!(front, ShapeId(1), "upper box passes in front");
                assert_eq!(back, ShapeId(0));
                between_shapes += 1;
            }
        }
        assert!(between_shapes > 0);
    }

    #[test]
    fn test_empty_scene_gives_empty_map() {
        let camera = fixtures::cube_camera();
        let vm = fixtures::build(&[], &camera, Default::default());
        assert!(vm.is_empty());
        assert_eq!(vm.stats(), Default::default());
        assert_eq!(vm.camera(), camera.snapshot());
    }

    #[test]
    fn test_builds_are_deterministic() {
        let camera = fixtures::two_cubes_camera();
        for algorithm in VisibilityAlgorithm::ALL {
            let a = fixtures::build(&fixtures::two_cubes(), &camera, algorithm);
            let b = fixtures::build(&fixtures::two_cubes(), &camera, algorithm);
            assert_eq!(a, b, "{algorithm}");
        }
    }

    #[test]
    fn test_cancelled_build_returns_none() {
        let camera = fixtures::cube_camera();
        let (mesh, grid) = fixtures::scene(&[primitives::cube(1.0)], &camera, &ViewMapConfig::default());
        let token = CancelToken::new();
        token.cancel();
        let builder = ViewMapBuilder::new(camera);
        assert!(builder
            .build_view_map(&mesh, &grid, mesh.bbox(), mesh.num_faces(), &token)
            .is_none());
    }

    #[test]
    fn test_setters_clamp() {
        let mut builder = ViewMapBuilder::new(fixtures::cube_camera());
        builder.set_epsilon(-1.0);
        builder.set_cull_margin(-0.5);
        builder.set_adaptive_threshold(0);
        builder.set_visibility_algorithm(VisibilityAlgorithm::RayCastingFast);
        assert_eq!(builder.epsilon, 0.0);
        assert_eq!(builder.cull_margin, 0.0);
        assert_eq!(builder.adaptive_threshold, 1);
        assert_eq!(builder.visibility_algorithm(), VisibilityAlgorithm::RayCastingFast);
    }
}
