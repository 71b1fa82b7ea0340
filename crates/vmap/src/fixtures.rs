//! Scenes, cameras and consistency checks shared by the unit tests.

use std::collections::BTreeSet;
use std::f64::consts::FRAC_PI_3;

use vmap_features::FeatureEdgeDetector;
use vmap_grid::SpatialGrid;
use vmap_math::{scene_epsilon, Camera, CancelToken, Point3, Vec3, Viewport};
use vmap_winged::{primitives, Nature, ShapeId, TriangleMesh, WingedEdgeMesh};

use crate::silhouette::{FEdge, FEdgeGeometry, FEdgeId, SShape, SVertex, SVertexId};
use crate::view_map::{DirectedViewEdge, ViewEdge, ViewMap};
use crate::{VertexNature, ViewEdgeId, ViewMapBuilder, ViewMapConfig, VisibilityAlgorithm};

pub(crate) fn camera_at(eye: [f64; 3], target: [f64; 3]) -> Camera {
    Camera::perspective(
        Point3::from(eye),
        Point3::from(target),
        Vec3::y(),
        FRAC_PI_3,
        0.1,
        100.0,
        Viewport::new(640, 480),
    )
}

/// Looking down -Z at the unit cube's top face.
pub(crate) fn cube_camera() -> Camera {
    camera_at([0.5, 0.5, 5.0], [0.5, 0.5, 0.0])
}

/// Orthographic, looking down -Z from `z = 10`.
pub(crate) fn top_camera() -> Camera {
    Camera::orthographic(
        Point3::new(0.0, 0.0, 10.0),
        Point3::origin(),
        Vec3::y(),
        5.0,
        0.1,
        100.0,
        Viewport::new(640, 480),
    )
}

pub(crate) fn two_cubes_camera() -> Camera {
    camera_at([0.5, 0.5, 6.0], [0.5, 0.5, 0.0])
}

/// A 2×2 target quad at `z = 0` under `n` wide opaque planes at
/// `z = 1..=n`.
pub(crate) fn stacked_quads(n: usize) -> Vec<TriangleMesh> {
    let mut meshes = vec![primitives::quad(0.0, 1.0)];
    meshes.extend((1..=n).map(|z| primitives::rect([-3.0, -3.0], [3.0, 3.0], z as f64)));
    meshes
}

/// The unit cube and a smaller box floating above one of its corners.
pub(crate) fn two_cubes() -> Vec<TriangleMesh> {
    vec![
        primitives::cube(1.0),
        primitives::cuboid([0.6, 0.6, 2.0], [1.4, 1.4, 2.5]),
    ]
}

/// Winged-edge mesh flagged for `camera`, and its grid.
pub(crate) fn scene(
    meshes: &[TriangleMesh],
    camera: &Camera,
    config: &ViewMapConfig,
) -> (WingedEdgeMesh, SpatialGrid) {
    let mut mesh = WingedEdgeMesh::from_triangle_meshes(meshes).unwrap();
    let mut detector = FeatureEdgeDetector::new(config.features.clone());
    detector.set_camera(camera);
    detector.process_shapes(&mut mesh, &CancelToken::new()).unwrap();
    let grid = SpatialGrid::from_mesh(&mesh, config.grid_density);
    (mesh, grid)
}

pub(crate) fn build_scene(
    mesh: &WingedEdgeMesh,
    grid: &SpatialGrid,
    camera: &Camera,
    config: &ViewMapConfig,
) -> ViewMap {
    let mut builder = ViewMapBuilder::from_config(camera.clone(), config);
    builder.set_epsilon(scene_epsilon(mesh.min_edge_size()));
    builder
        .build_view_map(mesh, grid, mesh.bbox(), mesh.num_faces(), &CancelToken::new())
        .unwrap()
}

pub(crate) fn build_with(meshes: &[TriangleMesh], camera: &Camera, config: &ViewMapConfig) -> ViewMap {
    let (mesh, grid) = scene(meshes, camera, config);
    let vm = build_scene(&mesh, &grid, camera, config);
    check_invariants(&vm);
    vm
}

pub(crate) fn build(meshes: &[TriangleMesh], camera: &Camera, algorithm: VisibilityAlgorithm) -> ViewMap {
    let config = ViewMapConfig {
        visibility: algorithm,
        ..ViewMapConfig::default()
    };
    build_with(meshes, camera, &config)
}

/// A straight smooth silhouette along +X from the origin, one unit per
/// feature edge, each edge carrying the matching normal. Both ends are
/// non-T vertices of a single view edge.
pub(crate) fn smooth_line(camera: &Camera, normals: &[Vec3]) -> ViewMap {
    let shape = ShapeId(0);
    let mut vm = ViewMap::new();
    vm.add_shape(SShape {
        id: shape,
        name: "line".to_string(),
        bbox: Default::default(),
        svertices: Vec::new(),
        fedges: Vec::new(),
    });
    let svertices: Vec<SVertexId> = (0..=normals.len())
        .map(|i| {
            let p = Point3::new(i as f64, 0.0, 0.0);
            vm.add_svertex(SVertex {
                id: SVertexId(0),
                shape,
                point_3d: p,
                point_2d: camera.project(&p),
                normals: Vec::new(),
                fedges: Vec::new(),
                view_vertex: None,
            })
        })
        .collect();

    let mut prev: Option<FEdgeId> = None;
    for (i, n) in normals.iter().enumerate() {
        let id = vm.add_fedge(FEdge {
            id: FEdgeId(0),
            shape,
            a: svertices[i],
            b: svertices[i + 1],
            nature: Nature::SILHOUETTE,
            face_a: None,
            face_b: None,
            next: None,
            prev,
            view_edge: Some(ViewEdgeId(0)),
            qi: 0,
            occludee: None,
            geometry: FEdgeGeometry::Smooth {
                normal: *n,
                material: 0,
            },
        });
        if let Some(p) = prev {
            vm.fedges[p.index()].next = Some(id);
        }
        for sv in [svertices[i], svertices[i + 1]] {
            vm.svertices[sv.index()].fedges.push(id);
            vm.svertices[sv.index()].add_normal(*n);
        }
        prev = Some(id);
    }

    let first = svertices[0];
    let last = svertices[normals.len()];
    let a = vm.add_non_t_vertex(first, VertexNature::empty());
    let b = vm.add_non_t_vertex(last, VertexNature::empty());
    let ve = vm.add_view_edge(ViewEdge {
        id: ViewEdgeId(0),
        shape,
        nature: Nature::SILHOUETTE,
        qi: 0,
        fedge_a: FEdgeId(0),
        fedge_b: FEdgeId(normals.len() as u32 - 1),
        a,
        b,
        occluders: Vec::new(),
        occludee: None,
        in_image: true,
    });
    vm.attach(first, DirectedViewEdge { edge: ve, incoming: false });
    vm.attach(last, DirectedViewEdge { edge: ve, incoming: true });
    vm
}

/// Panic unless `vm` satisfies the structural guarantees of a build.
pub(crate) fn check_invariants(vm: &ViewMap) {
    for ve in vm.view_edges() {
        assert_ne!(ve.a, ve.b, "view edge {:?} has two distinct ends", ve.id);
        assert!(vm.fedge(ve.fedge_a).prev.is_none());
        assert!(vm.fedge(ve.fedge_b).next.is_none());

        let chain: Vec<FEdgeId> = vm.chain(ve.id).collect();
        assert_eq!(chain.last(), Some(&ve.fedge_b), "chain of {:?} ends at fedge_b", ve.id);
        let unique: BTreeSet<_> = chain.iter().collect();
        assert_eq!(unique.len(), chain.len(), "chain of {:?} is acyclic", ve.id);
        for pair in chain.windows(2) {
            assert_eq!(vm.fedge(pair[0]).b, vm.fedge(pair[1]).a);
        }
        for &f in &chain {
            let fe = vm.fedge(f);
            assert_eq!(fe.view_edge, Some(ve.id));
            assert_eq!(fe.nature, ve.nature);
            let a = vm.svertex(fe.a).point_2d.xy();
            let b = vm.svertex(fe.b).point_2d.xy();
            assert!((b - a).norm() > 0.0, "zero-length feature edge {f:?}");
        }

        let start = vm.fedge(ve.fedge_a).a;
        let end = vm.fedge(ve.fedge_b).b;
        assert_eq!(vm.svertex(start).view_vertex, Some(ve.a));
        assert_eq!(vm.svertex(end).view_vertex, Some(ve.b));
    }

    for v in vm.view_vertices() {
        let touching: BTreeSet<ViewEdgeId> = vm
            .view_edges()
            .iter()
            .filter(|ve| ve.a == v.id() || ve.b == v.id())
            .map(|ve| ve.id)
            .collect();
        assert_eq!(touching.len(), v.degree(), "degree of {:?}", v.id());
        for d in v.edges() {
            let ve = vm.view_edge(d.edge);
            let end = if d.incoming { ve.b } else { ve.a };
            assert_eq!(end, v.id(), "{d:?} at {:?}", v.id());
        }
    }
}
