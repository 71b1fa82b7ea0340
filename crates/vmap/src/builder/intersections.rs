//! Image-space crossings between feature edges (T-vertices).

use log::trace;
use vmap_math::{geom, Camera, Point2, Point3};

use crate::builder::split::split_fedge;
use crate::silhouette::{FEdgeId, SVertex, SVertexId};
use crate::view_map::ViewMap;

/// Crossings closer than this (in 3D parameter) to one already recorded
/// on the same feature edge are merged into it.
const SAME_CROSSING: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct Extent {
    fe: FEdgeId,
    min: Point2,
    max: Point2,
}

#[derive(Debug, Clone, Copy)]
struct Crossing {
    fedges: [FEdgeId; 2],
    /// 3D parameters along each feature edge.
    params: [f64; 2],
    points: [Point3; 2],
    /// Feature vertex already standing at the crossing on that edge,
    /// when the crossing falls on one of its endpoints.
    existing: [Option<SVertexId>; 2],
}

/// Find every pair of feature edges whose projections cross, split both
/// at the crossing and join the two new feature vertices with a
/// T-vertex. Returns the number of T-vertices.
///
/// A crossing within `tolerance` pixels of an endpoint of one edge reuses
/// that endpoint as its side of the T-vertex and splits only the other
/// edge. Endpoints that already carry a view vertex are left alone, as
/// are crossings near an endpoint of both edges.
pub(crate) fn insert_t_vertices(vm: &mut ViewMap, camera: &Camera, tolerance: f64) -> usize {
    let crossings = find_crossings(vm, camera, tolerance);
    if crossings.is_empty() {
        return 0;
    }

    // Per feature edge: (parameter, new feature vertex), in order found.
    let mut splits: Vec<Vec<(f64, SVertexId)>> = vec![Vec::new(); vm.fedges.len()];
    let mut added = 0;
    for c in &crossings {
        let taken = (0..2).any(|k| {
            c.existing[k].is_none()
                && splits[c.fedges[k].index()]
                    .iter()
                    .any(|(t, _)| (t - c.params[k]).abs() < SAME_CROSSING)
        });
        let promoted = c
            .existing
            .iter()
            .flatten()
            .any(|&sv| vm.svertices[sv.index()].view_vertex.is_some());
        if taken || promoted {
            trace!("skipping crossing of {:?}", c.fedges);
            continue;
        }
        let mut sides = [SVertexId(0); 2];
        for k in 0..2 {
            if let Some(sv) = c.existing[k] {
                sides[k] = sv;
                continue;
            }
            let shape = vm.fedges[c.fedges[k].index()].shape;
            sides[k] = vm.add_svertex(SVertex {
                id: SVertexId(0),
                shape,
                point_3d: c.points[k],
                point_2d: camera.project(&c.points[k]),
                normals: Vec::new(),
                fedges: Vec::new(),
                view_vertex: None,
            });
            splits[c.fedges[k].index()].push((c.params[k], sides[k]));
        }
        let depth = |sv: SVertexId| vm.svertices[sv.index()].point_2d.z;
        let (front, back) = if depth(sides[0]) <= depth(sides[1]) {
            (sides[0], sides[1])
        } else {
            (sides[1], sides[0])
        };
        vm.add_t_vertex(front, back);
        added += 1;
    }

    for (i, mut list) in splits.into_iter().enumerate() {
        if list.is_empty() {
            continue;
        }
        list.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut current = FEdgeId(i as u32);
        for (_, sv) in list {
            current = split_fedge(vm, current, sv);
        }
    }
    added
}

/// Sweep over the x-extent of projected feature edges.
fn find_crossings(vm: &ViewMap, camera: &Camera, tolerance: f64) -> Vec<Crossing> {
    let mut extents: Vec<Extent> = vm
        .fedges
        .iter()
        .filter(|fe| {
            camera.is_in_front(&vm.svertex(fe.a).point_3d)
                && camera.is_in_front(&vm.svertex(fe.b).point_3d)
        })
        .map(|fe| {
            let a = vm.point_2d(fe.a);
            let b = vm.point_2d(fe.b);
            Extent {
                fe: fe.id,
                min: a.inf(&b),
                max: a.sup(&b),
            }
        })
        .collect();
    extents.sort_by(|a, b| a.min.x.total_cmp(&b.min.x).then(a.fe.cmp(&b.fe)));

    let mut crossings = Vec::new();
    let mut active: Vec<Extent> = Vec::new();
    for ext in extents {
        active.retain(|other| other.max.x >= ext.min.x);
        for other in &active {
            if other.max.y < ext.min.y || other.min.y > ext.max.y {
                continue;
            }
            if let Some(c) = crossing(vm, camera, other.fe, ext.fe, tolerance) {
                crossings.push(c);
            }
        }
        active.push(ext);
    }
    trace!("{} image-space crossings", crossings.len());
    crossings
}

fn crossing(
    vm: &ViewMap,
    camera: &Camera,
    f0: FEdgeId,
    f1: FEdgeId,
    tolerance: f64,
) -> Option<Crossing> {
    let e0 = vm.fedge(f0);
    let e1 = vm.fedge(f1);
    if e0.a == e1.a || e0.a == e1.b || e0.b == e1.a || e0.b == e1.b {
        return None;
    }
    let (a0, b0) = (vm.point_2d(e0.a), vm.point_2d(e0.b));
    let (a1, b1) = (vm.point_2d(e1.a), vm.point_2d(e1.b));
    let (t, u) = geom::segment_intersection_2d(&a0, &b0, &a1, &b1)?;
    let at_end = |a: SVertexId, b: SVertexId, s: f64, len: f64| {
        if s * len <= tolerance {
            Some(a)
        } else if (1.0 - s) * len <= tolerance {
            Some(b)
        } else {
            None
        }
    };
    let existing = [
        at_end(e0.a, e0.b, t, (b0 - a0).norm()),
        at_end(e1.a, e1.b, u, (b1 - a1).norm()),
    ];
    if existing.iter().all(Option::is_some) {
        return None;
    }

    let lift = |a: SVertexId, b: SVertexId, s: f64| {
        let pa = vm.svertex(a).point_3d;
        let pb = vm.svertex(b).point_3d;
        let w = camera.image_to_world_parameter(&pa, &pb, s);
        (w, pa + (pb - pa) * w)
    };
    let (w0, p0) = lift(e0.a, e0.b, t);
    let (w1, p1) = lift(e1.a, e1.b, u);
    Some(Crossing {
        fedges: [f0, f1],
        params: [w0, w1],
        points: [p0, p1],
        existing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use crate::silhouette::{FEdge, FEdgeGeometry, SShape};
    use crate::view_map::ViewVertex;
    use vmap_math::Vec3;
    use vmap_winged::{primitives, Nature, ShapeId};

    #[test]
    fn test_crossing_quads_make_t_vertices() {
        // A small quad in front of a larger one, offset so their borders
        // cross twice.
        let camera = fixtures::camera_at([0.0, 0.0, 10.0], [0.0, 0.0, 0.0]);
        let back = primitives::rect([-1.0, -1.0], [1.0, 1.0], 0.0);
        let front = primitives::rect([0.5, 0.5], [1.5, 1.5], 1.0);
        let vm = fixtures::build(&[back, front], &camera, Default::default());

        let tvertices: Vec<_> = vm
            .view_vertices()
            .iter()
            .filter_map(ViewVertex::as_t_vertex)
            .collect();
        assert_eq!(tvertices.len(), 2);
        for tv in tvertices {
            let front = vm.svertex(tv.front);
            let back = vm.svertex(tv.back);
            assert!(front.point_3d.z > back.point_3d.z, "front lies nearer the camera");
            assert!((front.point_2d.xy() - back.point_2d.xy()).norm() < 1e-6);
            assert!(front.point_2d.z < back.point_2d.z);
            assert_eq!(front.view_vertex, Some(tv.id));
            assert_eq!(back.view_vertex, Some(tv.id));
            assert_eq!(front.fedges.len(), 2);
            assert_eq!(back.fedges.len(), 2);
            assert!(tv.front_edge_a.is_some() && tv.front_edge_b.is_some());
            assert!(tv.back_edge_a.is_some() && tv.back_edge_b.is_some());
        }
        assert!(vm.fedges().iter().all(|fe| fe.nature == Nature::BORDER));
    }

    #[test]
    fn test_perspective_correct_crossing_point() {
        // A line receding in depth: the image midpoint is not the 3D
        // midpoint.
        let camera = fixtures::camera_at([0.0, 0.0, 10.0], [0.0, 0.0, 0.0]);
        let a = Point3::new(-2.0, 0.0, 0.0);
        let b = Point3::new(2.0, 0.0, 4.0);
        let pa = camera.project(&a);
        let pb = camera.project(&b);
        let s = 0.5;
        let w = camera.image_to_world_parameter(&a, &b, s);
        let p = a + (b - a) * w;
        let q = camera.project(&p);
        let expect = pa.xy() + (pb.xy() - pa.xy()) * s;
        assert!((q.xy() - expect).norm() < 1e-6);
        assert!(w > 0.5, "the nearer end covers more of the image");
    }

    #[test]
    fn test_touching_endpoints_are_not_crossings() {
        // Cube corners join edges that meet only at shared vertices.
        let camera = fixtures::cube_camera();
        let vm = fixtures::build(&[primitives::cube(1.0)], &camera, Default::default());
        assert_eq!(vm.stats().t_vertices, 0);
    }

    #[test]
    fn test_crossing_through_endpoint_reuses_feature_vertex() {
        // A line in front passes over the joint between two feature edges
        // of the line behind it.
        let camera = fixtures::camera_at([1.0, 0.0, 10.0], [1.0, 0.0, 0.0]);
        let mut vm = fixtures::smooth_line(&camera, &[Vec3::z(), Vec3::z()]);
        let joint = SVertexId(1);
        assert!(vm.svertex(joint).view_vertex.is_none());

        let shape = ShapeId(1);
        vm.add_shape(SShape {
            id: shape,
            name: "over".to_string(),
            bbox: Default::default(),
            svertices: Vec::new(),
            fedges: Vec::new(),
        });
        let ends: Vec<SVertexId> = [Point3::new(1.0, -1.0, 1.0), Point3::new(1.0, 1.0, 1.0)]
            .iter()
            .map(|p| {
                vm.add_svertex(SVertex {
                    id: SVertexId(0),
                    shape,
                    point_3d: *p,
                    point_2d: camera.project(p),
                    normals: Vec::new(),
                    fedges: Vec::new(),
                    view_vertex: None,
                })
            })
            .collect();
        let over = vm.add_fedge(FEdge {
            id: FEdgeId(0),
            shape,
            a: ends[0],
            b: ends[1],
            nature: Nature::BORDER,
            face_a: None,
            face_b: None,
            next: None,
            prev: None,
            view_edge: None,
            qi: 0,
            occludee: None,
            geometry: FEdgeGeometry::Sharp {
                normal_a: Vec3::z(),
                normal_b: None,
                material_a: 0,
                material_b: None,
            },
        });
        for sv in &ends {
            vm.svertices[sv.index()].fedges.push(over);
        }
        let svertices = vm.svertices().len();

        assert_eq!(insert_t_vertices(&mut vm, &camera, 1e-6), 1);
        let tv = vm
            .view_vertices()
            .iter()
            .find_map(ViewVertex::as_t_vertex)
            .expect("one T-vertex");
        assert_eq!(tv.back, joint, "the joint stands for the hidden side");
        assert_eq!(vm.svertices().len(), svertices + 1, "only the front edge is split");
        let front = vm.svertex(tv.front);
        assert_eq!(front.shape, shape);
        assert!((front.point_3d - Point3::new(1.0, 0.0, 1.0)).norm() < 1e-6);
        assert_eq!(vm.svertex(joint).view_vertex, Some(tv.id));
        assert_eq!(vm.svertex(joint).fedges, vec![FEdgeId(0), FEdgeId(1)]);
        assert_eq!(vm.fedge(FEdgeId(0)).b, joint);
        assert_eq!(vm.fedge(FEdgeId(1)).a, joint);
        assert_eq!(vm.fedge(over).b, tv.front);
        assert_eq!(vm.fedges().len(), 4);
    }
}
