//! Splitting feature edges and view edges at new vertices.

use vmap_math::Camera;

use crate::silhouette::{FEdgeId, SVertex, SVertexId};
use crate::view_map::{DirectedViewEdge, ViewMap, ViewVertex};
use crate::{VertexNature, ViewEdgeId};

/// Split feature edge `fe` at the existing feature vertex `sv`.
///
/// `fe` keeps the first half; the returned new edge runs from `sv` to
/// the old end and takes over the chain links and, if `fe` closed its
/// view edge, the `fedge_b` slot.
pub(crate) fn split_fedge(vm: &mut ViewMap, fe: FEdgeId, sv: SVertexId) -> FEdgeId {
    let old = vm.fedges[fe.index()].clone();
    let mut tail = old.clone();
    tail.a = sv;
    tail.prev = Some(fe);
    tail.occludee = None;
    let id = vm.add_fedge(tail);

    if let Some(n) = old.next {
        vm.fedges[n.index()].prev = Some(id);
    }
    let head = &mut vm.fedges[fe.index()];
    head.next = Some(id);
    head.b = sv;

    for f in vm.svertices[old.b.index()].fedges.iter_mut() {
        if *f == fe {
            *f = id;
        }
    }
    let split = &mut vm.svertices[sv.index()];
    split.fedges.push(fe);
    split.fedges.push(id);
    for n in old.normals() {
        split.add_normal(n);
    }

    if let Some(ve) = old.view_edge {
        let ve = &mut vm.view_edges[ve.index()];
        if ve.fedge_b == fe {
            ve.fedge_b = id;
        }
    }
    id
}

/// Cut view edge `id` at every interior feature vertex carrying a view
/// vertex. The original edge keeps the first piece. Returns the number
/// of new view edges.
pub(crate) fn split_view_edge(vm: &mut ViewMap, id: ViewEdgeId) -> usize {
    let chain: Vec<FEdgeId> = vm.chain(id).collect();
    let cuts: Vec<usize> = (1..chain.len())
        .filter(|&i| {
            let sv = vm.fedges[chain[i].index()].a;
            vm.svertices[sv.index()].view_vertex.is_some()
        })
        .collect();
    let Some(&first_cut) = cuts.first() else {
        return 0;
    };

    let old = vm.view_edges[id.index()].clone();
    let cut_sv = |vm: &ViewMap, i: usize| vm.fedges[chain[i].index()].a;
    let vertex_of = |vm: &ViewMap, sv: SVertexId| vm.svertices[sv.index()].view_vertex;

    for &c in &cuts {
        vm.fedges[chain[c - 1].index()].next = None;
        vm.fedges[chain[c].index()].prev = None;
    }

    // First piece stays with `id`.
    let end = cut_sv(vm, first_cut);
    if let Some(vb) = vertex_of(vm, end) {
        let ve = &mut vm.view_edges[id.index()];
        ve.fedge_b = chain[first_cut - 1];
        ve.b = vb;
    }
    vm.attach(
        end,
        DirectedViewEdge {
            edge: id,
            incoming: true,
        },
    );

    let mut bounds = cuts.clone();
    bounds.push(chain.len());
    for (k, w) in bounds.windows(2).enumerate() {
        let (s, e) = (w[0], w[1]);
        let last = k + 2 == bounds.len();
        let start = cut_sv(vm, s);
        let Some(va) = vertex_of(vm, start) else {
            continue;
        };
        let vb = if last {
            old.b
        } else {
            match vertex_of(vm, cut_sv(vm, e)) {
                Some(v) => v,
                None => continue,
            }
        };
        let mut piece = old.clone();
        piece.fedge_a = chain[s];
        piece.fedge_b = chain[e - 1];
        piece.a = va;
        piece.b = vb;
        let pid = vm.add_view_edge(piece);
        for &f in &chain[s..e] {
            vm.fedges[f.index()].view_edge = Some(pid);
        }
        vm.attach(
            start,
            DirectedViewEdge {
                edge: pid,
                incoming: false,
            },
        );
        if last {
            vm.view_vertices[old.b.index()].replace_edge(
                DirectedViewEdge {
                    edge: id,
                    incoming: true,
                },
                DirectedViewEdge {
                    edge: pid,
                    incoming: true,
                },
            );
        } else {
            vm.attach(
                cut_sv(vm, e),
                DirectedViewEdge {
                    edge: pid,
                    incoming: true,
                },
            );
        }
    }
    cuts.len()
}

/// Split every view edge that starts and ends at the same vertex, at its
/// middle. Returns the number of edges split.
pub(crate) fn split_self_loops(vm: &mut ViewMap, camera: &Camera) -> usize {
    let mut count = 0;
    for i in 0..vm.view_edges.len() {
        let id = ViewEdgeId(i as u32);
        let ve = &vm.view_edges[i];
        if ve.a != ve.b {
            continue;
        }
        let chain: Vec<FEdgeId> = vm.chain(id).collect();
        let sv = if chain.len() >= 2 {
            vm.fedges[chain[chain.len() / 2].index()].a
        } else {
            let fe = vm.fedges[chain[0].index()].clone();
            let p = nalgebra::center(
                &vm.svertices[fe.a.index()].point_3d,
                &vm.svertices[fe.b.index()].point_3d,
            );
            let sv = vm.add_svertex(SVertex {
                id: SVertexId(0),
                shape: fe.shape,
                point_3d: p,
                point_2d: camera.project(&p),
                normals: Vec::new(),
                fedges: Vec::new(),
                view_vertex: None,
            });
            split_fedge(vm, fe.id, sv);
            sv
        };
        vm.add_non_t_vertex(sv, VertexNature::empty());
        count += usize::from(split_view_edge(vm, id) > 0);
    }
    count
}

/// Split view edges wherever consecutive feature edges disagree on QI.
/// Returns the number of new view edges.
pub(crate) fn split_at_qi_changes(vm: &mut ViewMap) -> usize {
    let mut added = 0;
    for i in 0..vm.view_edges.len() {
        let id = ViewEdgeId(i as u32);
        let chain: Vec<FEdgeId> = vm.chain(id).collect();
        let mut changed = false;
        for pair in chain.windows(2) {
            let (prev, next) = (&vm.fedges[pair[0].index()], &vm.fedges[pair[1].index()]);
            if prev.qi == next.qi {
                continue;
            }
            let sv = next.a;
            if vm.svertices[sv.index()].view_vertex.is_none() {
                vm.add_non_t_vertex(sv, VertexNature::empty());
            }
            changed = true;
        }
        if changed {
            added += split_view_edge(vm, id);
        }
    }
    added
}

/// Order the edges around every non-T vertex by image-space angle.
pub(crate) fn sort_vertex_edges(vm: &mut ViewMap) {
    for i in 0..vm.view_vertices.len() {
        let ViewVertex::NonT(v) = &vm.view_vertices[i] else {
            continue;
        };
        let here = vm.point_2d(v.svertex);
        let mut keyed: Vec<(f64, DirectedViewEdge)> = v
            .edges
            .iter()
            .map(|&d| {
                let ve = &vm.view_edges[d.edge.index()];
                let toward = if d.incoming {
                    vm.fedges[ve.fedge_b.index()].a
                } else {
                    vm.fedges[ve.fedge_a.index()].b
                };
                let dir = vm.point_2d(toward) - here;
                (dir.y.atan2(dir.x), d)
            })
            .collect();
        keyed.sort_by(|(a, da), (b, db)| {
            a.total_cmp(b)
                .then(da.edge.cmp(&db.edge))
                .then(da.incoming.cmp(&db.incoming))
        });
        if let ViewVertex::NonT(v) = &mut vm.view_vertices[i] {
            v.edges = keyed.into_iter().map(|(_, d)| d).collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use vmap_math::Vec3;

    #[test]
    fn test_split_fedge_relinks_chain() {
        let camera = fixtures::top_camera();
        let mut vm = fixtures::smooth_line(&camera, &[Vec3::y(); 2]);
        let sv = vm.add_svertex(SVertex {
            id: SVertexId(0),
            shape: vm.fedges()[0].shape,
            point_3d: vmap_math::Point3::new(1.5, 0.0, 0.0),
            point_2d: camera.project(&vmap_math::Point3::new(1.5, 0.0, 0.0)),
            normals: Vec::new(),
            fedges: Vec::new(),
            view_vertex: None,
        });
        let tail = split_fedge(&mut vm, FEdgeId(1), sv);
        assert_eq!(vm.fedge(FEdgeId(1)).b, sv);
        assert_eq!(vm.fedge(FEdgeId(1)).next, Some(tail));
        assert_eq!(vm.fedge(tail).prev, Some(FEdgeId(1)));
        assert_eq!(vm.view_edges()[0].fedge_b, tail, "tail closes the view edge");
        let chain: Vec<_> = vm.chain(ViewEdgeId(0)).collect();
        assert_eq!(chain, vec![FEdgeId(0), FEdgeId(1), tail]);
        let end = vm.fedge(tail).b;
        assert!(vm.svertex(end).fedges.contains(&tail));
        assert!(!vm.svertex(end).fedges.contains(&FEdgeId(1)));
    }

    #[test]
    fn test_qi_change_splits_view_edge() {
        let camera = fixtures::top_camera();
        let mut vm = fixtures::smooth_line(&camera, &[Vec3::y(); 4]);
        for (i, qi) in [0, 0, 1, 1].into_iter().enumerate() {
            vm.fedges[i].qi = qi;
        }
        assert_eq!(split_at_qi_changes(&mut vm), 1);
        assert_eq!(vm.view_edges().len(), 2);
        let first: Vec<_> = vm.chain(ViewEdgeId(0)).collect();
        let second: Vec<_> = vm.chain(ViewEdgeId(1)).collect();
        assert_eq!(first, vec![FEdgeId(0), FEdgeId(1)]);
        assert_eq!(second, vec![FEdgeId(2), FEdgeId(3)]);
        assert_eq!(vm.fedge(FEdgeId(1)).next, None);
        assert_eq!(vm.fedge(FEdgeId(2)).prev, None);
        assert_eq!(vm.fedge(FEdgeId(3)).view_edge, Some(ViewEdgeId(1)));

        let end = vm.view_edges()[1].b;
        let refs = vm.view_vertex(end).edges();
        assert_eq!(
            refs,
            vec![DirectedViewEdge {
                edge: ViewEdgeId(1),
                incoming: true
            }],
            "old end now references the new piece"
        );
    }

    #[test]
    fn test_single_fedge_self_loop_split_at_midpoint() {
        let camera = fixtures::top_camera();
        let mut vm = fixtures::smooth_line(&camera, &[Vec3::y()]);
        // Close the edge on itself: both ends on one vertex.
        let a = vm.view_edges[0].a;
        let b = vm.view_edges[0].b;
        vm.view_edges[0].b = a;
        if let ViewVertex::NonT(v) = &mut vm.view_vertices[b.index()] {
            v.edges.clear();
        }
        let sv = vm.view_vertex(a).svertex();
        vm.view_vertices[a.index()].attach(
            sv,
            DirectedViewEdge {
                edge: ViewEdgeId(0),
                incoming: true,
            },
        );

        assert_eq!(split_self_loops(&mut vm, &camera), 1);
        assert_eq!(vm.fedges().len(), 2);
        assert_eq!(vm.view_edges().len(), 2);
        for ve in vm.view_edges() {
            assert_ne!(ve.a, ve.b);
        }
        let mid = vm.fedge(FEdgeId(0)).b;
        assert_eq!(vm.svertex(mid).point_3d.x, 0.5);
    }
}
