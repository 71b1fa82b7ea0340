//! Chaining of flagged mesh edges and smooth face layers into view
//! edges.
//!
//! Every feature element (a flagged mesh edge, or one segment of a
//! smooth line inside a face) joins two nodes. A chain passes through a
//! node only when exactly two elements meet there and both carry the
//! same nature; every other node ends the chain and becomes a non-T
//! vertex.

use fxhash::FxHashMap;
use log::trace;
use vmap_math::{Camera, Point3, Vec3};
use vmap_winged::{EdgeId, FaceId, FaceRef, Nature, VertexId, WxShape};

use crate::silhouette::{FEdge, FEdgeGeometry, FEdgeId, SShape, SVertex, SVertexId};
use crate::view_map::{DirectedViewEdge, ViewEdge, ViewMap};
use crate::{VertexNature, ViewEdgeId, ViewVertexId};

/// Projected length under which a feature element is dropped.
const MIN_IMAGE_LENGTH: f64 = 1e-9;

/// Where feature elements meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Node {
    /// A mesh vertex, shared by sharp elements.
    Vertex(VertexId),
    /// The crossing of a smooth line of one nature with a mesh edge.
    EdgePoint(EdgeId, Nature),
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Sharp(EdgeId),
    Smooth(FaceId, usize),
}

#[derive(Debug, Clone, Copy)]
struct Element {
    source: Source,
    nature: Nature,
    nodes: [Node; 2],
    points: [Point3; 2],
}

/// An element walked in one direction.
#[derive(Debug, Clone, Copy)]
struct Step {
    element: usize,
    forward: bool,
}

struct ShapeChainer<'a> {
    shape: &'a WxShape,
    camera: &'a Camera,
    elements: Vec<Element>,
    incidence: FxHashMap<Node, Vec<usize>>,
    svertices: FxHashMap<Node, SVertexId>,
}

/// Chain the features of one shape into `vm`. Returns the number of
/// feature edges created.
pub(crate) fn chain_shape(vm: &mut ViewMap, shape: &WxShape, camera: &Camera, epsilon: f64) -> usize {
    let (elements, dropped) = collect_elements(shape, camera, epsilon);
    if dropped > 0 {
        trace!("shape '{}': dropped {dropped} degenerate feature elements", shape.name);
    }
    if elements.is_empty() {
        return 0;
    }

    let mut incidence: FxHashMap<Node, Vec<usize>> = FxHashMap::default();
    for (i, el) in elements.iter().enumerate() {
        for node in el.nodes {
            incidence.entry(node).or_default().push(i);
        }
    }

    vm.add_shape(SShape {
        id: shape.id,
        name: shape.name.clone(),
        bbox: shape.bbox(),
        svertices: Vec::new(),
        fedges: Vec::new(),
    });

    let mut chainer = ShapeChainer {
        shape,
        camera,
        elements,
        incidence,
        svertices: FxHashMap::default(),
    };
    let first_fedge = vm.fedges.len();
    let mut visited = vec![false; chainer.elements.len()];
    for start in 0..chainer.elements.len() {
        if visited[start] {
            continue;
        }
        let (steps, closed) = chainer.walk(start, &mut visited);
        if closed {
            // Split loops so both halves get distinct endpoints.
            let mid = steps.len() / 2;
            chainer.emit(vm, &steps[..mid]);
            chainer.emit(vm, &steps[mid..]);
        } else {
            chainer.emit(vm, &steps);
        }
    }
    vm.fedges.len() - first_fedge
}

fn collect_elements(shape: &WxShape, camera: &Camera, epsilon: f64) -> (Vec<Element>, usize) {
    let mut elements = Vec::new();
    for (i, edge) in shape.edges.iter().enumerate() {
        if edge.nature.is_empty() {
            continue;
        }
        elements.push(Element {
            source: Source::Sharp(EdgeId(i as u32)),
            nature: edge.nature,
            nodes: [Node::Vertex(edge.a), Node::Vertex(edge.b)],
            points: [shape.vertex(edge.a).position, shape.vertex(edge.b).position],
        });
    }
    for (f, face) in shape.faces.iter().enumerate() {
        for (l, layer) in face.layers.iter().enumerate() {
            let seg = layer.segment;
            elements.push(Element {
                source: Source::Smooth(FaceId(f as u32), l),
                nature: layer.nature,
                nodes: [
                    Node::EdgePoint(seg.a.edge, layer.nature),
                    Node::EdgePoint(seg.b.edge, layer.nature),
                ],
                points: [shape.edge_point(&seg.a), shape.edge_point(&seg.b)],
            });
        }
    }

    let before = elements.len();
    elements.retain(|el| {
        let [a, b] = el.points;
        if (b - a).norm() <= epsilon {
            return false;
        }
        let pa = camera.project(&a);
        let pb = camera.project(&b);
        (pb.xy() - pa.xy()).norm() > MIN_IMAGE_LENGTH
    });
    let dropped = before - elements.len();
    (elements, dropped)
}

impl ShapeChainer<'_> {
    fn entry(&self, step: Step) -> Node {
        self.elements[step.element].nodes[usize::from(!step.forward)]
    }

    fn exit(&self, step: Step) -> Node {
        self.elements[step.element].nodes[usize::from(step.forward)]
    }

    /// The element continuing `from` through `node`, if the node is a
    /// plain pass-through.
    fn continuation(&self, node: Node, from: usize) -> Option<usize> {
        let incident = self.incidence.get(&node)?;
        let [x, y] = incident.as_slice() else {
            return None;
        };
        let other = if *x == from { *y } else { *x };
        (other != from && self.elements[other].nature == self.elements[from].nature)
            .then_some(other)
    }

    /// Maximal run through `start`, and whether it closes on itself.
    fn walk(&self, start: usize, visited: &mut [bool]) -> (Vec<Step>, bool) {
        visited[start] = true;
        let mut steps = vec![Step {
            element: start,
            forward: true,
        }];

        let mut current = start;
        let mut node = self.elements[start].nodes[1];
        while let Some(next) = self.continuation(node, current) {
            if next == start {
                return (steps, true);
            }
            if visited[next] {
                break;
            }
            visited[next] = true;
            let step = Step {
                element: next,
                forward: self.elements[next].nodes[0] == node,
            };
            node = self.exit(step);
            steps.push(step);
            current = next;
        }

        let mut backward = Vec::new();
        let mut current = start;
        let mut node = self.elements[start].nodes[0];
        while let Some(prev) = self.continuation(node, current) {
            if visited[prev] {
                break;
            }
            visited[prev] = true;
            let step = Step {
                element: prev,
                forward: self.elements[prev].nodes[1] == node,
            };
            node = self.entry(step);
            backward.push(step);
            current = prev;
        }
        backward.reverse();
        backward.extend(steps);
        (backward, false)
    }

    fn svertex(&mut self, vm: &mut ViewMap, node: Node, p: Point3) -> SVertexId {
        if let Some(&id) = self.svertices.get(&node) {
            return id;
        }
        let id = vm.add_svertex(SVertex {
            id: SVertexId(0),
            shape: self.shape.id,
            point_3d: p,
            point_2d: self.camera.project(&p),
            normals: Vec::new(),
            fedges: Vec::new(),
            view_vertex: None,
        });
        self.svertices.insert(node, id);
        id
    }

    fn geometry(&self, source: Source) -> (Option<FaceRef>, Option<FaceRef>, FEdgeGeometry) {
        let shape = self.shape;
        let face_ref = |face| FaceRef {
            shape: shape.id,
            face,
        };
        match source {
            Source::Sharp(edge) => {
                let (f0, f1) = shape.edge_faces(edge);
                let a = shape.face(f0);
                let b = f1.map(|f| shape.face(f));
                (
                    Some(face_ref(f0)),
                    f1.map(face_ref),
                    FEdgeGeometry::Sharp {
                        normal_a: a.normal,
                        normal_b: b.map(|b| b.normal),
                        material_a: a.material,
                        material_b: b.map(|b| b.material),
                    },
                )
            }
            Source::Smooth(face, layer) => {
                let f = shape.face(face);
                (
                    Some(face_ref(face)),
                    None,
                    FEdgeGeometry::Smooth {
                        normal: f.layers[layer].normal,
                        material: f.material,
                    },
                )
            }
        }
    }

    /// Create the feature edges, end vertices and view edge of one run.
    fn emit(&mut self, vm: &mut ViewMap, steps: &[Step]) {
        let (Some(&first), Some(&last)) = (steps.first(), steps.last()) else {
            return;
        };
        let nature = self.elements[first.element].nature;
        let mut fedges: Vec<FEdgeId> = Vec::with_capacity(steps.len());
        for &step in steps {
            let el = self.elements[step.element];
            let (pa, pb) = if step.forward {
                (el.points[0], el.points[1])
            } else {
                (el.points[1], el.points[0])
            };
            let a = self.svertex(vm, self.entry(step), pa);
            let b = self.svertex(vm, self.exit(step), pb);
            let (face_a, face_b, geometry) = self.geometry(el.source);
            let prev = fedges.last().copied();
            let id = vm.add_fedge(FEdge {
                id: FEdgeId(0),
                shape: self.shape.id,
                a,
                b,
                nature,
                face_a,
                face_b,
                next: None,
                prev,
                view_edge: None,
                qi: 0,
                occludee: None,
                geometry,
            });
            if let Some(p) = prev {
                vm.fedges[p.index()].next = Some(id);
            }
            let normals: Vec<Vec3> = vm.fedges[id.index()].normals().collect();
            for sv in [a, b] {
                let sv = &mut vm.svertices[sv.index()];
                sv.fedges.push(id);
                for &n in &normals {
                    sv.add_normal(n);
                }
            }
            fedges.push(id);
        }

        let start = vm.fedges[fedges[0].index()].a;
        let end = vm.fedges[fedges[fedges.len() - 1].index()].b;
        debug_assert_eq!(self.svertices.get(&self.entry(first)), Some(&start));
        debug_assert_eq!(self.svertices.get(&self.exit(last)), Some(&end));
        let va = end_vertex(vm, start);
        let vb = end_vertex(vm, end);
        let ve = vm.add_view_edge(ViewEdge {
            id: ViewEdgeId(0),
            shape: self.shape.id,
            nature,
            qi: 0,
            fedge_a: fedges[0],
            fedge_b: fedges[fedges.len() - 1],
            a: va,
            b: vb,
            occluders: Vec::new(),
            occludee: None,
            in_image: true,
        });
        for &f in &fedges {
            vm.fedges[f.index()].view_edge = Some(ve);
        }
        vm.attach(
            start,
            DirectedViewEdge {
                edge: ve,
                incoming: false,
            },
        );
        vm.attach(
            end,
            DirectedViewEdge {
                edge: ve,
                incoming: true,
            },
        );
    }
}

/// The non-T vertex on `sv`, created on first use.
fn end_vertex(vm: &mut ViewMap, sv: SVertexId) -> ViewVertexId {
    match vm.svertices[sv.index()].view_vertex {
        Some(v) => v,
        None => vm.add_non_t_vertex(sv, VertexNature::empty()),
    }
}
