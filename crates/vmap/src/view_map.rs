//! The view map: feature lines of one viewpoint and how they occlude
//! each other.
//!
//! All elements live in flat arrays owned by [`ViewMap`] and refer to
//! each other by index, so closed loops and the edge/vertex
//! back-references need no shared ownership.

use std::sync::OnceLock;

use fxhash::FxHashMap;
use serde::Serialize;
use vmap_math::{geom, Aabb3, CameraSnapshot, Point2};
use vmap_winged::{Nature, ShapeId};

use crate::silhouette::{
    FEdge, FEdgeId, SShape, SVertex, SVertexId, VertexNature, ViewEdgeId, ViewVertexId,
};

/// A view edge seen from one of its endpoint vertices.
///
/// `incoming` edges end at the vertex; the others start there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectedViewEdge {
    /// The edge.
    pub edge: ViewEdgeId,
    /// Whether the edge ends at the vertex.
    pub incoming: bool,
}

/// Image-space crossing of two unrelated view edges.
///
/// Each of the two crossing lines is split there: the `_a` slot holds
/// the piece ending at the crossing and the `_b` slot the piece leaving
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct TVertex {
    /// Own index.
    pub id: ViewVertexId,
    /// Feature vertex on the line nearer the camera.
    pub front: SVertexId,
    /// Feature vertex on the hidden line.
    pub back: SVertexId,
    /// Front line, piece ending here.
    pub front_edge_a: Option<DirectedViewEdge>,
    /// Front line, piece starting here.
    pub front_edge_b: Option<DirectedViewEdge>,
    /// Back line, piece ending here.
    pub back_edge_a: Option<DirectedViewEdge>,
    /// Back line, piece starting here.
    pub back_edge_b: Option<DirectedViewEdge>,
}

/// Junction of view edges that meet in 3D.
#[derive(Debug, Clone, PartialEq)]
pub struct NonTVertex {
    /// Own index.
    pub id: ViewVertexId,
    /// Underlying feature vertex.
    pub svertex: SVertexId,
    /// `NON_T_VERTEX`, possibly with `CUSP`.
    pub nature: VertexNature,
    /// Incident edges, sorted by image-space angle once built.
    pub edges: Vec<DirectedViewEdge>,
}

/// Endpoint of view edges.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewVertex {
    /// Image-space crossing.
    T(TVertex),
    /// 3D junction.
    NonT(NonTVertex),
}

impl ViewVertex {
    /// Own index.
    pub fn id(&self) -> ViewVertexId {
        match self {
            ViewVertex::T(t) => t.id,
            ViewVertex::NonT(n) => n.id,
        }
    }

    /// Vertex role flags.
    pub fn nature(&self) -> VertexNature {
        match self {
            ViewVertex::T(_) => {
                VertexNature::S_VERTEX | VertexNature::VIEW_VERTEX | VertexNature::T_VERTEX
            }
            ViewVertex::NonT(n) => VertexNature::S_VERTEX | VertexNature::VIEW_VERTEX | n.nature,
        }
    }

    /// The feature vertex carrying the view vertex (the front one for a
    /// T-vertex).
    pub fn svertex(&self) -> SVertexId {
        match self {
            ViewVertex::T(t) => t.front,
            ViewVertex::NonT(n) => n.svertex,
        }
    }

    /// Incident edges.
    pub fn edges(&self) -> Vec<DirectedViewEdge> {
        match self {
            ViewVertex::T(t) => [t.front_edge_a, t.front_edge_b, t.back_edge_a, t.back_edge_b]
                .into_iter()
                .flatten()
                .collect(),
            ViewVertex::NonT(n) => n.edges.clone(),
        }
    }

    /// Number of recorded incident edges.
    pub fn degree(&self) -> usize {
        match self {
            ViewVertex::T(t) => [t.front_edge_a, t.front_edge_b, t.back_edge_a, t.back_edge_b]
                .iter()
                .filter(|e| e.is_some())
                .count(),
            ViewVertex::NonT(n) => n.edges.len(),
        }
    }

    /// The T-vertex variant, if this is one.
    pub fn as_t_vertex(&self) -> Option<&TVertex> {
        match self {
            ViewVertex::T(t) => Some(t),
            ViewVertex::NonT(_) => None,
        }
    }

    /// The non-T-vertex variant, if this is one.
    pub fn as_non_t_vertex(&self) -> Option<&NonTVertex> {
        match self {
            ViewVertex::NonT(n) => Some(n),
            ViewVertex::T(_) => None,
        }
    }

    /// Record an edge ending (`incoming`) or starting at feature vertex
    /// `sv`. On a T-vertex `sv` selects the front or back line.
    pub(crate) fn attach(&mut self, sv: SVertexId, edge: DirectedViewEdge) {
        match self {
            ViewVertex::T(t) => {
                let front = sv == t.front;
                let slot = match (front, edge.incoming) {
                    (true, true) => &mut t.front_edge_a,
                    (true, false) => &mut t.front_edge_b,
                    (false, true) => &mut t.back_edge_a,
                    (false, false) => &mut t.back_edge_b,
                };
                *slot = Some(edge);
            }
            ViewVertex::NonT(n) => n.edges.push(edge),
        }
    }

    /// Swap one incident edge for another, keeping its slot.
    pub(crate) fn replace_edge(&mut self, old: DirectedViewEdge, new: DirectedViewEdge) -> bool {
        match self {
            ViewVertex::T(t) => {
                for slot in [
                    &mut t.front_edge_a,
                    &mut t.front_edge_b,
                    &mut t.back_edge_a,
                    &mut t.back_edge_b,
                ] {
                    if *slot == Some(old) {
                        *slot = Some(new);
                        return true;
                    }
                }
                false
            }
            ViewVertex::NonT(n) => match n.edges.iter_mut().find(|e| **e == old) {
                Some(e) => {
                    *e = new;
                    true
                }
                None => false,
            },
        }
    }
}

/// Maximal chain of feature edges of one nature and one visibility
/// level, between two view vertices.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewEdge {
    /// Own index.
    pub id: ViewEdgeId,
    /// Mesh shape the chain lies on.
    pub shape: ShapeId,
    /// Nature shared by every feature edge of the chain.
    pub nature: Nature,
    /// Quantitative invisibility, constant along the chain.
    pub qi: u32,
    /// First feature edge.
    pub fedge_a: FEdgeId,
    /// Last feature edge.
    pub fedge_b: FEdgeId,
    /// Start vertex.
    pub a: ViewVertexId,
    /// End vertex.
    pub b: ViewVertexId,
    /// Shapes hiding the chain, sorted and unique.
    pub occluders: Vec<ShapeId>,
    /// Shape directly behind the chain.
    pub occludee: Option<ShapeId>,
    /// Whether the chain was inside the (enlarged) viewport when
    /// visibility was computed.
    pub in_image: bool,
}

impl ViewEdge {
    /// QI of zero.
    pub fn is_visible(&self) -> bool {
        self.qi == 0
    }
}

/// View-level wrapper around the features of one mesh shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewShape {
    /// Feature vertices and edges of the shape.
    pub sshape: SShape,
    /// View edges lying on the shape.
    pub view_edges: Vec<ViewEdgeId>,
    /// View vertices owned by the shape.
    pub view_vertices: Vec<ViewVertexId>,
}

impl ViewShape {
    /// Mesh shape id.
    pub fn id(&self) -> ShapeId {
        self.sshape.id
    }

    /// Shape name.
    pub fn name(&self) -> &str {
        &self.sshape.name
    }
}

/// Element counts, for logs and summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ViewMapStats {
    /// View shapes.
    pub shapes: usize,
    /// Feature vertices.
    pub svertices: usize,
    /// Feature edges.
    pub fedges: usize,
    /// View edges.
    pub view_edges: usize,
    /// View edges with QI 0.
    pub visible_view_edges: usize,
    /// T-vertices.
    pub t_vertices: usize,
    /// Non-T vertices.
    pub non_t_vertices: usize,
    /// Non-T vertices flagged as cusps.
    pub cusps: usize,
}

/// Feature lines of a scene seen from one viewpoint.
///
/// Every array is in creation order, which is deterministic for a given
/// input and is what the binary format indexes into.
#[derive(Debug, Clone, Default)]
pub struct ViewMap {
    pub(crate) shapes: Vec<ViewShape>,
    pub(crate) shape_index: FxHashMap<ShapeId, usize>,
    pub(crate) svertices: Vec<SVertex>,
    pub(crate) fedges: Vec<FEdge>,
    pub(crate) view_edges: Vec<ViewEdge>,
    pub(crate) view_vertices: Vec<ViewVertex>,
    pub(crate) scene_bbox: Aabb3,
    pub(crate) camera: CameraSnapshot,
    pub(crate) model_names: Vec<String>,
    fedge_index: OnceLock<FEdgeIndex>,
}

impl PartialEq for ViewMap {
    fn eq(&self, other: &Self) -> bool {
        self.shapes == other.shapes
            && self.shape_index == other.shape_index
            && self.svertices == other.svertices
            && self.fedges == other.fedges
            && self.view_edges == other.view_edges
            && self.view_vertices == other.view_vertices
            && self.scene_bbox == other.scene_bbox
            && self.camera == other.camera
            && self.model_names == other.model_names
    }
}

impl ViewMap {
    /// An empty view map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the map holds no feature edge.
    pub fn is_empty(&self) -> bool {
        self.fedges.is_empty()
    }

    /// View shapes, in creation order.
    pub fn shapes(&self) -> &[ViewShape] {
        &self.shapes
    }

    /// View shape of a mesh shape, if that shape produced any feature.
    pub fn shape(&self, id: ShapeId) -> Option<&ViewShape> {
        self.shape_index.get(&id).map(|&i| &self.shapes[i])
    }

    /// All feature vertices.
    pub fn svertices(&self) -> &[SVertex] {
        &self.svertices
    }

    /// Feature vertex by id.
    pub fn svertex(&self, id: SVertexId) -> &SVertex {
        &self.svertices[id.index()]
    }

    /// All feature edges.
    pub fn fedges(&self) -> &[FEdge] {
        &self.fedges
    }

    /// Feature edge by id.
    pub fn fedge(&self, id: FEdgeId) -> &FEdge {
        &self.fedges[id.index()]
    }

    /// All view edges.
    pub fn view_edges(&self) -> &[ViewEdge] {
        &self.view_edges
    }

    /// View edge by id.
    pub fn view_edge(&self, id: ViewEdgeId) -> &ViewEdge {
        &self.view_edges[id.index()]
    }

    /// All view vertices.
    pub fn view_vertices(&self) -> &[ViewVertex] {
        &self.view_vertices
    }

    /// View vertex by id.
    pub fn view_vertex(&self, id: ViewVertexId) -> &ViewVertex {
        &self.view_vertices[id.index()]
    }

    /// Bounding box of the whole scene.
    pub fn scene_bbox(&self) -> Aabb3 {
        self.scene_bbox
    }

    /// Camera the map was computed for.
    pub fn camera(&self) -> CameraSnapshot {
        self.camera
    }

    /// Names of the models the scene was built from.
    pub fn model_names(&self) -> &[String] {
        &self.model_names
    }

    /// Feature edges of a view edge, from `fedge_a` to `fedge_b`.
    pub fn chain(&self, id: ViewEdgeId) -> Chain<'_> {
        let ve = self.view_edge(id);
        Chain {
            map: self,
            next: Some(ve.fedge_a),
            last: ve.fedge_b,
            remaining: self.fedges.len(),
        }
    }

    /// Element counts.
    pub fn stats(&self) -> ViewMapStats {
        let mut stats = ViewMapStats {
            shapes: self.shapes.len(),
            svertices: self.svertices.len(),
            fedges: self.fedges.len(),
            view_edges: self.view_edges.len(),
            visible_view_edges: self.view_edges.iter().filter(|e| e.is_visible()).count(),
            ..ViewMapStats::default()
        };
        for v in &self.view_vertices {
            match v {
                ViewVertex::T(_) => stats.t_vertices += 1,
                ViewVertex::NonT(n) => {
                    stats.non_t_vertices += 1;
                    stats.cusps += usize::from(n.nature.contains(VertexNature::CUSP));
                }
            }
        }
        stats
    }

    /// Feature edge whose projection passes closest to the image point
    /// `p`, or `None` for an empty map.
    ///
    /// The first call builds a bucket index over the projected edges.
    pub fn closest_fedge_2d(&self, p: &Point2) -> Option<FEdgeId> {
        self.fedge_index
            .get_or_init(|| FEdgeIndex::build(self))
            .nearest(self, p)
    }

    pub(crate) fn point_2d(&self, sv: SVertexId) -> Point2 {
        let p = self.svertices[sv.index()].point_2d;
        Point2::new(p.x, p.y)
    }

    pub(crate) fn view_shape_mut(&mut self, id: ShapeId) -> Option<&mut ViewShape> {
        self.shape_index.get(&id).map(|&i| &mut self.shapes[i])
    }

    /// Register a new view shape, or return the existing one's slot.
    pub(crate) fn add_shape(&mut self, sshape: SShape) -> usize {
        if let Some(&i) = self.shape_index.get(&sshape.id) {
            return i;
        }
        let i = self.shapes.len();
        self.shape_index.insert(sshape.id, i);
        self.shapes.push(ViewShape {
            sshape,
            view_edges: Vec::new(),
            view_vertices: Vec::new(),
        });
        i
    }

    pub(crate) fn add_svertex(&mut self, mut sv: SVertex) -> SVertexId {
        let id = SVertexId(self.svertices.len() as u32);
        sv.id = id;
        if let Some(shape) = self.view_shape_mut(sv.shape) {
            shape.sshape.svertices.push(id);
        }
        self.svertices.push(sv);
        id
    }

    pub(crate) fn add_fedge(&mut self, mut fe: FEdge) -> FEdgeId {
        let id = FEdgeId(self.fedges.len() as u32);
        fe.id = id;
        if let Some(shape) = self.view_shape_mut(fe.shape) {
            shape.sshape.fedges.push(id);
        }
        self.fedges.push(fe);
        id
    }

    pub(crate) fn add_view_edge(&mut self, mut ve: ViewEdge) -> ViewEdgeId {
        let id = ViewEdgeId(self.view_edges.len() as u32);
        ve.id = id;
        if let Some(shape) = self.view_shape_mut(ve.shape) {
            shape.view_edges.push(id);
        }
        self.view_edges.push(ve);
        id
    }

    /// Add a non-T vertex on `sv` and link the feature vertex to it.
    pub(crate) fn add_non_t_vertex(&mut self, sv: SVertexId, nature: VertexNature) -> ViewVertexId {
        let id = ViewVertexId(self.view_vertices.len() as u32);
        self.view_vertices.push(ViewVertex::NonT(NonTVertex {
            id,
            svertex: sv,
            nature: VertexNature::NON_T_VERTEX | nature,
            edges: Vec::new(),
        }));
        self.svertices[sv.index()].view_vertex = Some(id);
        let shape = self.svertices[sv.index()].shape;
        if let Some(s) = self.view_shape_mut(shape) {
            s.view_vertices.push(id);
        }
        id
    }

    /// Add a T-vertex joining two feature vertices and link both to it.
    pub(crate) fn add_t_vertex(&mut self, front: SVertexId, back: SVertexId) -> ViewVertexId {
        let id = ViewVertexId(self.view_vertices.len() as u32);
        self.view_vertices.push(ViewVertex::T(TVertex {
            id,
            front,
            back,
            front_edge_a: None,
            front_edge_b: None,
            back_edge_a: None,
            back_edge_b: None,
        }));
        self.svertices[front.index()].view_vertex = Some(id);
        self.svertices[back.index()].view_vertex = Some(id);
        let shape = self.svertices[front.index()].shape;
        if let Some(s) = self.view_shape_mut(shape) {
            s.view_vertices.push(id);
        }
        id
    }

    /// Attach `edge` to the view vertex sitting on `sv`.
    pub(crate) fn attach(&mut self, sv: SVertexId, edge: DirectedViewEdge) -> Option<ViewVertexId> {
        let vv = self.svertices[sv.index()].view_vertex?;
        self.view_vertices[vv.index()].attach(sv, edge);
        Some(vv)
    }
}

/// Iterator over the feature edges of one view edge.
#[derive(Debug, Clone)]
pub struct Chain<'a> {
    map: &'a ViewMap,
    next: Option<FEdgeId>,
    last: FEdgeId,
    remaining: usize,
}

impl Iterator for Chain<'_> {
    type Item = FEdgeId;

    fn next(&mut self) -> Option<FEdgeId> {
        let current = self.next?;
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        self.next = if current == self.last {
            None
        } else {
            self.map.fedges[current.index()].next
        };
        Some(current)
    }
}

/// Uniform 2D buckets of projected feature edges.
#[derive(Debug, Clone, Default)]
struct FEdgeIndex {
    min: Point2,
    max: Point2,
    cell: f64,
    cols: usize,
    rows: usize,
    cells: Vec<Vec<FEdgeId>>,
}

impl FEdgeIndex {
    fn build(map: &ViewMap) -> Self {
        if map.fedges.is_empty() {
            return Self::default();
        }
        let mut min = Point2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for sv in &map.svertices {
            let p = Point2::new(sv.point_2d.x, sv.point_2d.y);
            min = min.inf(&p);
            max = max.sup(&p);
        }
        let extent = max - min;
        let side = (map.fedges.len() as f64).sqrt().ceil().max(1.0);
        let cell = (extent.x.max(extent.y) / side).max(1e-9);
        let cols = (extent.x / cell).floor() as usize + 1;
        let rows = (extent.y / cell).floor() as usize + 1;
        let mut index = Self {
            min,
            max,
            cell,
            cols,
            rows,
            cells: vec![Vec::new(); cols * rows],
        };
        for fe in &map.fedges {
            let pa = map.point_2d(fe.a);
            let pb = map.point_2d(fe.b);
            let (c0, r0) = index.cell_of(&pa.inf(&pb));
            let (c1, r1) = index.cell_of(&pa.sup(&pb));
            for r in r0..=r1 {
                for c in c0..=c1 {
                    index.cells[r * cols + c].push(fe.id);
                }
            }
        }
        index
    }

    fn cell_of(&self, p: &Point2) -> (usize, usize) {
        let c = ((p.x - self.min.x) / self.cell).floor().max(0.0) as usize;
        let r = ((p.y - self.min.y) / self.cell).floor().max(0.0) as usize;
        (c.min(self.cols - 1), r.min(self.rows - 1))
    }

    /// Ring search outward from the cell nearest `p`. Any cell on ring
    /// `r + 1` is at least `r` cells away from `p`'s projection onto the
    /// index box, hence from `p` itself.
    fn nearest(&self, map: &ViewMap, p: &Point2) -> Option<FEdgeId> {
        if self.cells.is_empty() {
            return None;
        }
        let clamped = p.sup(&self.min).inf(&self.max);
        let (qc, qr) = self.cell_of(&clamped);
        let mut best: Option<(f64, FEdgeId)> = None;
        for ring in 0..=self.cols.max(self.rows) {
            let c0 = qc.saturating_sub(ring);
            let r0 = qr.saturating_sub(ring);
            let c1 = (qc + ring).min(self.cols - 1);
            let r1 = (qr + ring).min(self.rows - 1);
            for r in r0..=r1 {
                for c in c0..=c1 {
                    let on_ring = c.abs_diff(qc) == ring || r.abs_diff(qr) == ring;
                    if !on_ring {
                        continue;
                    }
                    for &id in &self.cells[r * self.cols + c] {
                        let fe = map.fedge(id);
                        let d = geom::point_segment_distance_2d(
                            p,
                            &map.point_2d(fe.a),
                            &map.point_2d(fe.b),
                        );
                        if best.map_or(true, |(bd, bid)| d < bd || (d == bd && id < bid)) {
                            best = Some((d, id));
                        }
                    }
                }
            }
            if let Some((d, _)) = best {
                if d <= ring as f64 * self.cell {
                    break;
                }
            }
        }
        best.map(|(_, id)| id)
    }
}
