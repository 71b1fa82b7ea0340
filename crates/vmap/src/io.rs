//! Binary persistence of view maps.
//!
//! A saved view map is a single stream:
//!
//! | Field | Encoding |
//! |---|---|
//! | byte order | `u8`: 0 little endian, 1 big endian |
//! | magic | string `"VMAP"` |
//! | version | string `"1.0"` |
//! | flags | `u8`: bit 0 float vectors, bit 1 no occluders |
//! | model names | `u32` count, strings |
//! | camera | 7 × `f32`: position, orientation quaternion |
//! | scene bbox | 2 vectors |
//! | sections | view shapes, feature edges, feature vertices, view edges, view vertices |
//! | shape table | `u32` count, (shape id, shape slot) pairs |
//!
//! Strings are a `u32` byte length followed by UTF-8. Vectors are three
//! reals, `f32` when the float-vectors flag is set and `f64` otherwise.
//! Elements refer to each other by creation index; `u32::MAX` encodes an
//! absent reference.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::marker::PhantomData;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use vmap_math::{Aabb3, CameraSnapshot, Point3, Vec3};
use vmap_winged::{FaceId, FaceRef, Nature, ShapeId};

use crate::silhouette::{
    FEdge, FEdgeGeometry, FEdgeId, Occludee, SShape, SVertex, SVertexId, VertexNature,
    ViewEdgeId, ViewVertexId,
};
use crate::view_map::{DirectedViewEdge, NonTVertex, TVertex, ViewEdge, ViewShape, ViewVertex};
use crate::{Result, ViewMap, ViewMapError};

/// Stream magic.
pub const MAGIC: &str = "VMAP";

/// Format version written by [`save`].
pub const VERSION: &str = "1.0";

const NONE: u32 = u32::MAX;
const FLAG_FLOAT_VECTORS: u8 = 1 << 0;
const FLAG_NO_OCCLUDERS: u8 = 1 << 1;

/// Upper bound on any up-front allocation driven by a count read from the
/// stream; larger arrays grow as they are read.
const MAX_PREALLOC: usize = 1 << 16;

/// Longest string accepted on load.
const MAX_STRING: usize = 1 << 20;

/// How a view map is written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
    /// Store vectors as `f32` instead of `f64`.
    pub float_vectors: bool,
    /// Leave out the occluder lists of view edges.
    pub no_occluders: bool,
    /// Write big-endian numbers.
    pub big_endian: bool,
}

/// Write `vm` to `w`.
pub fn save<W: Write>(w: W, vm: &ViewMap, options: &SaveOptions) -> Result<()> {
    if options.big_endian {
        Encoder::<W, BigEndian>::new(w, options).view_map(vm)
    } else {
        Encoder::<W, LittleEndian>::new(w, options).view_map(vm)
    }
}

/// Read a view map written by [`save`].
pub fn load<R: Read>(mut r: R) -> Result<ViewMap> {
    match r.read_u8()? {
        0 => Decoder::<R, LittleEndian>::new(r).view_map(),
        1 => Decoder::<R, BigEndian>::new(r).view_map(),
        _ => Err(ViewMapError::BadMagic),
    }
}

/// Write `vm` to the file at `path`, replacing it.
pub fn save_file(path: impl AsRef<Path>, vm: &ViewMap, options: &SaveOptions) -> Result<()> {
    let mut w = BufWriter::new(File::create(path.as_ref())?);
    save(&mut w, vm, options)?;
    w.flush()?;
    debug!("saved view map to {}", path.as_ref().display());
    Ok(())
}

/// Read the view map stored at `path`.
pub fn load_file(path: impl AsRef<Path>) -> Result<ViewMap> {
    let vm = load(BufReader::new(File::open(path.as_ref())?))?;
    debug!(
        "loaded view map from {}: {:?}",
        path.as_ref().display(),
        vm.stats()
    );
    Ok(vm)
}

// ===============================================================================================
// ===== Writing
// ===============================================================================================

struct Encoder<W, B> {
    w: W,
    float_vectors: bool,
    no_occluders: bool,
    _order: PhantomData<B>,
}

impl<W: Write, B: ByteOrder> Encoder<W, B> {
    fn new(w: W, options: &SaveOptions) -> Self {
        Self {
            w,
            float_vectors: options.float_vectors,
            no_occluders: options.no_occluders,
            _order: PhantomData,
        }
    }

    fn view_map(mut self, vm: &ViewMap) -> Result<()> {
        let order = if B::read_u16(&[0, 1]) == 1 { 1 } else { 0 };
        self.w.write_u8(order)?;
        self.string(MAGIC)?;
        self.string(VERSION)?;
        let mut flags = 0;
        if self.float_vectors {
            flags |= FLAG_FLOAT_VECTORS;
        }
        if self.no_occluders {
            flags |= FLAG_NO_OCCLUDERS;
        }
        self.w.write_u8(flags)?;

        self.len(vm.model_names.len())?;
        for name in &vm.model_names {
            self.string(name)?;
        }
        for c in vm.camera.position.iter().chain(&vm.camera.orientation) {
            self.w.write_f32::<B>(*c)?;
        }
        self.bbox(&vm.scene_bbox)?;

        self.len(vm.shapes.len())?;
        for shape in &vm.shapes {
            self.shape(shape)?;
        }
        self.len(vm.fedges.len())?;
        for fe in &vm.fedges {
            self.fedge(fe)?;
        }
        self.len(vm.svertices.len())?;
        for sv in &vm.svertices {
            self.svertex(sv)?;
        }
        self.len(vm.view_edges.len())?;
        for ve in &vm.view_edges {
            self.view_edge(ve)?;
        }
        self.len(vm.view_vertices.len())?;
        for vv in &vm.view_vertices {
            self.view_vertex(vv)?;
        }

        let mut table: Vec<(ShapeId, usize)> = vm.shape_index.iter().map(|(&k, &v)| (k, v)).collect();
        table.sort();
        self.len(table.len())?;
        for (id, slot) in table {
            self.u32(id.0)?;
            self.len(slot)?;
        }
        Ok(())
    }

    fn shape(&mut self, shape: &ViewShape) -> Result<()> {
        let s = &shape.sshape;
        self.u32(s.id.0)?;
        self.string(&s.name)?;
        self.bbox(&s.bbox)?;
        self.ids(s.svertices.iter().map(|id| id.0))?;
        self.ids(s.fedges.iter().map(|id| id.0))?;
        self.ids(shape.view_edges.iter().map(|id| id.0))?;
        self.ids(shape.view_vertices.iter().map(|id| id.0))
    }

    fn fedge(&mut self, fe: &FEdge) -> Result<()> {
        self.u32(fe.shape.0)?;
        self.u32(fe.a.0)?;
        self.u32(fe.b.0)?;
        self.w.write_u16::<B>(fe.nature.bits())?;
        self.face(fe.face_a)?;
        self.face(fe.face_b)?;
        self.opt(fe.next.map(|id| id.0))?;
        self.opt(fe.prev.map(|id| id.0))?;
        self.opt(fe.view_edge.map(|id| id.0))?;
        self.u32(fe.qi)?;
        match fe.occludee {
            Some(o) => {
                self.face(Some(o.face))?;
                self.point(&o.point)?;
            }
            None => self.face(None)?,
        }
        match fe.geometry {
            FEdgeGeometry::Sharp {
                normal_a,
                normal_b,
                material_a,
                material_b,
            } => {
                self.w.write_u8(0)?;
                self.vector(&normal_a)?;
                self.w.write_u8(u8::from(normal_b.is_some()))?;
                if let Some(n) = normal_b {
                    self.vector(&n)?;
                }
                self.u32(material_a)?;
                self.w.write_u8(u8::from(material_b.is_some()))?;
                if let Some(m) = material_b {
                    self.u32(m)?;
                }
            }
            FEdgeGeometry::Smooth { normal, material } => {
                self.w.write_u8(1)?;
                self.vector(&normal)?;
                self.u32(material)?;
            }
        }
        Ok(())
    }

    fn svertex(&mut self, sv: &SVertex) -> Result<()> {
        self.u32(sv.shape.0)?;
        self.point(&sv.point_3d)?;
        self.point(&sv.point_2d)?;
        self.len(sv.normals.len())?;
        for n in &sv.normals {
            self.vector(n)?;
        }
        self.ids(sv.fedges.iter().map(|id| id.0))?;
        self.opt(sv.view_vertex.map(|id| id.0))
    }

    fn view_edge(&mut self, ve: &ViewEdge) -> Result<()> {
        self.u32(ve.shape.0)?;
        self.w.write_u16::<B>(ve.nature.bits())?;
        self.u32(ve.qi)?;
        self.u32(ve.fedge_a.0)?;
        self.u32(ve.fedge_b.0)?;
        self.u32(ve.a.0)?;
        self.u32(ve.b.0)?;
        if !self.no_occluders {
            self.ids(ve.occluders.iter().map(|s| s.0))?;
        }
        self.opt(ve.occludee.map(|s| s.0))?;
        self.w.write_u8(u8::from(ve.in_image))?;
        Ok(())
    }

    fn view_vertex(&mut self, vv: &ViewVertex) -> Result<()> {
        match vv {
            ViewVertex::NonT(v) => {
                self.w.write_u8(0)?;
                self.u32(v.svertex.0)?;
                self.w.write_u8(v.nature.bits())?;
                self.len(v.edges.len())?;
                for d in &v.edges {
                    self.directed(Some(*d))?;
                }
            }
            ViewVertex::T(v) => {
                self.w.write_u8(1)?;
                self.u32(v.front.0)?;
                self.u32(v.back.0)?;
                for d in [v.front_edge_a, v.front_edge_b, v.back_edge_a, v.back_edge_b] {
                    self.directed(d)?;
                }
            }
        }
        Ok(())
    }

    fn directed(&mut self, d: Option<DirectedViewEdge>) -> Result<()> {
        self.opt(d.map(|d| d.edge.0))?;
        self.w.write_u8(u8::from(d.is_some_and(|d| d.incoming)))?;
        Ok(())
    }

    fn face(&mut self, f: Option<FaceRef>) -> Result<()> {
        match f {
            Some(f) => {
                self.u32(f.shape.0)?;
                self.u32(f.face.0)
            }
            None => self.u32(NONE),
        }
    }

    fn bbox(&mut self, b: &Aabb3) -> Result<()> {
        self.point(&b.min)?;
        self.point(&b.max)
    }

    fn point(&mut self, p: &Point3) -> Result<()> {
        self.vector(&p.coords)
    }

    fn vector(&mut self, v: &Vec3) -> Result<()> {
        for c in v.iter() {
            if self.float_vectors {
                self.w.write_f32::<B>(*c as f32)?;
            } else {
                self.w.write_f64::<B>(*c)?;
            }
        }
        Ok(())
    }

    fn ids(&mut self, ids: impl ExactSizeIterator<Item = u32>) -> Result<()> {
        self.len(ids.len())?;
        for id in ids {
            self.u32(id)?;
        }
        Ok(())
    }

    fn opt(&mut self, id: Option<u32>) -> Result<()> {
        self.u32(id.unwrap_or(NONE))
    }

    fn len(&mut self, n: usize) -> Result<()> {
        let n = u32::try_from(n)
            .map_err(|_| ViewMapError::Corrupt(format!("{n} elements do not fit the format")))?;
        self.u32(n)
    }

    fn u32(&mut self, x: u32) -> Result<()> {
        self.w.write_u32::<B>(x)?;
        Ok(())
    }

    fn string(&mut self, s: &str) -> Result<()> {
        self.len(s.len())?;
        self.w.write_all(s.as_bytes())?;
        Ok(())
    }
}

// ===============================================================================================
// ===== Reading
// ===============================================================================================

struct Decoder<R, B> {
    r: R,
    float_vectors: bool,
    no_occluders: bool,
    _order: PhantomData<B>,
}

impl<R: Read, B: ByteOrder> Decoder<R, B> {
    fn new(r: R) -> Self {
        Self {
            r,
            float_vectors: false,
            no_occluders: false,
            _order: PhantomData,
        }
    }

    fn view_map(mut self) -> Result<ViewMap> {
        let len = self.r.read_u32::<B>()? as usize;
        if len != MAGIC.len() {
            return Err(ViewMapError::BadMagic);
        }
        let mut magic = [0u8; 4];
        self.r.read_exact(&mut magic)?;
        if magic != MAGIC.as_bytes() {
            return Err(ViewMapError::BadMagic);
        }
        let version = self.string()?;
        if version != VERSION {
            return Err(ViewMapError::UnsupportedVersion(version));
        }
        let flags = self.r.read_u8()?;
        self.float_vectors = flags & FLAG_FLOAT_VECTORS != 0;
        self.no_occluders = flags & FLAG_NO_OCCLUDERS != 0;

        let mut vm = ViewMap::new();
        let n = self.len()?;
        vm.model_names = capped(n);
        for _ in 0..n {
            vm.model_names.push(self.string()?);
        }
        let mut camera = CameraSnapshot::default();
        for c in camera.position.iter_mut().chain(&mut camera.orientation) {
            *c = self.r.read_f32::<B>()?;
        }
        vm.camera = camera;
        vm.scene_bbox = self.bbox()?;

        let n = self.len()?;
        vm.shapes = capped(n);
        for _ in 0..n {
            vm.shapes.push(self.shape()?);
        }
        let n = self.len()?;
        vm.fedges = capped(n);
        for i in 0..n {
            vm.fedges.push(self.fedge(FEdgeId(i as u32))?);
        }
        let n = self.len()?;
        vm.svertices = capped(n);
        for i in 0..n {
            vm.svertices.push(self.svertex(SVertexId(i as u32))?);
        }
        let n = self.len()?;
        vm.view_edges = capped(n);
        for i in 0..n {
            vm.view_edges.push(self.view_edge(ViewEdgeId(i as u32))?);
        }
        let n = self.len()?;
        vm.view_vertices = capped(n);
        for i in 0..n {
            vm.view_vertices.push(self.view_vertex(ViewVertexId(i as u32))?);
        }

        let n = self.len()?;
        for _ in 0..n {
            let id = ShapeId(self.r.read_u32::<B>()?);
            let slot = self.len()?;
            match vm.shapes.get(slot) {
                Some(s) if s.sshape.id == id => {
                    vm.shape_index.insert(id, slot);
                }
                _ => return Err(corrupt(format!("shape table maps {id:?} to slot {slot}"))),
            }
        }
        if vm.shape_index.len() != vm.shapes.len() {
            return Err(corrupt("shape table does not cover every view shape"));
        }
        validate(&vm)?;
        Ok(vm)
    }

    fn shape(&mut self) -> Result<ViewShape> {
        let id = ShapeId(self.r.read_u32::<B>()?);
        let name = self.string()?;
        let bbox = self.bbox()?;
        let svertices = self.ids(SVertexId)?;
        let fedges = self.ids(FEdgeId)?;
        let view_edges = self.ids(ViewEdgeId)?;
        let view_vertices = self.ids(ViewVertexId)?;
        Ok(ViewShape {
            sshape: SShape {
                id,
                name,
                bbox,
                svertices,
                fedges,
            },
            view_edges,
            view_vertices,
        })
    }

    fn fedge(&mut self, id: FEdgeId) -> Result<FEdge> {
        let shape = ShapeId(self.r.read_u32::<B>()?);
        let a = SVertexId(self.r.read_u32::<B>()?);
        let b = SVertexId(self.r.read_u32::<B>()?);
        let nature = self.nature()?;
        let face_a = self.face()?;
        let face_b = self.face()?;
        let next = self.opt()?.map(FEdgeId);
        let prev = self.opt()?.map(FEdgeId);
        let view_edge = self.opt()?.map(ViewEdgeId);
        let qi = self.r.read_u32::<B>()?;
        let occludee = match self.face()? {
            Some(face) => Some(Occludee {
                face,
                point: self.point()?,
            }),
            None => None,
        };
        let geometry = match self.r.read_u8()? {
            0 => {
                let normal_a = self.vector()?;
                let normal_b = if self.flag()? { Some(self.vector()?) } else { None };
                let material_a = self.r.read_u32::<B>()?;
                let material_b = if self.flag()? {
                    Some(self.r.read_u32::<B>()?)
                } else {
                    None
                };
                FEdgeGeometry::Sharp {
                    normal_a,
                    normal_b,
                    material_a,
                    material_b,
                }
            }
            1 => FEdgeGeometry::Smooth {
                normal: self.vector()?,
                material: self.r.read_u32::<B>()?,
            },
            tag => return Err(corrupt(format!("feature edge {id:?} has geometry tag {tag}"))),
        };
        Ok(FEdge {
            id,
            shape,
            a,
            b,
            nature,
            face_a,
            face_b,
            next,
            prev,
            view_edge,
            qi,
            occludee,
            geometry,
        })
    }

    fn svertex(&mut self, id: SVertexId) -> Result<SVertex> {
        let shape = ShapeId(self.r.read_u32::<B>()?);
        let point_3d = self.point()?;
        let point_2d = self.point()?;
        let n = self.len()?;
        let mut normals = capped(n);
        for _ in 0..n {
            normals.push(self.vector()?);
        }
        let fedges = self.ids(FEdgeId)?;
        let view_vertex = self.opt()?.map(ViewVertexId);
        Ok(SVertex {
            id,
            shape,
            point_3d,
            point_2d,
            normals,
            fedges,
            view_vertex,
        })
    }

    fn view_edge(&mut self, id: ViewEdgeId) -> Result<ViewEdge> {
        let shape = ShapeId(self.r.read_u32::<B>()?);
        let nature = self.nature()?;
        let qi = self.r.read_u32::<B>()?;
        let fedge_a = FEdgeId(self.r.read_u32::<B>()?);
        let fedge_b = FEdgeId(self.r.read_u32::<B>()?);
        let a = ViewVertexId(self.r.read_u32::<B>()?);
        let b = ViewVertexId(self.r.read_u32::<B>()?);
        let occluders = if self.no_occluders {
            Vec::new()
        } else {
            self.ids(ShapeId)?
        };
        let occludee = self.opt()?.map(ShapeId);
        let in_image = self.flag()?;
        Ok(ViewEdge {
            id,
            shape,
            nature,
            qi,
            fedge_a,
            fedge_b,
            a,
            b,
            occluders,
            occludee,
            in_image,
        })
    }

    fn view_vertex(&mut self, id: ViewVertexId) -> Result<ViewVertex> {
        match self.r.read_u8()? {
            0 => {
                let svertex = SVertexId(self.r.read_u32::<B>()?);
                let bits = self.r.read_u8()?;
                let nature = VertexNature::from_bits(bits)
                    .ok_or_else(|| corrupt(format!("view vertex {id:?} has nature {bits:#x}")))?;
                let n = self.len()?;
                let mut edges = capped(n);
                for _ in 0..n {
                    let d = self
                        .directed()?
                        .ok_or_else(|| corrupt(format!("view vertex {id:?} lists an empty edge")))?;
                    edges.push(d);
                }
                Ok(ViewVertex::NonT(NonTVertex {
                    id,
                    svertex,
                    nature,
                    edges,
                }))
            }
            1 => Ok(ViewVertex::T(TVertex {
                id,
                front: SVertexId(self.r.read_u32::<B>()?),
                back: SVertexId(self.r.read_u32::<B>()?),
                front_edge_a: self.directed()?,
                front_edge_b: self.directed()?,
                back_edge_a: self.directed()?,
                back_edge_b: self.directed()?,
            })),
            tag => Err(corrupt(format!("view vertex {id:?} has kind tag {tag}"))),
        }
    }

    fn directed(&mut self) -> Result<Option<DirectedViewEdge>> {
        let edge = self.opt()?;
        let incoming = self.flag()?;
        Ok(edge.map(|e| DirectedViewEdge {
            edge: ViewEdgeId(e),
            incoming,
        }))
    }

    fn nature(&mut self) -> Result<Nature> {
        let bits = self.r.read_u16::<B>()?;
        Nature::from_bits(bits).ok_or_else(|| corrupt(format!("unknown nature bits {bits:#x}")))
    }

    fn face(&mut self) -> Result<Option<FaceRef>> {
        let shape = self.r.read_u32::<B>()?;
        if shape == NONE {
            return Ok(None);
        }
        let face = self.r.read_u32::<B>()?;
        Ok(Some(FaceRef {
            shape: ShapeId(shape),
            face: FaceId(face),
        }))
    }

    fn bbox(&mut self) -> Result<Aabb3> {
        Ok(Aabb3::new(self.point()?, self.point()?))
    }

    fn point(&mut self) -> Result<Point3> {
        Ok(Point3::from(self.vector()?))
    }

    fn vector(&mut self) -> Result<Vec3> {
        let mut v = Vec3::zeros();
        for c in v.iter_mut() {
            *c = if self.float_vectors {
                f64::from(self.r.read_f32::<B>()?)
            } else {
                self.r.read_f64::<B>()?
            };
        }
        Ok(v)
    }

    fn ids<T>(&mut self, wrap: impl Fn(u32) -> T) -> Result<Vec<T>> {
        let n = self.len()?;
        let mut out = capped(n);
        for _ in 0..n {
            out.push(wrap(self.r.read_u32::<B>()?));
        }
        Ok(out)
    }

    fn opt(&mut self) -> Result<Option<u32>> {
        let x = self.r.read_u32::<B>()?;
        Ok((x != NONE).then_some(x))
    }

    fn flag(&mut self) -> Result<bool> {
        match self.r.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            x => Err(corrupt(format!("boolean byte {x}"))),
        }
    }

    fn len(&mut self) -> Result<usize> {
        Ok(self.r.read_u32::<B>()? as usize)
    }

    fn string(&mut self) -> Result<String> {
        let n = self.len()?;
        if n > MAX_STRING {
            return Err(corrupt(format!("string of {n} bytes")));
        }
        let mut bytes = vec![0; n];
        self.r.read_exact(&mut bytes)?;
        String::from_utf8(bytes).map_err(|e| corrupt(e.to_string()))
    }
}

fn capped<T>(n: usize) -> Vec<T> {
    Vec::with_capacity(n.min(MAX_PREALLOC))
}

fn corrupt(msg: impl Into<String>) -> ViewMapError {
    ViewMapError::Corrupt(msg.into())
}

/// Check that every stored index refers to an existing element.
fn validate(vm: &ViewMap) -> Result<()> {
    let nsv = vm.svertices.len();
    let nfe = vm.fedges.len();
    let nve = vm.view_edges.len();
    let nvv = vm.view_vertices.len();
    let check = |what: &str, index: usize, len: usize| {
        if index < len {
            Ok(())
        } else {
            Err(corrupt(format!("{what} index {index} out of range ({len})")))
        }
    };

    for s in &vm.shapes {
        for id in &s.sshape.svertices {
            check("feature vertex", id.index(), nsv)?;
        }
        for id in &s.sshape.fedges {
            check("feature edge", id.index(), nfe)?;
        }
        for id in &s.view_edges {
            check("view edge", id.index(), nve)?;
        }
        for id in &s.view_vertices {
            check("view vertex", id.index(), nvv)?;
        }
    }
    for fe in &vm.fedges {
        check("feature vertex", fe.a.index(), nsv)?;
        check("feature vertex", fe.b.index(), nsv)?;
        for id in fe.next.iter().chain(&fe.prev) {
            check("feature edge", id.index(), nfe)?;
        }
        if let Some(ve) = fe.view_edge {
            check("view edge", ve.index(), nve)?;
        }
    }
    for sv in &vm.svertices {
        for id in &sv.fedges {
            check("feature edge", id.index(), nfe)?;
        }
        if let Some(vv) = sv.view_vertex {
            check("view vertex", vv.index(), nvv)?;
        }
    }
    for ve in &vm.view_edges {
        check("feature edge", ve.fedge_a.index(), nfe)?;
        check("feature edge", ve.fedge_b.index(), nfe)?;
        check("view vertex", ve.a.index(), nvv)?;
        check("view vertex", ve.b.index(), nvv)?;
    }
    for vv in &vm.view_vertices {
        match vv {
            ViewVertex::NonT(v) => check("feature vertex", v.svertex.index(), nsv)?,
            ViewVertex::T(v) => {
                check("feature vertex", v.front.index(), nsv)?;
                check("feature vertex", v.back.index(), nsv)?;
            }
        }
        for d in vv.edges() {
            check("view edge", d.edge.index(), nve)?;
        }
    }
    Ok(())
}
