//! Cusps of smooth silhouettes.
//!
//! Along a smooth silhouette the surface normal, the line direction and
//! the line of sight are nearly orthogonal. The sign of
//! `(AB × n) · v` tells on which side the visible surface lies; where it
//! flips, the silhouette folds back on itself in the image.

use vmap_math::Camera;
use vmap_winged::Nature;

use crate::silhouette::{FEdgeGeometry, FEdgeId};
use crate::view_map::ViewMap;
use crate::{VertexNature, ViewEdgeId};

/// Dead band around zero: the sign must move past it to count as a flip.
const HYSTERESIS: f64 = 0.1;

/// Insert a cusp vertex wherever a smooth silhouette changes side.
/// Returns the number of cusps added.
pub(crate) fn insert_cusps(vm: &mut ViewMap, camera: &Camera) -> usize {
    let mut added = 0;
    for i in 0..vm.view_edges.len() {
        let id = ViewEdgeId(i as u32);
        if !vm.view_edges[i].nature.contains(Nature::SILHOUETTE) {
            continue;
        }
        let chain: Vec<FEdgeId> = vm.chain(id).collect();
        if !chain.iter().all(|&f| vm.fedge(f).is_smooth()) {
            continue;
        }

        let mut side: Option<bool> = None;
        for (k, &f) in chain.iter().enumerate() {
            let fe = vm.fedge(f);
            let FEdgeGeometry::Smooth { normal, .. } = fe.geometry else {
                continue;
            };
            let a = vm.svertex(fe.a).point_3d;
            let b = vm.svertex(fe.b).point_3d;
            let Some(ab) = vmap_math::try_normalize(&(b - a)) else {
                continue;
            };
            let Some(v) = camera.direction_to_viewer(&nalgebra::center(&a, &b)) else {
                continue;
            };
            let s = ab.cross(&normal).dot(&v);
            let current = if s > HYSTERESIS {
                true
            } else if s < -HYSTERESIS {
                false
            } else {
                continue;
            };
            if side.is_some_and(|prev| prev != current) && k > 0 {
                let sv = fe.a;
                if vm.svertex(sv).view_vertex.is_none() {
                    vm.add_non_t_vertex(sv, VertexNature::CUSP);
                    added += 1;
                }
            }
            side = Some(current);
        }
    }
    added
}
