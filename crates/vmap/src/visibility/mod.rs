//! Quantitative invisibility of feature edges.
//!
//! Every variant casts lines of sight from points on feature edges to
//! the viewer and counts the surfaces crossed. They differ in where the
//! samples are taken and how candidate occluders are gathered:
//!
//! | variant | candidates | samples |
//! |---|---|---|
//! | `ray_casting` | 3D grid | every feature edge |
//! | `ray_casting_fast` | 3D grid | first, middle and last edge of a view edge, majority vote |
//! | `ray_casting_very_fast` | 3D grid | middle edge of a view edge |
//! | `*_adaptive_traditional` | image grid | every feature edge, three samples where occluders are dense |
//! | `*_adaptive_cumulative` | image grid | edges of a view edge until one QI holds a majority |
//!
//! The `culled` variants drop occluders and view edges lying outside the
//! enlarged viewport.

mod ray_cast;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};
use vmap_grid::{ImageGrid, SpatialGrid};
use vmap_math::{Camera, CancelToken, Point3};
use vmap_winged::{Nature, ShapeId, WingedEdgeMesh};

use crate::silhouette::FEdgeId;
use crate::view_map::ViewMap;
use crate::ViewEdgeId;

pub(crate) use ray_cast::{Exclusion, LineOfSight, Sample};

/// QI given to view edges left out by viewport culling.
pub const CULLED_QI: u32 = 255;

/// Visibility algorithm used by a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityAlgorithm {
    /// One line of sight per feature edge through the 3D grid.
    RayCasting,
    /// Majority of three samples per view edge.
    RayCastingFast,
    /// One sample per view edge.
    RayCastingVeryFast,
    /// Adaptive per-edge sampling with viewport culling.
    RayCastingCulledAdaptiveTraditional,
    /// Adaptive per-edge sampling over an image-space grid.
    #[default]
    RayCastingAdaptiveTraditional,
    /// Per-view-edge majority with early exit and viewport culling.
    RayCastingCulledAdaptiveCumulative,
    /// Per-view-edge majority with early exit.
    RayCastingAdaptiveCumulative,
}

impl VisibilityAlgorithm {
    /// Every variant, in declaration order.
    pub const ALL: [VisibilityAlgorithm; 7] = [
        Self::RayCasting,
        Self::RayCastingFast,
        Self::RayCastingVeryFast,
        Self::RayCastingCulledAdaptiveTraditional,
        Self::RayCastingAdaptiveTraditional,
        Self::RayCastingCulledAdaptiveCumulative,
        Self::RayCastingAdaptiveCumulative,
    ];

    /// Whether occluders and edges outside the viewport are skipped.
    pub fn is_culled(self) -> bool {
        matches!(
            self,
            Self::RayCastingCulledAdaptiveTraditional | Self::RayCastingCulledAdaptiveCumulative
        )
    }

    /// Whether candidates come from the image-space grid.
    pub fn is_adaptive(self) -> bool {
        matches!(
            self,
            Self::RayCastingCulledAdaptiveTraditional
                | Self::RayCastingAdaptiveTraditional
                | Self::RayCastingCulledAdaptiveCumulative
                | Self::RayCastingAdaptiveCumulative
        )
    }

    /// Configuration name.
    pub fn name(self) -> &'static str {
        match self {
            Self::RayCasting => "ray_casting",
            Self::RayCastingFast => "ray_casting_fast",
            Self::RayCastingVeryFast => "ray_casting_very_fast",
            Self::RayCastingCulledAdaptiveTraditional => "ray_casting_culled_adaptive_traditional",
            Self::RayCastingAdaptiveTraditional => "ray_casting_adaptive_traditional",
            Self::RayCastingCulledAdaptiveCumulative => "ray_casting_culled_adaptive_cumulative",
            Self::RayCastingAdaptiveCumulative => "ray_casting_adaptive_cumulative",
        }
    }
}

impl fmt::Display for VisibilityAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VisibilityAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.name() == s)
            .ok_or_else(|| format!("unknown visibility algorithm '{s}'"))
    }
}

/// Numeric settings of one visibility pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct VisibilityParams {
    pub algorithm: VisibilityAlgorithm,
    pub epsilon: f64,
    pub cull_margin: f64,
    pub adaptive_threshold: usize,
}

/// What a visibility pass leaves besides the per-edge QI.
#[derive(Debug, Clone, Default)]
pub(crate) struct VisibilityOutcome {
    /// Occluder shapes per feature edge, indexed by feature edge id.
    pub occluders: Vec<Vec<ShapeId>>,
    /// View edges outside the enlarged viewport.
    pub culled: usize,
}

/// Resolve the QI of every feature edge of `vm`, and the occludee of
/// silhouettes and borders.
///
/// Returns `None` if `token` is cancelled.
pub(crate) fn compute_visibility(
    vm: &mut ViewMap,
    mesh: &WingedEdgeMesh,
    grid: &SpatialGrid,
    camera: &Camera,
    params: &VisibilityParams,
    token: &CancelToken,
) -> Option<VisibilityOutcome> {
    let algorithm = params.algorithm;
    let image_grid = algorithm.is_adaptive().then(|| {
        let margin = algorithm.is_culled().then_some(params.cull_margin);
        ImageGrid::build(grid.occluders(), camera, margin)
    });
    let mut los = LineOfSight::new(mesh, grid, image_grid.as_ref(), camera, params.epsilon);
    let mut outcome = VisibilityOutcome {
        occluders: vec![Vec::new(); vm.fedges.len()],
        culled: 0,
    };

    for i in 0..vm.view_edges.len() {
        if token.is_cancelled() {
            return None;
        }
        let id = ViewEdgeId(i as u32);
        let chain: Vec<FEdgeId> = vm.chain(id).collect();
        if algorithm.is_culled() && !in_image(vm, camera, &chain, params.cull_margin) {
            vm.view_edges[i].in_image = false;
            for &f in &chain {
                vm.fedges[f.index()].qi = CULLED_QI;
            }
            outcome.culled += 1;
            continue;
        }
        vm.view_edges[i].in_image = true;

        match algorithm {
            VisibilityAlgorithm::RayCasting => {
                for &f in &chain {
                    let s = sample_fedge(vm, &mut los, f, 0.5);
                    assign(vm, &mut outcome, &[f], s);
                }
            }
            VisibilityAlgorithm::RayCastingCulledAdaptiveTraditional
            | VisibilityAlgorithm::RayCastingAdaptiveTraditional => {
                for &f in &chain {
                    let mid = midpoint(vm, f, 0.5);
                    let s = if los.density_at(&mid) > params.adaptive_threshold {
                        let samples: Vec<Sample> = [0.25, 0.5, 0.75]
                            .into_iter()
                            .map(|t| sample_fedge(vm, &mut los, f, t))
                            .collect();
                        median(samples)
                    } else {
                        sample_fedge(vm, &mut los, f, 0.5)
                    };
                    assign(vm, &mut outcome, &[f], s);
                }
            }
            VisibilityAlgorithm::RayCastingFast | VisibilityAlgorithm::RayCastingVeryFast => {
                let n = chain.len();
                let mut picks = if algorithm == VisibilityAlgorithm::RayCastingFast {
                    vec![n / 2, 0, n - 1]
                } else {
                    vec![n / 2]
                };
                picks.sort_unstable();
                picks.dedup();
                let samples: Vec<(usize, Sample)> = picks
                    .into_iter()
                    .map(|k| (k, sample_fedge(vm, &mut los, chain[k], 0.5)))
                    .collect();
                let s = vote(&samples, n / 2);
                assign(vm, &mut outcome, &chain, s);
            }
            VisibilityAlgorithm::RayCastingCulledAdaptiveCumulative
            | VisibilityAlgorithm::RayCastingAdaptiveCumulative => {
                let n = chain.len();
                let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
                let mut samples = Vec::new();
                for (k, &f) in chain.iter().enumerate() {
                    let s = sample_fedge(vm, &mut los, f, 0.5);
                    let count = counts.entry(s.qi).or_default();
                    *count += 1;
                    let decided = *count * 2 > n;
                    samples.push((k, s));
                    if decided {
                        break;
                    }
                }
                let s = vote(&samples, 0);
                assign(vm, &mut outcome, &chain, s);
            }
        }
        record_occludees(vm, &mut los, &chain);
    }

    debug!(
        "visibility ({algorithm}): {} view edges, {} culled",
        vm.view_edges.len(),
        outcome.culled
    );
    Some(outcome)
}

fn midpoint(vm: &ViewMap, f: FEdgeId, t: f64) -> Point3 {
    let fe = &vm.fedges[f.index()];
    let a = vm.svertices[fe.a.index()].point_3d;
    let b = vm.svertices[fe.b.index()].point_3d;
    a + (b - a) * t
}

fn sample_fedge(vm: &ViewMap, los: &mut LineOfSight<'_>, f: FEdgeId, t: f64) -> Sample {
    let fe = &vm.fedges[f.index()];
    let excl = Exclusion::for_fedge(fe, los.mesh());
    los.sample(&midpoint(vm, f, t), &excl)
}

fn assign(vm: &mut ViewMap, outcome: &mut VisibilityOutcome, fedges: &[FEdgeId], s: Sample) {
    for &f in fedges {
        vm.fedges[f.index()].qi = s.qi;
        outcome.occluders[f.index()] = s.occluders.clone();
    }
}

fn record_occludees(vm: &mut ViewMap, los: &mut LineOfSight<'_>, chain: &[FEdgeId]) {
    for &f in chain {
        let fe = &vm.fedges[f.index()];
        if !fe.nature.intersects(Nature::SILHOUETTE | Nature::BORDER) {
            continue;
        }
        let excl = Exclusion::for_fedge(fe, los.mesh());
        let p = midpoint(vm, f, 0.5);
        vm.fedges[f.index()].occludee = los.occludee(&p, &excl);
    }
}

/// Middle QI of the samples; occluders of the samples carrying it.
fn median(mut samples: Vec<Sample>) -> Sample {
    samples.sort_by_key(|s| s.qi);
    let qi = samples[samples.len() / 2].qi;
    merge(samples.iter().filter(|s| s.qi == qi), qi)
}

/// Most frequent QI. Ties go to the sample at chain position
/// `preferred`, then to the lower QI.
fn vote(samples: &[(usize, Sample)], preferred: usize) -> Sample {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for (_, s) in samples {
        *counts.entry(s.qi).or_default() += 1;
    }
    let best = counts.values().copied().max().unwrap_or(0);
    let tied: Vec<u32> = counts
        .iter()
        .filter(|&(_, &c)| c == best)
        .map(|(&qi, _)| qi)
        .collect();
    let qi = samples
        .iter()
        .find(|(k, s)| *k == preferred && tied.contains(&s.qi))
        .map(|(_, s)| s.qi)
        .or_else(|| tied.first().copied())
        .unwrap_or(0);
    merge(samples.iter().map(|(_, s)| s).filter(|s| s.qi == qi), qi)
}

fn merge<'a>(samples: impl Iterator<Item = &'a Sample>, qi: u32) -> Sample {
    let mut occluders: Vec<ShapeId> = samples.flat_map(|s| s.occluders.iter().copied()).collect();
    occluders.sort_unstable();
    occluders.dedup();
    Sample { qi, occluders }
}

/// Whether the projected chain overlaps the viewport grown by `margin`.
fn in_image(vm: &ViewMap, camera: &Camera, chain: &[FEdgeId], margin: f64) -> bool {
    let mut min = (f64::INFINITY, f64::INFINITY);
    let mut max = (f64::NEG_INFINITY, f64::NEG_INFINITY);
    for &f in chain {
        let fe = &vm.fedges[f.index()];
        for sv in [fe.a, fe.b] {
            if !camera.is_in_front(&vm.svertices[sv.index()].point_3d) {
                // Behind the eye: projection says nothing; keep the edge.
                return true;
            }
            let p = vm.point_2d(sv);
            min = (min.0.min(p.x), min.1.min(p.y));
            max = (max.0.max(p.x), max.1.max(p.y));
        }
    }
    camera.viewport().overlaps_with_margin(min, max, margin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use vmap_winged::primitives;

    fn sample(qi: u32, shapes: &[u32]) -> Sample {
        Sample {
            qi,
            occluders: shapes.iter().map(|&s| ShapeId(s)).collect(),
        }
    }

    #[test]
    fn test_names_round_trip() {
        for algo in VisibilityAlgorithm::ALL {
            assert_eq!(algo.name().parse::<VisibilityAlgorithm>(), Ok(algo));
            let json = serde_json::to_string(&algo).unwrap();
            assert_eq!(json, format!("\"{}\"", algo.name()));
        }
        assert!("ray_tracing".parse::<VisibilityAlgorithm>().is_err());
        assert_eq!(
            VisibilityAlgorithm::default(),
            VisibilityAlgorithm::RayCastingAdaptiveTraditional
        );
    }

    #[test]
    fn test_vote_majority_and_ties() {
        let s = vote(&[(0, sample(1, &[3])), (1, sample(2, &[4])), (2, sample(1, &[5]))], 1);
        assert_eq!(s, sample(1, &[3, 5]));
        // No majority: the preferred position wins.
        let s = vote(&[(0, sample(0, &[])), (1, sample(2, &[4]))], 1);
        assert_eq!(s.qi, 2);
        // Preferred position not sampled: lowest QI.
        let s = vote(&[(0, sample(3, &[])), (2, sample(1, &[]))], 1);
        assert_eq!(s.qi, 1);
    }

    #[test]
    fn test_median_of_three() {
        let s = median(vec![sample(4, &[1]), sample(0, &[]), sample(2, &[7])]);
        assert_eq!(s, sample(2, &[7]));
    }

    #[test]
    fn test_culled_variant_marks_offscreen_edges() {
        // The second quad sits far to the side, outside the image.
        let camera = fixtures::camera_at([0.0, 0.0, 10.0], [0.0, 0.0, 0.0]);
        let near = primitives::quad(0.0, 1.0);
        let mut far = primitives::quad(0.0, 1.0);
        far.translate(200.0, 0.0, 0.0);
        let vm = fixtures::build(
            &[near, far],
            &camera,
            VisibilityAlgorithm::RayCastingCulledAdaptiveCumulative,
        );
        for ve in vm.view_edges() {
            let offscreen = ve.shape == ShapeId(1);
            assert_eq!(ve.in_image, !offscreen);
            assert_eq!(ve.qi, if offscreen { CULLED_QI } else { 0 });
        }

        let vm = fixtures::build(
            &[primitives::quad(0.0, 1.0), {
                let mut far = primitives::quad(0.0, 1.0);
                far.translate(200.0, 0.0, 0.0);
                far
            }],
            &camera,
            VisibilityAlgorithm::RayCastingAdaptiveCumulative,
        );
        assert!(vm.view_edges().iter().all(|ve| ve.in_image && ve.qi == 0));
    }

    #[test]
    fn test_border_occludee_recorded() {
        // A small quad hovering above a large one: its border sees the
        // large quad behind it.
        let camera = fixtures::camera_at([0.0, 0.0, 10.0], [0.0, 0.0, 0.0]);
        let vm = fixtures::build(
            &[primitives::quad(0.0, 3.0), primitives::quad(1.0, 1.0)],
            &camera,
            VisibilityAlgorithm::RayCasting,
        );
        let front: Vec<_> = vm.fedges().iter().filter(|fe| fe.shape == ShapeId(1)).collect();
        assert!(!front.is_empty());
        for fe in front {
            let occludee = fe.occludee.expect("large quad lies behind");
            assert_eq!(occludee.face.shape, ShapeId(0));
            assert!(occludee.point.z.abs() < 1e-9);
        }
        let ve = vm.view_edges().iter().find(|ve| ve.shape == ShapeId(1)).unwrap();
        assert_eq!(ve.occludee, Some(ShapeId(0)));
    }
}
