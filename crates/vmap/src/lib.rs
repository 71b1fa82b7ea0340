#![warn(missing_docs)]

//! View-map construction for line drawing.
//!
//! Given a winged-edge mesh whose edges were flagged by
//! [`vmap_features::FeatureEdgeDetector`] and a camera, this crate builds
//! the view map of the scene:
//!
//! - **Feature chains**: flagged edges and in-face smooth lines linked
//!   into [`FEdge`] chains between [`SVertex`] feature vertices
//! - **View edges**: maximal chains of identical nature and visibility,
//!   ending at [`ViewVertex`] junctions, cusps and T-vertices
//! - **Visibility**: quantitative invisibility (the number of surfaces
//!   hiding an edge), occluder and occludee shapes, by one of seven
//!   ray-casting [`VisibilityAlgorithm`]s
//!
//! A [`Controller`] ties detection and construction together and caches
//! the last view map; [`io`] saves and loads view maps in a compact
//! binary format.
//!
//! # Example
//!
//! ```ignore
//! use vmap::{Controller, ViewMapConfig};
//! use vmap_math::{Camera, CancelToken};
//! use vmap_winged::primitives;
//!
//! let mut controller = Controller::new(ViewMapConfig::default());
//! controller.load_triangle_meshes(&[primitives::cube(1.0)])?;
//! let camera: Camera = /* ... */;
//! let view_map = controller.compute_view_map(&camera, &CancelToken::new()).unwrap();
//!
//! for edge in view_map.view_edges().iter().filter(|e| e.is_visible()) {
//!     println!("{:?}: {:?}", edge.id, edge.nature);
//! }
//! ```

mod builder;
mod cache;
mod config;
mod error;
pub mod io;
mod silhouette;
mod view_map;
mod visibility;

#[cfg(test)]
mod fixtures;

pub use builder::ViewMapBuilder;
pub use cache::Controller;
pub use config::ViewMapConfig;
pub use error::{Result, ViewMapError};
pub use silhouette::{
    FEdge, FEdgeGeometry, FEdgeId, Occludee, SShape, SVertex, SVertexId, VertexNature,
    ViewEdgeId, ViewVertexId,
};
pub use view_map::{
    Chain, DirectedViewEdge, NonTVertex, TVertex, ViewEdge, ViewMap, ViewMapStats, ViewShape,
    ViewVertex,
};
pub use visibility::{VisibilityAlgorithm, CULLED_QI};
