//! Scene owner and view-map cache.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use fxhash::FxHasher;
use log::{debug, info};
use vmap_features::FeatureEdgeDetector;
use vmap_grid::SpatialGrid;
use vmap_math::{scene_epsilon, Camera, CancelToken};
use vmap_winged::{TriangleMesh, WingedEdgeMesh};

use crate::{Result, ViewMap, ViewMapBuilder, ViewMapConfig};

/// Owns the scene and its spatial grid, runs feature detection and view
/// map construction, and keeps the last view map.
///
/// The cache is keyed on a hash of the mesh geometry, the face
/// materials and smooth flags, the camera matrices and viewport, and the
/// configuration. While caching is enabled, calling
/// [`Controller::compute_view_map`] again with nothing changed returns
/// the same [`Arc`].
#[derive(Debug, Default)]
pub struct Controller {
    config: ViewMapConfig,
    mesh: WingedEdgeMesh,
    grid: SpatialGrid,
    cache: Option<(u64, Arc<ViewMap>)>,
}

impl Controller {
    /// Controller with an empty scene.
    pub fn new(config: ViewMapConfig) -> Self {
        Self {
            config: config.sanitized(),
            ..Self::default()
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &ViewMapConfig {
        &self.config
    }

    /// Replace the configuration. The grid is rebuilt when its density
    /// changes.
    pub fn set_config(&mut self, config: ViewMapConfig) {
        let config = config.sanitized();
        let regrid = config.grid_density != self.config.grid_density;
        self.config = config;
        if regrid {
            self.grid = SpatialGrid::from_mesh(&self.mesh, self.config.grid_density);
        }
        if !self.config.cache {
            self.cache = None;
        }
    }

    /// Replace the scene and rebuild its grid.
    pub fn load_mesh(&mut self, mesh: WingedEdgeMesh) {
        self.grid = SpatialGrid::from_mesh(&mesh, self.config.grid_density);
        debug!(
            "loaded {} shapes, {} faces, {} grid occluders",
            mesh.shapes.len(),
            mesh.num_faces(),
            self.grid.occluders().len()
        );
        self.mesh = mesh;
    }

    /// Replace the scene with one shape per triangle mesh.
    pub fn load_triangle_meshes(&mut self, meshes: &[TriangleMesh]) -> Result<()> {
        let mesh = WingedEdgeMesh::from_triangle_meshes(meshes)?;
        self.load_mesh(mesh);
        Ok(())
    }

    /// The scene.
    pub fn mesh(&self) -> &WingedEdgeMesh {
        &self.mesh
    }

    /// Spatial grid over the scene triangles.
    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Drop the cached view map.
    pub fn clear_cache(&mut self) {
        self.cache = None;
    }

    /// Hash of everything a view map of the scene seen through `camera`
    /// depends on.
    pub fn scene_hash(&self, camera: &Camera) -> u64 {
        let mut h = FxHasher::default();
        self.mesh.shapes.len().hash(&mut h);
        for shape in &self.mesh.shapes {
            shape.vertices.len().hash(&mut h);
            for v in &shape.vertices {
                for c in v.position.iter() {
                    c.to_bits().hash(&mut h);
                }
            }
            shape.faces.len().hash(&mut h);
            for f in &shape.faces {
                for v in f.vertices {
                    v.0.hash(&mut h);
                }
                f.material.hash(&mut h);
                f.smooth.hash(&mut h);
            }
        }
        for m in [camera.model_view(), camera.projection()] {
            for c in m.iter() {
                c.to_bits().hash(&mut h);
            }
        }
        let vp = camera.viewport();
        [vp.x, vp.y, vp.width, vp.height].hash(&mut h);
        camera.is_orthographic().hash(&mut h);
        // Every config field is plain data, so its JSON form is a stable key.
        serde_json::to_string(&self.config)
            .unwrap_or_default()
            .hash(&mut h);
        h.finish()
    }

    /// View map of the scene seen through `camera`.
    ///
    /// Returns the cached map when caching is enabled and the scene hash
    /// is unchanged. Returns `None` if `token` is cancelled, leaving the
    /// cache as it was.
    pub fn compute_view_map(&mut self, camera: &Camera, token: &CancelToken) -> Option<Arc<ViewMap>> {
        let hash = self.scene_hash(camera);
        if self.config.cache {
            if let Some((cached, vm)) = &self.cache {
                if *cached == hash {
                    debug!("view map cache hit ({hash:016x})");
                    return Some(Arc::clone(vm));
                }
            }
        }

        let mut detector = FeatureEdgeDetector::new(self.config.features.clone());
        detector.set_camera(camera);
        detector.process_shapes(&mut self.mesh, token)?;

        let mut builder = ViewMapBuilder::from_config(camera.clone(), &self.config);
        builder.set_epsilon(scene_epsilon(self.mesh.min_edge_size()));
        let vm = builder.build_view_map(
            &self.mesh,
            &self.grid,
            self.mesh.bbox(),
            self.mesh.num_faces(),
            token,
        )?;

        let stats = vm.stats();
        info!(
            "view map: {} view edges ({} visible), {} T-vertices, {} non-T vertices",
            stats.view_edges, stats.visible_view_edges, stats.t_vertices, stats.non_t_vertices
        );
        let vm = Arc::new(vm);
        if self.config.cache {
            self.cache = Some((hash, Arc::clone(&vm)));
        }
        Some(vm)
    }
}
