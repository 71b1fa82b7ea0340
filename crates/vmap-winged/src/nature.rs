//! Feature-line classification bits.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Geometric category of a feature edge.
    ///
    /// An edge may carry several categories at once (a cube edge seen
    /// edge-on is both `SILHOUETTE` and `CREASE`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Nature: u16 {
        /// Boundary between front- and back-facing surface.
        const SILHOUETTE = 1 << 0;
        /// Open mesh boundary (edge with a single face).
        const BORDER = 1 << 1;
        /// Sharp edge whose dihedral angle exceeds the crease threshold.
        const CREASE = 1 << 2;
        /// Maximum of the dominant principal curvature.
        const RIDGE = 1 << 3;
        /// Minimum of the dominant principal curvature.
        const VALLEY = 1 << 4;
        /// Zero of radial curvature with positive derivative.
        const SUGGESTIVE_CONTOUR = 1 << 5;
        /// Edge between faces of different materials.
        const MATERIAL_BOUNDARY = 1 << 6;
    }
}

impl Nature {
    /// Natures produced on smooth surfaces inside faces rather than on
    /// mesh edges.
    pub const SMOOTH_KINDS: [Nature; 4] = [
        Nature::SILHOUETTE,
        Nature::RIDGE,
        Nature::VALLEY,
        Nature::SUGGESTIVE_CONTOUR,
    ];

    /// Short, stable label used in logs and summaries.
    pub fn label(self) -> String {
        if self.is_empty() {
            return "none".to_string();
        }
        let names: Vec<&str> = self.iter_names().map(|(name, _)| name).collect();
        names.join("|").to_lowercase()
    }
}
