//! Layout configuration surface
//!
//! All knobs recognized by the simulation live in [`LayoutConfig`]. The CLI
//! builds one from its flags; library users construct it directly and call
//! [`LayoutConfig::validate`] before handing it to a backend.

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, Result};
use crate::kernel::ForceParams;

// =============================================================================
// Default Constants
// =============================================================================

/// Default number of nodes in the generated tree
pub const DEFAULT_NODE_COUNT: usize = 1000;

/// Default number of node invocations per workgroup
pub const DEFAULT_WORKGROUP_SIZE: u32 = 256;

/// Default draw cadence (draw after every compute step)
pub const DEFAULT_DRAW_EVERY: u64 = 1;

/// Default scale applied to inverse-square repulsion
pub const DEFAULT_REPULSION_SCALE: f32 = 1e-7;

/// Default per-axis force clamp
pub const DEFAULT_FORCE_CLAMP: f32 = 0.005;

/// Default minimum distance used by repulsion (avoids singularity)
pub const DEFAULT_MIN_DISTANCE: f32 = 1e-6;

/// Default on-screen node radius in clip-space units
pub const DEFAULT_NODE_RADIUS: f32 = 1.0 / 150.0;

/// Default number of rim segments of the node circle mesh
pub const DEFAULT_CIRCLE_SEGMENTS: u32 = 8;

/// Configuration for a layout run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Number of nodes (N)
    pub node_count: usize,
    /// Invocations per workgroup / rayon batch
    pub workgroup_size: u32,
    /// Draw after every `draw_every` compute steps
    pub draw_every: u64,
    /// Repulsion scale constant
    pub repulsion_scale: f32,
    /// Per-axis force clamp magnitude
    pub force_clamp: f32,
    /// Minimum inter-node distance for repulsion
    pub min_distance: f32,
    /// Node radius in clip space
    pub node_radius: f32,
    /// Rim segments of the node circle mesh
    pub circle_segments: u32,
    /// RNG seed; `None` draws one from OS entropy
    pub seed: Option<u64>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            node_count: DEFAULT_NODE_COUNT,
            workgroup_size: DEFAULT_WORKGROUP_SIZE,
            draw_every: DEFAULT_DRAW_EVERY,
            repulsion_scale: DEFAULT_REPULSION_SCALE,
            force_clamp: DEFAULT_FORCE_CLAMP,
            min_distance: DEFAULT_MIN_DISTANCE,
            node_radius: DEFAULT_NODE_RADIUS,
            circle_segments: DEFAULT_CIRCLE_SEGMENTS,
            seed: None,
        }
    }
}

impl LayoutConfig {
    /// Create a config for `node_count` nodes with all other options defaulted
    pub fn with_nodes(node_count: usize) -> Self {
        Self {
            node_count,
            ..Self::default()
        }
    }

    /// Set the RNG seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the draw cadence
    pub fn with_draw_every(mut self, draw_every: u64) -> Self {
        self.draw_every = draw_every;
        self
    }

    /// Check every option, returning the first violation
    pub fn validate(&self) -> Result<()> {
        if self.node_count < 1 {
            return Err(LayoutError::Configuration(format!(
                "node count must be at least 1, got {}",
                self.node_count
            )));
        }
        if u32::try_from(self.node_count).is_err() {
            return Err(LayoutError::Configuration(format!(
                "node count {} does not fit in a u32 index",
                self.node_count
            )));
        }
        if self.workgroup_size == 0 {
            return Err(LayoutError::Configuration(
                "workgroup size must be positive".into(),
            ));
        }
        if self.draw_every == 0 {
            return Err(LayoutError::Configuration(
                "draw cadence must be positive".into(),
            ));
        }
        if self.circle_segments < 3 {
            return Err(LayoutError::Configuration(format!(
                "circle mesh needs at least 3 segments, got {}",
                self.circle_segments
            )));
        }
        self.force_params().validate()?;
        positive_finite("node radius", self.node_radius)?;
        Ok(())
    }

    /// Kernel parameters derived from this config
    pub fn force_params(&self) -> ForceParams {
        ForceParams {
            repulsion_scale: self.repulsion_scale,
            force_clamp: self.force_clamp,
            min_distance: self.min_distance,
        }
    }
}

pub(crate) fn positive_finite(name: &str, value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(LayoutError::Configuration(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}
