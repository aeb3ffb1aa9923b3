//! Per-node force kernel
//!
//! Each invocation reads the current position buffer and writes exactly one
//! slot of the next buffer, so a dispatch is a data-parallel map over node
//! indices with no write hazards. The WGSL kernel in `gpu::shaders` is the same
//! algorithm; this module is the CPU rendition, batched into rayon tasks of
//! `workgroup_size` nodes.
//!
//! Forces:
//!
//! - **Repulsion**: every other node pushes with `1/r²`, scaled by
//!   `repulsion_scale`. O(n²) per step with no spatial acceleration.
//! - **Attraction**: every neighbor pulls with `r²`.
//! - **Clamp**: the summed force is clamped per axis to `±force_clamp`.

use rayon::prelude::*;

use crate::config::{
    DEFAULT_FORCE_CLAMP, DEFAULT_MIN_DISTANCE, DEFAULT_REPULSION_SCALE, positive_finite,
};
use crate::error::Result;
use crate::graph::{AdjacencyRange, AttachmentTree};
use crate::state::Vec2;

/// Constants of the force model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceParams {
    /// Multiplier on inverse-square repulsion
    pub repulsion_scale: f32,
    /// Per-axis bound on the applied force
    pub force_clamp: f32,
    /// Lower bound on the repulsion distance
    pub min_distance: f32,
}

impl Default for ForceParams {
    fn default() -> Self {
        Self {
            repulsion_scale: DEFAULT_REPULSION_SCALE,
            force_clamp: DEFAULT_FORCE_CLAMP,
            min_distance: DEFAULT_MIN_DISTANCE,
        }
    }
}

impl ForceParams {
    /// Every constant must be positive and finite; `f32::clamp` panics on a
    /// negative or NaN bound.
    pub fn validate(&self) -> Result<()> {
        positive_finite("repulsion scale", self.repulsion_scale)?;
        positive_finite("force clamp", self.force_clamp)?;
        positive_finite("minimum distance", self.min_distance)?;
        Ok(())
    }
}

/// Number of workgroups needed to cover `node_count` invocations
pub fn workgroup_count(node_count: usize, workgroup_size: u32) -> u32 {
    (node_count as u32).div_ceil(workgroup_size.max(1))
}

/// Clamped force on node `idx` computed from `read`.
///
/// Self-interaction is skipped. Repulsion distance is floored at
/// `min_distance`; a zero-length attraction vector contributes nothing.
pub fn node_force(
    idx: usize,
    read: &[Vec2],
    adjacency: &[AdjacencyRange],
    neighbors: &[u32],
    params: &ForceParams,
) -> Vec2 {
    let p = read[idx];
    let mut force = [0.0f32, 0.0f32];

    for (i, q) in read.iter().enumerate() {
        if i == idx {
            continue;
        }
        let d = [p[0] - q[0], p[1] - q[1]];
        let len = length(d).max(params.min_distance);
        let scale = params.repulsion_scale / (len * len * len);
        force[0] += d[0] * scale;
        force[1] += d[1] * scale;
    }

    for &nb in &neighbors[adjacency[idx].as_range()] {
        let q = read[nb as usize];
        let d = [q[0] - p[0], q[1] - p[1]];
        // normalize(d) * |d|² == d * |d|
        let len = length(d);
        force[0] += d[0] * len;
        force[1] += d[1] * len;
    }

    let c = params.force_clamp;
    [force[0].clamp(-c, c), force[1].clamp(-c, c)]
}

/// New position for node `idx`, or `None` for padding invocations past the end
pub fn step_node(
    idx: usize,
    read: &[Vec2],
    adjacency: &[AdjacencyRange],
    neighbors: &[u32],
    params: &ForceParams,
) -> Option<Vec2> {
    if idx >= read.len() {
        return None;
    }
    let f = node_force(idx, read, adjacency, neighbors, params);
    let p = read[idx];
    Some([p[0] + f[0], p[1] + f[1]])
}

/// Run one step over all nodes: read `read`, write every slot of `write`.
///
/// `write` is split into disjoint chunks of `workgroup_size`, one rayon task
/// per chunk.
pub fn dispatch(
    read: &[Vec2],
    write: &mut [Vec2],
    tree: &AttachmentTree,
    params: &ForceParams,
    workgroup_size: u32,
) {
    assert_eq!(read.len(), write.len(), "position buffers differ in size");
    let group = workgroup_size.max(1) as usize;
    let adjacency = tree.adjacency();
    let neighbors = tree.neighbors();

    write
        .par_chunks_mut(group)
        .enumerate()
        .for_each(|(workgroup, slots)| {
            let base = workgroup * group;
            for (local, slot) in slots.iter_mut().enumerate() {
                if let Some(p) = step_node(base + local, read, adjacency, neighbors, params) {
                    *slot = p;
                }
            }
        });
}

fn length(v: Vec2) -> f32 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LayoutError;
    use crate::state::random_positions;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn tree(n: usize, seed: u64) -> AttachmentTree {
        AttachmentTree::generate(n, &mut ChaCha8Rng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn test_params_validation() {
        assert!(ForceParams::default().validate().is_ok());

        let negative_clamp = ForceParams {
            force_clamp: -0.005,
            ..ForceParams::default()
        };
        assert!(matches!(
            negative_clamp.validate(),
            Err(LayoutError::Configuration(_))
        ));

        let nan_scale = ForceParams {
            repulsion_scale: f32::NAN,
            ..ForceParams::default()
        };
        assert!(nan_scale.validate().is_err());

        let zero_distance = ForceParams {
            min_distance: 0.0,
            ..ForceParams::default()
        };
        assert!(zero_distance.validate().is_err());
    }

    #[test]
    fn test_workgroup_count() {
        assert_eq!(workgroup_count(1000, 256), 4);
        assert_eq!(workgroup_count(256, 256), 1);
        assert_eq!(workgroup_count(257, 256), 2);
        assert_eq!(workgroup_count(1, 256), 1);
    }

    #[test]
    fn test_single_node_has_no_force() {
        let t = tree(1, 0);
        let read = vec![[0.3, -0.2]];
        let f = node_force(0, &read, t.adjacency(), t.neighbors(), &ForceParams::default());
        assert_eq!(f, [0.0, 0.0]);
    }

    #[test]
    fn test_lone_node_does_not_move() {
        let t = tree(1, 0);
        let read = vec![[0.1, 0.1]];
        let next = step_node(0, &read, t.adjacency(), t.neighbors(), &ForceParams::default());
        assert_eq!(next, Some([0.1, 0.1]));
    }

    #[test]
    fn test_two_nodes_attract_symmetrically() {
        let t = tree(2, 0);
        let read = vec![[-0.1, 0.0], [0.1, 0.0]];
        let params = ForceParams::default();
        let f0 = node_force(0, &read, t.adjacency(), t.neighbors(), &params);
        let f1 = node_force(1, &read, t.adjacency(), t.neighbors(), &params);

        // Attraction d*|d| = 0.2 * 0.2 = 0.04 dominates 1e-7/0.04 repulsion,
        // then clamps to 0.005
        assert_eq!(f0, [0.005, 0.0]);
        assert_eq!(f1, [-0.005, 0.0]);
    }

    #[test]
    fn test_unclamped_two_node_force_matches_formula() {
        let t = tree(2, 0);
        let read = vec![[0.0, 0.0], [0.01, 0.0]];
        let params = ForceParams {
            force_clamp: 1.0,
            ..ForceParams::default()
        };
        let f0 = node_force(0, &read, t.adjacency(), t.neighbors(), &params);
        let r: f32 = 0.01;
        let expected = r * r - params.repulsion_scale / (r * r);
        assert!((f0[0] - expected).abs() < 1e-6, "{} vs {}", f0[0], expected);
        assert_eq!(f0[1], 0.0);
    }

    #[test]
    fn test_repulsion_pushes_apart() {
        // Two nodes with no edge between them
        let t = tree(1, 0);
        let adjacency = vec![AdjacencyRange::new(0, 0), AdjacencyRange::new(0, 0)];
        let read = vec![[0.0, 0.0], [0.1, 0.0]];
        let params = ForceParams {
            repulsion_scale: 1e-4,
            force_clamp: 1.0,
            ..ForceParams::default()
        };
        let f0 = node_force(0, &read, &adjacency, t.neighbors(), &params);
        assert!(f0[0] < 0.0, "node 0 should be pushed left: {:?}", f0);
        assert!((f0[0] + 1e-4 / 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_coincident_nodes_stay_finite() {
        let t = tree(2, 0);
        let read = vec![[0.2, 0.2], [0.2, 0.2]];
        let params = ForceParams::default();
        let f0 = node_force(0, &read, t.adjacency(), t.neighbors(), &params);
        assert!(f0[0].is_finite() && f0[1].is_finite());
        assert_eq!(f0, [0.0, 0.0]);
    }

    #[test]
    fn test_out_of_range_index_is_noop() {
        let t = tree(3, 0);
        let read = vec![[0.0, 0.0]; 3];
        assert_eq!(
            step_node(3, &read, t.adjacency(), t.neighbors(), &ForceParams::default()),
            None
        );
    }

    #[test]
    fn test_force_clamp_holds_for_every_node() {
        let t = tree(300, 8);
        let read = random_positions(300, &mut ChaCha8Rng::seed_from_u64(8));
        let params = ForceParams::default();
        for idx in 0..read.len() {
            let f = node_force(idx, &read, t.adjacency(), t.neighbors(), &params);
            assert!(f[0].abs() <= params.force_clamp);
            assert!(f[1].abs() <= params.force_clamp);
        }
    }

    #[test]
    fn test_dispatch_matches_serial_step() {
        let t = tree(129, 4);
        let read = random_positions(129, &mut ChaCha8Rng::seed_from_u64(4));
        let params = ForceParams::default();

        let mut write = vec![[0.0, 0.0]; 129];
        // Workgroup size that leaves a partial last group
        dispatch(&read, &mut write, &t, &params, 32);

        for idx in 0..read.len() {
            let expected = step_node(idx, &read, t.adjacency(), t.neighbors(), &params).unwrap();
            assert_eq!(write[idx], expected, "node {idx}");
        }
    }

    #[test]
    fn test_dispatch_does_not_touch_read_buffer() {
        let t = tree(10, 2);
        let read = random_positions(10, &mut ChaCha8Rng::seed_from_u64(2));
        let before = read.clone();
        let mut write = vec![[0.0, 0.0]; 10];
        dispatch(&read, &mut write, &t, &ForceParams::default(), 256);
        assert_eq!(read, before);
        assert_ne!(write, vec![[0.0, 0.0]; 10]);
    }
}
