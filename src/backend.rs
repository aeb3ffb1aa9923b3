//! Compute & draw backends
//!
//! The orchestrator only needs four things from a backend: run the force
//! kernel from one slot into the other (and not return until it has
//! finished), draw the graph from a slot, read a slot back, and report the
//! node count. [`CpuBackend`] does this with rayon and records draws into a
//! [`Frame`]; `gpu::GpuBackend` does it with wgpu.

use serde::Serialize;
use tracing::trace;

use crate::config::{DEFAULT_CIRCLE_SEGMENTS, DEFAULT_NODE_RADIUS};
use crate::error::{LayoutError, Result};
use crate::geometry::circle;
use crate::graph::AttachmentTree;
use crate::kernel::{self, ForceParams};
use crate::state::{PositionStore, Slot, Vec2};

/// Parallel compute & draw backend driven by the frame orchestrator
pub trait Backend {
    /// Number of nodes the backend was built for
    fn node_count(&self) -> usize;

    /// Run the force kernel reading `read` and writing `write`.
    ///
    /// Returns only once every slot of `write` has been written.
    fn dispatch(&mut self, read: Slot, write: Slot) -> Result<()>;

    /// Draw edges as lines, then nodes as instanced circles, from `current`
    fn draw(&mut self, current: Slot) -> Result<()>;

    /// Copy the positions held in `slot` back to the host
    fn read_positions(&mut self, slot: Slot) -> Result<Vec<Vec2>>;
}

/// One recorded draw: the edge line list and node instances
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    /// Slot the frame was drawn from
    pub slot: Slot,
    /// Edge segments, one per edge in generation order
    pub lines: Vec<[Vec2; 2]>,
    /// Per-instance offset of the circle mesh, one per node
    pub node_offsets: Vec<Vec2>,
    /// Scale applied to the unit circle mesh
    pub node_radius: f32,
    /// Index count of the circle mesh submitted per instance
    pub mesh_index_count: u32,
}

/// rayon-backed backend that keeps positions in host memory
pub struct CpuBackend {
    tree: AttachmentTree,
    store: PositionStore,
    params: ForceParams,
    workgroup_size: u32,
    node_radius: f32,
    mesh_index_count: u32,
    last_frame: Option<Frame>,
    frames_drawn: u64,
}

impl CpuBackend {
    /// Create a backend for `tree` with `initial` in the ping slot
    pub fn new(
        tree: AttachmentTree,
        initial: Vec<Vec2>,
        params: ForceParams,
        workgroup_size: u32,
    ) -> Result<Self> {
        if initial.len() != tree.node_count() {
            return Err(LayoutError::Configuration(format!(
                "{} initial positions for {} nodes",
                initial.len(),
                tree.node_count()
            )));
        }
        if workgroup_size == 0 {
            return Err(LayoutError::Configuration(
                "workgroup size must be positive".into(),
            ));
        }
        params.validate()?;
        let (_, indices) = circle(DEFAULT_CIRCLE_SEGMENTS);
        Ok(Self {
            tree,
            store: PositionStore::from_initial(initial),
            params,
            workgroup_size,
            node_radius: DEFAULT_NODE_RADIUS,
            mesh_index_count: indices.len() as u32,
            last_frame: None,
            frames_drawn: 0,
        })
    }

    /// Set the node mesh (radius and rim segments)
    pub fn with_node_mesh(mut self, radius: f32, segments: u32) -> Self {
        self.node_radius = radius;
        self.mesh_index_count = circle(segments).1.len() as u32;
        self
    }

    /// Most recent frame, if any draw has happened
    pub fn last_frame(&self) -> Option<&Frame> {
        self.last_frame.as_ref()
    }

    /// Number of draws submitted so far
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    /// Topology the backend was built with
    pub fn tree(&self) -> &AttachmentTree {
        &self.tree
    }
}

impl Backend for CpuBackend {
    fn node_count(&self) -> usize {
        self.tree.node_count()
    }

    fn dispatch(&mut self, read: Slot, write: Slot) -> Result<()> {
        if read == write {
            return Err(LayoutError::Configuration(
                "kernel cannot read and write the same slot".into(),
            ));
        }
        let (src, dst) = self.store.split(read);
        kernel::dispatch(src, dst, &self.tree, &self.params, self.workgroup_size);
        trace!(?read, ?write, "cpu dispatch complete");
        Ok(())
    }

    fn draw(&mut self, current: Slot) -> Result<()> {
        let positions = self.store.get(current);
        let lines = self
            .tree
            .edges()
            .map(|(i, j)| [positions[i as usize], positions[j as usize]])
            .collect();
        self.last_frame = Some(Frame {
            slot: current,
            lines,
            node_offsets: positions.clone(),
            node_radius: self.node_radius,
            mesh_index_count: self.mesh_index_count,
        });
        self.frames_drawn += 1;
        Ok(())
    }

    fn read_positions(&mut self, slot: Slot) -> Result<Vec<Vec2>> {
        Ok(self.store.get(slot).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn backend(n: usize) -> CpuBackend {
        let tree = AttachmentTree::generate(n, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        let initial = (0..n).map(|i| [i as f32 * 0.01, 0.0]).collect();
        CpuBackend::new(tree, initial, ForceParams::default(), 4).unwrap()
    }

    #[test]
    fn test_mismatched_positions_rejected() {
        let tree = AttachmentTree::generate(3, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        let result = CpuBackend::new(tree, vec![[0.0, 0.0]], ForceParams::default(), 256);
        assert!(matches!(result, Err(LayoutError::Configuration(_))));
    }

    #[test]
    fn test_invalid_force_params_rejected() {
        let tree = AttachmentTree::generate(3, &mut ChaCha8Rng::seed_from_u64(1)).unwrap();
        let params = ForceParams {
            force_clamp: -0.005,
            ..ForceParams::default()
        };
        let result = CpuBackend::new(tree, vec![[0.0, 0.0]; 3], params, 256);
        assert!(matches!(result, Err(LayoutError::Configuration(_))));
    }

    #[test]
    fn test_same_slot_dispatch_rejected() {
        let mut b = backend(3);
        assert!(b.dispatch(Slot::Ping, Slot::Ping).is_err());
    }

    #[test]
    fn test_dispatch_writes_other_slot_only() {
        let mut b = backend(10);
        let before = b.read_positions(Slot::Ping).unwrap();
        b.dispatch(Slot::Ping, Slot::Pong).unwrap();
        assert_eq!(b.read_positions(Slot::Ping).unwrap(), before);
        assert_ne!(b.read_positions(Slot::Pong).unwrap(), vec![[0.0, 0.0]; 10]);
    }

    #[test]
    fn test_draw_records_lines_and_instances() {
        let mut b = backend(6);
        b.draw(Slot::Ping).unwrap();
        let frame = b.last_frame().unwrap();
        let positions = b.store.get(Slot::Ping);

        assert_eq!(frame.slot, Slot::Ping);
        assert_eq!(frame.lines.len(), 5);
        assert_eq!(frame.node_offsets.len(), 6);
        assert_eq!(frame.mesh_index_count, 24);
        for (line, (i, j)) in frame.lines.iter().zip(b.tree().edges()) {
            assert_eq!(line[0], positions[i as usize]);
            assert_eq!(line[1], positions[j as usize]);
        }
        assert_eq!(b.frames_drawn(), 1);
    }

    #[test]
    fn test_node_mesh_override() {
        let b = backend(2).with_node_mesh(0.02, 16);
        assert_eq!(b.node_radius, 0.02);
        assert_eq!(b.mesh_index_count, 48);
    }
}
