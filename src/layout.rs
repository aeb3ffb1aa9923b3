//! Startup: topology and initial positions from a config
//!
//! Generation runs once per process. The tree and the initial positions come
//! from one `ChaCha8Rng`, so a fixed seed reproduces both bit-for-bit.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{info, instrument};

use crate::backend::CpuBackend;
use crate::config::LayoutConfig;
use crate::error::Result;
use crate::graph::AttachmentTree;
use crate::orchestrator::FrameOrchestrator;
use crate::state::{Vec2, random_positions};

/// Generated startup state: immutable topology plus ping-slot positions
#[derive(Debug, Clone)]
pub struct Layout {
    /// Seed actually used (drawn from entropy when the config has none)
    pub seed: u64,
    /// Tree topology
    pub tree: AttachmentTree,
    /// Initial positions, uniform in `[-0.5, 0.5)²`
    pub initial: Vec<Vec2>,
}

impl Layout {
    /// Validate `config` and generate the tree and initial positions
    #[instrument(skip(config), fields(nodes = config.node_count))]
    pub fn generate(config: &LayoutConfig) -> Result<Self> {
        config.validate()?;
        let seed = config
            .seed
            .unwrap_or_else(|| rand::thread_rng().r#gen::<u64>());
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let tree = AttachmentTree::generate(config.node_count, &mut rng)?;
        let initial = random_positions(config.node_count, &mut rng);

        info!(
            seed,
            nodes = tree.node_count(),
            edges = tree.edge_count(),
            "layout generated"
        );
        Ok(Self {
            seed,
            tree,
            initial,
        })
    }

    /// Build a CPU orchestrator for this layout
    pub fn into_cpu(self, config: &LayoutConfig) -> Result<FrameOrchestrator<CpuBackend>> {
        let backend = CpuBackend::new(
            self.tree,
            self.initial,
            config.force_params(),
            config.workgroup_size,
        )?
        .with_node_mesh(config.node_radius, config.circle_segments);
        FrameOrchestrator::new(backend).with_draw_every(config.draw_every)
    }
}

/// Summary of a bounded headless run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub backend: String,
    pub seed: u64,
    pub nodes: usize,
    pub edges: usize,
    pub steps: u64,
    pub frames_drawn: u64,
    /// `[min_x, min_y, max_x, max_y]`
    pub bounds: [f32; 4],
    pub all_finite: bool,
}

impl RunSummary {
    /// Summarize final `positions`
    pub fn new(
        backend: &str,
        layout_seed: u64,
        edges: usize,
        steps: u64,
        frames_drawn: u64,
        positions: &[Vec2],
    ) -> Self {
        let all_finite = positions
            .iter()
            .all(|p| p[0].is_finite() && p[1].is_finite());
        Self {
            backend: backend.to_string(),
            seed: layout_seed,
            nodes: positions.len(),
            edges,
            steps,
            frames_drawn,
            bounds: bounds(positions),
            all_finite,
        }
    }
}

/// Axis-aligned bounding box `[min_x, min_y, max_x, max_y]`
pub fn bounds(positions: &[Vec2]) -> [f32; 4] {
    positions.iter().fold(
        [f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY],
        |b, p| [b[0].min(p[0]), b[1].min(p[1]), b[2].max(p[0]), b[3].max(p[1])],
    )
}
