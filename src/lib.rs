//! pingpong-layout - continuous force-directed layout of random trees.
//!
//! A preferential-attachment tree is generated once, then relaxed forever by
//! an O(N²) force kernel that reads one position buffer and writes the other.
//! The buffers swap roles every step, and each frame is drawn from the buffer
//! the kernel has just finished writing.

pub mod backend;
pub mod config;
pub mod error;
pub mod geometry;
pub mod graph;
pub mod kernel;
pub mod layout;
pub mod orchestrator;
pub mod state;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use backend::{Backend, CpuBackend, Frame};
pub use config::LayoutConfig;
pub use error::{LayoutError, Result};
pub use graph::{AdjacencyRange, AttachmentTree};
pub use kernel::ForceParams;
pub use layout::{Layout, RunSummary};
pub use orchestrator::{FrameOrchestrator, Phase, TickOutcome};
pub use state::{PingPong, PositionStore, Slot, Vec2};
