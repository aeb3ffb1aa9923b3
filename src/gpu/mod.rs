//! wgpu backend (feature `gpu`)
//!
//! The force kernel runs as a WGSL compute shader over two storage buffers
//! that swap roles every step. Drawing reads the same buffers directly, so
//! positions never leave the GPU except on explicit readback.
//!
//! # Example
//!
//! ```rust,ignore
//! use pingpong_layout::{LayoutConfig, Layout, FrameOrchestrator};
//! use pingpong_layout::gpu::GpuBackend;
//!
//! let config = LayoutConfig::with_nodes(1000).with_seed(7);
//! let layout = Layout::generate(&config)?;
//! let backend = GpuBackend::headless(&layout.tree, &layout.initial, &config)?;
//!
//! let mut orchestrator = FrameOrchestrator::new(backend);
//! orchestrator.run_for(100)?;
//! let positions = orchestrator.positions()?;
//! ```

mod backend;
mod shaders;
mod window;

pub use backend::{GpuBackend, OFFSCREEN_SIZE, RenderTarget, request_adapter, request_device};
pub use shaders::{EDGE_SHADER, FORCE_ENTRY_POINT, force_shader, node_shader};
pub use window::run_windowed;
