use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use pingpong_layout::config::{
    DEFAULT_DRAW_EVERY, DEFAULT_FORCE_CLAMP, DEFAULT_MIN_DISTANCE, DEFAULT_NODE_COUNT,
    DEFAULT_REPULSION_SCALE, DEFAULT_WORKGROUP_SIZE,
};
use pingpong_layout::{Backend, FrameOrchestrator, Layout, LayoutConfig, RunSummary};

/// Continuous force-directed layout of a random preferential-attachment tree.
#[derive(Parser)]
#[command(name = "pingpong-layout")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Animate the layout in a window until it is closed
    Run {
        #[command(flatten)]
        layout: LayoutArgs,

        /// Window width in pixels
        #[arg(long, default_value = "800")]
        width: u32,

        /// Window height in pixels
        #[arg(long, default_value = "800")]
        height: u32,
    },
    /// Run a fixed number of steps without a window and print a JSON summary
    Headless {
        #[command(flatten)]
        layout: LayoutArgs,

        /// Number of compute steps
        #[arg(long, default_value = "100")]
        steps: u64,

        /// Compute backend
        #[arg(long, value_enum, default_value = "cpu")]
        backend: BackendKind,
    },
}

/// Options shared by every subcommand
#[derive(Args, Debug)]
struct LayoutArgs {
    /// Number of nodes
    #[arg(short, long, default_value_t = DEFAULT_NODE_COUNT)]
    nodes: usize,

    /// Node invocations per workgroup
    #[arg(long, default_value_t = DEFAULT_WORKGROUP_SIZE)]
    workgroup_size: u32,

    /// Draw after every N compute steps
    #[arg(long, default_value_t = DEFAULT_DRAW_EVERY)]
    draw_every: u64,

    /// Repulsion scale constant
    #[arg(long, default_value_t = DEFAULT_REPULSION_SCALE)]
    repulsion_scale: f32,

    /// Per-axis force clamp
    #[arg(long, default_value_t = DEFAULT_FORCE_CLAMP)]
    force_clamp: f32,

    /// Minimum distance used by repulsion
    #[arg(long, default_value_t = DEFAULT_MIN_DISTANCE)]
    min_distance: f32,

    /// RNG seed (random when omitted)
    #[arg(long)]
    seed: Option<u64>,
}

impl LayoutArgs {
    fn into_config(self) -> LayoutConfig {
        LayoutConfig {
            node_count: self.nodes,
            workgroup_size: self.workgroup_size,
            draw_every: self.draw_every,
            repulsion_scale: self.repulsion_scale,
            force_clamp: self.force_clamp,
            min_distance: self.min_distance,
            seed: self.seed,
            ..LayoutConfig::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BackendKind {
    Cpu,
    Gpu,
}

fn headless(config: LayoutConfig, steps: u64, kind: BackendKind) -> anyhow::Result<RunSummary> {
    let layout = Layout::generate(&config)?;
    let (seed, edges) = (layout.seed, layout.tree.edge_count());

    match kind {
        BackendKind::Cpu => {
            let orchestrator = layout.into_cpu(&config)?;
            summarize("cpu", orchestrator, seed, edges, steps)
        }
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => {
            let backend =
                pingpong_layout::gpu::GpuBackend::headless(&layout.tree, &layout.initial, &config)?;
            let orchestrator = FrameOrchestrator::new(backend).with_draw_every(config.draw_every)?;
            summarize("gpu", orchestrator, seed, edges, steps)
        }
        #[cfg(not(feature = "gpu"))]
        BackendKind::Gpu => anyhow::bail!("this build has no GPU support; rebuild with --features gpu"),
    }
}

fn summarize<B: Backend>(
    name: &str,
    mut orchestrator: FrameOrchestrator<B>,
    seed: u64,
    edges: usize,
    steps: u64,
) -> anyhow::Result<RunSummary> {
    orchestrator.run_for(steps)?;
    let positions = orchestrator.positions()?;
    Ok(RunSummary::new(
        name,
        seed,
        edges,
        orchestrator.step(),
        orchestrator.frames_drawn(),
        &positions,
    ))
}

#[cfg(feature = "gpu")]
fn run(config: LayoutConfig, width: u32, height: u32) -> anyhow::Result<()> {
    let layout = Layout::generate(&config)?;
    pingpong_layout::gpu::run_windowed(config, layout, width, height)?;
    Ok(())
}

#[cfg(not(feature = "gpu"))]
fn run(_config: LayoutConfig, _width: u32, _height: u32) -> anyhow::Result<()> {
    anyhow::bail!("windowed mode needs GPU support; rebuild with --features gpu or use `headless`")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            layout,
            width,
            height,
        } => run(layout.into_config(), width, height)?,
        Commands::Headless {
            layout,
            steps,
            backend,
        } => {
            let summary = headless(layout.into_config(), steps, backend)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_headless_with_defaults() {
        let cli = Cli::try_parse_from(["pingpong-layout", "headless"]).unwrap();
        match cli.command {
            Commands::Headless {
                layout,
                steps,
                backend,
            } => {
                assert_eq!(steps, 100);
                assert_eq!(backend, BackendKind::Cpu);
                assert_eq!(layout.into_config(), LayoutConfig::default());
            }
            _ => panic!("Expected Headless command"),
        }
    }

    #[test]
    fn cli_parses_layout_flags() {
        let cli = Cli::try_parse_from([
            "pingpong-layout",
            "headless",
            "--nodes",
            "64",
            "--workgroup-size",
            "32",
            "--draw-every",
            "4",
            "--force-clamp",
            "0.01",
            "--seed",
            "9",
            "--backend",
            "gpu",
        ])
        .unwrap();
        match cli.command {
            Commands::Headless {
                layout, backend, ..
            } => {
                assert_eq!(backend, BackendKind::Gpu);
                let config = layout.into_config();
                assert_eq!(config.node_count, 64);
                assert_eq!(config.workgroup_size, 32);
                assert_eq!(config.draw_every, 4);
                assert_eq!(config.force_clamp, 0.01);
                assert_eq!(config.seed, Some(9));
            }
            _ => panic!("Expected Headless command"),
        }
    }

    #[test]
    fn cli_parses_run_window_size() {
        let cli = Cli::try_parse_from(["pingpong-layout", "run", "--width", "1024", "-n", "10"])
            .unwrap();
        match cli.command {
            Commands::Run {
                layout,
                width,
                height,
            } => {
                assert_eq!(layout.nodes, 10);
                assert_eq!((width, height), (1024, 800));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn cli_requires_subcommand() {
        assert!(Cli::try_parse_from(["pingpong-layout"]).is_err());
    }

    #[test]
    fn headless_cpu_summary() {
        let config = LayoutConfig::with_nodes(30).with_seed(5);
        let summary = headless(config, 10, BackendKind::Cpu).unwrap();
        assert_eq!(summary.backend, "cpu");
        assert_eq!(summary.seed, 5);
        assert_eq!(summary.nodes, 30);
        assert_eq!(summary.edges, 29);
        assert_eq!(summary.steps, 10);
        assert_eq!(summary.frames_drawn, 10);
        assert!(summary.all_finite);
    }
}
