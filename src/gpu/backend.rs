//! wgpu implementation of the compute & draw backend
//!
//! Two storage buffers hold the ping and pong positions. The compute pipeline
//! has one bind group per read slot (ping→pong and pong→ping) and the render
//! pipelines one bind group per drawn slot, so choosing a slot is choosing a
//! bind group. Edges are drawn as a line list whose vertices are node indices;
//! nodes are an indexed circle mesh instanced once per node.

use std::sync::Arc;

use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

use crate::backend::Backend;
use crate::config::LayoutConfig;
use crate::error::{LayoutError, Result};
use crate::geometry::circle;
use crate::graph::AttachmentTree;
use crate::kernel::workgroup_count;
use crate::state::{PingPong, Slot, Vec2};

use super::shaders::{EDGE_SHADER, FORCE_ENTRY_POINT, force_shader, node_shader};

/// Size of the off-screen target used when no surface is given
pub const OFFSCREEN_SIZE: u32 = 800;

/// Colour format of the off-screen target
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Where frames are drawn
pub enum RenderTarget {
    /// A window surface; one texture is acquired and presented per frame
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    /// An off-screen colour texture (headless runs)
    Offscreen { texture: wgpu::Texture },
}

impl RenderTarget {
    fn format(&self) -> wgpu::TextureFormat {
        match self {
            RenderTarget::Surface { config, .. } => config.format,
            RenderTarget::Offscreen { texture } => texture.format(),
        }
    }
}

/// GPU compute & draw backend
pub struct GpuBackend {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,

    // Pipelines
    force_pipeline: wgpu::ComputePipeline,
    edge_pipeline: wgpu::RenderPipeline,
    node_pipeline: wgpu::RenderPipeline,

    // Position buffers and the bind groups that select them
    positions: PingPong<wgpu::Buffer>,
    compute_bind_groups: PingPong<wgpu::BindGroup>,
    render_bind_groups: PingPong<wgpu::BindGroup>,

    // Topology, kept alive for the compute bind groups
    _neighbor_buffer: wgpu::Buffer,
    _adjacency_buffer: wgpu::Buffer,

    // Draw inputs
    line_buffer: wgpu::Buffer,
    line_vertex_count: u32,
    circle_vertex_buffer: wgpu::Buffer,
    circle_index_buffer: wgpu::Buffer,
    circle_index_count: u32,

    target: RenderTarget,
    staging_buffer: wgpu::Buffer,

    node_count: u32,
    workgroups: u32,
}

impl GpuBackend {
    /// Create a backend drawing into `target`
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        tree: &AttachmentTree,
        initial: &[Vec2],
        config: &LayoutConfig,
        target: RenderTarget,
    ) -> Result<Self> {
        config.validate()?;
        if initial.len() != tree.node_count() {
            return Err(LayoutError::Configuration(format!(
                "{} initial positions for {} nodes",
                initial.len(),
                tree.node_count()
            )));
        }
        let node_count = tree.node_count() as u32;
        let format = target.format();

        // Shaders
        let force_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Force Kernel Shader"),
            source: wgpu::ShaderSource::Wgsl(
                force_shader(node_count, config.workgroup_size, &config.force_params()).into(),
            ),
        });
        let edge_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Edge Shader"),
            source: wgpu::ShaderSource::Wgsl(EDGE_SHADER.into()),
        });
        let node_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Node Shader"),
            source: wgpu::ShaderSource::Wgsl(node_shader(config.node_radius).into()),
        });

        // Buffers
        let position_usage =
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC;
        let position_size = std::mem::size_of_val(initial) as u64;
        let ping = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Node Position Buffer Ping"),
            contents: bytemuck::cast_slice(initial),
            usage: position_usage,
        });
        // Zero-initialized; fully written by the first dispatch before any read
        let pong = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Node Position Buffer Pong"),
            size: position_size,
            usage: position_usage,
            mapped_at_creation: false,
        });

        let neighbor_buffer = storage_or_placeholder(
            &device,
            "Neighbor Buffer",
            bytemuck::cast_slice(tree.neighbors()),
            wgpu::BufferUsages::STORAGE,
        );
        let adjacency_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Adjacency Buffer"),
            contents: bytemuck::cast_slice(tree.adjacency()),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let line_buffer = storage_or_placeholder(
            &device,
            "Edge Line Buffer",
            bytemuck::cast_slice(tree.line_pairs()),
            wgpu::BufferUsages::VERTEX,
        );

        let (circle_vertices, circle_indices) = circle(config.circle_segments);
        let circle_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Circle Vertex Buffer"),
            contents: bytemuck::cast_slice(&circle_vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let circle_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Circle Index Buffer"),
            contents: bytemuck::cast_slice(&circle_indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Position Staging Buffer"),
            size: position_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Compute bind groups: binding 0 reads, binding 1 writes
        let compute_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Force Kernel Bind Group Layout"),
            entries: &[
                storage_entry(0, wgpu::ShaderStages::COMPUTE, true),
                storage_entry(1, wgpu::ShaderStages::COMPUTE, false),
                storage_entry(2, wgpu::ShaderStages::COMPUTE, true),
                storage_entry(3, wgpu::ShaderStages::COMPUTE, true),
            ],
        });
        let compute_bind_group = |label: &str, read: &wgpu::Buffer, write: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &compute_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: read.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: write.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: neighbor_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: adjacency_buffer.as_entire_binding(),
                    },
                ],
            })
        };
        let compute_bind_groups = PingPong::new(
            compute_bind_group("Force Kernel Bind Group Ping", &ping, &pong),
            compute_bind_group("Force Kernel Bind Group Pong", &pong, &ping),
        );

        // Render bind groups: the slot being drawn
        let render_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Render Bind Group Layout"),
            entries: &[storage_entry(0, wgpu::ShaderStages::VERTEX, true)],
        });
        let render_bind_group = |label: &str, positions: &wgpu::Buffer| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &render_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: positions.as_entire_binding(),
                }],
            })
        };
        let render_bind_groups = PingPong::new(
            render_bind_group("Render Bind Group Ping", &ping),
            render_bind_group("Render Bind Group Pong", &pong),
        );

        // Pipelines
        let compute_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Force Kernel Pipeline Layout"),
            bind_group_layouts: &[&compute_layout],
            push_constant_ranges: &[],
        });
        let force_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Force Kernel Pipeline"),
            layout: Some(&compute_pipeline_layout),
            module: &force_module,
            entry_point: Some(FORCE_ENTRY_POINT),
            compilation_options: Default::default(),
            cache: None,
        });

        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[&render_layout],
            push_constant_ranges: &[],
        });

        let edge_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Edge Render Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &edge_module,
                entry_point: Some("vs_edge"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<u32>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Uint32,
                        offset: 0,
                        shader_location: 0,
                    }],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &edge_module,
                entry_point: Some("fs_edge"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let node_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Node Render Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &node_module,
                entry_point: Some("vs_node"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vec2>() as u64,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x2,
                        offset: 0,
                        shader_location: 0,
                    }],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &node_module,
                entry_point: Some("fs_node"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let workgroups = workgroup_count(tree.node_count(), config.workgroup_size);
        info!(
            nodes = node_count,
            edges = tree.edge_count(),
            workgroups,
            "gpu backend ready"
        );

        Ok(Self {
            device,
            queue,
            force_pipeline,
            edge_pipeline,
            node_pipeline,
            positions: PingPong::new(ping, pong),
            compute_bind_groups,
            render_bind_groups,
            _neighbor_buffer: neighbor_buffer,
            _adjacency_buffer: adjacency_buffer,
            line_buffer,
            line_vertex_count: tree.line_pairs().len() as u32,
            circle_vertex_buffer,
            circle_index_buffer,
            circle_index_count: circle_indices.len() as u32,
            target,
            staging_buffer,
            node_count,
            workgroups,
        })
    }

    /// Create a backend on its own device, drawing off-screen
    pub fn headless(tree: &AttachmentTree, initial: &[Vec2], config: &LayoutConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let (device, queue) = pollster::block_on(async {
            let adapter = request_adapter(&instance, None).await?;
            request_device(&adapter).await
        })?;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Color Texture"),
            size: wgpu::Extent3d {
                width: OFFSCREEN_SIZE,
                height: OFFSCREEN_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        Self::new(
            Arc::new(device),
            Arc::new(queue),
            tree,
            initial,
            config,
            RenderTarget::Offscreen { texture },
        )
    }

    /// Reconfigure the window surface after a resize
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let RenderTarget::Surface { surface, config } = &mut self.target {
            config.width = width;
            config.height = height;
            surface.configure(&self.device, config);
            debug!(width, height, "surface reconfigured");
        }
    }

    /// Acquire the frame texture for the current target
    fn acquire(&self) -> Result<Acquired> {
        let RenderTarget::Surface { surface, config } = &self.target else {
            return Ok(Acquired::Offscreen);
        };
        let err = match surface.get_current_texture() {
            Ok(frame) => return Ok(Acquired::Surface(frame)),
            Err(e) => e,
        };
        match surface_action(&err) {
            SurfaceAction::Reconfigure => {
                warn!(error = %err, "surface lost, reconfiguring");
                surface.configure(&self.device, config);
                surface
                    .get_current_texture()
                    .map(Acquired::Surface)
                    .map_err(|e| LayoutError::Surface(e.to_string()))
            }
            SurfaceAction::Skip => {
                warn!(error = %err, "surface timed out, skipping frame");
                Ok(Acquired::Skipped)
            }
            SurfaceAction::Fail => Err(LayoutError::Surface(err.to_string())),
        }
    }
}

/// Outcome of acquiring a frame
enum Acquired {
    Surface(wgpu::SurfaceTexture),
    Offscreen,
    /// Transient failure; nothing is drawn this frame
    Skipped,
}

/// How a draw reacts to a failed `get_current_texture`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceAction {
    Reconfigure,
    Skip,
    Fail,
}

fn surface_action(err: &wgpu::SurfaceError) -> SurfaceAction {
    match err {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceAction::Reconfigure,
        wgpu::SurfaceError::Timeout => SurfaceAction::Skip,
        _ => SurfaceAction::Fail,
    }
}

impl Backend for GpuBackend {
    fn node_count(&self) -> usize {
        self.node_count as usize
    }

    fn dispatch(&mut self, read: Slot, write: Slot) -> Result<()> {
        if read == write {
            return Err(LayoutError::Configuration(
                "kernel cannot read and write the same slot".into(),
            ));
        }
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Force Kernel Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Force Kernel Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.force_pipeline);
            pass.set_bind_group(0, self.compute_bind_groups.get(read), &[]);
            pass.dispatch_workgroups(self.workgroups, 1, 1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        // Completion fence for the step
        let _ = self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }

    fn draw(&mut self, current: Slot) -> Result<()> {
        let (frame, view) = match (self.acquire()?, &self.target) {
            (Acquired::Skipped, _) => return Ok(()),
            (Acquired::Surface(frame), _) => {
                let view = frame
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                (Some(frame), view)
            }
            (Acquired::Offscreen, RenderTarget::Offscreen { texture }) => {
                (None, texture.create_view(&wgpu::TextureViewDescriptor::default()))
            }
            (Acquired::Offscreen, RenderTarget::Surface { .. }) => {
                return Err(LayoutError::Surface("no frame acquired".into()));
            }
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Graph Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            let bind_group = self.render_bind_groups.get(current);

            // Edges first, nodes on top
            if self.line_vertex_count > 0 {
                render_pass.set_pipeline(&self.edge_pipeline);
                render_pass.set_bind_group(0, bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.line_buffer.slice(..));
                render_pass.draw(0..self.line_vertex_count, 0..1);
            }

            render_pass.set_pipeline(&self.node_pipeline);
            render_pass.set_bind_group(0, bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.circle_vertex_buffer.slice(..));
            render_pass.set_index_buffer(
                self.circle_index_buffer.slice(..),
                wgpu::IndexFormat::Uint32,
            );
            render_pass.draw_indexed(0..self.circle_index_count, 0, 0..self.node_count);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(frame) = frame {
            frame.present();
        }
        Ok(())
    }

    fn read_positions(&mut self, slot: Slot) -> Result<Vec<Vec2>> {
        let size = self.node_count as u64 * std::mem::size_of::<Vec2>() as u64;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Read Positions Encoder"),
            });
        encoder.copy_buffer_to_buffer(self.positions.get(slot), 0, &self.staging_buffer, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = self.staging_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| LayoutError::Readback(e.to_string()))?
            .map_err(|e| LayoutError::Readback(e.to_string()))?;

        let data = buffer_slice.get_mapped_range();
        let positions: Vec<Vec2> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        self.staging_buffer.unmap();

        Ok(positions)
    }
}

/// Request an adapter, optionally compatible with `surface`
pub async fn request_adapter(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
) -> Result<wgpu::Adapter> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| LayoutError::BackendUnavailable("no suitable GPU adapter found".into()))?;

    debug!(adapter = ?adapter.get_info(), "adapter acquired");
    Ok(adapter)
}

/// Request a device and queue from `adapter`
pub async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)> {
    adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Layout Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None, // trace path
        )
        .await
        .map_err(|e| LayoutError::BackendUnavailable(e.to_string()))
}

fn storage_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    read_only: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Zero-sized buffers cannot be bound, so empty topology gets 16 zero bytes
fn storage_or_placeholder(
    device: &wgpu::Device,
    label: &str,
    contents: &[u8],
    usage: wgpu::BufferUsages,
) -> wgpu::Buffer {
    if contents.is_empty() {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("{label} (empty)")),
            size: 16,
            usage,
            mapped_at_creation: false,
        })
    } else {
        device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage,
        })
    }
}
