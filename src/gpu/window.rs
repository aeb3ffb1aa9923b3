//! Windowed run: one tick per redraw, until the window is closed

use std::sync::Arc;

use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::config::LayoutConfig;
use crate::error::{LayoutError, Result};
use crate::layout::Layout;
use crate::orchestrator::FrameOrchestrator;

use super::backend::{GpuBackend, RenderTarget, request_adapter, request_device};

/// Open a `width`×`height` window and run the layout loop in it
pub fn run_windowed(config: LayoutConfig, layout: Layout, width: u32, height: u32) -> Result<u64> {
    let event_loop = EventLoop::new().map_err(|e| LayoutError::Surface(e.to_string()))?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        config,
        layout: Some(layout),
        size: PhysicalSize::new(width, height),
        window: None,
        orchestrator: None,
        error: None,
    };
    event_loop
        .run_app(&mut app)
        .map_err(|e| LayoutError::Surface(e.to_string()))?;

    if let Some(e) = app.error {
        return Err(e);
    }
    let steps = app.orchestrator.as_ref().map_or(0, |o| o.step());
    info!(steps, "window closed");
    Ok(steps)
}

struct App {
    config: LayoutConfig,
    /// Consumed when the window is first created
    layout: Option<Layout>,
    size: PhysicalSize<u32>,
    window: Option<Arc<Window>>,
    orchestrator: Option<FrameOrchestrator<GpuBackend>>,
    error: Option<LayoutError>,
}

impl App {
    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let Some(layout) = self.layout.take() else {
            return Ok(());
        };

        let attrs = Window::default_attributes()
            .with_title(format!("pingpong-layout ({} nodes)", layout.tree.node_count()))
            .with_inner_size(self.size);
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(|e| LayoutError::Surface(e.to_string()))?,
        );

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window.clone())
            .map_err(|e| LayoutError::BackendUnavailable(e.to_string()))?;
        let adapter = pollster::block_on(request_adapter(&instance, Some(&surface)))?;
        let (device, queue) = pollster::block_on(request_device(&adapter))?;

        let size = window.inner_size();
        let config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .ok_or_else(|| LayoutError::Surface("surface not supported by adapter".into()))?;
        surface.configure(&device, &config);

        let backend = GpuBackend::new(
            Arc::new(device),
            Arc::new(queue),
            &layout.tree,
            &layout.initial,
            &self.config,
            RenderTarget::Surface { surface, config },
        )?;
        self.orchestrator =
            Some(FrameOrchestrator::new(backend).with_draw_every(self.config.draw_every)?);

        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, e: LayoutError) {
        error!(error = %e, "layout loop failed");
        self.error = Some(e);
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.init(event_loop) {
                self.fail(event_loop, e);
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(orchestrator) = &mut self.orchestrator {
                    orchestrator.backend_mut().resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(orchestrator) = &mut self.orchestrator else {
                    return;
                };
                if let Err(e) = orchestrator.tick() {
                    self.fail(event_loop, e);
                    return;
                }
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}
