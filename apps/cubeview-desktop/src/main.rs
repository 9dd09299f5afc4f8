use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use cubeview_common::{AppConfig, MvpUpdate, SurfaceSize};
use cubeview_render::{
    CubePipeline, FrameHost, FrameOutcome, FrameTicket, PipelineDescriptor, PipelineError,
    SchedulerError, ShaderSources,
};
use cubeview_render_wgpu::{WgpuDevice, WgpuSource};

#[derive(Parser)]
#[command(name = "cubeview-desktop", about = "Draws a colored cube in a window")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Window width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Window height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Recompute the MVP matrix on every frame
    #[arg(long)]
    every_frame: bool,

    /// Degrees the cube turns per frame when recomputing every frame
    #[arg(long)]
    spin: Option<f32>,
}

/// Turns scheduled tickets into redraw requests. One ticket is outstanding at a time.
struct WinitHost {
    window: Arc<Window>,
    pending: Option<FrameTicket>,
}

impl FrameHost for WinitHost {
    fn schedule(&mut self, ticket: FrameTicket) {
        self.pending = Some(ticket);
        self.window.request_redraw();
    }
}

/// Why the viewer stopped.
enum Fatal {
    Build(PipelineError),
    Frame(SchedulerError),
    Window(String),
}

struct Viewer {
    config: AppConfig,
    host: Option<WinitHost>,
    pipeline: Option<CubePipeline<WgpuDevice>>,
    fatal: Option<Fatal>,
}

impl Viewer {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            host: None,
            pipeline: None,
            fatal: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, fatal: Fatal) {
        match &fatal {
            Fatal::Build(e) => {
                tracing::error!(kind = e.kind(), "pipeline construction failed: {e}");
            }
            Fatal::Frame(e) => tracing::error!(kind = e.kind(), "frame loop failed: {e}"),
            Fatal::Window(e) => tracing::error!("window creation failed: {e}"),
        }
        self.fatal = Some(fatal);
        event_loop.exit();
    }
}

impl ApplicationHandler for Viewer {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.host.is_some() {
            return;
        }

        let size = self.config.window.surface_size();
        let attrs = Window::default_attributes()
            .with_title(self.config.window.title.clone())
            .with_inner_size(PhysicalSize::new(size.width, size.height))
            .with_resizable(false);
        let window = match event_loop.create_window(attrs) {
            Ok(w) => Arc::new(w),
            Err(e) => return self.fail(event_loop, Fatal::Window(e.to_string())),
        };

        let inner = window.inner_size();
        let descriptor = PipelineDescriptor {
            size: SurfaceSize::new(inner.width, inner.height),
            shaders: ShaderSources::builtin(),
            scene: &self.config.scene,
            interface: &self.config.interface,
        };
        let mut host = WinitHost {
            window: window.clone(),
            pending: None,
        };
        match CubePipeline::build(WgpuSource::new(window), &descriptor, &mut host) {
            Ok(pipeline) => {
                self.pipeline = Some(pipeline);
                self.host = Some(host);
            }
            Err(e) => self.fail(event_loop, Fatal::Build(e)),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(pipeline) = &self.pipeline {
                    pipeline.stop_handle().stop();
                }
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let (Some(host), Some(pipeline)) = (&mut self.host, &mut self.pipeline) else {
                    return;
                };
                let Some(ticket) = host.pending.take() else {
                    return;
                };
                match pipeline.on_frame(ticket, host) {
                    Ok(FrameOutcome::Stopped) => event_loop.exit(),
                    Ok(_) => {}
                    Err(e) => self.fail(event_loop, Fatal::Frame(e)),
                }
            }
            _ => {}
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let mut config = AppConfig::load_or_default(cli.config.as_deref())
        .context("load configuration")?;
    if let Some(width) = cli.width {
        config.window.width = width;
    }
    if let Some(height) = cli.height {
        config.window.height = height;
    }
    if cli.every_frame {
        config.scene.mvp_update = MvpUpdate::EveryFrame;
    }
    if let Some(spin) = cli.spin {
        config.scene.spin_degrees_per_frame = spin;
    }

    tracing::info!("cubeview-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Wait);

    let mut viewer = Viewer::new(config);
    event_loop.run_app(&mut viewer)?;

    match viewer.fatal {
        None => Ok(()),
        Some(Fatal::Build(e)) => Err(e).context("build cube pipeline"),
        Some(Fatal::Frame(e)) => Err(e).context("render frame"),
        Some(Fatal::Window(e)) => anyhow::bail!("create window: {e}"),
    }
}
