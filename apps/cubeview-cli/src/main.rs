use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cubeview_common::{AppConfig, MvpUpdate, SurfaceSize, WideIndexPolicy};
use cubeview_render::headless::{Command, HeadlessDevice, HeadlessSource};
use cubeview_render::reflect::{link_stages, reflect_stage};
use cubeview_render::{
    CubePipeline, OptionalFeature, PipelineDescriptor, QueueHost, ShaderSources, ShaderStage,
    shaders,
};

#[derive(Parser)]
#[command(
    name = "cubeview-cli",
    about = "Headless runner and shader inspection for cubeview"
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print versions and the default configuration
    Info,
    /// Build the pipeline on the recording backend and run frames
    Headless(HeadlessArgs),
    /// Compile shaders and print their reflected interface
    Shaders {
        /// Vertex stage WGSL (defaults to the built-in stage)
        #[arg(long)]
        vertex: Option<PathBuf>,
        /// Fragment stage WGSL (defaults to the built-in stage)
        #[arg(long)]
        fragment: Option<PathBuf>,
    },
}

#[derive(Args)]
struct HeadlessArgs {
    /// Number of render frames to run
    #[arg(short, long, default_value = "10")]
    frames: u64,
    /// Surface width in pixels
    #[arg(long)]
    width: Option<u32>,
    /// Surface height in pixels
    #[arg(long)]
    height: Option<u32>,
    /// Recompute the MVP matrix on every render frame
    #[arg(long)]
    every_frame: bool,
    /// Fail instead of falling back to 16-bit indices
    #[arg(long)]
    require_wide_indices: bool,
    /// Simulate a device without 32-bit index support
    #[arg(long)]
    no_wide_indices: bool,
    /// YAML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => info(),
        Commands::Headless(args) => headless(args),
        Commands::Shaders { vertex, fragment } => inspect_shaders(vertex, fragment),
    }
}

fn info() -> anyhow::Result<()> {
    println!("cubeview-cli v{}", env!("CARGO_PKG_VERSION"));
    println!("geometry: {}", cubeview_geometry::crate_info());
    println!("render: {}", cubeview_render::crate_info());
    println!(
        "cube: {} vertices, {} indices",
        cubeview_geometry::VERTEX_COUNT,
        cubeview_geometry::INDEX_COUNT
    );
    println!();
    println!("default configuration:");
    let yaml = AppConfig::default()
        .to_yaml()
        .context("serialize default configuration")?;
    print!("{yaml}");
    Ok(())
}

fn headless(args: HeadlessArgs) -> anyhow::Result<()> {
    let mut config = AppConfig::load_or_default(args.config.as_deref())
        .context("load configuration")?;
    if args.every_frame {
        config.scene.mvp_update = MvpUpdate::EveryFrame;
    }
    if args.require_wide_indices {
        config.scene.wide_indices = WideIndexPolicy::Require;
    }
    let size = SurfaceSize::new(
        args.width.unwrap_or(config.window.width),
        args.height.unwrap_or(config.window.height),
    );

    let mut source = HeadlessSource::new();
    if args.no_wide_indices {
        source = source.without_feature(OptionalFeature::WideIndices);
    }
    let journal = source.journal();

    let descriptor = PipelineDescriptor {
        size,
        shaders: ShaderSources::builtin(),
        scene: &config.scene,
        interface: &config.interface,
    };
    let mut host = QueueHost::new();
    let mut pipeline: CubePipeline<HeadlessDevice> =
        match CubePipeline::build(source, &descriptor, &mut host) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                tracing::error!(kind = e.kind(), "pipeline construction failed: {e}");
                return Err(e.into());
            }
        };

    while pipeline.frames_rendered() < args.frames {
        let Some(ticket) = host.next() else {
            break;
        };
        if let Err(e) = pipeline.on_frame(ticket, &mut host) {
            tracing::error!(kind = e.kind(), "frame loop failed: {e}");
            return Err(e.into());
        }
    }
    pipeline.stop_handle().stop();
    if let Some(ticket) = host.next() {
        pipeline.on_frame(ticket, &mut host)?;
    }

    let mut summary: BTreeMap<&'static str, usize> = BTreeMap::new();
    for command in journal.commands() {
        *summary.entry(command_name(&command)).or_default() += 1;
    }

    println!(
        "rendered {} frame(s) at {}x{}, state {:?}",
        pipeline.frames_rendered(),
        size.width,
        size.height,
        pipeline.state()
    );
    println!(
        "index format: {:?} ({} indices)",
        pipeline.geometry().index_format,
        pipeline.geometry().index_count()
    );
    println!("device commands:");
    for (name, count) in &summary {
        println!("  {name:<16} {count}");
    }
    let scheduler = pipeline.scheduler();
    if let Some(mvp) = scheduler.current_mvp() {
        println!("final MVP (rows), rotation {:.4} rad:", scheduler.angle());
        for row in 0..4 {
            let r = mvp.row(row);
            println!(
                "  [{:>12.6} {:>12.6} {:>12.6} {:>12.6}]",
                r.x, r.y, r.z, r.w
            );
        }
    }
    Ok(())
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::SetViewport(_) => "set_viewport",
        Command::Enable(_) => "enable",
        Command::RequestFeature { .. } => "request_feature",
        Command::CompileShader { .. } => "compile_shader",
        Command::LinkProgram { .. } => "link_program",
        Command::UseProgram(_) => "use_program",
        Command::EnableAttribute(_) => "enable_attribute",
        Command::CreateBuffer { .. } => "create_buffer",
        Command::WriteUniform { .. } => "write_uniform",
        Command::DrawIndexed { .. } => "draw_indexed",
    }
}

fn read_stage(path: Option<PathBuf>, builtin: &'static str) -> anyhow::Result<String> {
    match path {
        Some(p) => {
            let display = p.display();
            std::fs::read_to_string(&p).with_context(|| format!("read {display}"))
        }
        None => Ok(builtin.to_string()),
    }
}

fn inspect_shaders(vertex: Option<PathBuf>, fragment: Option<PathBuf>) -> anyhow::Result<()> {
    let vertex_src = read_stage(vertex, shaders::CUBE_VERTEX)?;
    let fragment_src = read_stage(fragment, shaders::CUBE_FRAGMENT)?;

    let mut stages = Vec::with_capacity(2);
    for (stage, source) in [
        (ShaderStage::Vertex, &vertex_src),
        (ShaderStage::Fragment, &fragment_src),
    ] {
        match reflect_stage(stage, source) {
            Ok(reflection) => {
                println!("{stage} stage: entry point `{}`", reflection.entry_point);
                for input in &reflection.inputs {
                    println!(
                        "  in  @location({}) {}: {:?}x{}",
                        input.location, input.name, input.ty.scalar, input.ty.components
                    );
                }
                for output in &reflection.outputs {
                    println!(
                        "  out @location({}) {}: {:?}x{}",
                        output.location, output.name, output.ty.scalar, output.ty.components
                    );
                }
                stages.push(reflection);
            }
            Err(log) => {
                tracing::error!(
                    kind = "ShaderCompileError",
                    "{stage} stage failed to compile"
                );
                anyhow::bail!("{stage} shader compilation failed:\n{log}");
            }
        }
    }

    let linked = link_stages(&stages[0], &stages[1]).map_err(|log| {
        tracing::error!(kind = "ShaderLinkError", "stages failed to link");
        anyhow::anyhow!("shader link failed:\n{log}")
    })?;
    println!("linked program:");
    for attribute in &linked.attributes {
        println!(
            "  attribute {} -> location {}",
            attribute.name, attribute.location
        );
    }
    for uniform in &linked.uniforms {
        println!(
            "  uniform {} -> group {} binding {} ({} bytes)",
            uniform.name, uniform.group, uniform.binding, uniform.size
        );
    }
    Ok(())
}
