use cubeview_common::{
    MvpUpdate, SceneConfig, ShaderInterfaceNames, SurfaceSize, WideIndexPolicy,
};
use cubeview_render::headless::{Command, HeadlessDevice, HeadlessSource, Journal};
use cubeview_render::{
    CubePipeline, FrameOutcome, FrameState, IndexFormat, OptionalFeature, PipelineDescriptor,
    PipelineError, QueueHost, SchedulerError, ShaderSources, ShaderStage,
};

const UV_FRAGMENT: &str = r#"
@fragment
fn fs_main(@location(3) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(uv, 0.0, 1.0);
}
"#;

fn build_named(
    source: HeadlessSource,
    scene: &SceneConfig,
    shaders: ShaderSources<'_>,
    names: &ShaderInterfaceNames,
    host: &mut QueueHost,
) -> Result<CubePipeline<HeadlessDevice>, PipelineError> {
    let descriptor = PipelineDescriptor {
        size: SurfaceSize::new(800, 600),
        shaders,
        scene,
        interface: names,
    };
    CubePipeline::build(source, &descriptor, host)
}

fn build(
    source: HeadlessSource,
    scene: &SceneConfig,
    shaders: ShaderSources<'_>,
    host: &mut QueueHost,
) -> Result<CubePipeline<HeadlessDevice>, PipelineError> {
    let names = ShaderInterfaceNames::default();
    build_named(source, scene, shaders, &names, host)
}

/// Builds with the default scene and the built-in shaders.
fn build_builtin(
    source: HeadlessSource,
    host: &mut QueueHost,
) -> Result<CubePipeline<HeadlessDevice>, PipelineError> {
    let scene = SceneConfig::default();
    build(source, &scene, ShaderSources::builtin(), host)
}

fn is_buffer_creation(command: &Command) -> bool {
    matches!(command, Command::CreateBuffer { .. })
}

fn is_uniform_write(command: &Command) -> bool {
    matches!(command, Command::WriteUniform { .. })
}

fn buffers_created(journal: &Journal) -> usize {
    journal
        .commands()
        .iter()
        .filter(|c| is_buffer_creation(c))
        .count()
}

/// Drives `n` tickets through the pipeline, pulling each from the host.
fn pump(
    pipeline: &mut CubePipeline<HeadlessDevice>,
    host: &mut QueueHost,
    n: usize,
) -> Vec<FrameOutcome> {
    (0..n)
        .map(|_| {
            let ticket = host.next().expect("a frame should be pending");
            pipeline.on_frame(ticket, host).unwrap()
        })
        .collect()
}

#[test]
fn valid_surface_builds_and_schedules_one_frame() {
    let source = HeadlessSource::new();
    let journal = source.journal();
    let mut host = QueueHost::new();
    let pipeline = build_builtin(source, &mut host).unwrap();

    let program = pipeline.program();
    let locations = [program.position().0, program.color().0];
    assert_eq!(locations, [0, 1]);
    assert_eq!(program.mvp().binding, 0);
    assert_eq!(buffers_created(&journal), 3);
    assert_eq!(host.scheduled_total(), 1);
    assert_eq!(host.pending(), 1);
    assert_eq!(pipeline.state(), FrameState::ComputeMvp);
}

#[test]
fn broken_fragment_shader_allocates_nothing() {
    let source = HeadlessSource::new();
    let journal = source.journal();
    let mut host = QueueHost::new();
    let shaders = ShaderSources {
        fragment: "@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(1.0) }",
        ..ShaderSources::builtin()
    };
    let err = build(source, &SceneConfig::default(), shaders, &mut host)
        .err()
        .expect("build should fail");

    match err {
        PipelineError::ShaderCompile { stage, ref log } => {
            assert_eq!(stage, ShaderStage::Fragment);
            assert!(!log.is_empty());
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(buffers_created(&journal), 0);
    assert_eq!(host.scheduled_total(), 0);
}

#[test]
fn broken_vertex_shader_allocates_nothing() {
    let source = HeadlessSource::new();
    let journal = source.journal();
    let mut host = QueueHost::new();
    let shaders = ShaderSources {
        vertex: "@vertex fn vs_main( -> @builtin(position) vec4<f32> {",
        ..ShaderSources::builtin()
    };
    let err = build(source, &SceneConfig::default(), shaders, &mut host).err();

    match err {
        Some(PipelineError::ShaderCompile { stage, .. }) => {
            assert_eq!(stage, ShaderStage::Vertex);
        }
        other => panic!("unexpected result {other:?}"),
    }
    let compiles = journal
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::CompileShader { .. }))
        .count();
    assert_eq!(compiles, 1);
    assert_eq!(buffers_created(&journal), 0);
    assert_eq!(host.scheduled_total(), 0);
}

#[test]
fn mismatched_stages_allocate_nothing() {
    let source = HeadlessSource::new();
    let journal = source.journal();
    let mut host = QueueHost::new();
    let shaders = ShaderSources {
        fragment: UV_FRAGMENT,
        ..ShaderSources::builtin()
    };
    let err = build(source, &SceneConfig::default(), shaders, &mut host).err();

    match err {
        Some(PipelineError::ShaderLink { log }) => assert!(log.contains("location 3")),
        other => panic!("unexpected result {other:?}"),
    }
    let commands = journal.commands();
    assert!(commands.contains(&Command::LinkProgram { ok: false }));
    assert_eq!(buffers_created(&journal), 0);
    assert_eq!(host.scheduled_total(), 0);
}

#[test]
fn unknown_attribute_name_allocates_nothing() {
    let source = HeadlessSource::new();
    let journal = source.journal();
    let mut host = QueueHost::new();
    let names = ShaderInterfaceNames {
        position: "aVertexPosition".into(),
        ..ShaderInterfaceNames::default()
    };
    let scene = SceneConfig::default();
    let shaders = ShaderSources::builtin();
    let err = build_named(source, &scene, shaders, &names, &mut host).err();

    let expected = PipelineError::ShaderInterface {
        name: "aVertexPosition".into(),
    };
    assert_eq!(err, Some(expected));
    let commands = journal.commands();
    assert!(commands.contains(&Command::LinkProgram { ok: true }));
    assert_eq!(buffers_created(&journal), 0);
    assert_eq!(host.scheduled_total(), 0);
}

#[test]
fn ten_frames_draw_ten_times_without_new_buffers() {
    let source = HeadlessSource::new();
    let journal = source.journal();
    let mut host = QueueHost::new();
    let mut pipeline = build_builtin(source, &mut host).unwrap();

    let first = pump(&mut pipeline, &mut host, 1);
    assert_eq!(first, vec![FrameOutcome::MvpUpdated]);
    let before = journal.len();
    let outcomes = pump(&mut pipeline, &mut host, 10);
    assert!(outcomes.iter().all(|o| *o == FrameOutcome::Rendered));

    let frames = journal.commands().split_off(before);
    let draws: Vec<_> = frames
        .iter()
        .filter_map(|c| match c {
            Command::DrawIndexed {
                count,
                format,
                clear,
                ..
            } => Some((*count, *format, *clear)),
            _ => None,
        })
        .collect();
    assert_eq!(draws.len(), 10);
    for (count, format, clear) in draws {
        assert_eq!(count, 36);
        assert_eq!(format, IndexFormat::U32);
        assert_eq!(clear.depth, Some(1.0));
        assert_eq!(clear.color, Some([0.0; 4]));
    }
    // Static MVP: only the first invocation writes the uniform.
    assert!(!frames.iter().any(is_uniform_write));
    assert_eq!(buffers_created(&journal), 3);
    assert_eq!(host.scheduled_total(), 12);
    assert_eq!(pipeline.frames_rendered(), 10);
}

#[test]
fn stop_handle_ends_the_loop() {
    let mut host = QueueHost::new();
    let mut pipeline = build_builtin(HeadlessSource::new(), &mut host).unwrap();
    pump(&mut pipeline, &mut host, 3);

    let stop = pipeline.stop_handle();
    std::thread::spawn(move || stop.stop()).join().unwrap();

    let last = pump(&mut pipeline, &mut host, 1);
    assert_eq!(last, vec![FrameOutcome::Stopped]);
    assert_eq!(pipeline.state(), FrameState::Stopped);
    assert_eq!(host.next(), None);
    assert_eq!(pipeline.frames_rendered(), 2);
}

#[test]
fn out_of_order_ticket_is_rejected() {
    let mut host = QueueHost::new();
    let mut pipeline = build_builtin(HeadlessSource::new(), &mut host).unwrap();
    let first = host.next().unwrap();
    pipeline.on_frame(first, &mut host).unwrap();

    let err = pipeline.on_frame(first, &mut host).unwrap_err();
    assert_eq!(err.kind(), "UnexpectedTicket");
    match err {
        SchedulerError::UnexpectedTicket { got, .. } => assert_eq!(got, first),
        other => panic!("unexpected error {other:?}"),
    }
    // The outstanding ticket is still honoured.
    let next = host.next().unwrap();
    let fired = pipeline.on_frame(next, &mut host);
    assert_eq!(fired, Ok(FrameOutcome::Rendered));
}

#[test]
fn every_frame_mode_rewrites_the_uniform() {
    let source = HeadlessSource::new();
    let journal = source.journal();
    let mut host = QueueHost::new();
    let scene = SceneConfig {
        mvp_update: MvpUpdate::EveryFrame,
        spin_degrees_per_frame: 2.0,
        ..SceneConfig::default()
    };
    let mut pipeline = build(source, &scene, ShaderSources::builtin(), &mut host).unwrap();
    pump(&mut pipeline, &mut host, 5);

    let writes = journal
        .commands()
        .iter()
        .filter(|c| is_uniform_write(c))
        .count();
    assert_eq!(writes, 5);
    assert_eq!(pipeline.frames_rendered(), 4);
}

#[test]
fn missing_wide_indices_follow_policy() {
    let mut host = QueueHost::new();
    let narrow = HeadlessSource::new().without_feature(OptionalFeature::WideIndices);
    let mut pipeline = build_builtin(narrow.clone(), &mut host).unwrap();
    assert_eq!(pipeline.geometry().index_format, IndexFormat::U16);
    pump(&mut pipeline, &mut host, 2);
    assert_eq!(pipeline.frames_rendered(), 1);

    let strict = SceneConfig {
        wide_indices: WideIndexPolicy::Require,
        ..SceneConfig::default()
    };
    let mut host = QueueHost::new();
    let err = build(narrow, &strict, ShaderSources::builtin(), &mut host).err();
    let expected = PipelineError::MissingFeature {
        feature: OptionalFeature::WideIndices,
    };
    assert_eq!(err, Some(expected));
    assert_eq!(host.scheduled_total(), 0);
}

#[test]
fn failed_acquisition_is_reported() {
    let mut host = QueueHost::new();
    let source = HeadlessSource::new().failing("adapter lost");
    let err = build_builtin(source, &mut host).err();
    assert_eq!(err.map(|e| e.kind()), Some("ContextAcquisitionError"));
}
