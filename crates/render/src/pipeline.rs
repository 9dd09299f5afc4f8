use cubeview_common::{SceneConfig, ShaderInterfaceNames, SurfaceSize};

use crate::binder::{GeometryBuffers, upload_geometry};
use crate::context::RenderingContext;
use crate::device::{DeviceSource, GpuDevice};
use crate::error::PipelineError;
use crate::scheduler::{
    FrameHost, FrameOutcome, FrameResources, FrameScheduler, FrameState, FrameTicket,
    SchedulerError, StopHandle,
};
use crate::shader::{ShaderProgram, ShaderSources, compile_and_link};
use crate::transform::{GlamMath, MatrixMath, projection};

/// Inputs to [`CubePipeline::build`].
#[derive(Debug, Clone, Copy)]
pub struct PipelineDescriptor<'a> {
    pub size: SurfaceSize,
    pub shaders: ShaderSources<'a>,
    pub scene: &'a SceneConfig,
    pub interface: &'a ShaderInterfaceNames,
}

/// The assembled cube renderer: context, program, buffers and frame loop.
///
/// Owns every GPU resource it created. Dropping it releases them.
pub struct CubePipeline<D: GpuDevice, M: MatrixMath = GlamMath> {
    context: RenderingContext<D>,
    program: ShaderProgram<D>,
    geometry: GeometryBuffers<D>,
    scheduler: FrameScheduler<M>,
}

impl<D: GpuDevice> CubePipeline<D, GlamMath> {
    pub fn build<S, H>(
        source: S,
        descriptor: &PipelineDescriptor<'_>,
        host: &mut H,
    ) -> Result<Self, PipelineError>
    where
        S: DeviceSource<Device = D>,
        H: FrameHost,
    {
        Self::build_with(source, descriptor, GlamMath, host)
    }
}

impl<D: GpuDevice, M: MatrixMath> CubePipeline<D, M> {
    /// Runs initialization in order and schedules the first frame.
    ///
    /// The first error aborts construction; nothing is scheduled in that case.
    pub fn build_with<S, H>(
        source: S,
        descriptor: &PipelineDescriptor<'_>,
        math: M,
        host: &mut H,
    ) -> Result<Self, PipelineError>
    where
        S: DeviceSource<Device = D>,
        H: FrameHost,
    {
        let scene = descriptor.scene;
        let mut context =
            RenderingContext::initialize(source, descriptor.size.width, descriptor.size.height)?;
        let program = compile_and_link(&mut context, &descriptor.shaders, descriptor.interface)?;
        let geometry = upload_geometry(&mut context, scene.wide_indices)?;

        let p = projection(&math, scene, context.size());
        let mut scheduler = FrameScheduler::new(math, p, scene);
        if let Some(ticket) = scheduler.start(host) {
            tracing::debug!("first frame scheduled as {ticket}");
        }

        Ok(Self {
            context,
            program,
            geometry,
            scheduler,
        })
    }

    /// Fires `ticket` against the pipeline's resources.
    pub fn on_frame<H: FrameHost>(
        &mut self,
        ticket: FrameTicket,
        host: &mut H,
    ) -> Result<FrameOutcome, SchedulerError> {
        let resources = FrameResources {
            context: &mut self.context,
            program: &self.program,
            geometry: &self.geometry,
        };
        self.scheduler.fire(ticket, resources, host)
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.scheduler.stop_handle()
    }

    pub fn state(&self) -> FrameState {
        self.scheduler.state()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.scheduler.frames_rendered()
    }

    pub fn context(&self) -> &RenderingContext<D> {
        &self.context
    }

    pub fn program(&self) -> &ShaderProgram<D> {
        &self.program
    }

    pub fn geometry(&self) -> &GeometryBuffers<D> {
        &self.geometry
    }

    pub fn scheduler(&self) -> &FrameScheduler<M> {
        &self.scheduler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessDevice, HeadlessSource};
    use crate::scheduler::QueueHost;

    #[test]
    fn build_schedules_exactly_one_frame() {
        let scene = SceneConfig::default();
        let names = ShaderInterfaceNames::default();
        let descriptor = PipelineDescriptor {
            size: SurfaceSize::new(800, 600),
            shaders: ShaderSources::builtin(),
            scene: &scene,
            interface: &names,
        };
        let mut host = QueueHost::new();
        let pipeline: CubePipeline<HeadlessDevice> =
            CubePipeline::build(HeadlessSource::new(), &descriptor, &mut host).unwrap();
        assert_eq!(host.scheduled_total(), 1);
        assert_eq!(pipeline.state(), FrameState::ComputeMvp);
        assert_eq!(pipeline.context().device().buffer_count(), 3);
    }

    #[test]
    fn zero_surface_schedules_nothing() {
        let scene = SceneConfig::default();
        let names = ShaderInterfaceNames::default();
        let descriptor = PipelineDescriptor {
            size: SurfaceSize::new(800, 0),
            shaders: ShaderSources::builtin(),
            scene: &scene,
            interface: &names,
        };
        let source = HeadlessSource::new();
        let journal = source.journal();
        let mut host = QueueHost::new();
        let built: Result<CubePipeline<HeadlessDevice>, _> =
            CubePipeline::build(source, &descriptor, &mut host);
        assert_eq!(
            built.err(),
            Some(PipelineError::InvalidSurface {
                width: 800,
                height: 0
            })
        );
        assert!(journal.is_empty());
        assert_eq!(host.scheduled_total(), 0);
    }
}
