//! Frame Scheduler: the update → render loop as an explicit state machine.
//!
//! The host owns timing. The scheduler hands it one [`FrameTicket`] at a time
//! through [`FrameHost::schedule`]; the host fires that ticket back once, at
//! its next presented frame. Firing anything else is rejected, so invocations
//! can never overlap or run out of order.

use std::collections::VecDeque;
use std::f32::consts::TAU;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use cubeview_common::{MvpUpdate, SceneConfig};
use cubeview_geometry::{COLOR_COMPONENTS, POSITION_COMPONENTS};

use crate::binder::GeometryBuffers;
use crate::context::RenderingContext;
use crate::device::{ClearValues, DeviceError, GpuDevice, IndexedDraw, VertexStream};
use crate::shader::ShaderProgram;
use crate::transform::{MatrixMath, model_view};

/// Identifies one scheduled frame callback. Strictly increasing per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameTicket(u64);

impl FrameTicket {
    pub fn sequence(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Host frame-presentation primitive.
///
/// `schedule` must arrange for the ticket to be fired once, asynchronously,
/// at the next presented frame. It must not fire it from inside `schedule`.
pub trait FrameHost {
    fn schedule(&mut self, ticket: FrameTicket);
}

/// In-memory host that queues tickets until they are pulled with [`QueueHost::next`].
#[derive(Debug, Default)]
pub struct QueueHost {
    queue: VecDeque<FrameTicket>,
    scheduled: u64,
}

impl QueueHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the oldest outstanding ticket.
    pub fn next(&mut self) -> Option<FrameTicket> {
        self.queue.pop_front()
    }

    /// Tickets scheduled but not yet taken.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Total number of `schedule` calls received.
    pub fn scheduled_total(&self) -> u64 {
        self.scheduled
    }
}

impl FrameHost for QueueHost {
    fn schedule(&mut self, ticket: FrameTicket) {
        self.scheduled += 1;
        self.queue.push_back(ticket);
    }
}

/// Cloneable stop signal, checked at the top of every frame invocation.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Init,
    ComputeMvp,
    Render,
    Stopped,
}

/// What one fired ticket did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    MvpUpdated,
    Rendered,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("frame scheduler has not been started")]
    NotStarted,
    #[error("unexpected frame ticket {got}, outstanding ticket is {expected:?}")]
    UnexpectedTicket {
        expected: Option<FrameTicket>,
        got: FrameTicket,
    },
    #[error("GPU error during frame: {0}")]
    Device(#[from] DeviceError),
}

impl SchedulerError {
    /// Stable name of the failure kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotStarted => "NotStarted",
            Self::UnexpectedTicket { .. } => "UnexpectedTicket",
            Self::Device(_) => "DeviceError",
        }
    }
}

/// Borrowed GPU state one frame invocation operates on.
pub struct FrameResources<'a, D: GpuDevice> {
    pub context: &'a mut RenderingContext<D>,
    pub program: &'a ShaderProgram<D>,
    pub geometry: &'a GeometryBuffers<D>,
}

pub struct FrameScheduler<M: MatrixMath> {
    math: M,
    projection: M::Matrix,
    mvp: Option<M::Matrix>,
    scene: SceneConfig,
    state: FrameState,
    pending: Option<FrameTicket>,
    next_sequence: u64,
    frames_rendered: u64,
    angle: f32,
    stop: StopHandle,
}

impl<M: MatrixMath> FrameScheduler<M> {
    pub fn new(math: M, projection: M::Matrix, scene: &SceneConfig) -> Self {
        Self {
            math,
            projection,
            mvp: None,
            scene: scene.clone(),
            state: FrameState::Init,
            pending: None,
            next_sequence: 0,
            frames_rendered: 0,
            angle: 0.0,
            stop: StopHandle::default(),
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    /// The ticket the scheduler is waiting for, if any.
    pub fn pending(&self) -> Option<FrameTicket> {
        self.pending
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn projection(&self) -> M::Matrix {
        self.projection
    }

    /// The MVP matrix last written to the uniform.
    pub fn current_mvp(&self) -> Option<M::Matrix> {
        self.mvp
    }

    /// Y rotation in radians, in `[0, TAU)`.
    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Leaves `Init` by scheduling the MVP computation. Returns the first
    /// ticket, or `None` if the scheduler was already started.
    pub fn start<H: FrameHost>(&mut self, host: &mut H) -> Option<FrameTicket> {
        if self.state != FrameState::Init {
            return None;
        }
        self.state = FrameState::ComputeMvp;
        Some(self.schedule(host))
    }

    /// Runs the invocation for `ticket`.
    ///
    /// A device error ends the loop: the scheduler moves to `Stopped` and
    /// schedules nothing further.
    pub fn fire<D, H>(
        &mut self,
        ticket: FrameTicket,
        mut resources: FrameResources<'_, D>,
        host: &mut H,
    ) -> Result<FrameOutcome, SchedulerError>
    where
        D: GpuDevice,
        H: FrameHost,
    {
        if self.state == FrameState::Init {
            return Err(SchedulerError::NotStarted);
        }
        if self.pending != Some(ticket) {
            return Err(SchedulerError::UnexpectedTicket {
                expected: self.pending,
                got: ticket,
            });
        }
        self.pending = None;

        if self.stop.is_stopped() {
            if self.state != FrameState::Stopped {
                tracing::info!(
                    "frame loop stopped after {} rendered frame(s)",
                    self.frames_rendered
                );
            }
            self.state = FrameState::Stopped;
            return Ok(FrameOutcome::Stopped);
        }

        let result = match self.state {
            FrameState::ComputeMvp => {
                let written = self.write_mvp(&mut resources);
                if written.is_ok() {
                    tracing::debug!("MVP uniform written");
                    self.state = FrameState::Render;
                }
                written.map(|()| FrameOutcome::MvpUpdated)
            }
            FrameState::Render => {
                let rendered = self.render(&mut resources);
                rendered.map(|()| FrameOutcome::Rendered)
            }
            FrameState::Init | FrameState::Stopped => return Ok(FrameOutcome::Stopped),
        };

        match result {
            Ok(outcome) => {
                self.schedule(host);
                Ok(outcome)
            }
            Err(e) => {
                tracing::debug!("frame {ticket} failed: {e}");
                self.state = FrameState::Stopped;
                Err(SchedulerError::Device(e))
            }
        }
    }

    fn schedule<H: FrameHost>(&mut self, host: &mut H) -> FrameTicket {
        let ticket = FrameTicket(self.next_sequence);
        self.next_sequence += 1;
        self.pending = Some(ticket);
        host.schedule(ticket);
        ticket
    }

    fn write_mvp<D: GpuDevice>(
        &mut self,
        resources: &mut FrameResources<'_, D>,
    ) -> Result<(), DeviceError> {
        let mv = model_view(&self.math, self.scene.translation, self.angle);
        let mvp = self.math.multiply(self.projection, mv);
        let columns = self.math.to_columns(mvp);
        let program = resources.program;
        resources
            .context
            .device_mut()
            .write_uniform_mat4(program.handle(), program.mvp(), &columns)?;
        self.mvp = Some(mvp);
        Ok(())
    }

    fn render<D: GpuDevice>(
        &mut self,
        resources: &mut FrameResources<'_, D>,
    ) -> Result<(), DeviceError> {
        if self.scene.mvp_update == MvpUpdate::EveryFrame {
            let step = self.scene.spin_degrees_per_frame.to_radians();
            self.angle = (self.angle + step).rem_euclid(TAU);
            self.write_mvp(resources)?;
        }

        let program = resources.program;
        let geometry = resources.geometry;
        let streams = [
            VertexStream {
                location: program.position(),
                buffer: geometry.positions.buffer(),
                components: POSITION_COMPONENTS,
            },
            VertexStream {
                location: program.color(),
                buffer: geometry.colors.buffer(),
                components: COLOR_COMPONENTS,
            },
        ];
        let draw = IndexedDraw {
            clear: ClearValues {
                color: Some(self.scene.clear_color),
                depth: Some(1.0),
            },
            streams: &streams,
            indices: geometry.indices.buffer(),
            index_format: geometry.index_format,
            index_count: geometry.index_count(),
        };
        resources
            .context
            .device_mut()
            .draw_indexed(program.handle(), &draw)?;
        self.frames_rendered += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::upload_geometry;
    use crate::headless::{HeadlessDevice, HeadlessSource};
    use crate::shader::{ShaderSources, compile_and_link};
    use crate::transform::{GlamMath, projection};
    use cubeview_common::{ShaderInterfaceNames, SurfaceSize, WideIndexPolicy};

    struct Fixture {
        context: RenderingContext<HeadlessDevice>,
        program: ShaderProgram<HeadlessDevice>,
        geometry: GeometryBuffers<HeadlessDevice>,
    }

    impl Fixture {
        fn new() -> Self {
            let source = HeadlessSource::new();
            let mut context = RenderingContext::initialize(source, 800, 600).unwrap();
            let sources = ShaderSources::builtin();
            let names = ShaderInterfaceNames::default();
            let program = compile_and_link(&mut context, &sources, &names).unwrap();
            let geometry = upload_geometry(&mut context, WideIndexPolicy::Fallback).unwrap();
            Self {
                context,
                program,
                geometry,
            }
        }

        fn resources(&mut self) -> FrameResources<'_, HeadlessDevice> {
            FrameResources {
                context: &mut self.context,
                program: &self.program,
                geometry: &self.geometry,
            }
        }
    }

    fn scheduler(scene: &SceneConfig) -> FrameScheduler<GlamMath> {
        let size = SurfaceSize::new(800, 600);
        let p = projection(&GlamMath, scene, size);
        FrameScheduler::new(GlamMath, p, scene)
    }

    #[test]
    fn start_schedules_exactly_once() {
        let mut host = QueueHost::new();
        let mut s = scheduler(&SceneConfig::default());
        let first = s.start(&mut host);
        assert_eq!(first, Some(FrameTicket(0)));
        assert_eq!(s.start(&mut host), None);
        assert_eq!(host.scheduled_total(), 1);
        assert_eq!(s.state(), FrameState::ComputeMvp);
    }

    #[test]
    fn firing_before_start_is_rejected() {
        let mut fx = Fixture::new();
        let mut host = QueueHost::new();
        let mut s = scheduler(&SceneConfig::default());
        let fired = s.fire(FrameTicket(0), fx.resources(), &mut host);
        assert_eq!(fired, Err(SchedulerError::NotStarted));
    }

    #[test]
    fn mvp_then_render_each_reschedule_once() {
        let mut fx = Fixture::new();
        let mut host = QueueHost::new();
        let mut s = scheduler(&SceneConfig::default());
        s.start(&mut host);

        let t = host.next().unwrap();
        let fired = s.fire(t, fx.resources(), &mut host);
        assert_eq!(fired, Ok(FrameOutcome::MvpUpdated));
        assert_eq!(s.state(), FrameState::Render);
        assert!(s.current_mvp().is_some());
        assert_eq!(host.pending(), 1);

        for n in 1..=3 {
            let t = host.next().unwrap();
            let fired = s.fire(t, fx.resources(), &mut host);
            assert_eq!(fired, Ok(FrameOutcome::Rendered));
            assert_eq!(s.frames_rendered(), n);
            assert_eq!(host.pending(), 1);
        }
        assert_eq!(fx.context.device().draw_count(), 3);
    }

    #[test]
    fn replayed_ticket_is_rejected() {
        let mut fx = Fixture::new();
        let mut host = QueueHost::new();
        let mut s = scheduler(&SceneConfig::default());
        s.start(&mut host);
        let t = host.next().unwrap();
        s.fire(t, fx.resources(), &mut host).unwrap();

        let err = s.fire(t, fx.resources(), &mut host).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::UnexpectedTicket {
                expected: Some(FrameTicket(1)),
                got: t,
            }
        );
        assert_eq!(host.scheduled_total(), 2);
    }

    #[test]
    fn stop_prevents_further_scheduling() {
        let mut fx = Fixture::new();
        let mut host = QueueHost::new();
        let mut s = scheduler(&SceneConfig::default());
        s.start(&mut host);
        s.stop_handle().stop();

        let t = host.next().unwrap();
        let fired = s.fire(t, fx.resources(), &mut host);
        assert_eq!(fired, Ok(FrameOutcome::Stopped));
        assert_eq!(s.state(), FrameState::Stopped);
        assert_eq!(s.pending(), None);
        assert_eq!(host.pending(), 0);
        assert_eq!(fx.context.device().draw_count(), 0);
    }

    #[test]
    fn every_frame_mode_spins_the_cube() {
        let mut fx = Fixture::new();
        let mut host = QueueHost::new();
        let scene = SceneConfig {
            mvp_update: MvpUpdate::EveryFrame,
            spin_degrees_per_frame: 1.0,
            ..SceneConfig::default()
        };
        let mut s = scheduler(&scene);
        s.start(&mut host);
        let t = host.next().unwrap();
        s.fire(t, fx.resources(), &mut host).unwrap();
        let initial = s.current_mvp().unwrap();

        let t = host.next().unwrap();
        s.fire(t, fx.resources(), &mut host).unwrap();
        assert_ne!(s.current_mvp().unwrap(), initial);
    }

    #[test]
    fn spin_angle_wraps_within_one_turn() {
        let mut fx = Fixture::new();
        let mut host = QueueHost::new();
        let scene = SceneConfig {
            mvp_update: MvpUpdate::EveryFrame,
            spin_degrees_per_frame: 90.0,
            ..SceneConfig::default()
        };
        let mut s = scheduler(&scene);
        s.start(&mut host);
        for _ in 0..10 {
            let t = host.next().unwrap();
            s.fire(t, fx.resources(), &mut host).unwrap();
            assert!((0.0..TAU).contains(&s.angle()));
        }
        // Nine quarter turns land on one quarter turn.
        let quarter = std::f32::consts::FRAC_PI_2;
        assert!((s.angle() - quarter).abs() < 1e-4);
    }

    #[test]
    fn scheduler_errors_name_their_kind() {
        let device = SchedulerError::Device(DeviceError::new("lost"));
        let stale = SchedulerError::UnexpectedTicket {
            expected: None,
            got: FrameTicket(3),
        };
        assert_eq!(SchedulerError::NotStarted.kind(), "NotStarted");
        assert_eq!(stale.kind(), "UnexpectedTicket");
        assert_eq!(device.kind(), "DeviceError");
    }

    #[test]
    fn ticket_display() {
        assert_eq!(FrameTicket(7).to_string(), "#7");
        assert_eq!(FrameTicket(7).sequence(), 7);
    }
}
