use std::fmt;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::{Duration, Instant};

use lightsim_common::{PixelBuffer, RenderSettings, RenderStats, SceneObject};
use lightsim_events::{EventBus, SubscriptionId};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::protocol::{Inbound, RenderRequest, WorkerMessage};
use crate::state::{RenderEvent, RenderEventKind, RenderFailure, RenderState};
use crate::worker::{ComputeWorker, WorkerError, WorkerFactory, WorkerLifecycle};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How long a freshly spawned worker may take to send `loaded`.
    pub load_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            load_timeout: Duration::from_secs(30),
        }
    }
}

/// Identifies one render request, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Reasons `render` refused a request.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("renderer is still loading")]
    Loading,
    #[error("no usable worker; reload the renderer first")]
    WorkerUnavailable,
    #[error("failed to send render request: {0}")]
    Dispatch(#[from] WorkerError),
}

struct ActiveRender {
    session: SessionId,
    samples: u32,
    width: u32,
    height: u32,
    started: Instant,
    last_progress: f64,
}

/// A request waiting for a replacement worker to become ready.
struct PendingRender {
    session: SessionId,
    request: RenderRequest,
}

/// Owns the compute worker and drives the progressive render state machine.
///
/// ```text
/// loading    --loaded-->          ready
/// loading    --fault/timeout-->   error
/// ready|finished|error --render-> rendering(0)
/// rendering  --frame-->           rendering(p, image)
/// rendering  --lastframe-->       finished(image, stats)
/// rendering  --fault/error-->     error
/// any        --load-->            loading
/// ```
///
/// Worker messages are processed by [`poll`](Self::poll) or [`wait`](Self::wait).
/// Every transition emits a `StateChange` carrying the full new state.
pub struct Orchestrator {
    factory: Box<dyn WorkerFactory>,
    clock: Box<dyn Clock>,
    config: OrchestratorConfig,
    worker: Option<Box<dyn ComputeWorker>>,
    inbox: Option<Receiver<Inbound>>,
    lifecycle: WorkerLifecycle,
    load_deadline: Option<Instant>,
    active: Option<ActiveRender>,
    pending: Option<PendingRender>,
    state: RenderState,
    last_failure: Option<RenderFailure>,
    events: EventBus<RenderEvent>,
}

impl Orchestrator {
    /// Create an orchestrator in the `loading` state. No worker is spawned until [`load`](Self::load).
    pub fn new(factory: impl WorkerFactory + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            clock: Box::new(SystemClock),
            config: OrchestratorConfig::default(),
            worker: None,
            inbox: None,
            lifecycle: WorkerLifecycle::Uninitialized,
            load_deadline: None,
            active: None,
            pending: None,
            state: RenderState::Loading,
            last_failure: None,
            events: EventBus::new(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn lifecycle(&self) -> WorkerLifecycle {
        self.lifecycle
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The failure behind the current or most recent error state.
    pub fn last_failure(&self) -> Option<&RenderFailure> {
        self.last_failure.as_ref()
    }

    /// A render is in flight or waiting for its worker.
    pub fn is_busy(&self) -> bool {
        self.active.is_some() || self.pending.is_some()
    }

    pub fn subscribe<F>(&mut self, callback: F) -> SubscriptionId
    where
        F: FnMut(&RenderEvent) + Send + 'static,
    {
        self.events.subscribe(RenderEventKind::StateChange, callback)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn events_mut(&mut self) -> &mut EventBus<RenderEvent> {
        &mut self.events
    }

    /// (Re)start the worker, terminating any previous instance.
    ///
    /// A render in flight on the old worker is abandoned without a completion
    /// event. The new worker must send `loaded` within the load timeout.
    pub fn load(&mut self) {
        self.pending = None;
        self.last_failure = None;
        self.discard_worker();
        self.set_state(RenderState::Loading);
        self.spawn_worker();
    }

    /// Start rendering a copy of `settings` and `objects`.
    ///
    /// If a render is already in flight it is superseded: the busy worker is
    /// replaced and the new request runs on the replacement once it is ready.
    pub fn render(
        &mut self,
        settings: &RenderSettings,
        objects: &[SceneObject],
    ) -> Result<SessionId, RenderError> {
        let request = RenderRequest::new(objects.to_vec(), *settings);
        match self.lifecycle {
            WorkerLifecycle::Ready => {}
            WorkerLifecycle::Starting => {
                return match self.pending.as_mut() {
                    Some(pending) => {
                        pending.request = request;
                        Ok(pending.session)
                    }
                    None => Err(RenderError::Loading),
                };
            }
            WorkerLifecycle::Uninitialized | WorkerLifecycle::Terminated => {
                return Err(RenderError::WorkerUnavailable);
            }
        }

        let session = SessionId::new();
        if let Some(active) = &self.active {
            tracing::info!(old = %active.session, new = %session, "superseding render in flight");
            self.pending = Some(PendingRender { session, request });
            self.last_failure = None;
            self.discard_worker();
            self.spawn_worker();
            if self.lifecycle != WorkerLifecycle::Starting {
                return Err(RenderError::WorkerUnavailable);
            }
            self.set_state(RenderState::Rendering {
                progress: 0.0,
                image: None,
            });
            return Ok(session);
        }

        self.dispatch(session, request, true)?;
        Ok(session)
    }

    /// Process every message already waiting, then check the load deadline.
    /// Returns the number of messages handled.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let next = match &self.inbox {
                Some(rx) => rx.try_recv(),
                None => break,
            };
            match next {
                Ok(inbound) => {
                    self.handle(inbound);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.handle_disconnect();
                    break;
                }
            }
        }
        self.check_deadline();
        handled
    }

    /// Block up to `timeout` for the next message, then drain the rest.
    /// The wait is cut short at the load deadline.
    pub fn wait(&mut self, timeout: Duration) -> usize {
        let mut limit = timeout;
        if let Some(deadline) = self.load_deadline {
            limit = limit.min(deadline.saturating_duration_since(self.clock.now()));
        }
        let first = match &self.inbox {
            Some(rx) => rx.recv_timeout(limit),
            None => return 0,
        };
        match first {
            Ok(inbound) => {
                self.handle(inbound);
                1 + self.poll()
            }
            Err(RecvTimeoutError::Timeout) => {
                self.check_deadline();
                0
            }
            Err(RecvTimeoutError::Disconnected) => {
                self.handle_disconnect();
                0
            }
        }
    }

    fn spawn_worker(&mut self) {
        self.lifecycle = WorkerLifecycle::Starting;
        match self.factory.spawn() {
            Ok(handle) => {
                self.worker = Some(handle.worker);
                self.inbox = Some(handle.inbox);
                self.load_deadline = Some(self.clock.now() + self.config.load_timeout);
                tracing::info!(timeout = ?self.config.load_timeout, "worker spawned, waiting for loaded");
            }
            Err(err) => self.fault(RenderFailure::WorkerFault(err.to_string())),
        }
    }

    /// Terminate the current worker and forget everything in flight on it.
    fn discard_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.terminate();
            tracing::debug!("worker terminated");
            self.lifecycle = WorkerLifecycle::Terminated;
        }
        if let Some(active) = self.active.take() {
            tracing::info!(session = %active.session, "render abandoned");
        }
        self.inbox = None;
        self.load_deadline = None;
    }

    fn dispatch(
        &mut self,
        session: SessionId,
        request: RenderRequest,
        announce: bool,
    ) -> Result<(), RenderError> {
        let Some(worker) = self.worker.as_mut() else {
            return Err(RenderError::WorkerUnavailable);
        };
        let samples = request.samples();
        let width = request.settings.width;
        let height = request.settings.height;
        let objects = request.objects.len();
        let started = self.clock.now();
        if let Err(err) = worker.post(request) {
            self.fault(RenderFailure::WorkerFault(err.to_string()));
            return Err(RenderError::Dispatch(err));
        }
        tracing::info!(%session, samples, width, height, objects, "render started");
        self.last_failure = None;
        self.active = Some(ActiveRender {
            session,
            samples,
            width,
            height,
            started,
            last_progress: 0.0,
        });
        if announce {
            self.set_state(RenderState::Rendering {
                progress: 0.0,
                image: None,
            });
        }
        Ok(())
    }

    fn handle(&mut self, inbound: Inbound) {
        let msg = match inbound {
            Ok(msg) => msg,
            Err(err) => {
                self.fault(RenderFailure::WorkerFault(format!(
                    "unreadable message from worker: {err}"
                )));
                return;
            }
        };
        tracing::debug!(message = msg.name(), "worker message");
        match msg {
            WorkerMessage::Loaded => self.on_loaded(),
            WorkerMessage::Frame { progress, image } => self.on_frame(progress, image),
            WorkerMessage::LastFrame { image, stats } => self.on_last_frame(image, stats),
            WorkerMessage::Error { error } => self.on_worker_error(error),
        }
    }

    fn on_loaded(&mut self) {
        if self.lifecycle != WorkerLifecycle::Starting {
            tracing::warn!(lifecycle = ?self.lifecycle, "unexpected loaded message ignored");
            return;
        }
        self.lifecycle = WorkerLifecycle::Ready;
        self.load_deadline = None;
        tracing::info!("worker ready");
        match self.pending.take() {
            Some(pending) => {
                // A failed dispatch has already moved the state to error.
                let _ = self.dispatch(pending.session, pending.request, false);
            }
            None => self.set_state(RenderState::Ready),
        }
    }

    fn on_frame(&mut self, progress: f64, image: PixelBuffer) {
        let Some(active) = self.active.as_mut() else {
            tracing::warn!(progress, "frame with no render in flight ignored");
            return;
        };
        let last = active.last_progress;
        if !(progress.is_finite() && progress > last && progress < 1.0) {
            self.fault(RenderFailure::WorkerFault(format!(
                "frame progress {progress} does not follow {last}"
            )));
            return;
        }
        active.last_progress = progress;
        tracing::debug!(session = %active.session, progress, "frame");
        self.set_state(RenderState::Rendering {
            progress,
            image: Some(image),
        });
    }

    fn on_last_frame(&mut self, image: PixelBuffer, reported: RenderStats) {
        let Some(active) = self.active.take() else {
            tracing::warn!("lastframe with no render in flight ignored");
            return;
        };
        let elapsed = self.clock.now().saturating_duration_since(active.started);
        let stats = RenderStats::from_timing(active.samples, elapsed, active.width, active.height);
        tracing::debug!(?reported, "worker-reported stats");
        tracing::info!(
            session = %active.session,
            samples_per_second = stats.samples_per_second,
            seconds = stats.total_render_time,
            "render finished"
        );
        self.set_state(RenderState::Finished { image, stats });
    }

    fn on_worker_error(&mut self, error: String) {
        if let Some(active) = self.active.take() {
            tracing::info!(session = %active.session, "worker rejected render");
            self.fail(RenderFailure::ComputeError(error));
        } else if self.lifecycle == WorkerLifecycle::Starting {
            self.fault(RenderFailure::WorkerFault(error));
        } else {
            tracing::warn!(%error, "worker error with no render in flight ignored");
        }
    }

    fn handle_disconnect(&mut self) {
        tracing::warn!(lifecycle = ?self.lifecycle, "worker disconnected");
        self.fault(RenderFailure::WorkerFault(
            "worker terminated unexpectedly".into(),
        ));
    }

    fn check_deadline(&mut self) {
        if self.lifecycle != WorkerLifecycle::Starting {
            return;
        }
        let Some(deadline) = self.load_deadline else {
            return;
        };
        if self.clock.now() >= deadline {
            self.fault(RenderFailure::LoadTimeout(self.config.load_timeout));
        }
    }

    /// The worker is unusable: drop it, then enter the error state.
    fn fault(&mut self, failure: RenderFailure) {
        self.discard_worker();
        self.lifecycle = WorkerLifecycle::Terminated;
        self.pending = None;
        self.fail(failure);
    }

    fn fail(&mut self, failure: RenderFailure) {
        tracing::warn!(%failure, "renderer entered error state");
        let message = failure.to_string();
        self.last_failure = Some(failure);
        self.set_state(RenderState::Error { message });
    }

    fn set_state(&mut self, state: RenderState) {
        tracing::debug!(state = state.name(), "render state change");
        let event = RenderEvent::StateChange(state);
        self.events.emit(&event);
        let RenderEvent::StateChange(state) = event;
        self.state = state;
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.discard_worker();
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("state", &self.state.name())
            .field("lifecycle", &self.lifecycle)
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}
