use std::sync::mpsc::Receiver;

use crate::protocol::{Inbound, ProtocolError, RenderRequest};

/// Errors talking to a compute worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to start worker: {0}")]
    Spawn(String),
    #[error("worker is gone")]
    Disconnected,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Lifecycle of the worker behind the orchestrator.
///
/// Only a `Ready` worker accepts render requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerLifecycle {
    /// No worker has been spawned yet.
    Uninitialized,
    /// Spawned, waiting for `loaded`.
    Starting,
    /// Loaded; idle or rendering.
    Ready,
    /// Terminated by the orchestrator or failed.
    Terminated,
}

impl WorkerLifecycle {
    pub fn is_usable(self) -> bool {
        self == Self::Ready
    }
}

/// The sending half of a worker connection.
///
/// A worker processes requests one at a time, in order, to completion.
pub trait ComputeWorker: Send {
    /// Hand one request to the worker.
    fn post(&mut self, request: RenderRequest) -> Result<(), WorkerError>;

    /// Stop the worker. Work in progress is abandoned and no completion is sent.
    fn terminate(&mut self);
}

/// A freshly spawned worker and the channel its messages arrive on.
pub struct WorkerHandle {
    pub worker: Box<dyn ComputeWorker>,
    pub inbox: Receiver<Inbound>,
}

impl WorkerHandle {
    pub fn new(worker: Box<dyn ComputeWorker>, inbox: Receiver<Inbound>) -> Self {
        Self { worker, inbox }
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle").finish_non_exhaustive()
    }
}

/// Creates workers. Each call yields an independent instance.
pub trait WorkerFactory: Send {
    fn spawn(&mut self) -> Result<WorkerHandle, WorkerError>;
}

impl<F: WorkerFactory + ?Sized> WorkerFactory for Box<F> {
    fn spawn(&mut self) -> Result<WorkerHandle, WorkerError> {
        (**self).spawn()
    }
}
