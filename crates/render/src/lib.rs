//! Render orchestration: the compute worker boundary and the progressive render state machine.
//!
//! # Invariants
//! - The orchestrator exclusively owns the worker handle and the current `RenderState`.
//! - Progress within one render session never decreases.
//! - Messages from a discarded worker are never observed: replacing a worker drops its inbox.
//!
//! The numerical renderer lives behind [`ComputeWorker`]; this crate only speaks
//! the message protocol.

pub mod clock;
mod orchestrator;
pub mod protocol;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;
mod state;
mod worker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use orchestrator::{Orchestrator, OrchestratorConfig, RenderError, SessionId};
pub use protocol::{Inbound, ProtocolError, RenderRequest, ToWorker, WorkerMessage};
pub use state::{RenderEvent, RenderEventKind, RenderFailure, RenderState};
pub use worker::{ComputeWorker, WorkerError, WorkerFactory, WorkerHandle, WorkerLifecycle};
